//! The SQLite3 backing store of fragments.
//!
//! Arrays live in an `objects (key TEXT PRIMARY KEY, value BLOB)` table under
//! stable string keys, property rows in one table per fragment and label.

pub mod build;

use crate::{
    error::{Error, Result},
    id_parser::IdParser,
    table::{Row, Schema, Table},
    types::{DataType, Date, ELabel, FId, Oid, PropertyValue, VId, VLabel},
    vertex_map::VertexMap,
};
use log::debug;
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension};
use std::{path::Path, sync::Arc};

const WORD: usize = std::mem::size_of::<u64>();

/// Counts and flags shared by every fragment of a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Meta {
    pub fnum: usize,
    pub vertex_label_num: usize,
    pub edge_label_num: usize,
    pub directed: bool,
}

pub(crate) mod keys {
    use crate::types::{ELabel, FId, VLabel};

    pub const FNUM: &str = "meta/fnum";
    pub const VERTEX_LABEL_NUM: &str = "meta/vertex_label_num";
    pub const EDGE_LABEL_NUM: &str = "meta/edge_label_num";
    pub const DIRECTED: &str = "meta/directed";

    pub fn vertex_schema(label: VLabel) -> String {
        format!("schema/vertex/{}", label)
    }

    pub fn edge_schema(label: ELabel) -> String {
        format!("schema/edge/{}", label)
    }

    pub fn edge_relation(label: ELabel) -> String {
        format!("relation/edge/{}", label)
    }

    pub fn vertex_map(fid: FId, label: VLabel) -> String {
        format!("vertex_map/{}/{}", fid, label)
    }

    pub fn vertex_num(fid: FId, label: VLabel) -> String {
        format!("fragment/{}/vertex_num/{}", fid, label)
    }

    pub fn outer_gids(fid: FId, label: VLabel) -> String {
        format!("fragment/{}/outer_gids/{}", fid, label)
    }

    pub fn oe(fid: FId, vlabel: VLabel, elabel: ELabel) -> String {
        format!("fragment/{}/oe/{}/{}", fid, vlabel, elabel)
    }

    pub fn ie(fid: FId, vlabel: VLabel, elabel: ELabel) -> String {
        format!("fragment/{}/ie/{}/{}", fid, vlabel, elabel)
    }

    pub fn vertex_table(fid: FId, label: VLabel) -> String {
        format!("fragment_{}_vertex_{}", fid, label)
    }

    pub fn edge_table(fid: FId, label: ELabel) -> String {
        format!("fragment_{}_edge_{}", fid, label)
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS objects (key TEXT PRIMARY KEY, value BLOB NOT NULL)",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Runs `f` inside one transaction.
    pub fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.conn.execute_batch("BEGIN;")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(value)
            }
            Err(e) => {
                self.conn.execute_batch("ROLLBACK;")?;
                Err(e)
            }
        }
    }

    fn put_blob(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO objects (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_blob(&self, key: &str) -> Result<Vec<u8>> {
        self.conn
            .query_row("SELECT value FROM objects WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| Error::MissingObject(key.to_owned()))
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM objects WHERE key = ?1", params![key], |_| Ok(()))
            .optional()?
            .is_some())
    }

    /// Returns the keys starting with `prefix` in lexicographic order.
    pub fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM objects WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![prefix, prefix.len() as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    pub fn put_words(&self, key: &str, words: &[u64]) -> Result<()> {
        self.put_blob(key, words.iter().flat_map(|w| w.to_le_bytes()).collect())
    }

    pub fn get_words(&self, key: &str) -> Result<Vec<u64>> {
        let blob = self.get_blob(key)?;
        if blob.len() % WORD != 0 {
            return Err(Error::Corrupted(key.to_owned()));
        }
        Ok(blob
            .chunks_exact(WORD)
            .map(|chunk| {
                let mut bytes = [0; WORD];
                bytes.copy_from_slice(chunk);
                u64::from_le_bytes(bytes)
            })
            .collect())
    }

    pub fn put_oids(&self, key: &str, oids: &[Oid]) -> Result<()> {
        let words: Vec<u64> = oids.iter().map(|&oid| oid as u64).collect();
        self.put_words(key, &words)
    }

    pub fn get_oids(&self, key: &str) -> Result<Vec<Oid>> {
        Ok(self
            .get_words(key)?
            .into_iter()
            .map(|word| word as Oid)
            .collect())
    }

    pub fn put_u64(&self, key: &str, value: u64) -> Result<()> {
        self.put_words(key, &[value])
    }

    pub fn get_u64(&self, key: &str) -> Result<u64> {
        match self.get_words(key)?.as_slice() {
            [value] => Ok(*value),
            _ => Err(Error::Corrupted(key.to_owned())),
        }
    }

    pub fn put_text(&self, key: &str, text: &str) -> Result<()> {
        self.put_blob(key, text.as_bytes().to_vec())
    }

    pub fn get_text(&self, key: &str) -> Result<String> {
        String::from_utf8(self.get_blob(key)?).map_err(|_| Error::Corrupted(key.to_owned()))
    }

    pub fn put_meta(&self, meta: &Meta) -> Result<()> {
        self.put_u64(keys::FNUM, meta.fnum as u64)?;
        self.put_u64(keys::VERTEX_LABEL_NUM, meta.vertex_label_num as u64)?;
        self.put_u64(keys::EDGE_LABEL_NUM, meta.edge_label_num as u64)?;
        self.put_u64(keys::DIRECTED, meta.directed as u64)
    }

    pub fn meta(&self) -> Result<Meta> {
        let meta = Meta {
            fnum: self.get_u64(keys::FNUM)? as usize,
            vertex_label_num: self.get_u64(keys::VERTEX_LABEL_NUM)? as usize,
            edge_label_num: self.get_u64(keys::EDGE_LABEL_NUM)? as usize,
            directed: self.get_u64(keys::DIRECTED)? != 0,
        };
        if meta.fnum == 0 || meta.vertex_label_num == 0 {
            return Err(Error::Corrupted(String::from("meta")));
        }
        Ok(meta)
    }

    pub fn put_schema(&self, key: &str, schema: &Schema) -> Result<()> {
        self.put_text(key, &schema.to_string())
    }

    pub fn get_schema(&self, key: &str) -> Result<Arc<Schema>> {
        self.get_text(key)?
            .parse()
            .map(Arc::new)
            .map_err(|_| Error::Corrupted(key.to_owned()))
    }

    pub fn put_relation(&self, label: ELabel, relation: (VLabel, VLabel)) -> Result<()> {
        self.put_words(
            &keys::edge_relation(label),
            &[relation.0 as u64, relation.1 as u64],
        )
    }

    pub fn get_relation(&self, label: ELabel) -> Result<(VLabel, VLabel)> {
        let key = keys::edge_relation(label);
        match self.get_words(&key)?.as_slice() {
            [src, dst] => Ok((*src as VLabel, *dst as VLabel)),
            _ => Err(Error::Corrupted(key)),
        }
    }

    /// Reads the load-time identity map of every fragment.
    pub fn load_vertex_map(&self) -> Result<VertexMap> {
        let meta = self.meta()?;
        let oids = (0..meta.fnum)
            .map(|fid| {
                (0..meta.vertex_label_num)
                    .map(|label| self.get_oids(&keys::vertex_map(fid, label)))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "loaded vertex map of {} fragments and {} labels",
            meta.fnum, meta.vertex_label_num
        );
        Ok(VertexMap::new(
            IdParser::new(meta.fnum, meta.vertex_label_num),
            oids,
        ))
    }

    pub fn put_outer_gids(&self, fid: FId, label: VLabel, gids: &[VId]) -> Result<()> {
        self.put_words(&keys::outer_gids(fid, label), gids)
    }

    pub fn get_outer_gids(&self, fid: FId, label: VLabel) -> Result<Vec<VId>> {
        self.get_words(&keys::outer_gids(fid, label))
    }

    /// Creates (or replaces) the property table `name` and fills it with `rows`.
    pub fn write_table(&self, name: &str, schema: &Schema, rows: &[Row]) -> Result<()> {
        let columns = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| format!(", c{} {}", i, sql_type(field.data_type)))
            .collect::<String>();
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {};", name))?;
        self.conn.execute(
            &format!(
                "CREATE TABLE {} (row_id INTEGER PRIMARY KEY{})",
                name, columns
            ),
            [],
        )?;
        let placeholders = (0..=schema.len())
            .map(|i| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self
            .conn
            .prepare(&format!("INSERT INTO {} VALUES ({})", name, placeholders))?;
        for (row_id, row) in rows.iter().enumerate() {
            if row.schema().as_ref() != schema {
                return Err(Error::SchemaMismatch {
                    expected: schema.to_string(),
                    found: row.schema().to_string(),
                });
            }
            let values = std::iter::once(Value::Integer(row_id as i64))
                .chain(row.values().iter().map(to_sql_value));
            stmt.execute(params_from_iter(values))?;
        }
        Ok(())
    }

    pub fn read_table(&self, name: &str, schema: Arc<Schema>) -> Result<Table> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} ORDER BY row_id", name))?;
        let mut rows = stmt.query([])?;
        let mut result = vec![];
        while let Some(row) = rows.next()? {
            let values = schema
                .fields()
                .iter()
                .enumerate()
                .map(|(i, field)| {
                    from_sql_value(field.data_type, row.get(i + 1)?)
                        .ok_or_else(|| Error::Corrupted(format!("{} column {}", name, i)))
                })
                .collect::<Result<Vec<_>>>()?;
            result.push(Row::new(schema.clone(), values)?);
        }
        Table::from_rows(schema, result)
    }
}

fn sql_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Int32 | DataType::Int64 | DataType::Date => "INTEGER",
        DataType::Float | DataType::Double => "REAL",
        DataType::String => "TEXT",
    }
}

fn to_sql_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Int32(x) => Value::Integer(*x as i64),
        PropertyValue::Int64(x) => Value::Integer(*x),
        PropertyValue::Float(x) => Value::Real(*x as f64),
        PropertyValue::Double(x) => Value::Real(*x),
        PropertyValue::String(x) => Value::Text(x.clone()),
        PropertyValue::Date(x) => Value::Integer(x.0 as i64),
    }
}

fn from_sql_value(data_type: DataType, value: Value) -> Option<PropertyValue> {
    match (data_type, value) {
        (DataType::Int32, Value::Integer(x)) => Some(PropertyValue::Int32(x as i32)),
        (DataType::Int64, Value::Integer(x)) => Some(PropertyValue::Int64(x)),
        (DataType::Float, Value::Real(x)) => Some(PropertyValue::Float(x as f32)),
        (DataType::Double, Value::Real(x)) => Some(PropertyValue::Double(x)),
        (DataType::String, Value::Text(x)) => Some(PropertyValue::String(x)),
        (DataType::Date, Value::Integer(x)) => Some(PropertyValue::Date(Date(x as i32))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Field;

    #[test]
    fn test_objects() {
        let store = Store::open_in_memory().unwrap();
        store.put_words("a/words", &[1, u64::MAX, 0]).unwrap();
        store.put_oids("a/oids", &[-1, 7]).unwrap();
        store.put_text("b", "name:string").unwrap();
        assert_eq!(store.get_words("a/words").unwrap(), [1, u64::MAX, 0]);
        assert_eq!(store.get_oids("a/oids").unwrap(), [-1, 7]);
        assert_eq!(store.get_text("b").unwrap(), "name:string");
        assert_eq!(store.keys("a/").unwrap(), ["a/oids", "a/words"]);
        assert!(store.contains("b").unwrap());
        assert!(matches!(
            store.get_words("c"),
            Err(Error::MissingObject(_))
        ));
        assert!(matches!(store.get_u64("a/words"), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_meta() {
        let store = Store::open_in_memory().unwrap();
        let meta = Meta {
            fnum: 3,
            vertex_label_num: 2,
            edge_label_num: 1,
            directed: true,
        };
        store.put_meta(&meta).unwrap();
        assert_eq!(store.meta().unwrap(), meta);
        store.put_relation(0, (1, 0)).unwrap();
        assert_eq!(store.get_relation(0).unwrap(), (1, 0));
    }

    #[test]
    fn test_table() {
        let store = Store::open_in_memory().unwrap();
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::String),
            Field::new("weight", DataType::Float),
            Field::new("since", DataType::Date),
        ]));
        let rows = vec![
            Row::new(
                schema.clone(),
                vec![
                    PropertyValue::String(String::from("x")),
                    PropertyValue::Float(0.5),
                    PropertyValue::Date(Date(3)),
                ],
            )
            .unwrap(),
            Row::new(
                schema.clone(),
                vec![
                    PropertyValue::String(String::from("y")),
                    PropertyValue::Float(1.5),
                    PropertyValue::Date(Date(-2)),
                ],
            )
            .unwrap(),
        ];
        store.write_table("t", &schema, &rows).unwrap();
        let table = store.read_table("t", schema).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.row(1), Some(rows[1].clone()));
    }

    #[test]
    fn test_transaction_rollback() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<()> = store.in_transaction(|store| {
            store.put_u64("x", 1)?;
            Err(Error::Corrupted(String::from("x")))
        });
        assert!(result.is_err());
        assert!(!store.contains("x").unwrap());
    }
}
