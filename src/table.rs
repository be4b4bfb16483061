//! Columnar property tables.

use crate::{
    error::{Error, Result},
    types::{DataType, Date, PropId, PropertyValue},
};
use itertools::Itertools;
use std::{str::FromStr, sync::Arc};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new<S: Into<String>>(name: S, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered list of named, typed columns.
///
/// The text form is `name:type,name:type,...`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.fields
                .iter()
                .map(|field| format!("{}:{}", field.name, field.data_type))
                .join(",")
        )
    }
}

impl FromStr for Schema {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Schema::default());
        }
        s.split(',')
            .map(|item| match item.rsplitn(2, ':').collect_tuple() {
                Some((data_type, name)) => Ok(Field::new(name.trim(), data_type.parse()?)),
                None => Err(format!("column `{}` has no type", item)),
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Schema::new)
    }
}

/// A row of property values tagged with the schema it was produced under.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<PropertyValue>,
}

impl Row {
    pub fn new(schema: Arc<Schema>, values: Vec<PropertyValue>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(Error::SchemaMismatch {
                expected: schema.to_string(),
                found: format!("{} values", values.len()),
            });
        }
        for (field, value) in schema.fields().iter().zip(&values) {
            if field.data_type != value.data_type() {
                return Err(Error::PropertyTypeMismatch {
                    expected: field.data_type,
                    found: value.data_type(),
                });
            }
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn values(&self) -> &[PropertyValue] {
        &self.values
    }
}

#[derive(Clone, Debug)]
enum Column {
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    String(Vec<String>),
    Date(Vec<Date>),
}

impl Column {
    fn new(data_type: DataType) -> Self {
        match data_type {
            DataType::Int32 => Column::Int32(vec![]),
            DataType::Int64 => Column::Int64(vec![]),
            DataType::Float => Column::Float(vec![]),
            DataType::Double => Column::Double(vec![]),
            DataType::String => Column::String(vec![]),
            DataType::Date => Column::Date(vec![]),
        }
    }

    fn data_type(&self) -> DataType {
        match self {
            Column::Int32(_) => DataType::Int32,
            Column::Int64(_) => DataType::Int64,
            Column::Float(_) => DataType::Float,
            Column::Double(_) => DataType::Double,
            Column::String(_) => DataType::String,
            Column::Date(_) => DataType::Date,
        }
    }

    fn push(&mut self, value: &PropertyValue) -> Result<()> {
        match (self, value) {
            (Column::Int32(c), PropertyValue::Int32(x)) => c.push(*x),
            (Column::Int64(c), PropertyValue::Int64(x)) => c.push(*x),
            (Column::Float(c), PropertyValue::Float(x)) => c.push(*x),
            (Column::Double(c), PropertyValue::Double(x)) => c.push(*x),
            (Column::String(c), PropertyValue::String(x)) => c.push(x.clone()),
            (Column::Date(c), PropertyValue::Date(x)) => c.push(*x),
            (column, value) => {
                return Err(Error::PropertyTypeMismatch {
                    expected: column.data_type(),
                    found: value.data_type(),
                })
            }
        }
        Ok(())
    }

    fn get(&self, row: usize) -> Option<PropertyValue> {
        match self {
            Column::Int32(c) => c.get(row).copied().map(PropertyValue::Int32),
            Column::Int64(c) => c.get(row).copied().map(PropertyValue::Int64),
            Column::Float(c) => c.get(row).copied().map(PropertyValue::Float),
            Column::Double(c) => c.get(row).copied().map(PropertyValue::Double),
            Column::String(c) => c.get(row).cloned().map(PropertyValue::String),
            Column::Date(c) => c.get(row).copied().map(PropertyValue::Date),
        }
    }
}

/// An append-only, row-wise sink whose schema is fixed by its first row.
#[derive(Clone, Debug, Default)]
pub struct AppendOnlyTable {
    schema: Option<Arc<Schema>>,
    columns: Vec<Column>,
    num_rows: usize,
}

impl AppendOnlyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.schema.as_ref()
    }

    pub fn row_count(&self) -> usize {
        self.num_rows
    }

    /// Appends `row` and returns its row index.
    pub fn append_row(&mut self, row: &Row) -> Result<usize> {
        match &self.schema {
            Some(schema) if schema.as_ref() != row.schema().as_ref() => {
                return Err(Error::SchemaMismatch {
                    expected: schema.to_string(),
                    found: row.schema().to_string(),
                });
            }
            Some(_) => {}
            None => {
                self.columns = row
                    .schema()
                    .fields()
                    .iter()
                    .map(|field| Column::new(field.data_type))
                    .collect();
                self.schema = Some(row.schema().clone());
            }
        }
        for (column, value) in self.columns.iter_mut().zip(row.values()) {
            column.push(value)?;
        }
        self.num_rows += 1;
        Ok(self.num_rows - 1)
    }

    pub fn get(&self, col: PropId, row: usize) -> Option<PropertyValue> {
        if row < self.num_rows {
            self.columns.get(col).and_then(|column| column.get(row))
        } else {
            None
        }
    }
}

/// An immutable columnar table.
#[derive(Clone, Debug)]
pub struct Table {
    schema: Arc<Schema>,
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    pub fn empty(schema: Arc<Schema>) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|field| Column::new(field.data_type))
            .collect();
        Self {
            schema,
            columns,
            num_rows: 0,
        }
    }

    pub fn from_rows<I>(schema: Arc<Schema>, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Row>,
    {
        let mut table = Self::empty(schema.clone());
        let mut builder = AppendOnlyTable {
            schema: Some(schema),
            columns: table.columns,
            num_rows: 0,
        };
        for row in rows {
            builder.append_row(&row)?;
        }
        table.columns = builder.columns;
        table.num_rows = builder.num_rows;
        Ok(table)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.num_rows
    }

    pub fn get(&self, col: PropId, row: usize) -> Option<PropertyValue> {
        if row < self.num_rows {
            self.columns.get(col).and_then(|column| column.get(row))
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<Row> {
        if row >= self.num_rows {
            return None;
        }
        let values = self
            .columns
            .iter()
            .map(|column| column.get(row))
            .collect::<Option<Vec<_>>>()?;
        Some(Row {
            schema: self.schema.clone(),
            values,
        })
    }
}
