//! Delimited text lines into typed rows.

use crate::{
    error::{Error, Result},
    table::{Field, Row, Schema},
    types::{DataType, Oid, PropertyValue},
};
use csv::{ReaderBuilder, StringRecord};
use itertools::Itertools;
use std::sync::Arc;

fn reader_builder(delimiter: char) -> Result<ReaderBuilder> {
    if !delimiter.is_ascii() {
        return Err(Error::Parse {
            line: 0,
            message: format!("delimiter {:?} is not ascii", delimiter),
        });
    }
    let mut builder = ReaderBuilder::new();
    builder
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::Fields);
    Ok(builder)
}

/// Splits `lines` into records, numbering them from `first_line`.
pub fn read_records(
    lines: &[String],
    delimiter: char,
    first_line: usize,
) -> Result<Vec<(usize, StringRecord)>> {
    let builder = reader_builder(delimiter)?;
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let line_no = first_line + i;
            let mut reader = builder.from_reader(line.as_bytes());
            let mut record = StringRecord::new();
            match reader.read_record(&mut record) {
                Ok(true) => Ok((line_no, record)),
                Ok(false) => Err(Error::Parse {
                    line: line_no,
                    message: String::from("empty record"),
                }),
                Err(e) => Err(Error::Parse {
                    line: line_no,
                    message: e.to_string(),
                }),
            }
        })
        .collect()
}

/// Checks a header line against the `key_columns` leading keys and the
/// property columns of `schema`.
///
/// Property columns may be written as `name` or as `name:type`.
pub fn check_header(
    header: &str,
    delimiter: char,
    key_columns: usize,
    schema: &Schema,
) -> Result<()> {
    let records = read_records(&[header.to_owned()], delimiter, 1)?;
    let found = match records.first() {
        Some((_, record)) => record.iter().skip(key_columns).map(str::to_owned).collect_vec(),
        None => vec![],
    };
    let matches = found.len() == schema.len()
        && found.iter().zip(schema.fields()).all(|(column, field)| {
            if *column == field.name {
                return true;
            }
            match column.rsplitn(2, ':').collect_tuple() {
                Some((data_type, name)) => match data_type.parse::<DataType>() {
                    Ok(data_type) => name == field.name && data_type == field.data_type,
                    Err(_) => false,
                },
                None => false,
            }
        });
    if matches {
        Ok(())
    } else {
        Err(Error::SchemaMismatch {
            expected: schema.to_string(),
            found: found.join(","),
        })
    }
}

/// Reads a typed header `key,...,name:type,...` into the schema of its
/// property columns.
pub fn parse_typed_header(header: &str, delimiter: char, key_columns: usize) -> Result<Schema> {
    let records = read_records(&[header.to_owned()], delimiter, 1)?;
    let record = match records.into_iter().next() {
        Some((_, record)) => record,
        None => {
            return Err(Error::Parse {
                line: 1,
                message: String::from("missing header"),
            })
        }
    };
    if record.len() < key_columns {
        return Err(Error::Parse {
            line: 1,
            message: format!("expected {} key columns", key_columns),
        });
    }
    record
        .iter()
        .skip(key_columns)
        .map(|column| match column.rsplitn(2, ':').collect_tuple() {
            Some((data_type, name)) => data_type
                .parse()
                .map(|data_type| Field::new(name, data_type))
                .map_err(|message| Error::Parse { line: 1, message }),
            None => Err(Error::Parse {
                line: 1,
                message: format!("column `{}` has no type", column),
            }),
        })
        .collect::<Result<Vec<_>>>()
        .map(Schema::new)
}

fn parse_oid(line: usize, field: Option<&str>) -> Result<Oid> {
    let field = field.ok_or_else(|| Error::Parse {
        line,
        message: String::from("missing vertex id"),
    })?;
    field.parse().map_err(|_| Error::Parse {
        line,
        message: format!("invalid vertex id `{}`", field),
    })
}

fn parse_properties(
    line: usize,
    record: &StringRecord,
    key_columns: usize,
    schema: &Arc<Schema>,
) -> Result<Row> {
    let num_properties = record.len().saturating_sub(key_columns);
    if num_properties != schema.len() {
        return Err(Error::Parse {
            line,
            message: format!(
                "expected {} properties, found {}",
                schema.len(),
                num_properties
            ),
        });
    }
    let values = record
        .iter()
        .skip(key_columns)
        .zip(schema.fields())
        .map(|(s, field)| {
            PropertyValue::parse(field.data_type, s).ok_or_else(|| Error::Parse {
                line,
                message: format!("invalid {} `{}` for `{}`", field.data_type, s, field.name),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Row::new(schema.clone(), values)
}

/// Parses `oid, properties...` lines.
pub fn parse_vertex_lines(
    lines: &[String],
    delimiter: char,
    first_line: usize,
    schema: &Arc<Schema>,
) -> Result<Vec<(Oid, Row)>> {
    read_records(lines, delimiter, first_line)?
        .into_iter()
        .map(|(line, record)| {
            let oid = parse_oid(line, record.get(0))?;
            Ok((oid, parse_properties(line, &record, 1, schema)?))
        })
        .collect()
}

/// Parses `src_oid, dst_oid, properties...` lines.
pub fn parse_edge_lines(
    lines: &[String],
    delimiter: char,
    first_line: usize,
    schema: &Arc<Schema>,
) -> Result<Vec<(Oid, Oid, Row)>> {
    read_records(lines, delimiter, first_line)?
        .into_iter()
        .map(|(line, record)| {
            let src = parse_oid(line, record.get(0))?;
            let dst = parse_oid(line, record.get(1))?;
            Ok((src, dst, parse_properties(line, &record, 2, schema)?))
        })
        .collect()
}
