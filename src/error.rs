//! Error management.

use crate::types::{DataType, ELabel, FId, Oid, VLabel};
use derive_more::Display;

#[derive(Debug, Display)]
pub enum Error {
    #[display(fmt = "schema mismatch: expected `{}`, found `{}`", expected, found)]
    SchemaMismatch { expected: String, found: String },
    #[display(fmt = "property type mismatch: expected {}, found {}", expected, found)]
    PropertyTypeMismatch { expected: DataType, found: DataType },
    #[display(
        fmt = "oid {} has vertex label {}, but {} was expected",
        oid,
        found,
        expected
    )]
    LabelMismatch {
        oid: Oid,
        expected: VLabel,
        found: VLabel,
    },
    #[display(fmt = "edge label {} references unknown vertex oid {}", elabel, oid)]
    UnresolvedEndpoint { elabel: ELabel, oid: Oid },
    #[display(fmt = "line {}: {}", line, message)]
    Parse { line: usize, message: String },
    #[display(fmt = "missing object `{}`", _0)]
    MissingObject(String),
    #[display(fmt = "corrupted object `{}`", _0)]
    Corrupted(String),
    #[display(fmt = "label {} out of range", _0)]
    InvalidLabel(usize),
    #[display(fmt = "fragment is directed={}, batch was directed={}", expected, found)]
    DirectednessMismatch { expected: bool, found: bool },
    #[display(fmt = "fragment {} failed: {}", fid, message)]
    Batch { fid: FId, message: String },
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
}

impl std::error::Error for Error {}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Sqlite(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
