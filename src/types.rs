//! Identifier, label and property value types.

use derive_more::Display;
use std::{convert::TryFrom, str::FromStr};
use time::{format_description::FormatItem, macros::format_description};

/// The vertex id type, either a global id or a local id.
pub type VId = u64;

/// The edge id type, i.e. the row of an edge in its fragment's edge table.
pub type EId = u64;

/// The fragment (partition) id type.
pub type FId = usize;

/// The vertex label type.
pub type VLabel = usize;

/// The edge label type.
pub type ELabel = usize;

/// The property (column) id type.
pub type PropId = usize;

/// The original (user supplied) vertex id type.
pub type Oid = i64;

/// A vertex handle inside a fragment, wrapping its local id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vertex(VId);

impl Vertex {
    pub fn new(lid: VId) -> Self {
        Self(lid)
    }

    pub fn lid(&self) -> VId {
        self.0
    }
}

/// One adjacency entry: the neighbor's local id and the edge id.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nbr {
    pub neighbor: VId,
    pub eid: EId,
}

impl Nbr {
    pub fn new(neighbor: VId, eid: EId) -> Self {
        Self { neighbor, eid }
    }

    pub fn vertex(&self) -> Vertex {
        Vertex(self.neighbor)
    }
}

/// The data type of a property column.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum DataType {
    #[display(fmt = "int32")]
    Int32,
    #[display(fmt = "int64")]
    Int64,
    #[display(fmt = "float")]
    Float,
    #[display(fmt = "double")]
    Double,
    #[display(fmt = "string")]
    String,
    #[display(fmt = "date")]
    Date,
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "int32" => Ok(DataType::Int32),
            "long" | "int64" => Ok(DataType::Int64),
            "float" => Ok(DataType::Float),
            "double" => Ok(DataType::Double),
            "str" | "string" => Ok(DataType::String),
            "date" => Ok(DataType::Date),
            other => Err(format!("unknown data type `{}`", other)),
        }
    }
}

const DATE_FORMAT: &[FormatItem<'_>] = format_description!("[year]-[month]-[day]");

const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

/// A calendar date stored as days since 1970-01-01.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Date(pub i32);

impl Date {
    /// Parses either `YYYY-MM-DD` or a plain day count.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(days) = s.parse::<i32>() {
            return Some(Date(days));
        }
        time::Date::parse(s, DATE_FORMAT)
            .ok()
            .map(|date| Date(date.to_julian_day() - UNIX_EPOCH_JULIAN_DAY))
    }
}

impl std::fmt::Display for Date {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match time::Date::from_julian_day(self.0 + UNIX_EPOCH_JULIAN_DAY) {
            Ok(date) => write!(
                f,
                "{:04}-{:02}-{:02}",
                date.year(),
                u8::from(date.month()),
                date.day()
            ),
            Err(_) => write!(f, "{}", self.0),
        }
    }
}

/// A dynamically typed property value.
#[derive(Clone, Debug, Display, PartialEq)]
pub enum PropertyValue {
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Date(Date),
}

impl PropertyValue {
    pub fn data_type(&self) -> DataType {
        match self {
            PropertyValue::Int32(_) => DataType::Int32,
            PropertyValue::Int64(_) => DataType::Int64,
            PropertyValue::Float(_) => DataType::Float,
            PropertyValue::Double(_) => DataType::Double,
            PropertyValue::String(_) => DataType::String,
            PropertyValue::Date(_) => DataType::Date,
        }
    }

    /// Parses `s` as a value of `data_type`, returns `None` on malformed input.
    pub fn parse(data_type: DataType, s: &str) -> Option<Self> {
        let t = s.trim();
        match data_type {
            DataType::Int32 => t.parse().ok().map(PropertyValue::Int32),
            DataType::Int64 => t.parse().ok().map(PropertyValue::Int64),
            DataType::Float => t.parse().ok().map(PropertyValue::Float),
            DataType::Double => t.parse().ok().map(PropertyValue::Double),
            DataType::String => Some(PropertyValue::String(s.to_owned())),
            DataType::Date => Date::parse(t).map(PropertyValue::Date),
        }
    }
}

/// A Rust type that a property column of one [`DataType`] decodes into.
pub trait PropertyType: TryFrom<PropertyValue, Error = DataType> {
    const DATA_TYPE: DataType;
}

macro_rules! impl_try_from_property {
    ($t:ty, $variant:ident) => {
        impl PropertyType for $t {
            const DATA_TYPE: DataType = DataType::$variant;
        }

        impl TryFrom<PropertyValue> for $t {
            type Error = DataType;

            fn try_from(value: PropertyValue) -> Result<Self, Self::Error> {
                match value {
                    PropertyValue::$variant(x) => Ok(x),
                    other => Err(other.data_type()),
                }
            }
        }
    };
}

impl_try_from_property!(i32, Int32);
impl_try_from_property!(i64, Int64);
impl_try_from_property!(f32, Float);
impl_try_from_property!(f64, Double);
impl_try_from_property!(String, String);
impl_try_from_property!(Date, Date);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_from_str() {
        assert_eq!("int64".parse::<DataType>(), Ok(DataType::Int64));
        assert_eq!(" Double ".parse::<DataType>(), Ok(DataType::Double));
        assert!("blob".parse::<DataType>().is_err());
        assert_eq!(DataType::Date.to_string(), "date");
    }

    #[test]
    fn test_date() {
        assert_eq!(Date::parse("1970-01-02"), Some(Date(1)));
        assert_eq!(Date::parse("-3"), Some(Date(-3)));
        assert_eq!(Date::parse("2020-02-30"), None);
        assert_eq!(Date(18262).to_string(), "2020-01-01");
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(
            PropertyValue::parse(DataType::Int32, " 42"),
            Some(PropertyValue::Int32(42))
        );
        assert_eq!(PropertyValue::parse(DataType::Int64, "4x"), None);
        assert_eq!(
            PropertyValue::parse(DataType::String, "a b"),
            Some(PropertyValue::String(String::from("a b")))
        );
    }

    #[test]
    fn test_try_from() {
        assert_eq!(i64::try_from(PropertyValue::Int64(7)), Ok(7));
        assert_eq!(
            i32::try_from(PropertyValue::Double(1.0)),
            Err(DataType::Double)
        );
    }
}
