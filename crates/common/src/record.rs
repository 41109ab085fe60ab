//! Row values as they come off a data source.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;

/// Name of the table every producer reads from.
pub const USER_TABLE: &str = "user_data";

pub const USER_ID: &str = "user_id";
pub const NAME: &str = "name";
pub const EMAIL: &str = "email";
pub const AGE: &str = "age";

/// Column order of [`USER_TABLE`].
pub const USER_COLUMNS: [&str; 4] = [USER_ID, NAME, EMAIL, AGE];

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Coerce to an integer, truncating toward zero.
    ///
    /// DECIMAL columns arrive as text (`"26"`, `"26.00"`), so numeric text is accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.trunc() as i64)
                })
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            Value::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// One row of a result set: column names mapped to values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { fields: Vec::with_capacity(capacity) }
    }

    /// Appends a column. A repeated name shadows nothing; `get` returns the first match.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get_i64(&self, column: &str) -> Result<i64> {
        let value = self.require(column)?;
        value
            .as_i64()
            .ok_or_else(|| Error::Decode(format!("column '{}' is not an integer: {}", column, value)))
    }

    pub fn get_f64(&self, column: &str) -> Result<f64> {
        let value = self.require(column)?;
        value
            .as_f64()
            .ok_or_else(|| Error::Decode(format!("column '{}' is not numeric: {}", column, value)))
    }

    pub fn get_str(&self, column: &str) -> Result<&str> {
        let value = self.require(column)?;
        value.as_str().ok_or_else(|| Error::Decode(format!("column '{}' is not text: {}", column, value)))
    }

    fn require(&self, column: &str) -> Result<&Value> {
        self.get(column).ok_or_else(|| Error::Decode(format!("missing column '{}'", column)))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A bounded group of records pulled with one fetch-many call.
pub type Batch = Vec<Record>;

/// A bounded group of records returned by one LIMIT/OFFSET query.
pub type Page = Vec<Record>;

/// Typed view of a `user_data` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub age: u32,
}

impl UserRecord {
    pub fn to_record(&self) -> Record {
        let mut record = Record::with_capacity(USER_COLUMNS.len());
        record.push(USER_ID, self.user_id.as_str());
        record.push(NAME, self.name.as_str());
        record.push(EMAIL, self.email.as_str());
        record.push(AGE, self.age);
        record
    }
}

/// Reads the age column as a non-negative integer.
pub fn decode_age(record: &Record) -> Result<u32> {
    let age = record.get_i64(AGE)?;
    u32::try_from(age).map_err(|_| Error::Decode(format!("age out of range: {}", age)))
}

impl TryFrom<&Record> for UserRecord {
    type Error = Error;

    fn try_from(record: &Record) -> Result<Self> {
        Ok(Self {
            user_id: record.get_str(USER_ID)?.to_string(),
            name: record.get_str(NAME)?.to_string(),
            email: record.get_str(EMAIL)?.to_string(),
            age: decode_age(record)?,
        })
    }
}
