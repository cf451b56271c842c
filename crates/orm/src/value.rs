//! Host values and their encoding into bindable [`Primitive`]s.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::{self, Debug, Display};

use arbor_sql::Primitive;
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeDelta, TimeZone, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

/// A host-level value, before it is reduced to a [`Primitive`].
///
/// Conditions and record setters accept anything convertible into a `Value`,
/// so callers pass natural Rust types (`i32`, `&str`, `DateTime<Utc>`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// An instant in time, held in UTC.
    Timestamp(DateTime<Utc>),
    /// A calendar date.
    Date(NaiveDate),
    /// Boolean.
    Bool(bool),
    /// The symbolic name of an enumerated value.
    Enum(String),
    /// A signed interval.
    Duration(TimeDelta),
    /// A URI.
    Uri(Url),
    /// An integer that may exceed the engine's native integer width.
    BigInt(i128),
    /// An ordered collection.
    List(Vec<Self>),
    /// An unordered collection of distinct members.
    Set(Vec<Self>),
    /// A keyed record.
    Map(BTreeMap<String, Self>),
    /// An arbitrary JSON document.
    Json(serde_json::Value),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A value with no dedicated encoding, carried by its string form.
    Other(String),
}

impl Value {
    /// Builds an ordered collection.
    pub fn list<T: Into<Self>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Builds an enumerated value from its symbolic name.
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Enum(name.into())
    }

    /// Carries any displayable value by its string form.
    pub fn other(value: impl Display) -> Self {
        Self::Other(value.to_string())
    }
}

/// Encodes a host value into a bindable primitive.
///
/// Rules apply in order and the first match wins. Encoding never fails:
/// collections that cannot be serialized fall back to their string form.
#[must_use]
pub fn encode(value: &Value) -> Primitive {
    match value {
        Value::Null => Primitive::Null,
        Value::Timestamp(ts) => Primitive::Text(iso8601(ts)),
        Value::Date(date) => Primitive::Text(date.format("%Y-%m-%d").to_string()),
        Value::Bool(v) => Primitive::Integer(i64::from(*v)),
        Value::Enum(name) => Primitive::Text(name.clone()),
        Value::Duration(d) => Primitive::Integer(d.num_milliseconds()),
        Value::Uri(uri) => Primitive::Text(uri.to_string()),
        Value::BigInt(v) => Primitive::Text(v.to_string()),
        Value::List(_) | Value::Set(_) | Value::Map(_) => json_or_display(value),
        Value::Json(doc) => {
            Primitive::Text(serde_json::to_string(doc).unwrap_or_else(|_| doc.to_string()))
        }
        Value::Int(v) => Primitive::Integer(*v),
        Value::Float(v) => Primitive::Real(*v),
        Value::Text(v) | Value::Other(v) => Primitive::Text(v.clone()),
        Value::Bytes(v) => Primitive::Blob(v.clone()),
    }
}

fn iso8601(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn json_or_display(value: &Value) -> Primitive {
    let encoded = to_json(value).and_then(|doc| serde_json::to_string(&doc).ok());
    Primitive::Text(encoded.unwrap_or_else(|| value.to_string()))
}

// `None` when some member has no JSON representation (non-finite floats).
fn to_json(value: &Value) -> Option<serde_json::Value> {
    use serde_json::Value as Json;

    let doc = match value {
        Value::Null => Json::Null,
        Value::Timestamp(ts) => Json::String(iso8601(ts)),
        Value::Date(date) => Json::String(date.format("%Y-%m-%d").to_string()),
        Value::Bool(v) => Json::Bool(*v),
        Value::Enum(v) | Value::Text(v) | Value::Other(v) => Json::String(v.clone()),
        Value::Duration(d) => Json::from(d.num_milliseconds()),
        Value::Uri(uri) => Json::String(uri.to_string()),
        Value::BigInt(v) => {
            i64::try_from(*v).map_or_else(|_| Json::String(v.to_string()), Json::from)
        }
        Value::List(items) | Value::Set(items) => {
            Json::Array(items.iter().map(to_json).collect::<Option<_>>()?)
        }
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(k, v)| to_json(v).map(|v| (k.clone(), v)))
                .collect::<Option<_>>()?,
        ),
        Value::Json(doc) => doc.clone(),
        Value::Int(v) => Json::from(*v),
        Value::Float(v) => Json::Number(serde_json::Number::from_f64(*v)?),
        Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
    };
    Some(doc)
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Timestamp(ts) => f.write_str(&iso8601(ts)),
            Self::Date(date) => write!(f, "{date}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Enum(v) | Self::Text(v) | Self::Other(v) => f.write_str(v),
            Self::Duration(d) => write!(f, "{}ms", d.num_milliseconds()),
            Self::Uri(uri) => write!(f, "{uri}"),
            Self::BigInt(v) => write!(f, "{v}"),
            Self::List(items) | Self::Set(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Json(doc) => write!(f, "{doc}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bytes(bytes) => write!(f, "{bytes:?}"),
        }
    }
}

// Inbound conversions

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! int_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::Int(i64::from(value))
                }
            }
        )*
    };
}

int_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or_else(|_| Self::BigInt(i128::from(value)), Self::Int)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        i64::try_from(value).map_or_else(|_| Self::Other(value.to_string()), Self::Int)
    }
}

impl From<i128> for Value {
    fn from(value: i128) -> Self {
        Self::BigInt(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<Self>> for Value {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Self::list(value)
    }
}

impl From<Vec<&str>> for Value {
    fn from(value: Vec<&str>) -> Self {
        Self::list(value)
    }
}

impl From<Vec<i64>> for Value {
    fn from(value: Vec<i64>) -> Self {
        Self::list(value)
    }
}

impl<T: Into<Self>> From<BTreeSet<T>> for Value {
    fn from(value: BTreeSet<T>) -> Self {
        Self::Set(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self> + Display> From<HashSet<T>> for Value {
    // sorted by display form so encoding is deterministic
    fn from(value: HashSet<T>) -> Self {
        let mut members: Vec<T> = value.into_iter().collect();
        members.sort_by_cached_key(ToString::to_string);
        Self::Set(members.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<BTreeMap<String, T>> for Value {
    fn from(value: BTreeMap<String, T>) -> Self {
        Self::Map(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Self>> From<HashMap<String, T>> for Value {
    fn from(value: HashMap<String, T>) -> Self {
        Self::Map(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(value: DateTime<Tz>) -> Self {
        Self::Timestamp(value.with_timezone(&Utc))
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<TimeDelta> for Value {
    fn from(value: TimeDelta) -> Self {
        Self::Duration(value)
    }
}

impl From<std::time::Duration> for Value {
    fn from(value: std::time::Duration) -> Self {
        TimeDelta::from_std(value)
            .map_or_else(|_| Self::Other(format!("{}ms", value.as_millis())), Self::Duration)
    }
}

impl From<Url> for Value {
    fn from(value: Url) -> Self {
        Self::Uri(value)
    }
}

impl From<Primitive> for Value {
    fn from(value: Primitive) -> Self {
        match value {
            Primitive::Null => Self::Null,
            Primitive::Integer(v) => Self::Int(v),
            Primitive::Real(v) => Self::Float(v),
            Primitive::Text(v) => Self::Text(v),
            Primitive::Blob(v) => Self::Bytes(v),
        }
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Stores `T` as a JSON document and decodes it back.
///
/// ```ignore
/// record.set("tags", Json(vec!["a", "b"]));
/// let tags: Json<Vec<String>> = record.get_as("tags")?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize + Debug> From<Json<T>> for Value {
    fn from(value: Json<T>) -> Self {
        serde_json::to_value(&value.0)
            .map_or_else(|_| Self::Other(format!("{:?}", value.0)), Self::Json)
    }
}

impl<T: DeserializeOwned> Json<T> {
    pub(crate) fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(Self(serde_json::from_str(raw)?))
    }
}
