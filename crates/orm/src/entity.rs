use anyhow::{Context, Result, anyhow, bail};
use arbor_sql::Primitive;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use url::Url;

use crate::record::Record;
use crate::schema::Schema;
use crate::scope::Capability;
use crate::validation::ValidationErrors;
use crate::value::{Json, Value};

/// Trait for types that can be decoded from a stored [`Primitive`].
///
/// This trait is implemented for the standard Rust types the codec encodes
/// (`i64`, `String`, `DateTime<Utc>`, `TimeDelta`, ...).
pub trait FetchValue: Sized {
    /// Decode a single stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted to the target type.
    fn decode(value: &Primitive) -> Result<Self>;

    /// Fetch a value from a record by column name.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing or the value cannot be converted to the target type.
    fn fetch(record: &Record, col: &str) -> Result<Self> {
        let value = record
            .get(col)
            .ok_or_else(|| anyhow!("missing column '{col}' on '{}'", record.table()))?;
        Self::decode(value).with_context(|| format!("decoding column '{col}'"))
    }
}

/// A persisted model: its table, key and behaviors.
///
/// Usually implemented by the [`entity!`](crate::entity!) macro. Implement it
/// by hand to add validation or attribute transforms.
pub trait Model: Sized + Send + Sync + 'static {
    /// The database table name for this model.
    const TABLE: &'static str;

    /// Primary key column.
    const PRIMARY_KEY: &'static str = "id";

    /// Behaviors attached to the model.
    #[must_use]
    fn capabilities() -> Vec<Capability> {
        Vec::new()
    }

    /// Checks a record before it is saved.
    #[must_use]
    fn validate(record: &Record) -> ValidationErrors {
        let _ = record;
        ValidationErrors::default()
    }

    /// Rewrites a value as it is assigned to a column.
    #[must_use]
    fn transform(column: &str, value: Value) -> Value {
        let _ = column;
        value
    }

    /// Runtime description of the model.
    #[must_use]
    fn schema() -> Schema {
        Schema::new(Self::TABLE)
            .primary_key(Self::PRIMARY_KEY)
            .capabilities(Self::capabilities())
            .validator(Self::validate)
            .transformer(Self::transform)
    }
}

/// A model with a typed struct representation.
///
/// Typically implemented via the `entity!` macro rather than manually.
pub trait Entity: Model {
    /// Construct an entity instance from a record.
    ///
    /// # Errors
    ///
    /// Returns an error if any required column is missing or cannot be converted to the expected type.
    fn from_record(record: &Record) -> Result<Self>;

    /// Field values, keyed by column.
    fn to_values(&self) -> Vec<(&'static str, Value)>;
}

/// Declares an ORM entity with automatic `Model` and `Entity` implementations.
///
/// # Examples
///
/// ```ignore
/// entity! {
///     table = "posts",
///     capabilities = [Capability::timestamps(), Capability::soft_deletes()],
///     #[derive(Debug, Clone)]
///     pub struct Post {
///         pub id: Option<i64>,
///         pub user_id: i64,
///         pub title: String,
///         pub deleted_at: Option<DateTime<Utc>>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! entity {
    // Full form: primary key + capabilities + struct (single code-generation arm)
    (
        table = $table:literal,
        primary_key = $pk:literal,
        capabilities = [$($capability:expr),* $(,)?],
        $(#[$meta:meta])*
        pub struct $struct_name:ident {
            $(
                $(#[$field_meta:meta])*
                pub $field_name:ident : $field_type:ty
            ),* $(,)?
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$meta])*
        pub struct $struct_name {
            $(
                $(#[$field_meta])*
                pub $field_name : $field_type
            ),*
        }

        impl $crate::Model for $struct_name {
            const TABLE: &'static str = $table;
            const PRIMARY_KEY: &'static str = $pk;

            fn capabilities() -> Vec<$crate::Capability> {
                vec![$($capability),*]
            }
        }

        impl $crate::Entity for $struct_name {
            fn from_record(record: &$crate::Record) -> $crate::__private::Result<Self> {
                Ok(Self {
                    $(
                        $field_name: <$field_type as $crate::FetchValue>::fetch(record, stringify!($field_name))?,
                    )*
                })
            }

            fn to_values(&self) -> Vec<(&'static str, $crate::Value)> {
                vec![
                    $(
                        (stringify!($field_name), self.$field_name.clone().into()),
                    )*
                ]
            }
        }
    };

    // Primary key only → forward with no capabilities
    (
        table = $table:literal,
        primary_key = $pk:literal,
        $($rest:tt)*
    ) => {
        $crate::entity! {
            table = $table,
            primary_key = $pk,
            capabilities = [],
            $($rest)*
        }
    };

    // Capabilities only → forward with the default primary key
    (
        table = $table:literal,
        capabilities = [$($capability:expr),* $(,)?],
        $($rest:tt)*
    ) => {
        $crate::entity! {
            table = $table,
            primary_key = "id",
            capabilities = [$($capability),*],
            $($rest)*
        }
    };

    // Bare table → forward with defaults
    (
        table = $table:literal,
        $($rest:tt)*
    ) => {
        $crate::entity! {
            table = $table,
            primary_key = "id",
            capabilities = [],
            $($rest)*
        }
    };
}

// Inbound conversion
impl FetchValue for bool {
    fn decode(value: &Primitive) -> Result<Self> {
        match value {
            Primitive::Integer(v) => Ok(*v != 0),
            Primitive::Text(raw) if raw == "true" => Ok(true),
            Primitive::Text(raw) if raw == "false" => Ok(false),
            _ => bail!("expected boolean, found {value:?}"),
        }
    }
}

impl FetchValue for i64 {
    fn decode(value: &Primitive) -> Result<Self> {
        match value {
            Primitive::Integer(v) => Ok(*v),
            Primitive::Text(raw) => {
                raw.parse().with_context(|| format!("expected integer, found '{raw}'"))
            }
            _ => bail!("expected integer, found {value:?}"),
        }
    }
}

macro_rules! narrow_integer {
    ($($ty:ty),*) => {
        $(
            impl FetchValue for $ty {
                fn decode(value: &Primitive) -> Result<Self> {
                    let wide = i64::decode(value)?;
                    Self::try_from(wide).with_context(|| {
                        format!("{wide} is out of range for {}", stringify!($ty))
                    })
                }
            }
        )*
    };
}

narrow_integer!(i8, i16, i32, u8, u16, u32);

// Unsigned values above `i64::MAX` are stored as decimal text.
macro_rules! wide_unsigned {
    ($($ty:ty),*) => {
        $(
            impl FetchValue for $ty {
                fn decode(value: &Primitive) -> Result<Self> {
                    match value {
                        Primitive::Integer(v) => Self::try_from(*v).with_context(|| {
                            format!("{v} is out of range for {}", stringify!($ty))
                        }),
                        Primitive::Text(raw) => raw.parse().with_context(|| {
                            format!("expected {}, found '{raw}'", stringify!($ty))
                        }),
                        _ => bail!("expected integer, found {value:?}"),
                    }
                }
            }
        )*
    };
}

wide_unsigned!(u64, usize);

impl FetchValue for i128 {
    fn decode(value: &Primitive) -> Result<Self> {
        match value {
            Primitive::Integer(v) => Ok(Self::from(*v)),
            Primitive::Text(raw) => {
                raw.parse().with_context(|| format!("expected big integer, found '{raw}'"))
            }
            _ => bail!("expected big integer, found {value:?}"),
        }
    }
}

impl FetchValue for f64 {
    fn decode(value: &Primitive) -> Result<Self> {
        value.as_f64().ok_or_else(|| anyhow!("expected number, found {value:?}"))
    }
}

impl FetchValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn decode(value: &Primitive) -> Result<Self> {
        f64::decode(value).map(|v| v as Self)
    }
}

impl FetchValue for String {
    fn decode(value: &Primitive) -> Result<Self> {
        match value {
            Primitive::Text(raw) => Ok(raw.clone()),
            _ => bail!("expected text, found {value:?}"),
        }
    }
}

impl FetchValue for Vec<u8> {
    fn decode(value: &Primitive) -> Result<Self> {
        match value {
            Primitive::Blob(bytes) => Ok(bytes.clone()),
            _ => bail!("expected blob, found {value:?}"),
        }
    }
}

impl FetchValue for DateTime<Utc> {
    fn decode(value: &Primitive) -> Result<Self> {
        let Primitive::Text(raw) = value else {
            bail!("expected timestamp, found {value:?}");
        };

        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(parsed.with_timezone(&Utc));
        }

        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
            return Ok(Self::from_naive_utc_and_offset(parsed, Utc));
        }

        bail!("unsupported timestamp: {raw}; expected RFC3339 or \"%Y-%m-%d %H:%M:%S%.f\" format")
    }
}

impl FetchValue for NaiveDate {
    fn decode(value: &Primitive) -> Result<Self> {
        let Primitive::Text(raw) = value else {
            bail!("expected date, found {value:?}");
        };
        Self::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("unsupported date: {raw}; expected \"%Y-%m-%d\" format"))
    }
}

impl FetchValue for TimeDelta {
    fn decode(value: &Primitive) -> Result<Self> {
        let millis = i64::decode(value)?;
        Self::try_milliseconds(millis).ok_or_else(|| anyhow!("duration of {millis}ms is out of range"))
    }
}

impl FetchValue for Url {
    fn decode(value: &Primitive) -> Result<Self> {
        let raw = String::decode(value)?;
        Self::parse(&raw).with_context(|| format!("invalid uri: {raw}"))
    }
}

impl FetchValue for serde_json::Value {
    fn decode(value: &Primitive) -> Result<Self> {
        match value {
            Primitive::Text(raw) => Ok(serde_json::from_str(raw)?),
            Primitive::Blob(bytes) => Ok(serde_json::from_slice(bytes)?),
            _ => bail!("expected json compatible value, found {value:?}"),
        }
    }
}

impl<T: DeserializeOwned> FetchValue for Json<T> {
    fn decode(value: &Primitive) -> Result<Self> {
        let raw = String::decode(value)?;
        Self::parse(&raw)
    }
}

impl<T: FetchValue> FetchValue for Option<T> {
    fn decode(value: &Primitive) -> Result<Self> {
        if value.is_null() { Ok(None) } else { T::decode(value).map(Some) }
    }

    fn fetch(record: &Record, col: &str) -> Result<Self> {
        match record.get(col) {
            Some(value) => Self::decode(value),
            None => Ok(None),
        }
    }
}
