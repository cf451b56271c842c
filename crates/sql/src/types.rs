use std::fmt::{self, Display, Write};

/// A database-bindable scalar.
///
/// This is the only value type that crosses the engine boundary, in either
/// direction. Booleans are carried as `Integer(0 | 1)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Primitive {
    /// SQL `NULL`.
    #[default]
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Primitive {
    /// Returns `true` for [`Primitive::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the numeric payload as a float, if any.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Blob(bytes) => {
                f.write_str("X'")?;
                for byte in bytes {
                    write!(f, "{byte:02X}")?;
                }
                f.write_char('\'')
            }
        }
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

macro_rules! integer_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Primitive {
                fn from(value: $ty) -> Self {
                    Self::Integer(i64::from(value))
                }
            }
        )*
    };
}

integer_from!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Primitive {
    fn from(value: f32) -> Self {
        Self::Real(f64::from(value))
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Primitive {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Primitive {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A named column value within a [`Row`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Column name (or alias) as reported by the engine.
    pub name: String,

    /// Column value.
    pub value: Primitive,
}

/// A single result row, with columns in select-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Column values.
    pub fields: Vec<Field>,
}

impl Row {
    /// Creates a row from `(name, value)` pairs.
    #[must_use]
    pub fn new<N, V>(fields: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<Primitive>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, value)| Field {
                    name: name.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }

    /// Returns the value of the named column.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Primitive> {
        self.fields.iter().find(|field| field.name == name).map(|field| &field.value)
    }

    /// Removes the named column from the row, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Primitive> {
        let index = self.fields.iter().position(|field| field.name == name)?;
        Some(self.fields.remove(index).value)
    }

    /// Returns the first column value, used for scalar queries.
    #[must_use]
    pub fn first(&self) -> Option<&Primitive> {
        self.fields.first().map(|field| &field.value)
    }
}

impl IntoIterator for Row {
    type IntoIter = std::vec::IntoIter<Field>;
    type Item = Field;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
