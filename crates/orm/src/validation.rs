//! Pre-save validation.

use std::fmt::{self, Display};

use anyhow::Result;
use arbor_sql::Primitive;
use indexmap::IndexMap;

use crate::error::UsageError;
use crate::record::Record;

/// Every validation failure found on a record, keyed by field.
///
/// Returned (inside `anyhow::Error`) by [`crate::Db::save`] when the model's
/// validation rejects a record. Downcast to inspect individual messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: IndexMap<String, Vec<String>>,
    general: Vec<String>,
}

impl ValidationErrors {
    /// Creates an empty error set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure against a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_default().push(message.into());
    }

    /// Records a failure that is not tied to a single field.
    pub fn add_general(&mut self, message: impl Into<String>) {
        self.general.push(message.into());
    }

    /// Returns `true` when no failures were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.general.is_empty()
    }

    /// Messages for a single field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Failed field names, in the order they were recorded.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Failures not tied to a field.
    #[must_use]
    pub fn general(&self) -> &[String] {
        &self.general
    }

    /// Moves every failure from `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
        self.general.extend(other.general);
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation failed")?;
        let mut sep = ": ";
        for (field, messages) in &self.fields {
            for message in messages {
                write!(f, "{sep}{field} {message}")?;
                sep = "; ";
            }
        }
        for message in &self.general {
            write!(f, "{sep}{message}")?;
            sep = "; ";
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// A single check applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// The field must be present and not null or blank.
    Required,
    /// A numeric field must fall within the bounds.
    Range { min: Option<f64>, max: Option<f64> },
    /// A text field's character count must fall within the bounds.
    Length { min: Option<usize>, max: Option<usize> },
}

impl Rule {
    /// Creates a numeric range rule.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::EmptyRange`] when both bounds are `None`.
    pub fn range(min: Option<f64>, max: Option<f64>) -> Result<Self> {
        if min.is_none() && max.is_none() {
            return Err(UsageError::EmptyRange.into());
        }
        Ok(Self::Range { min, max })
    }

    /// Creates a text length rule.
    #[must_use]
    pub const fn length(min: Option<usize>, max: Option<usize>) -> Self {
        Self::Length { min, max }
    }

    // Absent and null values only fail `Required`.
    fn check(&self, value: Option<&Primitive>) -> Option<String> {
        let value = value.filter(|v| !v.is_null());
        match self {
            Self::Required => match value {
                None => Some("is required".to_string()),
                Some(Primitive::Text(text)) if text.trim().is_empty() => {
                    Some("is required".to_string())
                }
                Some(_) => None,
            },
            Self::Range { min, max } => {
                let Some(number) = value?.as_f64() else {
                    return Some("must be a number".to_string());
                };
                if let Some(min) = min
                    && number < *min
                {
                    return Some(format!("must be at least {min}"));
                }
                if let Some(max) = max
                    && number > *max
                {
                    return Some(format!("must be at most {max}"));
                }
                None
            }
            Self::Length { min, max } => {
                let Some(text) = value?.as_str() else {
                    return Some("must be text".to_string());
                };
                let len = text.chars().count();
                if let Some(min) = min
                    && len < *min
                {
                    return Some(format!("must be at least {min} characters"));
                }
                if let Some(max) = max
                    && len > *max
                {
                    return Some(format!("must be at most {max} characters"));
                }
                None
            }
        }
    }
}

/// An ordered list of field rules.
///
/// ```ignore
/// fn validate(record: &Record) -> ValidationErrors {
///     Validator::new()
///         .rule("email", Rule::Required)
///         .rule("age", Rule::Range { min: Some(18.0), max: None })
///         .validate(record)
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: Vec<(String, Rule)>,
}

impl Validator {
    /// Creates an empty validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule for a field.
    #[must_use]
    pub fn rule(mut self, field: impl Into<String>, rule: Rule) -> Self {
        self.rules.push((field.into(), rule));
        self
    }

    /// Runs every rule, collecting all failures.
    #[must_use]
    pub fn validate(&self, record: &Record) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for (field, rule) in &self.rules {
            if let Some(message) = rule.check(record.get(field)) {
                errors.add(field.clone(), message);
            }
        }
        errors
    }
}
