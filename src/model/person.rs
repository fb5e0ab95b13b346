//! `Person` payload
//!
//! The wire form uses field names (`FirstName`, `LastName`), so ordering in
//! the encoded document does not matter. camelCase names are accepted on
//! decode. Both fields are required: a document missing either one fails to
//! decode rather than producing an empty value.

use serde::{Deserialize, Serialize};

use crate::utils::error::ValidationError;

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Person {
    #[serde(alias = "firstName")]
    pub first_name: String,
    #[serde(alias = "lastName")]
    pub last_name: String,
}

impl Person {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// Both names must be non-empty.
    pub fn ensure_required(&self) -> Result<(), ValidationError> {
        if self.first_name.is_empty() {
            return Err(ValidationError::Required("First Name"));
        }
        if self.last_name.is_empty() {
            return Err(ValidationError::Required("Last Name"));
        }
        Ok(())
    }

    /// Required-field check plus the length bounds applied when a person is
    /// entered for publishing.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.ensure_required()?;
        check_length("First Name", &self.first_name)?;
        check_length("Last Name", &self.last_name)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

fn check_length(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if (NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&len) {
        Ok(())
    } else {
        Err(ValidationError::Length {
            field,
            min: NAME_MIN_CHARS,
            max: NAME_MAX_CHARS,
        })
    }
}

/// Rule a consumer applies to a decoded payload before processing it.
pub trait Validate {
    fn ensure_valid(&self) -> Result<(), ValidationError>;
}

impl Validate for Person {
    fn ensure_valid(&self) -> Result<(), ValidationError> {
        self.ensure_required()
    }
}
