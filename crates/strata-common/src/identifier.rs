//! Table and column names that are safe to interpolate into generated SQL.

use std::fmt;

use crate::error::{CommonError, CommonResult};

/// The maximum number of characters in a table or column name.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// A name that passed the allow-list: letters, digits and underscores only,
/// not purely numeric, and at most [`MAX_IDENTIFIER_LENGTH`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn try_new(name: impl Into<String>) -> CommonResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(CommonError::invalid("identifier must not be empty"));
        }
        if name.chars().count() > MAX_IDENTIFIER_LENGTH {
            return Err(CommonError::invalid(format!(
                "identifier exceeds {MAX_IDENTIFIER_LENGTH} characters: {name}"
            )));
        }
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(CommonError::invalid(format!(
                "identifier may only contain letters, digits and underscores: {name}"
            )));
        }
        if name.chars().all(|c| c.is_numeric()) {
            return Err(CommonError::invalid(format!(
                "identifier must not be purely numeric: {name}"
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier in double quotes, ready for SQL interpolation.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Turns arbitrary text (e.g. a file stem) into a string that passes the allow-list.
pub fn sanitize_identifier(text: &str) -> String {
    let mut name: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .take(MAX_IDENTIFIER_LENGTH)
        .collect();
    if name.is_empty() || name.chars().all(|c| c.is_numeric()) {
        name.insert_str(0, "d_");
        name = name.chars().take(MAX_IDENTIFIER_LENGTH).collect();
    }
    name
}

/// Quotes a string as a SQL string literal.
/// This is only used for file paths in DDL statements which cannot take bound parameters.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
