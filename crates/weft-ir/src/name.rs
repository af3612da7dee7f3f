//! Resolved names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A resolved, module-unique name.
///
/// The frontend has already disambiguated shadowing, so two occurrences
/// of the same `Name` always refer to the same declaration. Temporaries
/// carry a `#<uid>` suffix which the backend mangles away.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name(pub String);

impl Name {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}
