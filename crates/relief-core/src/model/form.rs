//! Dynamic form values.

use serde::{Deserialize, Serialize};

/// One value of a worksite's dynamic intake form, keyed by field key.
///
/// A value is either textual or boolean; `is_bool` says which side to read.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormValue {
    #[serde(default)]
    pub value_string: String,
    #[serde(default)]
    pub is_bool: bool,
    #[serde(default)]
    pub value_bool: bool,
}

impl FormValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value_string: value.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn flag(value: bool) -> Self {
        Self {
            is_bool: true,
            value_bool: value,
            ..Self::default()
        }
    }

    /// True only for boolean values set to true.
    #[must_use]
    pub const fn is_true(&self) -> bool {
        self.is_bool && self.value_bool
    }

    #[must_use]
    pub fn has_value(&self) -> bool {
        if self.is_bool {
            self.value_bool
        } else {
            !self.value_string.is_empty()
        }
    }
}
