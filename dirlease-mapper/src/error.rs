// SPDX-License-Identifier: EUPL-1.2 OR MIT

use thiserror::Error;

/// Failure to read or write a single tagged member.
///
/// These never abort a mapping; they are reported per member in
/// [`crate::Mapped::outcomes`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemberError {
    #[error("cannot convert {value:?} to {target}: {reason}")]
    Conversion {
        value: String,
        target: &'static str,
        reason: String,
    },

    #[error("value rejected: {reason}")]
    Rejected { reason: String },
}

impl MemberError {
    pub fn conversion(value: &str, target: &'static str, reason: impl ToString) -> Self {
        MemberError::Conversion {
            value: value.to_owned(),
            target,
            reason: reason.to_string(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        MemberError::Rejected {
            reason: reason.into(),
        }
    }
}

/// Failure that prevents a whole instance from being mapped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("cannot instantiate {type_name}: {reason}")]
    Instantiation {
        type_name: &'static str,
        reason: String,
    },

    #[error("member `{member}` of {type_name} is tagged with an empty attribute name")]
    UnnamedAttribute {
        type_name: &'static str,
        member: &'static str,
    },
}

impl MappingError {
    pub fn instantiation<T>(reason: impl Into<String>) -> Self {
        MappingError::Instantiation {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }
}
