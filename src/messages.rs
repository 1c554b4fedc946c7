//! User-facing messages for field violations.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use validator::ValidationError;

const FALLBACK_MESSAGE: &str = "Invalid value.";

/// Fields that can be rejected by validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    FirstName,
    LastName,
    Email,
    PhoneNumber,
    IdNumber,
    Password,
    Groups,
}

impl Field {
    /// Name of the field as it appears in request and error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::FirstName => "first_name",
            Field::LastName => "last_name",
            Field::Email => "email",
            Field::PhoneNumber => "phone_number",
            Field::IdNumber => "id_number",
            Field::Password => "password",
            Field::Groups => "groups",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of rule a value broke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    Required,
    Blank,
    Invalid,
    Unique,
    MinLength,
    MaxLength,
    Weak,
    NotAList,
    DoesNotExist,
}

impl Violation {
    /// Machine-readable code attached to a [`ValidationError`].
    pub fn code(&self) -> &'static str {
        match self {
            Violation::Required => "required",
            Violation::Blank => "blank",
            Violation::Invalid => "invalid",
            Violation::Unique => "unique",
            Violation::MinLength => "min_length",
            Violation::MaxLength => "max_length",
            Violation::Weak => "weak",
            Violation::NotAList => "not_a_list",
            Violation::DoesNotExist => "does_not_exist",
        }
    }
}

/// Overrides read from `config.yaml`.
pub type Overrides = HashMap<Field, HashMap<Violation, String>>;

/// Read-only mapping `field -> violation -> message`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorCatalog {
    messages: HashMap<(Field, Violation), String>,
}

impl Default for ErrorCatalog {
    fn default() -> Self {
        use Field::*;
        use Violation::*;

        let entries = [
            (FirstName, Required, "First name is required"),
            (FirstName, Blank, "First name can't be blank"),
            (FirstName, Invalid, "The provided first name is invalid"),
            (FirstName, MaxLength, "First name must have at most 100 characters"),
            (LastName, Required, "Last name is required"),
            (LastName, Blank, "Last name can't be blank"),
            (LastName, Invalid, "The provided last name is invalid"),
            (LastName, MaxLength, "Last name must have at most 100 characters"),
            (Email, Required, "Email address is required"),
            (Email, Invalid, "The provided email is invalid"),
            (Email, Blank, "Email address can't be blank"),
            (Email, Unique, "The provided email already exists"),
            (Email, MaxLength, "Email address must have at most 250 characters"),
            (PhoneNumber, Required, "Phone number is required"),
            (PhoneNumber, Blank, "Phone number can't be blank"),
            (PhoneNumber, Invalid, "The provided phone number is invalid"),
            (PhoneNumber, Unique, "The provided phone number already exists"),
            (PhoneNumber, MaxLength, "Phone number must have at most 50 characters"),
            (IdNumber, Required, "ID number is required"),
            (IdNumber, Blank, "ID number can't be blank"),
            (IdNumber, Invalid, "The provided ID number is invalid"),
            (IdNumber, Unique, "The provided ID number already exists"),
            (IdNumber, MaxLength, "ID number must have at most 50 characters"),
            (Password, Required, "Password is required"),
            (Password, Blank, "Password field can't be blank"),
            (Password, Invalid, "The provided password is invalid"),
            (Password, MinLength, "Password must have at least 8 characters"),
            (
                Password,
                Weak,
                "Password must contain at least 1 uppercase, 1 lowercase and 1 special character",
            ),
            (Groups, Required, "Groups are required"),
            (Groups, NotAList, "Groups must be a list of group identifiers"),
            (Groups, Invalid, "Incorrect type. Expected a group identifier"),
            (Groups, DoesNotExist, "The provided group does not exist"),
        ];

        Self {
            messages: entries
                .into_iter()
                .map(|(field, kind, message)| ((field, kind), message.to_owned()))
                .collect(),
        }
    }
}

impl ErrorCatalog {
    /// Build the default catalog, replacing entries found in `overrides`.
    pub fn with_overrides(overrides: Option<&Overrides>) -> Self {
        let mut catalog = Self::default();

        for (field, kinds) in overrides.into_iter().flatten() {
            for (kind, message) in kinds {
                catalog.messages.insert((*field, *kind), message.clone());
            }
        }

        catalog
    }

    /// Message for a violation on a field.
    pub fn message(&self, field: Field, kind: Violation) -> &str {
        self.messages
            .get(&(field, kind))
            .map(String::as_str)
            .unwrap_or(FALLBACK_MESSAGE)
    }

    /// Build a [`ValidationError`] carrying the catalog message.
    pub fn error(&self, field: Field, kind: Violation) -> ValidationError {
        ValidationError::new(kind.code())
            .with_message(self.message(field, kind).to_owned().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_messages() {
        let catalog = ErrorCatalog::default();

        assert_eq!(
            catalog.message(Field::Email, Violation::Unique),
            "The provided email already exists"
        );
        assert_eq!(
            catalog.message(Field::FirstName, Violation::Blank),
            "First name can't be blank"
        );
        // No "unique" rule exists for names.
        assert_eq!(
            catalog.message(Field::FirstName, Violation::Unique),
            FALLBACK_MESSAGE
        );
    }

    #[test]
    fn test_overrides() {
        let overrides: Overrides = serde_yaml::from_str(
            "email:\n  unique: Email taken.\n",
        )
        .unwrap();
        let catalog = ErrorCatalog::with_overrides(Some(&overrides));

        assert_eq!(catalog.message(Field::Email, Violation::Unique), "Email taken.");
        assert_eq!(
            catalog.message(Field::Email, Violation::Invalid),
            "The provided email is invalid"
        );
    }

    #[test]
    fn test_validation_error() {
        let catalog = ErrorCatalog::default();
        let error = catalog.error(Field::PhoneNumber, Violation::Invalid);

        assert_eq!(error.code, "invalid");
        assert_eq!(
            error.message.as_deref(),
            Some("The provided phone number is invalid")
        );
    }
}
