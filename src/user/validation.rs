//! Field checks run before any write.
//!
//! Every field is checked and all violations are returned together.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use validator::{ValidateEmail, ValidationErrors};
use zeroize::Zeroize;

use crate::error::Result;
use crate::messages::{ErrorCatalog, Field, Violation};
use crate::user::{Lookup, Profile, UserPatch, UserService};

pub const PASSWORD_MIN_LENGTH: usize = 8;

// Widths of the `users` columns.
pub const NAME_MAX_LENGTH: usize = 100;
pub const EMAIL_MAX_LENGTH: usize = 250;
pub const NUMBER_MAX_LENGTH: usize = 50;

/// International phone number, `+` then 7 to 15 digits, single spaces allowed.
pub static PHONE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+(?:[0-9] ?){6,14}[0-9]$").unwrap()
});

/// Body value expected to be a JSON string.
///
/// Values of another type are kept as [`Text::Invalid`] so they can be
/// reported along with every other field.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum Text {
    #[default]
    Missing,
    Invalid,
    Value(String),
}

impl Text {
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Text::Value(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(value) => Text::Value(value),
            _ => Text::Invalid,
        })
    }
}

impl Zeroize for Text {
    fn zeroize(&mut self) {
        if let Text::Value(value) = self {
            value.zeroize();
        }
    }
}

impl From<&str> for Text {
    fn from(value: &str) -> Self {
        Text::Value(value.to_owned())
    }
}

/// Raw user fields as sent by a client.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct UserForm {
    pub first_name: Text,
    pub last_name: Text,
    pub email: Text,
    pub phone_number: Text,
    pub id_number: Text,
    pub groups: Option<Value>,
}

/// Whether every field must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update { user_id: i64 },
}

impl Mode {
    fn required(&self) -> bool {
        matches!(self, Mode::Create)
    }

    fn exclude(&self) -> Option<i64> {
        match self {
            Mode::Create => None,
            Mode::Update { user_id } => Some(*user_id),
        }
    }
}

/// Values accepted by [`Validator::validate`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Cleaned {
    pub email: Option<String>,
    pub patch: UserPatch,
}

impl Cleaned {
    /// Profile used to create an account.
    pub fn profile(&self) -> Profile {
        Profile {
            first_name: self.patch.first_name.clone(),
            last_name: self.patch.last_name.clone(),
            phone_number: self.patch.phone_number.clone(),
            id_number: self.patch.id_number.clone(),
            groups: self.patch.groups.clone().unwrap_or_default(),
        }
    }
}

/// Check a [`UserForm`] against the catalog rules.
pub struct Validator<'a> {
    users: &'a UserService,
    catalog: &'a ErrorCatalog,
    errors: ValidationErrors,
}

impl<'a> Validator<'a> {
    pub fn new(users: &'a UserService, catalog: &'a ErrorCatalog) -> Self {
        Self {
            users,
            catalog,
            errors: ValidationErrors::new(),
        }
    }

    fn reject(&mut self, field: Field, kind: Violation) {
        self.errors
            .add(field.as_str(), self.catalog.error(field, kind));
    }

    /// Trim a value, flagging it when missing, not a string, blank or wider
    /// than its column.
    fn text(
        &mut self,
        field: Field,
        value: Text,
        required: bool,
        max_length: usize,
    ) -> Option<String> {
        let value = match value {
            Text::Missing => {
                if required {
                    self.reject(field, Violation::Required);
                }
                return None;
            },
            Text::Invalid => {
                self.reject(field, Violation::Invalid);
                return None;
            },
            Text::Value(value) => value.trim().to_owned(),
        };

        if value.is_empty() {
            self.reject(field, Violation::Blank);
            None
        } else if value.chars().count() > max_length {
            self.reject(field, Violation::MaxLength);
            None
        } else {
            Some(value)
        }
    }

    /// Flag a value already held by another user.
    async fn unique(
        &mut self,
        field: Field,
        lookup: Lookup<'_>,
        mode: Mode,
    ) -> Result<bool> {
        if self.users.exists_by(lookup, mode.exclude()).await? {
            self.reject(field, Violation::Unique);
            return Ok(false);
        }
        Ok(true)
    }

    async fn email(&mut self, value: Text, mode: Mode) -> Result<Option<String>> {
        let Some(email) = self.text(Field::Email, value, mode.required(), EMAIL_MAX_LENGTH)
        else {
            return Ok(None);
        };
        let email = email.to_lowercase();
        if !email.validate_email() {
            self.reject(Field::Email, Violation::Invalid);
            return Ok(None);
        }

        let unique = self.unique(Field::Email, Lookup::Email(&email), mode).await?;
        Ok(unique.then_some(email))
    }

    async fn phone_number(
        &mut self,
        value: Text,
        mode: Mode,
    ) -> Result<Option<String>> {
        let Some(phone) =
            self.text(Field::PhoneNumber, value, mode.required(), NUMBER_MAX_LENGTH)
        else {
            return Ok(None);
        };
        if !PHONE_NUMBER.is_match(&phone) {
            self.reject(Field::PhoneNumber, Violation::Invalid);
            return Ok(None);
        }

        let unique = self
            .unique(Field::PhoneNumber, Lookup::PhoneNumber(&phone), mode)
            .await?;
        Ok(unique.then_some(phone))
    }

    async fn id_number(
        &mut self,
        value: Text,
        mode: Mode,
    ) -> Result<Option<String>> {
        let Some(number) =
            self.text(Field::IdNumber, value, mode.required(), NUMBER_MAX_LENGTH)
        else {
            return Ok(None);
        };

        let unique = self
            .unique(Field::IdNumber, Lookup::IdNumber(&number), mode)
            .await?;
        Ok(unique.then_some(number))
    }

    async fn groups(&mut self, value: Option<Value>, mode: Mode) -> Result<Option<Vec<i64>>> {
        let items = match value {
            None => {
                if mode.required() {
                    self.reject(Field::Groups, Violation::Required);
                }
                return Ok(None);
            },
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.reject(Field::Groups, Violation::NotAList);
                return Ok(None);
            },
        };

        let Some(mut ids) = items.iter().map(Value::as_i64).collect::<Option<Vec<_>>>()
        else {
            self.reject(Field::Groups, Violation::Invalid);
            return Ok(None);
        };
        ids.sort_unstable();
        ids.dedup();

        let found = self.users.find_groups(&ids).await?;
        if found.len() != ids.len() {
            self.reject(Field::Groups, Violation::DoesNotExist);
            return Ok(None);
        }

        Ok(Some(ids))
    }

    /// Run every rule on `form`.
    ///
    /// Storage errors abort. Rule violations are collected into
    /// [`ServerError::Validation`](crate::error::ServerError::Validation).
    pub async fn validate(mut self, form: UserForm, mode: Mode) -> Result<Cleaned> {
        let required = mode.required();
        let first_name = self.text(Field::FirstName, form.first_name, required, NAME_MAX_LENGTH);
        let last_name = self.text(Field::LastName, form.last_name, required, NAME_MAX_LENGTH);
        let email = self.email(form.email, mode).await?;
        let phone_number = self.phone_number(form.phone_number, mode).await?;
        let id_number = self.id_number(form.id_number, mode).await?;
        let groups = self.groups(form.groups, mode).await?;

        if !self.errors.is_empty() {
            return Err(self.errors.into());
        }

        Ok(Cleaned {
            email: email.clone(),
            patch: UserPatch {
                first_name,
                last_name,
                email,
                phone_number,
                id_number,
                groups,
            },
        })
    }
}

/// Check a new password, returning it when acceptable.
///
/// Violations are reported under `key` with the `password` messages.
pub fn check_new_password(
    catalog: &ErrorCatalog,
    key: &'static str,
    value: &Text,
) -> std::result::Result<String, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let field = Field::Password;

    match value {
        Text::Missing => errors.add(key, catalog.error(field, Violation::Required)),
        Text::Invalid => errors.add(key, catalog.error(field, Violation::Invalid)),
        Text::Value(password) if password.is_empty() => {
            errors.add(key, catalog.error(field, Violation::Blank))
        },
        Text::Value(password) => {
            if password.chars().count() < PASSWORD_MIN_LENGTH {
                errors.add(key, catalog.error(field, Violation::MinLength));
            }
            let strong = password.chars().any(char::is_uppercase)
                && password.chars().any(char::is_lowercase)
                && password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace());
            if !strong {
                errors.add(key, catalog.error(field, Violation::Weak));
            }
            if errors.is_empty() {
                return Ok(password.to_owned());
            }
        },
    }

    Err(errors)
}
