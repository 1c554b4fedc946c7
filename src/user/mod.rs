mod postgres;
mod repository;
mod service;
pub mod validation;

#[cfg(test)]
pub(crate) mod memory;

pub use postgres::*;
pub use repository::*;
pub use service::*;
#[cfg(test)]
pub(crate) use service::test_service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User as saved on database.
///
/// Serializing a [`User`] yields its public projection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub phone_number: Option<String>,
    pub id_number: Option<String>,
    pub profile_picture: Option<String>,
    /// Argon2id PHC string, `None` when unusable.
    #[serde(skip)]
    pub password: Option<String>,
    #[serde(skip)]
    pub should_set_password: bool,
    pub is_active: bool,
    pub is_staff: bool,
    #[serde(skip)]
    pub is_admin: bool,
    pub is_superuser: bool,
    #[serde(skip)]
    pub last_login: Option<DateTime<Utc>>,
    #[sqlx(json)]
    pub groups: Vec<Group>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether a password was ever set.
    pub fn has_usable_password(&self) -> bool {
        self.password.is_some()
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.email)
    }
}

/// Named bucket of permissions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

/// Personal information accepted on creation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub id_number: Option<String>,
    pub groups: Vec<i64>,
}

/// Partial update, `None` leaves the value untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub id_number: Option<String>,
    pub groups: Option<Vec<i64>>,
}
