//! Storage port for accounts.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::messages::Field;
use crate::user::{Group, User};

/// Key used to find a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Id(i64),
    Email(&'a str),
    PhoneNumber(&'a str),
    IdNumber(&'a str),
}

impl Lookup<'_> {
    /// Column holding the looked up value.
    pub fn column(&self) -> &'static str {
        match self {
            Lookup::Id(_) => "id",
            Lookup::Email(_) => "email",
            Lookup::PhoneNumber(_) => "phone_number",
            Lookup::IdNumber(_) => "id_number",
        }
    }

    /// Field reported when the value is already taken.
    pub fn field(&self) -> Option<Field> {
        match self {
            Lookup::Id(_) => None,
            Lookup::Email(_) => Some(Field::Email),
            Lookup::PhoneNumber(_) => Some(Field::PhoneNumber),
            Lookup::IdNumber(_) => Some(Field::IdNumber),
        }
    }
}

/// Port for user persistence operations.
///
/// Implementations must reject a second user holding the same email, phone
/// number or ID number with [`ServerError::Duplicate`].
///
/// [`ServerError::Duplicate`]: crate::error::ServerError::Duplicate
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user and its group memberships, returning the stored row.
    async fn insert(&self, user: &User) -> Result<User>;

    /// Find a user, groups included.
    async fn find_by(&self, lookup: Lookup<'_>) -> Result<Option<User>>;

    /// Check whether a user other than `exclude` matches.
    async fn exists_by(
        &self,
        lookup: Lookup<'_>,
        exclude: Option<i64>,
    ) -> Result<bool>;

    /// Every user, ordered by ID.
    async fn list(&self) -> Result<Vec<User>>;

    /// Write back every column and replace group memberships.
    ///
    /// `updated_at` is refreshed.
    async fn save(&self, user: &User) -> Result<User>;

    /// Stamp `last_login` with the current time, leaving other columns as
    /// they are. Returns `false` if nothing matched.
    async fn record_login(&self, user_id: i64) -> Result<bool>;

    /// Replace the password hash and `should_set_password` only.
    /// Returns `false` if nothing matched.
    async fn set_password(
        &self,
        user_id: i64,
        hash: &str,
        should_set_password: bool,
    ) -> Result<bool>;

    /// Permanently delete a user. Returns `false` if nothing matched.
    async fn delete(&self, user_id: i64) -> Result<bool>;

    /// Groups matching the given IDs. Unknown IDs are ignored.
    async fn find_groups(&self, ids: &[i64]) -> Result<Vec<Group>>;

    /// Permissions granted to a user directly or through its groups.
    async fn permissions_of(&self, user_id: i64) -> Result<HashSet<String>>;

    /// Create a group, or extend an existing one with new permissions.
    async fn create_group(
        &self,
        name: &str,
        permissions: &[String],
    ) -> Result<Group>;

    /// Grant a permission directly to a user.
    async fn grant(&self, user_id: i64, permission: &str) -> Result<()>;
}
