use std::collections::HashSet;
use std::sync::Arc;

use validator::{ValidateEmail, ValidationErrors};

use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::messages::{ErrorCatalog, Field, Violation};
use crate::user::{Group, Lookup, Profile, User, UserPatch, UserRepository};

/// User manager.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    pwd: Arc<PasswordManager>,
    catalog: Arc<ErrorCatalog>,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(
        repo: Arc<dyn UserRepository>,
        pwd: Arc<PasswordManager>,
        catalog: Arc<ErrorCatalog>,
    ) -> Self {
        Self { repo, pwd, catalog }
    }

    async fn groups(&self, ids: &[i64]) -> Result<Vec<Group>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.repo.find_groups(ids).await
    }

    async fn fetch(&self, user_id: i64) -> Result<User> {
        self.repo
            .find_by(Lookup::Id(user_id))
            .await?
            .ok_or(ServerError::NotFound)
    }

    /// Report a taken unique value the way validation does.
    fn duplicate(&self, err: ServerError) -> ServerError {
        match err {
            ServerError::Duplicate(field) => {
                let mut errors = ValidationErrors::new();
                errors.add(field.as_str(), self.catalog.error(field, Violation::Unique));
                ServerError::Validation(errors)
            },
            err => err,
        }
    }

    /// Create an active user without any role.
    ///
    /// Without `password`, the account has an unusable password.
    pub async fn create_user(
        &self,
        email: &str,
        password: Option<&str>,
        profile: Profile,
    ) -> Result<User> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(ServerError::InvalidInput(
                self.catalog.message(Field::Email, Violation::Required).to_owned(),
            ));
        }
        if !email.validate_email() {
            return Err(ServerError::InvalidInput(
                self.catalog.message(Field::Email, Violation::Invalid).to_owned(),
            ));
        }

        let password = password
            .map(|password| self.pwd.hash_password(password))
            .transpose()?;

        let user = User {
            email,
            first_name: profile.first_name,
            last_name: profile.last_name,
            phone_number: profile.phone_number,
            id_number: profile.id_number,
            password,
            is_active: true,
            groups: self.groups(&profile.groups).await?,
            ..Default::default()
        };

        let user = self.repo.insert(&user).await.map_err(|err| self.duplicate(err))?;
        tracing::info!(user_id = user.id, "user created");

        Ok(user)
    }

    /// Create a user holding every role flag.
    pub async fn create_superuser(
        &self,
        email: &str,
        password: Option<&str>,
        profile: Profile,
    ) -> Result<User> {
        let mut user = self.create_user(email, password, profile).await?;
        user.is_active = true;
        user.is_staff = true;
        user.is_admin = true;
        user.is_superuser = true;

        self.repo.save(&user).await
    }

    /// Find a user. Email lookups ignore case.
    pub async fn find_by(&self, lookup: Lookup<'_>) -> Result<Option<User>> {
        match lookup {
            Lookup::Email(email) => {
                let email = email.trim().to_lowercase();
                self.repo.find_by(Lookup::Email(&email)).await
            },
            lookup => self.repo.find_by(lookup).await,
        }
    }

    /// Check whether another user than `exclude` matches.
    pub async fn exists_by(
        &self,
        lookup: Lookup<'_>,
        exclude: Option<i64>,
    ) -> Result<bool> {
        match lookup {
            Lookup::Email(email) => {
                let email = email.trim().to_lowercase();
                self.repo.exists_by(Lookup::Email(&email), exclude).await
            },
            lookup => self.repo.exists_by(lookup, exclude).await,
        }
    }

    /// Write back a user as is.
    pub async fn save(&self, user: &User) -> Result<User> {
        self.repo.save(user).await.map_err(|err| self.duplicate(err))
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        self.repo.list().await
    }

    /// Groups matching the given IDs.
    pub async fn find_groups(&self, ids: &[i64]) -> Result<Vec<Group>> {
        self.groups(ids).await
    }

    /// Apply a partial update.
    pub async fn update(&self, user_id: i64, patch: UserPatch) -> Result<User> {
        let mut user = self.fetch(user_id).await?;

        if let Some(first_name) = patch.first_name {
            user.first_name = Some(first_name);
        }
        if let Some(last_name) = patch.last_name {
            user.last_name = Some(last_name);
        }
        if let Some(email) = patch.email {
            user.email = email.to_lowercase();
        }
        if let Some(phone_number) = patch.phone_number {
            user.phone_number = Some(phone_number);
        }
        if let Some(id_number) = patch.id_number {
            user.id_number = Some(id_number);
        }
        if let Some(groups) = patch.groups {
            user.groups = self.groups(&groups).await?;
        }

        let user = self.repo.save(&user).await.map_err(|err| self.duplicate(err))?;
        tracing::info!(user_id, "user updated");

        Ok(user)
    }

    /// Permanently delete a user.
    pub async fn delete(&self, user_id: i64) -> Result<()> {
        if !self.repo.delete(user_id).await? {
            return Err(ServerError::NotFound);
        }
        tracing::info!(user_id, "user deleted");

        Ok(())
    }

    /// Replace the password of a user. Other columns are left untouched.
    pub async fn set_password(
        &self,
        user_id: i64,
        password: &str,
        should_set_password: bool,
    ) -> Result<User> {
        let hash = self.pwd.hash_password(password)?;
        if !self
            .repo
            .set_password(user_id, &hash, should_set_password)
            .await?
        {
            return Err(ServerError::NotFound);
        }

        self.fetch(user_id).await
    }

    /// Check a password against the stored hash.
    pub fn check_password(&self, user: &User, password: &str) -> bool {
        user.password
            .as_deref()
            .is_some_and(|hash| self.pwd.verify_password(password, hash))
    }

    /// Find the active user owning these credentials.
    ///
    /// Every failure is reported the same way. A password is hashed even
    /// when no account can match it.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        match self.find_by(Lookup::Email(email)).await? {
            Some(user) if user.has_usable_password() => {
                if self.check_password(&user, password) && user.is_active {
                    return Ok(user);
                }
            },
            _ => self.pwd.verify_dummy(password),
        }

        Err(ServerError::InvalidCredentials)
    }

    /// Stamp the current time as last login.
    pub async fn record_login(&self, user_id: i64) -> Result<User> {
        if !self.repo.record_login(user_id).await? {
            return Err(ServerError::NotFound);
        }

        self.fetch(user_id).await
    }

    /// Permissions held directly or through groups.
    pub async fn permissions(&self, user: &User) -> Result<HashSet<String>> {
        self.repo.permissions_of(user.id).await
    }

    /// Create a group, or add permissions to an existing one.
    pub async fn create_group(
        &self,
        name: &str,
        permissions: &[String],
    ) -> Result<Group> {
        self.repo.create_group(name, permissions).await
    }

    /// Grant a permission directly to a user.
    pub async fn grant(&self, user: &User, permission: &str) -> Result<()> {
        self.repo.grant(user.id, permission).await
    }
}

#[cfg(test)]
pub(crate) fn test_service() -> UserService {
    UserService::new(
        Arc::new(crate::user::memory::MemoryUserRepository::default()),
        Arc::new(PasswordManager::new(Some(crate::crypto::test_config())).unwrap()),
        Arc::new(ErrorCatalog::default()),
    )
}
