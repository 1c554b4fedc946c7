//! In-memory [`UserRepository`] for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Result, ServerError};
use crate::messages::Field;
use crate::user::{Group, Lookup, User, UserRepository};

#[derive(Default)]
struct Store {
    users: BTreeMap<i64, User>,
    groups: BTreeMap<i64, Group>,
    group_permissions: HashMap<i64, HashSet<String>>,
    user_permissions: HashMap<i64, HashSet<String>>,
    next_user: i64,
    next_group: i64,
}

impl Store {
    fn matches(user: &User, lookup: &Lookup<'_>) -> bool {
        match lookup {
            Lookup::Id(id) => user.id == *id,
            Lookup::Email(email) => user.email == *email,
            Lookup::PhoneNumber(phone) => user.phone_number.as_deref() == Some(*phone),
            Lookup::IdNumber(number) => user.id_number.as_deref() == Some(*number),
        }
    }

    /// Mirror the unique indexes of the `users` table.
    fn check_unique(&self, user: &User) -> Result<()> {
        let lookups = [
            Some(Lookup::Email(&user.email)),
            user.phone_number.as_deref().map(Lookup::PhoneNumber),
            user.id_number.as_deref().map(Lookup::IdNumber),
        ];

        for lookup in lookups.into_iter().flatten() {
            let taken = self
                .users
                .values()
                .any(|other| other.id != user.id && Self::matches(other, &lookup));
            if taken {
                return Err(ServerError::Duplicate(
                    lookup.field().unwrap_or(Field::Email),
                ));
            }
        }

        Ok(())
    }

    fn resolve_groups(&self, groups: &[Group]) -> Vec<Group> {
        let mut groups: Vec<Group> = groups
            .iter()
            .filter_map(|group| self.groups.get(&group.id).cloned())
            .collect();
        groups.sort_by_key(|group| group.id);
        groups.dedup();
        groups
    }
}

/// Repository keeping everything behind a mutex.
#[derive(Default)]
pub struct MemoryUserRepository {
    store: Mutex<Store>,
}

impl MemoryUserRepository {
    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn insert(&self, user: &User) -> Result<User> {
        let mut store = self.store();
        store.check_unique(&User { id: 0, ..user.clone() })?;

        store.next_user += 1;
        let now = Utc::now();
        let user = User {
            id: store.next_user,
            groups: store.resolve_groups(&user.groups),
            created_at: now,
            updated_at: now,
            ..user.clone()
        };
        store.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_by(&self, lookup: Lookup<'_>) -> Result<Option<User>> {
        Ok(self
            .store()
            .users
            .values()
            .find(|user| Store::matches(user, &lookup))
            .cloned())
    }

    async fn exists_by(
        &self,
        lookup: Lookup<'_>,
        exclude: Option<i64>,
    ) -> Result<bool> {
        Ok(self.store().users.values().any(|user| {
            Some(user.id) != exclude && Store::matches(user, &lookup)
        }))
    }

    async fn list(&self) -> Result<Vec<User>> {
        Ok(self.store().users.values().cloned().collect())
    }

    async fn save(&self, user: &User) -> Result<User> {
        let mut store = self.store();
        if !store.users.contains_key(&user.id) {
            return Err(ServerError::NotFound);
        }
        store.check_unique(user)?;

        let user = User {
            groups: store.resolve_groups(&user.groups),
            updated_at: Utc::now(),
            ..user.clone()
        };
        store.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn record_login(&self, user_id: i64) -> Result<bool> {
        Ok(self
            .store()
            .users
            .get_mut(&user_id)
            .map(|user| user.last_login = Some(Utc::now()))
            .is_some())
    }

    async fn set_password(
        &self,
        user_id: i64,
        hash: &str,
        should_set_password: bool,
    ) -> Result<bool> {
        let mut store = self.store();
        let Some(user) = store.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.password = Some(hash.to_owned());
        user.should_set_password = should_set_password;
        user.updated_at = Utc::now();

        Ok(true)
    }

    async fn delete(&self, user_id: i64) -> Result<bool> {
        let mut store = self.store();
        store.user_permissions.remove(&user_id);

        Ok(store.users.remove(&user_id).is_some())
    }

    async fn find_groups(&self, ids: &[i64]) -> Result<Vec<Group>> {
        Ok(self
            .store()
            .groups
            .values()
            .filter(|group| ids.contains(&group.id))
            .cloned()
            .collect())
    }

    async fn permissions_of(&self, user_id: i64) -> Result<HashSet<String>> {
        let store = self.store();
        let mut permissions = store
            .user_permissions
            .get(&user_id)
            .cloned()
            .unwrap_or_default();

        if let Some(user) = store.users.get(&user_id) {
            for group in &user.groups {
                if let Some(granted) = store.group_permissions.get(&group.id) {
                    permissions.extend(granted.iter().cloned());
                }
            }
        }

        Ok(permissions)
    }

    async fn create_group(
        &self,
        name: &str,
        permissions: &[String],
    ) -> Result<Group> {
        let mut store = self.store();

        let group = match store.groups.values().find(|group| group.name == name) {
            Some(group) => group.clone(),
            None => {
                store.next_group += 1;
                let group = Group {
                    id: store.next_group,
                    name: name.to_owned(),
                };
                store.groups.insert(group.id, group.clone());
                group
            },
        };
        store
            .group_permissions
            .entry(group.id)
            .or_default()
            .extend(permissions.iter().cloned());

        Ok(group)
    }

    async fn grant(&self, user_id: i64, permission: &str) -> Result<()> {
        self.store()
            .user_permissions
            .entry(user_id)
            .or_default()
            .insert(permission.to_owned());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str, phone: Option<&str>) -> User {
        User {
            email: email.to_owned(),
            phone_number: phone.map(str::to_owned),
            is_active: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unique_fields() {
        let repo = MemoryUserRepository::default();
        repo.insert(&user("a@example.com", Some("+33600000000")))
            .await
            .unwrap();

        assert!(matches!(
            repo.insert(&user("a@example.com", None)).await,
            Err(ServerError::Duplicate(Field::Email))
        ));
        assert!(matches!(
            repo.insert(&user("b@example.com", Some("+33600000000"))).await,
            Err(ServerError::Duplicate(Field::PhoneNumber))
        ));
        // Absent values never collide.
        repo.insert(&user("c@example.com", None)).await.unwrap();
        repo.insert(&user("d@example.com", None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_group_permissions() {
        let repo = MemoryUserRepository::default();
        let group = repo
            .create_group("staff", &["users.view_user".to_owned()])
            .await
            .unwrap();

        let mut created = repo.insert(&user("a@example.com", None)).await.unwrap();
        assert!(repo.permissions_of(created.id).await.unwrap().is_empty());

        created.groups = vec![group.clone()];
        let saved = repo.save(&created).await.unwrap();
        assert_eq!(saved.groups, vec![group]);

        repo.grant(created.id, "users.add_user").await.unwrap();
        let permissions = repo.permissions_of(created.id).await.unwrap();
        assert!(permissions.contains("users.view_user"));
        assert!(permissions.contains("users.add_user"));
    }
}
