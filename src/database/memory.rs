use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::database::manager::DatabaseError;
use crate::database::models::{NewUser, User, UserCredentials, UserPatch};
use crate::database::repository::{email_taken, not_found, UserRepository};

/// Process-local user store with the same semantics as the Postgres table.
/// Backs the test suite and `--in-memory` runs.
#[derive(Default)]
pub struct InMemoryUserRepository {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    rows: BTreeMap<i64, UserCredentials>,
}

impl State {
    fn email_in_use(&self, email: &str, except: Option<i64>) -> bool {
        self.rows
            .values()
            .any(|row| row.user.email == email && Some(row.user.id) != except)
    }
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, DatabaseError> {
        let mut state = self.state.write().await;
        if state.email_in_use(&user.email, None) {
            return Err(DatabaseError::Conflict(email_taken(&user.email)));
        }

        state.next_id += 1;
        let created = User {
            id: state.next_id,
            name: user.name,
            email: user.email,
            created_at: Utc::now(),
        };
        state.rows.insert(
            created.id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.rows.get(&id).map(|row| row.user.clone()))
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.rows.values().find(|row| row.user.email == email).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|row| row.user.clone())
            .collect())
    }

    async fn patch(&self, id: i64, patch: UserPatch) -> Result<User, DatabaseError> {
        let mut state = self.state.write().await;
        // A missing row is NotFound even when the email is taken
        if !state.rows.contains_key(&id) {
            return Err(not_found(id));
        }
        if let Some(email) = patch.email.as_deref() {
            if state.email_in_use(email, Some(id)) {
                return Err(DatabaseError::Conflict(email_taken(email)));
            }
        }

        let row = state.rows.get_mut(&id).ok_or_else(|| not_found(id))?;
        if let Some(name) = patch.name {
            row.user.name = name;
        }
        if let Some(email) = patch.email {
            row.user.email = email;
        }
        Ok(row.user.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        state.rows.remove(&id).map(|_| ()).ok_or_else(|| not_found(id))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
