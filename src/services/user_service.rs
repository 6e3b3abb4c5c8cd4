use std::sync::Arc;
use thiserror::Error;

use crate::auth::{hash_password, verify_password, PasswordError};
use crate::database::manager::DatabaseError;
use crate::database::models::{NewUser, User, UserPatch};
use crate::database::repository::UserRepository;

#[derive(Debug, Error)]
pub enum UserServiceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("user not found")]
    NotFound,

    #[error("invalid password")]
    InvalidPassword,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub struct UserService {
    repo: Arc<dyn UserRepository>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, bcrypt_cost: u32) -> Self {
        Self { repo, bcrypt_cost }
    }

    pub async fn create_user(
        &self,
        name: String,
        email: String,
        password: String,
    ) -> Result<User, UserServiceError> {
        validate_name(&name)?;
        validate_email(&email)?;
        if password.is_empty() {
            return Err(UserServiceError::Validation("password is required".to_string()));
        }

        let password_hash = hash_password(password, self.bcrypt_cost).await?;
        let user = self
            .repo
            .create(NewUser {
                name,
                email,
                password_hash,
            })
            .await?;

        tracing::info!("Created user {}", user.id);
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> Result<User, UserServiceError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(UserServiceError::NotFound)
    }

    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>, UserServiceError> {
        Ok(self.repo.list(limit, offset).await?)
    }

    pub async fn patch_user(&self, id: i64, patch: UserPatch) -> Result<User, UserServiceError> {
        if patch.is_empty() {
            return Err(UserServiceError::Validation(
                "at least one of name or email must be provided".to_string(),
            ));
        }
        if let Some(name) = patch.name.as_deref() {
            validate_name(name)?;
        }
        if let Some(email) = patch.email.as_deref() {
            validate_email(email)?;
        }

        Ok(self.repo.patch(id, patch).await?)
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), UserServiceError> {
        self.repo.delete(id).await?;
        tracing::info!("Deleted user {}", id);
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), UserServiceError> {
        Ok(self.repo.health_check().await?)
    }

    /// Check a login against the stored bcrypt hash.
    pub async fn authenticate(&self, email: &str, password: String) -> Result<User, UserServiceError> {
        let credentials = self
            .repo
            .find_credentials_by_email(email)
            .await?
            .ok_or(UserServiceError::NotFound)?;

        if !verify_password(password, credentials.password_hash).await? {
            return Err(UserServiceError::InvalidPassword);
        }
        Ok(credentials.user)
    }
}

fn validate_name(name: &str) -> Result<(), UserServiceError> {
    if name.trim().is_empty() {
        return Err(UserServiceError::Validation("name is required".to_string()));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if email.is_empty() {
        return Err(UserServiceError::Validation("email is required".to_string()));
    }

    let invalid = || UserServiceError::Validation("invalid email format".to_string());
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    match domain.split_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}
