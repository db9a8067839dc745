// Persistence seam: one trait per entity, Postgres and in-memory backends

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::models::{
    ApiKey, NewApiKey, NewServer, NewServerGroup, NewSslCertificate, NewUser, Server, ServerGroup,
    SslCertificate, User, UserPatch, UserServerPermission,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                StoreError::UniqueViolation
            }
            _ => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> StoreResult<User>;
    async fn get(&self, id: &str) -> StoreResult<User>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Newest first.
    async fn list(&self) -> StoreResult<Vec<User>>;
    async fn update(&self, id: &str, patch: UserPatch) -> StoreResult<()>;
    async fn roles(&self, user_id: &str) -> StoreResult<Vec<String>>;
    /// Replaces the whole role set in one transaction.
    async fn set_roles(&self, user_id: &str, roles: &[String]) -> StoreResult<()>;
    async fn has_role(&self, user_id: &str, role: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn create(&self, server: NewServer) -> StoreResult<Server>;
    async fn get(&self, id: &str) -> StoreResult<Server>;
    /// Every server for admins, granted servers otherwise. Ordered by hostname.
    async fn list(&self, user_id: &str, is_admin: bool) -> StoreResult<Vec<Server>>;
    async fn update(&self, id: &str, server: NewServer) -> StoreResult<Server>;
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn create(&self, group: NewServerGroup) -> StoreResult<ServerGroup>;
    async fn get(&self, id: &str) -> StoreResult<ServerGroup>;
    async fn list(&self) -> StoreResult<Vec<ServerGroup>>;
    async fn update(&self, id: &str, group: NewServerGroup) -> StoreResult<ServerGroup>;
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn grant(&self, user_id: &str, server_id: &str) -> StoreResult<UserServerPermission>;
    async fn list(&self) -> StoreResult<Vec<UserServerPermission>>;
    async fn revoke(&self, id: &str) -> StoreResult<()>;
    async fn has_access(&self, user_id: &str, server_id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait SslCertificateStore: Send + Sync {
    async fn create(&self, cert: NewSslCertificate) -> StoreResult<SslCertificate>;
    async fn get(&self, id: &str) -> StoreResult<SslCertificate>;
    /// Every certificate for admins, certificates of granted servers otherwise.
    /// Ordered by `expires_at` ascending.
    async fn list(&self, user_id: &str, is_admin: bool) -> StoreResult<Vec<SslCertificate>>;
    async fn update(&self, id: &str, cert: NewSslCertificate) -> StoreResult<SslCertificate>;
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn create(&self, key: NewApiKey) -> StoreResult<ApiKey>;
    async fn list(&self) -> StoreResult<Vec<ApiKey>>;
    async fn find_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>>;
    async fn set_active(&self, id: &str, active: bool) -> StoreResult<()>;
    async fn delete(&self, id: &str) -> StoreResult<()>;
    async fn touch(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Handle to every entity store, shared by all requests.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub servers: Arc<dyn ServerStore>,
    pub groups: Arc<dyn GroupStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub certificates: Arc<dyn SslCertificateStore>,
    pub api_keys: Arc<dyn ApiKeyStore>,
}

impl Stores {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_backend(Arc::new(PgStore::new(pool)))
    }

    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }

    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserStore
            + ServerStore
            + GroupStore
            + PermissionStore
            + SslCertificateStore
            + ApiKeyStore
            + 'static,
    {
        Self {
            users: backend.clone(),
            servers: backend.clone(),
            groups: backend.clone(),
            permissions: backend.clone(),
            certificates: backend.clone(),
            api_keys: backend,
        }
    }
}
