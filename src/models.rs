// Database models for the CMDB
// These models correspond to the tables created by migrations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const ADMIN_ROLE: &str = "admin";
pub const DEFAULT_SSH_PORT: i32 = 22;
pub const DEFAULT_SERVER_STATUS: &str = "unknown";
pub const DEFAULT_GROUP_COLOR: &str = "#06b6d4";
pub const DEFAULT_CERTIFICATE_STATUS: &str = "active";

// Never serialized directly: responses go through UserResponse so the hash stays inside.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserRole {
    pub id: String,
    pub user_id: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub hostname: String,
    pub ip_address: String,
    pub ssh_port: i32,
    pub ssh_username: Option<String>,
    pub ssh_key_path: Option<String>,
    pub prometheus_url: Option<String>,
    pub status: String,
    pub group_id: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ServerGroup {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct UserServerPermission {
    pub id: String,
    pub user_id: String,
    pub server_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SslCertificate {
    pub id: String,
    pub server_id: String,
    pub domain: String,
    pub issuer: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub auto_renew: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// key_hash is SHA-256 hex of the raw key; responses use ApiKeyResponse.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl ApiKey {
    /// A key is usable while active and not past its expiry.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

// Insert payloads. Ids and timestamps are assigned by the store.

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Sparse user update: `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub display_name: Option<String>,
    pub approved: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewServer {
    pub hostname: String,
    pub ip_address: String,
    pub ssh_port: i32,
    pub ssh_username: Option<String>,
    pub ssh_key_path: Option<String>,
    pub prometheus_url: Option<String>,
    pub status: String,
    pub group_id: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewServerGroup {
    pub name: String,
    pub description: Option<String>,
    pub color: String,
}

#[derive(Debug, Clone)]
pub struct NewSslCertificate {
    pub server_id: String,
    pub domain: String,
    pub issuer: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub auto_renew: bool,
}

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub created_by: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(is_active: bool, expires_at: Option<DateTime<Utc>>) -> ApiKey {
        ApiKey {
            id: "k1".to_string(),
            name: "agent".to_string(),
            key_hash: "00".to_string(),
            key_prefix: "cmdb_abcdefg".to_string(),
            created_by: "u1".to_string(),
            created_at: Utc::now(),
            last_used_at: None,
            expires_at,
            is_active,
        }
    }

    #[test]
    fn api_key_liveness() {
        let now = Utc::now();
        assert!(key(true, None).is_usable_at(now));
        assert!(key(true, Some(now + Duration::hours(1))).is_usable_at(now));
        assert!(!key(true, Some(now)).is_usable_at(now));
        assert!(!key(true, Some(now - Duration::seconds(1))).is_usable_at(now));
        assert!(!key(false, None).is_usable_at(now));
    }
}
