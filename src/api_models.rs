// API request and response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{
    ApiKey, NewServer, NewServerGroup, NewSslCertificate, User, DEFAULT_CERTIFICATE_STATUS,
    DEFAULT_GROUP_COLOR, DEFAULT_SERVER_STATUS, DEFAULT_SSH_PORT,
};

lazy_static! {
    static ref HEX_COLOR_REGEX: Regex = Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap();
}

pub fn is_hex_color(value: &str) -> bool {
    HEX_COLOR_REGEX.is_match(value)
}

// User signup request; username falls back to the email
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    pub username: Option<String>,
}

// User login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

// User response; the password hash has no field here
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            approved: user.approved,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user: UserResponse,
    /// Absent while the account waits for approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub token: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UserWithRolesResponse {
    pub user: UserResponse,
    pub roles: Vec<String>,
}

// Row of the admin user listing
#[derive(Debug, Serialize)]
pub struct UserListItem {
    #[serde(flatten)]
    pub user: UserResponse,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub approved: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SetRolesRequest {
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// Server create/replace request
#[derive(Debug, Deserialize, Validate)]
pub struct ServerRequest {
    #[validate(length(min = 1))]
    pub hostname: String,
    #[validate(length(min = 1))]
    pub ip_address: String,
    pub ssh_port: Option<i32>,
    pub ssh_username: Option<String>,
    pub ssh_key_path: Option<String>,
    pub prometheus_url: Option<String>,
    pub status: Option<String>,
    pub group_id: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ServerRequest {
    pub fn into_new_server(self) -> NewServer {
        NewServer {
            hostname: self.hostname,
            ip_address: self.ip_address,
            ssh_port: self.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
            ssh_username: self.ssh_username.filter(|s| !s.is_empty()),
            ssh_key_path: self.ssh_key_path.filter(|s| !s.is_empty()),
            prometheus_url: self.prometheus_url.filter(|s| !s.is_empty()),
            status: self
                .status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SERVER_STATUS.to_string()),
            group_id: self.group_id.filter(|s| !s.is_empty()),
            tags: self.tags.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct GroupRequest {
    #[validate(length(min = 1))]
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl GroupRequest {
    /// Fills the default color; `None` when a supplied color is not `#rrggbb`.
    pub fn into_new_group(self) -> Option<NewServerGroup> {
        let color = match self.color.filter(|c| !c.is_empty()) {
            Some(color) if is_hex_color(&color) => color,
            Some(_) => return None,
            None => DEFAULT_GROUP_COLOR.to_string(),
        };

        Some(NewServerGroup {
            name: self.name,
            description: self.description,
            color,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct GrantRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub server_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SslCertificateRequest {
    #[validate(length(min = 1))]
    pub server_id: String,
    #[validate(length(min = 1))]
    pub domain: String,
    pub issuer: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: Option<String>,
    #[serde(default)]
    pub auto_renew: bool,
}

impl SslCertificateRequest {
    pub fn into_new_certificate(self) -> NewSslCertificate {
        NewSslCertificate {
            server_id: self.server_id,
            domain: self.domain,
            issuer: self.issuer,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            status: self
                .status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_CERTIFICATE_STATUS.to_string()),
            auto_renew: self.auto_renew,
        }
    }
}

// API key creation request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1))]
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApiKeyStatusRequest {
    #[validate(length(min = 1))]
    pub id: String,
    pub active: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApiKeyIdRequest {
    #[validate(length(min = 1))]
    pub id: String,
}

// API key response; the hash is never exposed
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub id: String,
    pub name: String,
    pub key_prefix: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            key_prefix: key.key_prefix,
            created_by: key.created_by,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            expires_at: key.expires_at,
            is_active: key.is_active,
        }
    }
}

// Returned once at creation; the raw key is not retrievable afterwards
#[derive(Debug, Serialize)]
pub struct CreatedApiKeyResponse {
    pub key: String,
    pub key_prefix: String,
    pub record: ApiKeyResponse,
}

#[derive(Debug, Deserialize)]
pub struct SendAlertsRequest {
    #[serde(default)]
    pub alertmanager_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ShellQuery {
    pub token: Option<String>,
}
