// In-memory stores for tests and local development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

use super::{
    new_id, ApiKeyStore, GroupStore, PermissionStore, ServerStore, SslCertificateStore, StoreError,
    StoreResult, UserStore,
};
use crate::models::{
    ApiKey, NewApiKey, NewServer, NewServerGroup, NewSslCertificate, NewUser, Server, ServerGroup,
    SslCertificate, User, UserPatch, UserRole, UserServerPermission,
};

/// All tables live behind one lock, so multi-row writes such as
/// `set_roles` are observed all-or-nothing.
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    roles: Vec<UserRole>,
    servers: HashMap<String, Server>,
    groups: HashMap<String, ServerGroup>,
    permissions: Vec<UserServerPermission>,
    certificates: HashMap<String, SslCertificate>,
    api_keys: HashMap<String, ApiKey>,
}

impl Tables {
    fn has_grant(&self, user_id: &str, server_id: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p.user_id == user_id && p.server_id == server_id)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation);
        }

        let now = Utc::now();
        let created = User {
            id: new_id(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            display_name: None,
            approved: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get(&self, id: &str) -> StoreResult<User> {
        self.tables
            .read()
            .await
            .users
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.tables.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn update(&self, id: &str, patch: UserPatch) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(id).ok_or(StoreError::NotFound)?;
        if let Some(display_name) = patch.display_name {
            user.display_name = Some(display_name);
        }
        if let Some(approved) = patch.approved {
            user.approved = approved;
        }
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn roles(&self, user_id: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .tables
            .read()
            .await
            .roles
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.role.clone())
            .collect())
    }

    async fn set_roles(&self, user_id: &str, roles: &[String]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.roles.retain(|r| r.user_id != user_id);
        let now = Utc::now();
        tables.roles.extend(roles.iter().map(|role| UserRole {
            id: new_id(),
            user_id: user_id.to_string(),
            role: role.clone(),
            created_at: now,
        }));
        Ok(())
    }

    async fn has_role(&self, user_id: &str, role: &str) -> StoreResult<bool> {
        Ok(self
            .tables
            .read()
            .await
            .roles
            .iter()
            .any(|r| r.user_id == user_id && r.role == role))
    }
}

#[async_trait]
impl ServerStore for MemoryStore {
    async fn create(&self, server: NewServer) -> StoreResult<Server> {
        let now = Utc::now();
        let created = Server {
            id: new_id(),
            hostname: server.hostname,
            ip_address: server.ip_address,
            ssh_port: server.ssh_port,
            ssh_username: server.ssh_username,
            ssh_key_path: server.ssh_key_path,
            prometheus_url: server.prometheus_url,
            status: server.status,
            group_id: server.group_id,
            tags: server.tags,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .servers
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get(&self, id: &str) -> StoreResult<Server> {
        self.tables
            .read()
            .await
            .servers
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, user_id: &str, is_admin: bool) -> StoreResult<Vec<Server>> {
        let tables = self.tables.read().await;
        let mut servers: Vec<Server> = tables
            .servers
            .values()
            .filter(|s| is_admin || tables.has_grant(user_id, &s.id))
            .cloned()
            .collect();
        servers.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(servers)
    }

    async fn update(&self, id: &str, server: NewServer) -> StoreResult<Server> {
        let mut tables = self.tables.write().await;
        let existing = tables.servers.get_mut(id).ok_or(StoreError::NotFound)?;
        existing.hostname = server.hostname;
        existing.ip_address = server.ip_address;
        existing.ssh_port = server.ssh_port;
        existing.ssh_username = server.ssh_username;
        existing.ssh_key_path = server.ssh_key_path;
        existing.prometheus_url = server.prometheus_url;
        existing.status = server.status;
        existing.group_id = server.group_id;
        existing.tags = server.tags;
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.servers.remove(id).ok_or(StoreError::NotFound)?;
        // Mirrors ON DELETE CASCADE in the schema.
        tables.permissions.retain(|p| p.server_id != id);
        tables.certificates.retain(|_, c| c.server_id != id);
        Ok(())
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn create(&self, group: NewServerGroup) -> StoreResult<ServerGroup> {
        let now = Utc::now();
        let created = ServerGroup {
            id: new_id(),
            name: group.name,
            description: group.description,
            color: group.color,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .groups
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get(&self, id: &str) -> StoreResult<ServerGroup> {
        self.tables
            .read()
            .await
            .groups
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self) -> StoreResult<Vec<ServerGroup>> {
        let mut groups: Vec<ServerGroup> =
            self.tables.read().await.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn update(&self, id: &str, group: NewServerGroup) -> StoreResult<ServerGroup> {
        let mut tables = self.tables.write().await;
        let existing = tables.groups.get_mut(id).ok_or(StoreError::NotFound)?;
        existing.name = group.name;
        existing.description = group.description;
        existing.color = group.color;
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.groups.remove(id).ok_or(StoreError::NotFound)?;
        // ON DELETE SET NULL
        for server in tables.servers.values_mut() {
            if server.group_id.as_deref() == Some(id) {
                server.group_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn grant(&self, user_id: &str, server_id: &str) -> StoreResult<UserServerPermission> {
        let grant = UserServerPermission {
            id: new_id(),
            user_id: user_id.to_string(),
            server_id: server_id.to_string(),
            created_at: Utc::now(),
        };
        self.tables.write().await.permissions.push(grant.clone());
        Ok(grant)
    }

    async fn list(&self) -> StoreResult<Vec<UserServerPermission>> {
        let mut grants = self.tables.read().await.permissions.clone();
        grants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(grants)
    }

    async fn revoke(&self, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let before = tables.permissions.len();
        tables.permissions.retain(|p| p.id != id);
        if tables.permissions.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn has_access(&self, user_id: &str, server_id: &str) -> StoreResult<bool> {
        Ok(self.tables.read().await.has_grant(user_id, server_id))
    }
}

#[async_trait]
impl SslCertificateStore for MemoryStore {
    async fn create(&self, cert: NewSslCertificate) -> StoreResult<SslCertificate> {
        let now = Utc::now();
        let created = SslCertificate {
            id: new_id(),
            server_id: cert.server_id,
            domain: cert.domain,
            issuer: cert.issuer,
            issued_at: cert.issued_at,
            expires_at: cert.expires_at,
            status: cert.status,
            auto_renew: cert.auto_renew,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .certificates
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get(&self, id: &str) -> StoreResult<SslCertificate> {
        self.tables
            .read()
            .await
            .certificates
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, user_id: &str, is_admin: bool) -> StoreResult<Vec<SslCertificate>> {
        let tables = self.tables.read().await;
        let mut certs: Vec<SslCertificate> = tables
            .certificates
            .values()
            .filter(|c| is_admin || tables.has_grant(user_id, &c.server_id))
            .cloned()
            .collect();
        certs.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        Ok(certs)
    }

    async fn update(&self, id: &str, cert: NewSslCertificate) -> StoreResult<SslCertificate> {
        let mut tables = self.tables.write().await;
        let existing = tables.certificates.get_mut(id).ok_or(StoreError::NotFound)?;
        existing.server_id = cert.server_id;
        existing.domain = cert.domain;
        existing.issuer = cert.issuer;
        existing.issued_at = cert.issued_at;
        existing.expires_at = cert.expires_at;
        existing.status = cert.status;
        existing.auto_renew = cert.auto_renew;
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .certificates
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn create(&self, key: NewApiKey) -> StoreResult<ApiKey> {
        let mut tables = self.tables.write().await;
        if tables.api_keys.values().any(|k| k.key_hash == key.key_hash) {
            return Err(StoreError::UniqueViolation);
        }

        let created = ApiKey {
            id: new_id(),
            name: key.name,
            key_hash: key.key_hash,
            key_prefix: key.key_prefix,
            created_by: key.created_by,
            created_at: Utc::now(),
            last_used_at: None,
            expires_at: key.expires_at,
            is_active: true,
        };
        tables.api_keys.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn list(&self) -> StoreResult<Vec<ApiKey>> {
        let mut keys: Vec<ApiKey> = self.tables.read().await.api_keys.values().cloned().collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn find_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        let tables = self.tables.read().await;
        // Scan every row so timing does not depend on where a match sits.
        let mut found = None;
        for key in tables.api_keys.values() {
            if bool::from(key.key_hash.as_bytes().ct_eq(key_hash.as_bytes())) {
                found = Some(key.clone());
            }
        }
        Ok(found)
    }

    async fn set_active(&self, id: &str, active: bool) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let key = tables.api_keys.get_mut(id).ok_or(StoreError::NotFound)?;
        key.is_active = active;
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .api_keys
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let key = tables.api_keys.get_mut(id).ok_or(StoreError::NotFound)?;
        if key.last_used_at.map_or(true, |previous| previous < at) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }
}
