// Postgres-backed stores using runtime-checked queries

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{
    new_id, ApiKeyStore, GroupStore, PermissionStore, ServerStore, SslCertificateStore, StoreError,
    StoreResult, UserStore,
};
use crate::models::{
    ApiKey, NewApiKey, NewServer, NewServerGroup, NewSslCertificate, NewUser, Server, ServerGroup,
    SslCertificate, User, UserPatch, UserServerPermission,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn expect_affected(rows: u64) -> StoreResult<()> {
    if rows == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let now = Utc::now();
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash, approved, created_at, updated_at)
            VALUES ($1, $2, $3, $4, false, $5, $5)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get(&self, id: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn update(&self, id: &str, patch: UserPatch) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET display_name = COALESCE($2, display_name),
                approved = COALESCE($3, approved),
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(patch.display_name)
        .bind(patch.approved)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        expect_affected(result.rows_affected())
    }

    async fn roles(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let roles: Vec<(String,)> =
            sqlx::query_as("SELECT role FROM user_roles WHERE user_id = $1 ORDER BY created_at")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(roles.into_iter().map(|(role,)| role).collect())
    }

    async fn set_roles(&self, user_id: &str, roles: &[String]) -> StoreResult<()> {
        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        for role in roles {
            sqlx::query(
                "INSERT INTO user_roles (id, user_id, role, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(new_id())
            .bind(user_id)
            .bind(role)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn has_role(&self, user_id: &str, role: &str) -> StoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM user_roles WHERE user_id = $1 AND role = $2)",
        )
        .bind(user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl ServerStore for PgStore {
    async fn create(&self, server: NewServer) -> StoreResult<Server> {
        let now = Utc::now();
        let created = sqlx::query_as::<_, Server>(
            r#"
            INSERT INTO servers (id, hostname, ip_address, ssh_port, ssh_username, ssh_key_path,
                                 prometheus_url, status, group_id, tags, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&server.hostname)
        .bind(&server.ip_address)
        .bind(server.ssh_port)
        .bind(&server.ssh_username)
        .bind(&server.ssh_key_path)
        .bind(&server.prometheus_url)
        .bind(&server.status)
        .bind(&server.group_id)
        .bind(&server.tags)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get(&self, id: &str) -> StoreResult<Server> {
        let server = sqlx::query_as::<_, Server>("SELECT * FROM servers WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(server)
    }

    async fn list(&self, user_id: &str, is_admin: bool) -> StoreResult<Vec<Server>> {
        let servers = if is_admin {
            sqlx::query_as::<_, Server>("SELECT * FROM servers ORDER BY hostname")
                .fetch_all(&self.pool)
                .await?
        } else {
            // EXISTS rather than a join so duplicate grants yield one row.
            sqlx::query_as::<_, Server>(
                r#"
                SELECT s.* FROM servers s
                WHERE EXISTS (
                    SELECT 1 FROM user_server_permissions p
                    WHERE p.server_id = s.id AND p.user_id = $1
                )
                ORDER BY s.hostname
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(servers)
    }

    async fn update(&self, id: &str, server: NewServer) -> StoreResult<Server> {
        let updated = sqlx::query_as::<_, Server>(
            r#"
            UPDATE servers
            SET hostname = $2, ip_address = $3, ssh_port = $4, ssh_username = $5,
                ssh_key_path = $6, prometheus_url = $7, status = $8, group_id = $9,
                tags = $10, updated_at = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&server.hostname)
        .bind(&server.ip_address)
        .bind(server.ssh_port)
        .bind(&server.ssh_username)
        .bind(&server.ssh_key_path)
        .bind(&server.prometheus_url)
        .bind(&server.status)
        .bind(&server.group_id)
        .bind(&server.tags)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM servers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_affected(result.rows_affected())
    }
}

#[async_trait]
impl GroupStore for PgStore {
    async fn create(&self, group: NewServerGroup) -> StoreResult<ServerGroup> {
        let created = sqlx::query_as::<_, ServerGroup>(
            r#"
            INSERT INTO server_groups (id, name, description, color, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&group.name)
        .bind(&group.description)
        .bind(&group.color)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get(&self, id: &str) -> StoreResult<ServerGroup> {
        let group = sqlx::query_as::<_, ServerGroup>("SELECT * FROM server_groups WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(group)
    }

    async fn list(&self) -> StoreResult<Vec<ServerGroup>> {
        let groups = sqlx::query_as::<_, ServerGroup>("SELECT * FROM server_groups ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(groups)
    }

    async fn update(&self, id: &str, group: NewServerGroup) -> StoreResult<ServerGroup> {
        let updated = sqlx::query_as::<_, ServerGroup>(
            r#"
            UPDATE server_groups
            SET name = $2, description = $3, color = $4, updated_at = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(&group.color)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM server_groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_affected(result.rows_affected())
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn grant(&self, user_id: &str, server_id: &str) -> StoreResult<UserServerPermission> {
        let grant = sqlx::query_as::<_, UserServerPermission>(
            r#"
            INSERT INTO user_server_permissions (id, user_id, server_id, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(user_id)
        .bind(server_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(grant)
    }

    async fn list(&self) -> StoreResult<Vec<UserServerPermission>> {
        let grants = sqlx::query_as::<_, UserServerPermission>(
            "SELECT * FROM user_server_permissions ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    async fn revoke(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM user_server_permissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_affected(result.rows_affected())
    }

    async fn has_access(&self, user_id: &str, server_id: &str) -> StoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM user_server_permissions WHERE user_id = $1 AND server_id = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(server_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl SslCertificateStore for PgStore {
    async fn create(&self, cert: NewSslCertificate) -> StoreResult<SslCertificate> {
        let now = Utc::now();
        let created = sqlx::query_as::<_, SslCertificate>(
            r#"
            INSERT INTO ssl_certificates (id, server_id, domain, issuer, issued_at, expires_at,
                                          status, auto_renew, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&cert.server_id)
        .bind(&cert.domain)
        .bind(&cert.issuer)
        .bind(cert.issued_at)
        .bind(cert.expires_at)
        .bind(&cert.status)
        .bind(cert.auto_renew)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get(&self, id: &str) -> StoreResult<SslCertificate> {
        let cert = sqlx::query_as::<_, SslCertificate>("SELECT * FROM ssl_certificates WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(cert)
    }

    async fn list(&self, user_id: &str, is_admin: bool) -> StoreResult<Vec<SslCertificate>> {
        let certs = if is_admin {
            sqlx::query_as::<_, SslCertificate>("SELECT * FROM ssl_certificates ORDER BY expires_at ASC")
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as::<_, SslCertificate>(
                r#"
                SELECT c.* FROM ssl_certificates c
                WHERE EXISTS (
                    SELECT 1 FROM user_server_permissions p
                    WHERE p.server_id = c.server_id AND p.user_id = $1
                )
                ORDER BY c.expires_at ASC
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(certs)
    }

    async fn update(&self, id: &str, cert: NewSslCertificate) -> StoreResult<SslCertificate> {
        let updated = sqlx::query_as::<_, SslCertificate>(
            r#"
            UPDATE ssl_certificates
            SET server_id = $2, domain = $3, issuer = $4, issued_at = $5, expires_at = $6,
                status = $7, auto_renew = $8, updated_at = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&cert.server_id)
        .bind(&cert.domain)
        .bind(&cert.issuer)
        .bind(cert.issued_at)
        .bind(cert.expires_at)
        .bind(&cert.status)
        .bind(cert.auto_renew)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM ssl_certificates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_affected(result.rows_affected())
    }
}

#[async_trait]
impl ApiKeyStore for PgStore {
    async fn create(&self, key: NewApiKey) -> StoreResult<ApiKey> {
        let created = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (id, name, key_hash, key_prefix, created_by, created_at,
                                  expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, true)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&key.name)
        .bind(&key.key_hash)
        .bind(&key.key_prefix)
        .bind(&key.created_by)
        .bind(Utc::now())
        .bind(key.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn list(&self) -> StoreResult<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }

    async fn find_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        // Unique index on key_hash; the lookup does not compare secrets byte by byte in Rust.
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_hash = $1")
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(key)
    }

    async fn set_active(&self, id: &str, active: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE api_keys SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        expect_affected(result.rows_affected())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_affected(result.rows_affected())
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "UPDATE api_keys SET last_used_at = GREATEST(COALESCE(last_used_at, $2), $2) WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
