// config.rs
use axum::http::{HeaderValue, Method};
use secrecy::SecretString;
use serde::Deserialize;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::shell::ShellOptions;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Process configuration, read from the environment (and `.env` via dotenv).
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    #[serde(default)]
    pub jwt_secret: Option<SecretString>,
    pub server_port: u16,
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
    pub auto_approve_signups: bool,
    pub ssh_strict_host_key_checking: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::load(config::Environment::default())
    }

    fn load(source: config::Environment) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .set_default("server_port", 8080)?
            .set_default("auto_approve_signups", true)?
            .set_default("ssh_strict_host_key_checking", false)?
            .add_source(source.try_parsing(true))
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        Ok(cfg)
    }

    /// The signing secret, or a fixed development value when none is configured.
    pub fn jwt_secret(&self) -> String {
        use secrecy::ExposeSecret;

        match &self.jwt_secret {
            Some(secret) if !secret.expose_secret().is_empty() => {
                secret.expose_secret().clone()
            }
            _ => {
                tracing::warn!("JWT_SECRET is not set; using the development default");
                DEV_JWT_SECRET.to_string()
            }
        }
    }

    pub fn shell_options(&self) -> ShellOptions {
        ShellOptions {
            strict_host_key_checking: self.ssh_strict_host_key_checking,
        }
    }

    /// Allow list when origins are configured, otherwise the request origin is echoed.
    pub fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        let allow_origin = if origins.is_empty() {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::load(config::Environment::default().source(Some(map)))
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[("DATABASE_URL", "postgres://localhost/cmdb")]).unwrap();
        assert_eq!(cfg.database_url, "postgres://localhost/cmdb");
        assert_eq!(cfg.server_port, 8080);
        assert!(cfg.auto_approve_signups);
        assert!(!cfg.ssh_strict_host_key_checking);
        assert!(cfg.cors_allowed_origins.is_none());
        assert_eq!(cfg.jwt_secret(), DEV_JWT_SECRET);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = load(&[
            ("DATABASE_URL", "postgres://db/cmdb"),
            ("JWT_SECRET", "s3cret"),
            ("SERVER_PORT", "9090"),
            ("AUTO_APPROVE_SIGNUPS", "false"),
            ("SSH_STRICT_HOST_KEY_CHECKING", "true"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();

        assert_eq!(cfg.server_port, 9090);
        assert!(!cfg.auto_approve_signups);
        assert!(cfg.shell_options().strict_host_key_checking);
        assert_eq!(cfg.jwt_secret(), "s3cret");
        assert_eq!(
            cfg.cors_allowed_origins.as_deref(),
            Some("https://a.example, https://b.example")
        );
    }

    #[test]
    fn database_url_is_required() {
        assert!(load(&[("SERVER_PORT", "8080")]).is_err());
    }
}
