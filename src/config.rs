use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub erp: ErpConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Credentials and tuning for the inbound ERP webhook surface.
///
/// This is handed to the webhook handlers as part of `AppState` so the
/// reconciliation layer never reads secrets from ambient global state.
#[derive(Clone)]
pub struct ErpConfig {
    /// Shared key expected in the `x-api-key` header of webhook calls.
    /// When unset the check is skipped (signature verification is the
    /// upstream gateway's job either way).
    pub webhook_api_key: Option<String>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8080),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgres://desk:@localhost:5432/deskserver".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },
            erp: ErpConfig {
                webhook_api_key: env::var("ERP_WEBHOOK_API_KEY").ok().filter(|k| !k.is_empty()),
            },
        })
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl std::fmt::Debug for ErpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErpConfig")
            .field("webhook_api_key", &self.webhook_api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
