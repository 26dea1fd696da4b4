//! Service configuration.

use serde::Deserialize;
use std::path::Path;

use teleconsult_core::ConsultError;

/// Default payment-processor API base URL.
pub const DEFAULT_MP_API_BASE_URL: &str = "https://api.mercadopago.com";

/// Default payment-processor authorization base URL.
pub const DEFAULT_MP_AUTH_BASE_URL: &str = "https://auth.mercadopago.com";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection string. In-memory storage when absent.
    pub database_url: Option<String>,

    /// HS256 secret used to validate user JWTs.
    pub auth_jwt_secret: Option<String>,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// OAuth client id of the platform application.
    pub mp_client_id: Option<String>,

    /// OAuth client secret of the platform application.
    pub mp_client_secret: Option<String>,

    /// Server-side access token used to look up payments.
    pub mp_access_token: Option<String>,

    /// Platform account access token used to create preferences.
    pub mp_platform_access_token: Option<String>,

    /// Platform public key returned to clients for checkout rendering.
    pub mp_platform_public_key: Option<String>,

    /// Secret for webhook signature verification (optional).
    pub mp_webhook_secret: Option<String>,

    /// Processor API base URL.
    pub mp_api_base_url: String,

    /// Processor authorization base URL.
    pub mp_auth_base_url: String,

    /// Frontend URL for payment return pages.
    pub frontend_url: String,

    /// Public URL of this service, used for the webhook callback.
    pub public_base_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Per-subscriber buffer of the change feed.
    pub feed_capacity: usize,
}

/// Processor secrets file structure.
#[derive(Debug, Default, Deserialize)]
struct MercadoPagoSecrets {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    platform_access_token: Option<String>,
    #[serde(default)]
    platform_public_key: Option<String>,
    #[serde(default)]
    webhook_secret: Option<String>,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        // Secrets file values win over environment variables
        let secrets = load_mercadopago_secrets();

        let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());

        Self {
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            listen_addr,
            database_url: env_opt("DATABASE_URL"),
            auth_jwt_secret: env_opt("AUTH_JWT_SECRET"),
            admin_api_key: env_opt("ADMIN_API_KEY"),
            mp_client_id: secrets.client_id.or_else(|| env_opt("MP_CLIENT_ID")),
            mp_client_secret: secrets.client_secret.or_else(|| env_opt("MP_CLIENT_SECRET")),
            mp_access_token: secrets.access_token.or_else(|| env_opt("MP_ACCESS_TOKEN")),
            mp_platform_access_token: secrets
                .platform_access_token
                .or_else(|| env_opt("MP_PLATFORM_ACCESS_TOKEN")),
            mp_platform_public_key: secrets
                .platform_public_key
                .or_else(|| env_opt("MP_PLATFORM_PUBLIC_KEY")),
            mp_webhook_secret: secrets.webhook_secret.or_else(|| env_opt("MP_WEBHOOK_SECRET")),
            mp_api_base_url: std::env::var("MP_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MP_API_BASE_URL.into()),
            mp_auth_base_url: std::env::var("MP_AUTH_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MP_AUTH_BASE_URL.into()),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", 1024 * 1024), // 1MB
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS", 30),
            feed_capacity: env_parse("FEED_CAPACITY", 256),
        }
    }

    /// OAuth client id and secret.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredentialsConfiguration` if either is absent.
    pub fn oauth_credentials(&self) -> Result<(&str, &str), ConsultError> {
        let client_id = required(self.mp_client_id.as_deref(), "MP_CLIENT_ID")?;
        let client_secret = required(self.mp_client_secret.as_deref(), "MP_CLIENT_SECRET")?;
        Ok((client_id, client_secret))
    }

    /// Platform access token and public key for preference creation.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredentialsConfiguration` if either is absent.
    pub fn platform_credentials(&self) -> Result<(&str, &str), ConsultError> {
        let token = required(
            self.mp_platform_access_token.as_deref(),
            "MP_PLATFORM_ACCESS_TOKEN",
        )?;
        let public_key = required(
            self.mp_platform_public_key.as_deref(),
            "MP_PLATFORM_PUBLIC_KEY",
        )?;
        Ok((token, public_key))
    }

    /// Trusted server-side token for payment lookups.
    ///
    /// Falls back to the platform token when no dedicated token is set.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredentialsConfiguration` if neither is set.
    pub fn service_access_token(&self) -> Result<&str, ConsultError> {
        required(
            self.mp_access_token
                .as_deref()
                .or(self.mp_platform_access_token.as_deref()),
            "MP_ACCESS_TOKEN",
        )
    }

    /// Webhook callback URL given to the processor.
    #[must_use]
    pub fn notification_url(&self) -> String {
        format!(
            "{}/webhooks/payments",
            self.public_base_url.trim_end_matches('/')
        )
    }

    /// Return URL for a checkout outcome (`success`, `failure`, `pending`).
    #[must_use]
    pub fn return_url(&self, outcome: &str, consultation_id: &str) -> String {
        format!(
            "{}/payment/{outcome}?consultation_id={consultation_id}",
            self.frontend_url.trim_end_matches('/')
        )
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ConsultError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConsultError::MissingCredentialsConfiguration(name.to_string()))
}

/// Load processor secrets from file, if present.
fn load_mercadopago_secrets() -> MercadoPagoSecrets {
    let secret_paths = [
        ".secrets/mercadopago.json",
        "crates/teleconsult-service/.secrets/mercadopago.json",
        "../.secrets/mercadopago.json",
    ];

    for path in &secret_paths {
        match load_secrets_file::<MercadoPagoSecrets>(path) {
            Ok(secrets) => {
                tracing::info!(path = %path, "Loaded payment processor secrets from file");
                return secrets;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path, error = %e, "Ignoring unreadable secrets file"),
        }
    }

    tracing::debug!("Secrets file not found, using environment variables");
    MercadoPagoSecrets::default()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            auth_jwt_secret: None,
            admin_api_key: None,
            mp_client_id: None,
            mp_client_secret: None,
            mp_access_token: None,
            mp_platform_access_token: None,
            mp_platform_public_key: None,
            mp_webhook_secret: None,
            mp_api_base_url: DEFAULT_MP_API_BASE_URL.into(),
            mp_auth_base_url: DEFAULT_MP_AUTH_BASE_URL.into(),
            frontend_url: "http://localhost:3000".into(),
            public_base_url: "http://localhost:8080".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            feed_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_oauth_secret_is_misconfiguration() {
        let config = ServiceConfig {
            mp_client_id: Some("123".into()),
            ..ServiceConfig::default()
        };
        let err = config.oauth_credentials().unwrap_err();
        assert_eq!(err.code(), "missing_credentials_configuration");
    }

    #[test]
    fn service_token_falls_back_to_platform() {
        let config = ServiceConfig {
            mp_platform_access_token: Some("APP_USR-platform".into()),
            ..ServiceConfig::default()
        };
        assert_eq!(config.service_access_token().unwrap(), "APP_USR-platform");
    }

    #[test]
    fn urls_are_built_from_bases() {
        let config = ServiceConfig {
            frontend_url: "https://app.example.com/".into(),
            public_base_url: "https://api.example.com".into(),
            ..ServiceConfig::default()
        };
        assert_eq!(
            config.notification_url(),
            "https://api.example.com/webhooks/payments"
        );
        assert_eq!(
            config.return_url("success", "abc"),
            "https://app.example.com/payment/success?consultation_id=abc"
        );
    }
}
