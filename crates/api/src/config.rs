//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `CATALOG_URL` — base URL of the catalog service
/// - `INVENTORY_URL` — base URL of the inventory service
/// - `PAYMENT_URL` — base URL of the payment processor API
/// - `PAYMENT_SECRET_KEY` — API key for the payment processor
/// - `WEBHOOK_SECRET` — shared secret for webhook signatures
/// - `PAYMENT_SUCCESS_URL` / `PAYMENT_CANCEL_URL` — shopper redirects
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub catalog_url: String,
    pub inventory_url: String,
    pub payment_url: String,
    pub payment_secret_key: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: env_or("RUST_LOG", "info"),
            catalog_url: env_or("CATALOG_URL", "http://localhost:8001"),
            inventory_url: env_or("INVENTORY_URL", "http://localhost:8002"),
            payment_url: env_or("PAYMENT_URL", "https://api.payment.test"),
            payment_secret_key: env_or("PAYMENT_SECRET_KEY", "sk_test_dummy"),
            webhook_secret: env_or("WEBHOOK_SECRET", "whsec_dummy"),
            success_url: env_or("PAYMENT_SUCCESS_URL", "http://localhost:3000/pay/success"),
            cancel_url: env_or("PAYMENT_CANCEL_URL", "http://localhost:3000/pay/cancel"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            catalog_url: "http://localhost:8001".to_string(),
            inventory_url: "http://localhost:8002".to_string(),
            payment_url: "https://api.payment.test".to_string(),
            payment_secret_key: "sk_test_dummy".to_string(),
            webhook_secret: "whsec_dummy".to_string(),
            success_url: "http://localhost:3000/pay/success".to_string(),
            cancel_url: "http://localhost:3000/pay/cancel".to_string(),
        }
    }
}
