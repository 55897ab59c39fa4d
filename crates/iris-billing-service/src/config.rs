//! Service configuration.

use std::path::Path;

use serde::Deserialize;

use iris_billing_core::{PriceKey, PriceMap};

use crate::stripe::{StripeClient, DEFAULT_TOLERANCE_SECONDS};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection string. Without one the service keeps its
    /// state in memory.
    pub database_url: Option<String>,

    /// Stripe secret API key.
    pub stripe_secret_key: Option<String>,

    /// Stripe webhook signing secret.
    pub stripe_webhook_secret: Option<String>,

    /// Stripe API base URL (default: the public API).
    pub stripe_api_base: String,

    /// Maximum age of a webhook's signed timestamp, in seconds. Zero
    /// disables the check.
    pub webhook_tolerance_seconds: i64,

    /// Stripe price id for Pro, monthly.
    pub monthly_price_id: Option<String>,

    /// Stripe price id for Pro, yearly.
    pub yearly_price_id: Option<String>,

    /// Stripe price id for Practitioner, monthly.
    pub practitioner_monthly_price_id: Option<String>,

    /// Stripe price id for Practitioner, yearly.
    pub practitioner_yearly_price_id: Option<String>,

    /// HS256 secret of the identity provider's access tokens.
    pub auth_jwt_secret: Option<String>,

    /// Expected JWT audience (default: "authenticated").
    pub auth_audience: String,

    /// Service API key for the signup hook.
    pub service_api_key: Option<String>,

    /// Frontend URL for checkout redirects.
    pub frontend_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    #[serde(alias = "api_key")]
    secret_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // Try to load Stripe secrets from file first, then fall back to env vars
        let (stripe_secret_key, stripe_webhook_secret) = load_stripe_secrets();

        Self {
            listen_addr: env_or("LISTEN_ADDR", defaults.listen_addr),
            database_url: env_opt("DATABASE_URL"),
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_api_base: env_or("STRIPE_API_BASE", defaults.stripe_api_base),
            webhook_tolerance_seconds: env_parse(
                "WEBHOOK_TOLERANCE_SECONDS",
                defaults.webhook_tolerance_seconds,
            ),
            monthly_price_id: env_opt("STRIPE_MONTHLY_PRICE_ID"),
            yearly_price_id: env_opt("STRIPE_YEARLY_PRICE_ID"),
            practitioner_monthly_price_id: env_opt("STRIPE_PRACTITIONER_MONTHLY_PRICE_ID"),
            practitioner_yearly_price_id: env_opt("STRIPE_PRACTITIONER_YEARLY_PRICE_ID"),
            auth_jwt_secret: env_opt("AUTH_JWT_SECRET"),
            auth_audience: env_or("AUTH_AUDIENCE", defaults.auth_audience),
            service_api_key: env_opt("SERVICE_API_KEY"),
            frontend_url: env_or("FRONTEND_URL", defaults.frontend_url),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
        }
    }

    /// The configured Stripe prices, keyed by what they sell.
    #[must_use]
    pub fn price_map(&self) -> PriceMap {
        [
            (PriceKey::Monthly, &self.monthly_price_id),
            (PriceKey::Yearly, &self.yearly_price_id),
            (PriceKey::PractitionerMonthly, &self.practitioner_monthly_price_id),
            (PriceKey::PractitionerYearly, &self.practitioner_yearly_price_id),
        ]
        .into_iter()
        .fold(PriceMap::new(), |map, (key, id)| match id {
            Some(id) => map.with_price(key, id.clone()),
            None => map,
        })
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(name: &str, default: String) -> String {
    env_opt(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_opt(name).and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/stripe.json", "../.secrets/stripe.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return (Some(secrets.secret_key), secrets.webhook_secret);
        }
    }

    // Fall back to environment variables
    tracing::debug!("Stripe secrets file not found, using environment variables");
    (
        env_opt("STRIPE_SECRET_KEY"),
        env_opt("STRIPE_WEBHOOK_SECRET"),
    )
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
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: StripeClient::BASE_URL.into(),
            webhook_tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
            monthly_price_id: None,
            yearly_price_id: None,
            practitioner_monthly_price_id: None,
            practitioner_yearly_price_id: None,
            auth_jwt_secret: None,
            auth_audience: "authenticated".into(),
            service_api_key: None,
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_map_skips_unset_prices() {
        let config = ServiceConfig {
            monthly_price_id: Some("price_m".into()),
            practitioner_yearly_price_id: Some("price_py".into()),
            ..ServiceConfig::default()
        };

        let prices = config.price_map();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices.price_id(PriceKey::Monthly), Some("price_m"));
        assert_eq!(prices.price_id(PriceKey::Yearly), None);
        assert_eq!(
            prices.plan_for_price("price_py").map(|p| p.to_string()),
            Some("practitioner".to_string())
        );
    }

    #[test]
    fn secrets_file_accepts_either_key_name() {
        let a: StripeSecrets =
            serde_json::from_str(r#"{"secret_key":"sk_1","webhook_secret":"whsec_1"}"#).unwrap();
        let b: StripeSecrets = serde_json::from_str(r#"{"api_key":"sk_2"}"#).unwrap();
        assert_eq!(a.secret_key, "sk_1");
        assert_eq!(a.webhook_secret.as_deref(), Some("whsec_1"));
        assert_eq!(b.secret_key, "sk_2");
        assert!(b.webhook_secret.is_none());
    }
}
