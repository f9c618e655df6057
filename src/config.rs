use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::domain::order::ShippingPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
    pub timeout: Duration,
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Externally reachable origin used to build gateway redirect URLs.
    pub public_base_url: String,
    pub currency: String,
    pub shipping: ShippingPolicy,
    pub guest_token_ttl: chrono::Duration,
    pub admin_email: String,
    pub stripe: StripeSettings,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn optional<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        _ => Ok(None),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let shipping_fee: i64 = parsed("SHIPPING_FEE", 500)?;
        let free_shipping_threshold: Option<i64> = optional("FREE_SHIPPING_THRESHOLD")?;
        if shipping_fee < 0 {
            return Err(ConfigError::Invalid {
                name: "SHIPPING_FEE",
                value: shipping_fee.to_string(),
            });
        }

        let currency = env::var("CURRENCY")
            .unwrap_or_else(|_| "jpy".to_string())
            .to_lowercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid {
                name: "CURRENCY",
                value: currency,
            });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed("PORT", 8080)?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            currency,
            shipping: ShippingPolicy {
                flat_fee: shipping_fee,
                free_threshold: free_shipping_threshold,
            },
            guest_token_ttl: chrono::Duration::days(parsed("GUEST_TOKEN_TTL_DAYS", 7)?),
            admin_email: env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@localhost".to_string()),
            stripe: StripeSettings {
                secret_key: required("STRIPE_SECRET_KEY")?,
                webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
                api_base: env::var("STRIPE_API_BASE")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                timeout: Duration::from_secs(parsed("GATEWAY_TIMEOUT_SECS", 15)?),
                webhook_tolerance_secs: parsed("WEBHOOK_TOLERANCE_SECS", 300)?,
            },
        })
    }

    /// Success redirect for a store order. The gateway substitutes the
    /// session id placeholder itself.
    pub fn order_success_url(&self, order_id: uuid::Uuid) -> String {
        format!(
            "{}/store/complete.php?order_id={}&session_id={{CHECKOUT_SESSION_ID}}",
            self.public_base_url, order_id
        )
    }

    pub fn order_cancel_url(&self) -> String {
        format!("{}/store/cart", self.public_base_url)
    }

    pub fn service_success_url(&self, transaction_id: uuid::Uuid) -> String {
        format!(
            "{}/services/payment/complete?transaction_id={}&session_id={{CHECKOUT_SESSION_ID}}",
            self.public_base_url, transaction_id
        )
    }

    pub fn service_cancel_url(&self, transaction_id: uuid::Uuid) -> String {
        format!(
            "{}/services/transactions/{}",
            self.public_base_url, transaction_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            database_url: "postgres://localhost/test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_base_url: "https://shop.example".to_string(),
            currency: "jpy".to_string(),
            shipping: ShippingPolicy {
                flat_fee: 500,
                free_threshold: Some(5000),
            },
            guest_token_ttl: chrono::Duration::days(7),
            admin_email: "ops@example.com".to_string(),
            stripe: StripeSettings {
                secret_key: "sk_test".to_string(),
                webhook_secret: "whsec_test".to_string(),
                api_base: "https://api.stripe.com".to_string(),
                timeout: Duration::from_secs(15),
                webhook_tolerance_secs: 300,
            },
        }
    }

    #[test]
    fn success_url_keeps_session_placeholder() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            settings().order_success_url(id),
            format!(
                "https://shop.example/store/complete.php?order_id={}&session_id={{CHECKOUT_SESSION_ID}}",
                id
            )
        );
    }

    #[test]
    fn missing_error_names_variable() {
        assert_eq!(
            ConfigError::Missing("DATABASE_URL").to_string(),
            "DATABASE_URL must be set"
        );
    }
}
