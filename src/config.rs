use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub mpesa_consumer_key: String,
    pub mpesa_consumer_secret: String,
    pub mpesa_shortcode: String,
    pub mpesa_passkey: String,
    pub mpesa_base_url: String,
    pub mpesa_callback_url: String,
    // fallback payout rates used when no global_rules row exists yet
    // deliberately config-supplied rather than hardcoded so deployments can differ
    pub default_hourly_rate_cents: i64,
    pub default_beneficiary_bonus_cents: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // treating empty DATABASE_URL as unset because docker-compose was setting it to ""
        let mut database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());

        // fallback to loading .env explicitly in case working directory isn't set correctly
        if database_url.is_none() {
            let env_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
            let _ = dotenvy::from_path_override(&env_path);
            database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
        }

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            database_url: database_url.ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?,
            mpesa_consumer_key: env::var("MPESA_CONSUMER_KEY").unwrap_or_default(),
            mpesa_consumer_secret: env::var("MPESA_CONSUMER_SECRET").unwrap_or_default(),
            mpesa_shortcode: env::var("MPESA_SHORTCODE")
                .unwrap_or_else(|_| "174379".to_string()),
            mpesa_passkey: env::var("MPESA_PASSKEY").unwrap_or_default(),
            mpesa_base_url: env::var("MPESA_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.safaricom.co.ke".to_string()),
            mpesa_callback_url: env::var("MPESA_CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:8080/payments/mpesa/callback".to_string()),
            default_hourly_rate_cents: env::var("DEFAULT_HOURLY_RATE_CENTS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()?,
            default_beneficiary_bonus_cents: env::var("DEFAULT_BENEFICIARY_BONUS_CENTS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
        })
    }
}
