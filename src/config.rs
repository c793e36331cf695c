use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    /// Endpoint the notification dispatcher posts to. Unset means
    /// notifications are logged locally instead of delivered.
    pub notify_webhook_url: Option<String>,
    pub booking_ref_prefix: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
            booking_ref_prefix: env::var("BOOKING_REF_PREFIX")
                .unwrap_or_else(|_| "GLN".to_string()),
        })
    }
}
