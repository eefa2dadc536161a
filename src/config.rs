// config.rs
use anyhow::Context;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub eth_rpc_url: String,
    pub company_eth_address: Option<String>,
    pub eth_usd_rate: f64,
    pub price_max_age_secs: u64,
    pub card_sim_delay_ms: u64,
    pub cors_origin: Option<String>,
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(AppConfig {
            database_url: env::var("MONGODB_URI")
                .context("MONGODB_URI must be set")?,
            database_name: env::var("MONGODB_DB")
                .unwrap_or_else(|_| "achyuta".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .context("JWT_SECRET must be set")?,
            eth_rpc_url: env::var("ETH_RPC_URL")
                .unwrap_or_else(|_| "http://localhost:8545".to_string()),
            company_eth_address: env::var("COMPANY_ETH_ADDRESS").ok(),
            eth_usd_rate: env::var("ETH_USD_RATE")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("ETH_USD_RATE must be a number")?,
            price_max_age_secs: env::var("PRICE_MAX_AGE_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("PRICE_MAX_AGE_SECS must be a number")?,
            card_sim_delay_ms: env::var("CARD_SIM_DELAY_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .context("CARD_SIM_DELAY_MS must be a number")?,
            cors_origin: env::var("CORS_ORIGIN").ok(),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a number")?,
            host: env::var("HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
