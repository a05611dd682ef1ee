use std::env;

use chrono::Duration;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub server_host: String,
    pub server_port: u16,
    /// How long a PENDING booking may wait for the driver before the
    /// sweep reclaims its seats.
    pub pending_ttl_minutes: i64,
    pub max_seats_per_booking: i32,
    pub cleanup_retention_days: i64,
    pub sweep_interval_secs: u64,
    pub notify_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a number"),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
            pending_ttl_minutes: env::var("PENDING_BOOKING_TTL_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .expect("PENDING_BOOKING_TTL_MINUTES must be a number"),
            max_seats_per_booking: env::var("MAX_SEATS_PER_BOOKING")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("MAX_SEATS_PER_BOOKING must be a number"),
            cleanup_retention_days: env::var("CLEANUP_OLD_TRIPS_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .expect("CLEANUP_OLD_TRIPS_DAYS must be a number"),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("SWEEP_INTERVAL_SECS must be a number"),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::minutes(self.pending_ttl_minutes)
    }

    pub fn cleanup_retention(&self) -> Duration {
        Duration::days(self.cleanup_retention_days)
    }
}
