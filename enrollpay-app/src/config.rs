//! Configuration loading from environment.

use std::env;
use std::time::Duration;

use enrollpay_hex::{OrphanPolicy, ReconcileSettings};

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Key gating the admin surfaces (report, reconcile, full record detail).
    pub admin_key: String,
    pub reconcile: ReconcileSettings,
    pub orphan: OrphanPolicy,
    /// Upper bound on every provider HTTP call.
    pub provider_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let admin_key = env::var("ADMIN_KEY")
            .map_err(|_| anyhow::anyhow!("ADMIN_KEY environment variable is required"))?;

        let defaults = ReconcileSettings::default();
        let reconcile = ReconcileSettings {
            interval: secs_var("RECONCILE_INTERVAL_SECS", defaults.interval)?,
            grace: secs_var("RECONCILE_GRACE_SECS", defaults.grace)?,
            batch_limit: parsed_var("RECONCILE_BATCH_LIMIT", defaults.batch_limit)?,
        };

        let orphan_defaults = OrphanPolicy::default();
        let orphan = OrphanPolicy {
            attempts: parsed_var("ORPHAN_RETRY_ATTEMPTS", orphan_defaults.attempts)?,
            delay: secs_var("ORPHAN_RETRY_DELAY_SECS", orphan_defaults.delay)?,
        };

        let provider_timeout = secs_var(
            "PROVIDER_TIMEOUT_SECS",
            enrollpay_gateways::DEFAULT_PROVIDER_TIMEOUT,
        )?;

        Ok(Self {
            port,
            database_url,
            admin_key,
            reconcile,
            orphan,
            provider_timeout,
        })
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{name} must be a valid number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &str, default: Duration) -> anyhow::Result<Duration> {
    let secs: u64 = parsed_var(name, default.as_secs())?;
    Ok(Duration::from_secs(secs))
}
