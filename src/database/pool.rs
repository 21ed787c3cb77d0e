use std::time::{Duration, Instant};

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

use super::backend::Backend;
use super::error::DbError;
use crate::config::DatabaseConfig;

/// Build the bounded pool. Connections are opened on first use, so this only
/// fails on a malformed URL; reachability is the probe's job.
pub fn build_pool(config: &DatabaseConfig) -> Result<MySqlPool, DbError> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .test_before_acquire(true)
        .connect_lazy(&config.url())?;
    Ok(pool)
}

/// How hard the startup probe tries before giving up on the layer.
#[derive(Debug, Clone, Copy)]
pub struct ProbePolicy {
    pub slow_threshold: Duration,
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl ProbePolicy {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            slow_threshold: config.slow_probe_threshold(),
            attempts: config.probe_attempts,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            slow_threshold: Duration::from_millis(1000),
            attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Run the liveness ping. Slow is only a warning; transient failures are
/// retried up to `policy.attempts`; anything else returns straight away.
pub async fn probe(backend: &dyn Backend, policy: ProbePolicy) -> Result<Duration, DbError> {
    let mut attempt = 1;
    loop {
        let started = Instant::now();
        match backend.ping().await {
            Ok(()) => {
                let took = started.elapsed();
                if took > policy.slow_threshold {
                    tracing::warn!(
                        "[db] [probe] connecting to database takes over {} ms: {} ms",
                        policy.slow_threshold.as_millis(),
                        took.as_millis()
                    );
                } else {
                    tracing::debug!("[db] [probe] ok in {} ms", took.as_millis());
                }
                return Ok(took);
            }
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                tracing::warn!(
                    "[db] [probe] attempt {}/{} failed: {}",
                    attempt,
                    policy.attempts,
                    e
                );
                attempt += 1;
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
