use std::time::Duration;

/// Process-level tunables for the orchestration core.
///
/// Policy ceilings live in [`crate::models::global_config::GlobalConfig`]
/// and come from the config provider per operation; this struct only holds
/// what the hosting process decides once at startup.
#[derive(Debug)]
pub struct Config {
    /// Seconds a cached identity listing stays valid.
    /// Set via LEASEHOLD_IDENTITY_CACHE_TTL. Default: 300.
    pub identity_cache_ttl_secs: u64,
    /// Interval of the budget/duration monitor sweep.
    /// Set via LEASEHOLD_MONITOR_INTERVAL. Default: 900.
    pub monitor_interval_secs: u64,
    /// Interval of the record reaper sweep.
    /// Set via LEASEHOLD_REAPER_INTERVAL. Default: 3600.
    pub reaper_interval_secs: u64,
}

impl Config {
    pub fn identity_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.identity_cache_ttl_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    Ok(Config {
        identity_cache_ttl_secs: std::env::var("LEASEHOLD_IDENTITY_CACHE_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300),
        monitor_interval_secs: std::env::var("LEASEHOLD_MONITOR_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(900),
        reaper_interval_secs: std::env::var("LEASEHOLD_REAPER_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env_overrides() {
        let config = load().unwrap();
        assert_eq!(config.identity_cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.monitor_interval(), Duration::from_secs(900));
        assert_eq!(config.reaper_interval(), Duration::from_secs(3600));
    }
}

