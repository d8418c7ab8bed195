use std::env;
use std::time::Duration;

/// All tunables for the telemetry loop, loaded from the environment.
///
/// Only the dispatch interval is mutable at runtime (via the remote
/// command); everything else is fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub climate_interval: Duration,
    pub light_interval: Duration,
    pub sound_interval: Duration,
    pub display_interval: Duration,
    pub dispatch_initial_ms: u64,
    pub dispatch_min_ms: u64,
    pub dispatch_max_ms: u64,
    pub loudness_noise_floor: f64,
}

// Defaults: DHT-class climate sensors need ~2s between reads; sound is
// sampled fast to catch short spikes.
const DEFAULT_CLIMATE_INTERVAL_MS: u64 = 2000;
const DEFAULT_LIGHT_INTERVAL_MS: u64 = 1000;
const DEFAULT_SOUND_INTERVAL_MS: u64 = 200;
const DEFAULT_DISPLAY_INTERVAL_MS: u64 = 2000;
const DEFAULT_DISPATCH_INTERVAL_MS: u64 = 10000;
const DISPATCH_MIN_MS: u64 = 5000;
const DISPATCH_MAX_MS: u64 = 60000;
const DEFAULT_LOUDNESS_NOISE_FLOOR: f64 = 512.0;

impl AppConfig {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        let config = AppConfig {
            climate_interval: Duration::from_millis(env_u64(
                "CLIMATE_INTERVAL_MS",
                DEFAULT_CLIMATE_INTERVAL_MS,
            )?),
            light_interval: Duration::from_millis(env_u64(
                "LIGHT_INTERVAL_MS",
                DEFAULT_LIGHT_INTERVAL_MS,
            )?),
            sound_interval: Duration::from_millis(env_u64(
                "SOUND_INTERVAL_MS",
                DEFAULT_SOUND_INTERVAL_MS,
            )?),
            display_interval: Duration::from_millis(env_u64(
                "DISPLAY_INTERVAL_MS",
                DEFAULT_DISPLAY_INTERVAL_MS,
            )?),
            dispatch_initial_ms: env_u64("DATA_INTERVAL_MS", DEFAULT_DISPATCH_INTERVAL_MS)?,
            dispatch_min_ms: DISPATCH_MIN_MS,
            dispatch_max_ms: DISPATCH_MAX_MS,
            loudness_noise_floor: env_f64(
                "LOUDNESS_NOISE_FLOOR",
                DEFAULT_LOUDNESS_NOISE_FLOOR,
            )?,
        };

        if config.dispatch_initial_ms < config.dispatch_min_ms
            || config.dispatch_initial_ms > config.dispatch_max_ms
        {
            return Err(format!(
                "DATA_INTERVAL_MS must be between {} and {}, got {}",
                config.dispatch_min_ms, config.dispatch_max_ms, config.dispatch_initial_ms
            )
            .into());
        }

        Ok(config)
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64, Box<dyn std::error::Error>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} is not a valid integer: '{}'", key, raw).into()),
        Err(_) => Ok(default),
    }
}

fn env_f64(key: &str, default: f64) -> Result<f64, Box<dyn std::error::Error>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} is not a valid number: '{}'", key, raw).into()),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env() {
        let config = AppConfig::from_env().expect("defaults should load");
        assert_eq!(config.dispatch_min_ms, 5000);
        assert_eq!(config.dispatch_max_ms, 60000);
        assert_eq!(config.loudness_noise_floor, 512.0);
        assert!(config.sound_interval < config.climate_interval);
    }

    #[test]
    fn env_u64_rejects_garbage() {
        env::set_var("ENVNODE_TEST_BAD_U64", "not-a-number");
        assert!(env_u64("ENVNODE_TEST_BAD_U64", 5).is_err());
        env::remove_var("ENVNODE_TEST_BAD_U64");

        assert_eq!(env_u64("ENVNODE_TEST_UNSET_U64", 5).unwrap(), 5);
    }
}
