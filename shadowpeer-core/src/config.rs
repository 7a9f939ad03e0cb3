//! Centralized configuration for ShadowPeer.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

use serde::Serialize;

/// Central configuration for all ShadowPeer components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct ShadowpeerConfig {
    pub announce: AnnounceConfig,
    pub network: NetworkConfig,
    pub simulation: SimulationConfig,
}

/// How a heartbeat announce reports its `event` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum HeartbeatEvent {
    /// Leave `event` out of the query (BitTorrent convention)
    Omit,
    /// Send `event=` with an empty value
    Empty,
}

/// How the `uploaded` parameter is computed for announces after the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadReporting {
    /// Bytes uploaded since the previous successful announce
    Delta,
    /// Total bytes uploaded during the session
    Cumulative,
}

/// Announce protocol configuration.
///
/// Controls the fixed request parameters and the engine's scheduling cadence.
#[derive(Debug, Clone)]
pub struct AnnounceConfig {
    /// Port advertised to the tracker
    pub port: u16,
    /// Number of peers requested per announce
    pub numwant: u32,
    /// Interval assumed until the tracker provides one
    pub default_interval: Duration,
    /// Wall-clock period of one engine tick
    pub tick_interval: Duration,
    /// Heartbeat `event` handling
    pub heartbeat_event: HeartbeatEvent,
    /// Upload counter reporting mode
    pub upload_reporting: UploadReporting,
    /// Stop the session once the simulated upload target is reached
    pub stop_on_upload_target: bool,
    /// Optional IPv4 address advertised to the tracker
    pub ip: Option<String>,
    /// Optional IPv6 address advertised to the tracker
    pub ipv6: Option<String>,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            port: 25341,
            numwant: 10,
            default_interval: Duration::from_secs(1800), // 30 minutes
            tick_interval: Duration::from_secs(1),
            heartbeat_event: HeartbeatEvent::Omit,
            upload_reporting: UploadReporting::Delta,
            stop_on_upload_target: true,
            ip: None,
            ipv6: None,
        }
    }
}

/// Raw TCP transport configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Maximum time to establish the tracker connection
    pub connect_timeout: Duration,
    /// Maximum time spent reading the tracker reply
    pub read_timeout: Duration,
    /// Upper bound on the size of a tracker reply
    pub max_response_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            max_response_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

/// Synthetic upload traffic configuration.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Lower bound of the sampled upload speed in bytes per second
    pub min_upload_speed: u64,
    /// Upper bound of the sampled upload speed in bytes per second
    pub max_upload_speed: u64,
    /// Upload target in bytes (None = unlimited)
    pub target_upload_bytes: Option<u64>,
    /// Deterministic seed for reproducible speed sampling
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_upload_speed: 256 * 1024,       // 256 KiB/s
            max_upload_speed: 2 * 1024 * 1024, // 2 MiB/s
            target_upload_bytes: None,
            seed: None,
        }
    }
}

impl ShadowpeerConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Values that fail to parse are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = env_parse::<u16>("SHADOWPEER_PORT") {
            config.announce.port = port;
        }

        if let Some(numwant) = env_parse::<u32>("SHADOWPEER_NUMWANT") {
            config.announce.numwant = numwant;
        }

        if let Ok(value) = std::env::var("SHADOWPEER_HEARTBEAT_EVENT") {
            match value.to_lowercase().as_str() {
                "omit" => config.announce.heartbeat_event = HeartbeatEvent::Omit,
                "empty" => config.announce.heartbeat_event = HeartbeatEvent::Empty,
                _ => {}
            }
        }

        if let Some(seconds) = env_parse::<u64>("SHADOWPEER_CONNECT_TIMEOUT") {
            config.network.connect_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = env_parse::<u64>("SHADOWPEER_READ_TIMEOUT") {
            config.network.read_timeout = Duration::from_secs(seconds);
        }

        if let Some(speed) = env_parse::<u64>("SHADOWPEER_MIN_SPEED") {
            config.simulation.min_upload_speed = speed;
        }

        if let Some(speed) = env_parse::<u64>("SHADOWPEER_MAX_SPEED") {
            config.simulation.max_upload_speed = speed;
        }

        if let Some(target) = env_parse::<u64>("SHADOWPEER_TARGET_BYTES") {
            config.simulation.target_upload_bytes = Some(target);
        }

        if let Some(seed) = env_parse::<u64>("SHADOWPEER_SEED") {
            config.simulation.seed = Some(seed);
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            announce: AnnounceConfig {
                tick_interval: Duration::from_millis(10),
                ..Default::default()
            },
            network: NetworkConfig {
                connect_timeout: Duration::from_secs(2),
                read_timeout: Duration::from_secs(2),
                ..Default::default()
            },
            simulation: SimulationConfig {
                seed: Some(42), // Fixed seed for reproducible tests
                ..Default::default()
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = ShadowpeerConfig::default();

        assert_eq!(config.announce.port, 25341);
        assert_eq!(config.announce.numwant, 10);
        assert_eq!(config.announce.heartbeat_event, HeartbeatEvent::Omit);
        assert_eq!(config.announce.upload_reporting, UploadReporting::Delta);
        assert_eq!(config.network.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.network.read_timeout, Duration::from_secs(10));
        assert!(config.simulation.target_upload_bytes.is_none());
        assert!(config.simulation.min_upload_speed <= config.simulation.max_upload_speed);
    }

    #[test]
    fn test_testing_preset() {
        let config = ShadowpeerConfig::for_testing();
        assert_eq!(config.simulation.seed, Some(42));
        assert!(config.announce.tick_interval < Duration::from_secs(1));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("SHADOWPEER_PORT", "6881");
            std::env::set_var("SHADOWPEER_READ_TIMEOUT", "3");
            std::env::set_var("SHADOWPEER_TARGET_BYTES", "1048576");
            std::env::set_var("SHADOWPEER_HEARTBEAT_EVENT", "EMPTY");
            std::env::set_var("SHADOWPEER_SEED", "not-a-number");
        }

        let config = ShadowpeerConfig::from_env();

        assert_eq!(config.announce.port, 6881);
        assert_eq!(config.network.read_timeout, Duration::from_secs(3));
        assert_eq!(config.simulation.target_upload_bytes, Some(1_048_576));
        assert_eq!(config.announce.heartbeat_event, HeartbeatEvent::Empty);
        assert_eq!(config.simulation.seed, None);

        // Cleanup
        unsafe {
            std::env::remove_var("SHADOWPEER_PORT");
            std::env::remove_var("SHADOWPEER_READ_TIMEOUT");
            std::env::remove_var("SHADOWPEER_TARGET_BYTES");
            std::env::remove_var("SHADOWPEER_HEARTBEAT_EVENT");
            std::env::remove_var("SHADOWPEER_SEED");
        }
    }
}
