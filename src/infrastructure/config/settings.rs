//! Configuration surface recognized at startup. Mirrors `services/config.rs`'s
//! `#[serde(default)]` sub-struct convention.

use serde::{Deserialize, Serialize};

/// Per-source soft collection timeouts, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SoftTimeoutsConfig {
    pub metrics_ms: u64,
    pub alarms_ms: u64,
    pub trail_ms: u64,
    pub anomaly_ms: u64,
    pub health_ms: u64,
}

impl Default for SoftTimeoutsConfig {
    fn default() -> Self {
        Self {
            metrics_ms: 5_000,
            alarms_ms: 3_000,
            trail_ms: 6_000,
            anomaly_ms: 5_000,
            health_ms: 4_000,
        }
    }
}

/// `collection.*`: `EventCorrelator` timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectionConfig {
    pub soft_timeouts: SoftTimeoutsConfig,
    pub hard_timeout_ms: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            soft_timeouts: SoftTimeoutsConfig::default(),
            hard_timeout_ms: 30_000,
        }
    }
}

/// `detect.*`: `DetectAgent` TTL and persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectConfig {
    pub ttl_seconds: u64,
    pub cache_dir: String,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            cache_dir: ".incident-pipeline/detect-cache".to_string(),
        }
    }
}

/// `scheduler.*`: built-in task intervals, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub heartbeat_interval_seconds: u64,
    pub daily_report_interval_seconds: u64,
    pub daily_report_cron: String,
    pub security_scan_interval_seconds: u64,
    pub tick_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 300,
            daily_report_interval_seconds: 86_400,
            daily_report_cron: "0 0 8 * * *".to_string(),
            security_scan_interval_seconds: 43_200,
            tick_interval_seconds: 30,
        }
    }
}

/// `safety.cooldown.*`, in seconds, per risk level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CooldownConfig {
    pub l1_seconds: u64,
    pub l2_seconds: u64,
    pub l3_seconds: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            l1_seconds: 300,
            l2_seconds: 900,
            l3_seconds: 3_600,
        }
    }
}

/// `safety.circuit_breaker.*`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub window_seconds: u64,
    pub open_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window_seconds: 600,
            open_seconds: 300,
        }
    }
}

/// `safety.*`: `SafetyLayer` gating configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafetyConfig {
    pub cooldown: CooldownConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub approval_ttl_seconds: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            cooldown: CooldownConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            approval_ttl_seconds: 1_800,
        }
    }
}

/// `rca.*`: thresholds consulted by the external RCA analyzer, carried
/// through config for completeness even though the analyzer itself is a
/// black box.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RcaConfig {
    pub confidence_upgrade_threshold: f64,
}

impl Default for RcaConfig {
    fn default() -> Self {
        Self {
            confidence_upgrade_threshold: 0.70,
        }
    }
}

/// `logging.*`, following the teacher's logging configuration shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub log_dir: Option<String>,
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            log_dir: None,
            retention_days: 14,
        }
    }
}

/// Top-level configuration tree, loaded once at startup via `ConfigLoader`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub region: String,
    pub collection: CollectionConfig,
    pub detect: DetectConfig,
    pub scheduler: SchedulerConfig,
    pub safety: SafetyConfig,
    pub rca: RcaConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            collection: CollectionConfig::default(),
            detect: DetectConfig::default(),
            scheduler: SchedulerConfig::default(),
            safety: SafetyConfig::default(),
            rca: RcaConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configuration_surface() {
        let config = Config::default();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.detect.ttl_seconds, 300);
        assert_eq!(config.scheduler.heartbeat_interval_seconds, 300);
        assert_eq!(config.safety.cooldown.l2_seconds, 900);
        assert_eq!(config.safety.circuit_breaker.failure_threshold, 3);
    }
}
