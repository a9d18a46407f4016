//! Configuration loading and validation.
//!
//! Adapted from the teacher's `Config`/`Validate` pattern (schema-level
//! validation function, nested `#[validate(nested)]` nodes, `serde_yaml`
//! loading with `pingora_error::Result`), replacing the
//! Route/Upstream/SSL/GlobalRule/Etcd/Admin/Prometheus/Sentry shapes with
//! the Service/Host/Cache/HealthCheck shapes this proxy needs.

use std::{collections::HashSet, fs, net::SocketAddr};

use pingora_core::server::configuration::ServerConf;
use pingora_error::{Error, ErrorType::*, OrErr, Result};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Root configuration structure combining Pingora framework config with
/// this proxy's own settings.
#[derive(Default, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Config::validate_unique_service_names"))]
pub struct Config {
    /// Pingora framework configuration (workers, daemonization, logging).
    #[serde(default)]
    pub pingora: ServerConf,

    /// Address the HTTP proxy listens on.
    pub listen: SocketAddr,

    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    /// Hard cap on request body size, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default)]
    #[validate(nested)]
    pub health_check: HealthCheckConfig,

    /// Timeout for upstream connections/requests, in seconds.
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    #[validate(length(min = 1))]
    #[validate(nested)]
    pub services: Vec<ServiceConfig>,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_upstream_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Loads and validates configuration from a YAML file.
    pub fn load_from_yaml<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path)
            .or_err_with(ReadError, || format!("Unable to read conf file from {path}"))?;
        Self::from_yaml(&conf_str)
    }

    /// Parses and validates a YAML configuration string.
    pub fn from_yaml(conf_str: &str) -> Result<Self> {
        let conf: Config = serde_yaml::from_str(conf_str)
            .or_err_with(ReadError, || format!("Unable to parse yaml conf {conf_str}"))?;

        conf.validate()
            .or_err_with(FileReadError, || "Conf file validation failed")?;

        Ok(conf)
    }

    fn validate_unique_service_names(&self) -> std::result::Result<(), ValidationError> {
        let mut names = HashSet::new();
        let mut domains = HashSet::new();
        for service in &self.services {
            if !names.insert(service.name.as_str()) {
                return Err(ValidationError::new("duplicate_service_name"));
            }
            if !domains.insert(service.domain.as_str()) {
                return Err(ValidationError::new("duplicate_service_domain"));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    Random,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct HostConfig {
    #[validate(length(min = 1))]
    pub address: String,
    pub port: u16,
}

impl HostConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub domain: String,
    #[serde(default)]
    pub strategy: Strategy,
    #[validate(length(min = 1))]
    #[validate(nested)]
    pub hosts: Vec<HostConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_capacity() -> usize {
    crate::cache::DEFAULT_CAPACITY
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_check_interval_secs")]
    pub interval_secs: u64,
    /// Delay before the first probe round, letting the proxy finish
    /// starting up before it starts marking hosts unhealthy.
    #[serde(default = "default_health_check_initial_delay_secs")]
    pub initial_delay_secs: u64,
    /// Per-probe HTTP timeout.
    #[serde(default = "default_health_check_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_health_check_interval_secs() -> u64 {
    30
}

fn default_health_check_initial_delay_secs() -> u64 {
    2
}

fn default_health_check_timeout_secs() -> u64 {
    3
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_check_interval_secs(),
            initial_delay_secs: default_health_check_initial_delay_secs(),
            timeout_secs: default_health_check_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let yaml = r#"
listen: "127.0.0.1:8080"
services:
  - name: demo
    domain: demo.example.com
    strategy: round-robin
    hosts:
      - address: 127.0.0.1
        port: 9000
"#;
        let conf = Config::from_yaml(yaml).expect("should parse");
        assert_eq!(conf.services.len(), 1);
        assert_eq!(conf.max_body_bytes, default_max_body_bytes());
        assert_eq!(conf.cache.capacity, crate::cache::DEFAULT_CAPACITY);
    }

    #[test]
    fn rejects_duplicate_domains() {
        let yaml = r#"
listen: "127.0.0.1:8080"
services:
  - name: a
    domain: same.example.com
    hosts: [{address: "127.0.0.1", port: 9000}]
  - name: b
    domain: same.example.com
    hosts: [{address: "127.0.0.1", port: 9001}]
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn rejects_empty_services() {
        let yaml = r#"
listen: "127.0.0.1:8080"
services: []
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}
