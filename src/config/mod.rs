//! Coordinator/worker CLI configuration (spec §6). Parsed by hand from
//! `--longOption=value` flags, matching the teacher's own ad hoc flag
//! handling rather than pulling in a CLI-parsing crate the teacher doesn't
//! already depend on.

use crate::error::{EngineError, Result};
use std::collections::HashMap;

fn parse_flags(args: &[String]) -> HashMap<String, String> {
    let mut flags = HashMap::new();
    for arg in args {
        let Some(rest) = arg.strip_prefix("--") else { continue };
        match rest.split_once('=') {
            Some((key, value)) => {
                flags.insert(key.to_string(), value.to_string());
            }
            None => {
                flags.insert(rest.to_string(), String::new());
            }
        }
    }
    flags
}

fn parse_value<T: std::str::FromStr>(flags: &HashMap<String, String>, key: &str, default: T) -> Result<T> {
    match flags.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| EngineError::Configuration(format!("invalid value for --{key}: {raw}"))),
    }
}

fn log_level(flags: &HashMap<String, String>, default: &str) -> String {
    std::env::var("NES_LOG_LEVEL").ok().or_else(|| flags.get("logLevel").cloned()).unwrap_or_else(|| default.to_string())
}

fn data_dir() -> Option<String> {
    std::env::var("NES_DATA_DIR").ok()
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub coordinator_port: u16,
    pub rpc_port: u16,
    pub rest_port: u16,
    pub number_of_slots: u32,
    pub log_level: String,
    pub data_dir: Option<String>,
}

impl CoordinatorConfig {
    pub fn parse(args: &[String]) -> Result<Self> {
        let flags = parse_flags(args);
        Ok(Self {
            coordinator_port: parse_value(&flags, "coordinatorPort", 4000)?,
            rpc_port: parse_value(&flags, "rpcPort", 4001)?,
            rest_port: parse_value(&flags, "restPort", 8081)?,
            number_of_slots: parse_value(&flags, "numberOfSlots", 65535)?,
            log_level: log_level(&flags, "info"),
            data_dir: data_dir(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub coordinator_port: u16,
    pub rpc_port: u16,
    pub data_port: u16,
    pub number_of_slots: u32,
    pub source_type: Option<String>,
    pub source_config_path: Option<String>,
    pub number_of_buffers_in_global_buffer_manager: u32,
    pub number_of_buffers_per_worker: u32,
    pub number_of_buffers_in_source_local_buffer_pool: u32,
    pub buffer_size_in_bytes: u32,
    pub physical_stream_name: Option<String>,
    pub logical_stream_name: Option<String>,
    pub number_of_buffers_to_produce: u64,
    pub number_of_tuples_to_produce_per_buffer: u64,
    pub source_frequency: u64,
    pub log_level: String,
    pub data_dir: Option<String>,
}

impl WorkerConfig {
    pub fn parse(args: &[String]) -> Result<Self> {
        let flags = parse_flags(args);
        Ok(Self {
            coordinator_port: parse_value(&flags, "coordinatorPort", 4000)?,
            rpc_port: parse_value(&flags, "rpcPort", 4001)?,
            data_port: parse_value(&flags, "dataPort", 4002)?,
            number_of_slots: parse_value(&flags, "numberOfSlots", num_cpus::get() as u32)?,
            source_type: flags.get("sourceType").cloned(),
            source_config_path: flags.get("sourceConfig").cloned(),
            number_of_buffers_in_global_buffer_manager: parse_value(&flags, "numberOfBuffersInGlobalBufferManager", 1024)?,
            number_of_buffers_per_worker: parse_value(&flags, "numberOfBuffersPerWorker", 128)?,
            number_of_buffers_in_source_local_buffer_pool: parse_value(&flags, "numberOfBuffersInSourceLocalBufferPool", 64)?,
            buffer_size_in_bytes: parse_value(&flags, "bufferSizeInBytes", 4096)?,
            physical_stream_name: flags.get("physicalStreamName").cloned(),
            logical_stream_name: flags.get("logicalStreamName").cloned(),
            number_of_buffers_to_produce: parse_value(&flags, "numberOfBuffersToProduce", 0)?,
            number_of_tuples_to_produce_per_buffer: parse_value(&flags, "numberOfTuplesToProducePerBuffer", 0)?,
            source_frequency: parse_value(&flags, "sourceFrequency", 0)?,
            log_level: log_level(&flags, "info"),
            data_dir: data_dir(),
        })
    }
}

/// Exit codes named in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Normal = 0,
    ConfigurationError = 1,
    FatalRuntime = 2,
    DeploymentFailure = 3,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_long_flags_with_equals() {
        let cfg = CoordinatorConfig::parse(&args(&["--coordinatorPort=5000", "--numberOfSlots=16"])).unwrap();
        assert_eq!(cfg.coordinator_port, 5000);
        assert_eq!(cfg.number_of_slots, 16);
        assert_eq!(cfg.rest_port, 8081, "unspecified flags keep their default");
    }

    #[test]
    fn invalid_numeric_flag_is_a_configuration_error() {
        let err = CoordinatorConfig::parse(&args(&["--coordinatorPort=not-a-port"])).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn worker_config_parses_string_and_numeric_flags() {
        let cfg = WorkerConfig::parse(&args(&[
            "--sourceType=CSV",
            "--bufferSizeInBytes=8192",
            "--numberOfBuffersToProduce=10",
        ]))
        .unwrap();
        assert_eq!(cfg.source_type.as_deref(), Some("CSV"));
        assert_eq!(cfg.buffer_size_in_bytes, 8192);
        assert_eq!(cfg.number_of_buffers_to_produce, 10);
    }
}
