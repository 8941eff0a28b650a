use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND: &str = "0.0.0.0:8181";
pub const DEFAULT_METRICS_BIND: &str = "0.0.0.0:9181";
pub const DEFAULT_DATA_PATH: &str = "policy/data.json";
pub const DEFAULT_LOG_LEVEL: &str = "info";

// PDP configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct PdpConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub data_path: PathBuf,
    pub package: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
struct PdpConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    data_path: Option<PathBuf>,
    package: Option<String>,
    log_level: Option<String>,
}

impl PdpConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("DC_PDP_BIND")
            .unwrap_or_else(|_| DEFAULT_BIND.to_string())
            .parse()
            .with_context(|| "parse DC_PDP_BIND")?;
        let metrics_bind = std::env::var("DC_PDP_METRICS_BIND")
            .unwrap_or_else(|_| DEFAULT_METRICS_BIND.to_string())
            .parse()
            .with_context(|| "parse DC_PDP_METRICS_BIND")?;
        let data_path = std::env::var("DC_PDP_DATA")
            .unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string())
            .into();
        let package =
            std::env::var("DC_PDP_PACKAGE").unwrap_or_else(|_| datacloud_policy::PACKAGE.to_string());
        let log_level =
            std::env::var("DC_PDP_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
        let config = Self {
            bind_addr,
            metrics_bind,
            data_path,
            package,
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("DC_PDP_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read DC_PDP_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: PdpConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse pdp config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.data_path {
            self.data_path = value;
        }
        if let Some(value) = override_cfg.package {
            self.package = value;
        }
        if let Some(value) = override_cfg.log_level {
            self.log_level = value;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.package.trim().is_empty() || self.package.contains('/') {
            anyhow::bail!("package must be a single non-empty path segment");
        }
        Ok(())
    }
}
