use serde::Deserialize;
use std::path::Path;

use crate::smb2::dialect::Revision;
use crate::smb2::guid::Guid;

/// Default configuration file, used when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "smbserve.toml";

const DEFAULT_MAX_SIZE: u32 = 8 * 1024 * 1024;

/// Server configuration loaded from TOML file.
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// TCP port to listen on (default 445, use 4450 for non-root)
    pub port: u16,
    /// Server name, used in log output
    pub server_name: String,
    /// Server GUID in canonical form; random when absent
    pub server_guid: Option<String>,
    pub negotiation: NegotiationConfig,
    pub credits: CreditConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 445,
            server_name: "smbserve".to_string(),
            server_guid: None,
            negotiation: NegotiationConfig::default(),
            credits: CreditConfig::default(),
        }
    }
}

/// What the server offers during dialect negotiation.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NegotiationConfig {
    pub max_transact_size: u32,
    pub max_read_size: u32,
    pub max_write_size: u32,
    /// Enabled dialects as revision numbers, e.g. 0x0311 or 785
    pub dialects: Vec<u16>,
    pub require_signing: bool,
    pub encryption: bool,
    pub multi_credit: bool,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        NegotiationConfig {
            max_transact_size: DEFAULT_MAX_SIZE,
            max_read_size: DEFAULT_MAX_SIZE,
            max_write_size: DEFAULT_MAX_SIZE,
            dialects: Revision::CONCRETE.iter().map(|r| r.as_u16()).collect(),
            require_signing: false,
            encryption: true,
            multi_credit: true,
        }
    }
}

impl NegotiationConfig {
    /// Enabled dialects as revisions.
    pub fn revisions(&self) -> Vec<Revision> {
        self.dialects.iter().map(|&d| Revision::from_u16(d)).collect()
    }
}

/// Credit window limits for each connection.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CreditConfig {
    /// Most credits a client may hold at once
    pub limit: u16,
    /// Most credits granted in a single response
    pub max_grant: u16,
}

impl Default for CreditConfig {
    fn default() -> Self {
        CreditConfig { limit: 128, max_grant: 64 }
    }
}

impl Config {
    /// Parsed server GUID, if one is configured.
    pub fn parsed_server_guid(&self) -> anyhow::Result<Option<Guid>> {
        match &self.server_guid {
            Some(s) => s
                .parse::<Guid>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("Invalid server_guid '{}': {}", s, e)),
            None => Ok(None),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let n = &self.negotiation;
        if n.max_transact_size == 0 || n.max_read_size == 0 || n.max_write_size == 0 {
            anyhow::bail!("Negotiated sizes must be non-zero");
        }
        if n.dialects.is_empty() {
            anyhow::bail!("No dialects enabled");
        }
        if let Some(bad) = n.revisions().into_iter().find(|r| !r.is_concrete()) {
            anyhow::bail!("Unsupported dialect {} (0x{:04x})", bad, bad.as_u16());
        }
        if self.credits.limit == 0 {
            anyhow::bail!("Credit limit must be at least 1");
        }
        if self.credits.max_grant == 0 {
            anyhow::bail!("max_grant must be at least 1");
        }
        self.parsed_server_guid()?;
        Ok(())
    }
}

/// Load and parse the TOML configuration file.
/// A missing file at the default path yields the default configuration.
pub fn load_config(path: &str) -> anyhow::Result<Config> {
    if path == DEFAULT_CONFIG_PATH && !Path::new(path).exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path, e))?;
    config.validate()?;
    Ok(config)
}
