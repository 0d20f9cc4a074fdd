use std::collections::BTreeMap;
use std::time::Duration;

use crate::auto_router::{DiscoveryOptions, UnboundPolicy};
use crate::config::{ConfigError, RpcConfig};
use crate::logging::LogFormat;

/// Runtime settings read from the `rpc.*` configuration keys.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcSettings {
    pub auto_discovery: bool,
    pub http_enabled: bool,
    /// Mount prefix of the HTTP endpoints, with a leading `/` and no
    /// trailing one.
    pub http_prefix: String,
    pub unbound: UnboundPolicy,
    pub sse_heartbeat: Duration,
    /// Extra procedure names per router for the static introspection fallback.
    pub hints: BTreeMap<String, Vec<String>>,
    pub log_format: LogFormat,
    pub server_addr: String,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            auto_discovery: false,
            http_enabled: true,
            http_prefix: "/trpc".to_string(),
            unbound: UnboundPolicy::Fail,
            sse_heartbeat: Duration::from_secs(30),
            hints: BTreeMap::new(),
            log_format: LogFormat::Pretty,
            server_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl RpcSettings {
    pub fn from_config(config: &RpcConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let unbound = match config
            .get_or::<String>("rpc.discovery.unbound", "fail".into())?
            .to_ascii_lowercase()
            .as_str()
        {
            "fail" => UnboundPolicy::Fail,
            "default" | "default-construct" => UnboundPolicy::DefaultConstruct,
            other => {
                return Err(ConfigError::Invalid {
                    key: "rpc.discovery.unbound".into(),
                    message: format!("expected 'fail' or 'default', got '{other}'"),
                })
            }
        };

        let log_format = config
            .get_or::<String>("rpc.log.format", "pretty".into())?
            .parse::<LogFormat>()
            .map_err(|message| ConfigError::Invalid {
                key: "rpc.log.format".into(),
                message,
            })?;

        let mut hints = BTreeMap::new();
        for router in config.children("rpc.hints") {
            let names: Vec<String> = config.get(&format!("rpc.hints.{router}"))?;
            hints.insert(router, names);
        }

        let heartbeat_ms: u64 = config.get_or(
            "rpc.sse.heartbeat-ms",
            defaults.sse_heartbeat.as_millis() as u64,
        )?;

        Ok(Self {
            auto_discovery: config.get_or("rpc.auto-discovery", defaults.auto_discovery)?,
            http_enabled: config.get_or("rpc.http.enabled", defaults.http_enabled)?,
            http_prefix: normalize_prefix(&config.get_or("rpc.http.prefix", defaults.http_prefix)?),
            unbound,
            sse_heartbeat: Duration::from_millis(heartbeat_ms),
            hints,
            log_format,
            server_addr: config.get_or("rpc.server.addr", defaults.server_addr)?,
        })
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            auto_discovery: self.auto_discovery,
            unbound: self.unbound,
        }
    }
}

/// `trpc/` and `/trpc` both become `/trpc`; an empty prefix becomes `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    format!("/{trimmed}")
}
