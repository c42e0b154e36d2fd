use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Process-wide configuration (§6 "Configuration"). Every field has a
/// `#[serde(default)]` so a partial YAML file is legal; missing knobs fall
/// back to an environment variable and finally to a hardcoded default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stores: StoreConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
    #[serde(default)]
    pub shared_token: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            labels: HashMap::new(),
            workspace_root: default_workspace_root(),
            shared_token: String::new(),
        }
    }
}

fn default_workspace_root() -> String {
    "/var/lib/af/workspaces".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

fn default_api_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_liveness_url")]
    pub liveness_url: String,
    #[serde(default = "default_event_url")]
    pub event_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            liveness_url: default_liveness_url(),
            event_url: default_event_url(),
        }
    }
}

fn default_liveness_url() -> String {
    "http://127.0.0.1:8080/liveness".to_string()
}

fn default_event_url() -> String {
    "http://127.0.0.1:8080/events".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub ca_path: Option<String>,
}

/// Bind address, CORS and rate-limit knobs for `apps/gateway`'s HTTP
/// surface (§6). The node manager never reads this section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            cors: CorsConfig::default(),
            rate_limit: None,
        }
    }
}

fn default_gateway_host() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_cors_origins(),
        }
    }
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u64,
    pub burst_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Load from a YAML file, following the search path `--config` flag,
    /// then `./configs/af.yaml`, then `../configs/af.yaml`, then defaults
    /// alone. Values are overlaid with environment variables afterwards.
    pub fn load(explicit_path: Option<&str>) -> Result<Self, DomainError> {
        let path = explicit_path
            .map(PathBuf::from)
            .or_else(|| find_existing(Path::new("./configs/af.yaml")))
            .or_else(|| find_existing(Path::new("../configs/af.yaml")));

        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(&p).map_err(|e| {
                    DomainError::Invalid(format!("reading config {}: {e}", p.display()))
                })?;
                serde_yaml::from_str(&text)
                    .map_err(|e| DomainError::Invalid(format!("parsing config {}: {e}", p.display())))?
            }
            None => Config::default(),
        };

        config.apply_env_fallback();
        Ok(config)
    }

    /// Overlay recognised environment variables onto unset/default fields.
    /// Mirrors the knobs named in §6: node id, API server URL, workspace
    /// root, labels, liveness store URL, event store URL, TLS CA path,
    /// shared node token.
    fn apply_env_fallback(&mut self) {
        if self.node.id.is_empty() {
            if let Ok(v) = env::var("AF_NODE_ID") {
                self.node.id = v;
            }
        }
        if let Ok(v) = env::var("AF_WORKSPACE_ROOT") {
            self.node.workspace_root = v;
        }
        if let Ok(v) = env::var("AF_NODE_TOKEN") {
            self.node.shared_token = v;
        }
        if let Ok(v) = env::var("AF_NODE_LABELS") {
            for pair in v.split(',').filter(|s| !s.is_empty()) {
                if let Some((k, val)) = pair.split_once('=') {
                    self.node.labels.insert(k.trim().to_string(), val.trim().to_string());
                }
            }
        }
        if let Ok(v) = env::var("AF_API_URL") {
            self.server.api_url = v;
        }
        if let Ok(v) = env::var("AF_LIVENESS_URL") {
            self.stores.liveness_url = v;
        }
        if let Ok(v) = env::var("AF_EVENT_URL") {
            self.stores.event_url = v;
        }
        if let Ok(v) = env::var("AF_TLS_CA_PATH") {
            self.tls.ca_path = Some(v);
        }
        if let Ok(v) = env::var("AF_GATEWAY_HOST") {
            self.gateway.host = v;
        }
        if let Ok(v) = env::var("AF_GATEWAY_PORT") {
            if let Ok(port) = v.parse() {
                self.gateway.port = port;
            }
        }
        if let Ok(v) = env::var("AF_CORS_ORIGINS") {
            self.gateway.cors.allowed_origins =
                v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
    }

    /// Validate the configuration and return a list of issues. An empty vec
    /// means the config is usable; callers should treat any `Error`-severity
    /// issue as fatal per §7 ("misconfiguration at startup").
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.node.id.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "node.id".into(),
                message: "node id must not be empty".into(),
            });
        }

        if !self.server.api_url.starts_with("http://") && !self.server.api_url.starts_with("https://") {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.api_url".into(),
                message: format!(
                    "api_url must start with http:// or https:// (got \"{}\")",
                    self.server.api_url
                ),
            });
        }

        if self.node.shared_token.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "node.shared_token".into(),
                message: "no shared node token configured; node-manager auth is disabled".into(),
            });
        }

        if let Some(ca) = &self.tls.ca_path {
            if !Path::new(ca).exists() {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: "tls.ca_path".into(),
                    message: format!("CA file not found at \"{ca}\""),
                });
            }
        }

        issues
    }

    pub fn has_fatal_issues(issues: &[ConfigIssue]) -> bool {
        issues.iter().any(|i| i.severity == ConfigSeverity::Error)
    }

    /// Validation for `apps/gateway`: unlike [`Config::validate`], the
    /// gateway has no node identity of its own, so `node.id` is not
    /// required — only the knobs the gateway process actually reads.
    pub fn validate_gateway(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.gateway.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "gateway.port".into(),
                message: "gateway.port must be nonzero".into(),
            });
        }

        if self.node.shared_token.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "node.shared_token".into(),
                message: "no shared node token configured; X-Node-Token auth is disabled".into(),
            });
        }

        if let Some(ca) = &self.tls.ca_path {
            if !Path::new(ca).exists() {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: "tls.ca_path".into(),
                    message: format!("CA file not found at \"{ca}\""),
                });
            }
        }

        issues
    }
}

fn find_existing(path: &Path) -> Option<PathBuf> {
    path.exists().then(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_round_trip() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.server.api_url, cfg.server.api_url);
    }

    #[test]
    fn missing_node_id_is_fatal() {
        let cfg = Config::default();
        let issues = cfg.validate();
        assert!(Config::has_fatal_issues(&issues));
    }

    #[test]
    fn loads_partial_yaml_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("af.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "node:\n  id: node-1\n  shared_token: secret").unwrap();

        let cfg = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.node.id, "node-1");
        assert_eq!(cfg.node.shared_token, "secret");
        assert_eq!(cfg.server.api_url, default_api_url());
        assert!(!Config::has_fatal_issues(&cfg.validate()));
    }
}
