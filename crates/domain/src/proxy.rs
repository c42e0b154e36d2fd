use serde::{Deserialize, Serialize};

use crate::ids::new_id_underscore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    Http,
    Socks5,
}

/// Egress configuration template usable by accounts/auth tasks (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub id: String,
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl Proxy {
    pub fn new(host: String, port: u16, proxy_type: ProxyType) -> Self {
        Self {
            id: new_id_underscore("proxy"),
            host,
            port,
            proxy_type,
            username: None,
            password: None,
            no_proxy: None,
            is_default: false,
        }
    }
}
