//! `/api/v1/proxies` — egress configuration templates (§3).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use af_domain::{Proxy, ProxyType};

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::wire::proxy_json;

#[derive(Debug, Deserialize)]
pub struct CreateProxyRequest {
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub no_proxy: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

pub async fn create_proxy(
    State(state): State<AppState>,
    Json(body): Json<CreateProxyRequest>,
) -> impl IntoResponse {
    let mut proxy = Proxy::new(body.host, body.port, body.proxy_type);
    proxy.username = body.username;
    proxy.password = body.password;
    proxy.no_proxy = body.no_proxy;
    proxy.is_default = body.is_default;
    let proxy = state.store.create_proxy(proxy);
    (StatusCode::CREATED, Json(proxy_json(&proxy)))
}

pub async fn list_proxies(State(state): State<AppState>) -> impl IntoResponse {
    let proxies: Vec<Value> = state.store.list_proxies().iter().map(proxy_json).collect();
    Json(serde_json::json!({ "proxies": proxies }))
}

pub async fn delete_proxy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if state.store.delete_proxy(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("proxy", &id))
    }
}
