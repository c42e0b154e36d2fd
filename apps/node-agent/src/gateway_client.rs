//! Thin HTTP client for the node manager's control-plane calls. Every
//! outbound request carries `X-Node-Token` (§6 "Authentication") and a 30s
//! timeout (§5).

use std::time::Duration;

use af_protocol::{
    AuthTaskPatch, AuthTaskWire, EventBatchRequest, HeartbeatRequest, HeartbeatResponse,
    InstancePatch, InstanceWire, RunPatch, RunSnapshot, TerminalSessionPatch, TerminalSessionWire,
};
use reqwest::Client;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
    token: String,
}

impl GatewayClient {
    pub fn new(base_url: String, token: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        url: String,
    ) -> Result<T, GatewayError> {
        let resp = builder
            .header("X-Node-Token", &self.token)
            .send()
            .await
            .map_err(|source| GatewayError::Request {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status { url, status, body });
        }
        resp.json::<T>()
            .await
            .map_err(|source| GatewayError::Request { url, source })
    }

    pub async fn heartbeat(
        &self,
        req: &HeartbeatRequest,
    ) -> Result<HeartbeatResponse, GatewayError> {
        let url = format!("{}/api/v1/nodes/heartbeat", self.base_url);
        self.send(self.http.post(&url).json(req), url).await
    }

    pub async fn runs_for_node(&self, node_id: &str) -> Result<Vec<RunSnapshot>, GatewayError> {
        let url = format!("{}/api/v1/nodes/{node_id}/runs", self.base_url);
        self.send(self.http.get(&url), url).await
    }

    pub async fn patch_run(&self, run_id: &str, patch: &RunPatch) -> Result<(), GatewayError> {
        let url = format!("{}/api/v1/runs/{run_id}", self.base_url);
        self.send::<serde_json::Value>(self.http.patch(&url).json(patch), url)
            .await
            .map(|_| ())
    }

    pub async fn post_events(
        &self,
        run_id: &str,
        batch: &EventBatchRequest,
    ) -> Result<(), GatewayError> {
        let url = format!("{}/api/v1/runs/{run_id}/events", self.base_url);
        self.send::<serde_json::Value>(self.http.post(&url).json(batch), url)
            .await
            .map(|_| ())
    }

    pub async fn instances_for_node(&self, node_id: &str) -> Result<Vec<InstanceWire>, GatewayError> {
        let url = format!("{}/api/v1/nodes/{node_id}/instances", self.base_url);
        self.send(self.http.get(&url), url).await
    }

    pub async fn patch_instance(
        &self,
        id: &str,
        patch: &InstancePatch,
    ) -> Result<(), GatewayError> {
        let url = format!("{}/api/v1/instances/{id}", self.base_url);
        self.send::<serde_json::Value>(self.http.patch(&url).json(patch), url)
            .await
            .map(|_| ())
    }

    pub async fn auth_tasks_for_node(&self, node_id: &str) -> Result<Vec<AuthTaskWire>, GatewayError> {
        let url = format!("{}/api/v1/nodes/{node_id}/auth-tasks", self.base_url);
        self.send(self.http.get(&url), url).await
    }

    pub async fn patch_auth_task(
        &self,
        task_id: &str,
        patch: &AuthTaskPatch,
    ) -> Result<(), GatewayError> {
        let url = format!("{}/api/v1/auth-tasks/{task_id}", self.base_url);
        self.send::<serde_json::Value>(self.http.patch(&url).json(patch), url)
            .await
            .map(|_| ())
    }

    pub async fn terminal_sessions_for_node(
        &self,
        node_id: &str,
    ) -> Result<Vec<TerminalSessionWire>, GatewayError> {
        let url = format!("{}/api/v1/nodes/{node_id}/terminal-sessions", self.base_url);
        self.send(self.http.get(&url), url).await
    }

    pub async fn patch_terminal_session(
        &self,
        id: &str,
        patch: &TerminalSessionPatch,
    ) -> Result<(), GatewayError> {
        let url = format!("{}/api/v1/terminal-sessions/{id}", self.base_url);
        self.send::<serde_json::Value>(self.http.patch(&url).json(patch), url)
            .await
            .map(|_| ())
    }
}
