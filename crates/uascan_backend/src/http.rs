//! HTTP Backend Gateway
//!
//! Talks to the server-manager REST API with form-encoded bodies and a
//! bearer credential. Uses raw HTTP requests (no generated client).

use async_trait::async_trait;
use reqwest::{Method, Response};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use uascan_protocol::{CheckTimestamp, NodeUpsert, Server, ServerId};

use crate::error::{BackendError, Result};
use crate::retry::{decode_error, RetryPolicy};
use crate::Backend;

const PING_PATH: &str = "api/status/ping";
const SERVER_INDEX_PATH: &str = "api/server_manager/server/index";
const SERVER_UPDATE_PATH: &str = "api/server_manager/server/update";
const NODE_EXISTS_PATH: &str = "api/server_manager/node/exists";
const NODE_CREATE_PATH: &str = "api/server_manager/node/create";
const NODE_UPDATE_PATH: &str = "api/server_manager/node/update";
const NODE_DELETE_UNCHECKED_PATH: &str = "api/server_manager/node/delete-unchecked";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Existing node record as returned by the `node/exists` lookup.
#[derive(Debug, Deserialize)]
struct ExistingNode {
    id: i64,
}

/// Backend gateway over HTTP
pub struct HttpBackend {
    base_url: Url,
    access_token: String,
    http_client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpBackend {
    /// Create a gateway for `api_url` (e.g. `http://api/`) with a bearer token.
    pub fn new(api_url: &str, access_token: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            base_url: normalize_base_url(api_url)?,
            access_token: access_token.into(),
            http_client,
            retry: RetryPolicy::default(),
        })
    }

    /// Set the retry policy for gateway calls
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Config(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Send one authenticated form request and fail on non-success status.
    async fn send_form(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        form: &[(&str, String)],
    ) -> Result<Response> {
        let url = self.endpoint(path)?;
        let mut request = self
            .http_client
            .request(method, url)
            .bearer_auth(&self.access_token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if !form.is_empty() {
            request = request.form(form);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn find_node(&self, node: &NodeUpsert) -> Result<Option<ExistingNode>> {
        let form = [
            ("server_id", node.server_id.to_string()),
            ("identifier", node.identifier.clone()),
        ];
        let response = self
            .send_form("node_exists", Method::POST, NODE_EXISTS_PATH, &[], &form)
            .await?;
        let text = response.text().await?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(trimmed).map_err(|e| decode_error("node_exists", e))
    }

    async fn upsert_once(&self, node: &NodeUpsert) -> Result<()> {
        let form = node_form(node);
        match self.find_node(node).await? {
            None => {
                tracing::debug!(
                    server_id = %node.server_id,
                    identifier = %node.identifier,
                    "Creating node"
                );
                self.send_form("node_create", Method::POST, NODE_CREATE_PATH, &[], &form)
                    .await?;
            }
            Some(existing) => {
                tracing::debug!(
                    server_id = %node.server_id,
                    identifier = %node.identifier,
                    record_id = existing.id,
                    "Updating node"
                );
                let query = [("id", existing.id.to_string())];
                self.send_form("node_update", Method::PATCH, NODE_UPDATE_PATH, &query, &form)
                    .await?;
            }
        }
        Ok(())
    }

    async fn list_servers_once(&self) -> Result<Vec<Server>> {
        let query = [("filter[scan_required]", "1".to_string())];
        let response = self
            .send_form("list_servers", Method::GET, SERVER_INDEX_PATH, &query, &[])
            .await?;
        let text = response.text().await?;
        parse_server_list(&text)
    }

    async fn post_once(
        &self,
        operation: &'static str,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<()> {
        self.send_form(operation, Method::POST, path, &[], form).await?;
        Ok(())
    }

    async fn update_server_once(&self, server_id: ServerId, form: &[(&str, String)]) -> Result<()> {
        let query = [("id", server_id.to_string())];
        self.send_form("server_update", Method::PATCH, SERVER_UPDATE_PATH, &query, form)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn available(&self) -> bool {
        let url = match self.endpoint(PING_PATH) {
            Ok(url) => url,
            Err(_) => return false,
        };
        match self.http_client.get(url).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::debug!(error = %e, "Backend ping failed");
                false
            }
        }
    }

    async fn servers_due_for_scan(&self) -> Result<Vec<Server>> {
        self.retry
            .run("list_servers", || self.list_servers_once())
            .await
    }

    async fn upsert_node(&self, node: &NodeUpsert) -> Result<()> {
        self.retry.run("upsert_node", || self.upsert_once(node)).await
    }

    async fn reset_server(&self, server_id: ServerId, checked_at: CheckTimestamp) -> Result<()> {
        let form = [
            ("checked_at", checked_at.to_string()),
            ("scan_required", "0".to_string()),
        ];
        self.retry
            .run("reset_server", || self.update_server_once(server_id, &form))
            .await
    }

    async fn delete_outdated_nodes(
        &self,
        server_id: ServerId,
        checked_at: CheckTimestamp,
    ) -> Result<()> {
        let form = [
            ("server_id", server_id.to_string()),
            ("checked_at", checked_at.to_string()),
        ];
        self.retry
            .run("delete_outdated_nodes", || {
                self.post_once("delete_outdated_nodes", NODE_DELETE_UNCHECKED_PATH, &form)
            })
            .await
    }

    async fn set_server_error(
        &self,
        server_id: ServerId,
        error: &str,
        checked_at: CheckTimestamp,
    ) -> Result<()> {
        let form = [
            ("has_connection_error", "1".to_string()),
            ("connection_error", error.to_string()),
            ("checked_at", checked_at.to_string()),
        ];
        self.retry
            .run("set_server_error", || self.update_server_once(server_id, &form))
            .await
    }
}

fn normalize_base_url(api_url: &str) -> Result<Url> {
    let mut url = Url::parse(api_url)
        .map_err(|e| BackendError::Config(format!("invalid API URL {}: {}", api_url, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn flag(value: bool) -> String {
    let digit = if value { "1" } else { "0" };
    digit.to_string()
}

fn node_form(node: &NodeUpsert) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("server_id", node.server_id.to_string()),
        ("identifier", node.identifier.clone()),
        ("display_name", node.display_name.clone()),
        ("checked_at", node.checked_at.to_string()),
        ("path", node.path.clone()),
        ("readable", flag(node.readable)),
        ("writable", flag(node.writable)),
        ("data_type", node.data_type.clone()),
        ("virtual", flag(node.is_virtual)),
    ];
    if let Some(parent) = &node.parent_identifier {
        form.push(("parent_identifier", parent.clone()));
    }
    form
}

/// The index endpoint answers with a bare array or `{"data": [...]}`,
/// depending on the pagination mode.
fn parse_server_list(text: &str) -> Result<Vec<Server>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ServerIndex {
        List(Vec<Server>),
        Paged { data: Vec<Server> },
    }

    match serde_json::from_str::<ServerIndex>(text) {
        Ok(ServerIndex::List(servers)) | Ok(ServerIndex::Paged { data: servers }) => Ok(servers),
        Err(e) => Err(decode_error("list_servers", e)),
    }
}
