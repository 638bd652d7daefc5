//! File-system bridge: the host process that owns the disk.
//!
//! The workspace never touches files itself. Every operation is a request to
//! the bridge answered with a [`BridgeResponse`] envelope. [`HttpBridge`]
//! speaks JSON over HTTP to a local host (`POST <base>/api/<method>`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::BridgeError;

pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8001";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

/// One entry of the workspace tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Depth-first walk over `nodes` and all their descendants.
    pub fn walk<'a>(nodes: &'a [TreeNode], f: &mut dyn FnMut(&'a TreeNode)) {
        for node in nodes {
            f(node);
            Self::walk(&node.children, f);
        }
    }

    pub fn find<'a>(nodes: &'a [TreeNode], path: &str) -> Option<&'a TreeNode> {
        for node in nodes {
            if node.path == path {
                return Some(node);
            }
            if let Some(found) = Self::find(&node.children, path) {
                return Some(found);
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renamed {
    pub old_path: String,
    pub new_path: String,
}

/// Envelope every bridge call answers with. `status` is `ok` or `success`
/// on success; anything else is a rejection described by `message`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tree: Vec<TreeNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub moved: Vec<Transfer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub copied: Vec<Transfer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub renamed: Vec<Renamed>,
}

impl BridgeResponse {
    pub fn ok() -> Self {
        Self { status: "ok".to_string(), ..Default::default() }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self { status: "error".to_string(), message: Some(message.into()), ..Default::default() }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok" || self.status == "success"
    }

    /// Turn a non-ok envelope into [`BridgeError::Rejected`].
    pub fn into_result(self) -> Result<Self, BridgeError> {
        if self.is_ok() {
            Ok(self)
        } else {
            let msg = match self.message {
                Some(m) if !m.trim().is_empty() => m,
                _ => format!("Operation failed (status: {})", self.status),
            };
            Err(BridgeError::Rejected(msg))
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait FileSystemBridge: Send + Sync {
    /// Nested tree of `root`.
    async fn list_tree(&self, root: &str) -> Result<Vec<TreeNode>, BridgeError>;

    async fn read_file(&self, path: &str) -> Result<String, BridgeError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<BridgeResponse, BridgeError>;

    async fn write_file_as(&self, new_path: &str, content: &str) -> Result<BridgeResponse, BridgeError>;

    /// Success payload carries the new `path`.
    async fn create_file(&self, parent: &str, name: &str) -> Result<BridgeResponse, BridgeError>;

    /// Success payload carries the new `path`.
    async fn create_folder(&self, parent: &str, name: &str) -> Result<BridgeResponse, BridgeError>;

    async fn rename(&self, old_path: &str, new_name: &str) -> Result<BridgeResponse, BridgeError>;

    /// Success payload lists the `deleted` paths.
    async fn delete(&self, paths: &[String]) -> Result<BridgeResponse, BridgeError>;

    async fn cut_stage(&self, paths: &[String]) -> Result<BridgeResponse, BridgeError>;

    async fn copy_stage(&self, paths: &[String]) -> Result<BridgeResponse, BridgeError>;

    /// Move the cut-staged items into `destination`.
    async fn paste_move(&self, destination: &str) -> Result<BridgeResponse, BridgeError>;

    /// Copy the copy-staged items into `destination`.
    async fn paste_copy(&self, destination: &str) -> Result<BridgeResponse, BridgeError>;

    /// Start the long-running project update action. Returns once the host
    /// has accepted the request.
    async fn update_project(&self, root: &str) -> Result<BridgeResponse, BridgeError>;

    /// Ask the assistant model for a reply to `prompt`.
    async fn send_model_response(&self, prompt: &str) -> Result<String, BridgeError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpBridge {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBridge {
    pub fn new(base_url: &str) -> Result<Self, String> {
        let parsed = url::Url::parse(base_url).map_err(|e| format!("Invalid bridge URL {base_url}: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("Unsupported bridge URL scheme: {}", parsed.scheme()));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        })
    }

    async fn call(&self, method: &str, args: Value) -> Result<BridgeResponse, BridgeError> {
        let url = format!("{}/api/{}", self.base_url, method);
        let resp = self
            .client
            .post(&url)
            .json(&args)
            .send()
            .await
            .map_err(|e| BridgeError::Unreachable(format!("{method}: {e}")))?;

        let http_status = resp.status();
        let envelope: BridgeResponse = resp.json().await.map_err(|e| {
            BridgeError::Unreachable(format!("{method}: invalid response (HTTP {http_status}): {e}"))
        })?;
        tracing::debug!(method, status = %envelope.status, "bridge call");
        envelope.into_result()
    }
}

#[async_trait]
impl FileSystemBridge for HttpBridge {
    async fn list_tree(&self, root: &str) -> Result<Vec<TreeNode>, BridgeError> {
        Ok(self.call("list_tree", json!({ "root": root })).await?.tree)
    }

    async fn read_file(&self, path: &str) -> Result<String, BridgeError> {
        let resp = self.call("read_file", json!({ "path": path })).await?;
        Ok(resp.content.unwrap_or_default())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<BridgeResponse, BridgeError> {
        self.call("write_file", json!({ "path": path, "content": content })).await
    }

    async fn write_file_as(&self, new_path: &str, content: &str) -> Result<BridgeResponse, BridgeError> {
        self.call("write_file_as", json!({ "new_path": new_path, "content": content })).await
    }

    async fn create_file(&self, parent: &str, name: &str) -> Result<BridgeResponse, BridgeError> {
        self.call("create_file", json!({ "parent": parent, "name": name })).await
    }

    async fn create_folder(&self, parent: &str, name: &str) -> Result<BridgeResponse, BridgeError> {
        self.call("create_folder", json!({ "parent": parent, "name": name })).await
    }

    async fn rename(&self, old_path: &str, new_name: &str) -> Result<BridgeResponse, BridgeError> {
        self.call("rename", json!({ "old_path": old_path, "new_name": new_name })).await
    }

    async fn delete(&self, paths: &[String]) -> Result<BridgeResponse, BridgeError> {
        self.call("delete", json!({ "paths": paths })).await
    }

    async fn cut_stage(&self, paths: &[String]) -> Result<BridgeResponse, BridgeError> {
        self.call("cut_stage", json!({ "paths": paths })).await
    }

    async fn copy_stage(&self, paths: &[String]) -> Result<BridgeResponse, BridgeError> {
        self.call("copy_stage", json!({ "paths": paths })).await
    }

    async fn paste_move(&self, destination: &str) -> Result<BridgeResponse, BridgeError> {
        self.call("paste_move", json!({ "destination": destination })).await
    }

    async fn paste_copy(&self, destination: &str) -> Result<BridgeResponse, BridgeError> {
        self.call("paste_copy", json!({ "destination": destination })).await
    }

    async fn update_project(&self, root: &str) -> Result<BridgeResponse, BridgeError> {
        self.call("update_project", json!({ "root": root })).await
    }

    async fn send_model_response(&self, prompt: &str) -> Result<String, BridgeError> {
        let resp = self.call("send_model_response", json!({ "prompt": prompt })).await?;
        Ok(resp.content.or(resp.message).unwrap_or_default())
    }
}

/// Last path segment, accepting either separator.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
}

/// Parent directory of `path`, or `""` for a bare name.
pub fn parent_dir(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(0) => &trimmed[..1],
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// `path` equals `root` or lies somewhere below it.
pub fn is_within(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches(['/', '\\']);
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '\\']),
        None => false,
    }
}

/// Move `path` from under `old_root` to under `new_root`. `None` when
/// `path` is not within `old_root`.
pub fn rebase_path(path: &str, old_root: &str, new_root: &str) -> Option<String> {
    if !is_within(path, old_root) {
        return None;
    }
    let rest = &path[old_root.trim_end_matches(['/', '\\']).len()..];
    Some(format!("{}{rest}", new_root.trim_end_matches(['/', '\\'])))
}

pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with(['/', '\\']) {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

// ---------------------------------------------------------------------------
// In-memory bridge for tests
// ---------------------------------------------------------------------------
