use serde::Serialize;

use crate::bridge::{is_within, TreeNode};
use crate::clipboard::{resolve_paste_target, ClipboardState, FocusContext};

/// Which panels are on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub sidebar_visible: bool,
    pub terminal_visible: bool,
    pub chat_visible: bool,
    pub fullscreen: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            sidebar_visible: true,
            terminal_visible: true,
            chat_visible: false,
            fullscreen: false,
        }
    }
}

/// Phrases that turn a chat message into a project update request.
const UPDATE_TRIGGERS: &[&str] = &[
    "hold my tea",
    "update folder",
    "update project",
    "update my project",
    "update whole project",
    "update kr",
    "update kar",
    "folder update",
    "project update",
];

/// True when `text` asks for the whole project to be updated.
pub fn is_update_request(text: &str) -> bool {
    let text = text.to_lowercase();
    UPDATE_TRIGGERS.iter().any(|t| text.contains(t))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

/// The assistant chat box: the text being typed and the conversation so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatInput {
    pub text: String,
    pub all_selected: bool,
    pub history: Vec<ChatMessage>,
    /// A project update was requested from the chat and has not reported back.
    pub update_pending: bool,
}

impl ChatInput {
    pub fn push(&mut self, role: ChatRole, text: impl Into<String>) {
        self.history.push(ChatMessage { role, text: text.into() });
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::Assistant)
            .map(|m| m.text.as_str())
    }

    pub fn selection(&self) -> Option<&str> {
        (self.all_selected && !self.text.is_empty()).then_some(self.text.as_str())
    }

    pub fn insert(&mut self, text: &str) {
        if self.all_selected {
            self.text.clear();
            self.all_selected = false;
        }
        self.text.push_str(text);
    }
}

/// UI state owned by the workspace. Everything a handler needs to know
/// about "what is selected where" lives here rather than in globals.
#[derive(Debug, Default, Serialize)]
pub struct AppState {
    pub layout: Layout,
    pub focus: FocusContext,
    pub workspace_root: Option<String>,
    pub tree: Vec<TreeNode>,
    /// Path of the highlighted tree row.
    pub selected_item: Option<String>,
    pub last_clicked_folder: Option<String>,
    /// Folder chosen through "Paste here" in the context menu.
    pub paste_target: Option<String>,
    pub clipboard: ClipboardState,
    pub chat: ChatInput,
}

impl AppState {
    pub fn new(workspace_root: Option<String>) -> Self {
        Self { workspace_root, ..Self::default() }
    }

    /// Highlight a tree row. Clicking a folder also makes it the paste
    /// destination.
    pub fn select_tree_item(&mut self, path: &str) {
        self.selected_item = Some(path.to_string());
        match TreeNode::find(&self.tree, path) {
            Some(node) if node.is_folder() => self.last_clicked_folder = Some(path.to_string()),
            Some(_) => {}
            None => tracing::debug!("selected path {path} is not in the tree"),
        }
    }

    pub fn paste_destination(&self) -> Option<String> {
        resolve_paste_target(
            self.last_clicked_folder.as_deref(),
            self.paste_target.as_deref(),
            self.workspace_root.as_deref(),
        )
    }

    /// Switch to a different folder. Selections and the file-tree clipboard
    /// refer to the old tree and are dropped.
    pub fn reset_for_workspace(&mut self, root: &str) {
        self.workspace_root = Some(root.to_string());
        self.tree.clear();
        self.selected_item = None;
        self.last_clicked_folder = None;
        self.paste_target = None;
        self.clipboard.clear();
    }

    /// Forget selections at or below `path` once it is gone from disk.
    pub fn forget_path(&mut self, path: &str) {
        let under = |p: &Option<String>| p.as_deref().is_some_and(|p| is_within(p, path));
        if under(&self.selected_item) {
            self.selected_item = None;
        }
        if under(&self.last_clicked_folder) {
            self.last_clicked_folder = None;
        }
        if under(&self.paste_target) {
            self.paste_target = None;
        }
    }
}
