//! Open documents, keyed by path, in tab order.
//!
//! The registry is the single source of truth for "what is open" and "what
//! is dirty". It owns each document's editor widget and disposes it on every
//! removal path (close, bulk clear, widget replacement).

use std::fmt;

use crate::bridge::{file_name, rebase_path};
use crate::widgets::EditorWidget;

/// Stable tab identity. Displayed as `tab-N`; ids are never reused within a
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// One open file.
pub struct Document {
    pub id: TabId,
    pub path: String,
    pub display_name: String,
    buffer_content: String,
    saved_content: String,
    dirty: bool,
    widget: Option<Box<dyn EditorWidget>>,
}

impl Document {
    /// Text currently in the editor.
    pub fn buffer_content(&self) -> &str {
        &self.buffer_content
    }

    /// Text last read from or written to disk.
    pub fn saved_content(&self) -> &str {
        &self.saved_content
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_widget(&self) -> bool {
        self.widget.is_some()
    }

    /// Editor language id for this document.
    pub fn language(&self) -> &'static str {
        language_for_file(&self.display_name)
    }

    fn dispose_widget(&mut self) {
        if let Some(mut widget) = self.widget.take() {
            widget.dispose();
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("dirty", &self.dirty)
            .field("has_widget", &self.widget.is_some())
            .finish()
    }
}

/// Registry of open documents.
#[derive(Debug)]
pub struct SessionRegistry {
    docs: Vec<Document>,
    active_path: Option<String>,
    next_id: u64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { docs: Vec::new(), active_path: None, next_id: 1 }
    }

    /// Open `path`, or return the id of the document already open there.
    /// An existing document's content is left untouched.
    pub fn open(&mut self, display_name: &str, path: &str, initial_content: &str) -> TabId {
        if let Some(doc) = self.get_by_path(path) {
            return doc.id;
        }
        let id = TabId(self.next_id);
        self.next_id += 1;
        self.docs.push(Document {
            id,
            path: path.to_string(),
            display_name: display_name.to_string(),
            buffer_content: initial_content.to_string(),
            saved_content: initial_content.to_string(),
            dirty: false,
            widget: None,
        });
        tracing::debug!(tab = %id, path, "document opened");
        id
    }

    /// Close a document, disposing its widget. Returns `false` for an
    /// unknown id. Never persists anything.
    pub fn close(&mut self, id: TabId) -> bool {
        let Some(idx) = self.docs.iter().position(|d| d.id == id) else {
            tracing::debug!(tab = %id, "close ignored: unknown tab");
            return false;
        };
        let mut doc = self.docs.remove(idx);
        doc.dispose_widget();
        if self.active_path.as_deref() == Some(doc.path.as_str()) {
            self.active_path = None;
        }
        true
    }

    /// Make `id` the active document. Unknown ids are ignored.
    pub fn set_active(&mut self, id: TabId) -> bool {
        match self.docs.iter().find(|d| d.id == id) {
            Some(doc) => {
                self.active_path = Some(doc.path.clone());
                true
            }
            None => {
                tracing::debug!(tab = %id, "activate ignored: unknown tab");
                false
            }
        }
    }

    /// Record new buffer text for `path`. With `is_save` the text also
    /// becomes the saved baseline. Returns `false` for an unknown path.
    pub fn update_content(&mut self, path: &str, content: &str, is_save: bool) -> bool {
        let Some(doc) = self.get_by_path_mut(path) else {
            tracing::debug!(path, "content update ignored: not open");
            return false;
        };
        doc.buffer_content = content.to_string();
        if is_save {
            doc.saved_content = content.to_string();
        }
        doc.dirty = doc.buffer_content != doc.saved_content;
        true
    }

    /// The current buffer becomes the saved baseline.
    pub fn mark_saved(&mut self, path: &str) -> bool {
        match self.get_by_path_mut(path) {
            Some(doc) => {
                doc.saved_content = doc.buffer_content.clone();
                doc.dirty = false;
                true
            }
            None => false,
        }
    }

    /// Re-key every document at or below `old_root` to the same place under
    /// `new_root` after a rename or move on disk. Ids, buffers, dirty state
    /// and widgets are kept. Returns the ids that moved.
    pub fn relocate(&mut self, old_root: &str, new_root: &str) -> Vec<TabId> {
        let mut moved = Vec::new();
        for doc in self.docs.iter_mut() {
            let Some(new_path) = rebase_path(&doc.path, old_root, new_root) else {
                continue;
            };
            if self.active_path.as_deref() == Some(doc.path.as_str()) {
                self.active_path = Some(new_path.clone());
            }
            tracing::debug!(tab = %doc.id, from = %doc.path, to = %new_path, "document relocated");
            doc.display_name = file_name(&new_path).to_string();
            doc.path = new_path;
            moved.push(doc.id);
        }
        moved
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.docs.iter().any(|d| d.dirty)
    }

    pub fn unsaved(&self) -> Vec<&Document> {
        self.docs.iter().filter(|d| d.dirty).collect()
    }

    /// Bind an editor widget to a document, disposing any previous one.
    /// The widget is disposed immediately when `id` is unknown.
    pub fn attach_widget(&mut self, id: TabId, mut widget: Box<dyn EditorWidget>) -> bool {
        match self.get_mut(id) {
            Some(doc) => {
                doc.dispose_widget();
                doc.widget = Some(widget);
                true
            }
            None => {
                tracing::debug!(tab = %id, "widget dropped: unknown tab");
                widget.dispose();
                false
            }
        }
    }

    pub fn widget(&self, id: TabId) -> Option<&dyn EditorWidget> {
        self.get(id).and_then(|d| d.widget.as_deref())
    }

    pub fn widget_mut(&mut self, id: TabId) -> Option<&mut (dyn EditorWidget + 'static)> {
        self.get_mut(id).and_then(|d| d.widget.as_deref_mut())
    }

    /// Close every document, disposing all widgets.
    pub fn clear(&mut self) {
        for doc in self.docs.iter_mut() {
            doc.dispose_widget();
        }
        self.docs.clear();
        self.active_path = None;
    }

    pub fn get(&self, id: TabId) -> Option<&Document> {
        self.docs.iter().find(|d| d.id == id)
    }

    fn get_mut(&mut self, id: TabId) -> Option<&mut Document> {
        self.docs.iter_mut().find(|d| d.id == id)
    }

    pub fn get_by_path(&self, path: &str) -> Option<&Document> {
        self.docs.iter().find(|d| d.path == path)
    }

    fn get_by_path_mut(&mut self, path: &str) -> Option<&mut Document> {
        self.docs.iter_mut().find(|d| d.path == path)
    }

    pub fn active(&self) -> Option<&Document> {
        let path = self.active_path.as_deref()?;
        self.get_by_path(path)
    }

    pub fn active_id(&self) -> Option<TabId> {
        self.active().map(|d| d.id)
    }

    /// Documents in the order they were opened.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    pub fn last(&self) -> Option<&Document> {
        self.docs.last()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Editor language id for a file name, by extension.
pub fn language_for_file(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "html" => "html",
        "css" => "css",
        "json" => "json",
        "md" => "markdown",
        "txt" => "plaintext",
        "xml" => "xml",
        "java" => "java",
        "c" => "c",
        "cpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "rb" => "ruby",
        "go" => "go",
        "rs" => "rust",
        "swift" => "swift",
        "kt" => "kotlin",
        "sql" => "sql",
        "yaml" | "yml" => "yaml",
        _ => "plaintext",
    }
}
