//! Copy, cut and paste across the four focus contexts.
//!
//! Editor, chat and terminal go through the system clipboard. The file tree
//! has its own clipboard: a cut or copy is staged on the bridge first and
//! only mirrored into [`ClipboardState`] once the bridge accepted it.

use serde::Serialize;

use crate::bridge::{file_name, join_path, FileSystemBridge, Transfer};
use crate::commands::KeyChord;
use crate::status_log::{StatusKind, StatusLog};

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Region of the window that last received focus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusContext {
    #[default]
    Editor,
    Terminal,
    Chat,
    Explorer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardAction {
    Copy,
    Cut,
    Paste,
    SelectAll,
}

/// Map a key chord to a clipboard action for the focused region.
///
/// Ctrl (or Cmd) is always required. The terminal takes Ctrl+Shift+C/V so
/// that plain Ctrl+C still reaches the shell as an interrupt; every other
/// region rejects Shift.
pub fn route(focus: FocusContext, chord: &KeyChord) -> Option<ClipboardAction> {
    if !chord.ctrl || chord.alt {
        return None;
    }
    let key = chord.key.as_str();
    match focus {
        FocusContext::Terminal => match (chord.shift, key) {
            (true, "c") => Some(ClipboardAction::Copy),
            (true, "v") => Some(ClipboardAction::Paste),
            _ => None,
        },
        _ if chord.shift => None,
        FocusContext::Editor => match key {
            "c" => Some(ClipboardAction::Copy),
            "x" => Some(ClipboardAction::Cut),
            "v" => Some(ClipboardAction::Paste),
            "a" => Some(ClipboardAction::SelectAll),
            _ => None,
        },
        FocusContext::Chat => match key {
            "c" => Some(ClipboardAction::Copy),
            "v" => Some(ClipboardAction::Paste),
            "a" => Some(ClipboardAction::SelectAll),
            _ => None,
        },
        FocusContext::Explorer => match key {
            "c" => Some(ClipboardAction::Copy),
            "x" => Some(ClipboardAction::Cut),
            "v" => Some(ClipboardAction::Paste),
            _ => None,
        },
    }
}

// ---------------------------------------------------------------------------
// System clipboard
// ---------------------------------------------------------------------------

pub trait SystemClipboard {
    fn get_text(&mut self) -> Result<String, String>;
    fn set_text(&mut self, text: &str) -> Result<(), String>;
}

/// OS clipboard through `arboard`. Unavailable on headless hosts, in which
/// case every call fails and the caller reports it.
pub struct ArboardClipboard {
    clipboard: Option<arboard::Clipboard>,
}

impl ArboardClipboard {
    pub fn new() -> Self {
        let clipboard = arboard::Clipboard::new()
            .inspect_err(|e| tracing::warn!("system clipboard unavailable: {e}"))
            .ok();
        Self { clipboard }
    }

    pub fn is_available(&self) -> bool {
        self.clipboard.is_some()
    }
}

impl Default for ArboardClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClipboard for ArboardClipboard {
    fn get_text(&mut self) -> Result<String, String> {
        let clipboard = self.clipboard.as_mut().ok_or("Clipboard not available")?;
        clipboard.get_text().map_err(|e| format!("Failed to read clipboard: {e}"))
    }

    fn set_text(&mut self, text: &str) -> Result<(), String> {
        let clipboard = self.clipboard.as_mut().ok_or("Clipboard not available")?;
        clipboard
            .set_text(text.to_string())
            .map_err(|e| format!("Failed to write clipboard: {e}"))
    }
}

/// Process-local clipboard, used when the OS one is unavailable.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    text: Option<String>,
}

impl SystemClipboard for MemoryClipboard {
    fn get_text(&mut self) -> Result<String, String> {
        self.text.clone().ok_or_else(|| "Clipboard is empty".to_string())
    }

    fn set_text(&mut self, text: &str) -> Result<(), String> {
        self.text = Some(text.to_string());
        Ok(())
    }
}

/// The OS clipboard when there is one, otherwise a process-local buffer.
pub fn system_clipboard() -> Box<dyn SystemClipboard> {
    let os = ArboardClipboard::new();
    if os.is_available() {
        Box::new(os)
    } else {
        Box::new(MemoryClipboard::default())
    }
}

// ---------------------------------------------------------------------------
// File-tree clipboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardKind {
    Cut,
    Copy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipboardItem {
    pub source_path: String,
    pub name: String,
}

/// Items cut or copied in the file tree.
///
/// `kind()` is `None` exactly when there are no items; the fields are
/// private so nothing can break that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClipboardState {
    kind: Option<ClipboardKind>,
    items: Vec<ClipboardItem>,
}

impl ClipboardState {
    pub fn kind(&self) -> Option<ClipboardKind> {
        self.kind
    }

    pub fn items(&self) -> &[ClipboardItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the contents. An empty `paths` clears the state.
    pub fn set(&mut self, kind: ClipboardKind, paths: &[String]) {
        self.items = paths
            .iter()
            .map(|p| ClipboardItem { source_path: p.clone(), name: file_name(p).to_string() })
            .collect();
        self.kind = if self.items.is_empty() { None } else { Some(kind) };
    }

    pub fn clear(&mut self) {
        self.kind = None;
        self.items.clear();
    }

    /// Context-menu label for the paste entry.
    pub fn paste_label(&self) -> String {
        match self.items.as_slice() {
            [] => "Paste".to_string(),
            [a] => format!("Paste \"{}\"", a.name),
            [a, b] => format!("Paste \"{}\" and \"{}\"", a.name, b.name),
            [a, b, rest @ ..] => {
                format!("Paste \"{}\", \"{}\" and {} more", a.name, b.name, rest.len())
            }
        }
    }
}

/// Where a paste lands: the folder clicked last, then the explicit paste
/// target, then the workspace root.
pub fn resolve_paste_target(
    last_clicked_folder: Option<&str>,
    paste_target: Option<&str>,
    workspace_root: Option<&str>,
) -> Option<String> {
    last_clicked_folder
        .or(paste_target)
        .or(workspace_root)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Stage `paths` on the bridge as a cut or copy and mirror it locally.
///
/// On any failure the local state is left exactly as it was. Returns whether
/// the stage was accepted.
pub async fn stage(
    bridge: &dyn FileSystemBridge,
    state: &mut ClipboardState,
    kind: ClipboardKind,
    paths: &[String],
    status: &mut StatusLog,
) -> bool {
    if paths.is_empty() {
        tracing::debug!("clipboard stage with no selection ignored");
        return false;
    }

    let result = match kind {
        ClipboardKind::Cut => bridge.cut_stage(paths).await,
        ClipboardKind::Copy => bridge.copy_stage(paths).await,
    };

    match result {
        Ok(_) => {
            state.set(kind, paths);
            let n = state.items().len();
            match kind {
                ClipboardKind::Cut => status.push(StatusKind::Cut, format!("Cut {n} item(s)")),
                ClipboardKind::Copy => status.push(StatusKind::Copy, format!("Copied {n} item(s)")),
            };
            true
        }
        Err(e) => {
            let fallback = match kind {
                ClipboardKind::Cut => "Error cutting items",
                ClipboardKind::Copy => "Error copying items",
            };
            tracing::warn!("clipboard stage failed: {e}");
            status.error(e.user_message(fallback));
            false
        }
    }
}

/// Paste the staged items into `destination`.
///
/// A successful cut-paste empties the state; a copy-paste keeps it so the
/// same items can be pasted again. Returns `None` when nothing was pasted,
/// otherwise the items that moved (always empty for a copy).
pub async fn paste(
    bridge: &dyn FileSystemBridge,
    state: &mut ClipboardState,
    destination: Option<&str>,
    status: &mut StatusLog,
) -> Option<Vec<Transfer>> {
    let Some(kind) = state.kind() else {
        status.info("Nothing to paste");
        return None;
    };
    let Some(destination) = destination else {
        status.error("Select a folder to paste into");
        return None;
    };

    let result = match kind {
        ClipboardKind::Cut => bridge.paste_move(destination).await,
        ClipboardKind::Copy => bridge.paste_copy(destination).await,
    };

    match result {
        Ok(resp) => match kind {
            ClipboardKind::Cut => {
                let moved = if resp.moved.is_empty() {
                    state
                        .items()
                        .iter()
                        .map(|item| Transfer {
                            from: item.source_path.clone(),
                            to: join_path(destination, &item.name),
                        })
                        .collect()
                } else {
                    resp.moved
                };
                status.info(format!("Moved {} item(s)", moved.len()));
                state.clear();
                Some(moved)
            }
            ClipboardKind::Copy => {
                let n = if resp.copied.is_empty() { state.items().len() } else { resp.copied.len() };
                status.info(format!("Copied {n} item(s)"));
                Some(Vec::new())
            }
        },
        Err(e) => {
            tracing::warn!("paste into {destination} failed: {e}");
            status.error(e.user_message("Error pasting items"));
            None
        }
    }
}
