//! The workspace: tabs, file tree, terminal panel and clipboard wired
//! together.
//!
//! [`WorkspaceView`] owns every piece of UI state and every collaborator
//! handle. Hosts feed it user gestures (key chords, clicks, focus changes)
//! and transport events; it answers by driving the registry, the shell
//! session and the bridge, and by appending to the status log.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::bridge::{
    file_name, is_within, join_path, parent_dir, BridgeResponse, FileSystemBridge, NodeKind, TreeNode,
};
use crate::clipboard::{self, ClipboardAction, ClipboardKind, FocusContext, SystemClipboard};
use crate::commands::{CommandId, KeyChord, Keymap};
use crate::config::{RecentProjects, SettingsStore};
use crate::error::BridgeError;
use crate::registry::{SessionRegistry, TabId};
use crate::search::{self, MatchType, SearchState};
use crate::shell::{markers, ConnectionState, ShellConfig, ShellEvent, ShellSession, ShellTransport, TransportEvent};
use crate::state::{is_update_request, AppState, ChatRole};
use crate::status_log::{StatusKind, StatusLog};
use crate::widgets::WidgetFactory;

/// Questions the workspace has to ask the user.
pub trait Prompt: Send {
    /// Yes/no question. `true` means yes.
    fn confirm(&mut self, message: &str) -> bool;
    /// Free-text question with a pre-filled default. `None` when cancelled.
    fn input(&mut self, message: &str, default: &str) -> Option<String>;
}

/// Result of a key chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    /// An editor action the widget itself implements (find, replace, go to
    /// definition, debugging).
    Forward(CommandId),
    /// Not bound; the host passes the key on (e.g. to the terminal).
    Ignored,
}

/// Completion of work started in the background.
#[derive(Debug)]
pub enum BackgroundEvent {
    ProjectUpdated(Result<BridgeResponse, BridgeError>),
    ChatReply(Result<String, BridgeError>),
}

/// External handles the workspace drives.
pub struct Collaborators {
    pub bridge: Arc<dyn FileSystemBridge>,
    pub transport: Box<dyn ShellTransport>,
    pub widgets: Box<dyn WidgetFactory>,
    pub prompt: Box<dyn Prompt>,
    pub clipboard: Box<dyn SystemClipboard>,
}

/// Settings and paths the workspace starts from.
pub struct WorkspaceConfig {
    pub settings: SettingsStore,
    pub keymap: Keymap,
    pub recent: RecentProjects,
    /// Where `recent.json` is written. `None` keeps it in memory.
    pub config_dir: Option<PathBuf>,
    pub shell: ShellConfig,
    pub workspace_root: Option<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            settings: SettingsStore::in_memory(),
            keymap: Keymap::default(),
            recent: RecentProjects::default(),
            config_dir: None,
            shell: ShellConfig::default(),
            workspace_root: None,
        }
    }
}

pub struct WorkspaceView {
    pub state: AppState,
    pub registry: SessionRegistry,
    pub shell: ShellSession,
    pub search: SearchState,
    pub status: StatusLog,
    settings: SettingsStore,
    keymap: Keymap,
    recent: RecentProjects,
    config_dir: Option<PathBuf>,
    path_status: String,
    /// Run request (language, control message) waiting for the terminal
    /// to connect.
    pending_run: Option<(String, String)>,
    exiting: bool,
    bridge: Arc<dyn FileSystemBridge>,
    widgets: Box<dyn WidgetFactory>,
    prompt: Box<dyn Prompt>,
    clipboard: Box<dyn SystemClipboard>,
    background: mpsc::UnboundedSender<BackgroundEvent>,
}

impl WorkspaceView {
    pub fn new(
        collaborators: Collaborators,
        config: WorkspaceConfig,
    ) -> (Self, mpsc::UnboundedReceiver<BackgroundEvent>) {
        let (background, background_rx) = mpsc::unbounded_channel();
        let root = config
            .workspace_root
            .or_else(|| config.recent.latest().map(|p| p.path.clone()));
        let shell = ShellSession::new(collaborators.transport, &config.shell);
        let path_status = shell.path_status();
        let view = Self {
            state: AppState::new(root),
            registry: SessionRegistry::new(),
            shell,
            search: SearchState::default(),
            status: StatusLog::default(),
            settings: config.settings,
            keymap: config.keymap,
            recent: config.recent,
            config_dir: config.config_dir,
            path_status,
            pending_run: None,
            exiting: false,
            bridge: collaborators.bridge,
            widgets: collaborators.widgets,
            prompt: collaborators.prompt,
            clipboard: collaborators.clipboard,
            background,
        };
        (view, background_rx)
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SettingsStore {
        &mut self.settings
    }

    /// Merge and persist `partial`, then push the new editor options to
    /// every mounted editor. Nothing changes when the write fails.
    pub fn update_settings(&mut self, partial: Map<String, Value>) -> bool {
        if let Err(e) = self.settings.update(partial) {
            tracing::error!("settings: {e}");
            self.status.error(e);
            return false;
        }
        let options = self.settings.editor_options();
        let ids: Vec<TabId> = self.registry.documents().map(|d| d.id).collect();
        for id in ids {
            if let Some(widget) = self.registry.widget_mut(id) {
                widget.update_options(&options);
            }
        }
        self.status.info("Settings saved");
        true
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn recent_projects(&self) -> &RecentProjects {
        &self.recent
    }

    /// Working-directory text for the status bar.
    pub fn path_status(&self) -> &str {
        &self.path_status
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting
    }

    /// Mount the terminal, start connecting and load the tree.
    pub async fn startup(&mut self) {
        let terminal = self.widgets.create_terminal(&self.settings.terminal_options());
        self.shell.bind_terminal(terminal);
        let events = self.shell.start();
        self.apply_shell_events(events);
        self.refresh_tree().await;
    }

    // -----------------------------------------------------------------------
    // Tabs
    // -----------------------------------------------------------------------

    /// Open `path` in a tab, or switch to the tab already showing it.
    pub async fn open_file(&mut self, path: &str) -> Option<TabId> {
        if let Some(doc) = self.registry.get_by_path(path) {
            let id = doc.id;
            self.activate_tab(id);
            return Some(id);
        }
        let content = match self.bridge.read_file(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path, "open failed: {e}");
                let msg = match &e {
                    BridgeError::Unreachable(_) => e.user_message(""),
                    BridgeError::Rejected(m) => format!("Error opening file: {m}"),
                };
                self.status.error(msg);
                return None;
            }
        };
        let id = self.registry.open(file_name(path), path, &content);
        self.activate_tab(id);
        Some(id)
    }

    /// Show a tab, mounting its editor on first activation.
    pub fn activate_tab(&mut self, id: TabId) -> bool {
        if !self.registry.set_active(id) {
            return false;
        }
        if self.registry.widget(id).is_none()
            && let Some(doc) = self.registry.get(id)
        {
            let editor = self.widgets.create_editor(
                &doc.path,
                doc.language(),
                doc.buffer_content(),
                &self.settings.editor_options(),
            );
            self.registry.attach_widget(id, editor);
        }
        if let Some(widget) = self.registry.widget_mut(id) {
            widget.focus();
        }
        self.state.focus = FocusContext::Editor;
        true
    }

    /// The editor for `id` reported a change; pull its text into the
    /// registry.
    pub fn editor_changed(&mut self, id: TabId) -> bool {
        let Some(text) = self.registry.widget(id).map(|w| w.content()) else {
            return false;
        };
        let Some(path) = self.registry.get(id).map(|d| d.path.clone()) else {
            return false;
        };
        self.registry.update_content(&path, &text, false)
    }

    /// Close a tab, asking first when it has unsaved changes. Declining
    /// discards the edits; accepting closes only once the save went through.
    pub async fn close_tab(&mut self, id: TabId) -> bool {
        self.editor_changed(id);
        let Some(doc) = self.registry.get(id) else {
            tracing::debug!(tab = %id, "close ignored: unknown tab");
            return false;
        };
        if doc.is_dirty() {
            let question = format!("Save changes to \"{}\" before closing?", doc.display_name);
            if self.prompt.confirm(&question) && !self.save_tab(id).await {
                return false;
            }
        }
        self.registry.close(id);
        if let Some(last) = self.registry.last().map(|d| d.id) {
            self.activate_tab(last);
        }
        true
    }

    pub async fn save_tab(&mut self, id: TabId) -> bool {
        self.editor_changed(id);
        let Some(doc) = self.registry.get(id) else {
            return false;
        };
        let (path, content) = (doc.path.clone(), doc.buffer_content().to_string());
        match self.bridge.write_file(&path, &content).await {
            Ok(_) => {
                self.registry.update_content(&path, &content, true);
                self.status.info("File saved successfully");
                true
            }
            Err(e) => {
                tracing::warn!(path, "save failed: {e}");
                self.status.error(e.user_message("Save failed"));
                false
            }
        }
    }

    pub async fn save_active(&mut self) -> bool {
        match self.registry.active_id() {
            Some(id) => self.save_tab(id).await,
            None => {
                self.status.error("No file to save");
                false
            }
        }
    }

    /// Save the active buffer under a new path. The old document is
    /// dropped and a fresh one opened at the new path.
    pub async fn save_active_as(&mut self) -> bool {
        let Some(id) = self.registry.active_id() else {
            self.status.error("No file to save");
            return false;
        };
        self.editor_changed(id);
        let Some(doc) = self.registry.get(id) else {
            return false;
        };
        let (old_path, content) = (doc.path.clone(), doc.buffer_content().to_string());
        let new_path = match self.prompt.input("Enter new file path:", &old_path) {
            Some(p) if !p.trim().is_empty() => p.trim().to_string(),
            _ => return false,
        };

        if let Err(e) = self.bridge.write_file_as(&new_path, &content).await {
            tracing::warn!(path = new_path, "save as failed: {e}");
            self.status.error(e.user_message("Save as failed"));
            return false;
        }

        self.registry.close(id);
        let name = file_name(&new_path).to_string();
        let new_id = self.registry.open(&name, &new_path, &content);
        self.registry.update_content(&new_path, &content, true);
        self.activate_tab(new_id);
        self.status.info(format!("File saved as {name}"));
        true
    }

    // -----------------------------------------------------------------------
    // File tree
    // -----------------------------------------------------------------------

    pub async fn refresh_tree(&mut self) -> bool {
        let Some(root) = self.state.workspace_root.clone() else {
            return false;
        };
        match self.bridge.list_tree(&root).await {
            Ok(tree) => {
                self.state.tree = tree;
                true
            }
            Err(e) => {
                tracing::warn!(root, "tree reload failed: {e}");
                self.status.error(e.user_message("Error loading file tree"));
                false
            }
        }
    }

    /// Click on a tree row. Files open in a tab; focus stays on the tree.
    pub async fn click_tree_item(&mut self, path: &str) {
        self.state.select_tree_item(path);
        let is_file = TreeNode::find(&self.state.tree, path).is_some_and(|n| !n.is_folder());
        if is_file {
            self.open_file(path).await;
        }
        self.state.focus = FocusContext::Explorer;
    }

    /// Create a file or folder in the folder clicked last (or the root). A
    /// new file opens in a tab; a new folder becomes the selection.
    pub async fn create_item(&mut self, kind: NodeKind, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let Some(parent) = self
            .state
            .last_clicked_folder
            .clone()
            .or_else(|| self.state.workspace_root.clone())
        else {
            self.status.error("No folder is open");
            return false;
        };

        let result = match kind {
            NodeKind::File => self.bridge.create_file(&parent, name).await,
            NodeKind::Folder => self.bridge.create_folder(&parent, name).await,
        };
        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                let fallback = match kind {
                    NodeKind::File => "Error creating file",
                    NodeKind::Folder => "Error creating folder",
                };
                self.status.error(e.user_message(fallback));
                return false;
            }
        };
        let path = resp.path.unwrap_or_else(|| join_path(&parent, name));
        self.refresh_tree().await;
        match kind {
            NodeKind::File => {
                self.open_file(&path).await;
            }
            NodeKind::Folder => {
                self.status.info(format!("Folder \"{name}\" created"));
                self.state.select_tree_item(&path);
            }
        }
        true
    }

    /// Delete after confirmation. Tabs showing deleted files are closed
    /// without saving.
    pub async fn delete_items(&mut self, paths: &[String]) -> bool {
        if paths.is_empty() {
            self.status.error("No items selected for deletion");
            return false;
        }
        let names: Vec<&str> = paths.iter().map(|p| file_name(p)).collect();
        let what = if paths.len() > 1 { "these items" } else { "this item" };
        let question = format!("Are you sure you want to delete {what}?\n{}", names.join(", "));
        if !self.prompt.confirm(&question) {
            return false;
        }

        let resp = match self.bridge.delete(paths).await {
            Ok(resp) => resp,
            Err(e) => {
                self.status.error(e.user_message("Error deleting items"));
                return false;
            }
        };
        let deleted = if resp.deleted.is_empty() { paths.to_vec() } else { resp.deleted };
        for path in &deleted {
            self.close_documents_under(path);
            self.state.forget_path(path);
        }
        self.status.info(format!("Deleted {} item(s)", deleted.len()));
        self.refresh_tree().await;
        true
    }

    fn close_documents_under(&mut self, path: &str) {
        let doomed: Vec<TabId> = self
            .registry
            .documents()
            .filter(|d| is_within(&d.path, path))
            .map(|d| d.id)
            .collect();
        for id in doomed {
            self.registry.close(id);
        }
    }

    /// Rename a tree entry. Open tabs at or below it move to the new path
    /// and keep their unsaved edits.
    pub async fn rename_item(&mut self, old_path: &str, new_name: &str) -> bool {
        let new_name = new_name.trim();
        if old_path.is_empty() || new_name.is_empty() {
            return false;
        }
        let resp = match self.bridge.rename(old_path, new_name).await {
            Ok(resp) => resp,
            Err(e) => {
                self.status.error(e.user_message("Error renaming item"));
                return false;
            }
        };
        if resp.renamed.is_empty() {
            let new_path = resp.path.unwrap_or_else(|| join_path(parent_dir(old_path), new_name));
            self.registry.relocate(old_path, &new_path);
        } else {
            for moved in &resp.renamed {
                self.registry.relocate(&moved.old_path, &moved.new_path);
            }
        }
        self.state.forget_path(old_path);
        self.status.info(format!("Renamed to \"{new_name}\""));
        self.refresh_tree().await;
        true
    }

    /// Switch to another folder. Every tab is closed (after an unsaved
    /// changes check), the tree reloaded and the folder recorded as the most
    /// recent project.
    pub async fn open_folder(&mut self, path: &str) -> bool {
        let path = path.trim();
        if path.is_empty() {
            return false;
        }
        if self.registry.has_unsaved_changes()
            && !self
                .prompt
                .confirm("You have unsaved changes. Discard them and open another folder?")
        {
            return false;
        }
        self.registry.clear();
        self.search.clear();
        self.state.reset_for_workspace(path);
        self.refresh_tree().await;

        self.recent.record(file_name(path), path, path);
        if let Some(dir) = &self.config_dir
            && let Err(e) = self.recent.save(dir)
        {
            tracing::warn!("{e}");
        }
        self.status.info(format!("Folder opened: {path}"));
        true
    }

    // -----------------------------------------------------------------------
    // Terminal
    // -----------------------------------------------------------------------

    /// Feed a transport event to the shell session.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        let events = self.shell.handle(event);
        self.apply_shell_events(events);
    }

    fn apply_shell_events(&mut self, events: Vec<ShellEvent>) {
        for event in events {
            match event {
                ShellEvent::Status { text, persistent: true } => {
                    self.status.push_persistent(StatusKind::Error, text);
                }
                ShellEvent::Status { text, persistent: false } => self.path_status = text,
                ShellEvent::State(ConnectionState::Open) => self.flush_pending_run(),
                ShellEvent::Output(_) | ShellEvent::Clear | ShellEvent::Path(_) | ShellEvent::State(_) => {}
            }
        }
    }

    fn flush_pending_run(&mut self) {
        if let Some((language, message)) = self.pending_run.take() {
            self.send_run(&language, message);
        }
    }

    fn send_run(&mut self, language: &str, message: String) -> bool {
        if self.shell.send_control(message) {
            self.status.info(format!("Running {language} code..."));
            true
        } else {
            self.status.error("Terminal server not connected");
            false
        }
    }

    /// Run the active file in the terminal. A buffer with unsaved edits is
    /// sent as code so the edits are what runs. A hidden or cleared terminal
    /// is brought back first and the run goes out once it connects.
    pub fn run_active_file(&mut self) -> bool {
        if let Some(id) = self.registry.active_id() {
            self.editor_changed(id);
        }
        let Some(doc) = self.registry.active() else {
            self.status.error("No active file to run");
            return false;
        };
        let language = doc.language().to_string();
        let message = if doc.is_dirty() {
            markers::run_code(&language, doc.buffer_content())
        } else {
            markers::run_file(&language, &doc.path)
        };

        if !self.state.layout.terminal_visible || self.shell.is_killed() {
            self.toggle_terminal();
            self.pending_run = Some((language, message));
            if self.shell.is_open() {
                self.flush_pending_run();
            }
            return true;
        }
        self.send_run(&language, message)
    }

    /// Hide the terminal, or show it with a fresh session when it is hidden
    /// or was cleared.
    pub fn toggle_terminal(&mut self) {
        if !self.state.layout.terminal_visible || self.shell.is_killed() {
            self.state.layout.terminal_visible = true;
            self.restart_terminal();
        } else {
            self.state.layout.terminal_visible = false;
        }
    }

    fn restart_terminal(&mut self) {
        if self.shell.has_terminal() {
            self.shell.kill();
        }
        let terminal = self.widgets.create_terminal(&self.settings.terminal_options());
        self.shell.restart(terminal);
        self.path_status = self.shell.path_status();
        let events = self.shell.start();
        self.apply_shell_events(events);
    }

    /// Reset the remote shell, tear the terminal down and hide the panel.
    pub fn clear_terminal(&mut self) {
        if !self.shell.has_terminal() {
            tracing::debug!("clear ignored: no terminal");
            return;
        }
        self.status.info("Terminal clearing...");
        self.shell.clear_and_kill();
        self.pending_run = None;
        self.state.layout.terminal_visible = false;
        self.status.info("Terminal cleared completely");
    }

    // -----------------------------------------------------------------------
    // Keyboard, focus and clipboard
    // -----------------------------------------------------------------------

    pub fn focus_changed(&mut self, focus: FocusContext) {
        self.state.focus = focus;
    }

    pub async fn handle_key(&mut self, chord: &KeyChord) -> KeyOutcome {
        if let Some(action) = clipboard::route(self.state.focus, chord) {
            self.clipboard_action(action).await;
            return KeyOutcome::Handled;
        }
        match self.keymap.lookup(chord) {
            Some(cmd) => self.execute(cmd).await,
            None => KeyOutcome::Ignored,
        }
    }

    /// Run a command from the menu or a shortcut.
    pub async fn execute(&mut self, cmd: CommandId) -> KeyOutcome {
        match cmd {
            CommandId::Save => {
                self.save_active().await;
            }
            CommandId::SaveAs => {
                self.save_active_as().await;
            }
            CommandId::NewFile | CommandId::NewFolder => {
                let (kind, question) = match cmd {
                    CommandId::NewFile => (NodeKind::File, "New file name"),
                    _ => (NodeKind::Folder, "New folder name"),
                };
                if let Some(name) = self.prompt.input(question, "") {
                    self.create_item(kind, &name).await;
                }
            }
            CommandId::OpenFile => {
                if let Some(path) = self.prompt.input("Open file", "") {
                    self.open_file(path.trim()).await;
                }
            }
            CommandId::OpenFolder => {
                let current = self.state.workspace_root.clone().unwrap_or_default();
                if let Some(path) = self.prompt.input("Open folder", &current) {
                    self.open_folder(&path).await;
                }
            }
            CommandId::CloseTab => {
                if let Some(id) = self.registry.active_id() {
                    self.close_tab(id).await;
                }
            }
            CommandId::Exit => {
                self.request_exit().await;
            }
            CommandId::GlobalSearch => {
                self.status.info("Type to search files...");
            }
            CommandId::ToggleSidebar => {
                self.state.layout.sidebar_visible = !self.state.layout.sidebar_visible;
            }
            CommandId::ToggleTerminal => self.toggle_terminal(),
            CommandId::ToggleChat => {
                self.state.layout.chat_visible = !self.state.layout.chat_visible;
            }
            CommandId::ClearTerminal => self.clear_terminal(),
            CommandId::ToggleFullscreen => {
                self.state.layout.fullscreen = !self.state.layout.fullscreen;
            }
            CommandId::RunFile => {
                self.run_active_file();
            }
            CommandId::UpdateProject => {
                self.update_project();
            }
            CommandId::Find | CommandId::Replace | CommandId::GoToDefinition | CommandId::StartDebugging => {
                return KeyOutcome::Forward(cmd);
            }
        }
        KeyOutcome::Handled
    }

    pub async fn clipboard_action(&mut self, action: ClipboardAction) {
        match self.state.focus {
            FocusContext::Editor => self.editor_clipboard(action),
            FocusContext::Terminal => self.terminal_clipboard(action),
            FocusContext::Chat => self.chat_clipboard(action),
            FocusContext::Explorer => self.explorer_clipboard(action).await,
        }
    }

    fn editor_clipboard(&mut self, action: ClipboardAction) {
        let Some(id) = self.registry.active_id() else {
            tracing::debug!("editor clipboard ignored: no active tab");
            return;
        };
        let Some(widget) = self.registry.widget_mut(id) else {
            return;
        };
        match action {
            ClipboardAction::Copy => {
                let Some(text) = widget.selection() else { return };
                match self.clipboard.set_text(&text) {
                    Ok(()) => {
                        self.status.push(StatusKind::Copy, "Copied text from editor");
                    }
                    Err(e) => {
                        tracing::warn!("{e}");
                        self.status.error("Copy failed");
                    }
                }
            }
            ClipboardAction::Cut => {
                let Some(text) = widget.selection() else { return };
                match self.clipboard.set_text(&text) {
                    Ok(()) => {
                        widget.replace_selection("");
                        self.editor_changed(id);
                        self.status.push(StatusKind::Cut, "Cut text from editor");
                    }
                    Err(e) => {
                        tracing::warn!("{e}");
                        self.status.error("Cut failed");
                    }
                }
            }
            ClipboardAction::Paste => match self.clipboard.get_text() {
                Ok(text) => {
                    widget.replace_selection(&text);
                    self.editor_changed(id);
                    self.status.info("Pasted text to editor");
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    self.status.error("Paste failed");
                }
            },
            ClipboardAction::SelectAll => widget.select_all(),
        }
    }

    fn terminal_clipboard(&mut self, action: ClipboardAction) {
        match action {
            ClipboardAction::Copy => {
                let Some(text) = self.shell.terminal().and_then(|t| t.selection()) else {
                    return;
                };
                match self.clipboard.set_text(&text) {
                    Ok(()) => {
                        self.status.push(StatusKind::Copy, "Copied text from terminal");
                    }
                    Err(e) => {
                        tracing::warn!("{e}");
                        self.status.error("Copy failed");
                    }
                }
            }
            ClipboardAction::Paste => match self.clipboard.get_text() {
                Ok(text) => {
                    if self.shell.input(&text) {
                        self.status.info("Pasted text to terminal");
                    } else {
                        self.status.error("Terminal not connected");
                    }
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    self.status.error("Paste failed");
                }
            },
            ClipboardAction::Cut | ClipboardAction::SelectAll => {}
        }
    }

    fn chat_clipboard(&mut self, action: ClipboardAction) {
        match action {
            ClipboardAction::Copy => {
                let Some(text) = self.state.chat.selection().map(str::to_string) else {
                    return;
                };
                match self.clipboard.set_text(&text) {
                    Ok(()) => {
                        self.status.push(StatusKind::Copy, "Copied text from chat");
                    }
                    Err(e) => {
                        tracing::warn!("{e}");
                        self.status.error("Copy failed");
                    }
                }
            }
            ClipboardAction::Paste => match self.clipboard.get_text() {
                Ok(text) => {
                    self.state.chat.insert(&text);
                    self.status.info("Pasted text to chat");
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    self.status.error("Paste failed");
                }
            },
            ClipboardAction::SelectAll => self.state.chat.all_selected = true,
            ClipboardAction::Cut => {}
        }
    }

    async fn explorer_clipboard(&mut self, action: ClipboardAction) {
        let selected: Vec<String> = self.state.selected_item.iter().cloned().collect();
        match action {
            ClipboardAction::Copy => self.stage_items(ClipboardKind::Copy, &selected).await,
            ClipboardAction::Cut => self.stage_items(ClipboardKind::Cut, &selected).await,
            ClipboardAction::Paste => {
                self.paste_items(None).await;
            }
            ClipboardAction::SelectAll => {}
        }
    }

    /// Cut or copy tree items (context menu or shortcut).
    pub async fn stage_items(&mut self, kind: ClipboardKind, paths: &[String]) {
        clipboard::stage(&*self.bridge, &mut self.state.clipboard, kind, paths, &mut self.status).await;
    }

    /// Designate the folder a later paste goes to ("Paste here").
    pub fn set_paste_target(&mut self, folder: Option<&str>) {
        self.state.paste_target = folder.map(str::to_string);
    }

    /// Paste staged tree items into `destination`, or into the folder the
    /// selection resolves to. Tabs for moved files follow them.
    pub async fn paste_items(&mut self, destination: Option<&str>) -> bool {
        let destination = destination.map(str::to_string).or_else(|| self.state.paste_destination());
        let moved = clipboard::paste(
            &*self.bridge,
            &mut self.state.clipboard,
            destination.as_deref(),
            &mut self.status,
        )
        .await;
        let Some(moved) = moved else {
            return false;
        };
        for transfer in &moved {
            self.registry.relocate(&transfer.from, &transfer.to);
            self.state.forget_path(&transfer.from);
        }
        self.refresh_tree().await;
        true
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    pub fn search(&mut self, query: &str) {
        let hits = search::search(query, &self.state.tree, self.registry.documents());
        if hits.is_empty() && query.trim().chars().count() < search::MIN_QUERY_LEN {
            self.search.clear();
        } else {
            self.search.set_results(query.trim(), hits);
        }
    }

    /// Open the highlighted search hit. Folders are selected in the tree.
    pub async fn open_search_result(&mut self) -> bool {
        let Some(hit) = self.search.selected().cloned() else {
            return false;
        };
        self.search.clear();
        match hit.match_type {
            MatchType::Folder => {
                self.state.select_tree_item(&hit.path);
                true
            }
            MatchType::File | MatchType::Content => self.open_file(&hit.path).await.is_some(),
        }
    }

    // -----------------------------------------------------------------------
    // Background work and exit
    // -----------------------------------------------------------------------

    /// Ask the bridge to update the project. Runs in the background; the
    /// outcome arrives as a [`BackgroundEvent`].
    pub fn update_project(&mut self) -> bool {
        let Some(root) = self.state.workspace_root.clone() else {
            self.status.error("No folder is open");
            return false;
        };
        self.status.info("Updating project...");
        let bridge = Arc::clone(&self.bridge);
        let tx = self.background.clone();
        tokio::spawn(async move {
            let result = bridge.update_project(&root).await;
            if tx.send(BackgroundEvent::ProjectUpdated(result)).is_err() {
                tracing::debug!("project update finished after workspace shut down");
            }
        });
        true
    }

    /// Send a message from the assistant chat. Update phrases ("update
    /// project", "hold my tea", ...) start a project update; anything else
    /// goes to the model. Replies land in the chat history.
    pub fn send_chat(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.state.chat.push(ChatRole::User, text);
        self.state.chat.text.clear();
        self.state.chat.all_selected = false;

        if is_update_request(text) {
            if !self.update_project() {
                self.state.chat.push(ChatRole::Assistant, "Open a folder first, then ask again.");
                return false;
            }
            self.state.chat.push(ChatRole::Assistant, "Hold my tea... updating the whole project now.");
            self.state.chat.update_pending = true;
            return true;
        }

        let bridge = Arc::clone(&self.bridge);
        let tx = self.background.clone();
        let prompt = text.to_string();
        tokio::spawn(async move {
            let reply = bridge.send_model_response(&prompt).await;
            if tx.send(BackgroundEvent::ChatReply(reply)).is_err() {
                tracing::debug!("chat reply arrived after workspace shut down");
            }
        });
        true
    }

    pub async fn handle_background(&mut self, event: BackgroundEvent) {
        match event {
            BackgroundEvent::ProjectUpdated(Ok(resp)) => {
                let msg = resp.message.unwrap_or_else(|| "Project updated".to_string());
                if std::mem::take(&mut self.state.chat.update_pending) {
                    self.state.chat.push(ChatRole::Assistant, format!("Done. {msg}"));
                }
                self.status.info(msg);
                self.refresh_tree().await;
            }
            BackgroundEvent::ProjectUpdated(Err(e)) => {
                tracing::warn!("project update failed: {e}");
                let msg = e.user_message("Project update failed");
                if std::mem::take(&mut self.state.chat.update_pending) {
                    self.state.chat.push(ChatRole::Assistant, format!("Something went wrong: {msg}"));
                }
                self.status.error(msg);
            }
            BackgroundEvent::ChatReply(Ok(reply)) => {
                self.state.chat.push(ChatRole::Assistant, reply);
            }
            BackgroundEvent::ChatReply(Err(e)) => {
                tracing::warn!("assistant reply failed: {e}");
                let msg = e.user_message("Assistant unavailable");
                self.state.chat.push(ChatRole::Assistant, format!("Something went wrong: {msg}"));
                self.status.error(msg);
            }
        }
    }

    /// Close the application. Each dirty document goes through the same
    /// gate as closing its tab: yes saves it, no discards it. A failed save
    /// cancels the exit. Every widget is disposed on the way out.
    pub async fn request_exit(&mut self) -> bool {
        let ids: Vec<TabId> = self.registry.documents().map(|d| d.id).collect();
        for id in ids {
            self.editor_changed(id);
        }
        let dirty: Vec<(TabId, String)> = self
            .registry
            .unsaved()
            .iter()
            .map(|d| (d.id, d.display_name.clone()))
            .collect();
        for (id, name) in dirty {
            let question = format!("Save changes to \"{name}\" before closing?");
            if self.prompt.confirm(&question) && !self.save_tab(id).await {
                tracing::warn!(tab = %id, "exit cancelled: save failed");
                return false;
            }
        }
        self.registry.clear();
        self.shell.kill();
        self.exiting = true;
        tracing::info!("workspace closed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::MemoryBridge;
    use crate::clipboard::MemoryClipboard;
    use crate::shell::testing::{ev, Call, RecordingTransport};
    use crate::shell::TransportEventKind;
    use crate::widgets::testing::FakeWidgets;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Prompt answering from queues and recording every question.
    #[derive(Clone, Default)]
    struct ScriptedPrompt {
        confirms: Arc<Mutex<VecDeque<bool>>>,
        inputs: Arc<Mutex<VecDeque<Option<String>>>>,
        asked: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedPrompt {
        fn answer(&self, yes: bool) {
            self.confirms.lock().push_back(yes);
        }

        fn reply(&self, text: &str) {
            self.inputs.lock().push_back(Some(text.to_string()));
        }
    }

    impl Prompt for ScriptedPrompt {
        fn confirm(&mut self, message: &str) -> bool {
            self.asked.lock().push(message.to_string());
            self.confirms.lock().pop_front().unwrap_or(false)
        }

        fn input(&mut self, message: &str, _default: &str) -> Option<String> {
            self.asked.lock().push(message.to_string());
            self.inputs.lock().pop_front().flatten()
        }
    }

    struct Harness {
        view: WorkspaceView,
        background: mpsc::UnboundedReceiver<BackgroundEvent>,
        bridge: Arc<MemoryBridge>,
        transport: RecordingTransport,
        widgets: FakeWidgets,
        prompt: ScriptedPrompt,
    }

    impl Harness {
        fn type_into(&mut self, id: TabId, text: &str) {
            let path = self.view.registry.get(id).unwrap().path.clone();
            *self.widgets.editor_text(&path).unwrap().lock() = text.to_string();
            self.view.editor_changed(id);
        }

        fn connect(&mut self) {
            let generation = self.transport.last_generation();
            self.view.handle_transport_event(ev(generation, TransportEventKind::Opened));
        }

        fn last_status(&self) -> String {
            self.view.status.latest().map(|e| e.message.clone()).unwrap_or_default()
        }
    }

    async fn harness(bridge: MemoryBridge) -> Harness {
        let bridge = Arc::new(bridge);
        let transport = RecordingTransport::default();
        let widgets = FakeWidgets::default();
        let prompt = ScriptedPrompt::default();
        let collaborators = Collaborators {
            bridge: bridge.clone(),
            transport: Box::new(transport.clone()),
            widgets: Box::new(widgets.clone()),
            prompt: Box::new(prompt.clone()),
            clipboard: Box::new(MemoryClipboard::default()),
        };
        let config = WorkspaceConfig { workspace_root: Some("/w".into()), ..WorkspaceConfig::default() };
        let (mut view, background) = WorkspaceView::new(collaborators, config);
        view.startup().await;
        Harness { view, background, bridge, transport, widgets, prompt }
    }

    fn project() -> MemoryBridge {
        MemoryBridge::default()
            .with_folder("/w")
            .with_folder("/w/src")
            .with_file("/w/app.py", "print('hi')\n")
            .with_file("/w/src/util.py", "x = 1\n")
    }

    #[tokio::test]
    async fn startup_connects_and_loads_tree() {
        let h = harness(project()).await;
        assert_eq!(h.view.state.tree.len(), 2);
        assert_eq!(h.view.shell.state(), ConnectionState::Connecting);
        assert_eq!(h.widgets.journal.count("create terminal#"), 1);
        assert_eq!(h.view.path_status(), "📁 Not connected");
    }

    #[tokio::test]
    async fn open_twice_reuses_tab_and_mounts_one_editor() {
        let mut h = harness(project()).await;
        let a = h.view.open_file("/w/app.py").await.unwrap();
        let b = h.view.open_file("/w/app.py").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(h.view.registry.len(), 1);
        assert_eq!(h.widgets.journal.count("create editor /w/app.py"), 1);
        assert_eq!(h.bridge.called("read_file"), 1);
    }

    #[tokio::test]
    async fn open_missing_file_reports_error() {
        let mut h = harness(project()).await;
        assert!(h.view.open_file("/w/nope.py").await.is_none());
        assert_eq!(h.last_status(), "Error opening file: Path not found: /w/nope.py");
        assert!(h.view.registry.is_empty());
    }

    #[tokio::test]
    async fn edit_save_close_scenario() {
        let mut h = harness(project()).await;
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.type_into(id, "print('bye')\n");
        assert!(h.view.registry.has_unsaved_changes());

        let outcome = h.view.handle_key(&KeyChord::ctrl("s")).await;
        assert_eq!(outcome, KeyOutcome::Handled);
        assert_eq!(h.bridge.file("/w/app.py").as_deref(), Some("print('bye')\n"));
        assert!(!h.view.registry.has_unsaved_changes());
        assert_eq!(h.last_status(), "File saved successfully");

        assert!(h.view.close_tab(id).await);
        assert!(h.prompt.asked.lock().is_empty());
        assert!(h.view.registry.is_empty());
        assert_eq!(h.widgets.journal.count("dispose editor /w/app.py"), 1);
    }

    #[tokio::test]
    async fn declining_save_discards_edits() {
        let mut h = harness(project()).await;
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.type_into(id, "changed");
        h.prompt.answer(false);
        assert!(h.view.close_tab(id).await);
        assert_eq!(h.bridge.file("/w/app.py").as_deref(), Some("print('hi')\n"));
        assert_eq!(h.prompt.asked.lock()[0], "Save changes to \"app.py\" before closing?");
    }

    #[tokio::test]
    async fn failed_save_keeps_tab_open() {
        let mut h = harness(project()).await;
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.type_into(id, "changed");
        h.bridge.reject("write_file");
        h.prompt.answer(true);
        assert!(!h.view.close_tab(id).await);
        assert!(h.view.registry.get(id).is_some_and(|d| d.is_dirty()));
        assert_eq!(h.widgets.journal.count("dispose editor"), 0);
        assert_eq!(h.last_status(), "write_file refused");
    }

    #[tokio::test]
    async fn closing_activates_last_remaining_tab() {
        let mut h = harness(project()).await;
        let a = h.view.open_file("/w/app.py").await.unwrap();
        let b = h.view.open_file("/w/src/util.py").await.unwrap();
        h.view.activate_tab(a);
        assert!(h.view.close_tab(a).await);
        assert_eq!(h.view.registry.active_id(), Some(b));
    }

    #[tokio::test]
    async fn save_as_replaces_document() {
        let mut h = harness(project()).await;
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.type_into(id, "new body");
        h.prompt.reply("/w/copy.py");

        assert_eq!(h.view.handle_key(&KeyChord::ctrl_shift("s")).await, KeyOutcome::Handled);
        assert!(h.view.registry.get(id).is_none());
        let active = h.view.registry.active().unwrap();
        assert_eq!(active.path, "/w/copy.py");
        assert_eq!(active.display_name, "copy.py");
        assert!(!active.is_dirty());
        assert_eq!(h.bridge.file("/w/copy.py").as_deref(), Some("new body"));
        assert_eq!(h.bridge.file("/w/app.py").as_deref(), Some("print('hi')\n"));
        assert_eq!(h.last_status(), "File saved as copy.py");
    }

    #[tokio::test]
    async fn save_without_tab_reports() {
        let mut h = harness(project()).await;
        assert!(!h.view.save_active().await);
        assert_eq!(h.last_status(), "No file to save");
    }

    #[tokio::test]
    async fn create_file_opens_it_and_folder_selects_it() {
        let mut h = harness(project()).await;
        h.view.click_tree_item("/w/src").await;
        assert!(h.view.create_item(NodeKind::File, " new.rs ").await);
        assert_eq!(h.view.registry.active().unwrap().path, "/w/src/new.rs");

        assert!(h.view.create_item(NodeKind::Folder, "pkg").await);
        assert_eq!(h.view.state.selected_item.as_deref(), Some("/w/src/pkg"));
        assert_eq!(h.last_status(), "Folder \"pkg\" created");

        h.view.click_tree_item("/w/src").await;
        assert!(!h.view.create_item(NodeKind::Folder, "pkg").await);
        assert_eq!(h.last_status(), "Folder already exists");
    }

    #[tokio::test]
    async fn delete_closes_open_documents() {
        let mut h = harness(project()).await;
        h.view.open_file("/w/src/util.py").await.unwrap();
        h.prompt.answer(true);
        assert!(h.view.delete_items(&["/w/src".to_string()]).await);
        assert!(h.view.registry.is_empty());
        assert!(!h.bridge.exists("/w/src/util.py"));
        assert_eq!(h.last_status(), "Deleted 1 item(s)");
        assert!(h.prompt.asked.lock()[0].starts_with("Are you sure you want to delete this item?"));
    }

    #[tokio::test]
    async fn rename_moves_open_tab_and_keeps_edits() {
        let mut h = harness(project()).await;
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.type_into(id, "edited");
        assert!(h.view.rename_item("/w/app.py", "main.py").await);
        let doc = h.view.registry.get_by_path("/w/main.py").unwrap();
        assert!(doc.is_dirty());
        assert_eq!(doc.buffer_content(), "edited");
        assert_eq!(h.view.registry.active().unwrap().path, "/w/main.py");
        assert_eq!(h.last_status(), "Renamed to \"main.py\"");
    }

    #[tokio::test]
    async fn renaming_a_folder_moves_open_files_inside_it() {
        let mut h = harness(project()).await;
        let id = h.view.open_file("/w/src/util.py").await.unwrap();
        h.type_into(id, "x = 2\n");
        assert!(h.view.rename_item("/w/src", "lib").await);

        let doc = h.view.registry.get(id).unwrap();
        assert_eq!(doc.path, "/w/lib/util.py");
        assert!(doc.is_dirty());
        assert!(h.view.registry.get_by_path("/w/src/util.py").is_none());

        assert!(h.view.save_active().await);
        assert_eq!(h.bridge.file("/w/lib/util.py").as_deref(), Some("x = 2\n"));
        assert!(!h.bridge.exists("/w/src/util.py"));
    }

    #[tokio::test]
    async fn paste_without_destination_falls_back_to_root() {
        let mut h = harness(project()).await;
        h.view.stage_items(ClipboardKind::Copy, &["/w/src/util.py".to_string()]).await;
        assert!(h.view.state.last_clicked_folder.is_none());

        assert!(h.view.paste_items(None).await);
        assert_eq!(h.bridge.called("paste_copy"), 1);
        assert!(h.bridge.exists("/w/util.py"));
        assert_eq!(h.last_status(), "Copied 1 item(s)");
    }

    #[tokio::test]
    async fn designated_paste_target_is_used() {
        let mut h = harness(project()).await;
        h.view.set_paste_target(Some("/w/src"));
        h.view.stage_items(ClipboardKind::Copy, &["/w/app.py".to_string()]).await;
        assert!(h.view.paste_items(None).await);
        assert!(h.bridge.exists("/w/src/app.py"));

        // a clicked folder still wins over the designated target
        h.view.state.last_clicked_folder = Some("/w".into());
        assert_eq!(h.view.state.paste_destination().as_deref(), Some("/w"));
    }

    #[tokio::test]
    async fn cut_paste_moves_open_tab_with_the_file() {
        let mut h = harness(project()).await;
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.type_into(id, "print('moved')\n");
        h.view.stage_items(ClipboardKind::Cut, &["/w/app.py".to_string()]).await;

        assert!(h.view.paste_items(Some("/w/src")).await);
        assert_eq!(h.view.registry.get(id).unwrap().path, "/w/src/app.py");
        assert_eq!(h.view.registry.active_id(), Some(id));
        assert!(h.view.state.clipboard.is_empty());

        assert!(h.view.save_active().await);
        assert_eq!(h.bridge.file("/w/src/app.py").as_deref(), Some("print('moved')\n"));
        assert!(!h.bridge.exists("/w/app.py"));
    }

    #[tokio::test]
    async fn open_folder_gates_on_unsaved_and_records_recent() {
        let mut h = harness(project().with_folder("/other")).await;
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.type_into(id, "dirty");

        h.prompt.answer(false);
        assert!(!h.view.open_folder("/other").await);
        assert_eq!(h.view.registry.len(), 1);

        h.prompt.answer(true);
        assert!(h.view.open_folder("/other").await);
        assert!(h.view.registry.is_empty());
        assert_eq!(h.widgets.journal.count("dispose editor /w/app.py"), 1);
        assert_eq!(h.view.state.workspace_root.as_deref(), Some("/other"));
        assert_eq!(h.view.recent_projects().latest().unwrap().path, "/other");
        assert_eq!(h.last_status(), "Folder opened: /other");
    }

    #[tokio::test]
    async fn run_file_sends_marker_when_connected() {
        let mut h = harness(project()).await;
        h.connect();
        h.view.open_file("/w/app.py").await.unwrap();
        assert_eq!(h.view.handle_key(&KeyChord::new("f8")).await, KeyOutcome::Handled);
        assert!(h.transport.sent().contains(&"__RUN_FILE__:python:/w/app.py".to_string()));
        assert_eq!(h.last_status(), "Running python code...");
    }

    #[tokio::test]
    async fn run_dirty_buffer_sends_code() {
        let mut h = harness(project()).await;
        h.connect();
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.type_into(id, "print(2)");
        assert!(h.view.run_active_file());
        assert!(h.transport.sent().contains(&"__RUN__python:print(2)".to_string()));
        assert!(!h.transport.sent().iter().any(|s| s.starts_with("__RUN_FILE__")));
    }

    #[tokio::test]
    async fn run_file_while_disconnected_reports() {
        let mut h = harness(project()).await;
        h.view.open_file("/w/app.py").await.unwrap();
        assert!(!h.view.run_active_file());
        assert_eq!(h.last_status(), "Terminal server not connected");
    }

    #[tokio::test]
    async fn run_after_clear_restarts_terminal_then_sends() {
        let mut h = harness(project()).await;
        h.connect();
        h.view.open_file("/w/app.py").await.unwrap();
        h.view.clear_terminal();
        assert!(!h.view.state.layout.terminal_visible);
        assert!(h.transport.sent().contains(&"__TERMINAL_RESET__".to_string()));

        assert!(h.view.run_active_file());
        assert!(h.view.state.layout.terminal_visible);
        assert!(!h.transport.sent().iter().any(|s| s.starts_with("__RUN_FILE__")));

        h.connect();
        assert!(h.transport.sent().contains(&"__RUN_FILE__:python:/w/app.py".to_string()));

        let events = h.widgets.journal.events();
        let disposed = events.iter().position(|e| e == "dispose terminal#1").unwrap();
        let created = events.iter().position(|e| e == "create terminal#2").unwrap();
        assert!(disposed < created);
    }

    #[tokio::test]
    async fn toggle_hides_then_restarts_terminal() {
        let mut h = harness(project()).await;
        h.view.toggle_terminal();
        assert!(!h.view.state.layout.terminal_visible);
        assert_eq!(h.widgets.journal.count("create terminal#"), 1);

        h.view.toggle_terminal();
        assert!(h.view.state.layout.terminal_visible);
        assert_eq!(h.widgets.journal.count("dispose terminal#1"), 1);
        assert_eq!(h.widgets.journal.count("create terminal#2"), 1);
        assert_eq!(h.view.shell.state(), ConnectionState::Connecting);
        assert!(h.transport.calls().contains(&Call::Close));
    }

    #[tokio::test]
    async fn gave_up_status_is_persistent() {
        let mut h = harness(project()).await;
        for _ in 0..5 {
            let generation = h.transport.last_generation();
            h.view.handle_transport_event(ev(generation, TransportEventKind::Closed { error: None }));
        }
        let last = h.view.status.latest().unwrap();
        assert!(last.persistent);
        assert_eq!(last.kind, StatusKind::Error);
        assert_eq!(h.view.shell.state(), ConnectionState::GaveUp);
    }

    #[tokio::test]
    async fn path_marker_updates_status_bar() {
        let mut h = harness(project()).await;
        h.connect();
        let generation = h.transport.last_generation();
        h.view.handle_transport_event(ev(generation, TransportEventKind::Message("__PATH__:/srv/app\n".into())));
        assert_eq!(h.view.path_status(), "📁 /srv/app");
    }

    #[tokio::test]
    async fn editor_copy_then_paste_in_other_tab() {
        let mut h = harness(project()).await;
        h.view.open_file("/w/app.py").await.unwrap();
        h.view.handle_key(&KeyChord::ctrl("c")).await;
        assert_eq!(h.last_status(), "Copied text from editor");

        let b = h.view.open_file("/w/src/util.py").await.unwrap();
        h.view.handle_key(&KeyChord::ctrl("v")).await;
        assert_eq!(h.last_status(), "Pasted text to editor");
        assert_eq!(h.view.registry.get(b).unwrap().buffer_content(), "print('hi')\n");
        assert!(h.view.registry.get(b).unwrap().is_dirty());
    }

    #[tokio::test]
    async fn editor_cut_empties_buffer() {
        let mut h = harness(project()).await;
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.view.handle_key(&KeyChord::ctrl("x")).await;
        assert_eq!(h.last_status(), "Cut text from editor");
        assert_eq!(h.view.status.latest().unwrap().kind, StatusKind::Cut);
        assert_eq!(h.view.registry.get(id).unwrap().buffer_content(), "");
    }

    #[tokio::test]
    async fn terminal_paste_requires_connection() {
        let mut h = harness(project()).await;
        h.view.focus_changed(FocusContext::Terminal);
        h.view.handle_key(&KeyChord::ctrl_shift("c")).await;
        assert_eq!(h.last_status(), "Copied text from terminal");

        h.view.handle_key(&KeyChord::ctrl_shift("v")).await;
        assert_eq!(h.last_status(), "Terminal not connected");

        h.connect();
        h.view.handle_key(&KeyChord::ctrl_shift("v")).await;
        assert_eq!(h.last_status(), "Pasted text to terminal");
        assert_eq!(h.transport.sent().last().map(String::as_str), Some("selected"));

        // plain Ctrl+C stays with the shell
        assert_eq!(h.view.handle_key(&KeyChord::ctrl("c")).await, KeyOutcome::Ignored);
    }

    #[tokio::test]
    async fn chat_select_all_copy_paste() {
        let mut h = harness(project()).await;
        h.view.focus_changed(FocusContext::Chat);
        h.view.state.chat.insert("explain this");
        h.view.handle_key(&KeyChord::ctrl("a")).await;
        h.view.handle_key(&KeyChord::ctrl("c")).await;
        assert_eq!(h.last_status(), "Copied text from chat");
        h.view.handle_key(&KeyChord::ctrl("v")).await;
        assert_eq!(h.view.state.chat.text, "explain this");
        assert_eq!(h.last_status(), "Pasted text to chat");
    }

    #[tokio::test]
    async fn explorer_cut_and_paste_into_clicked_folder() {
        let mut h = harness(project()).await;
        h.view.click_tree_item("/w/app.py").await;
        h.view.handle_key(&KeyChord::ctrl("x")).await;
        assert_eq!(h.last_status(), "Cut 1 item(s)");
        assert_eq!(h.view.state.clipboard.paste_label(), "Paste \"app.py\"");

        h.view.click_tree_item("/w/src").await;
        h.view.handle_key(&KeyChord::ctrl("v")).await;
        assert_eq!(h.last_status(), "Moved 1 item(s)");
        assert!(h.bridge.exists("/w/src/app.py"));
        assert!(h.view.state.clipboard.is_empty());
        assert!(TreeNode::find(&h.view.state.tree, "/w/src/app.py").is_some());
    }

    #[tokio::test]
    async fn explorer_failed_cut_stage_keeps_previous_clipboard() {
        let mut h = harness(project()).await;
        h.view.click_tree_item("/w/src").await;
        h.view.handle_key(&KeyChord::ctrl("c")).await;
        let before = h.view.state.clipboard.clone();

        h.bridge.reject("cut_stage");
        h.view.click_tree_item("/w/app.py").await;
        h.view.handle_key(&KeyChord::ctrl("x")).await;
        assert_eq!(h.view.state.clipboard, before);
        assert_eq!(h.view.status.latest().unwrap().kind, StatusKind::Error);
    }

    #[tokio::test]
    async fn widget_actions_are_forwarded() {
        let mut h = harness(project()).await;
        assert_eq!(h.view.handle_key(&KeyChord::ctrl("f")).await, KeyOutcome::Forward(CommandId::Find));
        assert_eq!(h.view.handle_key(&KeyChord::new("f12")).await, KeyOutcome::Forward(CommandId::GoToDefinition));
        assert_eq!(h.view.handle_key(&KeyChord::ctrl("q")).await, KeyOutcome::Ignored);

        h.view.handle_key(&KeyChord::ctrl("b")).await;
        assert!(!h.view.state.layout.sidebar_visible);
    }

    #[tokio::test]
    async fn search_and_open_result() {
        let mut h = harness(project()).await;
        h.view.search("util");
        assert_eq!(h.view.search.results.len(), 1);
        assert!(h.view.open_search_result().await);
        assert_eq!(h.view.registry.active().unwrap().path, "/w/src/util.py");
        assert!(h.view.search.results.is_empty());

        h.view.search("u");
        assert!(h.view.search.results.is_empty());
    }

    #[tokio::test]
    async fn update_project_reports_through_background_channel() {
        let mut h = harness(project()).await;
        assert!(h.view.update_project());
        assert_eq!(h.last_status(), "Updating project...");
        let event = h.background.recv().await.unwrap();
        h.view.handle_background(event).await;
        assert_eq!(h.last_status(), "Project updated");
        assert_eq!(h.bridge.called("update_project"), 1);
    }

    #[tokio::test]
    async fn settings_update_reaches_every_mounted_editor() {
        let mut h = harness(project()).await;
        h.view.open_file("/w/app.py").await;
        h.view.open_file("/w/src/util.py").await;

        let mut partial = Map::new();
        partial.insert("fontSize".into(), serde_json::json!(18));
        assert!(h.view.update_settings(partial));
        assert_eq!(h.view.settings().get_f64("fontSize"), Some(18.0));
        assert_eq!(h.widgets.journal.count("options editor"), 2);
        assert!(h
            .widgets
            .journal
            .events()
            .iter()
            .filter(|e| e.starts_with("options editor"))
            .all(|e| e.contains("\"fontSize\":18")));
    }

    #[tokio::test]
    async fn failed_settings_write_touches_no_editor() {
        let mut h = harness(project()).await;
        h.view.open_file("/w/app.py").await;
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        *h.view.settings_mut() = SettingsStore::load(&blocker);

        let mut partial = Map::new();
        partial.insert("tabSize".into(), serde_json::json!(2));
        assert!(!h.view.update_settings(partial));
        assert_eq!(h.view.status.latest().unwrap().kind, StatusKind::Error);
        assert_eq!(h.widgets.journal.count("options editor"), 0);
        assert_eq!(h.view.settings().get_f64("tabSize"), Some(4.0));
    }

    #[tokio::test]
    async fn chat_message_gets_model_reply() {
        let mut h = harness(project()).await;
        h.view.state.chat.insert("what is util.py?");
        let text = h.view.state.chat.text.clone();
        assert!(h.view.send_chat(&text));
        assert!(h.view.state.chat.text.is_empty());

        let event = h.background.recv().await.unwrap();
        h.view.handle_background(event).await;
        let roles: Vec<ChatRole> = h.view.state.chat.history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant]);
        assert_eq!(h.view.state.chat.last_reply(), Some("You said: what is util.py?"));
        assert_eq!(h.bridge.called("send_model_response"), 1);
        assert!(!h.view.send_chat("   "));
    }

    #[tokio::test]
    async fn chat_update_phrase_runs_project_update() {
        let mut h = harness(project()).await;
        assert!(h.view.send_chat("Update my project please"));
        assert_eq!(h.last_status(), "Updating project...");
        assert_eq!(
            h.view.state.chat.last_reply(),
            Some("Hold my tea... updating the whole project now.")
        );

        let event = h.background.recv().await.unwrap();
        h.view.handle_background(event).await;
        assert_eq!(h.bridge.called("update_project"), 1);
        assert_eq!(h.bridge.called("send_model_response"), 0);
        assert_eq!(h.view.state.chat.last_reply(), Some("Done. Project updated"));
        assert!(!h.view.state.chat.update_pending);
    }

    #[tokio::test]
    async fn chat_reports_model_failure() {
        let mut h = harness(project()).await;
        h.bridge.reject("send_model_response");
        h.view.send_chat("hello");
        let event = h.background.recv().await.unwrap();
        h.view.handle_background(event).await;
        assert_eq!(
            h.view.state.chat.last_reply(),
            Some("Something went wrong: send_model_response refused")
        );
        assert_eq!(h.view.status.latest().unwrap().kind, StatusKind::Error);
    }

    #[tokio::test]
    async fn toggle_chat_shortcut_flips_panel() {
        let mut h = harness(project()).await;
        assert!(!h.view.state.layout.chat_visible);
        h.view.handle_key(&KeyChord::ctrl_shift("a")).await;
        assert!(h.view.state.layout.chat_visible);
        h.view.execute(CommandId::ToggleChat).await;
        assert!(!h.view.state.layout.chat_visible);
    }

    #[tokio::test]
    async fn unreachable_bridge_says_backend_not_connected() {
        let mut h = harness(project()).await;
        *h.bridge.down.lock() = true;
        assert!(h.view.open_file("/w/app.py").await.is_none());
        assert_eq!(h.last_status(), "Backend not connected");
    }

    #[tokio::test]
    async fn exit_gate_and_teardown() {
        let mut h = harness(project()).await;
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.type_into(id, "dirty");

        h.prompt.answer(true);
        assert!(h.view.request_exit().await);
        assert!(h.view.is_exiting());
        assert_eq!(h.bridge.file("/w/app.py").as_deref(), Some("dirty"));
        assert_eq!(h.prompt.asked.lock().last().unwrap(), "Save changes to \"app.py\" before closing?");
        assert_eq!(h.widgets.journal.count("dispose editor /w/app.py"), 1);
        assert_eq!(h.widgets.journal.count("dispose terminal#1"), 1);
    }

    #[tokio::test]
    async fn exit_declined_save_discards_edits() {
        let mut h = harness(project()).await;
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.type_into(id, "dirty");

        h.prompt.answer(false);
        assert!(h.view.request_exit().await);
        assert!(h.view.is_exiting());
        assert!(h.view.registry.is_empty());
        assert_eq!(h.bridge.file("/w/app.py").as_deref(), Some("print('hi')\n"));
        assert_eq!(h.bridge.called("write_file"), 0);
    }

    #[tokio::test]
    async fn exit_aborts_when_save_fails() {
        let mut h = harness(project()).await;
        let clean = h.view.open_file("/w/src/util.py").await.unwrap();
        let id = h.view.open_file("/w/app.py").await.unwrap();
        h.type_into(id, "dirty");
        h.bridge.reject("write_file");

        h.prompt.answer(true);
        assert!(!h.view.request_exit().await);
        assert!(!h.view.is_exiting());
        assert_eq!(h.view.registry.len(), 2);
        assert!(h.view.registry.get(id).unwrap().is_dirty());
        assert!(h.view.registry.get(clean).is_some());
        assert_eq!(h.widgets.journal.count("dispose"), 0);
        assert_eq!(h.last_status(), "write_file refused");
    }
}
