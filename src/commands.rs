//! Command registry: string command ids, key chords, and the menu table.
//!
//! Menu items and keyboard shortcuts resolve to the same [`CommandId`], so
//! the workspace dispatches both through one `match`. User overrides from
//! `keybindings.json` map command ids to chords.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    NewFile,
    NewFolder,
    OpenFile,
    OpenFolder,
    Save,
    SaveAs,
    CloseTab,
    Exit,
    Find,
    Replace,
    GlobalSearch,
    ToggleSidebar,
    ToggleTerminal,
    ToggleChat,
    ClearTerminal,
    ToggleFullscreen,
    RunFile,
    StartDebugging,
    GoToDefinition,
    UpdateProject,
}

impl CommandId {
    pub const ALL: [CommandId; 20] = [
        CommandId::NewFile,
        CommandId::NewFolder,
        CommandId::OpenFile,
        CommandId::OpenFolder,
        CommandId::Save,
        CommandId::SaveAs,
        CommandId::CloseTab,
        CommandId::Exit,
        CommandId::Find,
        CommandId::Replace,
        CommandId::GlobalSearch,
        CommandId::ToggleSidebar,
        CommandId::ToggleTerminal,
        CommandId::ToggleChat,
        CommandId::ClearTerminal,
        CommandId::ToggleFullscreen,
        CommandId::RunFile,
        CommandId::StartDebugging,
        CommandId::GoToDefinition,
        CommandId::UpdateProject,
    ];

    pub fn id(self) -> &'static str {
        match self {
            CommandId::NewFile => "file.new",
            CommandId::NewFolder => "file.new-folder",
            CommandId::OpenFile => "file.open",
            CommandId::OpenFolder => "file.open-folder",
            CommandId::Save => "file.save",
            CommandId::SaveAs => "file.save-as",
            CommandId::CloseTab => "file.close-tab",
            CommandId::Exit => "file.exit",
            CommandId::Find => "edit.find",
            CommandId::Replace => "edit.replace",
            CommandId::GlobalSearch => "go.search",
            CommandId::ToggleSidebar => "view.toggle-sidebar",
            CommandId::ToggleTerminal => "view.toggle-terminal",
            CommandId::ToggleChat => "view.toggle-chat",
            CommandId::ClearTerminal => "terminal.clear",
            CommandId::ToggleFullscreen => "view.fullscreen",
            CommandId::RunFile => "run.file",
            CommandId::StartDebugging => "run.debug",
            CommandId::GoToDefinition => "go.definition",
            CommandId::UpdateProject => "project.update",
        }
    }

    pub fn from_id(id: &str) -> Option<CommandId> {
        CommandId::ALL.into_iter().find(|c| c.id() == id)
    }

    pub fn label(self) -> &'static str {
        match self {
            CommandId::NewFile => "New File",
            CommandId::NewFolder => "New Folder",
            CommandId::OpenFile => "Open File…",
            CommandId::OpenFolder => "Open Folder…",
            CommandId::Save => "Save",
            CommandId::SaveAs => "Save As…",
            CommandId::CloseTab => "Close Tab",
            CommandId::Exit => "Exit",
            CommandId::Find => "Find",
            CommandId::Replace => "Replace",
            CommandId::GlobalSearch => "Search Files",
            CommandId::ToggleSidebar => "Toggle Sidebar",
            CommandId::ToggleTerminal => "Toggle Terminal",
            CommandId::ToggleChat => "Toggle Assistant",
            CommandId::ClearTerminal => "Clear Terminal",
            CommandId::ToggleFullscreen => "Toggle Fullscreen",
            CommandId::RunFile => "Run File",
            CommandId::StartDebugging => "Start Debugging",
            CommandId::GoToDefinition => "Go to Definition",
            CommandId::UpdateProject => "Update Project",
        }
    }
}

// ---------------------------------------------------------------------------
// Key chords
// ---------------------------------------------------------------------------

/// A key press with modifiers. `ctrl` covers both Ctrl and Cmd. `key` is
/// stored lower-case, e.g. `"s"` or `"f8"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub key: String,
}

impl KeyChord {
    pub fn new(key: &str) -> Self {
        Self { ctrl: false, shift: false, alt: false, key: key.to_lowercase() }
    }

    pub fn ctrl(key: &str) -> Self {
        Self { ctrl: true, ..Self::new(key) }
    }

    pub fn ctrl_shift(key: &str) -> Self {
        Self { ctrl: true, shift: true, ..Self::new(key) }
    }

    /// Parse `"Ctrl+Shift+S"`, `"CmdOrCtrl+O"`, `"F8"`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut chord = KeyChord::new("");
        let parts: Vec<&str> = text.split('+').map(str::trim).collect();
        let (key, mods) = parts.split_last()?;
        for m in mods {
            match m.to_ascii_lowercase().as_str() {
                "ctrl" | "control" | "cmd" | "command" | "meta" | "cmdorctrl" => chord.ctrl = true,
                "shift" => chord.shift = true,
                "alt" | "option" => chord.alt = true,
                _ => return None,
            }
        }
        if key.is_empty() {
            return None;
        }
        chord.key = key.to_lowercase();
        Some(chord)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.key.len() == 1 {
            write!(f, "{}", self.key.to_uppercase())
        } else {
            let mut chars = self.key.chars();
            match chars.next() {
                Some(first) => write!(f, "{}{}", first.to_ascii_uppercase(), chars.as_str()),
                None => Ok(()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Keymap
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Keymap {
    bindings: HashMap<KeyChord, CommandId>,
}

impl Default for Keymap {
    fn default() -> Self {
        let mut bindings = HashMap::new();
        let mut bind = |chord: KeyChord, cmd| {
            bindings.insert(chord, cmd);
        };
        bind(KeyChord::ctrl("s"), CommandId::Save);
        bind(KeyChord::ctrl_shift("s"), CommandId::SaveAs);
        bind(KeyChord::ctrl("n"), CommandId::NewFile);
        bind(KeyChord::ctrl("o"), CommandId::OpenFile);
        bind(KeyChord::ctrl("p"), CommandId::GlobalSearch);
        bind(KeyChord::ctrl("f"), CommandId::Find);
        bind(KeyChord::ctrl("h"), CommandId::Replace);
        bind(KeyChord::ctrl("b"), CommandId::ToggleSidebar);
        bind(KeyChord::ctrl("`"), CommandId::ToggleTerminal);
        bind(KeyChord::ctrl_shift("a"), CommandId::ToggleChat);
        bind(KeyChord::ctrl("w"), CommandId::CloseTab);
        bind(KeyChord::new("f5"), CommandId::StartDebugging);
        bind(KeyChord::new("f8"), CommandId::RunFile);
        bind(KeyChord::new("f11"), CommandId::ToggleFullscreen);
        bind(KeyChord::new("f12"), CommandId::GoToDefinition);
        Self { bindings }
    }
}

impl Keymap {
    /// Default bindings with user overrides (command id → chord text)
    /// applied on top. A command rebound by the user loses its default
    /// chord; unknown ids and unparseable chords are skipped with a warning.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut map = Self::default();
        for (id, chord_text) in overrides {
            let Some(cmd) = CommandId::from_id(id) else {
                tracing::warn!("keybindings: unknown command id {id:?}");
                continue;
            };
            let Some(chord) = KeyChord::parse(chord_text) else {
                tracing::warn!("keybindings: cannot parse chord {chord_text:?} for {id}");
                continue;
            };
            map.bindings.retain(|_, c| *c != cmd);
            map.bindings.insert(chord, cmd);
        }
        map
    }

    pub fn lookup(&self, chord: &KeyChord) -> Option<CommandId> {
        self.bindings.get(chord).copied()
    }

    pub fn chord_for(&self, cmd: CommandId) -> Option<&KeyChord> {
        self.bindings.iter().find(|(_, c)| **c == cmd).map(|(k, _)| k)
    }
}

// ---------------------------------------------------------------------------
// Menu table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MenuItem {
    pub command: CommandId,
    pub label: &'static str,
    pub accelerator: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MenuSection {
    pub title: &'static str,
    pub items: Vec<MenuItem>,
}

/// Menu bar contents, with accelerators taken from `keymap`.
pub fn build_menu(keymap: &Keymap) -> Vec<MenuSection> {
    let item = |cmd: CommandId| MenuItem {
        command: cmd,
        label: cmd.label(),
        accelerator: keymap.chord_for(cmd).map(|c| c.to_string()),
    };
    let section = |title, cmds: &[CommandId]| MenuSection {
        title,
        items: cmds.iter().map(|c| item(*c)).collect(),
    };

    vec![
        section(
            "File",
            &[
                CommandId::NewFile,
                CommandId::NewFolder,
                CommandId::OpenFile,
                CommandId::OpenFolder,
                CommandId::Save,
                CommandId::SaveAs,
                CommandId::CloseTab,
                CommandId::Exit,
            ],
        ),
        section("Edit", &[CommandId::Find, CommandId::Replace]),
        section(
            "View",
            &[
                CommandId::ToggleSidebar,
                CommandId::ToggleTerminal,
                CommandId::ToggleChat,
                CommandId::ToggleFullscreen,
            ],
        ),
        section("Go", &[CommandId::GlobalSearch, CommandId::GoToDefinition]),
        section("Run", &[CommandId::RunFile, CommandId::StartDebugging]),
        section("Terminal", &[CommandId::ClearTerminal]),
        section("Project", &[CommandId::UpdateProject]),
    ]
}
