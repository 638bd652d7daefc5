use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Get the config directory using platform-appropriate location.
///
/// - macOS: `~/Library/Application Support/nebula-ide/`
/// - Linux: `~/.config/nebula-ide/` (or `$XDG_CONFIG_HOME`)
/// - Windows: `%APPDATA%/nebula-ide/`
///
/// Falls back to `~/.nebula-ide/` if the platform dir is unavailable.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("nebula-ide"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".nebula-ide")
        })
}

/// Load a JSON config file from `dir`, returning Default if missing or corrupt.
/// A file that exists but cannot be read or parsed is logged, so corrupt
/// files show up in logs instead of silently resetting state.
pub fn load_json_config<T: DeserializeOwned + Default>(dir: &Path, filename: &str) -> T {
    let path = dir.join(filename);
    if !path.exists() {
        return T::default();
    }
    let content = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Could not read config {}: {e}", path.display());
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Corrupt config {}: {e}. Using defaults.", path.display());
            T::default()
        }
    }
}

/// Save a JSON config file atomically (temp file + rename).
/// Sets 0600 permissions on Unix.
pub fn save_json_config<T: Serialize>(dir: &Path, filename: &str, config: &T) -> Result<(), String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create config directory: {e}"))?;

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;

    let target = dir.join(filename);
    let temp = dir.join(format!("{}.tmp.{}", filename, std::process::id()));

    std::fs::write(&temp, &json)
        .map_err(|e| format!("Failed to write temp config: {e}"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&temp, perms)
            .map_err(|e| format!("Failed to set config permissions: {e}"))?;
    }

    std::fs::rename(&temp, &target).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        format!("Failed to commit config: {e}")
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub const SETTINGS_FILE: &str = "settings.json";

/// Hard-coded defaults every loaded settings record is merged over.
pub fn default_settings() -> Map<String, Value> {
    let defaults = json!({
        // Appearance
        "theme": "dark",
        "fontSize": 14,
        "fontFamily": "'JetBrains Mono', 'Cascadia Code', 'Fira Code', monospace",

        // Editor
        "autoSave": true,
        "autoSaveDelay": 1000,
        "tabSize": 4,
        "insertSpaces": true,
        "wordWrap": "off",
        "lineNumbers": "on",
        "minimap": true,
        "renderWhitespace": "selection",
        "renderIndentGuides": true,
        "lineHeight": 1.8,
        "cursorBlinking": "smooth",
        "cursorStyle": "line",
        "smoothScrolling": true,
        "mouseWheelZoom": true,
        "formatOnPaste": true,
        "formatOnType": true,

        // Code intelligence
        "autoClosingBrackets": "always",
        "autoClosingQuotes": "always",
        "quickSuggestions": true,
        "suggestOnTriggerCharacters": true,
        "parameterHints": true,
        "bracketPairColorization": true,

        // Terminal
        "shell": "powershell",
        "terminalFontSize": 12,
        "terminalFontFamily": "'Cascadia Mono', 'Courier New', monospace",

        // Assistant
        "aiSuggestions": true,
        "aiChat": true,
        "aiAutoComplete": true,
    });
    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Flat key/value settings record, merged over [`default_settings`] and
/// written whole on every change.
///
/// A store without a directory never touches disk (used by tests and by the
/// headless host when `--config-dir` points nowhere writable).
#[derive(Debug, Clone)]
pub struct SettingsStore {
    dir: Option<PathBuf>,
    values: Map<String, Value>,
}

impl SettingsStore {
    /// Load `settings.json` from `dir`. Missing keys take their defaults;
    /// unknown keys are kept as-is.
    pub fn load(dir: &Path) -> Self {
        let stored: Map<String, Value> = load_json_config(dir, SETTINGS_FILE);
        let mut values = default_settings();
        values.extend(stored);
        Self { dir: Some(dir.to_path_buf()), values }
    }

    pub fn in_memory() -> Self {
        Self { dir: None, values: default_settings() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Numeric setting, accepting numbers stored as strings (older writers
    /// persisted form input verbatim).
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), String> {
        let mut next = self.values.clone();
        next.insert(key.to_string(), value);
        self.commit(next)
    }

    /// Merge `partial` into the current record and persist once.
    pub fn update(&mut self, partial: Map<String, Value>) -> Result<(), String> {
        let mut next = self.values.clone();
        next.extend(partial);
        self.commit(next)
    }

    pub fn reset(&mut self) -> Result<(), String> {
        self.commit(default_settings())
    }

    pub fn all(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Write `next` to disk and only then adopt it, so memory never runs
    /// ahead of the file.
    fn commit(&mut self, next: Map<String, Value>) -> Result<(), String> {
        if let Some(dir) = &self.dir {
            save_json_config(dir, SETTINGS_FILE, &next)?;
        }
        self.values = next;
        Ok(())
    }

    fn int_or(&self, key: &str, fallback: u64) -> u64 {
        match self.get_f64(key) {
            Some(v) if v >= 1.0 => v as u64,
            _ => fallback,
        }
    }

    /// Editor-widget configuration derived from the current settings.
    pub fn editor_options(&self) -> Value {
        let theme = if self.get_str("theme") == Some("dark") {
            "nebula-dark-enhanced"
        } else {
            "vs-light"
        };
        let line_height = self.get_f64("lineHeight").filter(|v| *v > 0.0).unwrap_or(1.8);

        json!({
            "theme": theme,
            "fontSize": self.int_or("fontSize", 14),
            "fontFamily": self.values.get("fontFamily"),
            "lineNumbers": self.values.get("lineNumbers"),
            "minimap": {
                "enabled": self.get_bool("minimap"),
                "side": "right",
                "size": "proportional",
                "showSlider": "always",
                "renderCharacters": true,
                "maxColumn": 100,
                "scale": 2,
            },
            "wordWrap": self.values.get("wordWrap"),
            "wordWrapColumn": 100,
            "wrappingIndent": "same",
            "tabSize": self.int_or("tabSize", 4),
            "insertSpaces": self.get_bool("insertSpaces"),
            "lineHeight": line_height,
            "cursorBlinking": self.values.get("cursorBlinking"),
            "cursorStyle": self.values.get("cursorStyle"),
            "smoothScrolling": self.get_bool("smoothScrolling"),
            "mouseWheelZoom": self.get_bool("mouseWheelZoom"),
            "formatOnPaste": self.get_bool("formatOnPaste"),
            "formatOnType": self.get_bool("formatOnType"),
            "autoClosingBrackets": self.values.get("autoClosingBrackets"),
            "autoClosingQuotes": self.values.get("autoClosingQuotes"),
            "quickSuggestions": self.get_bool("quickSuggestions"),
            "suggestOnTriggerCharacters": self.get_bool("suggestOnTriggerCharacters"),
            "parameterHints": { "enabled": self.get_bool("parameterHints") },
            "bracketPairColorization": { "enabled": self.get_bool("bracketPairColorization") },
            "renderWhitespace": self.values.get("renderWhitespace"),
            "guides": { "indentation": self.get_bool("renderIndentGuides") },
        })
    }

    /// Terminal-widget configuration derived from the current settings.
    pub fn terminal_options(&self) -> Value {
        json!({
            "shell": self.values.get("shell"),
            "fontSize": self.int_or("terminalFontSize", 12),
            "fontFamily": self.values.get("terminalFontFamily"),
            "cursorBlink": true,
            "cursorStyle": "block",
            "scrollback": 10000,
            "convertEol": true,
        })
    }
}

// ---------------------------------------------------------------------------
// Recent projects
// ---------------------------------------------------------------------------

pub const RECENT_FILE: &str = "recent.json";
pub const MAX_RECENT_PROJECTS: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecentProject {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub description: String,
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    #[serde(default)]
    pub time: String,
}

/// Newest-first list of opened project folders, de-duplicated by path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentProjects(pub Vec<RecentProject>);

impl RecentProjects {
    pub fn load(dir: &Path) -> Self {
        load_json_config(dir, RECENT_FILE)
    }

    pub fn save(&self, dir: &Path) -> Result<(), String> {
        save_json_config(dir, RECENT_FILE, self)
    }

    /// Put `path` at the front, dropping any older entry for it, and cap the
    /// list.
    pub fn record(&mut self, name: &str, path: &str, description: &str) {
        self.0.retain(|p| p.path != path);
        self.0.insert(
            0,
            RecentProject {
                name: name.to_string(),
                path: path.to_string(),
                description: description.to_string(),
                time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            },
        );
        self.0.truncate(MAX_RECENT_PROJECTS);
    }

    /// Most recently opened project, used as the workspace root when none
    /// is given on the command line.
    pub fn latest(&self) -> Option<&RecentProject> {
        self.0.first()
    }
}

// ---------------------------------------------------------------------------
// Keybinding overrides
// ---------------------------------------------------------------------------

pub const KEYBINDINGS_FILE: &str = "keybindings.json";

/// Command id → chord text (`"file.save": "Ctrl+Alt+S"`).
pub fn load_keybindings(dir: &Path) -> HashMap<String, String> {
    load_json_config(dir, KEYBINDINGS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let v: HashMap<String, String> = load_json_config(dir.path(), "nope.json");
        assert!(v.is_empty());
    }

    #[test]
    fn load_corrupt_file_returns_default() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let v: HashMap<String, String> = load_json_config(dir.path(), "bad.json");
        assert!(v.is_empty());
    }

    #[test]
    fn save_creates_dir_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        save_json_config(&nested, "x.json", &json!({"k": 1})).unwrap();
        let names: Vec<_> = fs::read_dir(&nested)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["x.json"]);
    }

    #[cfg(unix)]
    #[test]
    fn saved_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        save_json_config(dir.path(), "x.json", &json!({})).unwrap();
        let mode = fs::metadata(dir.path().join("x.json")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn settings_merge_over_defaults_and_keep_unknown_keys() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"theme":"light","fontSize":18,"customFlag":"yes"}"#,
        )
        .unwrap();
        let store = SettingsStore::load(dir.path());
        assert_eq!(store.get_str("theme"), Some("light"));
        assert_eq!(store.get_f64("fontSize"), Some(18.0));
        assert_eq!(store.get_str("customFlag"), Some("yes"));
        // untouched defaults
        assert_eq!(store.get_str("shell"), Some("powershell"));
        assert!(store.get_bool("aiChat"));
    }

    #[test]
    fn set_writes_whole_record() {
        let dir = TempDir::new().unwrap();
        let mut store = SettingsStore::load(dir.path());
        store.set("tabSize", json!(2)).unwrap();

        let raw: Map<String, Value> =
            serde_json::from_str(&fs::read_to_string(dir.path().join(SETTINGS_FILE)).unwrap()).unwrap();
        assert_eq!(raw["tabSize"], 2);
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw.len(), default_settings().len());

        let reloaded = SettingsStore::load(dir.path());
        assert_eq!(reloaded.get_f64("tabSize"), Some(2.0));
    }

    #[test]
    fn update_and_reset() {
        let dir = TempDir::new().unwrap();
        let mut store = SettingsStore::load(dir.path());
        let mut partial = Map::new();
        partial.insert("minimap".into(), json!(false));
        partial.insert("wordWrap".into(), json!("on"));
        store.update(partial).unwrap();
        assert!(!store.get_bool("minimap"));
        assert_eq!(store.get_str("wordWrap"), Some("on"));

        store.reset().unwrap();
        assert!(store.get_bool("minimap"));
        assert_eq!(store.all(), &default_settings());
        assert_eq!(SettingsStore::load(dir.path()).all(), &default_settings());
    }

    #[test]
    fn failed_write_leaves_settings_untouched() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let mut store = SettingsStore::load(&blocker);

        assert!(store.set("theme", json!("light")).is_err());
        assert_eq!(store.get_str("theme"), Some("dark"));

        let mut partial = Map::new();
        partial.insert("tabSize".into(), json!(8));
        assert!(store.update(partial).is_err());
        assert_eq!(store.get_f64("tabSize"), Some(4.0));
    }

    #[test]
    fn in_memory_store_never_writes() {
        let mut store = SettingsStore::in_memory();
        store.set("theme", json!("light")).unwrap();
        assert_eq!(store.get_str("theme"), Some("light"));
    }

    #[test]
    fn editor_options_derive_from_settings() {
        let mut store = SettingsStore::in_memory();
        let opts = store.editor_options();
        assert_eq!(opts["theme"], "nebula-dark-enhanced");
        assert_eq!(opts["fontSize"], 14);
        assert_eq!(opts["minimap"]["enabled"], true);
        assert_eq!(opts["minimap"]["side"], "right");
        assert_eq!(opts["wordWrapColumn"], 100);
        assert_eq!(opts["guides"]["indentation"], true);

        store.set("theme", json!("light")).unwrap();
        store.set("fontSize", json!("16")).unwrap();
        store.set("tabSize", json!("garbage")).unwrap();
        store.set("parameterHints", json!(false)).unwrap();
        let opts = store.editor_options();
        assert_eq!(opts["theme"], "vs-light");
        assert_eq!(opts["fontSize"], 16);
        assert_eq!(opts["tabSize"], 4);
        assert_eq!(opts["parameterHints"]["enabled"], false);
    }

    #[test]
    fn terminal_options_use_terminal_keys() {
        let store = SettingsStore::in_memory();
        let opts = store.terminal_options();
        assert_eq!(opts["fontSize"], 12);
        assert_eq!(opts["fontFamily"], "'Cascadia Mono', 'Courier New', monospace");
        assert_eq!(opts["shell"], "powershell");
    }

    #[test]
    fn recent_projects_dedupe_and_cap() {
        let mut recent = RecentProjects::default();
        for i in 0..12 {
            recent.record(&format!("p{i}"), &format!("/w/p{i}"), "");
        }
        assert_eq!(recent.0.len(), MAX_RECENT_PROJECTS);
        assert_eq!(recent.latest().unwrap().path, "/w/p11");

        recent.record("p5", "/w/p5", "again");
        assert_eq!(recent.0.len(), MAX_RECENT_PROJECTS);
        assert_eq!(recent.latest().unwrap().description, "again");
        assert_eq!(recent.0.iter().filter(|p| p.path == "/w/p5").count(), 1);
    }

    #[test]
    fn recent_projects_persist() {
        let dir = TempDir::new().unwrap();
        let mut recent = RecentProjects::load(dir.path());
        assert!(recent.latest().is_none());
        recent.record("demo", "/tmp/demo", "project to solve problems");
        recent.save(dir.path()).unwrap();

        let loaded = RecentProjects::load(dir.path());
        let first = loaded.latest().unwrap();
        assert_eq!(first.name, "demo");
        assert_eq!(first.time.len(), "2024-01-01 00:00:00".len());
    }

    #[test]
    fn keybindings_load_from_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(KEYBINDINGS_FILE), r#"{"file.save":"Ctrl+Alt+S"}"#).unwrap();
        let kb = load_keybindings(dir.path());
        assert_eq!(kb.get("file.save").map(String::as_str), Some("Ctrl+Alt+S"));
    }
}
