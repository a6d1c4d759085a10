use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::settings::types::Settings;

/// Overrides the settings file location.
pub const SETTINGS_PATH_ENV: &str = "STEREOPOSE_SETTINGS";
/// Overrides the server address as `host:port`.
pub const SERVER_ENV: &str = "STEREOPOSE_SERVER";

const DEFAULT_FILE_NAME: &str = "stereopose.json";

/// Settings file path: `$STEREOPOSE_SETTINGS`, else `stereopose.json` in the
/// working directory.
pub fn settings_path() -> PathBuf {
    std::env::var_os(SETTINGS_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FILE_NAME))
}

/// Persistent settings store with debounced saving.
pub struct SettingsStore {
    path: PathBuf,
    data: Mutex<Settings>,
    save_notify: Notify,
    is_dirty: AtomicBool,
}

impl SettingsStore {
    /// Create a new store, loading from disk if the file exists. An
    /// unreadable file falls back to defaults.
    pub fn new(path: PathBuf) -> Self {
        let data = match Self::load(&path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("ignoring unreadable settings at {}: {e}", path.display());
                Settings::default()
            }
        };
        Self {
            path,
            data: Mutex::new(data),
            save_notify: Notify::new(),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// Load settings from a JSON file, returning defaults on a missing file.
    pub fn load(path: &Path) -> Result<Settings, String> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&contents).map_err(|e| e.to_string())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save current settings to disk atomically (write .tmp then rename).
    pub fn save(&self) -> Result<(), String> {
        let data = self.data.lock().clone();
        let json = serde_json::to_string_pretty(&data).map_err(|e| e.to_string())?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json).map_err(|e| e.to_string())?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| e.to_string())?;

        self.is_dirty.store(false, Ordering::Release);
        Ok(())
    }

    /// Current settings.
    pub fn get(&self) -> Settings {
        self.data.lock().clone()
    }

    /// Change settings in place. Triggers a debounced save when `apply`
    /// actually changed something.
    pub fn update(&self, apply: impl FnOnce(&mut Settings)) {
        let changed = {
            let mut data = self.data.lock();
            let before = data.clone();
            apply(&mut data);
            *data != before
        };
        if changed {
            self.is_dirty.store(true, Ordering::Release);
            self.save_notify.notify_one();
        }
    }

    /// Whether there are changes not yet written to disk.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Start the debounce task: waits for dirty notification, sleeps 500ms, then saves.
    ///
    /// Uses an `AtomicBool` dirty flag to avoid losing notifications that arrive
    /// between `save()` completing and `notified().await` re-registering.
    /// Must be called from inside a tokio runtime.
    pub fn start_debounce_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                store.save_notify.notified().await;
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                if store.is_dirty.swap(false, Ordering::AcqRel) {
                    if let Err(e) = store.save() {
                        store.is_dirty.store(true, Ordering::Release);
                        tracing::warn!("Failed to save settings: {e}");
                    }
                }
            }
        })
    }
}
