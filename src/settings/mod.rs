// Settings persistence: JSON document, debounced atomic saves.

pub mod store;
pub mod types;

pub use store::SettingsStore;
pub use types::Settings;
