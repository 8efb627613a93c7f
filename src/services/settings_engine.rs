// Scriptbridge Settings Engine
// Loads, saves and edits manager settings. Settings live in a JSON file at
// the platform config path unless a path override is given.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::platform;
use crate::types::errors::SettingsError;
use crate::types::settings::{LoggingSettings, ManagerSettings};

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<ManagerSettings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> &ManagerSettings;
    fn set_value(&mut self, key: &str, value: Value) -> Result<(), SettingsError>;
    fn reset(&mut self) -> Result<(), SettingsError>;
    fn get_config_path(&self) -> &str;
}

/// Settings engine persisting `ManagerSettings` as pretty-printed JSON.
pub struct SettingsEngine {
    config_path: String,
    settings: ManagerSettings,
}

impl SettingsEngine {
    /// Creates an engine holding defaults; call `load` to read the file.
    ///
    /// Without `path_override` the file is `settings.json` in the platform config directory.
    pub fn new(path_override: Option<String>) -> Self {
        let config_path = path_override.unwrap_or_else(|| {
            platform::get_config_dir()
                .join("settings.json")
                .to_string_lossy()
                .to_string()
        });

        Self {
            config_path,
            settings: ManagerSettings::default(),
        }
    }

    /// Log level to start with, read before any subscriber exists.
    ///
    /// A settings file that cannot be loaded yields the default level; the
    /// load error itself is reported later, once logging is up.
    pub fn startup_log_level(path_override: Option<String>) -> String {
        let mut engine = Self::new(path_override);
        match engine.load() {
            Ok(settings) => settings.logging.level,
            Err(_) => LoggingSettings::default().level,
        }
    }
}

/// Replaces the value at a dot-separated path. Only existing keys may be set.
fn set_path(root: &mut Value, key: &str, value: Value) -> Result<(), SettingsError> {
    let mut parts = key.split('.').peekable();
    let mut current = root;

    while let Some(part) = parts.next() {
        if part.is_empty() {
            return Err(SettingsError::InvalidKey(format!("Empty segment in key '{}'", key)));
        }
        let Value::Object(map) = current else {
            return Err(SettingsError::InvalidKey(format!(
                "Cannot descend into '{}': not an object",
                key
            )));
        };
        let Some(slot) = map.get_mut(part) else {
            return Err(SettingsError::InvalidKey(format!("Unknown settings key '{}'", key)));
        };
        if parts.peek().is_none() {
            *slot = value;
            return Ok(());
        }
        current = slot;
    }

    Err(SettingsError::InvalidKey("Key cannot be empty".to_string()))
}

impl SettingsEngineTrait for SettingsEngine {
    /// Reads the settings file.
    ///
    /// A missing file yields defaults; a malformed one is a serialization error.
    fn load(&mut self) -> Result<ManagerSettings, SettingsError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            self.settings = ManagerSettings::default();
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SettingsError::IoError(format!("Failed to read settings file: {}", e)))?;

        self.settings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to parse settings file: {}", e))
        })?;
        Ok(self.settings.clone())
    }

    /// Writes the current settings, creating parent directories as needed.
    fn save(&self) -> Result<(), SettingsError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SettingsError::IoError(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| SettingsError::IoError(format!("Failed to write settings file: {}", e)))
    }

    fn get_settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Updates one setting by dot path, e.g. `detection.cache_ttl_secs`, then saves.
    ///
    /// The edited tree is deserialized again before it is accepted, so a
    /// value of the wrong type is rejected and nothing changes.
    fn set_value(&mut self, key: &str, value: Value) -> Result<(), SettingsError> {
        if key.is_empty() {
            return Err(SettingsError::InvalidKey("Key cannot be empty".to_string()));
        }

        let mut tree = serde_json::to_value(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;
        set_path(&mut tree, key, value)?;

        self.settings = serde_json::from_value(tree).map_err(|e| {
            SettingsError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;
        self.save()
    }

    /// Restores defaults and saves.
    fn reset(&mut self) -> Result<(), SettingsError> {
        self.settings = ManagerSettings::default();
        self.save()
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
