//! Configuration management for wayframe
//!
//! Settings are read from a TOML file. Every section is optional and falls
//! back to its defaults, so an empty file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration struct containing all engine settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    /// Shared-memory allocation
    #[serde(default)]
    pub shm: ShmConfig,

    /// Window metadata
    #[serde(default)]
    pub window: WindowConfig,

    /// Keyboard layout fallback
    #[serde(default)]
    pub keyboard: KeyboardConfig,

    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
}

/// Shared-memory object naming and retry budget
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShmConfig {
    /// Prefix of the POSIX shm object name, e.g. "/wayframe"
    pub name_prefix: String,

    /// How many names to try before giving up with `ResourceExhausted`
    pub max_attempts: u32,
}

/// Window metadata sent to the shell
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct WindowConfig {
    /// xdg_toplevel app id
    pub app_id: Option<String>,
}

/// Keymap compiled locally until the compositor sends its own
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Compile a keymap from the names below when the keyboard is bound
    pub fallback_keymap: bool,

    pub rules: String,
    pub model: String,
    pub layout: String,
    pub variant: String,
    pub options: Option<String>,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable debug logging
    pub debug: bool,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            name_prefix: "/wayframe".to_string(),
            max_attempts: 100,
        }
    }
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            fallback_keymap: false,
            rules: String::new(),
            model: String::new(),
            layout: "us".to_string(),
            variant: String::new(),
            options: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            let rest = path.strip_prefix("~").unwrap_or(path);
            Path::new(&home).join(rest)
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: EngineConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let prefix = &self.shm.name_prefix;
        if !prefix.starts_with('/') || prefix[1..].contains('/') {
            anyhow::bail!("Invalid shm name_prefix {prefix:?}: must start with '/' and contain no other '/'");
        }
        // NAME_MAX minus the random suffix
        if prefix.len() > 200 {
            anyhow::bail!("Invalid shm name_prefix: longer than 200 bytes");
        }
        if prefix.contains('\0') {
            anyhow::bail!("Invalid shm name_prefix: contains NUL");
        }

        if self.shm.max_attempts == 0 || self.shm.max_attempts > 10_000 {
            anyhow::bail!("Invalid shm max_attempts: must be between 1 and 10000");
        }

        if let Some(app_id) = &self.window.app_id {
            if app_id.trim().is_empty() {
                anyhow::bail!("Invalid app_id: must not be blank");
            }
        }

        if self.keyboard.fallback_keymap && self.keyboard.layout.is_empty() {
            anyhow::bail!("Invalid keyboard config: fallback_keymap needs a layout");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}


#[cfg(test)]
mod property_tests;
