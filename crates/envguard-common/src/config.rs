//! Configuration model for the environment-protection preset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{EnvguardError, Result};

/// Where to find the hook object and how its maps are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    /// Compiled BPF object holding the LSM program and its maps.
    pub object_path: PathBuf,
    /// LSM program name inside the object.
    pub program: String,
    /// LSM hook the program attaches to.
    pub lsm_hook: String,
    /// Ring buffer map carrying events to user space.
    pub events_map: String,
    /// Pinned name of the container table.
    pub container_map: String,
    /// BPF filesystem directory maps are pinned under.
    pub pin_dir: PathBuf,
    /// Capacity of the internal event queue.
    pub channel_capacity: usize,
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            object_path: PathBuf::from(constants::DEFAULT_OBJECT_PATH),
            program: constants::DEFAULT_PROGRAM.to_owned(),
            lsm_hook: constants::DEFAULT_LSM_HOOK.to_owned(),
            events_map: constants::DEFAULT_EVENTS_MAP.to_owned(),
            container_map: constants::DEFAULT_CONTAINER_MAP.to_owned(),
            pin_dir: PathBuf::from(constants::DEFAULT_PIN_DIR),
            channel_capacity: constants::EVENT_CHANNEL_SIZE,
        }
    }
}

impl PresetConfig {
    /// Reads a JSON configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EnvguardError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`EnvguardError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(EnvguardError::Config {
                message: "channel_capacity must be greater than zero".into(),
            });
        }
        for (field, value) in [
            ("program", &self.program),
            ("lsm_hook", &self.lsm_hook),
            ("events_map", &self.events_map),
            ("container_map", &self.container_map),
        ] {
            if value.is_empty() {
                return Err(EnvguardError::Config {
                    message: format!("{field} must not be empty"),
                });
            }
        }
        Ok(())
    }

    /// Full path of the pinned container table.
    #[must_use]
    pub fn container_map_pin(&self) -> PathBuf {
        self.pin_dir.join(&self.container_map)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PresetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.channel_capacity, constants::EVENT_CHANNEL_SIZE);
        assert_eq!(
            config.container_map_pin(),
            PathBuf::from("/sys/fs/bpf/envguard_preset_containers")
        );
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = PresetConfig {
            channel_capacity: 0,
            ..PresetConfig::default()
        };
        assert!(matches!(config.validate(), Err(EnvguardError::Config { .. })));
    }

    #[test]
    fn empty_program_name_is_rejected() {
        let config = PresetConfig {
            program: String::new(),
            ..PresetConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("program"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"object_path": "/tmp/hook.o", "channel_capacity": 16}}"#).unwrap();

        let config = PresetConfig::from_file(file.path()).unwrap();
        assert_eq!(config.object_path, PathBuf::from("/tmp/hook.o"));
        assert_eq!(config.channel_capacity, 16);
        assert_eq!(config.program, constants::DEFAULT_PROGRAM);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = PresetConfig::from_file(Path::new("/nonexistent/envguard.json")).unwrap_err();
        assert!(matches!(err, EnvguardError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/envguard.json"));
    }
}
