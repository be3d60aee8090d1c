use monosink_ports::storage::{SinkSettings, StorageError, StoragePort};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const APP_DIR: &str = "monosink";
pub const SETTINGS_FILE: &str = "settings.json";

/// Sink settings kept as one JSON file. Whatever is on disk comes back
/// sanitized, so zero depths or rates never reach a `SinkConfig`.
pub struct FsStorage {
    dir: PathBuf,
}

impl FsStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// `<config dir>/monosink`.
    pub fn in_config_dir() -> Result<Self, StorageError> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| StorageError::Io("config dir not found".to_string()))?;
        Ok(Self::new(base.join(APP_DIR)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    fn staging_path(&self) -> PathBuf {
        self.dir.join(format!("{SETTINGS_FILE}.tmp"))
    }
}

impl Default for FsStorage {
    fn default() -> Self {
        Self::in_config_dir().unwrap_or_else(|err| {
            warn!(error = %err, "falling back to the working directory for settings");
            Self::new(PathBuf::from("."))
        })
    }
}

impl StoragePort for FsStorage {
    fn load_settings(&self) -> Result<SinkSettings, StorageError> {
        let path = self.settings_path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no saved settings, using defaults");
                return Ok(SinkSettings::default());
            }
            Err(err) => return Err(StorageError::Io(err.to_string())),
        };

        let stored: SinkSettings =
            serde_json::from_slice(&data).map_err(|e| StorageError::Serde(e.to_string()))?;
        let settings = stored.clone().sanitized();
        if settings != stored {
            warn!(path = %path.display(), "saved settings had zero or blank values, using defaults for them");
        }
        info!(path = %path.display(), feed = %settings.feed, "loaded settings");
        Ok(settings)
    }

    /// Writes a staging file beside the target and renames it over the
    /// target, so a crash mid-write leaves the previous file intact.
    fn save_settings(&self, s: &SinkSettings) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::Io(e.to_string()))?;
        let data = serde_json::to_vec_pretty(&s.clone().sanitized())
            .map_err(|e| StorageError::Serde(e.to_string()))?;

        let staging = self.staging_path();
        let path = self.settings_path();
        if let Err(err) = fs::write(&staging, data).and_then(|()| fs::rename(&staging, &path)) {
            let _ = fs::remove_file(&staging);
            return Err(StorageError::Io(err.to_string()));
        }
        info!(path = %path.display(), "saved settings");
        Ok(())
    }
}
