use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join("skimr"))
        } else {
            ProjectDirs::from("", "", "skimr").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    /// Attempt ledger database.
    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("attempts.db"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("skimr.log"))
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "skimr").map(|pd| pd.config_dir().join("config.json"))
    }
}
