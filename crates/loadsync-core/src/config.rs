//! Synchronizer configuration types.

use derive_builder::Builder;
use globset::Glob;
use serde::{Deserialize, Serialize};

/// File extensions (without the dot) that receive execute permission when
/// extracted on Unix. The empty string matches files without an extension.
pub const DEFAULT_EXECUTABLE_EXTENSIONS: &[&str] =
    &["", "sh", "bin", "run", "py", "pl", "php", "rb", "out", "elf"];

/// Configuration for scanning and synchronization.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SyncConfig {
    /// Glob patterns (matched against the location-relative path) that are
    /// never scanned, ingested or backed up.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Glob patterns whose files are indexed but never backed up.
    #[builder(default)]
    #[serde(default)]
    pub ignore_backup_patterns: Vec<String>,

    /// Extensions that are marked executable after extraction.
    #[builder(default = "default_executable_extensions()")]
    #[serde(default = "default_executable_extensions")]
    pub executable_extensions: Vec<String>,

    /// Number of threads for hashing (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Emit a scan progress update every this many files.
    #[builder(default = "1000")]
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

fn default_executable_extensions() -> Vec<String> {
    DEFAULT_EXECUTABLE_EXTENSIONS
        .iter()
        .map(|ext| (*ext).to_string())
        .collect()
}

fn default_progress_interval() -> usize {
    1000
}

impl SyncConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let patterns = self
            .ignore_patterns
            .iter()
            .chain(self.ignore_backup_patterns.iter())
            .flatten();
        for pattern in patterns {
            Glob::new(pattern).map_err(|e| format!("Invalid glob pattern {pattern:?}: {e}"))?;
        }
        if let Some(ref extensions) = self.executable_extensions {
            if let Some(bad) = extensions.iter().find(|ext| ext.starts_with('.')) {
                return Err(format!("Extension {bad:?} must not start with a dot"));
            }
        }
        if self.progress_interval == Some(0) {
            return Err("Progress interval must be positive".to_string());
        }
        Ok(())
    }
}

impl SyncConfig {
    /// Create a new config builder.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Whether a file with this extension should be made executable.
    pub fn is_executable_extension(&self, extension: Option<&str>) -> bool {
        let extension = extension.unwrap_or("");
        self.executable_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            ignore_backup_patterns: Vec::new(),
            executable_extensions: default_executable_extensions(),
            threads: 0,
            progress_interval: default_progress_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = SyncConfig::builder()
            .ignore_patterns(vec!["*.log".to_string()])
            .threads(4usize)
            .build()
            .unwrap();

        assert_eq!(config.ignore_patterns, vec!["*.log"]);
        assert_eq!(config.threads, 4);
        assert_eq!(config.progress_interval, 1000);
        assert!(config.is_executable_extension(Some("sh")));
    }

    #[test]
    fn test_builder_rejects_bad_input() {
        assert!(SyncConfig::builder()
            .ignore_patterns(vec!["a[".to_string()])
            .build()
            .is_err());
        assert!(SyncConfig::builder()
            .executable_extensions(vec![".sh".to_string()])
            .build()
            .is_err());
    }

    #[test]
    fn test_executable_extension_matching() {
        let config = SyncConfig::default();
        assert!(config.is_executable_extension(None));
        assert!(config.is_executable_extension(Some("SH")));
        assert!(config.is_executable_extension(Some("elf")));
        assert!(!config.is_executable_extension(Some("txt")));
    }

    #[test]
    fn test_default_matches_builder() {
        let built = SyncConfig::builder().build().unwrap();
        let default = SyncConfig::default();
        assert_eq!(built.executable_extensions, default.executable_extensions);
        assert_eq!(built.progress_interval, default.progress_interval);
        assert_eq!(default.executable_extensions.len(), 10);
    }
}
