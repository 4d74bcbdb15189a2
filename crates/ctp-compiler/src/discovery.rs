//! Profile file discovery.
//!
//! A logical group name such as `common` is resolved to a concrete file by
//! trying chip and platform suffixes from most to least specific
//! (`common_ga102_emu.ctp`, `common_ga102.ctp`, `common_ga10x_emu.ctp`, ...,
//! `common.ctp`) in each search directory in turn.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ctp_ir::types::{Platform, TargetInfo};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("No file found for group '{group}' (tried {tried} candidates)")]
    NotFound { group: String, tried: usize },

    #[error("Invalid group name '{0}'")]
    InvalidGroup(String),

    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// File extension without the dot.
    pub extension: String,
    /// Conventional subdirectory searched after the root directory.
    pub subdir: String,
    /// Environment variables holding extra search paths.
    pub env_vars: Vec<String>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            extension: "ctp".to_string(),
            subdir: "ctp".to_string(),
            env_vars: vec!["CTP_PATH".to_string()],
        }
    }
}

fn platform_suffix(platform: Platform) -> &'static str {
    match platform {
        Platform::Hardware => "hw",
        Platform::Emulation => "emu",
        Platform::Simulation => "sim",
    }
}

/// Chip suffixes from exact id to none: `ga102`, `ga10x`, `ampere`, ``.
pub fn chip_chain(target: &TargetInfo) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    let mut add = |s: String| {
        if !chain.contains(&s) {
            chain.push(s);
        }
    };
    let chip = target.chip.trim().to_lowercase();
    if !chip.is_empty() {
        add(chip.clone());
        if chip.ends_with(|c: char| c.is_ascii_digit()) {
            let mut truncated = chip.clone();
            truncated.pop();
            truncated.push('x');
            add(truncated);
        }
    }
    let family = target.family.trim().to_lowercase();
    if !family.is_empty() {
        add(family);
    }
    add(String::new());
    chain
}

/// Resolves group names to files.
#[derive(Debug, Clone)]
pub struct FileLocator {
    settings: DiscoverySettings,
    dirs: Vec<PathBuf>,
    target: TargetInfo,
}

impl FileLocator {
    /// Search `root`, then `root/<subdir>`, then each directory listed in
    /// the configured environment variables.
    pub fn new(settings: DiscoverySettings, root: &Path, target: TargetInfo) -> Self {
        let mut dirs = vec![root.to_path_buf(), root.join(&settings.subdir)];
        for var in &settings.env_vars {
            if let Some(value) = std::env::var_os(var) {
                dirs.extend(std::env::split_paths(&value));
            }
        }
        Self {
            settings,
            dirs,
            target,
        }
    }

    /// Append explicit search directories after the default ones.
    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.dirs.extend(paths);
        self
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Candidate file names for `group`, most specific first.
    pub fn candidates(&self, group: &str) -> Vec<String> {
        let platform = platform_suffix(self.target.platform);
        let mut names = Vec::new();
        for chip in chip_chain(&self.target) {
            for plat in [platform, ""] {
                let mut name = group.to_string();
                for part in [chip.as_str(), plat] {
                    if !part.is_empty() {
                        name.push('_');
                        name.push_str(part);
                    }
                }
                name.push('.');
                name.push_str(&self.settings.extension);
                names.push(name);
            }
        }
        names
    }

    /// First existing file for `group`.
    pub fn locate(&self, group: &str) -> Result<PathBuf, DiscoveryError> {
        let group = group.trim();
        if group.is_empty()
            || group.contains(|c: char| c == '/' || c == '\\')
            || group.starts_with('.')
        {
            return Err(DiscoveryError::InvalidGroup(group.to_string()));
        }
        let candidates = self.candidates(group);
        for name in &candidates {
            for dir in &self.dirs {
                let path = dir.join(name);
                if path.is_file() {
                    tracing::debug!(group, path = %path.display(), "resolved profile group");
                    return Ok(path);
                }
            }
        }
        Err(DiscoveryError::NotFound {
            group: group.to_string(),
            tried: candidates.len() * self.dirs.len(),
        })
    }

    pub fn read(&self, path: &Path) -> Result<String, DiscoveryError> {
        std::fs::read_to_string(path).map_err(|source| DiscoveryError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(chip: &str, family: &str, platform: Platform) -> TargetInfo {
        TargetInfo {
            chip: chip.to_string(),
            family: family.to_string(),
            platform,
            ..Default::default()
        }
    }

    #[test]
    fn test_chip_chain() {
        let chain = chip_chain(&target("GA102", "ampere", Platform::Hardware));
        assert_eq!(chain, vec!["ga102", "ga10x", "ampere", ""]);
        let chain = chip_chain(&target("", "", Platform::Hardware));
        assert_eq!(chain, vec![""]);
    }

    #[test]
    fn test_candidate_order() {
        let locator = FileLocator {
            settings: DiscoverySettings::default(),
            dirs: Vec::new(),
            target: target("ga102", "ampere", Platform::Emulation),
        };
        let names = locator.candidates("common");
        assert_eq!(names.first().map(String::as_str), Some("common_ga102_emu.ctp"));
        assert_eq!(names[1], "common_ga102.ctp");
        assert_eq!(names[2], "common_ga10x_emu.ctp");
        assert_eq!(names.last().map(String::as_str), Some("common.ctp"));
        assert_eq!(names.len(), 8);
    }
}
