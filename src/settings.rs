//! Settings infrastructure for codenav.
//!
//! This module provides support for loading and parsing settings.toml
//! files to configure the remote index addressing and the navigation
//! tuning knobs.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::nav::NavigationTuning;

/// Root settings structure loaded from settings.toml.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Remote index addressing.
    pub index: Option<IndexSettings>,
    /// Navigation tuning.
    pub navigation: Option<NavigationSettings>,
}

/// Where open documents live in the remote index.
#[derive(Debug, Default, Deserialize)]
pub struct IndexSettings {
    /// Repository name, e.g. "github.com/acme/widget". Navigation is
    /// disabled while unset.
    pub repository: Option<String>,
    /// Commit revision the index was built at (default: "HEAD").
    pub commit: Option<String>,
}

/// Navigation tuning overrides; anything unset keeps its default.
#[derive(Debug, Default, Deserialize)]
pub struct NavigationSettings {
    /// Window race deadline in milliseconds (default: 25).
    pub race_delay_ms: Option<u64>,
    /// Page budget per paginated sequence (default: 10).
    pub max_pages: Option<usize>,
    /// Documents kept in the stencil cache (default: 10).
    pub stencil_capacity: Option<usize>,
    /// Point-query results kept in the memoizer (default: 5).
    pub memo_capacity: Option<usize>,
}

impl Settings {
    /// Fold the `[navigation]` overrides into a full tuning struct.
    pub fn tuning(&self) -> NavigationTuning {
        let defaults = NavigationTuning::default();
        let Some(navigation) = &self.navigation else {
            return defaults;
        };
        NavigationTuning {
            race_delay: navigation
                .race_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.race_delay),
            max_pages: navigation.max_pages.unwrap_or(defaults.max_pages),
            stencil_capacity: navigation
                .stencil_capacity
                .and_then(NonZeroUsize::new)
                .unwrap_or(defaults.stencil_capacity),
            memo_capacity: navigation.memo_capacity.unwrap_or(defaults.memo_capacity),
        }
    }

    /// Repository and commit for remote addressing, if configured.
    pub fn remote_coordinates(&self) -> Option<(String, String)> {
        let index = self.index.as_ref()?;
        let repository = index.repository.clone()?;
        let commit = index.commit.clone().unwrap_or_else(|| "HEAD".to_string());
        Some((repository, commit))
    }
}

/// Load settings from a settings.toml file.
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unparsable settings.toml");
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

/// Walk up from `start` looking for a settings.toml.
///
/// Returns the loaded settings and the directory they were found in
/// (or defaults and `start` when no file exists on the path to the root).
pub fn discover_settings(start: &Path) -> (Settings, PathBuf) {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join("settings.toml");
        if candidate.is_file() {
            return (load_settings(&candidate), dir);
        }
        if !dir.pop() {
            return (Settings::default(), start.to_path_buf());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unconfigured() {
        let settings = Settings::default();
        let tuning = settings.tuning();
        assert_eq!(tuning.race_delay, Duration::from_millis(25));
        assert_eq!(tuning.max_pages, 10);
        assert_eq!(tuning.stencil_capacity.get(), 10);
        assert_eq!(tuning.memo_capacity, 5);
        assert!(settings.remote_coordinates().is_none());
    }

    #[test]
    fn parses_overrides() {
        let settings: Settings = toml::from_str(
            r#"
            [index]
            repository = "github.com/acme/widget"
            commit = "deadbeef"

            [navigation]
            race_delay_ms = 50
            max_pages = 3
            "#,
        )
        .unwrap();

        let tuning = settings.tuning();
        assert_eq!(tuning.race_delay, Duration::from_millis(50));
        assert_eq!(tuning.max_pages, 3);
        assert_eq!(tuning.memo_capacity, 5);
        assert_eq!(
            settings.remote_coordinates(),
            Some(("github.com/acme/widget".to_string(), "deadbeef".to_string()))
        );
    }

    #[test]
    fn commit_defaults_to_head() {
        let settings: Settings = toml::from_str(
            r#"
            [index]
            repository = "github.com/acme/widget"
            "#,
        )
        .unwrap();
        assert_eq!(
            settings.remote_coordinates(),
            Some(("github.com/acme/widget".to_string(), "HEAD".to_string()))
        );
    }

    #[test]
    fn zero_stencil_capacity_falls_back_to_default() {
        let settings: Settings = toml::from_str(
            r#"
            [navigation]
            stencil_capacity = 0
            "#,
        )
        .unwrap();
        assert_eq!(settings.tuning().stencil_capacity.get(), 10);
    }
}
