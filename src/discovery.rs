use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser;

/// Directories that are always excluded from file discovery.
pub const BUILTIN_IGNORE_PATTERNS: &[&str] = &[
    "!.claude/",
    "!.cursor/",
    "!.vscode/",
    "!.idea/",
    "!.git/",
    "!node_modules/",
    "!.obsidian/",
    "!__pycache__/",
    "!.next/",
    "!.nuxt/",
    "!.svelte-kit/",
    "!target/",
    "!dist/",
    "!build/",
    "!out/",
];

/// Discovers markdown files under the configured space, applying gitignore
/// rules, built-in ignore patterns, user-configured patterns, and the
/// proposal/hidden-directory exclusion rules from [`parser::is_excluded`].
#[derive(Debug)]
pub struct FileDiscovery {
    space_path: PathBuf,
    ignore_patterns: Vec<String>,
}

impl FileDiscovery {
    /// Create a new `FileDiscovery` from config.
    pub fn new(config: &Config) -> Self {
        Self {
            space_path: config.space_path.clone(),
            ignore_patterns: config.ignore_patterns.clone(),
        }
    }

    /// Discover all indexable `.md` files under the space.
    ///
    /// Returns a sorted `Vec<PathBuf>` of paths relative to the space root.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut results = Vec::new();

        if !self.space_path.is_dir() {
            debug!(path = %self.space_path.display(), "space path does not exist");
            return Ok(results);
        }

        let overrides = self.build_overrides(&self.space_path)?;

        let walker = WalkBuilder::new(&self.space_path)
            .standard_filters(true)
            .overrides(overrides)
            .build();

        for entry in walker {
            let entry = entry.map_err(|e| {
                let msg = e.to_string();
                Error::Io(
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other(msg)),
                )
            })?;

            let path = entry.path();

            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }

            let relative = path.strip_prefix(&self.space_path).map_err(|_| {
                Error::Io(std::io::Error::other(format!(
                    "path {} is not under space root {}",
                    path.display(),
                    self.space_path.display()
                )))
            })?;

            if parser::is_excluded(relative) {
                continue;
            }

            results.push(relative.to_path_buf());
        }

        results.sort();
        results.dedup();
        Ok(results)
    }

    /// Check whether a relative path should be indexed.
    ///
    /// Returns `true` if the path has a `.md` extension, is not under any
    /// built-in ignored directory, does not match a custom ignore pattern,
    /// and is not excluded by the proposal/rejected/hidden-directory rules.
    /// Used by the file watcher to filter filesystem events.
    pub fn should_index(&self, relative_path: &Path) -> bool {
        if relative_path.extension().and_then(|e| e.to_str()) != Some("md") {
            return false;
        }

        if parser::is_excluded(relative_path) {
            return false;
        }

        for pattern in BUILTIN_IGNORE_PATTERNS {
            let dir_name = pattern.trim_start_matches('!').trim_end_matches('/');
            for component in relative_path.components() {
                if let std::path::Component::Normal(c) = component {
                    if c == dir_name {
                        return false;
                    }
                }
            }
        }

        let path_str = relative_path.to_string_lossy();
        for pattern in &self.ignore_patterns {
            let pat = if let Some(stripped) = pattern.strip_prefix('!') {
                stripped
            } else {
                pattern.as_str()
            };

            if path_str.contains(pat.trim_end_matches('/')) {
                return false;
            }
        }

        true
    }

    /// Build override rules combining built-in patterns and user-configured patterns.
    fn build_overrides(&self, dir: &Path) -> Result<ignore::overrides::Override> {
        let mut builder = OverrideBuilder::new(dir);

        for pattern in BUILTIN_IGNORE_PATTERNS {
            builder.add(pattern).map_err(|e| {
                Error::ConfigError(format!("invalid built-in ignore pattern '{pattern}': {e}"))
            })?;
        }

        for pattern in &self.ignore_patterns {
            let negated = if pattern.starts_with('!') {
                pattern.clone()
            } else {
                format!("!{pattern}")
            };
            builder.add(&negated).map_err(|e| {
                Error::ConfigError(format!("invalid ignore pattern '{pattern}': {e}"))
            })?;
        }

        builder
            .build()
            .map_err(|e| Error::ConfigError(format!("failed to build override rules: {e}")))
    }
}
