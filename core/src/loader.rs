//! Layered configuration discovery and merging.
//!
//! Up to three files are considered, in increasing precedence:
//!
//! 1. global `~/.cc-hooks.json`
//! 2. project `<cwd>/.cc-hooks.json`
//! 3. local `<cwd>/.cc-hooks.local.json`
//!
//! A CLI-provided path replaces the search entirely. Missing files contribute
//! nothing; when no file exists at all the invocation short-circuits to exit 0
//! upstream.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::warn;

use crate::config::FileConfig;
use crate::config::HookDefinition;
use crate::config::LoggingSettings;
use crate::config::parse_file_config;
use crate::error::HookError;
use crate::error::Result;

pub const GLOBAL_CONFIG_FILENAME: &str = ".cc-hooks.json";
pub const PROJECT_CONFIG_FILENAME: &str = ".cc-hooks.json";
pub const LOCAL_CONFIG_FILENAME: &str = ".cc-hooks.local.json";

/// The merged view of all configuration layers.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    /// Merged hooks in first-appearance order.
    pub hooks: Vec<HookDefinition>,
    pub logging: LoggingSettings,
    /// Files that actually contributed, low to high precedence.
    pub loaded_files: Vec<PathBuf>,
}

impl ResolvedConfig {
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// The default search paths, low to high precedence.
pub fn default_layer_paths(cwd: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(3);
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(GLOBAL_CONFIG_FILENAME));
    }
    paths.push(cwd.join(PROJECT_CONFIG_FILENAME));
    paths.push(cwd.join(LOCAL_CONFIG_FILENAME));
    paths
}

/// Load and merge configuration.
///
/// Returns `None` when no file exists at all (the no-config short-circuit).
/// A malformed file is fatal: no hook from it may run, and partial rules are
/// worse than none.
pub fn load_config(cli_path: Option<&Path>, cwd: &Path) -> Result<Option<ResolvedConfig>> {
    let candidates = match cli_path {
        Some(path) => vec![path.to_path_buf()],
        None => default_layer_paths(cwd),
    };
    load_config_files(&candidates)
}

/// Load and merge an explicit list of candidate files, low to high precedence.
pub fn load_config_files(candidates: &[PathBuf]) -> Result<Option<ResolvedConfig>> {
    let mut layers = Vec::new();
    for path in candidates {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config layer absent");
                continue;
            }
            Err(e) => {
                return Err(HookError::config(path, format!("failed to read: {e}")));
            }
        };
        debug!(path = %path.display(), "loading config layer");
        layers.push((path.clone(), parse_file_config(path, &contents)?));
    }

    if layers.is_empty() {
        warn!("no configuration file found");
        return Ok(None);
    }
    Ok(Some(merge_layers(layers)))
}

/// Merge layers low-to-high: per-name last-writer-wins, replacing in place so
/// first-appearance order is preserved; logging settings last-defined-wins.
fn merge_layers(layers: Vec<(PathBuf, FileConfig)>) -> ResolvedConfig {
    let mut hooks: Vec<HookDefinition> = Vec::new();
    let mut index_by_name: HashMap<String, usize> = HashMap::new();
    let mut logging = LoggingSettings::default();
    let mut loaded_files = Vec::with_capacity(layers.len());

    for (path, layer) in layers {
        for hook in layer.hooks {
            match index_by_name.get(&hook.name) {
                Some(&slot) => hooks[slot] = hook,
                None => {
                    index_by_name.insert(hook.name.clone(), hooks.len());
                    hooks.push(hook);
                }
            }
        }
        if let Some(settings) = layer.logging {
            logging = settings;
        }
        loaded_files.push(path);
    }

    ResolvedConfig {
        hooks,
        logging,
        loaded_files,
    }
}
