//! Subcommand implementations.

pub mod build;
pub mod list;
pub mod relocate;

use std::path::Path;

use anyhow::{Context, Result};
use pyjs_core::{Factory, HostPython, Project, Settings, Shell};
use tracing::{debug, warn};

use crate::StageArgs;

/// Resolve settings: defaults, then the settings file, then flags.
pub fn load_settings(root: &Path, config: Option<&Path>, stages: &StageArgs) -> Result<Settings> {
    let mut settings = match config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::load_or_default(root)?,
    };
    stages.apply(&mut settings);
    debug!("settings: {settings:?}");
    Ok(settings)
}

/// Factory for the project at `root`, described by the host's `python3`.
pub fn factory(root: &Path, settings: Settings) -> Result<Factory> {
    let root = std::path::absolute(root)
        .with_context(|| format!("invalid project root {}", root.display()))?;
    let python = HostPython::detect(&Shell::default()).unwrap_or_else(|e| {
        warn!("host python not detected ({e}); assuming {}", settings.python_version);
        HostPython::from_version(&settings.python_version, "/usr/local")
    });
    Ok(Factory::new(Project::new(root, python), settings))
}

/// Print a builder graph and its stage plan as JSON.
pub fn print_plan(graph: &serde_json::Value, plan: &[pyjs_core::Stage]) -> Result<()> {
    let doc = serde_json::json!({ "graph": graph, "plan": plan });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
