//! `relocate` command

use std::path::Path;

use anyhow::{Result, bail};
use pyjs_core::Shell;
use pyjs_core::relocate::DependencyManager;
use pyjs_core::shell::require_tools;

/// Optional relocation settings.
#[derive(Debug, Default)]
pub struct Options<'a> {
    /// Install name given to the copied binary.
    pub exec_ref: Option<&'a str>,
    /// Run-path entry added to the copied binary.
    pub rpath: Option<&'a str>,
    /// Where static counterparts of the dependencies are mirrored.
    pub staticlibs_dir: Option<&'a Path>,
}

/// Make `binary` self-contained inside `dest`.
pub fn relocate(binary: &Path, dest: &Path, options: &Options<'_>) -> Result<()> {
    if !binary.exists() {
        bail!("{} does not exist", binary.display());
    }
    require_tools(&["otool", "install_name_tool"])?;

    let shell = Shell::default();
    let mut manager = DependencyManager::new(&shell, binary);
    if let Some(exec_ref) = options.exec_ref {
        manager = manager.with_exec_ref(exec_ref);
    }
    if let Some(rpath) = options.rpath {
        manager = manager.with_rpath(rpath);
    }
    if let Some(dir) = options.staticlibs_dir {
        manager = manager.with_staticlibs_dir(dir);
    }

    let report = manager.process(dest)?;
    for dep in manager.deps() {
        println!("{dep}");
    }
    if let Some(report) = report {
        println!(
            "static archives: {} copied, {} missing",
            report.copied.len(),
            report.missing.len()
        );
    }
    Ok(())
}
