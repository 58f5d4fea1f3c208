//! Prebuilt relocatable `Python.framework`, fetched into `support/`.

use std::path::PathBuf;

use tracing::info;

use super::stdlib::{self, TrimPlan};
use super::{BuildContext, BuildStrategy, Stage, Variant, require_exists, reset_paths};
use crate::error::{BuildError, Result};
use crate::product::Product;
use crate::project::Project;
use crate::shell::Cmd;

/// Helper script, relative to the project's `scripts` directory.
pub const FRAMEWORK_SCRIPT: &str = "relocatable-python/make_relocatable_python_framework.py";

/// Minimum macOS release of the downloaded framework.
pub const OS_VERSION: &str = "11";

/// Strategy for the relocatable framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonRelocatable;

impl PythonRelocatable {
    fn framework(project: &Project) -> PathBuf {
        project.support.join("Python.framework")
    }
}

impl BuildStrategy for PythonRelocatable {
    fn variant(&self) -> Variant {
        Variant::PythonRelocatable
    }

    fn prefix(&self, product: &Product, project: &Project) -> PathBuf {
        Self::framework(project).join("Versions").join(product.ver())
    }

    fn stages(&self) -> &'static [Stage] {
        &[Stage::Reset, Stage::Download, Stage::PostProcess]
    }

    fn product_exists(&self, ctx: &BuildContext<'_>) -> bool {
        Self::framework(ctx.project).exists()
    }

    fn reset(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let framework = Self::framework(ctx.project);
        reset_paths(ctx, &[framework.as_path()])
    }

    fn download(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let framework = Self::framework(ctx.project);
        if framework.exists() {
            info!("framework present: {}", framework.display());
            return Ok(());
        }
        let script = ctx.project.scripts.join(FRAMEWORK_SCRIPT);
        if !script.exists() {
            return Err(BuildError::config(format!(
                "relocatable framework script not found: {}",
                script.display()
            )));
        }
        ctx.run(
            Cmd::new("python3")
                .arg_path(&script)
                .args(["--python-version", ctx.product.version.as_str()])
                .arg("--destination")
                .arg_path(&ctx.project.support)
                .args(["--os-version", OS_VERSION])
                .cwd(&ctx.project.root),
        )?;
        require_exists(&framework, "relocatable framework")
    }

    /// The framework arrives prebuilt; building means fetching it.
    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        self.download(ctx)
    }

    fn post_process(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let plan = TrimPlan::relocatable(ctx.product);
        stdlib::clean(ctx.shell, &ctx.paths, &plan)?;
        stdlib::ziplib(ctx.shell, &ctx.paths, &plan, ctx.settings.precompile)?;
        Ok(())
    }

    fn clean(&self, ctx: &BuildContext<'_>) -> Result<()> {
        require_exists(&ctx.paths.prefix, "relocatable framework")?;
        stdlib::clean(ctx.shell, &ctx.paths, &TrimPlan::relocatable(ctx.product))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::project::HostPython;
    use crate::shell::{RecordingRunner, Shell};
    use std::fs;
    use std::sync::Arc;

    fn relocatable(root: &std::path::Path) -> (Arc<RecordingRunner>, Builder) {
        let runner = Arc::new(RecordingRunner::new());
        let project = Arc::new(Project::new(root, HostPython::from_version("3.11.7", "/usr/local")));
        let builder = Builder::new(Product::new("Python", "3.11.7"), project, PythonRelocatable)
            .with_shell(Shell::new(runner.clone()));
        (runner, builder)
    }

    #[test]
    fn test_missing_script_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, builder) = relocatable(dir.path());
        let err = builder.download().unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_download_invokes_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("scripts").join(FRAMEWORK_SCRIPT);
        fs::create_dir_all(script.parent().unwrap()).unwrap();
        fs::write(&script, "").unwrap();

        let (runner, builder) = relocatable(dir.path());
        let err = builder.download().unwrap_err();
        assert!(matches!(err, BuildError::Invariant(_)));

        let calls = runner.calls_to("python3");
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args[1..3],
            ["--python-version", "3.11.7"]
        );
        assert_eq!(calls[0].last_arg(), Some(OS_VERSION));
    }

    #[test]
    fn test_post_process_keeps_site_packages() {
        let dir = tempfile::tempdir().unwrap();
        let (_runner, builder) = relocatable(dir.path());
        let prefix = dir.path().join("support/Python.framework/Versions/3.11");
        let lib = prefix.join("lib/python3.11");
        fs::create_dir_all(lib.join("lib-dynload")).unwrap();
        fs::create_dir_all(lib.join("site-packages/pip")).unwrap();
        fs::create_dir_all(lib.join("idlelib")).unwrap();
        fs::create_dir_all(prefix.join("lib/tk8.6")).unwrap();
        fs::write(lib.join("os.py"), "").unwrap();
        fs::write(lib.join("site-packages/pip/__init__.py"), "").unwrap();

        assert!(builder.product_exists());
        builder.post_process().unwrap();

        assert!(lib.join("site-packages/pip/__init__.py").exists());
        assert!(!lib.join("idlelib").exists());
        assert!(!prefix.join("lib/tk8.6").exists());
        assert!(prefix.join("lib/python311.zip").exists());
    }
}
