//! Python built from a source release.
//!
//! One strategy covers the static, shared and framework builds. The deploy
//! target decides which relocation fix runs after the stdlib has been
//! trimmed and zipped.

use std::path::PathBuf;

use tracing::warn;

use super::options::ConfigureOptions;
use super::stdlib::{self, TrimPlan};
use super::{BuildContext, BuildStrategy, Variant, require_exists, reset_paths};
use crate::error::Result;
use crate::product::Product;
use crate::project::Project;
use crate::relocate::Fixer;

/// How the interpreter is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// `libpythonX.Y.a`
    Static,
    /// `libpythonX.Y.dylib`
    Shared,
    /// `Python.framework`
    Framework,
}

/// Where the built interpreter ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deploy {
    /// Left in the build tree.
    Plain,
    /// Embedded in the plugin bundle.
    Ext,
    /// Shipped in the package's `support` directory.
    Pkg,
}

/// Strategy for a Python source build.
#[derive(Debug, Clone, Copy)]
pub struct PythonSrc {
    linkage: Linkage,
    deploy: Deploy,
    tiny: bool,
}

impl PythonSrc {
    /// Strategy for the given linkage and deploy target.
    pub fn new(linkage: Linkage, deploy: Deploy) -> Self {
        Self {
            linkage,
            deploy,
            tiny: false,
        }
    }

    /// Minimal static build with the smallest `Setup.local`.
    pub fn tiny() -> Self {
        Self {
            tiny: true,
            ..Self::new(Linkage::Static, Deploy::Plain)
        }
    }

    /// Linkage of this build.
    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// Deploy target of this build.
    pub fn deploy(&self) -> Deploy {
        self.deploy
    }

    fn setup_local(&self) -> &'static str {
        match self.linkage {
            Linkage::Shared | Linkage::Framework => "setup-shared.local",
            Linkage::Static if self.tiny => "setup-static-min6.local",
            Linkage::Static => "setup-static-min3.local",
        }
    }

    fn framework_root(project: &Project) -> PathBuf {
        project.build_lib.join("Python.framework")
    }

    /// Arguments passed to `./configure`.
    pub fn configure_options(&self, ctx: &BuildContext<'_>) -> ConfigureOptions {
        let openssl = ctx.project.build_lib.join("openssl");
        let base = ConfigureOptions::new()
            .flag("enable_ipv6")
            .flag("enable_optimizations")
            .flag("with_lto")
            .flag("without_doc_strings")
            .flag("without_ensurepip")
            .option_path("with_openssl", &openssl);

        let variant = match self.linkage {
            Linkage::Shared => ConfigureOptions::new()
                .flag("enable_shared")
                .option_path("prefix", &ctx.paths.prefix)
                .var("ac_cv_lib_intl_textdomain", "no"),
            Linkage::Static => ConfigureOptions::new().option_path("prefix", &ctx.paths.prefix),
            Linkage::Framework => {
                ConfigureOptions::new().option_path("enable_framework", &ctx.project.build_lib)
            }
        };
        base.union(variant)
    }

    fn fix(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let fixer = Fixer::new(ctx.shell);
        let ver = ctx.product.ver();
        match (self.linkage, self.deploy) {
            (Linkage::Shared, Deploy::Ext) => {
                let dylib = ctx.paths.prefix_lib.join(ctx.product.dylib());
                fixer.fix_dylib_for_shared_ext(&dylib, &ver, false)
            }
            (Linkage::Shared, Deploy::Pkg) => {
                let exe = ctx.paths.prefix_bin.join(ctx.product.name_ver());
                fixer.fix_exe_for_shared_pkg(&exe, &ver, false)?;
                let dylib = ctx.paths.prefix_lib.join(ctx.product.dylib());
                fixer.fix_dylib_for_shared_pkg(&dylib, &ver, false)
            }
            (Linkage::Framework, Deploy::Ext | Deploy::Pkg) => {
                let dylib = ctx.paths.prefix.join("Python");
                if self.deploy == Deploy::Ext {
                    fixer.fix_dylib_for_framework_ext(&dylib, &ver)?;
                } else {
                    fixer.fix_dylib_for_framework_pkg(&dylib, &ver)?;
                }
                let py_exec = ctx.paths.prefix_bin.join(ctx.product.name_ver());
                let app_exec = ctx
                    .paths
                    .prefix_resources
                    .join("Python.app/Contents/MacOS/Python");
                fixer.fix_execs_for_framework_ext_or_pkg(&py_exec, &app_exec)
            }
            _ => Ok(()),
        }
    }

    fn trim_plan(&self, product: &Product) -> TrimPlan {
        TrimPlan::python(
            product,
            self.deploy == Deploy::Pkg,
            self.linkage == Linkage::Static,
        )
    }
}

impl BuildStrategy for PythonSrc {
    fn variant(&self) -> Variant {
        Variant::PythonSrc
    }

    fn prefix(&self, product: &Product, project: &Project) -> PathBuf {
        match self.linkage {
            Linkage::Framework => Self::framework_root(project)
                .join("Versions")
                .join(product.ver()),
            Linkage::Static | Linkage::Shared => project.build_lib.join(product.build_dir()),
        }
    }

    fn reset(&self, ctx: &BuildContext<'_>) -> Result<()> {
        match self.linkage {
            Linkage::Framework => {
                let framework = Self::framework_root(ctx.project);
                reset_paths(ctx, &[ctx.paths.src_path.as_path(), framework.as_path()])
            }
            Linkage::Static | Linkage::Shared => {
                reset_paths(ctx, &[ctx.paths.src_path.as_path(), ctx.paths.prefix.as_path()])
            }
        }
    }

    fn pre_process(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let patch_dir = ctx.project.patch.join(ctx.product.ver());

        let setup_local = patch_dir.join(self.setup_local());
        if setup_local.exists() {
            ctx.shell.copy(
                &setup_local,
                &ctx.paths.src_path.join("Modules/Setup.local"),
            )?;
        } else {
            warn!("no {} for {}", self.setup_local(), ctx.product.ver());
        }

        let configure_patch = patch_dir.join("configure.patch");
        if configure_patch.exists() {
            ctx.run(
                ctx.src_cmd("patch")
                    .arg("-i")
                    .arg_path(&configure_patch)
                    .arg("configure"),
            )?;
        }
        Ok(())
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        ctx.run(
            ctx.src_cmd("./configure")
                .args(self.configure_options(ctx).render()),
        )?;
        ctx.run(
            ctx.src_cmd("make")
                .arg("-j")
                .arg(ctx.settings.jobs().to_string())
                .arg("altinstall"),
        )
    }

    fn post_process(&self, ctx: &BuildContext<'_>) -> Result<()> {
        self.clean(ctx)?;
        stdlib::ziplib(
            ctx.shell,
            &ctx.paths,
            &self.trim_plan(ctx.product),
            ctx.settings.precompile,
        )?;
        self.fix(ctx)
    }

    fn clean(&self, ctx: &BuildContext<'_>) -> Result<()> {
        require_exists(&ctx.paths.prefix, "python prefix")?;
        stdlib::clean(ctx.shell, &ctx.paths, &self.trim_plan(ctx.product))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::config::Settings;
    use crate::project::HostPython;
    use crate::shell::{RecordingRunner, Shell};
    use std::path::Path;
    use std::sync::Arc;

    fn python(root: &Path, strategy: PythonSrc, build_dir: &str) -> (Arc<RecordingRunner>, Builder) {
        let runner = Arc::new(RecordingRunner::new());
        let project = Arc::new(Project::new(root, HostPython::from_version("3.9.17", "/usr/local")));
        let product = Product::new("Python", "3.9.17")
            .with_build_dir(build_dir)
            .with_libs_static(["libpython3.9.a"]);
        let builder = Builder::new(product, project, strategy)
            .with_shell(Shell::new(runner.clone()))
            .with_settings(Settings {
                jobs: Some(2),
                ..Settings::default()
            });
        (runner, builder)
    }

    #[test]
    fn test_shared_configure_line() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, builder) = python(
            dir.path(),
            PythonSrc::new(Linkage::Shared, Deploy::Ext),
            "python-shared",
        );
        builder.build().unwrap();

        let lib = dir.path().join("build/lib");
        let calls = runner.calls();
        assert_eq!(calls[0].program, "./configure");
        assert_eq!(
            calls[0].args,
            vec![
                "--enable-ipv6".to_string(),
                "--enable-optimizations".to_string(),
                "--enable-shared".to_string(),
                "--with-lto".to_string(),
                "--without-doc-strings".to_string(),
                "--without-ensurepip".to_string(),
                format!("--prefix={}", lib.join("python-shared").display()),
                format!("--with-openssl={}", lib.join("openssl").display()),
                "ac_cv_lib_intl_textdomain=no".to_string(),
            ]
        );
        assert_eq!(calls[1].args, vec!["-j", "2", "altinstall"]);
    }

    #[test]
    fn test_framework_prefix_and_options() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, builder) = python(
            dir.path(),
            PythonSrc::new(Linkage::Framework, Deploy::Ext),
            "python-framework",
        );
        assert_eq!(
            builder.paths().prefix,
            dir.path().join("build/lib/Python.framework/Versions/3.9")
        );
        builder.build().unwrap();
        let args = &runner.calls()[0].args;
        assert!(args.contains(&format!(
            "--enable-framework={}",
            dir.path().join("build/lib").display()
        )));
        assert!(!args.iter().any(|a| a.starts_with("--prefix")));
    }

    #[test]
    fn test_framework_reset_removes_whole_framework() {
        let dir = tempfile::tempdir().unwrap();
        let (_, builder) = python(
            dir.path(),
            PythonSrc::new(Linkage::Framework, Deploy::Pkg),
            "python-framework",
        );
        let framework = dir.path().join("build/lib/Python.framework");
        std::fs::create_dir_all(framework.join("Versions/3.9/lib")).unwrap();
        std::fs::create_dir_all(framework.join("Resources")).unwrap();

        builder.reset().unwrap();
        assert!(!framework.exists());
    }

    #[test]
    fn test_pre_process_copies_setup_local_and_patches() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, builder) = python(dir.path(), PythonSrc::tiny(), "python-static");
        let patch = dir.path().join("patch/3.9");
        std::fs::create_dir_all(&patch).unwrap();
        std::fs::write(patch.join("setup-static-min6.local"), "*static*\n").unwrap();
        std::fs::write(patch.join("configure.patch"), "").unwrap();
        let src = dir.path().join("build/src/Python-3.9.17");
        std::fs::create_dir_all(src.join("Modules")).unwrap();

        builder.pre_process().unwrap();

        assert_eq!(
            std::fs::read_to_string(src.join("Modules/Setup.local")).unwrap(),
            "*static*\n"
        );
        let calls = runner.calls_to("patch");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].cwd.as_deref(), Some(src.as_path()));
        assert_eq!(calls[0].last_arg(), Some("configure"));
    }

    #[test]
    fn test_missing_setup_local_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, builder) = python(
            dir.path(),
            PythonSrc::new(Linkage::Static, Deploy::Plain),
            "python-static",
        );
        builder.pre_process().unwrap();
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_shared_pkg_fix_requires_built_files() {
        let dir = tempfile::tempdir().unwrap();
        let (_, builder) = python(
            dir.path(),
            PythonSrc::new(Linkage::Shared, Deploy::Pkg),
            "python-shared",
        );
        let err = builder.post_process().unwrap_err();
        assert!(matches!(err, crate::BuildError::Invariant(_)));
    }
}
