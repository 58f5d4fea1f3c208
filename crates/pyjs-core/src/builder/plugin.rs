//! The `py` and `pyjs` externals, built with `xcodebuild`.
//!
//! Every kind maps to one Xcode project under `targets/`. Kinds that link a
//! Python built by this tool check for it first and skip `xcodebuild` with a
//! warning when it is missing; the homebrew kinds copy and relocate the host
//! interpreter themselves.

use std::path::PathBuf;

use tracing::{info, warn};

use super::stdlib::{self, TrimPlan};
use super::{BuildContext, BuildStrategy, Stage, Variant, reset_paths};
use crate::error::Result;
use crate::product::Product;
use crate::project::Project;
use crate::relocate::Fixer;
use crate::shell::Cmd;

/// Xcode targets built for every kind.
pub const XCODE_TARGETS: [&str; 2] = ["py", "pyjs"];

/// Host stdlib packages copied into a homebrew bundle.
const HOMEBREW_PACKAGES: &[&str] = &[
    "asyncio",
    "collections",
    "concurrent",
    "dbm",
    "distutils",
    "email",
    "encodings",
    "html",
    "http",
    "importlib",
    "json",
    "lib-dynload",
    "logging",
    "multiprocessing",
    "pydoc_data",
    "sqlite3",
    "unittest",
    "urllib",
    "wsgiref",
    "xml",
    "xmlrpc",
];

/// Which Python the externals embed or link, and where it ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    /// Link the host Python in place. Not portable.
    LocalSys,
    /// Host Python copied into each external's `Resources`.
    HomebrewExt,
    /// Host Python copied into the package's `support` directory.
    HomebrewPkg,
    /// Static Python linked into the externals.
    StaticExt,
    /// Shared Python inside each external.
    SharedExt,
    /// Shared Python in the package's `support` directory.
    SharedPkg,
    /// `Python.framework` inside each external.
    FrameworkExt,
    /// `Python.framework` in the package's `support` directory.
    FrameworkPkg,
    /// Relocatable `Python.framework` in the package's `support` directory.
    RelocatablePkg,
}

impl PluginKind {
    /// Name of the Xcode project directory under `targets/`.
    pub fn xcode_project(self) -> &'static str {
        match self {
            Self::LocalSys => "local-sys",
            Self::HomebrewExt => "homebrew-ext",
            Self::HomebrewPkg => "homebrew-pkg",
            Self::StaticExt => "static-ext",
            Self::SharedExt => "shared-ext",
            Self::SharedPkg => "shared-pkg",
            Self::FrameworkExt => "framework-ext",
            Self::FrameworkPkg => "framework-pkg",
            Self::RelocatablePkg => "relocatable-pkg",
        }
    }

    fn variant(self) -> Variant {
        match self {
            Self::LocalSys => Variant::PluginLocal,
            Self::HomebrewExt | Self::HomebrewPkg => Variant::PluginHomebrew,
            Self::StaticExt => Variant::PluginStatic,
            Self::SharedExt | Self::SharedPkg => Variant::PluginShared,
            Self::FrameworkExt | Self::FrameworkPkg => Variant::PluginFramework,
            Self::RelocatablePkg => Variant::PluginRelocatable,
        }
    }
}

/// Strategy building both externals for one [`PluginKind`].
#[derive(Debug, Clone, Copy)]
pub struct Plugin {
    kind: PluginKind,
}

impl Plugin {
    /// Strategy for `kind`.
    pub fn new(kind: PluginKind) -> Self {
        Self { kind }
    }

    /// The kind of externals built.
    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    /// The Python artifact the externals need, when it is not the host's.
    pub fn required_python(&self, ctx: &BuildContext<'_>) -> Option<PathBuf> {
        let lib = &ctx.project.build_lib;
        let product = ctx.product;
        match self.kind {
            PluginKind::LocalSys => None,
            PluginKind::HomebrewExt | PluginKind::HomebrewPkg => {
                Some(ctx.project.python.prefix.join("Python"))
            }
            PluginKind::StaticExt => Some(lib.join("python-static/lib").join(product.staticlib())),
            PluginKind::SharedExt | PluginKind::SharedPkg => {
                Some(lib.join("python-shared/lib").join(product.dylib()))
            }
            PluginKind::FrameworkExt | PluginKind::FrameworkPkg => Some(
                lib.join("Python.framework/Versions")
                    .join(product.ver())
                    .join("Python"),
            ),
            PluginKind::RelocatablePkg => Some(ctx.project.support.join("Python.framework")),
        }
    }

    /// `KEY=VALUE` build settings passed to `xcodebuild`.
    pub fn xcode_settings(&self, ctx: &BuildContext<'_>) -> Vec<String> {
        match self.kind {
            PluginKind::LocalSys => {
                let host = &ctx.project.python;
                vec![
                    format!("PREFIX={}", host.prefix.display()),
                    format!("VERSION={}", host.version_short),
                    format!("ABIFLAGS={}", host.abiflags),
                    format!("LIBS={}", host.libs),
                ]
            }
            _ => vec![
                format!("VERSION={}", ctx.product.ver()),
                format!("ABIFLAGS={}", ctx.product.abiflags()),
            ],
        }
    }

    fn xcodebuild(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let project = ctx.project.xcodeproj(self.kind.xcode_project());
        for target in XCODE_TARGETS {
            ctx.run(
                Cmd::new("xcodebuild")
                    .arg("-project")
                    .arg_path(&project)
                    .args(["-target", target])
                    .args(self.xcode_settings(ctx))
                    .cwd(&ctx.project.root),
            )?;
        }
        Ok(())
    }

    /// Copy a built Python tree into `support/`, replacing any previous copy.
    fn stage_support(ctx: &BuildContext<'_>, src: &str, dst: &str) -> Result<()> {
        let src = ctx.project.build_lib.join(src);
        let dst = ctx.project.support.join(dst);
        ctx.shell.remove(&dst)?;
        ctx.shell.copy(&src, &dst)
    }

    /// Copy the host interpreter into the prefix and trim it down.
    fn copy_host_python(ctx: &BuildContext<'_>) -> Result<()> {
        let host = &ctx.project.python;
        let paths = &ctx.paths;
        ctx.shell.makedirs(&paths.python_lib)?;
        ctx.shell.makedirs(&paths.prefix_bin)?;

        ctx.shell
            .copy(&host.prefix.join("Python"), &paths.prefix.join(ctx.product.dylib()))?;

        let modules = host.pkgs.join("*.py");
        if let Ok(found) = glob::glob(&modules.to_string_lossy()) {
            for module in found.filter_map(std::result::Result::ok) {
                if let Some(name) = module.file_name() {
                    ctx.shell.copy(&module, &paths.python_lib.join(name))?;
                }
            }
        }
        for pkg in HOMEBREW_PACKAGES {
            let src = host.pkgs.join(pkg);
            if src.exists() {
                ctx.shell.copy(&src, &paths.python_lib.join(pkg))?;
            } else {
                warn!("{pkg} not found in {}", host.pkgs.display());
            }
        }

        ctx.shell.copy(&host.prefix.join("include"), &paths.prefix_include)?;
        ctx.shell.remove(&paths.prefix_lib.join(ctx.product.dylib()))?;
        ctx.shell.remove(&paths.prefix_lib.join("pkgconfig"))?;
        ctx.shell.copy(
            &host.prefix.join("Resources/Python.app/Contents/MacOS/Python"),
            &paths.prefix_bin.join(ctx.product.name_ver()),
        )?;

        let plan = TrimPlan::python(ctx.product, false, false);
        stdlib::clean(ctx.shell, paths, &plan)?;
        stdlib::ziplib(ctx.shell, paths, &plan, ctx.settings.precompile)?;
        Ok(())
    }

    /// Link the project into the host application's packages folder.
    ///
    /// An existing entry is left alone; a missing packages folder means the
    /// host application is not installed and nothing is linked.
    fn link_package(ctx: &BuildContext<'_>) -> Result<()> {
        let package = &ctx.project.package;
        if package.symlink_metadata().is_ok() {
            info!("package link exists, not creating: {}", package.display());
            return Ok(());
        }
        match package.parent() {
            Some(packages) if packages.is_dir() => ctx.shell.symlink(&ctx.project.root, package),
            _ => {
                warn!("no packages folder for {}, not linking", package.display());
                Ok(())
            }
        }
    }

    fn build_homebrew_pkg(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let ver = ctx.product.ver();
        let fixer = Fixer::new(ctx.shell);
        reset_paths(ctx, &[ctx.paths.prefix.as_path()])?;
        Self::copy_host_python(ctx)?;
        fixer.fix_dylib_for_shared_pkg(&ctx.paths.prefix.join(ctx.product.dylib()), &ver, true)?;
        fixer.fix_exe_for_shared_pkg(&ctx.paths.prefix_bin.join(ctx.product.name_ver()), &ver, true)?;
        self.xcodebuild(ctx)
    }

    fn build_homebrew_ext(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let ver = ctx.product.ver();
        let fixer = Fixer::new(ctx.shell);
        reset_paths(ctx, &[ctx.paths.prefix.as_path()])?;
        Self::copy_host_python(ctx)?;
        fixer.fix_exe_for_shared_pkg(&ctx.paths.prefix_bin.join(ctx.product.name_ver()), &ver, true)?;
        fixer.fix_dylib_for_shared_ext(&ctx.paths.prefix.join(ctx.product.dylib()), &ver, true)?;
        for external in [&ctx.project.py_external, &ctx.project.pyjs_external] {
            let resources = external.join("Contents/Resources").join(ctx.product.name_ver());
            ctx.shell.makedirs(&resources)?;
            ctx.shell.copy(&ctx.paths.prefix, &resources)?;
        }
        self.xcodebuild(ctx)?;
        reset_paths(ctx, &[ctx.paths.prefix.as_path()])
    }
}

impl BuildStrategy for Plugin {
    fn variant(&self) -> Variant {
        self.kind.variant()
    }

    fn prefix(&self, product: &Product, project: &Project) -> PathBuf {
        match self.kind {
            PluginKind::RelocatablePkg => project
                .support
                .join("Python.framework/Versions")
                .join(product.ver()),
            _ => project.support.join(product.name_ver()),
        }
    }

    fn stages(&self) -> &'static [Stage] {
        &[Stage::InstallDependencies, Stage::Build]
    }

    fn skips_when_built(&self) -> bool {
        false
    }

    fn cascade_build(&self) -> bool {
        false
    }

    fn product_exists(&self, ctx: &BuildContext<'_>) -> bool {
        self.required_python(ctx).is_none_or(|path| path.exists())
    }

    fn reset(&self, ctx: &BuildContext<'_>) -> Result<()> {
        reset_paths(ctx, &[ctx.paths.prefix.as_path()])
    }

    fn download(&self, _ctx: &BuildContext<'_>) -> Result<()> {
        info!("nothing to download for {}", self.kind.xcode_project());
        Ok(())
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        if let Some(python) = self.required_python(ctx) {
            if !python.exists() {
                warn!("python is not built: {}, skipping xcodebuild", python.display());
                return Ok(());
            }
        }
        match self.kind {
            PluginKind::HomebrewPkg => self.build_homebrew_pkg(ctx)?,
            PluginKind::HomebrewExt => self.build_homebrew_ext(ctx)?,
            PluginKind::SharedPkg => {
                Self::stage_support(ctx, "python-shared", &ctx.product.name_ver())?;
                self.xcodebuild(ctx)?;
            }
            PluginKind::FrameworkPkg => {
                Self::stage_support(ctx, "Python.framework", "Python.framework")?;
                self.xcodebuild(ctx)?;
            }
            _ => self.xcodebuild(ctx)?,
        }
        Self::link_package(ctx)
    }

    fn clean(&self, ctx: &BuildContext<'_>) -> Result<()> {
        ctx.shell.remove(&ctx.project.py_external)?;
        ctx.shell.remove(&ctx.project.pyjs_external)
    }
}
