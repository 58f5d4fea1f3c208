//! Builder graph and install lifecycle.
//!
//! A [`Builder`] pairs a [`Product`] with a [`BuildStrategy`] and the builders
//! it depends on. The lifecycle is not stored anywhere: every stage re-derives
//! "already done" from the filesystem (archive present, source extracted,
//! static libraries installed), so re-running after a failure resumes where
//! the previous run stopped.
//!
//! ## Stage semantics
//!
//! | Stage | Cascades to dependencies | Guard |
//! |---|---|---|
//! | `download` | yes, dependencies first | archive exists, source dir exists |
//! | `reset` | no | none |
//! | `build` | yes, unless the variant opts out | every `libs_static` entry present |
//! | `clean` | no | none |
//! | `install` | only via `InstallDependencies` | per stage |
//!
//! Dependencies run in list order. The factory lists them in a valid build
//! order; nothing here sorts them.

pub mod cmake;
pub mod configured;
pub mod options;
pub mod plugin;
pub mod python;
pub mod relocatable;
pub mod stdlib;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::config::Settings;
use crate::error::{BuildError, Result};
use crate::io::{download, extract};
use crate::product::Product;
use crate::project::Project;
use crate::shell::{Cmd, Shell};

/// Closed set of builder variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// `configure`/`make` dependency library.
    Configured,
    /// Python built from a source release.
    PythonSrc,
    /// Python built with the CMake build system.
    PythonCmake,
    /// Prebuilt relocatable `Python.framework`.
    PythonRelocatable,
    /// Plugin linked against the host Python.
    PluginLocal,
    /// Plugin embedding a copy of the homebrew Python.
    PluginHomebrew,
    /// Plugin statically linked to a built Python.
    PluginStatic,
    /// Plugin using a built shared Python.
    PluginShared,
    /// Plugin using a built `Python.framework`.
    PluginFramework,
    /// Plugin using the relocatable framework.
    PluginRelocatable,
}

impl Variant {
    /// Kebab-case tag used in logs and dumps.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::PythonSrc => "python-src",
            Self::PythonCmake => "python-cmake",
            Self::PythonRelocatable => "python-relocatable",
            Self::PluginLocal => "plugin-local",
            Self::PluginHomebrew => "plugin-homebrew",
            Self::PluginStatic => "plugin-static",
            Self::PluginShared => "plugin-shared",
            Self::PluginFramework => "plugin-framework",
            Self::PluginRelocatable => "plugin-relocatable",
        }
    }

    /// External programs the variant shells out to.
    pub fn required_tools(self) -> &'static [&'static str] {
        match self {
            Self::Configured => &["make"],
            Self::PythonSrc => &["make", "patch", "otool", "install_name_tool"],
            Self::PythonCmake => &["git", "cmake"],
            Self::PythonRelocatable => &["python3"],
            Self::PluginHomebrew => &["xcodebuild", "otool", "install_name_tool"],
            Self::PluginLocal
            | Self::PluginStatic
            | Self::PluginShared
            | Self::PluginFramework
            | Self::PluginRelocatable => &["xcodebuild"],
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a builder's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Remove extracted sources and the install prefix.
    Reset,
    /// Fetch and unpack sources, dependencies first.
    Download,
    /// Patch the source tree.
    PreProcess,
    /// Compile and install into the prefix.
    Build,
    /// Trim, zip and relocate the installed tree.
    PostProcess,
    /// Trim the installed tree or remove built externals.
    Clean,
    /// Run the full install of every dependency.
    InstallDependencies,
}

/// Stage order for builders that compile from source.
pub const SOURCE_STAGES: &[Stage] = &[
    Stage::Reset,
    Stage::Download,
    Stage::PreProcess,
    Stage::Build,
    Stage::PostProcess,
];

/// Paths derived from a product, its project and the variant's prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPaths {
    /// Install prefix.
    pub prefix: PathBuf,
    /// `<prefix>/lib`
    pub prefix_lib: PathBuf,
    /// `<prefix>/bin`
    pub prefix_bin: PathBuf,
    /// `<prefix>/include`
    pub prefix_include: PathBuf,
    /// `<prefix>/Resources`
    pub prefix_resources: PathBuf,
    /// Downloaded archive, when the product has a download location.
    pub download_path: Option<PathBuf>,
    /// Extracted source tree.
    pub src_path: PathBuf,
    /// `<prefix>/lib/pythonX.Y`
    pub python_lib: PathBuf,
    /// `<python_lib>/site-packages`
    pub site_packages: PathBuf,
    /// `<python_lib>/lib-dynload`
    pub lib_dynload: PathBuf,
}

impl BuildPaths {
    /// Derive every path for `product` installed under `prefix`.
    pub fn new(project: &Project, product: &Product, prefix: PathBuf) -> Self {
        let prefix_lib = prefix.join("lib");
        let python_lib = prefix_lib.join(product.name_ver());
        Self {
            prefix_bin: prefix.join("bin"),
            prefix_include: prefix.join("include"),
            prefix_resources: prefix.join("Resources"),
            download_path: product
                .name_archive()
                .ok()
                .map(|name| project.build_downloads.join(name)),
            src_path: project.build_src.join(product.name_version()),
            site_packages: python_lib.join("site-packages"),
            lib_dynload: python_lib.join("lib-dynload"),
            python_lib,
            prefix_lib,
            prefix,
        }
    }
}

/// Everything a strategy sees while running one stage.
#[derive(Debug)]
pub struct BuildContext<'a> {
    /// Product being built.
    pub product: &'a Product,
    /// Shared project layout.
    pub project: &'a Project,
    /// Settings of this invocation.
    pub settings: &'a Settings,
    /// Command runner and file helpers.
    pub shell: &'a Shell,
    /// Derived paths.
    pub paths: BuildPaths,
}

impl BuildContext<'_> {
    /// True when every expected static library exists under the prefix.
    ///
    /// A product that declares no static libraries is never considered built.
    pub fn has_static_libs(&self) -> bool {
        !self.product.libs_static.is_empty()
            && self
                .product
                .libs_static
                .iter()
                .all(|lib| self.paths.prefix_lib.join(lib).exists())
    }

    /// A command running in the source tree with the deployment target set.
    pub fn src_cmd(&self, program: &str) -> Cmd {
        Cmd::new(program)
            .cwd(&self.paths.src_path)
            .env("MACOSX_DEPLOYMENT_TARGET", &self.project.mac_dep_target)
    }

    /// Run a build command with its output streamed to the terminal.
    ///
    /// # Errors
    ///
    /// Propagates the runner's error.
    pub fn run(&self, cmd: Cmd) -> Result<()> {
        self.shell.run(&cmd.stream()).map(|_| ())
    }
}

/// Fail with [`BuildError::Invariant`] unless `path` exists.
///
/// # Errors
///
/// Returns an invariant error naming `what` when the path is missing.
pub fn require_exists(path: &Path, what: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(BuildError::invariant(format!(
            "{what} not found: {}",
            path.display()
        )))
    }
}

/// Remove the source tree and install prefix.
///
/// # Errors
///
/// Returns an error if removal fails or either path survives it.
pub fn reset_paths(ctx: &BuildContext<'_>, paths: &[&Path]) -> Result<()> {
    for path in paths {
        ctx.shell.remove(path)?;
        if path.exists() {
            return Err(BuildError::invariant(format!(
                "reset did not remove {}",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Fetch the product archive if absent, then unpack it if the source tree is absent.
///
/// # Errors
///
/// Returns a configuration error when the product has no download location,
/// a download or archive error on failure, and an invariant error when the
/// expected archive or source tree is missing afterwards.
pub fn fetch_and_extract(ctx: &BuildContext<'_>) -> Result<()> {
    let archive = ctx.paths.download_path.as_deref().ok_or_else(|| {
        BuildError::config(format!(
            "url_template not set for product '{}'",
            ctx.product.name
        ))
    })?;

    if archive.exists() {
        info!("archive present: {}", archive.display());
    } else {
        let url = ctx.product.url()?;
        info!("downloading {url}");
        let client = download::client()?;
        download::fetch_to(&client, &url, archive)?;
        require_exists(archive, "downloaded archive")?;
    }

    if ctx.paths.src_path.exists() {
        info!("sources present: {}", ctx.paths.src_path.display());
    } else {
        info!("unpacking {}", archive.display());
        extract::extract_auto(archive, &ctx.project.build_src)?;
        require_exists(&ctx.paths.src_path, "extracted source directory")?;
    }
    Ok(())
}

/// Per-variant behavior plugged into a [`Builder`].
///
/// Every method except [`variant`](Self::variant) and [`build`](Self::build)
/// has a default matching a plain `configure`/`make` library.
pub trait BuildStrategy: fmt::Debug {
    /// Variant tag.
    fn variant(&self) -> Variant;

    /// Install prefix; `build/lib/<build_dir>` unless overridden.
    fn prefix(&self, product: &Product, project: &Project) -> PathBuf {
        project.build_lib.join(product.build_dir().to_lowercase())
    }

    /// Stages run by `install`, in order.
    fn stages(&self) -> &'static [Stage] {
        SOURCE_STAGES
    }

    /// Whether `build` is skipped once the product exists.
    fn skips_when_built(&self) -> bool {
        true
    }

    /// Whether `build` builds the dependencies first.
    fn cascade_build(&self) -> bool {
        true
    }

    /// True when the product's outputs are already in place.
    fn product_exists(&self, ctx: &BuildContext<'_>) -> bool {
        ctx.has_static_libs()
    }

    /// Remove this builder's source tree and prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    fn reset(&self, ctx: &BuildContext<'_>) -> Result<()> {
        reset_paths(ctx, &[ctx.paths.src_path.as_path(), ctx.paths.prefix.as_path()])
    }

    /// Make the sources available.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch or unpack fails.
    fn download(&self, ctx: &BuildContext<'_>) -> Result<()> {
        fetch_and_extract(ctx)
    }

    /// Prepare the source tree before building.
    ///
    /// # Errors
    ///
    /// Returns an error if a patch step fails.
    fn pre_process(&self, _ctx: &BuildContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Compile and install into the prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if any build command fails.
    fn build(&self, ctx: &BuildContext<'_>) -> Result<()>;

    /// Finish the installed tree.
    ///
    /// # Errors
    ///
    /// Returns an error if trimming or relocation fails.
    fn post_process(&self, _ctx: &BuildContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Remove what the variant does not ship.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    fn clean(&self, _ctx: &BuildContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// A node of the build graph.
#[derive(Debug)]
pub struct Builder {
    product: Product,
    project: Arc<Project>,
    depends_on: Vec<Builder>,
    settings: Settings,
    shell: Shell,
    strategy: Box<dyn BuildStrategy>,
}

impl Builder {
    /// A builder with default settings and a process-spawning shell.
    pub fn new(
        product: Product,
        project: Arc<Project>,
        strategy: impl BuildStrategy + 'static,
    ) -> Self {
        Self {
            product,
            project,
            depends_on: Vec::new(),
            settings: Settings::default(),
            shell: Shell::default(),
            strategy: Box::new(strategy),
        }
    }

    /// Builders that must be built before this one, in build order.
    pub fn with_depends_on(mut self, depends_on: Vec<Builder>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Replace the settings of this builder and every dependency.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.set_settings(settings);
        self
    }

    /// Replace the shell of this builder and every dependency.
    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.set_shell(shell);
        self
    }

    fn set_settings(&mut self, settings: Settings) {
        for dep in &mut self.depends_on {
            dep.set_settings(settings.clone());
        }
        self.settings = settings;
    }

    fn set_shell(&mut self, shell: Shell) {
        for dep in &mut self.depends_on {
            dep.set_shell(shell.clone());
        }
        self.shell = shell;
    }

    /// The product this builder produces.
    pub fn product(&self) -> &Product {
        &self.product
    }

    /// The shared project layout.
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Direct dependencies, in build order.
    pub fn depends_on(&self) -> &[Builder] {
        &self.depends_on
    }

    /// Settings of this invocation.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Variant tag of the strategy.
    pub fn variant(&self) -> Variant {
        self.strategy.variant()
    }

    /// Every program this builder and its dependencies need, sorted.
    pub fn required_tools(&self) -> Vec<&'static str> {
        let mut tools = BTreeSet::new();
        self.collect_tools(&mut tools);
        tools.into_iter().collect()
    }

    fn collect_tools(&self, tools: &mut BTreeSet<&'static str>) {
        tools.extend(self.variant().required_tools());
        for dep in &self.depends_on {
            dep.collect_tools(tools);
        }
    }

    /// Derived paths.
    pub fn paths(&self) -> BuildPaths {
        let prefix = self.strategy.prefix(&self.product, &self.project);
        BuildPaths::new(&self.project, &self.product, prefix)
    }

    fn ctx(&self) -> BuildContext<'_> {
        BuildContext {
            product: &self.product,
            project: &self.project,
            settings: &self.settings,
            shell: &self.shell,
            paths: self.paths(),
        }
    }

    fn span(&self) -> tracing::Span {
        info_span!(
            "builder",
            product = %self.product.name_version(),
            variant = self.variant().as_str()
        )
    }

    /// True when the product's outputs are already in place.
    pub fn product_exists(&self) -> bool {
        self.strategy.product_exists(&self.ctx())
    }

    /// Remove this builder's source tree and prefix. Dependencies are untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    pub fn reset(&self) -> Result<()> {
        let _span = self.span().entered();
        info!("reset");
        self.strategy.reset(&self.ctx())
    }

    /// Download dependencies, then this builder's sources.
    ///
    /// # Errors
    ///
    /// Stops at the first failing download.
    pub fn download(&self) -> Result<()> {
        for dep in &self.depends_on {
            dep.download()?;
        }
        let _span = self.span().entered();
        info!("download");
        self.strategy.download(&self.ctx())
    }

    /// Patch the source tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a patch step fails.
    pub fn pre_process(&self) -> Result<()> {
        let _span = self.span().entered();
        info!("pre-process");
        self.strategy.pre_process(&self.ctx())
    }

    /// Build dependencies, then this product unless it already exists.
    ///
    /// # Errors
    ///
    /// Stops at the first failing build.
    pub fn build(&self) -> Result<()> {
        if self.strategy.cascade_build() {
            for dep in &self.depends_on {
                dep.build()?;
            }
        }
        let _span = self.span().entered();
        let ctx = self.ctx();
        if self.strategy.skips_when_built() && self.strategy.product_exists(&ctx) {
            info!("{} already built, skipping", self.product.name_version());
            return Ok(());
        }
        info!("build");
        self.strategy.build(&ctx)
    }

    /// Trim, zip and relocate the installed tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a step fails.
    pub fn post_process(&self) -> Result<()> {
        let _span = self.span().entered();
        info!("post-process");
        self.strategy.post_process(&self.ctx())
    }

    /// Variant-specific cleanup. Dependencies are untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    pub fn clean(&self) -> Result<()> {
        let _span = self.span().entered();
        info!("clean");
        self.strategy.clean(&self.ctx())
    }

    /// Run every install stage of the variant in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing stage.
    pub fn install(&mut self) -> Result<()> {
        for &stage in self.strategy.stages() {
            self.run_stage(stage)?;
        }
        Ok(())
    }

    fn run_stage(&mut self, stage: Stage) -> Result<()> {
        match stage {
            Stage::Reset => self.reset(),
            Stage::Download => self.download(),
            Stage::PreProcess => self.pre_process(),
            Stage::Build => self.build(),
            Stage::PostProcess => self.post_process(),
            Stage::Clean => self.clean(),
            Stage::InstallDependencies => {
                for dep in &mut self.depends_on {
                    dep.set_settings(self.settings.clone());
                    dep.install()?;
                }
                Ok(())
            }
        }
    }

    /// Stages [`execute`](Self::execute) would run, given the current settings.
    pub fn plan(&self) -> Vec<Stage> {
        if self.settings.no_stage_requested() {
            return self.strategy.stages().to_vec();
        }
        let requested = [
            (self.settings.download, Stage::Download),
            (self.settings.build, Stage::Build),
            (self.settings.clean, Stage::Clean),
        ];
        let mut plan: Vec<Stage> = requested
            .into_iter()
            .filter_map(|(on, stage)| on.then_some(stage))
            .collect();
        if self.settings.install {
            plan.extend_from_slice(self.strategy.stages());
        }
        plan
    }

    /// Run `install` when no stage flag is set, otherwise the requested
    /// subset of `download`, `build`, `clean`, `install` in that order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing stage.
    pub fn execute(&mut self) -> Result<()> {
        if self.settings.no_stage_requested() {
            return self.install();
        }
        if self.settings.download {
            self.download()?;
        }
        if self.settings.build {
            self.build()?;
        }
        if self.settings.clean {
            self.clean()?;
        }
        if self.settings.install {
            self.install()?;
        } else if self.settings.release {
            warn!("release requested without install; nothing to package");
        }
        Ok(())
    }

    /// JSON description of this builder and its dependencies.
    pub fn dump(&self) -> serde_json::Value {
        serde_json::json!({
            "product": self.product,
            "variant": self.variant(),
            "paths": self.paths(),
            "product_exists": self.product_exists(),
            "depends_on": self.depends_on.iter().map(Builder::dump).collect::<Vec<_>>(),
        })
    }
}
