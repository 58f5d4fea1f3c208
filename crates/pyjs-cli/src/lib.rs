//! pyjs-build - builds custom Python distributions and the py-js externals
//!
//! Thin front end over `pyjs_core`: settings are resolved from defaults,
//! then `pyjs.toml` (or `--config`), then flags; one target or recipe is
//! assembled by the factory and the requested stages run in order.
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]

pub mod cmd;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pyjs_core::Settings;

#[derive(Debug, Parser)]
#[command(name = "pyjs-build")]
#[command(author, version, about = "Build Python distributions and the py-js externals")]
pub struct Cli {
    /// Project root containing `targets/`, `patch/` and `support/`
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Settings file (defaults to `pyjs.toml` in the project root)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless `RUST_LOG` says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run lifecycle stages of one target
    Build {
        /// Target name, e.g. `python_static` or `pyjs_shared_pkg`
        target: String,
        #[command(flatten)]
        stages: StageArgs,
    },
    /// Run every builder of a named recipe
    Recipe {
        /// Recipe name, e.g. `static_python`
        name: String,
        #[command(flatten)]
        stages: StageArgs,
    },
    /// List known targets and recipes
    List,
    /// Copy a binary's vendored dylibs next to it and rewrite its references
    Relocate {
        /// Mach-O executable or library to relocate
        binary: PathBuf,
        /// Directory receiving the binary and its dependencies
        dest: PathBuf,
        /// Install name given to the copied binary
        #[arg(long)]
        exec_ref: Option<String>,
        /// Run-path entry added to the copied binary
        #[arg(long)]
        rpath: Option<String>,
        /// Also copy the static archive beside each dependency into this directory
        #[arg(long)]
        staticlibs_dir: Option<PathBuf>,
    },
}

/// Stage selection and version overrides shared by `build` and `recipe`.
#[derive(Debug, Clone, Default, Args)]
pub struct StageArgs {
    /// Download sources (dependencies first)
    #[arg(long)]
    pub download: bool,
    /// Build dependencies, then the target
    #[arg(long)]
    pub build: bool,
    /// Trim the installed tree or remove built externals
    #[arg(long)]
    pub clean: bool,
    /// Run the full install pipeline
    #[arg(long)]
    pub install: bool,
    /// Build for release
    #[arg(long)]
    pub release: bool,
    /// Print the builder graph and stage plan without running anything
    #[arg(long)]
    pub dry_run: bool,
    /// Byte-compile the standard library before zipping it
    #[arg(long)]
    pub precompile: bool,
    /// Python version to build
    #[arg(long)]
    pub python_version: Option<String>,
    /// bzip2 version to build
    #[arg(long)]
    pub bz2_version: Option<String>,
    /// OpenSSL version to build
    #[arg(long)]
    pub ssl_version: Option<String>,
    /// xz version to build
    #[arg(long)]
    pub xz_version: Option<String>,
    /// Value of `MACOSX_DEPLOYMENT_TARGET`
    #[arg(long)]
    pub mac_dep_target: Option<String>,
    /// Parallel make jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl StageArgs {
    /// Layer the flags over settings loaded from defaults and file.
    pub fn apply(&self, settings: &mut Settings) {
        settings.download |= self.download;
        settings.build |= self.build;
        settings.clean |= self.clean;
        settings.install |= self.install;
        settings.release |= self.release;
        settings.dry_run |= self.dry_run;
        settings.precompile |= self.precompile;

        let overrides = [
            (&mut settings.python_version, &self.python_version),
            (&mut settings.bz2_version, &self.bz2_version),
            (&mut settings.ssl_version, &self.ssl_version),
            (&mut settings.xz_version, &self.xz_version),
            (&mut settings.mac_dep_target, &self.mac_dep_target),
        ];
        for (field, value) in overrides {
            if let Some(value) = value {
                field.clone_from(value);
            }
        }
        if self.jobs.is_some() {
            settings.jobs = self.jobs;
        }
    }
}
