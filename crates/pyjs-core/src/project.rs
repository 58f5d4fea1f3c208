//! Project directory layout and host interpreter description.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::DEFAULT_MAC_DEP_TARGET;
use crate::error::{BuildError, Result};
use crate::shell::{Cmd, Shell};

/// Name of the host application package.
pub const PACKAGE_NAME: &str = "py-js";

const SYSCONFIG_QUERY: &str = "\
import sysconfig as s
for k in ('py_version', 'py_version_short', 'py_version_nodot', 'abiflags', \
'prefix', 'LIBS', 'LIBRARY', 'LDLIBRARY', 'BINLIBDEST'):
    print(k + '=' + str(s.get_config_var(k) or ''))
";

/// The Python interpreter installed on the build machine.
///
/// Local and homebrew plugin builds link against it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostPython {
    /// Full version, e.g. `3.11.7`.
    pub version: String,
    /// `major.minor`
    pub version_short: String,
    /// `major.minor` without the dot.
    pub version_nodot: String,
    /// ABI flags, usually empty.
    pub abiflags: String,
    /// Installation prefix.
    pub prefix: PathBuf,
    /// Extra link flags (`sysconfig LIBS`).
    pub libs: String,
    /// Static library name.
    pub staticlib: String,
    /// Shared library or framework binary the interpreter links.
    pub ldlibrary: String,
    /// Standard library directory.
    pub pkgs: PathBuf,
}

impl HostPython {
    /// Describe an interpreter of `version` installed under `prefix`.
    pub fn from_version(version: &str, prefix: impl Into<PathBuf>) -> Self {
        let version_short = version.split('.').take(2).collect::<Vec<_>>().join(".");
        let prefix = prefix.into();
        Self {
            version: version.to_string(),
            version_nodot: version_short.replace('.', ""),
            abiflags: String::new(),
            pkgs: prefix.join("lib").join(format!("python{version_short}")),
            staticlib: format!("libpython{version_short}.a"),
            ldlibrary: format!("libpython{version_short}.dylib"),
            libs: "-ldl -framework CoreFoundation".to_string(),
            version_short,
            prefix,
        }
    }

    /// Query `python3` for its build configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `python3` cannot be run or reports no version.
    pub fn detect(shell: &Shell) -> Result<Self> {
        let out = shell.run(&Cmd::new("python3").args(["-c", SYSCONFIG_QUERY]))?;
        Self::from_sysconfig(&out.stdout)
    }

    fn from_sysconfig(text: &str) -> Result<Self> {
        let vars: HashMap<&str, &str> = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .collect();
        let get = |k: &str| vars.get(k).copied().unwrap_or_default().to_string();

        let version = get("py_version");
        if version.is_empty() {
            return Err(BuildError::config("could not determine host python version"));
        }
        let mut python = Self::from_version(&version, get("prefix"));
        python.abiflags = get("abiflags");
        python.libs = get("LIBS");
        if !get("LIBRARY").is_empty() {
            python.staticlib = get("LIBRARY");
        }
        if !get("LDLIBRARY").is_empty() {
            python.ldlibrary = get("LDLIBRARY");
        }
        if !get("BINLIBDEST").is_empty() {
            python.pkgs = PathBuf::from(get("BINLIBDEST"));
        }
        Ok(python)
    }

    /// `python3.11`
    pub fn name(&self) -> String {
        format!("python{}", self.version_short)
    }

    /// `libpython3.11.dylib`
    pub fn dylib(&self) -> String {
        format!("libpython{}{}.dylib", self.version_short, self.abiflags)
    }
}

/// Fixed directory layout shared read-only by every builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    /// Checkout root.
    pub root: PathBuf,
    /// Helper scripts.
    pub scripts: PathBuf,
    /// Per-version patches and `Setup.local` files.
    pub patch: PathBuf,
    /// Xcode projects, one per plugin variant.
    pub targets: PathBuf,
    /// Scratch build tree.
    pub build: PathBuf,
    /// Downloaded source archives.
    pub build_downloads: PathBuf,
    /// Unpacked sources.
    pub build_src: PathBuf,
    /// Install prefixes of built products.
    pub build_lib: PathBuf,
    /// Runtime files shipped with the package.
    pub support: PathBuf,
    /// Built plugin bundles.
    pub externals: PathBuf,
    /// The `py` plugin bundle.
    pub py_external: PathBuf,
    /// The `pyjs` plugin bundle.
    pub pyjs_external: PathBuf,
    /// Where the host application looks for packages.
    pub package: PathBuf,
    /// Value of `MACOSX_DEPLOYMENT_TARGET`.
    pub mac_dep_target: String,
    /// The build machine's interpreter.
    pub python: HostPython,
}

impl Project {
    /// Lay out a project rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, python: HostPython) -> Self {
        let root = root.into();
        let build = root.join("build");
        let externals = root.join("externals");
        let package = dirs::home_dir()
            .unwrap_or_default()
            .join("Documents/Max 8/Packages")
            .join(PACKAGE_NAME);
        Self {
            scripts: root.join("scripts"),
            patch: root.join("patch"),
            targets: root.join("targets"),
            build_downloads: build.join("downloads"),
            build_src: build.join("src"),
            build_lib: build.join("lib"),
            build,
            support: root.join("support"),
            py_external: externals.join("py.mxo"),
            pyjs_external: externals.join("pyjs.mxo"),
            externals,
            package,
            mac_dep_target: DEFAULT_MAC_DEP_TARGET.to_string(),
            python,
            root,
        }
    }

    /// Override the deployment target.
    pub fn with_mac_dep_target(mut self, target: impl Into<String>) -> Self {
        self.mac_dep_target = target.into();
        self
    }

    /// Override where the package link is created.
    pub fn with_package(mut self, package: impl Into<PathBuf>) -> Self {
        self.package = package.into();
        self
    }

    /// Create the build directories if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [&self.build_downloads, &self.build_src, &self.build_lib] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Path of the Xcode project for a plugin variant.
    pub fn xcodeproj(&self, name: &str) -> PathBuf {
        self.targets.join(name).join("py-js.xcodeproj")
    }
}
