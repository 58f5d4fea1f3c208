//! Target name to builder graph.
//!
//! Dependencies are listed in build order: compression and crypto libraries
//! first, then the Python they link into, then the externals.

use std::sync::Arc;

use crate::builder::Builder;
use crate::builder::cmake::PythonCmake;
use crate::builder::configured::{Configured, Library};
use crate::builder::plugin::{Plugin, PluginKind};
use crate::builder::python::{Deploy, Linkage, PythonSrc};
use crate::builder::relocatable::PythonRelocatable;
use crate::builder::BuildStrategy;
use crate::config::Settings;
use crate::error::{BuildError, Result};
use crate::product::Product;
use crate::project::Project;
use crate::recipe::Recipe;
use crate::shell::Shell;

/// Static libraries Python links against.
pub const DEPENDENCY_TARGETS: [&str; 3] = ["bz2", "ssl", "xz"];

/// Python builds.
pub const PYTHON_TARGETS: [&str; 11] = [
    "python_shared",
    "python_shared_ext",
    "python_shared_pkg",
    "python_static",
    "python_static_tiny",
    "python_framework",
    "python_framework_ext",
    "python_framework_pkg",
    "python_relocatable",
    "python_cmake",
    "python_cmake_static",
];

/// Externals builds and the Python target each one needs.
pub const PLUGIN_TARGETS: [(&str, Option<&str>); 10] = [
    ("pyjs_local_sys", None),
    ("pyjs_homebrew_ext", None),
    ("pyjs_homebrew_pkg", None),
    ("pyjs_shared_ext", Some("python_shared_ext")),
    ("pyjs_shared_pkg", Some("python_shared_pkg")),
    ("pyjs_framework_ext", Some("python_framework_ext")),
    ("pyjs_framework_pkg", Some("python_framework_pkg")),
    ("pyjs_relocatable_pkg", Some("python_relocatable")),
    ("pyjs_static_ext", Some("python_static")),
    ("pyjs_static_tiny_ext", Some("python_static_tiny")),
];

/// Named builder lists.
pub const RECIPES: [&str; 3] = ["static_python", "shared_python", "framework_python"];

const PYTHON_URL: &str = "https://www.python.org/ftp/python/{version}/Python-{version}.tgz";

/// The bzip2 source release.
pub fn bzip2_product(version: &str) -> Product {
    Product::new("bzip2", version)
        .with_url_template("https://sourceware.org/pub/bzip2/{name}-{version}.tar.gz")
        .with_libs_static(["libbz2.a"])
}

/// The OpenSSL source release.
pub fn openssl_product(version: &str) -> Product {
    Product::new("openssl", version)
        .with_url_template("https://www.openssl.org/source/{name}-{version}.tar.gz")
        .with_libs_static(["libssl.a", "libcrypto.a"])
}

/// The xz source release.
pub fn xz_product(version: &str) -> Product {
    Product::new("xz", version)
        .with_url_template("https://tukaani.org/xz/{name}-{version}.tar.gz")
        .with_libs_static(["liblzma.a"])
}

/// The Python source release for `target`.
///
/// The install directory is the first two words of the target name, so
/// `python_shared_ext` installs into `python-shared`.
pub fn python_product(target: &str, version: &str) -> Product {
    let build_dir = target.split('_').take(2).collect::<Vec<_>>().join("-");
    let product = Product::new("Python", version)
        .with_build_dir(build_dir)
        .with_url_template(PYTHON_URL);
    let staticlib = product.staticlib();
    product.with_libs_static([staticlib])
}

/// Assembles builder graphs for one project and one set of settings.
#[derive(Debug, Clone)]
pub struct Factory {
    project: Arc<Project>,
    settings: Settings,
    shell: Shell,
}

impl Factory {
    /// A factory for `project`, which takes its deployment target from `settings`.
    pub fn new(project: Project, settings: Settings) -> Self {
        let project = project.with_mac_dep_target(settings.mac_dep_target.clone());
        Self {
            project: Arc::new(project),
            settings,
            shell: Shell::default(),
        }
    }

    /// Run every command of the produced builders through `shell`.
    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.shell = shell;
        self
    }

    /// The shared project layout.
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Every buildable target name.
    pub fn targets() -> impl Iterator<Item = &'static str> {
        PLUGIN_TARGETS
            .iter()
            .map(|(name, _)| *name)
            .chain(PYTHON_TARGETS)
            .chain(DEPENDENCY_TARGETS)
    }

    fn node(&self, product: Product, strategy: impl BuildStrategy + 'static) -> Builder {
        Builder::new(product, self.project.clone(), strategy)
            .with_settings(self.settings.clone())
            .with_shell(self.shell.clone())
    }

    /// Builder for `name`, searching externals, then Python, then dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnknownTarget`] if no factory knows the name.
    pub fn builder(&self, name: &str) -> Result<Builder> {
        self.plugin(name)
            .or_else(|_| self.python(name))
            .or_else(|_| self.dependency(name))
            .map_err(|_| BuildError::UnknownTarget(name.to_string()))
    }

    /// One of [`DEPENDENCY_TARGETS`].
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnknownTarget`] for any other name.
    pub fn dependency(&self, name: &str) -> Result<Builder> {
        let s = &self.settings;
        let (product, library) = match name {
            "bz2" => (bzip2_product(&s.bz2_version), Library::Bzip2),
            "ssl" => (openssl_product(&s.ssl_version), Library::OpenSsl),
            "xz" => (xz_product(&s.xz_version), Library::Xz),
            _ => return Err(BuildError::UnknownTarget(name.to_string())),
        };
        Ok(self.node(product, Configured::new(library)))
    }

    fn dependencies(&self) -> Result<Vec<Builder>> {
        DEPENDENCY_TARGETS
            .iter()
            .map(|name| self.dependency(name))
            .collect()
    }

    /// One of [`PYTHON_TARGETS`].
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnknownTarget`] for any other name.
    pub fn python(&self, name: &str) -> Result<Builder> {
        let product = python_product(name, &self.settings.python_version);
        let strategy = match name {
            "python_shared" => PythonSrc::new(Linkage::Shared, Deploy::Plain),
            "python_shared_ext" => PythonSrc::new(Linkage::Shared, Deploy::Ext),
            "python_shared_pkg" => PythonSrc::new(Linkage::Shared, Deploy::Pkg),
            "python_static" => PythonSrc::new(Linkage::Static, Deploy::Plain),
            "python_static_tiny" => PythonSrc::tiny(),
            "python_framework" => PythonSrc::new(Linkage::Framework, Deploy::Plain),
            "python_framework_ext" => PythonSrc::new(Linkage::Framework, Deploy::Ext),
            "python_framework_pkg" => PythonSrc::new(Linkage::Framework, Deploy::Pkg),
            "python_relocatable" => return Ok(self.node(product, PythonRelocatable)),
            "python_cmake" => return Ok(self.node(product, PythonCmake::new())),
            "python_cmake_static" => {
                let strategy = PythonCmake::new()
                    .with_option("BUILD_LIBPYTHON_SHARED", "OFF")
                    .with_option("WITH_STATIC_DEPENDENCIES", "ON");
                return Ok(self.node(product, strategy));
            }
            _ => return Err(BuildError::UnknownTarget(name.to_string())),
        };
        Ok(self.node(product, strategy).with_depends_on(self.dependencies()?))
    }

    /// One of [`PLUGIN_TARGETS`].
    ///
    /// Local and homebrew externals use the host interpreter's version.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnknownTarget`] for any other name.
    pub fn plugin(&self, name: &str) -> Result<Builder> {
        let kind = match name {
            "pyjs_local_sys" => PluginKind::LocalSys,
            "pyjs_homebrew_ext" => PluginKind::HomebrewExt,
            "pyjs_homebrew_pkg" => PluginKind::HomebrewPkg,
            "pyjs_shared_ext" => PluginKind::SharedExt,
            "pyjs_shared_pkg" => PluginKind::SharedPkg,
            "pyjs_framework_ext" => PluginKind::FrameworkExt,
            "pyjs_framework_pkg" => PluginKind::FrameworkPkg,
            "pyjs_relocatable_pkg" => PluginKind::RelocatablePkg,
            "pyjs_static_ext" | "pyjs_static_tiny_ext" => PluginKind::StaticExt,
            _ => return Err(BuildError::UnknownTarget(name.to_string())),
        };
        let python = PLUGIN_TARGETS
            .iter()
            .find(|(target, _)| *target == name)
            .and_then(|(_, python)| *python);

        let builder = match python {
            Some(python) => self
                .node(
                    Product::new("Python", self.settings.python_version.clone()),
                    Plugin::new(kind),
                )
                .with_depends_on(vec![self.python(python)?]),
            None => self.node(
                Product::new("Python", self.project.python.version.clone()),
                Plugin::new(kind),
            ),
        };
        Ok(builder)
    }

    /// One of [`RECIPES`].
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnknownTarget`] for any other name.
    pub fn recipe(&self, name: &str) -> Result<Recipe> {
        let target = match name {
            "static_python" => "python_static",
            "shared_python" => "python_shared",
            "framework_python" => "python_framework",
            _ => return Err(BuildError::UnknownTarget(name.to_string())),
        };
        Ok(Recipe::new(name).with_builder(self.python(target)?))
    }
}
