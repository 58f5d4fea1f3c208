//! Buildable artifacts and their derived names.

use serde::Serialize;

use crate::error::{BuildError, Result};

/// A buildable artifact: name, version, expected outputs and source location.
///
/// Products are assembled once by the factory and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    /// Product name, e.g. `Python` or `openssl`.
    pub name: String,
    /// Full version string, e.g. `3.9.17` or `1.1.1w`.
    pub version: String,
    build_dir: Option<String>,
    /// Static libraries whose presence marks the product as built.
    pub libs_static: Vec<String>,
    url_template: Option<String>,
}

impl Product {
    /// A product with no outputs and no download location.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            build_dir: None,
            libs_static: Vec::new(),
            url_template: None,
        }
    }

    /// Source archive URL with `{name}` and `{version}` placeholders.
    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = Some(template.into());
        self
    }

    /// Static libraries expected after a successful build.
    pub fn with_libs_static<I, S>(mut self, libs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.libs_static = libs.into_iter().map(Into::into).collect();
        self
    }

    /// Override the install directory name under `build/lib`.
    pub fn with_build_dir(mut self, dir: impl Into<String>) -> Self {
        self.build_dir = Some(dir.into());
        self
    }

    /// Install directory name; defaults to the product name.
    pub fn build_dir(&self) -> &str {
        self.build_dir.as_deref().unwrap_or(&self.name)
    }

    /// `major.minor`, e.g. `3.9`.
    pub fn ver(&self) -> String {
        self.version.split('.').take(2).collect::<Vec<_>>().join(".")
    }

    /// `major.minor` without the dot, e.g. `39`.
    pub fn ver_nodot(&self) -> String {
        self.ver().replace('.', "")
    }

    /// `Python-3.9.17`
    pub fn name_version(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// `python3.9`
    pub fn name_ver(&self) -> String {
        format!("{}{}", self.name.to_lowercase(), self.ver())
    }

    /// ABI flags of the interpreter; only 3.7 still carries `m`.
    pub fn abiflags(&self) -> &'static str {
        if self.ver() == "3.7" { "m" } else { "" }
    }

    /// Shared library name, e.g. `libpython3.9.dylib`.
    pub fn dylib(&self) -> String {
        format!(
            "lib{}{}{}.dylib",
            self.name.to_lowercase(),
            self.ver(),
            self.abiflags()
        )
    }

    /// Static library name, e.g. `libpython3.9.a`.
    pub fn staticlib(&self) -> String {
        format!("lib{}{}.a", self.name.to_lowercase(), self.ver())
    }

    /// Resolved download URL.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Config`] if no URL template was set.
    pub fn url(&self) -> Result<String> {
        let template = self.url_template.as_deref().ok_or_else(|| {
            BuildError::config(format!("url_template not set for product '{}'", self.name))
        })?;
        Ok(template
            .replace("{name}", &self.name)
            .replace("{version}", &self.version))
    }

    /// Last path segment of the download URL.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Config`] if no URL template was set.
    pub fn name_archive(&self) -> Result<String> {
        let url = self.url()?;
        Ok(url.rsplit('/').next().unwrap_or_default().to_string())
    }
}
