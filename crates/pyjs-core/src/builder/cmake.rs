//! Python built with `python-cmake-buildsystem`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::info;

use super::{BuildContext, BuildStrategy, Stage, Variant};
use crate::error::Result;
use crate::product::Product;
use crate::project::Project;
use crate::shell::Cmd;

/// Repository cloned into the downloads directory.
pub const BUILDSYSTEM_URL: &str = "https://github.com/shakfu/python-cmake-buildsystem";

const BUILDSYSTEM_DIR: &str = "python-cmake-buildsystem";
const BUILD_DIR: &str = "python-cmake-build";
const INSTALL_DIR: &str = "python-cmake";

const DEFAULTS: &[(&str, &str)] = &[
    ("PYTHON_APPLY_PATCHES", "ON"),
    ("CMAKE_BUILD_TYPE", "Release"),
    ("DOWNLOAD_SOURCES", "ON"),
    ("BUILD_LIBPYTHON_SHARED", "OFF"),
    ("BUILD_EXTENSIONS_AS_BUILTIN", "OFF"),
    ("WITH_STATIC_DEPENDENCIES", "OFF"),
    ("INSTALL_DEVELOPMENT", "ON"),
    ("INSTALL_MANUAL", "OFF"),
    ("INSTALL_TEST", "OFF"),
    ("USE_LIB64", "OFF"),
    ("WITH_C_LOCALE_COERCION", "ON"),
    ("WITH_DECIMAL_CONTEXTVAR", "ON"),
    ("WITH_TRACE_REFS", "OFF"),
    ("USE_SYSTEM_LIBRARIES", "ON"),
    ("USE_SYSTEM_LibFFI", "OFF"),
];

const EMBEDDED: &[(&str, &str)] = &[
    ("BUILD_EXTENSIONS_AS_BUILTIN", "ON"),
    ("BUILD_LIBPYTHON_SHARED", "ON"),
    ("ENABLE_AUDIOOP", "OFF"),
    ("ENABLE_CODECS_CN", "OFF"),
    ("ENABLE_CODECS_HK", "OFF"),
    ("ENABLE_CODECS_ISO2022", "OFF"),
    ("ENABLE_CODECS_JP", "OFF"),
    ("ENABLE_CODECS_KR", "OFF"),
    ("ENABLE_CODECS_TW", "OFF"),
    ("ENABLE_CTYPES", "OFF"),
    ("ENABLE_CTYPES_TEST", "OFF"),
    ("ENABLE_CURSES", "OFF"),
    ("ENABLE_CURSES_PANEL", "OFF"),
    ("ENABLE_DBM", "OFF"),
    ("ENABLE_GDBM", "OFF"),
    ("ENABLE_TESTCAPI", "OFF"),
    ("ENABLE_TKINTER", "OFF"),
];

/// Strategy for a CMake-driven Python build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonCmake {
    overrides: BTreeMap<String, String>,
}

impl Default for PythonCmake {
    fn default() -> Self {
        Self::new()
    }
}

impl PythonCmake {
    /// Build with the embedding overrides applied on top of the defaults.
    pub fn new() -> Self {
        Self {
            overrides: EMBEDDED
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    /// Set one `-D` cache entry.
    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.overrides.insert(key.to_string(), value.to_string());
        self
    }

    /// Final `-D` entries: defaults, then overrides, then the install prefix.
    pub fn cache_entries(&self, ctx: &BuildContext<'_>) -> BTreeMap<String, String> {
        let mut entries: BTreeMap<String, String> = DEFAULTS
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        entries.insert("PYTHON_VERSION".to_string(), ctx.product.version.clone());
        entries.extend(self.overrides.clone());
        entries.insert(
            "CMAKE_INSTALL_PREFIX".to_string(),
            ctx.paths.prefix.to_string_lossy().into_owned(),
        );
        entries
    }

    fn buildsystem(project: &Project) -> PathBuf {
        project.build_downloads.join(BUILDSYSTEM_DIR)
    }

    fn build_dir(project: &Project) -> PathBuf {
        project.build_src.join(BUILD_DIR)
    }
}

impl BuildStrategy for PythonCmake {
    fn variant(&self) -> Variant {
        Variant::PythonCmake
    }

    fn prefix(&self, _product: &Product, project: &Project) -> PathBuf {
        project.build_lib.join(INSTALL_DIR)
    }

    fn stages(&self) -> &'static [Stage] {
        &[Stage::Reset, Stage::Download, Stage::Build]
    }

    fn reset(&self, ctx: &BuildContext<'_>) -> Result<()> {
        for dir in [Self::build_dir(ctx.project), ctx.paths.prefix.clone()] {
            ctx.shell.remove(&dir)?;
            ctx.shell.makedirs(&dir)?;
        }
        Ok(())
    }

    fn download(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let dest = Self::buildsystem(ctx.project);
        if dest.exists() {
            info!("{BUILDSYSTEM_DIR} present: {}", dest.display());
            return Ok(());
        }
        ctx.shell.run(
            &Cmd::new("git")
                .args(["clone", "--depth=1", BUILDSYSTEM_URL])
                .arg_path(&dest),
        )?;
        Ok(())
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<()> {
        let build_dir = Self::build_dir(ctx.project);
        let defines = self
            .cache_entries(ctx)
            .into_iter()
            .map(|(k, v)| format!("-D{k}={v}"));

        ctx.run(
            Cmd::new("cmake")
                .arg("-S")
                .arg_path(&Self::buildsystem(ctx.project))
                .arg("-B")
                .arg_path(&build_dir)
                .args(defines)
                .env("MACOSX_DEPLOYMENT_TARGET", &ctx.project.mac_dep_target),
        )?;
        ctx.run(Cmd::new("cmake").arg("--build").arg_path(&build_dir))?;
        ctx.run(Cmd::new("cmake").arg("--install").arg_path(&build_dir))
    }
}
