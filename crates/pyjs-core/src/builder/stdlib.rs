//! Standard-library trimming and zipping for embedded Python builds.
//!
//! `clean` deletes what a plugin never imports (tests, GUI toolkits, build
//! helpers). `ziplib` then packs the remaining pure-Python tree into
//! `lib/pythonXY.zip`, leaving only `lib-dynload`, `os.py` and
//! `site-packages` unpacked so the interpreter can still bootstrap. Those
//! are set aside in `<prefix>/lib` while the zip is written, so a failed
//! run leaves them on disk.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{BuildPaths, require_exists};
use crate::error::Result;
use crate::product::Product;
use crate::shell::{Cmd, Shell};

const TEST_DIRS: [&str; 3] = ["test", "tests", "idle_test"];

const EXTENSIONS: [&str; 11] = [
    "_tkinter",
    "_ctypes",
    "_multibytecodec",
    "_codecs_jp",
    "_codecs_hk",
    "_codecs_cn",
    "_codecs_kr",
    "_codecs_tw",
    "_codecs_iso2022",
    "_curses",
    "_curses_panel",
];

const TKINTER_GLOBS: [&str; 14] = [
    "Tk.*",
    "itcl*",
    "libformw.*",
    "libmenuw.*",
    "libpanelw.*",
    "libncurse*",
    "libtcl*",
    "libtclstub*",
    "sqlite3*",
    "libtk*",
    "tcl*",
    "tdbc*",
    "thread*",
    "tk*",
];

/// What to delete from an installed Python tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimPlan {
    /// `major.minor` of the interpreter.
    pub ver: String,
    /// `major.minor` without the dot.
    pub ver_nodot: String,
    /// Packages and modules under the python lib.
    pub packages: Vec<String>,
    /// Extension modules under `lib-dynload`.
    pub extensions: Vec<String>,
    /// Executables under `bin`.
    pub binaries: Vec<String>,
    /// Glob patterns matched against `lib`.
    pub globs: Vec<String>,
    /// Keep `site-packages` through cleaning and zipping.
    pub keep_site_packages: bool,
}

impl TrimPlan {
    /// Trim list for a Python built from source.
    ///
    /// Package layouts keep `ensurepip`; static builds have no extension
    /// modules to remove.
    pub fn python(product: &Product, keep_ensurepip: bool, is_static: bool) -> Self {
        let ver = product.ver();
        let mut packages = vec![
            format!("config-{ver}{}-darwin", product.abiflags()),
            "idlelib".to_string(),
            "lib2to3".to_string(),
            "tkinter".to_string(),
            "turtledemo".to_string(),
            "turtle.py".to_string(),
            "ctypes".to_string(),
            "curses".to_string(),
        ];
        if !keep_ensurepip {
            packages.push("ensurepip".to_string());
        }
        packages.push("venv".to_string());

        let extensions = if is_static {
            Vec::new()
        } else {
            extension_files(product, |_| true)
        };

        Self {
            binaries: binaries(&ver),
            ver_nodot: product.ver_nodot(),
            ver,
            packages,
            extensions,
            globs: Vec::new(),
            keep_site_packages: false,
        }
    }

    /// Trim list for the prebuilt relocatable framework.
    ///
    /// `ctypes` stays, bundled Tcl/Tk goes, and `site-packages` is preserved.
    pub fn relocatable(product: &Product) -> Self {
        let ver = product.ver();
        let packages = vec![
            format!("config-{ver}{}-darwin", product.abiflags()),
            "idlelib".to_string(),
            "lib2to3".to_string(),
            "tkinter".to_string(),
            "turtledemo".to_string(),
            "turtle.py".to_string(),
            "curses".to_string(),
            "ensurepip".to_string(),
            "venv".to_string(),
        ];
        let mut binaries = binaries(&ver);
        binaries.extend(["2to3", "idle3", "pydoc3"].map(String::from));

        Self {
            extensions: extension_files(product, |name| name != "_ctypes"),
            ver_nodot: product.ver_nodot(),
            ver,
            packages,
            binaries,
            globs: TKINTER_GLOBS.map(String::from).to_vec(),
            keep_site_packages: true,
        }
    }

    /// Name of the zipped standard library, e.g. `python39.zip`.
    pub fn zip_name(&self) -> String {
        format!("python{}.zip", self.ver_nodot)
    }
}

fn extension_files(product: &Product, keep: impl Fn(&str) -> bool) -> Vec<String> {
    let nodot = product.ver_nodot();
    EXTENSIONS
        .iter()
        .filter(|name| keep(name))
        .map(|name| format!("{name}.cpython-{nodot}-darwin.so"))
        .collect()
}

fn binaries(ver: &str) -> Vec<String> {
    vec![
        format!("2to3-{ver}"),
        format!("idle{ver}"),
        format!("easy_install-{ver}"),
        format!("pip{ver}"),
        format!("pyvenv-{ver}"),
        format!("pydoc{ver}"),
    ]
}

fn is_bytecode(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        name == "__pycache__"
    } else {
        name.ends_with(".pyc") || name.ends_with(".pyo")
    }
}

fn is_test_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir() && TEST_DIRS.contains(&&*entry.file_name().to_string_lossy())
}

/// Remove tests, bytecode, build helpers and everything named in `plan`.
///
/// Missing entries are logged and skipped.
///
/// # Errors
///
/// Returns an error if an existing entry cannot be removed.
pub fn clean(shell: &Shell, paths: &BuildPaths, plan: &TrimPlan) -> Result<()> {
    info!("cleaning {}", paths.prefix.display());
    let skip: &[&str] = if plan.keep_site_packages {
        &["site-packages"]
    } else {
        &[]
    };

    let removed = shell.recursive_clean(&paths.prefix, skip, is_bytecode)?;
    debug!("removed {removed} bytecode entries");

    let removed = shell.recursive_clean(&paths.python_lib, skip, is_test_dir)?;
    debug!("removed {removed} test directories");

    if !plan.keep_site_packages {
        shell.remove(&paths.site_packages)?;
    }
    shell.glob_remove(&paths.python_lib.join("distutils/command"), &["*.exe".to_string()])?;
    shell.remove(&paths.prefix_lib.join("pkgconfig"))?;
    shell.remove(&paths.prefix.join("share"))?;

    for pkg in &plan.packages {
        shell.remove(&paths.python_lib.join(pkg))?;
    }
    for ext in &plan.extensions {
        shell.remove(&paths.lib_dynload.join(ext))?;
    }
    for bin in &plan.binaries {
        shell.remove(&paths.prefix_bin.join(bin))?;
    }
    if !plan.globs.is_empty() {
        shell.glob_remove(&paths.prefix_lib, &plan.globs)?;
    }
    Ok(())
}

/// Zip the pure-Python standard library.
///
/// Returns the path of the written zip. With `precompile` the tree is
/// byte-compiled in place first and only `.pyc` files are archived.
///
/// # Errors
///
/// Returns an invariant error if `lib-dynload` or `os.py` is missing, and
/// IO or zip errors if the archive cannot be written.
pub fn ziplib(shell: &Shell, paths: &BuildPaths, plan: &TrimPlan, precompile: bool) -> Result<PathBuf> {
    let python_lib = &paths.python_lib;
    require_exists(python_lib, "python lib")?;
    require_exists(&paths.lib_dynload, "lib-dynload")?;
    let os_py = python_lib.join("os.py");
    require_exists(&os_py, "os.py")?;

    let stashed_site = paths.prefix_lib.join("site-packages");
    if plan.keep_site_packages && paths.site_packages.exists() {
        shell.move_path(&paths.site_packages, &stashed_site)?;
    } else {
        shell.remove(&paths.site_packages)?;
    }

    let aside_dynload = paths.prefix_lib.join("lib-dynload");
    let aside_os = paths.prefix_lib.join("os.py");
    shell.move_path(&paths.lib_dynload, &aside_dynload)?;
    shell.copy(&os_py, &aside_os)?;

    if precompile {
        byte_compile(shell, paths, plan)?;
    }

    let zip_path = paths.prefix_lib.join(plan.zip_name());
    let entries = write_zip(python_lib, &zip_path)?;
    info!("wrote {} entries to {}", entries, zip_path.display());

    shell.remove(python_lib)?;
    shell.makedirs(python_lib)?;
    shell.move_path(&aside_dynload, &paths.lib_dynload)?;
    shell.move_path(&aside_os, &os_py)?;
    if stashed_site.exists() {
        shell.move_path(&stashed_site, &paths.site_packages)?;
    } else {
        shell.makedirs(&paths.site_packages)?;
    }
    Ok(zip_path)
}

fn byte_compile(shell: &Shell, paths: &BuildPaths, plan: &TrimPlan) -> Result<()> {
    let built = paths.prefix_bin.join(format!("python{}", plan.ver));
    let interpreter = if built.exists() {
        built.to_string_lossy().into_owned()
    } else {
        "python3".to_string()
    };
    shell.run(
        &Cmd::new(interpreter)
            .args(["-m", "compileall", "-q", "-b"])
            .arg_path(&paths.python_lib)
            .cwd(&paths.prefix),
    )?;
    shell.recursive_clean(&paths.python_lib, &[], |e| {
        e.file_type().is_file() && e.file_name().to_string_lossy().ends_with(".py")
    })?;
    Ok(())
}

/// Write every entry under `root` into a deflated zip at `dest`.
///
/// Entry names are relative to `root` and always `/`-separated.
fn write_zip(root: &Path, dest: &Path) -> Result<usize> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(dest)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut count = 0;

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else {
            zip.start_file(name, options)?;
            io::copy(&mut File::open(entry.path())?, &mut zip)?;
            count += 1;
        }
    }

    zip.finish()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{HostPython, Project};
    use std::io::Read;

    fn python() -> Product {
        Product::new("Python", "3.9.17")
    }

    fn populate(prefix: &Path) -> BuildPaths {
        let project = Project::new(
            prefix.parent().unwrap(),
            HostPython::from_version("3.9.17", "/usr/local"),
        );
        let paths = BuildPaths::new(&project, &python(), prefix.to_path_buf());
        let lib = &paths.python_lib;
        for dir in [
            "json/__pycache__",
            "unittest/test",
            "idlelib/idle_test",
            "tkinter",
            "ensurepip",
            "lib-dynload",
            "site-packages/pkg",
            "distutils/command",
            "config-3.9-darwin",
        ] {
            std::fs::create_dir_all(lib.join(dir)).unwrap();
        }
        for file in [
            "os.py",
            "json/__init__.py",
            "json/__pycache__/__init__.cpython-39.pyc",
            "unittest/__init__.py",
            "unittest/test/test_case.py",
            "turtle.py",
            "lib-dynload/_json.cpython-39-darwin.so",
            "lib-dynload/_ctypes.cpython-39-darwin.so",
            "site-packages/pkg/__init__.py",
            "distutils/command/wininst-9.0.exe",
            "distutils/command/build.py",
        ] {
            std::fs::write(lib.join(file), file).unwrap();
        }
        std::fs::create_dir_all(&paths.prefix_bin).unwrap();
        std::fs::write(paths.prefix_bin.join("pip3.9"), "").unwrap();
        std::fs::write(paths.prefix_bin.join("python3.9"), "").unwrap();
        std::fs::create_dir_all(paths.prefix_lib.join("pkgconfig")).unwrap();
        std::fs::create_dir_all(paths.prefix.join("share/man")).unwrap();
        paths
    }

    #[test]
    fn test_python_plan_lists() {
        let plan = TrimPlan::python(&python(), false, false);
        assert!(plan.packages.contains(&"config-3.9-darwin".to_string()));
        assert!(plan.packages.contains(&"ensurepip".to_string()));
        assert!(
            plan.extensions
                .contains(&"_tkinter.cpython-39-darwin.so".to_string())
        );
        assert!(plan.binaries.contains(&"pip3.9".to_string()));
        assert_eq!(plan.zip_name(), "python39.zip");

        let pkg = TrimPlan::python(&python(), true, true);
        assert!(!pkg.packages.contains(&"ensurepip".to_string()));
        assert!(pkg.extensions.is_empty());
    }

    #[test]
    fn test_relocatable_plan_keeps_ctypes() {
        let plan = TrimPlan::relocatable(&python());
        assert!(!plan.packages.contains(&"ctypes".to_string()));
        assert!(
            !plan
                .extensions
                .contains(&"_ctypes.cpython-39-darwin.so".to_string())
        );
        assert!(plan.binaries.contains(&"idle3".to_string()));
        assert!(plan.keep_site_packages);
        assert_eq!(plan.globs.len(), 14);
    }

    #[test]
    fn test_clean_removes_listed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let paths = populate(&dir.path().join("python-shared"));
        let plan = TrimPlan::python(&python(), false, false);

        clean(&Shell::default(), &paths, &plan).unwrap();

        let lib = &paths.python_lib;
        assert!(!lib.join("json/__pycache__").exists());
        assert!(!lib.join("unittest/test").exists());
        assert!(lib.join("unittest/__init__.py").exists());
        assert!(!lib.join("idlelib").exists());
        assert!(!lib.join("tkinter").exists());
        assert!(!lib.join("turtle.py").exists());
        assert!(!lib.join("config-3.9-darwin").exists());
        assert!(!lib.join("site-packages").exists());
        assert!(!lib.join("distutils/command/wininst-9.0.exe").exists());
        assert!(lib.join("distutils/command/build.py").exists());
        assert!(!lib.join("lib-dynload/_ctypes.cpython-39-darwin.so").exists());
        assert!(lib.join("lib-dynload/_json.cpython-39-darwin.so").exists());
        assert!(!paths.prefix_bin.join("pip3.9").exists());
        assert!(paths.prefix_bin.join("python3.9").exists());
        assert!(!paths.prefix_lib.join("pkgconfig").exists());
        assert!(!paths.prefix.join("share").exists());
    }

    #[test]
    fn test_ziplib_leaves_bootstrap_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = populate(&dir.path().join("python-shared"));
        let plan = TrimPlan::python(&python(), false, false);
        let shell = Shell::default();
        clean(&shell, &paths, &plan).unwrap();

        let zip_path = ziplib(&shell, &paths, &plan, false).unwrap();
        assert_eq!(zip_path, paths.prefix_lib.join("python39.zip"));

        let mut remaining: Vec<String> = std::fs::read_dir(&paths.python_lib)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["lib-dynload", "os.py", "site-packages"]);
        assert!(
            paths
                .lib_dynload
                .join("_json.cpython-39-darwin.so")
                .exists()
        );
        assert!(!paths.prefix_lib.join("lib-dynload").exists());

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(String::from).collect();
        assert!(names.contains(&"json/__init__.py".to_string()));
        assert!(names.contains(&"os.py".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("lib-dynload")));

        let mut body = String::new();
        archive
            .by_name("json/__init__.py")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "json/__init__.py");
    }

    #[test]
    fn test_ziplib_keeps_site_packages_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let paths = populate(&dir.path().join("Versions/3.9"));
        let plan = TrimPlan::relocatable(&python());

        ziplib(&Shell::default(), &paths, &plan, false).unwrap();
        assert!(paths.site_packages.join("pkg/__init__.py").exists());

        let archive = zip::ZipArchive::new(File::open(paths.prefix_lib.join("python39.zip")).unwrap())
            .unwrap();
        assert!(!archive.file_names().any(|n| n.starts_with("site-packages")));
    }

    #[test]
    fn test_failed_zip_leaves_site_packages_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let paths = populate(&dir.path().join("Versions/3.9"));
        let plan = TrimPlan::relocatable(&python());
        std::fs::create_dir_all(paths.prefix_lib.join("python39.zip")).unwrap();

        ziplib(&Shell::default(), &paths, &plan, false).unwrap_err();

        assert!(paths.prefix_lib.join("site-packages/pkg/__init__.py").exists());
        assert!(paths.prefix_lib.join("lib-dynload").exists());
    }

    #[test]
    fn test_ziplib_without_lib_dynload_is_invariant_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = populate(&dir.path().join("python-static"));
        std::fs::remove_dir_all(&paths.lib_dynload).unwrap();
        let plan = TrimPlan::python(&python(), false, true);

        let err = ziplib(&Shell::default(), &paths, &plan, false).unwrap_err();
        assert!(matches!(err, crate::BuildError::Invariant(_)));
    }
}
