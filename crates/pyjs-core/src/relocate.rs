//! Mach-O load-command relocation.
//!
//! Walks a binary's dependency closure with `otool -L`, copies every
//! vendored dylib next to it and rewrites the references with
//! `install_name_tool` so the tree no longer points at the build machine.
//!
//! ## Vendored vs system references
//!
//! A reference is *vendored* when it is empty or lives under one of
//! [`VENDORED_PREFIXES`]. Those must travel with the artifact. Everything
//! else (`/usr/lib`, `/System/...`) ships with the OS and is left alone.
//!
//! Rewrites are applied to copies only. Running [`DependencyManager::rewrite_references`]
//! against the original build tree would leave it unusable for a second pass.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{BuildError, Result};
use crate::shell::Shell;

/// Path prefixes that mark a reference as belonging to the build machine.
pub const VENDORED_PREFIXES: [&str; 4] = ["/opt/local/", "/usr/local/", "/Users/", "/tmp/"];

/// Where a bare library filename in a load command is assumed to live.
const DEFAULT_LIB_DIR: &str = "/usr/local/lib";

/// Default install name given to the primary target after copying.
pub const DEFAULT_EXEC_REF: &str = "@loader_path/../Frameworks";

/// Permission bits given to the relocated copies.
const COPY_MODE: u32 = 0o644;

/// Permission bits applied before a fixer rewrites a binary in place.
const FIX_MODE: u32 = 0o755;

static OTOOL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+)\s*\(compatibility version .+\)$").expect("otool line pattern")
});

/// Classification of a load-command reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Provided by the operating system.
    System,
    /// Built or installed locally; must be bundled.
    Vendored,
}

/// Classify a load-command path.
pub fn classify_reference(path: &str) -> RefKind {
    if path.is_empty() || VENDORED_PREFIXES.iter().any(|p| path.starts_with(p)) {
        RefKind::Vendored
    } else {
        RefKind::System
    }
}

/// Every referenced path in an `otool -L` listing, in file order.
pub fn parse_otool_output(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| OTOOL_LINE.captures(line.trim_end()))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Vendored references of `binary`, in the order `otool -L` lists them.
///
/// A bare filename counts as vendored; the caller decides where it resolves.
///
/// # Errors
///
/// Fails if `otool` is missing or exits non-zero.
pub fn collect_references(shell: &Shell, binary: &Path) -> Result<Vec<String>> {
    let listing = shell.otool_l(binary)?;
    Ok(parse_otool_output(&listing)
        .into_iter()
        .filter(|path| is_vendored_reference(path))
        .collect())
}

fn is_vendored_reference(path: &str) -> bool {
    let dir_is_empty = Path::new(path)
        .parent()
        .is_none_or(|p| p.as_os_str().is_empty());
    dir_is_empty || classify_reference(path) == RefKind::Vendored
}

fn resolve_reference(path: &str) -> String {
    let p = Path::new(path);
    match p.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => path.to_string(),
        _ => format!("{DEFAULT_LIB_DIR}/{}", basename(p)),
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Outcome of [`DependencyManager::mirror_static_libs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    /// Static archives copied into the mirror directory.
    pub copied: Vec<PathBuf>,
    /// Dependencies with no static counterpart on disk.
    pub missing: Vec<PathBuf>,
}

/// Collects, copies and rewrites the vendored dylib closure of one target.
#[derive(Debug)]
pub struct DependencyManager<'a> {
    shell: &'a Shell,
    target: PathBuf,
    exec_ref: String,
    rpath: Option<String>,
    staticlibs_dir: Option<PathBuf>,
    install_names: BTreeMap<String, Vec<(String, String)>>,
    deps: Vec<String>,
    visited: BTreeSet<PathBuf>,
}

impl<'a> DependencyManager<'a> {
    /// Prepare to relocate `target`.
    pub fn new(shell: &'a Shell, target: impl Into<PathBuf>) -> Self {
        Self {
            shell,
            target: target.into(),
            exec_ref: DEFAULT_EXEC_REF.to_string(),
            rpath: None,
            staticlibs_dir: None,
            install_names: BTreeMap::new(),
            deps: Vec::new(),
            visited: BTreeSet::new(),
        }
    }

    /// Install name given to the copied target.
    pub fn with_exec_ref(mut self, exec_ref: impl Into<String>) -> Self {
        self.exec_ref = exec_ref.into();
        self
    }

    /// Run-path search entry added to the copied target, so its
    /// `@rpath/` references resolve from the destination.
    pub fn with_rpath(mut self, rpath: impl Into<String>) -> Self {
        self.rpath = Some(rpath.into());
        self
    }

    /// Directory that receives static counterparts of each dependency.
    pub fn with_staticlibs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staticlibs_dir = Some(dir.into());
        self
    }

    /// Every distinct vendored dependency found so far, in discovery order.
    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    /// Rewrite pairs keyed by the basename of the binary that holds them.
    pub fn install_names(&self) -> &BTreeMap<String, Vec<(String, String)>> {
        &self.install_names
    }

    /// Vendored references of one binary.
    ///
    /// # Errors
    ///
    /// Fails if `otool` is missing or exits non-zero.
    pub fn collect_references(&self, binary: &Path) -> Result<Vec<String>> {
        collect_references(self.shell, binary)
    }

    /// Walk the target's vendored closure.
    ///
    /// Each dependency is visited once, so cycles terminate.
    ///
    /// # Errors
    ///
    /// Fails if `otool` fails on any binary in the closure.
    pub fn collect_closure(&mut self) -> Result<()> {
        let target = self.target.clone();
        self.walk(&target)
    }

    fn walk(&mut self, binary: &Path) -> Result<()> {
        self.visited.insert(binary.to_path_buf());
        let key = basename(binary);
        let mut entries = Vec::new();

        for reference in self.collect_references(binary)? {
            let path = resolve_reference(&reference);
            let name = basename(Path::new(&path));
            entries.push((path.clone(), format!("@rpath/{name}")));

            if self.deps.contains(&path) {
                continue;
            }
            self.deps.push(path.clone());
            let dep = PathBuf::from(&path);
            if !self.visited.contains(&dep) {
                self.walk(&dep)?;
            }
        }

        debug!("{key}: {} vendored references", entries.len());
        self.install_names.insert(key, entries);
        Ok(())
    }

    /// Copy the target and its closure into `dest_dir`.
    ///
    /// Files already present in `dest_dir` are left untouched. The copied
    /// target's install name is then set to the exec ref.
    ///
    /// # Errors
    ///
    /// Fails if a copy fails or `install_name_tool` rejects the target.
    pub fn copy_closure(&self, dest_dir: &Path) -> Result<()> {
        self.shell.makedirs(dest_dir)?;

        if self.target.parent() != Some(dest_dir) {
            let dest = dest_dir.join(basename(&self.target));
            self.copy_once(&self.target, &dest)?;
            self.shell.install_name_tool_id(&self.exec_ref, &dest)?;
        }

        for dep in &self.deps {
            let src = Path::new(dep);
            self.copy_once(src, &dest_dir.join(basename(src)))?;
        }
        Ok(())
    }

    fn copy_once(&self, src: &Path, dest: &Path) -> Result<()> {
        if dest.exists() {
            debug!("already copied: {}", dest.display());
            return Ok(());
        }
        self.shell.copy(src, dest)?;
        self.shell.chmod(dest, COPY_MODE)
    }

    /// Rewrite every collected reference on the copies in `dest_dir`.
    ///
    /// A reference to the binary's own basename becomes `-id`; all others
    /// become `-change`. Binaries are processed in sorted key order, then the
    /// rpath, if any, is added to the target.
    ///
    /// # Errors
    ///
    /// The first failing `install_name_tool` call aborts the rewrite.
    pub fn rewrite_references(&self, dest_dir: &Path) -> Result<()> {
        for (key, refs) in &self.install_names {
            let target = dest_dir.join(key);
            for (old, new) in refs {
                if basename(Path::new(old)) == *key {
                    self.shell.install_name_tool_id(new, &target)?;
                } else {
                    self.shell.install_name_tool_change(old, new, &target)?;
                }
            }
        }
        if let Some(rpath) = &self.rpath {
            let target = dest_dir.join(basename(&self.target));
            self.shell.install_name_tool_add_rpath(rpath, &target)?;
        }
        Ok(())
    }

    /// Copy the static archive that sits beside each dependency.
    ///
    /// Dependencies without one are logged and reported, not treated as errors.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Config`] if no static-library directory was set,
    /// or an IO error if a copy fails.
    pub fn mirror_static_libs(&self) -> Result<MirrorReport> {
        let dir = self.staticlibs_dir.as_deref().ok_or_else(|| {
            BuildError::config("staticlibs_dir must be set to mirror static libraries")
        })?;
        self.shell.makedirs(dir)?;

        let mut report = MirrorReport::default();
        for dep in &self.deps {
            let candidates = static_candidates(Path::new(dep));
            match candidates.iter().find(|c| c.exists()) {
                Some(found) => {
                    let dest = dir.join(basename(found));
                    self.shell.copy(found, &dest)?;
                    report.copied.push(dest);
                }
                None => {
                    let primary = candidates
                        .into_iter()
                        .next()
                        .unwrap_or_else(|| PathBuf::from(dep));
                    warn!("static library not exists: {}", primary.display());
                    report.missing.push(primary);
                }
            }
        }
        Ok(report)
    }

    /// Collect, copy and rewrite, then mirror static archives if configured.
    ///
    /// # Errors
    ///
    /// Propagates the first failure from any step.
    pub fn process(&mut self, dest_dir: &Path) -> Result<Option<MirrorReport>> {
        info!("relocating {} into {}", self.target.display(), dest_dir.display());
        self.collect_closure()?;
        self.copy_closure(dest_dir)?;
        self.rewrite_references(dest_dir)?;
        if self.staticlibs_dir.is_some() {
            return self.mirror_static_libs().map(Some);
        }
        Ok(None)
    }
}

/// Candidate static archives for a dylib, most specific first.
///
/// `libfoo.1.2.dylib` yields `libfoo.1.2.a`, `libfoo.1.a`, `libfoo.a`.
fn static_candidates(dylib: &Path) -> Vec<PathBuf> {
    let name = basename(dylib);
    let Some(mut stem) = name.strip_suffix(".dylib").map(str::to_string) else {
        return Vec::new();
    };
    let dir = dylib.parent().unwrap_or_else(|| Path::new(""));

    let mut out = vec![dir.join(format!("{stem}.a"))];
    while let Some((head, tail)) = stem.rsplit_once('.') {
        if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
            break;
        }
        stem = head.to_string();
        out.push(dir.join(format!("{stem}.a")));
    }
    out
}

/// Bundle layouts the packaging variants place Python into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Shared library under `support/pythonX.Y` of a package.
    SharedPkg,
    /// `Python.framework` under `support/` of a package.
    FrameworkPkg,
    /// Shared library inside the plugin bundle's `Resources`.
    SharedExt,
    /// `Python.framework` inside the plugin bundle's `Resources`.
    FrameworkExt,
}

impl Layout {
    /// Install name the Python library gets in this layout.
    ///
    /// Homebrew copies put the dylib at the top of its directory instead
    /// of under `lib/`.
    pub fn dylib_id(self, short_ver: &str, homebrew: bool) -> String {
        let sep = if homebrew { "" } else { "lib/" };
        match self {
            Self::SharedPkg => format!(
                "@loader_path/../../../../support/python{short_ver}/{sep}libpython{short_ver}.dylib"
            ),
            Self::SharedExt => format!(
                "@loader_path/../Resources/{sep}python{short_ver}/libpython{short_ver}.dylib"
            ),
            Self::FrameworkPkg => format!(
                "@loader_path/../../../../support/Python.framework/Versions/{short_ver}/Python"
            ),
            Self::FrameworkExt => {
                format!("@loader_path/../Resources/Python.framework/Versions/{short_ver}/Python")
            }
        }
    }
}

/// One-shot fixers applied to a freshly built Python.
#[derive(Debug, Clone, Copy)]
pub struct Fixer<'a> {
    shell: &'a Shell,
}

impl<'a> Fixer<'a> {
    /// Wrap a shell.
    pub fn new(shell: &'a Shell) -> Self {
        Self { shell }
    }

    fn fix_dylib(&self, layout: Layout, dylib: &Path, short_ver: &str, homebrew: bool) -> Result<()> {
        require_file(dylib)?;
        self.shell.chmod(dylib, FIX_MODE)?;
        self.shell
            .install_name_tool_id(&layout.dylib_id(short_ver, homebrew), dylib)
    }

    /// Point the dylib's install name into a package's `support/pythonX.Y`.
    ///
    /// # Errors
    ///
    /// Fails if the dylib is missing or `install_name_tool` fails.
    pub fn fix_dylib_for_shared_pkg(&self, dylib: &Path, short_ver: &str, homebrew: bool) -> Result<()> {
        self.fix_dylib(Layout::SharedPkg, dylib, short_ver, homebrew)
    }

    /// Point the dylib's install name into the plugin's `Resources`.
    ///
    /// # Errors
    ///
    /// Fails if the dylib is missing or `install_name_tool` fails.
    pub fn fix_dylib_for_shared_ext(&self, dylib: &Path, short_ver: &str, homebrew: bool) -> Result<()> {
        self.fix_dylib(Layout::SharedExt, dylib, short_ver, homebrew)
    }

    /// Point the framework binary's install name into a package's `support/`.
    ///
    /// # Errors
    ///
    /// Fails if the binary is missing or `install_name_tool` fails.
    pub fn fix_dylib_for_framework_pkg(&self, dylib: &Path, short_ver: &str) -> Result<()> {
        self.fix_dylib(Layout::FrameworkPkg, dylib, short_ver, false)
    }

    /// Point the framework binary's install name into the plugin's `Resources`.
    ///
    /// # Errors
    ///
    /// Fails if the binary is missing or `install_name_tool` fails.
    pub fn fix_dylib_for_framework_ext(&self, dylib: &Path, short_ver: &str) -> Result<()> {
        self.fix_dylib(Layout::FrameworkExt, dylib, short_ver, false)
    }

    /// Redirect the interpreter's first vendored reference to the sibling dylib.
    ///
    /// # Errors
    ///
    /// Fails if the executable is missing or a tool invocation fails.
    pub fn fix_exe_for_shared_pkg(&self, executable: &Path, short_ver: &str, homebrew: bool) -> Result<()> {
        let sep = if homebrew { "" } else { "lib/" };
        self.change_first_vendored(
            executable,
            &format!("@executable_path/../{sep}libpython{short_ver}.dylib"),
        )
    }

    /// Redirect the framework's `pythonX.Y` and `Python.app` executables to
    /// the framework binary.
    ///
    /// # Errors
    ///
    /// Fails if either executable is missing or a tool invocation fails.
    pub fn fix_execs_for_framework_ext_or_pkg(&self, py_exec: &Path, app_exec: &Path) -> Result<()> {
        self.change_first_vendored(py_exec, "@executable_path/../Python")?;
        self.change_first_vendored(app_exec, "@executable_path/../../../../Python")
    }

    fn change_first_vendored(&self, executable: &Path, backref: &str) -> Result<()> {
        require_file(executable)?;
        match collect_references(self.shell, executable)?.into_iter().next() {
            Some(old) => self.shell.install_name_tool_change(&old, backref, executable),
            None => {
                debug!("no vendored reference in {}", executable.display());
                Ok(())
            }
        }
    }
}

fn require_file(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(BuildError::invariant(format!("{} does not exist", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::RecordingRunner;
    use std::sync::Arc;

    fn recording_shell() -> (Arc<RecordingRunner>, Shell) {
        let runner = Arc::new(RecordingRunner::new());
        (runner.clone(), Shell::new(runner))
    }

    fn otool_listing(binary: &str, refs: &[&str]) -> String {
        let mut out = format!("{binary}:\n");
        for r in refs {
            out.push_str(&format!(
                "\t{r} (compatibility version 1.0.0, current version 1.0.0)\n"
            ));
        }
        out
    }

    #[test]
    fn test_classification_examples() {
        for vendored in [
            "",
            "/usr/local/lib/libfoo.dylib",
            "/opt/local/foo",
            "/Users/x/foo",
            "/tmp/foo",
        ] {
            assert_eq!(classify_reference(vendored), RefKind::Vendored, "{vendored}");
        }
        for system in [
            "/usr/lib/libSystem.B.dylib",
            "/System/Library/Frameworks/CoreFoundation.framework/CoreFoundation",
            "@rpath/libfoo.dylib",
            "/usr/localfoo",
        ] {
            assert_eq!(classify_reference(system), RefKind::System, "{system}");
        }
    }

    #[test]
    fn test_parse_otool_skips_header() {
        let listing = otool_listing(
            "/usr/local/bin/python3.9",
            &["/usr/local/lib/libpython3.9.dylib", "/usr/lib/libSystem.B.dylib"],
        );
        assert_eq!(
            parse_otool_output(&listing),
            vec!["/usr/local/lib/libpython3.9.dylib", "/usr/lib/libSystem.B.dylib"]
        );
    }

    #[test]
    fn test_collect_references_keeps_vendored_in_order() {
        let (runner, shell) = recording_shell();
        runner.script(
            "otool",
            "/work/bin/app",
            &otool_listing(
                "/work/bin/app",
                &[
                    "/usr/local/lib/libb.dylib",
                    "/usr/lib/libSystem.B.dylib",
                    "liba.dylib",
                    "/opt/local/lib/libc.dylib",
                ],
            ),
        );
        let refs = collect_references(&shell, Path::new("/work/bin/app")).unwrap();
        assert_eq!(
            refs,
            vec!["/usr/local/lib/libb.dylib", "liba.dylib", "/opt/local/lib/libc.dylib"]
        );
    }

    #[test]
    fn test_closure_terminates_on_cycle() {
        let (runner, shell) = recording_shell();
        let a = "/usr/local/lib/libA.dylib";
        let b = "/usr/local/lib/libB.dylib";
        runner.script("otool", a, &otool_listing(a, &[a, b]));
        runner.script("otool", b, &otool_listing(b, &[b, a]));

        let mut dm = DependencyManager::new(&shell, a);
        dm.collect_closure().unwrap();

        assert_eq!(dm.deps(), &[a.to_string(), b.to_string()]);
        assert_eq!(runner.calls_to("otool").len(), 2);
        assert_eq!(
            dm.install_names()["libB.dylib"],
            vec![
                (b.to_string(), "@rpath/libB.dylib".to_string()),
                (a.to_string(), "@rpath/libA.dylib".to_string()),
            ]
        );
    }

    #[test]
    fn test_bare_filename_resolves_to_usr_local_lib() {
        let (runner, shell) = recording_shell();
        runner.script("otool", "/work/app", &otool_listing("/work/app", &["libz9.dylib"]));

        let mut dm = DependencyManager::new(&shell, "/work/app");
        dm.collect_closure().unwrap();
        assert_eq!(dm.deps(), &["/usr/local/lib/libz9.dylib".to_string()]);
        assert_eq!(
            dm.install_names()["app"],
            vec![(
                "/usr/local/lib/libz9.dylib".to_string(),
                "@rpath/libz9.dylib".to_string()
            )]
        );
    }

    #[test]
    fn test_rewrite_uses_id_for_self_reference() {
        let (runner, shell) = recording_shell();
        let a = "/usr/local/lib/libA.dylib";
        let b = "/usr/local/lib/libB.dylib";
        runner.script("otool", a, &otool_listing(a, &[a, b]));
        runner.script("otool", b, &otool_listing(b, &[b]));

        let mut dm = DependencyManager::new(&shell, a);
        dm.collect_closure().unwrap();
        dm.rewrite_references(Path::new("/dest")).unwrap();

        let calls: Vec<Vec<String>> = runner
            .calls_to("install_name_tool")
            .into_iter()
            .map(|c| c.args)
            .collect();
        assert_eq!(
            calls,
            vec![
                vec!["-id", "@rpath/libA.dylib", "/dest/libA.dylib"],
                vec!["-change", b, "@rpath/libB.dylib", "/dest/libA.dylib"],
                vec!["-id", "@rpath/libB.dylib", "/dest/libB.dylib"],
            ]
        );
    }

    #[test]
    fn test_rpath_added_after_rewrites() {
        let (runner, shell) = recording_shell();
        let app = "/usr/local/bin/app";
        runner.script("otool", app, &otool_listing(app, &["/usr/local/lib/libB.dylib"]));

        let mut dm = DependencyManager::new(&shell, app).with_rpath("@executable_path/../lib");
        dm.collect_closure().unwrap();
        dm.rewrite_references(Path::new("/dest")).unwrap();

        let calls = runner.calls_to("install_name_tool");
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1].args,
            vec!["-add_rpath", "@executable_path/../lib", "/dest/app"]
        );
    }

    #[test]
    fn test_mirror_without_dir_is_config_error() {
        let (_, shell) = recording_shell();
        let dm = DependencyManager::new(&shell, "/work/app");
        assert!(matches!(dm.mirror_static_libs(), Err(BuildError::Config(_))));
    }

    #[test]
    fn test_static_candidates_strip_versions() {
        assert_eq!(
            static_candidates(Path::new("/usr/local/lib/libfoo.1.2.dylib")),
            vec![
                PathBuf::from("/usr/local/lib/libfoo.1.2.a"),
                PathBuf::from("/usr/local/lib/libfoo.1.a"),
                PathBuf::from("/usr/local/lib/libfoo.a"),
            ]
        );
        assert_eq!(
            static_candidates(Path::new("/usr/local/lib/libpython3.9.dylib"))[0],
            PathBuf::from("/usr/local/lib/libpython3.9.a")
        );
        assert!(static_candidates(Path::new("/usr/local/lib/libfoo.so")).is_empty());
    }

    #[test]
    fn test_layout_ids() {
        assert_eq!(
            Layout::SharedPkg.dylib_id("3.9", false),
            "@loader_path/../../../../support/python3.9/lib/libpython3.9.dylib"
        );
        assert_eq!(
            Layout::SharedPkg.dylib_id("3.9", true),
            "@loader_path/../../../../support/python3.9/libpython3.9.dylib"
        );
        assert_eq!(
            Layout::SharedExt.dylib_id("3.9", false),
            "@loader_path/../Resources/lib/python3.9/libpython3.9.dylib"
        );
        assert_eq!(
            Layout::FrameworkPkg.dylib_id("3.9", false),
            "@loader_path/../../../../support/Python.framework/Versions/3.9/Python"
        );
        assert_eq!(
            Layout::FrameworkExt.dylib_id("3.9", false),
            "@loader_path/../Resources/Python.framework/Versions/3.9/Python"
        );
    }

    #[test]
    fn test_fixer_missing_dylib_is_invariant_error() {
        let (runner, shell) = recording_shell();
        let err = Fixer::new(&shell)
            .fix_dylib_for_framework_ext(Path::new("/nonexistent/Python"), "3.9")
            .unwrap_err();
        assert!(matches!(err, BuildError::Invariant(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_fix_execs_for_framework() {
        let dir = tempfile::tempdir().unwrap();
        let py_exec = dir.path().join("python3.9");
        let app_exec = dir.path().join("Python");
        std::fs::write(&py_exec, "").unwrap();
        std::fs::write(&app_exec, "").unwrap();

        let (runner, shell) = recording_shell();
        let built = "/Users/me/build/lib/Python.framework/Versions/3.9/Python";
        let py = py_exec.to_string_lossy().into_owned();
        let app = app_exec.to_string_lossy().into_owned();
        runner.script("otool", &py, &otool_listing(&py, &[built, "/usr/lib/libSystem.B.dylib"]));
        runner.script("otool", &app, &otool_listing(&app, &[built]));

        Fixer::new(&shell)
            .fix_execs_for_framework_ext_or_pkg(&py_exec, &app_exec)
            .unwrap();

        let changes: Vec<Vec<String>> = runner
            .calls_to("install_name_tool")
            .into_iter()
            .map(|c| c.args)
            .collect();
        assert_eq!(
            changes,
            vec![
                vec!["-change", built, "@executable_path/../Python", py.as_str()],
                vec!["-change", built, "@executable_path/../../../../Python", app.as_str()],
            ]
        );
    }
}
