//! External command execution and filesystem helpers.
//!
//! Commands are argument vectors with an explicit working directory. The
//! process working directory is never changed.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use crate::error::{BuildError, Result};

/// A single external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    /// Program name or path.
    pub program: String,
    /// Arguments, passed verbatim without shell interpretation.
    pub args: Vec<String>,
    /// Working directory; the caller's when `None`.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Inherit stdout and stderr instead of capturing them.
    pub stream: bool,
}

impl Cmd {
    /// Start a command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            stream: false,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument.
    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in `dir`.
    pub fn cwd(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Set an environment variable for this command only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Let the child write straight to the terminal.
    ///
    /// Used for long compiler runs whose progress should be visible.
    pub fn stream(mut self) -> Self {
        self.stream = true;
        self
    }

    /// The last argument, usually the file being operated on.
    pub fn last_arg(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.env {
            write!(f, "{k}={v} ")?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

/// Executes commands. Swapped out in tests to observe calls.
pub trait Runner: fmt::Debug {
    /// Run `cmd` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ToolNotFound`] if the program does not exist and
    /// [`BuildError::CommandFailed`] on a non-zero exit.
    fn run(&self, cmd: &Cmd) -> Result<CmdOutput>;
}

/// Spawns real processes and waits for them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl Runner for ProcessRunner {
    fn run(&self, cmd: &Cmd) -> Result<CmdOutput> {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }
        for (k, v) in &cmd.env {
            command.env(k, v);
        }

        if cmd.stream {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            let status = command.status().map_err(|e| spawn_error(cmd, e))?;
            if !status.success() {
                error!("command failed: {cmd}");
                return Err(BuildError::CommandFailed {
                    program: cmd.program.clone(),
                    args: cmd.args.clone(),
                    status: status.to_string(),
                    stderr: String::new(),
                });
            }
            return Ok(CmdOutput::default());
        }

        let output = command.output().map_err(|e| spawn_error(cmd, e))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            error!("command failed: {cmd}\n{stdout}{stderr}");
            return Err(BuildError::CommandFailed {
                program: cmd.program.clone(),
                args: cmd.args.clone(),
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(CmdOutput { stdout, stderr })
    }
}

fn spawn_error(cmd: &Cmd, e: std::io::Error) -> BuildError {
    if e.kind() == std::io::ErrorKind::NotFound {
        BuildError::ToolNotFound {
            program: cmd.program.clone(),
        }
    } else {
        e.into()
    }
}

/// Records every command instead of running it.
///
/// Output can be scripted per `(program, last argument)` pair, which is how
/// tests feed synthetic `otool -L` listings to the relocation code.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Cmd>>,
    outputs: Mutex<HashMap<(String, String), String>>,
}

impl RecordingRunner {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `stdout` whenever `program` runs with `last_arg` as its final argument.
    pub fn script(&self, program: &str, last_arg: &str, stdout: &str) {
        self.outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((program.to_string(), last_arg.to_string()), stdout.to_string());
    }

    /// All commands run so far, in order.
    pub fn calls(&self) -> Vec<Cmd> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Commands run so far for one program.
    pub fn calls_to(&self, program: &str) -> Vec<Cmd> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }
}

impl Runner for RecordingRunner {
    fn run(&self, cmd: &Cmd) -> Result<CmdOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cmd.clone());
        let key = (
            cmd.program.clone(),
            cmd.last_arg().unwrap_or_default().to_string(),
        );
        let stdout = self
            .outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .unwrap_or_default();
        Ok(CmdOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

/// Resolve every program on `PATH` before any stage runs.
///
/// # Errors
///
/// Returns [`BuildError::ToolNotFound`] for the first missing program.
pub fn require_tools(programs: &[&str]) -> Result<()> {
    for program in programs {
        match which::which(program) {
            Ok(path) => debug!("found {program} at {}", path.display()),
            Err(_) => {
                return Err(BuildError::ToolNotFound {
                    program: (*program).to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Command runner plus the file operations builders need.
#[derive(Debug, Clone)]
pub struct Shell {
    runner: Arc<dyn Runner>,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new(Arc::new(ProcessRunner))
    }
}

impl Shell {
    /// Wrap a runner.
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self { runner }
    }

    /// Log and run a command.
    ///
    /// # Errors
    ///
    /// Propagates the runner's error unchanged.
    pub fn run(&self, cmd: &Cmd) -> Result<CmdOutput> {
        match &cmd.cwd {
            Some(dir) => info!("{cmd}  (in {})", dir.display()),
            None => info!("{cmd}"),
        }
        self.runner.run(cmd)
    }

    /// Set permission bits on `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist.
    pub fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        debug!("chmod {mode:o} {}", path.display());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
        }
        Ok(())
    }

    /// Copy a file or directory tree, overwriting what is already there.
    ///
    /// # Errors
    ///
    /// Returns an error if `src` is missing or the copy fails.
    pub fn copy(&self, src: &Path, dst: &Path) -> Result<()> {
        info!("copying {} to {}", src.display(), dst.display());
        if src.is_dir() {
            std::fs::create_dir_all(dst)?;
            fs_extra::dir::copy(
                src,
                dst,
                &fs_extra::dir::CopyOptions::new()
                    .content_only(true)
                    .overwrite(true),
            )?;
        } else {
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(src, dst)?;
        }
        Ok(())
    }

    /// Move a file or directory, falling back to copy and delete across volumes.
    ///
    /// # Errors
    ///
    /// Returns an error if `src` is missing or neither strategy succeeds.
    pub fn move_path(&self, src: &Path, dst: &Path) -> Result<()> {
        info!("moving {} to {}", src.display(), dst.display());
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if std::fs::rename(src, dst).is_err() {
            self.copy(src, dst)?;
            self.remove(src)?;
        }
        Ok(())
    }

    /// Remove a file, symlink or directory tree. A missing path is only logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the path exists but cannot be removed.
    pub fn remove(&self, path: &Path) -> Result<()> {
        let Ok(meta) = path.symlink_metadata() else {
            warn!("remove skipped, path does not exist: {}", path.display());
            return Ok(());
        };
        info!("removing {}", path.display());
        if meta.is_dir() {
            std::fs::remove_dir_all(path)?;
        } else {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Create `link` as a symbolic link pointing at `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if `link` already exists or cannot be created.
    pub fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        info!("linking {} -> {}", link.display(), target.display());
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, link)?;
        #[cfg(not(unix))]
        warn!("symlinks unsupported here, {} not created", link.display());
        Ok(())
    }

    /// Create a directory and its parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn makedirs(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    /// Remove every entry under `dir` matching one of the glob `patterns`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid pattern, or an IO error
    /// if a match cannot be removed.
    pub fn glob_remove(&self, dir: &Path, patterns: &[String]) -> Result<()> {
        for pattern in patterns {
            let full = dir.join(pattern);
            let matches = glob::glob(&full.to_string_lossy())
                .map_err(|e| BuildError::config(format!("bad glob '{pattern}': {e}")))?;
            for path in matches.filter_map(std::result::Result::ok) {
                self.remove(&path)?;
            }
        }
        Ok(())
    }

    /// Remove every entry under `root` for which `matches` returns true.
    ///
    /// Directories named in `skip` are neither removed nor descended into.
    ///
    /// # Errors
    ///
    /// Returns an error if traversal or removal fails.
    pub fn recursive_clean<F>(&self, root: &Path, skip: &[&str], matches: F) -> Result<usize>
    where
        F: Fn(&walkdir::DirEntry) -> bool,
    {
        if !root.exists() {
            warn!("clean skipped, path does not exist: {}", root.display());
            return Ok(0);
        }
        let mut doomed = Vec::new();
        let mut walker = walkdir::WalkDir::new(root).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() && skip.contains(&name.as_ref()) {
                walker.skip_current_dir();
                continue;
            }
            if matches(&entry) {
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                doomed.push(entry.into_path());
            }
        }
        for path in &doomed {
            self.remove(path)?;
        }
        Ok(doomed.len())
    }

    /// `install_name_tool -id <new_id> <target>`
    ///
    /// # Errors
    ///
    /// Fails if the tool is missing or exits non-zero.
    pub fn install_name_tool_id(&self, new_id: &str, target: &Path) -> Result<()> {
        self.run(
            &Cmd::new("install_name_tool")
                .args(["-id", new_id])
                .arg_path(target),
        )?;
        Ok(())
    }

    /// `install_name_tool -change <old> <new> <target>`
    ///
    /// # Errors
    ///
    /// Fails if the tool is missing or exits non-zero.
    pub fn install_name_tool_change(&self, old: &str, new: &str, target: &Path) -> Result<()> {
        self.run(
            &Cmd::new("install_name_tool")
                .args(["-change", old, new])
                .arg_path(target),
        )?;
        Ok(())
    }

    /// `install_name_tool -add_rpath <rpath> <target>`
    ///
    /// # Errors
    ///
    /// Fails if the tool is missing or exits non-zero.
    pub fn install_name_tool_add_rpath(&self, rpath: &str, target: &Path) -> Result<()> {
        self.run(
            &Cmd::new("install_name_tool")
                .args(["-add_rpath", rpath])
                .arg_path(target),
        )?;
        Ok(())
    }

    /// Raw `otool -L` listing for `target`.
    ///
    /// # Errors
    ///
    /// Fails if the tool is missing or exits non-zero.
    pub fn otool_l(&self, target: &Path) -> Result<String> {
        Ok(self.run(&Cmd::new("otool").arg("-L").arg_path(target))?.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn recording_shell() -> (Arc<RecordingRunner>, Shell) {
        let runner = Arc::new(RecordingRunner::new());
        (runner.clone(), Shell::new(runner))
    }

    #[test]
    fn test_cmd_display_quotes_spaces() {
        let cmd = Cmd::new("install_name_tool")
            .args(["-id", "@rpath/libfoo.dylib"])
            .arg("/Users/me/Max 8/libfoo.dylib")
            .env("MACOSX_DEPLOYMENT_TARGET", "10.13");
        assert_eq!(
            cmd.to_string(),
            "MACOSX_DEPLOYMENT_TARGET=10.13 install_name_tool -id @rpath/libfoo.dylib '/Users/me/Max 8/libfoo.dylib'"
        );
    }

    #[test]
    fn test_paths_with_spaces_stay_single_arguments() {
        let (runner, shell) = recording_shell();
        let target = Path::new("/tmp/with space/lib thing.dylib");
        shell
            .install_name_tool_change("/usr/local/lib/a b.dylib", "@rpath/a b.dylib", target)
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            vec![
                "-change",
                "/usr/local/lib/a b.dylib",
                "@rpath/a b.dylib",
                "/tmp/with space/lib thing.dylib"
            ]
        );
    }

    #[test]
    fn test_recording_runner_scripts_output() {
        let (runner, shell) = recording_shell();
        runner.script("otool", "/tmp/bin", "listing");
        assert_eq!(shell.otool_l(Path::new("/tmp/bin")).unwrap(), "listing");
        assert_eq!(shell.otool_l(Path::new("/tmp/other")).unwrap(), "");
        assert_eq!(runner.calls_to("otool").len(), 2);
    }

    #[test]
    fn test_process_runner_reports_missing_tool() {
        let err = ProcessRunner
            .run(&Cmd::new("definitely-not-a-real-tool-pyjs"))
            .unwrap_err();
        assert!(matches!(err, BuildError::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_non_zero_exit_is_fatal() {
        let err = ProcessRunner.run(&Cmd::new("false")).unwrap_err();
        assert!(matches!(err, BuildError::CommandFailed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_streamed_command_failure_is_fatal() {
        let err = ProcessRunner
            .run(&Cmd::new("sh").args(["-c", "echo building; exit 3"]).stream())
            .unwrap_err();
        assert!(matches!(err, BuildError::CommandFailed { status, .. } if status.contains('3')));
    }

    #[cfg(unix)]
    #[test]
    fn test_streamed_command_captures_nothing() {
        let out = ProcessRunner
            .run(&Cmd::new("echo").arg("configure output").stream())
            .unwrap();
        assert_eq!(out, CmdOutput::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_uses_cwd() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let out = ProcessRunner
            .run(&Cmd::new("ls").cwd(dir.path()))
            .unwrap();
        assert!(out.stdout.contains("marker"));
    }

    #[test]
    fn test_remove_missing_is_not_an_error() {
        let dir = tempdir().unwrap();
        Shell::default().remove(&dir.path().join("nope")).unwrap();
    }

    #[test]
    fn test_copy_and_move_trees() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested/file.py"), "x").unwrap();

        let shell = Shell::default();
        let copied = dir.path().join("copied");
        shell.copy(&src, &copied).unwrap();
        assert!(copied.join("nested/file.py").exists());
        assert!(src.join("nested/file.py").exists());

        let moved = dir.path().join("deep/moved");
        shell.move_path(&copied, &moved).unwrap();
        assert!(moved.join("nested/file.py").exists());
        assert!(!copied.exists());
    }

    #[test]
    fn test_recursive_clean_respects_skip() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for d in ["json/__pycache__", "site-packages/pkg/__pycache__", "email"] {
            std::fs::create_dir_all(root.join(d)).unwrap();
        }
        std::fs::write(root.join("email/x.pyc"), "").unwrap();
        std::fs::write(root.join("email/x.py"), "").unwrap();

        let removed = Shell::default()
            .recursive_clean(root, &["site-packages"], |e| {
                let name = e.file_name().to_string_lossy();
                name == "__pycache__" || name.ends_with(".pyc")
            })
            .unwrap();

        assert_eq!(removed, 2);
        assert!(!root.join("json/__pycache__").exists());
        assert!(!root.join("email/x.pyc").exists());
        assert!(root.join("email/x.py").exists());
        assert!(root.join("site-packages/pkg/__pycache__").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_points_at_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("py-js");
        std::fs::create_dir_all(&target).unwrap();
        let link = dir.path().join("link");

        let shell = Shell::default();
        shell.symlink(&target, &link).unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), target);
        assert!(shell.symlink(&target, &link).is_err());
    }

    #[test]
    fn test_glob_remove() {
        let dir = tempdir().unwrap();
        for f in ["libtcl8.6.dylib", "tk8.6", "libssl.a"] {
            std::fs::write(dir.path().join(f), "").unwrap();
        }
        Shell::default()
            .glob_remove(dir.path(), &["libtcl*".to_string(), "tk*".to_string()])
            .unwrap();
        assert!(!dir.path().join("libtcl8.6.dylib").exists());
        assert!(!dir.path().join("tk8.6").exists());
        assert!(dir.path().join("libssl.a").exists());
    }

    #[test]
    fn test_require_tools_missing() {
        let err = require_tools(&["definitely-not-a-real-tool-pyjs"]).unwrap_err();
        assert!(matches!(err, BuildError::ToolNotFound { program } if program == "definitely-not-a-real-tool-pyjs"));
    }
}
