use crate::env::Environment;
use crate::error::ExecutionError;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};

/// Command that is not a builtin, resolved to an executable.
pub(crate) struct ExternalCommand {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalCommand {
    /// Resolve `name` against the session's `PATH` and working directory.
    ///
    /// The command name is used verbatim; `$ls` stays `$ls` and is not found.
    pub fn resolve(
        name: &str,
        args: Vec<String>,
        env: &Environment,
    ) -> Result<Self, ExecutionError> {
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let program = find_command_path(
            OsStr::new(search_paths),
            &env.current_dir,
            Path::new(name),
        )
        .ok_or_else(|| ExecutionError::CommandNotFound {
            command: name.to_owned(),
        })?
        .into_owned();
        tracing::debug!(command = name, executable = %program.display(), "resolved external command");
        Ok(Self {
            name: name.to_owned(),
            program,
            args,
        })
    }

    /// Start the process. It sees exactly the session's variables and directory.
    pub fn spawn(
        self,
        stdin: Stdio,
        stdout: Stdio,
        env: &Environment,
    ) -> Result<RunningStage, ExecutionError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env_clear()
            .envs(&env.vars)
            .current_dir(&env.current_dir)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                command: self.name.clone(),
                source,
            })?;
        tracing::debug!(command = %self.name, pid = child.id(), "started");
        Ok(RunningStage {
            command: self.name,
            child,
        })
    }
}

/// A started pipeline stage that has not been waited for yet.
pub(crate) struct RunningStage {
    command: String,
    child: Child,
}

impl RunningStage {
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Take the read end of the stage's piped stdout.
    pub fn take_stdout(&mut self) -> Result<ChildStdout, ExecutionError> {
        self.child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::Pipe {
                command: self.command.clone(),
            })
    }

    /// Wait for the process; anything but a zero exit is a failure of this stage.
    pub fn wait(mut self) -> Result<(), ExecutionError> {
        let status = self.child.wait().map_err(|source| ExecutionError::Wait {
            command: self.command.clone(),
            source,
        })?;
        tracing::debug!(command = %self.command, %status, "exited");
        if status.success() {
            Ok(())
        } else {
            Err(ExecutionError::Exit {
                command: self.command,
                status,
            })
        }
    }

    /// Kill and reap the process.
    fn abort(mut self) {
        if let Err(e) = self.child.kill() {
            tracing::warn!(command = %self.command, "failed to kill: {}", e);
        }
        if let Err(e) = self.child.wait() {
            tracing::warn!(command = %self.command, "failed to reap: {}", e);
        }
    }
}

/// Started stages of one pipeline, joined in stage order.
///
/// Whatever has not been joined when this is dropped is killed and reaped, so
/// an early return on any failure path leaves no process behind.
#[derive(Default)]
pub(crate) struct RunningPipeline {
    stages: VecDeque<RunningStage>,
}

impl RunningPipeline {
    pub fn push(&mut self, stage: RunningStage) {
        self.stages.push_back(stage);
    }

    /// Wait for every stage in order, stopping at the first failure.
    pub fn join(&mut self) -> Result<(), ExecutionError> {
        while let Some(stage) = self.stages.pop_front() {
            stage.wait()?;
        }
        Ok(())
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        for stage in self.stages.drain(..) {
            tracing::debug!(command = stage.command(), "aborting");
            stage.abort();
        }
    }
}

/// Shell-style exit code for a process that ended without one.
#[cfg(unix)]
pub fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
pub fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh`): resolved against `cwd`.
/// - `./foo` on Unix or any path on other platforms: returns `cwd/foo` if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first executable file.
/// - Empty path: returns `None`.
pub fn find_command_path<'a>(
    search_paths: &OsStr,
    cwd: &Path,
    path: &'a Path,
) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir {
        if let Some(found) = find_by_path(&cwd.join(path)) {
            return Some(Cow::Owned(found.to_owned()));
        }
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, None) => None,
        // Single component -> search in PATH
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        // Multiple components -> search in current dir
        _ => find_by_path(&cwd.join(path)).map(|p| Cow::Owned(p.to_owned())),
    }
}

/// Empty entries are skipped; they would otherwise resolve against the host
/// process's directory rather than the session's.
fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(cmd))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::fs;
    use std::fs::File;

    #[cfg(unix)]
    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("external_tests_{}_{}", std::process::id(), tag));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let res = find_command_path(osstr("/bin"), Path::new("/"), path);
        let found = res.expect("Expected to find /bin/sh via absolute path");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    #[cfg(unix)]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        let res = find_command_path(osstr("/bin"), Path::new("/"), path);
        assert!(
            res.is_none(),
            "Expected not to find /bin/nonexisting via absolute path"
        );
    }

    #[test]
    #[cfg(unix)]
    fn single_component_found_in_path() {
        let res = find_command_path(osstr("/nonexisting:/bin"), Path::new("/"), Path::new("sh"));
        let found = res.expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
    }

    #[test]
    #[cfg(unix)]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("/"), Path::new("nonexisting"));
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    #[cfg(unix)]
    fn single_component_ignores_cwd() {
        let dir = scratch_dir("no_cwd");
        File::create(dir.join("tool")).expect("touch tool");
        let res = find_command_path(osstr("/nonexisting"), &dir, Path::new("tool"));
        assert!(res.is_none(), "bare names must only be searched in PATH");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn multiple_components_relative_existing() {
        let dir = scratch_dir("mc");
        fs::create_dir_all(dir.join("bin")).expect("create temp bin dir");
        File::create(dir.join("bin").join("sh")).expect("touch bin/sh");

        let res = find_command_path(osstr("/does/not/matter"), &dir, Path::new("bin/sh"));
        let found = res.expect("Expected to find relative 'bin/sh' in session dir");
        assert_eq!(found.as_ref(), dir.join("bin/sh"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn current_dir_with_dot_prefix() {
        let dir = scratch_dir("dot");
        File::create(dir.join("foo")).expect("touch foo");

        let res = find_command_path(osstr("/bin"), &dir, Path::new("./foo"));
        let found = res.expect("Expected to find './foo' in session dir");
        assert_eq!(found.as_ref(), dir.join("./foo"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn path_search_skips_non_executable_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = scratch_dir("exec_bits");
        let (first, second) = (dir.join("first"), dir.join("second"));
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        File::create(first.join("tool")).expect("touch first/tool");
        File::create(second.join("tool")).expect("touch second/tool");
        fs::set_permissions(second.join("tool"), fs::Permissions::from_mode(0o755)).unwrap();

        let search = std::env::join_paths([&first, &second]).unwrap();
        let found = find_command_path(&search, Path::new("/"), Path::new("tool"))
            .expect("executable later in PATH");
        assert_eq!(found.as_ref(), second.join("tool"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn empty_path_entries_are_skipped() {
        // The test process runs from the crate root, where `Cargo.toml` is a file.
        assert!(Path::new("Cargo.toml").is_file());
        for search in ["", ":", "/nonexisting::/nonexisting"] {
            let res = find_command_path(osstr(search), Path::new("/"), Path::new("Cargo.toml"));
            assert!(res.is_none(), "{:?} resolved through the host cwd", search);
        }
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn dropping_pipeline_kills_and_reaps_stages() {
        let mut env = Environment::empty("/");
        env.set_var("PATH", "/bin:/usr/bin");
        let stage = ExternalCommand::resolve("sleep", vec!["30".into()], &env)
            .expect("sleep on PATH")
            .spawn(Stdio::null(), Stdio::null(), &env)
            .expect("spawn sleep");
        let proc_entry = PathBuf::from(format!("/proc/{}", stage.child.id()));
        assert!(proc_entry.exists());

        let mut running = RunningPipeline::default();
        running.push(stage);
        let started = std::time::Instant::now();
        drop(running);

        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert!(!proc_entry.exists(), "stage still present after drop");
    }

    #[test]
    fn empty_path_is_none() {
        let res = find_command_path(OsStr::new("/bin"), Path::new("/"), Path::new(""));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }

    #[test]
    fn unexpanded_variable_is_not_found() {
        let mut env = Environment::empty("/");
        env.set_var("PATH", "/bin:/usr/bin");
        let err = ExternalCommand::resolve("$ls", Vec::new(), &env)
            .err()
            .expect("no such command");
        assert!(matches!(err, ExecutionError::CommandNotFound { ref command } if command == "$ls"));
    }

    #[test]
    #[cfg(unix)]
    fn missing_path_variable_finds_nothing() {
        let env = Environment::empty("/");
        assert!(ExternalCommand::resolve("sh", Vec::new(), &env).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn signal_exit_codes() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(terminated_by_signal(ExitStatus::from_raw(15)), 128 + 15);
    }
}
