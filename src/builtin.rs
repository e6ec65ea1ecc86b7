use crate::env::Environment;
use anyhow::anyhow;
use argh::{EarlyExit, FromArgs};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Failure of a built-in command.
#[derive(Debug, Error)]
pub enum BuiltinError {
    /// Wrong number or shape of arguments. Carries the usage message.
    #[error("{0}")]
    Usage(String),
    /// Writing to the shell's output failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The command ran and failed, e.g. a path could not be read.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// A command implemented inside the shell.
///
/// Built-ins never receive piped input; whatever they write goes to `stdout`,
/// which is either the shell's own standard output or a capture buffer.
pub trait BuiltinHandler {
    fn run(
        &self,
        args: &[&str],
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<(), BuiltinError>;
}

impl<F> BuiltinHandler for F
where
    F: Fn(&[&str], &mut dyn Write, &mut Environment) -> Result<(), BuiltinError>,
{
    fn run(
        &self,
        args: &[&str],
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<(), BuiltinError> {
        self(args, stdout, env)
    }
}

/// Built-in whose arguments are parsed with [`argh`].
pub trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cat" or "cd".
    fn name() -> &'static str;

    /// Executes the command with already-parsed arguments.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError>;
}

/// Adapts a [`BuiltinCommand`] to the [`BuiltinHandler`] interface.
pub(crate) struct Factory<T> {
    _phantom: PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand> BuiltinHandler for Factory<T> {
    fn run(
        &self,
        args: &[&str],
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<(), BuiltinError> {
        match T::from_args(&[T::name()], args) {
            Ok(cmd) => cmd.execute(stdout, env),
            // `--help`
            Err(EarlyExit {
                output,
                status: Ok(()),
            }) => {
                writeln!(stdout, "{}", output.trim_end())?;
                Ok(())
            }
            Err(EarlyExit {
                output,
                status: Err(()),
            }) => Err(BuiltinError::Usage(output.trim_end().to_owned())),
        }
    }
}

/// Mapping from command name to handler.
///
/// The executor consults the registry only for the last stage of a pipeline.
pub struct BuiltinRegistry {
    handlers: HashMap<String, Box<dyn BuiltinHandler>>,
}

impl BuiltinRegistry {
    /// A registry with no built-ins; every command is external.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A registry with `cd`, `ls`, `rm`, `cat`, `cp`, `env` and `clear`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register::<Cd>();
        registry.register::<Ls>();
        registry.register::<Rm>();
        registry.register::<Cat>();
        registry.register::<Cp>();
        registry.register::<PrintEnv>();
        registry.register::<Clear>();
        registry
    }

    /// Register an argh-parsed built-in under its canonical name.
    pub fn register<T: BuiltinCommand + 'static>(&mut self) -> Option<Box<dyn BuiltinHandler>> {
        self.register_handler(T::name(), Factory::<T>::default())
    }

    /// Register `handler` under `name`, returning the handler it replaces.
    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        handler: impl BuiltinHandler + 'static,
    ) -> Option<Box<dyn BuiltinHandler>> {
        self.handlers.insert(name.into(), Box::new(handler))
    }

    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn BuiltinHandler>> {
        self.handlers.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn BuiltinHandler> {
        self.handlers.get(name).map(|handler| handler.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[derive(FromArgs)]
/// Change the current working directory of the shell.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: String,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError> {
        let canonical = fs::canonicalize(env.resolve(&self.target))
            .map_err(|e| anyhow!("cannot change directory to '{}': {}", self.target, e))?;
        if !canonical.is_dir() {
            return Err(anyhow!(
                "cannot change directory to '{}': not a directory",
                self.target
            )
            .into());
        }
        // Without search permission nothing could be started from there.
        fs::metadata(canonical.join("."))
            .map_err(|e| anyhow!("cannot change directory to '{}': {}", self.target, e))?;
        env.set_var("PWD", canonical.to_string_lossy());
        env.current_dir = canonical;
        Ok(())
    }
}

#[derive(FromArgs)]
/// List the entries of a directory, one per line.
pub struct Ls {
    #[argh(positional)]
    /// directory to list. Defaults to the current directory.
    pub dir: Option<String>,
}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError> {
        let dir = self.dir.as_deref().unwrap_or(".");
        let mut names = fs::read_dir(env.resolve(dir))
            .and_then(|entries| {
                entries
                    .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
                    .collect::<io::Result<Vec<_>>>()
            })
            .map_err(|e| anyhow!("cannot access '{}': {}", dir, e))?;
        names.sort_unstable();
        for name in names {
            writeln!(stdout, "{}", name)?;
        }
        Ok(())
    }
}

#[derive(FromArgs)]
/// Remove files or directories recursively.
/// Stops at the first target that cannot be removed.
pub struct Rm {
    #[argh(positional, greedy)]
    /// files or directories to remove.
    pub targets: Vec<String>,
}

impl BuiltinCommand for Rm {
    fn name() -> &'static str {
        "rm"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError> {
        if self.targets.is_empty() {
            return Err(BuiltinError::Usage("usage: rm <target>...".into()));
        }
        for target in &self.targets {
            remove_recursive(&env.resolve(target))
                .map_err(|e| anyhow!("cannot remove '{}': {}", target, e))?;
        }
        Ok(())
    }
}

fn remove_recursive(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[derive(FromArgs)]
/// Print the contents of files to standard output.
/// Stops at the first file that cannot be read.
pub struct Cat {
    #[argh(positional, greedy)]
    /// files to print in order.
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError> {
        if self.files.is_empty() {
            return Err(BuiltinError::Usage("usage: cat <file>...".into()));
        }
        for file in &self.files {
            let data = fs::read(env.resolve(file))
                .map_err(|e| anyhow!("cannot read file '{}': {}", file, e))?;
            stdout.write_all(&data)?;
        }
        Ok(())
    }
}

#[derive(FromArgs)]
/// Copy a file to a new location.
pub struct Cp {
    #[argh(positional)]
    /// file to copy from.
    pub source: String,

    #[argh(positional)]
    /// file to create or overwrite.
    pub destination: String,
}

impl BuiltinCommand for Cp {
    fn name() -> &'static str {
        "cp"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError> {
        let mut source = File::open(env.resolve(&self.source))
            .map_err(|e| anyhow!("cannot open source file '{}': {}", self.source, e))?;
        // A failed copy leaves the partially written destination in place.
        let mut destination = File::create(env.resolve(&self.destination)).map_err(|e| {
            anyhow!(
                "cannot create destination file '{}': {}",
                self.destination,
                e
            )
        })?;
        io::copy(&mut source, &mut destination).map_err(|e| {
            anyhow!(
                "error copying from '{}' to '{}': {}",
                self.source,
                self.destination,
                e
            )
        })?;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Print all variables as NAME=VALUE, sorted by name.
pub struct PrintEnv {}

impl BuiltinCommand for PrintEnv {
    fn name() -> &'static str {
        "env"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError> {
        for (name, value) in env.sorted_vars() {
            writeln!(stdout, "{}={}", name, value)?;
        }
        Ok(())
    }
}

#[derive(FromArgs)]
/// Clear the terminal screen.
pub struct Clear {}

impl BuiltinCommand for Clear {
    fn name() -> &'static str {
        "clear"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError> {
        let output = clear_command()
            .env_clear()
            .envs(&env.vars)
            .current_dir(&env.current_dir)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| anyhow!("cannot clear screen: {}", e))?;
        stdout.write_all(&output.stdout)?;
        if !output.status.success() {
            return Err(anyhow!("cannot clear screen: {}", output.status).into());
        }
        Ok(())
    }
}

#[cfg(windows)]
fn clear_command() -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/c", "cls"]);
    cmd
}

#[cfg(not(windows))]
fn clear_command() -> Command {
    Command::new("clear")
}
