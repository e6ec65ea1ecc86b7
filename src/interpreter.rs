use crate::builtin::BuiltinRegistry;
use crate::command::{Assignment, Pipeline};
use crate::env::Environment;
use crate::error::ExecutionError;
use crate::expand::expand_variables;
use crate::external::{ExternalCommand, RunningPipeline};
use crate::lexer;
use std::io::{self, Write};
use std::process::{ChildStdout, Stdio};

/// Where the last stage of a pipeline writes.
enum Sink<'a> {
    /// The shell's own stdout: external processes inherit the descriptor.
    Inherit(&'a mut dyn Write),
    /// A buffer: external output is piped through and copied into it.
    Capture(&'a mut dyn Write),
}

impl<'a> Sink<'a> {
    fn writer(&mut self) -> &mut (dyn Write + 'a) {
        match self {
            Sink::Inherit(w) | Sink::Capture(w) => &mut **w,
        }
    }

    fn stdio(&self) -> Stdio {
        match self {
            Sink::Inherit(_) => Stdio::inherit(),
            Sink::Capture(_) => Stdio::piped(),
        }
    }

    fn is_captured(&self) -> bool {
        matches!(self, Sink::Capture(_))
    }
}

/// Interprets command lines against one shell session.
///
/// A line is either an assignment (`NAME=VALUE` with no whitespace) or a
/// pipeline of stages separated by `|`. Built-ins are recognized only in the
/// last stage; every other stage runs as an external process.
///
/// Example
/// ```
/// use pipeshell::{BuiltinRegistry, Environment, Interpreter};
/// let mut sh = Interpreter::new(Environment::new(), BuiltinRegistry::with_defaults());
/// sh.execute("GREETING=hello").unwrap();
/// assert_eq!(sh.env().get_var("GREETING"), Some("hello"));
/// ```
pub struct Interpreter {
    env: Environment,
    builtins: BuiltinRegistry,
}

impl Interpreter {
    pub fn new(env: Environment, builtins: BuiltinRegistry) -> Self {
        Self { env, builtins }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    pub fn builtins_mut(&mut self) -> &mut BuiltinRegistry {
        &mut self.builtins
    }

    /// Execute one line, writing to the shell's stdout.
    pub fn execute(&mut self, line: &str) -> Result<(), ExecutionError> {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();
        let result = self.run_line(line, Sink::Inherit(&mut stdout));
        // Keep built-in output ordered with whatever the next command prints.
        if let Err(e) = stdout.flush() {
            tracing::warn!("failed to flush stdout: {}", e);
        }
        result
    }

    /// Execute one line, collecting the last stage's stdout into `stdout`.
    ///
    /// Standard error of external processes is still inherited.
    pub fn execute_with_output(
        &mut self,
        line: &str,
        stdout: &mut dyn Write,
    ) -> Result<(), ExecutionError> {
        self.run_line(line, Sink::Capture(stdout))
    }

    #[tracing::instrument(level = "debug", skip(self, sink), err)]
    fn run_line(&mut self, line: &str, mut sink: Sink<'_>) -> Result<(), ExecutionError> {
        if let Some(assignment) = Assignment::parse(line) {
            return self.assign(line, assignment);
        }
        let pipeline = lexer::split_into_stages(line);
        self.run_pipeline(&pipeline, &mut sink)
    }

    fn assign(&mut self, line: &str, assignment: Assignment<'_>) -> Result<(), ExecutionError> {
        if assignment.name.is_empty() {
            return Err(ExecutionError::InvalidAssignment {
                line: line.to_owned(),
            });
        }
        tracing::debug!(name = assignment.name, "assignment");
        self.env.set_var(assignment.name, assignment.value);
        Ok(())
    }

    fn run_pipeline(
        &mut self,
        pipeline: &Pipeline,
        sink: &mut Sink<'_>,
    ) -> Result<(), ExecutionError> {
        let mut running = RunningPipeline::default();
        // Read end of the previous stage's stdout.
        let mut conduit: Option<ChildStdout> = None;
        let mut captured: Option<(String, ChildStdout)> = None;

        for (index, stage) in pipeline.stages().iter().enumerate() {
            let Some(name) = stage.name() else {
                continue;
            };
            let args = expand_variables(stage.args(), &self.env);
            let is_last = pipeline.is_last(index);

            if is_last {
                if let Some(handler) = self.builtins.get(name) {
                    tracing::debug!(stage = index, command = name, "dispatching built-in");
                    // Built-ins take no piped input; upstream output is discarded.
                    if let Some(unread) = conduit.take() {
                        discard(unread);
                    }
                    running.join()?;
                    let args: Vec<&str> = args.iter().map(String::as_str).collect();
                    return handler
                        .run(&args, sink.writer(), &mut self.env)
                        .map_err(|source| ExecutionError::Builtin {
                            command: name.to_owned(),
                            source,
                        });
                }
            }

            tracing::debug!(stage = index, command = name, "dispatching external");
            let command = ExternalCommand::resolve(name, args, &self.env)?;
            let stdin = match conduit.take() {
                Some(previous) => Stdio::from(previous),
                None => Stdio::inherit(),
            };
            let stdout = if is_last { sink.stdio() } else { Stdio::piped() };
            let mut started = command.spawn(stdin, stdout, &self.env)?;
            let piped = (!is_last || sink.is_captured()).then(|| started.take_stdout());
            running.push(started);
            match piped {
                Some(Ok(output)) if !is_last => conduit = Some(output),
                Some(Ok(output)) => captured = Some((name.to_owned(), output)),
                Some(Err(e)) => return Err(e),
                None => {}
            }
        }

        // A trailing empty stage leaves the last conduit without a reader.
        if let Some(unread) = conduit.take() {
            discard(unread);
        }
        if let Some((command, mut output)) = captured {
            io::copy(&mut output, sink.writer())
                .map_err(|source| ExecutionError::Output { command, source })?;
        }
        running.join()
    }
}

impl Default for Interpreter {
    /// An interpreter over the host process environment with the default built-ins.
    fn default() -> Self {
        Self::new(Environment::new(), BuiltinRegistry::with_defaults())
    }
}

/// Read a conduit to end-of-stream so its writer is never blocked on a full pipe.
fn discard(mut unread: ChildStdout) {
    if let Err(e) = io::copy(&mut unread, &mut io::sink()) {
        tracing::warn!("failed to drain pipe: {}", e);
    }
}
