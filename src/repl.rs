use crate::error::ExecutionError;
use crate::interpreter::Interpreter;
use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;

/// The line that ends the loop. It never reaches the interpreter.
pub const EXIT_COMMAND: &str = "exit";
pub const FAREWELL: &str = "Exiting. Goodbye!";
pub const ERROR_PREFIX: &str = "[Error in Shell] Error:";

/// What the loop did with one line of input.
#[derive(Debug)]
pub enum Step {
    /// Blank line.
    Skipped,
    /// The exit command.
    Exit,
    /// The line went to the interpreter.
    Executed(Result<(), ExecutionError>),
}

/// User-facing text for a failed line.
pub fn error_message(err: &ExecutionError) -> String {
    format!("{} {}", ERROR_PREFIX, err)
}

/// Read-evaluate-print loop around an [`Interpreter`].
pub struct Repl {
    interpreter: Interpreter,
}

impl Repl {
    pub fn new(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// `<current-working-directory> >> `
    pub fn prompt(&self) -> String {
        format!("{} >> ", self.interpreter.env().current_dir.display())
    }

    /// Handle one raw input line, writing command output to the shell's stdout.
    pub fn process_line(&mut self, line: &str) -> Step {
        self.step(line, |sh, line| sh.execute(line))
    }

    /// Like [`Repl::process_line`], collecting command output into `stdout`.
    pub fn process_line_with_output(&mut self, line: &str, stdout: &mut dyn Write) -> Step {
        self.step(line, |sh, line| sh.execute_with_output(line, stdout))
    }

    fn step(
        &mut self,
        line: &str,
        execute: impl FnOnce(&mut Interpreter, &str) -> Result<(), ExecutionError>,
    ) -> Step {
        let line = line.trim();
        if line.is_empty() {
            Step::Skipped
        } else if line == EXIT_COMMAND {
            Step::Exit
        } else {
            Step::Executed(execute(&mut self.interpreter, line))
        }
    }

    /// Prompt and execute lines until `exit`, end of input, or Ctrl-C.
    ///
    /// Command failures are reported and the loop continues.
    pub fn run(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new().context("failed to create line editor")?;

        loop {
            match rl.readline(&self.prompt()) {
                Ok(line) => match self.process_line(&line) {
                    Step::Exit => {
                        println!("{}", FAREWELL);
                        break;
                    }
                    Step::Executed(Err(e)) => {
                        tracing::debug!(code = e.exit_code(), "command failed");
                        eprintln!("{}", error_message(&e));
                    }
                    Step::Executed(Ok(())) | Step::Skipped => {}
                },
                Err(ReadlineError::Eof) => {
                    println!("\n{}", FAREWELL);
                    break;
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C\n{}", FAREWELL);
                    break;
                }
                Err(err) => return Err(err).context("failed to read input"),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::BuiltinRegistry;
    use crate::env::Environment;
    use std::fs;

    fn repl_in(dir: &std::path::Path) -> Repl {
        let mut env = Environment::new();
        env.current_dir = dir.to_path_buf();
        Repl::new(Interpreter::new(env, BuiltinRegistry::with_defaults()))
    }

    #[test]
    fn exit_and_blank_lines_are_handled_by_the_loop() {
        let mut repl = repl_in(&std::env::temp_dir());
        assert!(matches!(repl.process_line("exit"), Step::Exit));
        assert!(matches!(repl.process_line("  exit \n"), Step::Exit));
        assert!(matches!(repl.process_line(" \t "), Step::Skipped));
    }

    #[test]
    fn prompt_shows_working_directory() {
        let repl = repl_in(std::path::Path::new("/some/where"));
        assert_eq!(repl.prompt(), format!("{} >> ", std::path::Path::new("/some/where").display()));
    }

    #[test]
    fn failure_does_not_corrupt_later_lines() {
        let dir = std::env::temp_dir().join(format!("repl_tests_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create scratch dir");
        let mut repl = repl_in(&dir);

        let mut out = Vec::new();
        let err = match repl.process_line_with_output("cat nonexistent.txt", &mut out) {
            Step::Executed(Err(e)) => e,
            other => panic!("expected a failure, got {:?}", other),
        };
        let message = error_message(&err);
        assert!(message.starts_with("[Error in Shell] Error: cat: "), "{}", message);
        assert!(message.contains("nonexistent.txt"), "{}", message);

        assert!(matches!(
            repl.process_line_with_output("SESSION_MARKER=still_here", &mut out),
            Step::Executed(Ok(()))
        ));
        let mut out = Vec::new();
        assert!(matches!(
            repl.process_line_with_output("env", &mut out),
            Step::Executed(Ok(()))
        ));
        let out = String::from_utf8(out).expect("utf8");
        assert!(out.lines().any(|l| l == "SESSION_MARKER=still_here"), "{}", out);
        assert_eq!(repl.interpreter().env().current_dir, dir);

        let _ = fs::remove_dir_all(dir);
    }
}
