//! A small interactive shell: assignments, built-ins and pipelines of external programs.
//!
//! A line is interpreted in one of two ways. `NAME=VALUE` with no whitespace
//! sets a variable. Anything else is split on `|` into stages and on
//! whitespace into tokens; `$NAME` arguments are expanded, and the stages run
//! as external processes connected stdout to stdin. Only the last stage may be
//! a built-in (`cd`, `ls`, `rm`, `cat`, `cp`, `env`, `clear`), and a built-in
//! never sees piped input.
//!
//! The main entry point is [`Interpreter`]. Session state lives in an explicit
//! [`Environment`], so several independent shells can share one process.

pub mod builtin;
pub mod command;
pub mod env;
pub mod error;
pub mod expand;
mod external;
mod interpreter;
pub mod lexer;
pub mod repl;

pub use builtin::{BuiltinCommand, BuiltinError, BuiltinHandler, BuiltinRegistry};
pub use env::Environment;
pub use error::ExecutionError;
pub use interpreter::Interpreter;
pub use repl::Repl;
