use anyhow::Result;
use argh::FromArgs;
use pipeshell::repl::{Step, error_message};
use pipeshell::{Interpreter, Repl};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(FromArgs)]
/// A small interactive shell with pipelines and built-in file commands.
struct Args {
    #[argh(option, short = 'c')]
    /// execute a single command line and exit
    command: Option<String>,

    #[argh(option, default = "String::from(\"warn\")")]
    /// tracing filter used when RUST_LOG is not set
    log: String,

    #[argh(switch, short = 'q')]
    /// do not print the welcome banner
    quiet: bool,
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let mut repl = Repl::new(Interpreter::default());

    if let Some(line) = args.command {
        return Ok(match repl.process_line(&line) {
            Step::Executed(Err(e)) => {
                eprintln!("{}", error_message(&e));
                ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
            }
            Step::Executed(Ok(())) | Step::Exit | Step::Skipped => ExitCode::SUCCESS,
        });
    }

    if !args.quiet {
        println!("Welcome to pipeshell!");
        println!("Type 'exit' or ctrl+c to quit.");
        println!("------------------------------");
    }
    repl.run()?;
    Ok(ExitCode::SUCCESS)
}
