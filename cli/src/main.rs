mod args;

use args::{get_action, Action, EvalMode};
use rustyline::Editor;
use std::{fs, path::PathBuf, process::exit};
use vm::{InterpretError, Vm};

const HELP_MSG: &str = "Usage:
  cli [options] [file]

With no file given, runs an interactive REPL.

Options:
  --version
    Prints the current version (ignores any file given alongside it).
  --help
    Prints this message (ignores any file given alongside it).
";

fn main() {
    match get_action() {
        Ok(Action::Eval(EvalMode::File(path))) => run_file(path),
        Ok(Action::Eval(EvalMode::Repl)) => run_repl(),
        Ok(Action::Version) => println!("{}", env!("CARGO_PKG_VERSION")),
        Ok(Action::Help) => {
            println!(
                "{} {}\n\n{HELP_MSG}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            );
        }
        Err(err) => {
            eprintln!("{err}");
            eprintln!("Run with '--help' to see correct usage.");
            exit(exitcode::USAGE);
        }
    }
}

fn run_repl() {
    let mut vm = Vm::new();
    let mut rl = Editor::<()>::new();
    loop {
        match rl.readline("> ") {
            Ok(line) => {
                rl.add_history_entry(&line);
                report(vm.interpret(&line));
            }
            Err(_) => break,
        }
    }
}

fn run_file(path: PathBuf) {
    let source = match fs::read_to_string(&path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Couldn't read '{}': {err}", path.display());
            exit(exitcode::IOERR);
        }
    };
    let mut vm = Vm::new();
    match vm.interpret(&source) {
        Ok(()) => {}
        Err(err @ InterpretError::Compile(_)) => {
            eprintln!("{err}");
            exit(exitcode::DATAERR);
        }
        Err(err @ InterpretError::Runtime(_)) => {
            eprintln!("{err}");
            exit(exitcode::SOFTWARE);
        }
    }
}

fn report(result: Result<(), InterpretError>) {
    if let Err(err) = result {
        eprintln!("{err}");
    }
}
