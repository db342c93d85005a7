use std::env;
use std::process;

use schemexp::repl::Interpreter;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut interpreter = Interpreter::new();
    let result = match env::args().nth(1) {
        Some(path) => interpreter.run_file(&path),
        None => interpreter.run_interactive(),
    };

    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
}
