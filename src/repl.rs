//! The driver: an interactive REPL and a batch file runner.
//!
//! Both modes hand the core a character stream and print what comes
//! back. The REPL accumulates input while the parenthesis balance of the
//! current fragment is positive, so multi-line forms can be typed
//! naturally; a balanced fragment is read, evaluated and printed, and a
//! failed fragment is discarded before the next prompt.

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::Error;
use crate::ast::Value;
use crate::evaluator::{self, Env};
use crate::reader;
use crate::signal;

const PROMPT: &str = ">>> ";
const CONTINUATION_PROMPT: &str = "... ";

/// Reads from a source and evaluates against one shared root
/// environment.
pub struct Interpreter {
    env: Env,
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            env: evaluator::root_env(),
        }
    }

    /// Run the interactive shell until EOF, interrupt or `(exit)`.
    pub fn run_interactive(&mut self) -> Result<(), Error> {
        println!("Welcome to schemexp.");
        println!("Enter '(exit)' or CTRL+D to exit.");

        let mut editor = DefaultEditor::new()
            .map_err(|err| Error::IoError(format!("could not initialize the REPL: {err}")))?;
        tracing::debug!("interactive session started");

        let mut fragment = String::new();
        loop {
            let prompt = if fragment.is_empty() {
                PROMPT
            } else {
                CONTINUATION_PROMPT
            };
            match editor.readline(prompt) {
                Ok(line) => {
                    if fragment.is_empty() && line.trim().is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(line.as_str());
                    fragment.push_str(&line);
                    fragment.push('\n');
                    if needed_indents(&fragment) > 0 {
                        continue;
                    }
                    self.eval_and_print(&fragment);
                    fragment.clear();
                    if signal::exit_requested() {
                        println!("Exiting...");
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    println!("Exiting...");
                    break;
                }
                Err(err) => {
                    return Err(Error::IoError(format!("readline failed: {err}")));
                }
            }
        }
        Ok(())
    }

    /// Evaluate a whole file; errors abort with the first failure.
    pub fn run_file(&mut self, path: &str) -> Result<(), Error> {
        tracing::debug!(file = %path, "batch evaluation");
        let source = std::fs::read_to_string(path)
            .map_err(|err| Error::IoError(format!("{path}: {err}")))?;
        let forms = reader::read_all(&source)?;
        self.eval_forms(&forms)?;
        Ok(())
    }

    fn eval_and_print(&mut self, source: &str) {
        match reader::read_all(source).and_then(|forms| self.eval_forms(&forms)) {
            Ok(value) => {
                // The unspecified value is suppressed.
                if !matches!(value, Value::Undef) {
                    println!("#=>{value}");
                }
            }
            Err(err) => println!("err:=>{err}"),
        }
    }

    /// Evaluate forms in order, stopping early when an evaluation
    /// requested process exit.
    fn eval_forms(&mut self, forms: &[Value]) -> Result<Value, Error> {
        let mut result = Value::Undef;
        for form in forms {
            result = evaluator::eval_one(form, &self.env)?;
            if signal::exit_requested() {
                break;
            }
        }
        Ok(result)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// The parenthesis balance of an input fragment: positive when closing
/// parens are still missing, negative when there are too many.
pub(crate) fn needed_indents(fragment: &str) -> i32 {
    let mut depth = 0i32;
    for ch in fragment.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return depth;
        }
    }
    depth
}
