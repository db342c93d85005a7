//! The evaluator: a trampolined reduction loop over `(expression,
//! environment)` pairs.
//!
//! Each iteration of [`eval_one`] either produces a final value or
//! rewrites the pair and continues. Special forms signal which of the two
//! happens through [`Step`]: handlers return `Step::Continue` for their
//! tail positions (`if` branches, `begin` tails, `let`/`let*`/`letrec`
//! bodies, lambda application, `apply`), which is how proper tail calls
//! run in constant native stack space. Argument evaluation and the
//! non-tail operands of `begin`/`and`/`or` use ordinary recursion.
//!
//! Special-form names are dispatched against a fixed table *before*
//! operator evaluation, so `(define if cons)` rebinds the environment
//! entry without affecting syntax dispatch. The same names are seeded
//! into the root environment as [`Value::Syntax`] handles so they print
//! and pass around uniformly.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Lambda, Params, Value, list_from, list_items};
use crate::builtins;
use crate::reader;

/// Lexically nested binding frames. `Env` is a cheap handle; cloning it
/// aliases the same frame, which is what closure capture and `set!`
/// require.
#[derive(Clone)]
pub struct Env {
    inner: Rc<RefCell<Frame>>,
}

struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Env>,
}

impl Env {
    fn new() -> Self {
        Env {
            inner: Rc::new(RefCell::new(Frame {
                bindings: HashMap::new(),
                parent: None,
            })),
        }
    }

    /// A fresh frame whose parent is this environment.
    pub fn child(&self) -> Env {
        Env {
            inner: Rc::new(RefCell::new(Frame {
                bindings: HashMap::new(),
                parent: Some(self.clone()),
            })),
        }
    }

    /// Bind `name` in the current frame, shadowing any parent binding.
    pub fn define(&self, name: &str, value: Value) {
        self.inner
            .borrow_mut()
            .bindings
            .insert(name.to_owned(), value);
    }

    /// Look `name` up through the frame chain.
    pub fn find(&self, name: &str) -> Result<Value, Error> {
        let mut current = self.clone();
        loop {
            let parent = {
                let frame = current.inner.borrow();
                if let Some(value) = frame.bindings.get(name) {
                    return Ok(value.clone());
                }
                frame.parent.clone()
            };
            match parent {
                Some(env) => current = env,
                None => return Err(Error::UnboundSymbol(name.to_owned())),
            }
        }
    }

    /// Overwrite `name` in the nearest frame that defines it.
    pub fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        let mut current = self.clone();
        loop {
            let parent = {
                let mut frame = current.inner.borrow_mut();
                if let Some(slot) = frame.bindings.get_mut(name) {
                    *slot = value;
                    return Ok(());
                }
                frame.parent.clone()
            };
            match parent {
                Some(env) => current = env,
                None => return Err(Error::SetBeforeDefine(name.to_owned())),
            }
        }
    }

    /// The transitive set of bound names, sorted. Used by the REPL for
    /// completion.
    pub fn symbols(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(self.clone());
        while let Some(env) = current {
            let frame = env.inner.borrow();
            names.extend(frame.bindings.keys().cloned());
            current = frame.parent.clone();
        }
        names.sort();
        names.dedup();
        names
    }
}

impl PartialEq for Env {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Frames chain upward and closures can make them cyclic with the
        // values they hold; print only the local binding count.
        write!(f, "Env({} bindings)", self.inner.borrow().bindings.len())
    }
}

/// What a special-form handler tells the trampoline to do next.
pub(crate) enum Step {
    /// A final value; the loop returns it.
    Done(Value),
    /// Rewrite `(exp, env)` and keep reducing. Used for tail positions.
    Continue(Value, Env),
}

type SyntaxFn = fn(&[Value], &Env) -> Result<Step, Error>;

/// Name-to-handler table for the special forms. Consulted by textual
/// match on the head symbol before operator evaluation.
static SYNTAX_TABLE: &[(&str, SyntaxFn)] = &[
    ("quote", syntax_quote),
    ("define", syntax_define),
    ("set!", syntax_set),
    ("if", syntax_if),
    ("cond", syntax_cond),
    ("begin", syntax_begin),
    ("lambda", syntax_lambda),
    ("let", syntax_let),
    ("let*", syntax_let_star),
    ("letrec", syntax_letrec),
    ("and", syntax_and),
    ("or", syntax_or),
    ("delay", syntax_delay),
    ("eval", syntax_eval),
    ("apply", syntax_apply),
    ("load", syntax_load),
];

static SYNTAX_INDEX: LazyLock<HashMap<&'static str, SyntaxFn>> =
    LazyLock::new(|| SYNTAX_TABLE.iter().copied().collect());

fn find_syntax(name: &str) -> Option<SyntaxFn> {
    SYNTAX_INDEX.get(name).copied()
}

/// Evaluate a single expression in an environment.
pub fn eval_one(exp: &Value, env: &Env) -> Result<Value, Error> {
    let mut exp = exp.clone();
    let mut env = env.clone();
    loop {
        match exp {
            Value::Symbol(name) => return env.find(&name),
            Value::Seq(elements) => {
                if elements.is_empty() {
                    return Ok(Value::Nil);
                }
                let step = if let Value::Symbol(head) = &elements[0]
                    && let Some(handler) = find_syntax(head)
                {
                    handler(&elements[1..], &env)?
                } else {
                    apply_operator(&elements, &env)?
                };
                match step {
                    Step::Done(value) => return Ok(value),
                    Step::Continue(next_exp, next_env) => {
                        exp = next_exp;
                        env = next_env;
                    }
                }
            }
            // Everything else is a primitive value and evaluates to
            // itself, including values re-entering the evaluator.
            other => return Ok(other),
        }
    }
}

/// Evaluate a sequence of expressions, returning the last value.
pub fn eval_all(exps: &[Value], env: &Env) -> Result<Value, Error> {
    let mut result = Value::Undef;
    for exp in exps {
        result = eval_one(exp, env)?;
    }
    Ok(result)
}

/// The ordinary call rule: evaluate the operator, then dispatch on the
/// callable kind. Builtin calls finish here; lambda application rewrites
/// `(exp, env)` so the body runs in tail position.
fn apply_operator(elements: &[Value], env: &Env) -> Result<Step, Error> {
    let operator = eval_one(&elements[0], env)?;
    match operator {
        Value::Builtin(op) => {
            let args = eval_args(&elements[1..], env)?;
            op.call(&args).map(Step::Done)
        }
        Value::Lambda(lambda) => {
            let args = eval_args(&elements[1..], env)?;
            let call_env = bind_params(&lambda, args)?;
            Ok(Step::Continue(lambda.body_exp(), call_env))
        }
        other => Err(Error::EvalError(format!("{other} is not callable"))),
    }
}

/// Evaluate argument expressions strictly, left to right.
fn eval_args(exps: &[Value], env: &Env) -> Result<Vec<Value>, Error> {
    let mut args = Vec::with_capacity(exps.len());
    for exp in exps {
        args.push(eval_one(exp, env)?);
    }
    Ok(args)
}

/// Create the call frame for a lambda: parent is the captured
/// environment, each parameter bound to its evaluated argument.
fn bind_params(lambda: &Lambda, args: Vec<Value>) -> Result<Env, Error> {
    let call_env = lambda.env.child();
    match &lambda.params {
        Params::Fixed(names) => {
            if names.len() != args.len() {
                return Err(Error::ArityError(format!(
                    "{} requires {} arguments but {} arguments provided",
                    lambda,
                    names.len(),
                    args.len()
                )));
            }
            for (name, arg) in names.iter().zip(args) {
                call_env.define(name, arg);
            }
        }
        Params::Collected(name) => call_env.define(name, list_from(args)),
    }
    Ok(call_env)
}

fn expect_symbol(value: &Value) -> Result<String, Error> {
    match value {
        Value::Symbol(name) => Ok(name.clone()),
        other => Err(Error::TypeError(format!("{other} is not a symbol"))),
    }
}

/// `(quote x)` returns `x` unevaluated: symbols become quoted symbols,
/// sequences become proper lists, parsed atoms pass through.
fn syntax_quote(args: &[Value], _env: &Env) -> Result<Step, Error> {
    let [datum] = args else {
        return Err(Error::SyntaxError(
            "quote: syntax error (requires 1 argument)".to_owned(),
        ));
    };
    Ok(Step::Done(quote_datum(datum)))
}

fn quote_datum(datum: &Value) -> Value {
    match datum {
        Value::Symbol(name) => Value::Quote(name.clone()),
        Value::Seq(items) => list_from(items.iter().map(quote_datum)),
        other => other.clone(),
    }
}

/// `(define sym v)` and the `(define (f p...) body...)` lambda sugar.
fn syntax_define(args: &[Value], env: &Env) -> Result<Step, Error> {
    if args.len() < 2 {
        return Err(Error::SyntaxError(
            "define: syntax error (requires a name and a value)".to_owned(),
        ));
    }
    match &args[0] {
        Value::Seq(signature) => {
            let mut names = Vec::with_capacity(signature.len());
            for part in signature {
                names.push(expect_symbol(part)?);
            }
            let Some((name, params)) = names.split_first() else {
                return Err(Error::SyntaxError(
                    "define: syntax error (missing procedure name)".to_owned(),
                ));
            };
            let lambda = Lambda {
                params: Params::Fixed(params.to_vec()),
                body: args[1..].to_vec(),
                env: env.clone(),
            };
            env.define(name, Value::Lambda(Rc::new(lambda)));
            Ok(Step::Done(Value::Undef))
        }
        Value::Symbol(name) => {
            if args.len() != 2 {
                return Err(Error::SyntaxError(
                    "define: bad syntax (multiple expressions after identifier)".to_owned(),
                ));
            }
            let value = eval_one(&args[1], env)?;
            env.define(name, value);
            Ok(Step::Done(Value::Undef))
        }
        other => Err(Error::TypeError(format!("{other} is not a symbol"))),
    }
}

fn syntax_set(args: &[Value], env: &Env) -> Result<Step, Error> {
    let [target, exp] = args else {
        return Err(Error::SyntaxError(
            "set!: syntax error (set! requires variable and value arguments)".to_owned(),
        ));
    };
    let name = expect_symbol(target)?;
    let value = eval_one(exp, env)?;
    env.set(&name, value)?;
    Ok(Step::Done(Value::Undef))
}

/// `(if c t e?)`: the chosen branch is a tail position; a missing else
/// branch yields the unspecified value.
fn syntax_if(args: &[Value], env: &Env) -> Result<Step, Error> {
    let (condition, then_exp, else_exp) = match args {
        [condition, then_exp] => (condition, then_exp, None),
        [condition, then_exp, else_exp] => (condition, then_exp, Some(else_exp)),
        _ => {
            return Err(Error::SyntaxError(
                "if: syntax error (requires 2 or 3 arguments)".to_owned(),
            ));
        }
    };
    if eval_one(condition, env)?.is_truthy() {
        Ok(Step::Continue(then_exp.clone(), env.clone()))
    } else {
        match else_exp {
            Some(exp) => Ok(Step::Continue(exp.clone(), env.clone())),
            None => Ok(Step::Done(Value::Undef)),
        }
    }
}

/// `cond` expands into a right-associated `if` chain at evaluation time,
/// then continues with the expansion so the selected body stays in tail
/// position.
fn syntax_cond(args: &[Value], env: &Env) -> Result<Step, Error> {
    if args.is_empty() {
        return Err(Error::SyntaxError(
            "cond: syntax error (requires at least 1 clause)".to_owned(),
        ));
    }
    let expanded = expand_cond(args)?;
    Ok(Step::Continue(expanded, env.clone()))
}

fn expand_cond(clauses: &[Value]) -> Result<Value, Error> {
    let Some((first, rest)) = clauses.split_first() else {
        // No clause matched; the whole form is unspecified.
        return Ok(Value::Undef);
    };
    let Value::Seq(clause) = first else {
        return Err(Error::SyntaxError(format!(
            "cond: {first} is not a valid clause"
        )));
    };
    let [test, body @ ..] = clause.as_slice() else {
        return Err(Error::SyntaxError(
            "cond: syntax error (empty clause)".to_owned(),
        ));
    };
    if body.is_empty() {
        return Err(Error::SyntaxError(
            "cond: syntax error (clause requires a body)".to_owned(),
        ));
    }
    if matches!(test, Value::Symbol(name) if name == "else") {
        if !rest.is_empty() {
            return Err(Error::SyntaxError(
                "cond: else clause must be in the last position".to_owned(),
            ));
        }
        return Ok(sequence_to_exp(body));
    }
    let alternative = expand_cond(rest)?;
    Ok(Value::Seq(vec![
        Value::Symbol("if".to_owned()),
        test.clone(),
        sequence_to_exp(body),
        alternative,
    ]))
}

/// A body of one expression is that expression; several get a `begin`
/// wrapper.
fn sequence_to_exp(body: &[Value]) -> Value {
    match body {
        [single] => single.clone(),
        _ => {
            let mut seq = vec![Value::Symbol("begin".to_owned())];
            seq.extend_from_slice(body);
            Value::Seq(seq)
        }
    }
}

fn syntax_begin(args: &[Value], env: &Env) -> Result<Step, Error> {
    let Some((last, init)) = args.split_last() else {
        return Err(Error::SyntaxError(
            "begin: syntax error (requires at least 1 expression)".to_owned(),
        ));
    };
    for exp in init {
        eval_one(exp, env)?;
    }
    Ok(Step::Continue(last.clone(), env.clone()))
}

fn syntax_lambda(args: &[Value], env: &Env) -> Result<Step, Error> {
    if args.len() < 2 {
        return Err(Error::SyntaxError(
            "lambda: syntax error (requires parameters and a body)".to_owned(),
        ));
    }
    let params = match &args[0] {
        Value::Seq(list) => {
            let mut names = Vec::with_capacity(list.len());
            for param in list {
                names.push(expect_symbol(param)?);
            }
            Params::Fixed(names)
        }
        // A bare symbol collects every argument into one list binding.
        Value::Symbol(name) => Params::Collected(name.clone()),
        other => {
            return Err(Error::TypeError(format!(
                "{other} is not a valid parameter list"
            )));
        }
    };
    let lambda = Lambda {
        params,
        body: args[1..].to_vec(),
        env: env.clone(),
    };
    Ok(Step::Done(Value::Lambda(Rc::new(lambda))))
}

/// Binding clauses shared by `let`, `let*` and `letrec`: a sequence of
/// `(symbol expression)` pairs.
fn binding_clauses(form: &str, bindings: &Value) -> Result<Vec<(String, Value)>, Error> {
    let Value::Seq(clauses) = bindings else {
        return Err(Error::SyntaxError(format!(
            "{form}: syntax error (not a valid binding)"
        )));
    };
    let mut parsed = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let Value::Seq(parts) = clause else {
            return Err(Error::SyntaxError(format!(
                "{form}: syntax error (not a valid binding)"
            )));
        };
        let [name, exp] = parts.as_slice() else {
            return Err(Error::SyntaxError(format!(
                "{form}: syntax error (not a valid binding)"
            )));
        };
        parsed.push((expect_symbol(name)?, exp.clone()));
    }
    Ok(parsed)
}

/// `let`: right-hand sides evaluate in the outer environment, then one
/// new frame binds them all; the body is a tail position.
fn syntax_let(args: &[Value], env: &Env) -> Result<Step, Error> {
    if args.len() < 2 {
        return Err(Error::SyntaxError(
            "let: syntax error (let should pass the bindings and body)".to_owned(),
        ));
    }
    let bindings = binding_clauses("let", &args[0])?;
    let new_env = env.child();
    for (name, exp) in &bindings {
        let value = eval_one(exp, env)?;
        new_env.define(name, value);
    }
    Ok(Step::Continue(sequence_to_exp(&args[1..]), new_env))
}

/// `let*`: each right-hand side sees the bindings before it, realized as
/// one nested frame per binding.
fn syntax_let_star(args: &[Value], env: &Env) -> Result<Step, Error> {
    if args.len() < 2 {
        return Err(Error::SyntaxError(
            "let*: syntax error (let* should pass the bindings and body)".to_owned(),
        ));
    }
    let bindings = binding_clauses("let*", &args[0])?;
    let mut current = env.child();
    for (name, exp) in &bindings {
        let value = eval_one(exp, &current)?;
        current.define(name, value);
        current = current.child();
    }
    Ok(Step::Continue(sequence_to_exp(&args[1..]), current))
}

/// `letrec`: pre-bind every name to the unspecified value in a new
/// frame, then evaluate the right-hand sides in that frame. Enables
/// mutual recursion.
fn syntax_letrec(args: &[Value], env: &Env) -> Result<Step, Error> {
    if args.len() < 2 {
        return Err(Error::SyntaxError(
            "letrec: syntax error (letrec should pass the bindings and body)".to_owned(),
        ));
    }
    let bindings = binding_clauses("letrec", &args[0])?;
    let new_env = env.child();
    for (name, _) in &bindings {
        new_env.define(name, Value::Undef);
    }
    for (name, exp) in &bindings {
        let value = eval_one(exp, &new_env)?;
        new_env.define(name, value);
    }
    Ok(Step::Continue(sequence_to_exp(&args[1..]), new_env))
}

/// `and` stops at the first false operand; later operands are never
/// evaluated.
fn syntax_and(args: &[Value], env: &Env) -> Result<Step, Error> {
    if args.is_empty() {
        return Err(Error::SyntaxError(
            "and: syntax error (requires at least 1 argument)".to_owned(),
        ));
    }
    for exp in args {
        if !eval_one(exp, env)?.is_truthy() {
            return Ok(Step::Done(Value::Bool(false)));
        }
    }
    Ok(Step::Done(Value::Bool(true)))
}

/// `or` stops at the first truthy operand.
fn syntax_or(args: &[Value], env: &Env) -> Result<Step, Error> {
    if args.is_empty() {
        return Err(Error::SyntaxError(
            "or: syntax error (requires at least 1 argument)".to_owned(),
        ));
    }
    for exp in args {
        if eval_one(exp, env)?.is_truthy() {
            return Ok(Step::Done(Value::Bool(true)));
        }
    }
    Ok(Step::Done(Value::Bool(false)))
}

/// `(delay e)` wraps `e` and the current environment without evaluating
/// anything.
fn syntax_delay(args: &[Value], env: &Env) -> Result<Step, Error> {
    let [exp] = args else {
        return Err(Error::SyntaxError(
            "delay: syntax error (requires 1 argument)".to_owned(),
        ));
    };
    Ok(Step::Done(Value::thunk(exp.clone(), env.clone())))
}

/// `(force t)` returns the memoized value if present, otherwise
/// evaluates the delayed expression, transitively forces the result, and
/// stores it. A non-thunk argument passes through unchanged.
pub(crate) fn force_value(value: &Value) -> Result<Value, Error> {
    let Value::Thunk(cell) = value else {
        return Ok(value.clone());
    };
    let (exp, env) = {
        let thunk = cell.borrow();
        if let Some(result) = &thunk.result {
            return Ok(result.clone());
        }
        let env = thunk
            .env
            .clone()
            .expect("unforced thunk retains its environment");
        (thunk.exp.clone(), env)
    };
    let result = force_value(&eval_one(&exp, &env)?)?;
    let mut thunk = cell.borrow_mut();
    thunk.result = Some(result.clone());
    // The environment is no longer needed once the memo is set.
    thunk.env = None;
    Ok(result)
}

/// `(eval e)`: textualize the value back to source form, re-read it and
/// evaluate in the current environment. Values with no textual preimage
/// are rejected.
fn syntax_eval(args: &[Value], env: &Env) -> Result<Step, Error> {
    let [exp] = args else {
        return Err(Error::SyntaxError(
            "eval: syntax error (requires 1 argument)".to_owned(),
        ));
    };
    let value = eval_one(exp, env)?;
    ensure_readable(&value)?;
    let forms = reader::read_all(&value.to_string())?;
    eval_all(&forms, env).map(Step::Done)
}

fn ensure_readable(value: &Value) -> Result<(), Error> {
    match value {
        Value::Lambda(_) | Value::Builtin(_) | Value::Thunk(_) | Value::Syntax(_)
        | Value::Undef => Err(Error::EvalError(format!(
            "{value} has no source form and cannot be evaluated"
        ))),
        Value::Pair(_) => {
            let Some(items) = list_items(value) else {
                return Err(Error::EvalError("malformed list".to_owned()));
            };
            for item in &items {
                ensure_readable(item)?;
            }
            Ok(())
        }
        Value::Seq(items) => {
            for item in items {
                ensure_readable(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// `(apply f args)`: splice a proper list into positional arguments. The
/// spliced combination re-enters the loop, so `apply` is itself a tail
/// position.
fn syntax_apply(args: &[Value], env: &Env) -> Result<Step, Error> {
    let [proc_exp, args_exp] = args else {
        return Err(Error::SyntaxError(
            "apply: syntax error (requires 2 arguments)".to_owned(),
        ));
    };
    let procedure = eval_one(proc_exp, env)?;
    let arguments = eval_one(args_exp, env)?;
    let Some(items) = list_items(&arguments) else {
        return Err(Error::TypeError(
            "apply: argument must be a list".to_owned(),
        ));
    };
    let mut combination = Vec::with_capacity(items.len() + 1);
    combination.push(procedure);
    combination.extend(items);
    Ok(Step::Continue(Value::Seq(combination), env.clone()))
}

/// `(load path)`: evaluate a file (or several) in the current
/// environment. Accepts a string, a quoted symbol, or a proper list of
/// either.
fn syntax_load(args: &[Value], env: &Env) -> Result<Step, Error> {
    let [path_exp] = args else {
        return Err(Error::SyntaxError(
            "load: syntax error (requires 1 argument)".to_owned(),
        ));
    };
    let value = eval_one(path_exp, env)?;
    load_value(&value, env)?;
    Ok(Step::Done(Value::Undef))
}

fn load_value(value: &Value, env: &Env) -> Result<(), Error> {
    match value {
        Value::Str(path) | Value::Quote(path) => load_file(path, env),
        Value::Pair(_) => {
            let Some(items) = list_items(value) else {
                return Err(Error::TypeError(
                    "load: argument can only be a string, quote or list of them".to_owned(),
                ));
            };
            for item in &items {
                load_value(item, env)?;
            }
            Ok(())
        }
        other => Err(Error::TypeError(format!("load: cannot load {other}"))),
    }
}

/// Read and evaluate a source file, appending the `.scm` extension when
/// absent.
pub fn load_file(path: &str, env: &Env) -> Result<(), Error> {
    let mut full = path.to_owned();
    if Path::new(path).extension().is_none_or(|ext| ext != "scm") {
        full.push_str(".scm");
    }
    tracing::debug!(file = %full, "loading source file");
    let source = std::fs::read_to_string(&full)
        .map_err(|err| Error::IoError(format!("load {full} failed: {err}")))?;
    let forms = reader::read_all(&source)?;
    eval_all(&forms, env)?;
    Ok(())
}

/// The bootstrap environment: special-form handles and every builtin
/// seeded into the root frame, then the Scheme prelude evaluated through
/// the evaluator itself.
pub fn root_env() -> Env {
    let env = Env::new();
    for &(name, _) in SYNTAX_TABLE.iter() {
        env.define(name, Value::Syntax(name));
    }
    for op in builtins::all_ops() {
        env.define(op.name, Value::Builtin(op));
    }
    let prelude = reader::read_all(builtins::PRELUDE).expect("prelude must parse");
    eval_all(&prelude, &env).expect("prelude must evaluate");
    env
}
