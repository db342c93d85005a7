//! Core value types of the interpreter. The main enum, [`Value`], covers
//! every Scheme data shape exchanged between the reader, the evaluator and
//! the primitives: atoms (numbers, booleans, strings, symbols, quoted
//! symbols), the shared mutable pair heap cell, lambdas with their captured
//! environment, lazy thunks, builtin descriptors, special-form handles and
//! the `Seq` syntax node produced by the reader. Printing follows Scheme
//! conventions (`#t`, dotted pairs, `#[Syntax name]`), and equality is the
//! identity relation used by the `=` primitive: payload comparison for
//! atoms, pointer identity for heap values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::builtins::BuiltinOp;
use crate::evaluator::Env;

/// Type alias for number values in the interpreter. There is no numeric
/// tower; every number is a double.
pub type Number = f64;

/// Core value type of the interpreter.
///
/// `Seq` is the only purely syntactic shape: the reader produces nested
/// `Seq`s and the evaluator consumes them. Everything else can appear as
/// the result of evaluation. `Pair`, `Lambda` and `Thunk` are
/// reference-shared; cloning a `Value` never copies the underlying cell.
#[derive(Clone)]
pub enum Value {
    /// Double-precision numbers, parsed from decimal literals
    Number(Number),
    /// `#t` / `#f`
    Bool(bool),
    /// String values (distinct from raw identifier tokens)
    Str(String),
    /// Identifiers, resolved against an environment
    Symbol(String),
    /// A quoted symbol produced by `(quote x)`; prints as the bare name
    Quote(String),
    /// Mutable cons cell; forms list spines and arbitrary cons trees
    Pair(Rc<RefCell<Pair>>),
    /// The empty list `()` and proper-list terminator
    Nil,
    /// Result of `define`, `set!` and other side-effecting forms
    Undef,
    /// User-defined procedure with its captured environment
    Lambda(Rc<Lambda>),
    /// Builtin procedure descriptor from the static registry
    Builtin(&'static BuiltinOp),
    /// Deferred computation from `(delay ...)`, memoized on first force
    Thunk(Rc<RefCell<Thunk>>),
    /// Handle for a special form; dispatched by name before lookup
    Syntax(&'static str),
    /// A node of the syntax tree: an ordered sequence of child values
    Seq(Vec<Value>),
}

/// A heap cell with two value fields. Mutability is exposed through
/// `set-car!`/`set-cdr!`, so cyclic graphs are possible.
#[derive(Debug, Clone)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

/// Parameter shape of a lambda: either a fixed list of names, or the
/// degenerate variadic form `(lambda args body)` that collects all
/// arguments into a single list binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Fixed(Vec<String>),
    Collected(String),
}

/// A user-defined procedure: parameters, body expressions and the
/// environment in force at creation time. Nothing is copied at capture;
/// the environment chain is shared.
pub struct Lambda {
    pub params: Params,
    pub body: Vec<Value>,
    pub env: Env,
}

impl Lambda {
    /// The body as a single expression: the lone body form, or a `begin`
    /// wrapper when there are several.
    pub(crate) fn body_exp(&self) -> Value {
        match self.body.as_slice() {
            [single] => single.clone(),
            _ => {
                let mut seq = vec![Value::Symbol("begin".to_owned())];
                seq.extend_from_slice(&self.body);
                Value::Seq(seq)
            }
        }
    }
}

/// A deferred expression with its captured environment and memoized
/// result. The memo transitions once from absent to present; after that
/// the environment is dropped and the result is never recomputed.
pub struct Thunk {
    pub exp: Value,
    pub env: Option<Env>,
    pub result: Option<Value>,
}

impl Value {
    pub(crate) fn pair(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(RefCell::new(Pair { car, cdr })))
    }

    pub(crate) fn thunk(exp: Value, env: Env) -> Value {
        Value::Thunk(Rc::new(RefCell::new(Thunk {
            exp,
            env: Some(env),
            result: None,
        })))
    }

    /// Truthiness: only `#f` is false.
    pub(crate) fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    /// Whether the value represents the empty list.
    pub(crate) fn is_null(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Seq(items) => items.is_empty(),
            _ => false,
        }
    }

    /// A value is a proper list iff following `cdr` links terminates at
    /// nil. Spins on cyclic graphs, like the printer.
    pub(crate) fn is_list(&self) -> bool {
        let mut current = self.clone();
        loop {
            match current {
                Value::Nil => return true,
                Value::Pair(cell) => {
                    let next = cell.borrow().cdr.clone();
                    current = next;
                }
                _ => return false,
            }
        }
    }
}

/// Build a proper list (a right-associated pair chain ending in nil).
pub(crate) fn list_from<I>(items: I) -> Value
where
    I: IntoIterator<Item = Value>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut result = Value::Nil;
    for item in items.into_iter().rev() {
        result = Value::pair(item, result);
    }
    result
}

/// Extract the elements of a proper list. Returns `None` for improper
/// lists and non-lists; nil yields an empty vector.
pub(crate) fn list_items(value: &Value) -> Option<Vec<Value>> {
    let mut items = Vec::new();
    let mut current = value.clone();
    loop {
        match current {
            Value::Nil => return Some(items),
            Value::Pair(cell) => {
                let (car, cdr) = {
                    let p = cell.borrow();
                    (p.car.clone(), p.cdr.clone())
                };
                items.push(car);
                current = cdr;
            }
            _ => return None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Str(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Symbol(name) | Value::Quote(name) => write!(f, "{name}"),
            Value::Pair(cell) => {
                write!(f, "(")?;
                let mut current = Rc::clone(cell);
                let mut first = true;
                loop {
                    let (car, cdr) = {
                        let p = current.borrow();
                        (p.car.clone(), p.cdr.clone())
                    };
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{car}")?;
                    first = false;
                    match cdr {
                        Value::Pair(next) => current = next,
                        Value::Nil => break,
                        other => {
                            write!(f, " . {other}")?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Nil => write!(f, "()"),
            Value::Undef => write!(f, "<UNDEF>"),
            Value::Lambda(lambda) => write!(f, "{lambda}"),
            Value::Builtin(_) => write!(f, "#[BuiltinFunction]"),
            Value::Thunk(cell) => {
                let t = cell.borrow();
                match &t.result {
                    Some(result) => write!(f, "#[Thunk {result}]"),
                    None => write!(f, "#[Thunk exp: {}]", t.exp),
                }
            }
            Value::Syntax(name) => write!(f, "#[Syntax {name}]"),
            Value::Seq(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(lambda ")?;
        match &self.params {
            Params::Fixed(names) => {
                write!(f, "(")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{name}")?;
                }
                write!(f, ")")?;
            }
            Params::Collected(name) => write!(f, "{name}")?,
        }
        for exp in &self.body {
            write!(f, " {exp}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Quote(s) => write!(f, "Quote({s})"),
            // Pairs and environments can be cyclic; print the Scheme form
            // instead of recursing through Rc cells.
            Value::Pair(_) => write!(f, "Pair({self})"),
            Value::Nil => write!(f, "Nil"),
            Value::Undef => write!(f, "Undef"),
            Value::Lambda(lambda) => {
                write!(f, "Lambda(params={:?}, body={:?})", lambda.params, lambda.body)
            }
            Value::Builtin(op) => write!(f, "Builtin({})", op.name),
            Value::Thunk(_) => write!(f, "Thunk({self})"),
            Value::Syntax(name) => write!(f, "Syntax({name})"),
            Value::Seq(items) => {
                write!(f, "Seq(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item:?}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// The identity relation behind the `=` fallback: same tag and payload
/// for atoms, pointer identity for pairs, lambdas and thunks.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Quote(a), Value::Quote(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::Nil, Value::Nil) => true,
            (Value::Undef, Value::Undef) => true,
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Thunk(a), Value::Thunk(b)) => Rc::ptr_eq(a, b),
            (Value::Syntax(a), Value::Syntax(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            _ => false,
        }
    }
}

// From implementations so tests and embedders can write `val(42)`.

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

/// Helper for creating values in tests from Rust literals.
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper for creating symbols in tests.
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_display() {
        // (value, expected printed form)
        let cases = vec![
            (Value::pair(val(1), Value::Nil), "(1)"),
            (Value::pair(Value::Nil, val(3)), "(() . 3)"),
            (Value::pair(val(1), Value::pair(val(1), val(2))), "(1 1 . 2)"),
            (
                list_from(vec![val(1), val(2), val(3), val(4)]),
                "(1 2 3 4)",
            ),
            (
                Value::pair(
                    val(1),
                    Value::pair(
                        Value::Nil,
                        Value::pair(Value::pair(val(2), val(3)), Value::pair(val(4), val(5))),
                    ),
                ),
                "(1 () (2 . 3) 4 . 5)",
            ),
        ];
        for (value, expected) in cases {
            assert_eq!(format!("{value}"), expected);
        }
    }

    #[test]
    fn test_atom_display() {
        let cases = vec![
            (val(6.0), "6"),
            (val(2.5), "2.5"),
            (val(-7), "-7"),
            (val(true), "#t"),
            (val(false), "#f"),
            (val("a\nb"), "\"a\\nb\""),
            (sym("car"), "car"),
            (Value::Quote("car".to_owned()), "car"),
            (Value::Nil, "()"),
            (Value::Undef, "<UNDEF>"),
            (Value::Syntax("if"), "#[Syntax if]"),
        ];
        for (value, expected) in cases {
            assert_eq!(format!("{value}"), expected);
        }
    }

    #[test]
    fn test_is_list() {
        let cases = vec![
            (Value::Nil, true),
            (Value::pair(val(1), Value::Nil), true),
            (Value::pair(val(1), val(1)), false),
            (Value::pair(val(1), Value::pair(val(1), val(2))), false),
            (
                Value::pair(Value::Nil, Value::pair(val(1), Value::Nil)),
                true,
            ),
            (val(42), false),
        ];
        for (value, expected) in cases {
            assert_eq!(value.is_list(), expected, "is_list of {value}");
        }
    }

    #[test]
    fn test_identity_equality() {
        // Atoms compare by payload.
        assert_eq!(val(3.0), val(3));
        assert_eq!(val("x"), val("x"));
        assert_eq!(Value::Undef, Value::Undef);
        assert_ne!(val(0), val(false));

        // Pairs compare by pointer identity, not structure.
        let a = list_from(vec![val(1), val(2)]);
        let b = list_from(vec![val(1), val(2)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_truthiness() {
        assert!(!val(false).is_truthy());
        assert!(val(true).is_truthy());
        // Everything except #f is true, including 0, "" and ().
        assert!(val(0).is_truthy());
        assert!(val("").is_truthy());
        assert!(Value::Nil.is_truthy());
        assert!(Value::Undef.is_truthy());
    }

    #[test]
    fn test_list_round_trip() {
        let items = vec![val(1), sym("x"), val("s")];
        let list = list_from(items.clone());
        assert_eq!(list_items(&list), Some(items));

        // Improper lists have no element extraction.
        assert_eq!(list_items(&Value::pair(val(1), val(2))), None);
        assert_eq!(list_items(&Value::Nil), Some(vec![]));
    }
}
