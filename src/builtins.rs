//! Built-in procedure registry.
//!
//! Every primitive is a [`BuiltinOp`]: a name, an [`Arity`] contract and
//! an implementation over evaluated argument slices. The registry is a
//! single static table; the bootstrap seeds each entry into the root
//! environment so primitives resolve through ordinary symbol lookup and
//! can be rebound or passed around like any other value.
//!
//! A handful of list procedures (`map`, `filter`, `reduce`, ...) are not
//! implemented in Rust at all: they live in [`PRELUDE`] as Scheme source
//! evaluated at bootstrap, which also exercises the evaluator early.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Number, Value, list_from};
use crate::evaluator::force_value;
use crate::signal;

/// Expected number of arguments for a builtin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Range(usize, usize),
    Any,
}

impl Arity {
    pub(crate) fn validate(&self, name: &str, got: usize) -> Result<(), Error> {
        let fail = |message: String| Err(Error::ArityError(message));
        match *self {
            Arity::Exact(expected) if got != expected => fail(format!(
                "{name} requires {expected} arguments but {got} arguments provided"
            )),
            Arity::AtLeast(min) if got < min => fail(format!(
                "{name} requires at least {min} arguments but {got} arguments provided"
            )),
            Arity::Range(min, _) if got < min => fail(format!(
                "{name} requires at least {min} arguments but {got} arguments provided"
            )),
            Arity::Range(_, max) if got > max => fail(format!(
                "{name} requires no more than {max} arguments, but {got} arguments provided"
            )),
            _ => Ok(()),
        }
    }
}

/// Descriptor of a built-in procedure.
pub struct BuiltinOp {
    pub name: &'static str,
    pub arity: Arity,
    pub func: fn(&[Value]) -> Result<Value, Error>,
}

impl BuiltinOp {
    /// Validate the argument count, then run the implementation.
    pub(crate) fn call(&self, args: &[Value]) -> Result<Value, Error> {
        self.arity.validate(self.name, args.len())?;
        (self.func)(args)
    }
}

impl fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuiltinOp({}, {:?})", self.name, self.arity)
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

fn number_of(value: &Value) -> Result<Number, Error> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(Error::TypeError(format!("{other} is not a number"))),
    }
}

// Arithmetic: left folds seeded with the first element, so a single
// argument returns itself. Division by zero yields the IEEE 754 result.

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    let mut sum = 0.0;
    for arg in args {
        sum += number_of(arg)?;
    }
    Ok(Value::Number(sum))
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    let mut result = number_of(&args[0])?;
    for arg in &args[1..] {
        result -= number_of(arg)?;
    }
    Ok(Value::Number(result))
}

fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    let mut result = number_of(&args[0])?;
    for arg in &args[1..] {
        result *= number_of(arg)?;
    }
    Ok(Value::Number(result))
}

fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    let mut result = number_of(&args[0])?;
    for arg in &args[1..] {
        result /= number_of(arg)?;
    }
    Ok(Value::Number(result))
}

macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let lhs = number_of(&args[0])?;
            let rhs = number_of(&args[1])?;
            Ok(Value::Bool(lhs $op rhs))
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

/// `=` compares numbers by value; for anything else it falls back to the
/// identity relation of [`Value`] (structural for atoms, pointer
/// identity for pairs).
fn builtin_eq(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(args[0] == args[1]))
}

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(!args[0].is_truthy()))
}

fn builtin_is_null(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(args[0].is_null()))
}

fn builtin_is_string(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(matches!(args[0], Value::Str(_))))
}

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::pair(args[0].clone(), args[1].clone()))
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::Pair(cell) => Ok(cell.borrow().car.clone()),
        other => Err(Error::TypeError(format!("{other} is not a pair"))),
    }
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::Pair(cell) => Ok(cell.borrow().cdr.clone()),
        other => Err(Error::TypeError(format!("{other} is not a pair"))),
    }
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(list_from(args.iter().cloned()))
}

fn builtin_append(args: &[Value]) -> Result<Value, Error> {
    let mut result = args[0].clone();
    for arg in &args[1..] {
        result = merge(&result, arg)?;
    }
    Ok(result)
}

/// Append `b` to the proper list `a`. A non-list `b` is appended as a
/// final element rather than a dotted tail.
fn merge(a: &Value, b: &Value) -> Result<Value, Error> {
    match a {
        Value::Nil => {
            if b.is_list() {
                Ok(b.clone())
            } else {
                Ok(list_from([b.clone()]))
            }
        }
        Value::Pair(cell) if a.is_list() => {
            let (car, cdr) = {
                let p = cell.borrow();
                (p.car.clone(), p.cdr.clone())
            };
            let rest = merge(&cdr, b)?;
            Ok(Value::pair(car, rest))
        }
        other => Err(Error::TypeError(format!("{other} is not a list"))),
    }
}

fn builtin_set_car(args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::Pair(cell) => {
            cell.borrow_mut().car = args[1].clone();
            Ok(Value::Undef)
        }
        other => Err(Error::TypeError(format!("{other} is not a pair"))),
    }
}

fn builtin_set_cdr(args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::Pair(cell) => {
            cell.borrow_mut().cdr = args[1].clone();
            Ok(Value::Undef)
        }
        other => Err(Error::TypeError(format!("{other} is not a pair"))),
    }
}

fn builtin_concat(args: &[Value]) -> Result<Value, Error> {
    let mut result = String::new();
    for arg in args {
        match arg {
            Value::Str(s) => result.push_str(s),
            other => return Err(Error::TypeError(format!("argument {other} is not a string"))),
        }
    }
    Ok(Value::Str(result))
}

/// `display` writes a string's raw contents, or the printed form of any
/// other value, without a trailing newline.
fn builtin_display(args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::Str(s) => print!("{s}"),
        other => print!("{other}"),
    }
    Ok(Value::Undef)
}

fn builtin_displayln(args: &[Value]) -> Result<Value, Error> {
    let result = builtin_display(args)?;
    println!();
    Ok(result)
}

fn builtin_is_thunk(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(matches!(args[0], Value::Thunk(_))))
}

fn builtin_force(args: &[Value]) -> Result<Value, Error> {
    force_value(&args[0])
}

/// Raise the process-wide exit flag; the driver observes it and
/// terminates.
fn builtin_exit(_args: &[Value]) -> Result<Value, Error> {
    signal::request_exit();
    Ok(Value::Nil)
}

/// The static registry of every primitive procedure.
static BUILTIN_OPS: &[BuiltinOp] = &[
    BuiltinOp { name: "+", arity: Arity::AtLeast(1), func: builtin_add },
    BuiltinOp { name: "-", arity: Arity::AtLeast(1), func: builtin_sub },
    BuiltinOp { name: "*", arity: Arity::AtLeast(1), func: builtin_mul },
    BuiltinOp { name: "/", arity: Arity::AtLeast(1), func: builtin_div },
    BuiltinOp { name: "=", arity: Arity::Exact(2), func: builtin_eq },
    BuiltinOp { name: "<", arity: Arity::Exact(2), func: builtin_lt },
    BuiltinOp { name: ">", arity: Arity::Exact(2), func: builtin_gt },
    BuiltinOp { name: "<=", arity: Arity::Exact(2), func: builtin_le },
    BuiltinOp { name: ">=", arity: Arity::Exact(2), func: builtin_ge },
    BuiltinOp { name: "not", arity: Arity::Exact(1), func: builtin_not },
    BuiltinOp { name: "null?", arity: Arity::Exact(1), func: builtin_is_null },
    BuiltinOp { name: "string?", arity: Arity::Exact(1), func: builtin_is_string },
    BuiltinOp { name: "cons", arity: Arity::Exact(2), func: builtin_cons },
    BuiltinOp { name: "car", arity: Arity::Exact(1), func: builtin_car },
    BuiltinOp { name: "cdr", arity: Arity::Exact(1), func: builtin_cdr },
    BuiltinOp { name: "list", arity: Arity::Any, func: builtin_list },
    BuiltinOp { name: "append", arity: Arity::AtLeast(2), func: builtin_append },
    BuiltinOp { name: "set-car!", arity: Arity::Exact(2), func: builtin_set_car },
    BuiltinOp { name: "set-cdr!", arity: Arity::Exact(2), func: builtin_set_cdr },
    BuiltinOp { name: "concat", arity: Arity::AtLeast(2), func: builtin_concat },
    BuiltinOp { name: "display", arity: Arity::Exact(1), func: builtin_display },
    BuiltinOp { name: "displayln", arity: Arity::Exact(1), func: builtin_displayln },
    BuiltinOp { name: "thunk?", arity: Arity::Exact(1), func: builtin_is_thunk },
    BuiltinOp { name: "force", arity: Arity::Exact(1), func: builtin_force },
    BuiltinOp { name: "exit", arity: Arity::Exact(0), func: builtin_exit },
];

static BUILTIN_INDEX: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| BUILTIN_OPS.iter().map(|op| (op.name, op)).collect());

/// All builtin operations, in registry order.
pub(crate) fn all_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

/// Find a builtin by name.
pub fn find_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_INDEX.get(name).copied()
}

/// List procedures defined in Scheme and evaluated at bootstrap.
pub(crate) const PRELUDE: &str = "
(define (map procedure list-arguments)
  (cond
    ((null? list-arguments) '())
    (else
      (cons (procedure (car list-arguments))
            (map procedure (cdr list-arguments))))))

(define (filter predicate sequence)
  (cond ((null? sequence) '())
        ((predicate (car sequence))
         (cons (car sequence)
               (filter predicate (cdr sequence))))
        (else (filter predicate (cdr sequence)))))

(define (reduce proc items)
  (if (null? items)
      0
      (proc (car items) (reduce proc (cdr items)))))

(define (remainder a b)
  (if (< a b)
      a
      (remainder (- a b) b)))

(define list-ref
  (lambda (lst place)
    (if (null? lst)
        '()
        (if (= place 0)
            (car lst)
            (list-ref (cdr lst) (- place 1))))))

(define (list-set! list k val)
  (if (= k 0)
      (set-car! list val)
      (list-set! (cdr list) (- k 1) val)))

(define (list-length lst)
  (if (null? lst) 0 (+ (list-length (cdr lst)) 1)))
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{list_from, val};

    /// Invoke a builtin through the registry, including arity checking.
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        find_op(name).expect("builtin not found").call(args)
    }

    #[test]
    fn test_registry_lookup() {
        let add = find_op("+").unwrap();
        assert_eq!(add.name, "+");
        assert_eq!(add.arity, Arity::AtLeast(1));

        assert!(find_op("car").is_some());
        assert!(find_op("no-such-op").is_none());
        assert_eq!(all_ops().len(), BUILTIN_OPS.len());
    }

    #[test]
    fn test_arithmetic_folds() {
        // (name, args, expected result); None means any error.
        let cases: Vec<(&str, Vec<Value>, Option<Value>)> = vec![
            ("+", vec![val(1), val(2), val(3)], Some(val(6))),
            ("+", vec![val(5)], Some(val(5))),
            ("+", vec![], None), // at least 1 argument
            ("-", vec![val(10), val(1), val(2)], Some(val(7))),
            // The single-argument fold returns its seed unchanged; there
            // is no unary negation.
            ("-", vec![val(5)], Some(val(5))),
            ("*", vec![val(2), val(3), val(4)], Some(val(24))),
            ("*", vec![val(7)], Some(val(7))),
            ("/", vec![val(12), val(2), val(3)], Some(val(2))),
            ("/", vec![val(5)], Some(val(5))),
            ("/", vec![val(1), val(0)], Some(val(f64::INFINITY))),
            ("+", vec![val(1), val("x")], None),
            ("-", vec![val(true)], None),
        ];
        for (name, args, expected) in cases {
            match (call_builtin(name, &args), expected) {
                (Ok(actual), Some(value)) => {
                    assert_eq!(actual, value, "({name} {args:?})");
                }
                (Err(_), None) => {}
                (result, expected) => {
                    panic!("({name} {args:?}): got {result:?}, expected {expected:?}")
                }
            }
        }
    }

    #[test]
    fn test_comparisons_and_identity() {
        assert_eq!(call_builtin("<", &[val(1), val(2)]).unwrap(), val(true));
        assert_eq!(call_builtin(">", &[val(1), val(2)]).unwrap(), val(false));
        assert_eq!(call_builtin("<=", &[val(2), val(2)]).unwrap(), val(true));
        assert_eq!(call_builtin(">=", &[val(1), val(2)]).unwrap(), val(false));
        assert_eq!(call_builtin("=", &[val(3), val(3)]).unwrap(), val(true));

        // Comparisons are binary.
        assert!(call_builtin("<", &[val(1)]).is_err());
        assert!(call_builtin("<", &[val(1), val(2), val(3)]).is_err());
        assert!(call_builtin("<", &[val("a"), val(2)]).is_err());

        // Non-numeric `=` is the identity relation: structural atoms,
        // pointer-identical pairs.
        assert_eq!(call_builtin("=", &[val("a"), val("a")]).unwrap(), val(true));
        let a = list_from(vec![val(1)]);
        let b = list_from(vec![val(1)]);
        assert_eq!(call_builtin("=", &[a.clone(), b]).unwrap(), val(false));
        assert_eq!(call_builtin("=", &[a.clone(), a]).unwrap(), val(true));
        assert_eq!(call_builtin("=", &[val(1), val("1")]).unwrap(), val(false));
    }

    #[test]
    fn test_pair_operations() {
        let pair = call_builtin("cons", &[val(1), val(2)]).unwrap();
        assert_eq!(format!("{pair}"), "(1 . 2)");
        assert_eq!(call_builtin("car", &[pair.clone()]).unwrap(), val(1));
        assert_eq!(call_builtin("cdr", &[pair.clone()]).unwrap(), val(2));

        assert!(call_builtin("car", &[val(1)]).is_err());
        assert!(call_builtin("cdr", &[Value::Nil]).is_err());

        let list = call_builtin("list", &[val(1), val(2), val(3)]).unwrap();
        assert_eq!(format!("{list}"), "(1 2 3)");
        assert_eq!(call_builtin("list", &[]).unwrap(), Value::Nil);

        call_builtin("set-car!", &[pair.clone(), val(9)]).unwrap();
        assert_eq!(format!("{pair}"), "(9 . 2)");
        call_builtin("set-cdr!", &[pair.clone(), Value::Nil]).unwrap();
        assert_eq!(format!("{pair}"), "(9)");
    }

    #[test]
    fn test_append_merge() {
        let cases: Vec<(Vec<Value>, &str)> = vec![
            (
                vec![list_from(vec![val(1)]), list_from(vec![val(2)])],
                "(1 2)",
            ),
            // A non-list second operand is appended as an element.
            (vec![list_from(vec![val(1), val(2)]), val(3)], "(1 2 3)"),
            (vec![Value::Nil, list_from(vec![val(1)])], "(1)"),
            (vec![Value::Nil, val(1)], "(1)"),
            (
                vec![
                    list_from(vec![val(1)]),
                    list_from(vec![val(2)]),
                    list_from(vec![val(3)]),
                ],
                "(1 2 3)",
            ),
        ];
        for (args, expected) in cases {
            let result = call_builtin("append", &args).unwrap();
            assert_eq!(format!("{result}"), expected);
        }

        assert!(call_builtin("append", &[val(1), val(2)]).is_err());
        assert!(call_builtin("append", &[Value::Nil]).is_err());
    }

    #[test]
    fn test_predicates() {
        assert_eq!(call_builtin("null?", &[Value::Nil]).unwrap(), val(true));
        assert_eq!(call_builtin("null?", &[val(0)]).unwrap(), val(false));
        assert_eq!(call_builtin("string?", &[val("x")]).unwrap(), val(true));
        assert_eq!(call_builtin("string?", &[val(1)]).unwrap(), val(false));
        assert_eq!(call_builtin("not", &[val(false)]).unwrap(), val(true));
        // Truthiness: everything except #f negates to #f.
        assert_eq!(call_builtin("not", &[val(0)]).unwrap(), val(false));
        assert_eq!(call_builtin("not", &[Value::Nil]).unwrap(), val(false));
    }

    #[test]
    fn test_concat() {
        assert_eq!(
            call_builtin("concat", &[val("foo"), val("bar")]).unwrap(),
            val("foobar")
        );
        assert!(call_builtin("concat", &[val("a")]).is_err());
        let err = call_builtin("concat", &[val("a"), val(1)]).unwrap_err();
        assert!(format!("{err}").contains("is not a string"));
    }

    #[test]
    fn test_force_passes_non_thunks_through() {
        assert_eq!(call_builtin("force", &[val(5)]).unwrap(), val(5));
        assert_eq!(call_builtin("thunk?", &[val(5)]).unwrap(), val(false));
    }

    #[test]
    fn test_arity_validation() {
        use Arity::*;

        Exact(2).validate("f", 2).unwrap();
        Exact(2).validate("f", 1).unwrap_err();
        AtLeast(1).validate("f", 5).unwrap();
        AtLeast(1).validate("f", 0).unwrap_err();
        Range(1, 3).validate("f", 2).unwrap();
        Range(1, 3).validate("f", 0).unwrap_err();
        Range(1, 3).validate("f", 4).unwrap_err();
        Any.validate("f", 0).unwrap();
        Any.validate("f", 100).unwrap();

        let err = Exact(2).validate("cons", 3).unwrap_err();
        assert_eq!(
            format!("{err}"),
            "cons requires 2 arguments but 3 arguments provided"
        );
        let err = AtLeast(1).validate("+", 0).unwrap_err();
        assert_eq!(
            format!("{err}"),
            "+ requires at least 1 arguments but 0 arguments provided"
        );
    }
}
