// Tree-walking evaluator for rule expressions. Bindings live in an
// explicit environment passed by the caller; there is no interpreter-level
// global state, which is what makes concurrent evaluation safe.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use super::{Lambda, Value, parser::Expr};

// Guards against runaway recursion in hostile or buggy rules.
const MAX_DEPTH: usize = 128;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum EvalError {
    #[error("bad program: {0}")]
    BadProgram(String),
    #[error("unbound symbol '{0}'")]
    Unbound(String),
    #[error("'{0}' is not callable")]
    NotCallable(String),
    #[error("wrong argument count for '{0}'")]
    Arity(String),
    #[error("type error in '{0}': expected {1}")]
    Type(String, &'static str),
    #[error("division by zero")]
    DivideByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("expression nesting too deep")]
    TooDeep,
    #[error("cannot evaluate empty list")]
    EmptyList,
}

// Lexical scopes, innermost last.
#[derive(Clone, Debug, Default)]
pub struct Env {
    frames: Vec<HashMap<String, Value>>,
}

impl Env {
    pub fn new() -> Self {
        Env {
            frames: vec![HashMap::new()],
        }
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    fn push(&mut self, frame: HashMap<String, Value>) {
        self.frames.push(frame);
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    // Flattened view, outer bindings shadowed by inner ones; used for
    // lambda capture.
    fn flatten(&self) -> Vec<(String, Value)> {
        let mut merged: HashMap<String, Value> = HashMap::new();
        for frame in &self.frames {
            for (name, value) in frame {
                merged.insert(name.clone(), value.clone());
            }
        }
        merged.into_iter().collect()
    }
}

// Evaluates a whole program: forms run in order sharing one environment
// (so `define` accumulates), the last form's value is the result.
pub fn eval_program(forms: &[Expr], env: &mut Env) -> Result<Value, EvalError> {
    let mut result = None;
    for form in forms {
        result = Some(eval(form, env, 0)?);
    }
    result.ok_or(EvalError::BadProgram("empty program".to_string()))
}

fn eval(expr: &Expr, env: &mut Env, depth: usize) -> Result<Value, EvalError> {
    if depth > MAX_DEPTH {
        return Err(EvalError::TooDeep);
    }

    match expr {
        Expr::Int(i) => Ok(Value::Int(*i)),
        Expr::Float(x) => Ok(Value::Float(*x)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Sym(name) => env
            .lookup(name)
            .cloned()
            .ok_or_else(|| EvalError::Unbound(name.clone())),
        Expr::List(items) => eval_list(items, env, depth),
    }
}

fn eval_list(items: &[Expr], env: &mut Env, depth: usize) -> Result<Value, EvalError> {
    let (head, rest) = items.split_first().ok_or(EvalError::EmptyList)?;

    if let Expr::Sym(name) = head {
        match name.as_str() {
            "if" => return eval_if(rest, env, depth),
            "and" | "or" => return eval_junction(name, rest, env, depth),
            "define" => return eval_define(rest, env, depth),
            "let" => return eval_let(rest, env, depth),
            "lambda" => return make_lambda(rest, env),
            _ => {}
        }

        if is_builtin(name) {
            let args = eval_args(rest, env, depth)?;
            return call_builtin(name, &args);
        }
    }

    // Anything else must evaluate to a lambda.
    let callee = eval(head, env, depth + 1)?;
    let args = eval_args(rest, env, depth)?;
    match callee {
        Value::Lambda(lambda) => apply_lambda(&lambda, args, depth),
        other => Err(EvalError::NotCallable(other.type_name().to_string())),
    }
}

fn eval_args(forms: &[Expr], env: &mut Env, depth: usize) -> Result<Vec<Value>, EvalError> {
    forms.iter().map(|form| eval(form, env, depth + 1)).collect()
}

fn eval_if(rest: &[Expr], env: &mut Env, depth: usize) -> Result<Value, EvalError> {
    if rest.len() != 3 {
        return Err(EvalError::Arity("if".to_string()));
    }
    match eval(&rest[0], env, depth + 1)? {
        Value::Bool(true) => eval(&rest[1], env, depth + 1),
        Value::Bool(false) => eval(&rest[2], env, depth + 1),
        _ => Err(EvalError::Type("if".to_string(), "bool condition")),
    }
}

fn eval_junction(name: &str, rest: &[Expr], env: &mut Env, depth: usize) -> Result<Value, EvalError> {
    let stop_on = name == "or";
    for form in rest {
        match eval(form, env, depth + 1)? {
            Value::Bool(b) if b == stop_on => return Ok(Value::Bool(stop_on)),
            Value::Bool(_) => {}
            _ => return Err(EvalError::Type(name.to_string(), "bool operands")),
        }
    }
    Ok(Value::Bool(!stop_on))
}

fn eval_define(rest: &[Expr], env: &mut Env, depth: usize) -> Result<Value, EvalError> {
    match rest {
        [Expr::Sym(name), form] => {
            let value = eval(form, env, depth + 1)?;
            env.bind(name, value.clone());
            Ok(value)
        }
        _ => Err(EvalError::Arity("define".to_string())),
    }
}

fn eval_let(rest: &[Expr], env: &mut Env, depth: usize) -> Result<Value, EvalError> {
    let (bindings, body) = rest
        .split_first()
        .ok_or(EvalError::Arity("let".to_string()))?;
    if body.is_empty() {
        return Err(EvalError::Arity("let".to_string()));
    }

    let Expr::List(pairs) = bindings else {
        return Err(EvalError::Type("let".to_string(), "binding list"));
    };

    let mut frame = HashMap::new();
    for pair in pairs {
        match pair {
            Expr::List(entry) => match entry.as_slice() {
                [Expr::Sym(name), form] => {
                    let value = eval(form, env, depth + 1)?;
                    frame.insert(name.clone(), value);
                }
                _ => return Err(EvalError::Type("let".to_string(), "(name expr) pairs")),
            },
            _ => return Err(EvalError::Type("let".to_string(), "(name expr) pairs")),
        }
    }

    env.push(frame);
    let mut result = Err(EvalError::Arity("let".to_string()));
    for form in body {
        result = eval(form, env, depth + 1);
        if result.is_err() {
            break;
        }
    }
    env.pop();
    result
}

fn make_lambda(rest: &[Expr], env: &Env) -> Result<Value, EvalError> {
    let (params_form, body) = rest
        .split_first()
        .ok_or(EvalError::Arity("lambda".to_string()))?;
    if body.is_empty() {
        return Err(EvalError::Arity("lambda".to_string()));
    }

    let Expr::List(param_forms) = params_form else {
        return Err(EvalError::Type("lambda".to_string(), "parameter list"));
    };

    let mut params = Vec::with_capacity(param_forms.len());
    for form in param_forms {
        match form {
            Expr::Sym(name) => params.push(name.clone()),
            _ => return Err(EvalError::Type("lambda".to_string(), "symbol parameters")),
        }
    }

    Ok(Value::Lambda(Arc::new(Lambda {
        params,
        body: body.to_vec(),
        captured: env.flatten(),
    })))
}

fn apply_lambda(lambda: &Lambda, args: Vec<Value>, depth: usize) -> Result<Value, EvalError> {
    if args.len() != lambda.params.len() {
        return Err(EvalError::Arity("lambda".to_string()));
    }

    let mut env = Env::new();
    for (name, value) in &lambda.captured {
        env.bind(name, value.clone());
    }
    let mut frame = HashMap::new();
    for (param, arg) in lambda.params.iter().zip(args) {
        frame.insert(param.clone(), arg);
    }
    env.push(frame);

    let mut result = Err(EvalError::Arity("lambda".to_string()));
    for form in &lambda.body {
        result = eval(form, &mut env, depth + 1);
        if result.is_err() {
            break;
        }
    }
    result
}

fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "+" | "-"
            | "*"
            | "/"
            | "mod"
            | "="
            | "=="
            | "!="
            | "<"
            | "<="
            | ">"
            | ">="
            | "not"
            | "str-contains?"
            | "str-prefix?"
            | "str-suffix?"
            | "str-concat"
            | "str-len"
            | "ver="
            | "ver<"
            | "ver<="
            | "ver>"
            | "ver>="
    )
}

fn call_builtin(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "+" | "*" => fold_arith(name, args),
        "-" => match args {
            [] => Err(EvalError::Arity("-".to_string())),
            [Value::Int(i)] => i
                .checked_neg()
                .map(Value::Int)
                .ok_or(EvalError::Overflow),
            [Value::Float(x)] => Ok(Value::Float(-x)),
            _ => fold_arith(name, args),
        },
        "/" => fold_arith(name, args),
        "mod" => match args {
            [Value::Int(a), Value::Int(b)] => {
                if *b == 0 {
                    Err(EvalError::DivideByZero)
                } else {
                    Ok(Value::Int(a.rem_euclid(*b)))
                }
            }
            [_, _] => Err(EvalError::Type("mod".to_string(), "int operands")),
            _ => Err(EvalError::Arity("mod".to_string())),
        },
        "=" | "==" => binary(name, args, |a, b| Ok(Value::Bool(values_equal(a, b)))),
        "!=" => binary(name, args, |a, b| Ok(Value::Bool(!values_equal(a, b)))),
        "<" => ordered(name, args, |o| o == Ordering::Less),
        "<=" => ordered(name, args, |o| o != Ordering::Greater),
        ">" => ordered(name, args, |o| o == Ordering::Greater),
        ">=" => ordered(name, args, |o| o != Ordering::Less),
        "not" => match args {
            [Value::Bool(b)] => Ok(Value::Bool(!b)),
            [_] => Err(EvalError::Type("not".to_string(), "bool operand")),
            _ => Err(EvalError::Arity("not".to_string())),
        },
        "str-contains?" => str_pred(name, args, |s, p| s.contains(p)),
        "str-prefix?" => str_pred(name, args, |s, p| s.starts_with(p)),
        "str-suffix?" => str_pred(name, args, |s, p| s.ends_with(p)),
        "str-concat" => {
            let mut out = String::new();
            for arg in args {
                match arg {
                    Value::Str(s) => out.push_str(s),
                    _ => return Err(EvalError::Type(name.to_string(), "string operands")),
                }
            }
            Ok(Value::Str(out))
        }
        "str-len" => match args {
            [Value::Str(s)] => Ok(Value::Int(s.chars().count() as i64)),
            [_] => Err(EvalError::Type(name.to_string(), "string operand")),
            _ => Err(EvalError::Arity(name.to_string())),
        },
        "ver=" => version_pred(name, args, |o| o == Ordering::Equal),
        "ver<" => version_pred(name, args, |o| o == Ordering::Less),
        "ver<=" => version_pred(name, args, |o| o != Ordering::Greater),
        "ver>" => version_pred(name, args, |o| o == Ordering::Greater),
        "ver>=" => version_pred(name, args, |o| o != Ordering::Less),
        _ => Err(EvalError::Unbound(name.to_string())),
    }
}

fn fold_arith(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    let (first, rest) = args.split_first().ok_or(EvalError::Arity(name.to_string()))?;
    if rest.is_empty() {
        return Err(EvalError::Arity(name.to_string()));
    }

    let mut acc = first.clone();
    for arg in rest {
        acc = arith(name, &acc, arg)?;
    }
    Ok(acc)
}

fn arith(name: &str, a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match name {
                "+" => a.checked_add(*b),
                "-" => a.checked_sub(*b),
                "*" => a.checked_mul(*b),
                "/" => {
                    if *b == 0 {
                        return Err(EvalError::DivideByZero);
                    }
                    a.checked_div(*b)
                }
                _ => None,
            };
            result.map(Value::Int).ok_or(EvalError::Overflow)
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let a = as_float(a);
            let b = as_float(b);
            let result = match name {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" => {
                    if b == 0.0 {
                        return Err(EvalError::DivideByZero);
                    }
                    a / b
                }
                _ => return Err(EvalError::Unbound(name.to_string())),
            };
            Ok(Value::Float(result))
        }
        _ => Err(EvalError::Type(name.to_string(), "numeric operands")),
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(x) => *x,
        _ => f64::NAN,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            as_float(a) == as_float(b)
        }
        _ => a == b,
    }
}

fn binary(
    name: &str,
    args: &[Value],
    f: impl Fn(&Value, &Value) -> Result<Value, EvalError>,
) -> Result<Value, EvalError> {
    match args {
        [a, b] => f(a, b),
        _ => Err(EvalError::Arity(name.to_string())),
    }
}

fn ordered(name: &str, args: &[Value], f: impl Fn(Ordering) -> bool) -> Result<Value, EvalError> {
    binary(name, args, |a, b| {
        let ordering = match (a, b) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => as_float(a)
                .partial_cmp(&as_float(b))
                .ok_or(EvalError::Type(name.to_string(), "comparable numbers"))?,
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => return Err(EvalError::Type(name.to_string(), "two numbers or two strings")),
        };
        Ok(Value::Bool(f(ordering)))
    })
}

fn str_pred(
    name: &str,
    args: &[Value],
    f: impl Fn(&str, &str) -> bool,
) -> Result<Value, EvalError> {
    match args {
        [Value::Str(s), Value::Str(p)] => Ok(Value::Bool(f(s, p))),
        [_, _] => Err(EvalError::Type(name.to_string(), "string operands")),
        _ => Err(EvalError::Arity(name.to_string())),
    }
}

// Dotted version strings compare segment-wise, numerically where both
// segments parse as integers ("2.10" > "2.9"); missing segments count as
// zero ("1.2" == "1.2.0").
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = a.split('.').collect();
    let right: Vec<&str> = b.split('.').collect();
    let len = left.len().max(right.len());

    for ix in 0..len {
        let ls = left.get(ix).copied().unwrap_or("0");
        let rs = right.get(ix).copied().unwrap_or("0");
        let ordering = match (ls.parse::<i64>(), rs.parse::<i64>()) {
            (Ok(ln), Ok(rn)) => ln.cmp(&rn),
            _ => ls.cmp(rs),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

fn version_pred(
    name: &str,
    args: &[Value],
    f: impl Fn(Ordering) -> bool,
) -> Result<Value, EvalError> {
    match args {
        [Value::Str(a), Value::Str(b)] => Ok(Value::Bool(f(compare_versions(a, b)))),
        [_, _] => Err(EvalError::Type(name.to_string(), "version strings")),
        _ => Err(EvalError::Arity(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::parser::parse_program;

    fn run(source: &str) -> Result<Value, EvalError> {
        let forms = parse_program(source).expect("parse");
        let mut env = Env::new();
        env.bind("OS_TYPE", Value::Str("ios".to_string()));
        env.bind("APP_VERSION", Value::Str("2.4.0".to_string()));
        env.bind("LANG", Value::Str("en".to_string()));
        eval_program(&forms, &mut env)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("(+ 1 2 3)").unwrap(), Value::Int(6));
        assert_eq!(run("(- 10 4)").unwrap(), Value::Int(6));
        assert_eq!(run("(- 5)").unwrap(), Value::Int(-5));
        assert_eq!(run("(* 2 3 4)").unwrap(), Value::Int(24));
        assert_eq!(run("(/ 9 2)").unwrap(), Value::Int(4));
        assert_eq!(run("(/ 9.0 2)").unwrap(), Value::Float(4.5));
        assert_eq!(run("(mod 7 3)").unwrap(), Value::Int(1));
        assert_eq!(run("(/ 1 0)").unwrap_err(), EvalError::DivideByZero);
    }

    #[test]
    fn test_comparison_and_equality() {
        assert_eq!(run("(== 1 1.0)").unwrap(), Value::Bool(true));
        assert_eq!(run("(!= \"a\" \"b\")").unwrap(), Value::Bool(true));
        assert_eq!(run("(< 1 2)").unwrap(), Value::Bool(true));
        assert_eq!(run("(>= \"b\" \"a\")").unwrap(), Value::Bool(true));
        assert_eq!(
            run("(< 1 \"x\")").unwrap_err(),
            EvalError::Type("<".to_string(), "two numbers or two strings")
        );
    }

    #[test]
    fn test_boolean_forms() {
        assert_eq!(run("(and true true false)").unwrap(), Value::Bool(false));
        assert_eq!(run("(or false true)").unwrap(), Value::Bool(true));
        assert_eq!(run("(not false)").unwrap(), Value::Bool(true));
        // Short circuit: the unbound symbol after the deciding operand is
        // never evaluated.
        assert_eq!(run("(or true NEVER)").unwrap(), Value::Bool(true));
        assert_eq!(run("(and false NEVER)").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_if_requires_bool() {
        assert_eq!(run("(if (== OS_TYPE \"ios\") 1 0)").unwrap(), Value::Int(1));
        assert_eq!(
            run("(if 1 2 3)").unwrap_err(),
            EvalError::Type("if".to_string(), "bool condition")
        );
    }

    #[test]
    fn test_client_bindings() {
        assert_eq!(run("OS_TYPE").unwrap(), Value::Str("ios".to_string()));
        assert_eq!(run("MISSING").unwrap_err(), EvalError::Unbound("MISSING".to_string()));
    }

    #[test]
    fn test_string_builtins() {
        assert_eq!(run("(str-contains? LANG \"e\")").unwrap(), Value::Bool(true));
        assert_eq!(run("(str-prefix? OS_TYPE \"io\")").unwrap(), Value::Bool(true));
        assert_eq!(run("(str-suffix? OS_TYPE \"os\")").unwrap(), Value::Bool(true));
        assert_eq!(
            run("(str-concat OS_TYPE \"-\" LANG)").unwrap(),
            Value::Str("ios-en".to_string())
        );
        assert_eq!(run("(str-len \"abc\")").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_version_compare() {
        assert_eq!(run("(ver>= APP_VERSION \"2.4\")").unwrap(), Value::Bool(true));
        assert_eq!(run("(ver< \"2.9\" \"2.10\")").unwrap(), Value::Bool(true));
        assert_eq!(run("(ver= \"1.2\" \"1.2.0\")").unwrap(), Value::Bool(true));
        assert_eq!(run("(ver> \"3.0.1\" \"3.0\")").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_let_scoping() {
        assert_eq!(run("(let ((x 2) (y 3)) (* x y))").unwrap(), Value::Int(6));
        // Bindings vanish after the body.
        assert_eq!(
            run("(let ((x 2)) x) x").unwrap_err(),
            EvalError::Unbound("x".to_string())
        );
    }

    #[test]
    fn test_define_and_lambda_helpers() {
        let source = r#"
            (define ios? (lambda (os) (== os "ios")))
            (if (ios? OS_TYPE) 10 20)
        "#;
        assert_eq!(run(source).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_lambda_captures_definition_scope() {
        let source = r#"
            (define base 100)
            (define plus-base (lambda (n) (+ n base)))
            (plus-base 5)
        "#;
        assert_eq!(run(source).unwrap(), Value::Int(105));
    }

    #[test]
    fn test_lambda_arity_checked() {
        assert_eq!(
            run("((lambda (a b) (+ a b)) 1)").unwrap_err(),
            EvalError::Arity("lambda".to_string())
        );
    }

    #[test]
    fn test_fresh_frames_do_not_leak_between_programs() {
        assert_eq!(run("(define x 1) (+ x 1)").unwrap(), Value::Int(2));
        // The next run starts clean.
        assert_eq!(run("x").unwrap_err(), EvalError::Unbound("x".to_string()));
    }

    #[test]
    fn test_depth_guard() {
        let mut source = String::new();
        for _ in 0..200 {
            source.push_str("(+ 1 ");
        }
        source.push('1');
        for _ in 0..200 {
            source.push(')');
        }
        assert_eq!(run(&source).unwrap_err(), EvalError::TooDeep);
    }

    #[test]
    fn test_calling_non_callable() {
        assert_eq!(
            run("(3 1 2)").unwrap_err(),
            EvalError::NotCallable("int".to_string())
        );
    }
}
