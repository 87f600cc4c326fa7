// Rule expression engine: a small parenthesized prefix-form language
// evaluated against per-request client attribute bindings.
//
// A rule program is a sequence of forms; the value of the last form is the
// rule's result. Parsing happens once, when the config is authored;
// evaluation happens per client request with a fresh environment, so
// concurrent evaluations never share state.

pub mod eval;
pub mod parser;

use std::sync::Arc;

use serde::{Serialize, Serializer};

pub use self::eval::{Env, EvalError, eval_program};
pub use self::parser::{Expr, ParseError, parse_program};

use crate::model::client::ClientData;

// Runtime values. Lambda only exists while a program runs; a program whose
// final value is a lambda yields no config value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Lambda(Arc<Lambda>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Vec<Expr>,
    pub captured: Vec<(String, Value)>,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Lambda(_) => "lambda",
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Lambda(_))
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            // Unreachable through the resolver; kept total for logging.
            Value::Lambda(_) => serializer.serialize_none(),
        }
    }
}

// Binding frame for one evaluation: the seven client attributes, all
// strings, matching what the operator console documents for rule authors.
pub fn client_env(client: &ClientData) -> Env {
    let mut env = Env::new();
    env.bind("APP_KEY", Value::Str(client.app_key.clone()));
    env.bind("OS_TYPE", Value::Str(client.os_type.clone()));
    env.bind("OS_VERSION", Value::Str(client.os_version.clone()));
    env.bind("APP_VERSION", Value::Str(client.app_version.clone()));
    env.bind("IP", Value::Str(client.ip.clone()));
    env.bind("LANG", Value::Str(client.lang.clone()));
    env.bind("DEVICE_ID", Value::Str(client.device_id.clone()));
    env
}

// Parse-then-evaluate convenience used by the resolver.
pub fn eval_rule(source: &str, client: &ClientData) -> Result<Value, EvalError> {
    let program = parse_program(source).map_err(|e| EvalError::BadProgram(e.to_string()))?;
    let mut env = client_env(client);
    eval_program(&program, &mut env)
}
