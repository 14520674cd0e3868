use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::types::Value;

use super::ast::{BinaryOp, Node, UnaryOp};

/// Capability for resolving identifiers during evaluation.
///
/// Implemented by [`EvalContext`](crate::EvalContext) and by plain maps.
pub trait ValueGetter {
    fn get(&self, key: &str) -> Option<Value>;
}

impl ValueGetter for HashMap<String, Value> {
    fn get(&self, key: &str) -> Option<Value> {
        HashMap::get(self, key).cloned()
    }
}

/// A function callable from expressions.
pub type ExprFn = Arc<dyn Fn(&[Value]) -> Result<Value, Error> + Send + Sync>;

/// Tree-walking evaluator with a per-instance function registry.
#[derive(Clone)]
pub(crate) struct Evaluator {
    funcs: HashMap<String, ExprFn>,
}

impl Evaluator {
    pub(crate) fn new() -> Self {
        let mut evaluator = Self {
            funcs: HashMap::new(),
        };
        evaluator.register("min", builtin_min);
        evaluator.register("max", builtin_max);
        evaluator.register("abs", builtin_abs);
        evaluator.register("floor", builtin_floor);
        evaluator.register("ceil", builtin_ceil);
        evaluator.register("round", builtin_round);
        evaluator.register("if", builtin_if);
        evaluator.register("sqrt", builtin_sqrt);
        evaluator.register("pow", builtin_pow);
        evaluator
    }

    fn register(&mut self, name: &str, f: fn(&[Value]) -> Result<Value, Error>) {
        self.funcs.insert(name.to_owned(), Arc::new(f));
    }

    pub(crate) fn register_fn(&mut self, name: impl Into<String>, f: ExprFn) {
        self.funcs.insert(name.into(), f);
    }

    pub(crate) fn eval(&self, node: &Node, getter: &dyn ValueGetter) -> Result<Value, Error> {
        match node {
            Node::Number(v) => Ok(Value::Number(*v)),
            Node::Str(s) => Ok(Value::String(s.clone())),
            Node::Bool(b) => Ok(Value::Bool(*b)),

            Node::Ident(name) => getter
                .get(name)
                .ok_or_else(|| Error::Evaluation(format!("undefined variable: {name}"))),

            Node::Unary { op, expr } => {
                let value = self.eval(expr, getter)?;
                eval_unary(*op, &value)
            }

            Node::Binary { op, left, right } => {
                let left = self.eval(left, getter)?;
                let right = self.eval(right, getter)?;
                eval_binary(*op, &left, &right)
            }

            Node::Call { name, args } => {
                let func = self
                    .funcs
                    .get(name)
                    .ok_or_else(|| Error::Evaluation(format!("undefined function: {name}")))?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, getter)?);
                }
                func.as_ref()(&values)
            }
        }
    }
}

fn eval_unary(op: UnaryOp, value: &Value) -> Result<Value, Error> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.as_bool()?)),
        UnaryOp::Neg => Ok(Value::Number(-value.as_f64()?)),
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Error> {
    match op {
        BinaryOp::And => Ok(Value::Bool(left.as_bool()? && right.as_bool()?)),
        BinaryOp::Or => Ok(Value::Bool(left.as_bool()? || right.as_bool()?)),

        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),

        BinaryOp::Lt => Ok(Value::Bool(left.as_f64()? < right.as_f64()?)),
        BinaryOp::Le => Ok(Value::Bool(left.as_f64()? <= right.as_f64()?)),
        BinaryOp::Gt => Ok(Value::Bool(left.as_f64()? > right.as_f64()?)),
        BinaryOp::Ge => Ok(Value::Bool(left.as_f64()? >= right.as_f64()?)),

        BinaryOp::Add => {
            if let (Value::String(a), Value::String(b)) = (left, right) {
                return Ok(Value::String(format!("{a}{b}")));
            }
            Ok(Value::Number(left.as_f64()? + right.as_f64()?))
        }
        BinaryOp::Sub => Ok(Value::Number(left.as_f64()? - right.as_f64()?)),
        BinaryOp::Mul => Ok(Value::Number(left.as_f64()? * right.as_f64()?)),
        BinaryOp::Div => {
            let divisor = right.as_f64()?;
            if divisor == 0.0 {
                return Err(Error::DivisionByZero);
            }
            Ok(Value::Number(left.as_f64()? / divisor))
        }
        BinaryOp::Rem => {
            let divisor = right.as_f64()?;
            if divisor == 0.0 {
                return Err(Error::DivisionByZero);
            }
            Ok(Value::Number(left.as_f64()? % divisor))
        }
    }
}

/// Numeric comparison when both sides coerce, generic equality otherwise.
fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Ok(a), Ok(b)) = (left.as_f64(), right.as_f64()) {
        return a == b;
    }
    left == right
}

// Built-in functions

fn builtin_min(args: &[Value]) -> Result<Value, Error> {
    if args.len() < 2 {
        return Err(Error::Evaluation("min requires at least 2 arguments".into()));
    }
    let mut result = args[0].as_f64()?;
    for arg in &args[1..] {
        result = result.min(arg.as_f64()?);
    }
    Ok(Value::Number(result))
}

fn builtin_max(args: &[Value]) -> Result<Value, Error> {
    if args.len() < 2 {
        return Err(Error::Evaluation("max requires at least 2 arguments".into()));
    }
    let mut result = args[0].as_f64()?;
    for arg in &args[1..] {
        result = result.max(arg.as_f64()?);
    }
    Ok(Value::Number(result))
}

fn builtin_abs(args: &[Value]) -> Result<Value, Error> {
    let [arg] = args else {
        return Err(Error::Evaluation("abs requires 1 argument".into()));
    };
    Ok(Value::Number(arg.as_f64()?.abs()))
}

fn builtin_floor(args: &[Value]) -> Result<Value, Error> {
    let [arg] = args else {
        return Err(Error::Evaluation("floor requires 1 argument".into()));
    };
    Ok(Value::Number(arg.as_f64()?.floor()))
}

fn builtin_ceil(args: &[Value]) -> Result<Value, Error> {
    let [arg] = args else {
        return Err(Error::Evaluation("ceil requires 1 argument".into()));
    };
    Ok(Value::Number(arg.as_f64()?.ceil()))
}

/// Round half away from zero, optionally to a number of decimal places.
fn builtin_round(args: &[Value]) -> Result<Value, Error> {
    let value = match args {
        [v] => return Ok(Value::Number(v.as_f64()?.round())),
        [v, _] => v.as_f64()?,
        _ => return Err(Error::Evaluation("round requires 1 or 2 arguments".into())),
    };
    let digits = args[1].as_f64()?;
    let multiplier = 10_f64.powf(digits);
    Ok(Value::Number((value * multiplier).round() / multiplier))
}

fn builtin_if(args: &[Value]) -> Result<Value, Error> {
    let [condition, then_value, else_value] = args else {
        return Err(Error::Evaluation(
            "if requires 3 arguments (condition, then, else)".into(),
        ));
    };
    if condition.as_bool()? {
        Ok(then_value.clone())
    } else {
        Ok(else_value.clone())
    }
}

fn builtin_sqrt(args: &[Value]) -> Result<Value, Error> {
    let [arg] = args else {
        return Err(Error::Evaluation("sqrt requires 1 argument".into()));
    };
    Ok(Value::Number(arg.as_f64()?.sqrt()))
}

fn builtin_pow(args: &[Value]) -> Result<Value, Error> {
    let [base, exponent] = args else {
        return Err(Error::Evaluation("pow requires 2 arguments".into()));
    };
    Ok(Value::Number(base.as_f64()?.powf(exponent.as_f64()?)))
}
