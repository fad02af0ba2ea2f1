use pdstemplate::expression::{Expression, LogicalOperator};
use pdstemplate::parser::parse_expression;

use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::evaluator_helpers::{binary_operation, call_method, index, unary_operation};
use crate::runtime_value::RuntimeValue;

const MAX_DEPTH: usize = 256;

/// Turns the text of an embedded expression into a value.
///
/// Implementations only read the environment; bindings are made by the block
/// executor through the capture forms.
pub trait Evaluate {
    fn evaluate(&self, expression: &str, env: &Environment) -> Result<RuntimeValue, RuntimeError>;
}

/// The built-in expression language: parsed on each call, then walked.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionEvaluator;

impl Evaluate for ExpressionEvaluator {
    fn evaluate(&self, expression: &str, env: &Environment) -> Result<RuntimeValue, RuntimeError> {
        let ast = parse_expression(expression)?;
        evaluate(&ast, env, 0)
    }
}

/// Evaluate an Expression AST node to produce a RuntimeValue.
pub fn evaluate(expression: &Expression, env: &Environment, depth: usize) -> Result<RuntimeValue, RuntimeError> {
    if depth > MAX_DEPTH {
        return Err(RuntimeError::RecursionError);
    }
    let depth = depth + 1;

    match expression {
        // --- Literals ---
        Expression::NoneLiteral => Ok(RuntimeValue::None),
        Expression::BooleanLiteral(b) => Ok(RuntimeValue::Boolean(*b)),
        Expression::IntegerLiteral(n) => Ok(RuntimeValue::Integer(*n)),
        Expression::FloatLiteral(n) => Ok(RuntimeValue::Float(*n)),
        Expression::StringLiteral(s) => Ok(RuntimeValue::String(s.clone())),
        Expression::ListLiteral(items) => items
            .iter()
            .map(|item| evaluate(item, env, depth))
            .collect::<Result<Vec<_>, _>>()
            .map(RuntimeValue::List),

        // --- References ---
        Expression::Name(name) => env
            .get_variable(name)
            .cloned()
            .ok_or_else(|| RuntimeError::NameError(name.clone())),

        // --- Operations ---
        Expression::UnaryOperation { operator, operand } => {
            let value = evaluate(operand, env, depth)?;
            unary_operation(*operator, value)
        }

        Expression::BinaryOperation { operator, left, right } => {
            let l = evaluate(left, env, depth)?;
            let r = evaluate(right, env, depth)?;
            binary_operation(*operator, &l, &r)
        }

        // Short-circuit: the result is whichever operand decided it
        Expression::Logical { operator, left, right } => {
            let l = evaluate(left, env, depth)?;
            match (operator, l.is_truthy()) {
                (LogicalOperator::And, false) | (LogicalOperator::Or, true) => Ok(l),
                _ => evaluate(right, env, depth),
            }
        }

        // --- Conditional ---
        Expression::Conditional {
            condition,
            true_branch,
            false_branch,
        } => {
            if evaluate(condition, env, depth)?.is_truthy() {
                evaluate(true_branch, env, depth)
            } else {
                evaluate(false_branch, env, depth)
            }
        }

        // --- Postfix forms ---
        Expression::Call {
            function,
            arguments,
            keywords,
        } => {
            let callee = evaluate(function, env, depth)?;
            let RuntimeValue::Builtin(builtin) = callee else {
                return Err(RuntimeError::TypeError(format!(
                    "'{}' object is not callable",
                    callee.type_name()
                )));
            };
            let arguments = arguments
                .iter()
                .map(|a| evaluate(a, env, depth))
                .collect::<Result<Vec<_>, _>>()?;
            let keywords = keywords
                .iter()
                .map(|(name, value)| Ok((name.clone(), evaluate(value, env, depth)?)))
                .collect::<Result<Vec<_>, RuntimeError>>()?;
            builtin.call(arguments, keywords, env.counters())
        }

        Expression::MethodCall {
            receiver,
            method,
            arguments,
        } => {
            let receiver = evaluate(receiver, env, depth)?;
            let arguments = arguments
                .iter()
                .map(|a| evaluate(a, env, depth))
                .collect::<Result<Vec<_>, _>>()?;
            call_method(&receiver, method, &arguments)
        }

        Expression::Index { value, index: position } => {
            let value = evaluate(value, env, depth)?;
            let position = evaluate(position, env, depth)?;
            index(&value, &position)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Scope;
    use rstest::rstest;

    fn env() -> Environment {
        Environment::new(Scope::from([
            ("TIME".to_string(), RuntimeValue::Integer(2004)),
            ("INST".to_string(), RuntimeValue::from("ISSWA")),
            ("naif_ids".to_string(), RuntimeValue::from(vec![599, 501, 502])),
            ("empty".to_string(), RuntimeValue::from("")),
        ]))
    }

    fn eval(text: &str) -> Result<RuntimeValue, RuntimeError> {
        ExpressionEvaluator.evaluate(text, &env())
    }

    #[rstest]
    #[case("\"Narrow\" if INST == \"ISSNA\" else \"Wide\"", "Wide")]
    #[case("(\"cruise\" if TIME < 2004 else \"saturn\").upper()", "SATURN")]
    #[case("naif_ids[-1] + 1", "503")]
    #[case("empty or 'fallback'", "fallback")]
    #[case("INST and naif_ids[0]", "599")]
    #[case("len(naif_ids) * 2", "6")]
    #[case("7 // 2 + 7 % 2", "4")]
    #[case("'ISS' in INST", "True")]
    #[case("not naif_ids", "False")]
    #[case("str(TIME) + '-001'", "2004-001")]
    #[case("BOOL(TIME > 2000, true='YES')", "YES")]
    #[case("max(naif_ids) - min(naif_ids)", "98")]
    fn evaluates_to(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(eval(text).unwrap().to_string(), expected);
    }

    #[test]
    fn short_circuit_skips_failing_operand() {
        assert_eq!(eval("empty and undefined_name").unwrap(), RuntimeValue::from(""));
        assert_eq!(eval("TIME or 1 / 0").unwrap(), RuntimeValue::Integer(2004));
        assert_eq!(eval("1 if True else undefined_name").unwrap(), RuntimeValue::Integer(1));
    }

    #[test]
    fn failures_carry_python_kinds() {
        assert_eq!(eval("foo").unwrap_err(), RuntimeError::NameError("foo".into()));
        assert_eq!(eval("naif_ids[5]").unwrap_err().kind(), "IndexError");
        assert_eq!(eval("1 / 0").unwrap_err().kind(), "ZeroDivisionError");
        assert_eq!(eval("INST(1)").unwrap_err().kind(), "TypeError");
        assert_eq!(eval("TIME +").unwrap_err().kind(), "SyntaxError");
        assert_eq!(
            eval("RAISE(ValueError, 'stop')").unwrap_err(),
            RuntimeError::Raised { kind: "ValueError".into(), message: "stop".into() }
        );
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let text = format!("{}1{}", "[".repeat(300), "]".repeat(300));
        assert_eq!(eval(&text).unwrap_err().kind(), "SyntaxError");

        let mut nested = Expression::IntegerLiteral(1);
        for _ in 0..300 {
            nested = Expression::ListLiteral(vec![nested]);
        }
        assert_eq!(evaluate(&nested, &env(), 0).unwrap_err(), RuntimeError::RecursionError);
    }
}
