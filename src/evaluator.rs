//! Async tree-walking evaluator.
//!
//! Every node evaluates to a future. Sibling subtrees with no ordering
//! dependency (eager binary operands, array elements, object values, call
//! arguments) are awaited concurrently, so slow async transforms overlap.
//! On-demand operators and conditionals instead receive unawaited futures
//! and decide themselves which branches run.
//!
//! An evaluator carries two contexts: the global one identifiers normally
//! resolve against, and the relative one that leading-dot identifiers inside
//! a filter resolve against. Outside a filter the two coincide.

use futures::future::{BoxFuture, try_join_all};
use thiserror::Error;

use crate::ast::{Expr, Pool};
use crate::grammar::{BinaryStrategy, Grammar};
use crate::value::Value;

/// Failure during evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Unknown transform: {0}")]
    UnknownTransform(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Type error: {0}")]
    Type(String),

    /// Error raised by a registered function or transform
    #[error("{0}")]
    Custom(String),
}

pub struct Evaluator<'a> {
    grammar: &'a Grammar,
    context: &'a Value,
    relative: &'a Value,
}

impl<'a> Evaluator<'a> {
    /// An evaluator over `context`. Until a filter introduces one, the
    /// relative context is the context itself.
    pub fn new(grammar: &'a Grammar, context: &'a Value) -> Self {
        Evaluator {
            grammar,
            context,
            relative: context,
        }
    }

    /// Evaluate a tree to a value.
    pub fn eval<'e>(&'e self, ast: &'e Expr) -> BoxFuture<'e, Result<Value, EvalError>> {
        Box::pin(async move {
            match ast {
                Expr::Literal(value) => Ok(value.clone()),
                Expr::Identifier {
                    value,
                    from,
                    relative,
                } => self.eval_identifier(value, from.as_deref(), *relative).await,
                Expr::Binary {
                    operator,
                    left,
                    right,
                } => self.eval_binary(operator, left, right).await,
                Expr::Unary { operator, right } => {
                    let f = self
                        .grammar
                        .unary_op(operator)
                        .ok_or_else(|| EvalError::UnknownOperator(operator.clone()))?;
                    let value = self.eval(right).await?;
                    f(&value)
                }
                Expr::Conditional {
                    test,
                    consequent,
                    alternate,
                } => {
                    let t = self.eval(test).await?;
                    if t.is_truthy() {
                        match consequent {
                            Some(c) => self.eval(c).await,
                            // Elvis form: a truthy test is its own result
                            None => Ok(t),
                        }
                    } else {
                        self.eval(alternate).await
                    }
                }
                Expr::Filter {
                    subject,
                    expr,
                    relative,
                } => {
                    let subject = self.eval(subject).await?;
                    if *relative {
                        self.filter_relative(subject, expr).await
                    } else {
                        let key = self.eval(expr).await?;
                        Ok(apply_access(&subject, &key))
                    }
                }
                Expr::ArrayLiteral(items) => {
                    let values = try_join_all(items.iter().map(|i| self.eval(i))).await?;
                    Ok(Value::Array(values))
                }
                Expr::ObjectLiteral(pairs) => {
                    let values = try_join_all(pairs.iter().map(|(_, v)| self.eval(v))).await?;
                    Ok(Value::Object(
                        pairs
                            .iter()
                            .map(|(k, _)| k.clone())
                            .zip(values)
                            .collect(),
                    ))
                }
                Expr::FunctionCall { name, args, pool } => {
                    let f = match pool {
                        Pool::Functions => self.grammar.get_function(name)?,
                        Pool::Transforms => self.grammar.get_transform(name)?,
                    };
                    let values = try_join_all(args.iter().map(|a| self.eval(a))).await?;
                    f(values).await
                }
            }
        })
    }

    async fn eval_binary(
        &self,
        operator: &str,
        left: &Expr,
        right: &Expr,
    ) -> Result<Value, EvalError> {
        match self.grammar.binary_strategy(operator) {
            Some(BinaryStrategy::Eager(f)) => {
                let (l, r) = futures::try_join!(self.eval(left), self.eval(right))?;
                f(&l, &r)
            }
            // The operator owns both futures; whichever it drops never runs
            Some(BinaryStrategy::OnDemand(f)) => f(self.eval(left), self.eval(right)).await,
            None => Err(EvalError::UnknownOperator(operator.to_string())),
        }
    }

    async fn eval_identifier(
        &self,
        value: &str,
        from: Option<&Expr>,
        relative: bool,
    ) -> Result<Value, EvalError> {
        match from {
            None => {
                let base = if relative { self.relative } else { self.context };
                Ok(lookup(base, value))
            }
            Some(expr) => {
                let base = self.eval(expr).await?;
                // Chained access through an array maps over its elements:
                // `users[.age > 25].name` yields a list of names
                match base {
                    Value::Array(items) => Ok(Value::Array(
                        items.iter().map(|item| lookup(item, value)).collect(),
                    )),
                    other => Ok(lookup(&other, value)),
                }
            }
        }
    }

    /// Relative filter: coerce the subject to an array, evaluate the filter
    /// body once per element with that element as the relative context, and
    /// keep the elements the body finds truthy.
    async fn filter_relative(&self, subject: Value, expr: &Expr) -> Result<Value, EvalError> {
        let items: Vec<Value> = match subject {
            Value::Array(items) => items,
            Value::Undefined => Vec::new(),
            other => vec![other],
        };
        let per_element: Vec<Evaluator<'_>> = items
            .iter()
            .map(|item| Evaluator {
                grammar: self.grammar,
                context: self.context,
                relative: item,
            })
            .collect();
        let verdicts = try_join_all(per_element.iter().map(|e| e.eval(expr))).await?;
        Ok(Value::Array(
            items
                .into_iter()
                .zip(verdicts)
                .filter(|(_, verdict)| verdict.is_truthy())
                .map(|(item, _)| item)
                .collect(),
        ))
    }
}

/// Property lookup with no key evaluation involved: a missing link becomes
/// undefined, a null link stays null.
fn lookup(base: &Value, key: &str) -> Value {
    match base {
        Value::Null => Value::Null,
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    }
}

/// Static (non-relative) filter access: the bracketed expression evaluated
/// to `key`, applied to `subject` as an index or property name.
fn apply_access(subject: &Value, key: &Value) -> Value {
    // A boolean key degenerates to keep-or-drop of the whole subject
    if let Value::Boolean(b) = key {
        return if *b { subject.clone() } else { Value::Undefined };
    }
    match subject {
        Value::Null => Value::Null,
        Value::Undefined => Value::Undefined,
        Value::Array(items) => match key.as_int() {
            Some(idx) => {
                // Negative indices count back from the end
                let idx = if idx < 0 { items.len() as i64 + idx } else { idx };
                usize::try_from(idx)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .unwrap_or(Value::Undefined)
            }
            None => Value::Undefined,
        },
        Value::Object(map) => {
            let name = match key {
                Value::String(s) => s.clone(),
                Value::Integer(_) | Value::Float(_) => key.as_string(),
                _ => return Value::Undefined,
            };
            map.get(&name).cloned().unwrap_or(Value::Undefined)
        }
        _ => Value::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_negative_index_counts_from_end() {
        let arr = Value::Array(vec![
            Value::Integer(10),
            Value::Integer(20),
            Value::Integer(30),
        ]);
        assert_eq!(apply_access(&arr, &Value::Integer(-1)), Value::Integer(30));
        assert_eq!(apply_access(&arr, &Value::Integer(-4)), Value::Undefined);
    }

    #[test]
    fn test_null_link_stays_null() {
        let grammar = Grammar::default();
        let context = Value::Null;
        let evaluator = Evaluator::new(&grammar, &context);
        let ast = Expr::Identifier {
            value: "missing".into(),
            from: None,
            relative: false,
        };
        assert_eq!(block_on(evaluator.eval(&ast)), Ok(Value::Null));
    }
}
