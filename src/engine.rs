//! The top-level language facade.
//!
//! A [`Rexl`] instance owns one grammar and hands out compiled
//! [`Expression`]s bound to it. Compilation is synchronous; evaluation is
//! async. There is deliberately no blocking evaluation entry point; callers
//! without a runtime can use `futures::executor::block_on`.

use std::collections::HashMap;
use std::sync::OnceLock;

use thiserror::Error;

use crate::ast::Expr;
use crate::evaluator::{EvalError, Evaluator};
use crate::grammar::Grammar;
use crate::lexer::{LexError, Lexer};
use crate::parser::{ParseError, Parser};
use crate::validator::{Issue, ValidateOptions, ValidationResult, Validator};
use crate::value::Value;

/// Failure while turning source text into a tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Expression is empty")]
    EmptyExpression,

    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Any failure an evaluation can surface: a compile problem discovered
/// lazily, or a runtime one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// A language instance: one grammar plus the operations on it.
///
/// ```
/// use rexl_lang::{Rexl, Value};
///
/// let rexl = Rexl::new();
/// let result = futures::executor::block_on(rexl.eval("2 + 3 * 4", &Value::Null));
/// assert_eq!(result.unwrap(), Value::Integer(14));
/// ```
pub struct Rexl {
    grammar: Grammar,
}

impl Default for Rexl {
    fn default() -> Self {
        Rexl::new()
    }
}

impl Rexl {
    /// An instance with the default operator set and no functions or
    /// transforms registered.
    pub fn new() -> Self {
        Rexl {
            grammar: Grammar::default(),
        }
    }

    /// An instance over a prepared grammar.
    pub fn with_grammar(grammar: Grammar) -> Self {
        Rexl { grammar }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Mutable grammar access for registering operators, functions, and
    /// transforms. Exclusive borrow: nothing can be mid-evaluation while
    /// the grammar changes.
    pub fn grammar_mut(&mut self) -> &mut Grammar {
        &mut self.grammar
    }

    /// Compile and evaluate in one step.
    pub async fn eval(&self, source: &str, context: &Value) -> Result<Value, Error> {
        let ast = compile_source(&self.grammar, source)?;
        let evaluator = Evaluator::new(&self.grammar, context);
        Ok(evaluator.eval(&ast).await?)
    }

    /// Evaluate an expression that needs no context of its own. Identifiers
    /// resolve against an empty object, so any lookup yields `Undefined`.
    pub async fn eval_empty(&self, source: &str) -> Result<Value, Error> {
        self.eval(source, &Value::Object(HashMap::new())).await
    }

    /// Compile eagerly; syntax problems surface here, not at eval time.
    pub fn compile(&self, source: &str) -> Result<Expression<'_>, CompileError> {
        let ast = compile_source(&self.grammar, source)?;
        Ok(Expression {
            grammar: &self.grammar,
            source: source.to_string(),
            ast: OnceLock::from(Ok(ast)),
        })
    }

    /// Wrap source text without compiling it. The first `compile()` or
    /// `eval()` on the result does the work, once, and caches the outcome.
    pub fn create_expression(&self, source: &str) -> Expression<'_> {
        Expression {
            grammar: &self.grammar,
            source: source.to_string(),
            ast: OnceLock::new(),
        }
    }

    /// Build an expression by interleaving literal segments with embedded
    /// expression snippets, the way a template string would. There is
    /// always one more segment than there are values; empty segments are
    /// fine.
    ///
    /// ```
    /// use rexl_lang::Rexl;
    ///
    /// let rexl = Rexl::new();
    /// let expr = rexl.template(&["age + ", " * 2"], &["bonus"]);
    /// assert_eq!(expr.source(), "age + bonus * 2");
    /// ```
    pub fn template(&self, segments: &[&str], values: &[&str]) -> Expression<'_> {
        let mut source = String::new();
        for (i, segment) in segments.iter().enumerate() {
            source.push_str(segment);
            if let Some(value) = values.get(i) {
                source.push_str(value);
            }
        }
        self.create_expression(&source)
    }

    /// Full diagnostic report for an expression; see [`Validator`].
    pub fn validate(
        &self,
        source: &str,
        context: Option<&Value>,
        options: &ValidateOptions,
    ) -> ValidationResult {
        Validator::new(&self.grammar).validate(source, context, options)
    }

    pub fn is_valid(&self, source: &str) -> bool {
        Validator::new(&self.grammar).is_valid(source)
    }

    pub fn first_error(&self, source: &str) -> Option<Issue> {
        Validator::new(&self.grammar).first_error(source)
    }
}

/// A compiled (or lazily-compiling) expression bound to its grammar.
///
/// Compilation happens at most once per expression; concurrent `eval` calls
/// share the cached tree.
pub struct Expression<'a> {
    grammar: &'a Grammar,
    source: String,
    ast: OnceLock<Result<Expr, CompileError>>,
}

impl Expression<'_> {
    /// The source text this expression was created from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Force compilation now (idempotent) and expose the tree.
    pub fn compile(&self) -> Result<&Expr, CompileError> {
        self.ast
            .get_or_init(|| compile_source(self.grammar, &self.source))
            .as_ref()
            .map_err(|e| e.clone())
    }

    /// Evaluate against a context, compiling first if needed.
    pub async fn eval(&self, context: &Value) -> Result<Value, Error> {
        let ast = self.compile()?;
        let evaluator = Evaluator::new(self.grammar, context);
        Ok(evaluator.eval(ast).await?)
    }
}

fn compile_source(grammar: &Grammar, source: &str) -> Result<Expr, CompileError> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(CompileError::EmptyExpression);
    }
    let tokens = Lexer::new(grammar).tokenize(trimmed)?;
    let mut parser = Parser::new(grammar);
    parser.add_tokens(tokens)?;
    Ok(parser.complete()?)
}
