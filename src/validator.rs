//! Static expression validation.
//!
//! Runs the lexer and parser (never the evaluator) over a candidate
//! expression and reports everything it can prove wrong ahead of time:
//! lexical garbage, syntax errors, calls to unregistered functions or
//! transforms, operators missing from the grammar, and, when a context is
//! supplied, property chains that cannot resolve against it. Malformed
//! expression *content* never makes validation itself fail; the report is
//! the result.

use crate::ast::{Expr, Pool, Token, TokenKind};
use crate::grammar::Grammar;
use crate::lexer::{LexError, Lexer};
use crate::parser::{ParseError, Parser};
use crate::value::{Value, type_name};

/// How bad an issue is. Only errors make an expression invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Machine-readable issue category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCode {
    EmptyExpression,
    InvalidToken,
    ConsecutiveOperators,
    SyntaxError,
    UnknownFunction,
    UnknownTransform,
    UnknownOperator,
    UndefinedProperty,
    NullPropertyAccess,
    NonObjectPropertyAccess,
    MaxDepthExceeded,
    MaxLengthExceeded,
    NodeCount,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::EmptyExpression => "EMPTY_EXPRESSION",
            IssueCode::InvalidToken => "INVALID_TOKEN",
            IssueCode::ConsecutiveOperators => "CONSECUTIVE_OPERATORS",
            IssueCode::SyntaxError => "SYNTAX_ERROR",
            IssueCode::UnknownFunction => "UNKNOWN_FUNCTION",
            IssueCode::UnknownTransform => "UNKNOWN_TRANSFORM",
            IssueCode::UnknownOperator => "UNKNOWN_OPERATOR",
            IssueCode::UndefinedProperty => "UNDEFINED_PROPERTY",
            IssueCode::NullPropertyAccess => "NULL_PROPERTY_ACCESS",
            IssueCode::NonObjectPropertyAccess => "NON_OBJECT_PROPERTY_ACCESS",
            IssueCode::MaxDepthExceeded => "MAX_DEPTH_EXCEEDED",
            IssueCode::MaxLengthExceeded => "MAX_LENGTH_EXCEEDED",
            IssueCode::NodeCount => "NODE_COUNT",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diagnostic finding. `position` is a byte offset into the trimmed
/// expression when one could be determined.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    pub position: Option<usize>,
}

/// Validation knobs. The default checks structure only; supply a context
/// and clear `allow_undefined_context` to also check identifier chains.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// When false and a context is given, unresolvable property chains
    /// produce warnings
    pub allow_undefined_context: bool,
    pub include_warnings: bool,
    pub include_info: bool,
    /// Warn when the AST nests deeper than this
    pub max_depth: Option<usize>,
    /// Warn when the trimmed source is longer than this many bytes
    pub max_length: Option<usize>,
    /// Function names accepted even though the grammar lacks them
    pub custom_functions: Vec<String>,
    /// Transform names accepted even though the grammar lacks them
    pub custom_transforms: Vec<String>,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        ValidateOptions {
            allow_undefined_context: true,
            include_warnings: true,
            include_info: false,
            max_depth: None,
            max_length: None,
            custom_functions: Vec::new(),
            custom_transforms: Vec::new(),
        }
    }
}

/// The full diagnostic report for one expression.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// True iff no error-severity issue was found
    pub valid: bool,
    /// All findings, sorted by position (position-less issues last)
    pub issues: Vec<Issue>,
    /// The parsed tree, when parsing got that far
    pub ast: Option<Expr>,
}

impl ValidationResult {
    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    pub fn info(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Info)
    }
}

pub struct Validator<'g> {
    grammar: &'g Grammar,
}

impl<'g> Validator<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Validator { grammar }
    }

    /// Run every applicable pass over `source` and collect the findings.
    /// Leading and trailing whitespace is ignored; positions are offsets
    /// into the trimmed text.
    pub fn validate(
        &self,
        source: &str,
        context: Option<&Value>,
        options: &ValidateOptions,
    ) -> ValidationResult {
        let mut issues = Vec::new();
        let trimmed = source.trim();

        if trimmed.is_empty() {
            issues.push(Issue {
                severity: Severity::Error,
                code: IssueCode::EmptyExpression,
                message: "Expression is empty".to_string(),
                position: Some(0),
            });
            return finish(issues, None, options);
        }

        if let Some(max) = options.max_length {
            if trimmed.len() > max {
                issues.push(Issue {
                    severity: Severity::Warning,
                    code: IssueCode::MaxLengthExceeded,
                    message: format!(
                        "Expression is {} bytes long, limit is {}",
                        trimmed.len(),
                        max
                    ),
                    position: Some(0),
                });
            }
        }

        let lexer = Lexer::new(self.grammar);
        let tokens = match lexer.tokenize(trimmed) {
            Ok(tokens) => tokens,
            Err(err) => {
                let position = match &err {
                    LexError::InvalidToken { position, .. }
                    | LexError::InvalidNumber { position, .. } => Some(*position),
                };
                issues.push(Issue {
                    severity: Severity::Error,
                    code: IssueCode::InvalidToken,
                    message: err.to_string(),
                    position,
                });
                return finish(issues, None, options);
            }
        };

        self.lexical_pass(&tokens, &mut issues);

        let mut parser = Parser::new(self.grammar);
        let ast = match parser
            .add_tokens(tokens)
            .and_then(|_| parser.complete())
        {
            Ok(ast) => Some(ast),
            Err(err) => {
                issues.push(Issue {
                    severity: Severity::Error,
                    code: IssueCode::SyntaxError,
                    message: err.to_string(),
                    position: syntax_error_position(&err),
                });
                None
            }
        };

        if let Some(ast) = &ast {
            self.semantic_pass(ast, options, &mut issues);
            if let (Some(context), false) = (context, options.allow_undefined_context) {
                self.context_pass(ast, context, &mut issues);
            }
            if let Some(max) = options.max_depth {
                let depth = depth_of(ast);
                if depth > max {
                    issues.push(Issue {
                        severity: Severity::Warning,
                        code: IssueCode::MaxDepthExceeded,
                        message: format!("Expression nests {} levels deep, limit is {}", depth, max),
                        position: None,
                    });
                }
            }
            if options.include_info {
                issues.push(Issue {
                    severity: Severity::Info,
                    code: IssueCode::NodeCount,
                    message: format!("Expression has {} nodes", node_count(ast)),
                    position: None,
                });
            }
        }

        finish(issues, ast, options)
    }

    /// True iff the expression has no error-severity issues.
    pub fn is_valid(&self, source: &str) -> bool {
        self.validate(source, None, &ValidateOptions::default()).valid
    }

    /// The first error in positional order, if any.
    pub fn first_error(&self, source: &str) -> Option<Issue> {
        self.validate(source, None, &ValidateOptions::default())
            .issues
            .into_iter()
            .find(|i| i.severity == Severity::Error)
    }

    /// Token-level checks beyond what the lexer rejects outright.
    fn lexical_pass(&self, tokens: &[Token], issues: &mut Vec<Issue>) {
        let mut offset = 0;
        let mut prev: Option<&Token> = None;
        for token in tokens {
            if token.kind == TokenKind::BinaryOp {
                if let Some(p) = prev {
                    if p.kind == TokenKind::BinaryOp {
                        issues.push(Issue {
                            severity: Severity::Error,
                            code: IssueCode::ConsecutiveOperators,
                            message: format!(
                                "Operator '{}' directly follows operator '{}'",
                                token.raw.trim(),
                                p.raw.trim()
                            ),
                            position: Some(offset),
                        });
                    }
                }
            }
            offset += token.raw.len();
            prev = Some(token);
        }
    }

    /// Flag calls and operators the grammar (plus allow-lists) cannot
    /// resolve.
    fn semantic_pass(&self, ast: &Expr, options: &ValidateOptions, issues: &mut Vec<Issue>) {
        walk(ast, &mut |node| match node {
            Expr::FunctionCall { name, pool, .. } => {
                let (known, allowed, code, what) = match pool {
                    Pool::Functions => (
                        self.grammar.has_function(name),
                        options.custom_functions.contains(name),
                        IssueCode::UnknownFunction,
                        "function",
                    ),
                    Pool::Transforms => (
                        self.grammar.has_transform(name),
                        options.custom_transforms.contains(name),
                        IssueCode::UnknownTransform,
                        "transform",
                    ),
                };
                if !known && !allowed {
                    issues.push(Issue {
                        severity: Severity::Error,
                        code,
                        message: format!("Unknown {}: {}", what, name),
                        position: None,
                    });
                }
            }
            Expr::Binary { operator, .. } => {
                if self.grammar.binary_precedence(operator).is_none() {
                    issues.push(Issue {
                        severity: Severity::Error,
                        code: IssueCode::UnknownOperator,
                        message: format!("Unknown operator: {}", operator),
                        position: None,
                    });
                }
            }
            Expr::Unary { operator, .. } => {
                if self.grammar.unary_op(operator).is_none() {
                    issues.push(Issue {
                        severity: Severity::Error,
                        code: IssueCode::UnknownOperator,
                        message: format!("Unknown operator: {}", operator),
                        position: None,
                    });
                }
            }
            _ => {}
        });
    }

    /// Resolve statically-known identifier chains against the supplied
    /// context. Each chain is checked once, from its head; chains rooted in
    /// computed values (filter results, operator results) are skipped past
    /// the dynamic link, since their runtime shape is unknowable here.
    fn context_pass(&self, ast: &Expr, context: &Value, issues: &mut Vec<Issue>) {
        match ast {
            Expr::Literal(_) => {}
            Expr::Identifier { from, relative, .. } => {
                if !relative {
                    if let Some(path) = static_path(ast) {
                        check_path(&path, context, issues);
                        return;
                    }
                }
                if let Some(from) = from {
                    self.context_pass(from, context, issues);
                }
            }
            Expr::Binary { left, right, .. } => {
                self.context_pass(left, context, issues);
                self.context_pass(right, context, issues);
            }
            Expr::Unary { right, .. } => self.context_pass(right, context, issues),
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.context_pass(test, context, issues);
                if let Some(consequent) = consequent {
                    self.context_pass(consequent, context, issues);
                }
                self.context_pass(alternate, context, issues);
            }
            Expr::Filter { subject, expr, .. } => {
                self.context_pass(subject, context, issues);
                self.context_pass(expr, context, issues);
            }
            Expr::ArrayLiteral(items) => {
                for item in items {
                    self.context_pass(item, context, issues);
                }
            }
            Expr::ObjectLiteral(pairs) => {
                for (_, value) in pairs {
                    self.context_pass(value, context, issues);
                }
            }
            Expr::FunctionCall { args, .. } => {
                for arg in args {
                    self.context_pass(arg, context, issues);
                }
            }
        }
    }
}

/// Best-effort byte offset of a parser failure, derived from the consumed
/// prefix the error carries. An unexpected token sits at the end of that
/// prefix; an unexpected end is one past it.
fn syntax_error_position(err: &ParseError) -> Option<usize> {
    match err {
        ParseError::UnexpectedToken { token, expression } => expression.rfind(token.as_str()),
        ParseError::UnexpectedEnd { expression } => Some(expression.len()),
        _ => None,
    }
}

fn finish(
    mut issues: Vec<Issue>,
    ast: Option<Expr>,
    options: &ValidateOptions,
) -> ValidationResult {
    issues.retain(|i| match i.severity {
        Severity::Error => true,
        Severity::Warning => options.include_warnings,
        Severity::Info => options.include_info,
    });
    issues.sort_by_key(|i| i.position.unwrap_or(usize::MAX));
    let valid = !issues.iter().any(|i| i.severity == Severity::Error);
    ValidationResult { valid, issues, ast }
}

/// Pre-order traversal calling `visit` on every node.
fn walk(ast: &Expr, visit: &mut dyn FnMut(&Expr)) {
    visit(ast);
    match ast {
        Expr::Literal(_) => {}
        Expr::Identifier { from, .. } => {
            if let Some(from) = from {
                walk(from, visit);
            }
        }
        Expr::Binary { left, right, .. } => {
            walk(left, visit);
            walk(right, visit);
        }
        Expr::Unary { right, .. } => walk(right, visit),
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            walk(test, visit);
            if let Some(consequent) = consequent {
                walk(consequent, visit);
            }
            walk(alternate, visit);
        }
        Expr::Filter { subject, expr, .. } => {
            walk(subject, visit);
            walk(expr, visit);
        }
        Expr::ArrayLiteral(items) => {
            for item in items {
                walk(item, visit);
            }
        }
        Expr::ObjectLiteral(pairs) => {
            for (_, value) in pairs {
                walk(value, visit);
            }
        }
        Expr::FunctionCall { args, .. } => {
            for arg in args {
                walk(arg, visit);
            }
        }
    }
}

/// The dotted path of an identifier chain made purely of non-relative
/// identifiers, root first. Any computed link makes the chain dynamic.
fn static_path(node: &Expr) -> Option<Vec<String>> {
    match node {
        Expr::Identifier {
            value,
            from,
            relative: false,
        } => match from {
            None => Some(vec![value.clone()]),
            Some(from) => {
                let mut path = static_path(from)?;
                path.push(value.clone());
                Some(path)
            }
        },
        _ => None,
    }
}

fn check_path(path: &[String], context: &Value, issues: &mut Vec<Issue>) {
    let mut current = context;
    let mut seen = String::new();
    for (i, key) in path.iter().enumerate() {
        if !seen.is_empty() {
            seen.push('.');
        }
        seen.push_str(key);
        match current {
            Value::Object(map) => match map.get(key) {
                Some(next) => current = next,
                None => {
                    issues.push(Issue {
                        severity: Severity::Warning,
                        code: IssueCode::UndefinedProperty,
                        message: format!("'{}' is not defined in the context", seen),
                        position: None,
                    });
                    return;
                }
            },
            Value::Null => {
                issues.push(Issue {
                    severity: Severity::Warning,
                    code: IssueCode::NullPropertyAccess,
                    message: format!("'{}' accesses a property of null", seen),
                    position: None,
                });
                return;
            }
            other => {
                // Chains through arrays resolve per element at runtime and
                // are not statically checkable
                if matches!(other, Value::Array(_)) {
                    return;
                }
                if i == 0 {
                    issues.push(Issue {
                        severity: Severity::Warning,
                        code: IssueCode::UndefinedProperty,
                        message: format!("'{}' is not defined in the context", seen),
                        position: None,
                    });
                } else {
                    issues.push(Issue {
                        severity: Severity::Warning,
                        code: IssueCode::NonObjectPropertyAccess,
                        message: format!(
                            "'{}' accesses a property of a {}",
                            seen,
                            type_name(other)
                        ),
                        position: None,
                    });
                }
                return;
            }
        }
    }
}

fn depth_of(ast: &Expr) -> usize {
    let children: Vec<&Expr> = match ast {
        Expr::Literal(_) => Vec::new(),
        Expr::Identifier { from, .. } => from.iter().map(|f| f.as_ref()).collect(),
        Expr::Binary { left, right, .. } => vec![left, right],
        Expr::Unary { right, .. } => vec![right],
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let mut c: Vec<&Expr> = vec![test, alternate];
            if let Some(consequent) = consequent {
                c.push(consequent);
            }
            c
        }
        Expr::Filter { subject, expr, .. } => vec![subject, expr],
        Expr::ArrayLiteral(items) => items.iter().collect(),
        Expr::ObjectLiteral(pairs) => pairs.iter().map(|(_, v)| v).collect(),
        Expr::FunctionCall { args, .. } => args.iter().collect(),
    };
    1 + children.into_iter().map(depth_of).max().unwrap_or(0)
}

fn node_count(ast: &Expr) -> usize {
    let mut count = 0;
    walk(ast, &mut |_| count += 1);
    count
}
