pub mod ast;
pub mod engine;
pub mod evaluator;
pub mod grammar;
pub mod lexer;
pub mod output;
pub mod parser;
pub mod validator;
pub mod value;

pub use ast::{Expr, Pool, Token, TokenKind, TokenValue};
pub use engine::{CompileError, Error, Expression, Rexl};
pub use evaluator::{EvalError, Evaluator};
pub use grammar::Grammar;
pub use lexer::{LexError, Lexer};
pub use output::{to_json, to_json_pretty};
pub use parser::{ParseError, Parser};
pub use validator::{
    Issue, IssueCode, Severity, ValidateOptions, ValidationResult, Validator,
};
pub use value::Value;
