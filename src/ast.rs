//! # Rexl - Abstract Syntax Tree
//!
//! This module defines the token and expression types for the Rexl
//! expression language, a small JS-like language for evaluating expressions
//! against JSON-shaped contexts.
//!
//! ## Architecture Overview
//!
//! The AST module is organized into focused submodules:
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (literals, access chains,
//!   operations, filters, calls)
//!
//! ## Core Concepts
//!
//! ### Expressions only
//!
//! Rexl is expression-shaped: there are no statements, loops, or variable
//! assignment. A source string is one expression, and evaluation produces
//! one value.
//!
//! ```text
//! users[.age > 25].name
//! price * 1.1 > 100 ? "premium" : "standard"
//! "Hello " + name | upper
//! ```
//!
//! ### Property chains
//!
//! `a.b.c` is represented inside-out: the `c` identifier links to `b` via
//! its `from` field, and `b` links to `a`. A leading dot inside a filter
//! (`.age`) marks the identifier *relative*, resolved against the current
//! array element instead of the global context.
//!
//! ### Filters
//!
//! A bracketed sub-expression after a value is a filter. Relative filters
//! (`users[.age > 25]`) keep matching array elements; static filters
//! (`obj["a" + "b"]`, `arr[1]`) perform property or index access with a
//! computed key.
//!
//! ### Functions and transforms
//!
//! Two callable pools share one call node. `min(1, 2)` resolves in the
//! function pool; `value | upper` resolves `upper` in the transform pool
//! with the piped value as its first argument. Names may be dotted
//! (`String.upper`) and are reconstructed from the identifier chain at
//! parse time.

pub mod expressions;
pub mod tokens;

pub use expressions::{Expr, Pool};
pub use tokens::{Token, TokenKind, TokenValue};
