//! The mutable registry of operators, functions, and transforms shared by
//! every lexer, parser, and evaluator of one language instance.
//!
//! Operators come in three shapes: punctuation (fixed language structure),
//! binary operators with a precedence, and unary operators. Binary operators
//! are either *eager* (both operands evaluated before the operator runs) or
//! *on-demand* (the operator receives both operands as lazy futures and
//! decides which to await; dropping the right future unawaited is the
//! short-circuit).
//!
//! Functions and transforms are two flat namespaces of async-capable
//! callables. Dotted names like `"String.upper"` are stored as plain string
//! keys; the namespace structure is a naming convention resolved by the
//! parser.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};

use crate::ast::TokenKind;
use crate::evaluator::EvalError;
use crate::value::{Value, type_name};

/// A lazily-evaluated operand handed to an on-demand binary operator.
pub type OperandFuture<'a> = BoxFuture<'a, Result<Value, EvalError>>;

/// An eager binary operator body: both operands already evaluated.
pub type EagerFn = Arc<dyn Fn(&Value, &Value) -> Result<Value, EvalError> + Send + Sync>;

/// An on-demand binary operator body. The left future is awaited
/// unconditionally by convention; the right is awaited only at the
/// operator's discretion.
pub type OnDemandFn =
    Arc<dyn for<'a> Fn(OperandFuture<'a>, OperandFuture<'a>) -> OperandFuture<'a> + Send + Sync>;

/// A unary operator body.
pub type UnaryFn = Arc<dyn Fn(&Value) -> Result<Value, EvalError> + Send + Sync>;

/// A registered function or transform. Receives its evaluated arguments
/// (for transforms, the piped value first) and may run real async work.
pub type ExprFunc = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, EvalError>> + Send + Sync>;

/// Evaluation strategy of a binary operator. Exactly one of the two shapes
/// applies to any symbol.
#[derive(Clone)]
pub enum BinaryStrategy {
    Eager(EagerFn),
    OnDemand(OnDemandFn),
}

/// One entry in the grammar's element table.
#[derive(Clone)]
pub enum GrammarElement {
    /// Fixed punctuation; classified by the lexer, never removable
    Punctuation(TokenKind),

    /// Binary operator with precedence (higher binds tighter)
    BinaryOp {
        precedence: u8,
        strategy: BinaryStrategy,
    },

    /// Unary (prefix) operator
    UnaryOp(UnaryFn),
}

impl GrammarElement {
    /// The token kind the lexer assigns to this element's symbol.
    pub fn token_kind(&self) -> TokenKind {
        match self {
            GrammarElement::Punctuation(kind) => *kind,
            GrammarElement::BinaryOp { .. } => TokenKind::BinaryOp,
            GrammarElement::UnaryOp(_) => TokenKind::UnaryOp,
        }
    }
}

/// The operator/function/transform registry for one language instance.
///
/// Created once, mutated only through the registration calls below, and read
/// by every lexer, parser, and evaluator sharing it. Mutating a grammar
/// while evaluations are in flight is prevented by the borrow checker, not
/// by locks.
#[derive(Clone)]
pub struct Grammar {
    elements: HashMap<String, GrammarElement>,
    functions: HashMap<String, ExprFunc>,
    transforms: HashMap<String, ExprFunc>,
}

impl Default for Grammar {
    fn default() -> Self {
        let mut g = Grammar::empty();

        for (symbol, kind) in [
            (".", TokenKind::Dot),
            ("[", TokenKind::OpenBracket),
            ("]", TokenKind::CloseBracket),
            ("{", TokenKind::OpenCurly),
            ("}", TokenKind::CloseCurly),
            ("(", TokenKind::OpenParen),
            (")", TokenKind::CloseParen),
            ("|", TokenKind::Pipe),
            ("?", TokenKind::Question),
            (":", TokenKind::Colon),
            (",", TokenKind::Comma),
        ] {
            g.elements
                .insert(symbol.to_string(), GrammarElement::Punctuation(kind));
        }

        g.add_binary_op("+", 30, op_add);
        g.add_binary_op("-", 30, op_subtract);
        g.add_binary_op("*", 40, op_multiply);
        g.add_binary_op("/", 40, op_divide);
        g.add_binary_op("//", 40, op_floor_divide);
        g.add_binary_op("%", 40, op_modulo);
        g.add_binary_op("^", 50, op_power);
        g.add_binary_op("==", 20, op_eq);
        g.add_binary_op("!=", 20, op_ne);
        g.add_binary_op(">", 20, op_gt);
        g.add_binary_op(">=", 20, op_ge);
        g.add_binary_op("<", 20, op_lt);
        g.add_binary_op("<=", 20, op_le);
        g.add_binary_op("in", 20, op_in);
        g.add_binary_op_on_demand("&&", 10, op_and);
        g.add_binary_op_on_demand("||", 10, op_or);
        g.add_unary_op("!", op_not);

        g
    }
}

impl Grammar {
    /// A grammar with no elements, functions, or transforms at all. Useful
    /// only as a base for fully custom languages; `default()` is the normal
    /// starting point.
    pub fn empty() -> Self {
        Grammar {
            elements: HashMap::new(),
            functions: HashMap::new(),
            transforms: HashMap::new(),
        }
    }

    /// Register an eager binary operator. Replaces any previous operator
    /// with the same symbol.
    pub fn add_binary_op<F>(&mut self, symbol: impl Into<String>, precedence: u8, f: F)
    where
        F: Fn(&Value, &Value) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.elements.insert(
            symbol.into(),
            GrammarElement::BinaryOp {
                precedence,
                strategy: BinaryStrategy::Eager(Arc::new(f)),
            },
        );
    }

    /// Register a short-circuit binary operator. The body receives both
    /// operands as lazy futures; awaiting the left and dropping the right is
    /// how `&&`-style skipping happens. Plain `fn` items satisfy the bound
    /// without lifetime annotations:
    ///
    /// ```
    /// use rexl_lang::grammar::{Grammar, OperandFuture};
    ///
    /// fn left_only<'a>(left: OperandFuture<'a>, _right: OperandFuture<'a>) -> OperandFuture<'a> {
    ///     Box::pin(async move { left.await })
    /// }
    ///
    /// let mut grammar = Grammar::default();
    /// grammar.add_binary_op_on_demand("<!", 10, left_only);
    /// ```
    pub fn add_binary_op_on_demand<F>(&mut self, symbol: impl Into<String>, precedence: u8, f: F)
    where
        F: for<'a> Fn(OperandFuture<'a>, OperandFuture<'a>) -> OperandFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.elements.insert(
            symbol.into(),
            GrammarElement::BinaryOp {
                precedence,
                strategy: BinaryStrategy::OnDemand(Arc::new(f)),
            },
        );
    }

    /// Register a unary (prefix) operator.
    pub fn add_unary_op<F>(&mut self, symbol: impl Into<String>, f: F)
    where
        F: Fn(&Value) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.elements
            .insert(symbol.into(), GrammarElement::UnaryOp(Arc::new(f)));
    }

    /// Remove a binary or unary operator. Unknown symbols are silently
    /// ignored, and punctuation can never be removed.
    pub fn remove_op(&mut self, symbol: &str) {
        if matches!(
            self.elements.get(symbol),
            Some(GrammarElement::BinaryOp { .. }) | Some(GrammarElement::UnaryOp(_))
        ) {
            self.elements.remove(symbol);
        }
    }

    /// Register a synchronous function under `name` (dots allowed).
    pub fn add_function<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), wrap_sync(f));
    }

    /// Register an async function under `name`.
    pub fn add_async_function<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, EvalError>> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
    }

    /// Register several synchronous functions at once.
    pub fn add_functions<N, F, I>(&mut self, entries: I)
    where
        N: Into<String>,
        F: Fn(Vec<Value>) -> Result<Value, EvalError> + Send + Sync + 'static,
        I: IntoIterator<Item = (N, F)>,
    {
        for (name, f) in entries {
            self.add_function(name, f);
        }
    }

    /// Register a synchronous transform. The piped value arrives as the
    /// first argument.
    pub fn add_transform<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.transforms.insert(name.into(), wrap_sync(f));
    }

    /// Register an async transform.
    pub fn add_async_transform<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, EvalError>> + Send + Sync + 'static,
    {
        self.transforms.insert(name.into(), Arc::new(f));
    }

    /// Register several synchronous transforms at once.
    pub fn add_transforms<N, F, I>(&mut self, entries: I)
    where
        N: Into<String>,
        F: Fn(Vec<Value>) -> Result<Value, EvalError> + Send + Sync + 'static,
        I: IntoIterator<Item = (N, F)>,
    {
        for (name, f) in entries {
            self.add_transform(name, f);
        }
    }

    /// Look up a function, failing when it is not defined.
    pub fn get_function(&self, name: &str) -> Result<ExprFunc, EvalError> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))
    }

    /// Look up a transform, failing when it is not defined.
    pub fn get_transform(&self, name: &str) -> Result<ExprFunc, EvalError> {
        self.transforms
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownTransform(name.to_string()))
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn has_transform(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// All defined element symbols with their token kinds; the lexer builds
    /// its split regex from this set.
    pub fn symbols(&self) -> impl Iterator<Item = (&str, TokenKind)> {
        self.elements
            .iter()
            .map(|(symbol, elem)| (symbol.as_str(), elem.token_kind()))
    }

    pub fn element(&self, symbol: &str) -> Option<&GrammarElement> {
        self.elements.get(symbol)
    }

    /// Precedence of a binary operator symbol, if one is defined.
    pub fn binary_precedence(&self, symbol: &str) -> Option<u8> {
        match self.elements.get(symbol) {
            Some(GrammarElement::BinaryOp { precedence, .. }) => Some(*precedence),
            _ => None,
        }
    }

    /// Evaluation strategy of a binary operator symbol.
    pub fn binary_strategy(&self, symbol: &str) -> Option<&BinaryStrategy> {
        match self.elements.get(symbol) {
            Some(GrammarElement::BinaryOp { strategy, .. }) => Some(strategy),
            _ => None,
        }
    }

    /// Body of a unary operator symbol.
    pub fn unary_op(&self, symbol: &str) -> Option<&UnaryFn> {
        match self.elements.get(symbol) {
            Some(GrammarElement::UnaryOp(f)) => Some(f),
            _ => None,
        }
    }
}

fn wrap_sync<F>(f: F) -> ExprFunc
where
    F: Fn(Vec<Value>) -> Result<Value, EvalError> + Send + Sync + 'static,
{
    Arc::new(move |args| {
        let out = f(args);
        Box::pin(std::future::ready(out))
    })
}

// ---------------------------------------------------------------------------
// Default operator bodies
// ---------------------------------------------------------------------------

/// Mixed integer/float arithmetic through `rust_decimal`, collapsing back to
/// an integer when the exact result is whole. Falls back to plain f64 math
/// when a value does not fit in a Decimal.
fn mixed_arith(
    a: f64,
    b: f64,
    dec: impl Fn(Decimal, Decimal) -> Decimal,
    float: impl Fn(f64, f64) -> f64,
) -> Value {
    if let (Some(ad), Some(bd)) = (Decimal::from_f64(a), Decimal::from_f64(b)) {
        let rd = dec(ad, bd);
        if rd.is_integer() {
            if let Some(r) = rd.to_i64() {
                return Value::Integer(r);
            }
        }
        if let Some(r) = rd.to_f64() {
            return Value::Float(r);
        }
    }
    Value::Float(float(a, b))
}

fn op_add(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::String(format!(
            "{}{}",
            left.as_string(),
            right.as_string()
        ))),
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Integer(a), Value::Float(b)) => {
            Ok(mixed_arith(*a as f64, *b, |x, y| x + y, |x, y| x + y))
        }
        (Value::Float(a), Value::Integer(b)) => {
            Ok(mixed_arith(*a, *b as f64, |x, y| x + y, |x, y| x + y))
        }
        (a, b) => Err(EvalError::Type(format!(
            "Cannot add {} and {}",
            type_name(a),
            type_name(b)
        ))),
    }
}

fn op_subtract(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a - b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
        (Value::Integer(a), Value::Float(b)) => {
            Ok(mixed_arith(*a as f64, *b, |x, y| x - y, |x, y| x - y))
        }
        (Value::Float(a), Value::Integer(b)) => {
            Ok(mixed_arith(*a, *b as f64, |x, y| x - y, |x, y| x - y))
        }
        (a, b) => Err(EvalError::Type(format!(
            "Cannot subtract {} from {}",
            type_name(b),
            type_name(a)
        ))),
    }
}

fn op_multiply(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a * b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
        (Value::Integer(a), Value::Float(b)) => {
            Ok(mixed_arith(*a as f64, *b, |x, y| x * y, |x, y| x * y))
        }
        (Value::Float(a), Value::Integer(b)) => {
            Ok(mixed_arith(*a, *b as f64, |x, y| x * y, |x, y| x * y))
        }
        (a, b) => Err(EvalError::Type(format!(
            "Cannot multiply {} by {}",
            type_name(a),
            type_name(b)
        ))),
    }
}

fn op_divide(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Integer(_), Value::Integer(0)) => Err(EvalError::DivisionByZero),
        (Value::Integer(a), Value::Integer(b)) => {
            // Exact division keeps the integer type
            if a % b == 0 {
                Ok(Value::Integer(a / b))
            } else {
                Ok(Value::Float(*a as f64 / *b as f64))
            }
        }
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
        (Value::Integer(a), Value::Float(b)) => {
            Ok(mixed_arith(*a as f64, *b, |x, y| x / y, |x, y| x / y))
        }
        (Value::Float(a), Value::Integer(b)) => {
            Ok(mixed_arith(*a, *b as f64, |x, y| x / y, |x, y| x / y))
        }
        (a, b) => Err(EvalError::Type(format!(
            "Cannot divide {} by {}",
            type_name(a),
            type_name(b)
        ))),
    }
}

fn op_floor_divide(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Integer(_), Value::Integer(0)) => Err(EvalError::DivisionByZero),
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.div_euclid(*b))),
        (a, b) => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => Ok(Value::Float((x / y).floor())),
            _ => Err(EvalError::Type(format!(
                "Cannot floor-divide {} by {}",
                type_name(a),
                type_name(b)
            ))),
        },
    }
}

fn op_modulo(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Integer(_), Value::Integer(0)) => Err(EvalError::DivisionByZero),
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a % b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a % b)),
        (Value::Integer(a), Value::Float(b)) => {
            Ok(mixed_arith(*a as f64, *b, |x, y| x % y, |x, y| x % y))
        }
        (Value::Float(a), Value::Integer(b)) => {
            Ok(mixed_arith(*a, *b as f64, |x, y| x % y, |x, y| x % y))
        }
        (a, b) => Err(EvalError::Type(format!(
            "Cannot compute modulo of {} by {}",
            type_name(a),
            type_name(b)
        ))),
    }
}

fn op_power(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) if *b >= 0 => {
            match u32::try_from(*b).ok().and_then(|e| a.checked_pow(e)) {
                Some(r) => Ok(Value::Integer(r)),
                None => Ok(Value::Float((*a as f64).powf(*b as f64))),
            }
        }
        (a, b) => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => Ok(Value::Float(x.powf(y))),
            _ => Err(EvalError::Type(format!(
                "Cannot raise {} to the power of {}",
                type_name(a),
                type_name(b)
            ))),
        },
    }
}

fn op_eq(left: &Value, right: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(left.loose_eq(right)))
}

fn op_ne(left: &Value, right: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(!left.loose_eq(right)))
}

fn compare(
    left: &Value,
    right: &Value,
    num: impl Fn(f64, f64) -> bool,
    text: impl Fn(&str, &str) -> bool,
    symbol: &str,
) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
        return Ok(Value::Boolean(num(a, b)));
    }
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Ok(Value::Boolean(text(a, b)));
    }
    Err(EvalError::Type(format!(
        "Cannot compare {} {} {}",
        type_name(left),
        symbol,
        type_name(right)
    )))
}

fn op_gt(left: &Value, right: &Value) -> Result<Value, EvalError> {
    compare(left, right, |a, b| a > b, |a, b| a > b, ">")
}

fn op_ge(left: &Value, right: &Value) -> Result<Value, EvalError> {
    compare(left, right, |a, b| a >= b, |a, b| a >= b, ">=")
}

fn op_lt(left: &Value, right: &Value) -> Result<Value, EvalError> {
    compare(left, right, |a, b| a < b, |a, b| a < b, "<")
}

fn op_le(left: &Value, right: &Value) -> Result<Value, EvalError> {
    compare(left, right, |a, b| a <= b, |a, b| a <= b, "<=")
}

fn op_in(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match right {
        Value::String(haystack) => match left {
            Value::String(needle) => Ok(Value::Boolean(haystack.contains(needle.as_str()))),
            other => Err(EvalError::Type(format!(
                "Cannot search a string for {}",
                type_name(other)
            ))),
        },
        Value::Array(items) => Ok(Value::Boolean(items.iter().any(|v| v.loose_eq(left)))),
        other => Err(EvalError::Type(format!(
            "Operator 'in' requires a string or array on the right, got {}",
            type_name(other)
        ))),
    }
}

fn op_and<'a>(left: OperandFuture<'a>, right: OperandFuture<'a>) -> OperandFuture<'a> {
    Box::pin(async move {
        let l = left.await?;
        if l.is_truthy() { right.await } else { Ok(l) }
    })
}

fn op_or<'a>(left: OperandFuture<'a>, right: OperandFuture<'a>) -> OperandFuture<'a> {
    Box::pin(async move {
        let l = left.await?;
        if l.is_truthy() { Ok(l) } else { right.await }
    })
}

fn op_not(value: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(!value.is_truthy()))
}
