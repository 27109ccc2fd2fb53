use crate::value::Value;

/// Classification of a lexical element.
///
/// Operator kinds (`BinaryOp`, `UnaryOp`) cover whatever symbols the grammar
/// currently defines; punctuation kinds are fixed language structure and can
/// never be removed from a grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Left bracket starting a filter or array literal
    OpenBracket,

    /// Right bracket
    CloseBracket,

    /// Left brace starting an object literal
    OpenCurly,

    /// Right brace
    CloseCurly,

    /// Left parenthesis for grouping or argument lists
    OpenParen,

    /// Right parenthesis
    CloseParen,

    /// Dot for property traversal or a relative-identifier marker
    Dot,

    /// Pipe applying a transform to the value on its left
    Pipe,

    /// Question mark opening a ternary
    Question,

    /// Colon between ternary branches or object key/value pairs
    Colon,

    /// Comma separating arguments, elements, and pairs
    Comma,

    /// A grammar-defined binary operator (`+`, `==`, `in`, ...)
    BinaryOp,

    /// A grammar-defined unary operator (`!`, ...)
    UnaryOp,

    /// Identifier: context lookups, function and transform names
    Identifier,

    /// String, number, or boolean literal
    Literal,
}

/// The parsed payload of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    /// Symbol or identifier text, exactly as written
    Text(String),

    /// Unescaped string literal content
    Str(String),

    /// Integer literal
    Int(i64),

    /// Float literal
    Float(f64),

    /// Boolean literal
    Bool(bool),
}

impl TokenValue {
    /// The text of an identifier or operator token.
    pub fn as_text(&self) -> &str {
        match self {
            TokenValue::Text(s) | TokenValue::Str(s) => s,
            _ => "",
        }
    }

    /// The literal payload as a runtime value.
    pub fn to_value(&self) -> Value {
        match self {
            TokenValue::Text(s) | TokenValue::Str(s) => Value::String(s.clone()),
            TokenValue::Int(n) => Value::Integer(*n),
            TokenValue::Float(n) => Value::Float(*n),
            TokenValue::Bool(b) => Value::Boolean(*b),
        }
    }
}

/// A classified lexical unit.
///
/// `raw` holds the original source slice including any whitespace that
/// followed it (and, for the first token, any that preceded it), so
/// concatenating `raw` across a token stream reproduces the source exactly.
/// Tokens are immutable once produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub raw: String,
}

impl Token {
    pub fn new(kind: TokenKind, value: TokenValue, raw: impl Into<String>) -> Self {
        Token {
            kind,
            value,
            raw: raw.into(),
        }
    }
}
