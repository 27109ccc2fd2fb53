use crate::value::Value;

/// Which callable namespace a call resolves in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    /// Named functions, called as `name(args)`
    Functions,

    /// Transforms, applied with the pipe: `value | name` or
    /// `value | name(extra, args)`
    Transforms,
}

impl Pool {
    pub fn name(&self) -> &'static str {
        match self {
            Pool::Functions => "functions",
            Pool::Transforms => "transforms",
        }
    }
}

/// Abstract Syntax Tree node representing a parsed expression.
///
/// A completed tree is pure and acyclic: every node owns its children and
/// nothing points back up. The parser's transient parent links live in its
/// internal arena and never surface here.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal string, number, or boolean
    ///
    /// # Example
    /// ```text
    /// 42
    /// "hello"
    /// true
    /// ```
    Literal(Value),

    /// Context lookup, possibly one link of a property chain
    ///
    /// `a.b.c` parses inside-out: the node for `c` has `from` pointing at
    /// the node for `b`, which points at `a`. `relative` marks identifiers
    /// introduced by a leading `.` inside a filter (e.g. `.age`), resolved
    /// against the current array element.
    Identifier {
        value: String,
        from: Option<Box<Expr>>,
        relative: bool,
    },

    /// Binary operation (arithmetic, comparison, logical, user-defined)
    Binary {
        operator: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Unary operation
    ///
    /// # Example
    /// ```text
    /// !done
    /// ```
    Unary { operator: String, right: Box<Expr> },

    /// Ternary conditional
    ///
    /// A missing `consequent` encodes the Elvis form `a ?: b`, which
    /// returns the test's own value when it is truthy.
    Conditional {
        test: Box<Expr>,
        consequent: Option<Box<Expr>>,
        alternate: Box<Expr>,
    },

    /// Bracketed filter applied to a subject value
    ///
    /// Relative filters (`users[.age > 25]`) keep array elements for which
    /// `expr` is truthy; static filters (`obj["a" + "b"]`, `arr[1]`)
    /// evaluate `expr` once and use it as a property key or index.
    Filter {
        subject: Box<Expr>,
        expr: Box<Expr>,
        relative: bool,
    },

    /// Array literal
    ///
    /// # Example
    /// ```text
    /// [1, "two", three]
    /// ```
    ArrayLiteral(Vec<Expr>),

    /// Object literal; insertion order of pairs is preserved
    ///
    /// # Example
    /// ```text
    /// {name: first + " " + last, age: 30}
    /// ```
    ObjectLiteral(Vec<(String, Expr)>),

    /// Function or transform invocation
    ///
    /// `name` may be dotted (`String.upper`); the parser reconstructs it by
    /// walking the identifier chain, never by splitting raw source text.
    FunctionCall {
        name: String,
        args: Vec<Expr>,
        pool: Pool,
    },
}
