//! Cursor-based state-machine parser.
//!
//! Tokens drive a fixed transition table; nodes are built in an arena of
//! integer-id drafts so the transient parent back-references needed for
//! precedence climbing never appear in the finished tree. Bracketed,
//! parenthesized, and ternary sub-regions are parsed by nested `Parser`
//! instances with stop-token maps; a stop token both closes the sub-parser
//! and transitions the outer one.
//!
//! The cursor always points at the most recently placed node. New nodes are
//! attached *after* it (filling a binary/unary right slot) or *before* it
//! (the cursor's subtree becomes a child of the new node, as when a value is
//! wrapped into a filter, transform call, or ternary).

use std::collections::HashMap;
use std::mem;

use thiserror::Error;

use crate::ast::{Expr, Pool, Token, TokenKind, TokenValue};
use crate::grammar::Grammar;
use crate::value::Value;

/// Failure while building the AST.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Unexpected token '{token}' in expression: {expression}")]
    UnexpectedToken { token: String, expression: String },

    #[error("Unexpected end of expression: {expression}")]
    UnexpectedEnd { expression: String },

    #[error("Cannot add to or complete an already-completed parser")]
    AlreadyComplete,

    #[error("Invalid function name in expression: {expression}")]
    InvalidFunctionName { expression: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectOperand,
    ExpectBinOp,
    ExpectTransform,
    ExpectTransformName,
    PostTransform,
    PostArgs,
    ExpectObjKey,
    ExpectKeyValSep,
    Identifier,
    Traverse,
    Filter,
    SubExpression,
    ArgVal,
    ObjVal,
    ArrayVal,
    TernaryMid,
    TernaryEnd,
    Complete,
}

/// What a state-table hit does before (possibly) switching state.
#[derive(Debug, Clone, Copy)]
enum Action {
    None,
    Literal,
    Identifier,
    UnaryOp,
    BinaryOp,
    Dot,
    ObjStart,
    ObjKey,
    ArrayStart,
    TernaryStart,
    Transform,
    TransformNameExtend,
    FunctionCall,
}

/// States a parser may legally be completed in.
fn completable(state: State) -> bool {
    matches!(
        state,
        State::ExpectBinOp
            | State::Identifier
            | State::PostTransform
            | State::PostArgs
            | State::TernaryEnd
    )
}

/// States whose tokens are delegated to a nested sub-parser.
fn is_sub_state(state: State) -> bool {
    matches!(
        state,
        State::Filter
            | State::SubExpression
            | State::ArgVal
            | State::ObjVal
            | State::ArrayVal
            | State::TernaryMid
            | State::TernaryEnd
    )
}

/// Stop tokens of a sub-parser state: reaching one closes the sub-parser and
/// moves the outer parser to the mapped state. `TernaryEnd` has none; it
/// inherits the outer parser's own stop map.
fn end_states(state: State) -> Option<&'static [(TokenKind, State)]> {
    match state {
        State::Filter => Some(&[(TokenKind::CloseBracket, State::Identifier)]),
        State::SubExpression => Some(&[(TokenKind::CloseParen, State::ExpectBinOp)]),
        State::ArgVal => Some(&[
            (TokenKind::Comma, State::ArgVal),
            (TokenKind::CloseParen, State::PostArgs),
        ]),
        State::ObjVal => Some(&[
            (TokenKind::Comma, State::ExpectObjKey),
            (TokenKind::CloseCurly, State::ExpectBinOp),
        ]),
        State::ArrayVal => Some(&[
            (TokenKind::Comma, State::ArrayVal),
            (TokenKind::CloseBracket, State::ExpectBinOp),
        ]),
        State::TernaryMid => Some(&[(TokenKind::Colon, State::TernaryEnd)]),
        _ => None,
    }
}

/// The transition table: for each (state, token kind) pair, the action to
/// run and the state to move to (`None` = stay).
fn transition(state: State, kind: TokenKind) -> Option<(Action, Option<State>)> {
    use State::*;
    use TokenKind as K;
    match (state, kind) {
        (ExpectOperand, K::Literal) => Some((Action::Literal, Some(ExpectBinOp))),
        (ExpectOperand, K::Identifier) => Some((Action::Identifier, Some(Identifier))),
        (ExpectOperand, K::UnaryOp) => Some((Action::UnaryOp, None)),
        (ExpectOperand, K::OpenParen) => Some((Action::None, Some(SubExpression))),
        (ExpectOperand, K::OpenCurly) => Some((Action::ObjStart, Some(ExpectObjKey))),
        (ExpectOperand, K::Dot) => Some((Action::Dot, Some(Traverse))),
        (ExpectOperand, K::OpenBracket) => Some((Action::ArrayStart, Some(ArrayVal))),

        (ExpectBinOp, K::BinaryOp) => Some((Action::BinaryOp, Some(ExpectOperand))),
        (ExpectBinOp, K::Pipe) => Some((Action::None, Some(ExpectTransform))),
        (ExpectBinOp, K::Dot) => Some((Action::Dot, Some(Traverse))),
        (ExpectBinOp, K::Question) => Some((Action::TernaryStart, Some(TernaryMid))),

        (ExpectTransform, K::Identifier) => Some((Action::Transform, Some(PostTransform))),

        (ExpectTransformName, K::Identifier) => {
            Some((Action::TransformNameExtend, Some(PostTransform)))
        }

        (PostTransform, K::OpenParen) => Some((Action::None, Some(ArgVal))),
        (PostTransform, K::Dot) => Some((Action::None, Some(ExpectTransformName))),
        (PostTransform, K::BinaryOp) => Some((Action::BinaryOp, Some(ExpectOperand))),
        (PostTransform, K::OpenBracket) => Some((Action::None, Some(Filter))),
        (PostTransform, K::Pipe) => Some((Action::None, Some(ExpectTransform))),

        (PostArgs, K::BinaryOp) => Some((Action::BinaryOp, Some(ExpectOperand))),
        (PostArgs, K::Dot) => Some((Action::Dot, Some(Traverse))),
        (PostArgs, K::OpenBracket) => Some((Action::None, Some(Filter))),
        (PostArgs, K::Pipe) => Some((Action::None, Some(ExpectTransform))),

        (Identifier, K::BinaryOp) => Some((Action::BinaryOp, Some(ExpectOperand))),
        (Identifier, K::Dot) => Some((Action::Dot, Some(Traverse))),
        (Identifier, K::OpenBracket) => Some((Action::None, Some(Filter))),
        (Identifier, K::OpenParen) => Some((Action::FunctionCall, Some(ArgVal))),
        (Identifier, K::Pipe) => Some((Action::None, Some(ExpectTransform))),
        (Identifier, K::Question) => Some((Action::TernaryStart, Some(TernaryMid))),

        (Traverse, K::Identifier) => Some((Action::Identifier, Some(Identifier))),

        (ExpectObjKey, K::Identifier) => Some((Action::ObjKey, Some(ExpectKeyValSep))),
        (ExpectObjKey, K::Literal) => Some((Action::ObjKey, Some(ExpectKeyValSep))),
        (ExpectObjKey, K::CloseCurly) => Some((Action::None, Some(ExpectBinOp))),

        (ExpectKeyValSep, K::Colon) => Some((Action::None, Some(ObjVal))),

        _ => None,
    }
}

/// In-progress node. Children are arena ids; slots still empty while the
/// cursor sits on them are `None`.
#[derive(Debug, Clone)]
enum Draft {
    Literal(Value),
    Identifier {
        value: String,
        from: Option<usize>,
        relative: bool,
    },
    Binary {
        operator: String,
        left: usize,
        right: Option<usize>,
    },
    Unary {
        operator: String,
        right: Option<usize>,
    },
    Conditional {
        test: usize,
        consequent: Option<usize>,
        alternate: Option<usize>,
    },
    Filter {
        subject: usize,
        expr: usize,
        relative: bool,
    },
    ArrayLiteral(Vec<usize>),
    ObjectLiteral(Vec<(String, usize)>),
    FunctionCall {
        name: String,
        args: Vec<usize>,
        pool: Pool,
    },
    /// A finished subtree imported from a sub-parser
    Done(Expr),
}

#[derive(Debug, Clone)]
struct Node {
    draft: Draft,
    parent: Option<usize>,
}

enum Outcome {
    Consumed,
    /// A stop token was hit; the payload is the outer parser's next state
    Stopped(State),
}

pub struct Parser<'g> {
    grammar: &'g Grammar,
    state: State,
    arena: Vec<Node>,
    tree: Option<usize>,
    cursor: Option<usize>,
    sub_parser: Option<Box<Parser<'g>>>,
    stop_map: HashMap<TokenKind, State>,
    /// Set when the current sub-parser inherited our stop map; its stop
    /// tokens then also stop us
    parent_stop: bool,
    /// Raw source consumed so far, for error messages
    expr_str: String,
    /// True once any relative identifier appeared in this expression
    relative: bool,
    next_ident_encapsulate: bool,
    next_ident_relative: bool,
    cur_obj_key: Option<String>,
}

impl<'g> Parser<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Parser::with_stops(grammar, String::new(), HashMap::new())
    }

    fn with_stops(grammar: &'g Grammar, prefix: String, stop_map: HashMap<TokenKind, State>) -> Self {
        Parser {
            grammar,
            state: State::ExpectOperand,
            arena: Vec::new(),
            tree: None,
            cursor: None,
            sub_parser: None,
            stop_map,
            parent_stop: false,
            expr_str: prefix,
            relative: false,
            next_ident_encapsulate: false,
            next_ident_relative: false,
            cur_obj_key: None,
        }
    }

    /// Feed one token.
    pub fn add_token(&mut self, token: Token) -> Result<(), ParseError> {
        match self.push_token(token)? {
            Outcome::Consumed => Ok(()),
            // The top-level parser has no stop tokens; a sub-parser's stops
            // are consumed internally
            Outcome::Stopped(_) => Err(ParseError::AlreadyComplete),
        }
    }

    /// Feed a whole token stream.
    pub fn add_tokens(&mut self, tokens: Vec<Token>) -> Result<(), ParseError> {
        for token in tokens {
            self.add_token(token)?;
        }
        Ok(())
    }

    /// True iff a relative identifier (leading-dot form) appeared anywhere
    /// in this expression outside a nested filter.
    pub fn is_relative(&self) -> bool {
        self.relative
    }

    /// Finish parsing and extract the tree.
    ///
    /// Fails with [`ParseError::UnexpectedEnd`] when the expression stops in
    /// a non-completable place (dangling operator, unclosed bracket, empty
    /// input) and [`ParseError::AlreadyComplete`] on a second call. After a
    /// successful or failed completion the parser accepts no more tokens.
    pub fn complete(&mut self) -> Result<Expr, ParseError> {
        match self.complete_inner()? {
            Some(expr) => Ok(expr),
            None => Err(ParseError::UnexpectedEnd {
                expression: self.expr_str.trim().to_string(),
            }),
        }
    }

    fn complete_inner(&mut self) -> Result<Option<Expr>, ParseError> {
        if self.state == State::Complete {
            return Err(ParseError::AlreadyComplete);
        }
        if self.cursor.is_some() && !completable(self.state) {
            self.state = State::Complete;
            return Err(ParseError::UnexpectedEnd {
                expression: self.expr_str.trim().to_string(),
            });
        }
        if self.sub_parser.is_some() {
            self.end_sub_expression()?;
        }
        if self.state == State::TernaryEnd {
            // Completable, but only once the alternate branch arrived
            let missing = match self.cursor.map(|c| &self.arena[c].draft) {
                Some(Draft::Conditional { alternate, .. }) => alternate.is_none(),
                _ => false,
            };
            if missing {
                self.state = State::Complete;
                return Err(ParseError::UnexpectedEnd {
                    expression: self.expr_str.trim().to_string(),
                });
            }
        }
        self.state = State::Complete;
        match self.tree {
            Some(root) => Ok(Some(self.build(root))),
            None => Ok(None),
        }
    }

    fn push_token(&mut self, token: Token) -> Result<Outcome, ParseError> {
        if self.state == State::Complete {
            return Err(ParseError::AlreadyComplete);
        }
        let start_expr = self.expr_str.clone();
        self.expr_str.push_str(&token.raw);

        if is_sub_state(self.state) {
            if self.sub_parser.is_none() {
                self.start_sub_expression(start_expr);
            }
            let outcome = self
                .sub_parser
                .as_mut()
                .expect("sub-parser was just created")
                .push_token(token)?;
            if let Outcome::Stopped(next) = outcome {
                self.end_sub_expression()?;
                if self.parent_stop {
                    self.parent_stop = false;
                    return Ok(Outcome::Stopped(next));
                }
                self.state = next;
            }
            return Ok(Outcome::Consumed);
        }

        if let Some((action, next)) = transition(self.state, token.kind) {
            self.apply(action, &token)?;
            if let Some(next) = next {
                self.state = next;
            }
            return Ok(Outcome::Consumed);
        }

        if let Some(&stop) = self.stop_map.get(&token.kind) {
            return Ok(Outcome::Stopped(stop));
        }

        Err(ParseError::UnexpectedToken {
            token: token.raw.trim().to_string(),
            expression: self.expr_str.trim().to_string(),
        })
    }

    fn start_sub_expression(&mut self, prefix: String) {
        let stops: HashMap<TokenKind, State> = match end_states(self.state) {
            Some(pairs) => pairs.iter().copied().collect(),
            None => {
                // No stops of its own (ternary alternate): the sub-parser
                // ends where we would
                self.parent_stop = true;
                self.stop_map.clone()
            }
        };
        self.sub_parser = Some(Box::new(Parser::with_stops(self.grammar, prefix, stops)));
    }

    fn end_sub_expression(&mut self) -> Result<(), ParseError> {
        let mut sub = self
            .sub_parser
            .take()
            .expect("end_sub_expression requires an open sub-parser");
        let ast = sub.complete_inner()?;
        let sub_relative = sub.is_relative();

        match self.state {
            State::Filter => {
                let expr = self.require(ast)?;
                let expr_id = self.alloc(Draft::Done(expr));
                let subject = self
                    .cursor
                    .expect("filter state always has a subject under the cursor");
                let node = self.alloc(Draft::Filter {
                    subject,
                    expr: expr_id,
                    relative: sub_relative,
                });
                self.place_before_cursor(node);
            }
            State::SubExpression => {
                let expr = self.require(ast)?;
                let node = self.alloc(Draft::Done(expr));
                self.place_at_cursor(node);
                self.relative |= sub_relative;
            }
            State::ArgVal => {
                // `foo()` and trailing commas produce empty argument slots
                if let Some(expr) = ast {
                    let id = self.alloc(Draft::Done(expr));
                    let cursor = self.cursor.expect("argument list requires a call node");
                    if let Draft::FunctionCall { args, .. } = &mut self.arena[cursor].draft {
                        args.push(id);
                    }
                }
                self.relative |= sub_relative;
            }
            State::ObjVal => {
                let expr = self.require(ast)?;
                let id = self.alloc(Draft::Done(expr));
                let key = self
                    .cur_obj_key
                    .take()
                    .expect("object value always follows a key");
                let cursor = self.cursor.expect("object value requires an object node");
                if let Draft::ObjectLiteral(pairs) = &mut self.arena[cursor].draft {
                    pairs.push((key, id));
                }
                self.relative |= sub_relative;
            }
            State::ArrayVal => {
                if let Some(expr) = ast {
                    let id = self.alloc(Draft::Done(expr));
                    let cursor = self.cursor.expect("array element requires an array node");
                    if let Draft::ArrayLiteral(items) = &mut self.arena[cursor].draft {
                        items.push(id);
                    }
                }
                self.relative |= sub_relative;
            }
            State::TernaryMid => {
                // A missing consequent is the Elvis form
                let id = ast.map(|expr| self.alloc(Draft::Done(expr)));
                let cursor = self.cursor.expect("ternary requires a conditional node");
                if let Draft::Conditional { consequent, .. } = &mut self.arena[cursor].draft {
                    *consequent = id;
                }
                self.relative |= sub_relative;
            }
            State::TernaryEnd => {
                let expr = self.require(ast)?;
                let id = self.alloc(Draft::Done(expr));
                let cursor = self.cursor.expect("ternary requires a conditional node");
                if let Draft::Conditional { alternate, .. } = &mut self.arena[cursor].draft {
                    *alternate = Some(id);
                }
                self.relative |= sub_relative;
            }
            _ => unreachable!("sub-parser closed outside a sub-expression state"),
        }
        Ok(())
    }

    fn require(&self, ast: Option<Expr>) -> Result<Expr, ParseError> {
        ast.ok_or_else(|| ParseError::UnexpectedEnd {
            expression: self.expr_str.trim().to_string(),
        })
    }

    fn apply(&mut self, action: Action, token: &Token) -> Result<(), ParseError> {
        match action {
            Action::None => {}
            Action::Literal => {
                let node = self.alloc(Draft::Literal(token.value.to_value()));
                self.place_at_cursor(node);
            }
            Action::Identifier => {
                let value = token.value.as_text().to_string();
                if self.next_ident_encapsulate {
                    let from = self.cursor.expect("encapsulation requires a cursor node");
                    let node = self.alloc(Draft::Identifier {
                        value,
                        from: Some(from),
                        relative: false,
                    });
                    self.place_before_cursor(node);
                    self.next_ident_encapsulate = false;
                } else {
                    let relative = mem::take(&mut self.next_ident_relative);
                    let node = self.alloc(Draft::Identifier {
                        value,
                        from: None,
                        relative,
                    });
                    self.place_at_cursor(node);
                }
            }
            Action::UnaryOp => {
                let node = self.alloc(Draft::Unary {
                    operator: token.value.as_text().to_string(),
                    right: None,
                });
                self.place_at_cursor(node);
            }
            Action::BinaryOp => self.binary_op(token),
            Action::Dot => self.dot(),
            Action::ObjStart => {
                let node = self.alloc(Draft::ObjectLiteral(Vec::new()));
                self.place_at_cursor(node);
            }
            Action::ObjKey => {
                self.cur_obj_key = Some(match &token.value {
                    TokenValue::Text(s) | TokenValue::Str(s) => s.clone(),
                    other => other.to_value().as_string(),
                });
            }
            Action::ArrayStart => {
                let node = self.alloc(Draft::ArrayLiteral(Vec::new()));
                self.place_at_cursor(node);
            }
            Action::TernaryStart => {
                let test = self
                    .tree
                    .expect("ternary only follows a completed operand");
                let node = self.alloc(Draft::Conditional {
                    test,
                    consequent: None,
                    alternate: None,
                });
                self.arena[test].parent = Some(node);
                self.tree = Some(node);
                self.cursor = Some(node);
            }
            Action::Transform => {
                let subject = self.cursor.expect("a transform always has a piped value");
                let node = self.alloc(Draft::FunctionCall {
                    name: token.value.as_text().to_string(),
                    args: vec![subject],
                    pool: Pool::Transforms,
                });
                self.place_before_cursor(node);
            }
            Action::TransformNameExtend => {
                let cursor = self.cursor.expect("transform name extends the cursor call");
                if let Draft::FunctionCall { name, .. } = &mut self.arena[cursor].draft {
                    name.push('.');
                    name.push_str(token.value.as_text());
                }
            }
            Action::FunctionCall => {
                let cursor = self.cursor.expect("a call always follows an identifier");
                let name = self.flatten_name(cursor)?;
                let node = self.alloc(Draft::FunctionCall {
                    name,
                    args: Vec::new(),
                    pool: Pool::Functions,
                });
                self.place_before_cursor(node);
            }
        }
        Ok(())
    }

    /// Splice a binary operator into the right spine, climbing the parent
    /// chain while the ancestor binds at least as tightly. Left-associative
    /// and precedence-correct without backtracking.
    fn binary_op(&mut self, token: &Token) {
        let operator = token.value.as_text().to_string();
        let precedence = self.grammar.binary_precedence(&operator).unwrap_or(0);

        let mut target = self
            .cursor
            .expect("binary operators only follow an operand");
        while let Some(parent) = self.arena[target].parent {
            match self.node_precedence(parent) {
                Some(p) if p >= precedence => target = parent,
                _ => break,
            }
        }

        let old_parent = self.arena[target].parent;
        let node = self.alloc(Draft::Binary {
            operator,
            left: target,
            right: None,
        });
        self.arena[node].parent = old_parent;
        self.arena[target].parent = Some(node);
        match old_parent {
            None => self.tree = Some(node),
            Some(p) => self.replace_child(p, target, node),
        }
        self.cursor = Some(node);
    }

    /// Operator strength of a draft for precedence climbing: binary nodes
    /// use their grammar precedence, unary nodes always win, everything
    /// else stops the climb.
    fn node_precedence(&self, id: usize) -> Option<u8> {
        match &self.arena[id].draft {
            Draft::Binary { operator, .. } => {
                Some(self.grammar.binary_precedence(operator).unwrap_or(0))
            }
            Draft::Unary { .. } => Some(u8::MAX),
            _ => None,
        }
    }

    /// A dot either chains a property lookup onto the cursor or, with no
    /// usable cursor, marks the next identifier as relative. Exactly one of
    /// the two lookahead flags is set.
    fn dot(&mut self) {
        self.next_ident_encapsulate = match self.cursor.map(|c| &self.arena[c].draft) {
            None => false,
            Some(Draft::Unary { .. }) => false,
            Some(Draft::Binary { right, .. }) => right.is_some(),
            Some(_) => true,
        };
        self.next_ident_relative = !self.next_ident_encapsulate;
        if self.next_ident_relative {
            self.relative = true;
        }
    }

    /// Rebuild a dotted name from an identifier chain. Only a plain,
    /// non-relative identifier path can name a function.
    fn flatten_name(&self, id: usize) -> Result<String, ParseError> {
        match &self.arena[id].draft {
            Draft::Identifier {
                value,
                from,
                relative: false,
            } => match from {
                None => Ok(value.clone()),
                Some(f) => Ok(format!("{}.{}", self.flatten_name(*f)?, value)),
            },
            _ => Err(ParseError::InvalidFunctionName {
                expression: self.expr_str.trim().to_string(),
            }),
        }
    }

    fn alloc(&mut self, draft: Draft) -> usize {
        self.arena.push(Node {
            draft,
            parent: None,
        });
        self.arena.len() - 1
    }

    /// Attach a node after the cursor: it fills the cursor's open right
    /// slot (or becomes the tree root) and takes over as cursor.
    fn place_at_cursor(&mut self, id: usize) {
        match self.cursor {
            None => self.tree = Some(id),
            Some(cursor) => match &mut self.arena[cursor].draft {
                Draft::Binary { right, .. } | Draft::Unary { right, .. } => *right = Some(id),
                _ => unreachable!("cursor cannot accept a right-hand child"),
            },
        }
        self.arena[id].parent = self.cursor;
        self.cursor = Some(id);
    }

    /// Attach a node before the cursor: the new node (already holding the
    /// cursor's subtree as a child) takes the cursor's place in the tree.
    fn place_before_cursor(&mut self, id: usize) {
        let old = self
            .cursor
            .expect("place_before_cursor requires a cursor node");
        self.cursor = self.arena[old].parent;
        self.place_at_cursor(id);
        self.arena[old].parent = Some(id);
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        let swap = |slot: &mut usize| {
            if *slot == old {
                *slot = new;
            }
        };
        match &mut self.arena[parent].draft {
            Draft::Binary { left, right, .. } => {
                swap(left);
                if let Some(r) = right {
                    swap(r);
                }
            }
            Draft::Unary { right, .. } => {
                if let Some(r) = right {
                    swap(r);
                }
            }
            Draft::Conditional {
                test,
                consequent,
                alternate,
            } => {
                swap(test);
                if let Some(c) = consequent {
                    swap(c);
                }
                if let Some(a) = alternate {
                    swap(a);
                }
            }
            Draft::Filter { subject, expr, .. } => {
                swap(subject);
                swap(expr);
            }
            Draft::Identifier { from: Some(f), .. } => swap(f),
            Draft::FunctionCall { args, .. } => args.iter_mut().for_each(swap),
            Draft::ArrayLiteral(items) => items.iter_mut().for_each(swap),
            Draft::ObjectLiteral(pairs) => pairs.iter_mut().for_each(|(_, v)| swap(v)),
            Draft::Literal(_) | Draft::Identifier { from: None, .. } | Draft::Done(_) => {}
        }
    }

    /// Resolve the arena into the owned, parent-free tree.
    fn build(&mut self, id: usize) -> Expr {
        let draft = mem::replace(&mut self.arena[id].draft, Draft::Literal(Value::Undefined));
        match draft {
            Draft::Literal(value) => Expr::Literal(value),
            Draft::Identifier {
                value,
                from,
                relative,
            } => Expr::Identifier {
                value,
                from: from.map(|f| Box::new(self.build(f))),
                relative,
            },
            Draft::Binary {
                operator,
                left,
                right,
            } => Expr::Binary {
                operator,
                left: Box::new(self.build(left)),
                right: Box::new(
                    self.build(right.expect("completable states leave no open right slot")),
                ),
            },
            Draft::Unary { operator, right } => Expr::Unary {
                operator,
                right: Box::new(
                    self.build(right.expect("completable states leave no open right slot")),
                ),
            },
            Draft::Conditional {
                test,
                consequent,
                alternate,
            } => Expr::Conditional {
                test: Box::new(self.build(test)),
                consequent: consequent.map(|c| Box::new(self.build(c))),
                alternate: Box::new(
                    self.build(alternate.expect("ternary completion checks the alternate")),
                ),
            },
            Draft::Filter {
                subject,
                expr,
                relative,
            } => Expr::Filter {
                subject: Box::new(self.build(subject)),
                expr: Box::new(self.build(expr)),
                relative,
            },
            Draft::ArrayLiteral(items) => {
                Expr::ArrayLiteral(items.into_iter().map(|i| self.build(i)).collect())
            }
            Draft::ObjectLiteral(pairs) => Expr::ObjectLiteral(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, self.build(v)))
                    .collect(),
            ),
            Draft::FunctionCall { name, args, pool } => Expr::FunctionCall {
                name,
                args: args.into_iter().map(|a| self.build(a)).collect(),
                pool,
            },
            Draft::Done(expr) => expr,
        }
    }
}
