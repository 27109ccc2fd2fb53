//! Regex-driven tokenizer.
//!
//! The lexer owns no language knowledge of its own: its split regex is built
//! from whatever symbols the grammar currently defines, so newly registered
//! operators are recognized without touching this module. Classification
//! order per element: quoted string, whitespace, boolean, grammar symbol,
//! identifier, number. Anything else is an invalid token.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::ast::{Token, TokenKind, TokenValue};
use crate::grammar::Grammar;

/// Failure during tokenization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    /// Source text that matches no lexical class
    #[error("Invalid token '{text}' at position {position}")]
    InvalidToken { text: String, position: usize },

    /// A numeric literal that cannot be represented
    #[error("Invalid number '{text}' at position {position}")]
    InvalidNumber { text: String, position: usize },
}

/// A `-` fuses onto a following number as its sign when the token before it
/// is one of these kinds, or when there is no token before it.
const NEGATES_AFTER: [TokenKind; 6] = [
    TokenKind::BinaryOp,
    TokenKind::UnaryOp,
    TokenKind::OpenParen,
    TokenKind::OpenBracket,
    TokenKind::Question,
    TokenKind::Colon,
];

pub struct Lexer<'g> {
    grammar: &'g Grammar,
    split_regex: OnceLock<Regex>,
}

impl<'g> Lexer<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Lexer {
            grammar,
            split_regex: OnceLock::new(),
        }
    }

    /// Turn a source string into tokens.
    ///
    /// Whitespace never forms a token; it is folded into the `raw` of the
    /// preceding token (or the following one, at the very start), so the
    /// concatenation of all `raw` fields reproduces the source exactly.
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, LexError> {
        let re = self.split_regex();
        let mut tokens: Vec<Token> = Vec::new();
        // Whitespace seen before the first token
        let mut leading_ws = String::new();
        // Raw text of a '-' waiting to fuse onto a number
        let mut negate: Option<String> = None;
        let mut pos = 0;

        for caps in re.captures_iter(input) {
            let whole = caps.get(0).expect("capture group 0 always exists");
            if whole.start() != pos {
                return Err(LexError::InvalidToken {
                    text: input[pos..whole.start()].to_string(),
                    position: pos,
                });
            }
            pos = whole.end();
            let raw = whole.as_str();

            if caps.name("ws").is_some() {
                if let Some(pending) = negate.as_mut() {
                    pending.push_str(raw);
                } else if let Some(last) = tokens.last_mut() {
                    last.raw.push_str(raw);
                } else {
                    leading_ws.push_str(raw);
                }
                continue;
            }

            if let Some(pending) = negate.take() {
                if caps.name("num").is_some() {
                    let token =
                        make_number(raw, whole.start(), true, format!("{}{}", pending, raw))?;
                    push(&mut tokens, &mut leading_ws, token);
                    continue;
                }
                // The minus did not bind to a number after all
                push(
                    &mut tokens,
                    &mut leading_ws,
                    Token::new(TokenKind::BinaryOp, TokenValue::Text("-".into()), pending),
                );
            }

            let token = if caps.name("str").is_some() {
                Token::new(
                    TokenKind::Literal,
                    TokenValue::Str(unescape(&raw[1..raw.len() - 1])),
                    raw,
                )
            } else if caps.name("bool").is_some() {
                Token::new(TokenKind::Literal, TokenValue::Bool(raw == "true"), raw)
            } else if caps.name("sym").is_some() {
                let kind = self
                    .grammar
                    .element(raw)
                    .map(|e| e.token_kind())
                    .ok_or_else(|| LexError::InvalidToken {
                        text: raw.to_string(),
                        position: whole.start(),
                    })?;
                if raw == "-" && can_negate(&tokens) {
                    negate = Some(raw.to_string());
                    continue;
                }
                Token::new(kind, TokenValue::Text(raw.to_string()), raw)
            } else if caps.name("ident").is_some() {
                Token::new(TokenKind::Identifier, TokenValue::Text(raw.to_string()), raw)
            } else if caps.name("num").is_some() {
                make_number(raw, whole.start(), false, raw.to_string())?
            } else {
                return Err(LexError::InvalidToken {
                    text: raw.to_string(),
                    position: whole.start(),
                });
            };

            push(&mut tokens, &mut leading_ws, token);
        }

        if pos != input.len() {
            return Err(LexError::InvalidToken {
                text: input[pos..].to_string(),
                position: pos,
            });
        }

        // A trailing '-' never found its number; hand it to the parser as-is
        if let Some(pending) = negate {
            push(
                &mut tokens,
                &mut leading_ws,
                Token::new(TokenKind::BinaryOp, TokenValue::Text("-".into()), pending),
            );
        }

        Ok(tokens)
    }

    /// The master split regex, built once per lexer from the grammar's
    /// current symbol set.
    fn split_regex(&self) -> &Regex {
        self.split_regex.get_or_init(|| {
            let mut symbols: Vec<&str> = self.grammar.symbols().map(|(s, _)| s).collect();
            // Longest first so '==' is never truncated to '='
            symbols.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
            let symbol_alt = if symbols.is_empty() {
                // Never matches
                r"[^\s\S]".to_string()
            } else {
                symbols
                    .iter()
                    .map(|s| {
                        let escaped = regex::escape(s);
                        if is_identifier_like(s) {
                            // Word boundaries keep 'in' from matching inside 'inside'
                            format!(r"\b{}\b", escaped)
                        } else {
                            escaped
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("|")
            };

            let pattern = format!(
                concat!(
                    r#"(?P<str>'(?:\\.|[^'\\])*'|"(?:\\.|[^"\\])*")"#,
                    r"|(?P<ws>\s+)",
                    r"|(?P<bool>\btrue\b|\bfalse\b)",
                    r"|(?P<sym>{})",
                    r"|(?P<ident>[\p{{L}}_$][\p{{L}}\p{{N}}_$]*)",
                    r"|(?P<num>[0-9]*\.[0-9]+|[0-9]+)",
                ),
                symbol_alt
            );
            Regex::new(&pattern).expect("split regex is valid by construction")
        })
    }
}

fn push(tokens: &mut Vec<Token>, leading_ws: &mut String, mut token: Token) {
    if tokens.is_empty() && !leading_ws.is_empty() {
        token.raw = format!("{}{}", leading_ws, token.raw);
        leading_ws.clear();
    }
    tokens.push(token);
}

fn can_negate(tokens: &[Token]) -> bool {
    match tokens.last() {
        None => true,
        Some(t) => NEGATES_AFTER.contains(&t.kind),
    }
}

fn make_number(text: &str, position: usize, negative: bool, raw: String) -> Result<Token, LexError> {
    let value = if text.contains('.') {
        let n: f64 = text.parse().map_err(|_| LexError::InvalidNumber {
            text: text.to_string(),
            position,
        })?;
        TokenValue::Float(if negative { -n } else { n })
    } else {
        let n: i64 = text.parse().map_err(|_| LexError::InvalidNumber {
            text: text.to_string(),
            position,
        })?;
        TokenValue::Int(if negative { -n } else { n })
    };
    Ok(Token::new(TokenKind::Literal, value, raw))
}

fn is_identifier_like(symbol: &str) -> bool {
    symbol
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Undo the escapes the split regex allowed through: quotes and backslashes.
/// Any other escape sequence is left untouched.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\'' | '\\')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
