//! Tokenizer for filter expressions.

use crate::value::{Number, Timestamp};

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    /// Identifier or dotted path; also operator and function keywords.
    Ident(String),
    String(String),
    Number(Number),
    Timestamp(Timestamp),
    True,
    False,
    Null,
    LParen,
    RParen,
    Comma,
    /// A run of symbol characters such as `=` or `>=`.
    Symbol(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    Lexer {
        input,
        bytes: input.as_bytes(),
        pos: 0,
    }
    .run()
}

struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token>, ExprError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(&b) = self.bytes.get(self.pos) else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    position: start,
                });
                return Ok(tokens);
            };

            let kind = match b {
                b'(' => self.single(TokenKind::LParen),
                b')' => self.single(TokenKind::RParen),
                b',' => self.single(TokenKind::Comma),
                b'\'' => self.string()?,
                b'0'..=b'9' => self.number()?,
                b'-' if self.peek_digit(1) => self.number()?,
                b if b.is_ascii_alphabetic() || b == b'_' => self.word(),
                b'=' | b'<' | b'>' | b'!' | b'&' | b'|' => self.symbol(),
                _ => {
                    let ch = self.input[start..].chars().next().unwrap_or('?');
                    return Err(ExprError::syntax(
                        start,
                        format!("unexpected character '{ch}'"),
                    ));
                }
            };
            tokens.push(Token {
                kind,
                position: start,
            });
        }
    }

    fn skip_whitespace(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek_digit(&self, offset: usize) -> bool {
        self.bytes
            .get(self.pos + offset)
            .is_some_and(u8::is_ascii_digit)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let input = self.input;
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(|&b| pred(b)) {
            self.pos += 1;
        }
        &input[start..self.pos]
    }

    fn symbol(&mut self) -> TokenKind {
        let text = self.take_while(|b| matches!(b, b'=' | b'<' | b'>' | b'!' | b'&' | b'|'));
        TokenKind::Symbol(text.to_string())
    }

    fn word(&mut self) -> TokenKind {
        let text = self.take_while(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.');
        match text {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => TokenKind::Ident(text.to_string()),
        }
    }

    fn string(&mut self) -> Result<TokenKind, ExprError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let rest = &self.input[self.pos..];
            let Some(quote) = rest.find('\'') else {
                return Err(ExprError::syntax(start, "unterminated string literal"));
            };
            out.push_str(&rest[..quote]);
            self.pos += quote + 1;
            if self.bytes.get(self.pos) == Some(&b'\'') {
                out.push('\'');
                self.pos += 1;
            } else {
                return Ok(TokenKind::String(out));
            }
        }
    }

    fn number(&mut self) -> Result<TokenKind, ExprError> {
        let start = self.pos;
        if self.looks_like_date() {
            let text = self.take_while(|b| {
                b.is_ascii_alphanumeric() || matches!(b, b'-' | b':' | b'.' | b'+')
            });
            return Timestamp::parse(text)
                .map(TokenKind::Timestamp)
                .ok_or_else(|| ExprError::syntax(start, format!("invalid date literal '{text}'")));
        }

        if self.bytes[self.pos] == b'-' {
            self.pos += 1;
        }
        self.take_while(|b| b.is_ascii_digit());
        let mut float = false;
        if self.bytes.get(self.pos) == Some(&b'.') && self.peek_digit(1) {
            float = true;
            self.pos += 1;
            self.take_while(|b| b.is_ascii_digit());
        }
        if matches!(self.bytes.get(self.pos), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.bytes.get(self.pos + 1), Some(b'+' | b'-')));
            if self.peek_digit(1 + sign) {
                float = true;
                self.pos += 1 + sign;
                self.take_while(|b| b.is_ascii_digit());
            }
        }
        if self
            .bytes
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
        {
            return Err(ExprError::syntax(start, "invalid number literal"));
        }

        let text = &self.input[start..self.pos];
        let number = if float {
            text.parse::<f64>().ok().map(Number::F64)
        } else {
            text.parse::<i64>()
                .map(Number::I64)
                .or_else(|_| text.parse::<u64>().map(Number::U64))
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(Number::F64))
        };
        number
            .map(TokenKind::Number)
            .ok_or_else(|| ExprError::syntax(start, format!("invalid number literal '{text}'")))
    }

    /// `YYYY-MM-DD` prefix at the current position.
    fn looks_like_date(&self) -> bool {
        let b = &self.bytes[self.pos..];
        b.len() >= 10
            && b[..4].iter().all(u8::is_ascii_digit)
            && b[4] == b'-'
            && b[5..7].iter().all(u8::is_ascii_digit)
            && b[7] == b'-'
            && b[8..10].iter().all(u8::is_ascii_digit)
    }
}
