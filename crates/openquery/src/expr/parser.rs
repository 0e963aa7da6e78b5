//! Recursive-descent parser with type checking.

use crate::error::QueryError;
use crate::metadata::RecordMetadata;
use crate::resolve::resolve_scalar;
use crate::value::{FieldType, Literal, Timestamp};

use super::lexer::{tokenize, Token, TokenKind};
use super::{CompareOp, Expr, ExprError, Function, LogicalOp, Pattern};

type Parsed = Result<(Expr, usize), ExprError>;

/// Deepest allowed nesting of parentheses, `not` and function calls.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Parses and type-checks a filter expression against `meta`.
///
/// The whole expression must be boolean. Errors carry the byte offset of the
/// offending token. Nesting deeper than [`MAX_NESTING_DEPTH`] is a parse
/// error.
///
/// ```
/// # use openquery::{expr, RecordMetadata};
/// # fn demo(meta: &'static RecordMetadata) {
/// let parsed = expr::parse(meta, "age gt 25 and not contains(name, 'x')");
/// # }
/// ```
pub fn parse(meta: &'static RecordMetadata, input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        meta,
        tokens,
        pos: 0,
        depth: 0,
    };
    if parser.peek().kind == TokenKind::Eof {
        return Err(ExprError::syntax(0, "empty expression"));
    }
    let (expr, start) = parser.or_expr()?;
    parser.expect_end()?;
    require_type(&expr, FieldType::Bool, start)?;
    Ok(expr)
}

struct Parser {
    meta: &'static RecordMetadata,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// Runs `f` one nesting level deeper.
    fn nested<R>(
        &mut self,
        position: usize,
        f: impl FnOnce(&mut Self) -> Result<R, ExprError>,
    ) -> Result<R, ExprError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ExprError::syntax(position, "expression nested too deeply"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn eat_keyword(&mut self, keyword: &str) -> Option<usize> {
        let found = matches!(&self.peek().kind, TokenKind::Ident(word) if word == keyword);
        found.then(|| self.advance().position)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<usize, ExprError> {
        let token = self.peek();
        if token.kind == kind {
            Ok(self.advance().position)
        } else {
            Err(ExprError::syntax(
                token.position,
                format!("expected {what}, found {}", describe(&token.kind)),
            ))
        }
    }

    fn expect_end(&mut self) -> Result<(), ExprError> {
        let token = self.peek();
        match &token.kind {
            TokenKind::Eof => Ok(()),
            TokenKind::RParen => Err(ExprError::syntax(token.position, "unbalanced ')'")),
            TokenKind::Ident(word) | TokenKind::Symbol(word) => {
                Err(unsupported(word, token.position))
            }
            other => Err(ExprError::syntax(
                token.position,
                format!("unexpected {}", describe(other)),
            )),
        }
    }

    fn or_expr(&mut self) -> Parsed {
        let (mut left, start) = self.and_expr()?;
        while self.eat_keyword("or").is_some() {
            let (right, pos) = self.and_expr()?;
            left = logical(LogicalOp::Or, left, start, right, pos)?;
        }
        Ok((left, start))
    }

    fn and_expr(&mut self) -> Parsed {
        let (mut left, start) = self.comparison()?;
        while self.eat_keyword("and").is_some() {
            let (right, pos) = self.comparison()?;
            left = logical(LogicalOp::And, left, start, right, pos)?;
        }
        Ok((left, start))
    }

    fn comparison(&mut self) -> Parsed {
        let (mut left, start) = self.unary()?;
        loop {
            let token = self.peek().clone();
            let op = match &token.kind {
                TokenKind::Ident(word) => match CompareOp::from_keyword(word) {
                    Some(op) => op,
                    None if word == "and" || word == "or" => break,
                    None => return Err(unsupported(word, token.position)),
                },
                TokenKind::Symbol(symbol) => return Err(unsupported(symbol, token.position)),
                _ => break,
            };
            self.advance();
            let (right, pos) = self.unary()?;
            left = compare(op, left, right, token.position, pos)?;
        }
        Ok((left, start))
    }

    fn unary(&mut self) -> Parsed {
        if let Some(position) = self.eat_keyword("not") {
            let (inner, pos) = self.nested(position, Self::unary)?;
            require_type(&inner, FieldType::Bool, pos)?;
            return Ok((Expr::Not(Box::new(inner)), position));
        }
        self.primary()
    }

    fn primary(&mut self) -> Parsed {
        let token = self.advance();
        let position = token.position;
        let expr = match token.kind {
            TokenKind::LParen => {
                let (inner, _) = self.nested(position, Self::or_expr)?;
                self.expect(TokenKind::RParen, "')'")?;
                inner
            }
            TokenKind::String(s) => Expr::Literal(Literal::String(s)),
            TokenKind::Number(n) => Expr::Literal(Literal::Number(n)),
            TokenKind::Timestamp(t) => Expr::Literal(Literal::Timestamp(t)),
            TokenKind::True => Expr::Literal(Literal::Bool(true)),
            TokenKind::False => Expr::Literal(Literal::Bool(false)),
            TokenKind::Null => Expr::Literal(Literal::Null),
            TokenKind::Ident(name) if *self.peek_at(0) == TokenKind::LParen => {
                self.advance();
                self.nested(position, |parser| parser.call(&name, position))?
            }
            TokenKind::Ident(name) if is_keyword(&name) => {
                return Err(ExprError::syntax(
                    position,
                    format!("expected an operand, found '{name}'"),
                ));
            }
            TokenKind::Ident(name) => resolve_scalar(self.meta, &name)
                .map(Expr::Field)
                .map_err(|e| ExprError::new(position, e))?,
            TokenKind::Symbol(symbol) => return Err(unsupported(&symbol, position)),
            other => {
                return Err(ExprError::syntax(
                    position,
                    format!("expected an operand, found {}", describe(&other)),
                ));
            }
        };
        Ok((expr, position))
    }

    /// Parses the argument list after `name(`.
    fn call(&mut self, name: &str, position: usize) -> Result<Expr, ExprError> {
        let mut args = Vec::new();
        if *self.peek_at(0) != TokenKind::RParen {
            loop {
                args.push(self.or_expr()?);
                if *self.peek_at(0) == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after arguments")?;

        if name == "matchespattern" {
            return matches_pattern(args, position);
        }

        let function = Function::from_name(name).ok_or_else(|| unsupported(name, position))?;
        if args.len() != function.arity() {
            return Err(ExprError::syntax(
                position,
                format!(
                    "{name} expects {} argument(s), got {}",
                    function.arity(),
                    args.len()
                ),
            ));
        }
        for (arg, pos) in &args {
            require_type(arg, FieldType::String, *pos)?;
        }
        Ok(Expr::Call {
            function,
            args: args.into_iter().map(|(arg, _)| arg).collect(),
        })
    }
}

fn matches_pattern(args: Vec<(Expr, usize)>, position: usize) -> Result<Expr, ExprError> {
    let [(subject, subject_pos), (pattern, pattern_pos)]: [(Expr, usize); 2] =
        args.try_into().map_err(|args: Vec<_>| {
            ExprError::syntax(
                position,
                format!("matchespattern expects 2 argument(s), got {}", args.len()),
            )
        })?;
    require_type(&subject, FieldType::String, subject_pos)?;
    let found = type_name(&pattern);
    let Expr::Literal(Literal::String(text)) = pattern else {
        return Err(ExprError::new(
            pattern_pos,
            QueryError::type_mismatch("string literal", found),
        ));
    };
    let pattern = Pattern::new(&text)
        .map_err(|e| ExprError::syntax(pattern_pos, format!("invalid pattern: {e}")))?;
    Ok(Expr::Matches {
        subject: Box::new(subject),
        pattern,
    })
}

fn logical(
    op: LogicalOp,
    left: Expr,
    left_pos: usize,
    right: Expr,
    right_pos: usize,
) -> Result<Expr, ExprError> {
    require_type(&left, FieldType::Bool, left_pos)?;
    require_type(&right, FieldType::Bool, right_pos)?;
    Ok(Expr::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn compare(
    op: CompareOp,
    left: Expr,
    right: Expr,
    op_pos: usize,
    right_pos: usize,
) -> Result<Expr, ExprError> {
    let (left, right) = coerce_dates(left, right);
    match (left.field_type(), right.field_type()) {
        (Some(expected), Some(actual)) if expected != actual => {
            return Err(ExprError::new(
                right_pos,
                QueryError::type_mismatch(expected.as_str(), actual.as_str()),
            ));
        }
        (None, _) | (_, None) if !op.is_equality() => {
            return Err(ExprError::new(
                op_pos,
                QueryError::type_mismatch("eq or ne when comparing with null", op.as_str()),
            ));
        }
        _ => {}
    }
    Ok(Expr::Compare {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// Quoted strings compared with a date operand are read as dates.
fn coerce_dates(left: Expr, right: Expr) -> (Expr, Expr) {
    fn coerce(expr: Expr) -> Expr {
        if let Expr::Literal(Literal::String(s)) = &expr {
            if let Some(t) = Timestamp::parse(s) {
                return Expr::Literal(Literal::Timestamp(t));
            }
        }
        expr
    }

    match (left.field_type(), right.field_type()) {
        (Some(FieldType::Timestamp), Some(FieldType::String)) => (left, coerce(right)),
        (Some(FieldType::String), Some(FieldType::Timestamp)) => (coerce(left), right),
        _ => (left, right),
    }
}

fn require_type(expr: &Expr, expected: FieldType, position: usize) -> Result<(), ExprError> {
    if expr.field_type() == Some(expected) {
        Ok(())
    } else {
        Err(ExprError::new(
            position,
            QueryError::type_mismatch(expected.as_str(), type_name(expr)),
        ))
    }
}

fn type_name(expr: &Expr) -> &'static str {
    expr.field_type().map_or("null", FieldType::as_str)
}

fn unsupported(name: &str, position: usize) -> ExprError {
    ExprError::new(
        position,
        QueryError::UnsupportedOperator {
            name: name.to_string(),
            position,
        },
    )
}

fn is_keyword(word: &str) -> bool {
    matches!(word, "and" | "or" | "not") || CompareOp::from_keyword(word).is_some()
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(word) => format!("'{word}'"),
        TokenKind::String(_) => "string literal".to_string(),
        TokenKind::Number(n) => format!("'{n}'"),
        TokenKind::Timestamp(_) => "date literal".to_string(),
        TokenKind::True => "'true'".to_string(),
        TokenKind::False => "'false'".to_string(),
        TokenKind::Null => "'null'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Symbol(symbol) => format!("'{symbol}'"),
        TokenKind::Eof => "end of input".to_string(),
    }
}
