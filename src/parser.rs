// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::lexer::*;

use std::sync::Arc;

use anyhow::{bail, Result};

/// Identifiers reserved by the expression language.
pub const RESERVED_IDENTIFIERS: [&str; 18] = [
    "as",
    "break",
    "const",
    "continue",
    "else",
    "for",
    "function",
    "if",
    "import",
    "in",
    "let",
    "loop",
    "package",
    "namespace",
    "return",
    "var",
    "void",
    "while",
];

const MAX_NESTING_DEPTH: u32 = 128;

/// Longest accepted expression, in code points.
pub const MAX_EXPRESSION_SIZE: usize = 100_000;

#[derive(Clone)]
pub struct Parser<'source> {
    source: Source,
    lexer: Lexer<'source>,
    tok: Token,
    end: u32,
    depth: u32,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source Source) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let tok = lexer.next_token()?;
        Ok(Self {
            source: source.clone(),
            lexer,
            tok,
            end: 0,
            depth: 0,
        })
    }

    /// Parses a complete expression. Trailing tokens are an error.
    pub fn parse(source: &'source Source) -> Result<Expr> {
        let size = source.contents().chars().count();
        if size > MAX_EXPRESSION_SIZE {
            bail!(
                "expression code point size {size} exceeds limit {MAX_EXPRESSION_SIZE}"
            );
        }
        let mut parser = Self::new(source)?;
        if parser.tok.0 == TokenKind::Eof {
            bail!(parser.tok.1.error("expression is empty"));
        }
        let expr = parser.parse_expr()?;
        if parser.tok.0 != TokenKind::Eof {
            bail!(parser.tok.1.error("unexpected token after expression"));
        }
        Ok(expr)
    }

    pub fn token_text(&self) -> &str {
        match self.tok.0 {
            TokenKind::Symbol | TokenKind::Ident | TokenKind::Eof => self.tok.1.text(),
            _ => "",
        }
    }

    fn next_token(&mut self) -> Result<()> {
        self.end = self.tok.1.end;
        self.tok = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, text: &str, context: &str) -> Result<()> {
        if self.token_text() == text {
            self.next_token()
        } else {
            let msg = format!("expecting `{text}` {context}");
            Err(self.source.error(self.tok.1.line, self.tok.1.col, &msg))
        }
    }

    fn is_symbol(&self, text: &str) -> bool {
        self.tok.0 == TokenKind::Symbol && self.tok.1.text() == text
    }

    fn parse_ident(&mut self) -> Result<Span> {
        let span = self.tok.1.clone();
        if self.tok.0 != TokenKind::Ident {
            bail!(span.error("expecting identifier"));
        }
        if RESERVED_IDENTIFIERS.contains(&span.text()) || is_literal_keyword(span.text()) {
            bail!(span.error(&format!("reserved identifier `{}`", span.text())));
        }
        self.next_token()?;
        Ok(span)
    }

    // Member names may be reserved words, e.g. `authorizer.namespace('ns')`.
    fn parse_field_name(&mut self) -> Result<Span> {
        let span = self.tok.1.clone();
        if self.tok.0 != TokenKind::Ident || is_literal_keyword(span.text()) {
            bail!(span.error("expecting field name"));
        }
        self.next_token()?;
        Ok(span)
    }

    // Every node wrapping an earlier one counts as a level, so chains of operators are bounded
    // as well as parenthesized nesting.
    fn nest(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            bail!(self.tok.1.error("expression nesting exceeds maximum depth"));
        }
        Ok(())
    }

    pub fn parse_expr(&mut self) -> Result<Expr> {
        let depth = self.depth;
        self.nest()?;
        let result = self.parse_conditional_expr();
        self.depth = depth;
        result
    }

    fn parse_conditional_expr(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let cond = self.parse_or_expr()?;
        if !self.is_symbol("?") {
            return Ok(cond);
        }
        let mut span = self.tok.1.clone();
        span.start = start;
        self.next_token()?;
        let then = self.parse_or_expr()?;
        self.expect(":", "in conditional expression")?;
        let otherwise = self.parse_expr()?;
        span.end = self.end;
        Ok(Expr::Conditional {
            span,
            cond: Ref::new(cond),
            then: Ref::new(then),
            otherwise: Ref::new(otherwise),
        })
    }

    fn parse_or_expr(&mut self) -> Result<Expr> {
        let (start, depth) = (self.tok.1.start, self.depth);
        let mut expr = self.parse_and_expr()?;
        while self.is_symbol("||") {
            let mut span = self.tok.1.clone();
            span.start = start;
            self.next_token()?;
            self.nest()?;
            let right = self.parse_and_expr()?;
            span.end = self.end;
            expr = Expr::Or {
                span,
                lhs: Ref::new(expr),
                rhs: Ref::new(right),
            };
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_and_expr(&mut self) -> Result<Expr> {
        let (start, depth) = (self.tok.1.start, self.depth);
        let mut expr = self.parse_relation_expr()?;
        while self.is_symbol("&&") {
            let mut span = self.tok.1.clone();
            span.start = start;
            self.next_token()?;
            self.nest()?;
            let right = self.parse_relation_expr()?;
            span.end = self.end;
            expr = Expr::And {
                span,
                lhs: Ref::new(expr),
                rhs: Ref::new(right),
            };
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_relation_expr(&mut self) -> Result<Expr> {
        let (start, depth) = (self.tok.1.start, self.depth);
        let mut expr = self.parse_arith_expr()?;

        loop {
            let mut span = self.tok.1.clone();
            span.start = start;
            if self.tok.0 == TokenKind::Ident && self.tok.1.text() == "in" {
                self.next_token()?;
                self.nest()?;
                let right = self.parse_arith_expr()?;
                span.end = self.end;
                expr = Expr::In {
                    span,
                    value: Ref::new(expr),
                    collection: Ref::new(right),
                };
                continue;
            }
            let op = match (self.tok.0, self.token_text()) {
                (TokenKind::Symbol, "<") => BoolOp::Lt,
                (TokenKind::Symbol, "<=") => BoolOp::Le,
                (TokenKind::Symbol, "==") => BoolOp::Eq,
                (TokenKind::Symbol, ">=") => BoolOp::Ge,
                (TokenKind::Symbol, ">") => BoolOp::Gt,
                (TokenKind::Symbol, "!=") => BoolOp::Ne,
                _ => break,
            };
            self.next_token()?;
            self.nest()?;
            let right = self.parse_arith_expr()?;
            span.end = self.end;
            expr = Expr::Compare {
                span,
                op,
                lhs: Ref::new(expr),
                rhs: Ref::new(right),
            };
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_arith_expr(&mut self) -> Result<Expr> {
        let (start, depth) = (self.tok.1.start, self.depth);
        let mut expr = self.parse_mul_div_mod_expr()?;

        loop {
            let mut span = self.tok.1.clone();
            span.start = start;
            let op = match (self.tok.0, self.token_text()) {
                (TokenKind::Symbol, "+") => ArithOp::Add,
                (TokenKind::Symbol, "-") => ArithOp::Sub,
                _ => break,
            };
            self.next_token()?;
            self.nest()?;
            let right = self.parse_mul_div_mod_expr()?;
            span.end = self.end;
            expr = Expr::Arith {
                span,
                op,
                lhs: Ref::new(expr),
                rhs: Ref::new(right),
            };
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_mul_div_mod_expr(&mut self) -> Result<Expr> {
        let (start, depth) = (self.tok.1.start, self.depth);
        let mut expr = self.parse_unary_expr()?;

        loop {
            let mut span = self.tok.1.clone();
            span.start = start;
            let op = match (self.tok.0, self.token_text()) {
                (TokenKind::Symbol, "*") => ArithOp::Mul,
                (TokenKind::Symbol, "/") => ArithOp::Div,
                (TokenKind::Symbol, "%") => ArithOp::Mod,
                _ => break,
            };
            self.next_token()?;
            self.nest()?;
            let right = self.parse_unary_expr()?;
            span.end = self.end;
            expr = Expr::Arith {
                span,
                op,
                lhs: Ref::new(expr),
                rhs: Ref::new(right),
            };
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr> {
        let op = match (self.tok.0, self.token_text()) {
            (TokenKind::Symbol, "!") => UnaryOp::Not,
            (TokenKind::Symbol, "-") => UnaryOp::Neg,
            _ => return self.parse_member_expr(),
        };
        let mut span = self.tok.1.clone();
        self.next_token()?;

        // -9223372036854775808 is only representable as a negated literal.
        if op == UnaryOp::Neg && self.tok.0 == TokenKind::Int {
            let literal = self.tok.1.clone();
            let value = parse_int(&literal, true)?;
            self.next_token()?;
            span.end = self.end;
            let expr = Expr::Int { span, value };
            return self.parse_member_tail(expr, literal.start);
        }

        let depth = self.depth;
        self.nest()?;
        let expr = self.parse_unary_expr()?;
        self.depth = depth;
        span.end = self.end;
        Ok(Expr::Unary {
            span,
            op,
            expr: Ref::new(expr),
        })
    }

    fn parse_member_expr(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let primary = self.parse_primary_expr()?;
        self.parse_member_tail(primary, start)
    }

    fn parse_member_tail(&mut self, mut term: Expr, start: u32) -> Result<Expr> {
        let depth = self.depth;
        loop {
            let mut span = self.tok.1.clone();
            span.start = start;
            match (self.tok.0, self.token_text()) {
                (TokenKind::Symbol, ".") => {
                    self.nest()?;
                    self.next_token()?;
                    let field = self.parse_field_name()?;
                    if self.is_symbol("(") {
                        self.next_token()?;
                        let args = self.parse_args(")")?;
                        span.end = self.end;
                        term = self.make_receiver_call(span, term, field, args)?;
                    } else {
                        span.end = self.end;
                        term = Expr::Select {
                            span,
                            operand: Ref::new(term),
                            field,
                            test_only: false,
                        };
                    }
                }
                (TokenKind::Symbol, "[") => {
                    self.nest()?;
                    self.next_token()?;
                    let index = self.parse_expr()?;
                    self.expect("]", "while parsing index expression")?;
                    span.end = self.end;
                    term = Expr::Index {
                        span,
                        operand: Ref::new(term),
                        index: Ref::new(index),
                    };
                }
                (TokenKind::Symbol, "{") => {
                    let Some(type_name) = qualified_name(&term) else {
                        break;
                    };
                    self.nest()?;
                    self.next_token()?;
                    let fields = self.parse_field_inits()?;
                    span.end = self.end;
                    term = Expr::Object {
                        span,
                        type_name,
                        fields,
                    };
                }
                _ => break,
            }
        }
        self.depth = depth;
        Ok(term)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        let span = self.tok.1.clone();
        match self.tok.0 {
            TokenKind::Int => {
                let value = parse_int(&span, false)?;
                self.next_token()?;
                Ok(Expr::Int { span, value })
            }
            TokenKind::Uint => {
                let value = parse_uint(&span)?;
                self.next_token()?;
                Ok(Expr::Uint { span, value })
            }
            TokenKind::Double => {
                let Ok(value) = span.text().parse::<f64>() else {
                    bail!(span.error("invalid double literal"));
                };
                self.next_token()?;
                Ok(Expr::Double { span, value })
            }
            TokenKind::String { raw, bytes } => {
                let decoded = unescape(&span, raw)?;
                self.next_token()?;
                if bytes {
                    Ok(Expr::Bytes {
                        span,
                        value: Arc::from(decoded),
                    })
                } else {
                    let Ok(s) = String::from_utf8(decoded) else {
                        bail!(span.error("string literal is not valid utf-8"));
                    };
                    Ok(Expr::String {
                        span,
                        value: Arc::from(s),
                    })
                }
            }
            TokenKind::Ident => match span.text() {
                "true" | "false" => {
                    self.next_token()?;
                    Ok(Expr::Bool {
                        value: span.text() == "true",
                        span,
                    })
                }
                "null" => {
                    self.next_token()?;
                    Ok(Expr::Null(span))
                }
                _ => {
                    let mut span = self.parse_ident()?;
                    if !self.is_symbol("(") {
                        return Ok(Expr::Ident(span));
                    }
                    let function = span.clone();
                    self.next_token()?;
                    let args = self.parse_args(")")?;
                    span.end = self.end;
                    self.make_global_call(span, function, args)
                }
            },
            TokenKind::Symbol => match span.text() {
                "(" => {
                    self.next_token()?;
                    let expr = self.parse_expr()?;
                    self.expect(")", "while parsing parenthesized expression")?;
                    Ok(expr)
                }
                "[" => {
                    let mut span = span;
                    self.next_token()?;
                    let items = self.parse_args("]")?;
                    span.end = self.end;
                    Ok(Expr::List { span, items })
                }
                "{" => {
                    let mut span = span;
                    self.next_token()?;
                    let entries = self.parse_map_entries()?;
                    span.end = self.end;
                    Ok(Expr::Map { span, entries })
                }
                "." => {
                    // Leading dot selects from the root scope.
                    self.next_token()?;
                    let ident = self.parse_ident()?;
                    Ok(Expr::Ident(ident))
                }
                _ => bail!(span.error("unexpected symbol")),
            },
            TokenKind::Eof => bail!(span.error("unexpected end of expression")),
        }
    }

    /// Parses a comma separated list terminated by `close`. Trailing commas are allowed.
    fn parse_args(&mut self, close: &str) -> Result<Vec<Ref<Expr>>> {
        let mut args = vec![];
        while !self.is_symbol(close) {
            args.push(Ref::new(self.parse_expr()?));
            if !self.is_symbol(",") {
                break;
            }
            self.next_token()?;
        }
        self.expect(close, "while parsing argument list")?;
        Ok(args)
    }

    fn parse_map_entries(&mut self) -> Result<Vec<(Ref<Expr>, Ref<Expr>)>> {
        let mut entries = vec![];
        while !self.is_symbol("}") {
            let key = self.parse_expr()?;
            self.expect(":", "while parsing map entry")?;
            let value = self.parse_expr()?;
            entries.push((Ref::new(key), Ref::new(value)));
            if !self.is_symbol(",") {
                break;
            }
            self.next_token()?;
        }
        self.expect("}", "while parsing map literal")?;
        Ok(entries)
    }

    fn parse_field_inits(&mut self) -> Result<Vec<(Span, Ref<Expr>)>> {
        let mut fields: Vec<(Span, Ref<Expr>)> = vec![];
        while !self.is_symbol("}") {
            let name = self.parse_ident()?;
            if fields.iter().any(|(f, _)| f.text() == name.text()) {
                bail!(name.error("duplicate field in object literal"));
            }
            self.expect(":", "while parsing object field")?;
            let value = self.parse_expr()?;
            fields.push((name, Ref::new(value)));
            if !self.is_symbol(",") {
                break;
            }
            self.next_token()?;
        }
        self.expect("}", "while parsing object literal")?;
        Ok(fields)
    }

    fn make_global_call(&self, span: Span, function: Span, args: Vec<Ref<Expr>>) -> Result<Expr> {
        if function.text() != "has" {
            return Ok(Expr::Call {
                span,
                target: None,
                function,
                args,
            });
        }
        let [arg] = args.as_slice() else {
            bail!(span.error("has() takes exactly one argument"));
        };
        match arg.as_ref() {
            Expr::Select {
                operand,
                field,
                test_only: false,
                ..
            } => Ok(Expr::Select {
                span,
                operand: operand.clone(),
                field: field.clone(),
                test_only: true,
            }),
            _ => bail!(arg.span().error("invalid argument to has() macro")),
        }
    }

    fn make_receiver_call(
        &self,
        span: Span,
        target: Expr,
        function: Span,
        mut args: Vec<Ref<Expr>>,
    ) -> Result<Expr> {
        let kind = match function.text() {
            "all" => Some(ComprehensionKind::All),
            "exists" => Some(ComprehensionKind::Exists),
            "exists_one" => Some(ComprehensionKind::ExistsOne),
            "map" => Some(ComprehensionKind::Map),
            "filter" => Some(ComprehensionKind::Filter),
            _ => None,
        };
        let Some(kind) = kind else {
            return Ok(Expr::Call {
                span,
                target: Some(Ref::new(target)),
                function,
                args,
            });
        };

        let arity_ok = match kind {
            ComprehensionKind::Map => args.len() == 2 || args.len() == 3,
            _ => args.len() == 2,
        };
        if !arity_ok {
            bail!(function.error(&format!(
                "wrong number of arguments to {}() macro",
                kind.name()
            )));
        }
        let var = match args[0].as_ref() {
            Expr::Ident(var) => var.clone(),
            other => bail!(other.span().error("argument must be a simple name")),
        };
        let body = args.pop();
        let filter = if args.len() == 2 { args.pop() } else { None };
        let Some(body) = body else {
            bail!(span.error("missing macro body"));
        };
        Ok(Expr::Comprehension {
            span,
            kind,
            range: Ref::new(target),
            var,
            filter,
            body,
        })
    }
}

fn is_literal_keyword(text: &str) -> bool {
    matches!(text, "true" | "false" | "null")
}

/// Returns the dotted name of an identifier or field selection chain.
fn qualified_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Ident(span) => Some(span.text().to_string()),
        Expr::Select {
            operand,
            field,
            test_only: false,
            ..
        } => qualified_name(operand).map(|prefix| format!("{prefix}.{}", field.text())),
        _ => None,
    }
}

fn parse_magnitude(span: &Span) -> Result<u64> {
    let text = span.text();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    match parsed {
        Ok(v) => Ok(v),
        Err(_) => bail!(span.error("integer literal out of range")),
    }
}

fn parse_int(span: &Span, negative: bool) -> Result<i64> {
    let magnitude = parse_magnitude(span)? as i128;
    let value = if negative { -magnitude } else { magnitude };
    match i64::try_from(value) {
        Ok(v) => Ok(v),
        Err(_) => bail!(span.error("integer literal out of range")),
    }
}

fn parse_uint(span: &Span) -> Result<u64> {
    parse_magnitude(span)
}
