// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp;
use core::fmt::{self, Debug, Formatter};
use core::iter::Peekable;
use core::str::CharIndices;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};

struct SourceInternal {
    pub file: String,
    pub contents: String,
    pub lines: Vec<(u32, u32)>,
}

/// Expression source text shared by every span produced from it.
#[derive(Clone)]
pub struct Source {
    src: Arc<SourceInternal>,
}

impl cmp::PartialEq for Source {
    fn eq(&self, other: &Source) -> bool {
        Arc::ptr_eq(&self.src, &other.src)
    }
}

impl cmp::Eq for Source {}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl Source {
    pub fn from_contents(file: String, contents: String) -> Result<Source> {
        let max_size = u32::MAX as usize - 2;
        if contents.len() > max_size {
            bail!("{file} exceeds maximum allowed expression size {max_size}");
        }
        let mut lines = vec![];
        let mut prev_ch = ' ';
        let mut prev_pos = 0u32;
        let mut start = 0u32;
        for (i, ch) in contents.char_indices() {
            if ch == '\n' {
                let end = match prev_ch {
                    '\r' => prev_pos,
                    _ => i as u32,
                };
                lines.push((start, end));
                start = i as u32 + 1;
            }
            prev_ch = ch;
            prev_pos = i as u32;
        }

        if (start as usize) < contents.len() {
            lines.push((start, contents.len() as u32));
        } else if contents.is_empty() {
            lines.push((0, 0));
        } else {
            let s = (contents.len() - 1) as u32;
            lines.push((s, s));
        }
        Ok(Self {
            src: Arc::new(SourceInternal {
                file,
                contents,
                lines,
            }),
        })
    }

    pub fn file(&self) -> &String {
        &self.src.file
    }

    pub fn contents(&self) -> &String {
        &self.src.contents
    }

    pub fn line(&self, idx: u32) -> &str {
        let idx = idx as usize;
        if idx < self.src.lines.len() {
            let (start, end) = self.src.lines[idx];
            &self.src.contents[start as usize..end as usize]
        } else {
            ""
        }
    }

    pub fn message(&self, line: u32, col: u32, kind: &str, msg: &str) -> String {
        if line as usize > self.src.lines.len() || line == 0 {
            return format!("{}: invalid line {} specified", self.src.file, line);
        }

        let line_str = format!("{line}");
        let line_num_width = line_str.len() + 1;
        let col_spaces = (col as usize).saturating_sub(1);

        format!(
            "\n--> {}:{}:{}\n{:<line_num_width$}|\n\
		{:<line_num_width$}| {}\n\
		{:<line_num_width$}| {:<col_spaces$}^\n\
		{}: {}",
            self.src.file,
            line,
            col,
            "",
            line,
            self.line(line - 1),
            "",
            "",
            kind,
            msg
        )
    }

    pub fn error(&self, line: u32, col: u32, msg: &str) -> anyhow::Error {
        anyhow!(self.message(line, col, "error", msg))
    }
}

#[derive(Clone)]
pub struct Span {
    pub source: Source,
    pub line: u32,
    pub col: u32,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn text(&self) -> &str {
        &self.source.contents()[self.start as usize..self.end as usize]
    }

    pub fn message(&self, kind: &str, msg: &str) -> String {
        self.source.message(self.line, self.col, kind, msg)
    }

    pub fn error(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.line, self.col, msg)
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let t = self.text().escape_debug().to_string();
        let max = 32;
        let (txt, trailer) = if t.len() > max {
            (&t[0..max], "...")
        } else {
            (t.as_str(), "")
        };

        f.write_fmt(format_args!(
            "{}:{}:{}:{}, \"{}{}\"",
            self.line, self.col, self.start, self.end, txt, trailer
        ))
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    Symbol,
    /// Quoted string. The span covers the contents between the quotes.
    String { raw: bool, bytes: bool },
    Int,
    Uint,
    Double,
    Ident,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token(pub TokenKind, pub Span);

#[derive(Clone)]
pub struct Lexer<'source> {
    source: Source,
    iter: Peekable<CharIndices<'source>>,
    line: u32,
    col: u32,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source Source) -> Self {
        Self {
            source: source.clone(),
            iter: source.contents().char_indices().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn peek(&mut self) -> (usize, char) {
        match self.iter.peek() {
            Some((index, chr)) => (*index, *chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn peekahead(&mut self, n: usize) -> (usize, char) {
        match self.iter.clone().nth(n) {
            Some((index, chr)) => (index, chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn span(&self, line: u32, col: u32, start: usize, end: usize) -> Span {
        Span {
            source: self.source.clone(),
            line,
            col,
            start: start as u32,
            end: end as u32,
        }
    }

    fn read_ident(&mut self) -> Result<Token> {
        let start = self.peek().0;
        let col = self.col;
        loop {
            let ch = self.peek().1;
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.iter.next();
            } else {
                break;
            }
        }
        let end = self.peek().0;
        self.col += (end - start) as u32;
        Ok(Token(TokenKind::Ident, self.span(self.line, col, start, end)))
    }

    fn read_digits(&mut self) {
        while self.peek().1.is_ascii_digit() {
            self.iter.next();
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let (start, chr) = self.peek();
        let col = self.col;
        let mut kind = TokenKind::Int;

        if chr == '0' && matches!(self.peekahead(1).1, 'x' | 'X') {
            self.iter.next();
            self.iter.next();
            while self.peek().1.is_ascii_hexdigit() {
                self.iter.next();
            }
            if self.peek().0 == start + 2 {
                return Err(self.source.error(self.line, col, "invalid hex literal"));
            }
        } else {
            self.read_digits();

            // . must be followed by at least 1 digit.
            if self.peek().1 == '.' && self.peekahead(1).1.is_ascii_digit() {
                kind = TokenKind::Double;
                self.iter.next();
                self.read_digits();
            }

            let ch = self.peek().1;
            if ch == 'e' || ch == 'E' {
                kind = TokenKind::Double;
                self.iter.next();
                if matches!(self.peek().1, '+' | '-') {
                    self.iter.next();
                }
                if !self.peek().1.is_ascii_digit() {
                    return Err(self.source.error(self.line, col, "invalid exponent"));
                }
                self.read_digits();
            }
        }

        let mut end = self.peek().0;
        if kind == TokenKind::Int && matches!(self.peek().1, 'u' | 'U') {
            kind = TokenKind::Uint;
            self.iter.next();
        }
        let token_end = self.peek().0;
        self.col += (token_end - start) as u32;

        let ch = self.peek().1;
        if ch == '_' || ch.is_ascii_alphanumeric() {
            return Err(self.source.error(self.line, self.col, "invalid number"));
        }

        if kind == TokenKind::Double {
            end = token_end;
        }

        Ok(Token(kind, self.span(self.line, col, start, end)))
    }

    /// Reads a quoted string starting at the current position.
    ///
    /// `prefix` is the number of prefix characters (`r`, `b`) already consumed.
    fn read_string(&mut self, raw: bool, bytes: bool, prefix: u32) -> Result<Token> {
        let (line, col) = (self.line, self.col - prefix);
        let (_, quote) = self.peek();
        let triple = self.peekahead(1).1 == quote && self.peekahead(2).1 == quote;
        let delim_len = if triple { 3 } else { 1 };
        for _ in 0..delim_len {
            self.iter.next();
            self.col += 1;
        }

        let (start, _) = self.peek();
        let end;
        loop {
            let (offset, ch) = self.peek();
            match ch {
                '\x00' if offset >= self.source.contents().len() => {
                    return Err(self.source.error(line, col, "unterminated string literal"));
                }
                c if c == quote
                    && (!triple
                        || (self.peekahead(1).1 == quote && self.peekahead(2).1 == quote)) =>
                {
                    end = offset;
                    for _ in 0..delim_len {
                        self.iter.next();
                        self.col += 1;
                    }
                    break;
                }
                '\n' if !triple => {
                    return Err(self.source.error(line, col, "newline in string literal"));
                }
                '\n' => {
                    self.iter.next();
                    self.line += 1;
                    self.col = 1;
                }
                '\\' if !raw => {
                    self.iter.next();
                    self.iter.next();
                    self.col += 2;
                }
                _ => {
                    self.iter.next();
                    self.col += 1;
                }
            }
        }

        Ok(Token(
            TokenKind::String { raw, bytes },
            self.span(line, col, start, end),
        ))
    }

    fn skip_ws(&mut self) -> Result<()> {
        'outer: loop {
            match self.peek().1 {
                ' ' | '\r' | '\x0c' => self.col += 1,
                '\t' => self.col += 4,
                '\n' => {
                    self.col = 1;
                    self.line += 1;
                }
                '/' if self.peekahead(1).1 == '/' => {
                    self.iter.next();
                    loop {
                        match self.peek() {
                            (_, '\n') => continue 'outer,
                            (offset, '\x00') if offset >= self.source.contents().len() => {
                                continue 'outer
                            }
                            _ => self.iter.next(),
                        };
                    }
                }
                _ => break,
            }
            self.iter.next();
        }
        Ok(())
    }

    fn symbol(&mut self, start: usize, len: usize) -> Result<Token> {
        let col = self.col;
        for _ in 0..len {
            self.iter.next();
        }
        self.col += len as u32;
        Ok(Token(
            TokenKind::Symbol,
            self.span(self.line, col, start, start + len),
        ))
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_ws()?;

        let (start, chr) = self.peek();
        let col = self.col;

        match chr {
            '\x00' if start >= self.source.contents().len() => Ok(Token(
                TokenKind::Eof,
                self.span(self.line, col, start, start),
            )),
            '{' | '}' | '[' | ']' | '(' | ')' | '+' | '-' | '*' | '/' | '%' | ',' | ':' | '?' => {
                self.symbol(start, 1)
            }
            '.' if self.peekahead(1).1.is_ascii_digit() => self.read_number(),
            '.' => self.symbol(start, 1),
            '<' | '>' | '!' => {
                let len = if self.peekahead(1).1 == '=' { 2 } else { 1 };
                self.symbol(start, len)
            }
            '=' if self.peekahead(1).1 == '=' => self.symbol(start, 2),
            '&' if self.peekahead(1).1 == '&' => self.symbol(start, 2),
            '|' if self.peekahead(1).1 == '|' => self.symbol(start, 2),
            '"' | '\'' => self.read_string(false, false, 0),
            _ if chr.is_ascii_digit() => self.read_number(),
            _ if chr.is_ascii_alphabetic() || chr == '_' => {
                // String prefixes: r, R, b, B and their combinations.
                let mut raw = false;
                let mut bytes = false;
                let mut n = 0;
                loop {
                    match self.peekahead(n).1 {
                        'r' | 'R' if !raw => raw = true,
                        'b' | 'B' if !bytes => bytes = true,
                        '"' | '\'' if n > 0 => {
                            for _ in 0..n {
                                self.iter.next();
                            }
                            self.col += n as u32;
                            return self.read_string(raw, bytes, n as u32);
                        }
                        _ => break,
                    }
                    n += 1;
                }
                self.read_ident()
            }
            _ => Err(self.source.error(self.line, self.col, "invalid character")),
        }
    }
}

/// Decodes the escape sequences of a string literal body.
pub fn unescape(span: &Span, raw: bool) -> Result<Vec<u8>> {
    let text = span.text();
    if raw {
        return Ok(text.as_bytes().to_vec());
    }
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut buf = [0u8; 4];
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let Some(esc) = chars.next() else {
            bail!(span.error("incomplete escape sequence"));
        };
        match esc {
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'v' => out.push(0x0b),
            '\\' | '\'' | '"' | '`' | '?' => out.push(esc as u8),
            'x' | 'X' | 'u' | 'U' => {
                let digits = match esc {
                    'x' | 'X' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut code = 0u32;
                for _ in 0..digits {
                    let Some(d) = chars.next().and_then(|c| c.to_digit(16)) else {
                        bail!(span.error("invalid hex escape sequence"));
                    };
                    code = code * 16 + d;
                }
                if digits == 2 {
                    out.push(code as u8);
                } else {
                    let Some(c) = char::from_u32(code) else {
                        bail!(span.error("invalid unicode code point"));
                    };
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
            '0'..='3' => {
                let mut code = esc.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    let Some(d) = chars.next().and_then(|c| c.to_digit(8)) else {
                        bail!(span.error("invalid octal escape sequence"));
                    };
                    code = code * 8 + d;
                }
                out.push(code as u8);
            }
            _ => bail!(span.error("invalid escape sequence")),
        }
    }
    Ok(out)
}
