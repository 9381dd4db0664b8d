// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::bigint::BigInt;
use crate::error::ParseError;
use alloy_primitives::U256;

pub(crate) const SYMBOL_CHARS: &str = "+-*/\\^<>=~:.?@#&$";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Name(String),
    QuotedName(String),
    Var(String),
    Int(i128),
    BigInt(BigInt),
    Float(f64),
    Str(String),
    Punct(char),
    End,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    /// Whitespace or a comment preceded this token.
    pub layout_before: bool,
}

pub(crate) struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub(crate) fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn skip_layout(&mut self) -> Result<bool, ParseError> {
        let mut skipped = false;
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                    skipped = true;
                }
                Some('%') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                    skipped = true;
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error("unterminated block comment")),
                        }
                    }
                    skipped = true;
                }
                _ => return Ok(skipped),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        let layout_before = self.skip_layout()?;
        let (line, column) = (self.line, self.column);
        let kind = match self.peek() {
            None => TokenKind::Eof,
            Some(c) => self.read_kind(c)?,
        };
        Ok(Token {
            kind,
            line,
            column,
            layout_before,
        })
    }

    fn read_kind(&mut self, c: char) -> Result<TokenKind, ParseError> {
        if c.is_ascii_digit() {
            return self.read_number();
        }
        if c == '_' || c.is_uppercase() {
            return Ok(TokenKind::Var(self.read_word()));
        }
        if c.is_alphabetic() {
            return Ok(TokenKind::Name(self.read_word()));
        }
        match c {
            '\'' => {
                self.bump();
                Ok(TokenKind::QuotedName(self.read_quoted('\'')?))
            }
            '"' | '`' => {
                self.bump();
                Ok(TokenKind::Str(self.read_quoted(c)?))
            }
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | '|' => {
                self.bump();
                Ok(TokenKind::Punct(c))
            }
            '!' | ';' => {
                self.bump();
                Ok(TokenKind::Name(c.to_string()))
            }
            '.' if self.is_end_marker() => {
                self.bump();
                Ok(TokenKind::End)
            }
            c if SYMBOL_CHARS.contains(c) => {
                let mut name = String::new();
                while let Some(next) = self.peek() {
                    if !SYMBOL_CHARS.contains(next) {
                        break;
                    }
                    name.push(next);
                    self.bump();
                }
                Ok(TokenKind::Name(name))
            }
            other => Err(self.error(format!("unexpected character '{other}'"))),
        }
    }

    fn is_end_marker(&self) -> bool {
        match self.peek_at(1) {
            None => true,
            Some(next) => next.is_whitespace() || next == '%',
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }
            word.push(c);
            self.bump();
        }
        word
    }

    fn read_digits(&mut self, radix: u32) -> String {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c == '_' && self.peek_at(1).is_some_and(|d| d.is_digit(radix)) {
                self.bump();
                continue;
            }
            if !c.is_digit(radix) {
                break;
            }
            digits.push(c);
            self.bump();
        }
        digits
    }

    fn read_number(&mut self) -> Result<TokenKind, ParseError> {
        if self.peek() == Some('0') {
            match self.peek_at(1) {
                Some('\'') => {
                    self.bump();
                    self.bump();
                    let c = match self.bump() {
                        Some('\\') => self.read_escape()?,
                        Some('\'') if self.peek() == Some('\'') => {
                            self.bump();
                            '\''
                        }
                        Some(c) => c,
                        None => return Err(self.error("unterminated character code")),
                    };
                    return Ok(TokenKind::Int(i128::from(u32::from(c))));
                }
                Some(prefix @ ('x' | 'o' | 'b')) => {
                    let radix = match prefix {
                        'x' => 16,
                        'o' => 8,
                        _ => 2,
                    };
                    if self.peek_at(2).is_some_and(|d| d.is_digit(radix)) {
                        self.bump();
                        self.bump();
                        let digits = self.read_digits(radix);
                        if let Ok(value) = i128::from_str_radix(&digits, radix) {
                            return Ok(TokenKind::Int(value));
                        }
                        return U256::from_str_radix(&digits, u64::from(radix))
                            .map(|magnitude| TokenKind::BigInt(BigInt::new(false, magnitude)))
                            .map_err(|_| self.error("integer literal out of range"));
                    }
                }
                _ => {}
            }
        }

        let mut text = self.read_digits(10);
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
            self.bump();
            text.push('.');
            text.push_str(&self.read_digits(10));
            is_float = true;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|d| d.is_ascii_digit()) {
                text.push('e');
                self.bump();
                if signed {
                    if let Some(sign) = self.bump() {
                        text.push(sign);
                    }
                }
                text.push_str(&self.read_digits(10));
                is_float = true;
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error(format!("invalid float literal '{text}'")))
        } else {
            if let Ok(value) = text.parse::<i128>() {
                return Ok(TokenKind::Int(value));
            }
            BigInt::parse(&text)
                .map(TokenKind::BigInt)
                .ok_or_else(|| self.error(format!("integer literal out of range '{text}'")))
        }
    }

    fn read_escape(&mut self) -> Result<char, ParseError> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('a') => Ok('\u{7}'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('v') => Ok('\u{b}'),
            Some('e') => Ok('\u{1b}'),
            Some('s') => Ok(' '),
            Some('x') => {
                let mut hex = String::new();
                while let Some(c) = self.peek() {
                    if !c.is_ascii_hexdigit() {
                        break;
                    }
                    hex.push(c);
                    self.bump();
                }
                if self.peek() == Some('\\') {
                    self.bump();
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error("invalid hex escape"))
            }
            Some(c @ ('\\' | '\'' | '"' | '`')) => Ok(c),
            Some(other) => Err(self.error(format!("unknown escape sequence '\\{other}'"))),
            None => Err(self.error("unterminated escape sequence")),
        }
    }

    fn read_quoted(&mut self, quote: char) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        self.bump();
                        text.push(quote);
                    } else {
                        return Ok(text);
                    }
                }
                Some('\\') => {
                    if self.peek() == Some('\n') {
                        self.bump();
                        continue;
                    }
                    text.push(self.read_escape()?);
                }
                Some(c) => text.push(c),
                None => return Err(self.error("unterminated quoted text")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_clause_end_and_operators() {
        assert_eq!(
            kinds("a :- X =.. [b].\n"),
            vec![
                TokenKind::Name("a".into()),
                TokenKind::Name(":-".into()),
                TokenKind::Var("X".into()),
                TokenKind::Name("=..".into()),
                TokenKind::Punct('['),
                TokenKind::Name("b".into()),
                TokenKind::Punct(']'),
                TokenKind::End,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("12 1.5 0x1f 0'a 2e3 1_000"),
            vec![
                TokenKind::Int(12),
                TokenKind::Float(1.5),
                TokenKind::Int(31),
                TokenKind::Int(97),
                TokenKind::Float(2000.0),
                TokenKind::Int(1000),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_wide_integer_literals() {
        let tokens = kinds("340282366920938463463374607431768211456 0xffffffffffffffffffffffffffffffffff");
        match (&tokens[0], &tokens[1]) {
            (TokenKind::BigInt(decimal), TokenKind::BigInt(hex)) => {
                assert_eq!(decimal.to_string(), "340282366920938463463374607431768211456");
                assert_eq!(hex.magnitude().bit_len(), 136);
            }
            other => panic!("unexpected tokens {other:?}"),
        }
        assert!(Lexer::new(&format!("1{}", "0".repeat(80))).tokenize().is_err());
    }

    #[test]
    fn test_integer_followed_by_end() {
        assert_eq!(
            kinds("X is 1."),
            vec![
                TokenKind::Var("X".into()),
                TokenKind::Name("is".into()),
                TokenKind::Int(1),
                TokenKind::End,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_and_comments() {
        assert_eq!(
            kinds("% line\n'it''s' /* block */ \"str\\n\""),
            vec![
                TokenKind::QuotedName("it's".into()),
                TokenKind::Str("str\n".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_layout_tracking() {
        let tokens = Lexer::new("f(a) g (b)").tokenize().unwrap();
        assert!(!tokens[1].layout_before);
        assert!(tokens[5].layout_before);
    }

    #[test]
    fn test_unterminated_quote_reports_position() {
        let err = Lexer::new("a.\n'oops").tokenize().unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));
    }
}
