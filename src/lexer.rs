//! Tokenizer for the nyan language.
//!
//! nyan uses significant indentation: four spaces per level, tracked with
//! `Indent`/`Dedent` tokens exactly like the block structure they encode.
//! Inside any bracket pair (`()`, `[]`, `{}`, `<>`) newlines and
//! indentation carry no meaning and are swallowed, so container literals
//! and parent lists can wrap freely.

use std::sync::Arc;

use crate::error::{LangError, Location, NyanError, Result};
use crate::file::SourceFile;
use crate::token::{Token, TokenKind};

/// Number of spaces per indentation level.
pub const SPACES_PER_INDENT: usize = 4;

/// Tokenize a whole source file.
pub fn tokenize(file: &Arc<SourceFile>) -> Result<Vec<Token>> {
    Lexer::new(file).run()
}

struct Lexer {
    file: Arc<SourceFile>,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    line_start: usize,
    previous_indent: usize,
    brackets: Vec<TokenKind>,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(file: &Arc<SourceFile>) -> Lexer {
        Lexer {
            file: Arc::clone(file),
            chars: file.content().chars().collect(),
            pos: 0,
            line: 1,
            line_start: 0,
            previous_indent: 0,
            brackets: Vec::new(),
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn column(&self) -> u32 {
        (self.pos - self.line_start) as u32
    }

    fn location_here(&self, length: usize) -> Location {
        Location::file(&self.file, self.line, self.column(), length as u32)
    }

    fn location_from(&self, start_column: u32, length: usize) -> Location {
        Location::file(&self.file, self.line, start_column, length as u32)
    }

    fn error(&self, msg: impl Into<String>, length: usize) -> NyanError {
        NyanError::Tokenize(LangError::new(self.location_here(length), msg))
    }

    fn push(&mut self, kind: TokenKind, value: impl Into<String>, location: Location) {
        self.tokens.push(Token {
            kind,
            value: value.into(),
            location,
        });
    }

    /// End the logical line; consecutive endlines collapse into one and a
    /// file never starts with one.
    fn push_endline(&mut self) {
        match self.tokens.last() {
            None => {}
            Some(last) if last.kind == TokenKind::EndLine => {}
            Some(_) => {
                let loc = self.location_here(0);
                self.push(TokenKind::EndLine, "", loc);
            }
        }
    }

    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.pos;
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut at_line_start = true;

        loop {
            if at_line_start && self.brackets.is_empty() {
                if self.handle_line_start()? {
                    continue;
                }
                at_line_start = false;
            }

            let Some(c) = self.peek() else {
                break;
            };

            match c {
                '\n' => {
                    self.bump();
                    if self.brackets.is_empty() {
                        self.push_endline();
                        at_line_start = true;
                    }
                    self.newline();
                }
                '\r' | ' ' | '\t' => {
                    self.bump();
                }
                '#' => self.skip_comment(),
                '"' | '\'' => self.scan_string(c)?,
                c if c.is_ascii_alphabetic() || c == '_' => self.scan_word(),
                c if c.is_ascii_digit() => self.scan_number(false)?,
                '-' | '+' => self.scan_sign(c)?,
                '*' | '/' | '|' | '&' | '=' => self.scan_operator(c)?,
                '.' => self.scan_dots(),
                '@' => self.simple(TokenKind::At),
                '!' => self.simple(TokenKind::Bang),
                ':' => self.simple(TokenKind::Colon),
                ',' => self.simple(TokenKind::Comma),
                '(' | '[' | '{' | '<' => self.open_bracket(c),
                ')' | ']' | '}' | '>' => self.close_bracket(c)?,
                other => {
                    return Err(self.error(format!("unexpected character '{}'", other), 1));
                }
            }
        }

        if let Some(open) = self.brackets.last() {
            return Err(self.error(format!("unclosed bracket: {}", open.name()), 1));
        }

        // close the last line and unwind the indentation
        self.push_endline();
        for _ in 0..(self.previous_indent / SPACES_PER_INDENT) {
            let loc = self.location_here(0);
            self.push(TokenKind::Dedent, "", loc);
        }
        let loc = self.location_here(0);
        self.push(TokenKind::EndFile, "", loc);

        Ok(self.tokens)
    }

    /// Measure the indentation of a fresh line and emit `Indent`/`Dedent`
    /// tokens for the level change.  Returns true if the line was blank
    /// or comment-only and has been skipped entirely.
    fn handle_line_start(&mut self) -> Result<bool> {
        let mut depth = 0;
        while self.peek() == Some(' ') {
            self.bump();
            depth += 1;
        }

        match self.peek() {
            None => return Ok(false),
            Some('\t') => {
                return Err(self.error("tabs are not allowed in indentation", 1));
            }
            Some('\n') => {
                self.bump();
                self.newline();
                return Ok(true);
            }
            Some('\r') => {
                self.bump();
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                return Ok(true);
            }
            Some(_) => {}
        }

        if depth % SPACES_PER_INDENT != 0 {
            return Err(self.error(
                format!(
                    "indentation requires exactly {} spaces per level",
                    SPACES_PER_INDENT
                ),
                depth,
            ));
        }

        let kind = if depth > self.previous_indent {
            TokenKind::Indent
        } else {
            TokenKind::Dedent
        };
        let mut delta = depth.abs_diff(self.previous_indent);
        while delta > 0 {
            delta -= SPACES_PER_INDENT;
            let loc = self.location_from(0, depth);
            self.push(kind, "", loc);
        }
        self.previous_indent = depth;

        Ok(false)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn simple(&mut self, kind: TokenKind) {
        let loc = self.location_here(1);
        self.bump();
        self.push(kind, "", loc);
    }

    fn scan_dots(&mut self) {
        if self.peek_at(1) == Some('.') && self.peek_at(2) == Some('.') {
            let loc = self.location_here(3);
            self.pos += 3;
            self.push(TokenKind::Ellipsis, "", loc);
        } else {
            self.simple(TokenKind::Dot);
        }
    }

    fn scan_word(&mut self) {
        let start_col = self.column();
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }

        let loc = self.location_from(start_col, word.len());
        match word.as_str() {
            "import" => self.push(TokenKind::Import, "", loc),
            "as" => self.push(TokenKind::As, "", loc),
            "pass" => self.push(TokenKind::Pass, "", loc),
            "inf" => self.push(TokenKind::Inf, word, loc),
            _ => self.push(TokenKind::Id, word, loc),
        }
    }

    fn scan_sign(&mut self, sign: char) -> Result<()> {
        match self.peek_at(1) {
            Some('=') => {
                let loc = self.location_here(2);
                self.pos += 2;
                self.push(TokenKind::Operator, format!("{}=", sign), loc);
                Ok(())
            }
            Some(c) if c.is_ascii_digit() => self.scan_number(true),
            Some('i')
                if self.peek_at(2) == Some('n')
                    && self.peek_at(3) == Some('f')
                    && !matches!(self.peek_at(4), Some(c) if c.is_ascii_alphanumeric() || c == '_') =>
            {
                let loc = self.location_here(4);
                self.pos += 4;
                self.push(TokenKind::Inf, format!("{}inf", sign), loc);
                Ok(())
            }
            _ if sign == '+' => {
                let loc = self.location_here(1);
                self.bump();
                self.push(TokenKind::Operator, "+", loc);
                Ok(())
            }
            _ => Err(self.error("expected a number after '-'", 1)),
        }
    }

    fn scan_operator(&mut self, first: char) -> Result<()> {
        if first == '=' {
            let loc = self.location_here(1);
            self.bump();
            self.push(TokenKind::Operator, "=", loc);
            return Ok(());
        }
        if self.peek_at(1) == Some('=') {
            let loc = self.location_here(2);
            self.pos += 2;
            self.push(TokenKind::Operator, format!("{}=", first), loc);
            return Ok(());
        }
        Err(self.error(format!("incomplete operator '{}'", first), 1))
    }

    fn scan_number(&mut self, signed: bool) -> Result<()> {
        let start_col = self.column();
        let mut text = String::new();
        if signed {
            text.push(self.bump().unwrap_or('-'));
        }

        let mut is_float = false;

        // hex literal
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            text.push(self.bump().unwrap_or('0'));
            text.push(self.bump().unwrap_or('x'));
            let mut digits = 0;
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    text.push(c);
                    self.bump();
                    digits += 1;
                } else {
                    break;
                }
            }
            if digits == 0 {
                return Err(self.error("hexadecimal literal without digits", text.len()));
            }
        } else {
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit())
            {
                is_float = true;
                text.push(self.bump().unwrap_or('.'));
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
            if matches!(self.peek(), Some('e') | Some('E')) {
                is_float = true;
                text.push(self.bump().unwrap_or('e'));
                if matches!(self.peek(), Some('-') | Some('+')) {
                    text.push(self.bump().unwrap_or('-'));
                }
                let mut digits = 0;
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                        digits += 1;
                    } else {
                        break;
                    }
                }
                if digits == 0 {
                    return Err(self.error("exponent without digits", text.len()));
                }
            }
        }

        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Int
        };
        let loc = self.location_from(start_col, text.len());
        self.push(kind, text, loc);
        Ok(())
    }

    fn scan_string(&mut self, quote: char) -> Result<()> {
        let start_col = self.column();
        self.bump();
        let mut text = String::new();

        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(self.error("unterminated string literal", 1));
                }
                Some(c) if c == quote => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('\\') => text.push('\\'),
                        Some('"') => text.push('"'),
                        Some('\'') => text.push('\''),
                        other => {
                            return Err(self.error(
                                format!(
                                    "unsupported escape sequence '\\{}'",
                                    other.unwrap_or(' ')
                                ),
                                2,
                            ));
                        }
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }

        let loc = self.location_from(start_col, text.len() + 2);
        self.push(TokenKind::Str, text, loc);
        Ok(())
    }

    fn open_bracket(&mut self, c: char) {
        let kind = match c {
            '(' => TokenKind::LParen,
            '[' => TokenKind::LBracket,
            '{' => TokenKind::LBrace,
            _ => TokenKind::LAngle,
        };
        self.brackets.push(kind);
        self.simple(kind);
    }

    fn close_bracket(&mut self, c: char) -> Result<()> {
        let (kind, expected_open) = match c {
            ')' => (TokenKind::RParen, TokenKind::LParen),
            ']' => (TokenKind::RBracket, TokenKind::LBracket),
            '}' => (TokenKind::RBrace, TokenKind::LBrace),
            _ => (TokenKind::RAngle, TokenKind::LAngle),
        };
        match self.brackets.pop() {
            None => Err(self.error(
                "unexpected closing bracket, as no opening one is known",
                1,
            )),
            Some(open) if open != expected_open => Err(self.error(
                format!(
                    "non-matching bracket: expected closing for {}",
                    open.name()
                ),
                1,
            )),
            Some(_) => {
                self.simple(kind);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn lex(src: &str) -> Vec<Token> {
        let file = Arc::new(SourceFile::new("test.nyan", src));
        tokenize(&file).expect("tokenize failed")
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_object() {
        assert_eq!(
            kinds("A():\n    x : int = 3\n"),
            vec![
                TokenKind::Id,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Colon,
                TokenKind::EndLine,
                TokenKind::Indent,
                TokenKind::Id,
                TokenKind::Colon,
                TokenKind::Id,
                TokenKind::Operator,
                TokenKind::Int,
                TokenKind::EndLine,
                TokenKind::Dedent,
                TokenKind::EndFile,
            ]
        );
    }

    #[test]
    fn operators_and_literals() {
        let tokens = lex("x += -5\ny *= 2.5\nz = \"hi\\n\"\nw = -inf\n");
        let ops: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Operator)
            .map(|t| t.get())
            .collect();
        assert_eq!(ops, vec!["+=", "*=", "=", "="]);
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::Int && t.get() == "-5"));
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::Float && t.get() == "2.5"));
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::Str && t.get() == "hi\n"));
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::Inf && t.get() == "-inf"));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let tokens = kinds("A(B,\n  C):\n    pass\n");
        // no EndLine between B and C despite the newline
        assert_eq!(
            tokens,
            vec![
                TokenKind::Id,
                TokenKind::LParen,
                TokenKind::Id,
                TokenKind::Comma,
                TokenKind::Id,
                TokenKind::RParen,
                TokenKind::Colon,
                TokenKind::EndLine,
                TokenKind::Indent,
                TokenKind::Pass,
                TokenKind::EndLine,
                TokenKind::Dedent,
                TokenKind::EndFile,
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let tokens = kinds("# header\n\nA():\n    # nothing\n    pass\n");
        assert_eq!(tokens.first(), Some(&TokenKind::Id));
        assert_eq!(
            tokens.iter().filter(|k| **k == TokenKind::Indent).count(),
            1
        );
    }

    #[test]
    fn bad_indentation_is_rejected() {
        let file = Arc::new(SourceFile::new("test.nyan", "A():\n   x = 3\n"));
        assert_matches!(tokenize(&file), Err(NyanError::Tokenize(_)));
    }

    #[test]
    fn mismatched_brackets_are_rejected() {
        let file = Arc::new(SourceFile::new("test.nyan", "A(:\n    pass\n"));
        // the ':' inside the parenthesis never closes it
        assert_matches!(tokenize(&file), Err(NyanError::Tokenize(_)));
    }

    #[test]
    fn dedent_levels_unwind_at_eof() {
        let tokens = kinds("A():\n    B():\n        pass\n");
        assert_eq!(
            tokens.iter().filter(|k| **k == TokenKind::Dedent).count(),
            2
        );
        assert_eq!(tokens.last(), Some(&TokenKind::EndFile));
    }
}
