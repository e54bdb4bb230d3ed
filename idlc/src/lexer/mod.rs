//! Hand-written lexer for the native dialect (spec.md §4.1).
//!
//! Single-source, cooperative, not shared across threads: the iterator
//! borrows the source text for its whole lifetime and is restartable by
//! cloning the cursor state.

use crate::span::{Position, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Syntax,
    Module,
    Import,
    As,
    Const,
    Enum,
    Struct,
    Union,
    Api,
    Sdk,
    Annotation,
    Impl,
    Returns,
    Nothrows,
    Var,
    Set,
    If,
    Else,
    Switch,
    Case,
    Default,
    While,
    For,
    Return,
    Throw,
    Exec,
    Catch,
    Async,
    Await,
    True,
    False,
}

impl Keyword {
    fn lookup(ident: &str) -> Option<Keyword> {
        Some(match ident {
            "syntax" => Keyword::Syntax,
            "module" => Keyword::Module,
            "import" => Keyword::Import,
            "as" => Keyword::As,
            "const" => Keyword::Const,
            "enum" => Keyword::Enum,
            "struct" => Keyword::Struct,
            "union" => Keyword::Union,
            "api" => Keyword::Api,
            "sdk" => Keyword::Sdk,
            "annotation" => Keyword::Annotation,
            "impl" => Keyword::Impl,
            "returns" => Keyword::Returns,
            "nothrows" => Keyword::Nothrows,
            "var" => Keyword::Var,
            "set" => Keyword::Set,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "switch" => Keyword::Switch,
            "case" => Keyword::Case,
            "default" => Keyword::Default,
            "while" => Keyword::While,
            "for" => Keyword::For,
            "return" => Keyword::Return,
            "throw" => Keyword::Throw,
            "exec" => Keyword::Exec,
            "catch" => Keyword::Catch,
            "async" => Keyword::Async,
            "await" => Keyword::Await,
            "true" => Keyword::True,
            "false" => Keyword::False,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Dot,
    At,
    Dollar,
    Semicolon,
    Eq,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    PlusEq,
    Minus,
    MinusEq,
    Star,
    StarEq,
    Slash,
    SlashEq,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    Amp,
    Pipe,
    Caret,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Keyword(Keyword),
    Int(i128),
    Float(f64),
    Text(String),
    Data(Vec<u8>),
    Prose(String),
    LineComment(String),
    BlockComment(String),
    Punct(Punct),
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum LexError {
    UnrecognizedChar { ch: char, pos: Position },
}

pub struct Lexer<'src> {
    input: &'src str,
    bytes: &'src [u8],
    offset: usize,
    line: u32,
    column: u32,
    done: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(input: &'src str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            offset: 0,
            line: 1,
            column: 1,
            done: false,
        }
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.column, self.offset as u32)
    }

    fn at_end(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.offset..].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut chars = self.input[self.offset..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn slice_from(&self, start: usize) -> &'src str {
        &self.input[start..self.offset]
    }

    /// Produce the next token, or `None` once EOF has already been
    /// returned once (EOF is a single sentinel, not an infinite stream).
    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        if self.done {
            return Ok(None);
        }
        self.skip_spaces_and_tabs();

        let start = self.pos();
        let Some(ch) = self.peek() else {
            self.done = true;
            return Ok(Some(Token {
                kind: TokenKind::Eof,
                span: Span::point(start),
            }));
        };

        if ch == '\r' || ch == '\n' {
            self.consume_newline();
            return Ok(Some(Token {
                kind: TokenKind::Newline,
                span: Span::new(start, self.pos()),
            }));
        }

        if ch == '/' && self.peek2() == Some('/') {
            return Ok(Some(self.lex_line_comment(start)));
        }
        if ch == '/' && self.peek2() == Some('*') {
            return Ok(Some(self.lex_block_comment(start)));
        }

        if ch == '"' {
            return Ok(Some(self.lex_text(start)));
        }
        if ch == '`' {
            return Ok(Some(self.lex_prose(start)));
        }
        if ch == '0' && matches!(self.peek2(), Some('x') | Some('X')) {
            return self.lex_hex_prefixed(start).map(Some);
        }

        if ch.is_ascii_digit() {
            return Ok(Some(self.lex_number(start)));
        }

        if ch == '_' || ch.is_alphabetic() {
            return Ok(Some(self.lex_ident_or_keyword(start)));
        }

        if let Some(tok) = self.lex_punct(start) {
            return Ok(Some(tok));
        }

        self.advance();
        Err(LexError::UnrecognizedChar { ch, pos: start })
    }

    fn skip_spaces_and_tabs(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.advance();
        }
    }

    fn consume_newline(&mut self) {
        if self.peek() == Some('\r') {
            self.advance();
            if self.peek() == Some('\n') {
                self.advance();
            }
        } else if self.peek() == Some('\n') {
            self.advance();
        }
    }

    fn lex_line_comment(&mut self, start: Position) -> Token {
        let text_start = self.offset;
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' {
                break;
            }
            self.advance();
        }
        let text = self.slice_from(text_start).to_string();
        Token {
            kind: TokenKind::LineComment(text),
            span: Span::new(start, self.pos()),
        }
    }

    fn lex_block_comment(&mut self, start: Position) -> Token {
        self.advance(); // '/'
        self.advance(); // '*'
        let text_start = self.offset;
        let mut end_offset = self.offset;
        loop {
            match self.peek() {
                None => break,
                Some('*') if self.peek2() == Some('/') => {
                    end_offset = self.offset;
                    self.advance();
                    self.advance();
                    break;
                }
                Some(_) => {
                    self.advance();
                    end_offset = self.offset;
                }
            }
        }
        let text = self.input[text_start..end_offset].to_string();
        Token {
            kind: TokenKind::BlockComment(text),
            span: Span::new(start, self.pos()),
        }
    }

    /// Text literals preserve embedded newlines and backslash escapes
    /// verbatim (spec.md §4.1): no escape processing happens here.
    fn lex_text(&mut self, start: Position) -> Token {
        self.advance(); // opening quote
        let text_start = self.offset;
        let mut end_offset = self.offset;
        while let Some(c) = self.peek() {
            if c == '"' {
                end_offset = self.offset;
                self.advance();
                break;
            }
            if c == '\\' {
                self.advance();
                if self.peek().is_some() {
                    self.advance();
                }
                end_offset = self.offset;
                continue;
            }
            self.advance();
            end_offset = self.offset;
        }
        let text = self.input[text_start..end_offset].to_string();
        Token {
            kind: TokenKind::Text(text),
            span: Span::new(start, self.pos()),
        }
    }

    fn lex_prose(&mut self, start: Position) -> Token {
        self.advance(); // opening backtick
        let text_start = self.offset;
        let mut end_offset = self.offset;
        while let Some(c) = self.peek() {
            if c == '`' {
                end_offset = self.offset;
                self.advance();
                break;
            }
            self.advance();
            end_offset = self.offset;
        }
        let text = self.input[text_start..end_offset].to_string();
        Token {
            kind: TokenKind::Prose(text),
            span: Span::new(start, self.pos()),
        }
    }

    /// `0x"..."` data literals, hex integers, and hex floats
    /// (`0x...p±N`, spec.md §4.1) all start with `0x`/`0X`; disambiguate
    /// by the character after it.
    fn lex_hex_prefixed(&mut self, start: Position) -> Result<Token, LexError> {
        self.advance(); // '0'
        self.advance(); // 'x'/'X'
        if self.peek() == Some('"') {
            return Ok(self.lex_data(start));
        }

        let int_start = self.offset;
        while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit() || c == '_') {
            self.advance();
        }
        let int_part = self.slice_from(int_start).replace('_', "");

        let mut frac_part = String::new();
        if self.peek() == Some('.') && matches!(self.peek2(), Some(c) if c.is_ascii_hexdigit()) {
            self.advance();
            let frac_start = self.offset;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit() || c == '_') {
                self.advance();
            }
            frac_part = self.slice_from(frac_start).replace('_', "");
        }

        let has_exponent = matches!(self.peek(), Some('p') | Some('P'));
        if !frac_part.is_empty() || has_exponent {
            let mut exponent = 0i32;
            if has_exponent {
                self.advance();
                let mut sign = 1i32;
                if matches!(self.peek(), Some('+') | Some('-')) {
                    if self.peek() == Some('-') {
                        sign = -1;
                    }
                    self.advance();
                }
                let exp_start = self.offset;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
                exponent = sign * self.slice_from(exp_start).parse::<i32>().unwrap_or(0);
            }
            return Ok(Token {
                kind: TokenKind::Float(parse_hex_float(&int_part, &frac_part, exponent)),
                span: Span::new(start, self.pos()),
            });
        }

        let value = i128::from_str_radix(&int_part, 16).unwrap_or(0);
        Ok(Token {
            kind: TokenKind::Int(value),
            span: Span::new(start, self.pos()),
        })
    }

    fn lex_data(&mut self, start: Position) -> Token {
        self.advance(); // opening quote
        let text_start = self.offset;
        let mut end_offset = self.offset;
        while let Some(c) = self.peek() {
            if c == '"' {
                end_offset = self.offset;
                self.advance();
                break;
            }
            self.advance();
            end_offset = self.offset;
        }
        let hex = self.input[text_start..end_offset].replace(['_', '\n', '\r'], "");
        let bytes = decode_hex_bytes(&hex);
        Token {
            kind: TokenKind::Data(bytes),
            span: Span::new(start, self.pos()),
        }
    }

    fn lex_radix_number(&mut self, start: Position, radix: u32) -> Result<Token, LexError> {
        let digit_start = self.offset;
        while let Some(c) = self.peek() {
            if c.is_digit(radix) || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let raw = self.slice_from(digit_start).replace('_', "");
        let value = i128::from_str_radix(&raw, radix).unwrap_or(0);
        Ok(Token {
            kind: TokenKind::Int(value),
            span: Span::new(start, self.pos()),
        })
    }

    fn lex_number(&mut self, start: Position) -> Token {
        let digit_start = self.offset;

        if self.peek() == Some('0') {
            match self.peek2() {
                Some('b') | Some('B') => {
                    self.advance();
                    self.advance();
                    return self.lex_radix_number(start, 2).unwrap();
                }
                Some('o') | Some('O') => {
                    self.advance();
                    self.advance();
                    return self.lex_radix_number(start, 8).unwrap();
                }
                Some(c) if c.is_digit(8) => {
                    self.advance();
                    return self.lex_radix_number(start, 8).unwrap();
                }
                _ => {}
            }
        }

        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek2(), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }

        let raw = self.slice_from(digit_start).replace('_', "");
        let kind = if is_float {
            TokenKind::Float(raw.parse().unwrap_or(0.0))
        } else {
            TokenKind::Int(raw.parse().unwrap_or(0))
        };
        Token {
            kind,
            span: Span::new(start, self.pos()),
        }
    }

    fn lex_ident_or_keyword(&mut self, start: Position) -> Token {
        let ident_start = self.offset;
        while matches!(self.peek(), Some(c) if c == '_' || c.is_alphanumeric()) {
            self.advance();
        }
        let text = self.slice_from(ident_start);
        let kind = match Keyword::lookup(text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(text.to_string()),
        };
        Token {
            kind,
            span: Span::new(start, self.pos()),
        }
    }

    fn lex_punct(&mut self, start: Position) -> Option<Token> {
        let two = |a: char, b: Option<char>| b == Some(a);
        let c0 = self.peek()?;
        let c1 = self.peek2();
        let (len, punct) = match (c0, c1) {
            ('=', c) if two('=', c) => (2, Punct::EqEq),
            ('!', c) if two('=', c) => (2, Punct::NotEq),
            ('<', c) if two('=', c) => (2, Punct::Le),
            ('>', c) if two('=', c) => (2, Punct::Ge),
            ('+', c) if two('=', c) => (2, Punct::PlusEq),
            ('-', c) if two('=', c) => (2, Punct::MinusEq),
            ('*', c) if two('=', c) => (2, Punct::StarEq),
            ('/', c) if two('=', c) => (2, Punct::SlashEq),
            ('&', c) if two('&', c) => (2, Punct::AndAnd),
            ('|', c) if two('|', c) => (2, Punct::OrOr),
            ('(', _) => (1, Punct::LParen),
            (')', _) => (1, Punct::RParen),
            ('{', _) => (1, Punct::LBrace),
            ('}', _) => (1, Punct::RBrace),
            ('[', _) => (1, Punct::LBracket),
            (']', _) => (1, Punct::RBracket),
            (':', _) => (1, Punct::Colon),
            (',', _) => (1, Punct::Comma),
            ('.', _) => (1, Punct::Dot),
            ('@', _) => (1, Punct::At),
            ('$', _) => (1, Punct::Dollar),
            (';', _) => (1, Punct::Semicolon),
            ('=', _) => (1, Punct::Eq),
            ('<', _) => (1, Punct::Lt),
            ('>', _) => (1, Punct::Gt),
            ('+', _) => (1, Punct::Plus),
            ('-', _) => (1, Punct::Minus),
            ('*', _) => (1, Punct::Star),
            ('/', _) => (1, Punct::Slash),
            ('%', _) => (1, Punct::Percent),
            ('!', _) => (1, Punct::Bang),
            ('&', _) => (1, Punct::Amp),
            ('|', _) => (1, Punct::Pipe),
            ('^', _) => (1, Punct::Caret),
            _ => return None,
        };
        for _ in 0..len {
            self.advance();
        }
        Some(Token {
            kind: TokenKind::Punct(punct),
            span: Span::new(start, self.pos()),
        })
    }
}

/// `(int_part.frac_part) * 2^exponent`, each hex digit of `frac_part`
/// worth one more negative power of 16.
fn parse_hex_float(int_part: &str, frac_part: &str, exponent: i32) -> f64 {
    let int_val = if int_part.is_empty() {
        0.0
    } else {
        u64::from_str_radix(int_part, 16).unwrap_or(0) as f64
    };
    let mut frac_val = 0.0;
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        if let Some(d) = c.to_digit(16) {
            frac_val += d as f64 * scale;
            scale /= 16.0;
        }
    }
    (int_val + frac_val) * 2f64.powi(exponent)
}

fn decode_hex_bytes(hex: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(hex.len() / 2);
    let mut chars = hex.chars();
    while let Some(hi) = chars.next() {
        let lo = chars.next().unwrap_or('0');
        let byte = (hi.to_digit(16).unwrap_or(0) << 4) | lo.to_digit(16).unwrap_or(0);
        out.push(byte as u8);
    }
    out
}

/// Collects the full token stream, stopping after the first lex error.
pub fn tokenize(input: &str) -> (Vec<Token>, Option<LexError>) {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        match lexer.next_token() {
            Ok(Some(tok)) => {
                let is_eof = tok.kind == TokenKind::Eof;
                tokens.push(tok);
                if is_eof {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => return (tokens, Some(e)),
        }
    }
    (tokens, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_keywords_and_idents() {
        let ks = kinds("module Foo");
        assert_eq!(
            ks,
            vec![
                TokenKind::Keyword(Keyword::Module),
                TokenKind::Ident("Foo".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_two_char_operators_before_single_char() {
        let ks = kinds("a == b != c <= d >= e && f || g");
        assert!(ks.contains(&TokenKind::Punct(Punct::EqEq)));
        assert!(ks.contains(&TokenKind::Punct(Punct::NotEq)));
        assert!(ks.contains(&TokenKind::Punct(Punct::AndAnd)));
        assert!(ks.contains(&TokenKind::Punct(Punct::OrOr)));
    }

    #[test]
    fn lexes_integer_bases() {
        assert_eq!(kinds("123")[0], TokenKind::Int(123));
        assert_eq!(kinds("0x1F")[0], TokenKind::Int(31));
        assert_eq!(kinds("0o17")[0], TokenKind::Int(15));
        assert_eq!(kinds("017")[0], TokenKind::Int(15));
        assert_eq!(kinds("0b101")[0], TokenKind::Int(5));
        assert_eq!(kinds("0")[0], TokenKind::Int(0));
    }

    #[test]
    fn lexes_floats() {
        assert_eq!(kinds("1.5")[0], TokenKind::Float(1.5));
        assert_eq!(kinds("1e10")[0], TokenKind::Float(1e10));
    }

    #[test]
    fn lexes_text_preserves_escapes() {
        let ks = kinds(r#""a\"b""#);
        assert_eq!(ks[0], TokenKind::Text(r#"a\"b"#.to_string()));
    }

    #[test]
    fn lexes_data_literal() {
        let ks = kinds(r#"0x"DEAD""#);
        assert_eq!(ks[0], TokenKind::Data(vec![0xDE, 0xAD]));
    }

    #[test]
    fn lexes_hex_floats() {
        assert_eq!(kinds("0x1p4")[0], TokenKind::Float(16.0));
        assert_eq!(kinds("0x1.8p1")[0], TokenKind::Float(3.0));
        assert_eq!(kinds("0x1p-1")[0], TokenKind::Float(0.5));
    }

    #[test]
    fn unterminated_block_comment_is_accepted() {
        let (tokens, err) = tokenize("/* never closes");
        assert!(err.is_none());
        assert!(matches!(tokens[0].kind, TokenKind::BlockComment(_)));
    }

    #[test]
    fn unrecognized_char_stops_lexing() {
        let (_, err) = tokenize("a ~ b");
        assert!(matches!(err, Some(LexError::UnrecognizedChar { ch: '~', .. })));
    }

    #[test]
    fn newline_variants_each_emit_one_token() {
        let ks = kinds("a\nb\r\nc\rd");
        let newline_count = ks
            .iter()
            .filter(|k| **k == TokenKind::Newline)
            .count();
        assert_eq!(newline_count, 3);
    }

    #[test]
    fn eof_has_zero_width_span() {
        let tokens = tokenize("x").0;
        let eof = tokens.last().unwrap();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!(eof.span.start, eof.span.end);
    }
}
