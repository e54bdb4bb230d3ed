//! Recursive-descent parser over the filtered native-dialect token stream
//! (spec.md §4.2). Every production returns `Option<T>`: on error the
//! parser reports via the [`Reporter`] and returns `None`, which its
//! caller treats as "skip this declaration" rather than aborting the file.

use crate::ast::*;
use crate::error::{DiagnosticCode, Reporter};
use crate::lexer::{tokenize, Keyword, Punct, Token, TokenKind};
use crate::span::{Location, Span};

const LOOKAHEAD_DEPTH: usize = 8;

struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }
}

/// Drops newlines and semicolons before parsing, per spec.md §4.2;
/// comments remain in the stream and are consumed explicitly by
/// metadata-tail parsing.
fn significant_tokens(tokens: Vec<Token>) -> Vec<Token> {
    tokens
        .into_iter()
        .filter(|t| {
            !matches!(
                t.kind,
                TokenKind::Newline | TokenKind::Punct(Punct::Semicolon)
            )
        })
        .collect()
}

pub struct Parser<'r> {
    stream: TokenStream,
    reporter: &'r Reporter,
    uri: String,
    last_span: Span,
}

impl<'r> Parser<'r> {
    pub fn new(source: &str, uri: impl Into<String>, reporter: &'r Reporter) -> Self {
        let uri = uri.into();
        let (tokens, lex_err) = tokenize(source);
        if let Some(crate::lexer::LexError::UnrecognizedChar { pos, .. }) = lex_err {
            reporter.report(
                DiagnosticCode::UnsupportedFileFormat,
                Location::new(uri.clone(), Span::point(pos)),
                "lexer could not recognize a character in this file",
            );
        }
        let filtered = significant_tokens(tokens);
        debug_assert!(LOOKAHEAD_DEPTH >= 1);
        Self {
            stream: TokenStream::new(filtered),
            reporter,
            uri,
            last_span: Span::file_start(),
        }
    }

    fn loc(&self, span: Span) -> Location {
        Location::new(self.uri.clone(), span)
    }

    fn error_unexpected(&mut self, expected: &str) {
        let tok = self.stream.peek().clone();
        let (code, msg) = if matches!(tok.kind, TokenKind::Eof) {
            (
                DiagnosticCode::UnexpectedEof,
                format!("unexpected end of file, expected {expected}"),
            )
        } else {
            (
                DiagnosticCode::UnexpectedToken,
                format!("unexpected token {:?}, expected {expected}", tok.kind),
            )
        };
        self.reporter.report(code, self.loc(tok.span), msg);
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if matches!(&self.stream.peek().kind, TokenKind::Punct(x) if *x == p) {
            self.last_span = self.stream.advance().span;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, k: Keyword) -> bool {
        if matches!(&self.stream.peek().kind, TokenKind::Keyword(x) if *x == k) {
            self.last_span = self.stream.advance().span;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: Punct, what: &str) -> bool {
        if self.eat_punct(p) {
            true
        } else {
            self.error_unexpected(what);
            false
        }
    }

    fn expect_ident(&mut self, what: &str) -> Option<(String, Span)> {
        let tok = self.stream.peek().clone();
        if let TokenKind::Ident(name) = tok.kind {
            self.stream.advance();
            self.last_span = tok.span;
            Some((name, tok.span))
        } else {
            self.error_unexpected(what);
            None
        }
    }

    fn consume_trailing_comment(&mut self) -> Option<String> {
        let tok = self.stream.peek().clone();
        match tok.kind {
            TokenKind::LineComment(text) | TokenKind::BlockComment(text) => {
                self.stream.advance();
                Some(text)
            }
            _ => None,
        }
    }

    fn skip_leading_comments(&mut self) -> Option<String> {
        let mut collected = String::new();
        loop {
            match &self.stream.peek().kind {
                TokenKind::LineComment(text) | TokenKind::BlockComment(text) => {
                    if !collected.is_empty() {
                        collected.push('\n');
                    }
                    collected.push_str(text);
                    self.stream.advance();
                }
                _ => break,
            }
        }
        if collected.is_empty() {
            None
        } else {
            Some(collected)
        }
    }

    /// `[@UID] [$(annotation, ...)] [comment-block]`, shared by every
    /// declaration (spec.md §4.2).
    fn parse_meta_tail(&mut self) -> MetaTail {
        let mut meta = MetaTail::default();
        if self.eat_punct(Punct::At) {
            meta.uid = self.parse_uid_literal();
        }
        if self.eat_punct(Punct::Dollar) {
            meta.annotations = self.parse_annotation_list();
        }
        meta.comment = self.consume_trailing_comment();
        meta
    }

    fn parse_uid_literal(&mut self) -> Option<u64> {
        let tok = self.stream.peek().clone();
        match tok.kind {
            TokenKind::Int(v) => {
                self.stream.advance();
                u64::try_from(v).ok()
            }
            _ => {
                self.error_unexpected("a UID literal");
                None
            }
        }
    }

    fn parse_annotation_list(&mut self) -> Vec<AnnotationApplication> {
        let mut out = Vec::new();
        if !self.expect_punct(Punct::LParen, "'(' to start an annotation list") {
            return out;
        }
        if self.eat_punct(Punct::RParen) {
            return out;
        }
        loop {
            if let Some(app) = self.parse_annotation_application() {
                out.push(app);
            }
            if self.eat_punct(Punct::Comma) {
                if self.eat_punct(Punct::RParen) {
                    break;
                }
                continue;
            }
            self.expect_punct(Punct::RParen, "',' or ')' in annotation list");
            break;
        }
        out
    }

    fn parse_annotation_application(&mut self) -> Option<AnnotationApplication> {
        let (first, first_span) = self.expect_ident("an annotation name")?;
        let (qualifier, name, name_span) = if self.eat_punct(Punct::Dot) {
            let (second, second_span) = self.expect_ident("an annotation name after '.'")?;
            (Some(first), second, second_span)
        } else {
            (None, first, first_span)
        };
        let mut value = None;
        let mut end = name_span;
        if self.eat_punct(Punct::LParen) {
            value = self.parse_value();
            if let Some(v) = &value {
                end = v.span();
            }
            self.expect_punct(Punct::RParen, "')' to close an annotation value");
        }
        Some(AnnotationApplication {
            qualifier,
            name,
            value,
            span: first_span.merge(end),
        })
    }

    fn parse_qualified_name(&mut self, what: &str) -> Option<QualifiedName> {
        let (first, first_span) = self.expect_ident(what)?;
        if self.eat_punct(Punct::Dot) {
            let (second, second_span) = self.expect_ident("a name after '.'")?;
            Some(QualifiedName {
                qualifier: Some(first),
                name: second,
                span: first_span.merge(second_span),
            })
        } else {
            Some(QualifiedName {
                qualifier: None,
                name: first,
                span: first_span,
            })
        }
    }

    fn parse_type_expr(&mut self) -> Option<TypeExprAst> {
        let (first, first_span) = self.expect_ident("a type name")?;
        let (qualifier, name, mut end) = if self.eat_punct(Punct::Dot) {
            let (second, second_span) = self.expect_ident("a type name after '.'")?;
            (Some(first), second, second_span)
        } else {
            (None, first, first_span)
        };
        let mut parameters = Vec::new();
        if self.eat_punct(Punct::Lt) {
            loop {
                if let Some(p) = self.parse_type_expr() {
                    parameters.push(p);
                }
                if self.eat_punct(Punct::Comma) {
                    continue;
                }
                if self.eat_punct(Punct::Gt) {
                    end = self.last_span;
                    break;
                }
                self.error_unexpected("',' or '>' in type parameter list");
                break;
            }
        }
        Some(TypeExprAst {
            qualifier,
            name,
            parameters,
            span: first_span.merge(end),
        })
    }

    /// Unary prefix before a value; binary is always parenthesized
    /// `(V op V)`, so no precedence climbing is required (spec.md §4.2,
    /// §9).
    pub fn parse_value(&mut self) -> Option<ValueAst> {
        let tok = self.stream.peek().clone();
        match &tok.kind {
            TokenKind::Punct(Punct::Plus) => {
                self.stream.advance();
                let inner = self.parse_value()?;
                let span = tok.span.merge(inner.span());
                Some(ValueAst::Unary(UnaryOp::Plus, Box::new(inner), span))
            }
            TokenKind::Punct(Punct::Minus) => {
                self.stream.advance();
                let inner = self.parse_value()?;
                let span = tok.span.merge(inner.span());
                Some(ValueAst::Unary(UnaryOp::Neg, Box::new(inner), span))
            }
            TokenKind::Punct(Punct::Bang) => {
                self.stream.advance();
                let inner = self.parse_value()?;
                let span = tok.span.merge(inner.span());
                Some(ValueAst::Unary(UnaryOp::Not, Box::new(inner), span))
            }
            TokenKind::Punct(Punct::LParen) => self.parse_binary_value(),
            TokenKind::Punct(Punct::LBracket) => self.parse_list_value(),
            TokenKind::Punct(Punct::LBrace) => self.parse_struct_value(),
            TokenKind::Keyword(Keyword::True) => {
                self.stream.advance();
                Some(ValueAst::Bool(true, tok.span))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.stream.advance();
                Some(ValueAst::Bool(false, tok.span))
            }
            TokenKind::Int(v) => {
                self.stream.advance();
                Some(ValueAst::Int(*v, tok.span))
            }
            TokenKind::Float(v) => {
                self.stream.advance();
                Some(ValueAst::Float(*v, tok.span))
            }
            TokenKind::Text(t) => {
                self.stream.advance();
                Some(ValueAst::Text(t.clone(), tok.span))
            }
            TokenKind::Data(d) => {
                self.stream.advance();
                Some(ValueAst::Data(d.clone(), tok.span))
            }
            TokenKind::Ident(_) => {
                let q = self.parse_qualified_name("a value")?;
                Some(ValueAst::Ident(q))
            }
            _ => {
                self.error_unexpected("a value");
                None
            }
        }
    }

    fn parse_binary_value(&mut self) -> Option<ValueAst> {
        let start = self.stream.peek().span;
        self.stream.advance(); // '('
        let lhs = self.parse_value()?;
        let op_tok = self.stream.peek().clone();
        let op = match &op_tok.kind {
            TokenKind::Punct(Punct::EqEq) => BinOp::Eq,
            TokenKind::Punct(Punct::NotEq) => BinOp::Ne,
            TokenKind::Punct(Punct::Le) => BinOp::Le,
            TokenKind::Punct(Punct::Ge) => BinOp::Ge,
            TokenKind::Punct(Punct::Lt) => BinOp::Lt,
            TokenKind::Punct(Punct::Gt) => BinOp::Gt,
            TokenKind::Punct(Punct::AndAnd) => BinOp::AndAnd,
            TokenKind::Punct(Punct::OrOr) => BinOp::OrOr,
            TokenKind::Punct(Punct::Amp) => BinOp::BitAnd,
            TokenKind::Punct(Punct::Pipe) => BinOp::BitOr,
            TokenKind::Punct(Punct::Caret) => BinOp::BitXor,
            TokenKind::Punct(Punct::Plus) => BinOp::Add,
            TokenKind::Punct(Punct::Minus) => BinOp::Sub,
            TokenKind::Punct(Punct::Star) => BinOp::Mul,
            TokenKind::Punct(Punct::Slash) => BinOp::Div,
            TokenKind::Punct(Punct::Percent) => BinOp::Rem,
            _ => {
                self.error_unexpected("a binary operator");
                return None;
            }
        };
        self.stream.advance();
        let rhs = self.parse_value()?;
        self.expect_punct(Punct::RParen, "')' to close a binary expression");
        let span = start.merge(self.last_span);
        Some(ValueAst::Binary(op, Box::new(lhs), Box::new(rhs), span))
    }

    fn parse_list_value(&mut self) -> Option<ValueAst> {
        let start = self.stream.peek().span;
        self.stream.advance(); // '['
        let mut items = Vec::new();
        if self.eat_punct(Punct::RBracket) {
            return Some(ValueAst::List(items, start.merge(self.last_span)));
        }
        loop {
            if let Some(v) = self.parse_value() {
                items.push(v);
            }
            if self.eat_punct(Punct::Comma) {
                if self.eat_punct(Punct::RBracket) {
                    break;
                }
                continue;
            }
            self.expect_punct(Punct::RBracket, "',' or ']' in a list literal");
            break;
        }
        Some(ValueAst::List(items, start.merge(self.last_span)))
    }

    fn parse_struct_value(&mut self) -> Option<ValueAst> {
        let start = self.stream.peek().span;
        self.stream.advance(); // '{'
        let mut fields = Vec::new();
        if self.eat_punct(Punct::RBrace) {
            return Some(ValueAst::Struct(fields, start.merge(self.last_span)));
        }
        loop {
            if let Some((name, _)) = self.expect_ident("a field name") {
                self.expect_punct(Punct::Colon, "':' after a struct literal field name");
                if let Some(v) = self.parse_value() {
                    fields.push((name, v));
                }
            }
            if self.eat_punct(Punct::Comma) {
                if self.eat_punct(Punct::RBrace) {
                    break;
                }
                continue;
            }
            self.expect_punct(Punct::RBrace, "',' or '}' in a struct literal");
            break;
        }
        Some(ValueAst::Struct(fields, start.merge(self.last_span)))
    }

    fn parse_syntax_stmt(&mut self) -> Option<String> {
        if !self.eat_keyword(Keyword::Syntax) {
            self.error_unexpected("the 'syntax' statement");
            return None;
        }
        self.expect_punct(Punct::Eq, "'=' after 'syntax'");
        let tok = self.stream.peek().clone();
        if let TokenKind::Text(t) = tok.kind {
            self.stream.advance();
            Some(t)
        } else {
            self.error_unexpected("a text literal for 'syntax'");
            None
        }
    }

    fn parse_module_meta(&mut self) -> MetaTail {
        self.eat_keyword(Keyword::Module);
        self.expect_punct(Punct::Eq, "'=' after 'module'");
        self.parse_meta_tail()
    }

    fn parse_import(&mut self) -> Option<ImportAst> {
        let start = self.stream.peek().span;
        self.eat_keyword(Keyword::Import);
        let tok = self.stream.peek().clone();
        let path = if let TokenKind::Text(t) = tok.kind {
            self.stream.advance();
            t
        } else {
            self.error_unexpected("a text literal import path");
            return None;
        };
        let mut alias = None;
        let mut is_dot_import = false;
        if self.eat_keyword(Keyword::As) {
            if self.eat_punct(Punct::Dot) {
                is_dot_import = true;
            } else if let Some((name, _)) = self.expect_ident("an import alias") {
                alias = Some(name);
            }
        }
        let meta = self.parse_meta_tail();
        Some(ImportAst {
            path,
            alias,
            is_dot_import,
            span: start.merge(self.last_span),
            meta,
        })
    }

    fn parse_annotation_decl(&mut self) -> Option<AnnotationDeclAst> {
        let start = self.stream.peek().span;
        self.eat_keyword(Keyword::Annotation);
        let (name, _) = self.expect_ident("an annotation name")?;
        let mut scopes = Vec::new();
        if self.eat_punct(Punct::LParen) {
            if !self.eat_punct(Punct::RParen) {
                loop {
                    if let Some(scope) = self.parse_annotation_scope() {
                        scopes.push(scope);
                    }
                    if self.eat_punct(Punct::Comma) {
                        continue;
                    }
                    self.expect_punct(Punct::RParen, "',' or ')' in a scope list");
                    break;
                }
            }
        }
        self.expect_punct(Punct::Colon, "':' before an annotation's value type");
        let value_type = self.parse_type_expr()?;
        let meta = self.parse_meta_tail();
        Some(AnnotationDeclAst {
            name,
            value_type,
            scopes,
            span: start.merge(self.last_span),
            meta,
        })
    }

    fn parse_annotation_scope(&mut self) -> Option<AnnotationScope> {
        if self.eat_punct(Punct::Star) {
            return Some(AnnotationScope::Star);
        }
        let (name, _) = self.expect_ident("an annotation scope")?;
        Some(match name.as_str() {
            "module" => AnnotationScope::Module,
            "union" => AnnotationScope::Union,
            "struct" => AnnotationScope::Struct,
            "field" => AnnotationScope::Field,
            "enumerant" => AnnotationScope::Enumerant,
            "enum" => AnnotationScope::Enum,
            "api" => AnnotationScope::Api,
            "apimethod" => AnnotationScope::ApiMethod,
            "sdk" => AnnotationScope::Sdk,
            "sdkmethod" => AnnotationScope::SdkMethod,
            "const" => AnnotationScope::Const,
            "import" => AnnotationScope::Import,
            other => {
                self.error_unexpected(&format!("a known annotation scope, got '{other}'"));
                return None;
            }
        })
    }

    fn parse_const(&mut self) -> Option<ConstAst> {
        let start = self.stream.peek().span;
        self.eat_keyword(Keyword::Const);
        let (name, _) = self.expect_ident("a constant name")?;
        self.expect_punct(Punct::Colon, "':' before a constant's type");
        let ty = self.parse_type_expr()?;
        self.expect_punct(Punct::Eq, "'=' before a constant's value");
        let value = self.parse_value()?;
        let meta = self.parse_meta_tail();
        Some(ConstAst {
            name,
            ty,
            value,
            span: start.merge(self.last_span),
            meta,
        })
    }

    fn parse_enum(&mut self) -> Option<EnumAst> {
        let start = self.stream.peek().span;
        self.eat_keyword(Keyword::Enum);
        let (name, _) = self.expect_ident("an enum name")?;
        self.expect_punct(Punct::LBrace, "'{' to start an enum body");
        let mut enumerants = Vec::new();
        while !matches!(
            self.stream.peek().kind,
            TokenKind::Punct(Punct::RBrace) | TokenKind::Eof
        ) {
            let e_start = self.stream.peek().span;
            match self.expect_ident("an enumerant name") {
                Some((e_name, _)) => {
                    let e_meta = self.parse_meta_tail();
                    enumerants.push(EnumerantAst {
                        name: e_name,
                        meta: e_meta,
                        span: e_start.merge(self.last_span),
                    });
                }
                None => {
                    self.stream.advance();
                }
            }
        }
        self.expect_punct(Punct::RBrace, "'}' to close an enum body");
        let meta = self.parse_meta_tail();
        Some(EnumAst {
            name,
            enumerants,
            span: start.merge(self.last_span),
            meta,
        })
    }

    fn parse_struct(&mut self) -> Option<StructAst> {
        let start = self.stream.peek().span;
        self.eat_keyword(Keyword::Struct);
        let (name, _) = self.expect_ident("a struct name")?;
        self.expect_punct(Punct::LBrace, "'{' to start a struct body");
        let mut fields = Vec::new();
        let mut unions = Vec::new();
        while !matches!(
            self.stream.peek().kind,
            TokenKind::Punct(Punct::RBrace) | TokenKind::Eof
        ) {
            if matches!(self.stream.peek().kind, TokenKind::Keyword(Keyword::Union)) {
                if let Some(u) = self.parse_union() {
                    unions.push(u);
                }
            } else if let Some(f) = self.parse_field() {
                fields.push(f);
            } else {
                self.stream.advance();
            }
        }
        self.expect_punct(Punct::RBrace, "'}' to close a struct body");
        let meta = self.parse_meta_tail();
        Some(StructAst {
            name,
            fields,
            unions,
            span: start.merge(self.last_span),
            meta,
        })
    }

    fn parse_union(&mut self) -> Option<UnionAst> {
        let start = self.stream.peek().span;
        self.eat_keyword(Keyword::Union);
        let name = if matches!(self.stream.peek().kind, TokenKind::Ident(_)) {
            self.expect_ident("a union name").map(|(n, _)| n)
        } else {
            None
        };
        self.expect_punct(Punct::LBrace, "'{' to start a union body");
        let mut fields = Vec::new();
        while !matches!(
            self.stream.peek().kind,
            TokenKind::Punct(Punct::RBrace) | TokenKind::Eof
        ) {
            if let Some(f) = self.parse_field() {
                fields.push(f);
            } else {
                self.stream.advance();
            }
        }
        self.expect_punct(Punct::RBrace, "'}' to close a union body");
        Some(UnionAst {
            name,
            fields,
            span: start.merge(self.last_span),
        })
    }

    fn parse_field(&mut self) -> Option<FieldAst> {
        let start = self.stream.peek().span;
        let (name, _) = self.expect_ident("a field name")?;
        self.expect_punct(Punct::Colon, "':' before a field's type");
        let ty = self.parse_type_expr()?;
        let mut default = None;
        if self.eat_punct(Punct::Eq) {
            default = self.parse_value();
        }
        let meta = self.parse_meta_tail();
        Some(FieldAst {
            name,
            ty,
            default,
            span: start.merge(self.last_span),
            meta,
        })
    }

    fn parse_extends_list(&mut self) -> Vec<QualifiedName> {
        let mut out = Vec::new();
        if !self.eat_punct(Punct::Colon) {
            return out;
        }
        loop {
            if let Some(q) = self.parse_qualified_name("a base interface name") {
                out.push(q);
            }
            if self.eat_punct(Punct::Comma) {
                continue;
            }
            break;
        }
        out
    }

    fn parse_api(&mut self) -> Option<ApiAst> {
        let start = self.stream.peek().span;
        self.eat_keyword(Keyword::Api);
        let (name, _) = self.expect_ident("an api name")?;
        let extends = self.parse_extends_list();
        self.expect_punct(Punct::LBrace, "'{' to start an api body");
        let mut methods = Vec::new();
        while !matches!(
            self.stream.peek().kind,
            TokenKind::Punct(Punct::RBrace) | TokenKind::Eof
        ) {
            if let Some(m) = self.parse_api_method() {
                methods.push(m);
            } else {
                self.stream.advance();
            }
        }
        self.expect_punct(Punct::RBrace, "'}' to close an api body");
        let meta = self.parse_meta_tail();
        Some(ApiAst {
            name,
            methods,
            extends,
            span: start.merge(self.last_span),
            meta,
        })
    }

    fn parse_api_method(&mut self) -> Option<ApiMethodAst> {
        let start = self.stream.peek().span;
        let (name, _) = self.expect_ident("a method name")?;
        self.expect_punct(Punct::LParen, "'(' to start a method's parameter list");
        self.expect_punct(Punct::Colon, "':' before an api method's input type");
        let input = self.parse_type_expr()?;
        self.expect_punct(Punct::RParen, "')' to close an api method's input");
        if !self.eat_keyword(Keyword::Returns) {
            self.error_unexpected("'returns'");
        }
        self.expect_punct(Punct::LParen, "'(' to start an api method's return type");
        self.expect_punct(Punct::Colon, "':' before an api method's output type");
        let output = self.parse_type_expr()?;
        self.expect_punct(Punct::RParen, "')' to close an api method's output");
        let meta = self.parse_meta_tail();
        Some(ApiMethodAst {
            name,
            input,
            output,
            span: start.merge(self.last_span),
            meta,
        })
    }

    fn parse_sdk(&mut self) -> Option<SdkAst> {
        let start = self.stream.peek().span;
        self.eat_keyword(Keyword::Sdk);
        let (name, _) = self.expect_ident("an sdk name")?;
        let extends = self.parse_extends_list();
        self.expect_punct(Punct::LBrace, "'{' to start an sdk body");
        let mut methods = Vec::new();
        while !matches!(
            self.stream.peek().kind,
            TokenKind::Punct(Punct::RBrace) | TokenKind::Eof
        ) {
            if let Some(m) = self.parse_sdk_method() {
                methods.push(m);
            } else {
                self.stream.advance();
            }
        }
        self.expect_punct(Punct::RBrace, "'}' to close an sdk body");
        let meta = self.parse_meta_tail();
        Some(SdkAst {
            name,
            methods,
            extends,
            span: start.merge(self.last_span),
            meta,
        })
    }

    fn parse_sdk_method(&mut self) -> Option<SdkMethodAst> {
        let start = self.stream.peek().span;
        let (name, _) = self.expect_ident("a method name")?;
        self.expect_punct(Punct::LParen, "'(' to start a method's parameter list");
        let mut params = Vec::new();
        if !matches!(self.stream.peek().kind, TokenKind::Punct(Punct::RParen)) {
            loop {
                if let Some((p_name, _)) = self.expect_ident("a parameter name") {
                    self.expect_punct(Punct::Colon, "':' before a parameter's type");
                    if let Some(ty) = self.parse_type_expr() {
                        params.push(SdkParamAst { name: p_name, ty });
                    }
                }
                if self.eat_punct(Punct::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect_punct(Punct::RParen, "')' to close a method's parameter list");
        let mut output = None;
        if self.eat_keyword(Keyword::Returns) {
            self.expect_punct(Punct::LParen, "'(' to start a method's return type");
            self.expect_punct(Punct::Colon, "':' before a method's return type");
            output = self.parse_type_expr();
            self.expect_punct(Punct::RParen, "')' to close a method's return type");
        }
        let nothrows = self.eat_keyword(Keyword::Nothrows);
        let meta = self.parse_meta_tail();
        Some(SdkMethodAst {
            name,
            params,
            output,
            nothrows,
            span: start.merge(self.last_span),
            meta,
        })
    }

    /// Parsed for a future execution-semantics layer but never
    /// transcribed into the descriptor (spec.md §9 open question 2).
    fn parse_impl(&mut self) -> Option<ImplAst> {
        let start = self.stream.peek().span;
        self.eat_keyword(Keyword::Impl);
        let target = self.parse_qualified_name("an impl target")?;
        self.expect_punct(Punct::LBrace, "'{' to start an impl body");
        let steps = self.parse_impl_steps();
        self.expect_punct(Punct::RBrace, "'}' to close an impl body");
        let meta = self.parse_meta_tail();
        Some(ImplAst {
            target,
            steps,
            span: start.merge(self.last_span),
            meta,
        })
    }

    fn parse_impl_steps(&mut self) -> Vec<ImplStep> {
        let mut steps = Vec::new();
        while !matches!(
            self.stream.peek().kind,
            TokenKind::Punct(Punct::RBrace) | TokenKind::Eof
        ) {
            match self.parse_impl_step() {
                Some(step) => steps.push(step),
                None => {
                    self.stream.advance();
                }
            }
        }
        steps
    }

    fn parse_impl_step(&mut self) -> Option<ImplStep> {
        let tok = self.stream.peek().clone();
        match tok.kind {
            TokenKind::Keyword(Keyword::Var) => {
                self.stream.advance();
                let (name, _) = self.expect_ident("a variable name")?;
                let mut ty = None;
                if self.eat_punct(Punct::Colon) {
                    ty = self.parse_type_expr();
                }
                let mut init = None;
                if self.eat_punct(Punct::Eq) {
                    init = self.parse_value();
                }
                Some(ImplStep::Var { name, ty, init })
            }
            TokenKind::Keyword(Keyword::Set) => {
                self.stream.advance();
                let target = self.parse_qualified_name("a set target")?;
                self.expect_punct(Punct::Eq, "'=' in a set statement");
                let value = self.parse_value()?;
                Some(ImplStep::Set { target, value })
            }
            TokenKind::Keyword(Keyword::If) => {
                self.stream.advance();
                self.expect_punct(Punct::LParen, "'(' after 'if'");
                let cond = self.parse_value()?;
                self.expect_punct(Punct::RParen, "')' after an if condition");
                self.expect_punct(Punct::LBrace, "'{' to start an if body");
                let then_body = self.parse_impl_steps();
                self.expect_punct(Punct::RBrace, "'}' to close an if body");
                let mut else_body = Vec::new();
                if self.eat_keyword(Keyword::Else) {
                    self.expect_punct(Punct::LBrace, "'{' to start an else body");
                    else_body = self.parse_impl_steps();
                    self.expect_punct(Punct::RBrace, "'}' to close an else body");
                }
                Some(ImplStep::If {
                    cond,
                    then_body,
                    else_body,
                })
            }
            TokenKind::Keyword(Keyword::Switch) => {
                self.stream.advance();
                self.expect_punct(Punct::LParen, "'(' after 'switch'");
                let scrutinee = self.parse_value()?;
                self.expect_punct(Punct::RParen, "')' after a switch scrutinee");
                self.expect_punct(Punct::LBrace, "'{' to start a switch body");
                let mut cases = Vec::new();
                while !matches!(
                    self.stream.peek().kind,
                    TokenKind::Punct(Punct::RBrace) | TokenKind::Eof
                ) {
                    let value = if self.eat_keyword(Keyword::Case) {
                        let v = self.parse_value();
                        self.expect_punct(Punct::Colon, "':' after a case value");
                        v
                    } else if self.eat_keyword(Keyword::Default) {
                        self.expect_punct(Punct::Colon, "':' after 'default'");
                        None
                    } else {
                        self.error_unexpected("'case' or 'default'");
                        self.stream.advance();
                        continue;
                    };
                    self.expect_punct(Punct::LBrace, "'{' to start a case body");
                    let body = self.parse_impl_steps();
                    self.expect_punct(Punct::RBrace, "'}' to close a case body");
                    cases.push((value, body));
                }
                self.expect_punct(Punct::RBrace, "'}' to close a switch body");
                Some(ImplStep::Switch { scrutinee, cases })
            }
            TokenKind::Keyword(Keyword::While) => {
                self.stream.advance();
                self.expect_punct(Punct::LParen, "'(' after 'while'");
                let cond = self.parse_value()?;
                self.expect_punct(Punct::RParen, "')' after a while condition");
                self.expect_punct(Punct::LBrace, "'{' to start a while body");
                let body = self.parse_impl_steps();
                self.expect_punct(Punct::RBrace, "'}' to close a while body");
                Some(ImplStep::While { cond, body })
            }
            TokenKind::Keyword(Keyword::For) => {
                self.stream.advance();
                self.expect_punct(Punct::LParen, "'(' after 'for'");
                let (binding, _) = self.expect_ident("a loop binding")?;
                // "in" is a contextual keyword, not part of the closed
                // reserved-word set, so it arrives as a plain ident.
                match self.stream.peek().kind.clone() {
                    TokenKind::Ident(ref s) if s == "in" => {
                        self.stream.advance();
                    }
                    _ => self.error_unexpected("'in'"),
                }
                let iterable = self.parse_value()?;
                self.expect_punct(Punct::RParen, "')' after a for clause");
                self.expect_punct(Punct::LBrace, "'{' to start a for body");
                let body = self.parse_impl_steps();
                self.expect_punct(Punct::RBrace, "'}' to close a for body");
                Some(ImplStep::For {
                    binding,
                    iterable,
                    body,
                })
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.stream.advance();
                let value = if matches!(self.stream.peek().kind, TokenKind::Punct(Punct::RBrace))
                {
                    None
                } else {
                    self.parse_value()
                };
                Some(ImplStep::Return(value))
            }
            TokenKind::Keyword(Keyword::Throw) => {
                self.stream.advance();
                let value = self.parse_value()?;
                Some(ImplStep::Throw(value))
            }
            TokenKind::Keyword(Keyword::Exec)
            | TokenKind::Keyword(Keyword::Async)
            | TokenKind::Keyword(Keyword::Await) => {
                let is_async = self.eat_keyword(Keyword::Async);
                let is_await = self.eat_keyword(Keyword::Await);
                self.eat_keyword(Keyword::Exec);
                let invocation = self.parse_qualified_name("an invocation target")?;
                self.expect_punct(Punct::LParen, "'(' to start invocation arguments");
                let mut args = Vec::new();
                if !matches!(self.stream.peek().kind, TokenKind::Punct(Punct::RParen)) {
                    loop {
                        if let Some(v) = self.parse_value() {
                            args.push(v);
                        }
                        if self.eat_punct(Punct::Comma) {
                            continue;
                        }
                        break;
                    }
                }
                self.expect_punct(Punct::RParen, "')' to close invocation arguments");
                let mut catch_body = None;
                if self.eat_keyword(Keyword::Catch) {
                    self.expect_punct(Punct::LBrace, "'{' to start a catch body");
                    catch_body = Some(self.parse_impl_steps());
                    self.expect_punct(Punct::RBrace, "'}' to close a catch body");
                }
                Some(ImplStep::Exec {
                    invocation,
                    args,
                    is_async,
                    is_await,
                    catch_body,
                })
            }
            TokenKind::Prose(text) => {
                self.stream.advance();
                Some(ImplStep::Prose(text))
            }
            _ => {
                self.error_unexpected("an impl statement");
                None
            }
        }
    }

    pub fn parse_module(&mut self) -> ModuleAst {
        let mut module = ModuleAst::default();
        module.leading_comment = self.skip_leading_comments();
        module.syntax = self.parse_syntax_stmt();

        while !self.stream.at_eof() {
            let tok = self.stream.peek().clone();
            match tok.kind {
                TokenKind::Keyword(Keyword::Module) => {
                    module.module_meta = self.parse_module_meta();
                }
                TokenKind::Keyword(Keyword::Import) => {
                    if let Some(i) = self.parse_import() {
                        module.imports.push(i);
                    }
                }
                TokenKind::Keyword(Keyword::Annotation) => {
                    if let Some(a) = self.parse_annotation_decl() {
                        module.annotations.push(a);
                    }
                }
                TokenKind::Keyword(Keyword::Const) => {
                    if let Some(c) = self.parse_const() {
                        module.consts.push(c);
                    }
                }
                TokenKind::Keyword(Keyword::Enum) => {
                    if let Some(e) = self.parse_enum() {
                        module.enums.push(e);
                    }
                }
                TokenKind::Keyword(Keyword::Struct) => {
                    if let Some(s) = self.parse_struct() {
                        module.structs.push(s);
                    }
                }
                TokenKind::Keyword(Keyword::Api) => {
                    if let Some(a) = self.parse_api() {
                        module.apis.push(a);
                    }
                }
                TokenKind::Keyword(Keyword::Sdk) => {
                    if let Some(s) = self.parse_sdk() {
                        module.sdks.push(s);
                    }
                }
                TokenKind::Keyword(Keyword::Impl) => {
                    if let Some(i) = self.parse_impl() {
                        module.impls.push(i);
                    }
                }
                TokenKind::LineComment(_) | TokenKind::BlockComment(_) => {
                    self.stream.advance();
                }
                TokenKind::Eof => break,
                _ => {
                    self.error_unexpected("a top-level declaration");
                    self.stream.advance();
                }
            }
        }
        module
    }
}

pub fn parse_source(source: &str, uri: impl Into<String>, reporter: &Reporter) -> ModuleAst {
    let mut parser = Parser::new(source, uri, reporter);
    parser.parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (ModuleAst, Reporter) {
        let reporter = Reporter::new();
        let module = parse_source(src, "t.idl", &reporter);
        (module, reporter)
    }

    #[test]
    fn parses_minimal_native_module() {
        let (m, r) = parse("syntax = \"mglot0\"\nmodule = @0x01");
        assert!(r.is_empty());
        assert_eq!(m.syntax.as_deref(), Some("mglot0"));
        assert_eq!(m.module_meta.uid, Some(1));
    }

    #[test]
    fn synthesizes_enum_with_metadata() {
        let (m, r) = parse("syntax = \"mglot0\"\nenum E { Bar @1 Baz @2 } @5");
        assert!(r.is_empty());
        assert_eq!(m.enums.len(), 1);
        let e = &m.enums[0];
        assert_eq!(e.name, "E");
        assert_eq!(e.enumerants.len(), 2);
        assert_eq!(e.meta.uid, Some(5));
    }

    #[test]
    fn parses_union_fields() {
        let (m, r) = parse(
            "syntax = \"mglot0\"\nstruct S { union U { A :Int32 @2; B :Text @3 } @1 }",
        );
        assert!(r.is_empty());
        let s = &m.structs[0];
        assert_eq!(s.unions.len(), 1);
        assert_eq!(s.unions[0].fields.len(), 2);
    }

    #[test]
    fn parses_api_method_signature() {
        let (m, r) = parse(
            "syntax = \"mglot0\"\napi Svc { Call(:Req) returns (:Resp) @1 }",
        );
        assert!(r.is_empty());
        assert_eq!(m.apis[0].methods[0].name, "Call");
    }

    #[test]
    fn parses_sdk_method_with_params_and_nothrows() {
        let (m, r) = parse(
            "syntax = \"mglot0\"\nsdk S { Do(a :Int32, b :Text) returns (:Bool) nothrows @1 }",
        );
        assert!(r.is_empty());
        let method = &m.sdks[0].methods[0];
        assert_eq!(method.params.len(), 2);
        assert!(method.nothrows);
    }

    #[test]
    fn parses_binary_value_requires_parens() {
        let (m, r) = parse("syntax = \"mglot0\"\nconst X :Int32 = (1 + 2)");
        assert!(r.is_empty());
        assert!(matches!(m.consts[0].value, ValueAst::Binary(BinOp::Add, ..)));
    }

    #[test]
    fn unexpected_token_reports_and_recovers() {
        let (m, r) = parse("syntax = \"mglot0\"\n@@@\nstruct S { }");
        assert!(!r.is_empty());
        assert_eq!(m.structs.len(), 1);
    }

    #[test]
    fn dot_import_alias_is_recognized() {
        let (m, r) = parse("syntax = \"mglot0\"\nimport \"foo.mgdl\" as .");
        assert!(r.is_empty());
        assert!(m.imports[0].is_dot_import);
    }
}
