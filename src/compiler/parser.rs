//! Recursive-descent parser implementing the grammar in §4.1.
//!
//! Two entry points share one implementation: [`parse`] aborts on the first
//! syntax error (used at runtime — a bridge file with a syntax error simply
//! fails to load); [`parse_with_recovery`] instead records each top-level
//! item's error and resynchronizes at the next declaration keyword, for IDE
//! diagnostics (§4.3's `recovery` parser mode).

use serde_json::Value as JsonValue;

use crate::compiler::ast::*;
use crate::compiler::error::CompileError;
use crate::compiler::token::{Keyword, Token, TokenKind};

pub fn parse(tokens: Vec<Token>) -> Result<Program, CompileError> {
    Parser::new(tokens, false).parse_program()
}

/// Returns whatever program could be assembled (`None` only if even the
/// `version` header could not be parsed) plus every diagnostic collected
/// along the way.
pub fn parse_with_recovery(tokens: Vec<Token>) -> (Option<Program>, Vec<CompileError>) {
    let mut parser = Parser::new(tokens, true);
    match parser.parse_program() {
        Ok(program) => (Some(program), parser.diagnostics),
        Err(e) => {
            parser.diagnostics.push(e);
            (None, parser.diagnostics)
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    recovery: bool,
    diagnostics: Vec<CompileError>,
}

impl Parser {
    fn new(tokens: Vec<Token>, recovery: bool) -> Self {
        debug_assert!(!tokens.is_empty() && tokens.last().unwrap().is_eof());
        Self {
            tokens,
            pos: 0,
            recovery,
            diagnostics: Vec::new(),
        }
    }

    // --- token stream primitives -----------------------------------------

    fn cur(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn cur_kind(&self) -> &TokenKind {
        &self.cur().kind
    }

    fn line(&self) -> usize {
        self.cur().line
    }

    fn at_eof(&self) -> bool {
        self.cur().is_eof()
    }

    fn bump(&mut self) -> Token {
        let tok = self.cur().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn syntax_error(&self, message: impl Into<String>) -> CompileError {
        CompileError::SyntaxError {
            line: self.line(),
            message: message.into(),
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<(), CompileError> {
        match self.cur_kind() {
            TokenKind::Keyword(k) if *k == kw => {
                self.bump();
                Ok(())
            }
            other => Err(self.syntax_error(format!("expected `{kw}`, found {other}"))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, CompileError> {
        match self.cur_kind().clone() {
            TokenKind::Ident(s) => {
                self.bump();
                Ok(s)
            }
            other => Err(self.syntax_error(format!("expected an identifier, found {other}"))),
        }
    }

    fn expect_number(&mut self) -> Result<String, CompileError> {
        match self.cur_kind().clone() {
            TokenKind::Number(n) => {
                self.bump();
                Ok(n)
            }
            other => Err(self.syntax_error(format!("expected a number, found {other}"))),
        }
    }

    fn expect_equals(&mut self) -> Result<(), CompileError> {
        self.expect_simple(TokenKind::Equals)
    }

    fn expect_dot(&mut self) -> Result<(), CompileError> {
        self.expect_simple(TokenKind::Dot)
    }

    fn expect_colon(&mut self) -> Result<(), CompileError> {
        self.expect_simple(TokenKind::Colon)
    }

    fn expect_lbrace(&mut self) -> Result<(), CompileError> {
        self.expect_simple(TokenKind::LBrace)
    }

    fn expect_rbrace(&mut self) -> Result<(), CompileError> {
        self.expect_simple(TokenKind::RBrace)
    }

    fn expect_lbracket(&mut self) -> Result<(), CompileError> {
        self.expect_simple(TokenKind::LBracket)
    }

    fn expect_rbracket(&mut self) -> Result<(), CompileError> {
        self.expect_simple(TokenKind::RBracket)
    }

    fn expect_simple(&mut self, want: TokenKind) -> Result<(), CompileError> {
        if *self.cur_kind() == want {
            self.bump();
            Ok(())
        } else {
            Err(self.syntax_error(format!("expected {want}, found {}", self.cur_kind())))
        }
    }

    /// Consumes `<-` or `<-!`, returning whether it was the forced form.
    fn expect_arrow(&mut self) -> Result<bool, CompileError> {
        match self.cur_kind() {
            TokenKind::Arrow => {
                self.bump();
                Ok(false)
            }
            TokenKind::ForceArrow => {
                self.bump();
                Ok(true)
            }
            other => Err(self.syntax_error(format!("expected `<-` or `<-!`, found {other}"))),
        }
    }

    fn parse_optional_alias(&mut self) -> Result<Option<String>, CompileError> {
        if matches!(self.cur_kind(), TokenKind::Keyword(Keyword::As)) {
            self.bump();
            Ok(Some(self.expect_ident()?))
        } else {
            Ok(None)
        }
    }

    /// A bare word usable as a dotted-path segment: an identifier, or any
    /// keyword spelled out as plain text (field names like `error` or
    /// handles like `output` are lexed as keywords but are legal path
    /// segments).
    fn word_text(&mut self) -> Result<String, CompileError> {
        match self.cur_kind().clone() {
            TokenKind::Ident(s) => {
                self.bump();
                Ok(s)
            }
            TokenKind::Keyword(k) => {
                self.bump();
                Ok(k.to_string())
            }
            other => Err(self.syntax_error(format!("expected a name, found {other}"))),
        }
    }

    fn parse_dotted_path(&mut self) -> Result<DottedPath, CompileError> {
        let line = self.line();
        let mut segments = vec![self.word_text()?];
        while matches!(self.cur_kind(), TokenKind::Dot) {
            self.bump();
            segments.push(self.word_text()?);
        }
        Ok(DottedPath::new(segments, line))
    }

    // --- JSON literals -----------------------------------------------------

    fn parse_json_value(&mut self) -> Result<JsonValue, CompileError> {
        match self.cur_kind().clone() {
            TokenKind::String(s) => {
                self.bump();
                Ok(JsonValue::String(s))
            }
            TokenKind::Number(n) => {
                let line = self.line();
                self.bump();
                self.parse_number(&n, line)
            }
            TokenKind::Bool(b) => {
                self.bump();
                Ok(JsonValue::Bool(b))
            }
            TokenKind::Null => {
                self.bump();
                Ok(JsonValue::Null)
            }
            TokenKind::LBrace => self.parse_json_object(),
            TokenKind::LBracket => self.parse_json_array(),
            other => Err(self.syntax_error(format!("expected a JSON value, found {other}"))),
        }
    }

    fn parse_number(&self, text: &str, line: usize) -> Result<JsonValue, CompileError> {
        if text.contains(['.', 'e', 'E']) {
            let f: f64 = text.parse().map_err(|_| CompileError::InvalidJsonLiteral {
                line,
                message: format!("`{text}` is not a valid number"),
            })?;
            Ok(serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null))
        } else {
            let i: i64 = text.parse().map_err(|_| CompileError::InvalidJsonLiteral {
                line,
                message: format!("`{text}` is not a valid integer"),
            })?;
            Ok(JsonValue::Number(i.into()))
        }
    }

    fn parse_json_object(&mut self) -> Result<JsonValue, CompileError> {
        self.expect_lbrace()?;
        let mut map = serde_json::Map::new();
        if matches!(self.cur_kind(), TokenKind::RBrace) {
            self.bump();
            return Ok(JsonValue::Object(map));
        }
        loop {
            let key = match self.cur_kind().clone() {
                TokenKind::String(s) => {
                    self.bump();
                    s
                }
                _ => self.word_text()?,
            };
            self.expect_colon()?;
            let value = self.parse_json_value()?;
            map.insert(key, value);
            if matches!(self.cur_kind(), TokenKind::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        self.expect_rbrace()?;
        Ok(JsonValue::Object(map))
    }

    fn parse_json_array(&mut self) -> Result<JsonValue, CompileError> {
        self.expect_lbracket()?;
        let mut items = Vec::new();
        if matches!(self.cur_kind(), TokenKind::RBracket) {
            self.bump();
            return Ok(JsonValue::Array(items));
        }
        loop {
            items.push(self.parse_json_value()?);
            if matches!(self.cur_kind(), TokenKind::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        self.expect_rbracket()?;
        Ok(JsonValue::Array(items))
    }

    // --- program structure ---------------------------------------------

    fn parse_program(&mut self) -> Result<Program, CompileError> {
        self.expect_keyword(Keyword::Version)?;
        let version = self.expect_number()?;
        let mut items = Vec::new();
        while !self.at_eof() {
            match self.parse_item() {
                Ok(item) => items.push(item),
                Err(e) if self.recovery => {
                    self.diagnostics.push(e);
                    self.synchronize();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Program { version, items })
    }

    fn synchronize(&mut self) {
        while !self.at_eof() {
            if matches!(
                self.cur_kind(),
                TokenKind::Keyword(Keyword::Const | Keyword::Tool | Keyword::Define | Keyword::Bridge)
            ) {
                return;
            }
            self.bump();
        }
    }

    fn parse_item(&mut self) -> Result<Item, CompileError> {
        match self.cur_kind() {
            TokenKind::Keyword(Keyword::Const) => Ok(Item::Const(self.parse_const_decl()?)),
            TokenKind::Keyword(Keyword::Tool) => Ok(Item::Tool(self.parse_tool_block()?)),
            TokenKind::Keyword(Keyword::Define) => Ok(Item::Define(self.parse_define_block()?)),
            TokenKind::Keyword(Keyword::Bridge) => Ok(Item::Bridge(self.parse_bridge_block()?)),
            other => Err(self.syntax_error(format!(
                "expected a `const`, `tool`, `define`, or `bridge` declaration, found {other}"
            ))),
        }
    }

    fn parse_const_decl(&mut self) -> Result<ConstDecl, CompileError> {
        let line = self.line();
        self.expect_keyword(Keyword::Const)?;
        let name = self.expect_ident()?;
        self.expect_equals()?;
        let value = self.parse_json_value()?;
        Ok(ConstDecl { name, value, line })
    }

    // --- tool blocks ------------------------------------------------------

    fn parse_tool_block(&mut self) -> Result<ToolBlock, CompileError> {
        let line = self.line();
        self.expect_keyword(Keyword::Tool)?;
        let name = self.parse_dotted_path()?;
        self.expect_keyword(Keyword::From)?;
        let from = self.parse_dotted_path()?;
        let mut lines = Vec::new();
        if matches!(self.cur_kind(), TokenKind::LBrace) {
            self.bump();
            while !matches!(self.cur_kind(), TokenKind::RBrace) {
                lines.push(self.parse_tool_line()?);
            }
            self.expect_rbrace()?;
        }
        Ok(ToolBlock { name, from, lines, line })
    }

    fn parse_tool_line(&mut self) -> Result<ToolLine, CompileError> {
        match self.cur_kind() {
            TokenKind::Keyword(Keyword::With) => Ok(ToolLine::With(self.parse_tool_with()?)),
            TokenKind::Keyword(Keyword::On) => Ok(ToolLine::OnError(self.parse_tool_on_error()?)),
            TokenKind::Dot => Ok(ToolLine::Wire(self.parse_tool_wire_line()?)),
            other => Err(self.syntax_error(format!(
                "expected `with`, `on error`, or a `.field` wire, found {other}"
            ))),
        }
    }

    fn parse_tool_with(&mut self) -> Result<ToolWith, CompileError> {
        let line = self.line();
        self.expect_keyword(Keyword::With)?;
        let source = match self.cur_kind().clone() {
            TokenKind::Keyword(Keyword::Context) => {
                self.bump();
                WithSource::Context
            }
            TokenKind::Keyword(Keyword::Const) => {
                self.bump();
                WithSource::Const
            }
            _ => WithSource::Dotted(self.parse_dotted_path()?),
        };
        let alias = self.parse_optional_alias()?;
        Ok(ToolWith { source, alias, line })
    }

    fn parse_tool_on_error(&mut self) -> Result<ToolOnError, CompileError> {
        let line = self.line();
        self.expect_keyword(Keyword::On)?;
        self.expect_keyword(Keyword::Error)?;
        let value = if matches!(self.cur_kind(), TokenKind::Equals) {
            self.bump();
            OnErrorValue::Json(self.parse_json_value()?)
        } else {
            self.expect_arrow()?;
            OnErrorValue::Pull(self.parse_dotted_path()?)
        };
        Ok(ToolOnError { value, line })
    }

    fn parse_tool_wire_line(&mut self) -> Result<ToolWireLine, CompileError> {
        let line = self.line();
        self.expect_dot()?;
        let target = self.parse_dotted_path()?;
        let rhs = if matches!(self.cur_kind(), TokenKind::Equals) {
            self.bump();
            ToolWireRhs::Constant(self.parse_json_value()?)
        } else {
            self.expect_arrow()?;
            ToolWireRhs::Pull(self.parse_dotted_path()?)
        };
        Ok(ToolWireLine { target, rhs, line })
    }

    // --- bridge/define blocks ----------------------------------------------

    fn parse_bridge_block(&mut self) -> Result<BridgeBlock, CompileError> {
        let line = self.line();
        self.expect_keyword(Keyword::Bridge)?;
        let type_name = self.expect_ident()?;
        self.expect_dot()?;
        let field_name = self.expect_ident()?;
        let body = if matches!(self.cur_kind(), TokenKind::Keyword(Keyword::With)) {
            self.bump();
            BridgeBody::Passthrough(self.parse_dotted_path()?)
        } else if matches!(self.cur_kind(), TokenKind::LBrace) {
            self.bump();
            let mut lines = Vec::new();
            while !matches!(self.cur_kind(), TokenKind::RBrace) {
                lines.push(self.parse_bridge_line()?);
            }
            self.expect_rbrace()?;
            BridgeBody::Lines(lines)
        } else {
            return Err(self.syntax_error(format!(
                "expected `with` or `{{` after `bridge {type_name}.{field_name}`, found {}",
                self.cur_kind()
            )));
        };
        Ok(BridgeBlock {
            type_name,
            field_name,
            body,
            line,
        })
    }

    fn parse_bridge_line(&mut self) -> Result<BridgeLine, CompileError> {
        if matches!(self.cur_kind(), TokenKind::Keyword(Keyword::With)) {
            Ok(BridgeLine::With(self.parse_bridge_with()?))
        } else {
            Ok(BridgeLine::Wire(self.parse_wire_stmt()?))
        }
    }

    fn parse_bridge_with(&mut self) -> Result<BridgeWith, CompileError> {
        let line = self.line();
        self.expect_keyword(Keyword::With)?;
        let source = match self.cur_kind().clone() {
            TokenKind::Keyword(Keyword::Input) => {
                self.bump();
                BridgeWithSource::Input
            }
            TokenKind::Keyword(Keyword::Output) => {
                self.bump();
                BridgeWithSource::Output
            }
            TokenKind::Keyword(Keyword::Context) => {
                self.bump();
                BridgeWithSource::Context
            }
            TokenKind::Keyword(Keyword::Const) => {
                self.bump();
                BridgeWithSource::Const
            }
            _ => BridgeWithSource::Dotted(self.parse_dotted_path()?),
        };
        let alias = self.parse_optional_alias()?;
        Ok(BridgeWith { source, alias, line })
    }

    fn parse_define_block(&mut self) -> Result<DefineBlock, CompileError> {
        let line = self.line();
        self.expect_keyword(Keyword::Define)?;
        let name = self.expect_ident()?;
        self.expect_lbrace()?;
        let mut lines = Vec::new();
        while !matches!(self.cur_kind(), TokenKind::RBrace) {
            lines.push(self.parse_bridge_line()?);
        }
        self.expect_rbrace()?;
        Ok(DefineBlock { name, lines, line })
    }

    // --- wires --------------------------------------------------------------

    fn parse_wire_stmt(&mut self) -> Result<WireStmt, CompileError> {
        let line = self.line();
        let target = self.parse_dotted_path()?;
        let rhs = if matches!(self.cur_kind(), TokenKind::Equals) {
            self.bump();
            WireRhs::Constant(self.parse_json_value()?)
        } else {
            let force = self.expect_arrow()?;
            let source = self.parse_source_expr()?;
            let array_map = if matches!(self.cur_kind(), TokenKind::LBracket) {
                Some(self.parse_array_map()?)
            } else {
                None
            };
            let (or_alts, coalesce_alt) = self.parse_alt_chain()?;
            WireRhs::Pull {
                force,
                source,
                array_map,
                or_alts,
                coalesce_alt,
            }
        };
        Ok(WireStmt { target, rhs, line })
    }

    fn parse_source_expr(&mut self) -> Result<SourceExpr, CompileError> {
        let line = self.line();
        let mut stages = vec![self.parse_dotted_path()?];
        while matches!(self.cur_kind(), TokenKind::Colon) {
            self.bump();
            stages.push(self.parse_dotted_path()?);
        }
        Ok(SourceExpr { stages, line })
    }

    fn parse_alt_chain(&mut self) -> Result<(Vec<Alt>, Option<Alt>), CompileError> {
        let mut or_alts = Vec::new();
        while matches!(self.cur_kind(), TokenKind::OrOr) {
            self.bump();
            or_alts.push(self.parse_alt()?);
        }
        let coalesce_alt = if matches!(self.cur_kind(), TokenKind::QuestionQuestion) {
            self.bump();
            Some(self.parse_alt()?)
        } else {
            None
        };
        Ok((or_alts, coalesce_alt))
    }

    fn parse_array_map(&mut self) -> Result<ArrayMap, CompileError> {
        let line = self.line();
        self.expect_lbracket()?;
        self.expect_rbracket()?;
        self.expect_keyword(Keyword::As)?;
        let iter_name = self.expect_ident()?;
        self.expect_lbrace()?;
        let mut lines = Vec::new();
        while !matches!(self.cur_kind(), TokenKind::RBrace) {
            lines.push(self.parse_elem_line()?);
        }
        self.expect_rbrace()?;
        Ok(ArrayMap { iter_name, lines, line })
    }

    fn parse_elem_line(&mut self) -> Result<ElemLine, CompileError> {
        let line = self.line();
        self.expect_dot()?;
        let target = self.parse_dotted_path()?;
        let rhs = if matches!(self.cur_kind(), TokenKind::Equals) {
            self.bump();
            ElemRhs::Constant(self.parse_json_value()?)
        } else {
            self.expect_arrow()?;
            let source = self.parse_source_expr()?;
            let (or_alts, coalesce_alt) = self.parse_alt_chain()?;
            ElemRhs::Pull {
                force: false,
                source,
                or_alts,
                coalesce_alt,
            }
        };
        Ok(ElemLine { target, rhs, line })
    }

    fn parse_alt(&mut self) -> Result<Alt, CompileError> {
        match self.cur_kind().clone() {
            TokenKind::String(s) => {
                self.bump();
                Ok(Alt::Str(s))
            }
            TokenKind::Number(n) => {
                self.bump();
                Ok(Alt::Num(n))
            }
            TokenKind::Bool(b) => {
                self.bump();
                Ok(Alt::Bool(b))
            }
            TokenKind::Null => {
                self.bump();
                Ok(Alt::Null)
            }
            TokenKind::LBrace => Ok(Alt::Json(self.parse_json_object()?)),
            TokenKind::LBracket => Ok(Alt::Json(self.parse_json_array()?)),
            TokenKind::Ident(_) | TokenKind::Keyword(_) => Ok(Alt::Source(self.parse_source_expr()?)),
            other => Err(self.syntax_error(format!("expected a fallback value, found {other}"))),
        }
    }
}
