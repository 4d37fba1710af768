//! Hand-written lexer for `.bridge` source (§4.1).
//!
//! The lexer has a single mode — recovery vs strict parsing happens in the
//! parser, not here (§4.3). On an unrecognized character the lexer raises a
//! [`CompileError::SyntaxError`] carrying the 1-based line number.

use crate::compiler::error::CompileError;
use crate::compiler::token::{Keyword, Token, TokenKind};

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
        }
    }

    /// Tokenizes the entire source, always ending with one `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.is_eof();
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        self.skip_trivia();
        let line = self.line;
        let Some(c) = self.peek_char() else {
            return Ok(Token::new(TokenKind::Eof, line));
        };

        let kind = match c {
            '{' => {
                self.bump();
                TokenKind::LBrace
            }
            '}' => {
                self.bump();
                TokenKind::RBrace
            }
            '[' => {
                self.bump();
                TokenKind::LBracket
            }
            ']' => {
                self.bump();
                TokenKind::RBracket
            }
            '.' => {
                self.bump();
                TokenKind::Dot
            }
            ':' => {
                self.bump();
                TokenKind::Colon
            }
            ',' => {
                self.bump();
                TokenKind::Comma
            }
            '=' => {
                self.bump();
                TokenKind::Equals
            }
            '"' => self.lex_string(line)?,
            '/' => self.lex_path(),
            '<' => self.lex_arrow(line)?,
            '|' => self.lex_oror(line)?,
            '?' => self.lex_coalesce(line)?,
            c if c == '-' || c.is_ascii_digit() => self.lex_number(line)?,
            c if c.is_alphabetic() || c == '_' => self.lex_word(),
            other => {
                return Err(CompileError::SyntaxError {
                    line,
                    message: format!("unexpected character `{other}`"),
                })
            }
        };
        Ok(Token::new(kind, line))
    }

    fn lex_string(&mut self, line: usize) -> Result<TokenKind, CompileError> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(CompileError::SyntaxError {
                        line,
                        message: "unterminated string literal".into(),
                    })
                }
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some(other) => value.push(other),
                    None => {
                        return Err(CompileError::SyntaxError {
                            line,
                            message: "unterminated escape sequence".into(),
                        })
                    }
                },
                Some(c) => value.push(c),
            }
        }
        Ok(TokenKind::String(value))
    }

    fn lex_path(&mut self) -> TokenKind {
        let mut value = String::new();
        value.push(self.bump().expect("caller checked '/'"));
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || matches!(c, '/' | '_' | '-' | '{' | '}' | '.') {
                value.push(self.bump().unwrap());
            } else {
                break;
            }
        }
        TokenKind::Path(value)
    }

    fn lex_arrow(&mut self, line: usize) -> Result<TokenKind, CompileError> {
        self.bump(); // '<'
        if self.peek_char() != Some('-') {
            return Err(CompileError::SyntaxError {
                line,
                message: "expected `<-` or `<-!`".into(),
            });
        }
        self.bump(); // '-'
        if self.peek_char() == Some('!') {
            self.bump();
            Ok(TokenKind::ForceArrow)
        } else {
            Ok(TokenKind::Arrow)
        }
    }

    fn lex_oror(&mut self, line: usize) -> Result<TokenKind, CompileError> {
        self.bump();
        if self.peek_char() == Some('|') {
            self.bump();
            Ok(TokenKind::OrOr)
        } else {
            Err(CompileError::SyntaxError {
                line,
                message: "expected `||`".into(),
            })
        }
    }

    fn lex_coalesce(&mut self, line: usize) -> Result<TokenKind, CompileError> {
        self.bump();
        if self.peek_char() == Some('?') {
            self.bump();
            Ok(TokenKind::QuestionQuestion)
        } else {
            Err(CompileError::SyntaxError {
                line,
                message: "expected `??`".into(),
            })
        }
    }

    fn lex_number(&mut self, line: usize) -> Result<TokenKind, CompileError> {
        let mut text = String::new();
        if self.peek_char() == Some('-') {
            text.push(self.bump().unwrap());
        }
        if !matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            return Err(CompileError::SyntaxError {
                line,
                message: "malformed number literal".into(),
            });
        }
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                text.push(self.bump().unwrap());
            } else {
                break;
            }
        }
        if self.peek_char() == Some('.') {
            // Only consume as a fraction if followed by a digit -- `1.field` is
            // a number token followed by a dotted path, not `1.` + `field`.
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if matches!(lookahead.peek(), Some((_, d)) if d.is_ascii_digit()) {
                text.push(self.bump().unwrap());
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_digit() {
                        text.push(self.bump().unwrap());
                    } else {
                        break;
                    }
                }
            }
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            let exp_ok = match lookahead.peek() {
                Some((_, '+')) | Some((_, '-')) => {
                    let mut la2 = lookahead.clone();
                    la2.next();
                    matches!(la2.peek(), Some((_, d)) if d.is_ascii_digit())
                }
                Some((_, d)) if d.is_ascii_digit() => true,
                _ => false,
            };
            if exp_ok {
                text.push(self.bump().unwrap());
                if matches!(self.peek_char(), Some('+') | Some('-')) {
                    text.push(self.bump().unwrap());
                }
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_digit() {
                        text.push(self.bump().unwrap());
                    } else {
                        break;
                    }
                }
            }
        }
        Ok(TokenKind::Number(text))
    }

    fn lex_word(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                text.push(self.bump().unwrap());
            } else {
                break;
            }
        }
        match text.as_str() {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            "null" => TokenKind::Null,
            _ => match Keyword::lookup(&text) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Ident(text),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_version_header() {
        let toks = kinds("version 1.4");
        assert_eq!(
            toks,
            vec![
                TokenKind::Keyword(Keyword::Version),
                TokenKind::Number("1.4".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn keyword_does_not_match_longer_identifier_prefix() {
        let toks = kinds("tools");
        assert_eq!(toks, vec![TokenKind::Ident("tools".into()), TokenKind::Eof]);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let toks = kinds("TOOL Tool tool");
        assert_eq!(
            toks,
            vec![
                TokenKind::Keyword(Keyword::Tool),
                TokenKind::Keyword(Keyword::Tool),
                TokenKind::Keyword(Keyword::Tool),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let toks = kinds("# a comment\nversion 1.4 # trailing\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Keyword(Keyword::Version),
                TokenKind::Number("1.4".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lexes_operators() {
        let toks = kinds("<- <-! || ?? { } [ ] = . : ,");
        assert_eq!(
            toks,
            vec![
                TokenKind::Arrow,
                TokenKind::ForceArrow,
                TokenKind::OrOr,
                TokenKind::QuestionQuestion,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Equals,
                TokenKind::Dot,
                TokenKind::Colon,
                TokenKind::Comma,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_string_with_escapes() {
        let toks = kinds(r#""hi\n\"there\"""#);
        assert_eq!(
            toks,
            vec![TokenKind::String("hi\n\"there\"".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn lexes_negative_and_exponent_numbers() {
        let toks = kinds("-3 1.5e10 2E-3");
        assert_eq!(
            toks,
            vec![
                TokenKind::Number("-3".into()),
                TokenKind::Number("1.5e10".into()),
                TokenKind::Number("2E-3".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_then_dotted_path_does_not_eat_the_dot() {
        // `1.field` should not occur in real source, but a plain integer
        // followed by `.name` (as in `o.label`) must not be misread as one
        // fractional number.
        let toks = kinds("o.label");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("o".into()),
                TokenKind::Dot,
                TokenKind::Ident("label".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_path_literal() {
        let toks = kinds("/users/{id}");
        assert_eq!(
            toks,
            vec![TokenKind::Path("/users/{id}".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn unexpected_character_is_a_syntax_error() {
        let err = Lexer::new("@").tokenize().unwrap_err();
        assert!(matches!(err, CompileError::SyntaxError { line: 1, .. }));
    }
}
