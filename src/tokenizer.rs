//! JSON tokenizer producing spanned tokens.

use alloc::borrow::Cow;
use alloc::string::String;
use core::fmt;

use lexical_parse_float::FromLexical as _;
use lexical_parse_integer::FromLexical as _;

use crate::span::{Span, Spanned};

/// A single JSON token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'input> {
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// A string literal, unescaped. Borrowed when the literal had no escapes.
    String(Cow<'input, str>),
    /// A negative integer literal
    I64(i64),
    /// A non-negative integer literal
    U64(u64),
    /// A number with a fraction or exponent, or an integer too wide for 64 bits
    F64(f64),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// End of input
    Eof,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::Colon => write!(f, "':'"),
            Token::Comma => write!(f, "','"),
            Token::String(s) => write!(f, "string {s:?}"),
            Token::I64(n) => write!(f, "number {n}"),
            Token::U64(n) => write!(f, "number {n}"),
            Token::F64(n) => write!(f, "number {n}"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// Syntax error raised while tokenizing.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenError {
    /// What went wrong
    pub kind: TokenErrorKind,
    /// Where it went wrong
    pub span: Span,
}

/// The kinds of syntax error the tokenizer reports.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenErrorKind {
    /// A byte that cannot start or continue a token here
    UnexpectedCharacter(char),
    /// Input ended in the middle of a token; carries what was being read
    UnexpectedEof(&'static str),
    /// String contents are not valid UTF-8
    InvalidUtf8(String),
    /// A numeric literal that does not fit an `f64`
    NumberOutOfRange(String),
}

impl fmt::Display for TokenErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenErrorKind::UnexpectedCharacter(c) => write!(f, "unexpected character {c:?}"),
            TokenErrorKind::UnexpectedEof(ctx) => write!(f, "unexpected end of input {ctx}"),
            TokenErrorKind::InvalidUtf8(detail) => write!(f, "invalid UTF-8: {detail}"),
            TokenErrorKind::NumberOutOfRange(n) => write!(f, "number `{n}` out of range"),
        }
    }
}

type Result<T> = core::result::Result<T, TokenError>;

/// Splits JSON text into tokens.
pub struct Tokenizer<'input> {
    input: &'input [u8],
    pos: usize,
}

impl<'input> Tokenizer<'input> {
    /// Creates a tokenizer positioned at the start of `input`.
    pub fn new(input: &'input [u8]) -> Self {
        Tokenizer { input, pos: 0 }
    }

    /// Reads the next token. Returns [`Token::Eof`] repeatedly once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Spanned<Token<'input>>> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(&byte) = self.input.get(start) else {
            return Ok(Spanned::new(Token::Eof, Span::new(start, 0)));
        };

        let punct = match byte {
            b'{' => Some(Token::LBrace),
            b'}' => Some(Token::RBrace),
            b'[' => Some(Token::LBracket),
            b']' => Some(Token::RBracket),
            b':' => Some(Token::Colon),
            b',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = punct {
            self.pos += 1;
            return Ok(Spanned::new(token, Span::new(start, 1)));
        }

        match byte {
            b'"' => self.read_string(),
            b'-' | b'0'..=b'9' => self.read_number(),
            b't' => self.read_literal(b"true", Token::True),
            b'f' => self.read_literal(b"false", Token::False),
            b'n' => self.read_literal(b"null", Token::Null),
            _ => Err(self.unexpected_char_at(start)),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.input.get(self.pos) {
            self.pos += 1;
        }
    }

    fn unexpected_char_at(&self, pos: usize) -> TokenError {
        // decode the full character for the message, not just its first byte
        let rest = &self.input[pos..];
        let c = match core::str::from_utf8(&rest[..rest.len().min(4)]) {
            Ok(s) => s.chars().next(),
            Err(e) => core::str::from_utf8(&rest[..e.valid_up_to()])
                .ok()
                .and_then(|s| s.chars().next()),
        }
        .unwrap_or(char::REPLACEMENT_CHARACTER);
        TokenError {
            kind: TokenErrorKind::UnexpectedCharacter(c),
            span: Span::new(pos, c.len_utf8().min(rest.len()).max(1)),
        }
    }

    fn eof(&self, ctx: &'static str) -> TokenError {
        TokenError {
            kind: TokenErrorKind::UnexpectedEof(ctx),
            span: Span::new(self.input.len(), 0),
        }
    }

    fn read_literal(
        &mut self,
        expected: &'static [u8],
        token: Token<'input>,
    ) -> Result<Spanned<Token<'input>>> {
        let start = self.pos;
        for (i, &want) in expected.iter().enumerate() {
            match self.input.get(start + i) {
                Some(&got) if got == want => {}
                Some(_) => return Err(self.unexpected_char_at(start + i)),
                None => return Err(self.eof("in literal")),
            }
        }
        self.pos += expected.len();
        Ok(Spanned::new(token, Span::new(start, expected.len())))
    }

    fn read_string(&mut self) -> Result<Spanned<Token<'input>>> {
        let start = self.pos;
        self.pos += 1;
        let content_start = self.pos;

        // fast path: no escapes, borrow straight from the input
        loop {
            match self.input.get(self.pos) {
                None => return Err(self.eof("in string")),
                Some(b'"') => {
                    let raw = &self.input[content_start..self.pos];
                    self.pos += 1;
                    let s = core::str::from_utf8(raw).map_err(|e| TokenError {
                        kind: TokenErrorKind::InvalidUtf8(e.to_string()),
                        span: Span::new(content_start + e.valid_up_to(), 1),
                    })?;
                    return Ok(Spanned::new(
                        Token::String(Cow::Borrowed(s)),
                        Span::between(start, self.pos),
                    ));
                }
                Some(b'\\') => break,
                Some(&b) if b < 0x20 => return Err(self.unexpected_char_at(self.pos)),
                Some(_) => self.pos += 1,
            }
        }

        let mut buf: alloc::vec::Vec<u8> = self.input[content_start..self.pos].to_vec();
        loop {
            match self.input.get(self.pos) {
                None => return Err(self.eof("in string")),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let Some(&esc) = self.input.get(self.pos) else {
                        return Err(self.eof("in string escape"));
                    };
                    self.pos += 1;
                    let unescaped = match esc {
                        b'"' => '"',
                        b'\\' => '\\',
                        b'/' => '/',
                        b'b' => '\u{8}',
                        b'f' => '\u{c}',
                        b'n' => '\n',
                        b'r' => '\r',
                        b't' => '\t',
                        b'u' => self.read_unicode_escape()?,
                        _ => return Err(self.unexpected_char_at(self.pos - 1)),
                    };
                    let mut tmp = [0u8; 4];
                    buf.extend_from_slice(unescaped.encode_utf8(&mut tmp).as_bytes());
                }
                Some(&b) if b < 0x20 => return Err(self.unexpected_char_at(self.pos)),
                Some(&b) => {
                    buf.push(b);
                    self.pos += 1;
                }
            }
        }

        let s = String::from_utf8(buf).map_err(|e| TokenError {
            kind: TokenErrorKind::InvalidUtf8(e.utf8_error().to_string()),
            span: Span::between(start, self.pos),
        })?;
        Ok(Spanned::new(
            Token::String(Cow::Owned(s)),
            Span::between(start, self.pos),
        ))
    }

    fn read_hex4(&mut self) -> Result<u16> {
        let mut value: u16 = 0;
        for _ in 0..4 {
            let Some(&b) = self.input.get(self.pos) else {
                return Err(self.eof("in unicode escape"));
            };
            let digit = match b {
                b'0'..=b'9' => b - b'0',
                b'a'..=b'f' => b - b'a' + 10,
                b'A'..=b'F' => b - b'A' + 10,
                _ => return Err(self.unexpected_char_at(self.pos)),
            };
            value = (value << 4) | u16::from(digit);
            self.pos += 1;
        }
        Ok(value)
    }

    /// Reads the `XXXX` after `\u`, combining surrogate pairs.
    fn read_unicode_escape(&mut self) -> Result<char> {
        let escape_start = self.pos - 2;
        let high = self.read_hex4()?;
        let code = if (0xD800..0xDC00).contains(&high) {
            if self.input.get(self.pos) != Some(&b'\\') || self.input.get(self.pos + 1) != Some(&b'u')
            {
                return Err(TokenError {
                    kind: TokenErrorKind::InvalidUtf8("unpaired surrogate".into()),
                    span: Span::between(escape_start, self.pos),
                });
            }
            self.pos += 2;
            let low = self.read_hex4()?;
            if !(0xDC00..0xE000).contains(&low) {
                return Err(TokenError {
                    kind: TokenErrorKind::InvalidUtf8("invalid low surrogate".into()),
                    span: Span::between(escape_start, self.pos),
                });
            }
            0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00)
        } else {
            u32::from(high)
        };
        char::from_u32(code).ok_or_else(|| TokenError {
            kind: TokenErrorKind::InvalidUtf8("unpaired surrogate".into()),
            span: Span::between(escape_start, self.pos),
        })
    }

    fn take_digits(&mut self) -> usize {
        let from = self.pos;
        while let Some(b'0'..=b'9') = self.input.get(self.pos) {
            self.pos += 1;
        }
        self.pos - from
    }

    fn require_digits(&mut self) -> Result<()> {
        if self.take_digits() == 0 {
            return Err(match self.input.get(self.pos) {
                Some(_) => self.unexpected_char_at(self.pos),
                None => self.eof("in number"),
            });
        }
        Ok(())
    }

    fn read_number(&mut self) -> Result<Spanned<Token<'input>>> {
        let start = self.pos;
        let negative = self.input[start] == b'-';
        if negative {
            self.pos += 1;
        }
        self.require_digits()?;

        let mut integral = true;
        if self.input.get(self.pos) == Some(&b'.') {
            integral = false;
            self.pos += 1;
            self.require_digits()?;
        }
        if let Some(b'e' | b'E') = self.input.get(self.pos) {
            integral = false;
            self.pos += 1;
            if let Some(b'+' | b'-') = self.input.get(self.pos) {
                self.pos += 1;
            }
            self.require_digits()?;
        }

        let raw = &self.input[start..self.pos];
        let span = Span::between(start, self.pos);
        if integral {
            let parsed = if negative {
                i64::from_lexical(raw).ok().map(Token::I64)
            } else {
                u64::from_lexical(raw).ok().map(Token::U64)
            };
            if let Some(token) = parsed {
                return Ok(Spanned::new(token, span));
            }
        }

        let out_of_range = || TokenError {
            kind: TokenErrorKind::NumberOutOfRange(String::from_utf8_lossy(raw).into_owned()),
            span,
        };
        let n = f64::from_lexical(raw).map_err(|_| out_of_range())?;
        if !n.is_finite() {
            return Err(out_of_range());
        }
        Ok(Spanned::new(Token::F64(n), span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        let mut t = Tokenizer::new(input.as_bytes());
        let mut out = Vec::new();
        loop {
            let tok = t.next_token().unwrap().node;
            if tok == Token::Eof {
                return out;
            }
            out.push(tok);
        }
    }

    #[test]
    fn object_tokens() {
        assert_eq!(
            tokens(r#"{".tag": "file", "size": 12}"#),
            [
                Token::LBrace,
                Token::String(".tag".into()),
                Token::Colon,
                Token::String("file".into()),
                Token::Comma,
                Token::String("size".into()),
                Token::Colon,
                Token::U64(12),
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            tokens("-3 0 1.5 2e3 18446744073709551616"),
            [
                Token::I64(-3),
                Token::U64(0),
                Token::F64(1.5),
                Token::F64(2000.0),
                Token::F64(18446744073709551616.0),
            ]
        );
    }

    #[test]
    fn escapes_and_surrogates() {
        assert_eq!(
            tokens(r#""a\n\"b\" é 🎉""#),
            [Token::String("a\n\"b\" é 🎉".into())]
        );
    }

    #[test]
    fn bad_literal_points_at_offending_byte() {
        let err = Tokenizer::new(b"nul!").next_token().unwrap_err();
        assert_eq!(err.kind, TokenErrorKind::UnexpectedCharacter('!'));
        assert_eq!(err.span, Span::new(3, 1));
    }

    #[test]
    fn unterminated_string_is_eof() {
        let err = Tokenizer::new(b"\"hello").next_token().unwrap_err();
        assert!(matches!(err.kind, TokenErrorKind::UnexpectedEof(_)));
    }

    #[test]
    fn dangling_minus_is_rejected() {
        assert!(Tokenizer::new(b"-").next_token().is_err());
        assert!(Tokenizer::new(b"1.").next_token().is_err());
    }
}
