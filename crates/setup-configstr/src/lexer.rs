//! Configuration-string lexer: splits `KEY=VALUE&KEY=VALUE...` into tokens.
//!
//! The lexer only finds segment boundaries and key/value splits and records
//! byte positions. Structural checks happen in the request/response parsers.

use crate::error::{ConfigError, ConfigResult};
use crate::token::Token;

pub struct Lexer<'src> {
    source: &'src str,
    pos: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self { source, pos: 0 }
    }

    /// Lex the whole string. Empty segments (`&&`, leading or trailing `&`)
    /// are skipped; an empty key before `=` is an error.
    pub fn lex(mut self) -> ConfigResult<Vec<Token<'src>>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> ConfigResult<Option<Token<'src>>> {
        let bytes = self.source.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos] == b'&' {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return Ok(None);
        }

        let start = self.pos;
        let end = self.source[start..]
            .find('&')
            .map(|i| start + i)
            .unwrap_or(bytes.len());
        self.pos = end;

        let segment = &self.source[start..end];
        let token = match segment.find('=') {
            Some(0) => {
                return Err(ConfigError::Unexpected {
                    key: segment.to_string(),
                    position: start,
                })
            }
            Some(eq) => Token::new(&segment[..eq], Some(&segment[eq + 1..]), start),
            None => Token::new(segment, None, start),
        };
        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::KeyKind;

    #[test]
    fn test_splits_segments_with_positions() {
        let tokens = Lexer::new("GUID=00&NAME=&OFFSET=0001").lex().unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, KeyKind::Guid);
        assert_eq!(tokens[1].value, Some(""));
        assert_eq!(tokens[2].position, 14);
        assert_eq!(tokens[2].value, Some("0001"));
    }

    #[test]
    fn test_bare_labels() {
        let tokens = Lexer::new("&Alpha&Beta=00ff&").lex().unwrap();
        assert_eq!(tokens[0].kind, KeyKind::Label);
        assert_eq!(tokens[0].value, None);
        assert_eq!(tokens[1].key, "Beta");
        assert_eq!(tokens[1].value, Some("00ff"));
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = Lexer::new("GUID=00&=12").lex().unwrap_err();
        assert_eq!(err.position(), Some(8));
    }
}
