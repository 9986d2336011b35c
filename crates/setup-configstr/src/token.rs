//! Token types for the configuration-string lexer.
//!
//! A configuration string is a sequence of `&`-separated segments, each
//! either `KEY=VALUE` or a bare `KEY` (name/value requests).

use std::fmt;

/// Reserved keys of the configuration-string grammar.
pub const RESERVED_KEYS: &[&str] = &["GUID", "NAME", "PATH", "OFFSET", "WIDTH", "VALUE"];

/// Classification of a segment key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Guid,
    Name,
    Path,
    Offset,
    Width,
    Value,
    /// Any other key: an entry name in a name/value request or response.
    Label,
}

impl KeyKind {
    pub fn classify(key: &str) -> Self {
        match key {
            "GUID" => Self::Guid,
            "NAME" => Self::Name,
            "PATH" => Self::Path,
            "OFFSET" => Self::Offset,
            "WIDTH" => Self::Width,
            "VALUE" => Self::Value,
            _ => Self::Label,
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Guid => "GUID",
            Self::Name => "NAME",
            Self::Path => "PATH",
            Self::Offset => "OFFSET",
            Self::Width => "WIDTH",
            Self::Value => "VALUE",
            Self::Label => "label",
        };
        f.write_str(s)
    }
}

/// One `KEY[=VALUE]` segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: KeyKind,
    pub key: &'src str,
    pub value: Option<&'src str>,
    /// Byte offset of the key in the source string. Providers report
    /// failures as such an offset.
    pub position: usize,
}

impl<'src> Token<'src> {
    pub fn new(key: &'src str, value: Option<&'src str>, position: usize) -> Self {
        Self {
            kind: KeyKind::classify(key),
            key,
            value,
            position,
        }
    }
}
