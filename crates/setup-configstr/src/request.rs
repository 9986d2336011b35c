//! Element-addressed configuration requests and responses.
//!
//! ```text
//! request (block):  GUID=..&NAME=..&PATH=..&OFFSET=0000&WIDTH=0002&OFFSET=...
//! request (names):  GUID=..&NAME=..&PATH=..&Alpha&Beta
//! response (block): GUID=..&NAME=..&PATH=..&OFFSET=0000&WIDTH=0002&VALUE=0005
//! response (names): GUID=..&NAME=..&PATH=..&Alpha=0005&Beta=0041
//! ```

use crate::encoding::{decode_guid, decode_utf16, encode_guid, encode_utf16};
use crate::error::{ConfigError, ConfigResult};
use crate::lexer::Lexer;
use crate::token::{KeyKind, Token};
use std::fmt;
use uuid::Uuid;

// ══════════════════════════════════════════════════════════════════════════════
// Header
// ══════════════════════════════════════════════════════════════════════════════

/// `GUID=..&NAME=..&PATH=..` prefix identifying one storage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigHeader {
    pub guid: Uuid,
    pub name: String,
    pub path: Vec<u8>,
}

impl ConfigHeader {
    pub fn new(guid: Uuid, name: impl Into<String>) -> Self {
        Self {
            guid,
            name: name.into(),
            path: Vec::new(),
        }
    }

    /// Whether two headers address the same storage.
    pub fn matches(&self, other: &ConfigHeader) -> bool {
        self.guid == other.guid && self.name == other.name
    }

    /// Parse the three header tokens, returning the header and the number
    /// of tokens consumed.
    fn parse(tokens: &[Token<'_>]) -> ConfigResult<(Self, usize)> {
        let guid = match tokens.first() {
            Some(t) if t.kind == KeyKind::Guid => decode_guid(t.value.unwrap_or(""), t.position)?,
            _ => return Err(ConfigError::MissingHeader { key: "GUID" }),
        };
        let name = match tokens.get(1) {
            Some(t) if t.kind == KeyKind::Name => decode_utf16(t.value.unwrap_or(""), t.position)?,
            _ => return Err(ConfigError::MissingHeader { key: "NAME" }),
        };
        let path = match tokens.get(2) {
            Some(t) if t.kind == KeyKind::Path => hex::decode(t.value.unwrap_or(""))
                .map_err(|_| ConfigError::InvalidHex {
                    position: t.position,
                })?,
            _ => return Err(ConfigError::MissingHeader { key: "PATH" }),
        };
        Ok((Self { guid, name, path }, 3))
    }
}

impl fmt::Display for ConfigHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GUID={}&NAME={}&PATH={}",
            encode_guid(&self.guid),
            encode_utf16(&self.name),
            hex::encode(&self.path)
        )
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Elements
// ══════════════════════════════════════════════════════════════════════════════

/// One addressable element of a storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigElement {
    Block { offset: u16, width: u16 },
    Name(String),
}

impl ConfigElement {
    pub fn block(offset: u16, width: u16) -> Self {
        Self::Block { offset, width }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Whether two elements address at least one common byte / entry.
    pub fn overlaps(&self, other: &ConfigElement) -> bool {
        match (self, other) {
            (
                Self::Block { offset, width },
                Self::Block {
                    offset: o2,
                    width: w2,
                },
            ) => {
                let (a0, a1) = (u32::from(*offset), u32::from(*offset) + u32::from(*width));
                let (b0, b1) = (u32::from(*o2), u32::from(*o2) + u32::from(*w2));
                a0 < b1 && b0 < a1
            }
            (Self::Name(a), Self::Name(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ConfigElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block { offset, width } => write!(f, "OFFSET={offset:04x}&WIDTH={width:04x}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Request
// ══════════════════════════════════════════════════════════════════════════════

/// A set of storage elements, in insertion order, without duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigRequest {
    pub header: ConfigHeader,
    elements: Vec<ConfigElement>,
}

impl ConfigRequest {
    pub fn new(header: ConfigHeader) -> Self {
        Self {
            header,
            elements: Vec::new(),
        }
    }

    /// Add an element. Returns `false` if it was already present.
    pub fn push(&mut self, element: ConfigElement) -> bool {
        if self.elements.contains(&element) {
            return false;
        }
        self.elements.push(element);
        true
    }

    /// Add every element of `other` not yet present.
    pub fn merge(&mut self, other: &ConfigRequest) {
        for element in &other.elements {
            self.push(element.clone());
        }
    }

    pub fn contains(&self, element: &ConfigElement) -> bool {
        self.elements.contains(element)
    }

    pub fn elements(&self) -> &[ConfigElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn retain(&mut self, keep: impl FnMut(&ConfigElement) -> bool) {
        self.elements.retain(keep);
    }

    /// A copy of this request restricted to elements satisfying `keep`.
    pub fn filtered(&self, keep: impl Fn(&ConfigElement) -> bool) -> ConfigRequest {
        ConfigRequest {
            header: self.header.clone(),
            elements: self.elements.iter().filter(|e| keep(e)).cloned().collect(),
        }
    }

    pub fn parse(text: &str) -> ConfigResult<Self> {
        let tokens = Lexer::new(text).lex()?;
        let (header, mut i) = ConfigHeader::parse(&tokens)?;
        let mut request = Self::new(header);
        while i < tokens.len() {
            let token = &tokens[i];
            match token.kind {
                KeyKind::Offset => {
                    let offset = parse_u16(token)?;
                    let width_token = tokens
                        .get(i + 1)
                        .filter(|t| t.kind == KeyKind::Width)
                        .ok_or_else(|| unexpected(tokens.get(i + 1), token.position))?;
                    let width = parse_u16(width_token)?;
                    request.push(ConfigElement::block(offset, width));
                    i += 2;
                }
                KeyKind::Label if token.value.is_none() => {
                    request.push(ConfigElement::name(token.key));
                    i += 1;
                }
                _ => return Err(unexpected(Some(token), token.position)),
            }
        }
        Ok(request)
    }
}

impl fmt::Display for ConfigRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)?;
        for element in &self.elements {
            write!(f, "&{element}")?;
        }
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Response
// ══════════════════════════════════════════════════════════════════════════════

/// One element of a response together with its hex value text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub element: ConfigElement,
    pub value: String,
    /// Byte offset of the element in the response text.
    pub position: usize,
}

/// A parsed `<ConfigResp>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigResp {
    pub header: ConfigHeader,
    pub entries: Vec<ConfigEntry>,
}

impl ConfigResp {
    pub fn new(header: ConfigHeader) -> Self {
        Self {
            header,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, element: ConfigElement, value: impl Into<String>) {
        self.entries.push(ConfigEntry {
            element,
            value: value.into(),
            position: 0,
        });
    }

    /// Value text recorded for `element`, if any.
    pub fn value_of(&self, element: &ConfigElement) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| &e.element == element)
            .map(|e| e.value.as_str())
    }

    /// Render to text, recording each entry's position as it is written.
    pub fn render(&mut self) -> String {
        let mut out = self.header.to_string();
        for entry in &mut self.entries {
            out.push('&');
            entry.position = out.len();
            match &entry.element {
                ConfigElement::Block { .. } => {
                    out.push_str(&format!("{}&VALUE={}", entry.element, entry.value));
                }
                ConfigElement::Name(name) => {
                    out.push_str(&format!("{name}={}", entry.value));
                }
            }
        }
        out
    }

    pub fn parse(text: &str) -> ConfigResult<Self> {
        let tokens = Lexer::new(text).lex()?;
        let (header, mut i) = ConfigHeader::parse(&tokens)?;
        let mut resp = Self::new(header);
        while i < tokens.len() {
            let token = &tokens[i];
            match token.kind {
                KeyKind::Offset => {
                    let offset = parse_u16(token)?;
                    let width_token = tokens
                        .get(i + 1)
                        .filter(|t| t.kind == KeyKind::Width)
                        .ok_or_else(|| unexpected(tokens.get(i + 1), token.position))?;
                    let width = parse_u16(width_token)?;
                    let value_token = tokens
                        .get(i + 2)
                        .filter(|t| t.kind == KeyKind::Value)
                        .ok_or_else(|| unexpected(tokens.get(i + 2), token.position))?;
                    resp.entries.push(ConfigEntry {
                        element: ConfigElement::block(offset, width),
                        value: value_token.value.unwrap_or("").to_string(),
                        position: token.position,
                    });
                    i += 3;
                }
                KeyKind::Label => {
                    let value = token.value.ok_or_else(|| unexpected(Some(token), token.position))?;
                    resp.entries.push(ConfigEntry {
                        element: ConfigElement::name(token.key),
                        value: value.to_string(),
                        position: token.position,
                    });
                    i += 1;
                }
                _ => return Err(unexpected(Some(token), token.position)),
            }
        }
        Ok(resp)
    }

    /// Index of the first entry at or after byte offset `progress`.
    pub fn entry_at(&self, progress: usize) -> Option<usize> {
        self.entries.iter().position(|e| e.position >= progress)
    }
}

impl fmt::Display for ConfigResp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut copy = self.clone();
        f.write_str(&copy.render())
    }
}

fn parse_u16(token: &Token<'_>) -> ConfigResult<u16> {
    token
        .value
        .and_then(|v| u16::from_str_radix(v, 16).ok())
        .ok_or(ConfigError::InvalidHex {
            position: token.position,
        })
}

fn unexpected(token: Option<&Token<'_>>, fallback: usize) -> ConfigError {
    match token {
        Some(t) => ConfigError::Unexpected {
            key: t.key.to_string(),
            position: t.position,
        },
        None => ConfigError::Unexpected {
            key: String::new(),
            position: fallback,
        },
    }
}
