//! Configuration-string codec.
//!
//! Storages talk to their configuration provider in text: a request names
//! the elements (byte ranges or entry names) of one storage, a response
//! carries a hex value per element. This crate lexes, parses and renders
//! those strings and converts them to and from byte blocks.

pub mod block;
pub mod encoding;
mod error;
pub mod lexer;
pub mod request;
pub mod token;

pub use block::{apply_block_entries, block_to_config, config_to_block};
pub use error::{ConfigError, ConfigResult};
pub use lexer::Lexer;
pub use request::{ConfigElement, ConfigEntry, ConfigHeader, ConfigRequest, ConfigResp};
pub use token::{KeyKind, Token, RESERVED_KEYS};
