//! Collection sources
//!
//! Two interchangeable strategies obtain content:
//!
//! - [`file`]: read a file in a declared text encoding, optionally renaming
//!   it afterwards so it is not collected twice
//! - [`command`]: run a trusted command line through the shell and capture
//!   its output
//!
//! Both produce a [`Payload`], which is always emitted as one unit.

pub mod command;
pub mod file;

use encoding_rs::Encoding;
use std::borrow::Cow;

/// Content produced by one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// File content, already validated as decodable in `encoding`
    Text {
        raw: Vec<u8>,
        encoding: &'static Encoding,
    },

    /// Captured standard output of a command
    Bytes(Vec<u8>),
}

impl Payload {
    /// The content exactly as produced by the source
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text { raw, .. } => raw,
            Self::Bytes(bytes) => bytes,
        }
    }

    /// The content as text, decoded on demand
    ///
    /// Command output that is not UTF-8 is converted lossily.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text { raw, encoding } => encoding.decode_without_bom_handling(raw).0,
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    /// Length of the raw content in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the collection yielded no content at all
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}
