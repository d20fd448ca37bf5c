//! Wire-format backends.
//!
//! The engine drives a [`FormatWriter`] with a flat sequence of calls
//! (objects, collections, literals, nulls and back-references) and pulls
//! [`Token`]s from a [`FormatReader`]. Backends know nothing about models.
//!
//! | format | writer | reader | feature |
//! |---|---|---|---|
//! | binary | [`BinaryWriter`] | [`BinaryReader`] | `binary` |
//! | JSON | [`JsonWriter`] | [`JsonReader`] | `json` |
//! | XML | [`XmlWriter`] | [`XmlReader`] | `xml` |

use std::io::{Read, Write};

use crate::context::SerializationContext;
use crate::error::{Error, Result};
use crate::info::TypeKey;
use crate::value::{Literal, ValueKind};

// -----------------------------------------------------------------------------
// Modules

#[cfg(feature = "binary")]
mod binary;
#[cfg(feature = "json")]
mod json;
#[cfg(feature = "xml")]
mod xml;

// -----------------------------------------------------------------------------
// Exports

#[cfg(feature = "binary")]
pub use binary::{BinaryReader, BinaryWriter};
#[cfg(feature = "json")]
pub use json::{JsonReader, JsonWriter};
#[cfg(feature = "xml")]
pub use xml::{XmlReader, XmlWriter};

// -----------------------------------------------------------------------------
// Tokens

/// What starts an object in a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    pub key: TypeKey,
    /// Set for identity-bearing objects in graph mode; back-references name it.
    pub id: Option<u32>,
}

/// The next value in a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Null,
    /// Back-reference to the object with this id.
    Reference(u32),
    /// An object starts; its members follow, see [`FormatReader::next_member`].
    Object(ObjectHeader),
    /// A collection starts; its elements follow, see [`FormatReader::next_element`].
    Collection(usize),
    Literal(Literal),
}

// -----------------------------------------------------------------------------
// FormatWriter

/// Output side of a backend.
///
/// `name` is the member name for values written inside an object, and `None`
/// for the root value and for collection elements.
pub trait FormatWriter {
    fn begin_object(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        header: &ObjectHeader,
    ) -> Result<()>;

    fn end_object(&mut self, cx: &mut SerializationContext<'_>) -> Result<()>;

    fn begin_collection(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        len: usize,
    ) -> Result<()>;

    fn end_collection(&mut self, cx: &mut SerializationContext<'_>) -> Result<()>;

    fn write_literal(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        literal: &Literal,
    ) -> Result<()>;

    fn write_null(&mut self, cx: &mut SerializationContext<'_>, name: Option<&str>) -> Result<()>;

    fn write_reference(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        id: u32,
    ) -> Result<()>;

    /// Completes the output. Called once, after the root value.
    fn flush(&mut self, cx: &mut SerializationContext<'_>) -> Result<()>;
}

// -----------------------------------------------------------------------------
// FormatReader

/// Input side of a backend.
///
/// Reading is driven by the caller: after [`Token::Object`] it calls
/// `next_member` until `None`, after [`Token::Collection`] it calls
/// `next_element` until `false`, reading (or skipping) one value each time.
pub trait FormatReader {
    /// Reads the token of the current value.
    ///
    /// `kind` is the declared type; text formats use it to parse literals.
    fn read_token(&mut self, cx: &mut SerializationContext<'_>, kind: &ValueKind) -> Result<Token>;

    /// Advances to the next member of the current object, `None` at its end.
    fn next_member(&mut self, cx: &mut SerializationContext<'_>) -> Result<Option<String>>;

    /// Advances to the next element of the current collection, `false` at its end.
    fn next_element(&mut self, cx: &mut SerializationContext<'_>) -> Result<bool>;

    /// Skips the current value including everything nested in it.
    ///
    /// Nesting below the current depth counts against `max_depth`, failing
    /// with [`Error::DepthExceeded`] instead of descending further.
    fn skip_value(&mut self, cx: &mut SerializationContext<'_>) -> Result<()> {
        // Containers entered while skipping, `true` for objects.
        let mut open: Vec<bool> = Vec::new();
        loop {
            match self.read_token(cx, &ValueKind::AnyModel)? {
                Token::Object(_) => open.push(true),
                Token::Collection(_) => open.push(false),
                Token::Null | Token::Reference(_) | Token::Literal(_) => {}
            }
            let max_depth = cx.config().max_depth;
            if cx.depth() + open.len() > max_depth {
                return Err(Error::DepthExceeded {
                    max_depth,
                    member: None,
                });
            }

            loop {
                let Some(&object) = open.last() else {
                    return Ok(());
                };
                let more = if object {
                    self.next_member(cx)?.is_some()
                } else {
                    self.next_element(cx)?
                };
                if more {
                    break;
                }
                open.pop();
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Format

/// Selects a built-in backend for the stream-level API of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Format {
    #[cfg(feature = "binary")]
    Binary,
    #[cfg(feature = "json")]
    Json,
    #[cfg(feature = "xml")]
    Xml,
}

impl Format {
    pub fn writer<'w>(self, output: impl Write + 'w) -> Box<dyn FormatWriter + 'w> {
        match self {
            #[cfg(feature = "binary")]
            Self::Binary => Box::new(BinaryWriter::new(output)),
            #[cfg(feature = "json")]
            Self::Json => Box::new(JsonWriter::new(output)),
            #[cfg(feature = "xml")]
            Self::Xml => Box::new(XmlWriter::new(output)),
        }
    }

    /// Text formats parse the whole input here.
    pub fn reader<'r>(self, input: impl Read + 'r) -> Result<Box<dyn FormatReader + 'r>> {
        Ok(match self {
            #[cfg(feature = "binary")]
            Self::Binary => Box::new(BinaryReader::new(input)),
            #[cfg(feature = "json")]
            Self::Json => Box::new(JsonReader::from_reader(input)?),
            #[cfg(feature = "xml")]
            Self::Xml => Box::new(XmlReader::from_reader(input)?),
        })
    }
}
