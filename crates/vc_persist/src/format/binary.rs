//! Compact tagged binary encoding.
//!
//! A stream starts with the magic `VCPB` and a version byte, followed by the
//! root value. Every value starts with a one-byte tag; integers are
//! little-endian, strings are a `u32` byte length followed by UTF-8.
//!
//! | tag | value | payload |
//! |---|---|---|
//! | `0x00` | null | |
//! | `0x01` | back-reference | `u32` id |
//! | `0x02` | object | assembly, name, `u8` has-id, [`u32` id], members, `0xA1` |
//! | `0x03` | collection | `u32` length, elements |
//! | `0x10` | bool | `u8` |
//! | `0x11` | signed integer | `i64` |
//! | `0x12` | unsigned integer | `u64` |
//! | `0x13` | float | `f64` |
//! | `0x14` | char | `u32` scalar value |
//! | `0x15` | string | string |
//!
//! Each object member is `0xA0`, its name, then its value.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::context::SerializationContext;
use crate::error::{Error, Result};
use crate::info::TypeKey;
use crate::value::{Literal, ValueKind};

use super::{FormatReader, FormatWriter, ObjectHeader, Token};

const MAGIC: &[u8; 4] = b"VCPB";
const VERSION: u8 = 1;

const TAG_NULL: u8 = 0x00;
const TAG_REFERENCE: u8 = 0x01;
const TAG_OBJECT: u8 = 0x02;
const TAG_COLLECTION: u8 = 0x03;
const TAG_BOOL: u8 = 0x10;
const TAG_INT: u8 = 0x11;
const TAG_UINT: u8 = 0x12;
const TAG_FLOAT: u8 = 0x13;
const TAG_CHAR: u8 = 0x14;
const TAG_STR: u8 = 0x15;
const TAG_MEMBER: u8 = 0xA0;
const TAG_END: u8 = 0xA1;

// -----------------------------------------------------------------------------
// BinaryWriter

/// Writes the binary encoding to a byte sink.
pub struct BinaryWriter<W> {
    out: W,
    started: bool,
}

impl<W: Write> BinaryWriter<W> {
    #[inline]
    pub fn new(out: W) -> Self {
        Self { out, started: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn start(&mut self, name: Option<&str>) -> Result<()> {
        if !self.started {
            self.out.write_all(MAGIC)?;
            self.out.write_u8(VERSION)?;
            self.started = true;
        }
        if let Some(name) = name {
            self.out.write_u8(TAG_MEMBER)?;
            self.write_str(name)?;
        }
        Ok(())
    }

    fn write_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| Error::format("length exceeds u32"))?;
        self.out.write_u32::<LittleEndian>(len)?;
        Ok(())
    }

    fn write_str(&mut self, text: &str) -> Result<()> {
        self.write_len(text.len())?;
        self.out.write_all(text.as_bytes())?;
        Ok(())
    }
}

impl<W: Write> FormatWriter for BinaryWriter<W> {
    fn begin_object(
        &mut self,
        _: &mut SerializationContext<'_>,
        name: Option<&str>,
        header: &ObjectHeader,
    ) -> Result<()> {
        self.start(name)?;
        self.out.write_u8(TAG_OBJECT)?;
        self.write_str(header.key.assembly())?;
        self.write_str(header.key.name())?;
        match header.id {
            Some(id) => {
                self.out.write_u8(1)?;
                self.out.write_u32::<LittleEndian>(id)?;
            }
            None => self.out.write_u8(0)?,
        }
        Ok(())
    }

    fn end_object(&mut self, _: &mut SerializationContext<'_>) -> Result<()> {
        self.out.write_u8(TAG_END)?;
        Ok(())
    }

    fn begin_collection(
        &mut self,
        _: &mut SerializationContext<'_>,
        name: Option<&str>,
        len: usize,
    ) -> Result<()> {
        self.start(name)?;
        self.out.write_u8(TAG_COLLECTION)?;
        self.write_len(len)
    }

    fn end_collection(&mut self, _: &mut SerializationContext<'_>) -> Result<()> {
        Ok(())
    }

    fn write_literal(
        &mut self,
        _: &mut SerializationContext<'_>,
        name: Option<&str>,
        literal: &Literal,
    ) -> Result<()> {
        self.start(name)?;
        match literal {
            Literal::Bool(v) => {
                self.out.write_u8(TAG_BOOL)?;
                self.out.write_u8(u8::from(*v))?;
            }
            Literal::Int(v) => {
                self.out.write_u8(TAG_INT)?;
                self.out.write_i64::<LittleEndian>(*v)?;
            }
            Literal::UInt(v) => {
                self.out.write_u8(TAG_UINT)?;
                self.out.write_u64::<LittleEndian>(*v)?;
            }
            Literal::Float(v) => {
                self.out.write_u8(TAG_FLOAT)?;
                self.out.write_f64::<LittleEndian>(*v)?;
            }
            Literal::Char(v) => {
                self.out.write_u8(TAG_CHAR)?;
                self.out.write_u32::<LittleEndian>(u32::from(*v))?;
            }
            Literal::Str(v) => {
                self.out.write_u8(TAG_STR)?;
                self.write_str(v)?;
            }
        }
        Ok(())
    }

    fn write_null(&mut self, _: &mut SerializationContext<'_>, name: Option<&str>) -> Result<()> {
        self.start(name)?;
        self.out.write_u8(TAG_NULL)?;
        Ok(())
    }

    fn write_reference(
        &mut self,
        _: &mut SerializationContext<'_>,
        name: Option<&str>,
        id: u32,
    ) -> Result<()> {
        self.start(name)?;
        self.out.write_u8(TAG_REFERENCE)?;
        self.out.write_u32::<LittleEndian>(id)?;
        Ok(())
    }

    fn flush(&mut self, _: &mut SerializationContext<'_>) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// BinaryReader

/// Input that ends early or does not decode is malformed data; other I/O
/// failures pass through.
fn read_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::format("unexpected end of input"),
        io::ErrorKind::InvalidData => Error::format(e),
        _ => Error::Io(e),
    }
}

enum Frame {
    Object,
    Collection { remaining: usize },
}

/// Reads the binary encoding from a byte source, without buffering ahead.
pub struct BinaryReader<R> {
    input: R,
    started: bool,
    frames: Vec<Frame>,
}

impl<R: Read> BinaryReader<R> {
    #[inline]
    pub fn new(input: R) -> Self {
        Self {
            input,
            started: false,
            frames: Vec::new(),
        }
    }

    fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        let mut magic = [0; 4];
        self.input.read_exact(&mut magic).map_err(read_error)?;
        if &magic != MAGIC {
            return Err(Error::format("not a binary persist stream"));
        }
        let version = self.byte()?;
        if version != VERSION {
            return Err(Error::format(format!("unsupported binary version {version}")));
        }
        self.started = true;
        Ok(())
    }

    fn byte(&mut self) -> Result<u8> {
        self.input.read_u8().map_err(read_error)
    }

    fn word(&mut self) -> Result<u32> {
        self.input.read_u32::<LittleEndian>().map_err(read_error)
    }

    fn read_len(&mut self) -> Result<usize> {
        let len = self.word()?;
        usize::try_from(len).map_err(|_| Error::format("length exceeds usize"))
    }

    fn read_str(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let mut bytes = Vec::new();
        (&mut self.input)
            .take(len as u64)
            .read_to_end(&mut bytes)
            .map_err(read_error)?;
        if bytes.len() != len {
            return Err(Error::format("truncated string"));
        }
        String::from_utf8(bytes).map_err(|e| Error::format(format!("invalid UTF-8: {e}")))
    }
}

impl<R: Read> FormatReader for BinaryReader<R> {
    fn read_token(&mut self, _: &mut SerializationContext<'_>, _: &ValueKind) -> Result<Token> {
        self.start()?;
        let tag = self.byte()?;
        Ok(match tag {
            TAG_NULL => Token::Null,
            TAG_REFERENCE => Token::Reference(self.word()?),
            TAG_OBJECT => {
                let assembly = self.read_str()?;
                let name = self.read_str()?;
                let id = match self.byte()? {
                    0 => None,
                    1 => Some(self.word()?),
                    other => return Err(Error::format(format!("invalid id marker {other:#04x}"))),
                };
                self.frames.push(Frame::Object);
                Token::Object(ObjectHeader {
                    key: TypeKey::new(assembly, name),
                    id,
                })
            }
            TAG_COLLECTION => {
                let remaining = self.read_len()?;
                self.frames.push(Frame::Collection { remaining });
                Token::Collection(remaining)
            }
            TAG_BOOL => match self.byte()? {
                0 => Token::Literal(Literal::Bool(false)),
                1 => Token::Literal(Literal::Bool(true)),
                other => return Err(Error::format(format!("invalid bool {other:#04x}"))),
            },
            TAG_INT => {
                let v = self.input.read_i64::<LittleEndian>().map_err(read_error)?;
                Token::Literal(Literal::Int(v))
            }
            TAG_UINT => {
                let v = self.input.read_u64::<LittleEndian>().map_err(read_error)?;
                Token::Literal(Literal::UInt(v))
            }
            TAG_FLOAT => {
                let v = self.input.read_f64::<LittleEndian>().map_err(read_error)?;
                Token::Literal(Literal::Float(v))
            }
            TAG_CHAR => {
                let scalar = self.word()?;
                let c = char::from_u32(scalar)
                    .ok_or_else(|| Error::format(format!("invalid char {scalar:#x}")))?;
                Token::Literal(Literal::Char(c))
            }
            TAG_STR => Token::Literal(Literal::Str(self.read_str()?)),
            other => return Err(Error::format(format!("unknown tag {other:#04x}"))),
        })
    }

    fn next_member(&mut self, _: &mut SerializationContext<'_>) -> Result<Option<String>> {
        if !matches!(self.frames.last(), Some(Frame::Object)) {
            return Err(Error::format("member requested outside of an object"));
        }
        match self.byte()? {
            TAG_MEMBER => self.read_str().map(Some),
            TAG_END => {
                self.frames.pop();
                Ok(None)
            }
            other => Err(Error::format(format!("expected a member, found tag {other:#04x}"))),
        }
    }

    fn next_element(&mut self, _: &mut SerializationContext<'_>) -> Result<bool> {
        match self.frames.last_mut() {
            Some(Frame::Collection { remaining }) if *remaining > 0 => {
                *remaining -= 1;
                Ok(true)
            }
            Some(Frame::Collection { .. }) => {
                self.frames.pop();
                Ok(false)
            }
            _ => Err(Error::format("element requested outside of a collection")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BinaryReader, BinaryWriter};
    use crate::format::{FormatReader, FormatWriter, ObjectHeader, Token};
    use crate::value::{Literal, ValueKind};
    use crate::{Error, SerializationConfig, SerializationContext, TypeKey};

    /// A stream holding `depth` nested one-element collections around a null.
    fn nested_collections(depth: usize) -> Vec<u8> {
        let mut bytes = b"VCPB\x01".to_vec();
        for _ in 0..depth {
            bytes.extend_from_slice(&[0x03, 1, 0, 0, 0]);
        }
        bytes.push(0x00);
        bytes
    }

    #[test]
    fn token_stream() {
        let config = SerializationConfig::default();
        let mut cx = SerializationContext::new(&config);
        let header = ObjectHeader {
            key: TypeKey::new("app", "Item"),
            id: Some(1),
        };

        let mut writer = BinaryWriter::new(Vec::new());
        writer.begin_object(&mut cx, None, &header).unwrap();
        writer.write_literal(&mut cx, Some("label"), &Literal::Str("ä".into())).unwrap();
        writer.begin_collection(&mut cx, Some("tags"), 1).unwrap();
        writer.write_literal(&mut cx, None, &Literal::Char('x')).unwrap();
        writer.end_collection(&mut cx).unwrap();
        writer.write_reference(&mut cx, Some("self"), 1).unwrap();
        writer.end_object(&mut cx).unwrap();
        writer.flush(&mut cx).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(&bytes[..5], b"VCPB\x01");

        let any = ValueKind::AnyModel;
        let mut reader = BinaryReader::new(bytes.as_slice());
        assert_eq!(reader.read_token(&mut cx, &any).unwrap(), Token::Object(header));
        assert_eq!(reader.next_member(&mut cx).unwrap().as_deref(), Some("label"));
        assert_eq!(
            reader.read_token(&mut cx, &any).unwrap(),
            Token::Literal(Literal::Str("ä".into()))
        );
        assert_eq!(reader.next_member(&mut cx).unwrap().as_deref(), Some("tags"));
        reader.skip_value(&mut cx).unwrap();
        assert_eq!(reader.next_member(&mut cx).unwrap().as_deref(), Some("self"));
        assert_eq!(reader.read_token(&mut cx, &any).unwrap(), Token::Reference(1));
        assert_eq!(reader.next_member(&mut cx).unwrap(), None);
    }

    #[test]
    fn rejects_foreign_data() {
        let config = SerializationConfig::default();
        let mut cx = SerializationContext::new(&config);

        let mut reader = BinaryReader::new(&b"{\"json\": true}"[..]);
        let err = reader.read_token(&mut cx, &ValueKind::AnyModel).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn skipping_is_bounded_by_max_depth() {
        let config = SerializationConfig::default().with_max_depth(16);
        let mut cx = SerializationContext::new(&config);

        let bytes = nested_collections(16);
        let mut reader = BinaryReader::new(bytes.as_slice());
        reader.skip_value(&mut cx).unwrap();

        let bytes = nested_collections(17);
        let mut reader = BinaryReader::new(bytes.as_slice());
        let err = reader.skip_value(&mut cx).unwrap_err();
        assert!(matches!(err, Error::DepthExceeded { max_depth: 16, .. }));

        // Far deeper than the call stack could follow.
        let bytes = nested_collections(1_000_000);
        let mut reader = BinaryReader::new(bytes.as_slice());
        let err = reader.skip_value(&mut cx).unwrap_err();
        assert!(matches!(err, Error::DepthExceeded { .. }));
    }

    #[test]
    fn truncated_input_is_a_format_error() {
        let config = SerializationConfig::default();
        let mut cx = SerializationContext::new(&config);
        let any = ValueKind::AnyModel;

        let header = ObjectHeader {
            key: TypeKey::new("app", "Item"),
            id: None,
        };

        let mut writer = BinaryWriter::new(Vec::new());
        writer.begin_object(&mut cx, None, &header).unwrap();
        writer.write_literal(&mut cx, Some("n"), &Literal::UInt(5)).unwrap();
        writer.end_object(&mut cx).unwrap();
        let mut bytes = writer.into_inner();
        bytes.truncate(bytes.len() - 3);

        let mut reader = BinaryReader::new(bytes.as_slice());
        reader.read_token(&mut cx, &any).unwrap();
        assert_eq!(reader.next_member(&mut cx).unwrap().as_deref(), Some("n"));
        let err = reader.read_token(&mut cx, &any).unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "{err:?}");

        let mut reader = BinaryReader::new(&b"VC"[..]);
        let err = reader.read_token(&mut cx, &any).unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "{err:?}");
    }
}
