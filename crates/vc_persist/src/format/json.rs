//! JSON encoding.
//!
//! Objects are JSON objects whose first entries are `$type`, `$assembly` and,
//! for identity-bearing objects, `$id`. Back-references are `{"$ref": id}`.
//! Non-finite floats are written as the strings `NaN`, `Infinity` and
//! `-Infinity`.
//!
//! The writer builds the document in memory and emits it on flush; the reader
//! parses the whole input up front.

use std::io::{Read, Write};

use serde_json::{Map, Number, Value as Json};

use crate::context::SerializationContext;
use crate::error::{Error, Result};
use crate::info::TypeKey;
use crate::value::{Literal, ValueKind};

use super::{FormatReader, FormatWriter, ObjectHeader, Token};

const TYPE: &str = "$type";
const ASSEMBLY: &str = "$assembly";
const ID: &str = "$id";
const REF: &str = "$ref";

fn is_reserved(key: &str) -> bool {
    matches!(key, TYPE | ASSEMBLY | ID)
}

// -----------------------------------------------------------------------------
// JsonWriter

enum WriteFrame {
    Object(Option<String>, Map<String, Json>),
    Array(Option<String>, Vec<Json>),
}

/// Writes pretty-printed JSON to a byte sink.
pub struct JsonWriter<W> {
    out: W,
    frames: Vec<WriteFrame>,
    root: Option<Json>,
}

impl<W: Write> JsonWriter<W> {
    #[inline]
    pub fn new(out: W) -> Self {
        Self {
            out,
            frames: Vec::new(),
            root: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn put(&mut self, name: Option<&str>, value: Json) -> Result<()> {
        match self.frames.last_mut() {
            Some(WriteFrame::Object(_, map)) => {
                let name = name.ok_or_else(|| Error::format("object member without a name"))?;
                map.insert(name.to_owned(), value);
            }
            Some(WriteFrame::Array(_, items)) => items.push(value),
            None => self.root = Some(value),
        }
        Ok(())
    }

    fn literal(literal: &Literal) -> Json {
        match literal {
            Literal::Bool(v) => Json::Bool(*v),
            Literal::Int(v) => Json::Number((*v).into()),
            Literal::UInt(v) => Json::Number((*v).into()),
            Literal::Float(v) => match Number::from_f64(*v) {
                Some(n) => Json::Number(n),
                None if v.is_nan() => Json::String("NaN".to_owned()),
                None if *v > 0.0 => Json::String("Infinity".to_owned()),
                None => Json::String("-Infinity".to_owned()),
            },
            Literal::Char(v) => Json::String(v.to_string()),
            Literal::Str(v) => Json::String(v.clone()),
        }
    }
}

impl<W: Write> FormatWriter for JsonWriter<W> {
    fn begin_object(
        &mut self,
        _: &mut SerializationContext<'_>,
        name: Option<&str>,
        header: &ObjectHeader,
    ) -> Result<()> {
        let mut map = Map::new();
        map.insert(TYPE.to_owned(), Json::String(header.key.name().to_owned()));
        map.insert(ASSEMBLY.to_owned(), Json::String(header.key.assembly().to_owned()));
        if let Some(id) = header.id {
            map.insert(ID.to_owned(), Json::Number(id.into()));
        }
        self.frames.push(WriteFrame::Object(name.map(str::to_owned), map));
        Ok(())
    }

    fn end_object(&mut self, _: &mut SerializationContext<'_>) -> Result<()> {
        match self.frames.pop() {
            Some(WriteFrame::Object(name, map)) => self.put(name.as_deref(), Json::Object(map)),
            _ => Err(Error::format("unbalanced end of object")),
        }
    }

    fn begin_collection(
        &mut self,
        _: &mut SerializationContext<'_>,
        name: Option<&str>,
        len: usize,
    ) -> Result<()> {
        self.frames
            .push(WriteFrame::Array(name.map(str::to_owned), Vec::with_capacity(len)));
        Ok(())
    }

    fn end_collection(&mut self, _: &mut SerializationContext<'_>) -> Result<()> {
        match self.frames.pop() {
            Some(WriteFrame::Array(name, items)) => self.put(name.as_deref(), Json::Array(items)),
            _ => Err(Error::format("unbalanced end of collection")),
        }
    }

    fn write_literal(
        &mut self,
        _: &mut SerializationContext<'_>,
        name: Option<&str>,
        literal: &Literal,
    ) -> Result<()> {
        self.put(name, Self::literal(literal))
    }

    fn write_null(&mut self, _: &mut SerializationContext<'_>, name: Option<&str>) -> Result<()> {
        self.put(name, Json::Null)
    }

    fn write_reference(
        &mut self,
        _: &mut SerializationContext<'_>,
        name: Option<&str>,
        id: u32,
    ) -> Result<()> {
        let mut map = Map::new();
        map.insert(REF.to_owned(), Json::Number(id.into()));
        self.put(name, Json::Object(map))
    }

    fn flush(&mut self, _: &mut SerializationContext<'_>) -> Result<()> {
        if !self.frames.is_empty() {
            return Err(Error::format("flush with unclosed objects"));
        }
        let root = self.root.take().unwrap_or(Json::Null);
        serde_json::to_writer_pretty(&mut self.out, &root).map_err(Error::format)?;
        self.out.flush()?;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// JsonReader

enum ReadFrame {
    Object(serde_json::map::IntoIter),
    Array(std::vec::IntoIter<Json>),
}

/// Reads a JSON document produced by [`JsonWriter`].
pub struct JsonReader {
    pending: Option<Json>,
    frames: Vec<ReadFrame>,
}

impl JsonReader {
    pub fn from_reader(input: impl Read) -> Result<Self> {
        let document: Json = serde_json::from_reader(input).map_err(Error::format)?;
        Ok(Self::from_value(document))
    }

    pub fn from_value(document: Json) -> Self {
        Self {
            pending: Some(document),
            frames: Vec::new(),
        }
    }

    fn take(&mut self) -> Result<Json> {
        self.pending
            .take()
            .ok_or_else(|| Error::format("no value at the current position"))
    }

    fn number(n: &Number) -> Literal {
        if let Some(v) = n.as_i64() {
            Literal::Int(v)
        } else if let Some(v) = n.as_u64() {
            Literal::UInt(v)
        } else {
            Literal::Float(n.as_f64().unwrap_or(f64::NAN))
        }
    }

    fn string(text: String, kind: &ValueKind) -> Literal {
        if matches!(kind.required(), ValueKind::Float) {
            match text.as_str() {
                "NaN" => return Literal::Float(f64::NAN),
                "Infinity" => return Literal::Float(f64::INFINITY),
                "-Infinity" => return Literal::Float(f64::NEG_INFINITY),
                _ => {}
            }
        }
        Literal::Str(text)
    }

    fn header(map: &Map<String, Json>) -> Result<ObjectHeader> {
        let text = |key: &str| match map.get(key) {
            Some(Json::String(s)) => Ok(s.clone()),
            _ => Err(Error::format(format!("object without a `{key}` string"))),
        };
        let key = TypeKey::new(text(ASSEMBLY)?, text(TYPE)?);
        let id = match map.get(ID) {
            None => None,
            Some(Json::Number(n)) => Some(
                n.as_u64()
                    .and_then(|id| u32::try_from(id).ok())
                    .ok_or_else(|| Error::format(format!("invalid object id {n}")))?,
            ),
            Some(_) => return Err(Error::format("object id is not a number")),
        };
        Ok(ObjectHeader { key, id })
    }
}

impl FormatReader for JsonReader {
    fn read_token(&mut self, _: &mut SerializationContext<'_>, kind: &ValueKind) -> Result<Token> {
        Ok(match self.take()? {
            Json::Null => Token::Null,
            Json::Bool(v) => Token::Literal(Literal::Bool(v)),
            Json::Number(n) => Token::Literal(Self::number(&n)),
            Json::String(s) => Token::Literal(Self::string(s, kind)),
            Json::Array(items) => {
                let len = items.len();
                self.frames.push(ReadFrame::Array(items.into_iter()));
                Token::Collection(len)
            }
            Json::Object(map) => {
                if let Some(reference) = map.get(REF) {
                    let id = reference
                        .as_u64()
                        .and_then(|id| u32::try_from(id).ok())
                        .ok_or_else(|| Error::format(format!("invalid reference {reference}")))?;
                    return Ok(Token::Reference(id));
                }
                let header = Self::header(&map)?;
                self.frames.push(ReadFrame::Object(map.into_iter()));
                Token::Object(header)
            }
        })
    }

    fn next_member(&mut self, _: &mut SerializationContext<'_>) -> Result<Option<String>> {
        let Some(ReadFrame::Object(entries)) = self.frames.last_mut() else {
            return Err(Error::format("member requested outside of an object"));
        };
        for (key, value) in entries.by_ref() {
            if !is_reserved(&key) {
                self.pending = Some(value);
                return Ok(Some(key));
            }
        }
        self.frames.pop();
        Ok(None)
    }

    fn next_element(&mut self, _: &mut SerializationContext<'_>) -> Result<bool> {
        let Some(ReadFrame::Array(items)) = self.frames.last_mut() else {
            return Err(Error::format("element requested outside of a collection"));
        };
        match items.next() {
            Some(item) => {
                self.pending = Some(item);
                Ok(true)
            }
            None => {
                self.frames.pop();
                Ok(false)
            }
        }
    }

    fn skip_value(&mut self, _: &mut SerializationContext<'_>) -> Result<()> {
        self.take().map(drop)
    }
}
