//! XML encoding.
//!
//! Every value is an element named after its member; the root is `<object>`
//! and collection elements are `<item>`. Objects carry `type`, `assembly` and
//! an optional `id` attribute, collections a `count` attribute. Nulls are
//! `null="true"` and back-references `ref="id"`. Literals are element text,
//! floats use the decimal separator of the configured culture.
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <object type="Meeting" assembly="app" id="1">
//!   <title>sync</title>
//!   <tags count="1">
//!     <item>weekly</item>
//!   </tags>
//!   <room null="true"/>
//! </object>
//! ```

use std::io::{Read, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::context::SerializationContext;
use crate::error::{Error, Result};
use crate::info::TypeKey;
use crate::value::{Literal, ValueKind};

use super::{FormatReader, FormatWriter, ObjectHeader, Token};

const ROOT: &str = "object";
const ITEM: &str = "item";

const ATTR_TYPE: &str = "type";
const ATTR_ASSEMBLY: &str = "assembly";
const ATTR_ID: &str = "id";
const ATTR_COUNT: &str = "count";
const ATTR_NULL: &str = "null";
const ATTR_REF: &str = "ref";

fn xml_error(err: impl std::fmt::Display) -> Error {
    Error::format(format!("xml: {err}"))
}

// -----------------------------------------------------------------------------
// XmlWriter

/// Names of the elements currently open, kept in the context scratch bag.
#[derive(Default)]
struct OpenElements(Vec<String>);

/// Writes indented XML to a byte sink.
pub struct XmlWriter<W: Write> {
    writer: Writer<W>,
    started: bool,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: Writer::new_with_indent(out, b' ', 2),
            started: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn emit(&mut self, event: Event<'_>) -> Result<()> {
        if !self.started {
            self.started = true;
            self.writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
                .map_err(xml_error)?;
        }
        self.writer.write_event(event).map_err(xml_error)
    }

    fn element_name(cx: &mut SerializationContext<'_>, name: Option<&str>) -> String {
        let open = cx.scratch_mut().get_or_insert_with(OpenElements::default);
        match name {
            Some(name) => name.to_owned(),
            None if open.0.is_empty() => ROOT.to_owned(),
            None => ITEM.to_owned(),
        }
    }

    fn open(&mut self, cx: &mut SerializationContext<'_>, start: BytesStart<'_>) -> Result<()> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        self.emit(Event::Start(start))?;
        cx.scratch_mut()
            .get_or_insert_with(OpenElements::default)
            .0
            .push(name);
        Ok(())
    }

    fn close(&mut self, cx: &mut SerializationContext<'_>) -> Result<()> {
        let name = cx
            .scratch_mut()
            .get_or_insert_with(OpenElements::default)
            .0
            .pop()
            .ok_or_else(|| Error::format("unbalanced end of element"))?;
        self.emit(Event::End(BytesEnd::new(name)))
    }
}

impl<W: Write> FormatWriter for XmlWriter<W> {
    fn begin_object(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        header: &ObjectHeader,
    ) -> Result<()> {
        let tag = Self::element_name(cx, name);
        let mut start = BytesStart::new(tag);
        start.push_attribute((ATTR_TYPE, header.key.name()));
        start.push_attribute((ATTR_ASSEMBLY, header.key.assembly()));
        if let Some(id) = header.id {
            start.push_attribute((ATTR_ID, id.to_string().as_str()));
        }
        self.open(cx, start)
    }

    fn end_object(&mut self, cx: &mut SerializationContext<'_>) -> Result<()> {
        self.close(cx)
    }

    fn begin_collection(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        len: usize,
    ) -> Result<()> {
        let tag = Self::element_name(cx, name);
        let mut start = BytesStart::new(tag);
        start.push_attribute((ATTR_COUNT, len.to_string().as_str()));
        self.open(cx, start)
    }

    fn end_collection(&mut self, cx: &mut SerializationContext<'_>) -> Result<()> {
        self.close(cx)
    }

    fn write_literal(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        literal: &Literal,
    ) -> Result<()> {
        let tag = Self::element_name(cx, name);
        let text = match literal {
            Literal::Float(v) => cx.config().culture.format_float(*v),
            other => other.to_string(),
        };
        if text.is_empty() {
            return self.emit(Event::Empty(BytesStart::new(tag)));
        }
        self.emit(Event::Start(BytesStart::new(tag.as_str())))?;
        self.emit(Event::Text(BytesText::new(&text)))?;
        self.emit(Event::End(BytesEnd::new(tag)))
    }

    fn write_null(&mut self, cx: &mut SerializationContext<'_>, name: Option<&str>) -> Result<()> {
        let mut start = BytesStart::new(Self::element_name(cx, name));
        start.push_attribute((ATTR_NULL, "true"));
        self.emit(Event::Empty(start))
    }

    fn write_reference(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        id: u32,
    ) -> Result<()> {
        let mut start = BytesStart::new(Self::element_name(cx, name));
        start.push_attribute((ATTR_REF, id.to_string().as_str()));
        self.emit(Event::Empty(start))
    }

    fn flush(&mut self, cx: &mut SerializationContext<'_>) -> Result<()> {
        cx.scratch_mut().remove::<OpenElements>();
        let out = self.writer.get_mut();
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// XmlReader

#[derive(Debug)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(xml_error)?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn parse_attribute<T: core::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.attribute(key)
            .map(|text| {
                text.trim().parse().map_err(|_| {
                    Error::format(format!("invalid `{key}` attribute `{text}` on <{}>", self.name))
                })
            })
            .transpose()
    }
}

// Documents may nest far deeper than the call stack allows, so subtrees are
// flattened onto one list rather than dropped recursively.
impl Drop for Element {
    fn drop(&mut self) {
        let mut pending = core::mem::take(&mut self.children);
        while let Some(mut element) = pending.pop() {
            pending.append(&mut element.children);
        }
    }
}

/// Reads an XML document produced by [`XmlWriter`].
#[derive(Debug)]
pub struct XmlReader {
    pending: Option<Element>,
    frames: Vec<std::vec::IntoIter<Element>>,
}

impl XmlReader {
    pub fn from_reader(mut input: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::format(format!("XML document is not UTF-8: {e}")))?;
        Self::from_str(&text)
    }

    #[allow(clippy::should_implement_trait, reason = "fallible parse with crate error")]
    pub fn from_str(text: &str) -> Result<Self> {
        // Whitespace between elements lands in the text of objects and
        // collections, which is never read.
        let mut reader = Reader::from_str(text);

        let mut open: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            let event = reader.read_event().map_err(xml_error)?;
            match event {
                Event::Start(start) => open.push(Element::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Element::from_start(&start)?;
                    Self::attach(&mut open, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = open.pop().ok_or_else(|| Error::format("unbalanced XML"))?;
                    Self::attach(&mut open, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(current) = open.last_mut() {
                        current.text.push_str(&text.unescape().map_err(xml_error)?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = open.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !open.is_empty() {
            return Err(Error::format("unexpected end of XML document"));
        }
        let root = root.ok_or_else(|| Error::format("empty XML document"))?;
        Ok(Self {
            pending: Some(root),
            frames: Vec::new(),
        })
    }

    fn attach(open: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
        match open.last_mut() {
            Some(parent) => parent.children.push(element),
            None if root.is_none() => *root = Some(element),
            None => return Err(Error::format("more than one root element")),
        }
        Ok(())
    }

    fn take(&mut self) -> Result<Element> {
        self.pending
            .take()
            .ok_or_else(|| Error::format("no element at the current position"))
    }

    fn literal(mut element: Element, kind: &ValueKind, cx: &SerializationContext<'_>) -> Result<Literal> {
        let name = core::mem::take(&mut element.name);
        let text = core::mem::take(&mut element.text);
        let invalid = |what: &str| Error::format(format!("<{name}> does not hold {what}: `{text}`"));
        Ok(match kind.required() {
            ValueKind::Bool => match text.trim() {
                "true" => Literal::Bool(true),
                "false" => Literal::Bool(false),
                _ => return Err(invalid("a bool")),
            },
            ValueKind::Int => Literal::Int(text.trim().parse().map_err(|_| invalid("an integer"))?),
            ValueKind::UInt => {
                Literal::UInt(text.trim().parse().map_err(|_| invalid("an unsigned integer"))?)
            }
            ValueKind::Float => Literal::Float(
                cx.config()
                    .culture
                    .parse_float(&text)
                    .ok_or_else(|| invalid("a float"))?,
            ),
            ValueKind::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Literal::Char(c),
                    _ => return Err(invalid("a char")),
                }
            }
            ValueKind::Enum(_) => match text.trim().parse::<i64>() {
                Ok(discriminant) => Literal::Int(discriminant),
                Err(_) => Literal::Str(text.trim().to_owned()),
            },
            _ => Literal::Str(text),
        })
    }
}

impl FormatReader for XmlReader {
    fn read_token(&mut self, cx: &mut SerializationContext<'_>, kind: &ValueKind) -> Result<Token> {
        let mut element = self.take()?;

        if element.attribute(ATTR_NULL) == Some("true") {
            return Ok(Token::Null);
        }
        if let Some(id) = element.parse_attribute::<u32>(ATTR_REF)? {
            return Ok(Token::Reference(id));
        }
        if let Some(name) = element.attribute(ATTR_TYPE) {
            let assembly = element.attribute(ATTR_ASSEMBLY).unwrap_or_default();
            let header = ObjectHeader {
                key: TypeKey::new(assembly.to_owned(), name.to_owned()),
                id: element.parse_attribute(ATTR_ID)?,
            };
            self.frames.push(core::mem::take(&mut element.children).into_iter());
            return Ok(Token::Object(header));
        }
        if let Some(count) = element.parse_attribute::<usize>(ATTR_COUNT)? {
            self.frames.push(core::mem::take(&mut element.children).into_iter());
            return Ok(Token::Collection(count));
        }
        Self::literal(element, kind, cx).map(Token::Literal)
    }

    fn next_member(&mut self, _: &mut SerializationContext<'_>) -> Result<Option<String>> {
        let Some(children) = self.frames.last_mut() else {
            return Err(Error::format("member requested outside of an object"));
        };
        match children.next() {
            Some(child) => {
                let name = child.name.clone();
                self.pending = Some(child);
                Ok(Some(name))
            }
            None => {
                self.frames.pop();
                Ok(None)
            }
        }
    }

    fn next_element(&mut self, cx: &mut SerializationContext<'_>) -> Result<bool> {
        self.next_member(cx).map(|child| child.is_some())
    }

    fn skip_value(&mut self, _: &mut SerializationContext<'_>) -> Result<()> {
        self.take().map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::{XmlReader, XmlWriter};
    use crate::format::{FormatReader, FormatWriter, ObjectHeader, Token};
    use crate::value::{Literal, ValueKind};
    use crate::{Culture, Error, SerializationConfig, SerializationContext, TypeKey};

    /// An object whose `next` member nests `depth` levels deep.
    fn nested_document(depth: usize) -> String {
        let open = r#"<next type="Link" assembly="app">"#;
        let mut text = String::from(r#"<object type="Link" assembly="app">"#);
        text.push_str(&open.repeat(depth));
        text.push_str(&"</next>".repeat(depth));
        text.push_str("</object>");
        text
    }

    #[test]
    fn culture_and_escaping() {
        let config = SerializationConfig::default().with_culture(Culture::new("de-DE", ','));
        let mut cx = SerializationContext::new(&config);
        let header = ObjectHeader {
            key: TypeKey::new("app", "Note"),
            id: None,
        };

        let mut writer = XmlWriter::new(Vec::new());
        writer.begin_object(&mut cx, None, &header).unwrap();
        writer.write_literal(&mut cx, Some("weight"), &Literal::Float(2.5)).unwrap();
        writer.write_literal(&mut cx, Some("body"), &Literal::Str("a < b & c".into())).unwrap();
        writer.write_literal(&mut cx, Some("empty"), &Literal::Str(String::new())).unwrap();
        writer.begin_collection(&mut cx, Some("marks"), 2).unwrap();
        writer.write_literal(&mut cx, None, &Literal::Char('x')).unwrap();
        writer.write_null(&mut cx, None).unwrap();
        writer.end_collection(&mut cx).unwrap();
        writer.end_object(&mut cx).unwrap();
        writer.flush(&mut cx).unwrap();

        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert!(text.contains("<weight>2,5</weight>"), "{text}");
        assert!(text.contains("a &lt; b &amp; c"), "{text}");
        assert!(text.contains("<object type=\"Note\" assembly=\"app\">"), "{text}");

        let mut reader = XmlReader::from_str(&text).unwrap();
        let any = ValueKind::AnyModel;
        assert_eq!(reader.read_token(&mut cx, &any).unwrap(), Token::Object(header));

        assert_eq!(reader.next_member(&mut cx).unwrap().as_deref(), Some("weight"));
        assert_eq!(
            reader.read_token(&mut cx, &ValueKind::Float).unwrap(),
            Token::Literal(Literal::Float(2.5))
        );
        assert_eq!(reader.next_member(&mut cx).unwrap().as_deref(), Some("body"));
        assert_eq!(
            reader.read_token(&mut cx, &ValueKind::String).unwrap(),
            Token::Literal(Literal::Str("a < b & c".into()))
        );
        assert_eq!(reader.next_member(&mut cx).unwrap().as_deref(), Some("empty"));
        assert_eq!(
            reader.read_token(&mut cx, &ValueKind::String).unwrap(),
            Token::Literal(Literal::Str(String::new()))
        );
        assert_eq!(reader.next_member(&mut cx).unwrap().as_deref(), Some("marks"));
        assert_eq!(reader.read_token(&mut cx, &any).unwrap(), Token::Collection(2));
        assert!(reader.next_element(&mut cx).unwrap());
        assert_eq!(
            reader.read_token(&mut cx, &ValueKind::Char).unwrap(),
            Token::Literal(Literal::Char('x'))
        );
        assert!(reader.next_element(&mut cx).unwrap());
        assert_eq!(reader.read_token(&mut cx, &any).unwrap(), Token::Null);
        assert!(!reader.next_element(&mut cx).unwrap());
        assert_eq!(reader.next_member(&mut cx).unwrap(), None);
    }

    #[test]
    fn deep_documents_are_released() {
        let config = SerializationConfig::default();
        let mut cx = SerializationContext::new(&config);
        let text = nested_document(300_000);

        let reader = XmlReader::from_str(&text).unwrap();
        drop(reader);

        let mut reader = XmlReader::from_str(&text).unwrap();
        let any = ValueKind::AnyModel;
        assert!(matches!(reader.read_token(&mut cx, &any).unwrap(), Token::Object(_)));
        assert_eq!(reader.next_member(&mut cx).unwrap().as_deref(), Some("next"));
        reader.skip_value(&mut cx).unwrap();
        assert_eq!(reader.next_member(&mut cx).unwrap(), None);
    }

    #[test]
    fn non_utf8_input_is_a_format_error() {
        let bytes = b"<object type=\"Note\" assembly=\"app\">\xff\xfe</object>";
        let err = XmlReader::from_reader(&bytes[..]).unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "{err:?}");
    }
}
