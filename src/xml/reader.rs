/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::xml::{XmlNamespace, XmlNodeType};
use crate::Error;

/// The state of a single node consumed from the stream.
#[derive(Clone, Debug, Default)]
struct Node {
    node_type: XmlNodeType,
    local_name: String,
    prefix: Option<String>,
    namespace_uri: Option<String>,
    is_empty_element: bool,
    text: String,

    /// All attributes of a start element, in document order, with their
    /// qualified names. Namespace declarations are included so subtrees can be
    /// re-materialized by `read_outer_xml`.
    attributes: Vec<(String, String)>,
}

impl Node {
    fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local_name),
            None => self.local_name.clone(),
        }
    }

    /// Whether this node is an element with the given local name in the given
    /// namespace.
    ///
    /// Namespaces are matched by URI where the stream bound one, and by
    /// conventional prefix otherwise.
    fn matches(&self, ns: XmlNamespace, local_name: &str) -> bool {
        if self.local_name != local_name {
            return false;
        }

        match ns.uri() {
            None => true,
            Some(uri) => match &self.namespace_uri {
                Some(bound) => bound == uri,
                None => self.prefix.as_deref() == ns.prefix(),
            },
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node_type {
            XmlNodeType::StartElement => write!(f, "start element <{}>", self.qualified_name()),
            XmlNodeType::EndElement => write!(f, "end element </{}>", self.qualified_name()),
            XmlNodeType::Text | XmlNodeType::CData => write!(f, "text {:?}", self.text),
            XmlNodeType::None => f.write_str("no node"),
        }
    }
}

/// A cursor-based pull reader over a forward-only XML byte stream.
///
/// The reader validates structural expectations as it goes: consuming
/// operations fail with [`Error::Deserialization`] when the stream doesn't
/// match the expected shape, and running out of input mid-read is always an
/// error rather than a sentinel.
///
/// Hardening: DOCTYPE declarations are rejected outright, entities beyond the
/// five predefined ones are never resolved, and comments and processing
/// instructions are skipped. Well-formedness of end tags is enforced by the
/// underlying reader.
///
/// The reader borrows its stream and never closes it.
pub struct XmlReader<'a> {
    inner: NsReader<Box<dyn BufRead + 'a>>,
    buf: Vec<u8>,
    current: Node,
    prev_node_type: XmlNodeType,
    peeked: Option<Node>,
    /// Synthetic end element queued after a self-closing start element.
    pending_end: Option<Node>,
    depth: usize,
    root_closed: bool,
    allow_fragments: bool,
}

impl<'a> XmlReader<'a> {
    /// Creates a reader over a single well-formed document. A second
    /// top-level element is a deserialization error.
    pub fn new(stream: impl BufRead + 'a) -> Self {
        Self::with_conformance(stream, false)
    }

    /// Creates a reader which permits a sequence of top-level fragments on
    /// one stream, as produced by multi-response streaming endpoints.
    ///
    /// No other hardening is relaxed.
    pub fn new_fragment_sequence(stream: impl BufRead + 'a) -> Self {
        Self::with_conformance(stream, true)
    }

    fn with_conformance(stream: impl BufRead + 'a, allow_fragments: bool) -> Self {
        let mut inner = NsReader::from_reader(Box::new(stream) as Box<dyn BufRead + 'a>);
        inner.config_mut().trim_text(true);

        XmlReader {
            inner,
            buf: Vec::new(),
            current: Node::default(),
            prev_node_type: XmlNodeType::None,
            peeked: None,
            pending_end: None,
            depth: 0,
            root_closed: false,
            allow_fragments,
        }
    }

    /// The type of the node last consumed.
    pub fn node_type(&self) -> XmlNodeType {
        self.current.node_type
    }

    /// The type of the node consumed before the current one.
    pub fn prev_node_type(&self) -> XmlNodeType {
        self.prev_node_type
    }

    /// The local name of the current node, if it is an element.
    pub fn local_name(&self) -> &str {
        &self.current.local_name
    }

    /// The namespace URI the current element's name resolved to, if any.
    pub fn namespace_uri(&self) -> Option<&str> {
        self.current.namespace_uri.as_deref()
    }

    /// The namespace prefix of the current element's name, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.current.prefix.as_deref()
    }

    /// Whether the current node is a self-closing element.
    pub fn is_empty_element(&self) -> bool {
        self.current.is_empty_element
    }

    /// The character content of the current text or CDATA node.
    pub fn text(&self) -> &str {
        &self.current.text
    }

    /// Produces the next meaningful node from the stream, or `None` at end of
    /// input. Comments, processing instructions and the XML declaration are
    /// skipped; DOCTYPE declarations are rejected.
    fn produce(&mut self) -> Result<Option<Node>, Error> {
        if let Some(end) = self.pending_end.take() {
            self.depth = self.depth.saturating_sub(1);
            if self.depth == 0 {
                self.root_closed = true;
            }

            return Ok(Some(end));
        }

        loop {
            self.buf.clear();

            let node = {
                let (resolution, event) = match self.inner.read_resolved_event_into(&mut self.buf)
                {
                    Ok(resolved) => resolved,
                    Err(err) => {
                        return Err(Error::Deserialization(format!("malformed XML: {err}")));
                    }
                };

                match event {
                    Event::Start(e) => Some(start_node(resolution, &e, false)?),
                    Event::Empty(e) => Some(start_node(resolution, &e, true)?),
                    Event::End(e) => Some(end_node(resolution, &e)?),

                    Event::Text(e) => {
                        let text = e
                            .unescape()
                            .map_err(|err| Error::Deserialization(err.to_string()))?;

                        Some(text_node(XmlNodeType::Text, text.into_owned()))
                    }

                    Event::CData(e) => {
                        let text = String::from_utf8(e.into_inner().into_owned())
                            .map_err(|err| Error::Deserialization(err.to_string()))?;

                        Some(text_node(XmlNodeType::CData, text))
                    }

                    Event::DocType(_) => {
                        return Err(Error::Deserialization(
                            "DTD processing is not supported".to_string(),
                        ));
                    }

                    Event::Eof => return Ok(None),

                    // Declarations, comments and processing instructions
                    // carry no content we care about.
                    _ => None,
                }
            };

            let Some(node) = node else {
                continue;
            };

            match node.node_type {
                XmlNodeType::StartElement => {
                    if self.depth == 0 && self.root_closed && !self.allow_fragments {
                        return Err(Error::Deserialization(format!(
                            "unexpected second top-level element <{}>",
                            node.qualified_name()
                        )));
                    }

                    self.depth += 1;

                    if node.is_empty_element {
                        let mut end = node.clone();
                        end.node_type = XmlNodeType::EndElement;
                        end.attributes = Vec::new();
                        self.pending_end = Some(end);
                    }
                }

                XmlNodeType::EndElement => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        self.root_closed = true;
                    }
                }

                _ => {}
            }

            return Ok(Some(node));
        }
    }

    /// Advances the cursor by one node.
    ///
    /// Running out of input is a [`Error::Deserialization`] failure; a stream
    /// never legitimately ends in the middle of a read sequence.
    pub fn read(&mut self) -> Result<(), Error> {
        let node = match self.peeked.take() {
            Some(node) => node,
            None => self.produce()?.ok_or_else(|| {
                Error::Deserialization("unexpected end of XML document".to_string())
            })?,
        };

        self.prev_node_type = self.current.node_type;
        self.current = node;

        Ok(())
    }

    /// Advances the cursor and asserts the type of the node found there.
    pub fn read_node(&mut self, expected: XmlNodeType) -> Result<(), Error> {
        self.read()?;

        if self.current.node_type != expected {
            return Err(Error::unexpected(expected, &self.current));
        }

        Ok(())
    }

    fn peek(&mut self) -> Result<Option<&Node>, Error> {
        if self.peeked.is_none() {
            self.peeked = self.produce()?;
        }

        Ok(self.peeked.as_ref())
    }

    /// Consumes a start element with the given name, failing if the next node
    /// is anything else.
    pub fn read_start_element(&mut self, ns: XmlNamespace, local_name: &str) -> Result<(), Error> {
        self.read()?;

        if self.current.node_type != XmlNodeType::StartElement
            || !self.current.matches(ns, local_name)
        {
            return Err(Error::unexpected(
                format_args!("start element <{}>", expected_name(ns, local_name)),
                &self.current,
            ));
        }

        Ok(())
    }

    /// Consumes an end element with the given name, failing if the next node
    /// is anything else.
    pub fn read_end_element(&mut self, ns: XmlNamespace, local_name: &str) -> Result<(), Error> {
        self.read()?;

        if self.current.node_type != XmlNodeType::EndElement
            || !self.current.matches(ns, local_name)
        {
            return Err(Error::unexpected(
                format_args!("end element </{}>", expected_name(ns, local_name)),
                &self.current,
            ));
        }

        Ok(())
    }

    /// Whether the next node is a start element with the given local name, in
    /// any namespace. Does not consume the node; returns `false` at end of
    /// input.
    pub fn is_start_element(&mut self, local_name: &str) -> Result<bool, Error> {
        self.is_start_element_ns(XmlNamespace::NotSpecified, local_name)
    }

    /// Whether the next node is a start element with the given name.
    pub fn is_start_element_ns(
        &mut self,
        ns: XmlNamespace,
        local_name: &str,
    ) -> Result<bool, Error> {
        Ok(self.peek()?.is_some_and(|node| {
            node.node_type == XmlNodeType::StartElement && node.matches(ns, local_name)
        }))
    }

    /// Whether the next node is an end element with the given local name, in
    /// any namespace.
    pub fn is_end_element(&mut self, local_name: &str) -> Result<bool, Error> {
        self.is_end_element_ns(XmlNamespace::NotSpecified, local_name)
    }

    /// Whether the next node is an end element with the given name.
    pub fn is_end_element_ns(
        &mut self,
        ns: XmlNamespace,
        local_name: &str,
    ) -> Result<bool, Error> {
        Ok(self.peek()?.is_some_and(|node| {
            node.node_type == XmlNodeType::EndElement && node.matches(ns, local_name)
        }))
    }

    /// Consumes the entire subtree of the current start element without
    /// interpreting it, leaving the cursor on the element's end tag.
    pub fn skip_current_element(&mut self) -> Result<(), Error> {
        if self.current.node_type != XmlNodeType::StartElement {
            return Err(Error::unexpected("start element", &self.current));
        }

        let mut depth = 1usize;
        while depth > 0 {
            self.read()?;
            match self.current.node_type {
                XmlNodeType::StartElement => depth += 1,
                XmlNodeType::EndElement => depth -= 1,
                _ => {}
            }
        }

        Ok(())
    }

    /// Consumes an expected start element and its entire subtree.
    pub fn skip_element(&mut self, ns: XmlNamespace, local_name: &str) -> Result<(), Error> {
        self.read_start_element(ns, local_name)?;
        self.skip_current_element()
    }

    /// Reads the text content of the current start element up to its end tag.
    ///
    /// A self-closing or empty element yields an empty string. Child elements
    /// are a deserialization error; this is strictly a leaf-element read.
    pub fn read_element_value(&mut self) -> Result<String, Error> {
        if self.current.node_type != XmlNodeType::StartElement {
            return Err(Error::unexpected("start element", &self.current));
        }

        let element_name = self.current.local_name.clone();
        let mut value = String::new();

        loop {
            self.read()?;
            match self.current.node_type {
                XmlNodeType::Text | XmlNodeType::CData => value.push_str(&self.current.text),
                XmlNodeType::EndElement => break,
                XmlNodeType::StartElement => {
                    return Err(Error::Deserialization(format!(
                        "expected text content in <{element_name}>, found child element <{}>",
                        self.current.qualified_name()
                    )));
                }
                XmlNodeType::None => unreachable!("read always produces a node"),
            }
        }

        Ok(value)
    }

    /// Consumes a named leaf element and returns its text content.
    pub fn read_element_value_of(
        &mut self,
        ns: XmlNamespace,
        local_name: &str,
    ) -> Result<String, Error> {
        self.read_start_element(ns, local_name)?;
        self.read_element_value()
    }

    /// Reads the text content of the current start element and parses it.
    pub fn read_typed_element_value<T>(&mut self) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let text = self.read_element_value()?;
        parse_value(&text)
    }

    /// Returns the value of the named attribute of the current start element,
    /// failing if it is absent.
    pub fn read_attribute_value(&mut self, name: &str) -> Result<String, Error> {
        self.try_read_attribute_value(name)?.ok_or_else(|| {
            Error::Deserialization(format!(
                "missing attribute {name} on element <{}>",
                self.current.qualified_name()
            ))
        })
    }

    /// Returns the value of the named attribute of the current start element,
    /// or `None` if it is absent.
    pub fn try_read_attribute_value(&mut self, name: &str) -> Result<Option<String>, Error> {
        if self.current.node_type != XmlNodeType::StartElement {
            return Err(Error::unexpected("start element", &self.current));
        }

        Ok(self
            .current
            .attributes
            .iter()
            .find(|(attr_name, _)| attr_name == name)
            .map(|(_, value)| value.clone()))
    }

    /// Returns the parsed value of the named attribute, failing if it is
    /// absent.
    pub fn read_typed_attribute_value<T>(&mut self, name: &str) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let text = self.read_attribute_value(name)?;
        parse_value(&text)
    }

    /// Returns the parsed value of the named attribute, or `None` if the
    /// attribute is absent.
    pub fn read_nullable_attribute_value<T>(&mut self, name: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.try_read_attribute_value(name)? {
            Some(text) => parse_value(&text).map(Some),
            None => Ok(None),
        }
    }

    /// Reads the base64 text content of the current start element and decodes
    /// it.
    pub fn read_base64_element_value(&mut self) -> Result<Vec<u8>, Error> {
        let text = self.read_element_value()?;
        let stripped: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();

        BASE64
            .decode(stripped.as_bytes())
            .map_err(|err| Error::Deserialization(format!("invalid base64 content: {err}")))
    }

    /// Reads the base64 text content of the current start element, decoding
    /// it into the given output stream.
    pub fn read_base64_element_value_into(&mut self, out: &mut impl Write) -> Result<(), Error> {
        let decoded = self.read_base64_element_value()?;
        out.write_all(&decoded)?;

        Ok(())
    }

    /// Materializes the current element and its subtree as XML text,
    /// consuming it. Only legal when the cursor is on a start element.
    pub fn read_outer_xml(&mut self) -> Result<String, Error> {
        self.materialize_subtree(true)
    }

    /// Materializes the content of the current element as XML text, consuming
    /// the element. Only legal when the cursor is on a start element.
    pub fn read_inner_xml(&mut self) -> Result<String, Error> {
        self.materialize_subtree(false)
    }

    fn materialize_subtree(&mut self, include_outer: bool) -> Result<String, Error> {
        if self.current.node_type != XmlNodeType::StartElement {
            return Err(Error::unexpected("start element", &self.current));
        }

        let mut writer = quick_xml::Writer::new(Vec::new());

        if include_outer {
            let start = BytesStart::new(self.current.qualified_name()).with_attributes(
                self.current
                    .attributes
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str())),
            );
            writer.write_event(Event::Start(start))?;
        }

        let mut depth = 1usize;
        loop {
            self.read()?;

            match self.current.node_type {
                XmlNodeType::StartElement => {
                    depth += 1;

                    let start = BytesStart::new(self.current.qualified_name()).with_attributes(
                        self.current
                            .attributes
                            .iter()
                            .map(|(name, value)| (name.as_str(), value.as_str())),
                    );
                    writer.write_event(Event::Start(start))?;
                }

                XmlNodeType::EndElement => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }

                    writer
                        .write_event(Event::End(BytesEnd::new(self.current.qualified_name())))?;
                }

                XmlNodeType::Text => {
                    writer.write_event(Event::Text(BytesText::new(&self.current.text)))?;
                }

                XmlNodeType::CData => {
                    writer.write_event(Event::CData(BytesCData::new(&self.current.text)))?;
                }

                XmlNodeType::None => unreachable!("read always produces a node"),
            }
        }

        if include_outer {
            writer.write_event(Event::End(BytesEnd::new(self.current.qualified_name())))?;
        }

        String::from_utf8(writer.into_inner())
            .map_err(|err| Error::Deserialization(err.to_string()))
    }
}

fn expected_name(ns: XmlNamespace, local_name: &str) -> String {
    match ns.prefix() {
        Some(prefix) => format!("{prefix}:{local_name}"),
        None => local_name.to_string(),
    }
}

fn parse_value<T>(text: &str) -> Result<T, Error>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    text.parse().map_err(|err| {
        Error::Deserialization(format!(
            "failed to parse {text:?} as {}: {err}",
            std::any::type_name::<T>()
        ))
    })
}

fn start_node(
    resolution: ResolveResult<'_>,
    e: &BytesStart<'_>,
    is_empty: bool,
) -> Result<Node, Error> {
    let name = e.name();

    let local_name = utf8(name.local_name().as_ref())?;
    let prefix = match name.prefix() {
        Some(prefix) => Some(utf8(prefix.as_ref())?),
        None => None,
    };

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::Deserialization(err.to_string()))?;
        let attr_name = utf8(attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|err| Error::Deserialization(err.to_string()))?
            .into_owned();

        attributes.push((attr_name, value));
    }

    Ok(Node {
        node_type: XmlNodeType::StartElement,
        local_name,
        prefix,
        namespace_uri: resolved_uri(resolution)?,
        is_empty_element: is_empty,
        text: String::new(),
        attributes,
    })
}

fn end_node(resolution: ResolveResult<'_>, e: &BytesEnd<'_>) -> Result<Node, Error> {
    let name = e.name();

    let local_name = utf8(name.local_name().as_ref())?;
    let prefix = match name.prefix() {
        Some(prefix) => Some(utf8(prefix.as_ref())?),
        None => None,
    };

    Ok(Node {
        node_type: XmlNodeType::EndElement,
        local_name,
        prefix,
        namespace_uri: resolved_uri(resolution)?,
        is_empty_element: false,
        text: String::new(),
        attributes: Vec::new(),
    })
}

fn text_node(node_type: XmlNodeType, text: String) -> Node {
    Node {
        node_type,
        text,
        ..Node::default()
    }
}

fn resolved_uri(resolution: ResolveResult<'_>) -> Result<Option<String>, Error> {
    match resolution {
        ResolveResult::Bound(ns) => Ok(Some(utf8(ns.0)?)),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(Error::Deserialization(format!(
            "reference to undeclared namespace prefix {:?}",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn utf8(bytes: &[u8]) -> Result<String, Error> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| Error::Deserialization(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(xml: &str) -> XmlReader<'_> {
        XmlReader::new(xml.as_bytes())
    }

    #[test]
    fn read_start_then_probe_child() {
        let mut reader = reader("<a><b>1</b></a>");

        reader
            .read_start_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
        assert!(reader.is_start_element("b").unwrap());
        assert!(!reader.is_start_element("c").unwrap());

        let value: i32 = {
            reader
                .read_start_element(XmlNamespace::NotSpecified, "b")
                .unwrap();
            reader.read_typed_element_value().unwrap()
        };
        assert_eq!(value, 1);

        reader
            .read_end_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
    }

    #[test]
    fn end_element_name_mismatch_fails() {
        let mut reader = reader("<a><b>1</b></a>");

        reader
            .read_start_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
        reader.skip_element(XmlNamespace::NotSpecified, "b").unwrap();

        // The next node is `</a>`; expecting `</b>` must fail.
        let err = reader
            .read_end_element(XmlNamespace::NotSpecified, "b")
            .unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
        assert!(err.to_string().contains("</b>"));
        assert!(err.to_string().contains("</a>"));
    }

    #[test]
    fn namespace_qualified_match() {
        let xml = concat!(
            r#"<t:Message xmlns:t="http://schemas.microsoft.com/exchange/services/2006/types">"#,
            r#"<t:Subject>Hi</t:Subject>"#,
            r#"</t:Message>"#,
        );
        let mut reader = reader(xml);

        reader
            .read_start_element(XmlNamespace::Types, "Message")
            .unwrap();
        assert!(reader.is_start_element_ns(XmlNamespace::Types, "Subject").unwrap());
        assert!(!reader
            .is_start_element_ns(XmlNamespace::Messages, "Subject")
            .unwrap());

        let value = reader
            .read_element_value_of(XmlNamespace::Types, "Subject")
            .unwrap();
        assert_eq!(value, "Hi");
    }

    #[test]
    fn premature_end_fails() {
        let mut reader = reader("<a><b>");

        reader
            .read_start_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
        reader
            .read_start_element(XmlNamespace::NotSpecified, "b")
            .unwrap();

        assert!(matches!(reader.read(), Err(Error::Deserialization(_))));
    }

    #[test]
    fn empty_element_reads_as_empty_value() {
        let mut reader = reader(r#"<a><b/><c>x</c></a>"#);

        reader
            .read_start_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
        reader
            .read_start_element(XmlNamespace::NotSpecified, "b")
            .unwrap();
        assert!(reader.is_empty_element());
        assert_eq!(reader.read_element_value().unwrap(), "");

        assert_eq!(
            reader
                .read_element_value_of(XmlNamespace::NotSpecified, "c")
                .unwrap(),
            "x"
        );
    }

    #[test]
    fn attributes_typed_and_nullable() {
        let mut reader = reader(r#"<Id Key="AScA" Count="3"/>"#);

        reader
            .read_start_element(XmlNamespace::NotSpecified, "Id")
            .unwrap();
        assert_eq!(reader.read_attribute_value("Key").unwrap(), "AScA");
        assert_eq!(reader.read_typed_attribute_value::<i64>("Count").unwrap(), 3);
        assert_eq!(
            reader
                .read_nullable_attribute_value::<i64>("Missing")
                .unwrap(),
            None
        );
        assert!(reader.read_attribute_value("Missing").is_err());
    }

    #[test]
    fn skip_current_element_consumes_subtree() {
        let mut reader = reader("<a><b><c>1</c><d/></b><e>2</e></a>");

        reader
            .read_start_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
        reader
            .read_start_element(XmlNamespace::NotSpecified, "b")
            .unwrap();
        reader.skip_current_element().unwrap();

        assert_eq!(
            reader
                .read_element_value_of(XmlNamespace::NotSpecified, "e")
                .unwrap(),
            "2"
        );
    }

    #[test]
    fn base64_element_value() {
        let mut reader = reader("<Content>aGVsbG8=</Content>");

        reader
            .read_start_element(XmlNamespace::NotSpecified, "Content")
            .unwrap();
        assert_eq!(reader.read_base64_element_value().unwrap(), b"hello");
    }

    #[test]
    fn outer_and_inner_xml() {
        let mut reader = reader(r#"<a><b k="v"><c>1</c></b></a>"#);

        reader
            .read_start_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
        reader.read().unwrap();
        let outer = reader.read_outer_xml().unwrap();
        assert_eq!(outer, r#"<b k="v"><c>1</c></b>"#);

        let mut reader = super::XmlReader::new(r#"<a><c>1</c></a>"#.as_bytes());
        reader
            .read_start_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
        let inner = reader.read_inner_xml().unwrap();
        assert_eq!(inner, "<c>1</c>");
    }

    #[test]
    fn doctype_is_rejected() {
        let mut reader = reader("<!DOCTYPE a [<!ENTITY x \"y\">]><a>&x;</a>");
        assert!(matches!(reader.read(), Err(Error::Deserialization(_))));
    }

    #[test]
    fn second_root_rejected_unless_fragment_sequence() {
        let mut strict = XmlReader::new("<a/><b/>".as_bytes());
        strict
            .read_start_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
        strict
            .read_end_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
        assert!(strict.read().is_err());

        let mut fragments = XmlReader::new_fragment_sequence("<a/><b/>".as_bytes());
        fragments
            .read_start_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
        fragments
            .read_end_element(XmlNamespace::NotSpecified, "a")
            .unwrap();
        fragments
            .read_start_element(XmlNamespace::NotSpecified, "b")
            .unwrap();
    }

    #[test]
    fn prev_node_type_is_tracked() {
        let mut reader = reader("<a>text</a>");

        reader.read().unwrap();
        assert_eq!(reader.prev_node_type(), XmlNodeType::None);
        reader.read().unwrap();
        assert_eq!(reader.node_type(), XmlNodeType::Text);
        assert_eq!(reader.prev_node_type(), XmlNodeType::StartElement);
    }
}
