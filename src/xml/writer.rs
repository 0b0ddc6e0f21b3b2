/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::borrow::Cow;
use std::io::{Read, Write};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use time::OffsetDateTime;

use crate::property::PropertyValue;
use crate::xml::XmlNamespace;
use crate::Error;

/// A start tag whose attribute list is still open.
struct PendingStart {
    qualified_name: String,
    attributes: Vec<(String, String)>,
}

/// A forward-only writer producing well-formed, namespace-qualified XML.
///
/// Namespace declarations are emitted on the first element that uses each
/// namespace within the currently open scope, so a fragment rooted in the
/// Types namespace carries its own `xmlns:t` declaration.
///
/// Output is UTF-8 without a byte order mark. Indentation is a constructor
/// option; consumers of the produced XML must never depend on it.
///
/// The writer borrows its output stream and never closes it.
pub struct XmlWriter<'a> {
    inner: quick_xml::Writer<Box<dyn Write + 'a>>,
    pending: Option<PendingStart>,
    /// Qualified names of the currently open elements.
    open: Vec<String>,
    /// Namespaces declared so far, with the depth of the declaring element.
    ns_scope: Vec<(XmlNamespace, usize)>,
}

impl<'a> XmlWriter<'a> {
    /// Creates a writer producing compact XML.
    pub fn new(stream: impl Write + 'a) -> Self {
        XmlWriter {
            inner: quick_xml::Writer::new(Box::new(stream) as Box<dyn Write + 'a>),
            pending: None,
            open: Vec::new(),
            ns_scope: Vec::new(),
        }
    }

    /// Creates a writer producing indented XML, for diagnostic output.
    pub fn new_indented(stream: impl Write + 'a) -> Self {
        XmlWriter {
            inner: quick_xml::Writer::new_with_indent(
                Box::new(stream) as Box<dyn Write + 'a>,
                b' ',
                2,
            ),
            pending: None,
            open: Vec::new(),
            ns_scope: Vec::new(),
        }
    }

    /// Opens a new element. The start tag is held open until content is
    /// written, so attributes may still be added.
    pub fn write_start_element(
        &mut self,
        ns: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        self.flush_pending()?;

        let qualified_name = match ns.prefix() {
            Some(prefix) => format!("{prefix}:{local_name}"),
            None => local_name.to_string(),
        };

        let mut attributes = Vec::new();
        if let (Some(prefix), Some(uri)) = (ns.prefix(), ns.uri()) {
            if !self.ns_scope.iter().any(|(scoped, _)| *scoped == ns) {
                attributes.push((format!("xmlns:{prefix}"), uri.to_string()));
                self.ns_scope.push((ns, self.open.len()));
            }
        }

        self.pending = Some(PendingStart {
            qualified_name,
            attributes,
        });

        Ok(())
    }

    /// Closes the most recently opened element. An element with no content is
    /// written in self-closing form.
    pub fn write_end_element(&mut self) -> Result<(), Error> {
        if let Some(pending) = self.pending.take() {
            let start = BytesStart::new(pending.qualified_name.clone()).with_attributes(
                pending
                    .attributes
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str())),
            );
            self.inner.write_event(Event::Empty(start))?;

            let depth = self.open.len();
            self.ns_scope.retain(|(_, declared_at)| *declared_at < depth);

            return Ok(());
        }

        let qualified_name = self
            .open
            .pop()
            .ok_or_else(|| Error::Serialization("no element is open".to_string()))?;
        self.inner
            .write_event(Event::End(BytesEnd::new(qualified_name)))?;

        let depth = self.open.len();
        self.ns_scope.retain(|(_, declared_at)| *declared_at < depth);

        Ok(())
    }

    /// Adds an attribute to the element whose start tag is still open,
    /// skipping attributes with empty values.
    pub fn write_attribute_str(&mut self, local_name: &str, value: &str) -> Result<(), Error> {
        if value.is_empty() {
            return Ok(());
        }

        self.write_attribute_str_always(local_name, value)
    }

    /// Adds an attribute to the element whose start tag is still open, even
    /// when its value is an empty string. Some attributes semantically
    /// distinguish "empty" from "absent".
    pub fn write_attribute_str_always(
        &mut self,
        local_name: &str,
        value: &str,
    ) -> Result<(), Error> {
        ensure_valid_xml_chars(value, "attribute", local_name)?;

        let pending = self.pending.as_mut().ok_or_else(|| {
            Error::Serialization(format!(
                "attribute {local_name} written outside an open start tag"
            ))
        })?;
        pending
            .attributes
            .push((local_name.to_string(), value.to_string()));

        Ok(())
    }

    /// Converts a value to its wire string and adds it as an attribute.
    pub fn write_attribute_value(
        &mut self,
        local_name: &str,
        value: &PropertyValue,
    ) -> Result<(), Error> {
        let text = try_convert_to_string(value).ok_or_else(|| {
            Error::Serialization(format!(
                "no wire representation for {} value in attribute {local_name}",
                value.kind_name()
            ))
        })?;

        self.write_attribute_str(local_name, &text)
    }

    /// Writes a leaf element holding a single converted value.
    ///
    /// `None` omits the element entirely; an empty string produces an empty
    /// element with paired tags. The two are distinguishable on decode, and
    /// callers rely on that.
    pub fn write_element_value(
        &mut self,
        ns: XmlNamespace,
        local_name: &str,
        value: Option<&PropertyValue>,
    ) -> Result<(), Error> {
        let Some(value) = value else {
            return Ok(());
        };

        let text = try_convert_to_string(value).ok_or_else(|| {
            Error::Serialization(format!(
                "no wire representation for {} value in element {local_name}",
                value.kind_name()
            ))
        })?;

        self.write_start_element(ns, local_name)?;
        if text.is_empty() {
            self.flush_pending()?;
        } else {
            self.write_text(&text)?;
        }
        self.write_end_element()
    }

    /// Writes a leaf element holding the given string.
    pub fn write_element_str(
        &mut self,
        ns: XmlNamespace,
        local_name: &str,
        value: &str,
    ) -> Result<(), Error> {
        self.write_start_element(ns, local_name)?;
        if value.is_empty() {
            self.flush_pending()?;
        } else {
            self.write_text(value)?;
        }
        self.write_end_element()
    }

    /// Writes character content into the currently open element.
    pub fn write_text(&mut self, text: &str) -> Result<(), Error> {
        ensure_valid_xml_chars(text, "element", &self.current_element_name())?;

        self.flush_pending()?;
        self.inner.write_event(Event::Text(BytesText::new(text)))?;

        Ok(())
    }

    /// Writes the given bytes as base64 character content of the currently
    /// open element.
    pub fn write_base64_element_value(&mut self, data: &[u8]) -> Result<(), Error> {
        self.flush_pending()?;
        self.inner
            .write_event(Event::Text(BytesText::new(&BASE64.encode(data))))?;

        Ok(())
    }

    /// Streams the given source as base64 character content of the currently
    /// open element, encoding as it reads rather than buffering the whole
    /// source.
    pub fn write_base64_element_value_from(
        &mut self,
        source: &mut impl Read,
    ) -> Result<(), Error> {
        self.flush_pending()?;

        // Carry keeps the encoding input aligned to 3-byte groups so no
        // padding appears before the final chunk.
        let mut carry: Vec<u8> = Vec::new();
        let mut buf = [0u8; 3072];

        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }

            carry.extend_from_slice(&buf[..n]);
            let usable = carry.len() - carry.len() % 3;
            if usable > 0 {
                let encoded = BASE64.encode(&carry[..usable]);
                self.inner
                    .write_event(Event::Text(BytesText::new(&encoded)))?;
                carry.drain(..usable);
            }
        }

        if !carry.is_empty() {
            let encoded = BASE64.encode(&carry);
            self.inner
                .write_event(Event::Text(BytesText::new(&encoded)))?;
        }

        Ok(())
    }

    /// Splices a pre-built XML fragment into the output verbatim.
    ///
    /// The fragment must be well-formed on its own; no validation or escaping
    /// is applied.
    pub fn write_node(&mut self, raw: &str) -> Result<(), Error> {
        self.flush_pending()?;
        self.inner
            .write_event(Event::Text(BytesText::from_escaped(raw)))?;

        Ok(())
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.inner.get_mut().flush()?;

        Ok(())
    }

    fn current_element_name(&self) -> String {
        match (&self.pending, self.open.last()) {
            (Some(pending), _) => pending.qualified_name.clone(),
            (None, Some(open)) => open.clone(),
            (None, None) => "document".to_string(),
        }
    }

    /// Emits the held-open start tag, if any, committing its attributes.
    fn flush_pending(&mut self) -> Result<(), Error> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };

        let start = BytesStart::new(pending.qualified_name.clone()).with_attributes(
            pending
                .attributes
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
        );
        self.inner.write_event(Event::Start(start))?;
        self.open.push(pending.qualified_name);

        Ok(())
    }
}

/// Converts a scalar value to its wire string.
///
/// Evaluated as an ordered chain over the closed value union; a `None` result
/// means no conversion rule applies, which callers escalate to
/// [`Error::Serialization`] naming the value kind and target.
pub(crate) fn try_convert_to_string(value: &PropertyValue) -> Option<Cow<'_, str>> {
    match value {
        PropertyValue::String(s) => Some(Cow::Borrowed(s.as_str())),

        // The XML Schema lexical booleans, never a language-native casing.
        PropertyValue::Boolean(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),

        PropertyValue::Integer(i) => Some(Cow::Owned(i.to_string())),
        PropertyValue::Double(d) => Some(Cow::Owned(d.to_string())),
        PropertyValue::DateTime(dt) => format_timestamp(dt).map(Cow::Owned),
        PropertyValue::Bytes(bytes) => Some(Cow::Owned(BASE64.encode(bytes))),

        // A complex value may provide its own wire string. Most don't, in
        // which case it has no scalar representation at all.
        PropertyValue::Complex(complex) => complex.as_wire_value().map(Cow::Owned),
    }
}

/// Formats a timestamp in the canonical EWS form: UTC with milliseconds,
/// `yyyy-MM-ddTHH:mm:ss.fffZ`.
pub(crate) fn format_timestamp(timestamp: &OffsetDateTime) -> Option<String> {
    let format = time::macros::format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );

    timestamp.to_offset(time::UtcOffset::UTC).format(format).ok()
}

/// Rejects characters which are not legal in XML 1.0 content, naming the
/// offending value and its target element or attribute.
fn ensure_valid_xml_chars(text: &str, target_kind: &str, target: &str) -> Result<(), Error> {
    let illegal = text.chars().find(|c| {
        matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}')
    });

    if let Some(c) = illegal {
        return Err(Error::Serialization(format!(
            "value {text:?} for {target_kind} {target} contains character U+{:04X}, which is not legal in XML",
            c as u32
        )));
    }

    Ok(())
}
