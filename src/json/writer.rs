/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::char::decode_utf16;
use std::io::Write;

use time::OffsetDateTime;

use crate::xml::format_timestamp;
use crate::Error;

/// A scalar JSON value accepted by [`JsonWriter::write_value`].
#[derive(Clone, Copy, Debug)]
pub enum JsonScalar<'a> {
    String(&'a str),
    Integer(i64),
    Double(f64),
    Boolean(bool),
}

impl<'a> From<&'a str> for JsonScalar<'a> {
    fn from(value: &'a str) -> Self {
        JsonScalar::String(value)
    }
}

impl From<i64> for JsonScalar<'_> {
    fn from(value: i64) -> Self {
        JsonScalar::Integer(value)
    }
}

impl From<i32> for JsonScalar<'_> {
    fn from(value: i32) -> Self {
        JsonScalar::Integer(value as i64)
    }
}

impl From<f64> for JsonScalar<'_> {
    fn from(value: f64) -> Self {
        JsonScalar::Double(value)
    }
}

impl From<bool> for JsonScalar<'_> {
    fn from(value: bool) -> Self {
        JsonScalar::Boolean(value)
    }
}

/// An open object or array awaiting its closing bracket.
struct Closure {
    close: char,
    is_array: bool,
    has_members: bool,
}

/// A low-level streaming JSON text emitter.
///
/// The writer maintains an explicit stack of open closures (objects and
/// arrays) and inserts member separators as values and keys are pushed; it is
/// an emitter, not a tree serializer. [`crate::json::JsonValue::write_to`]
/// drives it for whole trees.
///
/// Pretty-printing only affects whitespace; consumers of the produced text
/// must never depend on it.
///
/// The writer borrows its output stream and never closes it.
pub struct JsonWriter<'a> {
    out: Box<dyn Write + 'a>,
    pretty: bool,
    closures: Vec<Closure>,
}

impl<'a> JsonWriter<'a> {
    pub fn new(stream: impl Write + 'a, pretty: bool) -> Self {
        JsonWriter {
            out: Box::new(stream) as Box<dyn Write + 'a>,
            pretty,
            closures: Vec::new(),
        }
    }

    /// Opens an object, remembering the matching close bracket.
    pub fn push_object_closure(&mut self) -> Result<(), Error> {
        self.about_to_add_value()?;
        self.out.write_all(b"{")?;
        self.closures.push(Closure {
            close: '}',
            is_array: false,
            has_members: false,
        });

        Ok(())
    }

    /// Opens an array, remembering the matching close bracket.
    pub fn push_array_closure(&mut self) -> Result<(), Error> {
        self.about_to_add_value()?;
        self.out.write_all(b"[")?;
        self.closures.push(Closure {
            close: ']',
            is_array: true,
            has_members: false,
        });

        Ok(())
    }

    /// Closes the innermost open object or array.
    pub fn pop_closure(&mut self) -> Result<(), Error> {
        let closure = self
            .closures
            .pop()
            .ok_or_else(|| Error::Serialization("no closure is open".to_string()))?;

        if self.pretty && closure.has_members {
            self.write_newline_and_indent()?;
        }
        write!(self.out, "{}", closure.close)?;

        Ok(())
    }

    /// Writes an object member key, inserting the separator before any key
    /// after the first.
    pub fn write_key(&mut self, key: &str) -> Result<(), Error> {
        let pretty = self.pretty;
        let closure = match self.closures.last_mut() {
            Some(closure) if !closure.is_array => closure,
            _ => {
                return Err(Error::Serialization(format!(
                    "key {key:?} written outside an open object"
                )))
            }
        };

        let needs_separator = closure.has_members;
        closure.has_members = true;

        if needs_separator {
            self.out.write_all(b",")?;
        }
        if pretty {
            self.write_newline_and_indent()?;
        }

        self.write_escaped_string(key)?;
        self.out.write_all(b":")?;
        if self.pretty {
            self.out.write_all(b" ")?;
        }

        Ok(())
    }

    /// Writes a scalar value.
    pub fn write_value<'v>(&mut self, value: impl Into<JsonScalar<'v>>) -> Result<(), Error> {
        self.about_to_add_value()?;

        match value.into() {
            JsonScalar::String(s) => self.write_escaped_string(s),
            JsonScalar::Integer(i) => {
                write!(self.out, "{i}")?;
                Ok(())
            }
            JsonScalar::Double(d) => {
                let text = format_double(d)?;
                self.out.write_all(text.as_bytes())?;
                Ok(())
            }
            JsonScalar::Boolean(b) => {
                self.out.write_all(if b { b"true" } else { b"false" })?;
                Ok(())
            }
        }
    }

    /// Writes the JSON `null` literal.
    pub fn write_null_value(&mut self) -> Result<(), Error> {
        self.about_to_add_value()?;
        self.out.write_all(b"null")?;

        Ok(())
    }

    /// Writes a timestamp as a string value in the canonical wire form.
    pub fn write_datetime_value(&mut self, timestamp: &OffsetDateTime) -> Result<(), Error> {
        let text = format_timestamp(timestamp)
            .ok_or_else(|| Error::Serialization("unformattable timestamp".to_string()))?;

        self.write_value(JsonScalar::String(&text))
    }

    /// Writes a string value supplied as UTF-16 code units.
    ///
    /// A high surrogate is buffered until its low surrogate arrives and the
    /// pair is emitted as one code point. A lone surrogate is flushed as a
    /// `\uXXXX` escape rather than silently dropped, so progress is always
    /// made.
    pub fn write_utf16_value(&mut self, units: &[u16]) -> Result<(), Error> {
        self.about_to_add_value()?;
        self.out.write_all(b"\"")?;

        for decoded in decode_utf16(units.iter().copied()) {
            match decoded {
                Ok(c) => self.write_escaped_char(c)?,
                Err(err) => {
                    write!(self.out, "\\u{:04x}", err.unpaired_surrogate())?;
                }
            }
        }

        self.out.write_all(b"\"")?;

        Ok(())
    }

    /// Inserts the separator before an array element after the first.
    /// Object member separation is handled by [`write_key`](Self::write_key).
    fn about_to_add_value(&mut self) -> Result<(), Error> {
        let pretty = self.pretty;
        let Some(closure) = self.closures.last_mut() else {
            return Ok(());
        };

        if !closure.is_array {
            return Ok(());
        }

        let needs_separator = closure.has_members;
        closure.has_members = true;

        if needs_separator {
            self.out.write_all(b",")?;
        }
        if pretty {
            self.write_newline_and_indent()?;
        }

        Ok(())
    }

    fn write_newline_and_indent(&mut self) -> Result<(), Error> {
        self.out.write_all(b"\n")?;
        for _ in 0..self.closures.len() {
            self.out.write_all(b"  ")?;
        }

        Ok(())
    }

    fn write_escaped_string(&mut self, s: &str) -> Result<(), Error> {
        self.out.write_all(b"\"")?;
        for c in s.chars() {
            self.write_escaped_char(c)?;
        }
        self.out.write_all(b"\"")?;

        Ok(())
    }

    fn write_escaped_char(&mut self, c: char) -> Result<(), Error> {
        match c {
            '"' => self.out.write_all(b"\\\"")?,
            '\\' => self.out.write_all(b"\\\\")?,
            '\n' => self.out.write_all(b"\\n")?,
            '\r' => self.out.write_all(b"\\r")?,
            '\t' => self.out.write_all(b"\\t")?,
            '\u{8}' => self.out.write_all(b"\\b")?,
            '\u{C}' => self.out.write_all(b"\\f")?,
            c if (c as u32) < 0x20 => write!(self.out, "\\u{:04x}", c as u32)?,
            c => {
                let mut buf = [0u8; 4];
                self.out.write_all(c.encode_utf8(&mut buf).as_bytes())?;
            }
        }

        Ok(())
    }
}

/// JSON has no non-finite numbers, and a double which happens to hold a
/// whole value must keep its decimal point so it parses back as a double.
fn format_double(d: f64) -> Result<String, Error> {
    if !d.is_finite() {
        return Err(Error::Serialization(format!(
            "{d} has no JSON representation"
        )));
    }

    let mut text = d.to_string();
    if !text.contains(['.', 'e', 'E']) {
        text.push_str(".0");
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::{parse, JsonValue};

    fn write(pretty: bool, build: impl FnOnce(&mut JsonWriter<'_>) -> Result<(), Error>) -> String {
        let mut buf = Vec::new();
        {
            let mut writer = JsonWriter::new(&mut buf, pretty);
            build(&mut writer).unwrap();
        }

        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn object_members_are_separated() {
        let text = write(false, |w| {
            w.push_object_closure()?;
            w.write_key("a")?;
            w.write_value(1i64)?;
            w.write_key("b")?;
            w.write_value("x")?;
            w.pop_closure()
        });

        assert_eq!(text, r#"{"a":1,"b":"x"}"#);
    }

    #[test]
    fn array_elements_are_separated() {
        let text = write(false, |w| {
            w.push_array_closure()?;
            w.write_value(1i64)?;
            w.write_value(true)?;
            w.write_null_value()?;
            w.pop_closure()
        });

        assert_eq!(text, "[1,true,null]");
    }

    #[test]
    fn pretty_printing_is_whitespace_only() {
        let pretty = write(true, |w| {
            w.push_object_closure()?;
            w.write_key("a")?;
            w.push_array_closure()?;
            w.write_value(1i64)?;
            w.write_value(2i64)?;
            w.pop_closure()?;
            w.pop_closure()
        });

        assert_eq!(pretty, "{\n  \"a\": [\n    1,\n    2\n  ]\n}");

        let compact: String = pretty
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        assert_eq!(compact, r#"{"a":[1,2]}"#);
    }

    #[test]
    fn whole_doubles_keep_their_decimal_point() {
        let text = write(false, |w| {
            w.push_array_closure()?;
            w.write_value(3.0f64)?;
            w.write_value(3.5f64)?;
            w.write_value(3i64)?;
            w.pop_closure()
        });

        assert_eq!(text, "[3.0,3.5,3]");
    }

    #[test]
    fn large_whole_doubles_stay_doubles_on_reparse() {
        let tree = JsonValue::Double(1e16);
        let text = tree.to_json_string().unwrap();
        assert_eq!(text, "10000000000000000.0");

        // Without the decimal point the lexical number split would turn
        // this back into an integer.
        assert_eq!(parse(&text).unwrap(), tree);
    }

    #[test]
    fn strings_are_escaped() {
        let text = write(false, |w| w.write_value("a\"b\\c\nd\te\r"));
        assert_eq!(text, r#""a\"b\\c\nd\te\r""#);

        let control = write(false, |w| w.write_value("\u{1}"));
        assert_eq!(control, "\"\\u0001\"");
    }

    #[test]
    fn surrogate_pairs_are_reassembled_and_lone_surrogates_flushed() {
        // "A" + U+1F600 as a surrogate pair.
        let paired = write(false, |w| w.write_utf16_value(&[0x41, 0xD83D, 0xDE00]));
        assert_eq!(paired, "\"A\u{1F600}\"");

        // A high surrogate with no partner is still emitted.
        let lone = write(false, |w| w.write_utf16_value(&[0x41, 0xD83D, 0x42]));
        assert_eq!(lone, "\"A\\ud83dB\"");
    }

    #[test]
    fn writer_output_round_trips_through_parser() {
        let tree = JsonValue::Object(
            [
                ("id".to_string(), JsonValue::Integer(42)),
                ("score".to_string(), JsonValue::Double(42.0)),
                (
                    "tags".to_string(),
                    JsonValue::Array(vec![
                        JsonValue::String("a\nb".to_string()),
                        JsonValue::Null,
                        JsonValue::Boolean(false),
                    ]),
                ),
                (
                    "nested".to_string(),
                    JsonValue::Object(
                        [("empty".to_string(), JsonValue::String(String::new()))]
                            .into_iter()
                            .collect(),
                    ),
                ),
            ]
            .into_iter()
            .collect(),
        );

        let text = tree.to_json_string().unwrap();
        let reparsed = parse(&text).unwrap();

        assert_eq!(reparsed, tree);
    }

    #[test]
    fn key_outside_object_is_an_error() {
        let mut buf = Vec::new();
        let mut writer = JsonWriter::new(&mut buf, false);
        writer.push_array_closure().unwrap();

        assert!(matches!(
            writer.write_key("a"),
            Err(Error::Serialization(_))
        ));
    }
}
