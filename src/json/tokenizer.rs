/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::io::Read;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::Error;

/// One combined pattern covering every token kind, tried against the
/// remaining input at each step. Leading whitespace is consumed along with
/// the token.
static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^\s*(?:",
        r#"(?P<string>"(?:\\.|[^"\\])*")"#,
        r"|(?P<number>-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)",
        r"|(?P<boolean>(?:true|false)\b)",
        r"|(?P<null>null\b)",
        r"|(?P<object_open>\{)",
        r"|(?P<object_close>\})",
        r"|(?P<array_open>\[)",
        r"|(?P<array_close>\])",
        r"|(?P<colon>:)",
        r"|(?P<comma>,)",
        r")",
    ))
    .expect("the combined token pattern is a valid regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JsonTokenKind {
    String,
    Number,
    Boolean,
    Null,
    ObjectOpen,
    ObjectClose,
    ArrayOpen,
    ArrayClose,
    Colon,
    Comma,
}

/// A single lexical token. String tokens keep their surrounding quotes and
/// raw escapes; unescaping happens in the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonToken {
    pub kind: JsonTokenKind,
    pub text: String,
}

/// A regex-driven lexer over a complete JSON text.
///
/// The input is held eagerly in memory; EWS JSON responses arrive as complete
/// bodies, not incremental frames. One token of lookahead is available
/// through [`peek`](Self::peek) independent of consumption.
///
/// Malformed input fails fast with [`Error::JsonDeserialization`] carrying
/// the byte offset at which no token could be recognized; the tokenizer
/// never guesses.
pub struct JsonTokenizer {
    input: String,
    pos: usize,
    peeked: Option<JsonToken>,
}

impl JsonTokenizer {
    pub fn new(text: impl Into<String>) -> Self {
        JsonTokenizer {
            input: text.into(),
            pos: 0,
            peeked: None,
        }
    }

    /// Reads the stream to its end and tokenizes the resulting text.
    pub fn from_reader(mut stream: impl Read) -> Result<Self, Error> {
        let mut text = String::new();
        stream
            .read_to_string(&mut text)
            .map_err(|err| Error::JsonDeserialization(err.to_string()))?;

        Ok(Self::new(text))
    }

    /// Consumes and returns the next token. Running out of input is an
    /// error; callers which need to detect the end of input use
    /// [`peek`](Self::peek).
    pub fn next_token(&mut self) -> Result<JsonToken, Error> {
        if let Some(token) = self.peeked.take() {
            return Ok(token);
        }

        self.scan()?.ok_or_else(|| {
            Error::JsonDeserialization("unexpected end of JSON input".to_string())
        })
    }

    /// Returns the next token without consuming it, or `None` at the end of
    /// input.
    pub fn peek(&mut self) -> Result<Option<&JsonToken>, Error> {
        if self.peeked.is_none() {
            self.peeked = self.scan()?;
        }

        Ok(self.peeked.as_ref())
    }

    fn scan(&mut self) -> Result<Option<JsonToken>, Error> {
        let rest = &self.input[self.pos..];
        if rest.trim_start().is_empty() {
            self.pos = self.input.len();
            return Ok(None);
        }

        let captures = TOKEN_PATTERN.captures(rest).ok_or_else(|| {
            let skipped = rest.len() - rest.trim_start().len();
            Error::JsonDeserialization(format!(
                "unrecognized JSON content at byte offset {}",
                self.pos + skipped
            ))
        })?;

        const GROUPS: [(&str, JsonTokenKind); 10] = [
            ("string", JsonTokenKind::String),
            ("number", JsonTokenKind::Number),
            ("boolean", JsonTokenKind::Boolean),
            ("null", JsonTokenKind::Null),
            ("object_open", JsonTokenKind::ObjectOpen),
            ("object_close", JsonTokenKind::ObjectClose),
            ("array_open", JsonTokenKind::ArrayOpen),
            ("array_close", JsonTokenKind::ArrayClose),
            ("colon", JsonTokenKind::Colon),
            ("comma", JsonTokenKind::Comma),
        ];

        for (group, kind) in GROUPS {
            if let Some(matched) = captures.name(group) {
                self.pos += captures
                    .get(0)
                    .map(|overall| overall.end())
                    .unwrap_or_else(|| matched.end());

                return Ok(Some(JsonToken {
                    kind,
                    text: matched.as_str().to_string(),
                }));
            }
        }

        // The pattern matched, so exactly one named group participated.
        unreachable!("a token match always names its group")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<(JsonTokenKind, String)> {
        let mut tokenizer = JsonTokenizer::new(text);
        let mut tokens = Vec::new();
        while tokenizer.peek().unwrap().is_some() {
            let token = tokenizer.next_token().unwrap();
            tokens.push((token.kind, token.text));
        }

        tokens
    }

    #[test]
    fn tokenizes_object_with_signed_and_decimal_numbers() {
        let tokens = kinds(r#"{"x": -12, "y": 3.5}"#);

        assert_eq!(
            tokens,
            vec![
                (JsonTokenKind::ObjectOpen, "{".to_string()),
                (JsonTokenKind::String, "\"x\"".to_string()),
                (JsonTokenKind::Colon, ":".to_string()),
                (JsonTokenKind::Number, "-12".to_string()),
                (JsonTokenKind::Comma, ",".to_string()),
                (JsonTokenKind::String, "\"y\"".to_string()),
                (JsonTokenKind::Colon, ":".to_string()),
                (JsonTokenKind::Number, "3.5".to_string()),
                (JsonTokenKind::ObjectClose, "}".to_string()),
            ]
        );
    }

    #[test]
    fn peek_does_not_consume() {
        let mut tokenizer = JsonTokenizer::new("[true]");

        assert_eq!(
            tokenizer.peek().unwrap().unwrap().kind,
            JsonTokenKind::ArrayOpen
        );
        assert_eq!(
            tokenizer.peek().unwrap().unwrap().kind,
            JsonTokenKind::ArrayOpen
        );
        assert_eq!(tokenizer.next_token().unwrap().kind, JsonTokenKind::ArrayOpen);
        assert_eq!(tokenizer.next_token().unwrap().kind, JsonTokenKind::Boolean);
    }

    #[test]
    fn unrecognized_content_reports_offset() {
        let mut tokenizer = JsonTokenizer::new("[1, #]");

        tokenizer.next_token().unwrap();
        tokenizer.next_token().unwrap();
        tokenizer.next_token().unwrap();

        // The offending `#` sits at byte 4, past the space after the comma.
        let err = tokenizer.next_token().unwrap_err();
        assert!(matches!(err, Error::JsonDeserialization(_)));
        assert!(err.to_string().contains("offset 4"));
    }

    #[test]
    fn end_of_input_errors_on_next_but_not_peek() {
        let mut tokenizer = JsonTokenizer::new("  ");

        assert!(tokenizer.peek().unwrap().is_none());
        assert!(tokenizer.next_token().is_err());
    }

    #[test]
    fn string_token_keeps_quotes_and_escapes() {
        let mut tokenizer = JsonTokenizer::new(r#""a\"b""#);

        let token = tokenizer.next_token().unwrap();
        assert_eq!(token.kind, JsonTokenKind::String);
        assert_eq!(token.text, r#""a\"b""#);
    }
}
