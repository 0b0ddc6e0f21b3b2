/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use indexmap::IndexMap;

use crate::json::{JsonToken, JsonTokenKind, JsonTokenizer, JsonValue};
use crate::Error;

/// Parses a complete JSON text into a value tree.
///
/// Content after the first value is a deserialization error.
pub fn parse(text: &str) -> Result<JsonValue, Error> {
    let mut tokenizer = JsonTokenizer::new(text);
    let value = parse_value(&mut tokenizer)?;

    if let Some(trailing) = tokenizer.peek()? {
        return Err(Error::JsonDeserialization(format!(
            "unexpected content after JSON value: {:?}",
            trailing.text
        )));
    }

    Ok(value)
}

fn parse_value(tokenizer: &mut JsonTokenizer) -> Result<JsonValue, Error> {
    let token = tokenizer.next_token()?;

    match token.kind {
        JsonTokenKind::String => Ok(JsonValue::String(unescape_string(&token)?)),
        JsonTokenKind::Number => parse_number(&token),
        JsonTokenKind::Boolean => Ok(JsonValue::Boolean(token.text == "true")),
        JsonTokenKind::Null => Ok(JsonValue::Null),
        JsonTokenKind::ObjectOpen => parse_object_body(tokenizer),
        JsonTokenKind::ArrayOpen => parse_array_body(tokenizer),

        JsonTokenKind::ObjectClose
        | JsonTokenKind::ArrayClose
        | JsonTokenKind::Colon
        | JsonTokenKind::Comma => Err(Error::JsonDeserialization(format!(
            "unexpected token {:?} in value position",
            token.text
        ))),
    }
}

/// Parses object members after the opening brace.
///
/// The member loop re-checks for a comma after each pair and stops when none
/// follows, but a consumed comma requires another pair: a literal trailing
/// comma before the closing brace is a hard failure. This mirrors the
/// established wire behavior and is deliberately not strict RFC parsing.
fn parse_object_body(tokenizer: &mut JsonTokenizer) -> Result<JsonValue, Error> {
    let mut members = IndexMap::new();

    if peek_kind(tokenizer)? != Some(JsonTokenKind::ObjectClose) {
        loop {
            let key_token = tokenizer.next_token()?;
            if key_token.kind != JsonTokenKind::String {
                return Err(Error::JsonDeserialization(format!(
                    "expected object key, found {:?}",
                    key_token.text
                )));
            }
            let key = unescape_string(&key_token)?;

            expect(tokenizer, JsonTokenKind::Colon)?;
            let value = parse_value(tokenizer)?;
            members.insert(key, value);

            if peek_kind(tokenizer)? == Some(JsonTokenKind::Comma) {
                tokenizer.next_token()?;
            } else {
                break;
            }
        }
    }

    expect(tokenizer, JsonTokenKind::ObjectClose)?;

    Ok(JsonValue::Object(members))
}

/// Parses array elements after the opening bracket, with the same comma
/// handling as object members.
fn parse_array_body(tokenizer: &mut JsonTokenizer) -> Result<JsonValue, Error> {
    let mut values = Vec::new();

    if peek_kind(tokenizer)? != Some(JsonTokenKind::ArrayClose) {
        loop {
            values.push(parse_value(tokenizer)?);

            if peek_kind(tokenizer)? == Some(JsonTokenKind::Comma) {
                tokenizer.next_token()?;
            } else {
                break;
            }
        }
    }

    expect(tokenizer, JsonTokenKind::ArrayClose)?;

    Ok(JsonValue::Array(values))
}

/// A number without a decimal point or exponent is a 64-bit integer;
/// anything else is a double. Callers round-trip identifiers through the
/// integer form, so this split is based on lexical shape alone.
fn parse_number(token: &JsonToken) -> Result<JsonValue, Error> {
    let is_double = token.text.contains(['.', 'e', 'E']);

    if is_double {
        token
            .text
            .parse::<f64>()
            .map(JsonValue::Double)
            .map_err(|err| {
                Error::JsonDeserialization(format!("invalid number {:?}: {err}", token.text))
            })
    } else {
        token
            .text
            .parse::<i64>()
            .map(JsonValue::Integer)
            .map_err(|err| {
                Error::JsonDeserialization(format!("invalid number {:?}: {err}", token.text))
            })
    }
}

fn peek_kind(tokenizer: &mut JsonTokenizer) -> Result<Option<JsonTokenKind>, Error> {
    Ok(tokenizer.peek()?.map(|token| token.kind))
}

fn expect(tokenizer: &mut JsonTokenizer, kind: JsonTokenKind) -> Result<JsonToken, Error> {
    let token = tokenizer.next_token()?;
    if token.kind != kind {
        return Err(Error::JsonDeserialization(format!(
            "expected {kind:?}, found {:?}",
            token.text
        )));
    }

    Ok(token)
}

/// Unescapes a quoted string token.
///
/// The simple escapes are handled first in each position, then `\uXXXX`
/// forms, reassembling UTF-16 surrogate pairs into whole code points. An
/// unpaired surrogate escape is malformed input.
fn unescape_string(token: &JsonToken) -> Result<String, Error> {
    let inner = &token.text[1..token.text.len() - 1];

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        let escape = chars.next().ok_or_else(|| {
            Error::JsonDeserialization(format!("truncated escape in {:?}", token.text))
        })?;

        match escape {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '/' => out.push('/'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{C}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),

            'u' => {
                let unit = hex_unit(&mut chars, token)?;

                if (0xDC00..0xE000).contains(&unit) {
                    return Err(Error::JsonDeserialization(format!(
                        "unpaired low surrogate in {:?}",
                        token.text
                    )));
                }

                if (0xD800..0xDC00).contains(&unit) {
                    if chars.next() != Some('\\') || chars.next() != Some('u') {
                        return Err(Error::JsonDeserialization(format!(
                            "unpaired high surrogate in {:?}",
                            token.text
                        )));
                    }

                    let low = hex_unit(&mut chars, token)?;
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err(Error::JsonDeserialization(format!(
                            "unpaired high surrogate in {:?}",
                            token.text
                        )));
                    }

                    let code_point =
                        0x10000 + (((unit - 0xD800) as u32) << 10) + (low - 0xDC00) as u32;
                    let c = char::from_u32(code_point).ok_or_else(|| {
                        Error::JsonDeserialization(format!(
                            "invalid code point in {:?}",
                            token.text
                        ))
                    })?;
                    out.push(c);
                } else {
                    // Non-surrogate code units are valid chars by
                    // construction.
                    match char::from_u32(unit as u32) {
                        Some(c) => out.push(c),
                        None => {
                            return Err(Error::JsonDeserialization(format!(
                                "invalid code point in {:?}",
                                token.text
                            )))
                        }
                    }
                }
            }

            other => {
                return Err(Error::JsonDeserialization(format!(
                    "unrecognized escape \\{other} in {:?}",
                    token.text
                )))
            }
        }
    }

    Ok(out)
}

fn hex_unit(chars: &mut std::str::Chars<'_>, token: &JsonToken) -> Result<u16, Error> {
    let mut unit: u16 = 0;
    for _ in 0..4 {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| {
                Error::JsonDeserialization(format!(
                    "malformed \\u escape in {:?}",
                    token.text
                ))
            })?;
        unit = (unit << 4) | digit as u16;
    }

    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_double_are_distinguished_by_lexical_shape() {
        let value = parse(r#"{"x": -12, "y": 3.5, "z": 3e2}"#).unwrap();

        assert_eq!(value.get("x"), Some(&JsonValue::Integer(-12)));
        assert_eq!(value.get("y"), Some(&JsonValue::Double(3.5)));
        assert_eq!(value.get("z"), Some(&JsonValue::Double(300.0)));
    }

    #[test]
    fn nested_structures() {
        let value = parse(r#"{"a": [1, {"b": null}, true], "c": ""}"#).unwrap();

        let array = match value.get("a").unwrap() {
            JsonValue::Array(values) => values,
            other => panic!("expected array, got {other:?}"),
        };
        assert_eq!(array[0], JsonValue::Integer(1));
        assert_eq!(array[1].get("b"), Some(&JsonValue::Null));
        assert_eq!(array[2], JsonValue::Boolean(true));
        assert_eq!(value.get("c"), Some(&JsonValue::String(String::new())));
    }

    #[test]
    fn object_member_order_is_preserved() {
        let value = parse(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();

        let keys: Vec<&str> = match &value {
            JsonValue::Object(members) => members.keys().map(String::as_str).collect(),
            other => panic!("expected object, got {other:?}"),
        };
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn trailing_comma_is_a_hard_failure() {
        assert!(matches!(
            parse(r#"{"a": 1,}"#),
            Err(Error::JsonDeserialization(_))
        ));
        assert!(matches!(
            parse("[1, 2,]"),
            Err(Error::JsonDeserialization(_))
        ));
    }

    #[test]
    fn missing_comma_between_members_fails() {
        assert!(matches!(
            parse(r#"{"a": 1 "b": 2}"#),
            Err(Error::JsonDeserialization(_))
        ));
    }

    #[test]
    fn simple_escapes_and_literal_unicode() {
        let value = parse(r#""a\"b\\c\/d\n\tA😀""#).unwrap();
        assert_eq!(value.as_str(), Some("a\"b\\c/d\n\tA\u{1F600}"));
    }

    #[test]
    fn surrogate_pair_escape_reassembles_code_point() {
        let value = parse("\"\\ud83d\\ude00\"").unwrap();
        assert_eq!(value.as_str(), Some("\u{1F600}"));
    }

    #[test]
    fn unpaired_surrogate_is_rejected() {
        assert!(matches!(
            parse(r#""\ud83d""#),
            Err(Error::JsonDeserialization(_))
        ));
        assert!(matches!(
            parse(r#""\ude00""#),
            Err(Error::JsonDeserialization(_))
        ));
    }

    #[test]
    fn trailing_content_is_rejected() {
        assert!(matches!(
            parse("{} {}"),
            Err(Error::JsonDeserialization(_))
        ));
    }

    #[test]
    fn unexpected_token_in_value_position() {
        assert!(matches!(
            parse(r#"{"a": ,}"#),
            Err(Error::JsonDeserialization(_))
        ));
    }
}
