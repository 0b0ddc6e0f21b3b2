/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use indexmap::IndexMap;

use crate::json::{JsonScalar, JsonWriter};
use crate::Error;

/// A generic JSON value tree.
///
/// Objects preserve member insertion order, matching the order keys appeared
/// in the parsed text. The `Integer`/`Double` split reflects the lexical
/// shape of the source number, not its value; see the module documentation.
#[derive(Clone, Debug, PartialEq)]
pub enum JsonValue {
    Object(IndexMap<String, JsonValue>),
    Array(Vec<JsonValue>),
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Null,
}

impl JsonValue {
    /// The member of an object value with the given key, if this is an
    /// object and the key is present.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        match self {
            JsonValue::Object(members) => members.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            JsonValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsonValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsonValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }

    /// Serializes this tree through the given writer.
    pub fn write_to(&self, writer: &mut JsonWriter<'_>) -> Result<(), Error> {
        match self {
            JsonValue::Object(members) => {
                writer.push_object_closure()?;
                for (key, value) in members {
                    writer.write_key(key)?;
                    value.write_to(writer)?;
                }
                writer.pop_closure()
            }

            JsonValue::Array(values) => {
                writer.push_array_closure()?;
                for value in values {
                    value.write_to(writer)?;
                }
                writer.pop_closure()
            }

            JsonValue::String(s) => writer.write_value(JsonScalar::String(s)),
            JsonValue::Integer(i) => writer.write_value(*i),
            JsonValue::Double(d) => writer.write_value(*d),
            JsonValue::Boolean(b) => writer.write_value(*b),
            JsonValue::Null => writer.write_null_value(),
        }
    }

    /// Serializes this tree as compact JSON text.
    pub fn to_json_string(&self) -> Result<String, Error> {
        let mut buf = Vec::new();
        {
            let mut writer = JsonWriter::new(&mut buf, false);
            self.write_to(&mut writer)?;
        }

        String::from_utf8(buf).map_err(|err| Error::Serialization(err.to_string()))
    }
}
