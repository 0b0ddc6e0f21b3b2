/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Streaming codec for the legacy EWS JSON wire format.
//!
//! Exchange's older endpoints speak a JSON dialect with some load-bearing
//! quirks, most notably the lexical integer/double split: a number written
//! without a decimal point or exponent is a 64-bit integer, anything else is
//! a double. Identifier round-tripping depends on this, so the parser and
//! writer in this module preserve it exactly rather than collapsing all
//! numbers to doubles.

mod parser;
mod tokenizer;
mod value;
mod writer;

pub use parser::parse;
pub use tokenizer::{JsonToken, JsonTokenKind, JsonTokenizer};
pub use value::JsonValue;
pub use writer::{JsonScalar, JsonWriter};
