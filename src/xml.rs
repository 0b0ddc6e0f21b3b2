/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Streaming XML codec for EWS traffic.
//!
//! EWS requests and responses are namespace-qualified XML. The reader and
//! writer in this module wrap `quick-xml`'s event API with the structural
//! validation and value conversion rules the property bag relies on.

mod reader;
mod writer;

pub use reader::XmlReader;
pub use writer::XmlWriter;

pub(crate) use writer::format_timestamp;

use crate::{MESSAGES_NS_URI, SOAP_NS_URI, TYPES_NS_URI};

/// The XML namespaces used by EWS traffic.
///
/// `NotSpecified` matches or produces unqualified names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XmlNamespace {
    NotSpecified,
    Messages,
    Types,
    Soap,
}

impl XmlNamespace {
    /// The namespace URI, if any.
    pub fn uri(&self) -> Option<&'static str> {
        match self {
            XmlNamespace::NotSpecified => None,
            XmlNamespace::Messages => Some(MESSAGES_NS_URI),
            XmlNamespace::Types => Some(TYPES_NS_URI),
            XmlNamespace::Soap => Some(SOAP_NS_URI),
        }
    }

    /// The conventional prefix this namespace is bound to in EWS documents.
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            XmlNamespace::NotSpecified => None,
            XmlNamespace::Messages => Some("m"),
            XmlNamespace::Types => Some("t"),
            XmlNamespace::Soap => Some("soap"),
        }
    }
}

/// The kind of node an [`XmlReader`] is positioned on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum XmlNodeType {
    /// No node has been read yet.
    #[default]
    None,
    StartElement,
    EndElement,
    Text,
    CData,
}

impl std::fmt::Display for XmlNodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            XmlNodeType::None => "no node",
            XmlNodeType::StartElement => "start element",
            XmlNodeType::EndElement => "end element",
            XmlNodeType::Text => "text",
            XmlNodeType::CData => "CDATA",
        };

        f.write_str(name)
    }
}
