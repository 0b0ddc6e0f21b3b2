/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Error values for (de)serialization and property access.

use thiserror::Error;

use crate::version::ExchangeServerVersion;

/// Error types for property bag and codec operations.
///
/// All of these represent local conditions detected before or while touching
/// the wire; none of them are retried internally. Retry policy, if any,
/// belongs to the orchestration layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A property or request option requires a newer Exchange Server version
    /// than the one the service was configured for.
    ///
    /// This is always detected before any network traffic is generated.
    #[error("{name} is only valid for Exchange Server version {required} or later, but the service targets {current}")]
    Version {
        name: String,
        required: ExchangeServerVersion,
        current: ExchangeServerVersion,
    },

    /// The input XML was malformed or structurally unexpected.
    #[error("failed to deserialize XML content: {0}")]
    Deserialization(String),

    /// The input JSON was malformed or structurally unexpected.
    #[error("failed to deserialize JSON content: {0}")]
    JsonDeserialization(String),

    /// A value could not be converted to its wire representation.
    #[error("failed to serialize value: {0}")]
    Serialization(String),

    /// A property was read or written in a way its definition or the owning
    /// object's state forbids.
    #[error("illegal property access: {0}")]
    PropertyAccess(String),

    /// A server identified itself with a version string we don't know about.
    #[error("unknown server version: {0}")]
    UnknownServerVersion(String),

    /// An error raised by the underlying XML reader or writer.
    #[error("error manipulating XML data")]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a `Deserialization` error from an expectation which wasn't met.
    pub(crate) fn unexpected(expected: impl std::fmt::Display, actual: impl std::fmt::Display) -> Self {
        Error::Deserialization(format!("expected {expected}, found {actual}"))
    }
}
