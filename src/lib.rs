/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Change tracking and wire serialization for Exchange Web Services clients.
//!
//! This crate provides the property bag machinery which backs remote-backed
//! objects (messages, folders, attachments): a per-object store which tracks
//! which properties have been loaded from the server and which have been
//! added, modified or deleted since, and which serializes those changes into
//! EWS `CreateItem`/`UpdateItem`-style wire fragments. It also provides the
//! low-level streaming XML and legacy JSON codecs the bag rides on.
//!
//! Transport, authentication and the full property catalog live in consuming
//! crates; this crate only depends on the small interfaces they expose (a
//! schema registry and an object descriptor).

mod error;
pub mod json;
mod lazy_member;
pub mod property;
mod version;
pub mod xml;

pub use error::Error;
pub use lazy_member::{session_key, LazyMember};
pub use property::{
    BasePropertySet, ChangeObserver, ComplexProperty, ItemId, ObjectDescriptor, PropertyBag,
    PropertyDefinition, PropertyDefinitionFlags, PropertySet, PropertyValue, Schema,
    SchemaBuilder, SimplePropertyBag, ValueKind,
};
pub use version::ExchangeServerVersion;

/// The XML namespace for EWS operation envelopes.
pub const MESSAGES_NS_URI: &str =
    "http://schemas.microsoft.com/exchange/services/2006/messages";

/// The XML namespace for SOAP envelope elements.
pub const SOAP_NS_URI: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// The XML namespace for EWS data types.
pub const TYPES_NS_URI: &str = "http://schemas.microsoft.com/exchange/services/2006/types";
