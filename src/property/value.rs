/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use time::OffsetDateTime;

use crate::json::{JsonValue, JsonWriter};
use crate::property::bag::ObjectDescriptor;
use crate::property::definition::{PropertyDefinition, PropertyId};
use crate::xml::{XmlReader, XmlWriter};
use crate::Error;

/// A property's stored value.
///
/// This is a closed union over the wire value kinds; serialization picks its
/// conversion strategy by matching on it rather than probing capabilities at
/// runtime.
#[derive(Debug)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    DateTime(OffsetDateTime),
    Bytes(Vec<u8>),
    Complex(Box<dyn ComplexProperty>),
}

impl PropertyValue {
    /// A human-readable name for the value's kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "string",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Double(_) => "double",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::DateTime(_) => "date-time",
            PropertyValue::Bytes(_) => "bytes",
            PropertyValue::Complex(_) => "complex",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&OffsetDateTime> {
        match self {
            PropertyValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_complex(&self) -> Option<&dyn ComplexProperty> {
        match self {
            PropertyValue::Complex(complex) => Some(complex.as_ref()),
            _ => None,
        }
    }

    pub fn as_complex_mut(&mut self) -> Option<&mut dyn ComplexProperty> {
        match self {
            PropertyValue::Complex(complex) => Some(complex.as_mut()),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

/// A handle through which a nested value reports mutations back to the bag
/// holding it.
///
/// The bag attaches an observer when a complex value is stored and detaches
/// it before the value is replaced or deleted; a value whose observer was
/// detached notifies nobody. Notifications land in a queue the bag absorbs
/// before its next observation or mutation.
#[derive(Clone, Debug)]
pub struct ChangeObserver {
    queue: Rc<RefCell<Vec<PropertyId>>>,
    property: PropertyId,
}

impl ChangeObserver {
    pub(crate) fn new(queue: Rc<RefCell<Vec<PropertyId>>>, property: PropertyId) -> Self {
        ChangeObserver { queue, property }
    }

    /// Reports that the observed value changed.
    pub fn notify(&self) {
        self.queue.borrow_mut().push(self.property);
    }
}

/// A nested, mutable property value with its own wire representation and
/// change log.
///
/// Implementations notify their attached [`ChangeObserver`] on every
/// mutation, so changing a nested structure dirties the containing property
/// without a fresh assignment.
pub trait ComplexProperty: Debug {
    /// Wires this value's change notification into a containing bag.
    fn attach_observer(&mut self, observer: ChangeObserver);

    /// Disconnects this value from its containing bag.
    fn detach_observer(&mut self);

    /// Collapses any nested change log into a clean baseline.
    fn clear_change_log(&mut self) {}

    /// Checks that the value is complete enough to serialize.
    fn validate(&self) -> Result<(), Error> {
        Ok(())
    }

    /// The value's scalar wire string, for the few complex values which have
    /// one. `None` means the value only has a structural representation.
    fn as_wire_value(&self) -> Option<String> {
        None
    }

    /// Writes the value as an XML element with the given name.
    fn write_to_xml(&self, writer: &mut XmlWriter<'_>, local_name: &str) -> Result<(), Error>;

    /// Populates the value from the start element the reader is positioned
    /// on, consuming through its matching end.
    fn load_from_xml(&mut self, reader: &mut XmlReader<'_>) -> Result<(), Error>;

    /// Writes the value as a JSON object.
    fn write_to_json(&self, writer: &mut JsonWriter<'_>) -> Result<(), Error>;

    /// Populates the value from a parsed JSON value.
    fn load_from_json(&mut self, value: &JsonValue) -> Result<(), Error>;

    /// Offers the value a chance to write its own set-update fragment.
    /// Returning `Ok(false)` declines, and the bag emits the generic one.
    fn write_set_update_to_xml(
        &self,
        _writer: &mut XmlWriter<'_>,
        _definition: &PropertyDefinition,
        _descriptor: &ObjectDescriptor,
    ) -> Result<bool, Error> {
        Ok(false)
    }

    /// Offers the value a chance to write its own delete-update fragment.
    fn write_delete_update_to_xml(
        &self,
        _writer: &mut XmlWriter<'_>,
        _definition: &PropertyDefinition,
        _descriptor: &ObjectDescriptor,
    ) -> Result<bool, Error> {
        Ok(false)
    }

    /// JSON counterpart of [`write_set_update_to_xml`](Self::write_set_update_to_xml).
    fn write_set_update_to_json(
        &self,
        _writer: &mut JsonWriter<'_>,
        _definition: &PropertyDefinition,
        _descriptor: &ObjectDescriptor,
    ) -> Result<bool, Error> {
        Ok(false)
    }

    /// JSON counterpart of [`write_delete_update_to_xml`](Self::write_delete_update_to_xml).
    fn write_delete_update_to_json(
        &self,
        _writer: &mut JsonWriter<'_>,
        _definition: &PropertyDefinition,
        _descriptor: &ObjectDescriptor,
    ) -> Result<bool, Error> {
        Ok(false)
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
