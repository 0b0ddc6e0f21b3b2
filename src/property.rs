/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The property bag engine: schema-keyed value storage with add/modify/delete
//! change tracking and wire serialization of the resulting deltas.

mod bag;
mod definition;
mod item_id;
mod set;
mod simple_bag;
mod value;

pub use bag::{ObjectDescriptor, PropertyBag};
pub use definition::{
    PropertyDefinition, PropertyDefinitionFlags, PropertyId, Schema, SchemaBuilder, ValueKind,
};
pub use item_id::ItemId;
pub use set::{BasePropertySet, PropertySet};
pub use simple_bag::SimplePropertyBag;
pub use value::{ChangeObserver, ComplexProperty, PropertyValue};
