/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::sync::Arc;

use crate::property::definition::{PropertyDefinition, Schema};

/// A coarse-grained default selection of requested fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BasePropertySet {
    /// Only the object's identity.
    IdOnly,

    /// Every first-class field the schema declares.
    FirstClassProperties,
}

/// The set of properties requested from the server for a load.
///
/// A bag records the set it was populated from so "was this property
/// requested" can be answered later without re-deriving it.
#[derive(Clone, Debug)]
pub struct PropertySet {
    base: BasePropertySet,
    additional: Vec<Arc<PropertyDefinition>>,
}

impl PropertySet {
    pub fn new(base: BasePropertySet) -> Self {
        PropertySet {
            base,
            additional: Vec::new(),
        }
    }

    pub fn id_only() -> Self {
        Self::new(BasePropertySet::IdOnly)
    }

    pub fn first_class_properties() -> Self {
        Self::new(BasePropertySet::FirstClassProperties)
    }

    /// Adds a property on top of the base selection.
    pub fn add(&mut self, definition: Arc<PropertyDefinition>) {
        if !self.additional.iter().any(|added| *added == definition) {
            self.additional.push(definition);
        }
    }

    pub fn with(mut self, definition: Arc<PropertyDefinition>) -> Self {
        self.add(definition);
        self
    }

    pub fn base_property_set(&self) -> BasePropertySet {
        self.base
    }

    pub fn additional_properties(&self) -> &[Arc<PropertyDefinition>] {
        &self.additional
    }

    /// Whether the given definition falls within this request against the
    /// given schema.
    pub fn contains(&self, schema: &Schema, definition: &PropertyDefinition) -> bool {
        if self.additional.iter().any(|added| added.as_ref() == definition) {
            return true;
        }

        match self.base {
            BasePropertySet::IdOnly => schema
                .identity_property()
                .is_some_and(|identity| identity.as_ref() == definition),
            BasePropertySet::FirstClassProperties => schema.definition(definition.id()).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::definition::{PropertyDefinitionFlags, SchemaBuilder, ValueKind};

    #[test]
    fn id_only_covers_identity_and_additional_properties() {
        let mut builder = SchemaBuilder::new();
        let item_id = builder
            .property(
                "ItemId",
                "item:ItemId",
                ValueKind::Complex,
                PropertyDefinitionFlags::CAN_FIND,
            )
            .identity()
            .register();
        let subject = builder
            .property(
                "Subject",
                "item:Subject",
                ValueKind::String,
                PropertyDefinitionFlags::CAN_SET,
            )
            .register();
        let body = builder
            .property(
                "Body",
                "item:Body",
                ValueKind::String,
                PropertyDefinitionFlags::CAN_SET,
            )
            .register();
        let schema = builder.build();

        let set = PropertySet::id_only().with(subject.clone());

        assert!(set.contains(&schema, &item_id));
        assert!(set.contains(&schema, &subject));
        assert!(!set.contains(&schema, &body));
    }

    #[test]
    fn first_class_covers_every_schema_property() {
        let mut builder = SchemaBuilder::new();
        let subject = builder
            .property(
                "Subject",
                "item:Subject",
                ValueKind::String,
                PropertyDefinitionFlags::CAN_SET,
            )
            .register();
        let schema = builder.build();

        let set = PropertySet::first_class_properties();
        assert!(set.contains(&schema, &subject));
    }

    #[test]
    fn duplicate_additions_are_collapsed() {
        let mut builder = SchemaBuilder::new();
        let subject = builder
            .property(
                "Subject",
                "item:Subject",
                ValueKind::String,
                PropertyDefinitionFlags::CAN_SET,
            )
            .register();
        builder.build();

        let set = PropertySet::id_only()
            .with(subject.clone())
            .with(subject.clone());
        assert_eq!(set.additional_properties().len(), 1);
    }
}
