/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use fxhash::FxHashMap;

use crate::property::ComplexProperty;
use crate::version::ExchangeServerVersion;

/// The registry-assigned identity of a property definition.
///
/// Identity is scoped to the schema which assigned it; definitions are
/// compared and hashed by this key, never by name string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(u32);

#[cfg(test)]
impl PropertyId {
    pub(crate) fn for_tests(raw: u32) -> Self {
        PropertyId(raw)
    }
}

/// The declared wire type of a property's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Integer,
    Double,
    Boolean,
    DateTime,
    Bytes,
    Complex,
}

bitflags! {
    /// Capability flags gating what may be done with a property.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PropertyDefinitionFlags: u8 {
        /// The property may be assigned when creating the object.
        const CAN_SET = 1 << 0;

        /// The property may be included in an update operation.
        const CAN_UPDATE = 1 << 1;

        /// The property may be cleared on an existing object.
        const CAN_DELETE = 1 << 2;

        /// The property may appear in search restrictions.
        const CAN_FIND = 1 << 3;

        /// Reading the property while unset constructs and stores a default
        /// value rather than failing.
        const AUTO_INSTANTIATE_ON_READ = 1 << 4;
    }
}

type ComplexFactory = Box<dyn Fn() -> Box<dyn ComplexProperty> + Send + Sync>;

/// A named, typed field in a domain object's schema.
///
/// Definitions are shared as `Arc<PropertyDefinition>` handed out by the
/// [`Schema`] which registered them.
pub struct PropertyDefinition {
    id: PropertyId,
    local_name: String,
    field_uri: String,
    value_kind: ValueKind,
    flags: PropertyDefinitionFlags,
    minimum_version: ExchangeServerVersion,
    is_nullable: bool,
    default_complex: Option<ComplexFactory>,
}

impl PropertyDefinition {
    pub fn id(&self) -> PropertyId {
        self.id
    }

    /// The XML element name or JSON member name carrying this property.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The wire field path used in update operations, e.g. `item:Subject`.
    pub fn field_uri(&self) -> &str {
        &self.field_uri
    }

    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    pub fn flags(&self) -> PropertyDefinitionFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: PropertyDefinitionFlags) -> bool {
        self.flags.contains(flag)
    }

    /// The earliest Exchange Server version which understands this property.
    pub fn minimum_version(&self) -> ExchangeServerVersion {
        self.minimum_version
    }

    pub fn is_nullable(&self) -> bool {
        self.is_nullable
    }

    /// Constructs a default value for a complex property, if a factory was
    /// registered.
    pub fn instantiate_default(&self) -> Option<Box<dyn ComplexProperty>> {
        self.default_complex.as_ref().map(|factory| factory())
    }
}

impl PartialEq for PropertyDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PropertyDefinition {}

impl std::hash::Hash for PropertyDefinition {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for PropertyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDefinition")
            .field("id", &self.id)
            .field("local_name", &self.local_name)
            .field("field_uri", &self.field_uri)
            .field("value_kind", &self.value_kind)
            .field("flags", &self.flags)
            .field("minimum_version", &self.minimum_version)
            .field("is_nullable", &self.is_nullable)
            .finish()
    }
}

/// A registry of property definitions for one object type.
///
/// Exposes declaration-order iteration, name resolution for decode, and the
/// object's identity property.
pub struct Schema {
    definitions: Vec<Arc<PropertyDefinition>>,
    by_name: FxHashMap<String, usize>,
    identity: Option<usize>,
}

impl Schema {
    /// All definitions, in declaration order.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<PropertyDefinition>> {
        self.definitions.iter()
    }

    /// Resolves a wire name to its definition.
    pub fn try_get_property_definition(&self, local_name: &str) -> Option<Arc<PropertyDefinition>> {
        self.by_name
            .get(local_name)
            .map(|index| self.definitions[*index].clone())
    }

    pub fn definition(&self, id: PropertyId) -> Option<&Arc<PropertyDefinition>> {
        self.definitions.get(id.0 as usize)
    }

    /// The definition serving as the object's identity, if one was declared.
    pub fn identity_property(&self) -> Option<&Arc<PropertyDefinition>> {
        self.identity.map(|index| &self.definitions[index])
    }
}

/// Builds a [`Schema`], assigning each registered definition its identity.
#[derive(Default)]
pub struct SchemaBuilder {
    definitions: Vec<Arc<PropertyDefinition>>,
    by_name: FxHashMap<String, usize>,
    identity: Option<usize>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts registering a property. The returned builder is consumed by
    /// [`PropertyBuilder::register`], which hands back the shared definition.
    pub fn property(
        &mut self,
        local_name: &str,
        field_uri: &str,
        value_kind: ValueKind,
        flags: PropertyDefinitionFlags,
    ) -> PropertyBuilder<'_> {
        PropertyBuilder {
            owner: self,
            local_name: local_name.to_string(),
            field_uri: field_uri.to_string(),
            value_kind,
            flags,
            minimum_version: ExchangeServerVersion::Exchange2007,
            is_nullable: false,
            default_complex: None,
            is_identity: false,
        }
    }

    pub fn build(self) -> Arc<Schema> {
        Arc::new(Schema {
            definitions: self.definitions,
            by_name: self.by_name,
            identity: self.identity,
        })
    }
}

pub struct PropertyBuilder<'a> {
    owner: &'a mut SchemaBuilder,
    local_name: String,
    field_uri: String,
    value_kind: ValueKind,
    flags: PropertyDefinitionFlags,
    minimum_version: ExchangeServerVersion,
    is_nullable: bool,
    default_complex: Option<ComplexFactory>,
    is_identity: bool,
}

impl PropertyBuilder<'_> {
    /// Permits reading this property as absent without error.
    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn minimum_version(mut self, version: ExchangeServerVersion) -> Self {
        self.minimum_version = version;
        self
    }

    /// Registers a factory used to construct a default value for this
    /// complex property.
    pub fn default_complex(
        mut self,
        factory: impl Fn() -> Box<dyn ComplexProperty> + Send + Sync + 'static,
    ) -> Self {
        self.default_complex = Some(Box::new(factory));
        self
    }

    /// Marks this property as the object's identity. The identity is always
    /// readable, even when unset, to support access before creation.
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    pub fn register(self) -> Arc<PropertyDefinition> {
        let index = self.owner.definitions.len();
        let definition = Arc::new(PropertyDefinition {
            id: PropertyId(index as u32),
            local_name: self.local_name,
            field_uri: self.field_uri,
            value_kind: self.value_kind,
            flags: self.flags,
            minimum_version: self.minimum_version,
            is_nullable: self.is_nullable,
            default_complex: self.default_complex,
        });

        self.owner
            .by_name
            .insert(definition.local_name.clone(), index);
        self.owner.definitions.push(definition.clone());
        if self.is_identity {
            self.owner.identity = Some(index);
        }

        definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> PropertyDefinitionFlags {
        PropertyDefinitionFlags::CAN_SET | PropertyDefinitionFlags::CAN_UPDATE
    }

    #[test]
    fn definitions_compare_by_identity_not_name() {
        let mut first = SchemaBuilder::new();
        let a = first
            .property("Subject", "item:Subject", ValueKind::String, flags())
            .register();

        let mut second = SchemaBuilder::new();
        let b = second
            .property("Subject", "item:Subject", ValueKind::String, flags())
            .register();
        let c = second
            .property("Body", "item:Body", ValueKind::String, flags())
            .register();

        // Same name, same schema position, so the registry keys collide
        // across unrelated schemas; within one schema they never do.
        assert_eq!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_ne!(b, c);
    }

    #[test]
    fn name_resolution_and_declaration_order() {
        let mut builder = SchemaBuilder::new();
        let subject = builder
            .property("Subject", "item:Subject", ValueKind::String, flags())
            .register();
        let body = builder
            .property("Body", "item:Body", ValueKind::String, flags())
            .nullable()
            .register();
        let schema = builder.build();

        let resolved = schema.try_get_property_definition("Body").unwrap();
        assert_eq!(resolved, body);
        assert!(resolved.is_nullable());
        assert!(schema.try_get_property_definition("Nonesuch").is_none());

        let order: Vec<&str> = schema
            .definitions()
            .map(|def| def.local_name())
            .collect();
        assert_eq!(order, vec!["Subject", "Body"]);

        assert_eq!(schema.definition(subject.id()).unwrap(), &subject);
    }

    #[test]
    fn identity_property_is_exposed() {
        let mut builder = SchemaBuilder::new();
        builder
            .property("Subject", "item:Subject", ValueKind::String, flags())
            .register();
        let item_id = builder
            .property(
                "ItemId",
                "item:ItemId",
                ValueKind::Complex,
                PropertyDefinitionFlags::CAN_FIND,
            )
            .identity()
            .register();
        let schema = builder.build();

        assert_eq!(schema.identity_property().unwrap(), &item_id);
    }

    #[test]
    fn minimum_version_defaults_to_oldest() {
        let mut builder = SchemaBuilder::new();
        let def = builder
            .property("Flag", "item:Flag", ValueKind::Boolean, flags())
            .register();

        assert_eq!(def.minimum_version(), ExchangeServerVersion::Exchange2007);
    }
}
