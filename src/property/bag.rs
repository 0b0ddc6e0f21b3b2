/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use fxhash::{FxHashMap, FxHashSet};
use log::debug;
use time::OffsetDateTime;

use crate::json::{JsonScalar, JsonValue, JsonWriter};
use crate::property::definition::{
    PropertyDefinition, PropertyDefinitionFlags, PropertyId, Schema, ValueKind,
};
use crate::property::set::PropertySet;
use crate::property::value::{ChangeObserver, PropertyValue};
use crate::version::ExchangeServerVersion;
use crate::xml::{XmlNamespace, XmlNodeType, XmlReader, XmlWriter};
use crate::Error;

/// The wire names a domain object contributes to its bag's serialization.
///
/// For a mail message this would be `Message` / `ItemChange` / `SetItemField`
/// / `DeleteItemField`; folders and other object families substitute their
/// own operation names around the same structure.
#[derive(Clone, Copy, Debug)]
pub struct ObjectDescriptor {
    /// The element carrying the object itself, in the Types namespace.
    pub xml_element_name: &'static str,

    /// The element wrapping one object's updates in an update operation.
    pub change_element_name: &'static str,

    /// The element carrying a single set-field update.
    pub set_field_element_name: &'static str,

    /// The element carrying a single delete-field update.
    pub delete_field_element_name: &'static str,

    /// The `__type` discriminator used in the legacy JSON format.
    pub json_type_name: &'static str,
}

/// A per-object property store with add/modify/delete change tracking.
///
/// The bag owns every remote-backed value of its object and records how each
/// one diverged from the last clean baseline: values assigned where none
/// existed are *added*, overwritten values are *modified*, and explicitly
/// cleared values are *deleted* (keeping the cleared value around, since
/// delete updates may need to echo its identity). Decoding a server response
/// marks values *loaded*, which is independent of the three change states.
///
/// Serialization walks these lists: creation emits the full set-capable
/// contents in schema order, updates emit only the deltas in mutation order.
///
/// A bag belongs to exactly one object for that object's lifetime and is
/// single-threaded; nested values report their mutations through `Rc`-based
/// observer plumbing, which also keeps the bag deliberately `!Send`.
pub struct PropertyBag {
    schema: Arc<Schema>,
    descriptor: ObjectDescriptor,
    version: ExchangeServerVersion,

    properties: FxHashMap<PropertyId, PropertyValue>,
    loaded: FxHashSet<PropertyId>,
    added: Vec<PropertyId>,
    modified: Vec<PropertyId>,
    deleted: Vec<(PropertyId, Option<PropertyValue>)>,

    requested: Option<PropertySet>,
    summary_only: bool,

    /// Suspends write-legality checks while bulk-populating from a decode.
    loading: bool,
    /// Forced dirtiness, independent of the change lists.
    dirty: bool,
    is_new: bool,
    is_attachment: bool,

    /// Change notifications from nested values, absorbed before every
    /// observation or mutation.
    pending_changes: Rc<RefCell<Vec<PropertyId>>>,
    on_change: Option<Box<dyn FnMut()>>,
}

impl PropertyBag {
    /// Creates the bag for a new (not yet created remotely) object.
    pub fn new(
        schema: Arc<Schema>,
        descriptor: ObjectDescriptor,
        version: ExchangeServerVersion,
    ) -> Self {
        PropertyBag {
            schema,
            descriptor,
            version,
            properties: FxHashMap::default(),
            loaded: FxHashSet::default(),
            added: Vec::new(),
            modified: Vec::new(),
            deleted: Vec::new(),
            requested: None,
            summary_only: false,
            loading: false,
            dirty: false,
            is_new: true,
            is_attachment: false,
            pending_changes: Rc::new(RefCell::new(Vec::new())),
            on_change: None,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn version(&self) -> ExchangeServerVersion {
        self.version
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Marks the owning object as existing remotely (or not). Affects which
    /// capability flags gate writes.
    pub fn set_is_new(&mut self, is_new: bool) {
        self.is_new = is_new;
    }

    pub fn is_attachment(&self) -> bool {
        self.is_attachment
    }

    /// Marks the owning object as an item attachment. Attachments cannot be
    /// updated independently, so all writes to an existing attachment fail.
    pub fn set_is_attachment(&mut self, is_attachment: bool) {
        self.is_attachment = is_attachment;
    }

    /// Registers the owner's "something changed" callback.
    pub fn set_on_change(&mut self, callback: impl FnMut() + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    /// Reads a property value.
    ///
    /// Absent complex properties flagged for auto-instantiation are
    /// constructed, stored and returned; this read has a documented side
    /// effect. The identity property and nullable properties read as `None`
    /// when unset; any other unset property is a [`Error::PropertyAccess`]
    /// failure, with "requested but absent" distinguished from "never
    /// loaded".
    pub fn get(
        &mut self,
        definition: &Arc<PropertyDefinition>,
    ) -> Result<Option<&PropertyValue>, Error> {
        self.absorb_nested_changes();
        self.check_version(definition)?;

        let id = definition.id();
        if self.properties.contains_key(&id) {
            return Ok(self.properties.get(&id));
        }

        if definition.value_kind() == ValueKind::Complex
            && definition.has_flag(PropertyDefinitionFlags::AUTO_INSTANTIATE_ON_READ)
        {
            if let Some(mut complex) = definition.instantiate_default() {
                complex.attach_observer(self.observer_for(id));
                self.properties.insert(id, PropertyValue::Complex(complex));
                return Ok(self.properties.get(&id));
            }
        }

        if self.is_identity(definition) || definition.is_nullable() {
            return Ok(None);
        }

        if self.loaded.contains(&id) {
            Err(Error::PropertyAccess(format!(
                "{} was requested but the server returned no value for it",
                definition.local_name()
            )))
        } else {
            Err(Error::PropertyAccess(format!(
                "{} must be loaded or assigned before it can be read",
                definition.local_name()
            )))
        }
    }

    /// Reads a property value for in-place mutation, under the same rules as
    /// [`get`](Self::get).
    pub fn get_mut(
        &mut self,
        definition: &Arc<PropertyDefinition>,
    ) -> Result<Option<&mut PropertyValue>, Error> {
        self.get(definition)?;

        Ok(self.properties.get_mut(&definition.id()))
    }

    /// Assigns a property value.
    ///
    /// Outside loading mode the write is gated by the owner's state: a new
    /// object requires the set capability, an existing attachment rejects all
    /// writes, and an existing object requires the update capability.
    pub fn set(
        &mut self,
        definition: &Arc<PropertyDefinition>,
        value: PropertyValue,
    ) -> Result<(), Error> {
        self.absorb_nested_changes();
        self.check_version(definition)?;
        if !self.loading {
            self.check_write_legality(definition, false)?;
        }

        let id = definition.id();
        if let Some(PropertyValue::Complex(prior)) = self.properties.get_mut(&id) {
            prior.detach_observer();
        }

        if let Some(position) = self.deleted.iter().position(|(deleted, _)| *deleted == id) {
            // Re-setting a deleted property un-deletes it.
            self.deleted.remove(position);
            self.track_modified(id);
        } else if self.properties.contains_key(&id) {
            // A second assignment is no longer a fresh addition.
            self.added.retain(|added| *added != id);
            self.track_modified(id);
        } else if self.loaded.contains(&id) {
            // The server sent this property (possibly with no value), so
            // assigning it is a modification of server-backed state.
            self.track_modified(id);
        } else {
            self.added.push(id);
        }

        let mut value = value;
        if let PropertyValue::Complex(complex) = &mut value {
            complex.attach_observer(self.observer_for(id));
        }
        self.properties.insert(id, value);
        self.changed();

        Ok(())
    }

    /// Clears a property, routing through the delete path.
    ///
    /// On an existing object this requires the delete capability; on a new
    /// object the set capability, since the write never reaches the wire as a
    /// deletion.
    pub fn set_null(&mut self, definition: &Arc<PropertyDefinition>) -> Result<(), Error> {
        self.absorb_nested_changes();
        self.check_version(definition)?;
        if !self.loading {
            self.check_write_legality(definition, true)?;
        }

        self.delete_property(definition);

        Ok(())
    }

    /// Removes a property from storage and records the deletion, keeping the
    /// last-known value for delete-update serialization.
    ///
    /// This bypasses the capability checks of [`set_null`](Self::set_null);
    /// it is the raw state transition owners use internally. A no-op if the
    /// property is already deleted.
    pub fn delete_property(&mut self, definition: &Arc<PropertyDefinition>) {
        self.absorb_nested_changes();

        let id = definition.id();
        if self.deleted.iter().any(|(deleted, _)| *deleted == id) {
            return;
        }

        let mut captured = self.properties.remove(&id);
        if let Some(PropertyValue::Complex(complex)) = &mut captured {
            complex.detach_observer();
        }

        self.added.retain(|added| *added != id);
        self.modified.retain(|modified| *modified != id);
        self.deleted.push((id, captured));
        self.changed();
    }

    /// Whether a value is currently stored for the property. No access checks.
    pub fn contains(&self, definition: &Arc<PropertyDefinition>) -> bool {
        self.properties.contains_key(&definition.id())
    }

    /// The stored value, bypassing all access checks and auto-instantiation.
    pub fn try_get(&self, definition: &Arc<PropertyDefinition>) -> Option<&PropertyValue> {
        self.properties.get(&definition.id())
    }

    /// Whether the property's value came from a load, including properties
    /// which were requested but absent from the response.
    pub fn is_property_loaded(&self, definition: &Arc<PropertyDefinition>) -> bool {
        self.loaded.contains(&definition.id())
    }

    /// Whether the property fell within the set requested for the last load.
    /// A bag never populated from a load considers every property requested.
    pub fn is_requested_property(&self, definition: &Arc<PropertyDefinition>) -> bool {
        match &self.requested {
            Some(requested) => requested.contains(&self.schema, definition),
            None => true,
        }
    }

    pub fn requested_property_set(&self) -> Option<&PropertySet> {
        self.requested.as_ref()
    }

    /// Whether the last load carried summary data only.
    pub fn is_summary_loaded(&self) -> bool {
        self.summary_only
    }

    pub fn added_properties(&mut self) -> &[PropertyId] {
        self.absorb_nested_changes();
        &self.added
    }

    pub fn modified_properties(&mut self) -> &[PropertyId] {
        self.absorb_nested_changes();
        &self.modified
    }

    pub fn deleted_properties(&mut self) -> Vec<PropertyId> {
        self.absorb_nested_changes();
        self.deleted.iter().map(|(id, _)| *id).collect()
    }

    /// Whether the bag holds any pending change relative to its last clean
    /// baseline.
    pub fn is_dirty(&mut self) -> bool {
        self.absorb_nested_changes();

        self.dirty
            || !self.added.is_empty()
            || !self.modified.is_empty()
            || !self.deleted.is_empty()
    }

    /// Forces the bag dirty without recording a property change.
    pub fn touch(&mut self) {
        self.changed();
    }

    /// Resets all storage, tracking state and the requested-property-set
    /// context, for re-binding the owner to a different property set.
    pub fn clear(&mut self) {
        self.properties.clear();
        self.loaded.clear();
        self.added.clear();
        self.modified.clear();
        self.deleted.clear();
        self.requested = None;
        self.summary_only = false;
        self.loading = false;
        self.dirty = false;
        self.pending_changes.borrow_mut().clear();
    }

    /// Collapses current state into a new clean baseline, recursing into
    /// every stored complex value's own change log. Called after a
    /// successful load or save.
    pub fn clear_change_log(&mut self) {
        self.added.clear();
        self.modified.clear();
        self.deleted.clear();
        self.dirty = false;
        self.pending_changes.borrow_mut().clear();

        for value in self.properties.values_mut() {
            if let PropertyValue::Complex(complex) = value {
                complex.clear_change_log();
            }
        }
    }

    /// Runs self-validation on every added or modified complex value.
    pub fn validate(&mut self) -> Result<(), Error> {
        self.absorb_nested_changes();

        let pending: Vec<PropertyId> = self
            .added
            .iter()
            .chain(self.modified.iter())
            .copied()
            .collect();
        for id in pending {
            if let Some(PropertyValue::Complex(complex)) = self.properties.get(&id) {
                complex.validate()?;
            }
        }

        Ok(())
    }

    /// Whether any pending change touches an update-capable property. False
    /// means the orchestration layer can skip the update round-trip
    /// entirely.
    pub fn is_update_call_necessary(&mut self) -> bool {
        self.absorb_nested_changes();

        let schema = self.schema.clone();
        self.added
            .iter()
            .chain(self.modified.iter())
            .copied()
            .chain(self.deleted.iter().map(|(id, _)| *id))
            .any(|id| {
                schema
                    .definition(id)
                    .is_some_and(|definition| {
                        definition.has_flag(PropertyDefinitionFlags::CAN_UPDATE)
                    })
            })
    }

    /// Populates the bag from the object's XML element.
    ///
    /// The reader must be positioned before the object's start element.
    /// Unrecognized child elements are skipped wholesale, so additions on the
    /// server side do not break older clients. On success the decoded data
    /// becomes the new clean baseline.
    pub fn load_from_xml(
        &mut self,
        reader: &mut XmlReader<'_>,
        clear: bool,
        requested: Option<&PropertySet>,
        summary_only: bool,
    ) -> Result<(), Error> {
        if clear {
            self.clear();
        }
        self.requested = requested.cloned();
        self.summary_only = summary_only;

        // The loading flag must clear on every exit path; a failed decode
        // must not leave legality checks permanently suspended.
        self.loading = true;
        let result = self.load_from_xml_contents(reader);
        self.loading = false;

        if result.is_ok() {
            self.mark_requested_as_loaded();
            self.clear_change_log();
        }

        result
    }

    fn load_from_xml_contents(&mut self, reader: &mut XmlReader<'_>) -> Result<(), Error> {
        let element_name = self.descriptor.xml_element_name;
        reader.read_start_element(XmlNamespace::Types, element_name)?;
        if reader.is_empty_element() {
            return reader.read_node(XmlNodeType::EndElement);
        }

        loop {
            reader.read()?;
            match reader.node_type() {
                XmlNodeType::EndElement if reader.local_name() == element_name => break,

                XmlNodeType::StartElement => {
                    let local_name = reader.local_name().to_string();
                    match self.schema.try_get_property_definition(&local_name) {
                        Some(definition) => {
                            self.load_property_from_xml(reader, &definition)?;
                        }
                        None => {
                            debug!(
                                "skipping unrecognized element <{local_name}> in <{element_name}>"
                            );
                            reader.skip_current_element()?;
                        }
                    }
                }

                other => {
                    return Err(Error::unexpected(
                        format!("a property element in <{element_name}>"),
                        other,
                    ))
                }
            }
        }

        Ok(())
    }

    fn load_property_from_xml(
        &mut self,
        reader: &mut XmlReader<'_>,
        definition: &Arc<PropertyDefinition>,
    ) -> Result<(), Error> {
        let id = definition.id();
        let value = match definition.value_kind() {
            ValueKind::String => PropertyValue::String(reader.read_element_value()?),
            ValueKind::Integer => PropertyValue::Integer(reader.read_typed_element_value()?),
            ValueKind::Double => PropertyValue::Double(reader.read_typed_element_value()?),
            ValueKind::Boolean => PropertyValue::Boolean(reader.read_typed_element_value()?),
            ValueKind::DateTime => {
                PropertyValue::DateTime(parse_timestamp(&reader.read_element_value()?)?)
            }
            ValueKind::Bytes => PropertyValue::Bytes(reader.read_base64_element_value()?),
            ValueKind::Complex => {
                let mut complex = definition.instantiate_default().ok_or_else(|| {
                    Error::Deserialization(format!(
                        "no factory registered to decode complex property {}",
                        definition.local_name()
                    ))
                })?;
                complex.load_from_xml(reader)?;
                complex.attach_observer(self.observer_for(id));
                PropertyValue::Complex(complex)
            }
        };

        if let Some(PropertyValue::Complex(prior)) = self.properties.get_mut(&id) {
            prior.detach_observer();
        }
        self.properties.insert(id, value);
        self.loaded.insert(id);

        Ok(())
    }

    /// Populates the bag from a parsed legacy-JSON object.
    pub fn load_from_json(
        &mut self,
        value: &JsonValue,
        clear: bool,
        requested: Option<&PropertySet>,
        summary_only: bool,
    ) -> Result<(), Error> {
        if clear {
            self.clear();
        }
        self.requested = requested.cloned();
        self.summary_only = summary_only;

        self.loading = true;
        let result = self.load_from_json_members(value);
        self.loading = false;

        if result.is_ok() {
            self.mark_requested_as_loaded();
            self.clear_change_log();
        }

        result
    }

    fn load_from_json_members(&mut self, value: &JsonValue) -> Result<(), Error> {
        let JsonValue::Object(members) = value else {
            return Err(Error::JsonDeserialization(format!(
                "expected a JSON object for {}",
                self.descriptor.json_type_name
            )));
        };

        let schema = self.schema.clone();
        for (key, member) in members {
            if key == "__type" {
                continue;
            }

            let Some(definition) = schema.try_get_property_definition(key) else {
                debug!(
                    "skipping unrecognized member {key} in {}",
                    self.descriptor.json_type_name
                );
                continue;
            };
            let id = definition.id();

            if member.is_null() {
                // The server sent the member with no value.
                self.loaded.insert(id);
                continue;
            }

            let value = match definition.value_kind() {
                ValueKind::String => PropertyValue::String(
                    expect_json_str(key, member)?.to_string(),
                ),
                ValueKind::Integer => {
                    PropertyValue::Integer(member.as_i64().ok_or_else(|| {
                        Error::JsonDeserialization(format!("member {key} is not an integer"))
                    })?)
                }
                ValueKind::Double => {
                    // A whole double may arrive in integer form.
                    let double = member
                        .as_f64()
                        .or_else(|| member.as_i64().map(|i| i as f64))
                        .ok_or_else(|| {
                            Error::JsonDeserialization(format!("member {key} is not a number"))
                        })?;
                    PropertyValue::Double(double)
                }
                ValueKind::Boolean => {
                    PropertyValue::Boolean(member.as_bool().ok_or_else(|| {
                        Error::JsonDeserialization(format!("member {key} is not a boolean"))
                    })?)
                }
                ValueKind::DateTime => {
                    PropertyValue::DateTime(parse_timestamp(expect_json_str(key, member)?)?)
                }
                ValueKind::Bytes => {
                    let decoded = BASE64
                        .decode(expect_json_str(key, member)?.as_bytes())
                        .map_err(|err| {
                            Error::JsonDeserialization(format!(
                                "member {key} holds invalid base64 content: {err}"
                            ))
                        })?;
                    PropertyValue::Bytes(decoded)
                }
                ValueKind::Complex => {
                    let mut complex = definition.instantiate_default().ok_or_else(|| {
                        Error::JsonDeserialization(format!(
                            "no factory registered to decode complex property {}",
                            definition.local_name()
                        ))
                    })?;
                    complex.load_from_json(member)?;
                    complex.attach_observer(self.observer_for(id));
                    PropertyValue::Complex(complex)
                }
            };

            if let Some(PropertyValue::Complex(prior)) = self.properties.get_mut(&id) {
                prior.detach_observer();
            }
            self.properties.insert(id, value);
            self.loaded.insert(id);
        }

        Ok(())
    }

    /// Writes the full set-capable contents as the object's creation
    /// element.
    ///
    /// Field ordering follows the schema's declaration order, never
    /// assignment order, so the wire shape is stable.
    pub fn write_to_xml_for_create(&mut self, writer: &mut XmlWriter<'_>) -> Result<(), Error> {
        self.absorb_nested_changes();

        writer.write_start_element(XmlNamespace::Types, self.descriptor.xml_element_name)?;

        let schema = self.schema.clone();
        for definition in schema.definitions() {
            if !definition.has_flag(PropertyDefinitionFlags::CAN_SET)
                || definition.minimum_version() > self.version
            {
                continue;
            }
            let Some(value) = self.properties.get(&definition.id()) else {
                continue;
            };

            write_property_to_xml(writer, definition, value)?;
        }

        writer.write_end_element()
    }

    /// Writes the pending deltas as an update-operation change fragment:
    /// the object's identity, then an `Updates` container holding set-field
    /// fragments for added then modified properties and delete-field
    /// fragments for deleted ones.
    ///
    /// Within each phase, ordering follows the order mutations happened,
    /// not schema order.
    pub fn write_to_xml_for_update(&mut self, writer: &mut XmlWriter<'_>) -> Result<(), Error> {
        self.absorb_nested_changes();

        let schema = self.schema.clone();
        let identity = self.require_identity()?;

        writer.write_start_element(XmlNamespace::Types, self.descriptor.change_element_name)?;

        let identity_value = self.properties.get(&identity.id()).ok_or_else(|| {
            Error::PropertyAccess(format!(
                "cannot serialize an update for a {} whose identity is unset",
                self.descriptor.xml_element_name
            ))
        })?;
        write_property_to_xml(writer, &identity, identity_value)?;

        writer.write_start_element(XmlNamespace::Types, "Updates")?;

        for id in self.added.clone() {
            self.write_set_update_to_xml(writer, &schema, id)?;
        }
        for id in self.modified.clone() {
            self.write_set_update_to_xml(writer, &schema, id)?;
        }
        for (id, captured) in &self.deleted {
            write_delete_update_to_xml(writer, &self.descriptor, &schema, *id, captured.as_ref())?;
        }

        writer.write_end_element()?;
        writer.write_end_element()
    }

    fn write_set_update_to_xml(
        &self,
        writer: &mut XmlWriter<'_>,
        schema: &Schema,
        id: PropertyId,
    ) -> Result<(), Error> {
        let Some(definition) = schema.definition(id) else {
            return Ok(());
        };
        if self.is_identity(definition)
            || !definition.has_flag(PropertyDefinitionFlags::CAN_UPDATE)
        {
            return Ok(());
        }
        let Some(value) = self.properties.get(&id) else {
            return Ok(());
        };

        // Values with nonstandard update semantics serialize themselves.
        if let PropertyValue::Complex(complex) = value {
            if complex.write_set_update_to_xml(writer, definition, &self.descriptor)? {
                return Ok(());
            }
        }

        writer.write_start_element(XmlNamespace::Types, self.descriptor.set_field_element_name)?;
        write_field_uri(writer, definition)?;
        writer.write_start_element(XmlNamespace::Types, self.descriptor.xml_element_name)?;
        write_property_to_xml(writer, definition, value)?;
        writer.write_end_element()?;
        writer.write_end_element()
    }

    /// JSON counterpart of [`write_to_xml_for_create`](Self::write_to_xml_for_create).
    pub fn write_to_json_for_create(&mut self, writer: &mut JsonWriter<'_>) -> Result<(), Error> {
        self.absorb_nested_changes();

        writer.push_object_closure()?;
        writer.write_key("__type")?;
        writer.write_value(self.descriptor.json_type_name)?;

        let schema = self.schema.clone();
        for definition in schema.definitions() {
            if !definition.has_flag(PropertyDefinitionFlags::CAN_SET)
                || definition.minimum_version() > self.version
            {
                continue;
            }
            let Some(value) = self.properties.get(&definition.id()) else {
                continue;
            };

            writer.write_key(definition.local_name())?;
            write_property_to_json(writer, value)?;
        }

        writer.pop_closure()
    }

    /// JSON counterpart of [`write_to_xml_for_update`](Self::write_to_xml_for_update):
    /// the identity alongside an `Updates` array of per-field update
    /// objects, mirroring the XML structure field-for-field.
    pub fn write_to_json_for_update(&mut self, writer: &mut JsonWriter<'_>) -> Result<(), Error> {
        self.absorb_nested_changes();

        let schema = self.schema.clone();
        let identity = self.require_identity()?;
        let identity_value = self.properties.get(&identity.id()).ok_or_else(|| {
            Error::PropertyAccess(format!(
                "cannot serialize an update for a {} whose identity is unset",
                self.descriptor.xml_element_name
            ))
        })?;

        writer.push_object_closure()?;
        writer.write_key("__type")?;
        writer.write_value(self.descriptor.change_element_name)?;
        writer.write_key(identity.local_name())?;
        write_property_to_json(writer, identity_value)?;

        writer.write_key("Updates")?;
        writer.push_array_closure()?;
        for id in self.added.clone() {
            self.write_set_update_to_json(writer, &schema, id)?;
        }
        for id in self.modified.clone() {
            self.write_set_update_to_json(writer, &schema, id)?;
        }
        for (id, captured) in &self.deleted {
            write_delete_update_to_json(writer, &self.descriptor, &schema, *id, captured.as_ref())?;
        }
        writer.pop_closure()?;

        writer.pop_closure()
    }

    fn write_set_update_to_json(
        &self,
        writer: &mut JsonWriter<'_>,
        schema: &Schema,
        id: PropertyId,
    ) -> Result<(), Error> {
        let Some(definition) = schema.definition(id) else {
            return Ok(());
        };
        if self.is_identity(definition)
            || !definition.has_flag(PropertyDefinitionFlags::CAN_UPDATE)
        {
            return Ok(());
        }
        let Some(value) = self.properties.get(&id) else {
            return Ok(());
        };

        if let PropertyValue::Complex(complex) = value {
            if complex.write_set_update_to_json(writer, definition, &self.descriptor)? {
                return Ok(());
            }
        }

        writer.push_object_closure()?;
        writer.write_key("__type")?;
        writer.write_value(self.descriptor.set_field_element_name)?;
        writer.write_key("Path")?;
        writer.push_object_closure()?;
        writer.write_key("FieldURI")?;
        writer.write_value(definition.field_uri())?;
        writer.pop_closure()?;
        writer.write_key(self.descriptor.xml_element_name)?;
        writer.push_object_closure()?;
        writer.write_key("__type")?;
        writer.write_value(self.descriptor.json_type_name)?;
        writer.write_key(definition.local_name())?;
        write_property_to_json(writer, value)?;
        writer.pop_closure()?;
        writer.pop_closure()
    }

    fn require_identity(&self) -> Result<Arc<PropertyDefinition>, Error> {
        self.schema
            .identity_property()
            .cloned()
            .ok_or_else(|| {
                Error::PropertyAccess(format!(
                    "cannot serialize an update for a {} with no identity property",
                    self.descriptor.xml_element_name
                ))
            })
    }

    fn is_identity(&self, definition: &PropertyDefinition) -> bool {
        self.schema
            .identity_property()
            .is_some_and(|identity| identity.as_ref() == definition)
    }

    fn check_version(&self, definition: &PropertyDefinition) -> Result<(), Error> {
        if definition.minimum_version() > self.version {
            return Err(Error::Version {
                name: definition.local_name().to_string(),
                required: definition.minimum_version(),
                current: self.version,
            });
        }

        Ok(())
    }

    fn check_write_legality(
        &self,
        definition: &PropertyDefinition,
        is_null: bool,
    ) -> Result<(), Error> {
        if self.is_new {
            if !definition.has_flag(PropertyDefinitionFlags::CAN_SET) {
                return Err(Error::PropertyAccess(format!(
                    "{} cannot be assigned when creating a new {}",
                    definition.local_name(),
                    self.descriptor.xml_element_name
                )));
            }
            return Ok(());
        }

        if self.is_attachment {
            return Err(Error::PropertyAccess(format!(
                "{} cannot be changed on an item attachment; attachments cannot be updated independently",
                definition.local_name()
            )));
        }

        if is_null && !definition.has_flag(PropertyDefinitionFlags::CAN_DELETE) {
            return Err(Error::PropertyAccess(format!(
                "{} cannot be deleted from an existing {}",
                definition.local_name(),
                self.descriptor.xml_element_name
            )));
        }

        if !is_null && !definition.has_flag(PropertyDefinitionFlags::CAN_UPDATE) {
            return Err(Error::PropertyAccess(format!(
                "{} cannot be updated on an existing {}",
                definition.local_name(),
                self.descriptor.xml_element_name
            )));
        }

        Ok(())
    }

    fn observer_for(&self, id: PropertyId) -> ChangeObserver {
        ChangeObserver::new(self.pending_changes.clone(), id)
    }

    /// Drains pending nested-change notifications, reclassifying their
    /// owning definitions as modified and propagating dirtiness.
    fn absorb_nested_changes(&mut self) {
        let pending: Vec<PropertyId> = self.pending_changes.borrow_mut().drain(..).collect();

        for id in pending {
            if self.deleted.iter().any(|(deleted, _)| *deleted == id) {
                continue;
            }
            if !self.added.contains(&id) {
                self.track_modified(id);
            }
            self.changed();
        }
    }

    fn track_modified(&mut self, id: PropertyId) {
        if !self.modified.contains(&id) {
            self.modified.push(id);
        }
    }

    fn mark_requested_as_loaded(&mut self) {
        let Some(requested) = self.requested.clone() else {
            return;
        };

        let schema = self.schema.clone();
        for definition in schema.definitions() {
            if requested.contains(&schema, definition) {
                self.loaded.insert(definition.id());
            }
        }
    }

    fn changed(&mut self) {
        self.dirty = true;
        if let Some(callback) = self.on_change.as_mut() {
            callback();
        }
    }
}

fn write_property_to_xml(
    writer: &mut XmlWriter<'_>,
    definition: &PropertyDefinition,
    value: &PropertyValue,
) -> Result<(), Error> {
    match value {
        PropertyValue::Complex(complex) => complex.write_to_xml(writer, definition.local_name()),
        scalar => writer.write_element_value(XmlNamespace::Types, definition.local_name(), Some(scalar)),
    }
}

fn write_field_uri(
    writer: &mut XmlWriter<'_>,
    definition: &PropertyDefinition,
) -> Result<(), Error> {
    writer.write_start_element(XmlNamespace::Types, "FieldURI")?;
    writer.write_attribute_str("FieldURI", definition.field_uri())?;
    writer.write_end_element()
}

fn write_delete_update_to_xml(
    writer: &mut XmlWriter<'_>,
    descriptor: &ObjectDescriptor,
    schema: &Schema,
    id: PropertyId,
    captured: Option<&PropertyValue>,
) -> Result<(), Error> {
    let Some(definition) = schema.definition(id) else {
        return Ok(());
    };
    if !definition.has_flag(PropertyDefinitionFlags::CAN_UPDATE) {
        return Ok(());
    }

    if let Some(PropertyValue::Complex(complex)) = captured {
        if complex.write_delete_update_to_xml(writer, definition, descriptor)? {
            return Ok(());
        }
    }

    writer.write_start_element(XmlNamespace::Types, descriptor.delete_field_element_name)?;
    write_field_uri(writer, definition)?;
    writer.write_end_element()
}

fn write_delete_update_to_json(
    writer: &mut JsonWriter<'_>,
    descriptor: &ObjectDescriptor,
    schema: &Schema,
    id: PropertyId,
    captured: Option<&PropertyValue>,
) -> Result<(), Error> {
    let Some(definition) = schema.definition(id) else {
        return Ok(());
    };
    if !definition.has_flag(PropertyDefinitionFlags::CAN_UPDATE) {
        return Ok(());
    }

    if let Some(PropertyValue::Complex(complex)) = captured {
        if complex.write_delete_update_to_json(writer, definition, descriptor)? {
            return Ok(());
        }
    }

    writer.push_object_closure()?;
    writer.write_key("__type")?;
    writer.write_value(descriptor.delete_field_element_name)?;
    writer.write_key("Path")?;
    writer.push_object_closure()?;
    writer.write_key("FieldURI")?;
    writer.write_value(definition.field_uri())?;
    writer.pop_closure()?;
    writer.pop_closure()
}

fn write_property_to_json(
    writer: &mut JsonWriter<'_>,
    value: &PropertyValue,
) -> Result<(), Error> {
    match value {
        PropertyValue::String(s) => writer.write_value(JsonScalar::String(s)),
        PropertyValue::Integer(i) => writer.write_value(*i),
        PropertyValue::Double(d) => writer.write_value(*d),
        PropertyValue::Boolean(b) => writer.write_value(*b),
        PropertyValue::DateTime(dt) => writer.write_datetime_value(dt),
        PropertyValue::Bytes(bytes) => {
            writer.write_value(JsonScalar::String(&BASE64.encode(bytes)))
        }
        PropertyValue::Complex(complex) => complex.write_to_json(writer),
    }
}

fn expect_json_str<'v>(key: &str, member: &'v JsonValue) -> Result<&'v str, Error> {
    member
        .as_str()
        .ok_or_else(|| Error::JsonDeserialization(format!("member {key} is not a string")))
}

fn parse_timestamp(text: &str) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339)
        .map_err(|err| Error::Deserialization(format!("invalid timestamp {text:?}: {err}")))
}
