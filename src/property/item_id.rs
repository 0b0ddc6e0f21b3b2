/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::any::Any;

use crate::json::{JsonScalar, JsonValue, JsonWriter};
use crate::property::value::{ChangeObserver, ComplexProperty};
use crate::xml::{XmlNamespace, XmlNodeType, XmlReader, XmlWriter};
use crate::Error;

/// The identity of an item on the server: an opaque ID plus a change key
/// tracking the revision last seen by this client.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/itemid>
#[derive(Debug, Default)]
pub struct ItemId {
    id: String,
    change_key: Option<String>,
    observer: Option<ChangeObserver>,
}

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        ItemId {
            id: id.into(),
            change_key: None,
            observer: None,
        }
    }

    pub fn with_change_key(id: impl Into<String>, change_key: impl Into<String>) -> Self {
        ItemId {
            id: id.into(),
            change_key: Some(change_key.into()),
            observer: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn change_key(&self) -> Option<&str> {
        self.change_key.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
        self.notify();
    }

    pub fn set_change_key(&mut self, change_key: impl Into<String>) {
        self.change_key = Some(change_key.into());
        self.notify();
    }

    fn notify(&self) {
        if let Some(observer) = &self.observer {
            observer.notify();
        }
    }
}

impl Clone for ItemId {
    // The clone starts life outside any bag; it must not report changes into
    // the bag observing the original.
    fn clone(&self) -> Self {
        ItemId {
            id: self.id.clone(),
            change_key: self.change_key.clone(),
            observer: None,
        }
    }
}

impl PartialEq for ItemId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.change_key == other.change_key
    }
}

impl ComplexProperty for ItemId {
    fn attach_observer(&mut self, observer: ChangeObserver) {
        self.observer = Some(observer);
    }

    fn detach_observer(&mut self) {
        self.observer = None;
    }

    fn validate(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::Serialization(
                "an item ID must have a non-empty Id before it can be sent".to_string(),
            ));
        }

        Ok(())
    }

    fn write_to_xml(&self, writer: &mut XmlWriter<'_>, local_name: &str) -> Result<(), Error> {
        writer.write_start_element(XmlNamespace::Types, local_name)?;
        writer.write_attribute_str("Id", &self.id)?;
        if let Some(change_key) = &self.change_key {
            writer.write_attribute_str("ChangeKey", change_key)?;
        }
        writer.write_end_element()
    }

    fn load_from_xml(&mut self, reader: &mut XmlReader<'_>) -> Result<(), Error> {
        self.id = reader.read_attribute_value("Id")?;
        self.change_key = reader.try_read_attribute_value("ChangeKey")?;

        reader.read_node(XmlNodeType::EndElement)
    }

    fn write_to_json(&self, writer: &mut JsonWriter<'_>) -> Result<(), Error> {
        writer.push_object_closure()?;
        writer.write_key("__type")?;
        writer.write_value("ItemId")?;
        writer.write_key("Id")?;
        writer.write_value(JsonScalar::String(&self.id))?;
        if let Some(change_key) = &self.change_key {
            writer.write_key("ChangeKey")?;
            writer.write_value(JsonScalar::String(change_key))?;
        }
        writer.pop_closure()
    }

    fn load_from_json(&mut self, value: &JsonValue) -> Result<(), Error> {
        self.id = value
            .get("Id")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                Error::JsonDeserialization("an item ID requires an Id member".to_string())
            })?
            .to_string();
        self.change_key = value
            .get("ChangeKey")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::json::parse;
    use crate::property::definition::PropertyId;

    #[test]
    fn xml_round_trip() {
        let original = ItemId::with_change_key("AAMkAD=", "CQAAABYA");

        let mut buf = Vec::new();
        {
            let mut writer = XmlWriter::new(&mut buf);
            original.write_to_xml(&mut writer, "ItemId").unwrap();
        }
        let xml = String::from_utf8(buf).unwrap();
        assert_eq!(
            xml,
            concat!(
                r#"<t:ItemId xmlns:t="http://schemas.microsoft.com/exchange/services/2006/types" "#,
                r#"Id="AAMkAD=" ChangeKey="CQAAABYA"/>"#,
            )
        );

        let mut reader = XmlReader::new(xml.as_bytes());
        reader
            .read_start_element(XmlNamespace::Types, "ItemId")
            .unwrap();
        let mut decoded = ItemId::default();
        decoded.load_from_xml(&mut reader).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn json_round_trip() {
        let original = ItemId::with_change_key("AAMkAD=", "CQAAABYA");

        let mut buf = Vec::new();
        {
            let mut writer = JsonWriter::new(&mut buf, false);
            original.write_to_json(&mut writer).unwrap();
        }
        let parsed = parse(&String::from_utf8(buf).unwrap()).unwrap();
        assert_eq!(
            parsed.get("__type").and_then(JsonValue::as_str),
            Some("ItemId")
        );

        let mut decoded = ItemId::default();
        decoded.load_from_json(&parsed).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn setters_notify_the_attached_observer() {
        let queue = Rc::new(RefCell::new(Vec::new()));
        let mut item_id = ItemId::new("AAMkAD=");
        item_id.attach_observer(ChangeObserver::new(queue.clone(), PropertyId::for_tests(3)));

        item_id.set_change_key("CQAAABYB");
        assert_eq!(queue.borrow().len(), 1);

        item_id.detach_observer();
        item_id.set_id("AAMkAE=");
        assert_eq!(queue.borrow().len(), 1);
    }

    #[test]
    fn validation_requires_an_id() {
        assert!(ItemId::default().validate().is_err());
        assert!(ItemId::new("AAMkAD=").validate().is_ok());
    }
}
