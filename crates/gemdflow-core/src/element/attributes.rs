//! Attribute slots of an element and the attribute merge rule.

use crate::model::{
    Attribute, AttributeKind, AttributeTemplate, Bounds, EntityRef, Handle, ObjectTemplate, Ref,
    Value,
};
use crate::store::{Provenance, StoresConfig};
use crate::types::GemdError;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One attribute an element accepts.
#[derive(Debug, Clone)]
pub struct AttributeSlot {
    pub kind: AttributeKind,
    pub template: Handle<AttributeTemplate>,
    /// Narrowed bounds from the object template, if any.
    pub bounds: Option<Bounds>,
    /// Slots with a default value are required.
    pub default_value: Option<Value>,
}

impl AttributeSlot {
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default_value.is_some()
    }

    /// Narrowed bounds, else the attribute template's.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        self.bounds
            .clone()
            .unwrap_or_else(|| self.template.read().bounds.clone())
    }

    /// A fresh attribute carrying this slot's default value.
    #[must_use]
    pub fn default_attribute(&self, name: &str) -> Option<Attribute> {
        self.default_value.as_ref().map(|value| {
            Attribute::new(self.kind, name)
                .with_template(&self.template)
                .with_value(value.clone())
        })
    }
}

/// The slots of one element, keyed by kind then attribute template name.
#[derive(Debug, Clone, Default)]
pub struct AttributeSlots {
    slots: BTreeMap<AttributeKind, IndexMap<String, AttributeSlot>>,
}

impl AttributeSlots {
    /// Slots declared by an object template.
    ///
    /// Slots whose attribute template is an unresolved link are skipped.
    #[must_use]
    pub fn from_template<T: ObjectTemplate>(template: &T) -> Self {
        let mut slots = Self::default();
        for (kind, slot) in template.all_slots() {
            match slot.template.object() {
                Some(attribute) => {
                    let name = attribute.read().name.clone();
                    slots.insert(
                        name,
                        AttributeSlot {
                            kind,
                            template: attribute.clone(),
                            bounds: slot.bounds.clone(),
                            default_value: None,
                        },
                    );
                }
                None => warn!(
                    template = %template.name(),
                    kind = %kind,
                    "Skipping unresolved attribute template slot"
                ),
            }
        }
        slots
    }

    pub fn insert(&mut self, name: String, slot: AttributeSlot) {
        self.slots.entry(slot.kind).or_default().insert(name, slot);
    }

    /// Add a slot for an attribute found on an existing spec or run, unless
    /// one with its template name is already known.
    pub fn insert_from_attribute(&mut self, attribute: &Attribute) {
        let Some(template) = attribute.template.as_ref().and_then(Ref::object) else {
            return;
        };
        let name = template.read().name.clone();
        if self.get(attribute.kind, &name).is_none() && self.get(attribute.kind, &attribute.name).is_none() {
            self.insert(
                name,
                AttributeSlot {
                    kind: attribute.kind,
                    template: template.clone(),
                    bounds: None,
                    default_value: None,
                },
            );
        }
    }

    #[must_use]
    pub fn get(&self, kind: AttributeKind, name: &str) -> Option<&AttributeSlot> {
        self.slots.get(&kind)?.get(name)
    }

    /// Make the slot `name` required with `value` as its default.
    ///
    /// Returns `false` if there is no such slot.
    pub fn set_default(
        &mut self,
        kind: AttributeKind,
        name: &str,
        value: Value,
    ) -> Result<bool, GemdError> {
        let Some(slot) = self.slots.get_mut(&kind).and_then(|s| s.get_mut(name)) else {
            return Ok(false);
        };
        slot.bounds().check(name, &value)?;
        slot.default_value = Some(value);
        Ok(true)
    }

    /// Slot names of one kind, in declaration order.
    #[must_use]
    pub fn names(&self, kind: AttributeKind) -> Vec<String> {
        self.slots
            .get(&kind)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Default attributes of every required slot of `kind`.
    #[must_use]
    pub fn required(&self, kind: AttributeKind) -> Vec<Attribute> {
        self.slots
            .get(&kind)
            .map(|s| {
                s.iter()
                    .filter_map(|(name, slot)| slot.default_attribute(name))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.values().map(IndexMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind `attribute` to its slot.
    ///
    /// A known name gets the slot's template. An unknown name defines a new
    /// slot from the attribute's own template, interned through `stores`.
    /// Values are checked against the slot bounds.
    pub fn adopt(&mut self, attribute: &mut Attribute, stores: &StoresConfig) -> Result<(), GemdError> {
        let kind = attribute.kind;
        let key = if self.get(kind, &attribute.name).is_some() {
            Some(attribute.name.clone())
        } else {
            attribute
                .template_name()
                .filter(|name| self.get(kind, name).is_some())
        };

        let slot = match key {
            Some(key) => self
                .get(kind, &key)
                .cloned()
                .ok_or_else(|| GemdError::MissingTemplate(attribute.name.clone()))?,
            None => self.define(attribute, stores)?,
        };

        attribute.template = Some(Ref::from(&slot.template));
        if let Some(value) = &attribute.value {
            slot.bounds().check(&attribute.name, value)?;
        }
        Ok(())
    }

    fn define(&mut self, attribute: &Attribute, stores: &StoresConfig) -> Result<AttributeSlot, GemdError> {
        let template = attribute
            .template
            .as_ref()
            .and_then(Ref::object)
            .cloned()
            .ok_or_else(|| GemdError::MissingTemplate(attribute.name.clone()))?;
        if template.read().kind != attribute.kind {
            return Err(GemdError::InvalidAttributeForVariant {
                attribute: template.read().kind.to_string(),
                variant: format!("{} slot", attribute.kind),
            });
        }

        let interned = stores
            .intern_template(&EntityRef::from(template.clone()), Provenance::memory())?
            .downcast::<AttributeTemplate>()
            .unwrap_or(template);
        let name = interned.read().name.clone();
        debug!(attribute = %attribute.name, template = %name, "Defined attribute slot");

        let slot = AttributeSlot {
            kind: attribute.kind,
            template: interned,
            bounds: None,
            default_value: None,
        };
        self.insert(name, slot.clone());
        Ok(slot)
    }
}

/// `required ∪ existing ∪ supplied` by name; later lists win, first position
/// is kept.
#[must_use]
pub fn merge_attributes(
    required: Vec<Attribute>,
    existing: Vec<Attribute>,
    supplied: Vec<Attribute>,
) -> Vec<Attribute> {
    let mut merged: IndexMap<String, Attribute> = IndexMap::new();
    for attribute in required.into_iter().chain(existing).chain(supplied) {
        merged.insert(attribute.name.clone(), attribute);
    }
    merged.into_values().collect()
}
