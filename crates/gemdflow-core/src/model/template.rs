//! Attribute templates and object templates.

use crate::model::attribute::AttributeKind;
use crate::model::bounds::Bounds;
use crate::model::entity::{Entity, EntityIndex, Outgoing};
use crate::model::handle::{Handle, Ref};
use crate::types::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// ATTRIBUTE TEMPLATES
// =============================================================================

/// Template of a property, condition or parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeTemplate {
    #[serde(rename = "type", with = "template_type")]
    pub kind: AttributeKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub uids: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub bounds: Bounds,
}

mod template_type {
    use super::AttributeKind;
    use crate::types::EntityType;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(kind: &AttributeKind, s: S) -> Result<S::Ok, S::Error> {
        kind.template_type().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<AttributeKind, D::Error> {
        let entity_type = EntityType::deserialize(d)?;
        AttributeKind::from_template_type(entity_type)
            .ok_or_else(|| D::Error::custom(format!("{} is not an attribute template", entity_type)))
    }
}

impl AttributeTemplate {
    #[must_use]
    pub fn new(kind: AttributeKind, name: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            kind,
            name: name.into(),
            description: None,
            uids: BTreeMap::new(),
            tags: Vec::new(),
            bounds,
        }
    }

    #[must_use]
    pub fn property(name: impl Into<String>, bounds: Bounds) -> Self {
        Self::new(AttributeKind::Property, name, bounds)
    }

    #[must_use]
    pub fn condition(name: impl Into<String>, bounds: Bounds) -> Self {
        Self::new(AttributeKind::Condition, name, bounds)
    }

    #[must_use]
    pub fn parameter(name: impl Into<String>, bounds: Bounds) -> Self {
        Self::new(AttributeKind::Parameter, name, bounds)
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Entity for AttributeTemplate {
    entity_basics!(AttributeTemplate);

    fn entity_type(&self) -> EntityType {
        self.kind.template_type()
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        Vec::new()
    }

    fn resolve_links(&mut self, _index: &EntityIndex) {}
}

// =============================================================================
// OBJECT TEMPLATES
// =============================================================================

/// One attribute slot of an object template, optionally narrowing the
/// attribute template's bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSlot {
    pub template: Ref<AttributeTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
}

impl TemplateSlot {
    #[must_use]
    pub fn new(template: &Handle<AttributeTemplate>) -> Self {
        Self {
            template: Ref::from(template),
            bounds: None,
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Name of the resolved attribute template.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.template.object().map(|h| h.read().name.clone())
    }

    /// Slot bounds if narrowed, else the attribute template's bounds.
    #[must_use]
    pub fn effective_bounds(&self) -> Option<Bounds> {
        self.bounds
            .clone()
            .or_else(|| self.template.object().map(|h| h.read().bounds.clone()))
    }
}

/// An object template: material, process or measurement.
pub trait ObjectTemplate: Entity {
    /// Attribute kinds this template declares slots for.
    const KINDS: &'static [AttributeKind];

    fn slots(&self, kind: AttributeKind) -> &[TemplateSlot];

    fn slots_mut(&mut self, kind: AttributeKind) -> Option<&mut Vec<TemplateSlot>>;

    /// Every slot of every kind.
    fn all_slots(&self) -> Vec<(AttributeKind, TemplateSlot)> {
        Self::KINDS
            .iter()
            .flat_map(|kind| self.slots(*kind).iter().map(|s| (*kind, s.clone())))
            .collect()
    }
}

fn slot_outgoing(slots: &[TemplateSlot]) -> impl Iterator<Item = Outgoing> + '_ {
    slots.iter().map(|s| Outgoing::of(&s.template))
}

fn resolve_slots(slots: &mut [TemplateSlot], index: &EntityIndex) {
    for slot in slots {
        slot.template.resolve(index);
    }
}

/// Template of a material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub uids: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub properties: Vec<TemplateSlot>,
}

impl MaterialTemplate {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            uids: BTreeMap::new(),
            tags: Vec::new(),
            properties: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, template: &Handle<AttributeTemplate>) -> Self {
        self.properties.push(TemplateSlot::new(template));
        self
    }
}

impl Entity for MaterialTemplate {
    entity_basics!(MaterialTemplate);

    fn entity_type(&self) -> EntityType {
        EntityType::MaterialTemplate
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        slot_outgoing(&self.properties).collect()
    }

    fn resolve_links(&mut self, index: &EntityIndex) {
        resolve_slots(&mut self.properties, index);
    }
}

impl ObjectTemplate for MaterialTemplate {
    const KINDS: &'static [AttributeKind] = &[AttributeKind::Property];

    fn slots(&self, kind: AttributeKind) -> &[TemplateSlot] {
        match kind {
            AttributeKind::Property => &self.properties,
            _ => &[],
        }
    }

    fn slots_mut(&mut self, kind: AttributeKind) -> Option<&mut Vec<TemplateSlot>> {
        match kind {
            AttributeKind::Property => Some(&mut self.properties),
            _ => None,
        }
    }
}

/// Template of a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub uids: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<TemplateSlot>,
    #[serde(default)]
    pub parameters: Vec<TemplateSlot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_labels: Vec<String>,
}

impl ProcessTemplate {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            uids: BTreeMap::new(),
            tags: Vec::new(),
            conditions: Vec::new(),
            parameters: Vec::new(),
            allowed_names: Vec::new(),
            allowed_labels: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_condition(mut self, template: &Handle<AttributeTemplate>) -> Self {
        self.conditions.push(TemplateSlot::new(template));
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, template: &Handle<AttributeTemplate>) -> Self {
        self.parameters.push(TemplateSlot::new(template));
        self
    }
}

impl Entity for ProcessTemplate {
    entity_basics!(ProcessTemplate);

    fn entity_type(&self) -> EntityType {
        EntityType::ProcessTemplate
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        slot_outgoing(&self.conditions)
            .chain(slot_outgoing(&self.parameters))
            .collect()
    }

    fn resolve_links(&mut self, index: &EntityIndex) {
        resolve_slots(&mut self.conditions, index);
        resolve_slots(&mut self.parameters, index);
    }
}

impl ObjectTemplate for ProcessTemplate {
    const KINDS: &'static [AttributeKind] = &[AttributeKind::Condition, AttributeKind::Parameter];

    fn slots(&self, kind: AttributeKind) -> &[TemplateSlot] {
        match kind {
            AttributeKind::Condition => &self.conditions,
            AttributeKind::Parameter => &self.parameters,
            AttributeKind::Property => &[],
        }
    }

    fn slots_mut(&mut self, kind: AttributeKind) -> Option<&mut Vec<TemplateSlot>> {
        match kind {
            AttributeKind::Condition => Some(&mut self.conditions),
            AttributeKind::Parameter => Some(&mut self.parameters),
            AttributeKind::Property => None,
        }
    }
}

/// Template of a measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub uids: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub properties: Vec<TemplateSlot>,
    #[serde(default)]
    pub conditions: Vec<TemplateSlot>,
    #[serde(default)]
    pub parameters: Vec<TemplateSlot>,
}

impl MeasurementTemplate {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            uids: BTreeMap::new(),
            tags: Vec::new(),
            properties: Vec::new(),
            conditions: Vec::new(),
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, template: &Handle<AttributeTemplate>) -> Self {
        self.properties.push(TemplateSlot::new(template));
        self
    }

    #[must_use]
    pub fn with_condition(mut self, template: &Handle<AttributeTemplate>) -> Self {
        self.conditions.push(TemplateSlot::new(template));
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, template: &Handle<AttributeTemplate>) -> Self {
        self.parameters.push(TemplateSlot::new(template));
        self
    }
}

impl Entity for MeasurementTemplate {
    entity_basics!(MeasurementTemplate);

    fn entity_type(&self) -> EntityType {
        EntityType::MeasurementTemplate
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        slot_outgoing(&self.properties)
            .chain(slot_outgoing(&self.conditions))
            .chain(slot_outgoing(&self.parameters))
            .collect()
    }

    fn resolve_links(&mut self, index: &EntityIndex) {
        resolve_slots(&mut self.properties, index);
        resolve_slots(&mut self.conditions, index);
        resolve_slots(&mut self.parameters, index);
    }
}

impl ObjectTemplate for MeasurementTemplate {
    const KINDS: &'static [AttributeKind] = &[
        AttributeKind::Property,
        AttributeKind::Condition,
        AttributeKind::Parameter,
    ];

    fn slots(&self, kind: AttributeKind) -> &[TemplateSlot] {
        match kind {
            AttributeKind::Property => &self.properties,
            AttributeKind::Condition => &self.conditions,
            AttributeKind::Parameter => &self.parameters,
        }
    }

    fn slots_mut(&mut self, kind: AttributeKind) -> Option<&mut Vec<TemplateSlot>> {
        match kind {
            AttributeKind::Property => Some(&mut self.properties),
            AttributeKind::Condition => Some(&mut self.conditions),
            AttributeKind::Parameter => Some(&mut self.parameters),
        }
    }
}
