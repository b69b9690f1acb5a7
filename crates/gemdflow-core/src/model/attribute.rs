//! Conditions, parameters and properties.

use crate::model::entity::{EntityIndex, Outgoing};
use crate::model::handle::Ref;
use crate::model::template::AttributeTemplate;
use crate::model::value::Value;
use crate::types::{EntityType, Origin};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Property,
    Condition,
    Parameter,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 3] = [
        AttributeKind::Property,
        AttributeKind::Condition,
        AttributeKind::Parameter,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AttributeKind::Property => "property",
            AttributeKind::Condition => "condition",
            AttributeKind::Parameter => "parameter",
        }
    }

    /// Plural collection name, as used by the data model fields.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            AttributeKind::Property => "properties",
            AttributeKind::Condition => "conditions",
            AttributeKind::Parameter => "parameters",
        }
    }

    /// Entity type of the matching attribute template.
    #[must_use]
    pub const fn template_type(self) -> EntityType {
        match self {
            AttributeKind::Property => EntityType::PropertyTemplate,
            AttributeKind::Condition => EntityType::ConditionTemplate,
            AttributeKind::Parameter => EntityType::ParameterTemplate,
        }
    }

    #[must_use]
    pub const fn from_template_type(entity_type: EntityType) -> Option<Self> {
        match entity_type {
            EntityType::PropertyTemplate => Some(AttributeKind::Property),
            EntityType::ConditionTemplate => Some(AttributeKind::Condition),
            EntityType::ParameterTemplate => Some(AttributeKind::Parameter),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed value attached to a spec or run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub kind: AttributeKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Ref<AttributeTemplate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Attribute {
    #[must_use]
    pub fn new(kind: AttributeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            template: None,
            value: None,
            origin: Origin::Unknown,
            notes: None,
        }
    }

    #[must_use]
    pub fn property(name: impl Into<String>) -> Self {
        Self::new(AttributeKind::Property, name)
    }

    #[must_use]
    pub fn condition(name: impl Into<String>) -> Self {
        Self::new(AttributeKind::Condition, name)
    }

    #[must_use]
    pub fn parameter(name: impl Into<String>) -> Self {
        Self::new(AttributeKind::Parameter, name)
    }

    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn with_template(mut self, template: impl Into<Ref<AttributeTemplate>>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Name of the attached template, if resolved.
    #[must_use]
    pub fn template_name(&self) -> Option<String> {
        self.template
            .as_ref()
            .and_then(Ref::object)
            .map(|h| h.read().name.clone())
    }

    /// Short rendering used for graph node properties.
    #[must_use]
    pub fn summary(&self) -> String {
        match &self.value {
            Some(value) => format!("{}, {}", self.name, value),
            None => self.name.clone(),
        }
    }

    pub(crate) fn outgoing(&self) -> Option<Outgoing> {
        self.template.as_ref().map(Outgoing::of)
    }

    pub(crate) fn resolve(&mut self, index: &EntityIndex) {
        if let Some(template) = self.template.as_mut() {
            template.resolve(index);
        }
    }
}

/// A material property together with the conditions it was stated under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyAndConditions {
    pub property: Attribute,
    #[serde(default)]
    pub conditions: Vec<Attribute>,
}

impl PropertyAndConditions {
    #[must_use]
    pub fn new(property: Attribute) -> Self {
        Self {
            property,
            conditions: Vec::new(),
        }
    }

    pub(crate) fn outgoing(&self) -> Vec<Outgoing> {
        std::iter::once(&self.property)
            .chain(self.conditions.iter())
            .filter_map(Attribute::outgoing)
            .collect()
    }

    pub(crate) fn resolve(&mut self, index: &EntityIndex) {
        self.property.resolve(index);
        for condition in &mut self.conditions {
            condition.resolve(index);
        }
    }
}

/// Outgoing template references of a list of attributes.
pub(crate) fn attribute_outgoing(attributes: &[Attribute]) -> Vec<Outgoing> {
    attributes.iter().filter_map(Attribute::outgoing).collect()
}

pub(crate) fn resolve_attributes(attributes: &mut [Attribute], index: &EntityIndex) {
    for attribute in attributes {
        attribute.resolve(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_includes_value() {
        let attr = Attribute::condition("Temperature").with_value(Value::nominal_real(300.0, "K"));
        assert_eq!(attr.summary(), "Temperature, 300 K");
        assert_eq!(Attribute::property("Hardness").summary(), "Hardness");
    }

    #[test]
    fn kind_maps_to_template_type() {
        for kind in AttributeKind::ALL {
            assert_eq!(
                AttributeKind::from_template_type(kind.template_type()),
                Some(kind)
            );
        }
        assert_eq!(
            AttributeKind::from_template_type(EntityType::MaterialSpec),
            None
        );
    }

    #[test]
    fn serializes_kind_as_type() {
        let json = serde_json::to_value(Attribute::parameter("Passes")).expect("json");
        assert_eq!(json["type"], "parameter");
        assert_eq!(json["origin"], "unknown");
        assert!(json.get("template").is_none());
    }
}
