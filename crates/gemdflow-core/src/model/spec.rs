//! Specs: the intended plan for a material, process, measurement or
//! ingredient.

use crate::model::attribute::{
    Attribute, AttributeKind, PropertyAndConditions, attribute_outgoing, resolve_attributes,
};
use crate::model::entity::{Entity, EntityIndex, Outgoing};
use crate::model::handle::{Ref, WeakHandle};
use crate::model::template::{MaterialTemplate, MeasurementTemplate, ProcessTemplate};
use crate::model::AttributeHolder;
use crate::types::{EntityType, FileLink};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Planned material.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub uids: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub file_links: Vec<FileLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<Ref<MaterialTemplate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<Ref<ProcessSpec>>,
    pub properties: Vec<PropertyAndConditions>,
}

impl MaterialSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for MaterialSpec {
    entity_basics!(MaterialSpec);

    fn entity_type(&self) -> EntityType {
        EntityType::MaterialSpec
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        let mut out: Vec<Outgoing> = self.template.iter().map(Outgoing::of).collect();
        out.extend(self.process.iter().map(Outgoing::of));
        out.extend(self.properties.iter().flat_map(PropertyAndConditions::outgoing));
        out
    }

    fn resolve_links(&mut self, index: &EntityIndex) {
        if let Some(template) = self.template.as_mut() {
            template.resolve(index);
        }
        if let Some(process) = self.process.as_mut() {
            process.resolve(index);
        }
        for pair in &mut self.properties {
            pair.resolve(index);
        }
    }
}

impl AttributeHolder for MaterialSpec {
    fn attributes(&self, kind: AttributeKind) -> Option<Vec<Attribute>> {
        match kind {
            AttributeKind::Property => {
                Some(self.properties.iter().map(|p| p.property.clone()).collect())
            }
            _ => None,
        }
    }

    /// Properties keep the conditions of any previous pair with the same name.
    fn set_attributes(&mut self, kind: AttributeKind, attributes: Vec<Attribute>) -> bool {
        if kind != AttributeKind::Property {
            return false;
        }
        let mut previous: BTreeMap<String, Vec<Attribute>> = self
            .properties
            .drain(..)
            .map(|p| (p.property.name, p.conditions))
            .collect();
        self.properties = attributes
            .into_iter()
            .map(|property| {
                let conditions = previous.remove(&property.name).unwrap_or_default();
                PropertyAndConditions {
                    property,
                    conditions,
                }
            })
            .collect();
        true
    }
}

/// Planned process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub uids: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub file_links: Vec<FileLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<Ref<ProcessTemplate>>,
    pub conditions: Vec<Attribute>,
    pub parameters: Vec<Attribute>,
    /// Ingredient specs consumed by this process.
    #[serde(skip)]
    pub ingredients: Vec<WeakHandle<IngredientSpec>>,
    /// Material spec produced by this process.
    #[serde(skip)]
    pub output_material: Option<WeakHandle<MaterialSpec>>,
}

impl ProcessSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for ProcessSpec {
    entity_basics!(ProcessSpec);

    fn entity_type(&self) -> EntityType {
        EntityType::ProcessSpec
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        let mut out: Vec<Outgoing> = self.template.iter().map(Outgoing::of).collect();
        out.extend(attribute_outgoing(&self.conditions));
        out.extend(attribute_outgoing(&self.parameters));
        out
    }

    fn resolve_links(&mut self, index: &EntityIndex) {
        if let Some(template) = self.template.as_mut() {
            template.resolve(index);
        }
        resolve_attributes(&mut self.conditions, index);
        resolve_attributes(&mut self.parameters, index);
    }
}

impl AttributeHolder for ProcessSpec {
    fn attributes(&self, kind: AttributeKind) -> Option<Vec<Attribute>> {
        match kind {
            AttributeKind::Condition => Some(self.conditions.clone()),
            AttributeKind::Parameter => Some(self.parameters.clone()),
            AttributeKind::Property => None,
        }
    }

    fn set_attributes(&mut self, kind: AttributeKind, attributes: Vec<Attribute>) -> bool {
        match kind {
            AttributeKind::Condition => self.conditions = attributes,
            AttributeKind::Parameter => self.parameters = attributes,
            AttributeKind::Property => return false,
        }
        true
    }
}

/// Planned measurement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub uids: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub file_links: Vec<FileLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<Ref<MeasurementTemplate>>,
    pub conditions: Vec<Attribute>,
    pub parameters: Vec<Attribute>,
}

impl MeasurementSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for MeasurementSpec {
    entity_basics!(MeasurementSpec);

    fn entity_type(&self) -> EntityType {
        EntityType::MeasurementSpec
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        let mut out: Vec<Outgoing> = self.template.iter().map(Outgoing::of).collect();
        out.extend(attribute_outgoing(&self.conditions));
        out.extend(attribute_outgoing(&self.parameters));
        out
    }

    fn resolve_links(&mut self, index: &EntityIndex) {
        if let Some(template) = self.template.as_mut() {
            template.resolve(index);
        }
        resolve_attributes(&mut self.conditions, index);
        resolve_attributes(&mut self.parameters, index);
    }
}

impl AttributeHolder for MeasurementSpec {
    fn attributes(&self, kind: AttributeKind) -> Option<Vec<Attribute>> {
        match kind {
            AttributeKind::Condition => Some(self.conditions.clone()),
            AttributeKind::Parameter => Some(self.parameters.clone()),
            AttributeKind::Property => None,
        }
    }

    fn set_attributes(&mut self, kind: AttributeKind, attributes: Vec<Attribute>) -> bool {
        match kind {
            AttributeKind::Condition => self.conditions = attributes,
            AttributeKind::Parameter => self.parameters = attributes,
            AttributeKind::Property => return false,
        }
        true
    }
}

/// Planned use of a material as input to a process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngredientSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub uids: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub file_links: Vec<FileLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<Ref<MaterialSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<Ref<ProcessSpec>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl IngredientSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for IngredientSpec {
    entity_basics!(IngredientSpec);

    fn entity_type(&self) -> EntityType {
        EntityType::IngredientSpec
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        self.material
            .iter()
            .map(Outgoing::of)
            .chain(self.process.iter().map(Outgoing::of))
            .collect()
    }

    fn resolve_links(&mut self, index: &EntityIndex) {
        if let Some(material) = self.material.as_mut() {
            material.resolve(index);
        }
        if let Some(process) = self.process.as_mut() {
            process.resolve(index);
        }
    }
}

impl AttributeHolder for IngredientSpec {
    fn attributes(&self, _kind: AttributeKind) -> Option<Vec<Attribute>> {
        None
    }

    fn set_attributes(&mut self, _kind: AttributeKind, _attributes: Vec<Attribute>) -> bool {
        false
    }
}

impl_described!(MaterialSpec, ProcessSpec, MeasurementSpec, IngredientSpec);
