//! Runs: what actually happened.

use crate::model::attribute::{Attribute, AttributeKind, attribute_outgoing, resolve_attributes};
use crate::model::entity::{Entity, EntityIndex, Outgoing};
use crate::model::handle::{Ref, WeakHandle};
use crate::model::spec::{IngredientSpec, MaterialSpec, MeasurementSpec, ProcessSpec};
use crate::model::AttributeHolder;
use crate::types::{EntityType, FileLink, Source};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of sample a material run represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    Experimental,
    Virtual,
    ProductionFacility,
    #[default]
    Unknown,
}

/// A material that was actually made.
///
/// Material runs carry no attribute collections; their properties are
/// recorded by the measurement runs that point at them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialRun {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub uids: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub file_links: Vec<FileLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<Ref<MaterialSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<Ref<ProcessRun>>,
    pub sample_type: SampleType,
    /// Measurement runs performed on this material.
    #[serde(skip)]
    pub measurements: Vec<WeakHandle<MeasurementRun>>,
}

impl MaterialRun {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for MaterialRun {
    entity_basics!(MaterialRun);

    fn entity_type(&self) -> EntityType {
        EntityType::MaterialRun
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        self.spec
            .iter()
            .map(Outgoing::of)
            .chain(self.process.iter().map(Outgoing::of))
            .collect()
    }

    fn resolve_links(&mut self, index: &EntityIndex) {
        if let Some(spec) = self.spec.as_mut() {
            spec.resolve(index);
        }
        if let Some(process) = self.process.as_mut() {
            process.resolve(index);
        }
    }
}

impl AttributeHolder for MaterialRun {
    fn attributes(&self, _kind: AttributeKind) -> Option<Vec<Attribute>> {
        None
    }

    fn set_attributes(&mut self, _kind: AttributeKind, _attributes: Vec<Attribute>) -> bool {
        false
    }
}

/// A process that was actually performed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessRun {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub uids: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub file_links: Vec<FileLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<Ref<ProcessSpec>>,
    pub conditions: Vec<Attribute>,
    pub parameters: Vec<Attribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Ingredient runs consumed by this process.
    #[serde(skip)]
    pub ingredients: Vec<WeakHandle<IngredientRun>>,
    /// The material run this process produced.
    #[serde(skip)]
    pub output_material: Option<WeakHandle<MaterialRun>>,
}

impl ProcessRun {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for ProcessRun {
    entity_basics!(ProcessRun);

    fn entity_type(&self) -> EntityType {
        EntityType::ProcessRun
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        let mut out: Vec<Outgoing> = self.spec.iter().map(Outgoing::of).collect();
        out.extend(attribute_outgoing(&self.conditions));
        out.extend(attribute_outgoing(&self.parameters));
        out
    }

    fn resolve_links(&mut self, index: &EntityIndex) {
        if let Some(spec) = self.spec.as_mut() {
            spec.resolve(index);
        }
        resolve_attributes(&mut self.conditions, index);
        resolve_attributes(&mut self.parameters, index);
    }
}

impl AttributeHolder for ProcessRun {
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

/// A measurement that was actually taken.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementRun {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub uids: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub file_links: Vec<FileLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<Ref<MeasurementSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<Ref<MaterialRun>>,
    pub properties: Vec<Attribute>,
    pub conditions: Vec<Attribute>,
    pub parameters: Vec<Attribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl MeasurementRun {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for MeasurementRun {
    entity_basics!(MeasurementRun);

    fn entity_type(&self) -> EntityType {
        EntityType::MeasurementRun
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        let mut out: Vec<Outgoing> = self.spec.iter().map(Outgoing::of).collect();
        out.extend(self.material.iter().map(Outgoing::of));
        out.extend(attribute_outgoing(&self.properties));
        out.extend(attribute_outgoing(&self.conditions));
        out.extend(attribute_outgoing(&self.parameters));
        out
    }

    fn resolve_links(&mut self, index: &EntityIndex) {
        if let Some(spec) = self.spec.as_mut() {
            spec.resolve(index);
        }
        if let Some(material) = self.material.as_mut() {
            material.resolve(index);
        }
        resolve_attributes(&mut self.properties, index);
        resolve_attributes(&mut self.conditions, index);
        resolve_attributes(&mut self.parameters, index);
    }
}

impl AttributeHolder for MeasurementRun {
    fn attributes(&self, kind: AttributeKind) -> Option<Vec<Attribute>> {
        Some(match kind {
            AttributeKind::Property => self.properties.clone(),
            AttributeKind::Condition => self.conditions.clone(),
            AttributeKind::Parameter => self.parameters.clone(),
        })
    }

    fn set_attributes(&mut self, kind: AttributeKind, attributes: Vec<Attribute>) -> bool {
        match kind {
            AttributeKind::Property => self.properties = attributes,
            AttributeKind::Condition => self.conditions = attributes,
            AttributeKind::Parameter => self.parameters = attributes,
        }
        true
    }
}

/// A material actually consumed by a process run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngredientRun {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub uids: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub file_links: Vec<FileLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<Ref<IngredientSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<Ref<MaterialRun>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<Ref<ProcessRun>>,
}

impl IngredientRun {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for IngredientRun {
    entity_basics!(IngredientRun);

    fn entity_type(&self) -> EntityType {
        EntityType::IngredientRun
    }

    fn outgoing(&self) -> Vec<Outgoing> {
        self.spec
            .iter()
            .map(Outgoing::of)
            .chain(self.material.iter().map(Outgoing::of))
            .chain(self.process.iter().map(Outgoing::of))
            .collect()
    }

    fn resolve_links(&mut self, index: &EntityIndex) {
        if let Some(spec) = self.spec.as_mut() {
            spec.resolve(index);
        }
        if let Some(material) = self.material.as_mut() {
            material.resolve(index);
        }
        if let Some(process) = self.process.as_mut() {
            process.resolve(index);
        }
    }
}

impl AttributeHolder for IngredientRun {
    fn attributes(&self, _kind: AttributeKind) -> Option<Vec<Attribute>> {
        None
    }

    fn set_attributes(&mut self, _kind: AttributeKind, _attributes: Vec<Attribute>) -> bool {
        false
    }
}

impl_described!(MaterialRun, ProcessRun, MeasurementRun, IngredientRun);
