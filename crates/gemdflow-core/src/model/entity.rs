//! # Entity Plumbing
//!
//! The `Entity` trait every model struct implements, the type-erased
//! [`EntityRef`] used wherever heterogeneous entities travel together, and the
//! [`EntityIndex`] that resolves link stubs back to live handles.

use crate::model::handle::{Handle, Ref, link_of, push_back_reference};
use crate::model::{
    AttributeTemplate, IngredientRun, IngredientSpec, MaterialRun, MaterialSpec,
    MaterialTemplate, MeasurementRun, MeasurementSpec, MeasurementTemplate, ProcessRun,
    ProcessSpec, ProcessTemplate,
};
use crate::types::{EntityType, GemdError, LinkByUid};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap, HashSet};

// =============================================================================
// ENTITY TRAIT
// =============================================================================

/// One outgoing reference of an entity.
#[derive(Debug, Clone)]
pub struct Outgoing {
    /// The link stub the reference serializes to, if it can be linked.
    pub link: Option<LinkByUid>,
    /// The live target, if the reference is resolved.
    pub object: Option<EntityRef>,
}

impl Outgoing {
    pub(crate) fn of<T: Entity>(reference: &Ref<T>) -> Self {
        Self {
            link: reference.link(),
            object: reference.object().map(|h| T::wrap(h.clone())),
        }
    }
}

/// Behaviour shared by every template, spec and run.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The `type` tag this value serializes under.
    fn entity_type(&self) -> EntityType;

    fn name(&self) -> &str;

    fn uids(&self) -> &BTreeMap<String, String>;

    fn uids_mut(&mut self) -> &mut BTreeMap<String, String>;

    /// Owning references in field order.
    fn outgoing(&self) -> Vec<Outgoing>;

    /// Replace link stubs by indexed objects where possible.
    fn resolve_links(&mut self, index: &EntityIndex);

    fn wrap(handle: Handle<Self>) -> EntityRef;

    fn unwrap(entity: &EntityRef) -> Option<Handle<Self>>;

    /// Resolved owning references.
    fn references(&self) -> Vec<EntityRef> {
        self.outgoing().into_iter().filter_map(|o| o.object).collect()
    }

    /// Every owning reference as a link stub.
    fn links(&self) -> Vec<LinkByUid> {
        self.outgoing().into_iter().filter_map(|o| o.link).collect()
    }
}

// =============================================================================
// ENTITY REF
// =============================================================================

/// A handle to any entity.
#[derive(Debug, Clone)]
pub enum EntityRef {
    AttributeTemplate(Handle<AttributeTemplate>),
    MaterialTemplate(Handle<MaterialTemplate>),
    ProcessTemplate(Handle<ProcessTemplate>),
    MeasurementTemplate(Handle<MeasurementTemplate>),
    MaterialSpec(Handle<MaterialSpec>),
    ProcessSpec(Handle<ProcessSpec>),
    MeasurementSpec(Handle<MeasurementSpec>),
    IngredientSpec(Handle<IngredientSpec>),
    MaterialRun(Handle<MaterialRun>),
    ProcessRun(Handle<ProcessRun>),
    MeasurementRun(Handle<MeasurementRun>),
    IngredientRun(Handle<IngredientRun>),
}

macro_rules! dispatch {
    ($value:expr, $h:ident => $body:expr) => {
        match $value {
            EntityRef::AttributeTemplate($h) => $body,
            EntityRef::MaterialTemplate($h) => $body,
            EntityRef::ProcessTemplate($h) => $body,
            EntityRef::MeasurementTemplate($h) => $body,
            EntityRef::MaterialSpec($h) => $body,
            EntityRef::ProcessSpec($h) => $body,
            EntityRef::MeasurementSpec($h) => $body,
            EntityRef::IngredientSpec($h) => $body,
            EntityRef::MaterialRun($h) => $body,
            EntityRef::ProcessRun($h) => $body,
            EntityRef::MeasurementRun($h) => $body,
            EntityRef::IngredientRun($h) => $body,
        }
    };
}

macro_rules! from_handle {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<Handle<$variant>> for EntityRef {
                fn from(handle: Handle<$variant>) -> Self {
                    EntityRef::$variant(handle)
                }
            }
        )*
    };
}

from_handle!(
    AttributeTemplate,
    MaterialTemplate,
    ProcessTemplate,
    MeasurementTemplate,
    MaterialSpec,
    ProcessSpec,
    MeasurementSpec,
    IngredientSpec,
    MaterialRun,
    ProcessRun,
    MeasurementRun,
    IngredientRun,
);

impl EntityRef {
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        dispatch!(self, h => h.read().entity_type())
    }

    #[must_use]
    pub fn name(&self) -> String {
        dispatch!(self, h => h.read().name().to_string())
    }

    #[must_use]
    pub fn uids(&self) -> BTreeMap<String, String> {
        dispatch!(self, h => h.read().uids().clone())
    }

    /// The uid under `scope`, if set.
    #[must_use]
    pub fn uid(&self, scope: &str) -> Option<String> {
        dispatch!(self, h => h.read().uids().get(scope).cloned())
    }

    pub fn set_uid(&self, scope: &str, id: impl Into<String>) {
        let id = id.into();
        dispatch!(self, h => {
            h.write().uids_mut().insert(scope.to_string(), id);
        })
    }

    pub fn remove_uid(&self, scope: &str) -> Option<String> {
        dispatch!(self, h => h.write().uids_mut().remove(scope))
    }

    /// The preferred link stub to this entity.
    #[must_use]
    pub fn link(&self) -> Option<LinkByUid> {
        dispatch!(self, h => link_of(&*h.read()))
    }

    #[must_use]
    pub fn outgoing(&self) -> Vec<Outgoing> {
        dispatch!(self, h => h.read().outgoing())
    }

    #[must_use]
    pub fn references(&self) -> Vec<EntityRef> {
        dispatch!(self, h => h.read().references())
    }

    #[must_use]
    pub fn links(&self) -> Vec<LinkByUid> {
        dispatch!(self, h => h.read().links())
    }

    pub fn resolve_links(&self, index: &EntityIndex) {
        dispatch!(self, h => h.write().resolve_links(index))
    }

    /// Serialize to a thin JSON value with the `type` tag inserted.
    pub fn to_value(&self) -> Result<serde_json::Value, GemdError> {
        let entity_type = self.entity_type();
        let mut value = dispatch!(self, h => serde_json::to_value(&*h.read()))
            .map_err(|e| GemdError::SerializationError(e.to_string()))?;
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "type".to_string(),
                serde_json::Value::String(entity_type.as_str().to_string()),
            );
        }
        Ok(value)
    }

    /// Decode a single document into a fresh entity, dispatching on `type`.
    pub fn from_value(value: serde_json::Value) -> Result<EntityRef, GemdError> {
        let tag = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| GemdError::DeserializationError("document has no 'type'".into()))?;
        let entity_type: EntityType = tag.parse()?;

        fn decode<T: Entity>(value: serde_json::Value) -> Result<EntityRef, GemdError> {
            serde_json::from_value::<T>(value)
                .map(|entity| T::wrap(Handle::new(entity)))
                .map_err(|e| GemdError::DeserializationError(e.to_string()))
        }

        match entity_type {
            EntityType::PropertyTemplate
            | EntityType::ConditionTemplate
            | EntityType::ParameterTemplate => decode::<AttributeTemplate>(value),
            EntityType::MaterialTemplate => decode::<MaterialTemplate>(value),
            EntityType::ProcessTemplate => decode::<ProcessTemplate>(value),
            EntityType::MeasurementTemplate => decode::<MeasurementTemplate>(value),
            EntityType::MaterialSpec => decode::<MaterialSpec>(value),
            EntityType::ProcessSpec => decode::<ProcessSpec>(value),
            EntityType::MeasurementSpec => decode::<MeasurementSpec>(value),
            EntityType::IngredientSpec => decode::<IngredientSpec>(value),
            EntityType::MaterialRun => decode::<MaterialRun>(value),
            EntityType::ProcessRun => decode::<ProcessRun>(value),
            EntityType::MeasurementRun => decode::<MeasurementRun>(value),
            EntityType::IngredientRun => decode::<IngredientRun>(value),
        }
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        self.addr() == other.addr()
    }

    pub(crate) fn addr(&self) -> usize {
        dispatch!(self, h => h.addr())
    }

    /// A new handle holding a copy of this entity.
    #[must_use]
    pub fn detached(&self) -> EntityRef {
        dispatch!(self, h => EntityRef::from(h.detached()))
    }

    /// Typed access to the underlying handle.
    #[must_use]
    pub fn downcast<T: Entity>(&self) -> Option<Handle<T>> {
        T::unwrap(self)
    }
}

// =============================================================================
// ENTITY INDEX
// =============================================================================

/// Lookup of live entities by `(type, scope, id)`.
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    by_uid: HashMap<(EntityType, String, String), EntityRef>,
}

impl EntityIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every uid of `entity`. Later inserts win.
    pub fn insert(&mut self, entity: &EntityRef) {
        let entity_type = entity.entity_type();
        for (scope, id) in entity.uids() {
            self.by_uid.insert((entity_type, scope, id), entity.clone());
        }
    }

    pub fn extend<'a>(&mut self, entities: impl IntoIterator<Item = &'a EntityRef>) {
        for entity in entities {
            self.insert(entity);
        }
    }

    #[must_use]
    pub fn lookup(&self, link: &LinkByUid) -> Option<&EntityRef> {
        self.by_uid
            .get(&(link.entity_type, link.scope.clone(), link.id.clone()))
    }

    /// Typed lookup.
    #[must_use]
    pub fn get<T: Entity>(&self, link: &LinkByUid) -> Option<Handle<T>> {
        self.lookup(link).and_then(T::unwrap)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}

// =============================================================================
// TRAVERSAL
// =============================================================================

/// Every entity reachable from `roots` through owning references, roots
/// included, in depth-first pre-order. Each entity appears once.
#[must_use]
pub fn collect_reachable(roots: &[EntityRef]) -> Vec<EntityRef> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut stack: Vec<EntityRef> = roots.iter().rev().cloned().collect();

    while let Some(entity) = stack.pop() {
        if !seen.insert(entity.addr()) {
            continue;
        }
        let children = entity.references();
        out.push(entity);
        for child in children.into_iter().rev() {
            if !seen.contains(&child.addr()) {
                stack.push(child);
            }
        }
    }
    out
}

/// Recreate the derived back-references from the owning ones.
pub fn rebuild_back_references(entities: &[EntityRef]) {
    for entity in entities {
        match entity {
            EntityRef::IngredientSpec(h) => {
                let process = h.read().process.as_ref().and_then(|r| r.object().cloned());
                if let Some(process) = process {
                    push_back_reference(&mut process.write().ingredients, h);
                }
            }
            EntityRef::MaterialSpec(h) => {
                let process = h.read().process.as_ref().and_then(|r| r.object().cloned());
                if let Some(process) = process {
                    process.write().output_material = Some(h.downgrade());
                }
            }
            EntityRef::IngredientRun(h) => {
                let process = h.read().process.as_ref().and_then(|r| r.object().cloned());
                if let Some(process) = process {
                    push_back_reference(&mut process.write().ingredients, h);
                }
            }
            EntityRef::MaterialRun(h) => {
                let process = h.read().process.as_ref().and_then(|r| r.object().cloned());
                if let Some(process) = process {
                    process.write().output_material = Some(h.downgrade());
                }
            }
            EntityRef::MeasurementRun(h) => {
                let material = h.read().material.as_ref().and_then(|r| r.object().cloned());
                if let Some(material) = material {
                    push_back_reference(&mut material.write().measurements, h);
                }
            }
            _ => {}
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::AUTO_SCOPE;

    fn with_uid<T: Entity>(mut entity: T, id: &str) -> Handle<T> {
        entity.uids_mut().insert(AUTO_SCOPE.into(), id.into());
        Handle::new(entity)
    }

    #[test]
    fn to_value_inserts_type_tag() {
        let spec = EntityRef::from(with_uid(MaterialSpec::new("Alloy"), "m1"));
        let value = spec.to_value().expect("value");
        assert_eq!(value["type"], "material_spec");
        assert_eq!(value["name"], "Alloy");
    }

    #[test]
    fn from_value_dispatches_on_type() {
        let doc = serde_json::json!({
            "type": "process_run",
            "name": "Melt",
            "uids": {"auto": "p1"}
        });
        let entity = EntityRef::from_value(doc).expect("decode");
        assert_eq!(entity.entity_type(), EntityType::ProcessRun);
        assert_eq!(entity.uid(AUTO_SCOPE).as_deref(), Some("p1"));

        let bogus = serde_json::json!({"type": "widget", "name": "x"});
        assert!(EntityRef::from_value(bogus).is_err());
    }

    #[test]
    fn index_resolves_by_type_scope_and_id() {
        let template = EntityRef::from(with_uid(MaterialTemplate::new("Alloy"), "t1"));
        let mut index = EntityIndex::new();
        index.insert(&template);

        let link = LinkByUid::new(EntityType::MaterialTemplate, AUTO_SCOPE, "t1");
        assert!(index.get::<MaterialTemplate>(&link).is_some());
        assert!(index.get::<ProcessTemplate>(&link).is_none());

        let wrong_type = LinkByUid::new(EntityType::ProcessTemplate, AUTO_SCOPE, "t1");
        assert!(index.lookup(&wrong_type).is_none());
    }

    #[test]
    fn collect_reachable_visits_each_entity_once() {
        let template = with_uid(MaterialTemplate::new("Alloy"), "t1");
        let mut spec = MaterialSpec::new("Alloy");
        spec.template = Some(Ref::from(&template));
        let spec = with_uid(spec, "s1");

        let mut run = MaterialRun::new("Alloy");
        run.spec = Some(Ref::from(&spec));
        let run = with_uid(run, "r1");

        let roots = vec![EntityRef::from(run), EntityRef::from(spec)];
        let reached = collect_reachable(&roots);
        let types: Vec<_> = reached.iter().map(EntityRef::entity_type).collect();
        assert_eq!(
            types,
            vec![
                EntityType::MaterialRun,
                EntityType::MaterialSpec,
                EntityType::MaterialTemplate
            ]
        );
    }

    #[test]
    fn back_references_follow_owning_links() {
        let process = with_uid(ProcessRun::new("Melt"), "p1");
        let mut material = MaterialRun::new("Ingot");
        material.process = Some(Ref::from(&process));
        let material = with_uid(material, "m1");

        rebuild_back_references(&[EntityRef::from(material.clone())]);

        let output = process
            .read()
            .output_material
            .as_ref()
            .and_then(|w| w.upgrade())
            .expect("output material");
        assert!(Handle::ptr_eq(&output, &material));
    }
}
