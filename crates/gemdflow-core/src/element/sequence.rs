//! # Materials Sequence
//!
//! The `ingredients -> process -> material -> measurements` fragment of a
//! provenance graph, with the operations that wire it internally and to
//! neighbouring sequences.

use crate::element::{
    Element, ElementVariant, GemdElement, Ingredient, Material, Measurement, Process,
};
use crate::model::{
    Entity, EntityRef, Handle, IngredientRun, IngredientSpec, MaterialRun, MaterialSpec,
    MeasurementRun, MeasurementSpec, ProcessRun, ProcessSpec, Ref,
};
use crate::store::StoresConfig;
use crate::types::GemdError;
use indexmap::IndexMap;
use tracing::{debug, info};

// =============================================================================
// BUILDER
// =============================================================================

/// Collects elements for a [`MaterialsSequence`]; slot types and names are
/// checked by [`SequenceBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct SequenceBuilder {
    name: String,
    ingredients: Vec<Element>,
    process: Option<Element>,
    material: Option<Element>,
    measurements: Vec<Element>,
    sequence_type: Option<String>,
}

impl SequenceBuilder {
    #[must_use]
    pub fn ingredient(mut self, element: impl Into<Element>) -> Self {
        self.ingredients.push(element.into());
        self
    }

    #[must_use]
    pub fn process(mut self, element: impl Into<Element>) -> Self {
        self.process = Some(element.into());
        self
    }

    #[must_use]
    pub fn material(mut self, element: impl Into<Element>) -> Self {
        self.material = Some(element.into());
        self
    }

    #[must_use]
    pub fn measurement(mut self, element: impl Into<Element>) -> Self {
        self.measurements.push(element.into());
        self
    }

    #[must_use]
    pub fn sequence_type(mut self, sequence_type: impl Into<String>) -> Self {
        self.sequence_type = Some(sequence_type.into());
        self
    }

    pub fn build(self) -> Result<MaterialsSequence, GemdError> {
        let mut ingredients = IndexMap::new();
        for element in self.ingredients {
            let ingredient = match element {
                Element::Ingredient(ingredient) => ingredient,
                other => return Err(wrong_type(ElementVariant::Ingredient, &other)),
            };
            insert_unique(&mut ingredients, "ingredients", ingredient.name().to_string(), ingredient)?;
        }

        let mut measurements = IndexMap::new();
        for element in self.measurements {
            let measurement = match element {
                Element::Measurement(measurement) => measurement,
                other => return Err(wrong_type(ElementVariant::Measurement, &other)),
            };
            insert_unique(
                &mut measurements,
                "measurements",
                measurement.name().to_string(),
                measurement,
            )?;
        }

        let process = match self.process {
            None => None,
            Some(Element::Process(process)) => Some(process),
            Some(other) => return Err(wrong_type(ElementVariant::Process, &other)),
        };
        let material = match self.material {
            None => None,
            Some(Element::Material(material)) => Some(material),
            Some(other) => return Err(wrong_type(ElementVariant::Material, &other)),
        };

        Ok(MaterialsSequence {
            name: self.name,
            ingredients,
            process,
            material,
            measurements,
            sequence_type: self.sequence_type,
        })
    }
}

fn wrong_type(expected: ElementVariant, found: &Element) -> GemdError {
    GemdError::WrongElementType {
        expected: expected.to_string(),
        found: found.variant().to_string(),
    }
}

fn insert_unique<T>(
    map: &mut IndexMap<String, T>,
    collection: &str,
    name: String,
    value: T,
) -> Result<(), GemdError> {
    if map.contains_key(&name) {
        return Err(GemdError::DuplicateName {
            collection: collection.to_string(),
            name,
        });
    }
    map.insert(name, value);
    Ok(())
}

// =============================================================================
// SEQUENCE
// =============================================================================

/// One process with its ingredients, its output material and the
/// measurements on that material.
#[derive(Debug, Clone)]
pub struct MaterialsSequence {
    name: String,
    ingredients: IndexMap<String, Ingredient>,
    process: Option<Process>,
    material: Option<Material>,
    measurements: IndexMap<String, Measurement>,
    sequence_type: Option<String>,
}

impl MaterialsSequence {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SequenceBuilder {
        SequenceBuilder {
            name: name.into(),
            ..SequenceBuilder::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn sequence_type(&self) -> Option<&str> {
        self.sequence_type.as_deref()
    }

    #[must_use]
    pub fn ingredients(&self) -> &IndexMap<String, Ingredient> {
        &self.ingredients
    }

    #[must_use]
    pub fn ingredient(&self, name: &str) -> Option<&Ingredient> {
        self.ingredients.get(name)
    }

    #[must_use]
    pub fn process(&self) -> Option<&Process> {
        self.process.as_ref()
    }

    #[must_use]
    pub fn material(&self) -> Option<&Material> {
        self.material.as_ref()
    }

    #[must_use]
    pub fn measurements(&self) -> &IndexMap<String, Measurement> {
        &self.measurements
    }

    #[must_use]
    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.measurements.get(name)
    }

    /// Every element: ingredients, process, material, then measurements.
    #[must_use]
    pub fn elements(&self) -> Vec<Element> {
        let mut out: Vec<Element> = self.ingredients.values().cloned().map(Element::from).collect();
        out.extend(self.process.clone().map(Element::from));
        out.extend(self.material.clone().map(Element::from));
        out.extend(self.measurements.values().cloned().map(Element::from));
        out
    }

    /// Wire ingredients to the process, the process to the material, and
    /// measurements to the material, on specs and runs. Missing endpoints
    /// are skipped. Applying it again changes nothing.
    pub fn link_within(&self) {
        if let Some(process) = &self.process {
            for ingredient in self.ingredients.values() {
                ingredient.link_process(process);
            }
            if let Some(material) = &self.material {
                material.link_process(process);
            }
        }
        if let Some(material) = &self.material {
            for measurement in self.measurements.values() {
                measurement.link_material(material);
            }
        }
        debug!(sequence = %self.name, "Linked sequence");
    }

    /// Feed `prior`'s material into this sequence's ingredient
    /// `ingredient_name`. Returns whether a link was made.
    pub fn link_prior(&self, prior: &MaterialsSequence, ingredient_name: &str) -> bool {
        let Some(ingredient) = self.ingredients.get(ingredient_name) else {
            info!(
                sequence = %self.name,
                ingredient = ingredient_name,
                "No such ingredient; nothing linked"
            );
            return false;
        };
        let Some(material) = prior.material.as_ref() else {
            info!(sequence = %prior.name, "Prior sequence has no material; nothing linked");
            return false;
        };
        ingredient.link_material(material);
        true
    }

    /// Feed this sequence's material into `posterior`'s ingredient
    /// `ingredient_name`.
    pub fn link_posterior(&self, posterior: &MaterialsSequence, ingredient_name: &str) -> bool {
        posterior.link_prior(self, ingredient_name)
    }

    /// Recover the sequence around one spec or run.
    ///
    /// The run, if given, is the starting point; otherwise the spec is. The
    /// ownership graph is walked both ways, each of the four slots visited
    /// at most once, and the result is linked with
    /// [`MaterialsSequence::link_within`].
    pub fn from_spec_or_run(
        name: &str,
        spec: Option<EntityRef>,
        run: Option<EntityRef>,
        stores: &StoresConfig,
    ) -> Result<Self, GemdError> {
        let sequence = match (run, spec) {
            (Some(run), _) => RunWalk::from_start(&run)?.into_sequence(name, stores)?,
            (None, Some(spec)) => SpecWalk::from_start(&spec)?.into_sequence(name, stores)?,
            (None, None) => return Err(GemdError::NoSpecOrRun),
        };
        sequence.link_within();
        Ok(sequence)
    }
}

// =============================================================================
// TRAVERSAL
// =============================================================================

/// Slots already entered during a traversal.
#[derive(Debug, Default)]
struct Visited {
    process: bool,
    measurements: bool,
    material: bool,
    ingredients: bool,
}

fn resolved<T: Entity>(reference: Option<&Ref<T>>) -> Option<Handle<T>> {
    reference.and_then(Ref::object).cloned()
}

fn push_unique<T>(list: &mut Vec<Handle<T>>, handle: Handle<T>) {
    if !list.iter().any(|h| Handle::ptr_eq(h, &handle)) {
        list.push(handle);
    }
}

fn unexpected_start(entity: &EntityRef) -> GemdError {
    GemdError::WrongElementType {
        expected: "material, process, measurement or ingredient".to_string(),
        found: entity.entity_type().to_string(),
    }
}

#[derive(Default)]
struct RunWalk {
    visited: Visited,
    ingredients: Vec<Handle<IngredientRun>>,
    process: Option<Handle<ProcessRun>>,
    material: Option<Handle<MaterialRun>>,
    measurements: Vec<Handle<MeasurementRun>>,
}

impl RunWalk {
    fn from_start(start: &EntityRef) -> Result<Self, GemdError> {
        let mut walk = Self::default();
        match start {
            EntityRef::MaterialRun(run) => walk.material(run),
            EntityRef::ProcessRun(run) => walk.process(run),
            EntityRef::IngredientRun(run) => {
                let process = resolved(run.read().process.as_ref());
                if let Some(process) = process {
                    walk.process(&process);
                }
                push_unique(&mut walk.ingredients, run.clone());
            }
            EntityRef::MeasurementRun(run) => {
                let material = resolved(run.read().material.as_ref());
                if let Some(material) = material {
                    walk.material(&material);
                }
                push_unique(&mut walk.measurements, run.clone());
            }
            other => return Err(unexpected_start(other)),
        }
        Ok(walk)
    }

    fn material(&mut self, run: &Handle<MaterialRun>) {
        if self.visited.material {
            return;
        }
        self.visited.material = true;
        self.material = Some(run.clone());

        let (process, measurements) = {
            let material = run.read();
            let measurements: Vec<_> = material
                .measurements
                .iter()
                .filter_map(|weak| weak.upgrade())
                .collect();
            (resolved(material.process.as_ref()), measurements)
        };
        if let Some(process) = process {
            self.process(&process);
        }
        if !self.visited.measurements {
            self.visited.measurements = true;
            for measurement in measurements {
                push_unique(&mut self.measurements, measurement);
            }
        }
    }

    fn process(&mut self, run: &Handle<ProcessRun>) {
        if self.visited.process {
            return;
        }
        self.visited.process = true;
        self.process = Some(run.clone());

        let (ingredients, output) = {
            let process = run.read();
            let ingredients: Vec<_> = process
                .ingredients
                .iter()
                .filter_map(|weak| weak.upgrade())
                .collect();
            (ingredients, process.output_material.as_ref().and_then(|w| w.upgrade()))
        };
        if !self.visited.ingredients {
            self.visited.ingredients = true;
            for ingredient in ingredients {
                push_unique(&mut self.ingredients, ingredient);
            }
        }
        if let Some(material) = output {
            self.material(&material);
        }
    }

    fn into_sequence(self, name: &str, stores: &StoresConfig) -> Result<MaterialsSequence, GemdError> {
        let mut builder = MaterialsSequence::builder(name);
        for run in self.ingredients {
            let element_name = run.read().name.clone();
            builder = builder.ingredient(Ingredient::from_spec_or_run(&element_name, None, Some(run), stores)?);
        }
        if let Some(run) = self.process {
            let element_name = run.read().name.clone();
            builder = builder.process(Process::from_spec_or_run(&element_name, None, Some(run), stores)?);
        }
        if let Some(run) = self.material {
            let element_name = run.read().name.clone();
            builder = builder.material(Material::from_spec_or_run(&element_name, None, Some(run), stores)?);
        }
        for run in self.measurements {
            let element_name = run.read().name.clone();
            builder = builder
                .measurement(Measurement::from_spec_or_run(&element_name, None, Some(run), stores)?);
        }
        builder.build()
    }
}

/// Spec-level walk. Measurement specs do not point at materials, so only a
/// measurement spec given as the start is collected.
#[derive(Default)]
struct SpecWalk {
    visited: Visited,
    ingredients: Vec<Handle<IngredientSpec>>,
    process: Option<Handle<ProcessSpec>>,
    material: Option<Handle<MaterialSpec>>,
    measurements: Vec<Handle<MeasurementSpec>>,
}

impl SpecWalk {
    fn from_start(start: &EntityRef) -> Result<Self, GemdError> {
        let mut walk = Self::default();
        match start {
            EntityRef::MaterialSpec(spec) => walk.material(spec),
            EntityRef::ProcessSpec(spec) => walk.process(spec),
            EntityRef::IngredientSpec(spec) => {
                let process = resolved(spec.read().process.as_ref());
                if let Some(process) = process {
                    walk.process(&process);
                }
                push_unique(&mut walk.ingredients, spec.clone());
            }
            EntityRef::MeasurementSpec(spec) => {
                walk.visited.measurements = true;
                walk.measurements.push(spec.clone());
            }
            other => return Err(unexpected_start(other)),
        }
        Ok(walk)
    }

    fn material(&mut self, spec: &Handle<MaterialSpec>) {
        if self.visited.material {
            return;
        }
        self.visited.material = true;
        self.material = Some(spec.clone());
        let process = resolved(spec.read().process.as_ref());
        if let Some(process) = process {
            self.process(&process);
        }
    }

    fn process(&mut self, spec: &Handle<ProcessSpec>) {
        if self.visited.process {
            return;
        }
        self.visited.process = true;
        self.process = Some(spec.clone());

        let (ingredients, output) = {
            let process = spec.read();
            let ingredients: Vec<_> = process
                .ingredients
                .iter()
                .filter_map(|weak| weak.upgrade())
                .collect();
            (ingredients, process.output_material.as_ref().and_then(|w| w.upgrade()))
        };
        if !self.visited.ingredients {
            self.visited.ingredients = true;
            for ingredient in ingredients {
                push_unique(&mut self.ingredients, ingredient);
            }
        }
        if let Some(material) = output {
            self.material(&material);
        }
    }

    fn into_sequence(self, name: &str, stores: &StoresConfig) -> Result<MaterialsSequence, GemdError> {
        let mut builder = MaterialsSequence::builder(name);
        for spec in self.ingredients {
            let element_name = spec.read().name.clone();
            builder = builder.ingredient(Ingredient::from_spec_or_run(&element_name, Some(spec), None, stores)?);
        }
        if let Some(spec) = self.process {
            let element_name = spec.read().name.clone();
            builder = builder.process(Process::from_spec_or_run(&element_name, Some(spec), None, stores)?);
        }
        if let Some(spec) = self.material {
            let element_name = spec.read().name.clone();
            builder = builder.material(Material::from_spec_or_run(&element_name, Some(spec), None, stores)?);
        }
        for spec in self.measurements {
            let element_name = spec.read().name.clone();
            builder = builder
                .measurement(Measurement::from_spec_or_run(&element_name, Some(spec), None, stores)?);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MaterialTemplate, MeasurementTemplate, ProcessTemplate};

    fn sequence(stores: &StoresConfig, prefix: &str, ingredient: &str) -> MaterialsSequence {
        let pt = Handle::new(ProcessTemplate::new("Polishing"));
        let mt = Handle::new(MaterialTemplate::new("Alloy"));
        let qt = Handle::new(MeasurementTemplate::new("Hardness Test"));
        MaterialsSequence::builder(prefix)
            .ingredient(Ingredient::new(ingredient, stores))
            .process(Process::new(format!("{prefix} P"), &pt, stores).expect("process"))
            .material(Material::new(format!("{prefix} M"), &mt, stores).expect("material"))
            .measurement(Measurement::new(format!("{prefix} Q"), &qt, stores).expect("measurement"))
            .sequence_type("polish")
            .build()
            .expect("sequence")
    }

    #[test]
    fn link_within_wires_runs_and_specs() {
        let stores = StoresConfig::new();
        let seq = sequence(&stores, "S", "I");
        seq.link_within();

        let ingredient = seq.ingredient("I").expect("ingredient");
        let process = seq.process().expect("process");
        let material = seq.material().expect("material");
        let measurement = seq.measurement("S Q").expect("measurement");

        let ingredient_process = resolved(ingredient.run().read().process.as_ref()).expect("process");
        assert!(Handle::ptr_eq(&ingredient_process, process.run()));
        assert!(Handle::ptr_eq(&process.output_material().expect("output"), material.run()));
        assert!(Handle::ptr_eq(&measurement.material_run().expect("material"), material.run()));
        let spec_process = resolved(material.spec().read().process.as_ref()).expect("spec process");
        assert!(Handle::ptr_eq(&spec_process, process.spec()));
    }

    #[test]
    fn link_within_is_idempotent() {
        let stores = StoresConfig::new();
        let seq = sequence(&stores, "S", "I");
        seq.link_within();
        let first = seq.process().expect("process").output_material().expect("output");
        seq.link_within();
        let second = seq.process().expect("process").output_material().expect("output");

        assert!(Handle::ptr_eq(&first, &second));
        assert_eq!(seq.process().expect("process").ingredients().len(), 1);
        assert_eq!(seq.material().expect("material").measurements().len(), 1);
    }

    #[test]
    fn link_prior_feeds_material_into_ingredient() {
        let stores = StoresConfig::new();
        let a = sequence(&stores, "A", "Raw Alloy Ingredient");
        let b = sequence(&stores, "B", "Polished Alloy Ingredient");

        assert!(b.link_prior(&a, "Polished Alloy Ingredient"));
        let fed = b
            .ingredient("Polished Alloy Ingredient")
            .and_then(Ingredient::material_run)
            .expect("material");
        assert!(Handle::ptr_eq(&fed, a.material().expect("material").run()));

        assert!(!b.link_prior(&a, "Missing"));
        assert!(a.link_posterior(&b, "Polished Alloy Ingredient"));
    }

    #[test]
    fn builder_checks_slot_types_and_names() {
        let stores = StoresConfig::new();
        let err = MaterialsSequence::builder("S")
            .process(Ingredient::new("I", &stores))
            .build()
            .expect_err("wrong type");
        assert!(matches!(err, GemdError::WrongElementType { .. }));

        let err = MaterialsSequence::builder("S")
            .ingredient(Ingredient::new("I", &stores))
            .ingredient(Ingredient::new("I", &stores))
            .build()
            .expect_err("duplicate");
        assert!(matches!(err, GemdError::DuplicateName { collection, .. } if collection == "ingredients"));
    }

    #[test]
    fn elements_follow_graph_order() {
        let stores = StoresConfig::new();
        let seq = sequence(&stores, "S", "I");
        let variants: Vec<_> = seq.elements().iter().map(Element::variant).collect();
        assert_eq!(
            variants,
            vec![
                ElementVariant::Ingredient,
                ElementVariant::Process,
                ElementVariant::Material,
                ElementVariant::Measurement,
            ]
        );
    }

    #[test]
    fn recovers_sequence_from_material_run() {
        let stores = StoresConfig::new();
        let seq = sequence(&stores, "S", "I");
        seq.link_within();
        let material = seq.material().expect("material");

        let recovered = MaterialsSequence::from_spec_or_run(
            "recovered",
            None,
            Some(EntityRef::from(material.run().clone())),
            &stores,
        )
        .expect("recover");

        assert!(Handle::ptr_eq(
            recovered.process().expect("process").run(),
            seq.process().expect("process").run()
        ));
        assert_eq!(recovered.ingredients().len(), 1);
        assert_eq!(recovered.measurements().len(), 1);
    }

    #[test]
    fn recovers_sequence_from_ingredient_spec() {
        let stores = StoresConfig::new();
        let seq = sequence(&stores, "S", "I");
        seq.link_within();
        let spec = seq.ingredient("I").expect("ingredient").spec().clone();

        let recovered =
            MaterialsSequence::from_spec_or_run("recovered", Some(EntityRef::from(spec)), None, &stores)
                .expect("recover");
        assert!(recovered.material().is_some());
        assert_eq!(recovered.ingredients().len(), 1);
        assert!(recovered.measurements().is_empty());
    }

    #[test]
    fn needs_a_starting_node() {
        let stores = StoresConfig::new();
        assert!(matches!(
            MaterialsSequence::from_spec_or_run("S", None, None, &stores),
            Err(GemdError::NoSpecOrRun)
        ));
    }
}
