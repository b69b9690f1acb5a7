//! Ingredient elements. Ingredients have no template and no attributes.

use crate::element::attributes::AttributeSlots;
use crate::element::builder::{new_run, new_spec, reconcile};
use crate::element::material::Material;
use crate::element::process::Process;
use crate::element::{ElementVariant, GemdElement, TemplatedElement};
use crate::model::handle::push_back_reference;
use crate::model::{AttributeKind, Handle, IngredientRun, IngredientSpec, MaterialRun, Ref};
use crate::store::StoresConfig;
use crate::types::GemdError;
use tracing::warn;

/// The use of a material as input to a process.
#[derive(Debug, Clone)]
pub struct Ingredient {
    name: String,
    spec: Handle<IngredientSpec>,
    run: Handle<IngredientRun>,
    slots: AttributeSlots,
    stores: StoresConfig,
}

impl Ingredient {
    #[must_use]
    pub fn new(name: impl Into<String>, stores: &StoresConfig) -> Self {
        let name = name.into();
        let spec = new_spec::<Self>(&name, None);
        let run = new_run::<Self>(&name, &spec);
        Self {
            name,
            spec,
            run,
            slots: AttributeSlots::default(),
            stores: stores.clone(),
        }
    }

    pub fn from_spec_or_run(
        name: &str,
        spec: Option<Handle<IngredientSpec>>,
        run: Option<Handle<IngredientRun>>,
        stores: &StoresConfig,
    ) -> Result<Self, GemdError> {
        let (spec, run) = reconcile::<Self>(name, spec, run)?;
        Ok(Self {
            name: name.to_string(),
            spec,
            run,
            slots: AttributeSlots::default(),
            stores: stores.clone(),
        })
    }

    pub fn set_labels(&self, labels: Vec<String>) {
        self.spec.write().labels = labels;
    }

    /// Record `process` as the consumer of this ingredient, on spec and run.
    pub fn link_process(&self, process: &Process) {
        if !process.allows_ingredient(&self.name) {
            warn!(
                ingredient = %self.name,
                process = %process.name(),
                template = %process.template().read().name,
                "Ingredient name not allowed by process template"
            );
        }
        self.spec.write().process = Some(Ref::from(process.spec()));
        push_back_reference(&mut process.spec().write().ingredients, &self.spec);
        self.run.write().process = Some(Ref::from(process.run()));
        push_back_reference(&mut process.run().write().ingredients, &self.run);
    }

    /// Consume `material`, on spec and run.
    pub fn link_material(&self, material: &Material) {
        self.spec.write().material = Some(Ref::from(material.spec()));
        self.run.write().material = Some(Ref::from(material.run()));
    }

    #[must_use]
    pub fn material_run(&self) -> Option<Handle<MaterialRun>> {
        self.run.read().material.as_ref().and_then(Ref::object).cloned()
    }
}

impl GemdElement for Ingredient {
    type Spec = IngredientSpec;
    type Run = IngredientRun;

    const VARIANT: ElementVariant = ElementVariant::Ingredient;
    const SPEC_KINDS: &'static [AttributeKind] = &[];
    const RUN_KINDS: &'static [AttributeKind] = &[];

    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> &Handle<IngredientSpec> {
        &self.spec
    }

    fn run(&self) -> &Handle<IngredientRun> {
        &self.run
    }

    fn slots(&self) -> &AttributeSlots {
        &self.slots
    }

    fn slots_mut(&mut self) -> &mut AttributeSlots {
        &mut self.slots
    }

    fn stores(&self) -> &StoresConfig {
        &self.stores
    }

    fn set_spec_handle(&mut self, spec: Handle<IngredientSpec>) {
        self.spec = spec;
    }

    fn run_spec(run: &IngredientRun) -> Option<Handle<IngredientSpec>> {
        run.spec.as_ref().and_then(Ref::object).cloned()
    }

    fn link_run_to_spec(run: &mut IngredientRun, spec: &Handle<IngredientSpec>) {
        run.spec = Some(Ref::from(spec));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attribute, ProcessTemplate};
    use crate::types::Which;

    #[test]
    fn ingredients_reject_attributes() {
        let stores = StoresConfig::new();
        let mut ingredient = Ingredient::new("Powder", &stores);
        for kind in AttributeKind::ALL {
            let err = ingredient
                .update_attributes(kind, vec![Attribute::new(kind, "x")], false, Which::Both)
                .expect_err("no attributes");
            assert!(matches!(err, GemdError::InvalidAttributeForVariant { .. }));
        }
    }

    #[test]
    fn link_process_is_idempotent() {
        let stores = StoresConfig::new();
        let ingredient = Ingredient::new("Powder", &stores);
        let process = Process::new("Melt", &Handle::new(ProcessTemplate::new("Melting")), &stores)
            .expect("process");

        ingredient.link_process(&process);
        ingredient.link_process(&process);

        assert_eq!(process.ingredients().len(), 1);
        assert!(Handle::ptr_eq(&process.ingredients()[0], ingredient.run()));
        assert_eq!(process.spec().read().ingredients.len(), 1);
    }

    #[test]
    fn from_run_recovers_spec() {
        let stores = StoresConfig::new();
        let original = Ingredient::new("Powder", &stores);
        let recovered =
            Ingredient::from_spec_or_run("Powder (reused)", None, Some(original.run().clone()), &stores)
                .expect("ingredient");
        assert!(Handle::ptr_eq(recovered.spec(), original.spec()));
        assert_eq!(original.spec().read().name, "Powder (reused)");
    }
}
