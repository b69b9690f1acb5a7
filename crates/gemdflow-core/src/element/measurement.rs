//! Measurement elements.

use crate::element::attributes::AttributeSlots;
use crate::element::builder::{Parts, apply_initial, construct, reconstruct};
use crate::element::material::Material;
use crate::element::{ElementBuilder, ElementVariant, GemdElement, TemplatedElement};
use crate::model::handle::push_back_reference;
use crate::model::{
    AttributeKind, Handle, MaterialRun, MeasurementRun, MeasurementSpec, MeasurementTemplate, Ref,
};
use crate::store::StoresConfig;
use crate::types::{GemdError, Source};

/// A measurement: template, spec and run. Properties are measured, so they
/// only exist on the run.
#[derive(Debug, Clone)]
pub struct Measurement {
    name: String,
    template: Handle<MeasurementTemplate>,
    spec: Handle<MeasurementSpec>,
    run: Handle<MeasurementRun>,
    slots: AttributeSlots,
    stores: StoresConfig,
}

impl Measurement {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ElementBuilder<MeasurementTemplate> {
        ElementBuilder::new(name)
    }

    pub fn new(
        name: impl Into<String>,
        template: &Handle<MeasurementTemplate>,
        stores: &StoresConfig,
    ) -> Result<Self, GemdError> {
        Self::builder(name).template(template.clone()).build(stores)
    }

    pub fn from_spec_or_run(
        name: &str,
        spec: Option<Handle<MeasurementSpec>>,
        run: Option<Handle<MeasurementRun>>,
        stores: &StoresConfig,
    ) -> Result<Self, GemdError> {
        let parts = reconstruct::<Self>(name, spec, run)?;
        Ok(Self::from_parts(parts, stores))
    }

    fn from_parts(parts: Parts<Self>, stores: &StoresConfig) -> Self {
        Self {
            name: parts.name,
            template: parts.template,
            spec: parts.spec,
            run: parts.run,
            slots: parts.slots,
            stores: stores.clone(),
        }
    }

    pub fn set_source(&self, source: Source) {
        self.run.write().source = Some(source);
    }

    /// Point the run at the measured material run.
    pub fn link_material(&self, material: &Material) {
        self.run.write().material = Some(Ref::from(material.run()));
        push_back_reference(&mut material.run().write().measurements, &self.run);
    }

    #[must_use]
    pub fn material_run(&self) -> Option<Handle<MaterialRun>> {
        self.run.read().material.as_ref().and_then(Ref::object).cloned()
    }
}

impl ElementBuilder<MeasurementTemplate> {
    pub fn build(self, stores: &StoresConfig) -> Result<Measurement, GemdError> {
        let (parts, attributes) = construct::<Measurement>(self, stores)?;
        let mut measurement = Measurement::from_parts(parts, stores);
        apply_initial(&mut measurement, attributes)?;
        Ok(measurement)
    }
}

impl GemdElement for Measurement {
    type Spec = MeasurementSpec;
    type Run = MeasurementRun;

    const VARIANT: ElementVariant = ElementVariant::Measurement;
    const SPEC_KINDS: &'static [AttributeKind] = &[AttributeKind::Condition, AttributeKind::Parameter];
    const RUN_KINDS: &'static [AttributeKind] = &[
        AttributeKind::Property,
        AttributeKind::Condition,
        AttributeKind::Parameter,
    ];

    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> &Handle<MeasurementSpec> {
        &self.spec
    }

    fn run(&self) -> &Handle<MeasurementRun> {
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

    fn set_spec_handle(&mut self, spec: Handle<MeasurementSpec>) {
        self.spec = spec;
    }

    fn run_spec(run: &MeasurementRun) -> Option<Handle<MeasurementSpec>> {
        run.spec.as_ref().and_then(Ref::object).cloned()
    }

    fn link_run_to_spec(run: &mut MeasurementRun, spec: &Handle<MeasurementSpec>) {
        run.spec = Some(Ref::from(spec));
    }
}

impl TemplatedElement for Measurement {
    type Template = MeasurementTemplate;

    fn template(&self) -> &Handle<MeasurementTemplate> {
        &self.template
    }

    fn spec_template(spec: &MeasurementSpec) -> Option<Handle<MeasurementTemplate>> {
        spec.template.as_ref().and_then(Ref::object).cloned()
    }

    fn set_spec_template(spec: &mut MeasurementSpec, template: &Handle<MeasurementTemplate>) {
        spec.template = Some(Ref::from(template));
    }
}
