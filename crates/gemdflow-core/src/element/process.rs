//! Process elements.

use crate::element::attributes::AttributeSlots;
use crate::element::builder::{Parts, apply_initial, construct, reconstruct};
use crate::element::{ElementBuilder, ElementVariant, GemdElement, TemplatedElement};
use crate::model::{
    AttributeKind, Handle, IngredientRun, MaterialRun, ProcessRun, ProcessSpec, ProcessTemplate,
    Ref,
};
use crate::store::StoresConfig;
use crate::types::{GemdError, Source};

/// A process: template, spec and run. Conditions and parameters live on
/// both spec and run.
#[derive(Debug, Clone)]
pub struct Process {
    name: String,
    template: Handle<ProcessTemplate>,
    spec: Handle<ProcessSpec>,
    run: Handle<ProcessRun>,
    slots: AttributeSlots,
    stores: StoresConfig,
}

impl Process {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ElementBuilder<ProcessTemplate> {
        ElementBuilder::new(name)
    }

    pub fn new(
        name: impl Into<String>,
        template: &Handle<ProcessTemplate>,
        stores: &StoresConfig,
    ) -> Result<Self, GemdError> {
        Self::builder(name).template(template.clone()).build(stores)
    }

    pub fn from_spec_or_run(
        name: &str,
        spec: Option<Handle<ProcessSpec>>,
        run: Option<Handle<ProcessRun>>,
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

    /// Who ran the process and when.
    pub fn set_source(&self, source: Source) {
        self.run.write().source = Some(source);
    }

    /// Ingredient runs consumed by this process run.
    #[must_use]
    pub fn ingredients(&self) -> Vec<Handle<IngredientRun>> {
        self.run
            .read()
            .ingredients
            .iter()
            .filter_map(|weak| weak.upgrade())
            .collect()
    }

    #[must_use]
    pub fn output_material(&self) -> Option<Handle<MaterialRun>> {
        self.run
            .read()
            .output_material
            .as_ref()
            .and_then(|weak| weak.upgrade())
    }

    /// Whether the template admits an ingredient called `name`. Templates
    /// with no allowed names admit anything.
    #[must_use]
    pub fn allows_ingredient(&self, name: &str) -> bool {
        let template = self.template.read();
        template.allowed_names.is_empty() || template.allowed_names.iter().any(|n| n == name)
    }
}

impl ElementBuilder<ProcessTemplate> {
    pub fn build(self, stores: &StoresConfig) -> Result<Process, GemdError> {
        let (parts, attributes) = construct::<Process>(self, stores)?;
        let mut process = Process::from_parts(parts, stores);
        apply_initial(&mut process, attributes)?;
        Ok(process)
    }
}

impl GemdElement for Process {
    type Spec = ProcessSpec;
    type Run = ProcessRun;

    const VARIANT: ElementVariant = ElementVariant::Process;
    const SPEC_KINDS: &'static [AttributeKind] = &[AttributeKind::Condition, AttributeKind::Parameter];
    const RUN_KINDS: &'static [AttributeKind] = &[AttributeKind::Condition, AttributeKind::Parameter];

    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> &Handle<ProcessSpec> {
        &self.spec
    }

    fn run(&self) -> &Handle<ProcessRun> {
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

    fn set_spec_handle(&mut self, spec: Handle<ProcessSpec>) {
        self.spec = spec;
    }

    fn run_spec(run: &ProcessRun) -> Option<Handle<ProcessSpec>> {
        run.spec.as_ref().and_then(Ref::object).cloned()
    }

    fn link_run_to_spec(run: &mut ProcessRun, spec: &Handle<ProcessSpec>) {
        run.spec = Some(Ref::from(spec));
    }
}

impl TemplatedElement for Process {
    type Template = ProcessTemplate;

    fn template(&self) -> &Handle<ProcessTemplate> {
        &self.template
    }

    fn spec_template(spec: &ProcessSpec) -> Option<Handle<ProcessTemplate>> {
        spec.template.as_ref().and_then(Ref::object).cloned()
    }

    fn set_spec_template(spec: &mut ProcessSpec, template: &Handle<ProcessTemplate>) {
        spec.template = Some(Ref::from(template));
    }
}
