//! Material elements.

use crate::element::attributes::{AttributeSlots, merge_attributes};
use crate::element::builder::{Parts, apply_initial, construct, reconstruct};
use crate::element::process::Process;
use crate::element::{ElementBuilder, ElementVariant, GemdElement, TemplatedElement};
use crate::model::{
    Attribute, AttributeKind, Handle, MaterialRun, MaterialSpec, MaterialTemplate,
    MeasurementRun, ProcessRun, Ref, SampleType,
};
use crate::store::StoresConfig;
use crate::types::GemdError;

/// A material: template, spec and run.
///
/// Properties live on the spec only; a material run's properties are the
/// measurement runs that point at it.
#[derive(Debug, Clone)]
pub struct Material {
    name: String,
    template: Handle<MaterialTemplate>,
    spec: Handle<MaterialSpec>,
    run: Handle<MaterialRun>,
    slots: AttributeSlots,
    stores: StoresConfig,
}

impl Material {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ElementBuilder<MaterialTemplate> {
        ElementBuilder::new(name)
    }

    pub fn new(
        name: impl Into<String>,
        template: &Handle<MaterialTemplate>,
        stores: &StoresConfig,
    ) -> Result<Self, GemdError> {
        Self::builder(name).template(template.clone()).build(stores)
    }

    /// Recover a material from an existing spec and/or run.
    pub fn from_spec_or_run(
        name: &str,
        spec: Option<Handle<MaterialSpec>>,
        run: Option<Handle<MaterialRun>>,
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

    /// Attach conditions to the spec property `property`.
    ///
    /// Conditions are merged by name into the ones already attached.
    /// Returns `false` if the spec has no such property.
    pub fn set_property_conditions(
        &mut self,
        property: &str,
        conditions: Vec<Attribute>,
    ) -> Result<bool, GemdError> {
        let mut adopted = Vec::with_capacity(conditions.len());
        for mut condition in conditions {
            if condition.kind != AttributeKind::Condition {
                return Err(GemdError::InvalidAttributeForVariant {
                    attribute: condition.kind.to_string(),
                    variant: "material property conditions".to_string(),
                });
            }
            self.slots.adopt(&mut condition, &self.stores)?;
            adopted.push(condition);
        }

        let mut spec = self.spec.write();
        match spec.properties.iter_mut().find(|p| p.property.name == property) {
            Some(pair) => {
                let existing = std::mem::take(&mut pair.conditions);
                pair.conditions = merge_attributes(Vec::new(), existing, adopted);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_sample_type(&self, sample_type: SampleType) {
        self.run.write().sample_type = sample_type;
    }

    /// Record `process` as the producer of this material, on spec and run.
    pub fn link_process(&self, process: &Process) {
        self.spec.write().process = Some(Ref::from(process.spec()));
        process.spec().write().output_material = Some(self.spec.downgrade());
        self.run.write().process = Some(Ref::from(process.run()));
        process.run().write().output_material = Some(self.run.downgrade());
    }

    /// The process run this material came from.
    #[must_use]
    pub fn process_run(&self) -> Option<Handle<ProcessRun>> {
        self.run.read().process.as_ref().and_then(Ref::object).cloned()
    }

    /// Measurement runs performed on this material.
    #[must_use]
    pub fn measurements(&self) -> Vec<Handle<MeasurementRun>> {
        self.run
            .read()
            .measurements
            .iter()
            .filter_map(|weak| weak.upgrade())
            .collect()
    }
}

impl ElementBuilder<MaterialTemplate> {
    pub fn build(self, stores: &StoresConfig) -> Result<Material, GemdError> {
        let (parts, attributes) = construct::<Material>(self, stores)?;
        let mut material = Material::from_parts(parts, stores);
        apply_initial(&mut material, attributes)?;
        Ok(material)
    }
}

impl GemdElement for Material {
    type Spec = MaterialSpec;
    type Run = MaterialRun;

    const VARIANT: ElementVariant = ElementVariant::Material;
    const SPEC_KINDS: &'static [AttributeKind] = &[AttributeKind::Property];
    const RUN_KINDS: &'static [AttributeKind] = &[];

    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> &Handle<MaterialSpec> {
        &self.spec
    }

    fn run(&self) -> &Handle<MaterialRun> {
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

    fn set_spec_handle(&mut self, spec: Handle<MaterialSpec>) {
        self.spec = spec;
    }

    fn run_spec(run: &MaterialRun) -> Option<Handle<MaterialSpec>> {
        run.spec.as_ref().and_then(Ref::object).cloned()
    }

    fn link_run_to_spec(run: &mut MaterialRun, spec: &Handle<MaterialSpec>) {
        run.spec = Some(Ref::from(spec));
    }
}

impl TemplatedElement for Material {
    type Template = MaterialTemplate;

    fn template(&self) -> &Handle<MaterialTemplate> {
        &self.template
    }

    fn spec_template(spec: &MaterialSpec) -> Option<Handle<MaterialTemplate>> {
        spec.template.as_ref().and_then(Ref::object).cloned()
    }

    fn set_spec_template(spec: &mut MaterialSpec, template: &Handle<MaterialTemplate>) {
        spec.template = Some(Ref::from(template));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::thin_documents;
    use crate::model::{AttributeTemplate, Bounds, Value};
    use crate::primitives::{AUTO_SCOPE, PERSISTENT_ID_SCOPE};
    use crate::types::Which;

    fn hardness() -> Handle<AttributeTemplate> {
        Handle::new(AttributeTemplate::property(
            "Hardness",
            Bounds::real(0.0, 100.0, "GPa"),
        ))
    }

    fn alloy_template() -> Handle<MaterialTemplate> {
        Handle::new(MaterialTemplate::new("Alloy").with_property(&hardness()))
    }

    #[test]
    fn construction_links_spec_run_and_template() {
        let stores = StoresConfig::new();
        let template = alloy_template();
        let material = Material::new("Ingot", &template, &stores).expect("material");

        assert!(Handle::ptr_eq(material.template(), &template));
        let spec_template = Material::spec_template(&material.spec().read()).expect("template");
        assert!(Handle::ptr_eq(&spec_template, &template));
        let run_spec = Material::run_spec(&material.run().read()).expect("spec");
        assert!(Handle::ptr_eq(&run_spec, material.spec()));
        assert!(material.spec().read().uids.contains_key(AUTO_SCOPE));
        assert!(material.run().read().uids.contains_key(AUTO_SCOPE));
    }

    #[test]
    fn reserved_uids_are_rejected_without_active_stores() {
        let stores = StoresConfig::new();
        for scope in [AUTO_SCOPE, PERSISTENT_ID_SCOPE] {
            let mut template = MaterialTemplate::new("Alloy");
            template.uids.insert(scope.into(), "preassigned".into());
            let err = Material::new("Ingot", &Handle::new(template), &stores).expect_err("reserved");
            assert!(matches!(err, GemdError::ReservedScopeUid { scope: s, .. } if s == scope));
        }
    }

    #[test]
    fn written_template_can_be_built_on_again() {
        let stores = StoresConfig::new();
        let template = alloy_template();
        let first = Material::new("Ingot 1", &template, &stores).expect("first");
        thin_documents(&[first.run_entity()]).expect("write");
        assert!(template.read().uids.contains_key(AUTO_SCOPE));

        let second = Material::new("Ingot 2", &template, &stores.clone()).expect("second");
        assert!(Handle::ptr_eq(second.template(), &template));
        assert!(matches!(
            Material::new("Ingot 3", &template, &StoresConfig::new()),
            Err(GemdError::ReservedScopeUid { .. })
        ));
    }

    #[test]
    fn missing_template_is_rejected() {
        let stores = StoresConfig::new();
        let err = Material::builder("Ingot").build(&stores).expect_err("no template");
        assert!(matches!(err, GemdError::MissingTemplate(name) if name == "Ingot"));
    }

    #[test]
    fn declared_template_is_used_unless_overridden() {
        let stores = StoresConfig::new();
        let declared = alloy_template();
        let explicit = Handle::new(MaterialTemplate::new("Powder"));

        let plain = Material::builder("A")
            .declared_template(declared.clone())
            .build(&stores)
            .expect("declared");
        assert!(Handle::ptr_eq(plain.template(), &declared));

        let overridden = Material::builder("B")
            .declared_template(declared)
            .template(explicit.clone())
            .build(&stores)
            .expect("explicit");
        assert!(Handle::ptr_eq(overridden.template(), &explicit));
    }

    #[test]
    fn required_properties_are_kept() {
        let stores = StoresConfig::new();
        let mut material = Material::builder("Ingot")
            .template(alloy_template())
            .default_value(AttributeKind::Property, "Hardness", Value::nominal_real(5.0, "GPa"))
            .build(&stores)
            .expect("material");

        assert_eq!(material.attributes(AttributeKind::Property, Which::Spec).len(), 1);
        let err = material
            .remove_attributes(AttributeKind::Property, &["Hardness"], Which::Both)
            .expect_err("required");
        assert!(matches!(err, GemdError::RemovingRequired(_)));

        material
            .update_attributes(AttributeKind::Property, Vec::new(), true, Which::Both)
            .expect("replace");
        assert_eq!(material.attributes(AttributeKind::Property, Which::Spec).len(), 1);
    }

    #[test]
    fn parameters_are_invalid_on_materials() {
        let stores = StoresConfig::new();
        let mut material = Material::new("Ingot", &alloy_template(), &stores).expect("material");
        let err = material
            .update_attributes(
                AttributeKind::Parameter,
                vec![Attribute::parameter("Speed")],
                false,
                Which::Both,
            )
            .expect_err("parameter");
        assert!(matches!(err, GemdError::InvalidAttributeForVariant { .. }));
    }

    #[test]
    fn property_values_are_bounds_checked() {
        let stores = StoresConfig::new();
        let mut material = Material::new("Ingot", &alloy_template(), &stores).expect("material");
        let err = material
            .update_attributes(
                AttributeKind::Property,
                vec![Attribute::property("Hardness").with_value(Value::nominal_real(500.0, "GPa"))],
                false,
                Which::Spec,
            )
            .expect_err("out of bounds");
        assert!(matches!(err, GemdError::BoundsViolation { .. }));
    }

    #[test]
    fn property_conditions_attach_to_named_property() {
        let stores = StoresConfig::new();
        let mut material = Material::new("Ingot", &alloy_template(), &stores).expect("material");
        material
            .update_attributes(
                AttributeKind::Property,
                vec![Attribute::property("Hardness").with_value(Value::nominal_real(5.0, "GPa"))],
                false,
                Which::Both,
            )
            .expect("property");

        let temperature = Handle::new(AttributeTemplate::condition(
            "Temperature",
            Bounds::real(0.0, 2000.0, "K"),
        ));
        let condition = Attribute::condition("Temperature")
            .with_template(&temperature)
            .with_value(Value::nominal_real(300.0, "K"));
        assert!(material
            .set_property_conditions("Hardness", vec![condition.clone()])
            .expect("conditions"));
        assert!(!material
            .set_property_conditions("Density", vec![condition])
            .expect("missing property"));
        assert_eq!(material.spec().read().properties[0].conditions.len(), 1);
    }

    #[test]
    fn from_spec_or_run_needs_one_side() {
        let stores = StoresConfig::new();
        let err = Material::from_spec_or_run("X", None, None, &stores).expect_err("empty");
        assert!(matches!(err, GemdError::NoSpecOrRun));
    }

    #[test]
    fn from_spec_instantiates_run() {
        let stores = StoresConfig::new();
        let mut spec = MaterialSpec::new("old name");
        spec.notes = Some("cast".into());
        spec.template = Some(Ref::from(alloy_template()));
        let spec = Handle::new(spec);

        let material =
            Material::from_spec_or_run("Ingot", Some(spec.clone()), None, &stores).expect("material");
        assert_eq!(material.name(), "Ingot");
        assert_eq!(spec.read().name, "Ingot");
        assert_eq!(material.run().read().notes.as_deref(), Some("cast"));
        let run_spec = Material::run_spec(&material.run().read()).expect("spec");
        assert!(Handle::ptr_eq(&run_spec, &spec));
        assert!(material.slots().get(AttributeKind::Property, "Hardness").is_some());
    }

    #[test]
    fn from_run_without_template_fails() {
        let stores = StoresConfig::new();
        let run = Handle::new(MaterialRun::new("Ingot"));
        let err = Material::from_spec_or_run("Ingot", None, Some(run), &stores).expect_err("template");
        assert!(matches!(err, GemdError::MissingTemplate(_)));
    }
}
