//! Element construction.
//!
//! Every templated element is built the same way: resolve the template,
//! reject reserved uids, intern it, derive the attribute slots, then create
//! the spec and a run that instantiates it.

use crate::element::attributes::AttributeSlots;
use crate::element::{GemdElement, TemplatedElement};
use crate::encoder::ensure_auto_uid;
use crate::model::{
    Attribute, AttributeHolder, AttributeKind, Described, Entity, Handle, ObjectTemplate, Value,
};
use crate::primitives::RESERVED_SCOPES;
use crate::store::{Provenance, StoresConfig};
use crate::types::{GemdError, Which};
use tracing::{debug, warn};

/// Collects the inputs of one element.
///
/// A `declared` template plays the role of a subclass default; an explicit
/// `template` overrides it with a warning.
#[derive(Debug, Clone)]
pub struct ElementBuilder<T: ObjectTemplate> {
    pub(crate) name: String,
    pub(crate) notes: Option<String>,
    declared: Option<Handle<T>>,
    explicit: Option<Handle<T>>,
    defaults: Vec<(AttributeKind, String, Value)>,
    pub(crate) attributes: Vec<Attribute>,
}

impl<T: ObjectTemplate> ElementBuilder<T> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            notes: None,
            declared: None,
            explicit: None,
            defaults: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// The template this kind of element normally uses.
    #[must_use]
    pub fn declared_template(mut self, template: Handle<T>) -> Self {
        self.declared = Some(template);
        self
    }

    /// Override the declared template.
    #[must_use]
    pub fn template(mut self, template: Handle<T>) -> Self {
        self.explicit = Some(template);
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Make the slot `name` required with `value` as its default.
    #[must_use]
    pub fn default_value(mut self, kind: AttributeKind, name: impl Into<String>, value: Value) -> Self {
        self.defaults.push((kind, name.into(), value));
        self
    }

    /// An attribute to set on construction.
    #[must_use]
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// What construction hands to the concrete element.
pub(crate) struct Parts<E: TemplatedElement> {
    pub name: String,
    pub template: Handle<E::Template>,
    pub spec: Handle<E::Spec>,
    pub run: Handle<E::Run>,
    pub slots: AttributeSlots,
}

/// Run the construction steps for a templated element.
pub(crate) fn construct<E: TemplatedElement>(
    builder: ElementBuilder<E::Template>,
    stores: &StoresConfig,
) -> Result<(Parts<E>, Vec<Attribute>), GemdError> {
    let ElementBuilder {
        name,
        notes,
        declared,
        explicit,
        defaults,
        attributes,
    } = builder;

    let (template, provenance) = match (explicit, declared) {
        (Some(explicit), Some(declared)) => {
            warn!(
                element = %name,
                declared = %declared.read().name(),
                template = %explicit.read().name(),
                "Explicit template overrides the declared one"
            );
            (explicit, Provenance::memory())
        }
        (Some(explicit), None) => (explicit, Provenance::memory()),
        (None, Some(declared)) => (declared, Provenance::subclass()),
        (None, None) => return Err(GemdError::MissingTemplate(name)),
    };

    // Handles this configuration already built on carry uids it assigned.
    let entity = E::Template::wrap(template);
    if !stores.is_interned_template(&entity) && !stores.is_adopted_template(&entity) {
        for scope in RESERVED_SCOPES {
            if entity.uid(scope).is_some() {
                return Err(GemdError::ReservedScopeUid {
                    name: entity.name(),
                    scope: scope.to_string(),
                });
            }
        }
    }

    let canonical = stores.intern_template(&entity, provenance)?;
    stores.adopt_template(&canonical);
    let template = E::Template::unwrap(&canonical)
        .ok_or_else(|| GemdError::MissingTemplate(canonical.name()))?;

    let mut slots = AttributeSlots::from_template(&*template.read());
    for (kind, slot, value) in defaults {
        if !slots.set_default(kind, &slot, value)? {
            warn!(element = %name, slot = %slot, kind = %kind, "Default for unknown slot ignored");
        }
    }

    let spec = new_spec::<E>(&name, notes);
    E::set_spec_template(&mut spec.write(), &template);
    let run = new_run::<E>(&name, &spec);
    debug!(element = %name, variant = %E::VARIANT, "Constructed element");

    Ok((
        Parts {
            name,
            template,
            spec,
            run,
            slots,
        },
        attributes,
    ))
}

/// Set required defaults and any initial attributes on a fresh element.
///
/// Spec-level values are written to both spec and run where both carry the
/// kind.
pub(crate) fn apply_initial<E: GemdElement>(
    element: &mut E,
    attributes: Vec<Attribute>,
) -> Result<(), GemdError> {
    for kind in AttributeKind::ALL {
        let supplied: Vec<Attribute> = attributes
            .iter()
            .filter(|a| a.kind == kind)
            .cloned()
            .collect();
        if !E::SPEC_KINDS.contains(&kind) && !E::RUN_KINDS.contains(&kind) {
            if !supplied.is_empty() {
                return Err(GemdError::InvalidAttributeForVariant {
                    attribute: kind.to_string(),
                    variant: E::VARIANT.to_string(),
                });
            }
            continue;
        }
        element.update_attributes(kind, supplied, false, Which::Both)?;
    }
    Ok(())
}

pub(crate) fn new_spec<E: GemdElement>(name: &str, notes: Option<String>) -> Handle<E::Spec> {
    let mut spec = E::Spec::default();
    spec.set_name(name);
    spec.set_notes(notes);
    let spec = Handle::new(spec);
    ensure_auto_uid(&E::Spec::wrap(spec.clone()));
    spec
}

/// A run instantiating `spec`: same name and notes, spec-level attribute
/// values replicated, `run.spec` pointing at `spec`.
pub(crate) fn new_run<E: GemdElement>(name: &str, spec: &Handle<E::Spec>) -> Handle<E::Run> {
    let mut run = E::Run::default();
    run.set_name(name);
    {
        let spec = spec.read();
        run.set_notes(spec.notes().map(str::to_string));
        replicate_attributes::<E>(&*spec, &mut run);
    }
    E::link_run_to_spec(&mut run, spec);
    let run = Handle::new(run);
    ensure_auto_uid(&E::Run::wrap(run.clone()));
    run
}

fn replicate_attributes<E: GemdElement>(spec: &E::Spec, run: &mut E::Run) {
    for kind in E::SPEC_KINDS {
        if E::RUN_KINDS.contains(kind) {
            if let Some(attributes) = spec.attributes(*kind) {
                run.set_attributes(*kind, attributes);
            }
        }
    }
}

/// Pair up an existing spec and/or run for `from_spec_or_run`.
///
/// A missing run is instantiated from the spec; a missing spec is taken
/// from the run or created. Both end up named `name`, sharing notes, with
/// `run.spec` pointing at the spec.
pub(crate) fn reconcile<E: GemdElement>(
    name: &str,
    spec: Option<Handle<E::Spec>>,
    run: Option<Handle<E::Run>>,
) -> Result<(Handle<E::Spec>, Handle<E::Run>), GemdError> {
    let (spec, run) = match (spec, run) {
        (None, None) => return Err(GemdError::NoSpecOrRun),
        (Some(spec), Some(run)) => (spec, run),
        (Some(spec), None) => {
            let run = new_run::<E>(name, &spec);
            (spec, run)
        }
        (None, Some(run)) => {
            let existing = E::run_spec(&run.read());
            let spec = match existing {
                Some(spec) => spec,
                None => new_spec::<E>(name, run.read().notes().map(str::to_string)),
            };
            (spec, run)
        }
    };

    let notes = spec
        .read()
        .notes()
        .or(run.read().notes())
        .map(str::to_string);
    {
        let mut spec = spec.write();
        spec.set_name(name);
        spec.set_notes(notes.clone());
    }
    {
        let mut run = run.write();
        run.set_name(name);
        run.set_notes(notes);
        E::link_run_to_spec(&mut run, &spec);
    }
    ensure_auto_uid(&E::Spec::wrap(spec.clone()));
    ensure_auto_uid(&E::Run::wrap(run.clone()));
    Ok((spec, run))
}

/// Rebuild a templated element from an existing spec and/or run.
pub(crate) fn reconstruct<E: TemplatedElement>(
    name: &str,
    spec: Option<Handle<E::Spec>>,
    run: Option<Handle<E::Run>>,
) -> Result<Parts<E>, GemdError> {
    let (spec, run) = reconcile::<E>(name, spec, run)?;
    let template = E::spec_template(&spec.read())
        .ok_or_else(|| GemdError::MissingTemplate(name.to_string()))?;

    let mut slots = AttributeSlots::from_template(&*template.read());
    for kind in AttributeKind::ALL {
        let mut present = spec.read().attributes(kind).unwrap_or_default();
        present.extend(run.read().attributes(kind).unwrap_or_default());
        for attribute in present {
            slots.insert_from_attribute(&attribute);
        }
    }

    Ok(Parts {
        name: name.to_string(),
        template,
        spec,
        run,
        slots,
    })
}
