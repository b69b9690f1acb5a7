//! # Rule Configuration
//!
//! Declarative rules for the `watch` command, read from TOML:
//!
//! ```toml
//! [[templates]]
//! kind = "measurement"
//! name = "Hardness Test"
//!
//! [[templates.attributes]]
//! kind = "property"
//! name = "Hardness"
//! bounds = { type = "real_bounds", lower_bound = 0.0, upper_bound = 50.0, default_units = "GPa" }
//!
//! [[rules]]
//! name = "hardness"
//! suffix = ".csv"
//! id_regex = '(\d+)'
//! schema = ["Hardness Test"]
//! emit = "measurement"
//! template = "Hardness Test"
//! name_format = "{id} Hardness"
//! ```

use gemdflow_core::automation::{AutomatableComponent, FileIdPattern, RuleFn, glob_rule, suffix_rule};
use gemdflow_core::element::{Element, Ingredient, Material, Measurement, Process};
use gemdflow_core::model::{
    AttributeKind, AttributeTemplate, Bounds, EntityRef, Handle, MaterialTemplate,
    MeasurementTemplate, ProcessTemplate,
};
use gemdflow_core::GemdError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

// =============================================================================
// CONFIG TYPES
// =============================================================================

/// The whole rules file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Object template kinds a rules file can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Material,
    Process,
    Measurement,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    pub kind: TemplateKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeConfig {
    pub kind: AttributeKind,
    pub name: String,
    pub bounds: Bounds,
}

/// What a rule's action emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitKind {
    Material,
    Process,
    Measurement,
    Ingredient,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub name: String,
    /// Matches file names ending with this suffix.
    #[serde(default)]
    pub suffix: Option<String>,
    /// Matches whole file names; `*` and `?` are wildcards.
    #[serde(default)]
    pub pattern: Option<String>,
    pub id_regex: String,
    #[serde(default)]
    pub from_path: bool,
    #[serde(default)]
    pub schema: Vec<String>,
    pub emit: EmitKind,
    /// `{id}` and `{filename}` are substituted.
    #[serde(default = "default_name_format")]
    pub name_format: String,
    /// Schema template the emitted element uses. Not needed for ingredients.
    #[serde(default)]
    pub template: Option<String>,
}

fn default_name_format() -> String {
    "{id}".to_string()
}

// =============================================================================
// LOADING
// =============================================================================

impl RulesConfig {
    pub fn load(path: &Path) -> Result<Self, GemdError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GemdError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, GemdError> {
        toml::from_str(text).map_err(|e| GemdError::DeserializationError(e.to_string()))
    }

    /// Declared object templates by name.
    pub fn templates(&self) -> Result<BTreeMap<String, EntityRef>, GemdError> {
        let mut out = BTreeMap::new();
        for config in &self.templates {
            let template = config.build()?;
            if out.insert(config.name.clone(), template).is_some() {
                return Err(GemdError::DuplicateName {
                    collection: "templates".to_string(),
                    name: config.name.clone(),
                });
            }
        }
        Ok(out)
    }

    /// One component per rule, in file order.
    pub fn components(&self) -> Result<Vec<AutomatableComponent>, GemdError> {
        let templates = self.templates()?;
        self.rules.iter().map(|rule| rule.build(&templates)).collect()
    }
}

impl TemplateConfig {
    fn build(&self) -> Result<EntityRef, GemdError> {
        let attribute = |a: &AttributeConfig| -> Handle<AttributeTemplate> {
            Handle::new(AttributeTemplate::new(a.kind, a.name.clone(), a.bounds.clone()))
        };
        let entity = match self.kind {
            TemplateKind::Material => {
                let mut template = MaterialTemplate::new(self.name.clone());
                template.description.clone_from(&self.description);
                for a in &self.attributes {
                    if a.kind != AttributeKind::Property {
                        return Err(invalid_slot(a, "material template"));
                    }
                    template = template.with_property(&attribute(a));
                }
                EntityRef::from(Handle::new(template))
            }
            TemplateKind::Process => {
                let mut template = ProcessTemplate::new(self.name.clone());
                template.description.clone_from(&self.description);
                for a in &self.attributes {
                    template = match a.kind {
                        AttributeKind::Condition => template.with_condition(&attribute(a)),
                        AttributeKind::Parameter => template.with_parameter(&attribute(a)),
                        AttributeKind::Property => return Err(invalid_slot(a, "process template")),
                    };
                }
                EntityRef::from(Handle::new(template))
            }
            TemplateKind::Measurement => {
                let mut template = MeasurementTemplate::new(self.name.clone());
                template.description.clone_from(&self.description);
                for a in &self.attributes {
                    template = match a.kind {
                        AttributeKind::Property => template.with_property(&attribute(a)),
                        AttributeKind::Condition => template.with_condition(&attribute(a)),
                        AttributeKind::Parameter => template.with_parameter(&attribute(a)),
                    };
                }
                EntityRef::from(Handle::new(template))
            }
        };
        Ok(entity)
    }
}

fn invalid_slot(attribute: &AttributeConfig, owner: &str) -> GemdError {
    GemdError::InvalidAttributeForVariant {
        attribute: attribute.kind.to_string(),
        variant: owner.to_string(),
    }
}

impl RuleConfig {
    fn matcher(&self) -> Result<RuleFn, GemdError> {
        match (&self.suffix, &self.pattern) {
            (Some(suffix), None) => Ok(suffix_rule(suffix)),
            (None, Some(pattern)) => glob_rule(pattern),
            _ => Err(GemdError::InvalidPattern(format!(
                "rule '{}' needs exactly one of suffix or pattern",
                self.name
            ))),
        }
    }

    fn build(&self, templates: &BTreeMap<String, EntityRef>) -> Result<AutomatableComponent, GemdError> {
        let rule = self.matcher()?;
        let file_id = FileIdPattern::new(&self.id_regex, self.from_path)?;

        let template = match (self.emit, &self.template) {
            (EmitKind::Ingredient, _) => None,
            (_, Some(name)) if self.schema.contains(name) => Some(name.clone()),
            (_, Some(name)) => {
                return Err(GemdError::MissingTemplate(format!(
                    "rule '{}' uses '{}' outside its schema",
                    self.name, name
                )));
            }
            (_, None) => return Err(GemdError::MissingTemplate(format!("rule '{}'", self.name))),
        };

        let emit = self.emit;
        let name_format = self.name_format.clone();
        let mut component = AutomatableComponent::new(&self.name, rule, file_id, move |ctx| {
            let name = name_format
                .replace("{id}", ctx.file_id)
                .replace("{filename}", ctx.filename);
            let template_name = template.as_deref().unwrap_or_default();
            let missing = || GemdError::MissingTemplate(template_name.to_string());
            let element = match emit {
                EmitKind::Ingredient => Element::from(Ingredient::new(name, ctx.stores)),
                EmitKind::Material => {
                    let t = ctx
                        .component
                        .schema_template::<MaterialTemplate>(template_name)
                        .ok_or_else(missing)?;
                    Element::from(Material::new(name, &t, ctx.stores)?)
                }
                EmitKind::Process => {
                    let t = ctx
                        .component
                        .schema_template::<ProcessTemplate>(template_name)
                        .ok_or_else(missing)?;
                    Element::from(Process::new(name, &t, ctx.stores)?)
                }
                EmitKind::Measurement => {
                    let t = ctx
                        .component
                        .schema_template::<MeasurementTemplate>(template_name)
                        .ok_or_else(missing)?;
                    Element::from(Measurement::new(name, &t, ctx.stores)?)
                }
            };
            Ok(vec![element])
        });

        for name in &self.schema {
            let template = templates
                .get(name)
                .ok_or_else(|| GemdError::MissingTemplate(name.clone()))?;
            component = component.with_schema(template.clone());
        }
        debug!(rule = %self.name, schema = self.schema.len(), "Built rule");
        Ok(component)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"
[[templates]]
kind = "material"
name = "Alloy"

[[templates.attributes]]
kind = "property"
name = "Density"
bounds = { type = "real_bounds", lower_bound = 0.0, upper_bound = 30.0, default_units = "g/cm^3" }

[[rules]]
name = "alloys"
pattern = "alloy_*.txt"
id_regex = '(\d+)'
schema = ["Alloy"]
emit = "material"
template = "Alloy"
name_format = "{id} Alloy"
"#;

    #[test]
    fn parses_templates_and_rules() {
        let config = RulesConfig::parse(RULES).expect("parse");
        let templates = config.templates().expect("templates");
        let alloy = templates
            .get("Alloy")
            .and_then(EntityRef::downcast::<MaterialTemplate>)
            .expect("alloy");
        assert_eq!(alloy.read().properties.len(), 1);

        let components = config.components().expect("components");
        assert_eq!(components.len(), 1);
        assert!(components[0].applies_to("alloy_12.txt"));
        assert!(!components[0].applies_to("scan_12.txt"));
    }

    #[test]
    fn rule_needs_exactly_one_matcher() {
        let text = r#"
[[rules]]
name = "both"
suffix = ".txt"
pattern = "*.txt"
id_regex = '\d+'
emit = "ingredient"
"#;
        let config = RulesConfig::parse(text).expect("parse");
        assert!(matches!(config.components(), Err(GemdError::InvalidPattern(_))));
    }

    #[test]
    fn template_outside_schema_is_rejected() {
        let text = r#"
[[rules]]
name = "stray"
suffix = ".txt"
id_regex = '\d+'
emit = "material"
template = "Alloy"
"#;
        let config = RulesConfig::parse(text).expect("parse");
        assert!(matches!(config.components(), Err(GemdError::MissingTemplate(_))));
    }

    #[test]
    fn property_on_process_template_is_rejected() {
        let text = r#"
[[templates]]
kind = "process"
name = "Melting"

[[templates.attributes]]
kind = "property"
name = "Hardness"
bounds = { type = "integer_bounds", lower_bound = 0, upper_bound = 10 }
"#;
        let config = RulesConfig::parse(text).expect("parse");
        assert!(matches!(
            config.templates(),
            Err(GemdError::InvalidAttributeForVariant { .. })
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(RulesConfig::parse("[[rules]]\nname = \"x\"\ncolour = \"red\"\n").is_err());
    }
}
