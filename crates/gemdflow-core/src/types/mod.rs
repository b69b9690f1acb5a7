//! # Core Type Definitions
//!
//! Small value types shared by every module:
//! - Entity type tags (`EntityType`, `Category`, `NodeKind`)
//! - Link stubs (`LinkByUid`)
//! - File links, origins and run sources
//! - Error types (`GemdError`)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// ENTITY TYPE TAGS
// =============================================================================

/// The `type` tag of every serialized entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    PropertyTemplate,
    ConditionTemplate,
    ParameterTemplate,
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
}

/// The three representation levels of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Template,
    Spec,
    Run,
}

/// What a graph node stands for, independent of its representation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Process,
    Ingredient,
    Material,
    Measurement,
    Attribute,
}

impl EntityType {
    /// Every entity type, templates first.
    pub const ALL: [EntityType; 14] = [
        EntityType::PropertyTemplate,
        EntityType::ConditionTemplate,
        EntityType::ParameterTemplate,
        EntityType::MaterialTemplate,
        EntityType::ProcessTemplate,
        EntityType::MeasurementTemplate,
        EntityType::MaterialSpec,
        EntityType::ProcessSpec,
        EntityType::MeasurementSpec,
        EntityType::IngredientSpec,
        EntityType::MaterialRun,
        EntityType::ProcessRun,
        EntityType::MeasurementRun,
        EntityType::IngredientRun,
    ];

    /// The serialized tag, e.g. `material_template`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityType::PropertyTemplate => "property_template",
            EntityType::ConditionTemplate => "condition_template",
            EntityType::ParameterTemplate => "parameter_template",
            EntityType::MaterialTemplate => "material_template",
            EntityType::ProcessTemplate => "process_template",
            EntityType::MeasurementTemplate => "measurement_template",
            EntityType::MaterialSpec => "material_spec",
            EntityType::ProcessSpec => "process_spec",
            EntityType::MeasurementSpec => "measurement_spec",
            EntityType::IngredientSpec => "ingredient_spec",
            EntityType::MaterialRun => "material_run",
            EntityType::ProcessRun => "process_run",
            EntityType::MeasurementRun => "measurement_run",
            EntityType::IngredientRun => "ingredient_run",
        }
    }

    /// Template, spec or run.
    #[must_use]
    pub const fn category(self) -> Category {
        match self {
            EntityType::PropertyTemplate
            | EntityType::ConditionTemplate
            | EntityType::ParameterTemplate
            | EntityType::MaterialTemplate
            | EntityType::ProcessTemplate
            | EntityType::MeasurementTemplate => Category::Template,
            EntityType::MaterialSpec
            | EntityType::ProcessSpec
            | EntityType::MeasurementSpec
            | EntityType::IngredientSpec => Category::Spec,
            EntityType::MaterialRun
            | EntityType::ProcessRun
            | EntityType::MeasurementRun
            | EntityType::IngredientRun => Category::Run,
        }
    }

    /// The node kind used for graph coloring.
    #[must_use]
    pub const fn node_kind(self) -> NodeKind {
        match self {
            EntityType::PropertyTemplate
            | EntityType::ConditionTemplate
            | EntityType::ParameterTemplate => NodeKind::Attribute,
            EntityType::MaterialTemplate | EntityType::MaterialSpec | EntityType::MaterialRun => {
                NodeKind::Material
            }
            EntityType::ProcessTemplate | EntityType::ProcessSpec | EntityType::ProcessRun => {
                NodeKind::Process
            }
            EntityType::MeasurementTemplate
            | EntityType::MeasurementSpec
            | EntityType::MeasurementRun => NodeKind::Measurement,
            EntityType::IngredientSpec | EntityType::IngredientRun => NodeKind::Ingredient,
        }
    }

    /// The store subfolder holding entities of this type, if the stores
    /// intern it. Runs are never interned.
    #[must_use]
    pub const fn store_folder(self) -> Option<&'static str> {
        match self {
            EntityType::PropertyTemplate => Some("property_templates"),
            EntityType::ConditionTemplate => Some("condition_templates"),
            EntityType::ParameterTemplate => Some("parameter_templates"),
            EntityType::MaterialTemplate => Some("material_templates"),
            EntityType::MeasurementTemplate => Some("measurement_templates"),
            EntityType::ProcessTemplate => Some("process_templates"),
            EntityType::MaterialSpec => Some("material_specs"),
            EntityType::ProcessSpec => Some("process_specs"),
            EntityType::IngredientSpec => Some("ingredient_specs"),
            EntityType::MeasurementSpec => Some("measurement_specs"),
            EntityType::MaterialRun
            | EntityType::ProcessRun
            | EntityType::MeasurementRun
            | EntityType::IngredientRun => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = GemdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| GemdError::UnknownEntityType(s.to_string()))
    }
}

impl NodeKind {
    /// Display color of nodes of this kind.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            NodeKind::Process => "red",
            NodeKind::Ingredient => "blue",
            NodeKind::Material => "green",
            NodeKind::Measurement => "purple",
            NodeKind::Attribute => "black",
        }
    }
}

// =============================================================================
// LINK STUBS
// =============================================================================

/// A reference to an entity by one of its uids.
///
/// Thin documents replace every nested entity with one of these.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkByUid {
    /// Type of the referenced entity.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// The uid value.
    pub id: String,
    /// The uid scope.
    pub scope: String,
}

impl LinkByUid {
    /// Create a new link.
    #[must_use]
    pub fn new(entity_type: EntityType, scope: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
            scope: scope.into(),
        }
    }

    /// Check whether a JSON value has the exact shape of a link stub.
    ///
    /// A link has exactly the keys `type`, `id` and `scope`, all strings.
    #[must_use]
    pub fn is_link_value(value: &serde_json::Value) -> bool {
        let Some(map) = value.as_object() else {
            return false;
        };
        map.len() == 3
            && ["type", "id", "scope"]
                .iter()
                .all(|key| map.get(*key).is_some_and(serde_json::Value::is_string))
    }
}

// =============================================================================
// FILE LINKS, ORIGINS, SOURCES
// =============================================================================

/// A pointer to an external file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileLink {
    pub filename: String,
    pub url: String,
}

impl FileLink {
    /// Create a new file link.
    #[must_use]
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
        }
    }

    /// The identity string used to deduplicate file links.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{},{}", self.filename, self.url)
    }
}

/// Provenance of an attribute value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Specified,
    Measured,
    Computed,
    Predicted,
    #[default]
    Unknown,
}

/// Who performed a run, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub performer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performed_date: Option<NaiveDate>,
}

impl Source {
    /// Create a source without a date.
    #[must_use]
    pub fn new(performer: impl Into<String>) -> Self {
        Self {
            performer: performer.into(),
            performed_date: None,
        }
    }

    /// Attach an ISO-8601 date (`YYYY-MM-DD`).
    pub fn with_date(mut self, date: &str) -> Result<Self, GemdError> {
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| GemdError::DeserializationError(format!("date '{}': {}", date, e)))?;
        self.performed_date = Some(parsed);
        Ok(self)
    }
}

/// Which half of an element an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Which {
    Spec,
    Run,
    #[default]
    Both,
}

impl Which {
    #[must_use]
    pub const fn includes_spec(self) -> bool {
        matches!(self, Which::Spec | Which::Both)
    }

    #[must_use]
    pub const fn includes_run(self) -> bool {
        matches!(self, Which::Run | Which::Both)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in gemdflow.
///
/// - No silent failures
/// - Use `Result<T, GemdError>` for fallible operations
/// - The store write path does not roll back partial writes
#[derive(Debug, Error)]
pub enum GemdError {
    /// No template could be resolved for an element.
    #[error("No template resolvable for element '{0}'")]
    MissingTemplate(String),

    /// A template was supplied with a reserved uid scope already set.
    #[error("Template '{name}' already carries reserved uid scope '{scope}'")]
    ReservedScopeUid { name: String, scope: String },

    /// The attribute type is not allowed on this element variant.
    #[error("A {attribute} cannot be attached to a {variant}")]
    InvalidAttributeForVariant { attribute: String, variant: String },

    /// Attempted to remove a required attribute.
    #[error("Attribute '{0}' is required and cannot be removed")]
    RemovingRequired(String),

    /// Two elements share a name within one collection.
    #[error("Duplicate name '{name}' in {collection}")]
    DuplicateName { collection: String, name: String },

    /// An element was inserted into the wrong slot.
    #[error("Expected a {expected} element, found a {found}")]
    WrongElementType { expected: String, found: String },

    /// Neither spec nor run was supplied.
    #[error("Neither a spec nor a run was supplied")]
    NoSpecOrRun,

    /// Two stores registered under the same id.
    #[error("Store id '{0}' is already registered")]
    DuplicateStoreId(String),

    /// The requested store id is not registered.
    #[error("Unknown store id '{0}'")]
    UnknownStore(String),

    /// A spec lacks the uid scope its store relies on.
    #[error("Spec '{name}' has no uid under scope '{scope}'")]
    MissingScopeUid { name: String, scope: String },

    /// An attribute value lies outside its template bounds.
    #[error("Value {value} of attribute '{attribute}' is outside bounds {bounds}")]
    BoundsViolation {
        attribute: String,
        value: String,
        bounds: String,
    },

    /// A user rule action failed.
    #[error("Rule '{component}' failed on '{file}': {reason}")]
    RuleApplicationFailed {
        component: String,
        file: String,
        reason: String,
    },

    /// A tag is malformed (empty segment or empty path).
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// A file-id regex could not be compiled.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// A document carries an unrecognized `type` tag.
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The filesystem watcher failed.
    #[error("Watch error: {0}")]
    WatchError(String),

    /// No graph node carries the requested uid.
    #[error("No node with uid '{0}'")]
    UnknownUid(String),
}

impl From<std::io::Error> for GemdError {
    fn from(e: std::io::Error) -> Self {
        GemdError::IoError(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
