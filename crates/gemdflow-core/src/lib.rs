//! # gemdflow-core
//!
//! Provenance graphs for materials data: templates, specs and runs for
//! materials, processes, ingredients and measurements.
//!
//! ## Layers
//!
//! - `model`: the entity records and their identity (`Handle`, `Ref`)
//! - `encoder`: thin (link-by-uid) and full JSON
//! - `store`: on-disk template and spec stores, and the `StoresConfig`
//!   every element carries
//! - `element`: paired spec/run wrappers and `MaterialsSequence`
//! - `automation`: the rule engine and folder watcher
//! - `graph`: ownership graphs built from documents or entities
//!
//! ## Constraints
//!
//! - No async. The folder watcher owns one observer thread and handlers
//!   run serially on it.
//! - Stores assume a single writing process.
//! - Every serialized mapping is ordered.

// =============================================================================
// MODULES
// =============================================================================

pub mod automation;
pub mod element;
pub mod encoder;
pub mod graph;
pub mod model;
pub mod primitives;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Types
// =============================================================================

pub use types::{
    Category, EntityType, FileLink, GemdError, LinkByUid, NodeKind, Origin, Source, Which,
};

// =============================================================================
// RE-EXPORTS: Model
// =============================================================================

pub use model::{
    Attribute, AttributeKind, AttributeTemplate, Bounds, EntityRef, Handle, MaterialTemplate,
    MeasurementTemplate, ProcessTemplate, PropertyAndConditions, Ref, SampleType, Value,
};

// =============================================================================
// RE-EXPORTS: Stores, elements, automation, graphs
// =============================================================================

pub use automation::{
    ActionContext, AutomatableComponent, AutomatableComponentTree, FileIdPattern, FolderWatcher,
    RuleEngine, WatchOptions, glob_rule, suffix_rule,
};
pub use element::{
    Element, ElementBuilder, ElementVariant, GemdElement, Ingredient, Material, MaterialsSequence,
    Measurement, Process, TemplatedElement,
};
pub use graph::{
    BuiltGraph, Graph, GraphBuilder, GraphBuilderOptions, GraphDiagnostics, GraphDump, GraphNode,
    GraphScope, Layout,
};
pub use store::{Provenance, SpecStore, StoresConfig, TemplateStore};
