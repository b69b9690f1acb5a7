//! Build a [`Graph`] from thin documents or live entities.

use crate::encoder::{link_entities, load_file};
use crate::graph::{Graph, GraphNode};
use crate::model::{Attribute, AttributeHolder, AttributeKind, Entity, EntityRef, ObjectTemplate, Ref};
use crate::primitives::MAX_REPORTED_CYCLES;
use crate::types::{Category, EntityType, GemdError, LinkByUid};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

// =============================================================================
// OPTIONS
// =============================================================================

/// Which representation level becomes nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphScope {
    Spec,
    #[default]
    Run,
    Template,
    All,
}

impl GraphScope {
    #[must_use]
    pub fn admits(self, entity_type: EntityType) -> bool {
        match self {
            GraphScope::All => true,
            GraphScope::Spec => entity_type.category() == Category::Spec,
            GraphScope::Run => entity_type.category() == Category::Run,
            GraphScope::Template => entity_type.category() == Category::Template,
        }
    }
}

impl FromStr for GraphScope {
    type Err = GemdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spec" => Ok(GraphScope::Spec),
            "run" => Ok(GraphScope::Run),
            "template" => Ok(GraphScope::Template),
            "all" => Ok(GraphScope::All),
            other => Err(GemdError::UnknownEntityType(format!("graph scope '{}'", other))),
        }
    }
}

/// How attribute values are rendered on nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// One property per attribute: `"<name>, <value>"`.
    #[default]
    Visualization,
    /// The whole thin document as a single `raw` property.
    Raw,
}

impl FromStr for Layout {
    type Err = GemdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visualization" => Ok(Layout::Visualization),
            "raw" => Ok(Layout::Raw),
            other => Err(GemdError::UnknownEntityType(format!("layout '{}'", other))),
        }
    }
}

/// Graph builder options.
#[derive(Debug, Clone, Serialize)]
pub struct GraphBuilderOptions {
    pub which: GraphScope,
    pub layout: Layout,
    pub add_attributes: bool,
    pub add_tags: bool,
    pub add_file_links: bool,
    /// Attribute values become nodes linked from their owner.
    pub add_separate_node: bool,
    /// Also add every edge reversed. Cycle detection is skipped.
    pub bidirectional: bool,
    pub ingredient_material_edges: bool,
}

impl Default for GraphBuilderOptions {
    fn default() -> Self {
        Self {
            which: GraphScope::Run,
            layout: Layout::Visualization,
            add_attributes: true,
            add_tags: false,
            add_file_links: false,
            add_separate_node: false,
            bidirectional: false,
            ingredient_material_edges: true,
        }
    }
}

// =============================================================================
// RESULT
// =============================================================================

/// Diagnostics reported with every build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphDiagnostics {
    pub entities: usize,
    /// Entities outside the selected scope, or without a uid.
    pub disregarded: usize,
    /// Simple cycles; empty for a well-formed unidirectional graph.
    pub cycles: Vec<Vec<String>>,
    pub isolated: usize,
}

/// A built graph and its diagnostics.
#[derive(Debug, Clone)]
pub struct BuiltGraph {
    pub graph: Graph,
    pub diagnostics: GraphDiagnostics,
}

impl BuiltGraph {
    /// Node-link JSON form.
    #[must_use]
    pub fn dump(&self) -> GraphDump {
        GraphDump::new(&self.graph, &self.diagnostics)
    }

    /// The neighbourhood of `uid` within `depth` hops. Cycles and isolated
    /// counts are narrowed to the sub-graph.
    pub fn track(&self, uid: &str, depth: usize) -> Result<BuiltGraph, GemdError> {
        let graph = self
            .graph
            .track(uid, depth)
            .ok_or_else(|| GemdError::UnknownUid(uid.to_string()))?;
        let diagnostics = GraphDiagnostics {
            cycles: self
                .diagnostics
                .cycles
                .iter()
                .filter(|cycle| cycle.iter().all(|n| graph.contains_node(n)))
                .cloned()
                .collect(),
            isolated: graph.isolated_nodes().len(),
            ..self.diagnostics.clone()
        };
        Ok(BuiltGraph { graph, diagnostics })
    }
}

/// Node-link JSON dump of a graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphDump {
    pub directed: bool,
    pub nodes: Vec<DumpNode>,
    pub links: Vec<DumpLink>,
    pub diagnostics: GraphDiagnostics,
}

#[derive(Debug, Clone, Serialize)]
pub struct DumpNode {
    pub id: String,
    pub color: &'static str,
    #[serde(flatten)]
    pub node: GraphNode,
}

#[derive(Debug, Clone, Serialize)]
pub struct DumpLink {
    pub source: String,
    pub target: String,
}

impl GraphDump {
    #[must_use]
    pub fn new(graph: &Graph, diagnostics: &GraphDiagnostics) -> Self {
        Self {
            directed: true,
            nodes: graph
                .nodes()
                .map(|node| DumpNode {
                    id: node.uid.clone(),
                    color: node.color(),
                    node: node.clone(),
                })
                .collect(),
            links: graph
                .edges()
                .map(|(from, to)| DumpLink {
                    source: from.to_string(),
                    target: to.to_string(),
                })
                .collect(),
            diagnostics: diagnostics.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, GemdError> {
        serde_json::to_string_pretty(self).map_err(|e| GemdError::SerializationError(e.to_string()))
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Direction of a structural edge relative to the entity holding the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// holder -> target
    Out,
    /// target -> holder
    In,
}

/// Builds ownership graphs.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    options: GraphBuilderOptions,
}

impl GraphBuilder {
    #[must_use]
    pub fn new(options: GraphBuilderOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &GraphBuilderOptions {
        &self.options
    }

    /// Load every JSON document under `folder` (recursively) and build.
    ///
    /// Files that fail to parse are counted as disregarded.
    pub fn build_from_folder(&self, folder: &Path) -> Result<BuiltGraph, GemdError> {
        if !folder.is_dir() {
            return Err(GemdError::IoError(format!("{}: not a directory", folder.display())));
        }
        let mut entities = Vec::new();
        let mut unreadable = 0;
        for entry in WalkDir::new(folder).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match load_file(path) {
                Ok(loaded) => entities.extend(loaded),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable document");
                    unreadable += 1;
                }
            }
        }
        link_entities(&entities);
        info!(folder = %folder.display(), entities = entities.len(), "Loaded documents");

        let mut built = self.build_from_entities(&entities)?;
        built.diagnostics.disregarded += unreadable;
        Ok(built)
    }

    /// Build from entities already in memory.
    pub fn build_from_entities(&self, entities: &[EntityRef]) -> Result<BuiltGraph, GemdError> {
        let mut graph = Graph::new();
        let mut diagnostics = GraphDiagnostics {
            entities: entities.len(),
            ..GraphDiagnostics::default()
        };

        // Every (scope, id) of every entity, so links through any scope land
        // on the node keyed by the preferred one.
        let mut aliases: HashMap<(String, String), String> = HashMap::new();
        let mut admitted = Vec::new();
        for entity in entities {
            if !self.options.which.admits(entity.entity_type()) {
                diagnostics.disregarded += 1;
                continue;
            }
            let Some(uid) = node_uid(entity) else {
                debug!(name = %entity.name(), "Entity without uid disregarded");
                diagnostics.disregarded += 1;
                continue;
            };
            for (scope, id) in entity.uids() {
                aliases.insert((scope, id), uid.clone());
            }
            graph.insert_node(self.node_for(&uid, entity)?);
            admitted.push((uid, entity));
        }

        for (uid, entity) in &admitted {
            for (link, direction) in self.structural_links(entity) {
                let target = aliases
                    .get(&(link.scope.clone(), link.id.clone()))
                    .map_or(link.id.as_str(), String::as_str);
                let (from, to) = match direction {
                    Direction::Out => (uid.as_str(), target),
                    Direction::In => (target, uid.as_str()),
                };
                graph.insert_edge(from, to);
                if self.options.bidirectional {
                    graph.insert_edge(to, from);
                }
            }
            if self.options.add_separate_node {
                self.add_attribute_nodes(&mut graph, uid, entity);
            }
        }

        if !self.options.bidirectional {
            diagnostics.cycles = graph.simple_cycles(MAX_REPORTED_CYCLES);
            if !diagnostics.cycles.is_empty() {
                warn!(cycles = diagnostics.cycles.len(), "Ownership graph has cycles");
            }
        }
        diagnostics.isolated = graph.isolated_nodes().len();
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            disregarded = diagnostics.disregarded,
            isolated = diagnostics.isolated,
            "Built graph"
        );
        Ok(BuiltGraph { graph, diagnostics })
    }

    fn node_for(&self, uid: &str, entity: &EntityRef) -> Result<GraphNode, GemdError> {
        let mut node = GraphNode::entity(uid, entity.entity_type(), entity.name());
        let raw = entity.to_value()?;

        if self.options.add_attributes && !self.options.add_separate_node {
            match self.options.layout {
                Layout::Visualization => {
                    for attribute in attributes_of(entity) {
                        node.properties
                            .insert(attribute.name.clone(), serde_json::Value::String(attribute.summary()));
                    }
                }
                Layout::Raw => {
                    node.properties.insert("raw".to_string(), raw.clone());
                }
            }
        }
        if self.options.add_tags {
            if let Some(tags) = raw.get("tags").filter(|t| t.as_array().is_some_and(|a| !a.is_empty())) {
                node.properties.insert("tags".to_string(), tags.clone());
            }
        }
        if self.options.add_file_links {
            if let Some(links) = raw
                .get("file_links")
                .filter(|l| l.as_array().is_some_and(|a| !a.is_empty()))
            {
                node.properties.insert("file_links".to_string(), links.clone());
            }
        }
        Ok(node)
    }

    fn add_attribute_nodes(&self, graph: &mut Graph, owner: &str, entity: &EntityRef) {
        if !self.options.add_attributes {
            return;
        }
        for attribute in attributes_of(entity) {
            let uid = format!("{}::{}", owner, attribute.name);
            let mut node = GraphNode::attribute(&uid, attribute.summary());
            if self.options.layout == Layout::Raw {
                if let Ok(raw) = serde_json::to_value(&attribute) {
                    node.properties.insert("raw".to_string(), raw);
                }
            }
            graph.insert_node(node);
            graph.insert_edge(owner, &uid);
        }
    }

    /// Ownership links of one entity, with the edge direction each implies.
    fn structural_links(&self, entity: &EntityRef) -> Vec<(LinkByUid, Direction)> {
        let mut out = Vec::new();
        let mut push = |reference: Option<LinkByUid>, direction: Direction| {
            if let Some(link) = reference {
                out.push((link, direction));
            }
        };
        let ingredient_material = self.options.ingredient_material_edges;
        match entity {
            EntityRef::MaterialTemplate(t) => slot_links(&*t.read(), &mut push),
            EntityRef::ProcessTemplate(t) => slot_links(&*t.read(), &mut push),
            EntityRef::MeasurementTemplate(t) => slot_links(&*t.read(), &mut push),
            EntityRef::AttributeTemplate(_) => {}
            EntityRef::MaterialSpec(s) => {
                let s = s.read();
                push(link(&s.template), Direction::Out);
                push(link(&s.process), Direction::In);
            }
            EntityRef::ProcessSpec(s) => push(link(&s.read().template), Direction::Out),
            EntityRef::MeasurementSpec(s) => push(link(&s.read().template), Direction::Out),
            EntityRef::IngredientSpec(s) => {
                let s = s.read();
                push(link(&s.process), Direction::Out);
                if ingredient_material {
                    push(link(&s.material), Direction::Out);
                }
            }
            EntityRef::MaterialRun(r) => {
                let r = r.read();
                push(link(&r.spec), Direction::Out);
                push(link(&r.process), Direction::In);
            }
            EntityRef::ProcessRun(r) => push(link(&r.read().spec), Direction::Out),
            EntityRef::MeasurementRun(r) => {
                let r = r.read();
                push(link(&r.spec), Direction::Out);
                push(link(&r.material), Direction::Out);
            }
            EntityRef::IngredientRun(r) => {
                let r = r.read();
                push(link(&r.spec), Direction::Out);
                push(link(&r.process), Direction::Out);
                if ingredient_material {
                    push(link(&r.material), Direction::Out);
                }
            }
        }
        out
    }
}

fn link<T: Entity>(reference: &Option<Ref<T>>) -> Option<LinkByUid> {
    reference.as_ref().and_then(Ref::link)
}

fn slot_links<T: ObjectTemplate>(
    template: &T,
    push: &mut impl FnMut(Option<LinkByUid>, Direction),
) {
    for (_, slot) in template.all_slots() {
        push(slot.template.link(), Direction::Out);
    }
}

/// The uid a node is keyed by: the id of the entity's preferred link.
fn node_uid(entity: &EntityRef) -> Option<String> {
    entity.link().map(|link| link.id)
}

/// Attribute values carried by a spec or run, material property conditions
/// included.
fn attributes_of(entity: &EntityRef) -> Vec<Attribute> {
    match entity {
        EntityRef::MaterialSpec(s) => s
            .read()
            .properties
            .iter()
            .flat_map(|p| std::iter::once(p.property.clone()).chain(p.conditions.iter().cloned()))
            .collect(),
        EntityRef::ProcessSpec(_)
        | EntityRef::MeasurementSpec(_)
        | EntityRef::ProcessRun(_)
        | EntityRef::MeasurementRun(_) => {
            let mut out = Vec::new();
            for kind in AttributeKind::ALL {
                out.extend(collection(entity, kind));
            }
            out
        }
        _ => Vec::new(),
    }
}

fn collection(entity: &EntityRef, kind: AttributeKind) -> Vec<Attribute> {
    match entity {
        EntityRef::ProcessSpec(s) => s.read().attributes(kind),
        EntityRef::MeasurementSpec(s) => s.read().attributes(kind),
        EntityRef::ProcessRun(r) => r.read().attributes(kind),
        EntityRef::MeasurementRun(r) => r.read().attributes(kind),
        _ => None,
    }
    .unwrap_or_default()
}


// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{
        GemdElement, Ingredient, Material, MaterialsSequence, Measurement, Process, TemplatedElement,
    };
    use crate::encoder::thin_documents;
    use crate::model::{
        AttributeTemplate, Bounds, Handle, MaterialTemplate, MeasurementTemplate, ProcessTemplate,
        Value, collect_reachable,
    };
    use crate::store::StoresConfig;
    use tempfile::TempDir;

    struct Fixture {
        sequence: MaterialsSequence,
        entities: Vec<EntityRef>,
    }

    fn fixture() -> Fixture {
        let stores = StoresConfig::new();
        let temperature = Handle::new(AttributeTemplate::condition(
            "Temperature",
            Bounds::real(0.0, 3000.0, "K"),
        ));
        let pt = Handle::new(ProcessTemplate::new("Annealing").with_condition(&temperature));
        let mt = Handle::new(MaterialTemplate::new("Alloy"));
        let qt = Handle::new(MeasurementTemplate::new("Hardness Test"));

        let process = Process::builder("Anneal")
            .template(pt)
            .attribute(
                Attribute::condition("Temperature").with_value(Value::nominal_real(900.0, "K")),
            )
            .build(&stores)
            .expect("process");
        let sequence = MaterialsSequence::builder("Annealed")
            .ingredient(Ingredient::new("Raw Alloy", &stores))
            .process(process)
            .material(Material::new("Annealed Alloy", &mt, &stores).expect("material"))
            .measurement(Measurement::new("Hardness", &qt, &stores).expect("measurement"))
            .build()
            .expect("sequence");
        sequence.link_within();

        let roots: Vec<EntityRef> = sequence.elements().iter().flat_map(|e| e.entities()).collect();
        thin_documents(&roots).expect("uids");
        let entities = collect_reachable(&roots);
        Fixture { sequence, entities }
    }

    fn run_uid(entity: &EntityRef) -> String {
        node_uid(entity).expect("uid")
    }

    #[test]
    fn run_scope_follows_ownership() {
        let fx = fixture();
        let built = GraphBuilder::default()
            .build_from_entities(&fx.entities)
            .expect("build");

        let ingredient = run_uid(&fx.sequence.ingredient("Raw Alloy").expect("i").run_entity());
        let process = run_uid(&fx.sequence.process().expect("p").run_entity());
        let material = run_uid(&fx.sequence.material().expect("m").run_entity());
        let measurement = run_uid(&fx.sequence.measurement("Hardness").expect("q").run_entity());

        assert_eq!(built.graph.node_count(), 4);
        assert!(built.graph.contains_edge(&ingredient, &process));
        assert!(built.graph.contains_edge(&process, &material));
        assert!(built.graph.contains_edge(&measurement, &material));
        assert_eq!(built.graph.edge_count(), 3);
        assert!(built.diagnostics.cycles.is_empty());
        assert_eq!(built.diagnostics.isolated, 0);
        assert_eq!(built.diagnostics.disregarded, fx.entities.len() - 4);

        let node = built.graph.node(&process).expect("process node");
        assert_eq!(node.color(), "red");
        let temperature = node.properties.get("Temperature").and_then(|v| v.as_str());
        assert!(temperature.is_some_and(|t| t.starts_with("Temperature, ")));
    }

    #[test]
    fn all_scope_adds_spec_and_template_edges() {
        let fx = fixture();
        let built = GraphBuilder::new(GraphBuilderOptions {
            which: GraphScope::All,
            ..GraphBuilderOptions::default()
        })
        .build_from_entities(&fx.entities)
        .expect("build");

        let process = fx.sequence.process().expect("p");
        let run = run_uid(&process.run_entity());
        let spec = run_uid(&process.spec_entity());
        let template = run_uid(&process.template_entity());
        assert!(built.graph.contains_edge(&run, &spec));
        assert!(built.graph.contains_edge(&spec, &template));
        assert_eq!(built.graph.neighbors(&template).len(), 1);
        assert_eq!(built.diagnostics.disregarded, 0);
        assert!(built.diagnostics.cycles.is_empty());
    }

    #[test]
    fn separate_attribute_nodes_hang_off_their_owner() {
        let fx = fixture();
        let built = GraphBuilder::new(GraphBuilderOptions {
            add_separate_node: true,
            ..GraphBuilderOptions::default()
        })
        .build_from_entities(&fx.entities)
        .expect("build");

        let process = run_uid(&fx.sequence.process().expect("p").run_entity());
        let attribute = format!("{process}::Temperature");
        let node = built.graph.node(&attribute).expect("attribute node");
        assert_eq!(node.kind, crate::types::NodeKind::Attribute);
        assert!(built.graph.contains_edge(&process, &attribute));
        assert!(
            !built
                .graph
                .node(&process)
                .expect("process")
                .properties
                .contains_key("Temperature")
        );
    }

    #[test]
    fn bidirectional_graphs_skip_cycle_detection() {
        let fx = fixture();
        let built = GraphBuilder::new(GraphBuilderOptions {
            bidirectional: true,
            ..GraphBuilderOptions::default()
        })
        .build_from_entities(&fx.entities)
        .expect("build");

        let process = run_uid(&fx.sequence.process().expect("p").run_entity());
        let material = run_uid(&fx.sequence.material().expect("m").run_entity());
        assert!(built.graph.contains_edge(&material, &process));
        assert!(built.diagnostics.cycles.is_empty());
        assert_eq!(built.graph.edge_count(), 6);
    }

    #[test]
    fn ingredient_material_edges_can_be_disabled() {
        let stores = StoresConfig::new();
        let mt = Handle::new(MaterialTemplate::new("Powder"));
        let powder = Material::new("Powder", &mt, &stores).expect("material");
        let ingredient = Ingredient::new("Powder Ingredient", &stores);
        ingredient.link_material(&powder);
        let roots = [ingredient.run_entity(), powder.run_entity()];
        thin_documents(&roots).expect("uids");

        let with = GraphBuilder::default().build_from_entities(&roots).expect("build");
        let without = GraphBuilder::new(GraphBuilderOptions {
            ingredient_material_edges: false,
            ..GraphBuilderOptions::default()
        })
        .build_from_entities(&roots)
        .expect("build");

        assert_eq!(with.graph.edge_count(), 1);
        assert_eq!(without.graph.edge_count(), 0);
        assert_eq!(without.diagnostics.isolated, 2);
    }

    #[test]
    fn folder_build_matches_in_memory_build() {
        let fx = fixture();
        let dir = TempDir::new().expect("tempdir");
        for (i, (_, value)) in thin_documents(&fx.entities).expect("docs").iter().enumerate() {
            let text = serde_json::to_string_pretty(value).expect("json");
            std::fs::write(dir.path().join(format!("doc{i}.json")), text).expect("write");
        }
        std::fs::write(dir.path().join("broken.json"), "{ not json").expect("write");
        std::fs::write(dir.path().join("README.md"), "ignored").expect("write");

        let options = GraphBuilderOptions {
            which: GraphScope::All,
            ..GraphBuilderOptions::default()
        };
        let memory = GraphBuilder::new(options.clone())
            .build_from_entities(&fx.entities)
            .expect("memory");
        let folder = GraphBuilder::new(options)
            .build_from_folder(dir.path())
            .expect("folder");

        assert_eq!(folder.graph.node_count(), memory.graph.node_count());
        assert_eq!(folder.graph.edge_count(), memory.graph.edge_count());
        assert_eq!(folder.diagnostics.disregarded, 1);
    }

    #[test]
    fn missing_folder_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let result = GraphBuilder::default().build_from_folder(&dir.path().join("nope"));
        assert!(matches!(result, Err(GemdError::IoError(_))));
    }

    #[test]
    fn dump_is_node_link_json() {
        let fx = fixture();
        let built = GraphBuilder::default()
            .build_from_entities(&fx.entities)
            .expect("build");
        let json: serde_json::Value =
            serde_json::from_str(&built.dump().to_json().expect("dump")).expect("parse");

        assert_eq!(json["directed"], true);
        assert_eq!(json["nodes"].as_array().map(Vec::len), Some(4));
        assert_eq!(json["links"].as_array().map(Vec::len), Some(3));
        assert!(json["nodes"][0]["color"].is_string());
        assert!(json["nodes"][0]["id"].is_string());
    }

    #[test]
    fn tracking_narrows_to_the_neighbourhood() {
        let fx = fixture();
        let built = GraphBuilder::default()
            .build_from_entities(&fx.entities)
            .expect("build");
        let ingredient = run_uid(&fx.sequence.ingredient("Raw Alloy").expect("i").run_entity());

        let near = built.track(&ingredient, 1).expect("track");
        assert_eq!(near.graph.node_count(), 2);
        assert_eq!(near.diagnostics.isolated, 0);
        assert_eq!(built.track(&ingredient, 3).expect("track").graph.node_count(), 4);
        assert!(matches!(built.track("nowhere", 1), Err(GemdError::UnknownUid(_))));
    }

    #[test]
    fn scope_and_layout_parse() {
        assert_eq!("spec".parse::<GraphScope>().expect("scope"), GraphScope::Spec);
        assert_eq!("raw".parse::<Layout>().expect("layout"), Layout::Raw);
        assert!("sideways".parse::<Layout>().is_err());
    }
}
