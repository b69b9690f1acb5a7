//! # CLI Command Implementations

use crate::rules::RulesConfig;
use gemdflow_core::GemdError;
use gemdflow_core::automation::{FolderWatcher, RuleEngine, WatchOptions};
use gemdflow_core::graph::{BuiltGraph, GraphBuilder, GraphBuilderOptions};
use gemdflow_core::primitives::{
    SPEC_FOLDERS, SPEC_REGISTRY_FILE, TEMPLATE_FOLDERS, TEMPLATE_REGISTRY_FILE,
};
use gemdflow_core::store::{SpecStore, StoresConfig, TemplateStore};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::GraphArgs;

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create the store layout under `root`.
pub fn cmd_init(root: &Path, force: bool) -> Result<(), GemdError> {
    if root.join(TEMPLATE_REGISTRY_FILE).exists() && !force {
        return Err(GemdError::IoError(format!(
            "Store already exists at {}. Use --force to recreate.",
            root.display()
        )));
    }
    if force {
        clear_store(root)?;
    }

    TemplateStore::initialize_store(root)?;
    SpecStore::initialize_store(root)?;
    info!(store = %root.display(), "Initialized store");
    println!("Initialized store at {}", root.display());
    Ok(())
}

fn clear_store(root: &Path) -> Result<(), GemdError> {
    for file in [TEMPLATE_REGISTRY_FILE, SPEC_REGISTRY_FILE] {
        let path = root.join(file);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| GemdError::IoError(format!("{}: {}", path.display(), e)))?;
        }
    }
    for folder in TEMPLATE_FOLDERS.iter().chain(SPEC_FOLDERS.iter()) {
        let path = root.join(folder);
        if path.is_dir() {
            std::fs::remove_dir_all(&path)
                .map_err(|e| GemdError::IoError(format!("{}: {}", path.display(), e)))?;
        }
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Registry rows and per-variant document counts.
pub fn cmd_status(root: &Path, json_mode: bool) -> Result<(), GemdError> {
    if !root.join(TEMPLATE_REGISTRY_FILE).exists() {
        return Err(GemdError::IoError(format!(
            "No store at {}. Run `gemdflow init` first.",
            root.display()
        )));
    }
    let templates = TemplateStore::open(root)?;
    let specs = SpecStore::open(root, gemdflow_core::primitives::AUTO_SCOPE)?;

    let mut folders = serde_json::Map::new();
    for folder in TEMPLATE_FOLDERS.iter().chain(SPEC_FOLDERS.iter()) {
        folders.insert((*folder).to_string(), count_documents(&root.join(folder))?.into());
    }

    if json_mode {
        let output = serde_json::json!({
            "store": root.to_string_lossy(),
            "template_registry_rows": templates.registry_len(),
            "spec_registry_rows": specs.registry_len(),
            "folders": folders,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("gemdflow Store Status");
    println!("=====================");
    println!("Store: {}", root.display());
    println!();
    println!("Template registry rows: {}", templates.registry_len());
    println!("Spec registry rows:     {}", specs.registry_len());
    println!();
    for (folder, count) in &folders {
        println!("  {:<24} {}", folder, count);
    }

    Ok(())
}

fn count_documents(folder: &Path) -> Result<usize, GemdError> {
    if !folder.is_dir() {
        return Ok(0);
    }
    let entries = std::fs::read_dir(folder)
        .map_err(|e| GemdError::IoError(format!("{}: {}", folder.display(), e)))?;
    Ok(entries
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .count())
}

// =============================================================================
// WATCH COMMAND
// =============================================================================

/// Options of the `watch` command.
#[derive(Debug, Clone)]
pub struct WatchCommand {
    pub config: PathBuf,
    pub files_folder: PathBuf,
    pub gemd_folder: PathBuf,
    pub instantiate_build: bool,
    pub once: bool,
    pub intern_specs: bool,
    pub verbose: bool,
}

/// Build the rule engine from a rules file, over the local stores.
pub fn prepare_engine(
    store: &Path,
    store_id: &str,
    options: &WatchCommand,
) -> Result<RuleEngine, GemdError> {
    let config = RulesConfig::load(&options.config)?;
    let stores = StoresConfig::open_local(store, store_id)?;
    let mut engine = RuleEngine::new(&options.files_folder, &options.gemd_folder, stores)?
        .with_spec_interning(options.intern_specs);
    for component in config.components()? {
        engine.register(component)?;
    }
    Ok(engine)
}

/// Run the watcher until Ctrl+C, or only the replay with `once`.
pub async fn cmd_watch(store: &Path, store_id: &str, options: &WatchCommand) -> Result<(), GemdError> {
    let mut engine = prepare_engine(store, store_id, options)?;
    println!(
        "Loaded {} rule(s); files: {}, gemd: {}",
        engine.components().len(),
        engine.files_folder().display(),
        engine.gemd_folder().display()
    );

    if options.once {
        let written = engine.replay()?;
        report_written(&written, options.verbose);
        return Ok(());
    }

    let mut watcher = FolderWatcher::new(
        engine,
        WatchOptions {
            instantiate_build: options.instantiate_build,
            ..WatchOptions::default()
        },
    );
    let written = watcher.start()?;
    report_written(&written, options.verbose);
    println!("Watching. Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| GemdError::WatchError(format!("signal handler: {}", e)))?;

    let failures = watcher.stop()?;
    for failure in &failures {
        warn!(error = %failure, "Rule failure while watching");
    }
    println!("Stopped with {} failure(s)", failures.len());
    Ok(())
}

fn report_written(written: &[PathBuf], verbose: bool) {
    println!("Wrote {} document(s)", written.len());
    if verbose {
        for path in written {
            println!("  {}", path.display());
        }
    }
}

// =============================================================================
// GRAPH COMMAND
// =============================================================================

/// Build the graph, print diagnostics, and optionally write the dump.
pub fn cmd_graph(args: &GraphArgs, json_mode: bool) -> Result<BuiltGraph, GemdError> {
    let builder = GraphBuilder::new(GraphBuilderOptions {
        which: args.which,
        layout: args.layout,
        add_attributes: args.attributes,
        add_tags: args.tags,
        add_file_links: args.file_links,
        add_separate_node: args.separate_node,
        bidirectional: args.bidirectional,
        ingredient_material_edges: !args.no_ingredient_material,
    });
    let mut built = builder.build_from_folder(&args.gemd_folder)?;
    if let Some(uid) = &args.uid {
        built = built.track(uid, args.depth)?;
    }

    let dump = built.dump();
    if let Some(output) = &args.output {
        std::fs::write(output, dump.to_json()?)
            .map_err(|e| GemdError::IoError(format!("{}: {}", output.display(), e)))?;
        info!(file = %output.display(), "Wrote graph dump");
    }

    let diagnostics = &built.diagnostics;
    if json_mode {
        let output = serde_json::json!({
            "nodes": built.graph.node_count(),
            "edges": built.graph.edge_count(),
            "diagnostics": diagnostics,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!("Nodes:       {}", built.graph.node_count());
        println!("Edges:       {}", built.graph.edge_count());
        println!("Entities:    {}", diagnostics.entities);
        println!("Disregarded: {}", diagnostics.disregarded);
        println!("Isolated:    {}", diagnostics.isolated);
        println!("Cycles:      {}", diagnostics.cycles.len());
        for cycle in &diagnostics.cycles {
            println!("  {}", cycle.join(" -> "));
        }
    }

    Ok(built)
}
