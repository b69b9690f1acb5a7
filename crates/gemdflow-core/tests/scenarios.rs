//! # End-to-End Scenarios
//!
//! Stores, element wrappers, sequences, the rule engine and the graph
//! builder exercised together through the public API.

use gemdflow_core::automation::{
    AutomatableComponent, FileIdPattern, FolderWatcher, RuleEngine, WatchOptions, glob_rule,
    suffix_rule,
};
use gemdflow_core::element::{
    Element, GemdElement, Ingredient, Material, MaterialsSequence, Measurement, Process,
    TemplatedElement,
};
use gemdflow_core::encoder::{link_entities, load_file, raw_loads, thin_documents};
use gemdflow_core::graph::{GraphBuilder, GraphBuilderOptions, GraphScope};
use gemdflow_core::model::{
    Attribute, AttributeKind, AttributeTemplate, Bounds, EntityRef, Handle, MaterialSpec,
    MaterialTemplate, MeasurementTemplate, ProcessTemplate, Value, collect_reachable,
};
use gemdflow_core::primitives::AUTO_SCOPE;
use gemdflow_core::store::{Provenance, StoresConfig, TemplateStore};
use gemdflow_core::types::{EntityType, GemdError, Which};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

// =============================================================================
// HELPERS
// =============================================================================

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect()
}

fn material_rule(name: &str, glob: &str, template: &str) -> AutomatableComponent {
    let template_name = template.to_string();
    AutomatableComponent::new(
        name,
        glob_rule(glob).expect("glob"),
        FileIdPattern::new(r"\d+", false).expect("pattern"),
        move |ctx| {
            let template = ctx
                .component
                .schema_template::<MaterialTemplate>(&template_name)
                .ok_or_else(|| GemdError::MissingTemplate(template_name.clone()))?;
            let material = Material::new(
                format!("{} {}", ctx.file_id, template_name),
                &template,
                ctx.stores,
            )?;
            Ok(vec![Element::from(material)])
        },
    )
    .with_schema(Handle::new(MaterialTemplate::new(template)))
}

fn wait_for(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    path.exists()
}

fn full_sequence(stores: &StoresConfig, prefix: &str, ingredient: &str) -> MaterialsSequence {
    let pt = Handle::new(ProcessTemplate::new("Polishing"));
    let mt = Handle::new(MaterialTemplate::new("Alloy"));
    let qt = Handle::new(MeasurementTemplate::new("Hardness Test"));
    MaterialsSequence::builder(prefix)
        .ingredient(Ingredient::new(ingredient, stores))
        .process(Process::new(format!("{prefix} Polish"), &pt, stores).expect("process"))
        .material(Material::new(format!("{prefix} Alloy"), &mt, stores).expect("material"))
        .measurement(Measurement::new(format!("{prefix} Hardness"), &qt, stores).expect("measurement"))
        .build()
        .expect("sequence")
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn scenario_a_registering_a_template_twice() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = TemplateStore::open(dir.path()).expect("open");

    let first = EntityRef::from(Handle::new(MaterialTemplate::new("Alloy")));
    let second = EntityRef::from(Handle::new(MaterialTemplate::new("Alloy")));
    let kept = store
        .register_new_template(&first, Provenance::memory())
        .expect("first");
    let again = store
        .register_new_template(&second, Provenance::memory())
        .expect("second");

    assert!(again.template.ptr_eq(&kept.template));
    assert_eq!(store.len(), 1);
    assert_eq!(store.warnings().len(), 1);

    let registry = std::fs::read_to_string(dir.path().join("template_registry.csv")).expect("registry");
    let rows: Vec<&str> = registry.lines().skip(1).collect();
    assert_eq!(rows, vec!["0,Alloy,material_template"]);
    assert!(dir.path().join("material_templates").join("Alloy_pid_0.json").is_file());
    let written = std::fs::read_dir(dir.path().join("material_templates"))
        .expect("folder")
        .count();
    assert_eq!(written, 1);
}

#[test]
fn scenario_b_wrappers_share_the_interned_template() {
    let dir = TempDir::new().expect("tempdir");
    let stores = StoresConfig::open_local(dir.path(), "local").expect("stores");

    let t1 = Handle::new(ProcessTemplate::new("Arc Melting"));
    let t2 = Handle::new(ProcessTemplate::new("Arc Melting"));
    let run1 = Process::new("run1", &t1, &stores).expect("run1");
    let auto_before = run1.template().read().uids.get(AUTO_SCOPE).cloned();
    let run2 = Process::new("run2", &t2, &stores).expect("run2");
    let auto_after = run1.template().read().uids.get(AUTO_SCOPE).cloned();

    assert!(Handle::ptr_eq(run1.template(), run2.template()));
    assert!(auto_before.is_some());
    assert_eq!(auto_before, auto_after);
}

#[test]
fn scenario_c_link_within() {
    let stores = StoresConfig::new();
    let seq = full_sequence(&stores, "C", "I");
    seq.link_within();

    let process = seq.process().expect("process");
    let material = seq.material().expect("material");
    let ingredient_process = seq
        .ingredient("I")
        .expect("ingredient")
        .run()
        .read()
        .process
        .as_ref()
        .and_then(|r| r.object().cloned())
        .expect("ingredient process");
    assert!(Handle::ptr_eq(&ingredient_process, process.run()));
    assert!(Handle::ptr_eq(&process.output_material().expect("output"), material.run()));
    let measured = seq
        .measurement("C Hardness")
        .expect("measurement")
        .material_run()
        .expect("measured material");
    assert!(Handle::ptr_eq(&measured, material.run()));
}

#[test]
fn scenario_d_link_prior() {
    let stores = StoresConfig::new();
    let a = full_sequence(&stores, "A", "Raw Alloy Ingredient");
    let b = full_sequence(&stores, "B", "Polished Alloy Ingredient");

    assert!(b.link_prior(&a, "Polished Alloy Ingredient"));
    let fed = b
        .ingredient("Polished Alloy Ingredient")
        .expect("ingredient")
        .material_run()
        .expect("material");
    assert!(Handle::ptr_eq(&fed, a.material().expect("material").run()));
    assert!(!b.link_prior(&a, "No Such Ingredient"));
}

#[test]
fn scenario_e_rule_fires_on_new_file() {
    let files = TempDir::new().expect("files");
    let gemd = TempDir::new().expect("gemd");
    let mut engine = RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
    engine.register(material_rule("alloy", "*.txt", "Alloy")).expect("register");

    let input = engine.files_folder().join("sample42.txt");
    std::fs::write(&input, "").expect("write");
    let written = engine.handle_files_path(&input).expect("handle");
    assert!(file_names(&written).contains(&"42 Alloy_material_run.json".to_string()));

    let run_doc: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(engine.gemd_folder().join("42 Alloy_material_run.json")).expect("read"),
    )
    .expect("json");
    assert_eq!(run_doc["name"], "42 Alloy");

    let mut entities = Vec::new();
    for path in &written {
        entities.extend(load_file(path).expect("load"));
    }
    link_entities(&entities);
    let spec = entities
        .iter()
        .find_map(EntityRef::downcast::<MaterialSpec>)
        .expect("material spec");
    let template = spec
        .read()
        .template
        .as_ref()
        .and_then(|r| r.object().cloned())
        .expect("template resolves");
    assert_eq!(template.read().name, "Alloy");
}

#[test]
fn scenario_f_cold_start_replay_runs_in_walk_order() {
    let files = TempDir::new().expect("files");
    let gemd = TempDir::new().expect("gemd");
    std::fs::write(files.path().join("a1.txt"), "").expect("write");
    std::fs::write(files.path().join("b2.csv"), "").expect("write");
    std::fs::write(files.path().join("c3.dat"), "").expect("write");

    let mut engine = RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
    engine.register(material_rule("dat", "*.dat", "Powder")).expect("register");
    engine.register(material_rule("txt", "*.txt", "Alloy")).expect("register");
    engine.register(material_rule("csv", "*.csv", "Ingot")).expect("register");

    let mut watcher = FolderWatcher::new(
        engine,
        WatchOptions {
            instantiate_build: true,
            ..WatchOptions::default()
        },
    );
    let replayed = watcher.start().expect("start");
    let runs: Vec<String> = file_names(&replayed)
        .into_iter()
        .filter(|n| n.ends_with("_material_run.json"))
        .collect();
    assert_eq!(
        runs,
        vec![
            "1 Alloy_material_run.json",
            "2 Ingot_material_run.json",
            "3 Powder_material_run.json",
        ]
    );
    assert_eq!(watcher.engine().lock().trees().len(), 3);
    assert!(watcher.stop().expect("stop").is_empty());
}

#[test]
fn watcher_handles_live_files_once() {
    let files = TempDir::new().expect("files");
    let gemd = TempDir::new().expect("gemd");
    std::fs::write(files.path().join("7.txt"), "").expect("write");

    let mut engine = RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
    engine.register(material_rule("txt", "*.txt", "Alloy")).expect("register");
    let gemd_folder = engine.gemd_folder().to_path_buf();
    let files_folder = engine.files_folder().to_path_buf();

    let mut watcher = FolderWatcher::new(
        engine,
        WatchOptions {
            instantiate_build: true,
            ..WatchOptions::default()
        },
    );
    let replayed = watcher.start().expect("start");
    assert!(file_names(&replayed).contains(&"7 Alloy_material_run.json".to_string()));

    std::fs::write(files_folder.join("8.txt"), "").expect("write");
    assert!(wait_for(&gemd_folder.join("8 Alloy_material_run.json"), Duration::from_secs(10)));

    let failures = watcher.stop().expect("stop");
    assert!(failures.is_empty());
    let engine = watcher.engine();
    let engine = engine.lock();
    assert!(engine.is_processed(&files_folder.join("7.txt")));
    assert!(engine.is_processed(&files_folder.join("8.txt")));
}

#[test]
fn watcher_handles_a_recreated_input_again() {
    let files = TempDir::new().expect("files");
    let gemd = TempDir::new().expect("gemd");
    let mut engine = RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
    engine.register(material_rule("txt", "*.txt", "Alloy")).expect("register");
    let gemd_folder = engine.gemd_folder().to_path_buf();
    let input = engine.files_folder().join("9.txt");
    let output = gemd_folder.join("9 Alloy_material_run.json");

    let mut watcher = FolderWatcher::new(engine, WatchOptions::default());
    watcher.start().expect("start");
    std::fs::write(&input, "first").expect("write");
    assert!(wait_for(&output, Duration::from_secs(10)));

    std::fs::remove_file(&output).expect("remove output");
    std::fs::remove_file(&input).expect("remove input");
    let shared = watcher.engine();
    let deadline = Instant::now() + Duration::from_secs(10);
    while shared.lock().is_processed(&input) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(!shared.lock().is_processed(&input));

    std::fs::write(&input, "second").expect("rewrite");
    assert!(wait_for(&output, Duration::from_secs(10)));
    assert!(watcher.stop().expect("stop").is_empty());
}

#[test]
fn watcher_stops_while_inputs_keep_arriving() {
    let files = TempDir::new().expect("files");
    let gemd = TempDir::new().expect("gemd");
    let mut engine = RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
    engine.register(material_rule("txt", "*.txt", "Alloy")).expect("register");
    let files_folder = engine.files_folder().to_path_buf();

    let mut watcher = FolderWatcher::new(engine, WatchOptions::default());
    watcher.start().expect("start");
    for i in 0..20 {
        std::fs::write(files_folder.join(format!("{i}.txt")), "").expect("write");
    }
    watcher.stop().expect("stop");
    assert!(!watcher.is_running());
    for i in 20..25 {
        std::fs::write(files_folder.join(format!("{i}.txt")), "").expect("write");
    }
    assert!(!watcher.engine().lock().is_processed(&files_folder.join("24.txt")));
}

// =============================================================================
// INVARIANTS
// =============================================================================

#[test]
fn elements_use_the_canonical_template_and_their_own_spec() {
    let dir = TempDir::new().expect("tempdir");
    let stores = StoresConfig::open_local(dir.path(), "local").expect("stores");
    let material = Material::new("Alloy 1", &Handle::new(MaterialTemplate::new("Alloy")), &stores)
        .expect("material");

    let canonical = stores
        .designated_template_store()
        .expect("store")
        .lock()
        .material_template("Alloy")
        .expect("interned");
    assert!(Handle::ptr_eq(material.template(), &canonical));
    assert!(
        material
            .spec()
            .read()
            .template
            .as_ref()
            .is_some_and(|t| t.points_to(&canonical))
    );
    assert!(
        material
            .run()
            .read()
            .spec
            .as_ref()
            .is_some_and(|s| s.points_to(material.spec()))
    );
}

#[test]
fn spec_buckets_hold_unique_content() {
    let dir = TempDir::new().expect("tempdir");
    let stores = StoresConfig::open_local(dir.path(), "local").expect("stores");
    let template = Handle::new(ProcessTemplate::new("Sintering"));

    let mut first = Process::new("Sinter", &template, &stores).expect("first");
    let mut second = Process::new("Sinter", &template, &stores).expect("second");
    assert!(!first.intern_spec().expect("intern"));
    assert!(second.intern_spec().expect("intern"));

    assert!(Handle::ptr_eq(first.spec(), second.spec()));
    assert!(
        second
            .run()
            .read()
            .spec
            .as_ref()
            .is_some_and(|s| s.points_to(first.spec()))
    );
    let store = stores.designated_spec_store().expect("spec store");
    assert_eq!(store.lock().bucket(EntityType::ProcessSpec, "Sinter").len(), 1);
}

#[test]
fn attribute_templates_match_owner_slots() {
    let stores = StoresConfig::new();
    let temperature = Handle::new(AttributeTemplate::condition(
        "Temperature",
        Bounds::real(0.0, 3000.0, "K"),
    ));
    let template = Handle::new(ProcessTemplate::new("Anneal").with_condition(&temperature));
    let mut process = Process::builder("Anneal 1")
        .template(template)
        .attribute(Attribute::condition("Temperature").with_value(Value::nominal_real(900.0, "K")))
        .build(&stores)
        .expect("process");

    // An attribute for a name the template lacks defines its own slot.
    let pressure = Handle::new(AttributeTemplate::condition(
        "Pressure",
        Bounds::real(0.0, 10.0, "bar"),
    ));
    process
        .update_attributes(
            AttributeKind::Condition,
            vec![
                Attribute::condition("Pressure")
                    .with_template(&pressure)
                    .with_value(Value::nominal_real(1.0, "bar")),
            ],
            false,
            Which::Both,
        )
        .expect("update");

    let slots: BTreeSet<String> = process.slots().names(AttributeKind::Condition).into_iter().collect();
    for attribute in process.attributes(AttributeKind::Condition, Which::Both) {
        let name = attribute.template_name().expect("template");
        assert!(slots.contains(&name), "{name} has no slot");
    }
}

#[test]
fn unidirectional_graphs_are_acyclic() {
    let stores = StoresConfig::new();
    let a = full_sequence(&stores, "A", "Raw");
    let b = full_sequence(&stores, "B", "A Alloy Ingredient");
    a.link_within();
    b.link_within();
    assert!(b.link_prior(&a, "A Alloy Ingredient"));

    let roots: Vec<EntityRef> = a
        .elements()
        .iter()
        .chain(b.elements().iter())
        .flat_map(Element::entities)
        .collect();
    thin_documents(&roots).expect("uids");
    let entities = collect_reachable(&roots);

    for which in [GraphScope::Run, GraphScope::Spec, GraphScope::All] {
        let built = GraphBuilder::new(GraphBuilderOptions {
            which,
            ..GraphBuilderOptions::default()
        })
        .build_from_entities(&entities)
        .expect("build");
        assert!(built.diagnostics.cycles.is_empty(), "{which:?}");
        assert!(built.graph.node_count() > 0);
    }
}

#[test]
fn thin_dump_and_reload_preserve_links() {
    let stores = StoresConfig::new();
    let seq = full_sequence(&stores, "R", "Feed");
    seq.link_within();
    let roots: Vec<EntityRef> = seq.elements().iter().flat_map(Element::entities).collect();
    let documents = thin_documents(&roots).expect("docs");

    let outgoing = |entity: &EntityRef| -> BTreeSet<String> {
        entity.links().into_iter().map(|link| link.id).collect()
    };
    let before: BTreeSet<(String, BTreeSet<String>)> = documents
        .iter()
        .map(|(entity, _)| (entity.uid(AUTO_SCOPE).expect("auto"), outgoing(entity)))
        .collect();

    let text = serde_json::to_string(
        &documents.iter().map(|(_, value)| value.clone()).collect::<Vec<_>>(),
    )
    .expect("json");
    let reloaded = raw_loads(&text).expect("reload");
    let after: BTreeSet<(String, BTreeSet<String>)> = reloaded
        .iter()
        .map(|entity| (entity.uid(AUTO_SCOPE).expect("auto"), outgoing(entity)))
        .collect();

    assert_eq!(before, after);
}

#[test]
fn removing_a_required_attribute_is_rejected() {
    let stores = StoresConfig::new();
    let passes = Handle::new(AttributeTemplate::parameter("Passes", Bounds::integer(1, 10)));
    let mut process = Process::builder("Roll")
        .template(Handle::new(ProcessTemplate::new("Rolling").with_parameter(&passes)))
        .default_value(AttributeKind::Parameter, "Passes", Value::nominal_integer(3))
        .build(&stores)
        .expect("process");

    let err = process
        .remove_attributes(AttributeKind::Parameter, &["Passes"], Which::Both)
        .expect_err("required");
    assert!(matches!(err, GemdError::RemovingRequired(name) if name == "Passes"));
}

#[test]
fn engine_rejects_unmatched_and_suffix_rules_route_by_extension() {
    let files = TempDir::new().expect("files");
    let gemd = TempDir::new().expect("gemd");
    let mut engine = RuleEngine::new(files.path(), gemd.path(), StoresConfig::new()).expect("engine");
    engine
        .register(
            AutomatableComponent::new(
                "scan",
                suffix_rule(".csv"),
                FileIdPattern::new(r"^(\w+)\.csv$", false).expect("pattern"),
                |ctx| {
                    let template = ctx
                        .component
                        .schema_template::<MeasurementTemplate>("Scan")
                        .ok_or_else(|| GemdError::MissingTemplate("Scan".into()))?;
                    Ok(vec![Measurement::new(ctx.file_id, &template, ctx.stores)?.into()])
                },
            )
            .with_schema(Handle::new(MeasurementTemplate::new("Scan"))),
        )
        .expect("register");

    let csv = engine.files_folder().join("xrd.csv");
    std::fs::write(&csv, "").expect("write");
    let written = file_names(&engine.handle_files_path(&csv).expect("handle"));
    assert!(written.contains(&"xrd_measurement_run.json".to_string()));

    let other = engine.files_folder().join("xrd.png");
    std::fs::write(&other, "").expect("write");
    assert!(engine.handle_files_path(&other).expect("handle").is_empty());
}
