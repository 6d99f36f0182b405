//! Integration tests: the save/load boundary.
//!
//! Answers from the store may arrive late, out of order, or after the
//! container is gone; only the current answer for a container is applied.

use hatch_core::*;
use hatch_editor::*;
use pretty_assertions::assert_eq;

fn cid(s: &str) -> ContainerId {
    ContainerId::new(s)
}

fn session() -> EditorSession<EventLog> {
    let _ = env_logger::builder().is_test(true).try_init();
    let project = Project::new(EngineConfig::default());
    let mut s = EditorSession::new(project, EditorConfig::default(), EventLog::new());
    s.create_container(cid("main"), "Main").unwrap();
    s
}

fn comment(s: &mut EditorSession<EventLog>, text: &str) -> ShallowId {
    s.apply(
        CanvasEdit::AddComment {
            text: text.into(),
            placement: Placement::default(),
        }
        .into(),
        "add comment",
    )
    .unwrap()
    .unwrap()
}

fn is_saved(s: &EditorSession<EventLog>, id: &str) -> bool {
    s.project().container(&cid(id)).unwrap().is_saved()
}

#[test]
fn save_and_reload_through_store() {
    let mut s = session();
    let note = comment(&mut s, "persist me");
    let mut store = MemoryStore::new();

    s.save_with(&mut store, &cid("main")).unwrap();
    assert!(is_saved(&s, "main"));
    assert_eq!(store.len(), 1);

    let mut fresh = EditorSession::new(
        Project::new(EngineConfig::default()),
        EditorConfig::default(),
        EventLog::new(),
    );
    let report = fresh.load_with(&store, &cid("main")).unwrap();
    assert!(report.is_lossless());
    let loaded = fresh.project().container(&cid("main")).unwrap();
    assert_eq!(loaded.name, "Main");
    assert!(loaded.canvas().behaviour(note).is_some());
}

#[test]
fn stale_save_answer_is_ignored() {
    let mut s = session();
    comment(&mut s, "one");
    let (first, first_record) = s.begin_save(&cid("main")).unwrap();
    comment(&mut s, "two");
    let (second, second_record) = s.begin_save(&cid("main")).unwrap();
    assert_ne!(first_record, second_record);

    // The second answer arrives first.
    assert!(s.finish_save(&second, Ok(cid("main"))).unwrap());
    assert!(is_saved(&s, "main"));
    assert!(!s.finish_save(&first, Ok(cid("main"))).unwrap());
    assert_eq!(s.pending_requests(), 0);
}

#[test]
fn edit_during_save_keeps_container_unsaved() {
    let mut s = session();
    comment(&mut s, "one");
    let (ticket, _) = s.begin_save(&cid("main")).unwrap();
    comment(&mut s, "two");

    assert!(s.finish_save(&ticket, Ok(cid("main"))).unwrap());
    assert!(!is_saved(&s, "main"));
}

#[test]
fn transport_failure_leaves_graph_untouched() {
    let mut s = session();
    comment(&mut s, "keep");
    let before = s.active_container().unwrap().canvas().tokenize(None);
    let mut store = MemoryStore::new();
    store.reject_next_save("offline");

    let err = s.save_with(&mut store, &cid("main")).unwrap_err();
    assert!(matches!(err, EditorError::Store(StoreError::Rejected(_))));
    assert!(!is_saved(&s, "main"));
    assert!(store.is_empty());
    assert_eq!(s.active_container().unwrap().canvas().tokenize(None), before);
}

#[test]
fn save_refuses_cyclic_project() {
    let mut s = session();
    s.create_container(cid("lib"), "Library").unwrap();
    s.project_mut()
        .add_instance(&cid("main"), &cid("lib"), Placement::default())
        .unwrap();

    // A token for lib that instances main, as another session might have saved it.
    let json = r#"{ "items": [
        { "shallowId": 500, "type": 4, "alias": "Main", "containerId": "main" }
    ] }"#;
    let token = ContainerToken::from_json(json).unwrap();
    let known = s.project().directory();
    s.project_mut()
        .require_mut(&cid("lib"))
        .unwrap()
        .detokenize(&token, &known)
        .unwrap();

    let err = s.begin_save(&cid("main")).unwrap_err();
    assert!(matches!(err, EditorError::Graph(GraphError::DependencyCycle(_))));
    assert_eq!(s.pending_requests(), 0);
}

#[test]
fn stale_load_answer_is_ignored() {
    let mut s = session();
    comment(&mut s, "local");
    let mut store = MemoryStore::new();
    s.save_with(&mut store, &cid("main")).unwrap();

    let old = s.begin_load(&cid("main"));
    let new = s.begin_load(&cid("main"));
    assert_eq!(s.finish_load(&old, store.load(&cid("main"))).unwrap(), None);
    assert!(s.finish_load(&new, store.load(&cid("main"))).unwrap().is_some());
}

#[test]
fn reload_clears_history() {
    let mut s = session();
    comment(&mut s, "saved");
    let mut store = MemoryStore::new();
    s.save_with(&mut store, &cid("main")).unwrap();
    comment(&mut s, "unsaved");
    assert_eq!(s.active_container().unwrap().canvas().len(), 2);

    s.load_with(&store, &cid("main")).unwrap();
    assert_eq!(s.active_container().unwrap().canvas().len(), 1);
    assert!(is_saved(&s, "main"));
    assert!(!s.can_undo());
}

#[test]
fn answers_for_removed_container_are_dropped() {
    let mut s = session();
    s.create_container(cid("scratch"), "Scratch").unwrap();
    let (save, _) = s.begin_save(&cid("scratch")).unwrap();
    let load = s.begin_load(&cid("scratch"));
    s.remove_container(&cid("scratch")).unwrap();

    assert!(!s.finish_save(&save, Ok(cid("scratch"))).unwrap());
    assert_eq!(
        s.finish_load(&load, Err(StoreError::NotFound(cid("scratch"))))
            .unwrap(),
        None
    );
    assert!(s.project().container(&cid("scratch")).is_none());
}

#[test]
fn instance_survives_loading_before_its_target() {
    let mut s = session();
    s.create_container(cid("lib"), "Library").unwrap();
    s.open(&cid("main")).unwrap();
    let instance = s
        .apply(
            GraphMutation::AddInstance {
                target: cid("lib"),
                placement: Placement::default(),
            },
            "add instance",
        )
        .unwrap()
        .unwrap();
    let mut store = MemoryStore::new();
    s.save_with(&mut store, &cid("main")).unwrap();
    s.save_with(&mut store, &cid("lib")).unwrap();

    let mut fresh = EditorSession::new(
        Project::new(EngineConfig::default()),
        EditorConfig::default(),
        EventLog::new(),
    );
    let report = fresh.load_with(&store, &cid("main")).unwrap();
    assert!(report.is_lossless());
    assert_eq!(fresh.project().awaited_containers().count(), 1);

    fresh.load_with(&store, &cid("lib")).unwrap();
    assert_eq!(fresh.project().awaited_containers().count(), 0);
    let main = fresh.project().container(&cid("main")).unwrap();
    assert_eq!(main.canvas().behaviour(instance).unwrap().instance_of(), Some(&cid("lib")));

    // and it goes out again on the next save
    fresh.save_with(&mut store, &cid("main")).unwrap();
    let saved = store.load(&cid("main")).unwrap().token().unwrap();
    assert_eq!(saved.items.len(), 1);
}

#[test]
fn missing_record_is_reported() {
    let mut s = session();
    let store = MemoryStore::new();
    let err = s.load_with(&store, &cid("ghost")).unwrap_err();
    assert!(matches!(err, EditorError::Store(StoreError::NotFound(_))));
    assert!(s.project().container(&cid("ghost")).is_none());
}
