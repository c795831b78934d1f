use super::*;
use crate::environment::standard_registry;
use crate::parser::parse_file;

fn files(sources: &[(&str, &str)]) -> Vec<ParsedFile> {
    sources
        .iter()
        .map(|(path, source)| parse_file(path, source).expect("Should parse"))
        .collect()
}

#[test]
fn test_register_across_files() {
    let registry = standard_registry().unwrap();
    let parsed = files(&[
        ("a.dng", r#"dungeon_config c { dependency_graph: g, name: "Demo" }"#),
        ("b.dng", "graph g { t }\nsingle_choice_task t { description: \"q\", answers: [\"a\"], correct_answer_index: 0 }"),
    ]);

    let entries = EntryPointRegistry::register_all(&parsed, &registry);
    assert_eq!(entries.len(), 3);
    assert!(entries.failures().is_empty());

    let c = entries.get("c").expect("c registered");
    assert_eq!(c.ty, DslType::Aggregate("dungeon_config".into()));
    assert_eq!(c.location.to_string(), "a.dng:1:16");

    let g = entries.get("g").unwrap();
    assert!(matches!(g.definition, Definition::Graph(_)));
    assert_eq!(g.ty, DslType::GRAPH);
    assert_eq!(&**g.file(), "b.dng");

    assert_eq!(
        entries.get("t").map(|e| e.ty.clone()),
        Some(DslType::AggregateAdapted("single_choice_task".into()))
    );
}

#[test]
fn test_duplicate_across_files_keeps_first() {
    let registry = standard_registry().unwrap();
    let parsed = files(&[
        ("first.dng", "graph g { }"),
        ("second.dng", "graph other { }\ngraph g { }"),
    ]);

    let entries = EntryPointRegistry::register_all(&parsed, &registry);
    assert_eq!(&*entries.get("g").unwrap().location.file, "first.dng");
    assert!(entries.get("other").is_some());
    assert!(entries.failure("first.dng").is_none());

    match entries.failure("second.dng") {
        Some(SemanticError::DuplicateSymbol { name, location, previous }) => {
            assert_eq!(name, "g");
            assert_eq!(location.to_string(), "second.dng:2:7");
            assert_eq!(previous.as_ref().map(|p| p.to_string()), Some("first.dng:1:7".to_string()));
        }
        other => panic!("Expected duplicate symbol, got {:?}", other),
    }
}

#[test]
fn test_unknown_type_fails_file() {
    let registry = standard_registry().unwrap();
    let parsed = files(&[("a.dng", "wizard w { }\ngraph g { }")]);

    let entries = EntryPointRegistry::register_all(&parsed, &registry);
    assert!(entries.get("w").is_none());
    assert!(entries.get("g").is_some());
    assert!(matches!(
        entries.failure("a.dng"),
        Some(SemanticError::UnresolvedSymbol { name, .. }) if name == "wizard"
    ));
}

#[test]
fn test_resolve_unknown_name() {
    let entries = EntryPointRegistry::default();
    let location = Location::new(Arc::from("x.dng"), Default::default());
    let err = entries.resolve("missing", &location).unwrap_err();
    assert_eq!(err.to_string(), "x.dng:1:1: unresolved symbol 'missing'");
}

#[test]
fn test_global_scope_holds_entries() {
    let registry = standard_registry().unwrap();
    let parsed = files(&[("a.dng", "graph g { }\ngraph h { }")]);
    let entries = EntryPointRegistry::register_all(&parsed, &registry);

    let scope = entries.global_scope(|e| e.ty.clone());
    assert_eq!(scope.resolve("g"), Ok(&DslType::GRAPH));
    assert!(scope.resolve("h").is_ok());
    assert_eq!(scope.depth(), 0);
}
