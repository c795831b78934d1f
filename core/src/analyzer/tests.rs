//! Analyzer tests - name resolution, type checking, typed tree shape

use super::*;
use crate::environment::standard_registry;
use crate::graph::EdgeKind;
use crate::parser::parse_file;
use crate::types::{Arguments, EnumDecl, HostError, TypeDecl, TypeRef};

const TASKS: &str = r#"
single_choice_task a {
    description: "2 + 2?",
    answers: ["3", "4"],
    correct_answer_index: 1
}
single_choice_task b {
    description: "Capital of France?",
    answers: ["Paris", "Rome"],
    correct_answer_index: 0,
    depends_on: [a]
}
"#;

fn analyze_with(registry: &Registry, source: &str) -> SemanticResult<AnalyzedFile> {
    let files = vec![parse_file("test.dng", source).expect("Should parse")];
    let entries = EntryPointRegistry::register_all(&files, registry);
    analyze_file(&files[0], registry, &entries)
}

fn analyze(source: &str) -> SemanticResult<AnalyzedFile> {
    let registry = standard_registry().expect("standard registry builds");
    analyze_with(&registry, source)
}

fn analyze_err(source: &str) -> SemanticError {
    analyze(source).expect_err("Should fail analysis")
}

fn construction<'f>(file: &'f AnalyzedFile, name: &str) -> &'f Construction {
    match &file.definition(name).expect("definition exists").body {
        DefinitionBody::Object { construction, .. } => construction,
        other => panic!("Expected object body, got {:?}", other),
    }
}

fn arg<'c>(construction: &'c Construction, index: usize) -> &'c TypedExpr {
    construction
        .items
        .iter()
        .find_map(|item| match item {
            ConstructItem::Arg { index: i, value } if *i == index => Some(value),
            _ => None,
        })
        .expect("argument present")
}

#[derive(Debug, Clone, PartialEq)]
struct Texture(String);

#[derive(Debug, Clone, PartialEq)]
struct Room {
    name: String,
    texture: Option<Texture>,
}

fn world_registry() -> Registry {
    Registry::builder()
        .register_type(
            TypeDecl::adapter_for(|args: &Arguments| {
                let path = args.string("path")?;
                if path.ends_with(".png") {
                    Ok(Texture(path))
                } else {
                    Err(HostError::failed(format!("not an image: {}", path)))
                }
            })
            .member("path", TypeRef::String),
        )
        .register_type(
            TypeDecl::aggregate("Room")
                .member("name", TypeRef::String)
                .member("texture", TypeRef::of::<Texture>())
                .member("difficulty", TypeRef::named("Difficulty"))
                .constructor(|args| {
                    Ok(Room {
                        name: args.string("name")?,
                        texture: args.optional_host::<Texture>("texture")?,
                    })
                }),
        )
        .register_type(
            TypeDecl::aggregate("Tavern")
                .member("name", TypeRef::String)
                .member("prices", TypeRef::map(TypeRef::String, TypeRef::Int))
                .constructor(|args| args.string("name")),
        )
        .register_enum(EnumDecl::new("Difficulty", ["Easy", "Hard"]))
        .build()
        .expect("world registry builds")
}

/* ===================== Definitions ===================== */

#[test]
fn test_analyze_config_with_graph() {
    let source = format!(
        "{}\ngraph g {{ b -> a }}\ndungeon_config c {{ dependency_graph: g, name: \"Demo\" }}",
        TASKS
    );
    let file = analyze(&source).expect("Should analyze");

    assert_eq!(file.definitions.len(), 4);
    let c = file.definition("c").unwrap();
    assert_eq!(c.ty, DslType::Aggregate("dungeon_config".into()));

    let config = construction(&file, "c");
    assert_eq!(config.type_name, "dungeon_config");
    assert_eq!(arg(config, 0).kind, TypedKind::EntryRef("g".into()));
    assert_eq!(arg(config, 0).ty, DslType::GRAPH);
    assert_eq!(arg(config, 1).kind, TypedKind::Literal(Literal::Str("Demo".into())));

    let g = file.definition("g").unwrap();
    let DefinitionBody::Graph { statements } = &g.body else {
        panic!("Expected graph body");
    };
    let names: Vec<&str> = statements[0].tasks().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["b", "a"]);
    assert_eq!(statements[0].kind, EdgeKind::Sequence);
}

#[test]
fn test_graph_groups_link_every_pair() {
    let source = format!(
        "{}
single_choice_task c {{ description: \"c\", answers: [\"x\"], correct_answer_index: 0 }}
graph g {{ c, b -> a [type=c_c] }}",
        TASKS
    );
    let file = analyze(&source).expect("Should analyze");
    let DefinitionBody::Graph { statements } = &file.definition("g").unwrap().body else {
        panic!("Expected graph body");
    };

    assert_eq!(statements[0].kind, EdgeKind::ConditionalCorrect);
    let links: Vec<(&str, &str)> = statements[0]
        .links()
        .map(|(from, to)| (from.name.as_str(), to.name.as_str()))
        .collect();
    assert_eq!(links, vec![("c", "a"), ("b", "a")]);
}

#[test]
fn test_task_dependencies_are_structural() {
    let file = analyze(TASKS).expect("Should analyze");
    let b = file.definition("b").unwrap();
    let names: Vec<&str> = b.dependencies().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a"]);

    // depends_on is not a constructor argument
    assert_eq!(construction(&file, "b").items.len(), 3);
}

#[test]
fn test_forward_reference_within_file() {
    let file = analyze(&format!("dungeon_config c {{ dependency_graph: g, name: \"\" }}\ngraph g {{ a }}\n{}", TASKS));
    assert!(file.is_ok());
}

#[test]
fn test_reference_across_files() {
    let registry = standard_registry().unwrap();
    let files = vec![
        parse_file("config.dng", "dungeon_config c { dependency_graph: g, name: \"\" }").unwrap(),
        parse_file("graph.dng", &format!("graph g {{ b }}\n{}", TASKS)).unwrap(),
    ];
    let entries = EntryPointRegistry::register_all(&files, &registry);
    assert!(analyze_file(&files[0], &registry, &entries).is_ok());
    assert!(analyze_file(&files[1], &registry, &entries).is_ok());
}

/* ===================== Resolution Errors ===================== */

#[test]
fn test_undeclared_graph_name() {
    let err = analyze_err(r#"dungeon_config c { dependency_graph: missing, name: "x" }"#);
    match &err {
        SemanticError::UnresolvedSymbol { name, location } => {
            assert_eq!(name, "missing");
            assert_eq!(location.to_string(), "test.dng:1:38");
        }
        other => panic!("Expected unresolved symbol, got {:?}", other),
    }
    assert_eq!(err.to_string(), "test.dng:1:38: unresolved symbol 'missing'");
}

#[test]
fn test_unknown_type_name() {
    let err = analyze_err("graph g { }\ndungeon_config c { let w = wizard { }, dependency_graph: g, name: \"\" }");
    assert!(matches!(err, SemanticError::UnresolvedSymbol { ref name, .. } if name == "wizard"));
}

#[test]
fn test_unresolved_member() {
    let err = analyze_err(r#"graph g { } dungeon_config c { dependency_graph: g, name: "", colour: 3 }"#);
    match err {
        SemanticError::UnresolvedMember { type_name, member, .. } => {
            assert_eq!(type_name, "dungeon_config");
            assert_eq!(member, "colour");
        }
        other => panic!("Expected unresolved member, got {:?}", other),
    }
}

#[test]
fn test_duplicate_argument() {
    let err = analyze_err(r#"graph g { } dungeon_config c { dependency_graph: g, dependency_graph: g, name: "" }"#);
    assert!(matches!(err, SemanticError::DuplicateSymbol { ref name, .. } if name == "dependency_graph"));
}

#[test]
fn test_duplicate_let_in_one_body() {
    let err = analyze_err(r#"graph g { } dungeon_config c { let x = 1, let x = 2, dependency_graph: g, name: "" }"#);
    assert!(matches!(err, SemanticError::DuplicateSymbol { ref name, .. } if name == "x"));
}

/* ===================== Type Checking ===================== */

#[test]
fn test_member_type_mismatch() {
    let err = analyze_err(r#"dungeon_config c { dependency_graph: 5, name: "x" }"#);
    match err {
        SemanticError::TypeMismatch {
            context,
            expected,
            actual,
            ..
        } => {
            assert_eq!(context, "dependency_graph");
            assert_eq!(expected, "graph");
            assert_eq!(actual, "int");
        }
        other => panic!("Expected type mismatch, got {:?}", other),
    }
}

#[test]
fn test_argument_count_must_match_members() {
    let err = analyze_err(r#"dungeon_config c { name: "x" }"#);
    assert!(matches!(
        err,
        SemanticError::ArityMismatch { expected: 2, actual: 1, .. }
    ));

    let err = analyze_err(r#"graph g { } dungeon_config c { g, "x", "extra" }"#);
    assert!(matches!(
        err,
        SemanticError::ArityMismatch { expected: 2, actual: 3, .. }
    ));
}

#[test]
fn test_positional_arguments_follow_member_order() {
    let file = analyze(r#"graph g { } dungeon_config c { g, "Demo" }"#).expect("Should analyze");
    let config = construction(&file, "c");
    assert_eq!(arg(config, 0).ty, DslType::GRAPH);
    assert_eq!(arg(config, 1).ty, DslType::STRING);
}

#[test]
fn test_list_elements_must_agree() {
    let err = analyze_err(r#"single_choice_task a { description: "q", answers: ["a", 1], correct_answer_index: 0 }"#);
    assert!(matches!(err, SemanticError::TypeMismatch { ref actual, .. } if actual == "int"));

    let err = analyze_err(r#"graph g { } dungeon_config c { let xs = [1, "two"], dependency_graph: g, name: "" }"#);
    match err {
        SemanticError::TypeMismatch { expected, actual, .. } => {
            assert_eq!(expected, "int");
            assert_eq!(actual, "string");
        }
        other => panic!("Expected type mismatch, got {:?}", other),
    }
}

#[test]
fn test_empty_list_needs_context() {
    let err = analyze_err(r#"graph g { } dungeon_config c { let xs = [], dependency_graph: g, name: "" }"#);
    assert!(matches!(err, SemanticError::AmbiguousType { .. }));

    let file = analyze(r#"single_choice_task a { description: "q", answers: [], correct_answer_index: 0 }"#)
        .expect("expected type comes from the member");
    assert_eq!(arg(construction(&file, "a"), 1).ty, DslType::list(DslType::STRING));
}

#[test]
fn test_set_literal_from_expected_type() {
    let file = analyze(
        r#"multiple_choice_task m { description: "q", answers: ["a", "b"], correct_answer_indices: [0, 1] }"#,
    )
    .expect("Should analyze");
    let indices = arg(construction(&file, "m"), 2);
    assert_eq!(indices.ty, DslType::set(DslType::INT));
    assert!(matches!(indices.kind, TypedKind::Collection { kind: CollectionKind::Set, .. }));
}

#[test]
fn test_map_literal_types() {
    let registry = standard_registry().unwrap();
    let entries = EntryPointRegistry::default();
    let mut analyzer = Analyzer::new(&registry, &entries, Arc::from("expr.dng"));

    let expr = crate::parser::parse_expression(r#"[1 -> "one", 2 -> "two"]"#).unwrap();
    let typed = analyzer.analyze_expr(&expr, None).unwrap();
    assert_eq!(typed.ty, DslType::map(DslType::INT, DslType::STRING));

    let expr = crate::parser::parse_expression(r#"[1 -> "one", "2" -> "two"]"#).unwrap();
    assert!(matches!(
        analyzer.analyze_expr(&expr, None),
        Err(SemanticError::TypeMismatch { .. })
    ));
}

#[test]
fn test_empty_literal_as_expected_map() {
    let registry = standard_registry().unwrap();
    let entries = EntryPointRegistry::default();
    let mut analyzer = Analyzer::new(&registry, &entries, Arc::from("expr.dng"));

    let expr = crate::parser::parse_expression("[]").unwrap();
    let expected = DslType::map(DslType::INT, DslType::STRING);
    let typed = analyzer.analyze_expr(&expr, Some(&expected)).expect("map type comes from the context");
    assert_eq!(typed.ty, expected);
    assert_eq!(typed.kind, TypedKind::Map(Vec::new()));
}

#[test]
fn test_empty_map_member() {
    let registry = world_registry();
    let file = analyze_with(&registry, r#"tavern inn { name: "inn", prices: [] }"#).expect("Should analyze");
    let prices = arg(construction(&file, "inn"), 1);
    assert_eq!(prices.ty, DslType::map(DslType::STRING, DslType::INT));
    assert_eq!(prices.kind, TypedKind::Map(Vec::new()));
}

/* ===================== Scopes ===================== */

#[test]
fn test_local_binding_shadows_entry_point() {
    let err = analyze_err(r#"graph g { } dungeon_config c { let g = 5, dependency_graph: g, name: "" }"#);
    assert!(matches!(err, SemanticError::TypeMismatch { ref actual, .. } if actual == "int"));
}

#[test]
fn test_local_binding_not_visible_to_siblings() {
    let source = r#"
graph g { }
dungeon_config first { let g = 5, dependency_graph: g.missing, name: "" }
"#;
    // Inside `first` the local wins
    assert!(matches!(analyze_err(source), SemanticError::UnresolvedMember { .. }));

    let source = r#"
graph g { }
dungeon_config first { let label = "x", dependency_graph: g, name: label }
dungeon_config second { dependency_graph: g, name: label }
"#;
    assert!(matches!(
        analyze_err(source),
        SemanticError::UnresolvedSymbol { ref name, .. } if name == "label"
    ));
}

/* ===================== Extensions and Calls ===================== */

#[test]
fn test_writable_extension_becomes_write() {
    let file = analyze(
        r#"single_choice_task a { description: "q", answers: ["x"], correct_answer_index: 0, points: 5 }"#,
    )
    .expect("Should analyze");
    let a = construction(&file, "a");
    assert!(a
        .items
        .iter()
        .any(|item| matches!(item, ConstructItem::Write { name, .. } if name == "points")));
}

#[test]
fn test_read_only_extension_cannot_be_written() {
    let err = analyze_err(
        r#"single_choice_task a { description: "q", answers: ["x"], correct_answer_index: 0, task_text: "no" }"#,
    );
    assert!(matches!(err, SemanticError::UnresolvedMember { ref member, .. } if member == "task_text"));
}

#[test]
fn test_member_reads_resolve_fields_then_extensions() {
    let source = format!(
        "{}\ngraph g {{ a }}\ndungeon_config c {{ dependency_graph: g, name: a.task_text }}\ndungeon_config d {{ dependency_graph: g, name: c.name }}",
        TASKS
    );
    let file = analyze(&source).expect("Should analyze");

    match &arg(construction(&file, "c"), 1).kind {
        TypedKind::Member { member, .. } => assert_eq!(
            member,
            &MemberRef::Extension {
                host_name: "Quiz".into(),
                name: "task_text".into()
            }
        ),
        other => panic!("Expected member read, got {:?}", other),
    }
    match &arg(construction(&file, "d"), 1).kind {
        TypedKind::Member { member, .. } => assert_eq!(
            member,
            &MemberRef::Field {
                index: 1,
                name: "name".into()
            }
        ),
        other => panic!("Expected member read, got {:?}", other),
    }
}

#[test]
fn test_function_calls_are_checked() {
    let wrap = |value: &str| format!("graph g {{ }} dungeon_config c {{ let out = {}, dependency_graph: g, name: \"\" }}", value);

    assert!(analyze(&wrap(r#"print("hello")"#)).is_ok());
    assert!(matches!(
        analyze_err(&wrap(r#"print("a", "b")"#)),
        SemanticError::ArityMismatch { expected: 1, actual: 2, .. }
    ));
    assert!(matches!(analyze_err(&wrap("print(1)")), SemanticError::TypeMismatch { .. }));
    assert!(matches!(
        analyze_err(&wrap("shout(1)")),
        SemanticError::UnresolvedSymbol { ref name, .. } if name == "shout"
    ));
}

#[test]
fn test_methods_builtin_then_extension() {
    let wrap = |value: &str| {
        format!(
            "{}\ngraph g {{ }} dungeon_config c {{ let out = {}, dependency_graph: g, name: \"\" }}",
            TASKS, value
        )
    };

    let file = analyze(&wrap(r#"["a", "b"].size()"#)).unwrap();
    let DefinitionBody::Object { construction, .. } = &file.definition("c").unwrap().body else {
        panic!("Expected object body");
    };
    let ConstructItem::Let { value, .. } = &construction.items[0] else {
        panic!("Expected let item");
    };
    assert_eq!(value.ty, DslType::INT);
    assert!(matches!(value.kind, TypedKind::MethodCall { method: Method::Size, .. }));

    assert!(analyze(&wrap("a.is_correct(1)")).is_ok());
    assert!(matches!(
        analyze_err(&wrap(r#"["a"].contains(1)"#)),
        SemanticError::TypeMismatch { .. }
    ));
    assert!(matches!(
        analyze_err(&wrap("a.explode()")),
        SemanticError::UnresolvedMember { ref member, .. } if member == "explode"
    ));
}

/* ===================== Tasks and Graphs ===================== */

#[test]
fn test_depends_on_must_name_tasks() {
    let source = format!(
        "{}\ngraph g {{ }}\ndungeon_config c {{ dependency_graph: g, name: \"\" }}\nsingle_choice_task x {{ description: \"q\", answers: [\"a\"], correct_answer_index: 0, depends_on: [c] }}",
        TASKS
    );
    assert!(matches!(
        analyze_err(&source),
        SemanticError::TypeMismatch { ref context, .. } if context == "c"
    ));

    let err = analyze_err(r#"single_choice_task x { description: "q", answers: ["a"], correct_answer_index: 0, depends_on: "a" }"#);
    assert!(matches!(err, SemanticError::TypeMismatch { ref context, .. } if context == "depends_on"));
}

#[test]
fn test_depends_on_only_on_tasks() {
    let err = analyze_err(&format!(
        "{}\ngraph g {{ }}\ndungeon_config c {{ dependency_graph: g, name: \"\", depends_on: [a] }}",
        TASKS
    ));
    assert!(matches!(err, SemanticError::UnresolvedMember { ref member, .. } if member == "depends_on"));
}

#[test]
fn test_graph_names_must_be_tasks() {
    assert!(matches!(
        analyze_err("graph g { a -> ghost }"),
        SemanticError::UnresolvedSymbol { ref name, .. } if name == "a"
    ));

    let err = analyze_err(&format!("{}\ngraph g {{ b -> a }}\ngraph h {{ g }}", TASKS));
    match err {
        SemanticError::TypeMismatch { context, actual, .. } => {
            assert_eq!(context, "g");
            assert_eq!(actual, "graph");
        }
        other => panic!("Expected type mismatch, got {:?}", other),
    }
}

/* ===================== Adapters and Enums ===================== */

#[test]
fn test_implicit_single_argument_adapter() {
    let registry = world_registry();
    let file = analyze_with(
        &registry,
        r#"room r { name: "hall", texture: "walls.png", difficulty: difficulty.hard }"#,
    )
    .expect("Should analyze");

    let texture = arg(construction(&file, "r"), 1);
    assert_eq!(texture.ty, DslType::AggregateAdapted("texture".into()));
    match &texture.kind {
        TypedKind::Construct(inner) => {
            assert_eq!(inner.type_name, "texture");
            assert_eq!(arg(inner, 0).ty, DslType::STRING);
        }
        other => panic!("Expected implicit construction, got {:?}", other),
    }

    let difficulty = arg(construction(&file, "r"), 2);
    assert_eq!(
        difficulty.kind,
        TypedKind::EnumVariant {
            type_name: "difficulty".into(),
            variant: "hard".into()
        }
    );
}

#[test]
fn test_explicit_adapter_construction() {
    let registry = world_registry();
    let file = analyze_with(
        &registry,
        r#"room r { name: "hall", texture: texture { path: "a.png" }, difficulty: difficulty.easy }"#,
    )
    .expect("Should analyze");
    assert!(matches!(arg(construction(&file, "r"), 1).kind, TypedKind::Construct(_)));
}

#[test]
fn test_unknown_enum_variant() {
    let registry = world_registry();
    let err = analyze_with(
        &registry,
        r#"room r { name: "hall", texture: "a.png", difficulty: difficulty.nightmare }"#,
    )
    .unwrap_err();
    assert!(matches!(err, SemanticError::UnresolvedMember { ref member, .. } if member == "nightmare"));
}

#[test]
fn test_no_implicit_adapter_for_wrong_type() {
    let registry = world_registry();
    let err = analyze_with(
        &registry,
        r#"room r { name: "hall", texture: 42, difficulty: difficulty.easy }"#,
    )
    .unwrap_err();
    match err {
        SemanticError::TypeMismatch { expected, actual, .. } => {
            assert_eq!(expected, "texture");
            assert_eq!(actual, "int");
        }
        other => panic!("Expected type mismatch, got {:?}", other),
    }
}
