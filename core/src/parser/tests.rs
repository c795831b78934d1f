//! Parser tests - verify parsing and AST structure
//!
//! These tests do NOT analyze or evaluate anything; that is covered by the
//! analyzer and interpreter tests.

use super::*;
use crate::ast::{BodyItem, Definition, Expr};
use crate::graph::EdgeKind;

fn parse(source: &str) -> Document {
    parse_document(source).expect("Should parse")
}

fn object(doc: &Document, index: usize) -> &ObjectDef {
    match &doc.definitions[index] {
        Definition::Object(def) => def,
        other => panic!("Expected object definition, got {:?}", other),
    }
}

/* ===================== Definitions ===================== */

#[test]
fn test_parse_empty_document() {
    let doc = parse("");
    assert!(doc.definitions.is_empty());

    let doc = parse("// nothing here\n/* still nothing */");
    assert!(doc.definitions.is_empty());
}

#[test]
fn test_parse_object_definition() {
    let doc = parse(
        r#"
dungeon_config c {
    dependency_graph: g,
    name: "Demo"
}
"#,
    );

    let def = object(&doc, 0);
    assert_eq!(def.type_name.name, "dungeon_config");
    assert_eq!(def.name.name, "c");
    assert_eq!(def.body.len(), 2);

    match &def.body[1] {
        BodyItem::Named { name, value: Expr::LitStr { v, .. }, .. } => {
            assert_eq!(name.name, "name");
            assert_eq!(v, "Demo");
        }
        other => panic!("Expected named string item, got {:?}", other),
    }
}

#[test]
fn test_parse_positional_and_let_items() {
    let doc = parse("point p { let base = 3, base, 4, }");
    let def = object(&doc, 0);

    assert!(matches!(&def.body[0], BodyItem::Let { name, .. } if name.name == "base"));
    assert!(matches!(&def.body[1], BodyItem::Positional { value: Expr::Ident { name, .. }, .. } if name == "base"));
    assert!(matches!(&def.body[2], BodyItem::Positional { value: Expr::LitInt { v: 4, .. }, .. }));
}

#[test]
fn test_parse_graph_definition() {
    let doc = parse(
        r#"
graph g {
    B -> A;
    C -> B -> A
    D
}
"#,
    );

    let Definition::Graph(graph) = &doc.definitions[0] else {
        panic!("Expected graph definition");
    };
    assert_eq!(graph.name.name, "g");
    let chains: Vec<Vec<&str>> = graph
        .statements
        .iter()
        .map(|s| s.groups.iter().flatten().map(|id| id.name.as_str()).collect())
        .collect();
    assert_eq!(chains, vec![vec!["B", "A"], vec!["C", "B", "A"], vec!["D"]]);
    assert!(graph.statements.iter().all(|s| s.kind == EdgeKind::Sequence));
}

#[test]
fn test_parse_graph_groups_and_edge_types() {
    let doc = parse(
        r#"
graph tdg {
    t1 -> t2 [type=st_m];
    t1 -> t3 [type=subtask_optional]
    t1, t2 -> t3, t4 -> t5 [type=seq_or]
    t6, t7
}
"#,
    );

    let Definition::Graph(graph) = &doc.definitions[0] else {
        panic!("Expected graph definition");
    };
    let groups = |index: usize| -> Vec<Vec<&str>> {
        graph.statements[index]
            .groups
            .iter()
            .map(|group| group.iter().map(|id| id.name.as_str()).collect())
            .collect()
    };
    let kinds: Vec<EdgeKind> = graph.statements.iter().map(|s| s.kind).collect();

    assert_eq!(
        kinds,
        vec![
            EdgeKind::SubtaskMandatory,
            EdgeKind::SubtaskOptional,
            EdgeKind::SequenceOr,
            EdgeKind::Sequence
        ]
    );
    assert_eq!(groups(2), vec![vec!["t1", "t2"], vec!["t3", "t4"], vec!["t5"]]);
    assert_eq!(groups(3), vec![vec!["t6", "t7"]]);
}

#[test]
fn test_unknown_edge_type_is_located() {
    let err = parse_document("graph g {\n  a -> b [type=sometimes]\n}").unwrap_err();
    assert!(matches!(err, ParseError::BuildError(..)));
    assert!(err.message().contains("unknown edge type 'sometimes'"));
    assert!(err.message().contains("st_m"));
    let span = err.span().expect("Should carry a span");
    assert_eq!((span.start_line, span.start_col), (1, 15));
}

#[test]
fn test_parse_multiple_definitions_keep_order() {
    let doc = parse(
        r#"
single_choice_task a { description: "x" }
graph g { a }
dungeon_config c { dependency_graph: g, name: "" }
"#,
    );
    let names: Vec<&str> = doc.definitions.iter().map(|d| d.name().name.as_str()).collect();
    assert_eq!(names, vec!["a", "g", "c"]);
}

/* ===================== Expressions ===================== */

#[test]
fn test_parse_literals() {
    assert!(matches!(parse_expression("42").unwrap(), Expr::LitInt { v: 42, .. }));
    assert!(matches!(parse_expression("-7").unwrap(), Expr::LitInt { v: -7, .. }));
    assert!(matches!(parse_expression("true").unwrap(), Expr::LitBool { v: true, .. }));

    match parse_expression("3.25").unwrap() {
        Expr::LitFloat { v, .. } => assert_eq!(v, 3.25),
        other => panic!("Expected float, got {:?}", other),
    }
    match parse_expression(r#""a \"quoted\" line\n""#).unwrap() {
        Expr::LitStr { v, .. } => assert_eq!(v, "a \"quoted\" line\n"),
        other => panic!("Expected string, got {:?}", other),
    }
}

#[test]
fn test_parse_keyword_prefixed_identifier() {
    match parse_expression("letter").unwrap() {
        Expr::Ident { name, .. } => assert_eq!(name, "letter"),
        other => panic!("Expected identifier, got {:?}", other),
    }
    match parse_expression("trueish").unwrap() {
        Expr::Ident { name, .. } => assert_eq!(name, "trueish"),
        other => panic!("Expected identifier, got {:?}", other),
    }
}

#[test]
fn test_parse_list_and_map_literals() {
    match parse_expression("[1, 2, 3]").unwrap() {
        Expr::List { elements, .. } => assert_eq!(elements.len(), 3),
        other => panic!("Expected list, got {:?}", other),
    }
    match parse_expression("[]").unwrap() {
        Expr::List { elements, .. } => assert!(elements.is_empty()),
        other => panic!("Expected empty list, got {:?}", other),
    }
    match parse_expression(r#"[1 -> "one", 2 -> "two"]"#).unwrap() {
        Expr::Map { entries, .. } => {
            assert_eq!(entries.len(), 2);
            assert!(matches!(entries[0].0, Expr::LitInt { v: 1, .. }));
        }
        other => panic!("Expected map, got {:?}", other),
    }
}

#[test]
fn test_parse_construct_call_and_member_chain() {
    match parse_expression("point { x: 1, y: 2 }").unwrap() {
        Expr::Construct { type_name, body, .. } => {
            assert_eq!(type_name.name, "point");
            assert_eq!(body.len(), 2);
        }
        other => panic!("Expected construction, got {:?}", other),
    }

    match parse_expression(r#"print("hi")"#).unwrap() {
        Expr::Call { callee, args, .. } => {
            assert_eq!(callee.name, "print");
            assert_eq!(args.len(), 1);
        }
        other => panic!("Expected call, got {:?}", other),
    }

    match parse_expression("quiz.answers.contains(\"4\")").unwrap() {
        Expr::MethodCall { receiver, method, args, .. } => {
            assert_eq!(method.name, "contains");
            assert_eq!(args.len(), 1);
            assert!(matches!(*receiver, Expr::Member { ref member, .. } if member.name == "answers"));
        }
        other => panic!("Expected method call, got {:?}", other),
    }
}

/* ===================== Spans and Errors ===================== */

#[test]
fn test_spans_are_zero_based_lines_and_columns() {
    let doc = parse("\n  dungeon_config c { name: missing }");
    let def = object(&doc, 0);
    assert_eq!(def.name.span.start_line, 1);
    assert_eq!(def.name.span.start_col, 17);

    let BodyItem::Named { value, .. } = &def.body[0] else {
        panic!("Expected named item");
    };
    assert_eq!(value.span().start_col, 27);
}

#[test]
fn test_parse_error_reports_location() {
    let err = parse_document("dungeon_config c { name: }").unwrap_err();
    assert!(matches!(err, ParseError::PestError(..)));
    let span = err.span().expect("pest errors carry a position");
    assert_eq!(span.start_line, 0);
}

#[test]
fn test_parse_file_keeps_path() {
    let file = parse_file("levels/intro.dng", "graph g { a }").expect("Should parse");
    assert_eq!(file.path, std::path::PathBuf::from("levels/intro.dng"));
    assert_eq!(&*file.file_name(), "levels/intro.dng");
}
