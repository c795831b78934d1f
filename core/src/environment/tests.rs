use super::*;
use crate::types::{DslType, MemberLookup};

fn quiz_args(answers: &[&str], correct: Value) -> Arguments {
    Arguments::new(vec![
        ("description".to_string(), Value::from("Pick one")),
        (
            "answers".to_string(),
            Value::List(answers.iter().map(|a| Value::from(*a)).collect()),
        ),
        ("correct_answer_index".to_string(), correct),
    ])
}

#[test]
fn test_standard_registry_names() {
    let registry = standard_registry().unwrap();

    let config = registry.aggregate("dungeon_config").unwrap();
    let members: Vec<&str> = config.members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(members, vec!["dependency_graph", "name"]);
    assert_eq!(config.members[1].host_ident, "display_name");
    assert!(!config.task);

    let single = registry.aggregate("single_choice_task").unwrap();
    assert!(single.task && single.is_adapted());
    assert_eq!(single.members[2].name, "correct_answer_index");

    let multiple = registry.aggregate("multiple_choice_task").unwrap();
    assert_eq!(multiple.members[2].ty, DslType::set(DslType::INT));

    assert!(registry.function("print").is_some());
}

#[test]
fn test_quiz_extensions_resolve_on_both_task_types() {
    let registry = standard_registry().unwrap();
    for task_type in ["single_choice_task", "multiple_choice_task"] {
        let ty = registry.lookup_type(task_type).unwrap();
        assert!(matches!(
            registry.resolve_member(&ty, "task_text"),
            Some(MemberLookup::Extension(property)) if !property.is_writable()
        ));
        assert!(matches!(
            registry.resolve_member(&ty, "points"),
            Some(MemberLookup::Extension(property)) if property.is_writable()
        ));
        assert!(registry.method(&ty, "is_correct").is_some());
    }
}

#[test]
fn test_single_choice_adapter() {
    let registry = standard_registry().unwrap();
    let single = registry.aggregate("single_choice_task").unwrap();

    let host = single.build(&quiz_args(&["a", "b"], Value::Int(1))).unwrap();
    let quiz = host.downcast_clone::<Quiz>().unwrap();
    assert_eq!(quiz.kind, QuizKind::SingleChoice);
    assert_eq!(quiz.correct_answers, vec![1]);
    assert_eq!(quiz.points, 1);
    assert!(quiz.is_correct(1));
    assert!(!quiz.is_correct(0));

    let text = registry.extension("Quiz", "task_text").unwrap().get(&host).unwrap();
    assert_eq!(text, Value::from("Pick one"));
}

#[test]
fn test_quiz_adapter_rejects_bad_input() {
    let registry = standard_registry().unwrap();
    let single = registry.aggregate("single_choice_task").unwrap();

    let err = single.build(&quiz_args(&["a", "b"], Value::Int(2))).unwrap_err();
    assert!(err.to_string().contains("out of range"));

    let err = single.build(&quiz_args(&[], Value::Int(0))).unwrap_err();
    assert!(err.to_string().contains("at least one answer"));

    let err = single.build(&quiz_args(&["a"], Value::Absent)).unwrap_err();
    assert_eq!(
        err,
        HostError::MissingValue {
            member: "correct_answer_index".into()
        }
    );
}

#[test]
fn test_multiple_choice_needs_a_correct_answer() {
    let registry = standard_registry().unwrap();
    let multiple = registry.aggregate("multiple_choice_task").unwrap();
    let args = |correct: Vec<Value>| {
        Arguments::new(vec![
            ("description".to_string(), Value::from("Pick some")),
            ("answers".to_string(), Value::List(vec![Value::from("a"), Value::from("b")])),
            ("correct_answer_indices".to_string(), Value::set_from(correct)),
        ])
    };

    let host = multiple.build(&args(vec![Value::Int(1), Value::Int(0)])).unwrap();
    let quiz = host.downcast_clone::<Quiz>().unwrap();
    assert_eq!(quiz.kind, QuizKind::MultipleChoice);
    assert_eq!(quiz.correct_answers, vec![0, 1]);

    assert!(multiple.build(&args(Vec::new())).is_err());
}

#[test]
fn test_points_setter() {
    let registry = standard_registry().unwrap();
    let single = registry.aggregate("single_choice_task").unwrap();
    let host = single.build(&quiz_args(&["a"], Value::Int(0))).unwrap();
    let points = registry.extension("Quiz", "points").unwrap();

    points.set(&host, Value::Int(10)).unwrap();
    assert_eq!(points.get(&host).unwrap(), Value::Int(10));

    assert!(points.set(&host, Value::Int(-3)).is_err());
    assert!(points.set(&host, Value::from("ten")).is_err());
    assert_eq!(host.downcast_clone::<Quiz>().unwrap().points, 10);
}
