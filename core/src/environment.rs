//! Standard host bindings
//!
//! The declarations every dungeon program can use: the `dungeon_config`
//! output value, the quiz task types and `print`. Hosts add their own types
//! on top of [`standard_declarations`].

use std::rc::Rc;

use tracing::info;

use crate::types::{
    Arguments, ExtensionMethodDecl, ExtensionPropertyDecl, FunctionDecl, HostError, Registry,
    RegistryBuilder, TaskGraph, TypeBuildError, TypeDecl, TypeRef, Value,
};

#[cfg(test)]
mod tests;

/// Host-facing result of interpreting a configuration
#[derive(Debug, Clone)]
pub struct DungeonConfig {
    pub dependency_graph: Rc<TaskGraph>,
    pub display_name: String,
}

impl DungeonConfig {
    fn from_args(args: &Arguments) -> Result<Self, HostError> {
        Ok(Self {
            dependency_graph: args.graph("dependency_graph")?,
            display_name: args.string("name")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizKind {
    SingleChoice,
    MultipleChoice,
}

/// Quiz task built by the `single_choice_task` and `multiple_choice_task` adapters
#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    pub kind: QuizKind,
    pub description: String,
    pub answers: Vec<String>,
    pub correct_answers: Vec<usize>,
    pub points: i64,
}

impl Quiz {
    fn new(kind: QuizKind, args: &Arguments, correct: Vec<i64>) -> Result<Self, HostError> {
        let answers = args.strings("answers")?;
        if answers.is_empty() {
            return Err(HostError::failed("a quiz needs at least one answer"));
        }

        let mut correct_answers = Vec::with_capacity(correct.len());
        for index in correct {
            match usize::try_from(index) {
                Ok(i) if i < answers.len() => correct_answers.push(i),
                _ => {
                    return Err(HostError::failed(format!(
                        "answer index {} is out of range for {} answers",
                        index,
                        answers.len()
                    )))
                }
            }
        }
        correct_answers.sort_unstable();

        Ok(Self {
            kind,
            description: args.string("description")?,
            answers,
            correct_answers,
            points: 1,
        })
    }

    fn single_choice(args: &Arguments) -> Result<Self, HostError> {
        Self::new(QuizKind::SingleChoice, args, vec![args.int("correct_answer_index")?])
    }

    fn multiple_choice(args: &Arguments) -> Result<Self, HostError> {
        let correct = args.ints("correct_answer_indices")?;
        if correct.is_empty() {
            return Err(HostError::failed("a multiple choice quiz needs a correct answer"));
        }
        Self::new(QuizKind::MultipleChoice, args, correct)
    }

    pub fn is_correct(&self, index: usize) -> bool {
        self.correct_answers.contains(&index)
    }
}

/// Declarations of the standard environment, ready for hosts to extend
pub fn standard_declarations() -> RegistryBuilder {
    Registry::builder()
        .register_type(
            TypeDecl::aggregate("DungeonConfig")
                .member("dependency_graph", TypeRef::Graph)
                .member_as("display_name", "name", TypeRef::String)
                .constructor(DungeonConfig::from_args),
        )
        .register_type(
            TypeDecl::adapted("Quiz")
                .named("single_choice_task")
                .member("description", TypeRef::String)
                .member("answers", TypeRef::list(TypeRef::String))
                .member("correctAnswerIndex", TypeRef::Int)
                .adapter(Quiz::single_choice)
                .task(),
        )
        .register_type(
            TypeDecl::adapted("Quiz")
                .named("multiple_choice_task")
                .member("description", TypeRef::String)
                .member("answers", TypeRef::list(TypeRef::String))
                .member("correctAnswerIndices", TypeRef::set(TypeRef::Int))
                .adapter(Quiz::multiple_choice)
                .task(),
        )
        .register_extension_property(ExtensionPropertyDecl::new(
            "Quiz",
            "task_text",
            TypeRef::String,
            |quiz: &Quiz| Value::from(quiz.description.clone()),
        ))
        .register_extension_property(
            ExtensionPropertyDecl::new("Quiz", "points", TypeRef::Int, |quiz: &Quiz| {
                Value::Int(quiz.points)
            })
            .setter(|quiz: &mut Quiz, value: Value| match value.as_int() {
                Some(points) if points >= 0 => {
                    quiz.points = points;
                    Ok(())
                }
                Some(points) => Err(HostError::failed(format!("points must not be negative, got {}", points))),
                None => Err(HostError::failed(format!("points must be an int, got {}", value.describe()))),
            }),
        )
        .register_extension_method(ExtensionMethodDecl::new(
            "Quiz",
            "is_correct",
            vec![TypeRef::Int],
            TypeRef::Bool,
            |quiz: &mut Quiz, args: &[Value]| {
                let index = args.first().and_then(Value::as_int).unwrap_or(-1);
                Ok(Value::Bool(usize::try_from(index).map(|i| quiz.is_correct(i)).unwrap_or(false)))
            },
        ))
        .register_function(FunctionDecl::new(
            "print",
            vec![TypeRef::String],
            TypeRef::None,
            |args: &[Value]| {
                let text = args.first().and_then(Value::as_str).unwrap_or_default();
                info!(target: "dsl::print", "{}", text);
                Ok(Value::None)
            },
        ))
}

pub fn standard_registry() -> Result<Registry, TypeBuildError> {
    standard_declarations().build()
}
