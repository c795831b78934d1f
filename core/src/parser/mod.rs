//! PEST-based parser for dungeon configuration files
//!
//! Produces the [`crate::ast`] tree with span information for error reporting.

use std::path::Path;

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use crate::ast::{BodyItem, Definition, Document, Expr, GraphDef, GraphStmt, Ident, ObjectDef, ParsedFile, Span};
use crate::graph::{EdgeKind, UnknownEdgeKind};

#[cfg(test)]
mod tests;

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "parser/dsl.pest"]
struct DslParser;

/* ===================== Error Types ===================== */

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{0}")]
    PestError(String, Option<Span>),
    #[error("{0}")]
    BuildError(String, Option<Span>),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::PestError(_, span) => *span,
            ParseError::BuildError(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::PestError(msg, _) => msg,
            ParseError::BuildError(msg, _) => msg,
        }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let span = match err.line_col {
            pest::error::LineColLocation::Pos((line, col)) => Some(Span {
                start: 0,
                end: 0,
                start_line: line.saturating_sub(1),
                start_col: col.saturating_sub(1),
                end_line: line.saturating_sub(1),
                end_col: col,
            }),
            pest::error::LineColLocation::Span((start_line, start_col), (end_line, end_col)) => {
                Some(Span {
                    start: 0,
                    end: 0,
                    start_line: start_line.saturating_sub(1),
                    start_col: start_col.saturating_sub(1),
                    end_line: end_line.saturating_sub(1),
                    end_col: end_col.saturating_sub(1),
                })
            }
        };
        ParseError::PestError(err.to_string(), span)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Span Helpers ===================== */

/// Convert a PEST pair's span to our Span type
fn pair_to_span(pair: &Pair<Rule>, source: &str) -> Span {
    let pest_span = pair.as_span();
    let start = pest_span.start();
    let end = pest_span.end();

    let (start_line, start_col) = offset_to_line_col(source, start);
    let (end_line, end_col) = offset_to_line_col(source, end);

    Span::new(start, end, start_line, start_col, end_line, end_col)
}

/// Convert byte offset to (line, column) - 0-indexed
fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 0;
    let mut col = 0;
    let mut current_offset = 0;

    for ch in source.chars() {
        if current_offset >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
        current_offset += ch.len_utf8();
    }

    (line, col)
}

/// Take the next inner pair or report which construct was cut short
fn next_pair<'i>(inner: &mut Pairs<'i, Rule>, what: &str, span: Span) -> ParseResult<Pair<'i, Rule>> {
    inner
        .next()
        .ok_or_else(|| ParseError::BuildError(format!("Missing {} in parse tree", what), Some(span)))
}

/* ===================== Public API ===================== */

/// Parse a source string into a document
pub fn parse_document(source: &str) -> ParseResult<Document> {
    let mut pairs = DslParser::parse(Rule::program, source)?;
    let program = pairs
        .next()
        .ok_or_else(|| ParseError::BuildError("Empty parse result".to_string(), None))?;
    let span = pair_to_span(&program, source);

    let mut definitions = Vec::new();
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::object_def => definitions.push(Definition::Object(build_object_def(pair, source)?)),
            Rule::graph_def => definitions.push(Definition::Graph(build_graph_def(pair, source)?)),
            Rule::EOI => {}
            other => {
                return Err(ParseError::BuildError(
                    format!("Unexpected program content: {:?}", other),
                    Some(pair_to_span(&pair, source)),
                ))
            }
        }
    }

    Ok(Document { definitions, span })
}

/// Parse the source of one file, keeping its path for locations
pub fn parse_file(path: impl AsRef<Path>, source: &str) -> ParseResult<ParsedFile> {
    let document = parse_document(source)?;
    Ok(ParsedFile::new(path.as_ref(), document))
}

/// Parse a single expression (testing API)
pub fn parse_expression(source: &str) -> ParseResult<Expr> {
    let mut pairs = DslParser::parse(Rule::expression, source)?;
    let pair = pairs
        .next()
        .ok_or_else(|| ParseError::BuildError("Empty parse result".to_string(), None))?;
    build_expression(pair, source)
}

/* ===================== AST Builder ===================== */

fn build_ident(pair: Pair<Rule>, source: &str) -> Ident {
    Ident::new(pair.as_str(), pair_to_span(&pair, source))
}

fn build_object_def(pair: Pair<Rule>, source: &str) -> ParseResult<ObjectDef> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let type_name = build_ident(next_pair(&mut inner, "type name", span)?, source);
    let name = build_ident(next_pair(&mut inner, "definition name", span)?, source);
    let body = build_body(next_pair(&mut inner, "definition body", span)?, source)?;

    Ok(ObjectDef {
        type_name,
        name,
        body,
        span,
    })
}

fn build_graph_def(pair: Pair<Rule>, source: &str) -> ParseResult<GraphDef> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let name = build_ident(next_pair(&mut inner, "graph name", span)?, source);
    let statements = inner
        .map(|stmt| build_graph_stmt(stmt, source))
        .collect::<ParseResult<Vec<_>>>()?;

    Ok(GraphDef {
        name,
        statements,
        span,
    })
}

fn build_graph_stmt(pair: Pair<Rule>, source: &str) -> ParseResult<GraphStmt> {
    let span = pair_to_span(&pair, source);
    let mut groups = Vec::new();
    let mut kind = EdgeKind::default();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::task_group => groups.push(inner.into_inner().map(|id| build_ident(id, source)).collect()),
            Rule::edge_attr => {
                let attr_span = pair_to_span(&inner, source);
                let value = next_pair(&mut inner.into_inner(), "edge type", attr_span)?;
                let value_span = pair_to_span(&value, source);
                kind = value.as_str().parse().map_err(|err: UnknownEdgeKind| {
                    let expected: Vec<&str> = EdgeKind::ALL.iter().map(|k| k.short_name()).collect();
                    ParseError::BuildError(
                        format!("{} (expected one of {})", err, expected.join(", ")),
                        Some(value_span),
                    )
                })?;
            }
            rule => {
                return Err(ParseError::BuildError(
                    format!("Unexpected {:?} in graph statement", rule),
                    Some(span),
                ))
            }
        }
    }

    Ok(GraphStmt { groups, kind, span })
}

fn build_body(pair: Pair<Rule>, source: &str) -> ParseResult<Vec<BodyItem>> {
    pair.into_inner()
        .map(|item| build_body_item(item, source))
        .collect()
}

fn build_body_item(pair: Pair<Rule>, source: &str) -> ParseResult<BodyItem> {
    let span = pair_to_span(&pair, source);
    let rule = pair.as_rule();
    let mut inner = pair.into_inner();

    match rule {
        Rule::let_item => {
            let name = build_ident(next_pair(&mut inner, "binding name", span)?, source);
            let value = build_expression(next_pair(&mut inner, "binding value", span)?, source)?;
            Ok(BodyItem::Let { name, value, span })
        }
        Rule::named_item => {
            let name = build_ident(next_pair(&mut inner, "member name", span)?, source);
            let value = build_expression(next_pair(&mut inner, "member value", span)?, source)?;
            Ok(BodyItem::Named { name, value, span })
        }
        Rule::positional_item => {
            let value = build_expression(next_pair(&mut inner, "argument", span)?, source)?;
            Ok(BodyItem::Positional { value, span })
        }
        other => Err(ParseError::BuildError(
            format!("Unexpected body item: {:?}", other),
            Some(span),
        )),
    }
}

fn build_arguments(pair: Option<Pair<Rule>>, source: &str) -> ParseResult<Vec<Expr>> {
    match pair {
        Some(args) => args
            .into_inner()
            .map(|arg| build_expression(arg, source))
            .collect(),
        None => Ok(Vec::new()),
    }
}

/// Build an `expression` rule: a primary followed by member and method suffixes
fn build_expression(pair: Pair<Rule>, source: &str) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let mut expr = build_primary(next_pair(&mut inner, "primary expression", span)?, source)?;

    for suffix in inner {
        let suffix_span = pair_to_span(&suffix, source);
        let full_span = expr.span().merge(&suffix_span);
        let rule = suffix.as_rule();
        let mut suffix_inner = suffix.into_inner();
        let member = build_ident(next_pair(&mut suffix_inner, "member name", suffix_span)?, source);

        expr = match rule {
            Rule::member_suffix => Expr::Member {
                object: Box::new(expr),
                member,
                span: full_span,
            },
            Rule::method_suffix => Expr::MethodCall {
                receiver: Box::new(expr),
                method: member,
                args: build_arguments(suffix_inner.next(), source)?,
                span: full_span,
            },
            other => {
                return Err(ParseError::BuildError(
                    format!("Unexpected expression suffix: {:?}", other),
                    Some(suffix_span),
                ))
            }
        };
    }

    Ok(expr)
}

fn build_primary(pair: Pair<Rule>, source: &str) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, source);

    match pair.as_rule() {
        Rule::int => {
            let v = pair.as_str().parse::<i64>().map_err(|e| {
                ParseError::BuildError(format!("Invalid integer '{}': {}", pair.as_str(), e), Some(span))
            })?;
            Ok(Expr::LitInt { v, span })
        }
        Rule::float => {
            let v = pair.as_str().parse::<f64>().map_err(|e| {
                ParseError::BuildError(format!("Invalid float '{}': {}", pair.as_str(), e), Some(span))
            })?;
            Ok(Expr::LitFloat { v, span })
        }
        Rule::boolean => Ok(Expr::LitBool {
            v: pair.as_str() == "true",
            span,
        }),
        Rule::string => {
            let body = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Expr::LitStr {
                v: unescape(body),
                span,
            })
        }
        Rule::identifier => Ok(Expr::Ident {
            name: pair.as_str().to_string(),
            span,
        }),
        Rule::list_literal => {
            let elements = pair
                .into_inner()
                .map(|e| build_expression(e, source))
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Expr::List { elements, span })
        }
        Rule::map_literal => {
            let mut entries = Vec::new();
            for entry in pair.into_inner() {
                let entry_span = pair_to_span(&entry, source);
                let mut kv = entry.into_inner();
                let key = build_expression(next_pair(&mut kv, "map key", entry_span)?, source)?;
                let value = build_expression(next_pair(&mut kv, "map value", entry_span)?, source)?;
                entries.push((key, value));
            }
            Ok(Expr::Map { entries, span })
        }
        Rule::construct => {
            let mut inner = pair.into_inner();
            let type_name = build_ident(next_pair(&mut inner, "type name", span)?, source);
            let body = build_body(next_pair(&mut inner, "construction body", span)?, source)?;
            Ok(Expr::Construct {
                type_name,
                body,
                span,
            })
        }
        Rule::call => {
            let mut inner = pair.into_inner();
            let callee = build_ident(next_pair(&mut inner, "function name", span)?, source);
            let args = build_arguments(inner.next(), source)?;
            Ok(Expr::Call { callee, args, span })
        }
        Rule::expression => build_expression(pair, source),
        other => Err(ParseError::BuildError(
            format!("Unexpected expression: {:?}", other),
            Some(span),
        )),
    }
}

/// Resolve the escape sequences the grammar admits
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
