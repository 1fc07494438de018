//! Search-criteria compiler.
//!
//! Criteria arrive as an untyped conjunction of `{ key: value | operators }`
//! clauses. They compile once into a small tagged sum and evaluate against a
//! uniform nested view of the entity pair. Both backends share this module,
//! so matching semantics cannot drift between them.
//!
//! Bare strings match with case-insensitive equality; substring search is
//! expressed with `$regex` (also case-insensitive).

use fieldbook_core::SyncLevel;
use fieldbook_domain::{EntityDoc, EntityPair, EntityType};
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// A compiled conjunction of clauses.
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
struct Clause {
    path: Vec<String>,
    matchers: Vec<Matcher>,
}

#[derive(Debug, Clone)]
enum Matcher {
    /// `$eq` and bare booleans: exact value equality.
    Eq(Value),
    /// Bare strings: case-insensitive equality.
    EqText(String),
    /// Bare numbers: exact numeric equality.
    EqNumber(f64),
    /// `$gt` / `$gte` / `$lt` / `$lte`.
    Cmp(CmpOp, f64),
    /// `$regex`, case-insensitive, string targets only.
    Regex(Regex),
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl SearchCriteria {
    /// Compile raw criteria. Unsupported shapes surface as
    /// `StorageError::Serialization`.
    pub fn compile(criteria: &Value) -> StorageResult<Self> {
        let map = criteria
            .as_object()
            .ok_or_else(|| StorageError::serialization("criteria must be an object"))?;

        let mut clauses = Vec::with_capacity(map.len());
        for (key, spec) in map {
            clauses.push(Clause {
                path: key.split('.').map(str::to_string).collect(),
                matchers: compile_matchers(key, spec)?,
            });
        }
        Ok(Self { clauses })
    }

    /// A pair matches when either side satisfies every clause.
    pub fn matches(&self, pair: &EntityPair) -> bool {
        self.doc_matches(&pair.initial) || self.doc_matches(&pair.modified)
    }

    fn doc_matches(&self, doc: &EntityDoc) -> bool {
        self.clauses.iter().all(|clause| clause.matches(doc))
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

fn compile_matchers(key: &str, spec: &Value) -> StorageResult<Vec<Matcher>> {
    match spec {
        Value::Object(ops) => {
            let mut matchers = Vec::with_capacity(ops.len());
            for (op, operand) in ops {
                matchers.push(compile_operator(key, op, operand)?);
            }
            if matchers.is_empty() {
                return Err(StorageError::serialization(format!(
                    "clause '{key}' has no operators"
                )));
            }
            Ok(matchers)
        }
        Value::String(s) => Ok(vec![Matcher::EqText(s.to_lowercase())]),
        Value::Number(n) => {
            let n = n.as_f64().ok_or_else(|| {
                StorageError::serialization(format!("clause '{key}': non-finite number"))
            })?;
            Ok(vec![Matcher::EqNumber(n)])
        }
        Value::Bool(_) => Ok(vec![Matcher::Eq(spec.clone())]),
        _ => Err(StorageError::serialization(format!(
            "clause '{key}': unsupported operand type"
        ))),
    }
}

fn compile_operator(key: &str, op: &str, operand: &Value) -> StorageResult<Matcher> {
    let numeric = |operand: &Value| {
        operand.as_f64().ok_or_else(|| {
            StorageError::serialization(format!("clause '{key}': {op} requires a number"))
        })
    };

    match op {
        "$eq" => Ok(Matcher::Eq(operand.clone())),
        "$gt" => Ok(Matcher::Cmp(CmpOp::Gt, numeric(operand)?)),
        "$gte" => Ok(Matcher::Cmp(CmpOp::Gte, numeric(operand)?)),
        "$lt" => Ok(Matcher::Cmp(CmpOp::Lt, numeric(operand)?)),
        "$lte" => Ok(Matcher::Cmp(CmpOp::Lte, numeric(operand)?)),
        "$regex" => {
            let pattern = operand.as_str().ok_or_else(|| {
                StorageError::serialization(format!("clause '{key}': $regex requires a string"))
            })?;
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    StorageError::serialization(format!("clause '{key}': bad regex: {e}"))
                })?;
            Ok(Matcher::Regex(regex))
        }
        other => Err(StorageError::serialization(format!(
            "clause '{key}': unsupported operator '{other}'"
        ))),
    }
}

impl Clause {
    /// A clause matches when any resolved candidate satisfies all matchers.
    fn matches(&self, doc: &EntityDoc) -> bool {
        let candidates = resolve_candidates(doc, &self.path);
        candidates
            .iter()
            .any(|value| self.matchers.iter().all(|m| m.matches(value)))
    }
}

/// Candidate values for a path: the doc's own fields, the same path under
/// `data`, and (for single-segment paths) every occurrence of the key
/// anywhere in the `data` subtree.
fn resolve_candidates(doc: &EntityDoc, path: &[String]) -> Vec<Value> {
    let mut candidates = Vec::new();

    if path.len() == 1 {
        if let Some(own) = own_field(doc, &path[0]) {
            candidates.push(own);
        }
    }

    if let Some(direct) = walk(&doc.data, path) {
        candidates.push(direct.clone());
    }

    if path.len() == 1 {
        collect_deep(&doc.data, &path[0], &mut candidates);
    }

    candidates
}

fn own_field(doc: &EntityDoc, key: &str) -> Option<Value> {
    match key {
        "id" => Some(Value::String(doc.id.as_str().to_string())),
        "guid" => Some(Value::String(doc.guid.as_str().to_string())),
        "type" => Some(Value::String(type_name(doc.entity_type).to_string())),
        "version" => Some(Value::from(doc.version)),
        "lastUpdated" => Some(Value::String(doc.last_updated.clone())),
        "externalId" => doc.external_id.clone().map(Value::String),
        "syncLevel" => Some(Value::String(sync_level_name(doc.sync_level).to_string())),
        _ => None,
    }
}

fn type_name(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Individual => "individual",
        EntityType::Group => "group",
    }
}

fn sync_level_name(level: SyncLevel) -> &'static str {
    level.as_str()
}

fn walk<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

fn collect_deep(value: &Value, key: &str, out: &mut Vec<Value>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    out.push(v.clone());
                }
                collect_deep(v, key, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_deep(item, key, out);
            }
        }
        _ => {}
    }
}

impl Matcher {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Matcher::Eq(expected) => value == expected,
            Matcher::EqText(expected) => value
                .as_str()
                .is_some_and(|s| s.to_lowercase() == *expected),
            Matcher::EqNumber(expected) => value.as_f64().is_some_and(|n| n == *expected),
            Matcher::Cmp(op, bound) => value.as_f64().is_some_and(|n| match op {
                CmpOp::Gt => n > *bound,
                CmpOp::Gte => n >= *bound,
                CmpOp::Lt => n < *bound,
                CmpOp::Lte => n <= *bound,
            }),
            Matcher::Regex(regex) => value.as_str().is_some_and(|s| regex.is_match(s)),
        }
    }
}
