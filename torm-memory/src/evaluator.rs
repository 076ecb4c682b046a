//! Server-side query evaluation for the in-memory transport.
//!
//! This plays the part of a forgiving server: values that cannot be compared simply do not
//! match, and sorting never fails. Strict evaluation happens again on the client.

use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap};

use torm_core::{
    document::Document,
    query::{FilterClause, Operator, Sort, SortOrder},
};

/// Comparable view of a JSON value. Integers and floats are normalized to f64.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(value) => Comparable::Bool(*value),
            Value::Number(number) => number.as_f64().map_or(Comparable::Null, Comparable::Number),
            Value::String(value) => Comparable::String(value),
            Value::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Value::Object(map) => Comparable::Map(
                map.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// True if every clause matches.
    pub fn matches_all(&self, clauses: &[FilterClause]) -> bool {
        clauses.iter().all(|clause| self.evaluate(clause))
    }

    pub fn evaluate(&self, clause: &FilterClause) -> bool {
        let field_value = self
            .document
            .get(&clause.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);
        let value = Comparable::from(&clause.value);

        match clause.operator {
            Operator::Eq => field_value == value,
            Operator::Ne => field_value != value,
            Operator::Gt => field_value.partial_cmp(&value) == Some(Ordering::Greater),
            Operator::Gte => matches!(field_value.partial_cmp(&value), Some(Ordering::Greater | Ordering::Equal)),
            Operator::Lt => field_value.partial_cmp(&value) == Some(Ordering::Less),
            Operator::Lte => matches!(field_value.partial_cmp(&value), Some(Ordering::Less | Ordering::Equal)),
            Operator::Contains => self.contains(&clause.field, &clause.value),
            Operator::In => Self::is_member(&field_value, &value),
            Operator::NotIn => !Self::is_member(&field_value, &value),
        }
    }

    /// Text containment over the field rendered as the client renders it. A non-string needle
    /// matches everything and is left for the client to reject.
    fn contains(&self, field: &str, needle: &Value) -> bool {
        let Value::String(needle) = needle else {
            return true;
        };

        match self.document.get(field).unwrap_or(&Value::Null) {
            Value::String(text) => text.contains(needle.as_str()),
            other => other.to_string().contains(needle.as_str()),
        }
    }

    fn is_member(field_value: &Comparable<'_>, values: &Comparable<'_>) -> bool {
        match (field_value, values) {
            (single_value, Comparable::Array(values)) => values.iter().any(|val| val == single_value),
            (Comparable::String(key), Comparable::Map(map)) => map.contains_key(key),
            _ => false,
        }
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        clauses: &[FilterClause],
    ) -> Vec<Document> {
        documents
            .into_iter()
            .filter(|doc| DocumentEvaluator::new(doc).matches_all(clauses))
            .cloned()
            .collect()
    }
}

/// Sorts by one field; incomparable pairs keep their relative order.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Sort) {
    documents.sort_by(|a, b| {
        let left = a.get(&sort.field).map(Comparable::from).unwrap_or(Comparable::Null);
        let right = b.get(&sort.field).map(Comparable::from).unwrap_or(Comparable::Null);

        match sort.order {
            SortOrder::Asc => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
            SortOrder::Desc => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
        }
    });
}
