//! Query construction and client-side evaluation.
//!
//! A [`Query`] is an ordered list of [`FilterClause`]s (all of which must match), an optional
//! [`Sort`], and optional `limit`/`skip` values. It serializes directly into the body of the
//! server's query endpoint, omitting empty parts:
//!
//! ```json
//! { "filters": [{ "field": "age", "operator": "gte", "value": 25 }],
//!   "sort": { "field": "age", "order": "asc" },
//!   "limit": 10 }
//! ```
//!
//! The server's answer is not trusted for filtering: [`Query::apply_local`] re-evaluates every
//! clause and the sort on the returned documents. `limit` and `skip` are only sent to the server.
//!
//! # Query Building
//!
//! ```ignore
//! use torm::query::{Query, Operator, SortOrder};
//!
//! let query = Query::builder()
//!     .filter("age", Operator::Gte, 18)
//!     .where_eq("active", true)
//!     .sort("name", SortOrder::Asc)
//!     .limit(10)
//!     .build();
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::{cmp::Ordering, fmt, str::FromStr};

use crate::{
    document::{Document, kind_name},
    error::{TormError, TormResult},
};

static NULL: Value = Value::Null;
static EMPTY_SORT_KEY: Value = Value::String(String::new());

/// Comparison operators for filter clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal to.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// The field, rendered as text, contains the filter string.
    Contains,
    /// The field is a member of the filter list (or a key of the filter map).
    In,
    /// The field is not a member of the filter list (or a key of the filter map).
    NotIn,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Contains => "contains",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = TormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Operator::Eq),
            "ne" => Ok(Operator::Ne),
            "gt" => Ok(Operator::Gt),
            "gte" => Ok(Operator::Gte),
            "lt" => Ok(Operator::Lt),
            "lte" => Ok(Operator::Lte),
            "contains" => Ok(Operator::Contains),
            "in" => Ok(Operator::In),
            "not_in" => Ok(Operator::NotIn),
            other => Err(TormError::TypeMismatch(format!("unknown operator '{other}'"))),
        }
    }
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending order (A to Z, 0 to 9).
    #[default]
    Asc,
    /// Descending order (Z to A, 9 to 0).
    Desc,
}

/// A single sort field and its direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// A single `(field, operator, value)` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl FilterClause {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self { field: field.into(), operator, value: value.into() }
    }

    /// Evaluates this clause against a document. Absent fields read as `null`.
    ///
    /// # Errors
    ///
    /// See [`matches`].
    pub fn matches(&self, document: &Document) -> TormResult<bool> {
        matches(document.get(&self.field).unwrap_or(&NULL), self.operator, &self.value)
    }
}

/// Helper for constructing filter clauses.
///
/// ```ignore
/// let clause = Filter::gte("age", 18);
/// ```
pub struct Filter;

impl Filter {
    /// Matches documents whose field equals `value`.
    ///
    /// Numbers compare by value, so `30` and `30.0` are equal.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> FilterClause {
        FilterClause::new(field, Operator::Eq, value)
    }

    /// Matches documents whose field differs from `value`.
    ///
    /// A missing field reads as `null`.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> FilterClause {
        FilterClause::new(field, Operator::Ne, value)
    }

    /// Matches documents whose field is greater than `value`.
    ///
    /// Only numbers with numbers and strings with strings are comparable.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> FilterClause {
        FilterClause::new(field, Operator::Gt, value)
    }

    /// Matches documents whose field is greater than or equal to `value`.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> FilterClause {
        FilterClause::new(field, Operator::Gte, value)
    }

    /// Matches documents whose field is less than `value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> FilterClause {
        FilterClause::new(field, Operator::Lt, value)
    }

    /// Matches documents whose field is less than or equal to `value`.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> FilterClause {
        FilterClause::new(field, Operator::Lte, value)
    }

    /// Matches documents whose field contains the string `value`.
    ///
    /// Non-string fields are matched against their JSON text.
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> FilterClause {
        FilterClause::new(field, Operator::Contains, value)
    }

    /// Matches documents whose field is one of `value`.
    ///
    /// `value` is a list of candidates or a map whose keys are the candidates.
    pub fn is_in(field: impl Into<String>, value: impl Into<Value>) -> FilterClause {
        FilterClause::new(field, Operator::In, value)
    }

    /// Matches documents whose field is not one of `value`.
    pub fn not_in(field: impl Into<String>, value: impl Into<Value>) -> FilterClause {
        FilterClause::new(field, Operator::NotIn, value)
    }
}

/// A structured query, serializable as the query endpoint's request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Clauses that must all match, evaluated in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    /// Maximum number of documents the server should return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Number of documents the server should skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
}

impl Query {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Returns true if every clause matches the document.
    ///
    /// # Errors
    ///
    /// Propagates the first operator error; see [`matches`].
    pub fn matches(&self, document: &Document) -> TormResult<bool> {
        for clause in &self.filters {
            if !clause.matches(document)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Re-applies the filters and sort of this query to documents returned by a server.
    ///
    /// `limit` and `skip` are deliberately not applied.
    ///
    /// # Errors
    ///
    /// Returns an error if any clause cannot be evaluated against a document.
    pub fn apply_local(&self, documents: Vec<Document>) -> TormResult<Vec<Document>> {
        let mut kept = Vec::with_capacity(documents.len());
        for document in documents {
            if self.matches(&document)? {
                kept.push(document);
            }
        }

        if let Some(sort) = &self.sort {
            sort_documents(&mut kept, sort);
        }

        Ok(kept)
    }
}

/// Fluent builder for [`Query`]. Filters accumulate; sort, limit and skip overwrite.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Adds a filter clause.
    pub fn filter(self, field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        self.clause(FilterClause::new(field, operator, value))
    }

    /// Adds an equality clause.
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Operator::Eq, value)
    }

    /// Adds a prebuilt clause, e.g. one made with [`Filter`].
    pub fn clause(mut self, clause: FilterClause) -> Self {
        self.query.filters.push(clause);
        self
    }

    /// Sets the sort field and direction, replacing any previous sort.
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.query.sort = Some(Sort { field: field.into(), order });
        self
    }

    /// Sets the maximum number of documents the server should return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents the server should skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = Some(skip);
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

/// Evaluates `doc_value <operator> filter_value`.
///
/// - `eq`/`ne`: structural equality; integers and floats compare numerically.
/// - `gt`/`gte`/`lt`/`lte`: numbers with numbers, strings with strings.
/// - `contains`: the filter value must be a string; the document value is rendered as text.
/// - `in`/`not_in`: the filter value must be a list (element equality) or a map (key lookup).
///
/// # Errors
///
/// [`TormError::Comparison`] for ordered comparisons of incompatible kinds and
/// [`TormError::TypeMismatch`] for `contains`/`in`/`not_in` with an unusable filter value.
pub fn matches(doc_value: &Value, operator: Operator, filter_value: &Value) -> TormResult<bool> {
    match operator {
        Operator::Eq => Ok(values_equal(doc_value, filter_value)),
        Operator::Ne => Ok(!values_equal(doc_value, filter_value)),
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            let ordering = compare_ordered(doc_value, filter_value).ok_or_else(|| {
                TormError::Comparison(format!(
                    "cannot compare {} with {} using '{}'",
                    kind_name(doc_value),
                    kind_name(filter_value),
                    operator
                ))
            })?;

            Ok(match operator {
                Operator::Gt => ordering == Ordering::Greater,
                Operator::Gte => ordering != Ordering::Less,
                Operator::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
        Operator::Contains => {
            let Value::String(needle) = filter_value else {
                return Err(TormError::TypeMismatch(format!(
                    "'contains' requires a string filter value, found {}",
                    kind_name(filter_value)
                )));
            };

            Ok(match doc_value {
                Value::String(text) => text.contains(needle.as_str()),
                other => other.to_string().contains(needle.as_str()),
            })
        }
        Operator::In => is_member(doc_value, filter_value),
        Operator::NotIn => is_member(doc_value, filter_value).map(|found| !found),
    }
}

fn is_member(doc_value: &Value, container: &Value) -> TormResult<bool> {
    match container {
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(doc_value, item))),
        Value::Object(map) => Ok(doc_value.as_str().is_some_and(|key| map.contains_key(key))),
        other => Err(TormError::TypeMismatch(format!(
            "'in' requires a list or map filter value, found {}",
            kind_name(other)
        ))),
    }
}

/// Structural equality with numeric comparison across integer and float representations.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| values_equal(l, r)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    match (x.as_i64(), y.as_i64(), x.as_u64(), y.as_u64()) {
        (Some(l), Some(r), _, _) => l == r,
        (_, _, Some(l), Some(r)) => l == r,
        _ => x.as_f64() == y.as_f64(),
    }
}

/// Orders numbers with numbers and strings with strings; anything else is incomparable.
fn compare_ordered(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for local sorting: same-kind values compare naturally, different kinds
/// compare by kind rank (null < boolean < number < string < list < map).
fn compare_sort_keys(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
            compare_ordered(a, b).unwrap_or(Ordering::Equal)
        }
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// Stable sort by a single field. Documents missing the field sort as the empty string.
pub fn sort_documents(documents: &mut [Document], sort: &Sort) {
    fn sort_key<'a>(document: &'a Document, field: &str) -> &'a Value {
        document.get(field).unwrap_or(&EMPTY_SORT_KEY)
    }

    documents.sort_by(|a, b| {
        let ordering = compare_sort_keys(sort_key(a, &sort.field), sort_key(b, &sort.field));
        match sort.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn ages(documents: &[Document]) -> Vec<i64> {
        documents
            .iter()
            .map(|d| d.get("age").and_then(Value::as_i64).unwrap())
            .collect()
    }

    #[test]
    fn wire_query_omits_empty_parts() {
        assert_eq!(serde_json::to_value(Query::new()).unwrap(), json!({}));

        let query = Query::builder()
            .filter("age", Operator::Gte, 18)
            .where_eq("active", true)
            .sort("name", SortOrder::Desc)
            .limit(10)
            .build();
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "filters": [
                    {"field": "age", "operator": "gte", "value": 18},
                    {"field": "active", "operator": "eq", "value": true}
                ],
                "sort": {"field": "name", "order": "desc"},
                "limit": 10
            })
        );
    }

    #[test]
    fn later_sort_limit_and_skip_overwrite() {
        let query = Query::builder()
            .sort("a", SortOrder::Asc)
            .sort("b", SortOrder::Desc)
            .limit(5)
            .limit(2)
            .skip(1)
            .skip(3)
            .build();
        assert_eq!(query.sort, Some(Sort { field: "b".into(), order: SortOrder::Desc }));
        assert_eq!(query.limit, Some(2));
        assert_eq!(query.skip, Some(3));
    }

    #[test]
    fn not_in_serializes_in_snake_case() {
        let clause = Filter::not_in("role", json!(["admin"]));
        assert_eq!(serde_json::to_value(&clause).unwrap()["operator"], json!("not_in"));
        assert_eq!("not_in".parse::<Operator>().unwrap(), Operator::NotIn);
        assert!("between".parse::<Operator>().is_err());
    }

    #[test]
    fn equality_laws() {
        let values = [
            json!(null),
            json!(1),
            json!(1.0),
            json!(2),
            json!("1"),
            json!(true),
            json!([1, 2]),
            json!([1.0, 2]),
            json!({"a": 1}),
        ];

        for a in &values {
            for b in &values {
                let eq = matches(a, Operator::Eq, b).unwrap();
                assert_eq!(eq, values_equal(a, b));
                assert_eq!(matches(a, Operator::Ne, b).unwrap(), !eq);
            }
        }

        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!([1.0, 2]), &json!([1, 2])));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn in_and_not_in_are_complements() {
        let containers = [json!([1, "a", null]), json!({"a": 1}), json!([])];
        let values = [json!(1), json!(1.0), json!("a"), json!(null), json!(2)];

        for container in &containers {
            for value in &values {
                let found = matches(value, Operator::In, container).unwrap();
                assert_eq!(matches(value, Operator::NotIn, container).unwrap(), !found);
            }
        }

        assert!(matches(&json!("a"), Operator::In, &json!({"a": 1})).unwrap());
        assert!(!matches(&json!(2), Operator::In, &json!([1, "a"])).unwrap());
    }

    #[test]
    fn membership_requires_a_container() {
        for operator in [Operator::In, Operator::NotIn] {
            let err = matches(&json!(1), operator, &json!(5)).unwrap_err();
            assert!(matches!(err, TormError::TypeMismatch(_)));
        }
    }

    #[test]
    fn ordered_comparisons() {
        assert!(matches(&json!(30), Operator::Gt, &json!(25)).unwrap());
        assert!(matches(&json!(25), Operator::Gte, &json!(25.0)).unwrap());
        assert!(matches(&json!(2.5), Operator::Lt, &json!(3)).unwrap());
        assert!(matches(&json!("apple"), Operator::Lte, &json!("banana")).unwrap());
        assert!(!matches(&json!("b"), Operator::Lt, &json!("a")).unwrap());
    }

    #[test]
    fn ordered_comparison_of_incompatible_kinds_fails() {
        for (a, b) in [
            (json!("30"), json!(25)),
            (json!(null), json!(25)),
            (json!(true), json!(false)),
            (json!([1]), json!([0])),
        ] {
            let err = matches(&a, Operator::Gt, &b).unwrap_err();
            assert!(matches!(err, TormError::Comparison(_)), "{a} > {b}");
        }
    }

    #[test]
    fn contains_coerces_the_document_value() {
        assert!(matches(&json!("Alice Smith"), Operator::Contains, &json!("Smith")).unwrap());
        assert!(matches(&json!(12345), Operator::Contains, &json!("234")).unwrap());
        assert!(matches(&json!(["x", "y"]), Operator::Contains, &json!("\"y\"")).unwrap());
        assert!(matches(&json!(null), Operator::Contains, &json!("nul")).unwrap());
        assert!(!matches(&json!("Alice"), Operator::Contains, &json!("alice")).unwrap());

        let err = matches(&json!("abc"), Operator::Contains, &json!(1)).unwrap_err();
        assert!(matches!(err, TormError::TypeMismatch(_)));
    }

    #[test]
    fn local_refilter_and_sort() {
        let documents = [30, 25, 35, 28]
            .into_iter()
            .map(|age| doc(json!({"age": age})))
            .collect::<Vec<_>>();

        let query = Query::builder()
            .filter("age", Operator::Gte, 25)
            .filter("age", Operator::Lte, 30)
            .sort("age", SortOrder::Asc)
            .build();

        assert_eq!(ages(&query.apply_local(documents.clone()).unwrap()), vec![25, 28, 30]);

        let unsorted = Query { sort: None, ..query.clone() };
        assert_eq!(ages(&unsorted.apply_local(documents.clone()).unwrap()), vec![30, 25, 28]);

        let descending = Query::builder().sort("age", SortOrder::Desc).build();
        assert_eq!(ages(&descending.apply_local(documents).unwrap()), vec![35, 30, 28, 25]);
    }

    #[test]
    fn local_refilter_ignores_limit_and_skip() {
        let documents = (0..5).map(|age| doc(json!({"age": age}))).collect::<Vec<_>>();
        let query = Query::builder().limit(2).skip(1).build();
        assert_eq!(query.apply_local(documents).unwrap().len(), 5);
    }

    #[test]
    fn sort_is_stable_and_tolerates_missing_fields() {
        let documents = vec![
            doc(json!({"id": "a", "name": "Bob"})),
            doc(json!({"id": "b"})),
            doc(json!({"id": "c", "name": "Alice"})),
            doc(json!({"id": "d", "name": "Bob"})),
            doc(json!({"id": "e", "name": ""})),
        ];
        let ids = |documents: &[Document]| -> Vec<String> {
            documents
                .iter()
                .map(|d| d["id"].as_str().unwrap().to_string())
                .collect()
        };

        let mut ascending = documents.clone();
        sort_documents(&mut ascending, &Sort { field: "name".into(), order: SortOrder::Asc });
        assert_eq!(ids(&ascending), vec!["b", "e", "c", "a", "d"]);

        let mut descending = documents;
        sort_documents(&mut descending, &Sort { field: "name".into(), order: SortOrder::Desc });
        assert_eq!(ids(&descending), vec!["a", "d", "c", "b", "e"]);
    }

    #[test]
    fn sort_orders_mixed_kinds_by_rank() {
        let mut documents = vec![
            doc(json!({"v": "text"})),
            doc(json!({"v": 3})),
            doc(json!({"v": null})),
            doc(json!({"v": true})),
            doc(json!({"v": 1.5})),
        ];
        sort_documents(&mut documents, &Sort { field: "v".into(), order: SortOrder::Asc });
        let values: Vec<_> = documents.iter().map(|d| d["v"].clone()).collect();
        assert_eq!(values, vec![json!(null), json!(true), json!(1.5), json!(3), json!("text")]);
    }

    #[test]
    fn refilter_errors_propagate() {
        let documents = vec![doc(json!({"age": 30})), doc(json!({"name": "no age"}))];
        let query = Query::builder().filter("age", Operator::Gt, 18).build();
        assert!(matches!(query.apply_local(documents), Err(TormError::Comparison(_))));
    }
}
