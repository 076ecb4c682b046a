//! Declarative schema validation for documents.
//!
//! A [`Schema`] maps field names to [`FieldRule`]s. Validation walks the fields in declared order
//! and stops at the first failure, reporting it as a [`ValidationError`]. Each field runs through
//! a fixed sequence of checks:
//!
//! 1. required (skipped for partial updates)
//! 2. declared type
//! 3. string rules: length, email, url, pattern
//! 4. numeric rules: min, max
//! 5. custom predicate
//!
//! Absent or null values that are not required skip every check after the first.
//!
//! # Example
//!
//! ```ignore
//! use torm::schema::{Schema, FieldRule};
//!
//! let schema = Schema::new()
//!     .field("name", FieldRule::string().required().min_length(3))
//!     .field("age", FieldRule::integer().min(13.0).max(120.0));
//!
//! schema.validate(&document, false)?;
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::{fmt, str::FromStr, sync::Arc};

pub use regex::Regex;

use crate::{
    document::Document,
    error::{TormError, TormResult, ValidationError, ValidationErrorKind},
};

/// Runtime kinds a field can be declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    /// Any number. Integers satisfy a float rule.
    Float,
    Boolean,
    List,
    Map,
}

impl FieldType {
    /// Returns true if the value's kind satisfies this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::Float, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::List, Value::Array(_)) => true,
            (FieldType::Map, Value::Object(_)) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
            FieldType::Map => "map",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = TormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" | "str" => Ok(FieldType::String),
            "integer" | "int" => Ok(FieldType::Integer),
            "float" | "number" => Ok(FieldType::Float),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "list" | "array" | "slice" => Ok(FieldType::List),
            "map" | "dict" | "object" => Ok(FieldType::Map),
            other => Err(TormError::InvalidSchema(format!("unknown field type '{other}'"))),
        }
    }
}

/// A predicate attached to a field rule. Returning `false` rejects the value.
pub type CustomValidator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Validation rules for a single field.
///
/// Rules are built fluently; every rule is optional.
#[derive(Clone, Default)]
pub struct FieldRule {
    pub field_type: Option<FieldType>,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
    pub email: bool,
    pub url: bool,
    pub custom: Option<CustomValidator>,
}

impl FieldRule {
    /// Creates a rule with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a rule declaring the given type.
    pub fn typed(field_type: FieldType) -> Self {
        Self { field_type: Some(field_type), ..Self::default() }
    }

    /// Creates a rule for a string.
    pub fn string() -> Self {
        Self::typed(FieldType::String)
    }

    /// Creates a rule for an integer.
    pub fn integer() -> Self {
        Self::typed(FieldType::Integer)
    }

    /// Creates a rule for a number; integers are accepted.
    pub fn float() -> Self {
        Self::typed(FieldType::Float)
    }

    /// Creates a rule for a boolean.
    pub fn boolean() -> Self {
        Self::typed(FieldType::Boolean)
    }

    /// Creates a rule for a JSON array.
    pub fn list() -> Self {
        Self::typed(FieldType::List)
    }

    /// Creates a rule for a JSON object.
    pub fn map() -> Self {
        Self::typed(FieldType::Map)
    }

    /// Marks the field as required on full (non-partial) validation.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Inclusive lower bound for numeric values.
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Inclusive upper bound for numeric values.
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Inclusive lower bound on string length, in characters.
    pub fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    /// Inclusive upper bound on string length, in characters.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Requires string values to match `pattern` starting at their first character.
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Requires string values to look like an email address.
    pub fn email(mut self) -> Self {
        self.email = true;
        self
    }

    /// Requires string values to be `http://` or `https://` URLs.
    pub fn url(mut self) -> Self {
        self.url = true;
        self
    }

    /// Attaches a custom predicate, run after every built-in rule.
    pub fn custom<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRule")
            .field("field_type", &self.field_type)
            .field("required", &self.required)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("email", &self.email)
            .field("url", &self.url)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// Rule keys understood when parsing a schema from JSON. Anything else is ignored.
#[derive(Deserialize, Default)]
#[serde(default)]
struct RawRule {
    #[serde(rename = "type")]
    field_type: Option<String>,
    required: bool,
    min: Option<f64>,
    max: Option<f64>,
    #[serde(alias = "minLength")]
    min_length: Option<usize>,
    #[serde(alias = "maxLength")]
    max_length: Option<usize>,
    pattern: Option<String>,
    email: bool,
    url: bool,
}

impl TryFrom<RawRule> for FieldRule {
    type Error = TormError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let pattern = raw
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| TormError::InvalidSchema(e.to_string()))?;

        Ok(FieldRule {
            // Unknown type names are ignored rather than rejected.
            field_type: raw.field_type.as_deref().and_then(|t| t.parse().ok()),
            required: raw.required,
            min: raw.min,
            max: raw.max,
            min_length: raw.min_length,
            max_length: raw.max_length,
            pattern,
            email: raw.email,
            url: raw.url,
            custom: None,
        })
    }
}

/// An ordered mapping from field name to [`FieldRule`].
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldRule)>,
}

impl Schema {
    /// Creates an empty schema.
    ///
    /// An empty schema accepts every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field rule, replacing any existing rule for the same field in place.
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.insert(name, rule);
        self
    }

    /// Adds a field rule, replacing any existing rule for the same field in place.
    pub fn insert(&mut self, name: impl Into<String>, rule: FieldRule) {
        let name = name.into();

        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => *existing = rule,
            None => self.fields.push((name, rule)),
        }
    }

    /// Returns the rule declared for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, rule)| rule)
    }

    /// Iterates over the fields in declared order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    /// Returns the number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses a schema from a JSON object of rule objects.
    ///
    /// ```ignore
    /// let schema = Schema::from_json(&json!({
    ///     "name": { "type": "str", "required": true, "min_length": 3 },
    ///     "sku": { "type": "str", "pattern": "^[A-Z]{3}-\\d{5}$" }
    /// }))?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`TormError::InvalidSchema`] if the value is not an object of objects or a
    /// pattern does not compile.
    pub fn from_json(value: &Value) -> TormResult<Self> {
        let fields = value
            .as_object()
            .ok_or_else(|| TormError::InvalidSchema("schema must be a JSON object".to_string()))?;

        fields.iter().try_fold(Schema::new(), |schema, (name, rule)| {
            let raw = RawRule::deserialize(rule)
                .map_err(|e| TormError::InvalidSchema(format!("field '{name}': {e}")))?;

            Ok(schema.field(name.clone(), FieldRule::try_from(raw)?))
        })
    }

    /// Validates a document against this schema. See [`validate`].
    pub fn validate(&self, document: &Document, partial: bool) -> Result<(), ValidationError> {
        validate(self, document, partial)
    }
}

type Check = fn(&str, &Value, &FieldRule) -> Result<(), ValidationError>;

/// Checks applied to every present, non-null value, in order.
const CHECKS: [Check; 4] = [check_type, check_string_rules, check_numeric_rules, check_custom];

/// Validates `document` against `schema`, reporting the first failing field.
///
/// With `partial` set, required fields may be omitted (used for updates).
pub fn validate(schema: &Schema, document: &Document, partial: bool) -> Result<(), ValidationError> {
    for (field, rule) in schema.fields() {
        let value = match document.get(field) {
            Some(Value::Null) | None => {
                if rule.required && !partial {
                    return Err(ValidationError::new(field, ValidationErrorKind::MissingField));
                }
                continue;
            }
            Some(value) => value,
        };

        for check in CHECKS {
            check(field, value, rule)?;
        }
    }

    Ok(())
}

fn check_type(field: &str, value: &Value, rule: &FieldRule) -> Result<(), ValidationError> {
    match rule.field_type {
        Some(field_type) if !field_type.accepts(value) => Err(ValidationError::new(
            field,
            ValidationErrorKind::TypeMismatch { expected: field_type.to_string() },
        )),
        _ => Ok(()),
    }
}

fn check_string_rules(field: &str, value: &Value, rule: &FieldRule) -> Result<(), ValidationError> {
    let Value::String(text) = value else {
        return Ok(());
    };

    let length = text.chars().count();
    let too_short = rule.min_length.is_some_and(|min| length < min);
    let too_long = rule.max_length.is_some_and(|max| length > max);
    if too_short || too_long {
        return Err(ValidationError::new(
            field,
            ValidationErrorKind::LengthOutOfRange {
                min: rule.min_length,
                max: rule.max_length,
                actual: length,
            },
        ));
    }

    if rule.email && !is_email(text) {
        return Err(ValidationError::new(
            field,
            ValidationErrorKind::InvalidFormat { format: "email".to_string() },
        ));
    }

    if rule.url && !is_url(text) {
        return Err(ValidationError::new(
            field,
            ValidationErrorKind::InvalidFormat { format: "URL".to_string() },
        ));
    }

    if let Some(pattern) = &rule.pattern {
        if !matches_from_start(pattern, text) {
            return Err(ValidationError::new(
                field,
                ValidationErrorKind::PatternMismatch { pattern: pattern.as_str().to_string() },
            ));
        }
    }

    Ok(())
}

fn check_numeric_rules(field: &str, value: &Value, rule: &FieldRule) -> Result<(), ValidationError> {
    let Some(number) = value.as_f64() else {
        return Ok(());
    };

    let below = rule.min.is_some_and(|min| number < min);
    let above = rule.max.is_some_and(|max| number > max);
    if below || above {
        return Err(ValidationError::new(
            field,
            ValidationErrorKind::RangeViolation { min: rule.min, max: rule.max, actual: number },
        ));
    }

    Ok(())
}

fn check_custom(field: &str, value: &Value, rule: &FieldRule) -> Result<(), ValidationError> {
    match &rule.custom {
        Some(predicate) if !predicate(value) => {
            Err(ValidationError::new(field, ValidationErrorKind::CustomValidationFailed))
        }
        _ => Ok(()),
    }
}

/// True if `value` has the shape `local@domain.tld`: exactly one `@`, no whitespace, a non-empty
/// local part and a domain containing a `.` with text on both sides.
pub fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain
            .char_indices()
            .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// True if `value` starts with `http://` or `https://` followed by at least one character.
pub fn is_url(value: &str) -> bool {
    value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c != '\n')
}

/// True if the pattern matches at offset 0 (the match need not span the whole string).
fn matches_from_start(pattern: &Regex, text: &str) -> bool {
    pattern.find(text).is_some_and(|m| m.start() == 0)
}
