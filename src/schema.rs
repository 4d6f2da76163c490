//! Request facet schemas.
//!
//! A [`Schema`] takes the raw JSON value of one facet and either returns the
//! value downstream code should see (possibly coerced) or the list of
//! [`Issue`]s explaining why it was refused.
//!
//! Two implementations ship with the crate:
//!
//! - [`JsonSchema`]: standard JSON Schema, compiled once at startup.
//! - [`from_fn`]: any closure, for validation JSON Schema cannot express.
//!
//! [`Schemas`] groups up to one schema per facet for one HTTP method and is
//! what [`Route::schema`](crate::Route::schema) factories return:
//!
//! ```rust
//! use serde_json::json;
//! use waypost::{Context, Facet, JsonSchema, Method, Request, Route, RouteError};
//!
//! fn route() -> Result<Route, RouteError> {
//!     Route::new()
//!         .on(Method::Post, |req: Request, _ctx: Context| async move {
//!             req.validated(Facet::Body).cloned().unwrap_or_default()
//!         })?
//!         .schema(Method::Post, |s| {
//!             Ok(s.body(JsonSchema::new(&json!({
//!                 "type": "object",
//!                 "properties": { "name": { "type": "string" } },
//!                 "required": ["name"]
//!             }))?))
//!         })
//! }
//! # route().unwrap();
//! ```

use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use serde::Serialize;
use serde_json::{Number, Value};

use crate::request::Facet;

/// One reason a facet was refused.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Issue {
    /// JSON pointer to the offending value, e.g. `/name`. Empty for the facet
    /// root.
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

/// A schema refused a value, or could not decide.
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    /// The value does not conform. Reported to the client as `400`.
    #[error("{} validation issue(s)", .0.len())]
    Issues(Vec<Issue>),

    /// The validator itself failed. Logged and reported as `500`.
    #[error("validator failed: {0}")]
    Internal(String),
}

impl From<Vec<Issue>> for ValidateError {
    fn from(issues: Vec<Issue>) -> Self {
        Self::Issues(issues)
    }
}

/// A schema definition was rejected at startup.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid JSON schema: {0}")]
    Invalid(String),
}

/// Validates (and may coerce) the value of one request facet.
pub trait Schema: Send + Sync + 'static {
    fn validate(&self, value: Value) -> Result<Value, ValidateError>;
}

// ── Schemas ───────────────────────────────────────────────────────────────────

/// The schemas declared for one HTTP method, at most one per [`Facet`].
#[derive(Clone, Default)]
pub struct Schemas {
    slots: [Option<Arc<dyn Schema>>; 4],
}

impl Schemas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(self, schema: impl Schema) -> Self {
        self.set(Facet::Body, schema)
    }

    pub fn query(self, schema: impl Schema) -> Self {
        self.set(Facet::Query, schema)
    }

    pub fn headers(self, schema: impl Schema) -> Self {
        self.set(Facet::Headers, schema)
    }

    pub fn params(self, schema: impl Schema) -> Self {
        self.set(Facet::Params, schema)
    }

    /// Declares `schema` for `facet`, replacing any earlier one.
    pub fn set(mut self, facet: Facet, schema: impl Schema) -> Self {
        self.slots[facet.index()] = Some(Arc::new(schema));
        self
    }

    pub fn get(&self, facet: Facet) -> Option<&dyn Schema> {
        self.slots[facet.index()].as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

// ── JsonSchema ────────────────────────────────────────────────────────────────

/// A compiled JSON Schema.
///
/// Query strings, headers and path parameters always arrive as strings.
/// [`JsonSchema::coercing`] converts string properties whose schema type is
/// `integer`, `number` or `boolean` before validating, so `?page=2` satisfies
/// `{"page": {"type": "integer"}}` and the handler sees the number `2`.
pub struct JsonSchema {
    validator: jsonschema::Validator,
    schema: Value,
    coerce: bool,
}

impl JsonSchema {
    pub fn new(schema: &Value) -> Result<Self, SchemaError> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| SchemaError::Invalid(e.to_string()))?;
        Ok(Self { validator, schema: schema.clone(), coerce: false })
    }

    /// Like [`JsonSchema::new`], with string → scalar coercion of top-level
    /// properties.
    pub fn coercing(schema: &Value) -> Result<Self, SchemaError> {
        Ok(Self { coerce: true, ..Self::new(schema)? })
    }
}

impl Schema for JsonSchema {
    fn validate(&self, value: Value) -> Result<Value, ValidateError> {
        let value = if self.coerce { coerce(&self.schema, value) } else { value };

        let issues: Vec<Issue> = self
            .validator
            .iter_errors(&value)
            .map(|err| {
                let mut path = err.instance_path.to_string();
                if let ValidationErrorKind::Required { property } = &err.kind {
                    if let Some(name) = property.as_str() {
                        path.push('/');
                        path.push_str(name);
                    }
                }
                Issue::new(path, err.to_string())
            })
            .collect();

        if issues.is_empty() { Ok(value) } else { Err(ValidateError::Issues(issues)) }
    }
}

fn coerce(schema: &Value, mut value: Value) -> Value {
    let Some(props) = schema.get("properties") else { return value };
    if let Some(map) = value.as_object_mut() {
        for (key, v) in map.iter_mut() {
            let Value::String(s) = v else { continue };
            let Some(ty) = props.get(key).and_then(|p| p.get("type")) else { continue };
            if let Some(coerced) = coerce_scalar(s, ty) {
                *v = coerced;
            }
        }
    }
    value
}

fn coerce_scalar(s: &str, ty: &Value) -> Option<Value> {
    let wants = |name: &str| match ty {
        Value::String(t) => t == name,
        Value::Array(ts) => ts.iter().any(|t| t == name),
        _ => false,
    };
    if wants("integer") {
        if let Ok(n) = s.parse::<i64>() {
            return Some(Value::from(n));
        }
    }
    if wants("number") {
        if let Some(n) = s.parse::<f64>().ok().and_then(Number::from_f64) {
            return Some(Value::Number(n));
        }
    }
    if wants("boolean") {
        match s {
            "true" => return Some(Value::Bool(true)),
            "false" => return Some(Value::Bool(false)),
            _ => {}
        }
    }
    None
}

// ── Closure schemas ───────────────────────────────────────────────────────────

/// Wraps a closure as a [`Schema`].
///
/// ```rust
/// use serde_json::Value;
/// use waypost::schema::{self, Issue};
///
/// let trimmed = schema::from_fn(|v: Value| match v {
///     Value::String(s) if !s.trim().is_empty() => Ok(Value::String(s.trim().to_owned())),
///     _ => Err(vec![Issue::new("", "expected a non-blank string")].into()),
/// });
/// # let _ = trimmed;
/// ```
pub fn from_fn<F>(f: F) -> FnSchema<F>
where
    F: Fn(Value) -> Result<Value, ValidateError> + Send + Sync + 'static,
{
    FnSchema(f)
}

/// A closure-backed [`Schema`]; see [`from_fn`].
pub struct FnSchema<F>(F);

impl<F> Schema for FnSchema<F>
where
    F: Fn(Value) -> Result<Value, ValidateError> + Send + Sync + 'static,
{
    fn validate(&self, value: Value) -> Result<Value, ValidateError> {
        (self.0)(value)
    }
}
