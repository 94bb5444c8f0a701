//! Value contracts for call inputs and outputs
//!
//! A [`Schema`] turns an untyped JSON value into a typed Rust value (or fails with
//! field-level issues), encodes typed values back into JSON, and reports whether it
//! stands for "no value" at all.

use std::{borrow::Cow, fmt, marker::PhantomData, sync::Arc};

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use serde_path_to_error::Segment;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub code: String,
    pub path: Vec<String>,
    pub message: String,
}

impl Issue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            path: Vec::new(),
            message: message.into(),
        }
    }

    /// Appends a field segment to the issue path.
    pub fn at(mut self, field: impl Into<String>) -> Self {
        self.path.push(field.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed with {} issue(s)", .issues.len())]
pub struct ValidationError {
    pub issues: Vec<Issue>,
}

impl ValidationError {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self { issues }
    }

    pub fn single(issue: Issue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    /// Builds a single issue located at the path where deserialization failed.
    /// A missing field is reported on the field itself, not on its parent.
    pub fn from_deserialize(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let mut path: Vec<String> = err
            .path()
            .iter()
            .filter_map(|segment| match segment {
                Segment::Seq { index } => Some(index.to_string()),
                Segment::Map { key } => Some(key.clone()),
                Segment::Enum { variant } => Some(variant.clone()),
                Segment::Unknown => None,
            })
            .collect();

        let message = err.into_inner().to_string();
        let code = if let Some(field) = missing_field(&message) {
            path.push(field.to_string());
            "invalid_type"
        } else if message.starts_with("unknown field") {
            "unrecognized_keys"
        } else {
            "invalid_type"
        };

        Self::single(Issue {
            code: code.to_string(),
            path,
            message,
        })
    }
}

fn missing_field(message: &str) -> Option<&str> {
    message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
}

/// Validation, encoding and voidness for one side of a call.
pub trait Schema: Send + Sync + 'static {
    type Value: Send + 'static;

    fn validate(&self, raw: Value) -> Result<Self::Value, ValidationError>;

    fn encode(&self, value: &Self::Value) -> Result<Value, serde_json::Error>;

    fn is_void(&self) -> bool {
        false
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self::Value>())
    }

    /// JSON Schema of the wire form, for document generators.
    fn json_schema(&self) -> Value;
}

/// The "no value" schema: no request body, or an empty `204` response.
#[derive(Debug, Clone, Copy, Default)]
pub struct Void;

impl Schema for Void {
    type Value = ();

    fn validate(&self, _raw: Value) -> Result<(), ValidationError> {
        Ok(())
    }

    fn encode(&self, _value: &()) -> Result<Value, serde_json::Error> {
        Ok(Value::Null)
    }

    fn is_void(&self) -> bool {
        true
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("void")
    }

    fn json_schema(&self) -> Value {
        json!({"type": "null"})
    }
}

type Check<T> = Arc<dyn Fn(&T) -> Vec<Issue> + Send + Sync>;

/// Serde-backed schema for any `T`, with optional refinement checks run after
/// deserialization succeeds.
pub struct Json<T> {
    checks: Vec<Check<T>>,
    _marker: PhantomData<fn() -> T>,
}

pub fn json<T>() -> Json<T> {
    Json::new()
}

impl<T> Json<T> {
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn check<F>(mut self, check: F) -> Self
    where
        F: Fn(&T) -> Vec<Issue> + Send + Sync + 'static,
    {
        self.checks.push(Arc::new(check));
        self
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Json<T> {
    fn clone(&self) -> Self {
        Self {
            checks: self.checks.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Json<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Json")
            .field("type", &std::any::type_name::<T>())
            .field("checks", &self.checks.len())
            .finish()
    }
}

impl<T> Schema for Json<T>
where
    T: Serialize + DeserializeOwned + JsonSchema + Send + 'static,
{
    type Value = T;

    fn validate(&self, raw: Value) -> Result<T, ValidationError> {
        let value: T =
            serde_path_to_error::deserialize(raw).map_err(ValidationError::from_deserialize)?;

        let issues: Vec<Issue> = self.checks.iter().flat_map(|check| check(&value)).collect();
        if !issues.is_empty() {
            return Err(ValidationError::new(issues));
        }

        Ok(value)
    }

    fn encode(&self, value: &T) -> Result<Value, serde_json::Error> {
        serde_json::to_value(value)
    }

    fn json_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
    }
}

/// RFC 3339 string on the wire, `DateTime<Utc>` in Rust.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoDateTime;

impl Schema for IsoDateTime {
    type Value = DateTime<Utc>;

    fn validate(&self, raw: Value) -> Result<DateTime<Utc>, ValidationError> {
        let Some(text) = raw.as_str() else {
            return Err(ValidationError::single(Issue::new(
                "invalid_type",
                "expected an ISO 8601 datetime string",
            )));
        };

        DateTime::parse_from_rfc3339(text)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|err| {
                ValidationError::single(Issue::new(
                    "invalid_string",
                    format!("invalid datetime: {err}"),
                ))
            })
    }

    fn encode(&self, value: &DateTime<Utc>) -> Result<Value, serde_json::Error> {
        Ok(Value::String(
            value.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        ))
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("datetime")
    }

    fn json_schema(&self) -> Value {
        json!({"type": "string", "format": "date-time"})
    }
}
