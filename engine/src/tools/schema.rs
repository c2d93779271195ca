//! Tool parameter schemas
//!
//! A tool's parameters are declared once, as a typed struct deriving
//! `Deserialize` and `JsonSchema`. [`ParamSchema::of`] renders that struct
//! into a Draft 7 JSON Schema, which is shown to the model and compiled into
//! a validator. The dispatcher validates raw parameters before the loop gate
//! and before any handler runs, reporting every offending field rather than
//! stopping at the first.

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, JSONSchema, ValidationError};
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use sdk::errors::EngineError;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Field name reported when the parameters are not a JSON object at all
pub const ROOT_FIELD: &str = "<root>";

/// Compiled parameter schema of one tool
#[derive(Clone)]
pub struct ParamSchema {
    schema: Value,
    validator: Arc<JSONSchema>,
    defaults: Vec<(String, Value)>,
}

impl ParamSchema {
    /// Schema derived from a typed parameter struct
    ///
    /// Parameter structs use `#[serde(deny_unknown_fields)]` so undeclared
    /// fields are reported, and `#[serde(default = ...)]` for defaults.
    pub fn of<T: JsonSchema>() -> Result<Self, EngineError> {
        let root = SchemaSettings::draft07()
            .with(|s| {
                s.inline_subschemas = true;
                s.meta_schema = None;
            })
            .into_generator()
            .into_root_schema_for::<T>();

        let mut schema = serde_json::to_value(root).map_err(|e| {
            EngineError::Schema(format!("{}: {}", std::any::type_name::<T>(), e))
        })?;
        if let Value::Object(obj) = &mut schema {
            obj.remove("title");
        }
        Self::from_value(schema)
    }

    /// Compile a JSON Schema document
    pub fn from_value(schema: Value) -> Result<Self, EngineError> {
        let validator = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|e| EngineError::Schema(e.to_string()))?;

        let defaults = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter_map(|(name, prop)| {
                        prop.get("default").map(|d| (name.clone(), d.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            schema,
            validator: Arc::new(validator),
            defaults,
        })
    }

    /// Validate raw parameters.
    ///
    /// `null` is treated as an empty object and null-valued fields as
    /// absent. On success returns the parameters with defaults applied; on
    /// failure returns the sorted names of all offending fields (missing,
    /// mistyped, out-of-enum, or undeclared).
    pub fn validate(&self, raw: &Value) -> Result<Map<String, Value>, Vec<String>> {
        let input: Map<String, Value> = match raw {
            Value::Null => Map::new(),
            Value::Object(map) => map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => return Err(vec![ROOT_FIELD.to_string()]),
        };
        let instance = Value::Object(input);

        let mut offending: Vec<String> = match self.validator.validate(&instance) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.flat_map(offending_fields).collect(),
        };
        if !offending.is_empty() {
            offending.sort();
            offending.dedup();
            return Err(offending);
        }

        let mut params = match instance {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (name, default) in &self.defaults {
            params
                .entry(name.clone())
                .or_insert_with(|| default.clone());
        }
        Ok(params)
    }

    /// JSON-Schema object for the model prompt
    pub fn to_json_schema(&self) -> Value {
        self.schema.clone()
    }
}

impl fmt::Debug for ParamSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSchema")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Top-level field names a validation error points at
fn offending_fields(error: ValidationError<'_>) -> Vec<String> {
    match error.kind {
        ValidationErrorKind::Required { property } => vec![property
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| property.to_string())],
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected,
        _ => vec![error
            .instance_path
            .into_vec()
            .into_iter()
            .next()
            .unwrap_or_else(|| ROOT_FIELD.to_string())],
    }
}
