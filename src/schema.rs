//! JSON-Schema validation registry (ambient, backs `validate artifact`
//! and the bundle/result gates): wraps the `jsonschema` crate the same
//! way the teacher wraps its own validators, keyed by artifact kind.

use crate::errors::{SchemaError, TaskerError};
use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashMap;

/// Holds one compiled `Validator` per artifact kind (`"capability-map"`,
/// `"physical-map"`, `"bundle"`, `"result"`, ...).
#[derive(Default)]
pub struct SchemaRegistry {
    validators: HashMap<String, Validator>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register a schema under `kind`. Replaces any schema
    /// previously registered for the same kind.
    pub fn register(&mut self, kind: &str, schema: &Value) -> Result<(), TaskerError> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| SchemaError::ValidationFailed {
                artifact: kind.to_string(),
                errors: vec![e.to_string()],
            })?;
        self.validators.insert(kind.to_string(), validator);
        Ok(())
    }

    /// Validate `instance` against the schema registered for `kind`.
    pub fn validate(&self, kind: &str, instance: &Value) -> Result<(), TaskerError> {
        let validator = self
            .validators
            .get(kind)
            .ok_or_else(|| SchemaError::UnknownSchema(kind.to_string()))?;

        let errors: Vec<String> = validator.iter_errors(instance).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::ValidationFailed {
                artifact: kind.to_string(),
                errors,
            }
            .into())
        }
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.validators.contains_key(kind)
    }
}

/// Schemas for the artifact kinds the core validates at load/generate
/// time (spec.md §6). Built in rather than loaded from disk, since the
/// working directory carries only the artifacts themselves.
pub fn default_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    for (kind, schema) in [
        ("task", task_schema()),
        ("capability-map", capability_map_schema()),
        ("physical-map", physical_map_schema()),
        ("bundle", bundle_schema()),
        ("result", result_schema()),
    ] {
        registry
            .register(kind, &schema)
            .expect("built-in schemas are always valid JSON Schema");
    }
    registry
}

fn task_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["id", "name", "phase", "depends_on", "blocks"],
        "properties": {
            "id": { "type": "string" },
            "name": { "type": "string" },
            "phase": { "type": "integer" },
            "depends_on": { "type": "array", "items": { "type": "string" } },
            "blocks": { "type": "array", "items": { "type": "string" } },
            "behaviors": { "type": "array", "items": { "type": "string" } },
            "files": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["path", "action"],
                    "properties": {
                        "path": { "type": "string" },
                        "action": { "enum": ["create", "modify", "delete"] }
                    }
                }
            },
            "acceptance_criteria": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["criterion", "verification"],
                    "properties": {
                        "criterion": { "type": "string" },
                        "verification": { "type": "string" }
                    }
                }
            }
        }
    })
}

fn capability_map_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["behaviors"],
        "properties": {
            "behaviors": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id"],
                    "properties": { "id": { "type": "string" } }
                }
            }
        }
    })
}

fn physical_map_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["entries"],
        "properties": {
            "entries": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["behavior_id"],
                    "properties": { "behavior_id": { "type": "string" } }
                }
            }
        }
    })
}

fn bundle_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["version", "task_id", "name", "phase", "dependencies", "checksums"],
        "properties": {
            "version": { "type": "integer" },
            "task_id": { "type": "string" },
            "name": { "type": "string" },
            "phase": { "type": "integer" }
        }
    })
}

fn result_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["task_id", "name", "status", "started_at", "completed_at"],
        "properties": {
            "task_id": { "type": "string" },
            "status": { "enum": ["success", "failed"] }
        }
    })
}
