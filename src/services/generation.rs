//! Single-call wrapper around an [`LlmClient`] that turns raw candidate text into
//! the shape a stage expects.
//!
//! No retries happen here. A failed call is reported once and the caller decides
//! whether to try again.

use crate::core::error::GenerationError;
use crate::services::llm::LlmClient;
use crate::utils::json::strip_code_blocks;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

/// Expected structure of a schema-constrained response. Every named field is a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputShape {
    Object {
        fields: Vec<String>,
    },
    Array {
        item_fields: Vec<String>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
}

impl OutputShape {
    pub fn object(fields: &[&str]) -> Self {
        OutputShape::Object {
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn array_of(item_fields: &[&str]) -> Self {
        OutputShape::Array {
            item_fields: item_fields.iter().map(|f| f.to_string()).collect(),
            min_items: None,
            max_items: None,
        }
    }

    /// Bounds the item count of an array shape. No effect on objects.
    pub fn with_items(self, min: usize, max: usize) -> Self {
        match self {
            OutputShape::Array { item_fields, .. } => OutputShape::Array {
                item_fields,
                min_items: Some(min),
                max_items: Some(max),
            },
            other => other,
        }
    }

    /// Gemini `responseSchema` for this shape.
    pub fn response_schema(&self) -> Value {
        match self {
            OutputShape::Object { fields } => object_schema(fields),
            OutputShape::Array {
                item_fields,
                min_items,
                max_items,
            } => {
                let mut schema = Map::new();
                schema.insert("type".to_string(), json!("ARRAY"));
                schema.insert("items".to_string(), object_schema(item_fields));
                if let Some(min) = min_items {
                    schema.insert("minItems".to_string(), json!(min));
                }
                if let Some(max) = max_items {
                    schema.insert("maxItems".to_string(), json!(max));
                }
                Value::Object(schema)
            }
        }
    }

    /// Plain-language format instruction for backends without native schema support.
    pub fn instruction(&self) -> String {
        match self {
            OutputShape::Object { fields } => format!(
                "Responde únicamente con un objeto JSON válido con las propiedades de texto {}.",
                quoted(fields)
            ),
            OutputShape::Array {
                item_fields,
                min_items,
                max_items,
            } => {
                let count = match (min_items, max_items) {
                    (Some(min), Some(max)) if min == max => format!(" de exactamente {} elementos", min),
                    (Some(min), Some(max)) => format!(" de entre {} y {} elementos", min, max),
                    (Some(min), None) => format!(" de al menos {} elementos", min),
                    (None, Some(max)) => format!(" de como máximo {} elementos", max),
                    (None, None) => String::new(),
                };
                format!(
                    "Responde únicamente con un array JSON válido{} donde cada objeto tiene las propiedades de texto {}.",
                    count,
                    quoted(item_fields)
                )
            }
        }
    }

    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self {
            OutputShape::Object { fields } => check_object(value, fields),
            OutputShape::Array {
                item_fields,
                min_items,
                max_items,
            } => {
                let items = value
                    .as_array()
                    .ok_or_else(|| format!("expected a JSON array, got {}", type_name(value)))?;
                if let Some(min) = min_items {
                    if items.len() < *min {
                        return Err(format!("expected at least {} items, got {}", min, items.len()));
                    }
                }
                if let Some(max) = max_items {
                    if items.len() > *max {
                        return Err(format!("expected at most {} items, got {}", max, items.len()));
                    }
                }
                for (i, item) in items.iter().enumerate() {
                    check_object(item, item_fields).map_err(|e| format!("item {}: {}", i, e))?;
                }
                Ok(())
            }
        }
    }
}

fn object_schema(fields: &[String]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|f| (f.clone(), json!({ "type": "STRING" })))
        .collect();
    json!({
        "type": "OBJECT",
        "properties": properties,
        "propertyOrdering": fields,
    })
}

fn check_object(value: &Value, fields: &[String]) -> Result<(), String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("expected a JSON object, got {}", type_name(value)))?;
    for field in fields {
        match object.get(field) {
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(format!("field '{}' should be a string, got {}", field, type_name(other)))
            }
            None => return Err(format!("missing field '{}'", field)),
        }
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn quoted(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| format!("\"{}\"", f))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parses and validates raw candidate text against `shape`.
pub fn parse_structured(raw: &str, shape: &OutputShape) -> Result<Value, GenerationError> {
    let clean = strip_code_blocks(raw);
    let value: Value = serde_json::from_str(&clean).map_err(|e| {
        GenerationError::MalformedResponse(format!("unparsable JSON ({}): {}", e, clean))
    })?;
    shape
        .validate(&value)
        .map_err(GenerationError::MalformedResponse)?;
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    Text(String),
    Structured(Value),
}

#[derive(Debug)]
pub struct GenerationClient {
    llm: Box<dyn LlmClient>,
}

impl GenerationClient {
    pub fn new(llm: Box<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        shape: Option<&OutputShape>,
    ) -> Result<Generated, GenerationError> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        debug!("Sending prompt ({} chars, structured: {})", prompt.chars().count(), shape.is_some());
        let raw = self.llm.generate(prompt, shape).await?;

        match shape {
            Some(shape) => parse_structured(&raw, shape).map(Generated::Structured),
            None => {
                let text = raw.trim();
                if text.is_empty() {
                    Err(GenerationError::MalformedResponse(
                        "candidate text is empty".to_string(),
                    ))
                } else {
                    Ok(Generated::Text(text.to_string()))
                }
            }
        }
    }

    pub async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        match self.generate(prompt, None).await? {
            Generated::Text(text) => Ok(text),
            Generated::Structured(value) => Ok(value.to_string()),
        }
    }

    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        prompt: &str,
        shape: &OutputShape,
    ) -> Result<T, GenerationError> {
        let value = match self.generate(prompt, Some(shape)).await? {
            Generated::Structured(value) => value,
            Generated::Text(text) => parse_structured(&text, shape)?,
        };
        serde_json::from_value(value)
            .map_err(|e| GenerationError::MalformedResponse(format!("unexpected structure: {}", e)))
    }
}
