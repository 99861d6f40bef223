// crates/shared/src/schemas/mod.rs
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::registry::ToolError;

#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParameterSchema>,
}

#[derive(Debug, Clone)]
pub struct ParameterSchema {
    pub name: &'static str,
    pub type_name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// One entry of the manifest advertised to the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn to_tool(&self) -> Tool {
        let mut properties = json!({});
        let mut required = vec![];

        for param in &self.parameters {
            properties[param.name] = json!({
                "type": param.type_name,
                "description": param.description
            });
            if param.required {
                required.push(param.name);
            }
        }

        Tool {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name.to_string(),
                description: self.description.to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": properties,
                    "required": required
                }),
            },
        }
    }

    /// Checks `args` against the declared parameters and returns the normalized
    /// argument object. Missing arguments (`null`) count as an empty object.
    /// Integer parameters sent as numeric strings are coerced, since smaller
    /// models often quote numbers.
    pub fn validate(&self, args: &Value) -> Result<Value, ToolError> {
        let mut object = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(self.invalid(format!(
                    "expected an argument object, got {}",
                    type_label(other)
                )));
            }
        };

        for param in &self.parameters {
            let value = object.get(param.name).cloned().unwrap_or(Value::Null);
            if value.is_null() {
                if param.required {
                    return Err(self.invalid(format!("missing required argument '{}'", param.name)));
                }
                continue;
            }

            if let Some(coerced) = param.coerce(&value) {
                object.insert(param.name.to_string(), coerced);
            } else if !param.accepts(&value) {
                return Err(self.invalid(format!(
                    "argument '{}' should be {}, got {}",
                    param.name,
                    param.type_name,
                    type_label(&value)
                )));
            }
        }

        Ok(Value::Object(object))
    }

    fn invalid(&self, reason: String) -> ToolError {
        ToolError::InvalidArguments {
            tool: self.name.to_string(),
            reason,
        }
    }
}

impl ParameterSchema {
    fn accepts(&self, value: &Value) -> bool {
        match self.type_name {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        }
    }

    fn coerce(&self, value: &Value) -> Option<Value> {
        match (self.type_name, value) {
            ("integer", Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        }
    }
}

fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub type InvokeFn = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// A named action the model may request. Immutable once built.
#[derive(Clone)]
pub struct ToolCapability {
    schema: ToolSchema,
    invoke: InvokeFn,
}

impl ToolCapability {
    pub fn new<F, Fut>(schema: ToolSchema, invoke: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        Self {
            schema,
            invoke: Arc::new(move |args| Box::pin(invoke(args))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.schema.name
    }

    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    /// Runs the capability without validation. Callers go through
    /// [`ToolRegistry::invoke`](crate::registry::ToolRegistry::invoke).
    pub async fn invoke(&self, args: Value) -> anyhow::Result<String> {
        (self.invoke)(args).await
    }
}

impl fmt::Debug for ToolCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCapability")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
