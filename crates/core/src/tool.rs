//! Tool trait: the abstraction over agent capabilities.
//!
//! A tool declares a typed parameter list. The registry renders that list to
//! JSON Schema for the model and validates incoming arguments against it
//! before the tool ever runs: type errors are rejected, out-of-range numbers
//! are clamped into their declared bounds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::error::ToolError;
use crate::message::MessageToolCall;
use crate::provider::ToolDefinition;

/// Prefix every failed tool result starts with.
pub const ERROR_MARKER: &str = "Error";

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Matches the model's tool call id
    pub id: String,

    pub name: String,

    pub arguments: Value,
}

impl ToolCall {
    /// Parse the raw argument string the model produced.
    ///
    /// An empty string is treated as `{}`; anything else must be valid JSON.
    pub fn parse(call: &MessageToolCall) -> Result<Self, ToolError> {
        let raw = call.arguments.trim();
        let arguments = if raw.is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(raw)
                .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))?
        };
        Ok(Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        })
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call id this result answers
    pub call_id: String,

    pub success: bool,

    pub output: String,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
        }
    }

    /// A failed result; the output always begins with [`ERROR_MARKER`].
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        let output = if message.starts_with(ERROR_MARKER) {
            message
        } else {
            format!("{ERROR_MARKER}: {message}")
        };
        Self {
            call_id: String::new(),
            success: false,
            output,
        }
    }

    fn for_call(mut self, call_id: &str) -> Self {
        self.call_id = call_id.to_string();
        self
    }
}

/// The declared type (and bounds) of one tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    String { default: Option<&'static str> },
    Integer { min: i64, max: i64, default: Option<i64> },
    Number { min: f64, max: f64, default: Option<f64> },
    Boolean { default: Option<bool> },
}

/// One named, typed parameter of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub fn required_string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::String { default: None },
            required: true,
        }
    }

    pub fn string(name: &'static str, description: &'static str, default: &'static str) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::String { default: Some(default) },
            required: false,
        }
    }

    pub fn integer(name: &'static str, description: &'static str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::Integer { min, max, default: Some(default) },
            required: false,
        }
    }

    pub fn number(name: &'static str, description: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::Number { min, max, default: Some(default) },
            required: false,
        }
    }

    pub fn boolean(name: &'static str, description: &'static str, default: bool) -> Self {
        Self {
            name,
            description,
            kind: ParamKind::Boolean { default: Some(default) },
            required: false,
        }
    }

    fn schema(&self) -> Value {
        let mut prop = Map::new();
        let (ty, default) = match &self.kind {
            ParamKind::String { default } => ("string", default.map(Value::from)),
            ParamKind::Integer { min, max, default } => {
                prop.insert("minimum".into(), json!(min));
                prop.insert("maximum".into(), json!(max));
                ("integer", default.map(Value::from))
            }
            ParamKind::Number { min, max, default } => {
                prop.insert("minimum".into(), json!(min));
                prop.insert("maximum".into(), json!(max));
                ("number", default.map(Value::from))
            }
            ParamKind::Boolean { default } => ("boolean", default.map(Value::from)),
        };
        prop.insert("type".into(), json!(ty));
        prop.insert("description".into(), json!(self.description));
        if let Some(default) = default {
            prop.insert("default".into(), default);
        }
        Value::Object(prop)
    }

    /// Type-check a supplied value and clamp it into bounds.
    fn coerce(&self, value: &Value) -> Result<Value, ToolError> {
        let mismatch = |expected: &str| {
            ToolError::InvalidArguments(format!("`{}` must be {expected}, got {value}", self.name))
        };
        match &self.kind {
            ParamKind::String { .. } => value
                .as_str()
                .map(|s| Value::from(s.to_string()))
                .ok_or_else(|| mismatch("a string")),
            ParamKind::Integer { min, max, .. } => {
                let n = match value.as_i64() {
                    Some(n) => n,
                    None => match value.as_f64() {
                        Some(f) if f.fract() == 0.0 => f as i64,
                        _ => return Err(mismatch("an integer")),
                    },
                };
                Ok(Value::from(n.clamp(*min, *max)))
            }
            ParamKind::Number { min, max, .. } => {
                let n = value.as_f64().ok_or_else(|| mismatch("a number"))?;
                Ok(json!(n.clamp(*min, *max)))
            }
            ParamKind::Boolean { .. } => value
                .as_bool()
                .map(Value::from)
                .ok_or_else(|| mismatch("a boolean")),
        }
    }

    fn default_value(&self) -> Option<Value> {
        match &self.kind {
            ParamKind::String { default } => default.map(Value::from),
            ParamKind::Integer { default, .. } => default.map(Value::from),
            ParamKind::Number { default, .. } => default.map(|d| json!(d)),
            ParamKind::Boolean { default } => default.map(Value::from),
        }
    }
}

/// Render a parameter list as a JSON Schema object.
pub fn schema_for(params: &[ParamSpec]) -> Value {
    let properties: Map<String, Value> = params
        .iter()
        .map(|p| (p.name.to_string(), p.schema()))
        .collect();
    let required: Vec<&str> = params.iter().filter(|p| p.required).map(|p| p.name).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Arguments that passed validation: every declared parameter with a
/// default is present, and every bounded number lies within its range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: BTreeMap<&'static str, Value>,
}

impl ToolArgs {
    /// Validate raw arguments against a parameter list.
    ///
    /// `null` is accepted as "no arguments". Unknown keys are ignored.
    pub fn validate(params: &[ParamSpec], raw: &Value) -> Result<Self, ToolError> {
        let empty = Map::new();
        let object = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "arguments must be a JSON object, got {other}"
                )));
            }
        };

        let mut values = BTreeMap::new();
        for param in params {
            match object.get(param.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    values.insert(param.name, param.coerce(value)?);
                }
                None if param.required => {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required argument `{}`",
                        param.name
                    )));
                }
                None => {
                    if let Some(default) = param.default_value() {
                        values.insert(param.name, default);
                    }
                }
            }
        }
        Ok(Self { values })
    }

    pub fn str(&self, name: &str) -> Result<&str, ToolError> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments(format!("missing string argument `{name}`")))
    }

    pub fn int(&self, name: &str) -> Result<i64, ToolError> {
        self.values
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| ToolError::InvalidArguments(format!("missing integer argument `{name}`")))
    }

    pub fn float(&self, name: &str) -> Result<f64, ToolError> {
        self.values
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::InvalidArguments(format!("missing number argument `{name}`")))
    }

    pub fn bool(&self, name: &str) -> Result<bool, ToolError> {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| ToolError::InvalidArguments(format!("missing boolean argument `{name}`")))
    }
}

/// The core Tool trait.
///
/// Implementations only see validated [`ToolArgs`]. Backend failures should
/// be returned as [`ToolResult::error`] rather than `Err`, so the model always
/// gets a readable result.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "check_metrics").
    fn name(&self) -> &str;

    /// What this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// Declared parameters, in schema order.
    fn params(&self) -> Vec<ParamSpec>;

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult, ToolError>;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value {
        schema_for(&self.params())
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The set of tools available to the agent, keyed by unique name.
///
/// Iteration order is by name so tool definitions and the system prompt are
/// stable across runs.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// `(name, description)` pairs in registry order.
    pub fn summaries(&self) -> Vec<(&str, &str)> {
        self.tools.values().map(|t| (t.name(), t.description())).collect()
    }

    /// Look up, validate and execute a tool call.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let args = ToolArgs::validate(&tool.params(), &call.arguments)?;
        let result = tool.execute(args).await?;
        Ok(result.for_call(&call.id))
    }

    /// Like [`execute`](Self::execute) but folds every failure into an error result.
    pub async fn dispatch(&self, call: &MessageToolCall) -> ToolResult {
        let outcome = match ToolCall::parse(call) {
            Ok(parsed) => self.execute(&parsed).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(result) => result,
            Err(e) => ToolResult::error(e.to_string()).for_call(&call.id),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LookupTool;

    #[async_trait]
    impl Tool for LookupTool {
        fn name(&self) -> &str {
            "lookup"
        }
        fn description(&self) -> &str {
            "Looks things up"
        }
        fn params(&self) -> Vec<ParamSpec> {
            vec![
                ParamSpec::required_string("query", "What to look up"),
                ParamSpec::integer("top_k", "How many", 1, 10, 5),
                ParamSpec::number("threshold", "Minimum score", 0.0, 1.0, 0.7),
                ParamSpec::boolean("verbose", "Extra output", false),
            ]
        }
        async fn execute(&self, args: ToolArgs) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(format!(
                "{} k={} t={} v={}",
                args.str("query")?,
                args.int("top_k")?,
                args.float("threshold")?,
                args.bool("verbose")?
            )))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(LookupTool));
        registry
    }

    fn call(arguments: &str) -> MessageToolCall {
        MessageToolCall {
            id: "call_1".into(),
            name: "lookup".into(),
            arguments: arguments.into(),
        }
    }

    #[test]
    fn schema_lists_bounds_defaults_and_required() {
        let schema = LookupTool.parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["top_k"]["type"], "integer");
        assert_eq!(schema["properties"]["top_k"]["minimum"], 1);
        assert_eq!(schema["properties"]["top_k"]["maximum"], 10);
        assert_eq!(schema["properties"]["top_k"]["default"], 5);
        assert_eq!(schema["properties"]["verbose"]["type"], "boolean");
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let params = LookupTool.params();
        let args = ToolArgs::validate(&params, &json!({"query": "q", "top_k": 50, "threshold": -3.0})).unwrap();
        assert_eq!(args.int("top_k").unwrap(), 10);
        assert_eq!(args.float("threshold").unwrap(), 0.0);

        let args = ToolArgs::validate(&params, &json!({"query": "q", "top_k": 0})).unwrap();
        assert_eq!(args.int("top_k").unwrap(), 1);
    }

    #[test]
    fn whole_floats_are_accepted_as_integers() {
        let args = ToolArgs::validate(&LookupTool.params(), &json!({"query": "q", "top_k": 3.0})).unwrap();
        assert_eq!(args.int("top_k").unwrap(), 3);
    }

    #[test]
    fn defaults_fill_missing_optionals() {
        let args = ToolArgs::validate(&LookupTool.params(), &json!({"query": "q"})).unwrap();
        assert_eq!(args.int("top_k").unwrap(), 5);
        assert!(!args.bool("verbose").unwrap());
    }

    #[test]
    fn type_errors_are_rejected() {
        let params = LookupTool.params();
        let err = ToolArgs::validate(&params, &json!({"query": "q", "top_k": "five"})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = ToolArgs::validate(&params, &json!({"top_k": 2})).unwrap_err();
        assert!(err.to_string().contains("missing required argument `query`"));

        let err = ToolArgs::validate(&params, &json!([1, 2])).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let result = registry()
            .execute(&ToolCall {
                id: "call_9".into(),
                name: "lookup".into(),
                arguments: json!({"query": "pods", "top_k": 2}),
            })
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.call_id, "call_9");
        assert_eq!(result.output, "pods k=2 t=0.7 v=false");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn dispatch_folds_failures_into_error_text() {
        let registry = registry();

        let bad_json = registry.dispatch(&call("{not json")).await;
        assert!(!bad_json.success);
        assert!(bad_json.output.starts_with(ERROR_MARKER));
        assert_eq!(bad_json.call_id, "call_1");

        let mut unknown = call("{}");
        unknown.name = "restart_pod".into();
        let unknown = registry.dispatch(&unknown).await;
        assert_eq!(unknown.output, "Error: Unknown tool: restart_pod");

        let missing = registry.dispatch(&call("")).await;
        assert!(missing.output.contains("missing required argument"));

        let ok = registry.dispatch(&call(r#"{"query":"x"}"#)).await;
        assert!(ok.success);
    }

    #[test]
    fn error_results_keep_existing_marker() {
        assert_eq!(ToolResult::error("Error searching: down").output, "Error searching: down");
        assert_eq!(ToolResult::error("down").output, "Error: down");
    }

    #[test]
    fn registry_orders_by_name() {
        struct Named(&'static str);
        #[async_trait]
        impl Tool for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn description(&self) -> &str {
                ""
            }
            fn params(&self) -> Vec<ParamSpec> {
                vec![]
            }
            async fn execute(&self, _args: ToolArgs) -> Result<ToolResult, ToolError> {
                Ok(ToolResult::ok(""))
            }
        }
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Named("query_logs")));
        registry.register(Box::new(Named("analyze_health")));
        assert_eq!(registry.names(), vec!["analyze_health", "query_logs"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("query_logs").is_some());
    }
}
