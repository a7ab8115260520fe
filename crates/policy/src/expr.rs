//! Sandboxed rule conditions.
//!
//! Conditions are CEL expressions evaluated against a fixed schema built
//! from the canonical action. CEL gives us the sandbox for free — no I/O
//! builtins, no unbounded iteration — and `compile` adds the gateway's
//! own guardrails: a length ceiling and a closed identifier/function set
//! so a typo'd field name is rejected at rule-creation time instead of
//! silently never matching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cel_interpreter::{Context, ExecutionError, Program, Value};

use sg_domain::{CanonicalAction, Error, Result};

use crate::glob::glob_match;
use crate::net::{domain_matches, ip_in_cidr};

/// Conditions longer than this are rejected at compile time.
pub const MAX_EXPRESSION_LEN: usize = 1024;

/// Wall-clock ceiling per evaluation. CEL terminates structurally; this
/// guards against pathological inputs (huge argument maps) regardless.
pub const MAX_EVAL_TIME: Duration = Duration::from_millis(50);

/// Identifiers a condition may reference.
const SCHEMA_VARIABLES: &[&str] = &[
    "action_type",
    "action_name",
    "protocol",
    "framework",
    "gateway",
    "identity_id",
    "identity_name",
    "user_roles",
    "identity_roles",
    "tool_name",
    "tool_args",
    "arguments",
    "dest_url",
    "dest_domain",
    "dest_ip",
    "dest_port",
    "dest_path",
    "dest_scheme",
    "dest_command",
];

/// CEL builtins plus the gateway's domain primitives.
const ALLOWED_FUNCTIONS: &[&str] = &[
    // CEL standard
    "size", "has", "all", "exists", "exists_one", "map", "filter", "matches", "contains",
    "startsWith", "endsWith", "string", "int", "uint", "double", "bytes", "timestamp", "duration",
    "max", "min",
    // domain primitives
    "glob", "dest_ip_in_cidr", "dest_domain_matches", "action_arg", "action_arg_contains",
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compile
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A compiled, immutable, thread-safe condition. Cached by source string
/// inside a rule-set snapshot.
pub struct CompiledExpr {
    source: String,
    program: Program,
}

impl CompiledExpr {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Debug for CompiledExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExpr")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Compile a condition, enforcing the schema and the length ceiling.
pub fn compile(expression: &str) -> Result<CompiledExpr> {
    if expression.len() > MAX_EXPRESSION_LEN {
        return Err(Error::Compile(format!(
            "expression is {} characters; maximum is {MAX_EXPRESSION_LEN}",
            expression.len()
        )));
    }

    let program = Program::compile(expression)
        .map_err(|e| Error::Compile(format!("parse error: {e}")))?;

    let references = program.references();
    for variable in references.variables() {
        if !SCHEMA_VARIABLES.contains(&variable) {
            return Err(Error::Compile(format!("unknown identifier '{variable}'")));
        }
    }
    for function in references.functions() {
        if !ALLOWED_FUNCTIONS.contains(&function) {
            return Err(Error::Compile(format!("unknown function '{function}'")));
        }
    }

    Ok(CompiledExpr {
        source: expression.to_owned(),
        program,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Evaluate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Evaluate a compiled condition against an action.
///
/// Every failure mode (runtime type error, division by zero, non-boolean
/// result, budget exceeded) comes back as `Error::Eval` — the evaluator
/// treats those as "rule does not match", never as a caller-visible
/// fault.
pub fn evaluate(expr: &CompiledExpr, action: &CanonicalAction) -> Result<bool> {
    let context = build_context(action);
    let started = Instant::now();
    // A panicking engine must surface as an eval error, not tear down
    // the request worker.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        expr.program.execute(&context)
    }))
    .map_err(|_| Error::Eval(format!("{}: evaluation panicked", expr.source)))?;
    let value = result.map_err(|e| Error::Eval(format!("{}: {e}", expr.source)))?;
    if started.elapsed() > MAX_EVAL_TIME {
        return Err(Error::Eval(format!(
            "{}: evaluation exceeded {}ms",
            expr.source,
            MAX_EVAL_TIME.as_millis()
        )));
    }
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(Error::Eval(format!(
            "{}: expected bool, got {other:?}",
            expr.source
        ))),
    }
}

/// Bind the canonical action into a CEL context. Missing optional fields
/// bind as empty strings / zero / empty collections so expressions stay
/// total, and the MCP aliases (`tool_name`, `tool_args`, `user_roles`)
/// are always present.
fn build_context(action: &CanonicalAction) -> Context<'static> {
    let mut context = Context::default();

    let roles = Value::List(Arc::new(
        action
            .identity_roles
            .iter()
            .map(|r| Value::String(Arc::new(r.clone())))
            .collect::<Vec<_>>(),
    ));
    let arguments = arguments_value(action);

    context.add_variable_from_value("action_type", str_value(action.action_type.as_str()));
    context.add_variable_from_value("action_name", str_value(&action.action_name));
    context.add_variable_from_value("protocol", str_value(action.protocol.as_str()));
    context.add_variable_from_value("framework", opt_value(action.framework.as_deref()));
    context.add_variable_from_value("gateway", opt_value(action.gateway.as_deref()));
    context.add_variable_from_value("identity_id", str_value(&action.identity_id));
    context.add_variable_from_value("identity_name", str_value(&action.identity_name));
    context.add_variable_from_value("user_roles", roles.clone());
    context.add_variable_from_value("identity_roles", roles);
    context.add_variable_from_value(
        "tool_name",
        str_value(action.tool_name.as_deref().unwrap_or(&action.action_name)),
    );
    context.add_variable_from_value("tool_args", arguments.clone());
    context.add_variable_from_value("arguments", arguments);
    context.add_variable_from_value("dest_url", opt_value(action.dest_url.as_deref()));
    context.add_variable_from_value("dest_domain", opt_value(action.dest_domain.as_deref()));
    context.add_variable_from_value("dest_ip", opt_value(action.dest_ip.as_deref()));
    context.add_variable_from_value(
        "dest_port",
        Value::Int(i64::from(action.dest_port.unwrap_or(0))),
    );
    context.add_variable_from_value("dest_path", opt_value(action.dest_path.as_deref()));
    context.add_variable_from_value("dest_scheme", opt_value(action.dest_scheme.as_deref()));
    context.add_variable_from_value("dest_command", opt_value(action.dest_command.as_deref()));

    register_functions(&mut context);
    context
}

fn register_functions(context: &mut Context<'_>) {
    context.add_function("glob", |pattern: Arc<String>, text: Arc<String>| -> bool {
        glob_match(&pattern, &text)
    });
    context.add_function(
        "dest_ip_in_cidr",
        |ip: Arc<String>, cidr: Arc<String>| -> bool { ip_in_cidr(&ip, &cidr) },
    );
    context.add_function(
        "dest_domain_matches",
        |domain: Arc<String>, pattern: Arc<String>| -> bool { domain_matches(&domain, &pattern) },
    );
    context.add_function(
        "action_arg",
        |args: Value, key: Arc<String>| -> std::result::Result<Value, ExecutionError> {
            Ok(match args {
                Value::Map(map) => map
                    .map
                    .iter()
                    .find(|(k, _)| matches!(k, cel_interpreter::objects::Key::String(s) if s.as_str() == key.as_str()))
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            })
        },
    );
    context.add_function(
        "action_arg_contains",
        |args: Value, needle: Arc<String>| -> bool { value_contains(&args, &needle) },
    );
}

/// Recursive substring search over every string leaf.
fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.contains(needle),
        Value::List(items) => items.iter().any(|v| value_contains(v, needle)),
        Value::Map(map) => map.map.values().any(|v| value_contains(v, needle)),
        _ => false,
    }
}

fn str_value(s: &str) -> Value {
    Value::String(Arc::new(s.to_owned()))
}

fn opt_value(s: Option<&str>) -> Value {
    str_value(s.unwrap_or(""))
}

fn arguments_value(action: &CanonicalAction) -> Value {
    let mut map: HashMap<String, Value> = HashMap::new();
    if let Some(args) = &action.arguments {
        for (key, value) in args {
            map.insert(key.clone(), json_to_cel(value));
        }
    }
    Value::Map(map.into())
}

/// Convert a JSON value into a CEL value. Numbers keep integer-ness when
/// they have it; everything else maps structurally.
fn json_to_cel(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(Arc::new(s.clone())),
        serde_json::Value::Array(items) => {
            Value::List(Arc::new(items.iter().map(json_to_cel).collect()))
        }
        serde_json::Value::Object(map) => {
            let converted: HashMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_cel(v)))
                .collect();
            Value::Map(converted.into())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action_with_args(args: serde_json::Value) -> CanonicalAction {
        let map = match args {
            serde_json::Value::Object(m) => m,
            _ => serde_json::Map::new(),
        };
        let mut action = CanonicalAction::tool_call("read_file", map);
        action.identity_roles = vec!["admin".into(), "user".into()];
        action.identity_name = "agent".into();
        action
    }

    #[test]
    fn role_membership() {
        let expr = compile(r#""admin" in user_roles"#).unwrap();
        let action = action_with_args(json!({}));
        assert!(evaluate(&expr, &action).unwrap());

        let expr = compile(r#""root" in user_roles"#).unwrap();
        assert!(!evaluate(&expr, &action).unwrap());
    }

    #[test]
    fn identity_roles_is_an_alias() {
        let expr = compile(r#""admin" in identity_roles"#).unwrap();
        assert!(evaluate(&expr, &action_with_args(json!({}))).unwrap());
    }

    #[test]
    fn tool_name_aliases_action_name() {
        let expr = compile(r#"tool_name == "read_file""#).unwrap();
        assert!(evaluate(&expr, &action_with_args(json!({}))).unwrap());
    }

    #[test]
    fn string_operations() {
        let expr = compile(r#"action_name.startsWith("read_")"#).unwrap();
        assert!(evaluate(&expr, &action_with_args(json!({}))).unwrap());

        let expr = compile(r#"action_name.contains("file")"#).unwrap();
        assert!(evaluate(&expr, &action_with_args(json!({}))).unwrap());
    }

    #[test]
    fn glob_primitive() {
        let expr = compile(r#"glob("read_*", action_name)"#).unwrap();
        assert!(evaluate(&expr, &action_with_args(json!({}))).unwrap());
    }

    #[test]
    fn cidr_primitive_is_total() {
        let mut action = action_with_args(json!({}));
        action.dest_ip = Some("10.1.2.3".into());
        let expr = compile(r#"dest_ip_in_cidr(dest_ip, "10.0.0.0/8")"#).unwrap();
        assert!(evaluate(&expr, &action).unwrap());

        // Malformed CIDR never throws.
        let expr = compile(r#"dest_ip_in_cidr(dest_ip, "bogus")"#).unwrap();
        assert!(!evaluate(&expr, &action).unwrap());
    }

    #[test]
    fn domain_primitive() {
        let mut action = action_with_args(json!({}));
        action.dest_domain = Some("a.b.evil.com".into());
        let expr = compile(r#"dest_domain_matches(dest_domain, "*.evil.com")"#).unwrap();
        assert!(evaluate(&expr, &action).unwrap());
    }

    #[test]
    fn action_arg_lookup_and_null_default() {
        let action = action_with_args(json!({"path": "/etc/passwd"}));
        let expr = compile(r#"action_arg(arguments, "path") == "/etc/passwd""#).unwrap();
        assert!(evaluate(&expr, &action).unwrap());

        let expr = compile(r#"action_arg(arguments, "missing") == null"#).unwrap();
        assert!(evaluate(&expr, &action).unwrap());
    }

    #[test]
    fn action_arg_contains_searches_nested_leaves() {
        let action = action_with_args(json!({
            "request": {"headers": ["x-token: AKIA1234"], "body": "hello"}
        }));
        let expr = compile(r#"action_arg_contains(arguments, "AKIA")"#).unwrap();
        assert!(evaluate(&expr, &action).unwrap());

        let expr = compile(r#"action_arg_contains(arguments, "absent")"#).unwrap();
        assert!(!evaluate(&expr, &action).unwrap());
    }

    #[test]
    fn dest_port_defaults_to_zero() {
        let expr = compile("dest_port == 0").unwrap();
        assert!(evaluate(&expr, &action_with_args(json!({}))).unwrap());
    }

    #[test]
    fn numeric_comparison_on_port() {
        let mut action = action_with_args(json!({}));
        action.dest_port = Some(8443);
        let expr = compile("dest_port > 1024 && dest_port < 65535").unwrap();
        assert!(evaluate(&expr, &action).unwrap());
    }

    #[test]
    fn unknown_identifier_is_a_compile_error() {
        let err = compile("nonexistent_field == 1").unwrap_err();
        assert!(matches!(err, Error::Compile(_)), "{err}");
    }

    #[test]
    fn unknown_function_is_a_compile_error() {
        let err = compile(r#"exfiltrate("x")"#).unwrap_err();
        assert!(matches!(err, Error::Compile(_)), "{err}");
    }

    #[test]
    fn syntax_error_is_a_compile_error() {
        assert!(matches!(compile("== ++"), Err(Error::Compile(_))));
    }

    #[test]
    fn oversized_expression_is_a_compile_error() {
        let long = format!("action_name == \"{}\"", "x".repeat(1100));
        assert!(matches!(compile(&long), Err(Error::Compile(_))));
    }

    #[test]
    fn division_by_zero_is_an_eval_error() {
        let expr = compile("1 / 0 == 0").unwrap();
        let err = evaluate(&expr, &action_with_args(json!({}))).unwrap_err();
        assert!(matches!(err, Error::Eval(_)), "{err}");
    }

    #[test]
    fn non_boolean_result_is_an_eval_error() {
        let expr = compile("dest_port + 1").unwrap();
        let err = evaluate(&expr, &action_with_args(json!({}))).unwrap_err();
        assert!(matches!(err, Error::Eval(_)), "{err}");
    }

    #[test]
    fn same_action_same_result() {
        let expr = compile(r#""admin" in user_roles && action_name.startsWith("read_")"#).unwrap();
        let action = action_with_args(json!({}));
        let first = evaluate(&expr, &action).unwrap();
        for _ in 0..10 {
            assert_eq!(evaluate(&expr, &action).unwrap(), first);
        }
    }
}
