//! Validated writes to remote parameters
//!
//! Every entry point resolves its target, checks the request against the
//! parameter's declared type and range, and dispatches at most one write.
//! Failures never propagate: they are logged and reported as
//! [`MutationOutcome::Declined`].

use embertree_core::{
    EmberError, MonitorRegistry, Parameter, ParameterType, RawValue, TreeNode,
};
use embertree_provider::{resolve_parameter, TreeProvider, VariableSubstitution};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// Where a mutation is aimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "target", rename_all = "lowercase")]
pub enum Target {
    /// Dotted numeric path
    Path(String),
    /// Label of a monitored entry
    Label(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Path(path) => f.write_str(path),
            Target::Label(label) => write!(f, "label '{}'", label),
        }
    }
}

/// Requested value for an absolute set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SetValue {
    Integer(i64),
    Real(f64),
    Enum(i64),
    Boolean(bool),
    String(String),
}

impl SetValue {
    fn requested_type(&self) -> ParameterType {
        match self {
            SetValue::Integer(_) => ParameterType::Integer,
            SetValue::Real(_) => ParameterType::Real,
            SetValue::Enum(_) => ParameterType::Enum,
            SetValue::Boolean(_) => ParameterType::Boolean,
            SetValue::String(_) => ParameterType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increment,
    Decrement,
}

/// A write that was handed to the provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Write {
    pub path: String,
    pub value: RawValue,
    pub value_type: ParameterType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Dispatched(Write),
    Declined(EmberError),
}

impl MutationOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, MutationOutcome::Dispatched(_))
    }

    pub fn write(&self) -> Option<&Write> {
        match self {
            MutationOutcome::Dispatched(write) => Some(write),
            MutationOutcome::Declined(_) => None,
        }
    }

    pub fn error(&self) -> Option<&EmberError> {
        match self {
            MutationOutcome::Dispatched(_) => None,
            MutationOutcome::Declined(e) => Some(e),
        }
    }
}

/// Validates and dispatches parameter writes
#[derive(Clone)]
pub struct MutationEngine {
    provider: Arc<dyn TreeProvider>,
    variables: Arc<dyn VariableSubstitution>,
    registry: Arc<RwLock<MonitorRegistry>>,
}

impl MutationEngine {
    pub fn new(
        provider: Arc<dyn TreeProvider>,
        variables: Arc<dyn VariableSubstitution>,
        registry: Arc<RwLock<MonitorRegistry>>,
    ) -> Self {
        Self {
            provider,
            variables,
            registry,
        }
    }

    /// Set a parameter to a typed value
    pub async fn set_absolute(&self, target: &Target, value: SetValue) -> MutationOutcome {
        let result = async {
            let (node, parameter) = self.resolve(target).await?;
            let (raw, value_type) = coerce(&node.path, &parameter, value)?;
            self.dispatch(&node, raw, value_type).await
        }
        .await;
        finish("set", target, result)
    }

    /// Set a numeric parameter from text that may contain variables
    pub async fn set_expression(&self, target: &Target, text: &str) -> MutationOutcome {
        let result = async {
            let (node, parameter) = self.resolve(target).await?;
            require_numeric(&node.path, &parameter)?;

            let substituted = self.variables.substitute_variables(text).await;
            debug!(path = %node.path, expression = %text, value = %substituted, "Expression substituted");
            let requested: f64 = substituted.trim().parse().map_err(|_| {
                EmberError::not_applicable(
                    &node.path,
                    format!("expression '{}' is not a number", substituted),
                )
            })?;

            let value = parameter.clamp(requested).trunc() as i64;
            self.dispatch(&node, RawValue::Int(value), ParameterType::Integer)
                .await
        }
        .await;
        finish("expression", target, result)
    }

    /// Step a numeric parameter up or down by `delta`
    pub async fn adjust(&self, target: &Target, direction: Direction, delta: f64) -> MutationOutcome {
        let result = async {
            let (node, parameter) = self.resolve(target).await?;
            require_numeric(&node.path, &parameter)?;

            let current = parameter
                .value
                .as_ref()
                .and_then(RawValue::as_number)
                .ok_or_else(|| EmberError::not_applicable(&node.path, "no numeric value"))?;
            let value = step(&parameter, current, direction, delta).trunc() as i64;
            self.dispatch(&node, RawValue::Int(value), ParameterType::Integer)
                .await
        }
        .await;
        finish("adjust", target, result)
    }

    /// Invert a boolean parameter
    pub async fn toggle(&self, target: &Target) -> MutationOutcome {
        let result = async {
            let (node, parameter) = self.resolve(target).await?;
            let current = parameter
                .value
                .as_ref()
                .and_then(RawValue::as_bool)
                .ok_or_else(|| EmberError::not_applicable(&node.path, "is not of type Boolean"))?;
            self.dispatch(&node, RawValue::Bool(!current), ParameterType::Boolean)
                .await
        }
        .await;
        finish("toggle", target, result)
    }

    async fn resolve(&self, target: &Target) -> Result<(TreeNode, Parameter), EmberError> {
        let path = match target {
            Target::Path(path) => path.clone(),
            Target::Label(label) => self
                .registry
                .read()
                .await
                .path_for(label)
                .map(str::to_string)
                .ok_or_else(|| EmberError::NotFound(label.clone()))?,
        };
        resolve_parameter(self.provider.as_ref(), &path).await
    }

    async fn dispatch(
        &self,
        node: &TreeNode,
        value: RawValue,
        value_type: ParameterType,
    ) -> Result<Write, EmberError> {
        self.provider
            .write_value(node.handle, value.clone(), value_type)
            .await?;
        Ok(Write {
            path: node.path.clone(),
            value,
            value_type,
        })
    }
}

/// Check a typed request against the parameter and produce the raw write
fn coerce(
    path: &str,
    parameter: &Parameter,
    value: SetValue,
) -> Result<(RawValue, ParameterType), EmberError> {
    let declared = parameter.declared_type();
    let requested_type = value.requested_type();
    let mismatch = |expected: ParameterType| EmberError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        actual: declared,
    };

    let requested = match value {
        SetValue::Boolean(b) => return Ok((RawValue::Bool(b), ParameterType::Boolean)),
        SetValue::String(s) => {
            return if declared == ParameterType::String {
                Ok((RawValue::Str(s), ParameterType::String))
            } else {
                Err(mismatch(ParameterType::String))
            };
        }
        SetValue::Integer(v) | SetValue::Enum(v) => v as f64,
        SetValue::Real(v) => v,
    };

    if !declared.is_numeric() {
        return Err(mismatch(requested_type));
    }
    let clamped = parameter.clamp(requested);
    Ok(match declared {
        ParameterType::Real => (RawValue::Real(clamped), ParameterType::Real),
        other => (RawValue::Int(clamped.trunc() as i64), other),
    })
}

fn require_numeric(path: &str, parameter: &Parameter) -> Result<(), EmberError> {
    if parameter.is_numeric() {
        Ok(())
    } else {
        Err(EmberError::TypeMismatch {
            path: path.to_string(),
            expected: "integer or enum".to_string(),
            actual: parameter.declared_type(),
        })
    }
}

/// Apply a step, bounded on the side it moves towards
fn step(parameter: &Parameter, current: f64, direction: Direction, delta: f64) -> f64 {
    let bounded = !parameter.is_enumerated();
    match direction {
        Direction::Increment => {
            let next = current + delta;
            match parameter.maximum {
                Some(maximum) if bounded && next > maximum => maximum,
                _ => next,
            }
        }
        Direction::Decrement => {
            let next = current - delta;
            match parameter.minimum {
                Some(minimum) if bounded && next < minimum => minimum,
                _ => next,
            }
        }
    }
}

fn finish(operation: &str, target: &Target, result: Result<Write, EmberError>) -> MutationOutcome {
    match result {
        Ok(write) => {
            debug!(operation = operation, path = %write.path, value = %write.value, "Dispatched write");
            MutationOutcome::Dispatched(write)
        }
        Err(e @ EmberError::TransportFailure(_)) => {
            error!(operation = operation, target = %target, error = %e, "Write failed");
            MutationOutcome::Declined(e)
        }
        Err(e) => {
            warn!(operation = operation, target = %target, error = %e, "Write declined");
            MutationOutcome::Declined(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embertree_provider::{MemoryProvider, RegistryVariables, TreeSnapshot};

    fn snapshot() -> TreeSnapshot {
        serde_json::from_str(
            r#"{"children": [
                {"identifier": "Channel", "children": [
                    {"identifier": "Fader", "parameter": {"value": 8, "type": "integer", "minimum": 0, "maximum": 10}},
                    {"identifier": "Mute", "parameter": {"value": true, "type": "boolean"}},
                    {"identifier": "Name", "parameter": {"value": "Vox", "type": "string"}},
                    {"identifier": "Source", "parameter": {"value": 1, "type": "enum", "enumeration": "A\nB\nC", "minimum": 0, "maximum": 1}},
                    {"identifier": "Trim", "parameter": {"value": 0.5, "type": "real", "minimum": -1, "maximum": 1}},
                    {"identifier": "Level", "parameter": {"value": 3, "type": "integer"}}
                ]}
            ]}"#,
        )
        .unwrap()
    }

    struct Fixture {
        provider: Arc<MemoryProvider>,
        registry: Arc<RwLock<MonitorRegistry>>,
        engine: MutationEngine,
    }

    fn fixture() -> Fixture {
        let (provider, _rx) = MemoryProvider::new(&snapshot());
        let provider = Arc::new(provider);
        let registry = Arc::new(RwLock::new(MonitorRegistry::new()));
        let engine = MutationEngine::new(
            provider.clone(),
            Arc::new(RegistryVariables::new(registry.clone())),
            registry.clone(),
        );
        Fixture {
            provider,
            registry,
            engine,
        }
    }

    fn path(p: &str) -> Target {
        Target::Path(p.to_string())
    }

    fn dispatched(outcome: &MutationOutcome) -> RawValue {
        outcome.write().expect("write dispatched").value.clone()
    }

    #[tokio::test]
    async fn test_absolute_set_clamps() {
        let f = fixture();
        let fader = path("1.1");

        let high = f.engine.set_absolute(&fader, SetValue::Integer(15)).await;
        assert_eq!(dispatched(&high), RawValue::Int(10));
        let low = f.engine.set_absolute(&fader, SetValue::Integer(-3)).await;
        assert_eq!(dispatched(&low), RawValue::Int(0));
        let inside = f.engine.set_absolute(&fader, SetValue::Integer(4)).await;
        assert_eq!(dispatched(&inside), RawValue::Int(4));

        let writes = f.provider.writes().await;
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].value_type, ParameterType::Integer);
    }

    #[tokio::test]
    async fn test_absolute_set_coerces_to_declared_type() {
        let f = fixture();
        let trim = f.engine.set_absolute(&path("1.5"), SetValue::Real(2.5)).await;
        assert_eq!(dispatched(&trim), RawValue::Real(1.0));

        let fader = f.engine.set_absolute(&path("1.1"), SetValue::Real(6.6)).await;
        assert_eq!(dispatched(&fader), RawValue::Int(6));
    }

    #[tokio::test]
    async fn test_integer_coercion_truncates_on_every_path() {
        let f = fixture();
        let fader = path("1.1");

        let absolute = f.engine.set_absolute(&fader, SetValue::Real(3.9)).await;
        assert_eq!(dispatched(&absolute), RawValue::Int(3));

        let expression = f.engine.set_expression(&fader, "3.9").await;
        assert_eq!(dispatched(&expression), RawValue::Int(3));

        let stepped = f.engine.adjust(&fader, Direction::Increment, 0.9).await;
        assert_eq!(dispatched(&stepped), RawValue::Int(3));

        let negative = f.engine.set_absolute(&path("1.6"), SetValue::Real(-2.7)).await;
        assert_eq!(dispatched(&negative), RawValue::Int(-2));
    }

    #[tokio::test]
    async fn test_enumerated_is_not_clamped() {
        let f = fixture();
        let outcome = f.engine.set_absolute(&path("1.4"), SetValue::Enum(2)).await;
        let write = outcome.write().unwrap();
        assert_eq!(write.value, RawValue::Int(2));
        assert_eq!(write.value_type, ParameterType::Enum);
    }

    #[tokio::test]
    async fn test_string_requires_string_type() {
        let f = fixture();
        let ok = f
            .engine
            .set_absolute(&path("1.3"), SetValue::String("Keys".to_string()))
            .await;
        assert_eq!(dispatched(&ok), RawValue::from("Keys"));

        let bad = f
            .engine
            .set_absolute(&path("1.1"), SetValue::String("loud".to_string()))
            .await;
        assert_eq!(
            bad.error().unwrap().to_string(),
            "Node 1.1 is not of type string (is integer)"
        );
        assert_eq!(f.provider.writes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_boolean_set_bypasses_numeric_checks() {
        let f = fixture();
        let outcome = f.engine.set_absolute(&path("1.2"), SetValue::Boolean(false)).await;
        assert_eq!(outcome.write().unwrap().value_type, ParameterType::Boolean);
    }

    #[tokio::test]
    async fn test_missing_target_is_declined() {
        let f = fixture();
        let outcome = f.engine.set_absolute(&path("1.9"), SetValue::Integer(1)).await;
        assert!(matches!(outcome, MutationOutcome::Declined(EmberError::NotFound(_))));

        let outcome = f.engine.toggle(&path("1")).await;
        assert!(matches!(
            outcome,
            MutationOutcome::Declined(EmberError::NotApplicable { .. })
        ));
        assert!(f.provider.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_expression_substitutes_and_clamps() {
        let f = fixture();
        {
            let mut registry = f.registry.write().await;
            let generation = registry.generation();
            registry.register(generation, "1.6", "Channel.Level").unwrap();
            registry.set_value("Channel.Level", "42".to_string());
        }

        let outcome = f
            .engine
            .set_expression(&path("1.1"), "$(ember:Channel.Level)")
            .await;
        assert_eq!(dispatched(&outcome), RawValue::Int(10));

        let outcome = f.engine.set_expression(&path("1.6"), "7.9").await;
        assert_eq!(dispatched(&outcome), RawValue::Int(7));

        let outcome = f.engine.set_expression(&path("1.1"), "loud").await;
        assert!(!outcome.is_dispatched());
        let outcome = f.engine.set_expression(&path("1.3"), "1").await;
        assert!(matches!(
            outcome,
            MutationOutcome::Declined(EmberError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_increment_and_decrement() {
        let f = fixture();
        let fader = path("1.1");

        let up = f.engine.adjust(&fader, Direction::Increment, 5.0).await;
        assert_eq!(dispatched(&up), RawValue::Int(10));

        // value is now 10
        let down = f.engine.adjust(&fader, Direction::Decrement, 25.0).await;
        assert_eq!(dispatched(&down), RawValue::Int(0));

        // no declared range, so no clamp
        let level = f.engine.adjust(&path("1.6"), Direction::Decrement, 5.0).await;
        assert_eq!(dispatched(&level), RawValue::Int(-2));

        let name = f.engine.adjust(&path("1.3"), Direction::Increment, 1.0).await;
        assert!(!name.is_dispatched());
    }

    #[tokio::test]
    async fn test_enumerated_step_is_not_clamped() {
        let f = fixture();
        let source = path("1.4");

        // declared range is 0..1, value 1
        let up = f.engine.adjust(&source, Direction::Increment, 5.0).await;
        assert_eq!(dispatched(&up), RawValue::Int(6));

        // value is now 6
        let down = f.engine.adjust(&source, Direction::Decrement, 10.0).await;
        assert_eq!(dispatched(&down), RawValue::Int(-4));
    }

    #[tokio::test]
    async fn test_enumerated_expression_is_not_clamped() {
        let f = fixture();
        let source = path("1.4");

        let above = f.engine.set_expression(&source, "5").await;
        assert_eq!(dispatched(&above), RawValue::Int(5));

        let below = f.engine.set_expression(&source, "-3").await;
        assert_eq!(dispatched(&below), RawValue::Int(-3));
    }

    #[tokio::test]
    async fn test_toggle() {
        let f = fixture();
        let outcome = f.engine.toggle(&path("1.2")).await;
        assert_eq!(dispatched(&outcome), RawValue::Bool(false));
        let outcome = f.engine.toggle(&path("1.2")).await;
        assert_eq!(dispatched(&outcome), RawValue::Bool(true));

        let outcome = f.engine.toggle(&path("1.1")).await;
        assert!(!outcome.is_dispatched());
        assert_eq!(f.provider.writes().await.len(), 2);
    }

    #[tokio::test]
    async fn test_label_target() {
        let f = fixture();
        {
            let mut registry = f.registry.write().await;
            let generation = registry.generation();
            registry.register(generation, "1.2", "Channel.Mute").unwrap();
        }
        let outcome = f
            .engine
            .toggle(&Target::Label("Channel.Mute".to_string()))
            .await;
        assert_eq!(outcome.write().unwrap().path, "1.2");

        let outcome = f.engine.toggle(&Target::Label("Nope".to_string())).await;
        assert!(matches!(outcome, MutationOutcome::Declined(EmberError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let f = fixture();
        f.provider.reject_writes().await;
        let outcome = f.engine.set_absolute(&path("1.1"), SetValue::Integer(1)).await;
        assert!(matches!(
            outcome,
            MutationOutcome::Declined(EmberError::TransportFailure(_))
        ));
    }
}
