//! Parameter Filters
//!
//! A [`ParameterFilter`] is a predicate over a call's arguments. Each
//! evaluation gets a fresh [`FilterScope`] holding only the arguments the
//! caller actually bound, minus the host's cross-cutting parameters, so no
//! state survives between evaluations.

use crate::args::CallArgs;
use crate::error::{MockError, Result};
use crate::signature::Signature;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

type PredicateFn = dyn Fn(&FilterScope) -> anyhow::Result<Value> + Send + Sync;

/// The variables a filter can see during one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterScope {
    variables: Vec<(String, Value)>,
    args: Vec<Value>,
}

impl FilterScope {
    /// Build a scope for one evaluation of a filter against `args`.
    pub fn bind(args: &CallArgs, signature: &Signature, extra_common: &[String]) -> Self {
        let variables = args
            .named
            .iter()
            .filter(|(name, _)| !signature.is_common_parameter(name, extra_common))
            .cloned()
            .collect();
        Self {
            variables,
            args: args.positional.clone(),
        }
    }

    /// A bound argument by parameter name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// A bound argument, or `$null` when it was not passed.
    pub fn var(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or_default()
    }

    /// Unbound positional arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(k, _)| k.as_str())
    }
}

/// A predicate deciding whether a mock block applies to a call.
#[derive(Clone)]
pub struct ParameterFilter {
    description: String,
    predicate: Option<Arc<PredicateFn>>,
}

impl ParameterFilter {
    /// The catch-all filter.
    pub fn always() -> Self {
        Self {
            description: "{ $True }".to_string(),
            predicate: None,
        }
    }

    /// A filter returning an arbitrary value. Anything but a boolean is an
    /// evaluation error.
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&FilterScope) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Some(Arc::new(predicate)),
        }
    }

    pub fn from_fn<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&FilterScope) -> bool + Send + Sync + 'static,
    {
        Self::new(description, move |scope| Ok(Value::Bool(predicate(scope))))
    }

    /// Every `(name, value)` pair must be bound with an equal value.
    pub fn equals<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let pairs: Vec<(String, Value)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let description = format!(
            "{{ {} }}",
            pairs
                .iter()
                .map(|(k, v)| format!("${} -eq '{}'", k, v))
                .collect::<Vec<_>>()
                .join(" -and ")
        );
        Self::from_fn(description, move |scope| {
            pairs.iter().all(|(k, v)| scope.get(k) == Some(v))
        })
    }

    /// Whether this is the catch-all filter.
    pub fn is_default(&self) -> bool {
        self.predicate.is_none()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Evaluate against a call. Errors raised by the predicate propagate
    /// unchanged.
    pub fn evaluate(
        &self,
        args: &CallArgs,
        signature: &Signature,
        extra_common: &[String],
    ) -> Result<bool> {
        let predicate = match &self.predicate {
            None => return Ok(true),
            Some(p) => p,
        };
        let scope = FilterScope::bind(args, signature, extra_common);
        match predicate(&scope).map_err(MockError::from_script)? {
            Value::Bool(b) => Ok(b),
            other => Err(MockError::NonBooleanFilter {
                filter: self.description.clone(),
                found: other.type_name().to_string(),
            }),
        }
    }
}

impl Default for ParameterFilter {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Debug for ParameterFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParameterFilter")
            .field(&self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Parameter;

    fn get_item() -> Signature {
        Signature::cmdlet("Get-Item").param(Parameter::new("Path").at(0))
    }

    #[test]
    fn test_default_filter_matches_everything() -> Result<()> {
        let filter = ParameterFilter::always();
        assert!(filter.is_default());
        assert!(filter.evaluate(&CallArgs::new(), &get_item(), &[])?);
        Ok(())
    }

    #[test]
    fn test_common_parameters_are_hidden() -> Result<()> {
        let filter = ParameterFilter::from_fn("{ $Verbose }", |s| s.get("Verbose").is_some());
        let args = CallArgs::new().with("Path", "/tmp").with("Verbose", true);
        assert!(!filter.evaluate(&args, &get_item(), &[])?);

        let names = ParameterFilter::from_fn("names", |s| s.names().count() == 1);
        assert!(names.evaluate(&args, &get_item(), &[])?);
        Ok(())
    }

    #[test]
    fn test_only_bound_arguments_are_visible() -> Result<()> {
        let filter = ParameterFilter::from_fn("{ $null -eq $Path }", |s| s.var("Path").is_null());
        assert!(filter.evaluate(&CallArgs::new(), &get_item(), &[])?);
        assert!(!filter.evaluate(&CallArgs::new().with("Path", "x"), &get_item(), &[])?);
        Ok(())
    }

    #[test]
    fn test_positional_arguments_are_exposed() -> Result<()> {
        let filter = ParameterFilter::from_fn("{ $args[0] -eq 1 }", |s| {
            s.args().first() == Some(&Value::Int(1))
        });
        assert!(filter.evaluate(&CallArgs::new().arg(1), &get_item(), &[])?);
        Ok(())
    }

    #[test]
    fn test_non_boolean_result_is_an_error() {
        let filter = ParameterFilter::new("{ 'yes' }", |_| Ok(Value::from("yes")));
        let err = filter
            .evaluate(&CallArgs::new(), &get_item(), &[])
            .unwrap_err();
        assert!(matches!(err, MockError::NonBooleanFilter { found, .. } if found == "string"));
    }

    #[test]
    fn test_predicate_errors_propagate_verbatim() {
        let filter = ParameterFilter::new("{ throw }", |_| Err(anyhow::anyhow!("boom")));
        let err = filter
            .evaluate(&CallArgs::new(), &get_item(), &[])
            .unwrap_err();
        assert!(matches!(err, MockError::Script(_)));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_equals_filter() -> Result<()> {
        let filter = ParameterFilter::equals([("Path", "/tmp")]);
        assert_eq!(filter.description(), "{ $Path -eq '/tmp' }");
        assert!(filter.evaluate(&CallArgs::new().with("path", "/tmp"), &get_item(), &[])?);
        assert!(!filter.evaluate(&CallArgs::new().with("Path", "/etc"), &get_item(), &[])?);
        Ok(())
    }
}
