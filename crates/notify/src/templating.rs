//! Minijinja template rendering for notification messages.
//!
//! Rule templates and job instructions use `{{var}}` placeholders resolved
//! against a flat variable map. Missing variables render as empty strings
//! (lenient undefined handling); object and array values are JSON-stringified
//! before entering the template context so they render as compact JSON.

use minijinja::UndefinedBehavior;
use serde_json::{Map, Value};

use crate::traits::NotifyError;

/// Renders `{{var}}` templates against candidate/job variable maps.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        // Missing keys render as empty string instead of erroring.
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env
    }

    /// Render a template string with the given variables.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] on syntax errors. Missing
    /// variables are not errors.
    pub fn render(&self, template_str: &str, vars: &Map<String, Value>) -> Result<String, NotifyError> {
        let env = Self::build_env();
        let ctx = flatten_vars(vars);
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Render, falling back to the raw template when it does not parse.
    /// Used on dispatch paths where a malformed template must not abort
    /// the whole rule or job run.
    pub fn render_or_raw(&self, template_str: &str, vars: &Map<String, Value>) -> String {
        match self.render(template_str, vars) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(error = %e, "template failed to render, using raw text");
                template_str.to_string()
            }
        }
    }

    /// Validate that a template string parses without errors.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

/// JSON-stringify object and array values so they render as compact JSON
/// instead of minijinja's native map formatting. Scalars pass through.
fn flatten_vars(vars: &Map<String, Value>) -> Map<String, Value> {
    vars.iter()
        .map(|(k, v)| {
            let flattened = match v {
                Value::Object(_) | Value::Array(_) => {
                    Value::String(serde_json::to_string(v).unwrap_or_default())
                }
                other => other.clone(),
            };
            (k.clone(), flattened)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn renders_placeholders() {
        let r = TemplateRenderer::new();
        let v = vars(&[("title", json!("Engine check")), ("daysLeft", json!(3))]);
        let out = r.render("{{title}} due in {{daysLeft}} days", &v).unwrap();
        assert_eq!(out, "Engine check due in 3 days");
    }

    #[test]
    fn missing_variable_renders_empty() {
        let r = TemplateRenderer::new();
        let out = r.render("before [{{nothing}}] after", &Map::new()).unwrap();
        assert_eq!(out, "before [] after");
    }

    #[test]
    fn objects_render_as_json() {
        let r = TemplateRenderer::new();
        let v = vars(&[("stock", json!({"onHand": 4}))]);
        let out = r.render("{{stock}}", &v).unwrap();
        assert_eq!(out, r#"{"onHand":4}"#);
    }

    #[test]
    fn invalid_template_is_error_but_raw_fallback_holds() {
        let r = TemplateRenderer::new();
        assert!(r.render("{{ unclosed", &Map::new()).is_err());
        assert_eq!(r.render_or_raw("{{ unclosed", &Map::new()), "{{ unclosed");
    }

    #[test]
    fn validate_checks_syntax_only() {
        let r = TemplateRenderer::new();
        assert!(r.validate("Hello {{name}}").is_ok());
        assert!(r.validate("{{ unclosed").is_err());
    }
}
