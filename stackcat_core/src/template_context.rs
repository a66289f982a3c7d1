/// Builds the flat template context a component's `generate` templates and
/// config files are rendered against.

use std::collections::BTreeMap;
use crate::generate_value::GenerateValue;

#[derive(Debug)]
struct CtxError {
    inner: Context<CtxErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum CtxErrKind {
    #[fail(display = "missing required context field '{}'", _0)]
    MissingField(String),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for CtxError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for CtxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<CtxErrKind> for CtxError {
    fn from(kind: CtxErrKind) -> CtxError {
        CtxError { inner: Context::new(kind) }
    }
}
impl From<Context<CtxErrKind>> for CtxError {
    fn from(inner: Context<CtxErrKind>) -> CtxError {
        CtxError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

/// One resolved `vars`/`settings`/`env`/etc. subsection, carried as a sorted
/// map so downstream serialization stays deterministic.
pub type ComponentSection = BTreeMap<String, GenerateValue>;

/// The flat context a component is rendered against: spec.md §4.14's
/// standard keys plus the component's own sections.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub atmos_component: String,
    pub atmos_stack: String,
    pub atmos_stack_file: String,
    pub component: String,
    pub base_component: Option<String>,
    pub namespace: Option<String>,
    pub tenant: Option<String>,
    pub environment: Option<String>,
    pub stage: Option<String>,
    pub region: Option<String>,
    pub workspace: Option<String>,
    pub vars: ComponentSection,
    pub settings: ComponentSection,
    pub env: ComponentSection,
    pub backend: ComponentSection,
    pub backend_type: Option<String>,
    pub providers: ComponentSection,
    pub metadata: ComponentSection,
}

/// Input gathered by the orchestrator for one component instance within one
/// stack, before it's turned into a `TemplateContext`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentInstance {
    pub atmos_component: String,
    pub atmos_stack: String,
    pub atmos_stack_file: String,
    pub component: String,
    pub base_component: Option<String>,
    pub vars: ComponentSection,
    pub settings: ComponentSection,
    pub env: ComponentSection,
    pub backend: ComponentSection,
    pub backend_type: Option<String>,
    pub providers: ComponentSection,
    pub metadata: ComponentSection,
}

const LIFTED_VAR_KEYS: &[&str] = &["namespace", "tenant", "environment", "stage", "region", "workspace"];

fn lift_string(section: &ComponentSection, key: &str) -> Option<String> {
    match section.get(key) {
        Some(GenerateValue::String(s)) => Some(s.clone()),
        _ => None,
    }
}

impl TemplateContext {
    /// Builds the full context for a component instance, requiring the
    /// identifying fields (`atmos_component`, `atmos_stack`,
    /// `atmos_stack_file`, `component`) to be present, and lifting the
    /// standard stack-identity vars (`namespace`, `tenant`, `environment`,
    /// `stage`, `region`, `workspace`) out of `vars` when present there.
    pub fn build(instance: &ComponentInstance) -> Result<TemplateContext> {
        if instance.atmos_component.is_empty() {
            return Err(CtxErrKind::MissingField("atmos_component".to_string()))?;
        }
        if instance.atmos_stack.is_empty() {
            return Err(CtxErrKind::MissingField("atmos_stack".to_string()))?;
        }
        if instance.component.is_empty() {
            return Err(CtxErrKind::MissingField("component".to_string()))?;
        }

        Ok(TemplateContext {
            atmos_component: instance.atmos_component.clone(),
            atmos_stack: instance.atmos_stack.clone(),
            atmos_stack_file: instance.atmos_stack_file.clone(),
            component: instance.component.clone(),
            base_component: instance.base_component.clone(),
            namespace: lift_string(&instance.vars, "namespace"),
            tenant: lift_string(&instance.vars, "tenant"),
            environment: lift_string(&instance.vars, "environment"),
            stage: lift_string(&instance.vars, "stage"),
            region: lift_string(&instance.vars, "region"),
            workspace: lift_string(&instance.vars, "workspace").or_else(|| Some(instance.atmos_stack.clone())),
            vars: instance.vars.clone(),
            settings: instance.settings.clone(),
            env: instance.env.clone(),
            backend: instance.backend.clone(),
            backend_type: instance.backend_type.clone(),
            providers: instance.providers.clone(),
            metadata: instance.metadata.clone(),
        })
    }

    /// A lighter builder for contexts assembled from a single free-floating
    /// section (e.g. a one-off template render outside full stack
    /// processing): tolerates missing identifying fields, defaulting them to
    /// empty strings, and still lifts the standard vars out of `vars` if
    /// given.
    pub fn from_section(component: &str, vars: ComponentSection) -> TemplateContext {
        TemplateContext {
            atmos_component: component.to_string(),
            component: component.to_string(),
            namespace: lift_string(&vars, "namespace"),
            tenant: lift_string(&vars, "tenant"),
            environment: lift_string(&vars, "environment"),
            stage: lift_string(&vars, "stage"),
            region: lift_string(&vars, "region"),
            workspace: lift_string(&vars, "workspace"),
            vars,
            ..Default::default()
        }
    }

    /// Flattens the context into the map shape the template engine expects:
    /// top-level scalar keys plus nested section maps.
    pub fn to_value_map(&self) -> BTreeMap<String, GenerateValue> {
        let mut out = BTreeMap::new();
        out.insert("atmos_component".to_string(), GenerateValue::String(self.atmos_component.clone()));
        out.insert("atmos_stack".to_string(), GenerateValue::String(self.atmos_stack.clone()));
        out.insert("atmos_stack_file".to_string(), GenerateValue::String(self.atmos_stack_file.clone()));
        out.insert("component".to_string(), GenerateValue::String(self.component.clone()));
        if let Some(v) = &self.base_component {
            out.insert("base_component".to_string(), GenerateValue::String(v.clone()));
        }
        for key in LIFTED_VAR_KEYS {
            let value = match *key {
                "namespace" => &self.namespace,
                "tenant" => &self.tenant,
                "environment" => &self.environment,
                "stage" => &self.stage,
                "region" => &self.region,
                "workspace" => &self.workspace,
                _ => unreachable!(),
            };
            if let Some(v) = value {
                out.insert(key.to_string(), GenerateValue::String(v.clone()));
            }
        }
        out.insert("vars".to_string(), GenerateValue::Map(self.vars.clone()));
        out.insert("settings".to_string(), GenerateValue::Map(self.settings.clone()));
        out.insert("env".to_string(), GenerateValue::Map(self.env.clone()));
        out.insert("backend".to_string(), GenerateValue::Map(self.backend.clone()));
        if let Some(v) = &self.backend_type {
            out.insert("backend_type".to_string(), GenerateValue::String(v.clone()));
        }
        out.insert("providers".to_string(), GenerateValue::Map(self.providers.clone()));
        out.insert("metadata".to_string(), GenerateValue::Map(self.metadata.clone()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_section(entries: Vec<(&str, &str)>) -> ComponentSection {
        entries.into_iter().map(|(k, v)| (k.to_string(), GenerateValue::String(v.to_string()))).collect()
    }

    #[test]
    fn requires_identifying_fields() {
        let instance = ComponentInstance { component: "vpc".to_string(), ..Default::default() };
        assert!(TemplateContext::build(&instance).is_err());
    }

    #[test]
    fn lifts_standard_vars_from_vars_section() {
        let instance = ComponentInstance {
            atmos_component: "vpc".to_string(),
            atmos_stack: "core-ue1-prod".to_string(),
            atmos_stack_file: "orgs/core/ue1/prod.yaml".to_string(),
            component: "vpc".to_string(),
            vars: string_section(vec![("tenant", "core"), ("environment", "ue1"), ("stage", "prod")]),
            ..Default::default()
        };
        let ctx = TemplateContext::build(&instance).unwrap();
        assert_eq!(ctx.tenant.as_deref(), Some("core"));
        assert_eq!(ctx.environment.as_deref(), Some("ue1"));
        assert_eq!(ctx.stage.as_deref(), Some("prod"));
    }

    #[test]
    fn workspace_defaults_to_stack_name() {
        let instance = ComponentInstance {
            atmos_component: "vpc".to_string(),
            atmos_stack: "core-ue1-prod".to_string(),
            component: "vpc".to_string(),
            ..Default::default()
        };
        let ctx = TemplateContext::build(&instance).unwrap();
        assert_eq!(ctx.workspace.as_deref(), Some("core-ue1-prod"));
    }

    #[test]
    fn from_section_tolerates_missing_identity() {
        let ctx = TemplateContext::from_section("vpc", string_section(vec![("region", "us-east-1")]));
        assert_eq!(ctx.component, "vpc");
        assert_eq!(ctx.region.as_deref(), Some("us-east-1"));
        assert!(ctx.atmos_stack.is_empty());
    }

    #[test]
    fn to_value_map_includes_sections() {
        let ctx = TemplateContext::from_section("vpc", string_section(vec![("region", "us-east-1")]));
        let map = ctx.to_value_map();
        assert!(map.contains_key("vars"));
        assert!(map.contains_key("settings"));
        assert_eq!(map.get("region"), Some(&GenerateValue::String("us-east-1".to_string())));
    }
}
