/// Tera-backed template rendering for the generate engine (spec.md §4.12).
/// A `Template` entry is rendered whole and used verbatim as the file's
/// bytes; a `Structured` entry has every string leaf rendered in place
/// (arrays included) before the resulting tree is serialized per the
/// target file's extension.

use std::collections::BTreeMap;

use stackcat_core::{GenerateEntry, GenerateValue, TemplateContext};

#[derive(Debug)]
struct RenderError {
    inner: failure::Context<RenderErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum RenderErrKind {
    #[fail(display = "template error rendering '{}': {}", _0, _1)]
    TemplateFailed(String, String),

    #[fail(display = "failed to serialize rendered value for '{}': {}", _0, _1)]
    SerializeFailed(String, String),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for RenderError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<RenderErrKind> for RenderError {
    fn from(kind: RenderErrKind) -> RenderError {
        RenderError { inner: Context::new(kind) }
    }
}
impl From<Context<RenderErrKind>> for RenderError {
    fn from(inner: Context<RenderErrKind>) -> RenderError {
        RenderError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

/// Builds the `tera::Context` a component is rendered against, from its
/// flattened `TemplateContext`.
pub fn build_tera_context(ctx: &TemplateContext) -> Result<tera::Context> {
    let value_map = ctx.to_value_map();
    let json = value_map_to_json(&value_map);
    tera::Context::from_value(json).map_err(|e| RenderErrKind::TemplateFailed("context".to_string(), e.to_string()).into())
}

fn value_map_to_json(map: &BTreeMap<String, GenerateValue>) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    for (k, v) in map {
        out.insert(k.clone(), v.to_json_value());
    }
    serde_json::Value::Object(out)
}

/// Renders a single `{{ }}`-delimited template string against `ctx`.
pub fn render_template_string(template: &str, ctx: &tera::Context) -> Result<String> {
    tera::Tera::one_off(template, ctx, false).map_err(|e| RenderErrKind::TemplateFailed(template.chars().take(40).collect(), e.to_string()).into())
}

/// Recursively renders every string leaf of `value` as a template, keyed
/// by its path for error messages; non-string leaves pass through
/// unchanged.
pub fn render_value_leaves(value: &GenerateValue, ctx: &tera::Context) -> Result<GenerateValue> {
    match value {
        GenerateValue::String(s) => Ok(GenerateValue::String(render_template_string(s, ctx)?)),
        GenerateValue::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(render_value_leaves(item, ctx)?);
            }
            Ok(GenerateValue::List(out))
        }
        GenerateValue::Map(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(k.clone(), render_value_leaves(v, ctx)?);
            }
            Ok(GenerateValue::Map(out))
        }
        other => Ok(other.clone()),
    }
}

/// Renders `entry` for `filename` against `ctx`, producing the final
/// file bytes (spec.md §4.12): a `Template` entry is rendered as a
/// standalone file; a `Structured` entry has its leaves templated, then
/// the whole tree is serialized per `filename`'s extension.
pub fn render_entry(filename: &str, entry: &GenerateEntry, ctx: &TemplateContext) -> Result<Vec<u8>> {
    let tera_ctx = build_tera_context(ctx)?;
    match entry {
        GenerateEntry::Template(s) => {
            let rendered = render_template_string(s, &tera_ctx)?;
            Ok(rendered.into_bytes())
        }
        GenerateEntry::Structured(value) => {
            let templated = render_value_leaves(value, &tera_ctx)?;
            templated.serialize_for_extension(filename).map_err(|e| RenderErrKind::SerializeFailed(filename.to_string(), e.to_string()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as StdMap;

    fn ctx() -> TemplateContext {
        let mut vars: StdMap<String, GenerateValue> = StdMap::new();
        vars.insert("region".to_string(), GenerateValue::String("us-east-1".to_string()));
        TemplateContext::from_section("vpc", vars)
    }

    #[test]
    fn template_entry_renders_verbatim_string() {
        let entry = GenerateEntry::Template("component={{ component }} region={{ vars.region }}".to_string());
        let out = render_entry("README.md", &entry, &ctx()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "component=vpc region=us-east-1");
    }

    #[test]
    fn structured_entry_templates_leaves_then_serializes_json() {
        let mut top = StdMap::new();
        top.insert("name".to_string(), GenerateValue::String("{{ component }}-bucket".to_string()));
        top.insert("count".to_string(), GenerateValue::Int(3));
        let entry = GenerateEntry::Structured(GenerateValue::Map(top));
        let out = render_entry("outputs.json", &entry, &ctx()).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["name"], serde_json::json!("vpc-bucket"));
        assert_eq!(parsed["count"], serde_json::json!(3));
    }

    #[test]
    fn structured_entry_templates_list_leaves() {
        let mut top = StdMap::new();
        top.insert("tags".to_string(), GenerateValue::List(vec![GenerateValue::String("{{ component }}".to_string())]));
        let entry = GenerateEntry::Structured(GenerateValue::Map(top));
        let out = render_entry("outputs.json", &entry, &ctx()).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["tags"][0], serde_json::json!("vpc"));
    }

    #[test]
    fn invalid_template_syntax_errors() {
        let entry = GenerateEntry::Template("{{ unterminated".to_string());
        assert!(render_entry("x.txt", &entry, &ctx()).is_err());
    }
}
