/// The value tree produced by rendering a component's `generate` section,
/// and its serialization to `.json`, `.yaml`/`.yml`, `.hcl`/`.tf`, and
/// `.tfvars`.

use std::collections::BTreeMap;
use hcl::{Block, Body};
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

#[derive(Debug)]
struct GenError {
    inner: Context<GenErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum GenErrKind {
    #[fail(display = "unsupported input type for HCL conversion: {}", _0)]
    UnsupportedInputType(String),
}

impl Fail for GenError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for GenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<GenErrKind> for GenError {
    fn from(kind: GenErrKind) -> GenError {
        GenError { inner: Context::new(kind) }
    }
}
impl From<Context<GenErrKind>> for GenError {
    fn from(inner: Context<GenErrKind>) -> GenError {
        GenError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

/// The extension-agnostic value tree: total over
/// `string|bool|int|int64|float64|nil|list|map`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerateValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<GenerateValue>),
    Map(BTreeMap<String, GenerateValue>),
}

/// One entry in a component's `generate` section: either a verbatim
/// template string, or a structured value tree whose leaves get rendered
/// through the template engine before serialization. `untagged` lets a
/// stack config file write either a bare template string or a nested
/// map/list without a discriminator key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerateEntry {
    Template(String),
    Structured(GenerateValue),
}

/// Top-level keys that take exactly one label per named entry
/// (`variable.app_name { ... }`).
const ONE_LABEL_BLOCKS: &[&str] = &["variable", "output", "provider", "module"];
/// Top-level keys that take exactly two labels per named entry
/// (`resource.aws_s3_bucket.main { ... }`).
const TWO_LABEL_BLOCKS: &[&str] = &["resource", "data"];

impl GenerateValue {
    /// Serializes per the file extension recognized in spec.md §6: `.json`
    /// (2-space indent), `.yaml`/`.yml` (2-space), `.hcl`/`.tf` (labeled
    /// blocks per the rules below), `.tfvars` (flat attributes only), and
    /// unknown extensions falling back to JSON.
    pub fn serialize_for_extension(&self, filename: &str) -> Result<Vec<u8>> {
        let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
        match ext.as_str() {
            "json" => self.to_json(),
            "yaml" | "yml" => self.to_yaml(),
            "hcl" | "tf" => self.to_hcl_blocks(),
            "tfvars" => self.to_hcl_tfvars(),
            _ => self.to_json(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let v = self.to_json_value();
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, serde_json::ser::PrettyFormatter::with_indent(b"  "));
        serde::Serialize::serialize(&v, &mut ser)?;
        buf.push(b'\n');
        Ok(buf)
    }

    pub fn to_yaml(&self) -> Result<Vec<u8>> {
        let v = self.to_json_value();
        let s = serde_yaml::to_string(&v)?;
        Ok(s.into_bytes())
    }

    /// Converts to the `serde_json::Value` shape used both for JSON/YAML
    /// serialization and for handing this tree to an external template
    /// engine as a rendering context.
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            GenerateValue::Null => serde_json::Value::Null,
            GenerateValue::Bool(b) => serde_json::Value::Bool(*b),
            GenerateValue::Int(i) => serde_json::Value::from(*i),
            GenerateValue::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
            GenerateValue::String(s) => serde_json::Value::String(s.clone()),
            GenerateValue::List(items) => serde_json::Value::Array(items.iter().map(GenerateValue::to_json_value).collect()),
            GenerateValue::Map(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json_value());
                }
                serde_json::Value::Object(out)
            }
        }
    }

    fn to_hcl_expr(&self) -> Result<hcl::Expression> {
        use hcl::Expression as E;
        Ok(match self {
            GenerateValue::Null => E::Null,
            GenerateValue::Bool(b) => E::Bool(*b),
            GenerateValue::Int(i) => E::Number((*i).into()),
            GenerateValue::Float(f) => {
                let n = hcl::Number::from_f64(*f).ok_or_else(|| GenErrKind::UnsupportedInputType("non-finite float".to_string()))?;
                E::Number(n)
            }
            GenerateValue::String(s) => E::String(s.clone()),
            GenerateValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_hcl_expr()?);
                }
                E::Array(out)
            }
            GenerateValue::Map(map) => {
                // alphabetical iteration at every level (BTreeMap already sorted)
                let mut obj = hcl::Object::new();
                for (k, v) in map {
                    obj.insert(hcl::ObjectKey::Identifier(k.clone().into()), v.to_hcl_expr()?);
                }
                E::Object(obj)
            }
        })
    }

    fn as_map(&self, context: &str) -> Result<&BTreeMap<String, GenerateValue>> {
        match self {
            GenerateValue::Map(m) => Ok(m),
            _ => Err(GenErrKind::UnsupportedInputType(format!("{} must be a map", context)))?,
        }
    }

    /// `.hcl`/`.tf` serialization. Known labeled-block keys (`variable`,
    /// `output`, `provider`, `module` → one label per named entry;
    /// `resource`, `data` → two labels per named entry) expand their map
    /// value into one block per entry. Any other top-level key becomes a
    /// single unlabeled block. Inside a block body, nested maps become
    /// unlabeled child blocks and scalars become attributes.
    pub fn to_hcl_blocks(&self) -> Result<Vec<u8>> {
        let top = self.as_map("top-level HCL document")?;

        let mut builder = Body::builder();
        for (key, value) in top {
            if ONE_LABEL_BLOCKS.contains(&key.as_str()) {
                for (name, body_val) in value.as_map(key)? {
                    builder = builder.add_block(labeled_block(key, &[name], body_val)?);
                }
            } else if TWO_LABEL_BLOCKS.contains(&key.as_str()) {
                for (type_name, by_name) in value.as_map(key)? {
                    for (name, body_val) in by_name.as_map(key)? {
                        builder = builder.add_block(labeled_block(key, &[type_name, name], body_val)?);
                    }
                }
            } else {
                builder = builder.add_block(labeled_block(key, &[], value)?);
            }
        }
        let body: Body = builder.build();
        Ok(hcl::to_string(&body)?.into_bytes())
    }

    /// `.tfvars` serialization: flat attribute form only, no blocks; maps
    /// become `{k = v}` object literals; alphabetical iteration.
    pub fn to_hcl_tfvars(&self) -> Result<Vec<u8>> {
        let top = self.as_map("top-level tfvars document")?;
        let mut builder = Body::builder();
        for (k, v) in top {
            builder = builder.add_attribute((k.as_str(), v.to_hcl_expr()?));
        }
        let body: Body = builder.build();
        Ok(hcl::to_string(&body)?.into_bytes())
    }
}

fn labeled_block(key: &str, labels: &[&String], body_val: &GenerateValue) -> Result<Block> {
    let map = body_val.as_map(key)?;
    let mut builder = Block::builder(key);
    for label in labels {
        builder = builder.add_label(label.as_str());
    }
    for (k, v) in map {
        match v {
            GenerateValue::Map(_) => builder = builder.add_block(labeled_block(k, &[], v)?),
            other => builder = builder.add_attribute((k.as_str(), other.to_hcl_expr()?)),
        }
    }
    Ok(builder.build())
}

impl From<serde_json::Value> for GenerateValue {
    fn from(v: serde_json::Value) -> GenerateValue {
        match v {
            serde_json::Value::Null => GenerateValue::Null,
            serde_json::Value::Bool(b) => GenerateValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    GenerateValue::Int(i)
                } else {
                    GenerateValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => GenerateValue::String(s),
            serde_json::Value::Array(items) => GenerateValue::List(items.into_iter().map(GenerateValue::from).collect()),
            serde_json::Value::Object(map) => GenerateValue::Map(map.into_iter().map(|(k, v)| (k, GenerateValue::from(v))).collect()),
        }
    }
}
