//! Query filter builder: query params + model association metadata -> query descriptor.
//!
//! Keys are partitioned into reserved pagination/shape keys, association keys (recursed
//! into against the target model) and plain filter keys. Plain keys are forwarded
//! verbatim as field or operator conditions unless strict mode is requested.

use crate::error::{FieldError, ValidationError};
use crate::filter::{IncludeDescriptor, QueryDescriptor, QueryParams};
use crate::model::{EntityModel, ModelRegistry};
use serde_json::{Map, Value};

/// Keys controlling pagination and shape; never turned into conditions.
pub const RESERVED_KEYS: [&str; 5] = ["limit", "offset", "page", "order", "attributes"];

/// Key inside an association's params that forces an inner join.
pub const REQUIRED_KEY: &str = "required";

/// What to do with keys that are neither reserved, associations, model fields nor operators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownKeys {
    /// Forward them as conditions; the provider decides what they mean.
    #[default]
    Passthrough,
    /// Fail with a validation error listing each unknown key.
    Reject,
}

pub struct FilterBuilder<'a> {
    registry: &'a ModelRegistry,
    unknown_keys: UnknownKeys,
}

impl<'a> FilterBuilder<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        FilterBuilder {
            registry,
            unknown_keys: UnknownKeys::Passthrough,
        }
    }

    pub fn unknown_keys(mut self, policy: UnknownKeys) -> Self {
        self.unknown_keys = policy;
        self
    }

    pub fn build(
        &self,
        params: Option<&QueryParams>,
        model: &EntityModel,
    ) -> Result<QueryDescriptor, ValidationError> {
        let mut unknown = Vec::new();
        let descriptor = self.describe(params, model, &mut unknown);
        if self.unknown_keys == UnknownKeys::Reject && !unknown.is_empty() {
            let errors = unknown
                .into_iter()
                .map(|path| FieldError::new(path, "unknown", vec![]))
                .collect();
            return Err(ValidationError::new(model.name.clone(), errors));
        }
        Ok(descriptor)
    }

    fn describe(
        &self,
        params: Option<&QueryParams>,
        model: &EntityModel,
        unknown: &mut Vec<String>,
    ) -> QueryDescriptor {
        let Some(params) = params else {
            return QueryDescriptor::default();
        };
        let (limit, offset) = offset_limit(params).unzip();
        let shape = self.shape(params, model, "", unknown);
        QueryDescriptor {
            where_clause: shape.where_clause,
            include: shape.include,
            order: params.get("order").cloned(),
            attributes: params.get("attributes").cloned(),
            limit,
            offset,
        }
    }

    fn shape(
        &self,
        params: &QueryParams,
        model: &EntityModel,
        path: &str,
        unknown: &mut Vec<String>,
    ) -> Shape {
        let mut where_clause = Map::new();
        let mut include = Vec::new();

        for (key, value) in params {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if let Some(assoc) = model.association_named(key) {
                let nested_path = format!("{}{}.", path, key);
                let (required, nested) = match value {
                    Value::Object(nested) => {
                        let required = nested.get(REQUIRED_KEY).map(truthy);
                        let mut stripped = nested.clone();
                        stripped.remove(REQUIRED_KEY);
                        (required, stripped)
                    }
                    // `?author` alone just includes the association.
                    _ => (None, Map::new()),
                };
                let shape = match self.registry.target_of(assoc) {
                    Some(target) => self.shape(&nested, target, &nested_path, unknown),
                    None => Shape {
                        where_clause: non_empty(strip_reserved(&nested)),
                        include: None,
                    },
                };
                include.push(IncludeDescriptor {
                    model: assoc.target.clone(),
                    alias: assoc.alias.clone(),
                    required,
                    where_clause: shape.where_clause,
                    include: shape.include,
                    attributes: nested.get("attributes").cloned(),
                    order: nested.get("order").cloned(),
                });
                continue;
            }
            if !key.starts_with('$') && !model.has_field(key) {
                unknown.push(format!("{}{}", path, key));
            }
            where_clause.insert(key.clone(), value.clone());
        }

        Shape {
            where_clause: non_empty(where_clause),
            include: (!include.is_empty()).then_some(include),
        }
    }
}

struct Shape {
    where_clause: Option<Map<String, Value>>,
    include: Option<Vec<IncludeDescriptor>>,
}

/// Permissive builder: unknown keys are forwarded as conditions.
pub fn build_filter(
    params: Option<&QueryParams>,
    model: &EntityModel,
    registry: &ModelRegistry,
) -> QueryDescriptor {
    FilterBuilder::new(registry).describe(params, model, &mut Vec::new())
}

/// Pagination only activates when a size (`limit`) and a position (`page` or `offset`)
/// are both given. Returns `(limit, offset)` with `limit >= 1` and `offset >= 0`.
pub fn offset_limit(params: &QueryParams) -> Option<(u64, u64)> {
    if !(params.contains_key("page") || params.contains_key("offset")) {
        return None;
    }
    let limit = as_integer(params.get("limit")?)?;
    let offset = params
        .get("offset")
        .and_then(as_integer)
        .or_else(|| {
            let page = params.get("page").and_then(as_integer)?;
            Some(page.saturating_sub(1).saturating_mul(limit))
        })
        .unwrap_or(0);
    Some((limit.max(1) as u64, offset.max(0) as u64))
}

fn as_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.floor() as i64))
        }
        _ => None,
    }
}

/// `required` arrives as a JSON bool or as a query-string word.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !matches!(s.trim().to_ascii_lowercase().as_str(), "" | "false" | "0"),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn strip_reserved(params: &QueryParams) -> Map<String, Value> {
    params
        .iter()
        .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn non_empty(map: Map<String, Value>) -> Option<Map<String, Value>> {
    (!map.is_empty()).then_some(map)
}
