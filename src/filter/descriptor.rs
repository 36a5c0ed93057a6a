//! Structured query handed to persistence providers.

use serde::Serialize;
use serde_json::{Map, Value};

/// Untyped caller-supplied parameters (query string or JSON object).
pub type QueryParams = Map<String, Value>;

/// `where` and `include` are present only when non-empty; absence means no constraint.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryDescriptor {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<IncludeDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// One joined association, possibly with its own nested constraints.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IncludeDescriptor {
    /// Target model name.
    pub model: String,
    #[serde(rename = "as")]
    pub alias: String,
    /// `Some(true)` forces an inner join; `None` leaves the provider default (outer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<IncludeDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
    /// Order of a to-many include's rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Value>,
}

impl IncludeDescriptor {
    pub fn is_required(&self) -> bool {
        self.required == Some(true)
    }

    pub fn includes(&self) -> &[IncludeDescriptor] {
        self.include.as_deref().unwrap_or(&[])
    }

    pub fn attribute_list(&self) -> Option<Vec<String>> {
        attribute_list(self.attributes.as_ref())
    }

    pub fn order_items(&self) -> Result<Vec<OrderItem>, String> {
        order_items(self.order.as_ref())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "ASC" => Some(OrderDirection::Asc),
            "DESC" => Some(OrderDirection::Desc),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderItem {
    pub field: String,
    pub direction: OrderDirection,
}

impl QueryDescriptor {
    /// Descriptor constraining only by an exact `where` map.
    pub fn with_where(where_clause: Map<String, Value>) -> Self {
        QueryDescriptor {
            where_clause: (!where_clause.is_empty()).then_some(where_clause),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == QueryDescriptor::default()
    }

    pub fn includes(&self) -> &[IncludeDescriptor] {
        self.include.as_deref().unwrap_or(&[])
    }

    pub fn order_items(&self) -> Result<Vec<OrderItem>, String> {
        order_items(self.order.as_ref())
    }

    /// Projection list, if any: an array of names or a comma-separated string.
    pub fn attribute_list(&self) -> Option<Vec<String>> {
        attribute_list(self.attributes.as_ref())
    }
}

/// Parse `order`: `"name"`, `"name DESC"`, `"a,b DESC"`, `["name", ["age", "DESC"]]`.
fn order_items(order: Option<&Value>) -> Result<Vec<OrderItem>, String> {
    let Some(order) = order else {
        return Ok(Vec::new());
    };
    match order {
        Value::String(s) => s.split(',').filter(|p| !p.trim().is_empty()).map(parse_order_str).collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => parse_order_str(s),
                Value::Array(pair) => {
                    let field = pair
                        .first()
                        .and_then(Value::as_str)
                        .ok_or_else(|| format!("invalid order item: {}", item))?;
                    let dir = pair.get(1).and_then(Value::as_str).unwrap_or("ASC");
                    let direction = OrderDirection::parse(dir)
                        .ok_or_else(|| format!("invalid order direction: {}", dir))?;
                    Ok(OrderItem {
                        field: field.to_string(),
                        direction,
                    })
                }
                other => Err(format!("invalid order item: {}", other)),
            })
            .collect(),
        other => Err(format!("invalid order: {}", other)),
    }
}

pub(crate) fn attribute_list(attributes: Option<&Value>) -> Option<Vec<String>> {
    match attributes? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

/// Operands of `$or`/`$and`: a list of condition maps, or one map whose entries are separate branches.
pub fn logical_branches(cond: &Value) -> Vec<Map<String, Value>> {
    match cond {
        Value::Array(items) => items.iter().filter_map(Value::as_object).cloned().collect(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let mut single = Map::new();
                single.insert(k.clone(), v.clone());
                single
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// `{"$gt": 1, "$lt": 5}`: every key is an operator.
pub fn is_operator_map(cond: &Value) -> bool {
    matches!(cond, Value::Object(m) if !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

fn parse_order_str(s: &str) -> Result<OrderItem, String> {
    let mut parts = s.split_whitespace();
    let field = parts.next().ok_or_else(|| "empty order item".to_string())?;
    let dir = parts.next().unwrap_or("ASC");
    if parts.next().is_some() {
        return Err(format!("invalid order item: {}", s));
    }
    let direction =
        OrderDirection::parse(dir).ok_or_else(|| format!("invalid order direction: {}", dir))?;
    Ok(OrderItem {
        field: field.to_string(),
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_order(order: Value) -> QueryDescriptor {
        QueryDescriptor {
            order: Some(order),
            ..Default::default()
        }
    }

    #[test]
    fn parses_order_shapes() {
        let items = with_order(json!(["name", ["age", "desc"]])).order_items().unwrap();
        assert_eq!(items[0].field, "name");
        assert_eq!(items[0].direction, OrderDirection::Asc);
        assert_eq!(items[1].direction, OrderDirection::Desc);

        let items = with_order(json!("name DESC, id")).order_items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].direction, OrderDirection::Desc);
        assert_eq!(items[1].field, "id");
    }

    #[test]
    fn rejects_unknown_direction() {
        assert!(with_order(json!([["age", "sideways"]])).order_items().is_err());
        assert!(with_order(json!("age; DROP TABLE x")).order_items().is_err());
    }

    #[test]
    fn serializes_with_provider_names() {
        let d = QueryDescriptor {
            where_clause: Some(json!({ "name": "x" }).as_object().cloned().unwrap()),
            include: Some(vec![IncludeDescriptor {
                model: "Author".into(),
                alias: "author".into(),
                required: Some(true),
                where_clause: None,
                include: None,
                attributes: None,
                order: None,
            }]),
            limit: Some(10),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&d).unwrap(),
            json!({
                "where": { "name": "x" },
                "include": [{ "model": "Author", "as": "author", "required": true }],
                "limit": 10
            })
        );
    }
}
