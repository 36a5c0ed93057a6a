//! Builds parameterized SELECT, COUNT, INSERT, UPDATE and DELETE from registered models and
//! query descriptors. The root table is aliased `t0`; includes become correlated JSON subqueries.

use crate::error::ProviderError;
use crate::filter::{
    is_operator_map, logical_branches, IncludeDescriptor, OrderDirection, OrderItem, QueryDescriptor,
};
use crate::model::{Association, Cardinality, EntityModel, FieldDef, FieldKind, ModelRegistry};
use crate::sql::params::text_param;
use serde_json::{Map, Value};

type SqlResult<T> = Result<T, ProviderError>;

/// Quote identifier for PostgreSQL (safe: only from registered models).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quoted(schema), quoted(table)),
        None => quoted(table),
    }
}

pub fn qualified_table(model: &EntityModel) -> String {
    qualified(model.schema.as_deref(), &model.table)
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
    aliases: usize,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
            aliases: 0,
        }
    }

    /// Push a value and return its placeholder cast to `pg_type`.
    fn push_param(&mut self, v: Value, pg_type: &str) -> String {
        self.params.push(v);
        format!("${}::{}", self.params.len(), pg_type)
    }

    fn next_alias(&mut self) -> String {
        let alias = format!("t{}", self.aliases);
        self.aliases += 1;
        alias
    }
}

fn column(alias: &str, name: &str) -> String {
    format!("{}.{}", alias, quoted(name))
}

/// Select list for `model`. Numeric columns come back as text so no precision is lost.
fn select_columns(alias: &str, model: &EntityModel, attributes: Option<&[String]>) -> SqlResult<Vec<String>> {
    if let Some(unknown) = attributes.and_then(|a| a.iter().find(|name| !model.has_field(name))) {
        return Err(unknown_field(model, unknown));
    }
    Ok(model
        .fields
        .iter()
        .filter(|f| attributes.map(|a| a.iter().any(|n| n == &f.name)).unwrap_or(true))
        .map(|f| {
            let expr = column(alias, &f.name);
            if f.kind == FieldKind::Decimal {
                format!("{}::text AS {}", expr, quoted(&f.name))
            } else {
                format!("{} AS {}", expr, quoted(&f.name))
            }
        })
        .collect())
}

fn unknown_field(model: &EntityModel, field: &str) -> ProviderError {
    ProviderError::UnknownField {
        model: model.name.clone(),
        field: field.to_string(),
    }
}

fn pk_field(model: &EntityModel) -> SqlResult<&FieldDef> {
    model
        .primary_key()
        .ok_or_else(|| ProviderError::InvalidQuery(format!("{} has no primary key", model.name)))
}

/// SELECT rows matching `query`, includes rendered under their aliases.
pub fn select(registry: &ModelRegistry, model: &EntityModel, query: &QueryDescriptor) -> SqlResult<QueryBuf> {
    let mut q = QueryBuf::new();
    let alias = q.next_alias();
    let mut parts = select_columns(&alias, model, query.attribute_list().as_deref())?;
    for inc in query.includes() {
        let sub = include_subquery(&mut q, registry, model, &alias, inc)?;
        parts.push(sub);
    }
    let conds = conditions(&mut q, registry, model, &alias, query.where_clause.as_ref(), query.includes())?;
    let order = order_by(&alias, model, query.order_items())?;
    let mut sql = format!(
        "SELECT {} FROM {} {}{} ORDER BY {}",
        parts.join(", "),
        qualified_table(model),
        alias,
        where_sql(&conds),
        order
    );
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = query.offset {
        sql.push_str(&format!(" OFFSET {}", offset));
    }
    q.sql = sql;
    Ok(q)
}

/// COUNT of rows matching `query`, ignoring pagination.
pub fn count(registry: &ModelRegistry, model: &EntityModel, query: &QueryDescriptor) -> SqlResult<QueryBuf> {
    let mut q = QueryBuf::new();
    let alias = q.next_alias();
    let conds = conditions(&mut q, registry, model, &alias, query.where_clause.as_ref(), query.includes())?;
    q.sql = format!(
        "SELECT COUNT(*) AS \"count\" FROM {} {}{}",
        qualified_table(model),
        alias,
        where_sql(&conds)
    );
    Ok(q)
}

fn where_sql(conds: &[String]) -> String {
    if conds.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conds.join(" AND "))
    }
}

/// ORDER BY list; the primary key ascending when no order is given.
fn order_by(alias: &str, model: &EntityModel, items: Result<Vec<OrderItem>, String>) -> SqlResult<String> {
    let mut items = items.map_err(ProviderError::InvalidQuery)?;
    if items.is_empty() {
        items = model
            .primary_keys()
            .into_iter()
            .map(|k| OrderItem {
                field: k.to_string(),
                direction: OrderDirection::Asc,
            })
            .collect();
    }
    items
        .iter()
        .map(|item| {
            if model.has_field(&item.field) {
                Ok(format!("{} {}", column(alias, &item.field), item.direction.as_sql()))
            } else {
                Err(unknown_field(model, &item.field))
            }
        })
        .collect::<SqlResult<Vec<_>>>()
        .map(|parts| parts.join(", "))
}

/// Where conditions of one level plus an EXISTS per required include.
fn conditions(
    q: &mut QueryBuf,
    registry: &ModelRegistry,
    model: &EntityModel,
    alias: &str,
    where_clause: Option<&Map<String, Value>>,
    includes: &[IncludeDescriptor],
) -> SqlResult<Vec<String>> {
    let mut conds = match where_clause {
        Some(w) => where_map(q, model, alias, w)?,
        None => Vec::new(),
    };
    for inc in includes.iter().filter(|i| i.is_required()) {
        let exists = exists_clause(q, registry, model, alias, inc)?;
        conds.push(exists);
    }
    Ok(conds)
}

/// FROM clause for the target of `assoc` and the condition tying it to the source row.
fn join_target(
    q: &mut QueryBuf,
    source: &EntityModel,
    source_alias: &str,
    assoc: &Association,
    target: &EntityModel,
    target_alias: &str,
) -> SqlResult<(String, String)> {
    let from = format!("{} {}", qualified_table(target), target_alias);
    Ok(match assoc.cardinality {
        Cardinality::BelongsTo => (
            from,
            format!(
                "{} = {}",
                column(target_alias, &pk_field(target)?.name),
                column(source_alias, &assoc.foreign_key)
            ),
        ),
        Cardinality::HasOne | Cardinality::HasMany => (
            from,
            format!(
                "{} = {}",
                column(target_alias, &assoc.foreign_key),
                column(source_alias, &pk_field(source)?.name)
            ),
        ),
        Cardinality::BelongsToMany => {
            let through = assoc.through.as_ref().ok_or_else(|| {
                ProviderError::InvalidQuery(format!("association '{}' has no join table", assoc.alias))
            })?;
            let j = q.next_alias();
            (
                format!(
                    "{} JOIN {} {} ON {} = {}",
                    from,
                    qualified(source.schema.as_deref(), &through.table),
                    j,
                    column(&j, &through.other_key),
                    column(target_alias, &pk_field(target)?.name)
                ),
                format!("{} = {}", column(&j, &assoc.foreign_key), column(source_alias, &pk_field(source)?.name)),
            )
        }
    })
}

fn resolve<'r>(
    registry: &'r ModelRegistry,
    source: &'r EntityModel,
    inc: &IncludeDescriptor,
) -> SqlResult<(&'r Association, &'r EntityModel)> {
    let assoc = source.association_named(&inc.alias).ok_or_else(|| {
        ProviderError::InvalidQuery(format!("{} has no association '{}'", source.name, inc.alias))
    })?;
    let target = registry.require(&inc.model)?;
    Ok((assoc, target.as_ref()))
}

fn include_subquery(
    q: &mut QueryBuf,
    registry: &ModelRegistry,
    source: &EntityModel,
    source_alias: &str,
    inc: &IncludeDescriptor,
) -> SqlResult<String> {
    let (assoc, target) = resolve(registry, source, inc)?;
    let alias = q.next_alias();
    let (from, join) = join_target(q, source, source_alias, assoc, target, &alias)?;
    let mut cols = select_columns(&alias, target, inc.attribute_list().as_deref())?;
    for nested in inc.includes() {
        let sub = include_subquery(q, registry, target, &alias, nested)?;
        cols.push(sub);
    }
    let mut conds = vec![join];
    conds.extend(conditions(q, registry, target, &alias, inc.where_clause.as_ref(), inc.includes())?);
    let inner = format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        cols.join(", "),
        from,
        where_sql(&conds),
        order_by(&alias, target, inc.order_items())?
    );
    let sub = if assoc.cardinality.is_to_many() {
        format!("(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM ({}) sub)", inner)
    } else {
        format!("(SELECT row_to_json(sub) FROM ({} LIMIT 1) sub)", inner)
    };
    Ok(format!("{} AS {}", sub, quoted(&inc.alias)))
}

fn exists_clause(
    q: &mut QueryBuf,
    registry: &ModelRegistry,
    source: &EntityModel,
    source_alias: &str,
    inc: &IncludeDescriptor,
) -> SqlResult<String> {
    let (assoc, target) = resolve(registry, source, inc)?;
    let alias = q.next_alias();
    let (from, join) = join_target(q, source, source_alias, assoc, target, &alias)?;
    let mut conds = vec![join];
    conds.extend(conditions(q, registry, target, &alias, inc.where_clause.as_ref(), inc.includes())?);
    Ok(format!("EXISTS (SELECT 1 FROM {}{})", from, where_sql(&conds)))
}

fn where_map(q: &mut QueryBuf, model: &EntityModel, alias: &str, map: &Map<String, Value>) -> SqlResult<Vec<String>> {
    let mut out = Vec::with_capacity(map.len());
    for (key, cond) in map {
        let sql = match key.as_str() {
            "$or" | "$and" => {
                let joiner = if key == "$or" { " OR " } else { " AND " };
                let mut parts = Vec::new();
                for branch in logical_branches(cond) {
                    let inner = where_map(q, model, alias, &branch)?;
                    parts.push(group(&inner, " AND ", "TRUE"));
                }
                let empty = if key == "$or" { "FALSE" } else { "TRUE" };
                group(&parts, joiner, empty)
            }
            "$not" => match cond {
                Value::Object(inner) => {
                    let inner = where_map(q, model, alias, inner)?;
                    format!("NOT {}", group(&inner, " AND ", "TRUE"))
                }
                _ => return Err(ProviderError::InvalidQuery("$not expects an object".into())),
            },
            op if op.starts_with('$') => return Err(ProviderError::UnsupportedOperator(op.to_string())),
            field => {
                let def = model.field_named(field).ok_or_else(|| unknown_field(model, field))?;
                field_condition(q, &column(alias, &def.name), def.kind.pg_type(), cond)?
            }
        };
        out.push(sql);
    }
    Ok(out)
}

fn group(parts: &[String], joiner: &str, empty: &str) -> String {
    match parts.len() {
        0 => empty.to_string(),
        1 => parts[0].clone(),
        _ => format!("({})", parts.join(joiner)),
    }
}

fn field_condition(q: &mut QueryBuf, col: &str, pg_type: &str, cond: &Value) -> SqlResult<String> {
    match cond {
        Value::Object(ops) if is_operator_map(cond) => {
            let mut parts = Vec::with_capacity(ops.len());
            for (op, operand) in ops {
                parts.push(operator(q, col, pg_type, op, operand)?);
            }
            Ok(group(&parts, " AND ", "TRUE"))
        }
        Value::Array(items) => Ok(in_list(q, col, pg_type, items, false)),
        Value::Null => Ok(format!("{} IS NULL", col)),
        other => Ok(format!("{} = {}", col, q.push_param(other.clone(), pg_type))),
    }
}

fn in_list(q: &mut QueryBuf, col: &str, pg_type: &str, items: &[Value], negate: bool) -> String {
    if items.is_empty() {
        return if negate {
            format!("{} IS NOT NULL", col)
        } else {
            "FALSE".to_string()
        };
    }
    let placeholders: Vec<String> = items.iter().map(|v| q.push_param(v.clone(), pg_type)).collect();
    let not = if negate { "NOT " } else { "" };
    format!("{} {}IN ({})", col, not, placeholders.join(", "))
}

/// Escape LIKE wildcards so the operand matches literally.
fn like_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn operator(q: &mut QueryBuf, col: &str, pg_type: &str, op: &str, operand: &Value) -> SqlResult<String> {
    let list = |v: &Value| match v {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };
    let compare = |q: &mut QueryBuf, sym: &str| format!("{} {} {}", col, sym, q.push_param(operand.clone(), pg_type));
    Ok(match (op, operand) {
        ("$eq" | "$is", Value::Null) => format!("{} IS NULL", col),
        ("$ne" | "$not", Value::Null) => format!("{} IS NOT NULL", col),
        ("$eq" | "$is", _) => compare(q, "="),
        ("$ne", _) => compare(q, "<>"),
        ("$not", _) => compare(q, "IS DISTINCT FROM"),
        ("$gt", _) => compare(q, ">"),
        ("$gte", _) => compare(q, ">="),
        ("$lt", _) => compare(q, "<"),
        ("$lte", _) => compare(q, "<="),
        ("$in", _) => in_list(q, col, pg_type, &list(operand), false),
        ("$notIn", _) => in_list(q, col, pg_type, &list(operand), true),
        ("$like" | "$notLike" | "$iLike" | "$notILike", _) => {
            let sym = match op {
                "$like" => "LIKE",
                "$notLike" => "NOT LIKE",
                "$iLike" => "ILIKE",
                _ => "NOT ILIKE",
            };
            format!("{}::text {} {}", col, sym, q.push_param(operand.clone(), "text"))
        }
        ("$startsWith" | "$endsWith" | "$substring", _) => {
            let Some(text) = text_param(operand) else {
                return Ok("FALSE".to_string());
            };
            let literal = like_literal(&text);
            let pattern = match op {
                "$startsWith" => format!("{}%", literal),
                "$endsWith" => format!("%{}", literal),
                _ => format!("%{}%", literal),
            };
            format!("{}::text LIKE {}", col, q.push_param(Value::String(pattern), "text"))
        }
        ("$between" | "$notBetween", _) => {
            let bounds = list(operand);
            let (Some(low), Some(high)) = (bounds.first(), bounds.get(1)) else {
                return Err(ProviderError::InvalidQuery(format!("{} expects two bounds", op)));
            };
            let not = if op == "$notBetween" { "NOT " } else { "" };
            let low = q.push_param(low.clone(), pg_type);
            let high = q.push_param(high.clone(), pg_type);
            format!("{} {}BETWEEN {} AND {}", col, not, low, high)
        }
        _ => return Err(ProviderError::UnsupportedOperator(op.to_string())),
    })
}

fn pk_conditions(q: &mut QueryBuf, model: &EntityModel, alias: &str, pk: &Map<String, Value>) -> Vec<String> {
    model
        .fields
        .iter()
        .filter(|f| f.primary_key)
        .map(|f| {
            let v = pk.get(&f.name).cloned().unwrap_or(Value::Null);
            format!("{} = {}", column(alias, &f.name), q.push_param(v, f.kind.pg_type()))
        })
        .collect()
}

/// INSERT one row. Store-supplied columns missing from `values` are left to the database.
pub fn insert(model: &EntityModel, values: &Map<String, Value>) -> SqlResult<QueryBuf> {
    let mut q = QueryBuf::new();
    let alias = q.next_alias();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for f in &model.fields {
        let value = values.get(&f.name).cloned().unwrap_or(Value::Null);
        if value.is_null() && f.store_supplied() {
            continue;
        }
        cols.push(quoted(&f.name));
        placeholders.push(q.push_param(value, f.kind.pg_type()));
    }
    let returning = select_columns(&alias, model, None)?.join(", ");
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} AS {} DEFAULT VALUES RETURNING {}", qualified_table(model), alias, returning)
    } else {
        format!(
            "INSERT INTO {} AS {} ({}) VALUES ({}) RETURNING {}",
            qualified_table(model),
            alias,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    Ok(q)
}

/// UPDATE the row identified by `pk`, setting only `changes` that name non-key fields.
/// With nothing to set this reads the row back instead.
pub fn update(model: &EntityModel, pk: &Map<String, Value>, changes: &Map<String, Value>) -> SqlResult<QueryBuf> {
    let mut q = QueryBuf::new();
    let alias = q.next_alias();
    let mut sets = Vec::new();
    for (name, value) in changes {
        let Some(f) = model.field_named(name) else { continue };
        if f.primary_key {
            continue;
        }
        sets.push(format!("{} = {}", quoted(name), q.push_param(value.clone(), f.kind.pg_type())));
    }
    let returning = select_columns(&alias, model, None)?.join(", ");
    let conds = pk_conditions(&mut q, model, &alias, pk);
    q.sql = if sets.is_empty() {
        format!("SELECT {} FROM {} {}{}", returning, qualified_table(model), alias, where_sql(&conds))
    } else {
        format!(
            "UPDATE {} AS {} SET {}{} RETURNING {}",
            qualified_table(model),
            alias,
            sets.join(", "),
            where_sql(&conds),
            returning
        )
    };
    Ok(q)
}

/// DELETE the row identified by `pk`.
pub fn delete(model: &EntityModel, pk: &Map<String, Value>) -> SqlResult<QueryBuf> {
    let mut q = QueryBuf::new();
    let alias = q.next_alias();
    let returning = select_columns(&alias, model, None)?.join(", ");
    let conds = pk_conditions(&mut q, model, &alias, pk);
    q.sql = format!(
        "DELETE FROM {} AS {}{} RETURNING {}",
        qualified_table(model),
        alias,
        where_sql(&conds),
        returning
    );
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::build_filter;
    use serde_json::json;

    fn registry() -> ModelRegistry {
        let author = EntityModel::new("Author", "author")
            .in_schema("blog")
            .field(FieldDef::new("id", FieldKind::Integer).primary_key().auto_increment())
            .field(FieldDef::new("name", FieldKind::String))
            .association(Association::has_many("posts", "Post", "author_id"));
        let post = EntityModel::new("Post", "post")
            .in_schema("blog")
            .field(FieldDef::new("id", FieldKind::Integer).primary_key().auto_increment())
            .field(FieldDef::new("title", FieldKind::String))
            .field(FieldDef::new("price", FieldKind::Decimal))
            .field(FieldDef::new("author_id", FieldKind::Integer))
            .association(Association::belongs_to("author", "Author", "author_id"))
            .association(Association::belongs_to_many("tags", "Tag", "post_tag", "post_id", "tag_id"));
        let tag = EntityModel::new("Tag", "tag")
            .in_schema("blog")
            .field(FieldDef::new("id", FieldKind::Integer).primary_key())
            .field(FieldDef::new("label", FieldKind::String));
        ModelRegistry::new(vec![author, post, tag]).unwrap()
    }

    fn params(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn build(reg: &ModelRegistry, model: &str, v: Value) -> QueryBuf {
        let model = reg.get(model).unwrap();
        let query = build_filter(Some(&params(v)), model, reg);
        select(reg, model, &query).unwrap()
    }

    #[test]
    fn plain_select_orders_by_primary_key() {
        let reg = registry();
        let q = build(&reg, "Post", json!({}));
        assert_eq!(
            q.sql,
            "SELECT t0.\"id\" AS \"id\", t0.\"title\" AS \"title\", t0.\"price\"::text AS \"price\", \
             t0.\"author_id\" AS \"author_id\" FROM \"blog\".\"post\" t0 ORDER BY t0.\"id\" ASC"
        );
        assert!(q.params.is_empty());
    }

    #[test]
    fn operators_become_typed_placeholders() {
        let reg = registry();
        let q = build(
            &reg,
            "Post",
            json!({ "id": { "$gte": "2", "$lt": 9 }, "title": { "$iLike": "%rust%" }, "author_id": null }),
        );
        assert!(q.sql.contains("WHERE (t0.\"id\" >= $1::integer AND t0.\"id\" < $2::integer)"));
        assert!(q.sql.contains("t0.\"title\"::text ILIKE $3::text"));
        assert!(q.sql.contains("t0.\"author_id\" IS NULL"));
        assert_eq!(q.params, vec![json!("2"), json!(9), json!("%rust%")]);
    }

    #[test]
    fn lists_and_logical_groups() {
        let reg = registry();
        let q = build(&reg, "Post", json!({ "$or": [{ "id": [1, 2] }, { "title": { "$startsWith": "50%" } }] }));
        assert!(q.sql.contains("WHERE (t0.\"id\" IN ($1::integer, $2::integer) OR t0.\"title\"::text LIKE $3::text)"));
        assert_eq!(q.params[2], json!("50\\%%"));

        let q = build(&reg, "Post", json!({ "id": { "$in": [] } }));
        assert!(q.sql.contains("WHERE FALSE"));
    }

    #[test]
    fn includes_and_required_joins() {
        let reg = registry();
        let q = build(
            &reg,
            "Post",
            json!({ "author": { "required": "true", "name": "ann" }, "tags": {}, "limit": 5, "page": 2 }),
        );
        assert!(q.sql.contains(
            "(SELECT row_to_json(sub) FROM (SELECT t1.\"id\" AS \"id\", t1.\"name\" AS \"name\" FROM \"blog\".\"author\" t1 \
             WHERE t1.\"id\" = t0.\"author_id\" AND t1.\"name\" = $1::varchar ORDER BY t1.\"id\" ASC LIMIT 1) sub) AS \"author\""
        ));
        assert!(q.sql.contains("COALESCE(json_agg(row_to_json(sub)), '[]'::json)"));
        assert!(q.sql.contains("JOIN \"blog\".\"post_tag\" t3 ON t3.\"tag_id\" = t2.\"id\" WHERE t3.\"post_id\" = t0.\"id\""));
        assert!(q.sql.contains(
            "WHERE EXISTS (SELECT 1 FROM \"blog\".\"author\" t4 WHERE t4.\"id\" = t0.\"author_id\" AND t4.\"name\" = $2::varchar)"
        ));
        assert!(q.sql.ends_with("LIMIT 5 OFFSET 5"));
        assert_eq!(q.params, vec![json!("ann"), json!("ann")]);
    }

    #[test]
    fn include_rows_follow_their_own_order() {
        let reg = registry();
        let q = build(&reg, "Author", json!({ "posts": { "order": [["title", "DESC"]] } }));
        assert!(q.sql.contains(
            "FROM \"blog\".\"post\" t1 WHERE t1.\"author_id\" = t0.\"id\" ORDER BY t1.\"title\" DESC) sub)"
        ));
        assert!(q.sql.ends_with("ORDER BY t0.\"id\" ASC"));

        let model = reg.get("Author").unwrap();
        let query = build_filter(Some(&params(json!({ "posts": { "order": "nope" } }))), model, &reg);
        assert!(matches!(select(&reg, model, &query), Err(ProviderError::UnknownField { .. })));
    }

    #[test]
    fn count_keeps_conditions_and_drops_pagination() {
        let reg = registry();
        let model = reg.get("Post").unwrap();
        let query = build_filter(Some(&params(json!({ "title": "x", "limit": 2, "offset": 4 }))), model, &reg);
        let q = count(&reg, model, &query).unwrap();
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) AS \"count\" FROM \"blog\".\"post\" t0 WHERE t0.\"title\" = $1::varchar"
        );
    }

    #[test]
    fn unknown_names_are_rejected() {
        let reg = registry();
        let model = reg.get("Post").unwrap();
        for v in [
            json!({ "nope": 1 }),
            json!({ "order": "nope DESC" }),
            json!({ "attributes": ["nope"] }),
        ] {
            let query = build_filter(Some(&params(v)), model, &reg);
            assert!(matches!(select(&reg, model, &query), Err(ProviderError::UnknownField { .. })));
        }
        let query = build_filter(Some(&params(json!({ "id": { "$regexp": "x" } }))), model, &reg);
        assert!(matches!(select(&reg, model, &query), Err(ProviderError::UnsupportedOperator(_))));
    }

    #[test]
    fn insert_leaves_generated_keys_to_the_database() {
        let reg = registry();
        let model = reg.get("Post").unwrap();
        let q = insert(model, &params(json!({ "title": "t", "price": "9.50" }))).unwrap();
        assert!(q.sql.starts_with(
            "INSERT INTO \"blog\".\"post\" AS t0 (\"title\", \"price\", \"author_id\") \
             VALUES ($1::varchar, $2::numeric, $3::integer) RETURNING"
        ));
        assert_eq!(q.params, vec![json!("t"), json!("9.50"), Value::Null]);
    }

    #[test]
    fn update_and_delete_by_key() {
        let reg = registry();
        let model = reg.get("Post").unwrap();
        let q = update(model, &params(json!({ "id": 3 })), &params(json!({ "title": "new", "id": 4 }))).unwrap();
        assert!(q.sql.starts_with(
            "UPDATE \"blog\".\"post\" AS t0 SET \"title\" = $1::varchar WHERE t0.\"id\" = $2::integer RETURNING"
        ));
        assert_eq!(q.params, vec![json!("new"), json!(3)]);

        let q = update(model, &params(json!({ "id": 3 })), &Map::new()).unwrap();
        assert!(q.sql.starts_with("SELECT"));

        let q = delete(model, &params(json!({ "id": 3 }))).unwrap();
        assert!(q.sql.starts_with("DELETE FROM \"blog\".\"post\" AS t0 WHERE t0.\"id\" = $1::integer RETURNING"));
    }
}
