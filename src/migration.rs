//! Schema sync: DDL for every registered model plus the join tables of many-to-many
//! associations. Idempotent (`IF NOT EXISTS`); existing tables are never altered.

use crate::error::AppError;
use crate::model::{Cardinality, EntityModel, FieldDef, FieldKind, ModelRegistry};
use sqlx::PgPool;
use std::collections::BTreeMap;

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote(schema), quote(table)),
        None => quote(table),
    }
}

fn column_type(field: &FieldDef) -> String {
    match (field.auto_increment, field.kind) {
        (true, FieldKind::BigInt) => "BIGSERIAL".to_string(),
        (true, _) => "SERIAL".to_string(),
        (false, FieldKind::String) => match field.rules.max_length {
            Some(n) => format!("VARCHAR({})", n),
            None => "VARCHAR(255)".to_string(),
        },
        (false, kind) => kind.pg_type().to_uppercase(),
    }
}

/// CREATE TABLE for one model: columns, NOT NULL, UNIQUE and the (possibly composite) primary key.
pub fn create_table_sql(model: &EntityModel) -> String {
    let mut defs: Vec<String> = model
        .fields
        .iter()
        .map(|f| {
            let mut def = format!("{} {}", quote(&f.name), column_type(f));
            if !f.nullable && !f.primary_key {
                def.push_str(" NOT NULL");
            }
            if f.unique && !f.primary_key {
                def.push_str(" UNIQUE");
            }
            def
        })
        .collect();
    let pk: Vec<String> = model.primary_keys().into_iter().map(quote).collect();
    defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified(model.schema.as_deref(), &model.table),
        defs.join(",\n  ")
    )
}

/// CREATE TABLE for each many-to-many join table, keyed by both sides' primary-key types.
pub fn join_table_sql(registry: &ModelRegistry) -> Vec<String> {
    let mut tables = BTreeMap::new();
    for model in registry.iter() {
        for assoc in model.associations.iter().filter(|a| a.cardinality == Cardinality::BelongsToMany) {
            let (Some(through), Some(target)) = (assoc.through.as_ref(), registry.target_of(assoc)) else {
                continue;
            };
            let (Some(own_pk), Some(other_pk)) = (model.primary_key(), target.primary_key()) else {
                continue;
            };
            let key_type = |f: &FieldDef| f.kind.pg_type().to_uppercase();
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  {} {} NOT NULL,\n  {} {} NOT NULL,\n  PRIMARY KEY ({}, {})\n)",
                qualified(model.schema.as_deref(), &through.table),
                quote(&assoc.foreign_key),
                key_type(own_pk),
                quote(&through.other_key),
                key_type(other_pk),
                quote(&assoc.foreign_key),
                quote(&through.other_key)
            );
            // Both sides may declare the same join table.
            tables.entry(through.table.clone()).or_insert(sql);
        }
    }
    tables.into_values().collect()
}

/// Create schemas, model tables and join tables in dependency-free order.
pub async fn sync(pool: &PgPool, registry: &ModelRegistry) -> Result<(), AppError> {
    let mut schemas: Vec<&str> = registry.iter().filter_map(|m| m.schema.as_deref()).collect();
    schemas.sort_unstable();
    schemas.dedup();
    for schema in schemas {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote(schema)))
            .execute(pool)
            .await
            .map_err(crate::error::ProviderError::from)?;
    }
    let statements = registry
        .iter()
        .map(|m| create_table_sql(m))
        .chain(join_table_sql(registry));
    for sql in statements {
        tracing::debug!(sql = %sql, "sync");
        sqlx::query(&sql)
            .execute(pool)
            .await
            .map_err(crate::error::ProviderError::from)?;
    }
    tracing::info!(models = registry.iter().count(), "schema synced");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Association;

    #[test]
    fn table_ddl_covers_keys_and_constraints() {
        let model = EntityModel::new("User", "user")
            .field(FieldDef::new("id", FieldKind::Integer).primary_key().auto_increment())
            .field(FieldDef::new("email", FieldKind::String).max_length(100).not_null().unique())
            .field(FieldDef::new("password", FieldKind::String));
        assert_eq!(
            create_table_sql(&model),
            "CREATE TABLE IF NOT EXISTS \"user\" (\n  \"id\" SERIAL,\n  \"email\" VARCHAR(100) NOT NULL UNIQUE,\n  \
             \"password\" VARCHAR(255),\n  PRIMARY KEY (\"id\")\n)"
        );
    }

    #[test]
    fn composite_keys_and_join_tables() {
        let post = EntityModel::new("Post", "post")
            .in_schema("blog")
            .field(FieldDef::new("id", FieldKind::BigInt).primary_key().auto_increment())
            .association(Association::belongs_to_many("tags", "Tag", "post_tag", "post_id", "tag_id"));
        let tag = EntityModel::new("Tag", "tag")
            .in_schema("blog")
            .field(FieldDef::new("id", FieldKind::Uuid).primary_key())
            .association(Association::belongs_to_many("posts", "Post", "post_tag", "tag_id", "post_id"));
        let registry = ModelRegistry::new(vec![post, tag]).unwrap();
        let joins = join_table_sql(&registry);
        assert_eq!(joins.len(), 1);
        assert!(joins[0].starts_with("CREATE TABLE IF NOT EXISTS \"blog\".\"post_tag\""));
        assert!(joins[0].contains("\"post_id\" BIGINT NOT NULL"));
        assert!(joins[0].contains("\"tag_id\" UUID NOT NULL"));

        let membership = EntityModel::new("Membership", "membership")
            .field(FieldDef::new("group_id", FieldKind::Integer).primary_key())
            .field(FieldDef::new("user_id", FieldKind::Integer).primary_key());
        assert!(create_table_sql(&membership).ends_with("PRIMARY KEY (\"group_id\", \"user_id\")\n)"));
    }
}
