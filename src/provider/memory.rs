//! In-memory provider. Evaluates query descriptors against rows held in a map of tables;
//! required includes behave like inner joins, the rest like left outer joins.

use super::{Page, PersistenceProvider, ProviderResult, ProviderTransaction};
use crate::error::ProviderError;
use crate::filter::{is_operator_map, logical_branches, IncludeDescriptor, OrderDirection, OrderItem, QueryDescriptor};
use crate::model::{Association, Cardinality, EntityInstance, EntityModel, InstanceState, ModelRegistry};
use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

type Row = Map<String, Value>;

/// Auto-increment counters keyed by `table.field`, shared by a provider and every
/// transaction begun from it so ids are never handed out twice.
type Sequences = Arc<Mutex<HashMap<String, i64>>>;

/// Write made inside a transaction, replayed onto the parent store at commit.
#[derive(Clone, Debug)]
enum Change {
    Insert { model: String, row: Row },
    Update { model: String, key: Row, changes: Row },
    Delete { model: String, key: Row },
}

#[derive(Clone, Debug, Default)]
struct MemoryStore {
    tables: HashMap<String, Vec<Row>>,
}

impl MemoryStore {
    fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn locate(&self, model: &EntityModel, key: &Row) -> Option<usize> {
        self.rows(&table_key(model))
            .iter()
            .position(|r| key.iter().all(|(k, v)| r.get(k).map(|x| loose_eq(x, v)).unwrap_or(false)))
    }

    fn insert(&mut self, model: &EntityModel, row: Row) -> ProviderResult<()> {
        let table = table_key(model);
        check_unique(model, self.rows(&table), &row, None)?;
        self.tables.entry(table).or_default().push(row);
        Ok(())
    }

    /// Apply `changes` to the row stored under `key`; returns the new row.
    fn update(&mut self, model: &EntityModel, key: &Row, changes: &Row) -> ProviderResult<Row> {
        let table = table_key(model);
        let index = self.locate(model, key).ok_or_else(|| ProviderError::InvalidState {
            model: model.name.clone(),
            state: "stale",
        })?;
        let mut row = self.rows(&table)[index].clone();
        for (field, value) in changes {
            row.insert(field.clone(), value.clone());
        }
        check_unique(model, self.rows(&table), &row, Some(index))?;
        if let Some(rows) = self.tables.get_mut(&table) {
            rows[index] = row.clone();
        }
        Ok(row)
    }

    fn delete(&mut self, model: &EntityModel, key: &Row) {
        if let Some(index) = self.locate(model, key) {
            if let Some(rows) = self.tables.get_mut(&table_key(model)) {
                rows.remove(index);
            }
        }
    }

    fn apply(&mut self, registry: &ModelRegistry, change: &Change) -> ProviderResult<()> {
        match change {
            Change::Insert { model, row } => self.insert(registry.require(model)?, row.clone()),
            Change::Update { model, key, changes } => {
                self.update(registry.require(model)?, key, changes).map(|_| ())
            }
            Change::Delete { model, key } => {
                self.delete(registry.require(model)?, key);
                Ok(())
            }
        }
    }
}

pub struct MemoryProvider {
    registry: Arc<ModelRegistry>,
    store: Arc<Mutex<MemoryStore>>,
    sequences: Sequences,
    /// Present on transaction-scoped providers.
    journal: Option<Arc<Mutex<Vec<Change>>>>,
}

impl MemoryProvider {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        MemoryProvider {
            registry,
            store: Arc::new(Mutex::new(MemoryStore::default())),
            sequences: Arc::new(Mutex::new(HashMap::new())),
            journal: None,
        }
    }

    fn next_id(&self, rows: &[Row], table: &str, field: &str) -> ProviderResult<i64> {
        let existing = rows
            .iter()
            .filter_map(|r| r.get(field).and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        let mut sequences = self.sequences.lock().map_err(|_| ProviderError::Poisoned)?;
        let seq = sequences.entry(format!("{}.{}", table, field)).or_insert(0);
        *seq = (*seq).max(existing) + 1;
        Ok(*seq)
    }

    fn record(&self, change: Change) -> ProviderResult<()> {
        if let Some(journal) = &self.journal {
            journal.lock().map_err(|_| ProviderError::Poisoned)?.push(change);
        }
        Ok(())
    }

    /// Insert a row as-is, bypassing validation (seeding join tables and fixtures).
    pub fn insert_raw(&self, table: &str, row: Row) -> ProviderResult<()> {
        self.lock()?.tables.entry(table.to_string()).or_default().push(row);
        Ok(())
    }

    pub fn rows(&self, table: &str) -> ProviderResult<Vec<Row>> {
        Ok(self.lock()?.rows(table).to_vec())
    }

    fn lock(&self) -> ProviderResult<MutexGuard<'_, MemoryStore>> {
        self.store.lock().map_err(|_| ProviderError::Poisoned)
    }

    fn select(&self, model: &EntityModel, query: &QueryDescriptor) -> ProviderResult<(Vec<Row>, u64)> {
        let store = self.lock()?;
        let mut matched = Vec::new();
        for row in store.rows(&table_key(model)) {
            if let Some(w) = &query.where_clause {
                if !matches_where(model, row, w)? {
                    continue;
                }
            }
            let mut out = row.clone();
            if !self.attach_includes(&store, model, &mut out, row, query.includes())? {
                continue;
            }
            matched.push(out);
        }

        sort_rows(model, &mut matched, query.order_items())?;
        let count = matched.len() as u64;
        let offset = query.offset.unwrap_or(0) as usize;
        let mut rows: Vec<Row> = matched.into_iter().skip(offset).collect();
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        if let Some(attributes) = query.attribute_list() {
            for row in rows.iter_mut() {
                project(model, row, &attributes, query.includes())?;
            }
        }
        Ok((rows, count))
    }

    /// Attach each include under its alias. Returns `false` when a required include has no match.
    fn attach_includes(
        &self,
        store: &MemoryStore,
        model: &EntityModel,
        out: &mut Row,
        row: &Row,
        includes: &[IncludeDescriptor],
    ) -> ProviderResult<bool> {
        for inc in includes {
            let assoc = model.association_named(&inc.alias).ok_or_else(|| {
                ProviderError::InvalidQuery(format!("{} has no association '{}'", model.name, inc.alias))
            })?;
            let target = self.registry.require(&inc.model)?;
            let mut related = Vec::new();
            for candidate in related_rows(store, model, target, assoc, row)? {
                if let Some(w) = &inc.where_clause {
                    if !matches_where(target, candidate, w)? {
                        continue;
                    }
                }
                let mut nested = candidate.clone();
                if !self.attach_includes(store, target, &mut nested, candidate, inc.includes())? {
                    continue;
                }
                related.push(nested);
            }
            if inc.is_required() && related.is_empty() {
                return Ok(false);
            }
            sort_rows(target, &mut related, inc.order_items())?;
            if let Some(attributes) = inc.attribute_list() {
                for nested in related.iter_mut() {
                    project(target, nested, &attributes, inc.includes())?;
                }
            }
            let mut related = related.into_iter().map(Value::Object);
            let value = if assoc.cardinality.is_to_many() {
                Value::Array(related.collect())
            } else {
                related.next().unwrap_or(Value::Null)
            };
            out.insert(inc.alias.clone(), value);
        }
        Ok(true)
    }
}

#[async_trait]
impl PersistenceProvider for MemoryProvider {
    fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    async fn find_all(&self, model: &EntityModel, query: &QueryDescriptor) -> ProviderResult<Vec<EntityInstance>> {
        let (rows, _) = self.select(model, query)?;
        Ok(rows.into_iter().map(|r| EntityInstance::persisted(&model.name, r)).collect())
    }

    async fn find_and_count_all(&self, model: &EntityModel, query: &QueryDescriptor) -> ProviderResult<Page> {
        let (rows, count) = self.select(model, query)?;
        Ok(Page {
            count,
            rows: rows.into_iter().map(|r| EntityInstance::persisted(&model.name, r)).collect(),
        })
    }

    async fn find_one(&self, model: &EntityModel, query: &QueryDescriptor) -> ProviderResult<Option<EntityInstance>> {
        let mut query = query.clone();
        query.limit = Some(1);
        let (rows, _) = self.select(model, &query)?;
        Ok(rows.into_iter().next().map(|r| EntityInstance::persisted(&model.name, r)))
    }

    async fn save(&self, model: &EntityModel, mut instance: EntityInstance) -> ProviderResult<EntityInstance> {
        let table = table_key(model);
        let mut store = self.lock()?;
        match instance.state() {
            InstanceState::Destroyed => Err(ProviderError::InvalidState {
                model: model.name.clone(),
                state: InstanceState::Destroyed.as_str(),
            }),
            InstanceState::Built => {
                let mut row: Row = model
                    .fields
                    .iter()
                    .map(|f| (f.name.clone(), instance.get(&f.name).cloned().unwrap_or(Value::Null)))
                    .collect();
                for f in model.fields.iter().filter(|f| f.auto_increment) {
                    if row.get(&f.name).map(Value::is_null).unwrap_or(true) {
                        let id = self.next_id(store.rows(&table), &table, &f.name)?;
                        row.insert(f.name.clone(), Value::from(id));
                    }
                }
                store.insert(model, row.clone())?;
                self.record(Change::Insert {
                    model: model.name.clone(),
                    row: row.clone(),
                })?;
                instance.mark_persisted(row);
                Ok(instance)
            }
            InstanceState::Persisted => {
                // Primary keys are never rewritten.
                let key = instance.primary_key(model);
                let changes: Row = instance
                    .changed()
                    .filter(|f| model.field_named(f).map(|d| !d.primary_key).unwrap_or(false))
                    .map(|f| (f.to_string(), instance.get(f).cloned().unwrap_or(Value::Null)))
                    .collect();
                let row = store.update(model, &key, &changes)?;
                self.record(Change::Update {
                    model: model.name.clone(),
                    key,
                    changes,
                })?;
                instance.mark_persisted(row);
                Ok(instance)
            }
        }
    }

    async fn destroy(&self, model: &EntityModel, mut instance: EntityInstance) -> ProviderResult<EntityInstance> {
        let key = instance.primary_key(model);
        let mut store = self.lock()?;
        store.delete(model, &key);
        self.record(Change::Delete {
            model: model.name.clone(),
            key,
        })?;
        instance.mark_destroyed();
        Ok(instance)
    }

    async fn begin(&self) -> ProviderResult<Box<dyn ProviderTransaction>> {
        let snapshot = self.lock()?.clone();
        let scoped = Arc::new(MemoryProvider {
            registry: self.registry.clone(),
            store: Arc::new(Mutex::new(snapshot)),
            sequences: self.sequences.clone(),
            journal: Some(Arc::new(Mutex::new(Vec::new()))),
        });
        Ok(Box::new(MemoryTransaction {
            parent_store: self.store.clone(),
            parent_journal: self.journal.clone(),
            scoped,
        }))
    }
}

/// Reads and writes a snapshot. Commit replays the journaled writes onto the parent store,
/// all or nothing; writes made outside the transaction meanwhile are kept.
struct MemoryTransaction {
    parent_store: Arc<Mutex<MemoryStore>>,
    parent_journal: Option<Arc<Mutex<Vec<Change>>>>,
    scoped: Arc<MemoryProvider>,
}

#[async_trait]
impl ProviderTransaction for MemoryTransaction {
    fn provider(&self) -> Arc<dyn PersistenceProvider> {
        self.scoped.clone()
    }

    async fn commit(self: Box<Self>) -> ProviderResult<()> {
        let changes = match &self.scoped.journal {
            Some(journal) => std::mem::take(&mut *journal.lock().map_err(|_| ProviderError::Poisoned)?),
            None => Vec::new(),
        };
        let mut parent = self.parent_store.lock().map_err(|_| ProviderError::Poisoned)?;
        let mut next = parent.clone();
        for change in &changes {
            next.apply(&self.scoped.registry, change)?;
        }
        *parent = next;
        if let Some(journal) = &self.parent_journal {
            journal.lock().map_err(|_| ProviderError::Poisoned)?.extend(changes);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> ProviderResult<()> {
        Ok(())
    }
}

fn table_key(model: &EntityModel) -> String {
    match &model.schema {
        Some(schema) => format!("{}.{}", schema, model.table),
        None => model.table.clone(),
    }
}

fn related_rows<'s>(
    store: &'s MemoryStore,
    source: &EntityModel,
    target: &EntityModel,
    assoc: &Association,
    row: &Row,
) -> ProviderResult<Vec<&'s Row>> {
    let source_pk = pk_name(source)?;
    let target_pk = pk_name(target)?;
    let target_rows = store.rows(&table_key(target));
    let key_of = |r: &Row, k: &str| r.get(k).cloned().unwrap_or(Value::Null);
    let rows = match assoc.cardinality {
        Cardinality::BelongsTo => {
            let fk = key_of(row, &assoc.foreign_key);
            target_rows
                .iter()
                .filter(|t| !fk.is_null() && loose_eq(&key_of(t, target_pk), &fk))
                .collect()
        }
        Cardinality::HasOne | Cardinality::HasMany => {
            let id = key_of(row, source_pk);
            target_rows
                .iter()
                .filter(|t| !id.is_null() && loose_eq(&key_of(t, &assoc.foreign_key), &id))
                .collect()
        }
        Cardinality::BelongsToMany => {
            let through = assoc.through.as_ref().ok_or_else(|| {
                ProviderError::InvalidQuery(format!("association '{}' has no join table", assoc.alias))
            })?;
            let id = key_of(row, source_pk);
            let others: Vec<Value> = store
                .rows(&through.table)
                .iter()
                .filter(|j| loose_eq(&key_of(j, &assoc.foreign_key), &id))
                .map(|j| key_of(j, &through.other_key))
                .collect();
            target_rows
                .iter()
                .filter(|t| others.iter().any(|o| loose_eq(&key_of(t, target_pk), o)))
                .collect()
        }
    };
    Ok(rows)
}

fn pk_name(model: &EntityModel) -> ProviderResult<&str> {
    model
        .primary_key()
        .map(|f| f.name.as_str())
        .ok_or_else(|| ProviderError::InvalidQuery(format!("{} has no primary key", model.name)))
}

fn check_unique(model: &EntityModel, rows: &[Row], row: &Row, skip: Option<usize>) -> ProviderResult<()> {
    let others = rows.iter().enumerate().filter(|(i, _)| Some(*i) != skip).map(|(_, r)| r);
    let pks = model.primary_keys();
    for other in others {
        let same_pk = pks.iter().all(|k| match (row.get(*k), other.get(*k)) {
            (Some(a), Some(b)) => !a.is_null() && loose_eq(a, b),
            _ => false,
        });
        if same_pk {
            return Err(ProviderError::Constraint {
                model: model.name.clone(),
                field: pks.join(","),
            });
        }
        for f in model.fields.iter().filter(|f| f.unique) {
            if let (Some(a), Some(b)) = (row.get(&f.name), other.get(&f.name)) {
                if !a.is_null() && loose_eq(a, b) {
                    return Err(ProviderError::Constraint {
                        model: model.name.clone(),
                        field: f.name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Sort by `items`, the primary key ascending when none are given.
fn sort_rows(model: &EntityModel, rows: &mut [Row], items: Result<Vec<OrderItem>, String>) -> ProviderResult<()> {
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
    for item in &items {
        if !model.has_field(&item.field) {
            return Err(unknown_field(model, &item.field));
        }
    }
    rows.sort_by(|a, b| {
        for item in &items {
            let ord = sort_cmp(
                a.get(&item.field).unwrap_or(&Value::Null),
                b.get(&item.field).unwrap_or(&Value::Null),
            );
            let ord = match item.direction {
                OrderDirection::Asc => ord,
                OrderDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

/// Nulls sort after every value, as in PostgreSQL.
fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare(a, b).unwrap_or(Ordering::Equal),
    }
}

fn project(model: &EntityModel, row: &mut Row, attributes: &[String], includes: &[IncludeDescriptor]) -> ProviderResult<()> {
    if let Some(unknown) = attributes.iter().find(|a| !model.has_field(a)) {
        return Err(unknown_field(model, unknown));
    }
    row.retain(|k, _| attributes.iter().any(|a| a == k) || includes.iter().any(|i| &i.alias == k));
    Ok(())
}

fn unknown_field(model: &EntityModel, field: &str) -> ProviderError {
    ProviderError::UnknownField {
        model: model.name.clone(),
        field: field.to_string(),
    }
}

fn matches_where(model: &EntityModel, row: &Row, where_clause: &Map<String, Value>) -> ProviderResult<bool> {
    for (key, cond) in where_clause {
        let ok = match key.as_str() {
            "$or" => {
                let mut any = false;
                for branch in logical_branches(cond) {
                    if matches_where(model, row, &branch)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$and" => {
                let mut all = true;
                for branch in logical_branches(cond) {
                    if !matches_where(model, row, &branch)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$not" => match cond {
                Value::Object(inner) => !matches_where(model, row, inner)?,
                _ => return Err(ProviderError::InvalidQuery("$not expects an object".into())),
            },
            op if op.starts_with('$') => return Err(ProviderError::UnsupportedOperator(op.to_string())),
            field => {
                if !model.has_field(field) {
                    return Err(unknown_field(model, field));
                }
                matches_condition(row.get(field).unwrap_or(&Value::Null), cond)?
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_condition(value: &Value, cond: &Value) -> ProviderResult<bool> {
    match cond {
        Value::Object(ops) if is_operator_map(cond) => {
            for (op, operand) in ops {
                if !apply_operator(value, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Value::Array(items) => Ok(items.iter().any(|i| loose_eq(value, i))),
        Value::Null => Ok(value.is_null()),
        other => Ok(loose_eq(value, other)),
    }
}

fn apply_operator(value: &Value, op: &str, operand: &Value) -> ProviderResult<bool> {
    let ordered = |accept: fn(Ordering) -> bool| compare(value, operand).map(accept).unwrap_or(false);
    Ok(match op {
        "$eq" => match operand {
            Value::Null => value.is_null(),
            _ => loose_eq(value, operand),
        },
        "$ne" => match operand {
            Value::Null => !value.is_null(),
            _ => !value.is_null() && !loose_eq(value, operand),
        },
        "$gt" => ordered(|o| o == Ordering::Greater),
        "$gte" => ordered(|o| o != Ordering::Less),
        "$lt" => ordered(|o| o == Ordering::Less),
        "$lte" => ordered(|o| o != Ordering::Greater),
        "$in" => as_list(operand).iter().any(|o| loose_eq(value, o)),
        "$notIn" => !value.is_null() && !as_list(operand).iter().any(|o| loose_eq(value, o)),
        "$like" => like(value, operand, false)?,
        "$notLike" => !value.is_null() && !like(value, operand, false)?,
        "$iLike" => like(value, operand, true)?,
        "$notILike" => !value.is_null() && !like(value, operand, true)?,
        "$startsWith" => text(value).zip(text(operand)).map(|(v, o)| v.starts_with(&o)).unwrap_or(false),
        "$endsWith" => text(value).zip(text(operand)).map(|(v, o)| v.ends_with(&o)).unwrap_or(false),
        "$substring" => text(value).zip(text(operand)).map(|(v, o)| v.contains(&o)).unwrap_or(false),
        "$is" => match operand {
            Value::Null => value.is_null(),
            _ => loose_eq(value, operand),
        },
        "$not" => match operand {
            Value::Null => !value.is_null(),
            _ => !loose_eq(value, operand),
        },
        "$between" | "$notBetween" => {
            let bounds = as_list(operand);
            let (Some(low), Some(high)) = (bounds.first(), bounds.get(1)) else {
                return Err(ProviderError::InvalidQuery(format!("{} expects two bounds", op)));
            };
            let inside = compare(value, low).map(|o| o != Ordering::Less).unwrap_or(false)
                && compare(value, high).map(|o| o != Ordering::Greater).unwrap_or(false);
            if op == "$between" {
                inside
            } else {
                !value.is_null() && !inside
            }
        }
        other => return Err(ProviderError::UnsupportedOperator(other.to_string())),
    })
}

fn as_list(operand: &Value) -> Vec<Value> {
    match operand {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// SQL LIKE: `%` any run, `_` one character.
fn like(value: &Value, pattern: &Value, case_insensitive: bool) -> ProviderResult<bool> {
    let (Some(v), Some(p)) = (text(value), text(pattern)) else {
        return Ok(false);
    };
    let mut re = String::from("^");
    for c in p.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    let re = RegexBuilder::new(&re)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| ProviderError::InvalidQuery(e.to_string()))?;
    Ok(re.is_match(&v))
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Equality tolerant of query-string typing: `"5" == 5`, `"true" == true`.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::Bool(x), Value::String(s)) | (Value::String(s), Value::Bool(x)) => s == &x.to_string(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(_), _) | (_, Value::Number(_)) => as_number(a)?.partial_cmp(&as_number(b)?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
