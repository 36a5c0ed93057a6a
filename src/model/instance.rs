//! Live record of an entity model with its lifecycle state.

use crate::model::EntityModel;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    /// In memory only, never saved.
    Built,
    Persisted,
    Destroyed,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Built => "built",
            InstanceState::Persisted => "persisted",
            InstanceState::Destroyed => "destroyed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityInstance {
    model: String,
    values: Map<String, Value>,
    state: InstanceState,
    changed: BTreeSet<String>,
    /// Stored value of each field changed since the last save.
    previous: Map<String, Value>,
}

impl EntityInstance {
    pub fn built(model: &str, values: Map<String, Value>) -> Self {
        EntityInstance {
            model: model.to_string(),
            changed: values.keys().cloned().collect(),
            values,
            state: InstanceState::Built,
            previous: Map::new(),
        }
    }

    pub fn persisted(model: &str, values: Map<String, Value>) -> Self {
        EntityInstance {
            model: model.to_string(),
            values,
            state: InstanceState::Persisted,
            changed: BTreeSet::new(),
            previous: Map::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_new_record(&self) -> bool {
        self.state == InstanceState::Built
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    /// Fields modified since the last save.
    pub fn changed(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    /// Apply partial updates in memory; only values that differ are marked changed.
    pub fn set(&mut self, fields: Map<String, Value>) {
        for (key, value) in fields {
            if self.values.get(&key) != Some(&value) {
                self.changed.insert(key.clone());
                if let Some(old) = self.values.insert(key.clone(), value) {
                    if self.state == InstanceState::Persisted {
                        self.previous.entry(key).or_insert(old);
                    }
                }
            }
        }
    }

    /// Primary-key values identifying the stored row (`null` where unset). Keys edited since
    /// the last save still report their stored value.
    pub fn primary_key(&self, model: &EntityModel) -> Map<String, Value> {
        model
            .primary_keys()
            .into_iter()
            .map(|k| {
                let v = self.previous.get(k).or_else(|| self.values.get(k));
                (k.to_string(), v.cloned().unwrap_or(Value::Null))
            })
            .collect()
    }

    /// Replace values with what the store returned after a save.
    pub fn mark_persisted(&mut self, values: Map<String, Value>) {
        self.values = values;
        self.state = InstanceState::Persisted;
        self.changed.clear();
        self.previous.clear();
    }

    pub fn mark_destroyed(&mut self) {
        self.state = InstanceState::Destroyed;
    }
}

impl Serialize for EntityInstance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn set_tracks_only_real_changes() {
        let mut i = EntityInstance::persisted("User", map(json!({ "id": 1, "name": "a" })));
        i.set(map(json!({ "id": 1, "name": "b" })));
        assert_eq!(i.changed().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(i.get("name"), Some(&json!("b")));
        assert_eq!(i.state(), InstanceState::Persisted);
    }

    #[test]
    fn edited_key_still_identifies_the_stored_row() {
        let model = EntityModel::new("User", "user")
            .field(crate::model::FieldDef::new("id", crate::model::FieldKind::Integer).primary_key());
        let mut i = EntityInstance::persisted("User", map(json!({ "id": 1, "name": "a" })));
        i.set(map(json!({ "id": 2 })));
        i.set(map(json!({ "id": 3 })));
        assert_eq!(i.get("id"), Some(&json!(3)));
        assert_eq!(Value::Object(i.primary_key(&model)), json!({ "id": 1 }));

        i.mark_persisted(map(json!({ "id": 1, "name": "a" })));
        i.set(map(json!({ "name": "b" })));
        assert_eq!(Value::Object(i.primary_key(&model)), json!({ "id": 1 }));
    }

    #[test]
    fn serializes_as_plain_values() {
        let i = EntityInstance::built("User", map(json!({ "name": "a" })));
        assert!(i.is_new_record());
        assert_eq!(serde_json::to_value(&i).unwrap(), json!({ "name": "a" }));
    }
}
