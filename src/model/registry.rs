//! Validated set of entity models, keyed by name. Associations resolve through it.

use crate::error::{ProviderError, SchemaError};
use crate::model::{Association, Cardinality, EntityModel};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<Arc<EntityModel>>,
    by_name: HashMap<String, Arc<EntityModel>>,
}

impl ModelRegistry {
    /// Register `models`, checking primary keys, association targets and key columns.
    pub fn new(models: Vec<EntityModel>) -> Result<Self, SchemaError> {
        let mut registry = ModelRegistry::default();
        for model in models {
            if registry.by_name.contains_key(&model.name) {
                return Err(SchemaError::DuplicateModel(model.name));
            }
            if model.primary_key().is_none() {
                return Err(SchemaError::NoPrimaryKey(model.name));
            }
            let model = Arc::new(model);
            registry.by_name.insert(model.name.clone(), model.clone());
            registry.models.push(model);
        }
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for model in &self.models {
            let mut aliases = HashSet::new();
            for assoc in &model.associations {
                if !aliases.insert(assoc.alias.as_str()) {
                    return Err(SchemaError::DuplicateAssociation {
                        model: model.name.clone(),
                        alias: assoc.alias.clone(),
                    });
                }
                let target = self
                    .by_name
                    .get(&assoc.target)
                    .ok_or_else(|| SchemaError::MissingReference {
                        kind: "model",
                        id: assoc.target.clone(),
                    })?;
                let key_holder = match assoc.cardinality {
                    Cardinality::BelongsTo => Some(model.as_ref()),
                    Cardinality::HasOne | Cardinality::HasMany => Some(target.as_ref()),
                    Cardinality::BelongsToMany => None,
                };
                if let Some(holder) = key_holder {
                    if !holder.has_field(&assoc.foreign_key) {
                        return Err(SchemaError::MissingReference {
                            kind: "field",
                            id: format!("{}.{}", holder.name, assoc.foreign_key),
                        });
                    }
                }
                if assoc.cardinality == Cardinality::BelongsToMany && assoc.through.is_none() {
                    return Err(SchemaError::MissingReference {
                        kind: "through table",
                        id: format!("{}.{}", model.name, assoc.alias),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EntityModel>> {
        self.by_name.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Arc<EntityModel>, ProviderError> {
        self.get(name)
            .ok_or_else(|| ProviderError::UnknownModel(name.to_string()))
    }

    pub fn target_of(&self, association: &Association) -> Option<&Arc<EntityModel>> {
        self.get(&association.target)
    }

    /// Models in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityModel>> {
        self.models.iter()
    }
}
