//! Entity model definitions: fields, primary keys and typed associations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Storage type of a field. Drives SQL casts, DDL and schema validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    BigInt,
    Float,
    Decimal,
    Boolean,
    String,
    Text,
    Uuid,
    Timestamp,
    Date,
    Json,
}

impl FieldKind {
    /// PostgreSQL type used for casts and column definitions.
    pub fn pg_type(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::BigInt => "bigint",
            FieldKind::Float => "double precision",
            FieldKind::Decimal => "numeric",
            FieldKind::Boolean => "boolean",
            FieldKind::String => "varchar",
            FieldKind::Text => "text",
            FieldKind::Uuid => "uuid",
            FieldKind::Timestamp => "timestamptz",
            FieldKind::Date => "date",
            FieldKind::Json => "jsonb",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::BigInt)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldKind::Integer | FieldKind::BigInt | FieldKind::Float | FieldKind::Decimal
        )
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, FieldKind::String | FieldKind::Text)
    }
}

/// Declarative value rules checked by schema validation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldRules {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    /// The store fills the value when the instance omits it.
    pub has_default: bool,
    pub rules: FieldRules,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldDef {
            name: name.into(),
            kind,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            unique: false,
            has_default: false,
            rules: FieldRules::default(),
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn max_length(mut self, n: u32) -> Self {
        self.rules.max_length = Some(n);
        self
    }

    pub fn min_length(mut self, n: u32) -> Self {
        self.rules.min_length = Some(n);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.rules.pattern = Some(pattern.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.rules.format = Some(format.into());
        self
    }

    pub fn allowed(mut self, values: Vec<Value>) -> Self {
        self.rules.allowed = Some(values);
        self
    }

    pub fn range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.rules.minimum = minimum;
        self.rules.maximum = maximum;
        self
    }

    /// Whether the store can supply a value the instance left out.
    pub fn store_supplied(&self) -> bool {
        self.auto_increment || self.has_default
    }
}

/// Cardinality of an association; decides which side holds the foreign key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Source holds `foreign_key` pointing at the target's primary key.
    BelongsTo,
    /// Target holds `foreign_key` pointing at the source's primary key.
    HasOne,
    HasMany,
    /// Join table `through` holds `foreign_key` (source) and `other_key` (target).
    BelongsToMany,
}

impl Cardinality {
    pub fn is_to_many(&self) -> bool {
        matches!(self, Cardinality::HasMany | Cardinality::BelongsToMany)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Through {
    pub table: String,
    pub other_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Association {
    /// Key under which the association is queried and rendered.
    pub alias: String,
    /// Target model name.
    pub target: String,
    pub cardinality: Cardinality,
    pub foreign_key: String,
    pub through: Option<Through>,
}

impl Association {
    fn new(alias: &str, target: &str, cardinality: Cardinality, foreign_key: &str) -> Self {
        Association {
            alias: alias.to_string(),
            target: target.to_string(),
            cardinality,
            foreign_key: foreign_key.to_string(),
            through: None,
        }
    }

    pub fn belongs_to(alias: &str, target: &str, foreign_key: &str) -> Self {
        Self::new(alias, target, Cardinality::BelongsTo, foreign_key)
    }

    pub fn has_one(alias: &str, target: &str, foreign_key: &str) -> Self {
        Self::new(alias, target, Cardinality::HasOne, foreign_key)
    }

    pub fn has_many(alias: &str, target: &str, foreign_key: &str) -> Self {
        Self::new(alias, target, Cardinality::HasMany, foreign_key)
    }

    pub fn belongs_to_many(
        alias: &str,
        target: &str,
        through_table: &str,
        foreign_key: &str,
        other_key: &str,
    ) -> Self {
        let mut a = Self::new(alias, target, Cardinality::BelongsToMany, foreign_key);
        a.through = Some(Through {
            table: through_table.to_string(),
            other_key: other_key.to_string(),
        });
        a
    }
}

/// Schema of a persistent record. Immutable once registered.
#[derive(Clone, Debug)]
pub struct EntityModel {
    pub name: String,
    pub table: String,
    pub schema: Option<String>,
    pub fields: Vec<FieldDef>,
    pub associations: Vec<Association>,
}

impl EntityModel {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        EntityModel {
            name: name.into(),
            table: table.into(),
            schema: None,
            fields: Vec::new(),
            associations: Vec::new(),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// Primary-key field names in declaration order (several for composite keys).
    pub fn primary_keys(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// First primary-key field; associations join on it.
    pub fn primary_key(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_named(name).is_some()
    }

    pub fn association_named(&self, alias: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.alias == alias)
    }
}
