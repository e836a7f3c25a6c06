//! Per-database mapping tables.
//!
//! Each source database gets one immutable [`MappingConfig`], normally loaded
//! from `<mappings_dir>/<database>.yaml`:
//!
//! ```yaml
//! database: companies
//! entities:                 # Neo4j label -> TypeQL entity type
//!   Organization: organization
//!   IndustryCategory: industry_category
//! relations:                # Neo4j rel type -> relation + roles (tail, head)
//!   HAS_CEO: { relation: ceo_of, source_role: organization, target_role: ceo }
//!   HAS_COMPETITOR: [competes_with, competitor, competitor]
//! attributes:               # global property -> attribute
//!   nbrEmployees: nbr_employees
//! entity_attributes:        # owner type -> property -> attribute
//!   city:
//!     name: city_name
//! display_attributes:       # attributes used for a bare `RETURN n`
//!   movie: [title]
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub mod errors;

pub use errors::MappingError;

/// Relation name plus the role played by the arrow tail and the arrow head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RelationMappingRepr", into = "RelationMappingRepr")]
pub struct RelationMapping {
    pub relation: String,
    pub source_role: String,
    pub target_role: String,
}

impl RelationMapping {
    pub fn new(relation: &str, source_role: &str, target_role: &str) -> Self {
        RelationMapping {
            relation: relation.to_string(),
            source_role: source_role.to_string(),
            target_role: target_role.to_string(),
        }
    }

    /// Both ends play the same role, so arrow direction carries no meaning.
    pub fn is_symmetric(&self) -> bool {
        self.source_role == self.target_role
    }
}

/// Relations may be written as a map or as a `[relation, source_role, target_role]` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RelationMappingRepr {
    Full {
        relation: String,
        source_role: String,
        target_role: String,
    },
    Short(String, String, String),
}

impl From<RelationMappingRepr> for RelationMapping {
    fn from(repr: RelationMappingRepr) -> Self {
        match repr {
            RelationMappingRepr::Full {
                relation,
                source_role,
                target_role,
            }
            | RelationMappingRepr::Short(relation, source_role, target_role) => RelationMapping {
                relation,
                source_role,
                target_role,
            },
        }
    }
}

impl From<RelationMapping> for RelationMappingRepr {
    fn from(mapping: RelationMapping) -> Self {
        RelationMappingRepr::Full {
            relation: mapping.relation,
            source_role: mapping.source_role,
            target_role: mapping.target_role,
        }
    }
}

fn default_display_attributes() -> Vec<String> {
    vec!["name".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub entities: HashMap<String, String>,
    #[serde(default)]
    pub relations: HashMap<String, RelationMapping>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub entity_attributes: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    pub display_attributes: HashMap<String, Vec<String>>,
    #[serde(default = "default_display_attributes")]
    pub default_display_attributes: Vec<String>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        MappingConfig {
            database: String::new(),
            entities: HashMap::new(),
            relations: HashMap::new(),
            attributes: HashMap::new(),
            entity_attributes: HashMap::new(),
            display_attributes: HashMap::new(),
            default_display_attributes: default_display_attributes(),
        }
    }
}

impl MappingConfig {
    pub fn new(database: &str) -> Self {
        MappingConfig {
            database: database.to_string(),
            ..Default::default()
        }
    }

    pub fn from_yaml_str(yaml: &str, origin: &str) -> Result<Self, MappingError> {
        let config: MappingConfig =
            serde_yaml::from_str(yaml).map_err(|source| MappingError::Parse {
                path: origin.to_string(),
                source,
            })?;
        config.check()?;
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|source| MappingError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml, &path.display().to_string())
    }

    /// Load `<dir>/<database>.yaml`, filling in `database` if the file omits it.
    pub fn load_for_database<P: AsRef<Path>>(dir: P, database: &str) -> Result<Self, MappingError> {
        let path = dir.as_ref().join(format!("{}.yaml", database));
        if !path.exists() {
            return Err(MappingError::NotFound {
                database: database.to_string(),
                path: path.display().to_string(),
            });
        }
        let mut config = Self::from_yaml_file(&path)?;
        if config.database.is_empty() {
            config.database = database.to_string();
        }
        log::debug!(
            "Loaded mapping for {}: {} entities, {} relations",
            database,
            config.entities.len(),
            config.relations.len()
        );
        Ok(config)
    }

    fn check(&self) -> Result<(), MappingError> {
        for (rel_type, mapping) in &self.relations {
            let empty = [&mapping.relation, &mapping.source_role, &mapping.target_role]
                .iter()
                .any(|s| s.trim().is_empty());
            if empty {
                return Err(MappingError::InvalidRelation {
                    rel_type: rel_type.clone(),
                    message: "relation and both roles must be non-empty".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn with_entity(mut self, label: &str, entity_type: &str) -> Self {
        self.entities
            .insert(label.to_string(), entity_type.to_string());
        self
    }

    pub fn with_relation(mut self, rel_type: &str, mapping: RelationMapping) -> Self {
        self.relations.insert(rel_type.to_string(), mapping);
        self
    }

    pub fn with_attribute(mut self, property: &str, attribute: &str) -> Self {
        self.attributes
            .insert(property.to_string(), attribute.to_string());
        self
    }

    pub fn with_entity_attribute(mut self, owner: &str, property: &str, attribute: &str) -> Self {
        self.entity_attributes
            .entry(owner.to_string())
            .or_default()
            .insert(property.to_string(), attribute.to_string());
        self
    }

    pub fn with_display_attributes(mut self, entity_type: &str, attributes: &[&str]) -> Self {
        self.display_attributes.insert(
            entity_type.to_string(),
            attributes.iter().map(|a| a.to_string()).collect(),
        );
        self
    }

    /// Entity type for a node label; unmapped labels become snake_case.
    pub fn entity_type(&self, label: &str) -> String {
        self.entities
            .get(label)
            .cloned()
            .unwrap_or_else(|| to_snake_case(label))
    }

    pub fn relation(&self, rel_type: &str) -> Option<&RelationMapping> {
        self.relations.get(rel_type)
    }

    /// Owner-scoped entry, then global entry, then the lower-cased property.
    pub fn attribute(&self, owner: Option<&str>, property: &str) -> String {
        owner
            .and_then(|owner| self.entity_attributes.get(owner))
            .and_then(|scoped| scoped.get(property))
            .or_else(|| self.attributes.get(property))
            .cloned()
            .unwrap_or_else(|| property.to_lowercase())
    }

    pub fn display_attributes(&self, owner: Option<&str>) -> &[String] {
        owner
            .and_then(|owner| self.display_attributes.get(owner))
            .map(Vec::as_slice)
            .unwrap_or(&self.default_display_attributes)
    }
}

/// `IndustryCategory` -> `industry_category`, `IMDBMovie` -> `imdb_movie`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == ' ' || c == '-' {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }
    out
}
