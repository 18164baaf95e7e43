//! Role configuration and the typed role registry.
//!
//! Roles are defined once per project and referenced by id from shots and
//! artifacts. Lookups go through [`RoleRegistry`] so a missing role is an
//! explicit [`CoreError::NotFound`] rather than an empty scan result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::naming::validate_entity_name;
use crate::paths::PathTemplate;
use crate::types::RoleId;

/// How a role's publish artifact enters the assembly document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Library reference to the publish file.
    #[default]
    Link,
    /// Embedded copy of the publish content.
    Append,
}

/// Configuration record of one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub id: RoleId,
    #[serde(default)]
    pub link_mode: LinkMode,
    /// This role provides the shot's shared environment/world data.
    #[serde(default)]
    pub owns_world: bool,
    /// Excluded from assembly rebuilds.
    #[serde(default)]
    pub skip_assembly: bool,
    #[serde(default)]
    pub template: PathTemplate,
    /// Named group of scene content linked into the assembly. Defaults to the role id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_group: Option<String>,
}

impl RoleConfig {
    pub fn new(id: impl Into<RoleId>) -> Self {
        Self {
            id: id.into(),
            link_mode: LinkMode::default(),
            owns_world: false,
            skip_assembly: false,
            template: PathTemplate::default(),
            primary_group: None,
        }
    }

    pub fn with_link_mode(mut self, mode: LinkMode) -> Self {
        self.link_mode = mode;
        self
    }

    pub fn with_owns_world(mut self, owns_world: bool) -> Self {
        self.owns_world = owns_world;
        self
    }

    pub fn with_skip_assembly(mut self, skip: bool) -> Self {
        self.skip_assembly = skip;
        self
    }

    pub fn with_template(mut self, template: PathTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_primary_group(mut self, group: impl Into<String>) -> Self {
        self.primary_group = Some(group.into());
        self
    }

    /// Group of scene content linked into the assembly.
    pub fn group_name(&self) -> &str {
        self.primary_group.as_deref().unwrap_or(&self.id)
    }

    /// Validate this record in isolation.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_entity_name("Role", &self.id)?;
        if let PathTemplate::Custom(pattern) = &self.template {
            if pattern.trim().is_empty() {
                return Err(CoreError::Config(format!(
                    "Role '{}' has an empty custom path template",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// The project's role definitions, keyed by role id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleRegistry {
    roles: BTreeMap<RoleId, RoleConfig>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from role records, validating the result.
    pub fn from_roles(roles: impl IntoIterator<Item = RoleConfig>) -> Result<Self, CoreError> {
        let mut registry = Self::new();
        for role in roles {
            registry.insert(role)?;
        }
        Ok(registry)
    }

    /// Insert or replace a role. Rejects a second `owns_world` role.
    pub fn insert(&mut self, role: RoleConfig) -> Result<(), CoreError> {
        role.validate()?;
        if role.owns_world {
            if let Some(owner) = self.world_owner() {
                if owner.id != role.id {
                    return Err(CoreError::Config(format!(
                        "Role '{}' cannot own the world: '{}' already does",
                        role.id, owner.id
                    )));
                }
            }
        }
        self.roles.insert(role.id.clone(), role);
        Ok(())
    }

    /// Look up a role by id.
    pub fn get(&self, id: &str) -> Result<&RoleConfig, CoreError> {
        self.roles
            .get(id)
            .ok_or_else(|| CoreError::not_found("role", id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.roles.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleConfig> {
        self.roles.values()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Roles that take part in assembly rebuilds, in id order.
    pub fn assembly_roles(&self) -> impl Iterator<Item = &RoleConfig> {
        self.roles.values().filter(|r| !r.skip_assembly)
    }

    /// The single role flagged `owns_world`, if any.
    pub fn world_owner(&self) -> Option<&RoleConfig> {
        self.roles.values().find(|r| r.owns_world)
    }

    /// Validate the whole registry.
    ///
    /// Used after deserialization, where [`insert`](Self::insert) was bypassed.
    pub fn validate(&self) -> Result<(), CoreError> {
        for role in self.roles.values() {
            role.validate()?;
        }
        let owners: Vec<&str> = self
            .roles
            .values()
            .filter(|r| r.owns_world)
            .map(|r| r.id.as_str())
            .collect();
        if owners.len() > 1 {
            return Err(CoreError::Config(format!(
                "At most one role may own the world, found: {}",
                owners.join(", ")
            )));
        }
        for (key, role) in &self.roles {
            if key != &role.id {
                return Err(CoreError::Config(format!(
                    "Role entry '{key}' declares mismatched id '{}'",
                    role.id
                )));
            }
        }
        Ok(())
    }
}

/// The roles a freshly created project starts with.
pub fn default_roles() -> Vec<RoleConfig> {
    vec![
        RoleConfig::new("LAYOUT").with_owns_world(true),
        RoleConfig::new("ANIM"),
        RoleConfig::new("FX"),
        RoleConfig::new("LIGHT").with_link_mode(LinkMode::Append),
        RoleConfig::new("COMP").with_skip_assembly(true),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
