//! App Provisioning Data Model

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tenancy_common::{
    AclKey, AppId, AppTypeId, EntitySetId, EntityTypeId, FullQualifiedName, OrganizationId,
    Permission, PermissionSet, Principal,
};
use uuid::Uuid;

/// Reusable app template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    /// Unique app ID
    #[serde(default = "AppId::new_v4")]
    pub id: AppId,
    /// Reserved unique name
    pub name: String,
    /// Display title, part of every role principal id
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Collection kinds the app needs in every organization
    #[serde(default)]
    pub app_type_ids: BTreeSet<AppTypeId>,
}

impl App {
    /// Create new app with a fresh id
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        app_type_ids: impl IntoIterator<Item = AppTypeId>,
    ) -> Self {
        Self {
            id: AppId::new_v4(),
            name: name.into(),
            title: title.into(),
            description: description.into(),
            app_type_ids: app_type_ids.into_iter().collect(),
        }
    }

    /// Copy with metadata changes applied
    pub fn with_metadata(&self, update: &AppMetadataUpdate) -> Self {
        let mut app = self.clone();
        if let Some(title) = &update.title {
            app.title = title.clone();
        }
        if let Some(description) = &update.description {
            app.description = description.clone();
        }
        if let Some(name) = &update.name {
            app.name = name.clone();
        }
        app
    }
}

/// One collection kind required by an app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppType {
    #[serde(default = "AppTypeId::new_v4")]
    pub id: AppTypeId,
    /// Fully qualified type name, reserved like an app name
    #[serde(rename = "type")]
    pub type_fqn: FullQualifiedName,
    /// Backing schema type
    pub entity_type_id: EntityTypeId,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl AppType {
    pub fn new(
        type_fqn: FullQualifiedName,
        entity_type_id: EntityTypeId,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: AppTypeId::new_v4(),
            type_fqn,
            entity_type_id,
            title: title.into(),
            description: description.into(),
        }
    }

    /// Name under which the type is reserved
    pub fn reserved_name(&self) -> String {
        self.type_fqn.to_string()
    }

    pub fn with_metadata(&self, update: &AppTypeMetadataUpdate) -> Self {
        let mut app_type = self.clone();
        if let Some(title) = &update.title {
            app_type.title = title.clone();
        }
        if let Some(description) = &update.description {
            app_type.description = description.clone();
        }
        if let Some(type_fqn) = &update.type_fqn {
            app_type.type_fqn = type_fqn.clone();
        }
        app_type
    }
}

/// Metadata changes for an app
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadataUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub name: Option<String>,
}

/// Metadata changes for an app type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppTypeMetadataUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub type_fqn: Option<FullQualifiedName>,
}

/// Composite key of one installed app type in one organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppConfigKey {
    pub app_id: AppId,
    pub organization_id: OrganizationId,
    pub app_type_id: AppTypeId,
}

impl AppConfigKey {
    pub fn new(app_id: AppId, organization_id: OrganizationId, app_type_id: AppTypeId) -> Self {
        Self {
            app_id,
            organization_id,
            app_type_id,
        }
    }
}

/// Provisioning state stored at an [`AppConfigKey`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppTypeSetting {
    pub entity_set_id: EntitySetId,
    /// The app's own baseline on the collection
    pub permissions: PermissionSet,
}

impl AppTypeSetting {
    pub fn new(entity_set_id: EntitySetId, permissions: PermissionSet) -> Self {
        Self {
            entity_set_id,
            permissions,
        }
    }
}

/// Role principal created per (organization, app, permission)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub principal: Principal,
    pub title: String,
    pub description: String,
}

/// Tenant organization as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub title: String,
}

/// Installed app as available to a caller in one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// The app's service principal for this organization
    pub principal: Principal,
    pub app_id: AppId,
    pub title: String,
    pub description: String,
    pub organization: Organization,
    /// Fully qualified type name → setting
    pub config: BTreeMap<String, AppTypeSetting>,
}

/// Flags a collection can be created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitySetFlag {
    External,
    Linking,
    Audit,
}

/// Request to materialize a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySetDescriptor {
    pub entity_type_id: EntityTypeId,
    pub name: String,
    pub title: String,
    pub description: String,
    pub contacts: BTreeSet<String>,
    pub organization_id: OrganizationId,
    pub flags: BTreeSet<EntitySetFlag>,
    pub partitions: Vec<i32>,
}

/// Permissions to evaluate on one scope
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessCheck {
    pub acl_key: AclKey,
    pub permissions: PermissionSet,
}

/// Evaluated access on one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub acl_key: AclKey,
    pub permissions: BTreeMap<Permission, bool>,
}

impl Authorization {
    /// Every permission in `requested` evaluated to `true`.
    ///
    /// A permission missing from the result counts as denied.
    pub fn grants_all(&self, requested: &PermissionSet) -> bool {
        requested
            .iter()
            .all(|permission| self.permissions.get(permission) == Some(&true))
    }
}
