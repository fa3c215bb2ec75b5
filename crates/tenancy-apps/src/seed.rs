//! Seed manifests
//!
//! A JSON description of schema types, app types, apps, organizations and
//! installs, replayed against an [`InMemoryPlatform`].
//!
//! ```json
//! {
//!   "entity_types": { "<entity type uuid>": ["<property uuid>"] },
//!   "app_types": [{ "type": "app.person", "entity_type_id": "<uuid>", "title": "People" }],
//!   "apps": [{ "name": "survey", "title": "Survey", "app_types": ["app.person"] }],
//!   "organizations": [{ "title": "Acme", "owners": [{ "kind": "USER", "id": "u1" }] }],
//!   "installs": [{ "app": "survey", "organization": "Acme" }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tenancy_common::{
    EntityTypeId, FullQualifiedName, IdError, OrganizationId, Principal, PropertyTypeId,
};
use thiserror::Error;
use tracing::info;

use crate::error::AppError;
use crate::infrastructure::InMemoryPlatform;
use crate::model::{App, AppType, Organization};
use crate::ports::AppUseCases;
use crate::service::AppService;

/// Seed replay failure
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    #[error("unknown app type: {0}")]
    UnknownAppType(String),

    #[error("unknown app: {0}")]
    UnknownApp(String),

    #[error("unknown organization: {0}")]
    UnknownOrganization(String),

    /// No principal given and no user owner to install as
    #[error("no installer for {app} in {organization}")]
    NoInstaller { app: String, organization: String },

    #[error(transparent)]
    App(#[from] AppError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedAppType {
    /// Fully qualified name, `namespace.name`
    #[serde(rename = "type")]
    pub type_name: String,
    pub entity_type_id: EntityTypeId,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedApp {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Fully qualified app type names
    #[serde(default)]
    pub app_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedOrganization {
    #[serde(default = "OrganizationId::new_v4")]
    pub id: OrganizationId,
    pub title: String,
    #[serde(default)]
    pub owners: Vec<Principal>,
    #[serde(default)]
    pub partitions: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedInstall {
    /// App name
    pub app: String,
    /// Organization title
    pub organization: String,
    /// Collection name prefix, defaults to the organization title
    #[serde(default)]
    pub prefix: Option<String>,
    /// Acting principal, defaults to the organization's first user owner
    #[serde(default)]
    pub principal: Option<Principal>,
}

/// Everything a seed run registers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedManifest {
    pub entity_types: BTreeMap<EntityTypeId, Vec<PropertyTypeId>>,
    pub app_types: Vec<SeedAppType>,
    pub apps: Vec<SeedApp>,
    pub organizations: Vec<SeedOrganization>,
    pub installs: Vec<SeedInstall>,
}

impl SeedManifest {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load from file
    pub fn load(path: &str) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Counts of what a seed run created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub app_types: usize,
    pub apps: usize,
    pub organizations: usize,
    pub installs: usize,
}

/// Register the manifest on `platform` through `service`, then run its installs
pub async fn apply_seed(
    platform: &InMemoryPlatform,
    service: &AppService,
    manifest: &SeedManifest,
) -> Result<SeedSummary, SeedError> {
    let mut summary = SeedSummary::default();

    for (entity_type_id, properties) in &manifest.entity_types {
        platform
            .catalog
            .register_entity_type(*entity_type_id, properties.iter().copied());
    }

    let mut type_ids = BTreeMap::new();
    for seed in &manifest.app_types {
        let fqn: FullQualifiedName = seed.type_name.parse()?;
        let app_type = AppType::new(fqn, seed.entity_type_id, seed.title.clone(), seed.description.clone());
        let id = service.create_app_type(app_type).await?;
        type_ids.insert(seed.type_name.clone(), id);
        summary.app_types += 1;
    }

    let mut app_ids = BTreeMap::new();
    for seed in &manifest.apps {
        let app_type_ids = seed
            .app_types
            .iter()
            .map(|name| {
                type_ids
                    .get(name)
                    .copied()
                    .ok_or_else(|| SeedError::UnknownAppType(name.clone()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        let app = App::new(seed.name.clone(), seed.title.clone(), seed.description.clone(), app_type_ids);
        let id = service.create_app(app).await?;
        app_ids.insert(seed.name.clone(), id);
        summary.apps += 1;
    }

    let mut organizations = BTreeMap::new();
    for seed in &manifest.organizations {
        let organization = Organization {
            id: seed.id,
            title: seed.title.clone(),
        };
        platform.organizations.add_organization(
            organization,
            seed.owners.iter().cloned(),
            seed.partitions.clone(),
        );
        organizations.insert(seed.title.clone(), seed);
        summary.organizations += 1;
    }

    for install in &manifest.installs {
        let app_id = *app_ids
            .get(&install.app)
            .ok_or_else(|| SeedError::UnknownApp(install.app.clone()))?;
        let organization = organizations
            .get(&install.organization)
            .ok_or_else(|| SeedError::UnknownOrganization(install.organization.clone()))?;
        let principal = install
            .principal
            .clone()
            .or_else(|| organization.owners.iter().find(|owner| owner.is_user()).cloned())
            .ok_or_else(|| SeedError::NoInstaller {
                app: install.app.clone(),
                organization: install.organization.clone(),
            })?;
        let prefix = install.prefix.as_deref().unwrap_or(&organization.title);

        service
            .install_app(app_id, organization.id, prefix, &principal)
            .await?;
        summary.installs += 1;
    }

    info!(
        app_types = summary.app_types,
        apps = summary.apps,
        organizations = summary.organizations,
        installs = summary.installs,
        "seed applied"
    );
    Ok(summary)
}
