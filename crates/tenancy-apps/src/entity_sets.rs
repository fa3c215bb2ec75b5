//! Collection provisioning for one (organization, app type)

use std::collections::BTreeSet;
use std::sync::Arc;
use tenancy_common::{AppTypeId, EntitySetId, OrganizationId, Principal};
use tracing::info;

use crate::error::AppResult;
use crate::model::EntitySetDescriptor;
use crate::ports::{EntityDataModel, OrganizationService};
use crate::registry::AppRegistry;

/// Names and materializes the collection backing an app type
#[derive(Clone)]
pub struct EntitySetProvisioner {
    registry: Arc<AppRegistry>,
    catalog: Arc<dyn EntityDataModel>,
    organizations: Arc<dyn OrganizationService>,
}

impl EntitySetProvisioner {
    pub fn new(
        registry: Arc<AppRegistry>,
        catalog: Arc<dyn EntityDataModel>,
        organizations: Arc<dyn OrganizationService>,
    ) -> Self {
        Self {
            registry,
            catalog,
            organizations,
        }
    }

    pub async fn generate_entity_set(
        &self,
        organization_id: OrganizationId,
        app_type_id: AppTypeId,
        prefix: &str,
        acting_principal: &Principal,
    ) -> AppResult<EntitySetId> {
        let app_type = self.registry.require_app_type(app_type_id).await?;
        let name = self
            .registry
            .format_entity_set_name(prefix, &app_type.type_fqn)
            .await?;

        let descriptor = EntitySetDescriptor {
            entity_type_id: app_type.entity_type_id,
            title: format!("{} ({})", app_type.title, prefix),
            description: format!(
                "Auto-generated for organization {}\n\n{}",
                organization_id, app_type.description
            ),
            contacts: BTreeSet::new(),
            organization_id,
            flags: BTreeSet::new(),
            partitions: self.organizations.get_default_partitions(organization_id).await?,
            name,
        };

        let entity_set_id = self.catalog.create_entity_set(acting_principal, descriptor).await?;
        info!(%organization_id, %app_type_id, %entity_set_id, "entity set provisioned");
        Ok(entity_set_id)
    }
}
