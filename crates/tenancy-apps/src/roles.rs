//! Role provisioning: one role principal per (organization, app, permission)

use std::collections::BTreeMap;
use std::sync::Arc;
use tenancy_common::{OrganizationId, Permission, PermissionSet, Principal, RolePrincipalKey};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{App, Role};
use crate::ports::{PrincipalsService, RoleCreation};

const ALREADY_INSTALLED: &str = "The requested app has already been installed for this organization";

/// Creates or finds the roles an installed app hands out
#[derive(Clone)]
pub struct RoleProvisioner {
    principals: Arc<dyn PrincipalsService>,
}

impl RoleProvisioner {
    pub fn new(principals: Arc<dyn PrincipalsService>) -> Self {
        Self { principals }
    }

    /// Role principal for every requested permission.
    ///
    /// Existing roles are reused. Any other creation failure aborts the
    /// whole call with [`AppError::Conflict`].
    pub async fn get_or_create_roles_for_app_permission(
        &self,
        app: &App,
        organization_id: OrganizationId,
        permissions: &PermissionSet,
        acting_user: &Principal,
    ) -> AppResult<BTreeMap<Permission, Principal>> {
        let mut roles = BTreeMap::new();
        for permission in permissions {
            let key = RolePrincipalKey::new(organization_id, app.title.clone(), *permission);
            let role = Role {
                id: Uuid::new_v4(),
                organization_id,
                principal: key.principal(),
                title: key.title(),
                description: format!("{} permission for the {} app", permission, app.title),
            };

            match self.principals.create_role_if_not_exists(acting_user, role).await {
                Ok(RoleCreation::Created) => debug!(role = %key, "role created"),
                Ok(RoleCreation::AlreadyExists) => debug!(role = %key, "role already exists"),
                Err(e) => {
                    warn!(role = %key, error = %e, "role creation failed");
                    return Err(AppError::Conflict(ALREADY_INSTALLED.to_string()));
                }
            }
            roles.insert(*permission, key.principal());
        }
        Ok(roles)
    }
}
