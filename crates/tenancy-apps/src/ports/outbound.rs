//! Outbound ports (collaborator traits)
//!
//! Hexagonal architecture: these are the interfaces external services must implement.

use async_trait::async_trait;
use std::collections::BTreeSet;
use tenancy_common::{
    AclKey, AppId, EntitySetId, EntityTypeId, OrganizationId, PermissionSet, Principal,
    PropertyTypeId,
};
use uuid::Uuid;

use crate::model::{AccessCheck, Authorization, EntitySetDescriptor, Organization, Role};

/// Collaborator failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} rejected request: {reason}")]
    Rejected { service: &'static str, reason: String },
}

impl ServiceError {
    pub fn rejected(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            service,
            reason: reason.into(),
        }
    }
}

/// Result type for collaborator calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Unique id/name reservation port
#[async_trait]
pub trait NameReservations: Send + Sync {
    /// Reserve `name` for `id`; false if either is held by someone else
    async fn reserve(&self, id: Uuid, name: &str) -> ServiceResult<bool>;

    async fn is_reserved(&self, name: &str) -> ServiceResult<bool>;

    /// Id holding `name`
    async fn lookup(&self, name: &str) -> ServiceResult<Option<Uuid>>;

    /// Move the reservation of `id` to `new_name`; false if taken
    async fn rename(&self, id: Uuid, new_name: &str) -> ServiceResult<bool>;

    async fn release(&self, id: Uuid) -> ServiceResult<()>;
}

/// Authorization grant/query port
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    /// Add permissions for a principal on a scope, keeping existing ones
    async fn add_permission(
        &self,
        acl_key: &AclKey,
        principal: &Principal,
        permissions: &PermissionSet,
    ) -> ServiceResult<()>;

    /// Evaluate each check against the union of `principals`
    async fn access_checks_for_principals(
        &self,
        checks: &[AccessCheck],
        principals: &BTreeSet<Principal>,
    ) -> ServiceResult<Vec<Authorization>>;
}

/// Storage and schema catalog port
#[async_trait]
pub trait EntityDataModel: Send + Sync {
    /// Materialize a collection, returning its freshly allocated id
    async fn create_entity_set(
        &self,
        owner: &Principal,
        descriptor: EntitySetDescriptor,
    ) -> ServiceResult<EntitySetId>;

    /// Property ids of a schema type
    async fn get_entity_type_properties(
        &self,
        entity_type_id: EntityTypeId,
    ) -> ServiceResult<Vec<PropertyTypeId>>;
}

/// Organization directory port
#[async_trait]
pub trait OrganizationService: Send + Sync {
    async fn get_organization(&self, id: OrganizationId) -> ServiceResult<Option<Organization>>;

    /// Principals owning the organization
    async fn get_owners(&self, id: OrganizationId) -> ServiceResult<BTreeSet<Principal>>;

    async fn get_default_partitions(&self, id: OrganizationId) -> ServiceResult<Vec<i32>>;

    async fn add_app_to_org(&self, id: OrganizationId, app_id: AppId) -> ServiceResult<()>;

    async fn get_organization_apps(&self, id: OrganizationId) -> ServiceResult<BTreeSet<AppId>>;
}

/// Outcome of a create-if-absent role request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleCreation {
    Created,
    AlreadyExists,
}

/// Securable principal management port
#[async_trait]
pub trait PrincipalsService: Send + Sync {
    async fn create_role_if_not_exists(&self, actor: &Principal, role: Role) -> ServiceResult<RoleCreation>;
}
