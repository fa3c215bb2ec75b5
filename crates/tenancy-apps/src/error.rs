//! Error types for app provisioning

use crate::model::AppConfigKey;
use crate::ports::ServiceError;
use tenancy_common::{AppId, AppTypeId, OrganizationId, StoreError};
use thiserror::Error;

/// App provisioning error type
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Unknown app id
    #[error("app not found: {0}")]
    AppNotFound(AppId),

    /// Unknown app type id
    #[error("app type not found: {0}")]
    AppTypeNotFound(AppTypeId),

    /// No setting stored for the key
    #[error("app config not found: app {} org {} type {}", .0.app_id, .0.organization_id, .0.app_type_id)]
    AppConfigNotFound(AppConfigKey),

    /// Unknown organization
    #[error("organization not found: {0}")]
    OrganizationNotFound(OrganizationId),

    /// Reservation refused the id or name
    #[error("name unavailable: {0}")]
    NameUnavailable(String),

    /// Role provisioning failed, the app is likely installed already
    #[error("conflict: {0}")]
    Conflict(String),

    /// Reconciliation needs a user owner to act as
    #[error("organization {0} has no user owner")]
    NoUserOwner(OrganizationId),

    /// Collaborator failure, passed through unmodified
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Store failure, passed through unmodified
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for app provisioning
pub type AppResult<T> = Result<T, AppError>;
