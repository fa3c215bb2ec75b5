//! Tenancy Apps - App installation and permission provisioning
//!
//! Installs reusable app templates into tenant organizations. Each install
//! materializes one collection per declared app type, provisions per-app roles
//! and fans access grants out to the app's service principal, the organization
//! owners and those roles.
//!
//! # Architecture
//!
//! ```text
//!            AppUseCases (inbound)
//!                    │
//!               AppService
//!              ╱          ╲
//!      AppRegistry     InstallationEngine
//!          │            │    │      │
//!          │   RoleProvisioner │  ConfigStore
//!          │     EntitySetProvisioner
//!          ▼            ▼
//!   NameReservations  AuthorizationService, EntityDataModel,
//!                     OrganizationService, PrincipalsService  (outbound)
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod config_store;
pub mod engine;
pub mod entity_sets;
pub mod error;
pub mod events;
pub mod infrastructure;
pub mod model;
pub mod ports;
pub mod registry;
pub mod roles;
pub mod seed;
pub mod service;

pub use config::ProvisioningConfig;
pub use config_store::ConfigStore;
pub use engine::InstallationEngine;
pub use entity_sets::EntitySetProvisioner;
pub use error::{AppError, AppResult};
pub use events::AppEvent;
pub use infrastructure::InMemoryPlatform;
pub use model::*;
pub use ports::*;
pub use registry::{sanitize_entity_set_name, AppRegistry};
pub use roles::RoleProvisioner;
pub use seed::{apply_seed, SeedError, SeedManifest, SeedSummary};
pub use service::AppService;
