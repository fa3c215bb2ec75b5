//! Infrastructure adapters

pub mod memory;

pub use memory::{
    InMemoryAuthorizations, InMemoryCatalog, InMemoryOrganizations, InMemoryPlatform,
    InMemoryPrincipals, InMemoryReservations, StoredEntitySet,
};
