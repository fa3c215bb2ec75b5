//! Tenancy Common - Shared primitives for tenant provisioning
//!
//! This crate provides the building blocks every provisioning component
//! leans on:
//! - Identifiers and authorization value objects (principals, permissions, ACL keys)
//! - A versioned key-value store with compare-and-swap updates
//! - A fire-and-forget event bus with an observer registry
//! - Error handling
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        TENANCY COMMON                            │
//! │                                                                  │
//! │  ┌──────────────┐   ┌────────────────────┐   ┌───────────────┐  │
//! │  │ Value Objects│   │ KeyValueStore (CAS)│   │   EventBus    │  │
//! │  │ ids, AclKey, │   │  get / put / cas   │   │ post ──► mpsc │  │
//! │  │ Principal    │   │  apply_atomic      │   │  dispatcher ─►│  │
//! │  └──────────────┘   └────────────────────┘   │  observers    │  │
//! │                                              └───────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod ids;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use events::{
    EventBus, EventDispatcher, EventEnvelope, EventObserver, ObserverRegistry, RecordingObserver,
};
pub use ids::*;
pub use store::{apply_atomic, InMemoryKeyValueStore, KeyValueStore, Versioned};
