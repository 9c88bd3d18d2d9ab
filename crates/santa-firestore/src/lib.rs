//! Durable order state on Firestore.
//!
//! This crate provides:
//! - A Firestore REST client with token caching, retry and request metrics
//! - The `OrderStore` seam with optimistic revisions
//! - `update_order`, the read-modify-conditional-write loop every order
//!   transition goes through
//! - Firestore and in-memory `OrderStore` implementations

pub mod client;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod orders;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use memory::InMemoryOrderStore;
pub use orders::FirestoreOrderStore;
pub use retry::RetryConfig;
pub use store::{update_order, OrderStore, Revision, UpdateError, Versioned};
pub use types::{Document, Value};
