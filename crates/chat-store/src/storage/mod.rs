//! Storage implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "firestore")]
pub mod firestore;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;

#[cfg(feature = "firestore")]
pub use firestore::FirestoreStore;
