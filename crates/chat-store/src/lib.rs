//! Remote document stores for the chat session core.
//!
//! Provides:
//! - `MemoryStore` - raw JSON documents held in memory (feature: memory)
//! - `FirestoreStore` - Firestore REST API (feature: firestore)

pub mod storage;

#[cfg(feature = "memory")]
pub use storage::MemoryStore;

#[cfg(feature = "firestore")]
pub use storage::FirestoreStore;
