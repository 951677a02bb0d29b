//! # Aleph Store
//!
//! The relational side of the aleph index core: a SQLite store holding roles,
//! collections, permissions, documents, entities and records; the fixture
//! loader that seeds it; and the content archive document bodies live in.
//!
//! The store is the source of truth. Search documents are always rebuilt
//! from it, never the other way round.

pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod fixtures;
pub mod models;
mod schema;

pub use archive::{content_hash, Archive, FileArchive, MemoryArchive};
pub use config::{StoreConfig, DEFAULT_DATABASE_URL};
pub use db::Store;
pub use error::{Result, StoreError};
pub use fixtures::{load_fixtures, FixtureSet, FixtureSummary, FixtureTable};
pub use models::{
    Collection, CollectionAcl, CollectionStatus, Document, Entity, NewCollection, NewDocument,
    NewEntity, NewRole, Permission, Properties, Record, ReplacedRecords, Role, RoleType,
    SystemRoles,
};

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub async fn memory_store() -> Store {
        let store = Store::connect(&StoreConfig::default()).await.unwrap();
        store.create_all().await.unwrap();
        store
    }
}
