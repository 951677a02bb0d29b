//! Row types and their queries.
//!
//! Every query takes a `&mut SqliteConnection`, so the same call works on a
//! pooled connection or inside a transaction.

pub mod collection;
pub mod document;
pub mod entity;
pub mod record;
pub mod role;

pub use collection::{Collection, CollectionAcl, CollectionStatus, NewCollection, Permission};
pub use document::{Document, NewDocument};
pub use entity::{Entity, NewEntity, Properties};
pub use record::{Record, ReplacedRecords};
pub use role::{NewRole, Role, RoleType, SystemRoles, SYSTEM_GUEST, SYSTEM_USER};
