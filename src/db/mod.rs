// src/db/mod.rs

//! Database manifests: typed descriptors, the parsed entity, and the gateway
//! that fetches them.

mod descriptors;
mod entity;
mod gateway;

pub use descriptors::{
    FileDescriptor, FolderDescriptor, LinuxDescriptor, ZipDescriptor, ZipKind, ZipSummary,
    HASH_IGNORE,
};
pub use entity::DbEntity;
pub use gateway::DbGateway;
