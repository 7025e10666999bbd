// db/mod.rs
// Storage layer: pooled rusqlite connections, schema, and tag/alias records

pub mod guard;
pub mod pool;
mod schema;
pub mod tags;
mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use guard::{MAX_CONTENT_LEN, MAX_NAME_LEN, check_name_available_sync, normalize_name};
pub use pool::{DatabasePool, PoolOptions, PoolStatus};
pub use schema::SCHEMA_VERSION;
pub use tags::GuildPurge;
pub use types::*;
