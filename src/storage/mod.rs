//! Persistence of users, roles, groups, memberships and calendar events

pub mod memory;
pub mod mysql;
pub mod traits;

pub use memory::MemoryStorage;
pub use mysql::MySqlStorage;
pub use traits::*;
