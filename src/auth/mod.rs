//! Authentication and authorization module

pub mod evaluator;
pub mod guard;
pub mod password;
pub mod token;
pub mod user;

// Re-export main components
pub use evaluator::PermissionEvaluator;
pub use guard::AccessGuard;
pub use token::{Claims, TokenManager};
pub use user::{Capability, PermissionSet, Subject};
