//! Repository traits for metadata operations.

pub mod authorizations;
pub mod bootstrap;

pub use authorizations::AuthorizationRepo;
pub use bootstrap::BootstrapRepo;
