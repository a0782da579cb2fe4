pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{pushed_properties, seeded_bytes};
