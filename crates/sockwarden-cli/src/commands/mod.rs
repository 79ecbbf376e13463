pub mod config;
pub mod launch;
pub mod shims;
pub mod wrapper;
