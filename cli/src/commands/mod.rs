//! Command implementations

pub mod destroy;
pub mod plan;
pub mod publish;
pub mod status;
pub mod up;
