//! v1 API Data Transfer Objects, kept separate from the domain models.

pub mod backup;
pub mod players;

pub use backup::*;
pub use players::*;
