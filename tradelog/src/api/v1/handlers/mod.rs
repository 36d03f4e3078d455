pub mod backup;
pub(crate) mod health;
pub mod players;

pub use health::health_check;
