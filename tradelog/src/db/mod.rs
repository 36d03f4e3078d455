pub mod backends;
mod connection;
mod kv;
pub(crate) mod schema;
pub mod traits;

pub use backends::libsql::LibSqlPersistence;
pub use backends::memory::MemoryPersistence;
pub use connection::Database;
pub use kv::KvRepository;
pub use traits::*;
