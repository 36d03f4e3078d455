pub mod libsql;
pub mod memory;
