pub mod channels;
pub mod memory;
pub mod migrate;
pub mod pool;
pub mod requests;
pub mod schema;
