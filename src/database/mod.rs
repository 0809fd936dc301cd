pub mod connection;

pub use connection::{open_pool, open_pool_in_memory};
