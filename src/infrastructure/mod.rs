//! Adapters behind the domain ports: stores, clocks and the payment gateway.

pub mod clock;
pub mod in_memory;
pub mod phonepe;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
