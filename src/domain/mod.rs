//! Domain entities, value objects and the ports the engine talks through.

pub mod adjustment;
pub mod application;
pub mod payment;
pub mod phone;
pub mod plan;
pub mod ports;
pub mod sequence;
