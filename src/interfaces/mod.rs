//! Adapters between the engine and the outside world: CSV output and
//! JSON-lines command scripts.

pub mod csv;
pub mod script;
