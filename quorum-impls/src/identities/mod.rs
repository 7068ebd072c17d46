mod memory_identity;

pub use memory_identity::*;
