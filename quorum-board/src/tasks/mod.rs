mod global;
mod room;

pub use global::*;
pub use room::*;
