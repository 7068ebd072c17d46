mod identities;
mod stores;
mod uploads;

pub use identities::*;
pub use stores::*;
pub use uploads::*;
