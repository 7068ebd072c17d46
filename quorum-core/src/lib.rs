mod batch;
mod document;
mod identity;
mod live;
mod media;
mod optimistic;
mod query;
mod store;
mod subscription;
mod util;

pub use batch::*;
pub use document::*;
pub use identity::*;
pub use live::*;
pub use media::*;
pub use optimistic::*;
pub use query::*;
pub use store::*;
pub use subscription::*;
pub use util::*;
