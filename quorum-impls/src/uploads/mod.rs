mod fixed_upload;
mod http_upload;

pub use fixed_upload::*;
pub use http_upload::*;
