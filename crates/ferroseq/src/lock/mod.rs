mod interface;
mod local;

pub use interface::*;
pub use local::*;
