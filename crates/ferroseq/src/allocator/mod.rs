mod registry;
mod stats;
mod tenant;
#[cfg(test)]
mod tests;

pub use registry::*;
pub use stats::AllocatorStats;
pub use tenant::*;
