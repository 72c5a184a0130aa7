pub mod host;

pub use host::{entry, TestHost};
