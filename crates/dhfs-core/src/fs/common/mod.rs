/// Shared low-level access to disk images
pub mod types;

pub use types::{BlockDevice, ByteSource};
