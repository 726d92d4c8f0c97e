/// Byte-level access to image files
mod source;
mod types;

pub use source::ByteSource;
pub use types::BlockDevice;
