pub mod document;
pub mod editor_file;
pub mod error;
pub mod fs_store;
pub mod percyrc;
pub mod settings;
pub mod subscription;
pub mod util;

pub use error::{BridgeError, Result};
