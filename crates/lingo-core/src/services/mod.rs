//! Services shared by every client.

mod library;

pub use library::Library;
