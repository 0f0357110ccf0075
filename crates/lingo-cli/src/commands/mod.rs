pub mod common;
pub mod flag;
pub mod list;
pub mod show;
pub mod status;
pub mod sync;
pub mod watch;
