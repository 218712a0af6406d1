//! CLI commands implementation

pub mod collections;
pub mod import;
pub mod init;
pub mod order;
pub mod purchases;
pub mod status;
pub mod tables;

pub use collections::*;
pub use import::*;
pub use init::*;
pub use order::*;
pub use purchases::*;
pub use status::*;
pub use tables::*;
