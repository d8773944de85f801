pub mod add;
pub mod archive;
pub mod common;
pub mod delete;
pub mod edit;
pub mod list;
pub mod notion;
pub mod sync;
