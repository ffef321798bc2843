pub mod add;
pub mod auth;
pub mod common;
pub mod completions;
pub mod delete;
pub mod edit;
pub mod export;
pub mod import;
pub mod list;
pub mod search;
pub mod sync;
