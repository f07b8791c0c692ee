pub mod add;
pub mod common;
pub mod completions;
pub mod delete;
pub mod list;
pub mod lookup;
pub mod offline;
pub mod relocate;
pub mod search;
pub mod set;
pub mod sync;
