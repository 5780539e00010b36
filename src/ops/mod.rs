//! Version history operations

mod history;

pub use history::{History, CURR, HEAD};
