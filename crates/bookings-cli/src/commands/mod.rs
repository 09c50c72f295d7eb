pub mod common;
pub mod list;
pub mod simulate;
pub mod stats;
