//! Job directories and the files written into them.

pub mod error;
pub mod output_store;
