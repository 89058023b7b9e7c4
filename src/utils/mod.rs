// Utility functions

pub mod hash;
pub mod logger;

pub use hash::*;
pub use logger::*;
