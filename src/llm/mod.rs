// Generation model catalog

pub mod catalog;

pub use catalog::*;
