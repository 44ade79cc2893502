// src/stats/mod.rs

pub mod chi_square;
pub mod crosstab;
pub mod frequency;

pub use chi_square::{chi_square_independence, chi_square_independence_yates, ChiSquare};
pub use crosstab::{crosstab, Contingency, Normalize};
pub use frequency::{frequencies, Frequencies, Frequency};
