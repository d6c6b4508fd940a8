pub mod chisquare;
pub mod estimate;
pub mod simulate;
