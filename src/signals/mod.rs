pub mod classifier;
pub mod enricher;
pub mod normalizer;
pub mod types;
