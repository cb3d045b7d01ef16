pub mod binary;
pub mod ops;
pub mod perf_stats;
pub mod prf;
pub mod triples;
