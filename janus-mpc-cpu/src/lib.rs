pub mod database_generators;
pub mod error;
pub mod execution;
pub mod matching;
pub mod network;
pub mod protocol;
pub mod shares;
