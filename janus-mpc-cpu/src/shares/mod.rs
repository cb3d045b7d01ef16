pub mod bit;
pub mod int;

pub use bit::BitShare;
pub use int::IntShare;
