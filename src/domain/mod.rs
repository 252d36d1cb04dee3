pub mod checksum;
pub mod decision;
pub mod market;
pub mod signal;

pub use checksum::{checksum_bytes, checksum_of};
pub use decision::*;
pub use market::*;
pub use signal::*;
