pub mod hash;
pub mod log;
