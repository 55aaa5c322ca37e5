//! Raw byte structures, laid out exactly as they are stored on disk.
//!
//! Everything in here is stored little endian, regardless of the host.

pub mod constants;
pub mod directory;
pub mod fat;
