//! Structures of an rsfs volume
//!
//! Raw byte structures are defined in the `raw` module, exactly as they are laid out on disk.
//! The `fat` module defines the in-memory allocation table and its chain algorithms.
//! The `directory` module defines the flat directory table.

pub mod directory;
pub mod fat;
pub mod raw;
