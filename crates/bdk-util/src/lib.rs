#![forbid(unsafe_code)]
//! Filesystem, globbing, hashing, and process helpers for BDK.

pub mod error;
pub mod fs;
pub mod hash;
pub mod process;
