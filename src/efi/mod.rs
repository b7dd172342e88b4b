//! UEFI secure variable formats and storage
//!
//! - [`auth`]: signature lists, authenticated updates and trust chain checks
//! - [`varstore`]: reading and writing variables through sysfs

pub mod auth;
pub mod varstore;
