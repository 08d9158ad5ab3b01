//! Host-application bridge for the ipfs-mobile node runtime.

pub mod api;
