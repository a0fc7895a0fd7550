//! Protocol boundaries
//!
//! Each submodule defines the client-side traits the virtual file layer
//! drives for one remote file protocol.

pub mod smb;
