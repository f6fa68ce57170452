//! Device and session configuration
//!
//! This module contains the credential and session types shared by the
//! crypto core, the frame codec and the session engine:
//! - AES-128 key and EUI-64 newtypes
//! - Protocol revision (1.0 vs 1.1)
//! - In-RAM session record

/// Device credentials and session state
pub mod device;

pub use device::{AesKey, Session};
