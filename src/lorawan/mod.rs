//! LoRaWAN protocol implementation
//!
//! The frame codec, the MAC-command surface and the regional band tables.
//! The session engine in [`crate::device`] drives these against the radio.

/// MAC command identifiers and the pending-command queue slot
pub mod commands;

/// Frame serialization and parsing
pub mod mac;

/// Regional band profiles
pub mod region;
