//! LoRaWAN Class-A end-device stack in Rust
//!
//! This crate implements the protocol core of a LoRaWAN 1.0.x / 1.1 Class-A
//! device: over-the-air activation, uplink framing and protection, and
//! downlink reception in the two strict post-transmit receive windows. The
//! radio driver, the persistent storage backing and the host timer are
//! external collaborators supplied through traits.
//!
//! # Features
//! - OTAA and ABP activation, revisions 1.0 and 1.1
//! - CMAC-AES128 message integrity and AES-CTR-style payload protection
//! - Deterministic RX1/RX2 window timing with channel-activity detection
//! - Regional band plans as data tables (EU868, US915)
//! - Durable session state with monotonic device nonce and frame counter
//! - No unsafe code
//!
//! # Example
//! ```ignore
//! use lorawan_node::{
//!     config::device::AesKey,
//!     device::LoRaWANDevice,
//!     lorawan::region::EU868,
//!     storage::MemoryStorage,
//! };
//!
//! // Radio and HAL implementations not shown
//! let mut device = LoRaWANDevice::new(radio, &EU868, MemoryStorage::new(), hal);
//!
//! // Join network
//! let nwk_key = AesKey::new([0x00; 16]);
//! let app_key = AesKey::new([0x00; 16]);
//! device.begin_otaa(0x0102030405060708, 0x1112131415161718, &nwk_key, &app_key, false)?;
//!
//! // Send data and poll for a reply
//! device.uplink(b"Hello, LoRaWAN!", 1)?;
//! let mut buffer = [0u8; 256];
//! let len = device.downlink(&mut buffer)?;
//! ```

#![warn(missing_docs)]
#![no_std]

/// Device credentials and session configuration
pub mod config;

/// Cryptographic functions
pub mod crypto;

/// Class-A session engine
pub mod device;

/// Host platform abstraction
pub mod hal;

/// LoRaWAN protocol implementation
pub mod lorawan;

/// Radio hardware abstraction layer
pub mod radio;

/// Persistent session storage
pub mod storage;
