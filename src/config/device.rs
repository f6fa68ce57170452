//! Device credentials and session records.

/// EUI-64 identifier (JoinEUI / DevEUI)
pub type Eui64 = u64;

/// Network-assigned device address
pub type DevAddr = u32;

/// AES-128 key (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesKey([u8; 16]);

impl AesKey {
    /// Create a key from raw bytes
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for AesKey {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

/// LoRaWAN protocol revision
///
/// The revision selects the key schedule and the uplink MIC construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    /// LoRaWAN 1.0.x
    R1_0,
    /// LoRaWAN 1.1
    R1_1,
}

impl Revision {
    /// Wire encoding used by the RekeyInd exchange and the session store
    pub fn as_u8(&self) -> u8 {
        match self {
            Revision::R1_0 => 0,
            Revision::R1_1 => 1,
        }
    }

    /// Decode a stored revision value; anything other than 1 maps to 1.0
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Revision::R1_1,
            _ => Revision::R1_0,
        }
    }
}

/// Session state for an activated device
///
/// In revision 1.0 the three network keys hold the same value; in 1.1 they
/// are independently derived.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    /// Device address assigned during activation
    pub dev_addr: DevAddr,
    /// Application session key
    pub app_s_key: AesKey,
    /// Forwarding network session integrity key
    pub f_nwk_s_int_key: AesKey,
    /// Serving network session integrity key
    pub s_nwk_s_int_key: AesKey,
    /// Network session encryption key
    pub nwk_s_enc_key: AesKey,
    /// Protocol revision negotiated at activation
    pub rev: Revision,
}
