//! Persistent session storage
//!
//! A typed key-value persistence facade over whatever backing the host
//! provides (flash page, file, RAM). The logical records are fixed: a magic
//! sentinel, the device address, the device nonce, the uplink frame counter,
//! the protocol revision and four 16-byte key blobs.

use crate::config::device::{AesKey, Revision, Session};

/// Magic sentinel marking a stored session as valid ("LWAN")
pub const SESSION_MAGIC: u32 = 0x4C57_414E;

/// Stable identifiers for the persisted session records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionParam {
    /// Session-valid sentinel, written last on join
    Magic = 0,
    /// Network-assigned device address
    DevAddr = 1,
    /// Join-request device nonce, monotonic for the device lifetime
    DevNonce = 2,
    /// Uplink frame counter
    FCntUp = 3,
    /// Protocol revision (0 = 1.0, 1 = 1.1)
    Revision = 4,
    /// Application session key blob
    AppSKey = 5,
    /// Forwarding network session integrity key blob
    FNwkSIntKey = 6,
    /// Serving network session integrity key blob
    SNwkSIntKey = 7,
    /// Network session encryption key blob
    NwkSEncKey = 8,
}

/// Backing storage for session records
///
/// Writes must survive a warm restart; the store need not be transactional.
pub trait Storage {
    /// Read a 16-bit record
    fn get_u16(&self, param: SessionParam) -> u16;

    /// Write a 16-bit record
    fn set_u16(&mut self, param: SessionParam, value: u16);

    /// Read a 32-bit record
    fn get_u32(&self, param: SessionParam) -> u32;

    /// Write a 32-bit record
    fn set_u32(&mut self, param: SessionParam, value: u32);

    /// Read a 16-byte key blob
    fn read_key(&self, param: SessionParam, key: &mut [u8; 16]);

    /// Write a 16-byte key blob
    fn write_key(&mut self, param: SessionParam, key: &[u8; 16]);

    /// Destroy all records
    fn wipe(&mut self);
}

/// Typed facade over a [`Storage`] backing
///
/// Owns the write-order invariant for a completed join: keys first, then the
/// device address and revision, then the frame-counter reset, and the magic
/// sentinel only once everything else is down.
pub struct SessionStore<S: Storage> {
    inner: S,
}

impl<S: Storage> SessionStore<S> {
    /// Wrap a storage backing
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Check whether a valid session is stored
    pub fn is_joined(&self) -> bool {
        self.inner.get_u32(SessionParam::Magic) == SESSION_MAGIC
    }

    /// Load the stored session, if the magic sentinel is present
    pub fn load(&self) -> Option<Session> {
        if !self.is_joined() {
            return None;
        }

        let mut app_s_key = [0u8; 16];
        let mut f_nwk_s_int_key = [0u8; 16];
        let mut s_nwk_s_int_key = [0u8; 16];
        let mut nwk_s_enc_key = [0u8; 16];
        self.inner.read_key(SessionParam::AppSKey, &mut app_s_key);
        self.inner.read_key(SessionParam::FNwkSIntKey, &mut f_nwk_s_int_key);
        self.inner.read_key(SessionParam::SNwkSIntKey, &mut s_nwk_s_int_key);
        self.inner.read_key(SessionParam::NwkSEncKey, &mut nwk_s_enc_key);

        Some(Session {
            dev_addr: self.inner.get_u32(SessionParam::DevAddr),
            app_s_key: AesKey::new(app_s_key),
            f_nwk_s_int_key: AesKey::new(f_nwk_s_int_key),
            s_nwk_s_int_key: AesKey::new(s_nwk_s_int_key),
            nwk_s_enc_key: AesKey::new(nwk_s_enc_key),
            rev: Revision::from_u8(self.inner.get_u32(SessionParam::Revision) as u8),
        })
    }

    /// Persist a freshly joined session in the mandated order
    pub fn save(&mut self, session: &Session) {
        self.inner.write_key(SessionParam::AppSKey, session.app_s_key.as_bytes());
        self.inner.write_key(SessionParam::FNwkSIntKey, session.f_nwk_s_int_key.as_bytes());
        self.inner.write_key(SessionParam::SNwkSIntKey, session.s_nwk_s_int_key.as_bytes());
        self.inner.write_key(SessionParam::NwkSEncKey, session.nwk_s_enc_key.as_bytes());
        self.inner.set_u32(SessionParam::DevAddr, session.dev_addr);
        self.inner.set_u32(SessionParam::Revision, session.rev.as_u8() as u32);
        self.inner.set_u32(SessionParam::FCntUp, 0);
        self.inner.set_u32(SessionParam::Magic, SESSION_MAGIC);
    }

    /// Read the current device nonce and persist its successor
    ///
    /// The increment is persisted before the nonce is used, so a failed join
    /// attempt still consumes it.
    pub fn take_dev_nonce(&mut self) -> u16 {
        let nonce = self.inner.get_u16(SessionParam::DevNonce);
        self.inner.set_u16(SessionParam::DevNonce, nonce.wrapping_add(1));
        nonce
    }

    /// Current uplink frame counter
    pub fn fcnt_up(&self) -> u32 {
        self.inner.get_u32(SessionParam::FCntUp)
    }

    /// Increment and persist the uplink frame counter, returning the new value
    pub fn advance_fcnt_up(&mut self) -> u32 {
        let fcnt = self.inner.get_u32(SessionParam::FCntUp).wrapping_add(1);
        self.inner.set_u32(SessionParam::FCntUp, fcnt);
        fcnt
    }

    /// Destroy all session records
    pub fn wipe(&mut self) {
        self.inner.wipe();
    }
}

/// RAM-backed storage
///
/// Suitable for hosts without flash and for tests. Contents do not survive
/// power loss, only a warm restart of the stack.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    magic: u32,
    dev_addr: u32,
    dev_nonce: u16,
    fcnt_up: u32,
    revision: u32,
    keys: [[u8; 16]; 4],
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn key_slot(param: SessionParam) -> usize {
        match param {
            SessionParam::AppSKey => 0,
            SessionParam::FNwkSIntKey => 1,
            SessionParam::SNwkSIntKey => 2,
            SessionParam::NwkSEncKey => 3,
            _ => panic!("not a key record"),
        }
    }
}

impl Storage for MemoryStorage {
    fn get_u16(&self, param: SessionParam) -> u16 {
        match param {
            SessionParam::DevNonce => self.dev_nonce,
            _ => self.get_u32(param) as u16,
        }
    }

    fn set_u16(&mut self, param: SessionParam, value: u16) {
        match param {
            SessionParam::DevNonce => self.dev_nonce = value,
            _ => self.set_u32(param, value as u32),
        }
    }

    fn get_u32(&self, param: SessionParam) -> u32 {
        match param {
            SessionParam::Magic => self.magic,
            SessionParam::DevAddr => self.dev_addr,
            SessionParam::DevNonce => self.dev_nonce as u32,
            SessionParam::FCntUp => self.fcnt_up,
            SessionParam::Revision => self.revision,
            _ => 0,
        }
    }

    fn set_u32(&mut self, param: SessionParam, value: u32) {
        match param {
            SessionParam::Magic => self.magic = value,
            SessionParam::DevAddr => self.dev_addr = value,
            SessionParam::DevNonce => self.dev_nonce = value as u16,
            SessionParam::FCntUp => self.fcnt_up = value,
            SessionParam::Revision => self.revision = value,
            _ => {}
        }
    }

    fn read_key(&self, param: SessionParam, key: &mut [u8; 16]) {
        key.copy_from_slice(&self.keys[Self::key_slot(param)]);
    }

    fn write_key(&mut self, param: SessionParam, key: &[u8; 16]) {
        self.keys[Self::key_slot(param)].copy_from_slice(key);
    }

    fn wipe(&mut self) {
        *self = Self::default();
    }
}
