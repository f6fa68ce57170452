//! LoRaWAN cryptographic operations
//!
//! This module provides the cryptographic functions for LoRaWAN security:
//! - Message Integrity Code (MIC) computation and verification
//! - Payload encryption/decryption (AES-CTR-style keystream)
//! - Join accept decryption (blockwise AES-ECB)
//! - Session key derivation for revisions 1.0 and 1.1

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};

use crate::config::device::{AesKey, DevAddr, Eui64};

/// MIC size in bytes
pub const MIC_SIZE: usize = 4;

/// Block size for AES-128
const BLOCK_SIZE: usize = 16;

/// Derivation tag for FNwkSIntKey (NwkSKey in revision 1.0)
const KEY_TAG_F_NWK_S_INT: u8 = 0x01;
/// Derivation tag for AppSKey
const KEY_TAG_APP_S: u8 = 0x02;
/// Derivation tag for SNwkSIntKey
const KEY_TAG_S_NWK_S_INT: u8 = 0x03;
/// Derivation tag for NwkSEncKey
const KEY_TAG_NWK_S_ENC: u8 = 0x04;
/// Derivation tag for the join-accept integrity key
const KEY_TAG_JS_INT: u8 = 0x06;

/// Direction identifiers for cryptographic operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    /// Uplink (device to network)
    Up = 0,
    /// Downlink (network to device)
    Down = 1,
}

/// The four session keys produced by a join
#[derive(Debug, Clone, Copy)]
pub struct SessionKeys {
    /// Application session key
    pub app_s_key: AesKey,
    /// Forwarding network session integrity key
    pub f_nwk_s_int_key: AesKey,
    /// Serving network session integrity key
    pub s_nwk_s_int_key: AesKey,
    /// Network session encryption key
    pub nwk_s_enc_key: AesKey,
}

/// Compute the Message Integrity Code over a sequence of message parts
///
/// The parts are processed as one contiguous CMAC input; passing the MIC
/// prefix block as its own part avoids reserving space for it in the
/// transmit buffer. The MIC is the first four bytes of the CMAC.
pub fn generate_mic(key: &AesKey, parts: &[&[u8]]) -> [u8; MIC_SIZE] {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key.as_bytes()).unwrap();
    for part in parts {
        mac.update(part);
    }
    let tag = mac.finalize().into_bytes();
    let mut mic = [0u8; MIC_SIZE];
    mic.copy_from_slice(&tag[..MIC_SIZE]);
    mic
}

/// Verify a received MIC against the expected value for the given parts
pub fn verify_mic(key: &AesKey, parts: &[&[u8]], mic: &[u8]) -> bool {
    if mic.len() != MIC_SIZE {
        return false;
    }
    generate_mic(key, parts) == mic
}

/// Encrypt or decrypt a payload in place
///
/// LoRaWAN's AES-CTR variant: each 16-byte counter block is ECB-encrypted
/// and XORed with the corresponding payload slice, so the same call both
/// encrypts and decrypts. With `counter` the per-block counter byte runs
/// 1-based; without it the byte is held at zero (FOpts path).
pub fn encrypt_payload(
    key: &AesKey,
    dev_addr: DevAddr,
    fcnt: u32,
    dir: Direction,
    counter: bool,
    payload: &mut [u8],
) {
    let cipher = Aes128::new_from_slice(key.as_bytes()).unwrap();

    let mut block = [0u8; BLOCK_SIZE];
    block[0] = 0x01;
    block[5] = dir as u8;
    block[6..10].copy_from_slice(&dev_addr.to_le_bytes());
    block[10..14].copy_from_slice(&fcnt.to_le_bytes());

    for (i, chunk) in payload.chunks_mut(BLOCK_SIZE).enumerate() {
        if counter {
            block[15] = (i + 1) as u8;
        }

        let mut keystream = block;
        cipher.encrypt_block((&mut keystream).into());

        for (b, k) in chunk.iter_mut().zip(keystream.iter()) {
            *b ^= k;
        }
    }
}

/// Encrypt a buffer blockwise with AES-ECB
///
/// Used to recover the join-accept plaintext: the server produced the
/// ciphertext with an ECB decrypt, so encrypting again restores it.
pub fn ecb_encrypt(key: &AesKey, data: &mut [u8]) {
    let cipher = Aes128::new_from_slice(key.as_bytes()).unwrap();

    for chunk in data.chunks_mut(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block[..chunk.len()].copy_from_slice(chunk);
        cipher.encrypt_block((&mut block).into());
        chunk.copy_from_slice(&block[..chunk.len()]);
    }
}

/// Encrypt a single derivation block into a session key
fn derive_key(root: &AesKey, block: [u8; BLOCK_SIZE]) -> AesKey {
    let cipher = Aes128::new_from_slice(root.as_bytes()).unwrap();
    let mut out = block;
    cipher.encrypt_block((&mut out).into());
    AesKey::new(out)
}

/// Revision 1.0 derivation block: `[tag | joinNonce(3) | netId(3) | devNonce(2) | zeros]`
fn derivation_block_v1_0(tag: u8, join_nonce: u32, home_net_id: u32, dev_nonce: u16) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = tag;
    block[1..4].copy_from_slice(&join_nonce.to_le_bytes()[..3]);
    block[4..7].copy_from_slice(&home_net_id.to_le_bytes()[..3]);
    block[7..9].copy_from_slice(&dev_nonce.to_le_bytes());
    block
}

/// Revision 1.1 derivation block: `[tag | joinNonce(3) | joinEUI(8) | devNonce(2) | zeros]`
fn derivation_block_v1_1(tag: u8, join_nonce: u32, join_eui: Eui64, dev_nonce: u16) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = tag;
    block[1..4].copy_from_slice(&join_nonce.to_le_bytes()[..3]);
    block[4..12].copy_from_slice(&join_eui.to_le_bytes());
    block[12..14].copy_from_slice(&dev_nonce.to_le_bytes());
    block
}

/// Derive the session keys for a revision 1.0 join
///
/// The NwkSKey value fills all three network-key roles.
pub fn derive_session_keys_v1_0(
    nwk_key: &AesKey,
    join_nonce: u32,
    home_net_id: u32,
    dev_nonce: u16,
) -> SessionKeys {
    let app_s_key = derive_key(
        nwk_key,
        derivation_block_v1_0(KEY_TAG_APP_S, join_nonce, home_net_id, dev_nonce),
    );
    let nwk_s_key = derive_key(
        nwk_key,
        derivation_block_v1_0(KEY_TAG_F_NWK_S_INT, join_nonce, home_net_id, dev_nonce),
    );

    SessionKeys {
        app_s_key,
        f_nwk_s_int_key: nwk_s_key,
        s_nwk_s_int_key: nwk_s_key,
        nwk_s_enc_key: nwk_s_key,
    }
}

/// Derive the session keys for a revision 1.1 join
///
/// The AppSKey comes from the application root key, the three network keys
/// from the network root key.
pub fn derive_session_keys_v1_1(
    nwk_key: &AesKey,
    app_key: &AesKey,
    join_nonce: u32,
    join_eui: Eui64,
    dev_nonce: u16,
) -> SessionKeys {
    SessionKeys {
        app_s_key: derive_key(
            app_key,
            derivation_block_v1_1(KEY_TAG_APP_S, join_nonce, join_eui, dev_nonce),
        ),
        f_nwk_s_int_key: derive_key(
            nwk_key,
            derivation_block_v1_1(KEY_TAG_F_NWK_S_INT, join_nonce, join_eui, dev_nonce),
        ),
        s_nwk_s_int_key: derive_key(
            nwk_key,
            derivation_block_v1_1(KEY_TAG_S_NWK_S_INT, join_nonce, join_eui, dev_nonce),
        ),
        nwk_s_enc_key: derive_key(
            nwk_key,
            derivation_block_v1_1(KEY_TAG_NWK_S_ENC, join_nonce, join_eui, dev_nonce),
        ),
    }
}

/// Derive the join-accept integrity key (revision 1.1 only)
///
/// `AES128(nwkKey, [0x06 | devEUI(8) | zeros(7)])`
pub fn derive_join_accept_int_key(nwk_key: &AesKey, dev_eui: Eui64) -> AesKey {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = KEY_TAG_JS_INT;
    block[1..9].copy_from_slice(&dev_eui.to_le_bytes());
    derive_key(nwk_key, block)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Field offsets follow LoRaWAN 1.0.3 section 6.2.5.
    #[test]
    fn derivation_block_v1_0_layout() {
        let block = derivation_block_v1_0(0x02, 0x00CC_BBAA, 0x0033_2211, 0xBEEF);
        assert_eq!(block[0], 0x02);
        assert_eq!(&block[1..4], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(&block[4..7], &[0x11, 0x22, 0x33]);
        assert_eq!(&block[7..9], &[0xEF, 0xBE]);
        assert_eq!(&block[9..], &[0u8; 7]);
    }

    #[test]
    fn derivation_block_v1_1_layout() {
        let block = derivation_block_v1_1(0x01, 0x00CC_BBAA, 0x0807_0605_0403_0201, 0xBEEF);
        assert_eq!(block[0], 0x01);
        assert_eq!(&block[1..4], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(&block[4..12], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&block[12..14], &[0xEF, 0xBE]);
        assert_eq!(&block[14..], &[0u8; 2]);
    }

    #[test]
    fn v1_0_mirrors_network_roles() {
        let keys = derive_session_keys_v1_0(&AesKey::new([0x2B; 16]), 0x010203, 0x040506, 0x0708);
        assert_eq!(keys.f_nwk_s_int_key, keys.s_nwk_s_int_key);
        assert_eq!(keys.f_nwk_s_int_key, keys.nwk_s_enc_key);
        assert_ne!(keys.app_s_key, keys.f_nwk_s_int_key);
    }
}
