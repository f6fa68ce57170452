use crate::config::device::{AesKey, DevAddr, Eui64};
use crate::crypto::{self, Direction, MIC_SIZE};
use crate::lorawan::region::CfListType;

/// Join-request frame length
pub const JOIN_REQUEST_LEN: usize = 23;

/// Join-accept frame length without CFList
pub const JOIN_ACCEPT_LEN: usize = 17;

/// CFList block length
pub const JOIN_ACCEPT_CFLIST_LEN: usize = 16;

/// Join-accept frame length with CFList
pub const JOIN_ACCEPT_MAX_LEN: usize = JOIN_ACCEPT_LEN + JOIN_ACCEPT_CFLIST_LEN;

/// Smallest valid data frame: FHDR without FOpts, no port, plus MIC
pub const DATA_FRAME_MIN_LEN: usize = 8 + MIC_SIZE;

/// Largest PHY payload handled by the engine
pub const MAX_FRAME_LEN: usize = 256;

/// FPort reserved for MAC commands
pub const FPORT_MAC_COMMAND: u8 = 0x00;

/// Largest application FPort; 0xE0..0xFF are reserved for tests
pub const FPORT_MAX: u8 = 0xDF;

/// Frame major version bits (LoRaWAN R1)
pub const MHDR_MAJOR_R1: u8 = 0x00;

/// DLSettings bit signalling protocol revision 1.1
pub const DL_SETTINGS_REV_1_1: u8 = 0x80;

/// Request-type prefix byte for the revision 1.1 join-accept MIC
pub const JOIN_REQUEST_TYPE: u8 = 0xFF;

/// MAC header types
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum MType {
    JoinRequest = 0x00,
    JoinAccept = 0x20,
    UnconfirmedDataUp = 0x40,
    UnconfirmedDataDown = 0x60,
    ConfirmedDataUp = 0x80,
    ConfirmedDataDown = 0xA0,
    RejoinRequest = 0xC0,
    Proprietary = 0xE0,
}

impl MType {
    /// Extract the message type from an MHDR byte
    pub fn from_mhdr(mhdr: u8) -> MType {
        match mhdr & 0xE0 {
            0x00 => MType::JoinRequest,
            0x20 => MType::JoinAccept,
            0x40 => MType::UnconfirmedDataUp,
            0x60 => MType::UnconfirmedDataDown,
            0x80 => MType::ConfirmedDataUp,
            0xA0 => MType::ConfirmedDataDown,
            0xC0 => MType::RejoinRequest,
            _ => MType::Proprietary,
        }
    }
}

/// Frame codec error
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameError {
    /// Length, MHDR type or field value out of shape
    Malformed,
    /// Valid frame using a variant this stack does not handle
    Unsupported,
}

/// Write an integer little-endian into a buffer; the buffer length selects
/// the field width (1..8 bytes)
pub fn write_le(buf: &mut [u8], value: u64) {
    for (i, b) in buf.iter_mut().enumerate() {
        *b = (value >> (8 * i)) as u8;
    }
}

/// Read a little-endian integer of 1..8 bytes
pub fn read_le(buf: &[u8]) -> u64 {
    let mut value = 0u64;
    for (i, b) in buf.iter().enumerate() {
        value |= (*b as u64) << (8 * i);
    }
    value
}

/// Frame header flags
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FCtrl {
    pub adr: bool,
    pub adr_ack_req: bool,
    pub ack: bool,
    pub f_pending: bool,
    pub f_opts_len: u8,
}

impl FCtrl {
    /// Pack into the FCtrl wire byte
    pub fn to_byte(&self) -> u8 {
        let mut byte = self.f_opts_len & 0x0F;
        if self.adr {
            byte |= 0x80;
        }
        if self.adr_ack_req {
            byte |= 0x40;
        }
        if self.ack {
            byte |= 0x20;
        }
        if self.f_pending {
            byte |= 0x10;
        }
        byte
    }

    /// Unpack from the FCtrl wire byte
    pub fn from_byte(byte: u8) -> Self {
        Self {
            adr: (byte & 0x80) != 0,
            adr_ack_req: (byte & 0x40) != 0,
            ack: (byte & 0x20) != 0,
            f_pending: (byte & 0x10) != 0,
            f_opts_len: byte & 0x0F,
        }
    }
}

/// Join-request message
#[derive(Debug, Clone, Copy)]
pub struct JoinRequest {
    pub join_eui: Eui64,
    pub dev_eui: Eui64,
    pub dev_nonce: u16,
}

impl JoinRequest {
    /// Serialize to the 23-byte wire image, MIC under the network root key
    pub fn serialize(&self, nwk_key: &AesKey) -> [u8; JOIN_REQUEST_LEN] {
        let mut msg = [0u8; JOIN_REQUEST_LEN];
        msg[0] = MType::JoinRequest as u8 | MHDR_MAJOR_R1;
        write_le(&mut msg[1..9], self.join_eui);
        write_le(&mut msg[9..17], self.dev_eui);
        write_le(&mut msg[17..19], self.dev_nonce as u64);

        let mic = crypto::generate_mic(nwk_key, &[&msg[..JOIN_REQUEST_LEN - MIC_SIZE]]);
        msg[JOIN_REQUEST_LEN - MIC_SIZE..].copy_from_slice(&mic);
        msg
    }
}

/// Parsed join-accept message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinAccept {
    /// Server-chosen nonce, input to key derivation
    pub join_nonce: u32,
    /// Home network identifier
    pub home_net_id: u32,
    /// Assigned device address
    pub dev_addr: DevAddr,
    /// Downlink settings byte; bit 7 signals revision 1.1
    pub dl_settings: u8,
    /// RX1 delay in milliseconds (wire value 0 means 1 s)
    pub rx_delay_ms: u32,
    /// Frequencies from the CFList, in Hz, when present
    pub cf_list_freq: Option<[u32; 5]>,
}

impl JoinAccept {
    /// Parse a decrypted join-accept frame (including MHDR and MIC)
    ///
    /// Only the 17- and 33-byte shapes are valid. A channel-mask CFList is
    /// refused as unsupported, matching the band profile contract.
    pub fn parse(plain: &[u8], cf_list_type: CfListType) -> Result<Self, FrameError> {
        if plain.len() != JOIN_ACCEPT_LEN && plain.len() != JOIN_ACCEPT_MAX_LEN {
            return Err(FrameError::Malformed);
        }
        if MType::from_mhdr(plain[0]) != MType::JoinAccept {
            return Err(FrameError::Malformed);
        }

        let mut cf_list_freq = None;
        if plain.len() == JOIN_ACCEPT_MAX_LEN {
            if cf_list_type != CfListType::Frequencies || plain[28] != 0 {
                return Err(FrameError::Unsupported);
            }
            let mut freqs = [0u32; 5];
            for (i, freq) in freqs.iter_mut().enumerate() {
                *freq = read_le(&plain[13 + 3 * i..16 + 3 * i]) as u32 * 100;
            }
            cf_list_freq = Some(freqs);
        }

        let rx_delay = plain[12] as u32;
        Ok(Self {
            join_nonce: read_le(&plain[1..4]) as u32,
            home_net_id: read_le(&plain[4..7]) as u32,
            dev_addr: read_le(&plain[7..11]) as u32,
            dl_settings: plain[11],
            rx_delay_ms: if rx_delay == 0 { 1000 } else { rx_delay * 1000 },
            cf_list_freq,
        })
    }

    /// Whether the server negotiated revision 1.1
    pub fn is_rev_1_1(&self) -> bool {
        self.dl_settings & DL_SETTINGS_REV_1_1 != 0
    }
}

/// Parsed downlink data frame, borrowing from the received buffer
#[derive(Debug, PartialEq)]
pub struct DownlinkFrame<'a> {
    pub dev_addr: DevAddr,
    pub f_ctrl: FCtrl,
    pub f_cnt: u16,
    pub f_opts: &'a [u8],
    pub f_port: Option<u8>,
    pub frm_payload: &'a [u8],
}

impl<'a> DownlinkFrame<'a> {
    /// Parse a data downlink; `msg` excludes the trailing MIC
    pub fn parse(msg: &'a [u8]) -> Result<Self, FrameError> {
        if msg.len() < 8 {
            return Err(FrameError::Malformed);
        }

        match MType::from_mhdr(msg[0]) {
            MType::UnconfirmedDataDown | MType::ConfirmedDataDown => {}
            _ => return Err(FrameError::Malformed),
        }

        let f_ctrl = FCtrl::from_byte(msg[5]);
        let fopts_end = 8 + f_ctrl.f_opts_len as usize;
        if fopts_end > msg.len() {
            return Err(FrameError::Malformed);
        }

        let (f_port, frm_payload) = if fopts_end < msg.len() {
            (Some(msg[fopts_end]), &msg[fopts_end + 1..])
        } else {
            (None, &msg[msg.len()..])
        };

        Ok(Self {
            dev_addr: read_le(&msg[1..5]) as u32,
            f_ctrl,
            f_cnt: read_le(&msg[6..8]) as u16,
            f_opts: &msg[8..fopts_end],
            f_port,
            frm_payload,
        })
    }
}

/// Build the MIC prefix block for a data frame
///
/// `[0x49 | zeros(4) | dir | devAddr(4, LE) | fCnt(4, LE) | 0x00 | msgLen]`,
/// fed into the CMAC ahead of the serialized frame.
pub fn mic_block(dir: Direction, dev_addr: DevAddr, fcnt: u32, msg_len: u8) -> [u8; 16] {
    let mut block = [0u8; 16];
    block[0] = 0x49;
    block[5] = dir as u8;
    block[6..10].copy_from_slice(&dev_addr.to_le_bytes());
    block[10..14].copy_from_slice(&fcnt.to_le_bytes());
    block[15] = msg_len;
    block
}

/// Revision 1.1 companion MIC block: bytes 1..3 carry the transmit data
/// rate and channel index
pub fn mic_block_tx_params(block0: &[u8; 16], data_rate: u8, ch_index: u8) -> [u8; 16] {
    let mut block = *block0;
    block[1] = data_rate;
    block[2] = ch_index;
    block
}
