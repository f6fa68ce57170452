use heapless::Vec;

/// Largest MAC-command payload carried in FOpts
pub const MAX_COMMAND_PAYLOAD: usize = 8;

/// Serialized command length: identifier plus payload
pub const MAX_COMMAND_LEN: usize = MAX_COMMAND_PAYLOAD + 1;

/// MAC command identifiers
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum CommandIdentifier {
    ResetInd = 0x01,
    LinkCheckReq = 0x02,
    LinkADRReq = 0x03,
    DutyCycleReq = 0x04,
    RXParamSetupReq = 0x05,
    DevStatusReq = 0x06,
    NewChannelReq = 0x07,
    RXTimingSetupReq = 0x08,
    TxParamSetupReq = 0x09,
    DlChannelReq = 0x0A,
    RekeyInd = 0x0B,
    ADRParamSetupReq = 0x0C,
    DeviceTimeReq = 0x0D,
    RejoinParamSetupReq = 0x0F,
}

impl CommandIdentifier {
    /// Look up a known command identifier
    pub fn from_cid(cid: u8) -> Option<Self> {
        match cid {
            0x01 => Some(CommandIdentifier::ResetInd),
            0x02 => Some(CommandIdentifier::LinkCheckReq),
            0x03 => Some(CommandIdentifier::LinkADRReq),
            0x04 => Some(CommandIdentifier::DutyCycleReq),
            0x05 => Some(CommandIdentifier::RXParamSetupReq),
            0x06 => Some(CommandIdentifier::DevStatusReq),
            0x07 => Some(CommandIdentifier::NewChannelReq),
            0x08 => Some(CommandIdentifier::RXTimingSetupReq),
            0x09 => Some(CommandIdentifier::TxParamSetupReq),
            0x0A => Some(CommandIdentifier::DlChannelReq),
            0x0B => Some(CommandIdentifier::RekeyInd),
            0x0C => Some(CommandIdentifier::ADRParamSetupReq),
            0x0D => Some(CommandIdentifier::DeviceTimeReq),
            0x0F => Some(CommandIdentifier::RejoinParamSetupReq),
            _ => None,
        }
    }
}

/// A MAC command queued for piggyback on the next uplink
///
/// At most one command is pending at a time; it rides in FOpts and is
/// cleared once transmitted.
#[derive(Debug, Clone)]
pub struct MacCommand {
    cid: u8,
    payload: Vec<u8, MAX_COMMAND_PAYLOAD>,
}

impl MacCommand {
    /// Build a command; fails when the payload exceeds FOpts capacity
    pub fn new(cid: u8, payload: &[u8]) -> Option<Self> {
        let mut buf = Vec::new();
        buf.extend_from_slice(payload).ok()?;
        Some(Self { cid, payload: buf })
    }

    /// Command identifier
    pub fn cid(&self) -> u8 {
        self.cid
    }

    /// Length on the wire: identifier plus payload
    pub fn fopts_len(&self) -> usize {
        1 + self.payload.len()
    }

    /// Serialize as FOpts bytes: `[cid | payload]`
    pub fn serialize(&self) -> Vec<u8, MAX_COMMAND_LEN> {
        let mut buf = Vec::new();
        buf.push(self.cid).ok();
        buf.extend_from_slice(&self.payload).ok();
        buf
    }
}
