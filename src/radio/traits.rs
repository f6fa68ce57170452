/// Modulation settings for a single data rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataRateConfig {
    /// LoRa modulation
    Lora {
        /// Spreading factor (SF6-SF12)
        spreading_factor: u8,
        /// Bandwidth in kHz (125, 250 or 500)
        bandwidth_khz: u16,
    },
    /// GFSK modulation
    Fsk {
        /// Bit rate in kbps
        bit_rate_kbps: u8,
        /// Frequency deviation in kHz
        freq_dev_khz: u8,
    },
}

/// Result of a channel-activity-detection scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelScanResult {
    /// A preamble was detected
    PreambleDetected,
    /// A LoRa signal was detected
    LoraDetected,
    /// Nothing on the channel
    NoActivity,
}

/// Outcome of reading a received packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RxStatus {
    /// Packet read cleanly
    Ok,
    /// The LoRa header CRC was absent or damaged; downlinks are sent
    /// without CRC, so the engine treats this as success
    HeaderDamaged,
}

/// Payload encoding applied by the radio
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Encoding {
    /// Whitening (FSK uplinks)
    Whitening,
}

/// Pulse shaping applied by the radio
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataShaping {
    /// Gaussian filter with BT = 1.0
    Gaussian10,
}

/// Generic radio interface trait
///
/// The registered actions are invoked in interrupt-equivalent context and
/// must only set a flag.
pub trait Radio {
    /// Error type for radio operations
    type Error;

    /// Put the radio into standby mode
    fn standby(&mut self) -> Result<(), Self::Error>;

    /// Set the carrier frequency in Hz
    fn set_frequency(&mut self, freq_hz: u32) -> Result<(), Self::Error>;

    /// Apply modulation settings
    fn set_data_rate(&mut self, config: DataRateConfig) -> Result<(), Self::Error>;

    /// Set the transmit power in dBm
    fn set_output_power(&mut self, power_dbm: i8) -> Result<(), Self::Error>;

    /// Set the sync word
    fn set_sync_word(&mut self, sync_word: &[u8]) -> Result<(), Self::Error>;

    /// Set the preamble length in symbols (LoRa) or bits (FSK)
    fn set_preamble_length(&mut self, len: u16) -> Result<(), Self::Error>;

    /// Enable or disable IQ inversion (LoRa downlinks are inverted)
    fn invert_iq(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Set the payload encoding
    fn set_encoding(&mut self, encoding: Encoding) -> Result<(), Self::Error>;

    /// Set the pulse shaping
    fn set_data_shaping(&mut self, shaping: DataShaping) -> Result<(), Self::Error>;

    /// Transmit a buffer, blocking until the packet is on the air
    fn transmit(&mut self, buffer: &[u8]) -> Result<(), Self::Error>;

    /// Begin listening for a packet
    fn start_receive(&mut self) -> Result<(), Self::Error>;

    /// Read the most recently received packet into the buffer
    fn read_data(&mut self, buffer: &mut [u8]) -> Result<RxStatus, Self::Error>;

    /// Length of the most recently received packet; `update` refreshes the
    /// value from the radio instead of returning the cached one
    fn get_packet_length(&mut self, update: bool) -> usize;

    /// Begin a channel-activity-detection scan
    fn start_channel_scan(&mut self) -> Result<(), Self::Error>;

    /// Fetch the result of the last channel scan
    fn get_channel_scan_result(&mut self) -> Result<ChannelScanResult, Self::Error>;

    /// Air time of a packet with the given payload length, in microseconds
    fn get_time_on_air_us(&mut self, payload_len: usize) -> u32;

    /// Register the packet-received interrupt action
    fn set_packet_received_action(&mut self, action: fn());

    /// Remove the packet-received interrupt action
    fn clear_packet_received_action(&mut self);

    /// Register the channel-scan-complete interrupt action
    fn set_channel_scan_action(&mut self, action: fn());

    /// Remove the channel-scan-complete interrupt action
    fn clear_channel_scan_action(&mut self);
}
