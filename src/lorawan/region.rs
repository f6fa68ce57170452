//! Regional band profiles
//!
//! Each band is a read-only data table: channel spans, the data-rate matrix,
//! per-DR payload limits, the RX2 backup channel and CFList semantics. The
//! session engine consumes these tables through a handful of lookup methods
//! and never hard-codes regional numbers.

use crate::radio::traits::DataRateConfig;

/// Number of data-rate slots per span
pub const NUM_DATA_RATES: usize = 15;

/// Marker for an unused data-rate slot
pub const DATA_RATE_UNUSED: u8 = 0xFF;

/// Descriptor bit: 125 kHz bandwidth
pub const DATA_RATE_BW_125_KHZ: u8 = 0x00;
/// Descriptor bit: 250 kHz bandwidth
pub const DATA_RATE_BW_250_KHZ: u8 = 0x01;
/// Descriptor bit: 500 kHz bandwidth
pub const DATA_RATE_BW_500_KHZ: u8 = 0x02;
/// Descriptor flag: FSK 50 kbps
pub const DATA_RATE_FSK_50_K: u8 = 0x80;

/// LoRa sync word for public networks
pub const LORA_SYNC_WORD: u8 = 0x34;
/// LoRa preamble length in symbols
pub const LORA_PREAMBLE_LEN: u16 = 8;

/// Pack a LoRa data-rate descriptor from spreading factor and bandwidth bits
const fn lora_dr(spreading_factor: u8, bw: u8) -> u8 {
    ((spreading_factor - 6) << 4) | bw
}

/// Decode a packed descriptor into radio modulation settings
pub fn decode_data_rate(desc: u8) -> DataRateConfig {
    if desc & DATA_RATE_FSK_50_K != 0 {
        return DataRateConfig::Fsk {
            bit_rate_kbps: 50,
            freq_dev_khz: 25,
        };
    }

    let bandwidth_khz = match desc & 0x03 {
        DATA_RATE_BW_250_KHZ => 250,
        DATA_RATE_BW_500_KHZ => 500,
        _ => 125,
    };

    DataRateConfig::Lora {
        spreading_factor: ((desc & 0x70) >> 4) + 6,
        bandwidth_khz,
    }
}

/// CFList interpretation for a band
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CfListType {
    /// Five explicit 3-byte frequencies in 100 Hz units
    Frequencies,
    /// Channel-mask list; not supported
    ChannelMask,
}

/// A contiguous run of uplink channels
#[derive(Debug, Clone)]
pub struct ChannelSpan {
    /// Frequency of the first channel in Hz
    pub freq_start: u32,
    /// Spacing between adjacent channels in Hz
    pub freq_step: u32,
    /// Number of channels in the span
    pub num_channels: u8,
    /// Data rate used for join requests on this span
    pub join_request_data_rate: u8,
    /// Packed data-rate descriptors indexed by DR
    pub data_rates: [u8; NUM_DATA_RATES],
}

impl ChannelSpan {
    /// Resolve a DR index to modulation settings
    ///
    /// The unused marker selects the first valid data rate in the span.
    /// Returns the effective DR index alongside the settings.
    pub fn resolve_data_rate(&self, dr: u8) -> Option<(u8, DataRateConfig)> {
        if dr != DATA_RATE_UNUSED {
            let desc = *self.data_rates.get(dr as usize)?;
            if desc == DATA_RATE_UNUSED {
                return None;
            }
            return Some((dr, decode_data_rate(desc)));
        }

        self.data_rates
            .iter()
            .position(|&desc| desc != DATA_RATE_UNUSED)
            .map(|i| (i as u8, decode_data_rate(self.data_rates[i])))
    }
}

/// FSK channel parameters for bands with an FSK data rate
#[derive(Debug, Clone)]
pub struct FskParams {
    /// Fixed FSK channel frequency in Hz
    pub frequency: u32,
    /// GFSK sync word
    pub sync_word: [u8; 3],
    /// Preamble length in bits
    pub preamble_len: u16,
}

/// A regional band plan
#[derive(Debug, Clone)]
pub struct Band {
    /// Band name
    pub name: &'static str,
    /// Maximum output power in dBm
    pub power_max: i8,
    /// Maximum application payload per data rate
    pub payload_len_max: [u8; NUM_DATA_RATES],
    /// Default uplink channel spans
    pub channel_spans: &'static [ChannelSpan],
    /// RX2 backup channel (single fixed frequency and DR)
    pub backup_channel: ChannelSpan,
    /// How to interpret a received CFList
    pub cf_list_type: CfListType,
    /// FSK parameters, present when the band has an FSK data rate
    pub fsk: Option<FskParams>,
}

impl Band {
    /// Locate a logical channel index across the band's spans
    ///
    /// Returns the channel frequency and the span it belongs to.
    pub fn channel_frequency(&self, ch_index: u8) -> Option<(u32, &ChannelSpan)> {
        let mut remaining = ch_index as u32;
        for span in self.channel_spans {
            if remaining < span.num_channels as u32 {
                let freq = span.freq_start + span.freq_step * remaining;
                return Some((freq, span));
            }
            remaining -= span.num_channels as u32;
        }
        None
    }

    /// Maximum application payload for the given data rate
    pub fn max_payload(&self, dr: u8) -> u8 {
        self.payload_len_max
            .get(dr as usize)
            .copied()
            .unwrap_or(0)
    }
}

static EU868_SPANS: [ChannelSpan; 1] = [ChannelSpan {
    freq_start: 868_100_000,
    freq_step: 200_000,
    num_channels: 3,
    join_request_data_rate: 0,
    data_rates: [
        lora_dr(12, DATA_RATE_BW_125_KHZ),
        lora_dr(11, DATA_RATE_BW_125_KHZ),
        lora_dr(10, DATA_RATE_BW_125_KHZ),
        lora_dr(9, DATA_RATE_BW_125_KHZ),
        lora_dr(8, DATA_RATE_BW_125_KHZ),
        lora_dr(7, DATA_RATE_BW_125_KHZ),
        lora_dr(7, DATA_RATE_BW_250_KHZ),
        DATA_RATE_FSK_50_K,
        DATA_RATE_UNUSED,
        DATA_RATE_UNUSED,
        DATA_RATE_UNUSED,
        DATA_RATE_UNUSED,
        DATA_RATE_UNUSED,
        DATA_RATE_UNUSED,
        DATA_RATE_UNUSED,
    ],
}];

/// EU 863-870 MHz band
pub static EU868: Band = Band {
    name: "EU868",
    power_max: 16,
    payload_len_max: [51, 51, 51, 115, 222, 222, 222, 222, 0, 0, 0, 0, 0, 0, 0],
    channel_spans: &EU868_SPANS,
    backup_channel: ChannelSpan {
        freq_start: 869_525_000,
        freq_step: 0,
        num_channels: 1,
        join_request_data_rate: 0,
        data_rates: [
            lora_dr(12, DATA_RATE_BW_125_KHZ),
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
        ],
    },
    cf_list_type: CfListType::Frequencies,
    fsk: Some(FskParams {
        frequency: 868_800_000,
        sync_word: [0xC1, 0x94, 0xC1],
        preamble_len: 40,
    }),
};

static US915_SPANS: [ChannelSpan; 2] = [
    ChannelSpan {
        freq_start: 902_300_000,
        freq_step: 200_000,
        num_channels: 64,
        join_request_data_rate: 0,
        data_rates: [
            lora_dr(10, DATA_RATE_BW_125_KHZ),
            lora_dr(9, DATA_RATE_BW_125_KHZ),
            lora_dr(8, DATA_RATE_BW_125_KHZ),
            lora_dr(7, DATA_RATE_BW_125_KHZ),
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
        ],
    },
    ChannelSpan {
        freq_start: 903_000_000,
        freq_step: 1_600_000,
        num_channels: 8,
        join_request_data_rate: 4,
        data_rates: [
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            lora_dr(8, DATA_RATE_BW_500_KHZ),
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
        ],
    },
];

/// US 902-928 MHz band
pub static US915: Band = Band {
    name: "US915",
    power_max: 30,
    payload_len_max: [11, 53, 125, 242, 242, 0, 0, 0, 53, 129, 222, 222, 222, 222, 0],
    channel_spans: &US915_SPANS,
    backup_channel: ChannelSpan {
        freq_start: 923_300_000,
        freq_step: 0,
        num_channels: 1,
        join_request_data_rate: 8,
        data_rates: [
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            DATA_RATE_UNUSED,
            lora_dr(12, DATA_RATE_BW_500_KHZ),
            lora_dr(11, DATA_RATE_BW_500_KHZ),
            lora_dr(10, DATA_RATE_BW_500_KHZ),
            lora_dr(9, DATA_RATE_BW_500_KHZ),
            lora_dr(8, DATA_RATE_BW_500_KHZ),
            lora_dr(7, DATA_RATE_BW_500_KHZ),
            DATA_RATE_UNUSED,
        ],
    },
    cf_list_type: CfListType::ChannelMask,
    fsk: None,
};
