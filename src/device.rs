use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Vec;
use log::{debug, warn};

use crate::config::device::{AesKey, DevAddr, Eui64, Revision, Session};
use crate::crypto::{self, Direction};
use crate::hal::DeviceHal;
use crate::lorawan::commands::{CommandIdentifier, MacCommand};
use crate::lorawan::mac::{
    self, mic_block, mic_block_tx_params, DownlinkFrame, FrameError, JoinAccept, JoinRequest,
    MType, DATA_FRAME_MIN_LEN, FPORT_MAC_COMMAND, FPORT_MAX, JOIN_ACCEPT_LEN,
    JOIN_ACCEPT_MAX_LEN, JOIN_REQUEST_TYPE, MAX_FRAME_LEN,
};
use crate::lorawan::region::{Band, DATA_RATE_UNUSED, LORA_PREAMBLE_LEN, LORA_SYNC_WORD};
use crate::radio::traits::{
    ChannelScanResult, DataShaping, Encoding, Radio, RxStatus,
};
use crate::storage::{SessionStore, Storage};

/// Default RX1 delay after an uplink
pub const RECEIVE_DELAY_1_MS: u32 = 1000;
/// Default RX2 delay after an uplink
pub const RECEIVE_DELAY_2_MS: u32 = 2000;
/// Join-accept RX2 delay
pub const JOIN_ACCEPT_DELAY_2_MS: u32 = 6000;

/// Guard period around receive-window edges
const SCAN_GUARD_MS: u32 = 500;
/// Ceiling on a single channel-activity-detection wait
const SCAN_WAIT_MS: u32 = 3000;
/// Ceiling on waiting for a detected packet to finish arriving
const PACKET_WAIT_MS: u32 = 30_000;

// Set from the radio's interrupt-equivalent context, polled by the engine
// with a cooperative yield. One flag per event, nothing else crosses over.
static DOWNLINK_RECEIVED: AtomicBool = AtomicBool::new(false);
static SCAN_FINISHED: AtomicBool = AtomicBool::new(false);

fn on_downlink() {
    DOWNLINK_RECEIVED.store(true, Ordering::SeqCst);
}

fn on_channel_scan() {
    SCAN_FINISHED.store(true, Ordering::SeqCst);
}

/// LoRaWAN device error types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error<E> {
    /// Radio driver error
    Radio(E),
    /// No stored session; the device must join first
    NetworkNotJoined,
    /// No packet arrived within the receive window
    RxTimeout,
    /// Both receive windows had already expired when downlink was called
    NoRxWindow,
    /// Downlink length, MHDR type or device address mismatch
    DownlinkMalformed,
    /// MIC verification failed
    InvalidMic,
    /// The server echoed a different protocol revision
    InvalidRevision,
    /// Valid frame using a variant this stack does not handle
    Unsupported,
    /// FPort outside the application range
    InvalidPort,
    /// Channel index outside the band plan
    InvalidChannel,
    /// Unknown or unexpected MAC command identifier
    InvalidCid,
    /// Payload exceeds the per-DR maximum
    PacketTooLong,
    /// The previous uplink's RX2 window has not closed yet
    UplinkUnavailable,
    /// A buffer was too small for the frame
    BufferTooSmall,
}

impl<E> From<FrameError> for Error<E> {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::Malformed => Error::DownlinkMalformed,
            FrameError::Unsupported => Error::Unsupported,
        }
    }
}

/// Session engine state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceState {
    /// No session, nothing in flight
    Idle,
    /// Join request in flight
    Joining,
    /// Session active, radio idle
    Joined,
    /// Uplink on the air
    Transmitting,
    /// Waiting for the RX1 window to open
    WaitingRx1,
    /// Scanning or receiving in RX1
    ListeningRx1,
    /// Waiting for the RX2 window to open
    WaitingRx2,
    /// Scanning or receiving in RX2
    ListeningRx2,
}

/// LoRaWAN Class-A session engine
///
/// Owns the radio, the session store and the host timer for the duration of
/// each call; all operations are blocking and strictly sequential.
pub struct LoRaWANDevice<R: Radio, S: Storage, H: DeviceHal> {
    radio: R,
    band: &'static Band,
    store: SessionStore<S>,
    hal: H,
    state: DeviceState,
    session: Option<Session>,
    fsk: bool,
    rx_delays: [u32; 2],
    rx_delay_start: u32,
    ch_index: u8,
    data_rate: u8,
    available_channels_freq: [u32; 5],
    pending_command: Option<MacCommand>,
}

impl<R: Radio, S: Storage, H: DeviceHal> LoRaWANDevice<R, S, H> {
    /// Create a device bound to a band plan
    pub fn new(radio: R, band: &'static Band, storage: S, hal: H) -> Self {
        Self {
            radio,
            band,
            store: SessionStore::new(storage),
            hal,
            state: DeviceState::Idle,
            session: None,
            fsk: false,
            rx_delays: [RECEIVE_DELAY_1_MS, RECEIVE_DELAY_2_MS],
            rx_delay_start: 0,
            ch_index: 0,
            data_rate: DATA_RATE_UNUSED,
            available_channels_freq: [0; 5],
            pending_command: None,
        }
    }

    /// Destroy the stored session
    pub fn wipe(&mut self) {
        self.store.wipe();
        self.session = None;
        self.state = DeviceState::Idle;
    }

    /// Restore a previously joined session from the store
    pub fn begin(&mut self) -> Result<(), Error<R::Error>> {
        self.set_phy_properties()?;

        let session = self.store.load().ok_or(Error::NetworkNotJoined)?;
        self.session = Some(session);
        self.state = DeviceState::Joined;
        Ok(())
    }

    /// Join the network over the air
    ///
    /// With a stored session and `force` unset this reloads the session
    /// instead of joining again. Every transmitted join request consumes a
    /// device nonce, even when the attempt fails.
    pub fn begin_otaa(
        &mut self,
        join_eui: Eui64,
        dev_eui: Eui64,
        nwk_key: &AesKey,
        app_key: &AesKey,
        force: bool,
    ) -> Result<(), Error<R::Error>> {
        if !force && self.store.is_joined() {
            return self.begin();
        }

        self.state = DeviceState::Joining;
        self.set_phy_properties()?;

        let dev_nonce = self.store.take_dev_nonce();
        let request = JoinRequest {
            join_eui,
            dev_eui,
            dev_nonce,
        };
        self.radio
            .transmit(&request.serialize(nwk_key))
            .map_err(Error::Radio)?;

        self.radio.set_packet_received_action(on_downlink);
        if !self.fsk {
            self.radio.invert_iq(true).map_err(Error::Radio)?;
        }

        DOWNLINK_RECEIVED.store(false, Ordering::SeqCst);
        let start = self.hal.millis();
        self.radio.start_receive().map_err(Error::Radio)?;

        while !DOWNLINK_RECEIVED.load(Ordering::SeqCst) {
            if self.hal.millis().wrapping_sub(start) >= JOIN_ACCEPT_DELAY_2_MS + 2000 {
                self.radio.clear_packet_received_action();
                if !self.fsk {
                    let _ = self.radio.invert_iq(false);
                }
                self.state = DeviceState::Idle;
                return Err(Error::RxTimeout);
            }
            self.hal.yield_now();
        }

        DOWNLINK_RECEIVED.store(false, Ordering::SeqCst);
        self.radio.clear_packet_received_action();
        if !self.fsk {
            self.radio.invert_iq(false).map_err(Error::Radio)?;
        }

        let len = self.radio.get_packet_length(true);
        if len != JOIN_ACCEPT_LEN && len != JOIN_ACCEPT_MAX_LEN {
            debug!("join accept length mismatch: got {} bytes", len);
            return Err(Error::DownlinkMalformed);
        }

        let mut msg = [0u8; JOIN_ACCEPT_MAX_LEN];
        // downlink frames carry no CRC, which some radios flag
        match self.radio.read_data(&mut msg[..len]).map_err(Error::Radio)? {
            RxStatus::Ok | RxStatus::HeaderDamaged => {}
        }

        if MType::from_mhdr(msg[0]) != MType::JoinAccept {
            debug!("join accept message type invalid: 0x{:02x}", msg[0]);
            return Err(Error::DownlinkMalformed);
        }

        // the server produced the body with an ECB decrypt, so encrypting
        // again under the root key recovers the plaintext
        crypto::ecb_encrypt(nwk_key, &mut msg[1..len]);

        let rev_1_1 = msg[11] & mac::DL_SETTINGS_REV_1_1 != 0;
        let verified = if rev_1_1 {
            // 1.1 signs the accept with a dedicated integrity key over the
            // request triple plus the plaintext
            let js_int_key = crypto::derive_join_accept_int_key(nwk_key, dev_eui);
            let mut prefix = [0u8; 11];
            prefix[0] = JOIN_REQUEST_TYPE;
            mac::write_le(&mut prefix[1..9], join_eui);
            mac::write_le(&mut prefix[9..11], dev_nonce as u64);
            crypto::verify_mic(&js_int_key, &[&prefix[..], &msg[..len - 4]], &msg[len - 4..len])
        } else {
            crypto::verify_mic(nwk_key, &[&msg[..len - 4]], &msg[len - 4..len])
        };
        if !verified {
            return Err(Error::InvalidMic);
        }

        let accept = JoinAccept::parse(&msg[..len], self.band.cf_list_type)?;

        self.rx_delays = [accept.rx_delay_ms, accept.rx_delay_ms + 1000];
        if let Some(freqs) = accept.cf_list_freq {
            self.available_channels_freq = freqs;
            for (i, freq) in freqs.iter().enumerate() {
                debug!("channel {} frequency = {} Hz", i, freq);
            }
        }

        let (keys, rev) = if rev_1_1 {
            (
                crypto::derive_session_keys_v1_1(
                    nwk_key,
                    app_key,
                    accept.join_nonce,
                    join_eui,
                    dev_nonce,
                ),
                Revision::R1_1,
            )
        } else {
            (
                crypto::derive_session_keys_v1_0(
                    nwk_key,
                    accept.join_nonce,
                    accept.home_net_id,
                    dev_nonce,
                ),
                Revision::R1_0,
            )
        };

        let session = Session {
            dev_addr: accept.dev_addr,
            app_s_key: keys.app_s_key,
            f_nwk_s_int_key: keys.f_nwk_s_int_key,
            s_nwk_s_int_key: keys.s_nwk_s_int_key,
            nwk_s_enc_key: keys.nwk_s_enc_key,
            rev,
        };
        self.store.save(&session);
        self.session = Some(session);
        self.state = DeviceState::Joined;

        if rev_1_1 {
            let mut echoed = [0u8; 1];
            self.send_mac_command(
                CommandIdentifier::RekeyInd as u8,
                &[Revision::R1_1.as_u8()],
                &mut echoed,
            )?;
            if echoed[0] != Revision::R1_1.as_u8() {
                return Err(Error::InvalidRevision);
            }
        }

        Ok(())
    }

    /// Activate by personalization
    ///
    /// Supplying both 1.1 integrity keys selects revision 1.1; otherwise the
    /// network session key fills all three network roles. Nothing is
    /// persisted.
    pub fn begin_abp(
        &mut self,
        dev_addr: DevAddr,
        nwk_s_key: &AesKey,
        app_s_key: &AesKey,
        f_nwk_s_int_key: Option<&AesKey>,
        s_nwk_s_int_key: Option<&AesKey>,
    ) -> Result<(), Error<R::Error>> {
        let session = match (f_nwk_s_int_key, s_nwk_s_int_key) {
            (Some(f_key), Some(s_key)) => Session {
                dev_addr,
                app_s_key: *app_s_key,
                f_nwk_s_int_key: *f_key,
                s_nwk_s_int_key: *s_key,
                nwk_s_enc_key: *nwk_s_key,
                rev: Revision::R1_1,
            },
            _ => Session {
                dev_addr,
                app_s_key: *app_s_key,
                f_nwk_s_int_key: *nwk_s_key,
                s_nwk_s_int_key: *nwk_s_key,
                nwk_s_enc_key: *nwk_s_key,
                rev: Revision::R1_0,
            },
        };
        self.session = Some(session);

        self.set_phy_properties()?;
        self.state = DeviceState::Joined;
        Ok(())
    }

    /// Send an unconfirmed uplink
    pub fn uplink(&mut self, data: &[u8], port: u8) -> Result<(), Error<R::Error>> {
        let session = self.session.ok_or(Error::NetworkNotJoined)?;

        if port > FPORT_MAX {
            return Err(Error::InvalidPort);
        }
        if data.len() > self.band.max_payload(self.data_rate) as usize {
            return Err(Error::PacketTooLong);
        }
        // the previous RX2 window must have closed
        if self.hal.millis().wrapping_sub(self.rx_delay_start) < self.rx_delays[1] {
            return Err(Error::UplinkUnavailable);
        }

        // persisted before any radio activity so a crash never reuses it
        let fcnt = self.store.advance_fcnt_up();

        let fopts_len = self
            .pending_command
            .as_ref()
            .map(|cmd| cmd.fopts_len())
            .unwrap_or(0);

        let mut frame: Vec<u8, MAX_FRAME_LEN> = Vec::new();
        frame
            .push(MType::UnconfirmedDataUp as u8 | mac::MHDR_MAJOR_R1)
            .map_err(|_| Error::BufferTooSmall)?;
        frame
            .extend_from_slice(&session.dev_addr.to_le_bytes())
            .map_err(|_| Error::BufferTooSmall)?;
        frame
            .push(fopts_len as u8)
            .map_err(|_| Error::BufferTooSmall)?;
        frame
            .extend_from_slice(&(fcnt as u16).to_le_bytes())
            .map_err(|_| Error::BufferTooSmall)?;

        if let Some(cmd) = &self.pending_command {
            let mut fopts = cmd.serialize();
            crypto::encrypt_payload(
                &session.nwk_s_enc_key,
                session.dev_addr,
                fcnt,
                Direction::Up,
                false,
                &mut fopts,
            );
            frame
                .extend_from_slice(&fopts)
                .map_err(|_| Error::BufferTooSmall)?;
        }

        frame.push(port).map_err(|_| Error::BufferTooSmall)?;

        let payload_start = frame.len();
        frame
            .extend_from_slice(data)
            .map_err(|_| Error::BufferTooSmall)?;
        let payload_key = if port == FPORT_MAC_COMMAND {
            &session.nwk_s_enc_key
        } else {
            &session.app_s_key
        };
        crypto::encrypt_payload(
            payload_key,
            session.dev_addr,
            fcnt,
            Direction::Up,
            true,
            &mut frame[payload_start..],
        );

        let block0 = mic_block(Direction::Up, session.dev_addr, fcnt, frame.len() as u8);
        let mic = match session.rev {
            Revision::R1_0 => {
                crypto::generate_mic(&session.f_nwk_s_int_key, &[&block0[..], &frame[..]])
            }
            Revision::R1_1 => {
                // wire order is the low half of the serving MIC, then the
                // low half of the forwarding MIC
                let block1 = mic_block_tx_params(&block0, self.data_rate, self.ch_index);
                let mic_s =
                    crypto::generate_mic(&session.s_nwk_s_int_key, &[&block1[..], &frame[..]]);
                let mic_f =
                    crypto::generate_mic(&session.f_nwk_s_int_key, &[&block0[..], &frame[..]]);
                [mic_s[0], mic_s[1], mic_f[0], mic_f[1]]
            }
        };
        frame
            .extend_from_slice(&mic)
            .map_err(|_| Error::BufferTooSmall)?;

        self.state = DeviceState::Transmitting;
        let time_on_air_ms = self.radio.get_time_on_air_us(frame.len()) / 1000;
        let tx_start = self.hal.millis();
        self.radio.transmit(&frame).map_err(Error::Radio)?;

        self.rx_delay_start = tx_start.wrapping_add(time_on_air_ms);
        self.pending_command = None;
        self.state = DeviceState::Joined;
        Ok(())
    }

    /// Send a string payload
    pub fn uplink_str(&mut self, data: &str, port: u8) -> Result<(), Error<R::Error>> {
        self.uplink(data.as_bytes(), port)
    }

    /// Listen through the RX1/RX2 windows of the last uplink
    ///
    /// Returns the decrypted FOpts or application payload, copied into
    /// `data`. The IQ inversion and the uplink channel are restored on every
    /// exit path.
    pub fn downlink(&mut self, data: &mut [u8]) -> Result<usize, Error<R::Error>> {
        let session = self.session.ok_or(Error::NetworkNotJoined)?;

        // anything to listen for at all?
        if self.hal.millis().wrapping_sub(self.rx_delay_start)
            > self.rx_delays[1] + SCAN_GUARD_MS
        {
            return Err(Error::NoRxWindow);
        }

        if !self.fsk {
            self.radio.invert_iq(true).map_err(Error::Radio)?;
        }

        // long enough to catch a preamble at the current data rate
        let scan_timeout_ms = self.radio.get_time_on_air_us(0) / 1000;

        DOWNLINK_RECEIVED.store(false, Ordering::SeqCst);
        SCAN_FINISHED.store(false, Ordering::SeqCst);
        let mut packet_detected = false;
        self.radio.set_channel_scan_action(on_channel_scan);

        for window in 0..2 {
            self.state = if window == 0 {
                DeviceState::WaitingRx1
            } else {
                DeviceState::WaitingRx2
            };

            // open slightly early to cover timing error
            let elapsed = self.hal.millis().wrapping_sub(self.rx_delay_start);
            let mut wait = self.rx_delays[window].saturating_sub(elapsed);
            if wait > SCAN_GUARD_MS {
                wait -= SCAN_GUARD_MS;
            }
            self.hal.delay(wait);

            self.state = if window == 0 {
                DeviceState::ListeningRx1
            } else {
                DeviceState::ListeningRx2
            };

            let scan_start = self.hal.millis();
            while self.hal.millis().wrapping_sub(scan_start) < scan_timeout_ms + SCAN_GUARD_MS {
                self.radio.start_channel_scan().map_err(Error::Radio)?;

                let scan_wait_start = self.hal.millis();
                while !SCAN_FINISHED.load(Ordering::SeqCst) {
                    self.hal.yield_now();
                    if self.hal.millis().wrapping_sub(scan_wait_start) >= SCAN_WAIT_MS {
                        break;
                    }
                }
                SCAN_FINISHED.store(false, Ordering::SeqCst);

                match self.radio.get_channel_scan_result().map_err(Error::Radio)? {
                    ChannelScanResult::PreambleDetected | ChannelScanResult::LoraDetected => {
                        packet_detected = true;
                        break;
                    }
                    ChannelScanResult::NoActivity => {}
                }
            }

            if packet_detected {
                break;
            }

            if window == 0 {
                // nothing in RX1, retune to the backup channel
                self.radio
                    .set_frequency(self.band.backup_channel.freq_start)
                    .map_err(Error::Radio)?;
                let (_, config) = self
                    .band
                    .backup_channel
                    .resolve_data_rate(DATA_RATE_UNUSED)
                    .ok_or(Error::InvalidChannel)?;
                self.radio.set_data_rate(config).map_err(Error::Radio)?;
            }
        }

        self.radio.clear_channel_scan_action();

        if !packet_detected {
            self.abort_rx();
            return Err(Error::RxTimeout);
        }

        // preamble seen, swap from scanning to receiving
        DOWNLINK_RECEIVED.store(false, Ordering::SeqCst);
        self.radio.set_packet_received_action(on_downlink);
        self.radio.start_receive().map_err(Error::Radio)?;

        let rx_start = self.hal.millis();
        while !DOWNLINK_RECEIVED.load(Ordering::SeqCst) {
            self.hal.yield_now();
            if self.hal.millis().wrapping_sub(rx_start) >= PACKET_WAIT_MS {
                self.radio.clear_packet_received_action();
                self.abort_rx();
                return Err(Error::RxTimeout);
            }
        }

        DOWNLINK_RECEIVED.store(false, Ordering::SeqCst);
        self.radio.standby().map_err(Error::Radio)?;
        self.radio.clear_packet_received_action();
        if !self.fsk {
            self.radio.invert_iq(false).map_err(Error::Radio)?;
        }

        let len = self.radio.get_packet_length(false);
        let mut msg = [0u8; MAX_FRAME_LEN];
        if len < DATA_FRAME_MIN_LEN || len > MAX_FRAME_LEN {
            debug!("downlink message too short ({} bytes)", len);
            self.restore_channel()?;
            self.state = DeviceState::Joined;
            return Err(Error::DownlinkMalformed);
        }

        // downlink frames carry no CRC, which some radios flag
        match self.radio.read_data(&mut msg[..len]).map_err(Error::Radio)? {
            RxStatus::Ok | RxStatus::HeaderDamaged => {}
        }

        // radio work is done, put the uplink channel back before parsing
        self.restore_channel()?;
        self.state = DeviceState::Joined;

        // MIC first, everything else after
        let fcnt = mac::read_le(&msg[6..8]) as u32;
        let block0 = mic_block(Direction::Down, session.dev_addr, fcnt, (len - 4) as u8);
        if !crypto::verify_mic(
            &session.s_nwk_s_int_key,
            &[&block0[..], &msg[..len - 4]],
            &msg[len - 4..len],
        ) {
            return Err(Error::InvalidMic);
        }

        let frame = DownlinkFrame::parse(&msg[..len - 4])?;
        if frame.dev_addr != session.dev_addr {
            warn!(
                "device address mismatch: expected 0x{:08x}, got 0x{:08x}",
                session.dev_addr, frame.dev_addr
            );
            return Err(Error::DownlinkMalformed);
        }

        if !frame.f_opts.is_empty() {
            let out = data
                .get_mut(..frame.f_opts.len())
                .ok_or(Error::BufferTooSmall)?;
            out.copy_from_slice(frame.f_opts);
            crypto::encrypt_payload(
                &session.nwk_s_enc_key,
                session.dev_addr,
                frame.f_cnt as u32,
                Direction::Down,
                false,
                out,
            );
            return Ok(out.len());
        }

        let payload_key = match frame.f_port {
            Some(FPORT_MAC_COMMAND) => &session.nwk_s_enc_key,
            Some(_) => &session.app_s_key,
            None => return Ok(0),
        };
        let out = data
            .get_mut(..frame.frm_payload.len())
            .ok_or(Error::BufferTooSmall)?;
        out.copy_from_slice(frame.frm_payload);
        crypto::encrypt_payload(
            payload_key,
            session.dev_addr,
            frame.f_cnt as u32,
            Direction::Down,
            true,
            out,
        );
        Ok(out.len())
    }

    /// Queue a MAC command for piggyback on the next uplink
    pub fn queue_mac_command(&mut self, command: MacCommand) -> Result<(), Error<R::Error>> {
        if CommandIdentifier::from_cid(command.cid()).is_none() {
            return Err(Error::InvalidCid);
        }
        self.pending_command = Some(command);
        Ok(())
    }

    /// Run a MAC-command exchange on port 0
    ///
    /// Uplinks `[cid | payload]`, waits through the receive windows and
    /// copies the reply payload; the reply must echo the command identifier.
    pub fn send_mac_command(
        &mut self,
        cid: u8,
        payload: &[u8],
        reply: &mut [u8],
    ) -> Result<(), Error<R::Error>> {
        let mut request: Vec<u8, 16> = Vec::new();
        request.push(cid).map_err(|_| Error::BufferTooSmall)?;
        request
            .extend_from_slice(payload)
            .map_err(|_| Error::BufferTooSmall)?;

        self.uplink(&request, FPORT_MAC_COMMAND)?;

        let mut response = [0u8; MAX_FRAME_LEN];
        let len = self.downlink(&mut response)?;

        // the server may append more commands, but never fewer bytes
        if len < 1 + reply.len() {
            return Err(Error::DownlinkMalformed);
        }
        if response[0] != cid {
            return Err(Error::InvalidCid);
        }
        reply.copy_from_slice(&response[1..1 + reply.len()]);
        Ok(())
    }

    /// Tune the radio to a logical channel of the band plan
    pub fn configure_channel(&mut self, ch_index: u8, dr: u8) -> Result<(), Error<R::Error>> {
        let (freq, span) = self
            .band
            .channel_frequency(ch_index)
            .ok_or(Error::InvalidChannel)?;
        let (dr_index, config) = span.resolve_data_rate(dr).ok_or(Error::InvalidChannel)?;

        self.radio.set_frequency(freq).map_err(Error::Radio)?;
        self.radio.set_data_rate(config).map_err(Error::Radio)?;
        self.ch_index = ch_index;
        self.data_rate = dr_index;
        Ok(())
    }

    /// Current engine state
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Active session, if any
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Frequencies received through the CFList of the last join, in Hz
    pub fn available_channels_freq(&self) -> &[u32; 5] {
        &self.available_channels_freq
    }

    /// Currently selected data rate index
    pub fn data_rate(&self) -> u8 {
        self.data_rate
    }

    /// Configure the radio for the band: join channel and DR, output power,
    /// sync word and preamble
    fn set_phy_properties(&mut self) -> Result<(), Error<R::Error>> {
        if self.fsk {
            let params = self.band.fsk.as_ref().ok_or(Error::Unsupported)?;
            self.radio
                .set_frequency(params.frequency)
                .map_err(Error::Radio)?;
            self.radio
                .set_data_rate(crate::radio::traits::DataRateConfig::Fsk {
                    bit_rate_kbps: 50,
                    freq_dev_khz: 25,
                })
                .map_err(Error::Radio)?;
            self.radio
                .set_data_shaping(DataShaping::Gaussian10)
                .map_err(Error::Radio)?;
            self.radio
                .set_encoding(Encoding::Whitening)
                .map_err(Error::Radio)?;
            self.radio
                .set_output_power(self.band.power_max)
                .map_err(Error::Radio)?;
            self.radio
                .set_sync_word(&params.sync_word)
                .map_err(Error::Radio)?;
            self.radio
                .set_preamble_length(params.preamble_len)
                .map_err(Error::Radio)?;
            return Ok(());
        }

        let join_dr = self.band.channel_spans[0].join_request_data_rate;
        self.configure_channel(0, join_dr)?;
        self.radio
            .set_output_power(self.band.power_max)
            .map_err(Error::Radio)?;
        self.radio
            .set_sync_word(&[LORA_SYNC_WORD])
            .map_err(Error::Radio)?;
        self.radio
            .set_preamble_length(LORA_PREAMBLE_LEN)
            .map_err(Error::Radio)?;
        Ok(())
    }

    /// Put the radio back on the uplink channel after a receive
    fn restore_channel(&mut self) -> Result<(), Error<R::Error>> {
        self.configure_channel(self.ch_index, self.data_rate)
    }

    /// Best-effort radio cleanup on an abandoned receive; the primary error
    /// is already decided
    fn abort_rx(&mut self) {
        let _ = self.radio.standby();
        if !self.fsk {
            let _ = self.radio.invert_iq(false);
        }
        let _ = self.restore_channel();
        self.state = DeviceState::Joined;
    }

    /// Select FSK or LoRa operation for bands that support both
    pub fn set_fsk(&mut self, enabled: bool) -> Result<(), Error<R::Error>> {
        if enabled && self.band.fsk.is_none() {
            return Err(Error::Unsupported);
        }
        self.fsk = enabled;
        Ok(())
    }
}
