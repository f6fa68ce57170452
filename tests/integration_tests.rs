use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, OnceLock};

use lorawan_node::config::device::{AesKey, Revision};
use lorawan_node::crypto::{self, Direction};
use lorawan_node::device::{DeviceState, Error, LoRaWANDevice};
use lorawan_node::lorawan::commands::MacCommand;
use lorawan_node::lorawan::mac::mic_block;
use lorawan_node::lorawan::region::EU868;
use lorawan_node::storage::{SessionParam, Storage, SESSION_MAGIC};

use mock::{advance, MockHal, MockRadio, RadioState, SharedStorage};

const JOIN_EUI: u64 = 0x0102_0304_0506_0708;
const DEV_EUI: u64 = 0x1112_1314_1516_1718;
const NWK_KEY: AesKey = AesKey::new([0x2B; 16]);
const APP_KEY: AesKey = AesKey::new([0x7E; 16]);

// The engine's event flags are process-wide, so tests that drive receive
// flows must not overlap.
fn serial() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

type TestDevice = LoRaWANDevice<MockRadio, SharedStorage, MockHal>;

fn setup() -> (TestDevice, Rc<RefCell<RadioState>>, Rc<Cell<u32>>, SharedStorage) {
    let (mut radio, radio_state) = MockRadio::new();
    let (hal, clock) = MockHal::new();
    radio.attach_clock(clock.clone());
    let storage = SharedStorage::new();
    let device = LoRaWANDevice::new(radio, &EU868, storage.clone(), hal);
    (device, radio_state, clock, storage)
}

fn ecb_decrypt(key: &[u8; 16], data: &mut [u8]) {
    use aes::cipher::{BlockDecrypt, KeyInit};
    use aes::Aes128;

    let cipher = Aes128::new_from_slice(key).unwrap();
    for chunk in data.chunks_mut(16) {
        let mut block = [0u8; 16];
        block[..chunk.len()].copy_from_slice(chunk);
        cipher.decrypt_block((&mut block).into());
        chunk.copy_from_slice(&block[..chunk.len()]);
    }
}

fn ecb_encrypt_block(key: &[u8; 16], block: &mut [u8; 16]) {
    use aes::cipher::{BlockEncrypt, KeyInit};
    use aes::Aes128;

    let cipher = Aes128::new_from_slice(key).unwrap();
    cipher.encrypt_block(block.into());
}

/// The network "encrypts" a join accept by ECB-decrypting the body
fn seal_join_accept(nwk_key: &AesKey, plain: &[u8]) -> Vec<u8> {
    let mut msg = plain.to_vec();
    ecb_decrypt(nwk_key.as_bytes(), &mut msg[1..]);
    msg
}

fn join_accept_v1_0(
    nwk_key: &AesKey,
    join_nonce: u32,
    net_id: u32,
    dev_addr: u32,
    cf_list: Option<[u32; 5]>,
) -> Vec<u8> {
    let len = if cf_list.is_some() { 33 } else { 17 };
    let mut plain = vec![0u8; len];
    plain[0] = 0x20;
    plain[1..4].copy_from_slice(&join_nonce.to_le_bytes()[..3]);
    plain[4..7].copy_from_slice(&net_id.to_le_bytes()[..3]);
    plain[7..11].copy_from_slice(&dev_addr.to_le_bytes());
    plain[11] = 0x00;
    plain[12] = 0x01;
    if let Some(raw) = cf_list {
        for (i, freq) in raw.iter().enumerate() {
            plain[13 + 3 * i..16 + 3 * i].copy_from_slice(&freq.to_le_bytes()[..3]);
        }
        plain[28] = 0x00;
    }

    let mic = crypto::generate_mic(nwk_key, &[&plain[..len - 4]]);
    plain[len - 4..].copy_from_slice(&mic);
    seal_join_accept(nwk_key, &plain)
}

fn join_accept_v1_1(
    nwk_key: &AesKey,
    join_eui: u64,
    dev_eui: u64,
    dev_nonce: u16,
    join_nonce: u32,
    dev_addr: u32,
) -> Vec<u8> {
    let mut plain = vec![0u8; 17];
    plain[0] = 0x20;
    plain[1..4].copy_from_slice(&join_nonce.to_le_bytes()[..3]);
    plain[7..11].copy_from_slice(&dev_addr.to_le_bytes());
    plain[11] = 0x80;
    plain[12] = 0x01;

    let js_int_key = crypto::derive_join_accept_int_key(nwk_key, dev_eui);
    let mut prefix = [0u8; 11];
    prefix[0] = 0xFF;
    prefix[1..9].copy_from_slice(&join_eui.to_le_bytes());
    prefix[9..11].copy_from_slice(&dev_nonce.to_le_bytes());
    let mic = crypto::generate_mic(&js_int_key, &[&prefix[..], &plain[..13]]);
    plain[13..].copy_from_slice(&mic);
    seal_join_accept(nwk_key, &plain)
}

fn make_downlink(
    mic_key: &AesKey,
    enc_key: &AesKey,
    dev_addr: u32,
    fcnt: u16,
    port: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut msg = vec![0x60u8];
    msg.extend_from_slice(&dev_addr.to_le_bytes());
    msg.push(0x00);
    msg.extend_from_slice(&fcnt.to_le_bytes());
    msg.push(port);

    let mut encrypted = payload.to_vec();
    crypto::encrypt_payload(enc_key, dev_addr, fcnt as u32, Direction::Down, true, &mut encrypted);
    msg.extend_from_slice(&encrypted);

    let block0 = mic_block(Direction::Down, dev_addr, fcnt as u32, msg.len() as u8);
    let mic = crypto::generate_mic(mic_key, &[&block0[..], &msg[..]]);
    msg.extend_from_slice(&mic);
    msg
}

#[test]
fn wipe_then_begin_reports_not_joined() {
    let _guard = serial();
    let (mut device, _radio, _clock, storage) = setup();

    device.wipe();
    assert!(matches!(device.begin(), Err(Error::NetworkNotJoined)));
    assert_eq!(storage.get_u32(SessionParam::Magic), 0);
    assert!(device.session().is_none());
}

#[test]
fn otaa_join_derives_and_persists_session() {
    let _guard = serial();
    let (mut device, radio, _clock, storage) = setup();

    let join_nonce = 0x0A0B0C;
    let net_id = 0x424344;
    let dev_addr = 0x2601_1BDA;
    radio
        .borrow_mut()
        .rx_queue
        .push_back(join_accept_v1_0(&NWK_KEY, join_nonce, net_id, dev_addr, None));

    device
        .begin_otaa(JOIN_EUI, DEV_EUI, &NWK_KEY, &APP_KEY, true)
        .unwrap();
    assert_eq!(device.state(), DeviceState::Joined);

    // the join request went out first
    assert_eq!(radio.borrow().tx_frames[0].len(), 23);
    assert_eq!(radio.borrow().tx_frames[0][0], 0x00);

    assert_eq!(storage.get_u32(SessionParam::Magic), SESSION_MAGIC);
    assert_eq!(storage.get_u32(SessionParam::DevAddr), dev_addr);
    assert_eq!(storage.get_u16(SessionParam::DevNonce), 1);
    assert_eq!(storage.get_u32(SessionParam::FCntUp), 0);

    // AppSKey = AES128(nwkKey, [0x02 | joinNonce | homeNetId | devNonce | 0..])
    let mut expected = [0u8; 16];
    expected[0] = 0x02;
    expected[1..4].copy_from_slice(&join_nonce.to_le_bytes()[..3]);
    expected[4..7].copy_from_slice(&net_id.to_le_bytes()[..3]);
    expected[7..9].copy_from_slice(&0u16.to_le_bytes());
    ecb_encrypt_block(NWK_KEY.as_bytes(), &mut expected);
    assert_eq!(storage.read_key_bytes(SessionParam::AppSKey), expected);

    // 1.0: one network key value in all three roles
    assert_eq!(
        storage.read_key_bytes(SessionParam::FNwkSIntKey),
        storage.read_key_bytes(SessionParam::SNwkSIntKey)
    );
}

#[test]
fn failed_join_still_consumes_dev_nonce() {
    let _guard = serial();
    let (mut device, _radio, _clock, storage) = setup();

    // no reply queued, the window must time out
    let result = device.begin_otaa(JOIN_EUI, DEV_EUI, &NWK_KEY, &APP_KEY, true);
    assert!(matches!(result, Err(Error::RxTimeout)));
    assert_eq!(storage.get_u16(SessionParam::DevNonce), 1);
    assert_eq!(storage.get_u32(SessionParam::Magic), 0);
}

#[test]
fn first_uplink_after_join() {
    let _guard = serial();
    let (mut device, radio, clock, _storage) = setup();

    let dev_addr = 0x2601_1BDA;
    radio
        .borrow_mut()
        .rx_queue
        .push_back(join_accept_v1_0(&NWK_KEY, 0x0A0B0C, 0x424344, dev_addr, None));
    device
        .begin_otaa(JOIN_EUI, DEV_EUI, &NWK_KEY, &APP_KEY, true)
        .unwrap();

    advance(&clock, 3000);
    device.uplink(&[0xCA, 0xFE], 1).unwrap();

    let frame = radio.borrow().tx_frames.last().unwrap().clone();
    assert_eq!(frame[0], 0x40);
    assert_eq!(&frame[1..5], &dev_addr.to_le_bytes());
    assert_eq!(&frame[6..8], &[0x01, 0x00]);

    let session = *device.session().unwrap();
    let body = &frame[..frame.len() - 4];
    let block0 = mic_block(Direction::Up, dev_addr, 1, body.len() as u8);
    assert!(crypto::verify_mic(
        &session.f_nwk_s_int_key,
        &[&block0[..], body],
        &frame[frame.len() - 4..],
    ));

    // port byte, then the encrypted payload
    assert_eq!(frame[8], 1);
    let mut payload = frame[9..11].to_vec();
    crypto::encrypt_payload(&session.app_s_key, dev_addr, 1, Direction::Up, true, &mut payload);
    assert_eq!(payload, [0xCA, 0xFE]);
}

#[test]
fn downlink_in_rx1_then_no_window() {
    let _guard = serial();
    let (mut device, radio, clock, _storage) = setup();

    let dev_addr = 0x2601_1BDA;
    radio
        .borrow_mut()
        .rx_queue
        .push_back(join_accept_v1_0(&NWK_KEY, 0x0A0B0C, 0x424344, dev_addr, None));
    device
        .begin_otaa(JOIN_EUI, DEV_EUI, &NWK_KEY, &APP_KEY, true)
        .unwrap();

    advance(&clock, 3000);
    device.uplink(&[0xCA, 0xFE], 1).unwrap();

    let session = *device.session().unwrap();
    radio.borrow_mut().rx_queue.push_back(make_downlink(
        &session.s_nwk_s_int_key,
        &session.app_s_key,
        dev_addr,
        1,
        1,
        &[0xBE, 0xEF],
    ));

    let mut buffer = [0u8; 256];
    let len = device.downlink(&mut buffer).unwrap();
    assert_eq!(&buffer[..len], &[0xBE, 0xEF]);
    assert_eq!(device.state(), DeviceState::Joined);

    // ten seconds later both windows are long gone; the radio is not touched
    let scans_before = radio.borrow().scan_starts;
    advance(&clock, 10_000);
    assert!(matches!(device.downlink(&mut buffer), Err(Error::NoRxWindow)));
    assert_eq!(radio.borrow().scan_starts, scans_before);
    assert!(!radio.borrow().iq_inverted);
}

#[test]
fn downlink_with_flipped_mic_bit_is_rejected() {
    let _guard = serial();
    let (mut device, radio, clock, _storage) = setup();

    let dev_addr = 0x0011_2233;
    let nwk_s_key = AesKey::new([0xA1; 16]);
    let app_s_key = AesKey::new([0xB2; 16]);
    device
        .begin_abp(dev_addr, &nwk_s_key, &app_s_key, None, None)
        .unwrap();

    advance(&clock, 3000);
    device.uplink(&[0x01], 1).unwrap();

    let mut frame = make_downlink(&nwk_s_key, &app_s_key, dev_addr, 1, 1, &[0xBE, 0xEF]);
    let last = frame.len() - 1;
    frame[last] ^= 0x01;
    radio.borrow_mut().rx_queue.push_back(frame);

    let mut buffer = [0u8; 256];
    assert!(matches!(device.downlink(&mut buffer), Err(Error::InvalidMic)));
}

#[test]
fn v1_1_join_runs_rekey_exchange() {
    let _guard = serial();
    let (mut device, radio, _clock, storage) = setup();

    let dev_addr = 0x1122_3344;
    let join_nonce = 0x0A0B0C;
    radio.borrow_mut().rx_queue.push_back(join_accept_v1_1(
        &NWK_KEY, JOIN_EUI, DEV_EUI, 0, join_nonce, dev_addr,
    ));

    // the server answers the RekeyInd with a matching revision
    let keys = crypto::derive_session_keys_v1_1(&NWK_KEY, &APP_KEY, join_nonce, JOIN_EUI, 0);
    radio.borrow_mut().rx_queue.push_back(make_downlink(
        &keys.s_nwk_s_int_key,
        &keys.nwk_s_enc_key,
        dev_addr,
        1,
        0,
        &[0x0B, 0x01],
    ));

    device
        .begin_otaa(JOIN_EUI, DEV_EUI, &NWK_KEY, &APP_KEY, true)
        .unwrap();
    assert_eq!(device.session().unwrap().rev, Revision::R1_1);
    assert_eq!(storage.get_u32(SessionParam::Revision), 1);

    // the RekeyInd went out on port 0
    let frames = radio.borrow().tx_frames.clone();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1][8], 0x00);
}

#[test]
fn v1_1_join_rejects_wrong_echoed_revision() {
    let _guard = serial();
    let (mut device, radio, _clock, storage) = setup();

    let dev_addr = 0x1122_3344;
    let join_nonce = 0x0A0B0C;
    radio.borrow_mut().rx_queue.push_back(join_accept_v1_1(
        &NWK_KEY, JOIN_EUI, DEV_EUI, 0, join_nonce, dev_addr,
    ));

    let keys = crypto::derive_session_keys_v1_1(&NWK_KEY, &APP_KEY, join_nonce, JOIN_EUI, 0);
    radio.borrow_mut().rx_queue.push_back(make_downlink(
        &keys.s_nwk_s_int_key,
        &keys.nwk_s_enc_key,
        dev_addr,
        1,
        0,
        &[0x0B, 0x00],
    ));

    let result = device.begin_otaa(JOIN_EUI, DEV_EUI, &NWK_KEY, &APP_KEY, true);
    assert!(matches!(result, Err(Error::InvalidRevision)));
    // the session itself was already persisted before the exchange
    assert_eq!(storage.get_u32(SessionParam::Magic), SESSION_MAGIC);
}

#[test]
fn join_accept_with_bad_length_is_malformed() {
    let _guard = serial();
    let (mut device, radio, _clock, _storage) = setup();

    radio.borrow_mut().rx_queue.push_back(vec![0x20; 20]);
    let result = device.begin_otaa(JOIN_EUI, DEV_EUI, &NWK_KEY, &APP_KEY, true);
    assert!(matches!(result, Err(Error::DownlinkMalformed)));
}

#[test]
fn join_accept_with_cf_list_populates_channels() {
    let _guard = serial();
    let (mut device, radio, _clock, _storage) = setup();

    let raw = [8_671_000u32, 8_673_000, 8_675_000, 8_677_000, 8_679_000];
    radio.borrow_mut().rx_queue.push_back(join_accept_v1_0(
        &NWK_KEY, 0x0A0B0C, 0x424344, 0x0101_0101, Some(raw),
    ));

    device
        .begin_otaa(JOIN_EUI, DEV_EUI, &NWK_KEY, &APP_KEY, true)
        .unwrap();
    assert_eq!(
        device.available_channels_freq(),
        &[867_100_000, 867_300_000, 867_500_000, 867_700_000, 867_900_000]
    );
}

#[test]
fn payload_length_boundary() {
    let _guard = serial();
    let (mut device, _radio, clock, _storage) = setup();

    device
        .begin_abp(1, &AesKey::new([0x01; 16]), &AesKey::new([0x02; 16]), None, None)
        .unwrap();

    // EU868 DR0 carries at most 51 bytes
    advance(&clock, 3000);
    device.uplink(&[0u8; 51], 1).unwrap();

    advance(&clock, 3000);
    assert!(matches!(
        device.uplink(&[0u8; 52], 1),
        Err(Error::PacketTooLong)
    ));
}

#[test]
fn port_routing_and_rejection() {
    let _guard = serial();
    let (mut device, radio, clock, _storage) = setup();

    let nwk_s_key = AesKey::new([0xA1; 16]);
    let app_s_key = AesKey::new([0xB2; 16]);
    device
        .begin_abp(7, &nwk_s_key, &app_s_key, None, None)
        .unwrap();

    assert!(matches!(device.uplink(&[0x55], 0xE0), Err(Error::InvalidPort)));
    assert!(matches!(device.uplink(&[0x55], 0xFF), Err(Error::InvalidPort)));

    // port 0 encrypts under the network session key
    advance(&clock, 3000);
    device.uplink(&[0x55], 0).unwrap();
    let frame = radio.borrow().tx_frames.last().unwrap().clone();
    let mut payload = vec![frame[9]];
    crypto::encrypt_payload(&nwk_s_key, 7, 1, Direction::Up, true, &mut payload);
    assert_eq!(payload, [0x55]);

    // an application port encrypts under the application session key
    advance(&clock, 3000);
    device.uplink(&[0x66], 0xDF).unwrap();
    let frame = radio.borrow().tx_frames.last().unwrap().clone();
    let mut payload = vec![frame[9]];
    crypto::encrypt_payload(&app_s_key, 7, 2, Direction::Up, true, &mut payload);
    assert_eq!(payload, [0x66]);
}

#[test]
fn uplink_blocked_until_rx2_closes() {
    let _guard = serial();
    let (mut device, _radio, clock, _storage) = setup();

    device
        .begin_abp(1, &AesKey::new([0x01; 16]), &AesKey::new([0x02; 16]), None, None)
        .unwrap();

    advance(&clock, 3000);
    device.uplink(&[0x01], 1).unwrap();
    assert!(matches!(
        device.uplink(&[0x02], 1),
        Err(Error::UplinkUnavailable)
    ));

    advance(&clock, 3000);
    device.uplink(&[0x02], 1).unwrap();
}

#[test]
fn fcnt_up_is_strictly_increasing_and_persisted() {
    let _guard = serial();
    let (mut device, _radio, clock, storage) = setup();

    device
        .begin_abp(1, &AesKey::new([0x01; 16]), &AesKey::new([0x02; 16]), None, None)
        .unwrap();

    for expected in 1..=3u32 {
        advance(&clock, 3000);
        let before = storage.get_u32(SessionParam::FCntUp);
        device.uplink(&[0xAA], 1).unwrap();
        let after = storage.get_u32(SessionParam::FCntUp);
        assert_eq!(after, expected);
        assert!(after > before);
    }
}

#[test]
fn pending_mac_command_rides_in_fopts() {
    let _guard = serial();
    let (mut device, radio, clock, _storage) = setup();

    let nwk_s_key = AesKey::new([0xA1; 16]);
    device
        .begin_abp(9, &nwk_s_key, &AesKey::new([0xB2; 16]), None, None)
        .unwrap();

    device
        .queue_mac_command(MacCommand::new(0x02, &[]).unwrap())
        .unwrap();
    advance(&clock, 3000);
    device.uplink(&[0x01], 1).unwrap();

    let frame = radio.borrow().tx_frames.last().unwrap().clone();
    assert_eq!(frame[5] & 0x0F, 1);
    let mut fopts = vec![frame[8]];
    crypto::encrypt_payload(&nwk_s_key, 9, 1, Direction::Up, false, &mut fopts);
    assert_eq!(fopts, [0x02]);

    // cleared after transmission
    advance(&clock, 3000);
    device.uplink(&[0x01], 1).unwrap();
    let frame = radio.borrow().tx_frames.last().unwrap().clone();
    assert_eq!(frame[5] & 0x0F, 0);
}

#[test]
fn downlink_fopts_are_returned_decrypted() {
    let _guard = serial();
    let (mut device, radio, clock, _storage) = setup();

    let nwk_s_key = AesKey::new([0xA1; 16]);
    let dev_addr = 0x0600_0001;
    device
        .begin_abp(dev_addr, &nwk_s_key, &AesKey::new([0xB2; 16]), None, None)
        .unwrap();

    advance(&clock, 3000);
    device.uplink(&[0x01], 1).unwrap();

    // a frame carrying only MAC commands in FOpts
    let mut msg = vec![0x60u8];
    msg.extend_from_slice(&dev_addr.to_le_bytes());
    msg.push(0x02);
    msg.extend_from_slice(&1u16.to_le_bytes());
    let mut fopts = vec![0x02, 0x33];
    crypto::encrypt_payload(&nwk_s_key, dev_addr, 1, Direction::Down, false, &mut fopts);
    msg.extend_from_slice(&fopts);
    let block0 = mic_block(Direction::Down, dev_addr, 1, msg.len() as u8);
    let mic = crypto::generate_mic(&nwk_s_key, &[&block0[..], &msg[..]]);
    msg.extend_from_slice(&mic);
    radio.borrow_mut().rx_queue.push_back(msg);

    let mut buffer = [0u8; 256];
    let len = device.downlink(&mut buffer).unwrap();
    assert_eq!(&buffer[..len], &[0x02, 0x33]);
}

#[test]
fn downlink_for_other_device_is_rejected() {
    let _guard = serial();
    let (mut device, radio, clock, _storage) = setup();

    let nwk_s_key = AesKey::new([0xA1; 16]);
    let app_s_key = AesKey::new([0xB2; 16]);
    device
        .begin_abp(0x0600_0001, &nwk_s_key, &app_s_key, None, None)
        .unwrap();

    advance(&clock, 3000);
    device.uplink(&[0x01], 1).unwrap();

    // MIC is computed against our own address, so a foreign frame dies there
    let frame = make_downlink(&nwk_s_key, &app_s_key, 0x0600_0002, 1, 1, &[0xBE, 0xEF]);
    radio.borrow_mut().rx_queue.push_back(frame);

    let mut buffer = [0u8; 256];
    assert!(matches!(device.downlink(&mut buffer), Err(Error::InvalidMic)));
}

#[test]
fn abp_with_integrity_keys_selects_v1_1() {
    let _guard = serial();
    let (mut device, _radio, _clock, _storage) = setup();

    device
        .begin_abp(
            1,
            &AesKey::new([0x01; 16]),
            &AesKey::new([0x02; 16]),
            Some(&AesKey::new([0x03; 16])),
            Some(&AesKey::new([0x04; 16])),
        )
        .unwrap();
    assert_eq!(device.session().unwrap().rev, Revision::R1_1);

    let (mut device, _radio, _clock, _storage) = setup();
    device
        .begin_abp(1, &AesKey::new([0x01; 16]), &AesKey::new([0x02; 16]), None, None)
        .unwrap();
    let session = *device.session().unwrap();
    assert_eq!(session.rev, Revision::R1_0);
    assert_eq!(session.f_nwk_s_int_key, AesKey::new([0x01; 16]));
    assert_eq!(session.s_nwk_s_int_key, AesKey::new([0x01; 16]));
}

#[test]
fn rejoin_reloads_stored_session() {
    let _guard = serial();
    let (mut device, radio, _clock, storage) = setup();

    let dev_addr = 0x2601_1BDA;
    radio
        .borrow_mut()
        .rx_queue
        .push_back(join_accept_v1_0(&NWK_KEY, 0x0A0B0C, 0x424344, dev_addr, None));
    device
        .begin_otaa(JOIN_EUI, DEV_EUI, &NWK_KEY, &APP_KEY, true)
        .unwrap();

    // a second, unforced call must restore instead of transmitting again
    let (radio2, radio2_state) = MockRadio::new();
    let (hal2, _clock2) = MockHal::new();
    let mut device2 = LoRaWANDevice::new(radio2, &EU868, storage.clone(), hal2);
    device2
        .begin_otaa(JOIN_EUI, DEV_EUI, &NWK_KEY, &APP_KEY, false)
        .unwrap();
    assert!(radio2_state.borrow().tx_frames.is_empty());
    assert_eq!(device2.session().unwrap().dev_addr, dev_addr);
}
