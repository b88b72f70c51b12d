//! End-to-end protocol tests
//!
//! Drives typed objects from one object store through the frame writer, a
//! byte-stream parser, and a link pair into a second store, the way a
//! flight controller and a ground station exchange state.

use critical_section as _;

use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{with_timeout, Duration};

use petrel::communication::objlink::transport::CHANNEL_DEPTH;
use petrel::communication::objlink::{
    writer, ChannelTransport, Link, PacketType, ParseStatus, Parser, Transport,
};
use petrel::objects::{
    AttitudeSettings, AttitudeState, GyroState, Metadata, ObjectStore, SharedStore, StateObject,
    TrimFlight, MAX_OBJECT_SIZE,
};

fn shared_store() -> SharedStore {
    let mut store = ObjectStore::new();
    store
        .register::<AttitudeState>(Metadata::periodic(100))
        .unwrap();
    store.register::<GyroState>(Metadata::periodic(100)).unwrap();
    store
        .register::<AttitudeSettings>(Metadata::settings())
        .unwrap();
    SharedStore::new(store)
}

/// Feed raw peer bytes through a parser, handing complete frames to `link`.
async fn pump(link: &Link<ChannelTransport>, store: &SharedStore, parser: &mut Parser, bytes: &[u8]) {
    for &b in bytes {
        let status = store.with(|s| parser.process_byte(b, s));
        if let ParseStatus::Complete(frame) = status {
            let _ = link.handle_frame(store, &frame).await;
        }
    }
}

async fn drain(t: &ChannelTransport) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        match with_timeout(Duration::from_millis(1), t.read(&mut buf)).await {
            Ok(Ok(n)) => out.extend_from_slice(&buf[..n]),
            _ => break,
        }
    }
    out
}

#[test]
fn attitude_frame_travels_writer_to_peer_store() {
    let source = shared_store();
    let sink = shared_store();

    let sent = AttitudeState {
        q: [0.9239, 0.3827, 0.0, 0.0],
        roll_deg: 45.0,
        pitch_deg: 0.0,
        yaw_deg: 0.0,
    };
    source.with_mut(|s| s.set_object(&sent).unwrap());

    // Encode the source instance exactly as the telemetry path would.
    let mut payload = [0u8; MAX_OBJECT_SIZE];
    let n = source.with(|s| s.get(AttitudeState::ID, 0, &mut payload).unwrap());
    let mut frame_buf = [0u8; 64];
    let frame_len = writer::encode(
        &mut frame_buf,
        PacketType::Obj,
        AttitudeState::ID,
        0,
        true,
        &payload[..n],
    )
    .unwrap();

    // Walk the wire image byte-at-a-time into the receiving store.
    let mut parser = Parser::new();
    let mut applied = false;
    for &b in &frame_buf[..frame_len] {
        if let ParseStatus::Complete(frame) = sink.with(|s| parser.process_byte(b, s)) {
            sink.with_mut(|s| s.set(frame.object, frame.instance, &frame.payload).unwrap());
            applied = true;
        }
    }
    assert!(applied);

    let got: AttitudeState = sink.with(|s| s.get_object().unwrap());
    assert_eq!(got, sent);

    let stats = parser.stats();
    assert_eq!(stats.rx_bytes, frame_len as u32);
    assert_eq!(stats.rx_crc_errors, 0);
    assert_eq!(stats.rx_sync_errors, 0);
}

#[test]
fn parser_recovers_between_back_to_back_frames_with_noise() {
    let source = shared_store();
    let sink = shared_store();

    source.with_mut(|s| {
        s.set_object(&GyroState {
            x: 1.0,
            y: -2.0,
            z: 3.0,
        })
        .unwrap()
    });

    let mut payload = [0u8; MAX_OBJECT_SIZE];
    let n = source.with(|s| s.get(GyroState::ID, 0, &mut payload).unwrap());
    let mut frame_buf = [0u8; 64];
    let frame_len = writer::encode(
        &mut frame_buf,
        PacketType::Obj,
        GyroState::ID,
        0,
        true,
        &payload[..n],
    )
    .unwrap();

    // Two good frames separated by line noise.
    let mut wire = Vec::new();
    wire.extend_from_slice(&frame_buf[..frame_len]);
    wire.extend_from_slice(&[0xFF, 0x00, 0x3C, 0x99]);
    wire.extend_from_slice(&frame_buf[..frame_len]);

    let mut parser = Parser::new();
    let mut complete = 0;
    for &b in &wire {
        if let ParseStatus::Complete(frame) = sink.with(|s| parser.process_byte(b, s)) {
            sink.with_mut(|s| s.set(frame.object, frame.instance, &frame.payload).unwrap());
            complete += 1;
        }
    }
    assert_eq!(complete, 2);
    assert!(parser.stats().rx_sync_errors > 0);

    let got: GyroState = sink.with(|s| s.get_object().unwrap());
    assert_eq!(got.y, -2.0);
}

#[test]
fn acked_settings_cross_a_link_pair() {
    static A_TO_B: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
    static B_TO_A: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
    let (a, b) = ChannelTransport::pair(&A_TO_B, &B_TO_A);
    let controller = Link::new(a);
    let ground = Link::new(b);
    let controller_store = shared_store();
    let ground_store = shared_store();

    let tuned = AttitudeSettings {
        accel_kp: 0.08,
        accel_ki: 0.0002,
        yaw_bias_rate: 1e-6,
        accel_tau: 0.1,
        board_rotation_deg: [0.0, 0.0, 90.0],
        zero_during_arming: false,
        bias_correct_gyro: true,
        trim_flight: TrimFlight::Normal,
    };

    block_on(async {
        controller_store.with_mut(|s| s.set_object(&tuned).unwrap());

        let mut ground_parser = Parser::new();
        let mut controller_parser = Parser::new();
        let (send_res, ()) = embassy_futures::join::join(
            controller.send_object(&controller_store, AttitudeSettings::ID, 0, true),
            async {
                let bytes = drain(ground.transport()).await;
                pump(&ground, &ground_store, &mut ground_parser, &bytes).await;
                let reply = drain(controller.transport()).await;
                pump(&controller, &controller_store, &mut controller_parser, &reply).await;
            },
        )
        .await;
        send_res.unwrap();
    });

    let got: AttitudeSettings = ground_store.with(|s| s.get_object().unwrap());
    assert_eq!(got.accel_kp, 0.08);
    assert_eq!(got.board_rotation_deg[2], 90.0);
    assert_eq!(got.trim_flight, TrimFlight::Normal);
}

#[test]
fn object_request_pulls_state_from_the_peer() {
    static A_TO_B: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
    static B_TO_A: Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH> = Channel::new();
    let (a, b) = ChannelTransport::pair(&A_TO_B, &B_TO_A);
    let requester = Link::new(a);
    let holder = Link::new(b);
    let requester_store = shared_store();
    let holder_store = shared_store();

    block_on(async {
        holder_store.with_mut(|s| {
            s.set_object(&GyroState {
                x: 4.5,
                y: 0.0,
                z: -1.25,
            })
            .unwrap()
        });

        let mut holder_parser = Parser::new();
        let mut requester_parser = Parser::new();
        let (req_res, ()) = embassy_futures::join::join(
            requester.send_object_request(&requester_store, GyroState::ID, 0),
            async {
                // Holder sees the ObjReq and answers with the object.
                let bytes = drain(holder.transport()).await;
                pump(&holder, &holder_store, &mut holder_parser, &bytes).await;
                // The Obj reply resolves the requester's pending wait.
                let reply = drain(requester.transport()).await;
                pump(&requester, &requester_store, &mut requester_parser, &reply).await;
            },
        )
        .await;
        req_res.unwrap();
    });

    let got: GyroState = requester_store.with(|s| s.get_object().unwrap());
    assert_eq!(got.x, 4.5);
    assert_eq!(got.z, -1.25);
}
