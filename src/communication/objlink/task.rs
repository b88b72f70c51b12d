//! Telemetry task loops
//!
//! Three long-running loops tie the protocol pieces together:
//! - [`run_engine_loop`]: pumps periodic timers and dispatches queued
//!   events. Priority events drain to exhaustion before each standard
//!   event so settings traffic is never starved by sensor streams.
//! - [`run_rx_task`]: feeds transport bytes through the frame parser and
//!   hands complete frames to the link.
//! - [`run_control_rx`]: same receive path for the auxiliary control bus,
//!   but with a hard silence deadline. A quiet or signal-lost control
//!   link forces a disarm.
//!
//! The loops are plain `async fn`s so the target binary can wrap them in
//! whatever executor task macros it uses.

use embassy_sync::channel::{DynamicReceiver, DynamicSender};
use embassy_time::{with_timeout, Duration, Instant, Timer};

use crate::objects::{ArmedState, FlightStatus, SharedStore, UpdateEvent};
use crate::{log_info, log_warn};

use super::connection::Link;
use super::engine::{LogSink, TelemetryEngine};
use super::parser::{ParseStatus, Parser};
use super::transport::{Transport, TransportError};

/// Receive poll interval for telemetry links.
pub const RX_POLL_MS: u64 = 500;
/// Control-bus silence budget before a forced disarm.
pub const AUX_SILENCE_MS: u64 = 100;

/// Dispatch loop of the telemetry engine.
pub async fn run_engine_loop<T: Transport, L: LogSink>(
    engine: &mut TelemetryEngine<'_, T, L>,
    store: &SharedStore,
    priority_rx: DynamicReceiver<'static, UpdateEvent>,
    standard_rx: DynamicReceiver<'static, UpdateEvent>,
    standard_tx: DynamicSender<'static, UpdateEvent>,
) -> ! {
    loop {
        let now_ms = Instant::now().as_millis();
        engine.pump_periodic(now_ms, |ev| {
            if standard_tx.try_send(ev).is_err() {
                log_warn!("periodic event dropped, queue full");
            }
        });

        while let Ok(ev) = priority_rx.try_receive() {
            engine.process_event(store, ev, Instant::now().as_millis()).await;
        }

        if let Ok(ev) = standard_rx.try_receive() {
            engine.process_event(store, ev, Instant::now().as_millis()).await;
        }

        // Idle for at most one tick on the priority queue so fresh
        // settings traffic wakes us immediately; standard events wait for
        // the next pass.
        if let Ok(ev) = with_timeout(Duration::from_millis(1), priority_rx.receive()).await {
            engine.process_event(store, ev, Instant::now().as_millis()).await;
        }
    }
}

/// Receive loop for one telemetry link.
pub async fn run_rx_task<T: Transport>(link: &Link<T>, store: &SharedStore) -> ! {
    let mut parser = Parser::new();
    let mut buf = [0u8; 64];
    loop {
        match with_timeout(
            Duration::from_millis(RX_POLL_MS),
            link.transport().read(&mut buf),
        )
        .await
        {
            Ok(Ok(n)) => {
                feed(link, store, &mut parser, &buf[..n]).await;
                link.absorb_stats(&parser.take_stats());
            }
            Ok(Err(_)) => {
                log_warn!("telemetry rx transport error");
                Timer::after(Duration::from_millis(RX_POLL_MS)).await;
            }
            // Poll timeout: nothing received, keep listening.
            Err(_) => {}
        }
    }
}

/// Receive loop for the auxiliary control bus, with loss-of-signal
/// protection.
pub async fn run_control_rx<T: Transport>(link: &Link<T>, store: &SharedStore) -> ! {
    let mut parser = Parser::new();
    let mut buf = [0u8; 64];
    let mut signal_ok = false;
    loop {
        match with_timeout(
            Duration::from_millis(AUX_SILENCE_MS),
            link.transport().read(&mut buf),
        )
        .await
        {
            Ok(Ok(n)) => {
                if !signal_ok {
                    log_info!("control link up");
                    signal_ok = true;
                }
                feed(link, store, &mut parser, &buf[..n]).await;
                link.absorb_stats(&parser.take_stats());
            }
            Ok(Err(TransportError::SignalLost)) | Err(_) => {
                if signal_ok {
                    log_warn!("control link lost, forcing disarm");
                    signal_ok = false;
                }
                force_disarm(store);
            }
            Ok(Err(_)) => {
                log_warn!("control rx transport error");
            }
        }
    }
}

async fn feed<T: Transport>(
    link: &Link<T>,
    store: &SharedStore,
    parser: &mut Parser,
    bytes: &[u8],
) {
    for &b in bytes {
        let status = store.with(|s| parser.process_byte(b, s));
        if let ParseStatus::Complete(frame) = status {
            if link.handle_frame(store, &frame).await.is_err() {
                log_warn!("inbound frame rejected for object {}", frame.object.0);
            }
        }
    }
}

/// Drop to `Disarmed` regardless of the current state.
pub fn force_disarm(store: &SharedStore) {
    store.with_mut(|s| {
        if let Ok(mut status) = s.get_object::<FlightStatus>() {
            if status.armed != ArmedState::Disarmed {
                status.armed = ArmedState::Disarmed;
                let _ = s.set_object(&status);
            }
        }
    });
}
