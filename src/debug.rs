//! Debug receiver (spec.md §4.C): a cancellable background thread bound to
//! the debug UDP port, dispatching decoded frames to a caller-supplied
//! handler. Cancellation closes the socket so a thread blocked in `recv`
//! wakes with an error instead of hanging forever.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the receiver thread wakes from a blocked `recv` to check for
/// cancellation. `std::net::UdpSocket` has no asynchronous interrupt, so a
/// short read timeout is the only portable way to bound cancellation
/// latency while still blocking between checks.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(200);

use crate::constants::SPINNAKER_DEBUG_OUTPUT_PORT;
use crate::error::{LoaderError, Result};
use crate::wire::{SdpRespHeader, SDP_RESP_HEADER_LEN};

/// One decoded debug frame.
#[derive(Debug, Clone)]
pub struct DebugMessage {
    pub chip_x: u32,
    pub chip_y: u32,
    pub core_id: u32,
    pub text: String,
}

/// The three host-command classes §4.C's callback must distinguish.
#[derive(Debug, Clone)]
pub enum DebugEvent {
    Exit { msg: DebugMessage, text: String },
    Ticks { msg: DebugMessage, count: u64 },
    Shutdown { msg: DebugMessage, millis: u64 },
    Line { msg: DebugMessage },
}

/// Classifies a stripped debug line into one of §4.C's host-command forms.
#[must_use]
pub fn classify(msg: DebugMessage) -> DebugEvent {
    if let Some(rest) = msg.text.strip_prefix("HOSTCMD:exit ") {
        let text = rest.to_string();
        return DebugEvent::Exit { msg, text };
    }
    if let Some(rest) = msg.text.strip_prefix("HOSTCMD:ticks ") {
        if let Ok(count) = rest.trim().parse() {
            return DebugEvent::Ticks { msg, count };
        }
    }
    if let Some(rest) = msg.text.strip_prefix("HOSTCMD:shutdown ") {
        if let Ok(millis) = rest.trim().parse() {
            return DebugEvent::Shutdown { msg, millis };
        }
    }
    DebugEvent::Line { msg }
}

/// Owns the debug socket and the background thread reading it.
pub struct DebugReceiver {
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DebugReceiver {
    /// Binds `0.0.0.0:SPINNAKER_DEBUG_OUTPUT_PORT` and spawns the receiver
    /// thread, which calls `on_event` for every decoded frame until cancelled.
    ///
    /// # Errors
    /// [`LoaderError::SocketCreate`]/[`LoaderError::SocketBind`] if the
    /// socket cannot be created or bound.
    pub fn spawn(on_event: impl Fn(DebugEvent) + Send + 'static) -> Result<Self> {
        let addr = format!("0.0.0.0:{SPINNAKER_DEBUG_OUTPUT_PORT}");
        let socket = UdpSocket::bind(&addr).map_err(|source| LoaderError::SocketBind { addr: addr.clone(), source })?;
        socket
            .set_read_timeout(Some(CANCEL_POLL_INTERVAL))
            .map_err(|source| LoaderError::SocketBind { addr, source })?;
        let cancelled = Arc::new(AtomicBool::new(false));
        let thread_cancelled = Arc::clone(&cancelled);

        let handle = thread::spawn(move || {
            let mut buf = [0_u8; 2048];
            loop {
                if thread_cancelled.load(Ordering::Acquire) {
                    return;
                }
                match socket.recv_from(&mut buf) {
                    Ok((n, _src)) => {
                        if let Some(msg) = decode_frame(&buf[..n]) {
                            on_event(classify(msg));
                        }
                    }
                    Err(_) => {
                        if thread_cancelled.load(Ordering::Acquire) {
                            return;
                        }
                    }
                }
            }
        });

        Ok(Self { cancelled, handle: Some(handle) })
    }

    /// Signals cancellation and joins the background thread. The socket
    /// itself is dropped when the thread returns, closing it.
    pub fn shutdown(mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn decode_frame(frame: &[u8]) -> Option<DebugMessage> {
    let hdr = SdpRespHeader::decode(frame)?;
    let (chip_x, chip_y, core_id) = hdr.source_address();
    let payload = &frame[frame.len().min(SDP_RESP_HEADER_LEN)..];
    let text = String::from_utf8_lossy(payload)
        .trim_end_matches(['\n', '\0'])
        .to_string();
    Some(DebugMessage { chip_x, chip_y, core_id, text })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> DebugMessage {
        DebugMessage { chip_x: 0, chip_y: 0, core_id: 1, text: text.to_string() }
    }

    #[test]
    fn classifies_exit_command() {
        match classify(msg("HOSTCMD:exit all done")) {
            DebugEvent::Exit { text, .. } => assert_eq!(text, "all done"),
            other => panic!("expected Exit, got {other:?}"),
        }
    }

    #[test]
    fn classifies_ticks_command() {
        match classify(msg("HOSTCMD:ticks 42")) {
            DebugEvent::Ticks { count, .. } => assert_eq!(count, 42),
            other => panic!("expected Ticks, got {other:?}"),
        }
    }

    #[test]
    fn s6_classifies_shutdown_command() {
        match classify(msg("HOSTCMD:shutdown 4200")) {
            DebugEvent::Shutdown { millis, .. } => assert_eq!(millis, 4200),
            other => panic!("expected Shutdown, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_line_passes_through() {
        match classify(msg("plain debug text")) {
            DebugEvent::Line { msg } => assert_eq!(msg.text, "plain debug text"),
            other => panic!("expected Line, got {other:?}"),
        }
    }
}
