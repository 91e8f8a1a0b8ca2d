//! Per-channel connection state.

use std::sync::atomic::{AtomicU8, Ordering};

/// Connection state of one WebSocket channel.
///
/// The order-event channel never enters `Authenticating`: its credential is a
/// handshake header, so a completed transport open is already authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelState {
    Disconnected = 0,
    Connecting = 1,
    Authenticating = 2,
    Open = 3,
    /// Deliberate teardown in progress; suppresses automatic reconnects.
    Closing = 4,
}

impl ChannelState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Authenticating,
            3 => Self::Open,
            4 => Self::Closing,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Lock-free cell holding a [`ChannelState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: ChannelState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> ChannelState {
        ChannelState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ChannelState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Transition `from → to` only if the cell currently holds `from`.
    pub fn transition(&self, from: ChannelState, to: ChannelState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move a live or opening channel to `Disconnected` after the transport
    /// ended. `Closing` and `Disconnected` are left alone. Returns whether the
    /// state changed.
    pub fn mark_lost(&self) -> bool {
        [
            ChannelState::Connecting,
            ChannelState::Authenticating,
            ChannelState::Open,
        ]
        .into_iter()
        .any(|from| self.transition(from, ChannelState::Disconnected))
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(ChannelState::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_only_from_expected_state() {
        let cell = StateCell::default();
        assert!(!cell.transition(ChannelState::Open, ChannelState::Disconnected));
        assert!(cell.transition(ChannelState::Disconnected, ChannelState::Connecting));
        assert_eq!(cell.get(), ChannelState::Connecting);
        cell.set(ChannelState::Closing);
        assert!(!cell.transition(ChannelState::Open, ChannelState::Disconnected));
        assert_eq!(cell.get(), ChannelState::Closing);
    }

    #[test]
    fn lost_transport_never_leaves_closing() {
        let cell = StateCell::new(ChannelState::Closing);
        assert!(!cell.mark_lost());
        assert_eq!(cell.get(), ChannelState::Closing);

        for live in [
            ChannelState::Connecting,
            ChannelState::Authenticating,
            ChannelState::Open,
        ] {
            cell.set(live);
            assert!(cell.mark_lost());
            assert_eq!(cell.get(), ChannelState::Disconnected);
        }
        assert!(!cell.mark_lost());
    }
}
