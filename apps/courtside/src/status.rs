//! Connectivity signal for degraded-mode UI.

use tokio::sync::watch;

use crate::connection::ConnectionState;
use crate::metrics;

/// Read side handed to UI consumers. `connected` only changes on explicit
/// channel open/close transitions.
#[derive(Clone)]
pub struct StatusObserver {
    connected: watch::Receiver<bool>,
    state: watch::Receiver<ConnectionState>,
}

impl StatusObserver {
    pub fn connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Resolves once `connected` equals `expected`. Returns false if the
    /// session was torn down first.
    pub async fn wait_for(&self, expected: bool) -> bool {
        let mut rx = self.connected.clone();
        let reached = rx.wait_for(|connected| *connected == expected).await.is_ok();
        reached
    }
}

pub(crate) struct StatusPublisher {
    connected: watch::Sender<bool>,
    state: watch::Sender<ConnectionState>,
}

impl StatusPublisher {
    pub(crate) fn set_connected(&self, value: bool) {
        let changed = self.connected.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
        if changed {
            metrics::CONNECTED.set(i64::from(value));
        }
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

pub(crate) fn status_channel() -> (StatusPublisher, StatusObserver) {
    let (connected_tx, connected_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    (
        StatusPublisher {
            connected: connected_tx,
            state: state_tx,
        },
        StatusObserver {
            connected: connected_rx,
            state: state_rx,
        },
    )
}
