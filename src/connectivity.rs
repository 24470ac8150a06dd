//! Online/offline state shared by the pipeline, the executor, and the
//! offline-queue drain task.
//!
//! Purely event-driven: the embedding platform reports transitions through
//! `set_online` / `set_offline`, nothing polls. Going offline only flips the
//! flag; in-flight operations are not cancelled. Going online wakes the
//! subscribed drain task.

use tokio::sync::watch;

#[derive(Debug)]
pub struct ConnectivityMonitor {
    // true = online
    state: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self { state }
    }

    /// Monitor that starts online.
    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn is_offline(&self) -> bool {
        !*self.state.borrow()
    }

    /// Report a platform transition to online. No-op when already online.
    pub fn set_online(&self) {
        let changed = self.state.send_if_modified(|online| {
            if *online {
                false
            } else {
                *online = true;
                true
            }
        });
        if changed {
            tracing::info!("Connectivity restored");
        }
    }

    /// Report a platform transition to offline. No-op when already offline.
    pub fn set_offline(&self) {
        let changed = self.state.send_if_modified(|online| {
            if *online {
                *online = false;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!("Connectivity lost");
        }
    }

    /// Receiver observing transitions; the current value is `true` when
    /// online.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::online()
    }
}
