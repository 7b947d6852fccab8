//! Wallet change notifications

use crate::core::{Transaction, TxHash};
use std::sync::{Arc, Weak};

/// Receives balance and transaction changes
///
/// Called only after the wallet lock has been released, so a listener may
/// query the wallet from inside a callback.
pub trait WalletListener: Send + Sync {
    fn on_balance_changed(&self, balance: u64);

    fn on_tx_added(&self, tx: &Transaction);

    fn on_tx_updated(&self, hash: &TxHash, block_height: u32, timestamp: u32);

    /// `notify_user` is set when the removed transaction was valid and spent
    /// wallet funds; `recommend_rescan` additionally needs every parent it
    /// spends to be confirmed.
    fn on_tx_deleted(&self, hash: &TxHash, notify_user: bool, recommend_rescan: bool);
}

/// Non-owning handle to a listener
///
/// Every notification is a no-op once the listener has been dropped.
#[derive(Clone, Default)]
pub struct ListenerRef {
    inner: Option<Weak<dyn WalletListener>>,
}

impl ListenerRef {
    pub fn new(listener: &Arc<dyn WalletListener>) -> Self {
        Self {
            inner: Some(Arc::downgrade(listener)),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    fn upgrade(&self) -> Option<Arc<dyn WalletListener>> {
        self.inner.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_alive(&self) -> bool {
        self.upgrade().is_some()
    }

    pub fn balance_changed(&self, balance: u64) {
        if let Some(listener) = self.upgrade() {
            listener.on_balance_changed(balance);
        }
    }

    pub fn tx_added(&self, tx: &Transaction) {
        if let Some(listener) = self.upgrade() {
            listener.on_tx_added(tx);
        }
    }

    pub fn tx_updated(&self, hash: &TxHash, block_height: u32, timestamp: u32) {
        if let Some(listener) = self.upgrade() {
            listener.on_tx_updated(hash, block_height, timestamp);
        }
    }

    pub fn tx_deleted(&self, hash: &TxHash, notify_user: bool, recommend_rescan: bool) {
        if let Some(listener) = self.upgrade() {
            listener.on_tx_deleted(hash, notify_user, recommend_rescan);
        }
    }
}

/// Events recorded by [`RecordingListener`]
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Balance(u64),
    Added(TxHash),
    Updated(TxHash, u32, u32),
    Deleted(TxHash, bool, bool),
}

/// Listener that records every callback, for tests
#[cfg(test)]
#[derive(Default)]
pub struct RecordingListener {
    pub events: std::sync::Mutex<Vec<Event>>,
}

#[cfg(test)]
impl RecordingListener {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl WalletListener for RecordingListener {
    fn on_balance_changed(&self, balance: u64) {
        self.events.lock().unwrap().push(Event::Balance(balance));
    }

    fn on_tx_added(&self, tx: &Transaction) {
        self.events.lock().unwrap().push(Event::Added(tx.hash()));
    }

    fn on_tx_updated(&self, hash: &TxHash, block_height: u32, timestamp: u32) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Updated(*hash, block_height, timestamp));
    }

    fn on_tx_deleted(&self, hash: &TxHash, notify_user: bool, recommend_rescan: bool) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Deleted(*hash, notify_user, recommend_rescan));
    }
}
