//! Pending delivery receipts keyed by the provider's tracking id.
//!
//! An entry exists from the moment an SMS is sent for an XMPP message that asked for a
//! receipt until the provider reports that SMS delivered.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::xmpp::XmppMessage;

/// Tracking id -> receipt to emit on delivery. Clones share the same table.
#[derive(Clone, Default)]
pub struct ReceiptTable {
    inner: Arc<RwLock<HashMap<String, XmppMessage>>>,
}

impl ReceiptTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the receipt for `id`. A second put for the same id replaces the first.
    pub async fn put(&self, id: impl Into<String>, receipt: XmppMessage) {
        let id = id.into();
        if self.inner.write().await.insert(id.clone(), receipt).is_some() {
            log::warn!("receipts: tracking id {} was already pending; replaced", id);
        }
    }

    /// Remove and return the receipt for `id`, if any.
    pub async fn take(&self, id: &str) -> Option<XmppMessage> {
        self.inner.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
