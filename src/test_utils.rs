// SPDX-License-Identifier: MIT OR Apache-2.0

//! Peers and an in-memory transport for tests.
use std::convert::Infallible;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing_subscriber::EnvFilter;

use crate::identity::{PrivateKey, PublicKey};
use crate::manager::Manager;
use crate::node::Node;
use crate::record::{Filter, Record};
use crate::traits::Transport;

/// Prints `tracing` output of tests when `RUST_LOG` is set.
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }
}

/// Deterministic private key derived from a seed byte.
pub fn private_key(seed: u8) -> PrivateKey {
    PrivateKey::from_bytes(&[seed; 32])
}

pub struct TestPeer {
    pub private_key: PrivateKey,
    pub manager: Manager,
}

impl TestPeer {
    pub fn new(seed: u8) -> Self {
        let private_key = private_key(seed);
        Self {
            manager: Manager::from_private_key(private_key.clone()),
            private_key,
        }
    }

    pub fn id(&self) -> PublicKey {
        self.private_key.public_key()
    }
}

/// Broadcasts published records to every subscriber with a matching filter.
///
/// Records published before a subscription was opened are replayed to it, as if the subscriber
/// synced with the network.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    log: Arc<Mutex<Vec<Record>>>,
    subscribers: Arc<Mutex<Vec<(Filter, mpsc::UnboundedSender<Record>)>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node for a test peer connected to this transport.
    pub fn node(&self, seed: u8) -> Node<MemoryTransport> {
        Node::new(TestPeer::new(seed).manager, self.clone())
    }
}

impl Transport for MemoryTransport {
    type Error = Infallible;

    async fn publish(&self, record: &Record) -> Result<(), Self::Error> {
        self.log.lock().await.push(record.clone());
        self.subscribers
            .lock()
            .await
            .retain(|(filter, tx)| !filter.matches(record) || tx.send(record.clone()).is_ok());
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: Filter,
    ) -> Result<mpsc::UnboundedReceiver<Record>, Self::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        for record in self.log.lock().await.iter() {
            if filter.matches(record) {
                let _ = tx.send(record.clone());
            }
        }
        self.subscribers.lock().await.push((filter, tx));
        Ok(rx)
    }
}
