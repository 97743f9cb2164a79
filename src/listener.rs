//! UDP ingestion of decoder datagrams.

use std::collections::HashSet;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::ListenerConfig, database::MessageStore, errors::AcarsRecorderError,
    models::RawAcarsMessage,
};

/// Outcome of one datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Stored under the given id
    Stored(i64),
    /// Housekeeping label, not stored
    Ignored,
}

/// Receives one JSON message per datagram and stores it.
///
/// Datagrams are handled one at a time in arrival order. A bad datagram
/// is logged and dropped.
pub struct Listener<S> {
    socket: UdpSocket,
    store: S,
    ignored_labels: HashSet<String>,
    buffer_size: usize,
}

impl<S: MessageStore> Listener<S> {
    pub async fn bind(config: &ListenerConfig, store: S) -> Result<Self, AcarsRecorderError> {
        config.validate()?;
        let socket = UdpSocket::bind(config.bind)
            .await
            .map_err(|source| AcarsRecorderError::BindError {
                addr: config.bind,
                source,
            })?;
        info!("Listening for ACARS datagrams on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            store,
            ignored_labels: config.ignored_labels.iter().cloned().collect(),
            buffer_size: config.max_datagram_size,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AcarsRecorderError> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until `shutdown` is cancelled, then release the socket
    pub async fn run(self, shutdown: CancellationToken) {
        let mut buffer = vec![0_u8; self.buffer_size];

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Listener shutting down");
                    break;
                }
                recv = self.socket.recv_from(&mut buffer) => {
                    let (received, source) = match recv {
                        Ok(result) => result,
                        Err(e) => {
                            warn!("UDP receive error: {}", e);
                            continue;
                        }
                    };
                    if received == 0 {
                        continue;
                    }

                    match self.process_datagram(&buffer[..received]).await {
                        Ok(Ingested::Stored(id)) => debug!("Stored message {} from {}", id, source),
                        Ok(Ingested::Ignored) => {}
                        Err(e) => warn!("Dropped datagram from {}: {}", source, e),
                    }
                }
            }
        }
    }

    /// Decode, filter, normalize and store one datagram payload
    pub async fn process_datagram(&self, payload: &[u8]) -> Result<Ingested, AcarsRecorderError> {
        let raw = RawAcarsMessage::from_datagram(payload)?;
        if self.ignored_labels.contains(&raw.label) {
            debug!("Ignored housekeeping label {}", raw.label);
            return Ok(Ingested::Ignored);
        }

        let message = raw.normalize()?;
        let id = self.store.insert(&message).await?;
        Ok(Ingested::Stored(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{database::Database, filter::Predicate};
    use std::time::Duration;
    use tempfile::tempdir;

    fn listener_config() -> ListenerConfig {
        ListenerConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            ignored_labels: vec!["_d".to_string(), "SQ".to_string()],
            max_datagram_size: 65_535,
        }
    }

    const H1: &str = r#"{"timestamp": 1718000123.5, "freq": 131.45, "level": -14.2, "error": 0,
        "mode": "2", "label": "H1", "ack": false, "tail": ".JA801A", "text": "POS",
        "app": {"name": "acarsdec", "ver": "3.7"}}"#;

    #[tokio::test]
    async fn test_process_datagram() -> Result<(), AcarsRecorderError> {
        let temp_dir = tempdir()?;
        let db = Database::open(&temp_dir.path().join("test.db"), 2, Duration::from_secs(5)).await?;
        let listener = Listener::bind(&listener_config(), db.clone()).await?;

        assert!(matches!(
            listener.process_datagram(H1.as_bytes()).await?,
            Ingested::Stored(_)
        ));
        let link_test = H1.replace("\"H1\"", "\"_d\"");
        assert_eq!(
            listener.process_datagram(link_test.as_bytes()).await?,
            Ingested::Ignored
        );
        assert!(matches!(
            listener.process_datagram(b"{not json").await,
            Err(AcarsRecorderError::NormalizationError(_))
        ));

        let rows = db.fetch(&Predicate::default(), None, 0, 10).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message.label, "H1");
        assert_eq!(rows[0].message.ack, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_until_cancelled() -> Result<(), AcarsRecorderError> {
        let temp_dir = tempdir()?;
        let db = Database::open(&temp_dir.path().join("test.db"), 2, Duration::from_secs(5)).await?;
        let listener = Listener::bind(&listener_config(), db.clone()).await?;
        let addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(listener.run(shutdown.clone()));

        let sender = UdpSocket::bind("127.0.0.1:0").await?;
        sender.send_to(b"garbage", addr).await?;
        sender.send_to(H1.as_bytes(), addr).await?;

        let mut stored = 0;
        for _ in 0..50 {
            stored = db.count_where(&Predicate::default()).await?;
            if stored == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(stored, 1);

        shutdown.cancel();
        handle.await.unwrap();
        Ok(())
    }
}
