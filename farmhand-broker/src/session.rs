//! Farm client session
//!
//! The farm client is opened lazily, on the first call that needs it, and
//! shared by every job after that. A failed connect is not cached, so the
//! next submission tries again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use farmhand_client::{ClientError, FarmClient, FarmConnector};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Lazily opened, shared farm client
pub struct FarmSession {
    connector: Arc<dyn FarmConnector>,
    client: Mutex<Option<Arc<dyn FarmClient>>>,
    closed: AtomicBool,
}

impl FarmSession {
    pub fn new(connector: Arc<dyn FarmConnector>) -> Self {
        Self {
            connector,
            client: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the shared client, connecting first if needed
    ///
    /// Every failure is reported as [`ClientError::Unavailable`]: without a
    /// client there is nothing a retry of the farm call could fix.
    pub async fn acquire(&self) -> Result<Arc<dyn FarmClient>, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Unavailable("farm session is shut down".to_string()));
        }

        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }

        let client = match self.connector.connect().await {
            Ok(client) => client,
            Err(ClientError::Unavailable(message)) => {
                warn!("Farm client unavailable: {}", message);
                return Err(ClientError::Unavailable(message));
            }
            Err(e) => {
                warn!("Could not open farm session: {}", e);
                return Err(ClientError::Unavailable(e.to_string()));
            }
        };

        info!("Farm session opened");
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drops the client; later calls fail as unavailable
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.client.lock().await.take().is_some() {
            info!("Farm session closed");
        }
    }
}

impl std::fmt::Debug for FarmSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FarmSession")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use farmhand_core::domain::job::RemoteJobId;
    use farmhand_core::domain::submission::ErrorKind;
    use farmhand_core::dto::descriptor::FarmJobDescriptor;
    use farmhand_core::dto::status::StatusSnapshot;
    use std::sync::atomic::AtomicUsize;

    struct NullFarm;

    #[async_trait]
    impl FarmClient for NullFarm {
        async fn submit_job(&self, _: &FarmJobDescriptor) -> farmhand_client::Result<RemoteJobId> {
            Ok(RemoteJobId::from("1"))
        }
        async fn query_status(&self, _: &RemoteJobId) -> farmhand_client::Result<StatusSnapshot> {
            Err(ClientError::Rejected("unused".into()))
        }
        async fn cancel_job(&self, _: &RemoteJobId) -> farmhand_client::Result<()> {
            Ok(())
        }
        async fn list_pools(&self) -> farmhand_client::Result<Vec<String>> {
            Ok(vec![])
        }
    }

    /// Fails the first `failures` connects, then succeeds
    struct FlakyConnector {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FarmConnector for FlakyConnector {
        async fn connect(&self) -> farmhand_client::Result<Arc<dyn FarmClient>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ClientError::Unreachable("no route".into()))
            } else {
                Ok(Arc::new(NullFarm))
            }
        }
    }

    #[tokio::test]
    async fn test_connects_once_and_reuses() {
        let connector = Arc::new(FlakyConnector {
            failures: 0,
            calls: AtomicUsize::new(0),
        });
        let session = FarmSession::new(connector.clone());

        session.acquire().await.unwrap();
        session.acquire().await.unwrap();
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_is_unavailable_and_retried() {
        let connector = Arc::new(FlakyConnector {
            failures: 1,
            calls: AtomicUsize::new(0),
        });
        let session = FarmSession::new(connector.clone());

        let err = session.acquire().await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ClientUnavailable);
        assert!(session.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_calls() {
        let session = FarmSession::new(Arc::new(FlakyConnector {
            failures: 0,
            calls: AtomicUsize::new(0),
        }));
        session.acquire().await.unwrap();
        session.shutdown().await;

        assert!(session.is_closed());
        assert!(session.acquire().await.is_err());
    }
}
