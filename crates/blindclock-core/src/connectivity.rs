//! Connectivity observation and the emergency latch.
//!
//! The monitor itself is a pure latch fed by observations; the HTTP
//! probe produces those observations on the runtime's cadence. A probe
//! failure is an "offline" observation, never an error.

use std::time::Duration;

use crate::error::SyncError;

/// Online/offline transition derived from an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityChange {
    WentOffline,
    CameOnline,
}

/// Latching connectivity state.
///
/// `is_emergency_mode` latches true after any observed disconnect and
/// stays set until explicitly cleared, even after the link returns.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    online: bool,
    emergency: bool,
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self {
            online: true,
            emergency: false,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn is_emergency_mode(&self) -> bool {
        self.emergency
    }

    /// Feed one observation; returns the transition if state changed.
    pub fn observe(&mut self, online: bool) -> Option<ConnectivityChange> {
        if online == self.online {
            return None;
        }
        self.online = online;
        if online {
            Some(ConnectivityChange::CameOnline)
        } else {
            self.emergency = true;
            Some(ConnectivityChange::WentOffline)
        }
    }

    /// Explicitly acknowledge the disconnect and drop the latch.
    pub fn clear_emergency(&mut self) {
        self.emergency = false;
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic reachability probe.
pub struct HttpProbe {
    client: reqwest::Client,
    url: url::Url,
}

impl HttpProbe {
    /// Build a probe against the configured endpoint.
    ///
    /// # Errors
    /// Returns an error if the URL does not parse.
    pub fn new(probe_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let url = url::Url::parse(probe_url).map_err(|e| SyncError::InvalidProbeUrl {
            url: probe_url.to_string(),
            message: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidProbeUrl {
                url: probe_url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client, url })
    }

    /// One reachability check. Any response counts as online.
    pub async fn check(&self) -> bool {
        match self.client.head(self.url.clone()).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "connectivity probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emergency_latches_across_reconnect() {
        let mut monitor = ConnectivityMonitor::new();
        assert!(monitor.is_online());
        assert!(!monitor.is_emergency_mode());

        assert_eq!(
            monitor.observe(false),
            Some(ConnectivityChange::WentOffline)
        );
        assert!(monitor.is_emergency_mode());

        assert_eq!(monitor.observe(true), Some(ConnectivityChange::CameOnline));
        assert!(monitor.is_online());
        // Still latched until explicitly cleared.
        assert!(monitor.is_emergency_mode());

        monitor.clear_emergency();
        assert!(!monitor.is_emergency_mode());
    }

    #[test]
    fn repeated_observations_produce_no_transition() {
        let mut monitor = ConnectivityMonitor::new();
        assert!(monitor.observe(true).is_none());
        monitor.observe(false);
        assert!(monitor.observe(false).is_none());
    }

    #[tokio::test]
    async fn probe_reports_online_for_any_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("HEAD", "/generate_204")
            .with_status(204)
            .create_async()
            .await;

        let probe = HttpProbe::new(
            &format!("{}/generate_204", server.url()),
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(probe.check().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn probe_reports_offline_on_connection_error() {
        // Nothing listens on this port.
        let probe = HttpProbe::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(!probe.check().await);
    }

    #[test]
    fn probe_rejects_invalid_url() {
        assert!(HttpProbe::new("not a url", Duration::from_secs(1)).is_err());
    }
}
