//! Background task that drops expired sessions on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time;
use tracing::{debug, info};

use crgate_web::AppState;

/// Periodically prunes the session store until told to stop.
pub struct SessionSweeper {
    state: Arc<AppState>,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(state: Arc<AppState>, interval: Duration) -> Self {
        Self { state, interval }
    }

    /// Run one pass. Returns the number of sessions removed.
    pub async fn sweep(&self) -> usize {
        let pruned = self.state.sessions.prune_expired().await;
        if pruned > 0 {
            info!(pruned, "expired sessions removed");
        }
        pruned
    }

    /// Main loop. Returns once `shutdown` is notified.
    pub async fn run(self, shutdown: Arc<Notify>) {
        info!(interval_secs = self.interval.as_secs(), "session sweeper started");

        let mut interval = time::interval(self.interval);
        // The first tick fires immediately and there is nothing to prune yet.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.notified() => {
                    debug!("session sweeper stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crgate_core::config::AppConfig;
    use crgate_core::models::Identity;
    use crgate_core::roles::Role;

    fn state_with_ttl(ttl_secs: u64) -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.session.ttl_secs = ttl_secs;
        Arc::new(AppState::from_config(config).unwrap())
    }

    fn identity() -> Identity {
        Identity {
            username: "kevin".into(),
            display_name: "Kevin".into(),
            email: "kevin@company.com".into(),
            raw_groups: vec![],
            role: Role::Requester,
        }
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_sessions() {
        let state = state_with_ttl(3600);
        state.sessions.issue(identity()).await;

        let sweeper = SessionSweeper::new(state.clone(), Duration::from_secs(60));
        assert_eq!(sweeper.sweep().await, 0);
        assert_eq!(state.sessions.len().await, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let state = state_with_ttl(0);
        let shutdown = Arc::new(Notify::new());
        let sweeper = SessionSweeper::new(state, Duration::from_millis(10));

        let handle = tokio::spawn(sweeper.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.notify_one();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
