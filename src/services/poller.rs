use crate::detector::{self, Resync};
use crate::messages::{PollState, ProcessStatus};
use crate::services::supervisor::{SupervisorError, SupervisorHandle};
use crate::state::StateSource;
use crate::transcode::{self, HlsSettings, TranscodeJob};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub struct PollSettings {
    pub interval: Duration,
    pub media_template: String,
    pub hls: HlsSettings,
}

/// Drives the fetch → detect → resync cycle on a fixed cadence
///
/// Each tick runs to completion (including any resync) before the next sleep
/// starts. The last track acted upon lives here and nowhere else.
pub struct Poller {
    source: Box<dyn StateSource>,
    supervisor: SupervisorHandle,
    settings: PollSettings,
    state_tx: watch::Sender<PollState>,
    current_track: Option<String>,
    exit_reported: bool,
}

impl Poller {
    pub fn new(
        source: Box<dyn StateSource>,
        supervisor: SupervisorHandle,
        settings: PollSettings,
        state_tx: watch::Sender<PollState>,
    ) -> Self {
        Self {
            source,
            supervisor,
            settings,
            state_tx,
            current_track: None,
            exit_reported: false,
        }
    }

    /// Run until `cancel` fires or a launch fails
    ///
    /// The active transcode is stopped before this returns.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SupervisorError> {
        tracing::info!("Polling every {:?}", self.settings.interval);

        let result = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }

            let tick = tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                tick = self.tick() => tick,
            };
            if let Err(e) = tick {
                tracing::error!("Poll loop stopping: {}", e);
                break Err(e);
            }

            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        };

        self.shutdown().await;
        result
    }

    /// One poll cycle: fetch, detect, maybe resync
    pub async fn tick(&mut self) -> Result<(), SupervisorError> {
        let state = self.source.fetch().await;

        match detector::detect(self.current_track.as_deref(), state.as_ref()) {
            Some(resync) => self.resync(resync).await,
            None => self.check_process().await,
        }
    }

    pub fn current_track(&self) -> Option<&str> {
        self.current_track.as_deref()
    }

    async fn resync(&mut self, resync: Resync) -> Result<(), SupervisorError> {
        let source = transcode::media_url(&self.settings.media_template, &resync.track_id);
        tracing::info!(
            "Switching to track {} @ {:.2}s -> {}",
            resync.track_id,
            resync.start_offset,
            source
        );

        self.state_tx.send_replace(PollState::Resyncing);
        let job = TranscodeJob::hls(source, resync.start_offset, &self.settings.hls);
        let result = self.supervisor.start(job).await;
        self.state_tx.send_replace(PollState::Idle);
        result?;

        self.current_track = Some(resync.track_id);
        self.exit_reported = false;
        Ok(())
    }

    // A transcode that dies mid-track is not restarted: the track id is
    // unchanged, so the next resync only happens on the next track change.
    async fn check_process(&mut self) -> Result<(), SupervisorError> {
        if let ProcessStatus::Exited(status) = self.supervisor.status().await? {
            if !self.exit_reported {
                tracing::warn!(
                    "Transcode for track {} exited ({}); output will stay stale until the next track change",
                    self.current_track.as_deref().unwrap_or("?"),
                    status
                );
                self.exit_reported = true;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        tracing::info!(
            "Poll loop shutting down (last track: {})",
            self.current_track().unwrap_or("none")
        );
        if let Err(e) = self.supervisor.stop().await {
            tracing::warn!("Failed to stop transcode: {}", e);
        }
        self.state_tx.send_replace(PollState::Stopped);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::services::Supervisor;
    use crate::testing::{
        Behavior, Event, EventLog, FakeLauncher, ScriptedSource, hls_settings, remote,
    };
    use crate::state::RemoteState;
    use tokio::sync::mpsc;

    const TEMPLATE: &str = "https://example.com/music/{id}.mp3";

    fn poller(
        script: Vec<Option<RemoteState>>,
        behavior: Behavior,
        interval: Duration,
    ) -> (Poller, EventLog, watch::Receiver<PollState>) {
        let launcher = FakeLauncher::new(behavior);
        let events = launcher.events();
        let (tx, rx) = mpsc::channel(10);
        let supervisor = Supervisor::new(Box::new(launcher), None, Duration::from_secs(5), rx);
        tokio::spawn(supervisor.run());

        let (state_tx, state_rx) = watch::channel(PollState::Idle);
        let settings = PollSettings {
            interval,
            media_template: TEMPLATE.to_string(),
            hls: hls_settings(),
        };
        let poller = Poller::new(
            Box::new(ScriptedSource::new(script)),
            SupervisorHandle::new(tx),
            settings,
            state_tx,
        );
        (poller, events, state_rx)
    }

    #[tokio::test]
    async fn test_track_switch_scenario() {
        let (mut poller, events, _state) = poller(
            vec![
                None,
                None,
                None,
                remote("42", 10.5),
                remote("42", 16.0),
                remote("43", 0.0),
            ],
            Behavior::RunUntilTerminated,
            Duration::from_secs(1),
        );

        for _ in 0..3 {
            poller.tick().await.unwrap();
        }
        assert!(events.take().is_empty());
        assert_eq!(poller.current_track(), None);

        poller.tick().await.unwrap();
        assert_eq!(
            events.take(),
            vec![Event::Launch("https://example.com/music/42.mp3".to_string(), 10.5)]
        );

        poller.tick().await.unwrap();
        assert!(events.take().is_empty());

        poller.tick().await.unwrap();
        assert_eq!(
            events.take(),
            vec![
                Event::Terminate,
                Event::Exited,
                Event::Launch("https://example.com/music/43.mp3".to_string(), 0.0),
            ]
        );
        assert_eq!(poller.current_track(), Some("43"));
    }

    #[tokio::test]
    async fn test_repeated_track_starts_once() {
        let script = (0..20).map(|i| remote("7", i as f64 * 1.5)).collect();
        let (mut poller, events, _state) =
            poller(script, Behavior::RunUntilTerminated, Duration::from_secs(1));

        for _ in 0..20 {
            poller.tick().await.unwrap();
        }

        let launches = events
            .take()
            .into_iter()
            .filter(|e| matches!(e, Event::Launch(..)))
            .count();
        assert_eq!(launches, 1);
    }

    #[tokio::test]
    async fn test_unavailable_keeps_last_track() {
        let (mut poller, events, _state) = poller(
            vec![remote("1", 0.0), None, None, remote("1", 30.0)],
            Behavior::RunUntilTerminated,
            Duration::from_secs(1),
        );

        poller.tick().await.unwrap();
        events.take();

        for _ in 0..3 {
            poller.tick().await.unwrap();
            assert_eq!(poller.current_track(), Some("1"));
        }
        assert!(events.take().is_empty());
    }

    #[tokio::test]
    async fn test_exited_process_is_not_restarted() {
        let (mut poller, events, _state) = poller(
            vec![remote("1", 0.0), remote("1", 5.0), remote("1", 6.0)],
            Behavior::ExitImmediately(1),
            Duration::from_secs(1),
        );

        for _ in 0..3 {
            poller.tick().await.unwrap();
        }

        assert_eq!(
            events.take(),
            vec![Event::Launch("https://example.com/music/1.mp3".to_string(), 0.0)]
        );
        assert!(poller.exit_reported);
    }

    #[tokio::test]
    async fn test_launch_failure_stops_the_loop() {
        let (poller, _events, state) = poller(
            vec![remote("1", 0.0)],
            Behavior::NotFound,
            Duration::from_millis(10),
        );

        let result = poller.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(SupervisorError::Launch(_))));
        assert_eq!(*state.borrow(), PollState::Stopped);
    }

    #[tokio::test]
    async fn test_change_is_started_before_next_fetch() {
        let launcher = FakeLauncher::new(Behavior::RunUntilTerminated);
        let events = launcher.events();
        let (tx, rx) = mpsc::channel(10);
        let supervisor = Supervisor::new(Box::new(launcher), None, Duration::from_secs(5), rx);
        tokio::spawn(supervisor.run());

        let source = ScriptedSource::new(vec![None, None, remote("9", 1.0)]).with_log(events.clone());
        let settings = PollSettings {
            interval: Duration::from_millis(10),
            media_template: TEMPLATE.to_string(),
            hls: hls_settings(),
        };
        let (state_tx, _state_rx) = watch::channel(PollState::Idle);
        let poller = Poller::new(Box::new(source), SupervisorHandle::new(tx), settings, state_tx);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poller.run(cancel.clone()));
        tokio::time::timeout(Duration::from_secs(2), async {
            while events.len() < 5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();
        task.await.unwrap().unwrap();

        let events = events.take();
        assert_eq!(
            &events[..5],
            &[
                Event::Fetch,
                Event::Fetch,
                Event::Fetch,
                Event::Launch("https://example.com/music/9.mp3".to_string(), 1.0),
                Event::Fetch,
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_active_process() {
        let (poller, events, state) = poller(
            vec![remote("5", 2.0)],
            Behavior::RunUntilTerminated,
            Duration::from_millis(10),
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poller.run(cancel.clone()));

        tokio::time::timeout(Duration::from_secs(2), async {
            while events.len() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(*state.borrow(), PollState::Stopped);

        assert_eq!(
            events.take(),
            vec![
                Event::Launch("https://example.com/music/5.mp3".to_string(), 2.0),
                Event::Terminate,
                Event::Exited,
            ]
        );
    }
}
