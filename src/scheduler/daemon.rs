//! Refresh scheduler implementation
//!
//! Each live view (top users, trending posts, feed) runs in its own tokio task
//! on its own interval, so a slow fetch in one view never delays the others.
//! The scheduler itself only waits for commands and shutdown signals.

use crate::aggregator::Aggregator;
use crate::config::RefreshConfig;
use crate::metrics;
use crate::{Result, TrendSpotterError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default top users refresh interval (30 seconds)
pub const DEFAULT_TOP_USERS_INTERVAL: Duration = Duration::from_secs(30);

/// Default trending posts refresh interval (20 seconds)
pub const DEFAULT_TRENDING_INTERVAL: Duration = Duration::from_secs(20);

/// Default feed refresh interval (30 seconds)
pub const DEFAULT_FEED_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of users sampled per feed refresh
pub const DEFAULT_FEED_SAMPLE_SIZE: usize = 5;

/// Default event channel capacity
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// A live view kept fresh by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    TopUsers,
    Trending,
    Feed,
}

impl View {
    pub const ALL: [View; 3] = [View::TopUsers, View::Trending, View::Feed];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::TopUsers => "top_users",
            View::Trending => "trending",
            View::Feed => "feed",
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub top_users_interval: Duration,
    pub trending_interval: Duration,
    pub feed_interval: Duration,

    /// Random users whose posts are refreshed per feed tick
    pub feed_sample_size: usize,

    /// Event broadcast channel capacity
    pub event_channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            top_users_interval: DEFAULT_TOP_USERS_INTERVAL,
            trending_interval: DEFAULT_TRENDING_INTERVAL,
            feed_interval: DEFAULT_FEED_INTERVAL,
            feed_sample_size: DEFAULT_FEED_SAMPLE_SIZE,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    /// Build from the `refresh` section of the config file
    pub fn from_refresh(refresh: &RefreshConfig) -> Self {
        Self {
            top_users_interval: Duration::from_millis(refresh.top_users_interval_ms),
            trending_interval: Duration::from_millis(refresh.trending_interval_ms),
            feed_interval: Duration::from_millis(refresh.feed_interval_ms),
            feed_sample_size: refresh.feed_sample_size,
            ..Default::default()
        }
    }

    pub fn with_top_users_interval(mut self, interval: Duration) -> Self {
        self.top_users_interval = interval;
        self
    }

    pub fn with_trending_interval(mut self, interval: Duration) -> Self {
        self.trending_interval = interval;
        self
    }

    pub fn with_feed_interval(mut self, interval: Duration) -> Self {
        self.feed_interval = interval;
        self
    }

    pub fn with_feed_sample_size(mut self, size: usize) -> Self {
        self.feed_sample_size = size;
        self
    }

    /// Interval for one view
    pub fn interval(&self, view: View) -> Duration {
        match view {
            View::TopUsers => self.top_users_interval,
            View::Trending => self.trending_interval,
            View::Feed => self.feed_interval,
        }
    }

    /// Every view needs a non-zero period
    pub fn validate(&self) -> Result<()> {
        for view in View::ALL {
            if self.interval(view).is_zero() {
                return Err(TrendSpotterError::Scheduler(format!(
                    "{} interval must be greater than zero",
                    view
                )));
            }
        }
        Ok(())
    }
}

/// Events emitted by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Scheduler started its views
    Started,

    /// Scheduler stopped
    Stopped,

    /// Top users list recomputed
    TopUsersRefreshed {
        /// Entries in the new list
        count: usize,
    },

    /// Trending posts recomputed
    TrendingRefreshed {
        /// Entries in the new list
        count: usize,
    },

    /// Feed posts refreshed for a random sample of users
    FeedRefreshed {
        /// Users whose posts were loaded
        users: usize,
        /// Posts in the unified list afterwards
        posts: usize,
    },

    /// A view was torn down
    ViewStopped(View),

    /// A refresh failed; the view keeps its previous data
    Error { view: View, message: String },
}

/// Commands that can be sent to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Refresh a view now, outside its interval
    RefreshNow(View),

    /// Tear down one view and cancel its timer
    StopView(View),

    /// Stop the scheduler
    Shutdown,
}

/// Result of handling a command
enum CommandResult {
    Continue,
    Stop,
}

/// A running view task; aborted when dropped
struct ViewTask {
    handle: JoinHandle<()>,
    trigger: Arc<Notify>,
}

impl Drop for ViewTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Refresh scheduler
///
/// Keeps the aggregator's derived views live on fixed intervals.
pub struct Scheduler {
    aggregator: Arc<Aggregator>,
    config: SchedulerConfig,
    views: HashMap<View, ViewTask>,
    event_tx: broadcast::Sender<SchedulerEvent>,
    command_rx: Option<mpsc::Receiver<SchedulerCommand>>,
    command_tx: mpsc::Sender<SchedulerCommand>,
    running: bool,
}

impl Scheduler {
    pub fn new(aggregator: Arc<Aggregator>, config: SchedulerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(16);

        Self {
            aggregator,
            config,
            views: HashMap::new(),
            event_tx,
            command_rx: Some(command_rx),
            command_tx,
            running: false,
        }
    }

    /// Get an event subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Get a command sender
    pub fn command_sender(&self) -> mpsc::Sender<SchedulerCommand> {
        self.command_tx.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Views with a live task
    pub fn active_views(&self) -> Vec<View> {
        View::ALL
            .into_iter()
            .filter(|v| self.views.contains_key(v))
            .collect()
    }

    /// Spawn the interval task for every view that is not already running
    pub fn start_views(&mut self) -> Result<()> {
        self.config.validate()?;

        for view in View::ALL {
            if self.views.contains_key(&view) {
                continue;
            }
            let trigger = Arc::new(Notify::new());
            let handle = tokio::spawn(run_view(
                view,
                self.config.interval(view),
                self.config.feed_sample_size,
                Arc::clone(&self.aggregator),
                self.event_tx.clone(),
                Arc::clone(&trigger),
            ));
            tracing::debug!(view = %view, interval = ?self.config.interval(view), "View started");
            self.views.insert(view, ViewTask { handle, trigger });
        }
        Ok(())
    }

    /// Tear down one view; its timer stops immediately
    pub fn stop_view(&mut self, view: View) -> bool {
        match self.views.remove(&view) {
            Some(task) => {
                drop(task);
                tracing::info!(view = %view, "View stopped");
                send_event(&self.event_tx, SchedulerEvent::ViewStopped(view));
                true
            }
            None => false,
        }
    }

    /// Run the scheduler until shutdown (command or SIGINT/SIGTERM)
    pub async fn run(&mut self) -> Result<()> {
        self.config.validate()?;
        let mut command_rx = self.command_rx.take().ok_or_else(|| {
            TrendSpotterError::Scheduler("Scheduler already running".to_string())
        })?;

        self.running = true;
        metrics::set_scheduler_running(true);
        self.start_views()?;
        send_event(&self.event_tx, SchedulerEvent::Started);
        tracing::info!("Refresh scheduler started");

        #[cfg(unix)]
        let outcome = self.run_with_signals(&mut command_rx).await;

        #[cfg(not(unix))]
        let outcome = self.run_without_signals(&mut command_rx).await;

        self.shutdown();
        self.command_rx = Some(command_rx);
        outcome
    }

    #[cfg(unix)]
    async fn run_with_signals(
        &mut self,
        command_rx: &mut mpsc::Receiver<SchedulerCommand>,
    ) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            TrendSpotterError::Scheduler(format!("Failed to set up SIGTERM handler: {}", e))
        })?;
        let mut sigint = signal(SignalKind::interrupt()).map_err(|e| {
            TrendSpotterError::Scheduler(format!("Failed to set up SIGINT handler: {}", e))
        })?;

        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    if let CommandResult::Stop = self.handle_command(cmd) {
                        break;
                    }
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn run_without_signals(
        &mut self,
        command_rx: &mut mpsc::Receiver<SchedulerCommand>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    if let CommandResult::Stop = self.handle_command(cmd) {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl-C, shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    fn handle_command(&mut self, cmd: SchedulerCommand) -> CommandResult {
        tracing::debug!(command = ?cmd, "Handling scheduler command");
        match cmd {
            SchedulerCommand::RefreshNow(view) => {
                match self.views.get(&view) {
                    Some(task) => task.trigger.notify_one(),
                    None => tracing::warn!(view = %view, "Refresh requested for stopped view"),
                }
                CommandResult::Continue
            }
            SchedulerCommand::StopView(view) => {
                self.stop_view(view);
                CommandResult::Continue
            }
            SchedulerCommand::Shutdown => CommandResult::Stop,
        }
    }

    fn shutdown(&mut self) {
        for view in View::ALL {
            self.stop_view(view);
        }
        self.running = false;
        metrics::set_scheduler_running(false);
        send_event(&self.event_tx, SchedulerEvent::Stopped);
        tracing::info!("Refresh scheduler stopped");
    }
}

/// Refresh one view once and describe the outcome
pub async fn refresh_view(
    aggregator: &Aggregator,
    view: View,
    feed_sample_size: usize,
) -> SchedulerEvent {
    match view {
        View::TopUsers => match aggregator.refresh_top_users().await {
            Ok(top) => SchedulerEvent::TopUsersRefreshed { count: top.len() },
            Err(e) => SchedulerEvent::Error {
                view,
                message: e.to_string(),
            },
        },
        View::Trending => {
            let trending = aggregator.refresh_trending_posts();
            SchedulerEvent::TrendingRefreshed {
                count: trending.len(),
            }
        }
        View::Feed => match aggregator.refresh_random_feed(feed_sample_size).await {
            Ok(feed) => SchedulerEvent::FeedRefreshed {
                users: feed.users_loaded,
                posts: feed.posts,
            },
            Err(e) => SchedulerEvent::Error {
                view,
                message: e.to_string(),
            },
        },
    }
}

/// Interval loop for one view; the first refresh happens one period after start
async fn run_view(
    view: View,
    period: Duration,
    feed_sample_size: usize,
    aggregator: Arc<Aggregator>,
    events: broadcast::Sender<SchedulerEvent>,
    trigger: Arc<Notify>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = trigger.notified() => {
                tracing::debug!(view = %view, "Manual refresh");
            }
        }

        let event = refresh_view(&aggregator, view, feed_sample_size).await;
        if let SchedulerEvent::Error { ref message, .. } = event {
            tracing::warn!(view = %view, error = %message, "Refresh failed, retrying next tick");
        }
        send_event(&events, event);
    }
}

fn send_event(events: &broadcast::Sender<SchedulerEvent>, event: SchedulerEvent) {
    if events.send(event).is_err() {
        tracing::trace!("Event sent but no receivers subscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrendSpotterConfig;
    use crate::source::testing::{post, FakeSource};
    use crate::source::RemoteSource;

    fn test_aggregator() -> (Arc<FakeSource>, Arc<Aggregator>) {
        let source = Arc::new(
            FakeSource::new()
                .with_users(&[("1", "Alice"), ("2", "Bob")])
                .with_posts("1", vec![post(10, "1", 0)])
                .with_posts("2", vec![post(20, "2", 1)])
                .with_comments(10, 3)
                .with_comments(20, 1),
        );
        let dyn_source: Arc<dyn RemoteSource> = source.clone();
        let aggregator = Aggregator::new(dyn_source, &TrendSpotterConfig::default());
        (source, Arc::new(aggregator))
    }

    async fn next_matching(
        events: &mut broadcast::Receiver<SchedulerEvent>,
        pred: impl Fn(&SchedulerEvent) -> bool,
    ) -> SchedulerEvent {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    }

    #[test]
    fn test_config_from_refresh() {
        let refresh = RefreshConfig::default();
        let config = SchedulerConfig::from_refresh(&refresh);
        assert_eq!(config.top_users_interval, DEFAULT_TOP_USERS_INTERVAL);
        assert_eq!(config.trending_interval, DEFAULT_TRENDING_INTERVAL);
        assert_eq!(config.feed_interval, DEFAULT_FEED_INTERVAL);
        assert_eq!(config.feed_sample_size, 5);
    }

    #[test]
    fn test_config_builder() {
        let config = SchedulerConfig::default()
            .with_trending_interval(Duration::from_secs(2))
            .with_feed_sample_size(2);
        assert_eq!(config.interval(View::Trending), Duration::from_secs(2));
        assert_eq!(config.interval(View::TopUsers), DEFAULT_TOP_USERS_INTERVAL);
        assert_eq!(config.feed_sample_size, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_view_events() {
        let (_source, aggregator) = test_aggregator();
        aggregator.refresh_unified_posts(&["1", "2"]).await;

        let event = refresh_view(&aggregator, View::TopUsers, 5).await;
        assert_eq!(event, SchedulerEvent::TopUsersRefreshed { count: 2 });

        let event = refresh_view(&aggregator, View::Trending, 5).await;
        assert_eq!(event, SchedulerEvent::TrendingRefreshed { count: 1 });

        let event = refresh_view(&aggregator, View::Feed, 5).await;
        assert_eq!(event, SchedulerEvent::FeedRefreshed { users: 2, posts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_view_reports_unavailable() {
        let (source, aggregator) = test_aggregator();
        source.fail_users();

        let event = refresh_view(&aggregator, View::Feed, 5).await;
        assert!(matches!(event, SchedulerEvent::Error { view: View::Feed, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_views_tick_on_their_intervals() {
        let (_source, aggregator) = test_aggregator();
        aggregator.initialize().await.unwrap();

        let mut scheduler = Scheduler::new(aggregator, SchedulerConfig::default());
        let mut events = scheduler.subscribe();
        let commands = scheduler.command_sender();
        let handle = tokio::spawn(async move { scheduler.run().await });

        assert_eq!(events.recv().await.unwrap(), SchedulerEvent::Started);
        let started = Instant::now();

        // Trending (20s) fires before top users and feed (30s)
        let first = events.recv().await.unwrap();
        assert_eq!(first, SchedulerEvent::TrendingRefreshed { count: 1 });
        assert!(started.elapsed() >= DEFAULT_TRENDING_INTERVAL);

        next_matching(&mut events, |e| {
            matches!(e, SchedulerEvent::TopUsersRefreshed { .. })
        })
        .await;
        assert!(started.elapsed() >= DEFAULT_TOP_USERS_INTERVAL);

        commands.send(SchedulerCommand::Shutdown).await.unwrap();
        next_matching(&mut events, |e| *e == SchedulerEvent::Stopped).await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_now_and_stop_view() {
        let (_source, aggregator) = test_aggregator();
        aggregator.initialize().await.unwrap();

        let mut scheduler = Scheduler::new(aggregator, SchedulerConfig::default());
        let mut events = scheduler.subscribe();
        let commands = scheduler.command_sender();
        let handle = tokio::spawn(async move { scheduler.run().await });
        assert_eq!(events.recv().await.unwrap(), SchedulerEvent::Started);

        let started = Instant::now();
        commands
            .send(SchedulerCommand::RefreshNow(View::TopUsers))
            .await
            .unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event, SchedulerEvent::TopUsersRefreshed { count: 2 });
        assert!(started.elapsed() < DEFAULT_TRENDING_INTERVAL);

        commands
            .send(SchedulerCommand::StopView(View::Trending))
            .await
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            SchedulerEvent::ViewStopped(View::Trending)
        );

        // Well past several trending periods: no trending events arrive
        let until = Instant::now() + Duration::from_secs(65);
        while Instant::now() < until {
            match tokio::time::timeout_at(until, events.recv()).await {
                Ok(Ok(event)) => {
                    assert!(!matches!(event, SchedulerEvent::TrendingRefreshed { .. }))
                }
                _ => break,
            }
        }

        commands.send(SchedulerCommand::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_twice_concurrently_is_rejected() {
        let (_source, aggregator) = test_aggregator();
        let mut scheduler = Scheduler::new(aggregator, SchedulerConfig::default());
        scheduler.command_rx = None;

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, crate::TrendSpotterError::Scheduler(_)));
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_view_cancels_task() {
        let (_source, aggregator) = test_aggregator();
        let mut scheduler = Scheduler::new(aggregator, SchedulerConfig::default());

        scheduler.start_views().unwrap();
        assert_eq!(scheduler.active_views().len(), 3);

        assert!(scheduler.stop_view(View::Feed));
        assert!(!scheduler.stop_view(View::Feed));
        assert_eq!(scheduler.active_views(), vec![View::TopUsers, View::Trending]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_rejected() {
        let (_source, aggregator) = test_aggregator();
        let config = SchedulerConfig::default().with_trending_interval(Duration::ZERO);
        assert!(config.validate().is_err());

        let mut scheduler = Scheduler::new(aggregator, config);
        let err = scheduler.start_views().unwrap_err();
        assert!(matches!(err, TrendSpotterError::Scheduler(_)));
        assert!(scheduler.active_views().is_empty());

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, TrendSpotterError::Scheduler(_)));
        assert!(!scheduler.is_running());
    }
}
