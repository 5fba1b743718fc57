//! Panel controller - Renders the stored prices and edits level and alert
//!
//! Lives only while the panel is shown. It reads and writes `Storage`,
//! renders through a `PanelView`, and asks the refresh agent for new data
//! when what it shows is stale.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::format::{alert_banner_text, elapsed_seconds, format_elapsed, parse_alert_value};
use super::view::PanelView;
use crate::agents::RefreshRequester;
use crate::model::{Alert, GasSnapshot, Tier};
use crate::storage::{
    Storage, StorageArea, StorageChange, StoreError, Subscription, ALERT_KEY, GAS_DATA_KEY,
};

/// Value the alert input is reset to after a rejected submission
const ALERT_INPUT_RESET: &str = "1";

/// Timing of the panel's refresh behavior
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// A snapshot at least this old on open triggers a refresh
    pub stale_after: Duration,
    /// While open, a snapshot older than this triggers a refresh on every render
    pub auto_refresh_after: Duration,
    /// Interval of the "last updated" ticker
    pub ticker: Duration,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(10),
            auto_refresh_after: Duration::from_secs(20),
            ticker: Duration::from_secs(2),
        }
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Controller behind the popup panel
pub struct PanelController {
    storage: Arc<Storage>,
    requester: RefreshRequester,
    view: Arc<dyn PanelView>,
    config: PanelConfig,
    form_visible: Mutex<bool>,
    subscription: Mutex<Option<Subscription>>,
    run_token: Mutex<Option<CancellationToken>>,
    open: AtomicBool,
}

impl PanelController {
    pub fn new(
        storage: Arc<Storage>,
        requester: RefreshRequester,
        view: Arc<dyn PanelView>,
    ) -> Self {
        Self::with_config(PanelConfig::default(), storage, requester, view)
    }

    pub fn with_config(
        config: PanelConfig,
        storage: Arc<Storage>,
        requester: RefreshRequester,
        view: Arc<dyn PanelView>,
    ) -> Self {
        Self {
            storage,
            requester,
            view,
            config,
            form_visible: Mutex::new(false),
            subscription: Mutex::new(None),
            run_token: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }

    /// Initial render when the panel is shown
    pub async fn open(&self) {
        self.open_at(now_millis()).await
    }

    /// Initial render against a given clock reading
    ///
    /// Subscribes to storage first so no change after the reads is lost.
    /// Sends at most one refresh request, when the snapshot is stale.
    pub async fn open_at(&self, now_ms: i64) {
        *self.subscription.lock().await = Some(self.storage.subscribe());
        *self.form_visible.lock().await = false;
        self.open.store(true, Ordering::SeqCst);

        let snapshot = self.storage.gas_data().await;
        if let Some(snapshot) = &snapshot {
            self.render_prices(snapshot);
            self.show_elapsed(snapshot.timestamp, now_ms);
            let stale_ms = self.config.stale_after.as_millis() as i64;
            if snapshot.age_millis(now_ms) >= stale_ms {
                self.request_refresh();
            }
        }

        let alert = self.storage.alert().await;
        self.view.show_alert_banner(alert_banner_text(alert.as_ref()));

        let level = self.storage.level().await;
        self.view.mark_selected(level);
        self.view.show_alert_tier(level);
    }

    /// Stops listening for storage changes and ends a running `run`
    pub async fn hide(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(token) = self.run_token.lock().await.take() {
            token.cancel();
        }
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.unsubscribe();
        }
    }

    /// Returns true between `open` and `hide`
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Re-renders after a storage change
    pub async fn handle_change(&self, change: &StorageChange, now_ms: i64) {
        if change.touches(StorageArea::Sync, GAS_DATA_KEY) {
            if let Some(snapshot) = change.new_value_as::<GasSnapshot>(GAS_DATA_KEY) {
                self.render_snapshot(&snapshot, now_ms);
            }
        } else if change.touches(StorageArea::Local, ALERT_KEY) {
            let alert = change.new_value_as::<Alert>(ALERT_KEY);
            self.view.show_alert_banner(alert_banner_text(alert.as_ref()));
        }
    }

    /// Ticker step: refreshes the "last updated" text
    pub async fn tick_at(&self, now_ms: i64) {
        if let Some(snapshot) = self.storage.gas_data().await {
            self.update_time(snapshot.timestamp, now_ms);
        }
    }

    /// Makes `level` the default tier used by the badge
    pub async fn select_level(&self, level: Tier) -> Result<(), StoreError> {
        self.view.mark_selected(level);
        self.storage.set_level(level).await?;
        self.view.show_alert_tier(level);
        Ok(())
    }

    /// Secondary action on a tier row
    ///
    /// Selects the tier. On the tier that was already selected the alert form
    /// toggles, on any other tier it is revealed.
    pub async fn open_alert_form(&self, level: Tier) -> Result<bool, StoreError> {
        let current = self.storage.level().await;
        self.select_level(level).await?;

        let mut visible = self.form_visible.lock().await;
        *visible = if current == level { !*visible } else { true };
        self.view.set_alert_form_visible(*visible);
        Ok(*visible)
    }

    /// Submits the alert form for the selected tier
    ///
    /// Input that is not a positive integer resets the field and stores
    /// nothing.
    pub async fn submit_alert(&self, input: &str) -> Result<Option<Alert>, StoreError> {
        let level = self.storage.level().await;

        let Some(value) = parse_alert_value(input) else {
            self.view.reset_alert_input(ALERT_INPUT_RESET);
            return Ok(None);
        };

        let alert = Alert::new(level, value);
        self.storage.set_alert(&alert).await?;
        tracing::info!("Alert set for {} at {} gwei", level, value);

        *self.form_visible.lock().await = false;
        self.view.set_alert_form_visible(false);
        Ok(Some(alert))
    }

    /// Cancels the pending alert
    pub async fn cancel_alert(&self) -> Result<(), StoreError> {
        self.storage.set_alert(&Alert::cancelled()).await
    }

    /// Runs the panel until `cancel_token` fires or `hide` is called
    pub async fn run(&self, cancel_token: CancellationToken) {
        *self.run_token.lock().await = Some(cancel_token.clone());
        self.open().await;

        let Some(mut subscription) = self.subscription.lock().await.take() else {
            self.run_token.lock().await.take();
            return;
        };

        let mut ticker = tokio::time::interval(self.config.ticker);
        ticker.tick().await;

        loop {
            tokio::select! {
                change = subscription.recv() => match change {
                    Some(change) => self.handle_change(&change, now_millis()).await,
                    None => break,
                },
                _ = ticker.tick() => self.tick_at(now_millis()).await,
                _ = cancel_token.cancelled() => break,
            }
        }

        subscription.unsubscribe();
        self.run_token.lock().await.take();
        self.open.store(false, Ordering::SeqCst);
        tracing::debug!("Panel closed");
    }

    fn render_snapshot(&self, snapshot: &GasSnapshot, now_ms: i64) {
        self.render_prices(snapshot);
        self.update_time(snapshot.timestamp, now_ms);
    }

    fn render_prices(&self, snapshot: &GasSnapshot) {
        for (tier, gwei) in &snapshot.prices {
            self.view.show_price(tier, *gwei);
        }
    }

    /// Renders the elapsed time and asks for fresh data once it is too old
    fn update_time(&self, timestamp_ms: i64, now_ms: i64) {
        let seconds = self.show_elapsed(timestamp_ms, now_ms);
        if seconds > self.config.auto_refresh_after.as_secs() as i64 {
            self.request_refresh();
        }
    }

    fn show_elapsed(&self, timestamp_ms: i64, now_ms: i64) -> i64 {
        let seconds = elapsed_seconds(timestamp_ms, now_ms);
        self.view.show_last_update(&format_elapsed(seconds));
        seconds
    }

    fn request_refresh(&self) {
        if let Err(e) = self.requester.fetch_gas_data() {
            tracing::warn!("Refresh request dropped: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::RefreshRequest;
    use crate::panel::view::MockPanelView;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc::Receiver;

    #[derive(Debug, Clone, PartialEq)]
    enum Rendered {
        Price(String, i64),
        LastUpdate(String),
        Banner(Option<String>),
        Selected(Tier),
        AlertTier(Tier),
        FormVisible(bool),
        InputReset(String),
    }

    #[derive(Default)]
    struct RecordingView {
        rendered: StdMutex<Vec<Rendered>>,
    }

    impl RecordingView {
        fn push(&self, r: Rendered) {
            self.rendered.lock().unwrap().push(r);
        }

        fn take(&self) -> Vec<Rendered> {
            std::mem::take(&mut *self.rendered.lock().unwrap())
        }
    }

    impl PanelView for RecordingView {
        fn show_price(&self, tier: &str, gwei: i64) {
            self.push(Rendered::Price(tier.to_string(), gwei));
        }
        fn show_last_update(&self, elapsed: &str) {
            self.push(Rendered::LastUpdate(elapsed.to_string()));
        }
        fn show_alert_banner(&self, text: Option<String>) {
            self.push(Rendered::Banner(text));
        }
        fn mark_selected(&self, level: Tier) {
            self.push(Rendered::Selected(level));
        }
        fn show_alert_tier(&self, level: Tier) {
            self.push(Rendered::AlertTier(level));
        }
        fn set_alert_form_visible(&self, visible: bool) {
            self.push(Rendered::FormVisible(visible));
        }
        fn reset_alert_input(&self, value: &str) {
            self.push(Rendered::InputReset(value.to_string()));
        }
    }

    struct Fixture {
        storage: Arc<Storage>,
        view: Arc<RecordingView>,
        requests: Receiver<RefreshRequest>,
        panel: PanelController,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(Storage::in_memory());
        let view = Arc::new(RecordingView::default());
        // Roomy enough to count every request
        let (requester, requests) = RefreshRequester::channel_with_capacity(16);
        let panel = PanelController::new(storage.clone(), requester, view.clone());
        Fixture {
            storage,
            view,
            requests,
            panel,
        }
    }

    fn drain(requests: &mut Receiver<RefreshRequest>) -> usize {
        let mut count = 0;
        while requests.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    fn snapshot(timestamp: i64) -> GasSnapshot {
        GasSnapshot::new(timestamp)
            .with_price(Tier::Rapid, 50)
            .with_price(Tier::Fast, 40)
            .with_price(Tier::Standard, 20)
            .with_price(Tier::Slow, 10)
    }

    #[tokio::test]
    async fn test_open_renders_prices_and_selection() {
        let mut f = fixture();
        f.storage.set_gas_data(&snapshot(100_000)).await.unwrap();
        f.storage.set_level(Tier::Fast).await.unwrap();

        f.panel.open_at(103_000).await;

        let rendered = f.view.take();
        assert!(rendered.contains(&Rendered::Price("rapid".into(), 50)));
        assert!(rendered.contains(&Rendered::Price("slow".into(), 10)));
        assert!(rendered.contains(&Rendered::LastUpdate("3 seconds".into())));
        assert!(rendered.contains(&Rendered::Banner(None)));
        assert!(rendered.contains(&Rendered::Selected(Tier::Fast)));
        assert!(rendered.contains(&Rendered::AlertTier(Tier::Fast)));
        assert_eq!(drain(&mut f.requests), 0);
        assert!(f.panel.is_open());
    }

    #[tokio::test]
    async fn test_open_with_stale_snapshot_requests_once() {
        let mut f = fixture();
        f.storage.set_gas_data(&snapshot(100_000)).await.unwrap();

        f.panel.open_at(110_000).await;

        assert_eq!(drain(&mut f.requests), 1);
    }

    #[tokio::test]
    async fn test_open_with_very_stale_snapshot_requests_once() {
        let mut f = fixture();
        f.storage.set_gas_data(&snapshot(100_000)).await.unwrap();

        f.panel.open_at(130_000).await;
        assert_eq!(drain(&mut f.requests), 1);

        // The ticker keeps asking while the data stays old
        f.panel.tick_at(132_000).await;
        assert_eq!(drain(&mut f.requests), 1);
    }

    #[tokio::test]
    async fn test_open_with_extreme_timestamp_counts_as_stale() {
        let mut f = fixture();
        f.storage
            .set_gas_data(&GasSnapshot::new(i64::MIN).with_price(Tier::Fast, 25))
            .await
            .unwrap();

        f.panel.open_at(1_700_000_000_000).await;
        assert_eq!(drain(&mut f.requests), 1);

        f.panel.tick_at(1_700_000_002_000).await;
        assert_eq!(drain(&mut f.requests), 1);
    }

    #[tokio::test]
    async fn test_open_without_data_renders_defaults() {
        let mut f = fixture();

        f.panel.open_at(1_000_000).await;

        let rendered = f.view.take();
        assert_eq!(
            rendered,
            vec![
                Rendered::Banner(None),
                Rendered::Selected(Tier::Standard),
                Rendered::AlertTier(Tier::Standard),
            ]
        );
        assert_eq!(drain(&mut f.requests), 0);
    }

    #[tokio::test]
    async fn test_open_shows_pending_alert() {
        let f = fixture();
        f.storage.set_alert(&Alert::new(Tier::Slow, 8)).await.unwrap();

        f.panel.open_at(0).await;

        assert!(f.view.take().contains(&Rendered::Banner(Some(
            "Notification set for slow at 8 gwei.".into()
        ))));
    }

    #[tokio::test]
    async fn test_live_changes_rerender() {
        let f = fixture();
        f.panel.open_at(0).await;
        f.view.take();

        let mut sub = f.storage.subscribe();
        f.storage.set_gas_data(&snapshot(5_000)).await.unwrap();
        f.panel
            .handle_change(&sub.recv().await.unwrap(), 6_000)
            .await;

        f.storage.set_alert(&Alert::new(Tier::Rapid, 40)).await.unwrap();
        f.panel
            .handle_change(&sub.recv().await.unwrap(), 6_000)
            .await;

        f.storage.set_alert(&Alert::fired()).await.unwrap();
        f.panel
            .handle_change(&sub.recv().await.unwrap(), 6_000)
            .await;

        let rendered = f.view.take();
        assert!(rendered.contains(&Rendered::Price("fast".into(), 40)));
        assert!(rendered.contains(&Rendered::LastUpdate("1 second".into())));
        assert!(rendered.contains(&Rendered::Banner(Some(
            "Notification set for rapid at 40 gwei.".into()
        ))));
        assert_eq!(rendered.last(), Some(&Rendered::Banner(None)));
    }

    #[tokio::test]
    async fn test_level_change_does_not_rerender_prices() {
        let f = fixture();
        let mut sub = f.storage.subscribe();

        f.storage.set_level(Tier::Slow).await.unwrap();
        f.panel
            .handle_change(&sub.recv().await.unwrap(), 0)
            .await;

        assert!(f.view.take().is_empty());
    }

    #[tokio::test]
    async fn test_tick_updates_time_and_self_heals() {
        let mut f = fixture();
        f.storage.set_gas_data(&snapshot(0)).await.unwrap();

        f.panel.tick_at(20_000).await;
        assert_eq!(drain(&mut f.requests), 0);

        f.panel.tick_at(21_000).await;
        f.panel.tick_at(125_000).await;
        assert_eq!(drain(&mut f.requests), 2);

        let rendered = f.view.take();
        assert_eq!(
            rendered,
            vec![
                Rendered::LastUpdate("20 seconds".into()),
                Rendered::LastUpdate("21 seconds".into()),
                Rendered::LastUpdate("2 minutes".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_select_level_persists() {
        let f = fixture();
        f.panel.select_level(Tier::Rapid).await.unwrap();

        assert_eq!(f.storage.level().await, Tier::Rapid);
        assert_eq!(
            f.view.take(),
            vec![Rendered::Selected(Tier::Rapid), Rendered::AlertTier(Tier::Rapid)]
        );
    }

    #[tokio::test]
    async fn test_alert_form_toggles_on_same_tier() {
        let f = fixture();

        // Standard is selected by default, so the first secondary action toggles
        assert!(f.panel.open_alert_form(Tier::Standard).await.unwrap());
        assert!(!f.panel.open_alert_form(Tier::Standard).await.unwrap());
        assert!(f.panel.open_alert_form(Tier::Standard).await.unwrap());
    }

    #[tokio::test]
    async fn test_alert_form_reveals_on_other_tier() {
        let f = fixture();

        assert!(f.panel.open_alert_form(Tier::Fast).await.unwrap());
        assert!(f.panel.open_alert_form(Tier::Rapid).await.unwrap());
        assert_eq!(f.storage.level().await, Tier::Rapid);
        assert!(!f.panel.open_alert_form(Tier::Rapid).await.unwrap());
    }

    #[tokio::test]
    async fn test_submit_alert_for_selected_level() {
        let f = fixture();
        f.panel.open_alert_form(Tier::Fast).await.unwrap();
        f.view.take();

        let alert = f.panel.submit_alert("30").await.unwrap();

        assert_eq!(alert, Some(Alert::new(Tier::Fast, 30)));
        assert_eq!(f.storage.alert().await, Some(Alert::new(Tier::Fast, 30)));
        assert_eq!(f.view.take(), vec![Rendered::FormVisible(false)]);
    }

    #[tokio::test]
    async fn test_submit_same_alert_twice_keeps_one() {
        let f = fixture();
        f.panel.select_level(Tier::Fast).await.unwrap();

        f.panel.submit_alert("30").await.unwrap();
        f.panel.submit_alert("30").await.unwrap();

        assert_eq!(f.storage.alert().await, Some(Alert::new(Tier::Fast, 30)));
    }

    #[tokio::test]
    async fn test_submit_invalid_alert_resets_input() {
        let f = fixture();

        for input in ["0", "-3", "abc", "4.5"] {
            assert_eq!(f.panel.submit_alert(input).await.unwrap(), None);
        }

        assert!(f.storage.alert().await.is_none());
        assert_eq!(
            f.view.take(),
            vec![Rendered::InputReset("1".into()); 4]
        );
    }

    #[tokio::test]
    async fn test_cancel_alert() {
        let f = fixture();
        f.panel.submit_alert("12").await.unwrap();

        f.panel.cancel_alert().await.unwrap();

        assert_eq!(f.storage.alert().await, Some(Alert::cancelled()));
    }

    #[tokio::test]
    async fn test_hide_unsubscribes() {
        let f = fixture();
        f.panel.open_at(0).await;
        assert!(f.panel.is_open());

        f.panel.hide().await;
        assert!(!f.panel.is_open());
    }

    #[tokio::test]
    async fn test_submit_with_mock_view() {
        let mut view = MockPanelView::new();
        view.expect_reset_alert_input()
            .withf(|value| value.len() == 1 && value.starts_with('1'))
            .times(1)
            .return_const(());
        view.expect_set_alert_form_visible()
            .withf(|visible| !*visible)
            .times(1)
            .return_const(());

        let storage = Arc::new(Storage::in_memory());
        let (requester, _requests) = RefreshRequester::channel();
        let panel = PanelController::new(storage.clone(), requester, Arc::new(view));

        assert!(panel.submit_alert("nope").await.unwrap().is_none());
        assert!(panel.submit_alert("25").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled() {
        let storage = Arc::new(Storage::in_memory());
        storage.set_gas_data(&snapshot(now_millis())).await.unwrap();

        let view = Arc::new(RecordingView::default());
        let (requester, _requests) = RefreshRequester::channel();
        let panel = Arc::new(PanelController::new(storage.clone(), requester, view.clone()));
        let cancel_token = CancellationToken::new();

        let runner = panel.clone();
        let token = cancel_token.clone();
        let handle = tokio::spawn(async move { runner.run(token).await });

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel_token.cancel();
        handle.await.unwrap();

        let updates = view
            .take()
            .into_iter()
            .filter(|r| matches!(r, Rendered::LastUpdate(_)))
            .count();
        // One on open plus the 2 s ticker at 2 s and 4 s
        assert_eq!(updates, 3);
        assert!(!panel.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hide_ends_run() {
        let storage = Arc::new(Storage::in_memory());
        storage.set_gas_data(&snapshot(now_millis())).await.unwrap();

        let view = Arc::new(RecordingView::default());
        let (requester, _requests) = RefreshRequester::channel();
        let panel = Arc::new(PanelController::new(storage.clone(), requester, view.clone()));
        let cancel_token = CancellationToken::new();

        let runner = panel.clone();
        let token = cancel_token.clone();
        let handle = tokio::spawn(async move { runner.run(token).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(panel.is_open());

        panel.hide().await;
        handle.await.unwrap();
        assert!(cancel_token.is_cancelled());
        assert!(!panel.is_open());

        // Nothing renders once hidden
        view.take();
        storage.set_gas_data(&snapshot(now_millis() + 1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(view.take().is_empty());
    }
}
