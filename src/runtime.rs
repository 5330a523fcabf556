use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyEvent, MouseButton, MouseEvent, MouseEventKind};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::{ActionContext, App, AppCommand};
use crate::client::{ClusterClient, ClusterInfo, ListFilters};
use crate::error::{AppError, RecoveryAction, RetryPolicy, retry_with_backoff};
use crate::focus::FocusManager;
use crate::layout::{LayoutConfig, LayoutDimensions, LayoutRequest, Panel, compute_layout};
use crate::logs::{LogEntry, LogStreamService, StreamKey};
use crate::message::{Dispatch, MessageHandler, Msg};
use crate::model::{NamespaceScope, ResourceTab};
use crate::mouse::{ClickTarget, HitContext, MouseCoordinator};
use crate::navigation::{Action, NavigationController, NavigationMode};
use crate::watch::WatchService;

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub layout: LayoutConfig,
    pub refresh_interval: Duration,
    pub list_timeout: Duration,
    pub connect_timeout: Duration,
    pub sequence_timeout: Duration,
    pub batch_size: usize,
    pub max_batch_age: Duration,
    pub retry: RetryPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            refresh_interval: Duration::from_millis(2000),
            list_timeout: Duration::from_secs(4),
            connect_timeout: Duration::from_secs(5),
            sequence_timeout: crate::navigation::DEFAULT_SEQUENCE_TIMEOUT,
            batch_size: crate::message::DEFAULT_BATCH_SIZE,
            max_batch_age: crate::message::DEFAULT_MAX_BATCH_AGE,
            retry: RetryPolicy::default(),
        }
    }
}

/// Collaborators built once at startup and handed to the runtime.
#[derive(Clone)]
pub struct Services {
    pub client: Arc<dyn ClusterClient>,
    pub logs: Arc<LogStreamService>,
    pub watches: Arc<WatchService>,
}

pub struct Runtime {
    app: App,
    focus: FocusManager,
    navigation: NavigationController,
    messages: MessageHandler,
    mouse: MouseCoordinator,
    size: Option<(u16, u16)>,
    layout: Option<LayoutDimensions>,
    settings: RuntimeSettings,
    services: Services,
    tx: UnboundedSender<Msg>,
    streaming: Option<StreamKey>,
    log_view: Vec<LogEntry>,
    watched: Option<(ResourceTab, u64)>,
    watch_generations: HashMap<ResourceTab, u64>,
    last_refresh: Option<Instant>,
    exit_error: Option<AppError>,
    shutdown: CancellationToken,
}

impl Runtime {
    pub fn new(
        cluster: ClusterInfo,
        scope: NamespaceScope,
        settings: RuntimeSettings,
        services: Services,
        tx: UnboundedSender<Msg>,
    ) -> Self {
        Self {
            app: App::new(cluster, scope),
            focus: FocusManager::default(),
            navigation: NavigationController::new(settings.sequence_timeout),
            messages: MessageHandler::new(settings.batch_size, settings.max_batch_age),
            mouse: MouseCoordinator,
            size: None,
            layout: None,
            settings,
            services,
            tx,
            streaming: None,
            log_view: Vec::new(),
            watched: None,
            watch_generations: HashMap::new(),
            last_refresh: None,
            exit_error: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Kicks off the first listing and watch for the active tab.
    pub fn init(&mut self, now: Instant) {
        info!(
            context = %self.app.cluster().context,
            scope = %self.app.namespace_scope(),
            "runtime init"
        );
        self.refresh_active(now);
        self.start_watch_active();
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn focus(&self) -> Panel {
        self.focus.current()
    }

    pub fn mode(&self) -> NavigationMode {
        self.navigation.mode()
    }

    pub fn pending_key(&self) -> Option<char> {
        self.navigation.pending_key()
    }

    pub fn layout(&self) -> Option<&LayoutDimensions> {
        self.layout.as_ref()
    }

    pub fn log_view(&self) -> &[LogEntry] {
        &self.log_view
    }

    #[cfg(test)]
    pub fn streaming(&self) -> Option<&StreamKey> {
        self.streaming.as_ref()
    }

    /// Nothing may be rendered before the first terminal size is known.
    pub fn is_ready(&self) -> bool {
        self.layout.is_some()
    }

    pub fn running(&self) -> bool {
        self.app.running()
    }

    pub fn exit_error(&self) -> Option<&AppError> {
        self.exit_error.as_ref()
    }

    #[cfg(test)]
    pub fn pending_messages(&self) -> usize {
        self.messages.pending_len()
    }

    /// Feeds one message through the handler. Returns whether anything was
    /// processed, so the caller knows a redraw is due.
    pub fn update(&mut self, msg: Msg, now: Instant) -> bool {
        let msg = match msg {
            Msg::Key(key) if self.navigation.requests_quit(key) => Msg::Quit,
            msg => msg,
        };
        let dispatches = self.messages.handle(msg, now);
        let dirty = !dispatches.is_empty();
        for dispatch in dispatches {
            self.dispatch(dispatch, now);
        }
        dirty
    }

    /// Drains a partial low-priority batch that has waited long enough.
    pub fn flush_pending(&mut self, now: Instant) -> bool {
        match self.messages.flush_due(now) {
            Some(dispatch) => {
                self.dispatch(dispatch, now);
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&mut self) {
        self.shutdown.cancel();
        let streams = self.services.logs.stop_all_streams();
        let watches = self.services.watches.stop_all_watchers();
        debug!(streams, watches, "runtime shutdown");
    }

    fn dispatch(&mut self, dispatch: Dispatch, now: Instant) {
        match dispatch {
            Dispatch::Critical(msg) | Dispatch::Single(msg) => self.process(msg, now),
            Dispatch::Batch(batch) => {
                for msg in batch {
                    self.process(msg, now);
                }
            }
        }
    }

    fn process(&mut self, msg: Msg, now: Instant) {
        match msg {
            Msg::Key(key) => {
                self.handle_key(key, now);
                self.relayout();
            }
            Msg::Mouse(event) => {
                self.handle_mouse(event, now);
                self.relayout();
            }
            Msg::Resize { width, height } => {
                debug!(width, height, "resize");
                self.size = Some((width, height));
                self.relayout();
            }
            Msg::Tick => {
                self.navigation.expire_pending(now);
                let due = self.last_refresh.is_none_or(|last| {
                    now.saturating_duration_since(last) >= self.settings.refresh_interval
                });
                if due {
                    self.refresh_active(now);
                }
            }
            Msg::Quit => {
                info!("quit requested");
                self.app.stop();
            }
            Msg::Fatal(error) => {
                warn!(error = %error, "fatal error");
                self.app.stop();
                self.exit_error = Some(error);
            }
            Msg::TableLoaded { tab, scope, result } => {
                if let Err(error) = &result {
                    debug!(tab = tab.title(), error = %error, "listing failed");
                }
                self.app.apply_table(tab, &scope, result);
            }
            Msg::DetailLoaded { tab, result } => match result {
                Ok(row) => self.app.apply_detail(tab, row),
                Err(error) => self.app.report_error(error),
            },
            Msg::Resource(event) => {
                if self.watch_generations.get(&event.tab) == Some(&event.generation) {
                    self.app.apply_resource_event(event);
                }
            }
            Msg::WatchFailed {
                tab,
                generation,
                error,
            } => {
                if self.watch_generations.get(&tab) == Some(&generation) {
                    self.watch_generations.remove(&tab);
                    self.app.report_error(error);
                }
            }
            Msg::LogsAppended { key, .. } => {
                if self.streaming.as_ref() == Some(&key) {
                    self.refresh_log_view();
                }
            }
            Msg::LogStreamEnded { key } => {
                if self.streaming.as_ref() == Some(&key) {
                    self.refresh_log_view();
                    self.app.set_status(format!("Log stream for {key} ended"));
                }
            }
            Msg::LogStreamFailed { key, error } => {
                if self.streaming.as_ref() == Some(&key) {
                    self.app.report_error(error);
                }
            }
            Msg::LogTargetResolved { result } => {
                match result {
                    Ok(key) if self.app.log_visible() => self.start_log_stream(key),
                    Ok(_) => {}
                    Err(error) => {
                        self.app.hide_logs();
                        self.app.report_error(error);
                    }
                }
                self.relayout();
            }
            Msg::OperationCompleted { status, refresh } => {
                self.app.set_status(status);
                if refresh {
                    self.refresh_active(now);
                }
            }
            Msg::OperationFailed(error) => self.app.report_error(error),
            Msg::ConnectionRestored { version } => {
                self.app.clear_error();
                self.app.set_status(format!("Connection restored (server {version})"));
                self.refresh_active(now);
                self.start_watch_active();
            }
            Msg::ClusterChanged(info) => {
                info!(context = %info.context, flavor = info.flavor.label(), "cluster changed");
                self.stop_log_stream();
                self.app.hide_logs();
                self.app.clear_error();
                self.app.set_status(format!("Context: {}", info.summary()));
                self.app.set_cluster(info);
                self.refresh_active(now);
                self.start_watch_active();
                self.relayout();
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent, now: Instant) {
        let mode_before = self.navigation.mode();
        let Some(action) = self.navigation.handle_key(key, now) else {
            return;
        };

        match action {
            Action::FocusNext => {
                self.focus.cycle_forward();
            }
            Action::FocusPrev => {
                self.focus.cycle_backward();
            }
            _ => {}
        }

        let ctx = ActionContext {
            focus: self.focus.current(),
            mode: mode_before,
            log_len: self.log_view.len(),
        };
        let command = self.app.apply_action(action, ctx);

        let mode = self.navigation.mode();
        if mode.is_text_entry() && !self.accepts_text_entry(mode) {
            self.navigation.set_mode(NavigationMode::Normal);
        }
        if mode_before == NavigationMode::Insert || mode == NavigationMode::Insert {
            self.refresh_log_view();
        }

        self.execute(command, now);
    }

    fn accepts_text_entry(&self, mode: NavigationMode) -> bool {
        if self.app.error_modal().is_some() || self.app.pending_confirmation_prompt().is_some() {
            return false;
        }
        mode != NavigationMode::Insert || self.app.log_visible()
    }

    fn handle_mouse(&mut self, event: MouseEvent, now: Instant) {
        let Some(layout) = self.layout else {
            return;
        };
        if self.app.error_modal().is_some() || self.app.pending_confirmation_prompt().is_some() {
            return;
        }

        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let titles = self.app.tab_titles();
                let visible = self.app.visible_rows().len();
                let ctx = HitContext {
                    layout: &layout,
                    tab_titles: &titles,
                    active_tab: self.app.active_tab_index(),
                    item_count: visible,
                    scroll_offset: self.app.table_offset(),
                };
                match self.mouse.hit_test(event.column, event.row, &ctx) {
                    ClickTarget::Tab(index) => {
                        let command = self.app.select_tab(index);
                        self.execute(command, now);
                    }
                    ClickTarget::Resource { panel, row } => {
                        self.focus.focus(panel);
                        self.app.select_visible_row(row);
                    }
                    ClickTarget::Panel(panel) => {
                        self.focus.focus(panel);
                    }
                    ClickTarget::Unhandled => {}
                }
            }
            MouseEventKind::ScrollDown | MouseEventKind::ScrollUp => {
                let Some(panel) = layout.panel_at(event.column, event.row) else {
                    return;
                };
                let action = if event.kind == MouseEventKind::ScrollDown {
                    Action::Down
                } else {
                    Action::Up
                };
                let ctx = ActionContext {
                    focus: panel,
                    mode: NavigationMode::Normal,
                    log_len: self.log_view.len(),
                };
                let command = self.app.apply_action(action, ctx);
                self.execute(command, now);
            }
            _ => {}
        }
    }

    fn execute(&mut self, command: AppCommand, now: Instant) {
        match command {
            AppCommand::None => {}
            AppCommand::RefreshActive => self.refresh_active(now),
            AppCommand::TabChanged | AppCommand::ScopeChanged => {
                self.refresh_active(now);
                self.start_watch_active();
            }
            AppCommand::ShowLogs { tab, row } => {
                let client = Arc::clone(&self.services.client);
                self.spawn(async move {
                    Msg::LogTargetResolved {
                        result: client.resolve_log_target(tab, &row).await,
                    }
                });
            }
            AppCommand::StopLogs => self.stop_log_stream(),
            AppCommand::LoadDetail {
                tab,
                namespace,
                name,
            } => {
                let client = Arc::clone(&self.services.client);
                self.spawn(async move {
                    Msg::DetailLoaded {
                        tab,
                        result: client.get_resource(tab, namespace.as_deref(), &name).await,
                    }
                });
            }
            AppCommand::Delete {
                tab,
                namespace,
                name,
            } => {
                let client = Arc::clone(&self.services.client);
                self.spawn(async move {
                    match client
                        .delete_resource(tab, namespace.as_deref(), &name)
                        .await
                    {
                        Ok(()) => Msg::OperationCompleted {
                            status: format!("Deleted {} {name}", tab.kind()),
                            refresh: true,
                        },
                        Err(error) => Msg::OperationFailed(error),
                    }
                });
            }
            AppCommand::SwitchContext { context } => {
                let client = Arc::clone(&self.services.client);
                self.spawn(async move {
                    match client.switch_context(&context).await {
                        Ok(info) => Msg::ClusterChanged(info),
                        Err(error) => Msg::OperationFailed(error),
                    }
                });
            }
            AppCommand::Recover(action) => self.recover(action, now),
        }
    }

    fn recover(&mut self, action: RecoveryAction, now: Instant) {
        match action {
            RecoveryAction::RetryConnection => {
                let client = Arc::clone(&self.services.client);
                let policy = self.settings.retry.clone();
                let timeout = self.settings.connect_timeout;
                let token = self.shutdown.child_token();
                self.spawn(async move {
                    let result = retry_with_backoff(&policy, &token, |attempt| {
                        let client = Arc::clone(&client);
                        async move {
                            debug!(attempt, "checking connectivity");
                            match tokio::time::timeout(timeout, client.check_connectivity()).await {
                                Ok(result) => result,
                                Err(_) => Err(AppError::timeout("connectivity check", timeout)),
                            }
                        }
                    })
                    .await;
                    match result {
                        Ok(version) => Msg::ConnectionRestored { version },
                        Err(error) => Msg::OperationFailed(error),
                    }
                });
            }
            RecoveryAction::Reauthenticate => {
                let client = Arc::clone(&self.services.client);
                self.spawn(async move {
                    match client.reload_credentials().await {
                        Ok(info) => Msg::ClusterChanged(info),
                        Err(error) => Msg::OperationFailed(error),
                    }
                });
            }
            RecoveryAction::RefreshListing => {
                let tab = self.app.active_tab();
                if !self.services.watches.is_polling(tab) {
                    self.refresh_active(now);
                    self.start_watch_active();
                    return;
                }
                // Polled kinds re-list through the watch so rows arrive as events.
                let watches = Arc::clone(&self.services.watches);
                let scope = self.app.namespace_scope().clone();
                self.spawn(async move {
                    match watches.refresh_resource(tab, &scope).await {
                        Ok(count) => Msg::OperationCompleted {
                            status: format!("Re-listed {count} {}", tab.title()),
                            refresh: false,
                        },
                        Err(error) => Msg::OperationFailed(error),
                    }
                });
            }
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Msg> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let msg = task.await;
            if tx.send(msg).is_err() {
                debug!("runtime channel closed, dropping result");
            }
        });
    }

    fn refresh_active(&mut self, now: Instant) {
        self.last_refresh = Some(now);
        let tab = self.app.active_tab();
        let scope = self.app.namespace_scope().clone();
        let client = Arc::clone(&self.services.client);
        let timeout = self.settings.list_timeout;

        self.spawn(async move {
            let result = match tokio::time::timeout(
                timeout,
                client.list_resources(tab, &scope, &ListFilters::default()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AppError::timeout(
                    &format!("listing {}", tab.title()),
                    timeout,
                )),
            };
            Msg::TableLoaded { tab, scope, result }
        });
    }

    fn start_watch_active(&mut self) {
        let tab = self.app.active_tab();
        let scope = self.app.namespace_scope().clone();

        if let Some((previous, _)) = self.watched
            && previous != tab
        {
            self.services.watches.stop_watching(previous);
            self.watch_generations.remove(&previous);
        }

        let generation = self.services.watches.start_watching(tab, scope);
        self.watch_generations.insert(tab, generation);
        self.watched = Some((tab, generation));
    }

    fn start_log_stream(&mut self, key: StreamKey) {
        if self.streaming.as_ref() == Some(&key) && self.services.logs.is_streaming(&key) {
            debug!(stream = %key, "log stream already live");
            return;
        }
        if let Some(previous) = self.streaming.take()
            && previous != key
        {
            self.services.logs.stop_streaming(&previous);
        }
        self.services.logs.start_streaming(key.clone());
        self.app.set_status(format!("Streaming logs for {key}"));
        self.app.set_log_target(Some(key.clone()));
        self.streaming = Some(key);
        self.refresh_log_view();
    }

    fn stop_log_stream(&mut self) {
        if let Some(key) = self.streaming.take() {
            self.services.logs.stop_streaming(&key);
        }
        self.app.set_log_target(None);
        self.log_view.clear();
    }

    fn refresh_log_view(&mut self) {
        self.log_view = match &self.streaming {
            Some(key) => {
                let filter = self.app.log_filter();
                self.services
                    .logs
                    .snapshot(key)
                    .into_iter()
                    .filter(|entry| entry.matches_filter(filter))
                    .collect()
            }
            None => Vec::new(),
        };
    }

    fn relayout(&mut self) {
        let Some((width, height)) = self.size else {
            return;
        };

        let request = LayoutRequest {
            width,
            height,
            detail_visible: self.app.detail_visible(),
            log_visible: self.app.log_visible(),
            focus: self.focus.current(),
        };
        let mut layout = compute_layout(&self.settings.layout, request);

        self.focus.set_enabled(Panel::Detail, layout.detail.is_some());
        self.focus.set_enabled(Panel::Log, layout.log.is_some());
        layout.focus = self.focus.current();

        let log_rows = layout
            .log
            .map(|rect| rect.height.saturating_sub(2) as usize)
            .unwrap_or(1);
        self.app.set_viewport(layout.resource_rows(), log_rows);
        self.layout = Some(layout);
    }
}
