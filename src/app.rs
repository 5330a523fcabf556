use std::collections::HashMap;
use std::ops::Range;

use chrono::Local;
use tracing::{debug, info};

use crate::client::{ClusterInfo, ResourceList};
use crate::error::{AppError, AppResult, RecoveryAction, Severity};
use crate::layout::Panel;
use crate::logs::StreamKey;
use crate::model::{NamespaceScope, ResourceTab, RowData, TableData};
use crate::navigation::{Action, NavigationMode};
use crate::watch::{ResourceEvent, ResourceEventKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    RefreshActive,
    TabChanged,
    ScopeChanged,
    ShowLogs {
        tab: ResourceTab,
        row: RowData,
    },
    StopLogs,
    LoadDetail {
        tab: ResourceTab,
        namespace: Option<String>,
        name: String,
    },
    Delete {
        tab: ResourceTab,
        namespace: Option<String>,
        name: String,
    },
    SwitchContext {
        context: String,
    },
    Recover(RecoveryAction),
}

#[derive(Debug, Clone)]
struct PendingConfirmation {
    prompt: String,
    command: AppCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub severity: Severity,
}

/// Runtime facts an action needs but the app does not own.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext {
    pub focus: Panel,
    pub mode: NavigationMode,
    pub log_len: usize,
}

impl Default for ActionContext {
    fn default() -> Self {
        Self {
            focus: Panel::Main,
            mode: NavigationMode::Normal,
            log_len: 0,
        }
    }
}

#[derive(Debug)]
pub struct App {
    running: bool,
    cluster: ClusterInfo,
    tabs: Vec<ResourceTab>,
    active_tab_index: usize,
    tables: HashMap<ResourceTab, TableData>,
    namespace_scope: NamespaceScope,
    filter: String,
    filter_before_search: String,
    input: String,
    status: StatusLine,
    show_help: bool,
    pending_confirmation: Option<PendingConfirmation>,
    error_modal: Option<AppError>,
    last_error: Option<AppError>,
    detail_visible: bool,
    detail_scroll: u16,
    log_visible: bool,
    log_target: Option<StreamKey>,
    log_filter: String,
    log_follow: bool,
    log_top: usize,
    table_offset: usize,
    table_rows: usize,
    log_rows: usize,
}

impl App {
    pub fn new(cluster: ClusterInfo, namespace_scope: NamespaceScope) -> Self {
        let tabs = ResourceTab::for_flavor(cluster.flavor);
        let tables = tabs
            .iter()
            .map(|tab| (*tab, TableData::default()))
            .collect();

        Self {
            running: true,
            status: StatusLine {
                text: format!("Connected to {}", cluster.context),
                severity: Severity::Info,
            },
            cluster,
            tabs,
            active_tab_index: 0,
            tables,
            namespace_scope,
            filter: String::new(),
            filter_before_search: String::new(),
            input: String::new(),
            show_help: false,
            pending_confirmation: None,
            error_modal: None,
            last_error: None,
            detail_visible: true,
            detail_scroll: 0,
            log_visible: false,
            log_target: None,
            log_filter: String::new(),
            log_follow: true,
            log_top: 0,
            table_offset: 0,
            table_rows: 10,
            log_rows: 5,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn cluster(&self) -> &ClusterInfo {
        &self.cluster
    }

    pub fn tab_titles(&self) -> Vec<&'static str> {
        self.tabs.iter().map(|tab| tab.title()).collect()
    }

    pub fn active_tab_index(&self) -> usize {
        self.active_tab_index
    }

    pub fn active_tab(&self) -> ResourceTab {
        self.tabs
            .get(self.active_tab_index)
            .copied()
            .unwrap_or(ResourceTab::Pods)
    }

    pub fn active_table(&self) -> Option<&TableData> {
        self.tables.get(&self.active_tab())
    }

    pub fn namespace_scope(&self) -> &NamespaceScope {
        &self.namespace_scope
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn pending_confirmation_prompt(&self) -> Option<&str> {
        self.pending_confirmation
            .as_ref()
            .map(|pending| pending.prompt.as_str())
    }

    pub fn error_modal(&self) -> Option<&AppError> {
        self.error_modal.as_ref()
    }

    pub fn detail_visible(&self) -> bool {
        self.detail_visible
    }

    pub fn detail_scroll(&self) -> u16 {
        self.detail_scroll
    }

    pub fn log_visible(&self) -> bool {
        self.log_visible
    }

    pub fn log_target(&self) -> Option<&StreamKey> {
        self.log_target.as_ref()
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn log_follow(&self) -> bool {
        self.log_follow
    }

    pub fn table_offset(&self) -> usize {
        self.table_offset
    }

    pub fn visible_rows(&self) -> Vec<&RowData> {
        let Some(table) = self.active_table() else {
            return Vec::new();
        };
        table
            .rows
            .iter()
            .filter(|row| row.matches_filter(&self.filter))
            .collect()
    }

    pub fn selected_index(&self) -> Option<usize> {
        let len = self.visible_rows().len();
        if len == 0 {
            return None;
        }
        self.active_table()
            .map(|table| table.selected.min(len - 1))
    }

    pub fn selected_row(&self) -> Option<&RowData> {
        let index = self.selected_index()?;
        self.visible_rows().get(index).copied()
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = StatusLine {
            text: text.into(),
            severity: Severity::Info,
        };
    }

    pub fn set_cluster(&mut self, cluster: ClusterInfo) {
        if cluster.flavor != self.cluster.flavor {
            let active = self.active_tab();
            self.tabs = ResourceTab::for_flavor(cluster.flavor);
            for tab in &self.tabs {
                self.tables.entry(*tab).or_default();
            }
            self.active_tab_index = self
                .tabs
                .iter()
                .position(|tab| *tab == active)
                .unwrap_or(0);
        }
        self.cluster = cluster;
    }

    pub fn set_namespace_scope(&mut self, scope: NamespaceScope) {
        self.namespace_scope = scope;
        self.reset_table_view();
    }

    /// Viewport sizes from the current layout, used for paging and scrolling.
    pub fn set_viewport(&mut self, table_rows: usize, log_rows: usize) {
        self.table_rows = table_rows.max(1);
        self.log_rows = log_rows.max(1);
        self.keep_selection_visible();
    }

    pub fn set_log_target(&mut self, target: Option<StreamKey>) {
        self.log_follow = true;
        self.log_top = 0;
        self.log_target = target;
    }

    pub fn hide_logs(&mut self) {
        self.log_visible = false;
        self.log_target = None;
    }

    /// Surfaces an error by severity: status line below Error, modal at or above.
    pub fn report_error(&mut self, error: AppError) {
        debug!(category = %error.category, severity = ?error.severity, "reporting error");
        if error.severity.needs_modal() {
            self.error_modal = Some(error.clone());
        }
        self.status = StatusLine {
            text: error.to_string(),
            severity: error.severity,
        };
        self.last_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.error_modal = None;
        self.last_error = None;
    }

    /// Applies a listing result. Results for a scope other than the current
    /// one are discarded; returns whether the result was applied.
    pub fn apply_table(
        &mut self,
        tab: ResourceTab,
        scope: &NamespaceScope,
        result: AppResult<ResourceList>,
    ) -> bool {
        if *scope != self.namespace_scope {
            debug!(tab = tab.title(), scope = %scope, "dropping stale listing");
            return false;
        }
        let Some(table) = self.tables.get_mut(&tab) else {
            return false;
        };

        match result {
            Ok(list) => {
                table.set_rows(list.headers, list.rows, Local::now());
            }
            Err(error) => {
                table.set_error(error.message.clone(), Local::now());
                self.report_error(error);
            }
        }
        self.clamp_selection(tab);
        true
    }

    pub fn apply_detail(&mut self, tab: ResourceTab, row: RowData) {
        if let Some(table) = self.tables.get_mut(&tab) {
            table.upsert(row);
        }
    }

    pub fn apply_resource_event(&mut self, event: ResourceEvent) -> bool {
        if let (NamespaceScope::Named(scope), Some(namespace)) =
            (&self.namespace_scope, event.resource.namespace.as_deref())
            && scope != namespace
        {
            return false;
        }
        if !self.tables.contains_key(&event.tab) {
            return false;
        }

        let selected_name = if event.tab == self.active_tab() {
            self.selected_row().map(RowData::qualified_name)
        } else {
            None
        };
        if let Some(table) = self.tables.get_mut(&event.tab) {
            match event.kind {
                ResourceEventKind::Added | ResourceEventKind::Modified => {
                    table.upsert(event.resource)
                }
                ResourceEventKind::Deleted => {
                    table.remove(&event.resource);
                }
            }
        }

        if let Some(selected_name) = selected_name
            && let Some(index) = self
                .visible_rows()
                .iter()
                .position(|row| row.qualified_name() == selected_name)
            && let Some(table) = self.tables.get_mut(&event.tab)
        {
            table.selected = index;
        }
        self.clamp_selection(event.tab);
        true
    }

    /// Selects a visible row by index, as produced by a mouse click.
    pub fn select_visible_row(&mut self, index: usize) -> bool {
        let len = self.visible_rows().len();
        if index >= len {
            return false;
        }
        if let Some(table) = self.tables.get_mut(&self.active_tab()) {
            table.selected = index;
        }
        self.keep_selection_visible();
        true
    }

    pub fn select_tab(&mut self, index: usize) -> AppCommand {
        if index >= self.tabs.len() {
            self.set_status(format!("No tab {}", index + 1));
            return AppCommand::None;
        }
        if index == self.active_tab_index {
            return AppCommand::None;
        }
        self.active_tab_index = index;
        self.on_tab_changed()
    }

    /// Range of filtered log lines to show for `total` matching lines.
    pub fn log_window(&self, total: usize) -> Range<usize> {
        let rows = self.log_rows;
        let max_start = total.saturating_sub(rows);
        let start = if self.log_follow {
            max_start
        } else {
            self.log_top.min(max_start)
        };
        start..(start + rows).min(total)
    }

    pub fn apply_action(&mut self, action: Action, ctx: ActionContext) -> AppCommand {
        if let Some(pending) = self.pending_confirmation.take() {
            match action {
                Action::ConfirmYes | Action::Submit => {
                    self.set_status(format!("Confirmed: {}", pending.prompt));
                    return pending.command;
                }
                Action::ConfirmNo | Action::Escape | Action::EnterNormal => {
                    self.set_status("Action cancelled");
                    return AppCommand::None;
                }
                Action::Quit => {}
                _ => {
                    self.pending_confirmation = Some(pending);
                    self.set_status("Pending confirmation: press y to confirm or n to cancel");
                    return AppCommand::None;
                }
            }
        }

        if let Some(error) = self.error_modal.clone() {
            match action {
                Action::Escape | Action::Submit | Action::EnterNormal => {
                    self.error_modal = None;
                    return AppCommand::None;
                }
                Action::Recover | Action::Refresh => {
                    self.error_modal = None;
                    return self.recover(&error);
                }
                Action::Quit => {}
                _ => return AppCommand::None,
            }
        }

        if self.show_help && !matches!(action, Action::ToggleHelp) {
            self.show_help = false;
            if matches!(action, Action::Escape) {
                return AppCommand::None;
            }
        }

        match action {
            Action::Quit => {
                self.running = false;
                self.set_status("Exit requested");
                AppCommand::None
            }
            Action::Up => self.scroll(ctx, -1),
            Action::Down => self.scroll(ctx, 1),
            Action::PageUp => self.scroll(ctx, -(self.page_step(ctx.focus) as isize)),
            Action::PageDown => self.scroll(ctx, self.page_step(ctx.focus) as isize),
            Action::Top => self.jump(ctx, false),
            Action::Bottom => self.jump(ctx, true),
            Action::NextTab => self.switch_tab_by_offset(1),
            Action::PrevTab => self.switch_tab_by_offset(-1),
            Action::SelectTab(index) => self.select_tab(index),
            Action::FocusNext | Action::FocusPrev => AppCommand::None,
            Action::ToggleDetail => {
                self.detail_visible = !self.detail_visible;
                self.detail_scroll = 0;
                if self.detail_visible {
                    self.load_detail_command()
                } else {
                    AppCommand::None
                }
            }
            Action::ToggleLogs => {
                if self.log_visible {
                    self.hide_logs();
                    self.set_status("Logs closed");
                    AppCommand::StopLogs
                } else {
                    self.show_logs_command()
                }
            }
            Action::ToggleFollow => {
                self.log_follow = !self.log_follow;
                if !self.log_follow {
                    self.log_top = ctx.log_len.saturating_sub(self.log_rows);
                }
                self.set_status(if self.log_follow {
                    "Log follow on"
                } else {
                    "Log follow off"
                });
                AppCommand::None
            }
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                AppCommand::None
            }
            Action::Refresh => {
                self.set_status(format!("Refreshing {}", self.active_tab().title()));
                AppCommand::RefreshActive
            }
            Action::Delete => self.prepare_delete_confirmation(),
            Action::Recover => match self.last_error.clone() {
                Some(error) => self.recover(&error),
                None => {
                    self.set_status("No error to recover from");
                    AppCommand::None
                }
            },
            Action::EnterSearch => {
                self.filter_before_search = self.filter.clone();
                self.input = self.filter.clone();
                AppCommand::None
            }
            Action::EnterCommand => {
                self.input.clear();
                AppCommand::None
            }
            Action::EnterInsert => {
                if !self.log_visible {
                    self.set_status("Open the log pane (l) before editing its filter");
                    return AppCommand::None;
                }
                self.input = self.log_filter.clone();
                AppCommand::None
            }
            Action::InputChar(c) => {
                self.input.push(c);
                self.on_input_changed(ctx.mode);
                AppCommand::None
            }
            Action::Backspace => {
                self.input.pop();
                self.on_input_changed(ctx.mode);
                AppCommand::None
            }
            Action::DeleteWord => {
                let trimmed = self.input.trim_end().len();
                self.input.truncate(trimmed);
                let cut = self
                    .input
                    .rfind(char::is_whitespace)
                    .map(|index| index + 1)
                    .unwrap_or(0);
                self.input.truncate(cut);
                self.on_input_changed(ctx.mode);
                AppCommand::None
            }
            Action::Submit => match ctx.mode {
                NavigationMode::Command => {
                    let line = std::mem::take(&mut self.input);
                    self.execute_command_line(&line)
                }
                NavigationMode::Search => {
                    self.input.clear();
                    self.set_status(if self.filter.is_empty() {
                        "Filter cleared".to_string()
                    } else {
                        format!("Filter: {}", self.filter)
                    });
                    AppCommand::None
                }
                NavigationMode::Insert => {
                    self.input.clear();
                    AppCommand::None
                }
                NavigationMode::Normal => AppCommand::None,
            },
            Action::EnterNormal => {
                if ctx.mode == NavigationMode::Search {
                    self.filter = std::mem::take(&mut self.filter_before_search);
                    self.reset_table_view();
                }
                self.input.clear();
                AppCommand::None
            }
            Action::Escape => {
                if !self.filter.is_empty() {
                    self.filter.clear();
                    self.reset_table_view();
                    self.set_status("Filter cleared");
                }
                AppCommand::None
            }
            Action::ConfirmYes | Action::ConfirmNo => AppCommand::None,
        }
    }

    fn recover(&mut self, error: &AppError) -> AppCommand {
        match error.recovery_action() {
            Some(action) => {
                info!(action = action.label(), "running recovery");
                self.last_error = None;
                self.set_status(format!("Recovery: {}", action.label()));
                AppCommand::Recover(action)
            }
            None => {
                self.set_status(format!("No recovery for {} errors", error.category));
                AppCommand::None
            }
        }
    }

    fn on_input_changed(&mut self, mode: NavigationMode) {
        match mode {
            NavigationMode::Search => {
                self.filter = self.input.clone();
                self.reset_table_view();
            }
            NavigationMode::Insert => {
                self.log_filter = self.input.clone();
                self.log_top = 0;
            }
            NavigationMode::Command | NavigationMode::Normal => {}
        }
    }

    fn execute_command_line(&mut self, line: &str) -> AppCommand {
        let line = line.trim().trim_start_matches(':').trim();
        if line.is_empty() {
            self.set_status("No command entered");
            return AppCommand::None;
        }

        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default().to_ascii_lowercase();

        match command.as_str() {
            "q" | "quit" | "exit" => {
                self.running = false;
                self.set_status("Exit requested");
                AppCommand::None
            }
            "refresh" | "reload" | "r" => AppCommand::RefreshActive,
            "help" | "h" | "?" => {
                self.show_help = true;
                AppCommand::None
            }
            "logs" | "log" => {
                if self.log_visible {
                    return AppCommand::None;
                }
                self.show_logs_command()
            }
            "ctx" | "context" => {
                let Some(context) = parts.next() else {
                    self.set_status(format!("Current context: {}", self.cluster.context));
                    return AppCommand::None;
                };
                self.set_status(format!("Switching context to '{context}'"));
                AppCommand::SwitchContext {
                    context: context.to_string(),
                }
            }
            "ns" | "namespace" => match parts.next() {
                Some("all") | Some("*") => {
                    self.set_namespace_scope(NamespaceScope::All);
                    self.set_status("Namespace scope set to all");
                    AppCommand::ScopeChanged
                }
                Some(namespace) => {
                    self.set_namespace_scope(NamespaceScope::Named(namespace.to_string()));
                    self.set_status(format!("Namespace scope set to '{namespace}'"));
                    AppCommand::ScopeChanged
                }
                None => self.switch_to_tab(ResourceTab::Namespaces),
            },
            token => match ResourceTab::from_token(token) {
                Some(tab) => self.switch_to_tab(tab),
                None => {
                    self.set_status(format!("Unknown command '{token}'"));
                    AppCommand::None
                }
            },
        }
    }

    fn switch_to_tab(&mut self, tab: ResourceTab) -> AppCommand {
        match self.tabs.iter().position(|candidate| *candidate == tab) {
            Some(index) => self.select_tab(index),
            None => {
                self.set_status(format!("{} is not available on this cluster", tab.title()));
                AppCommand::None
            }
        }
    }

    fn switch_tab_by_offset(&mut self, delta: isize) -> AppCommand {
        if self.tabs.is_empty() {
            return AppCommand::None;
        }
        let len = self.tabs.len() as isize;
        let next = (self.active_tab_index as isize + delta).rem_euclid(len) as usize;
        self.active_tab_index = next;
        self.on_tab_changed()
    }

    fn on_tab_changed(&mut self) -> AppCommand {
        self.table_offset = 0;
        self.detail_scroll = 0;
        self.set_status(format!("Viewing {}", self.active_tab().title()));
        AppCommand::TabChanged
    }

    fn show_logs_command(&mut self) -> AppCommand {
        let tab = self.active_tab();
        if !tab.supports_logs() {
            self.set_status(format!("Logs are not available for {}", tab.title()));
            return AppCommand::None;
        }
        let Some(row) = self.selected_row().cloned() else {
            self.set_status("No selected resource");
            return AppCommand::None;
        };
        self.log_visible = true;
        self.log_follow = true;
        self.set_status(format!("Resolving logs for {}", row.qualified_name()));
        AppCommand::ShowLogs { tab, row }
    }

    fn load_detail_command(&self) -> AppCommand {
        match self.selected_row() {
            Some(row) => AppCommand::LoadDetail {
                tab: self.active_tab(),
                namespace: row.namespace.clone(),
                name: row.name.clone(),
            },
            None => AppCommand::None,
        }
    }

    fn prepare_delete_confirmation(&mut self) -> AppCommand {
        let tab = self.active_tab();
        if !tab.supports_delete() {
            self.set_status(format!("Delete is not supported for {}", tab.title()));
            return AppCommand::None;
        }

        let Some(row) = self.selected_row() else {
            self.set_status("No selected resource to delete");
            return AppCommand::None;
        };

        let namespace = if tab.is_namespaced() {
            row.namespace.clone()
        } else {
            None
        };
        let name = row.name.clone();
        let prompt = match &namespace {
            Some(ns) => format!("Delete {} {ns}/{name}", tab.kind()),
            None => format!("Delete {} {name}", tab.kind()),
        };

        self.pending_confirmation = Some(PendingConfirmation {
            prompt: prompt.clone(),
            command: AppCommand::Delete {
                tab,
                namespace,
                name,
            },
        });
        self.set_status(format!("{prompt}? [y/n]"));
        AppCommand::None
    }

    fn page_step(&self, focus: Panel) -> usize {
        match focus {
            Panel::Log => self.log_rows.max(1),
            Panel::Detail => 10,
            _ => self.table_rows.max(1),
        }
    }

    fn scroll(&mut self, ctx: ActionContext, delta: isize) -> AppCommand {
        match ctx.focus {
            Panel::Detail => {
                let next = (self.detail_scroll as isize + delta).max(0);
                self.detail_scroll = next.min(self.detail_max_scroll() as isize) as u16;
                AppCommand::None
            }
            Panel::Log => {
                let max_start = ctx.log_len.saturating_sub(self.log_rows);
                let current = if self.log_follow {
                    max_start
                } else {
                    self.log_top.min(max_start)
                };
                let next = (current as isize + delta).clamp(0, max_start as isize) as usize;
                self.log_top = next;
                self.log_follow = next == max_start && delta > 0;
                AppCommand::None
            }
            _ => {
                let previous = self.selected_index();
                self.move_selection(delta);
                self.after_selection_moved(previous)
            }
        }
    }

    fn jump(&mut self, ctx: ActionContext, bottom: bool) -> AppCommand {
        match ctx.focus {
            Panel::Detail => {
                self.detail_scroll = if bottom { self.detail_max_scroll() } else { 0 };
                AppCommand::None
            }
            Panel::Log => {
                self.log_follow = bottom;
                self.log_top = 0;
                AppCommand::None
            }
            _ => {
                let previous = self.selected_index();
                let len = self.visible_rows().len();
                if let Some(table) = self.tables.get_mut(&self.active_tab()) {
                    table.selected = if bottom { len.saturating_sub(1) } else { 0 };
                }
                self.after_selection_moved(previous)
            }
        }
    }

    fn after_selection_moved(&mut self, previous: Option<usize>) -> AppCommand {
        self.keep_selection_visible();
        if self.selected_index() != previous {
            self.detail_scroll = 0;
        }
        AppCommand::None
    }

    fn detail_max_scroll(&self) -> u16 {
        self.selected_row()
            .map(|row| row.detail.lines().count().saturating_sub(1))
            .unwrap_or(0)
            .min(u16::MAX as usize) as u16
    }

    fn move_selection(&mut self, delta: isize) {
        let visible_len = self.visible_rows().len();
        let Some(table) = self.tables.get_mut(&self.active_tab()) else {
            return;
        };

        if visible_len == 0 {
            table.selected = 0;
            return;
        }

        let max_index = visible_len.saturating_sub(1) as isize;
        let current = table.selected.min(max_index as usize) as isize;
        table.selected = (current + delta).clamp(0, max_index) as usize;
    }

    fn clamp_selection(&mut self, tab: ResourceTab) {
        let filter = self.filter.clone();
        if let Some(table) = self.tables.get_mut(&tab) {
            let visible_len = table
                .rows
                .iter()
                .filter(|row| row.matches_filter(&filter))
                .count();
            table.selected = table.selected.min(visible_len.saturating_sub(1));
        }
        if tab == self.active_tab() {
            self.keep_selection_visible();
        }
    }

    fn keep_selection_visible(&mut self) {
        let len = self.visible_rows().len();
        let rows = self.table_rows.max(1);
        let selected = self.selected_index().unwrap_or(0);

        if selected < self.table_offset {
            self.table_offset = selected;
        } else if selected >= self.table_offset + rows {
            self.table_offset = selected + 1 - rows;
        }
        self.table_offset = self.table_offset.min(len.saturating_sub(rows));
    }

    fn reset_table_view(&mut self) {
        if let Some(table) = self.tables.get_mut(&self.active_tab()) {
            table.selected = 0;
        }
        self.table_offset = 0;
        self.detail_scroll = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionContext, App, AppCommand};
    use crate::client::{ClusterInfo, ResourceList};
    use crate::error::{AppError, ErrorCategory, RecoveryAction, Severity};
    use crate::layout::Panel;
    use crate::model::{ClusterFlavor, NamespaceScope, ResourceTab};
    use crate::navigation::{Action, NavigationMode};
    use crate::testing::row;
    use crate::watch::{ResourceEvent, ResourceEventKind};
    use chrono::Local;

    fn cluster() -> ClusterInfo {
        ClusterInfo {
            cluster: "kind".to_string(),
            context: "kind".to_string(),
            user: "admin".to_string(),
            namespace: "default".to_string(),
            flavor: ClusterFlavor::Kubernetes,
        }
    }

    fn scope() -> NamespaceScope {
        NamespaceScope::Named("default".to_string())
    }

    fn app_with_pods(names: &[&str]) -> App {
        let mut app = App::new(cluster(), scope());
        let rows = names.iter().map(|name| row("default", name)).collect();
        app.apply_table(
            ResourceTab::Pods,
            &scope(),
            Ok(ResourceList {
                headers: vec!["Name".to_string()],
                rows,
            }),
        );
        app
    }

    fn normal() -> ActionContext {
        ActionContext::default()
    }

    fn in_mode(mode: NavigationMode) -> ActionContext {
        ActionContext {
            mode,
            ..ActionContext::default()
        }
    }

    fn event(kind: ResourceEventKind, namespace: &str, name: &str) -> ResourceEvent {
        ResourceEvent {
            kind,
            tab: ResourceTab::Pods,
            resource: row(namespace, name),
            timestamp: Local::now(),
            generation: 1,
        }
    }

    #[test]
    fn tab_navigation_wraps_and_reports_change() {
        let mut app = App::new(cluster(), scope());
        assert_eq!(app.apply_action(Action::PrevTab, normal()), AppCommand::TabChanged);
        assert_eq!(app.active_tab(), ResourceTab::Events);
        assert_eq!(app.apply_action(Action::NextTab, normal()), AppCommand::TabChanged);
        assert_eq!(app.active_tab(), ResourceTab::Pods);
        assert_eq!(
            app.apply_action(Action::SelectTab(5), normal()),
            AppCommand::TabChanged
        );
        assert_eq!(app.active_tab(), ResourceTab::Services);
        assert_eq!(app.apply_action(Action::SelectTab(40), normal()), AppCommand::None);
    }

    #[test]
    fn selection_moves_and_clamps() {
        let mut app = app_with_pods(&["a", "b", "c"]);
        app.apply_action(Action::Down, normal());
        app.apply_action(Action::Down, normal());
        app.apply_action(Action::Down, normal());
        assert_eq!(app.selected_row().map(|row| row.name.as_str()), Some("c"));
        app.apply_action(Action::Top, normal());
        assert_eq!(app.selected_index(), Some(0));
        app.apply_action(Action::Bottom, normal());
        assert_eq!(app.selected_index(), Some(2));
    }

    #[test]
    fn table_offset_follows_selection() {
        let names = (0..30).map(|i| format!("pod-{i:02}")).collect::<Vec<_>>();
        let refs = names.iter().map(String::as_str).collect::<Vec<_>>();
        let mut app = app_with_pods(&refs);
        app.set_viewport(10, 5);

        app.apply_action(Action::PageDown, normal());
        assert_eq!(app.selected_index(), Some(10));
        assert_eq!(app.table_offset(), 1);
        app.apply_action(Action::Bottom, normal());
        assert_eq!(app.table_offset(), 20);
        app.apply_action(Action::Top, normal());
        assert_eq!(app.table_offset(), 0);
        assert!(app.select_visible_row(4));
        assert!(!app.select_visible_row(30));
    }

    #[test]
    fn search_filters_live_and_escape_restores() {
        let mut app = app_with_pods(&["api", "worker", "web"]);
        app.apply_action(Action::EnterSearch, normal());
        app.apply_action(Action::InputChar('w'), in_mode(NavigationMode::Search));
        assert_eq!(app.visible_rows().len(), 2);
        app.apply_action(Action::InputChar('o'), in_mode(NavigationMode::Search));
        assert_eq!(app.visible_rows().len(), 1);

        app.apply_action(Action::EnterNormal, in_mode(NavigationMode::Search));
        assert_eq!(app.filter(), "");
        assert_eq!(app.visible_rows().len(), 3);

        app.apply_action(Action::EnterSearch, normal());
        app.apply_action(Action::InputChar('a'), in_mode(NavigationMode::Search));
        app.apply_action(Action::Submit, in_mode(NavigationMode::Search));
        assert_eq!(app.filter(), "a");
        app.apply_action(Action::Escape, normal());
        assert_eq!(app.filter(), "");
    }

    #[test]
    fn command_line_switches_scope_and_tabs() {
        let mut app = App::new(cluster(), scope());
        let command = in_mode(NavigationMode::Command);

        for c in "ns kube-system".chars() {
            app.apply_action(Action::InputChar(c), command);
        }
        assert_eq!(app.apply_action(Action::Submit, command), AppCommand::ScopeChanged);
        assert_eq!(
            app.namespace_scope(),
            &NamespaceScope::Named("kube-system".to_string())
        );

        for c in "svc".chars() {
            app.apply_action(Action::InputChar(c), command);
        }
        assert_eq!(app.apply_action(Action::Submit, command), AppCommand::TabChanged);
        assert_eq!(app.active_tab(), ResourceTab::Services);

        for c in "route".chars() {
            app.apply_action(Action::InputChar(c), command);
        }
        assert_eq!(app.apply_action(Action::Submit, command), AppCommand::None);
        assert!(app.status().text.contains("not available"));

        for c in "ctx prod".chars() {
            app.apply_action(Action::InputChar(c), command);
        }
        assert_eq!(
            app.apply_action(Action::Submit, command),
            AppCommand::SwitchContext {
                context: "prod".to_string()
            }
        );
    }

    #[test]
    fn delete_word_removes_last_token() {
        let mut app = App::new(cluster(), scope());
        let command = in_mode(NavigationMode::Command);
        for c in "ns kube-system ".chars() {
            app.apply_action(Action::InputChar(c), command);
        }
        app.apply_action(Action::DeleteWord, command);
        assert_eq!(app.input(), "ns ");
    }

    #[test]
    fn delete_requires_confirmation() {
        let mut app = app_with_pods(&["api"]);
        assert_eq!(app.apply_action(Action::Delete, normal()), AppCommand::None);
        assert_eq!(app.pending_confirmation_prompt(), Some("Delete Pod default/api"));

        assert_eq!(app.apply_action(Action::Down, normal()), AppCommand::None);
        assert!(app.pending_confirmation_prompt().is_some());

        assert_eq!(
            app.apply_action(Action::ConfirmYes, normal()),
            AppCommand::Delete {
                tab: ResourceTab::Pods,
                namespace: Some("default".to_string()),
                name: "api".to_string(),
            }
        );

        app.apply_action(Action::Delete, normal());
        assert_eq!(app.apply_action(Action::ConfirmNo, normal()), AppCommand::None);
        assert!(app.pending_confirmation_prompt().is_none());
    }

    #[test]
    fn stale_scope_listing_is_dropped() {
        let mut app = App::new(cluster(), scope());
        let applied = app.apply_table(
            ResourceTab::Pods,
            &NamespaceScope::All,
            Ok(ResourceList {
                headers: Vec::new(),
                rows: vec![row("other", "x")],
            }),
        );
        assert!(!applied);
        assert!(app.visible_rows().is_empty());
    }

    #[test]
    fn resource_events_upsert_and_delete_in_scope() {
        let mut app = app_with_pods(&["a", "c"]);
        app.apply_action(Action::Down, normal());

        assert!(app.apply_resource_event(event(ResourceEventKind::Added, "default", "b")));
        assert_eq!(app.visible_rows().len(), 3);
        assert_eq!(app.selected_row().map(|row| row.name.as_str()), Some("c"));

        assert!(!app.apply_resource_event(event(ResourceEventKind::Added, "other", "z")));
        assert!(app.apply_resource_event(event(ResourceEventKind::Deleted, "default", "c")));
        assert_eq!(app.visible_rows().len(), 2);
        assert_eq!(app.selected_index(), Some(1));
    }

    #[test]
    fn errors_route_by_severity_and_recover() {
        let mut app = App::new(cluster(), scope());

        app.report_error(AppError::not_found("pod gone"));
        assert!(app.error_modal().is_none());
        assert_eq!(app.status().severity, Severity::Warning);
        assert_eq!(
            app.apply_action(Action::Recover, normal()),
            AppCommand::Recover(RecoveryAction::RefreshListing)
        );

        app.report_error(AppError::connection("refused"));
        assert!(app.error_modal().is_some());
        assert_eq!(app.apply_action(Action::Down, normal()), AppCommand::None);
        assert_eq!(
            app.apply_action(Action::Refresh, normal()),
            AppCommand::Recover(RecoveryAction::RetryConnection)
        );
        assert!(app.error_modal().is_none());

        app.report_error(AppError::new(ErrorCategory::Configuration, "bad kubeconfig"));
        app.apply_action(Action::Escape, normal());
        assert!(app.error_modal().is_none());

        app.report_error(AppError::critical(ErrorCategory::General, "boom"));
        assert!(app.error_modal().is_some());
        assert!(app.running());
    }

    #[test]
    fn logs_toggle_requires_log_capable_tab() {
        let mut app = app_with_pods(&["api"]);
        match app.apply_action(Action::ToggleLogs, normal()) {
            AppCommand::ShowLogs { tab, row } => {
                assert_eq!(tab, ResourceTab::Pods);
                assert_eq!(row.name, "api");
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(app.log_visible());
        assert_eq!(app.apply_action(Action::ToggleLogs, normal()), AppCommand::StopLogs);
        assert!(!app.log_visible());

        app.select_tab(5);
        assert_eq!(app.apply_action(Action::ToggleLogs, normal()), AppCommand::None);
    }

    #[test]
    fn log_window_follows_or_scrolls() {
        let mut app = app_with_pods(&["api"]);
        app.set_viewport(10, 5);
        assert_eq!(app.log_window(3), 0..3);
        assert_eq!(app.log_window(20), 15..20);

        let ctx = ActionContext {
            focus: Panel::Log,
            mode: NavigationMode::Normal,
            log_len: 20,
        };
        app.apply_action(Action::Up, ctx);
        assert!(!app.log_follow());
        assert_eq!(app.log_window(20), 14..19);
        assert_eq!(app.log_window(40), 14..19);

        app.apply_action(Action::Bottom, ctx);
        assert!(app.log_follow());
        assert_eq!(app.log_window(40), 35..40);
    }

    #[test]
    fn insert_mode_edits_log_filter() {
        let mut app = app_with_pods(&["api"]);
        app.apply_action(Action::EnterInsert, normal());
        assert!(app.status().text.contains("log pane"));

        app.apply_action(Action::ToggleLogs, normal());
        app.apply_action(Action::EnterInsert, normal());
        for c in "err".chars() {
            app.apply_action(Action::InputChar(c), in_mode(NavigationMode::Insert));
        }
        assert_eq!(app.log_filter(), "err");
    }

    #[test]
    fn help_closes_on_other_action() {
        let mut app = App::new(cluster(), scope());
        app.apply_action(Action::ToggleHelp, normal());
        assert!(app.show_help());
        app.apply_action(Action::Escape, normal());
        assert!(!app.show_help());
    }

    #[test]
    fn openshift_flavor_switch_adds_tabs() {
        let mut app = App::new(cluster(), scope());
        app.select_tab(5);
        let mut info = cluster();
        info.flavor = ClusterFlavor::OpenShift;
        app.set_cluster(info);
        assert!(app.tab_titles().contains(&"Routes"));
        assert_eq!(app.active_tab(), ResourceTab::Services);
    }
}
