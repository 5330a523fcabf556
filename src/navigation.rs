use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;

pub const DEFAULT_SEQUENCE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum NavigationMode {
    #[default]
    Normal,
    Search,
    Command,
    Insert,
}

impl NavigationMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Search => "SEARCH",
            Self::Command => "COMMAND",
            Self::Insert => "INSERT",
        }
    }

    pub fn is_text_entry(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Up,
    Down,
    PageUp,
    PageDown,
    Top,
    Bottom,
    NextTab,
    PrevTab,
    SelectTab(usize),
    FocusNext,
    FocusPrev,
    ToggleDetail,
    ToggleLogs,
    ToggleFollow,
    ToggleHelp,
    Refresh,
    Delete,
    Recover,
    EnterSearch,
    EnterCommand,
    EnterInsert,
    EnterNormal,
    Escape,
    Submit,
    Backspace,
    DeleteWord,
    InputChar(char),
    ConfirmYes,
    ConfirmNo,
}

#[derive(Debug, Clone, Copy)]
pub struct KeyBinding {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
    pub action: Action,
    pub description: &'static str,
}

const fn bind(code: KeyCode, action: Action, description: &'static str) -> KeyBinding {
    KeyBinding {
        code,
        modifiers: KeyModifiers::NONE,
        action,
        description,
    }
}

const fn ctrl(c: char, action: Action, description: &'static str) -> KeyBinding {
    KeyBinding {
        code: KeyCode::Char(c),
        modifiers: KeyModifiers::CONTROL,
        action,
        description,
    }
}

pub const NORMAL_BINDINGS: &[KeyBinding] = &[
    bind(KeyCode::Char('q'), Action::Quit, "quit"),
    ctrl('c', Action::Quit, "quit"),
    bind(KeyCode::Char('j'), Action::Down, "move down"),
    bind(KeyCode::Down, Action::Down, "move down"),
    bind(KeyCode::Char('k'), Action::Up, "move up"),
    bind(KeyCode::Up, Action::Up, "move up"),
    bind(KeyCode::PageDown, Action::PageDown, "page down"),
    ctrl('f', Action::PageDown, "page down"),
    bind(KeyCode::PageUp, Action::PageUp, "page up"),
    ctrl('b', Action::PageUp, "page up"),
    bind(KeyCode::Char('G'), Action::Bottom, "jump to bottom"),
    bind(KeyCode::End, Action::Bottom, "jump to bottom"),
    bind(KeyCode::Home, Action::Top, "jump to top"),
    bind(KeyCode::Right, Action::NextTab, "next tab"),
    bind(KeyCode::Char(']'), Action::NextTab, "next tab"),
    bind(KeyCode::Left, Action::PrevTab, "previous tab"),
    bind(KeyCode::Char('['), Action::PrevTab, "previous tab"),
    bind(KeyCode::Tab, Action::FocusNext, "focus next panel"),
    bind(KeyCode::BackTab, Action::FocusPrev, "focus previous panel"),
    bind(KeyCode::Char('d'), Action::ToggleDetail, "toggle detail pane"),
    bind(KeyCode::Char('l'), Action::ToggleLogs, "toggle log pane"),
    bind(KeyCode::Char('f'), Action::ToggleFollow, "toggle log follow"),
    bind(KeyCode::Char('?'), Action::ToggleHelp, "toggle help"),
    bind(KeyCode::Char('r'), Action::Refresh, "refresh"),
    bind(KeyCode::Char('R'), Action::Recover, "run recovery action"),
    ctrl('d', Action::Delete, "delete selected resource"),
    bind(KeyCode::Char('y'), Action::ConfirmYes, "confirm"),
    bind(KeyCode::Char('n'), Action::ConfirmNo, "cancel"),
    bind(KeyCode::Char('/'), Action::EnterSearch, "search"),
    bind(KeyCode::Char(':'), Action::EnterCommand, "command"),
    bind(KeyCode::Char('i'), Action::EnterInsert, "edit log filter"),
    bind(KeyCode::Esc, Action::Escape, "close / clear"),
    bind(KeyCode::Enter, Action::Submit, "confirm"),
    bind(KeyCode::Char('1'), Action::SelectTab(0), "select tab 1"),
    bind(KeyCode::Char('2'), Action::SelectTab(1), "select tab 2"),
    bind(KeyCode::Char('3'), Action::SelectTab(2), "select tab 3"),
    bind(KeyCode::Char('4'), Action::SelectTab(3), "select tab 4"),
    bind(KeyCode::Char('5'), Action::SelectTab(4), "select tab 5"),
    bind(KeyCode::Char('6'), Action::SelectTab(5), "select tab 6"),
    bind(KeyCode::Char('7'), Action::SelectTab(6), "select tab 7"),
    bind(KeyCode::Char('8'), Action::SelectTab(7), "select tab 8"),
    bind(KeyCode::Char('9'), Action::SelectTab(8), "select tab 9"),
];

const TEXT_BINDINGS: &[KeyBinding] = &[
    bind(KeyCode::Esc, Action::EnterNormal, "leave input"),
    bind(KeyCode::Enter, Action::Submit, "submit"),
    bind(KeyCode::Backspace, Action::Backspace, "delete char"),
    ctrl('w', Action::DeleteWord, "delete word"),
    ctrl('c', Action::EnterNormal, "leave input"),
];

const SEARCH_EXTRA_BINDINGS: &[KeyBinding] = &[
    bind(KeyCode::Down, Action::Down, "move down"),
    bind(KeyCode::Up, Action::Up, "move up"),
];

/// Two-key chords available in normal mode.
#[derive(Debug, Clone, Copy)]
pub struct KeySequence {
    pub first: char,
    pub second: char,
    pub action: Action,
    pub description: &'static str,
}

pub const SEQUENCES: &[KeySequence] = &[KeySequence {
    first: 'g',
    second: 'g',
    action: Action::Top,
    description: "jump to top",
}];

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PendingKeySequence {
    pub first: char,
    pub started_at: Instant,
}

#[derive(Debug, Clone)]
pub struct NavigationController {
    mode: NavigationMode,
    pending: Option<PendingKeySequence>,
    sequence_timeout: Duration,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_TIMEOUT)
    }
}

impl NavigationController {
    pub fn new(sequence_timeout: Duration) -> Self {
        Self {
            mode: NavigationMode::Normal,
            pending: None,
            sequence_timeout,
        }
    }

    pub fn mode(&self) -> NavigationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: NavigationMode) {
        if mode != self.mode {
            debug!(from = self.mode.label(), to = mode.label(), "navigation mode");
        }
        self.mode = mode;
        self.pending = None;
    }

    pub fn pending_key(&self) -> Option<char> {
        self.pending.map(|pending| pending.first)
    }

    /// Drops a pending sequence key once it is older than the timeout.
    pub fn expire_pending(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(pending)
                if now.saturating_duration_since(pending.started_at) > self.sequence_timeout =>
            {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Whether `key` would quit in the current mode. Lets the runtime treat it
    /// as critical before any batching happens.
    pub fn requests_quit(&self, key: KeyEvent) -> bool {
        !self.mode.is_text_entry() && lookup(NORMAL_BINDINGS, key) == Some(Action::Quit)
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) -> Option<Action> {
        if self.mode.is_text_entry() {
            let action = map_text_key(self.mode, key)?;
            if matches!(action, Action::EnterNormal | Action::Submit) {
                self.set_mode(NavigationMode::Normal);
            }
            return Some(action);
        }

        if let Some(pending) = self.pending.take() {
            let within = now.saturating_duration_since(pending.started_at) <= self.sequence_timeout;
            if within && let Some(action) = complete_sequence(pending.first, key) {
                return Some(action);
            }
        }

        if let Some(first) = starts_sequence(key) {
            self.pending = Some(PendingKeySequence {
                first,
                started_at: now,
            });
            return None;
        }

        let action = lookup(NORMAL_BINDINGS, key)?;
        match action {
            Action::EnterSearch => self.set_mode(NavigationMode::Search),
            Action::EnterCommand => self.set_mode(NavigationMode::Command),
            Action::EnterInsert => self.set_mode(NavigationMode::Insert),
            _ => {}
        }
        Some(action)
    }
}

fn lookup(table: &[KeyBinding], key: KeyEvent) -> Option<Action> {
    table
        .iter()
        .find(|binding| binding_matches(binding, key))
        .map(|binding| binding.action)
}

fn binding_matches(binding: &KeyBinding, key: KeyEvent) -> bool {
    if binding.code != key.code {
        return false;
    }
    match key.code {
        // Shifted characters already arrive as the shifted char.
        KeyCode::Char(_) => key.modifiers.difference(KeyModifiers::SHIFT) == binding.modifiers,
        _ => key.modifiers == binding.modifiers,
    }
}

fn plain_char(key: KeyEvent) -> Option<char> {
    match key.code {
        KeyCode::Char(c) if key.modifiers.difference(KeyModifiers::SHIFT).is_empty() => Some(c),
        _ => None,
    }
}

fn starts_sequence(key: KeyEvent) -> Option<char> {
    let c = plain_char(key)?;
    SEQUENCES
        .iter()
        .any(|sequence| sequence.first == c)
        .then_some(c)
}

fn complete_sequence(first: char, key: KeyEvent) -> Option<Action> {
    let second = plain_char(key)?;
    SEQUENCES
        .iter()
        .find(|sequence| sequence.first == first && sequence.second == second)
        .map(|sequence| sequence.action)
}

fn map_text_key(mode: NavigationMode, key: KeyEvent) -> Option<Action> {
    if let Some(action) = lookup(TEXT_BINDINGS, key) {
        return Some(action);
    }
    if mode == NavigationMode::Search
        && let Some(action) = lookup(SEARCH_EXTRA_BINDINGS, key)
    {
        return Some(action);
    }
    plain_char(key).map(Action::InputChar)
}

pub fn key_label(code: KeyCode, modifiers: KeyModifiers) -> String {
    let name = match code {
        KeyCode::Char(' ') => "space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "enter".to_string(),
        KeyCode::Tab => "tab".to_string(),
        KeyCode::BackTab => "shift+tab".to_string(),
        KeyCode::Backspace => "backspace".to_string(),
        KeyCode::Esc => "esc".to_string(),
        KeyCode::Left => "left".to_string(),
        KeyCode::Right => "right".to_string(),
        KeyCode::Up => "up".to_string(),
        KeyCode::Down => "down".to_string(),
        KeyCode::Home => "home".to_string(),
        KeyCode::End => "end".to_string(),
        KeyCode::PageUp => "pgup".to_string(),
        KeyCode::PageDown => "pgdn".to_string(),
        KeyCode::F(n) => format!("f{n}"),
        other => format!("{other:?}").to_ascii_lowercase(),
    };

    let mut parts = Vec::new();
    if modifiers.contains(KeyModifiers::CONTROL) {
        parts.push("ctrl".to_string());
    }
    if modifiers.contains(KeyModifiers::ALT) {
        parts.push("alt".to_string());
    }
    parts.push(name);
    parts.join("+")
}

/// Help rows for normal mode, merging keys that share a description.
pub fn help_entries() -> Vec<(String, &'static str)> {
    let mut entries: Vec<(String, &'static str)> = Vec::new();
    for binding in NORMAL_BINDINGS {
        let label = key_label(binding.code, binding.modifiers);
        match entries
            .iter_mut()
            .find(|(_, description)| *description == binding.description)
        {
            Some((keys, _)) => {
                keys.push_str(" / ");
                keys.push_str(&label);
            }
            None => entries.push((label, binding.description)),
        }
    }
    for sequence in SEQUENCES {
        let label = format!("{}{}", sequence.first, sequence.second);
        match entries
            .iter_mut()
            .find(|(_, description)| *description == sequence.description)
        {
            Some((keys, _)) => {
                keys.push_str(" / ");
                keys.push_str(&label);
            }
            None => entries.push((label, sequence.description)),
        }
    }
    entries
}
