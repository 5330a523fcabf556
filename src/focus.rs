use std::collections::HashMap;

use tracing::debug;

use crate::layout::Panel;

/// Panels that can hold keyboard focus, in cycling order.
pub const FOCUS_ORDER: [Panel; 3] = [Panel::Main, Panel::Detail, Panel::Log];

#[derive(Debug, Clone)]
pub struct FocusManager {
    current: Panel,
    previous: Option<Panel>,
    order: Vec<Panel>,
    enabled: HashMap<Panel, bool>,
}

impl Default for FocusManager {
    fn default() -> Self {
        Self::new(FOCUS_ORDER.to_vec())
    }
}

impl FocusManager {
    pub fn new(order: Vec<Panel>) -> Self {
        let enabled = order
            .iter()
            .map(|panel| (*panel, *panel == Panel::Main))
            .collect();
        Self {
            current: Panel::Main,
            previous: None,
            order,
            enabled,
        }
    }

    pub fn current(&self) -> Panel {
        self.current
    }

    #[cfg(test)]
    pub fn previous(&self) -> Option<Panel> {
        self.previous
    }

    pub fn is_enabled(&self, panel: Panel) -> bool {
        self.enabled.get(&panel).copied().unwrap_or(false)
    }

    pub fn enabled_count(&self) -> usize {
        self.order
            .iter()
            .filter(|panel| self.is_enabled(**panel))
            .count()
    }

    /// Moves focus to `panel`. Returns false if the panel is unknown or disabled.
    pub fn focus(&mut self, panel: Panel) -> bool {
        if !self.is_enabled(panel) {
            debug!(panel = panel.title(), "focus rejected");
            return false;
        }
        if panel != self.current {
            self.previous = Some(self.current);
            self.current = panel;
        }
        true
    }

    pub fn set_enabled(&mut self, panel: Panel, enabled: bool) {
        if !self.enabled.contains_key(&panel) {
            return;
        }
        // Main always stays focusable.
        let enabled = enabled || panel == Panel::Main;
        self.enabled.insert(panel, enabled);

        if !enabled && self.current == panel {
            let fallback = self
                .previous
                .filter(|previous| *previous != panel && self.is_enabled(*previous))
                .unwrap_or(Panel::Main);
            self.previous = Some(panel);
            self.current = fallback;
        }
    }

    pub fn cycle_forward(&mut self) -> Panel {
        self.cycle(1)
    }

    pub fn cycle_backward(&mut self) -> Panel {
        self.cycle(self.order.len().saturating_sub(1))
    }

    fn cycle(&mut self, step: usize) -> Panel {
        let len = self.order.len();
        if len == 0 || self.enabled_count() == 0 {
            return self.current;
        }

        let start = self
            .order
            .iter()
            .position(|panel| *panel == self.current)
            .unwrap_or(0);

        let mut index = start;
        for _ in 0..len {
            index = (index + step) % len;
            let candidate = self.order[index];
            if self.is_enabled(candidate) {
                if candidate != self.current {
                    self.previous = Some(self.current);
                    self.current = candidate;
                }
                break;
            }
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::FocusManager;
    use crate::layout::Panel;

    fn all_enabled() -> FocusManager {
        let mut focus = FocusManager::default();
        focus.set_enabled(Panel::Detail, true);
        focus.set_enabled(Panel::Log, true);
        focus
    }

    #[test]
    fn cycling_enabled_count_times_returns_to_start() {
        let mut focus = all_enabled();
        let start = focus.current();
        for _ in 0..focus.enabled_count() {
            focus.cycle_forward();
        }
        assert_eq!(focus.current(), start);

        for _ in 0..focus.enabled_count() {
            focus.cycle_backward();
        }
        assert_eq!(focus.current(), start);
    }

    #[test]
    fn cycling_skips_disabled_panels() {
        let mut focus = all_enabled();
        focus.set_enabled(Panel::Detail, false);
        assert_eq!(focus.cycle_forward(), Panel::Log);
        assert_eq!(focus.cycle_forward(), Panel::Main);
        assert_eq!(focus.cycle_backward(), Panel::Log);
    }

    #[test]
    fn focusing_disabled_panel_is_rejected() {
        let mut focus = FocusManager::default();
        assert!(!focus.focus(Panel::Detail));
        assert_eq!(focus.current(), Panel::Main);
        assert!(!focus.focus(Panel::StatusBar));
    }

    #[test]
    fn disabling_focused_panel_falls_back() {
        let mut focus = all_enabled();
        assert!(focus.focus(Panel::Detail));
        assert!(focus.focus(Panel::Log));
        focus.set_enabled(Panel::Log, false);
        assert_eq!(focus.current(), Panel::Detail);

        focus.set_enabled(Panel::Detail, false);
        assert_eq!(focus.current(), Panel::Main);
    }

    #[test]
    fn main_cannot_be_disabled() {
        let mut focus = FocusManager::default();
        focus.set_enabled(Panel::Main, false);
        assert!(focus.is_enabled(Panel::Main));
        assert_eq!(focus.cycle_forward(), Panel::Main);
    }

    #[test]
    fn focus_tracks_previous_panel() {
        let mut focus = all_enabled();
        focus.focus(Panel::Log);
        assert_eq!(focus.previous(), Some(Panel::Main));
        focus.cycle_forward();
        assert_eq!(focus.current(), Panel::Main);
        assert_eq!(focus.previous(), Some(Panel::Log));
    }
}
