use ratatui::layout::Rect;
use serde::Deserialize;

/// Lines at the top of the main panel before the first resource row:
/// border/title, spacer, column header and separator.
pub const CONTENT_HEADER_LINES: u16 = 4;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Panel {
    Main,
    Detail,
    Log,
    StatusBar,
    Tabs,
    Header,
}

impl Panel {
    pub fn title(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Detail => "detail",
            Self::Log => "logs",
            Self::StatusBar => "status",
            Self::Tabs => "tabs",
            Self::Header => "header",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub detail_width_percent: u16,
    pub log_height_percent: u16,
    pub min_panel_width: u16,
    pub min_panel_height: u16,
    pub compact_height_threshold: u16,
    pub detail_min_terminal_width: u16,
    pub log_min_terminal_height: u16,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            detail_width_percent: 30,
            log_height_percent: 25,
            min_panel_width: 15,
            min_panel_height: 3,
            compact_height_threshold: 20,
            detail_min_terminal_width: 80,
            log_min_terminal_height: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LayoutRequest {
    pub width: u16,
    pub height: u16,
    pub detail_visible: bool,
    pub log_visible: bool,
    pub focus: Panel,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LayoutDimensions {
    pub width: u16,
    pub height: u16,
    pub header: Rect,
    pub tabs: Rect,
    pub main: Rect,
    pub detail: Option<Rect>,
    pub log: Option<Rect>,
    pub status: Rect,
    pub compact: bool,
    pub focus: Panel,
}

impl LayoutDimensions {
    pub fn rect(&self, panel: Panel) -> Option<Rect> {
        match panel {
            Panel::Header => Some(self.header),
            Panel::Tabs => Some(self.tabs),
            Panel::Main => Some(self.main),
            Panel::Detail => self.detail,
            Panel::Log => self.log,
            Panel::StatusBar => Some(self.status),
        }
    }

    /// Every laid out panel with a non-empty area, in paint order.
    pub fn panels(&self) -> Vec<(Panel, Rect)> {
        [
            Panel::Header,
            Panel::Tabs,
            Panel::Main,
            Panel::Detail,
            Panel::Log,
            Panel::StatusBar,
        ]
        .into_iter()
        .filter_map(|panel| self.rect(panel).map(|rect| (panel, rect)))
        .filter(|(_, rect)| rect.area() > 0)
        .collect()
    }

    pub fn panel_at(&self, x: u16, y: u16) -> Option<Panel> {
        self.panels()
            .into_iter()
            .find(|(_, rect)| contains(*rect, x, y))
            .map(|(panel, _)| panel)
    }

    pub fn first_resource_row(&self) -> u16 {
        self.main.y.saturating_add(CONTENT_HEADER_LINES)
    }

    /// Number of resource rows that fit inside the main panel.
    pub fn resource_rows(&self) -> usize {
        self.main.height.saturating_sub(CONTENT_HEADER_LINES + 1) as usize
    }
}

pub fn contains(rect: Rect, x: u16, y: u16) -> bool {
    x >= rect.x
        && y >= rect.y
        && (x as u32) < rect.x as u32 + rect.width as u32
        && (y as u32) < rect.y as u32 + rect.height as u32
}

pub fn compute_layout(config: &LayoutConfig, request: LayoutRequest) -> LayoutDimensions {
    let width = request.width;
    let height = request.height;
    let compact = height < config.compact_height_threshold;
    let chrome_line = if compact { 1 } else { 2 };

    let header_height = chrome_line.min(height);
    let tabs_height = chrome_line.min(height - header_height);
    let status_height = chrome_line.min(height - header_height - tabs_height);
    let body_height = height - header_height - tabs_height - status_height;

    let header = Rect::new(0, 0, width, header_height);
    let tabs = Rect::new(0, header_height, width, tabs_height);
    let body_y = header_height + tabs_height;
    let status = Rect::new(0, body_y + body_height, width, status_height);

    let log_height = if request.log_visible && height >= config.log_min_terminal_height {
        let wanted = ((height as u32 * config.log_height_percent as u32) / 100) as u16;
        let wanted = wanted.max(config.min_panel_height);
        if body_height >= wanted + config.min_panel_height {
            wanted
        } else {
            0
        }
    } else {
        0
    };
    let upper_height = body_height - log_height;
    let log = (log_height > 0).then(|| Rect::new(0, body_y + upper_height, width, log_height));

    let detail_width = if request.detail_visible && width >= config.detail_min_terminal_width {
        let wanted = ((width as u32 * config.detail_width_percent as u32) / 100) as u16;
        let wanted = wanted.max(config.min_panel_width);
        if width >= wanted + config.min_panel_width && upper_height > 0 {
            wanted
        } else {
            0
        }
    } else {
        0
    };
    let main_width = width - detail_width;
    let main = Rect::new(0, body_y, main_width, upper_height);
    let detail =
        (detail_width > 0).then(|| Rect::new(main_width, body_y, detail_width, upper_height));

    let focus = match request.focus {
        Panel::Detail if detail.is_none() => Panel::Main,
        Panel::Log if log.is_none() => Panel::Main,
        other => other,
    };

    LayoutDimensions {
        width,
        height,
        header,
        tabs,
        main,
        detail,
        log,
        status,
        compact,
        focus,
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TabSlot {
    pub index: usize,
    pub x: u16,
    pub width: u16,
}

const TAB_PADDING: u16 = 2;
const TAB_GAP: u16 = 1;

/// Horizontal placement of tab labels, centered in `area`. When all tabs do
/// not fit, a window of tabs around `active` is shown instead.
pub fn tab_slots(titles: &[&str], active: usize, area: Rect) -> Vec<TabSlot> {
    if titles.is_empty() || area.width == 0 {
        return Vec::new();
    }

    let widths = titles
        .iter()
        .map(|title| title.chars().count() as u16 + TAB_PADDING)
        .collect::<Vec<_>>();
    let active = active.min(titles.len() - 1);

    let span = |start: usize, end: usize| -> u32 {
        let tabs = widths[start..=end].iter().map(|w| *w as u32).sum::<u32>();
        tabs + (end - start) as u32 * TAB_GAP as u32
    };

    let (mut start, mut end) = (active, active);
    loop {
        let grew_right = end + 1 < widths.len() && span(start, end + 1) <= area.width as u32;
        if grew_right {
            end += 1;
        }
        let grew_left = start > 0 && span(start - 1, end) <= area.width as u32;
        if grew_left {
            start -= 1;
        }
        if !grew_right && !grew_left {
            break;
        }
    }

    let total = span(start, end).min(area.width as u32) as u16;
    let mut x = area.x + (area.width - total) / 2;
    let right_edge = area.x as u32 + area.width as u32;
    let mut slots = Vec::with_capacity(end - start + 1);
    for (index, width) in widths.iter().enumerate().take(end + 1).skip(start) {
        let available = (right_edge - x as u32) as u16;
        let width = (*width).min(available);
        if width == 0 {
            break;
        }
        slots.push(TabSlot { index, x, width });
        x = x.saturating_add(width + TAB_GAP);
        if x as u32 >= right_edge {
            break;
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::{LayoutConfig, LayoutRequest, Panel, compute_layout, contains, tab_slots};
    use ratatui::layout::Rect;

    fn request(width: u16, height: u16, detail: bool, log: bool) -> LayoutRequest {
        LayoutRequest {
            width,
            height,
            detail_visible: detail,
            log_visible: log,
            focus: Panel::Main,
        }
    }

    fn overlaps(left: Rect, right: Rect) -> bool {
        left.x < right.x + right.width
            && right.x < left.x + left.width
            && left.y < right.y + right.height
            && right.y < left.y + left.height
    }

    #[test]
    fn full_layout_matches_expected_rects() {
        let layout = compute_layout(&LayoutConfig::default(), request(100, 30, true, true));

        assert!(!layout.compact);
        assert_eq!(layout.header, Rect::new(0, 0, 100, 2));
        assert_eq!(layout.tabs, Rect::new(0, 2, 100, 2));
        assert_eq!(layout.main, Rect::new(0, 4, 70, 17));
        assert_eq!(layout.detail, Some(Rect::new(70, 4, 30, 17)));
        assert_eq!(layout.log, Some(Rect::new(0, 21, 100, 7)));
        assert_eq!(layout.status, Rect::new(0, 28, 100, 2));
        assert_eq!(layout.first_resource_row(), 8);
    }

    #[test]
    fn panels_never_overlap_and_cover_the_terminal() {
        let config = LayoutConfig::default();
        for width in [1u16, 10, 40, 79, 80, 81, 120, 300] {
            for height in [0u16, 1, 5, 14, 15, 19, 20, 30, 80] {
                for (detail, log) in [(false, false), (true, false), (false, true), (true, true)] {
                    let layout = compute_layout(&config, request(width, height, detail, log));
                    let panels = layout.panels();

                    for (index, (_, left)) in panels.iter().enumerate() {
                        for (_, right) in panels.iter().skip(index + 1) {
                            assert!(
                                !overlaps(*left, *right),
                                "overlap at {width}x{height}: {left:?} {right:?}"
                            );
                        }
                    }

                    let covered = panels
                        .iter()
                        .map(|(_, rect)| rect.area() as u64)
                        .sum::<u64>();
                    assert_eq!(covered, width as u64 * height as u64);
                }
            }
        }
    }

    #[test]
    fn narrow_terminal_hides_detail_panel() {
        let layout = compute_layout(&LayoutConfig::default(), request(79, 30, true, false));
        assert_eq!(layout.detail, None);
        assert_eq!(layout.main.width, 79);
    }

    #[test]
    fn short_terminal_uses_compact_chrome_and_hides_logs() {
        let layout = compute_layout(&LayoutConfig::default(), request(100, 14, false, true));
        assert!(layout.compact);
        assert_eq!(layout.header.height, 1);
        assert_eq!(layout.tabs.height, 1);
        assert_eq!(layout.status.height, 1);
        assert_eq!(layout.log, None);
    }

    #[test]
    fn focus_on_hidden_panel_falls_back_to_main() {
        let mut req = request(60, 30, true, false);
        req.focus = Panel::Detail;
        assert_eq!(compute_layout(&LayoutConfig::default(), req).focus, Panel::Main);
    }

    #[test]
    fn panel_at_resolves_coordinates() {
        let layout = compute_layout(&LayoutConfig::default(), request(100, 30, true, true));
        assert_eq!(layout.panel_at(0, 0), Some(Panel::Header));
        assert_eq!(layout.panel_at(10, 10), Some(Panel::Main));
        assert_eq!(layout.panel_at(75, 10), Some(Panel::Detail));
        assert_eq!(layout.panel_at(5, 25), Some(Panel::Log));
        assert_eq!(layout.panel_at(5, 29), Some(Panel::StatusBar));
        assert_eq!(layout.panel_at(100, 0), None);
        assert!(!contains(Rect::new(0, 0, 0, 0), 0, 0));
    }

    #[test]
    fn tab_slots_are_centered() {
        let slots = tab_slots(
            &["Pods", "Services", "Deployments"],
            0,
            Rect::new(0, 2, 100, 2),
        );
        let positions = slots
            .iter()
            .map(|slot| (slot.index, slot.x, slot.width))
            .collect::<Vec<_>>();
        assert_eq!(positions, vec![(0, 34, 6), (1, 41, 10), (2, 52, 13)]);
    }

    #[test]
    fn tab_slots_window_keeps_active_tab_visible() {
        let titles = ["Pods", "Services", "Deployments", "ConfigMaps", "Secrets"];
        let slots = tab_slots(&titles, 4, Rect::new(0, 0, 30, 1));
        assert!(slots.iter().any(|slot| slot.index == 4));
        let last = slots.last().map(|slot| slot.x + slot.width).unwrap_or(0);
        assert!(last <= 30);
    }
}
