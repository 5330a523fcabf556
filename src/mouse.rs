use crate::layout::{LayoutDimensions, Panel, contains, tab_slots};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ClickTarget {
    Tab(usize),
    Resource { panel: Panel, row: usize },
    Panel(Panel),
    Unhandled,
}

/// Everything hit-testing needs from the last rendered frame.
#[derive(Debug, Clone, Copy)]
pub struct HitContext<'a> {
    pub layout: &'a LayoutDimensions,
    pub tab_titles: &'a [&'a str],
    pub active_tab: usize,
    pub item_count: usize,
    pub scroll_offset: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MouseCoordinator;

impl MouseCoordinator {
    pub fn hit_test(&self, x: u16, y: u16, ctx: &HitContext<'_>) -> ClickTarget {
        let layout = ctx.layout;

        if layout.tabs.height > 0 && y == layout.tabs.y && contains(layout.tabs, x, y) {
            return tab_slots(ctx.tab_titles, ctx.active_tab, layout.tabs)
                .into_iter()
                .find(|slot| x >= slot.x && x < slot.x + slot.width)
                .map(|slot| ClickTarget::Tab(slot.index))
                .unwrap_or(ClickTarget::Panel(Panel::Tabs));
        }

        let Some(panel) = layout.panel_at(x, y) else {
            return ClickTarget::Unhandled;
        };

        if panel == Panel::Main {
            return self.resource_row(x, y, ctx);
        }
        ClickTarget::Panel(panel)
    }

    fn resource_row(&self, x: u16, y: u16, ctx: &HitContext<'_>) -> ClickTarget {
        let main = ctx.layout.main;
        let first = ctx.layout.first_resource_row();
        let bottom_border = (main.y + main.height).saturating_sub(1);
        let inner_left = main.x + 1;
        let inner_right = (main.x + main.width).saturating_sub(1);

        if y < first || y >= bottom_border || x < inner_left || x >= inner_right {
            return ClickTarget::Panel(Panel::Main);
        }

        let row = (y - first) as usize + ctx.scroll_offset;
        if row < ctx.item_count {
            ClickTarget::Resource {
                panel: Panel::Main,
                row,
            }
        } else {
            ClickTarget::Panel(Panel::Main)
        }
    }
}
