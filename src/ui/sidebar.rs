//! Sidebar composition
//!
//! ```text
//!  ● deploy          <- running panes, list order
//!  > shell
//! ──────────────────
//!  ✕ web             <- stopped panes, list order
//!
//!  [x] kill          <- hints for the selected pane
//!  [enter] focus
//!  [ctl-c] quit
//! ```

use crate::core::term::Color;
use crate::ui::surface::{Style, StyledCell, Surface, Viewport};
use crate::wm::{Focus, Pane};

const HIGHLIGHT: Color = Color::Indexed(208);
const MUTED: Color = Color::Indexed(8);

/// One line of the entry list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SidebarRow {
    /// Index into the pane list
    Entry(usize),
    Separator,
}

/// Pane indexes in display order: running (or starting) first, then
/// stopped, each group in list order.
pub fn display_order(panes: &[Pane]) -> Vec<usize> {
    let (live, dead): (Vec<usize>, Vec<usize>) =
        (0..panes.len()).partition(|&i| !panes[i].is_dead());
    live.into_iter().chain(dead).collect()
}

pub fn rows(panes: &[Pane]) -> Vec<SidebarRow> {
    let mut rows = Vec::with_capacity(panes.len() + 1);
    let mut seen_live = false;
    let mut separated = false;
    for index in display_order(panes) {
        if panes[index].is_dead() {
            if seen_live && !separated {
                rows.push(SidebarRow::Separator);
                separated = true;
            }
        } else {
            seen_live = true;
        }
        rows.push(SidebarRow::Entry(index));
    }
    rows
}

/// Footer hints, top to bottom
pub fn hints(selected: Option<&Pane>, focus: Focus) -> Vec<(&'static str, &'static str)> {
    let mut hints = Vec::new();
    match focus {
        Focus::Sidebar => {
            if let Some(pane) = selected {
                if pane.is_running() && pane.killable() {
                    hints.push(("[x]", "kill"));
                }
                if pane.is_dead() {
                    hints.push(("[enter]", "start"));
                } else {
                    hints.push(("[enter]", "focus"));
                }
            }
            hints.push(("[ctl-c]", "quit"));
        }
        Focus::Main => hints.push(("[ctl-z]", "sidebar")),
    }
    hints
}

/// Draw the sidebar into `area`.
pub fn draw(
    surface: &mut dyn Surface,
    area: Viewport,
    panes: &[Pane],
    selected: Option<usize>,
    focus: Focus,
) {
    area.fill(surface, Style::default());

    for (line, row) in rows(panes).into_iter().enumerate() {
        let line = line as u16;
        match row {
            SidebarRow::Separator => {
                let rule = "─".repeat(area.width as usize);
                let style = Style {
                    fg: MUTED,
                    ..Style::default()
                };
                area.put_run(surface, line, 0, &StyledCell::line(&rule, style));
            }
            SidebarRow::Entry(index) => {
                let pane = &panes[index];
                let mut style = Style::default();
                if selected == Some(index) {
                    style = style.bold();
                    if focus == Focus::Sidebar {
                        style.fg = HIGHLIGHT;
                    }
                }
                if pane.is_dead() && selected != Some(index) {
                    style.fg = MUTED;
                }
                let text = format!(" {} {}", pane.icon(), pane.title());
                area.put_run(surface, line, 0, &StyledCell::line(&text, style));
            }
        }
    }

    let selected_pane = selected.and_then(|i| panes.get(i));
    let hints = hints(selected_pane, focus);
    let top = area.height.saturating_sub(hints.len() as u16);
    for (i, (key, action)) in hints.into_iter().enumerate() {
        let mut cells = StyledCell::line(&format!(" {}", key), Style::default());
        cells.extend(StyledCell::line(
            &format!(" {}", action),
            Style {
                fg: MUTED,
                ..Style::default()
            },
        ));
        area.put_run(surface, top + i as u16, 0, &cells);
    }
}
