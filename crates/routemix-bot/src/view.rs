//! Keyboard construction.
//!
//! Keyboards are plain data: rows of labelled buttons carrying action
//! tokens. The transport decides how to render them; nothing here knows
//! about any particular chat platform.

use crate::event::Action;
use crate::session::{EditSession, SelectionSession, GROUP_PAGE_SIZE, PAGE_SIZE};

/// Letters offered as prefix shortcuts.
const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Letter buttons per row.
const LETTERS_PER_ROW: usize = 7;

/// One pressable button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Text shown on the button.
    pub label: String,
    /// Opaque action token sent back on press.
    pub action: String,
}

impl Button {
    fn new(label: impl Into<String>, action: &Action) -> Self {
        Self {
            label: label.into(),
            action: action.token(),
        }
    }
}

/// Rows of buttons attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

/// Builds the selection keyboard for the current session view.
pub fn selection_keyboard(
    session: &SelectionSession,
    catalog: &[String],
    group_names: &[String],
) -> Keyboard {
    let items = session.filtered(catalog);
    let start = session.page * PAGE_SIZE;
    let mut rows = Vec::new();

    for name in items.iter().skip(start).take(PAGE_SIZE) {
        let mark = if session.chosen.contains(*name) {
            "✅"
        } else {
            "⬜️"
        };
        rows.push(vec![Button::new(
            format!("{mark} {name}"),
            &Action::Toggle(name.to_string()),
        )]);
    }

    let mut nav = Vec::new();
    if session.page > 0 {
        nav.push(Button::new("⬅️ 上一页", &Action::PrevPage));
    }
    if start + PAGE_SIZE < items.len() {
        nav.push(Button::new("下一页 ➡️", &Action::NextPage));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    if !group_names.is_empty() {
        let gstart = session.group_page * GROUP_PAGE_SIZE;
        let group_row: Vec<Button> = group_names
            .iter()
            .skip(gstart)
            .take(GROUP_PAGE_SIZE)
            .map(|name| Button::new(format!("📂 {name}"), &Action::ToggleGroup(name.clone())))
            .collect();
        if !group_row.is_empty() {
            rows.push(group_row);
        }
        if group_names.len() > GROUP_PAGE_SIZE {
            let mut gnav = Vec::new();
            if session.group_page > 0 {
                gnav.push(Button::new("⬅️ 上一页", &Action::PrevGroupPage));
            }
            if gstart + GROUP_PAGE_SIZE < group_names.len() {
                gnav.push(Button::new("下一页 ➡️", &Action::NextGroupPage));
            }
            if !gnav.is_empty() {
                rows.push(gnav);
            }
        }
    }

    rows.extend(letter_rows());

    let mut search_row = vec![Button::new("🔍 搜索", &Action::Search)];
    if session.filter.is_some() {
        search_row.push(Button::new("❌ 清除", &Action::ClearFilter));
    }
    rows.push(search_row);
    rows.push(vec![Button::new("✅ 生成配置", &Action::Generate)]);

    Keyboard { rows }
}

/// Builds the edit keyboard for a group-edit session.
pub fn edit_keyboard(session: &EditSession, catalog: &[String]) -> Keyboard {
    let items = session.filtered(catalog);
    let start = session.page * PAGE_SIZE;
    let mut rows = Vec::new();

    for name in items.iter().skip(start).take(PAGE_SIZE) {
        let mark = if session.working.contains(*name) {
            "✅"
        } else {
            "⬜️"
        };
        rows.push(vec![Button::new(
            format!("{mark} {name}"),
            &Action::EditToggle(name.to_string()),
        )]);
    }

    let mut nav = Vec::new();
    if session.page > 0 {
        nav.push(Button::new("⬅️ 上一页", &Action::EditPrevPage));
    }
    if start + PAGE_SIZE < items.len() {
        nav.push(Button::new("下一页 ➡️", &Action::EditNextPage));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    let mut search_row = vec![Button::new("🔍 搜索", &Action::EditSearch)];
    if session.filter.is_some() {
        search_row.push(Button::new("❌ 清除", &Action::EditClearFilter));
    }
    rows.push(search_row);
    rows.push(vec![
        Button::new("✅ 保存", &Action::EditSave),
        Button::new("取消", &Action::EditCancel),
    ]);

    Keyboard { rows }
}

fn letter_rows() -> Vec<Vec<Button>> {
    let letters: Vec<char> = ALPHABET.chars().collect();
    letters
        .chunks(LETTERS_PER_ROW)
        .map(|chunk| {
            chunk
                .iter()
                .map(|ch| Button::new(ch.to_string(), &Action::Letter(*ch)))
                .collect()
        })
        .collect()
}
