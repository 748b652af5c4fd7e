//! Inline keyboards shown under bot messages.

use super::api::{InlineButton, InlineKeyboard};
use crate::models::SavedSearch;
use crate::wizard::Prompt;

const BUTTONS_PER_ROW: usize = 2;

fn menu_button() -> InlineButton {
    InlineButton::new("🏠 Menu", "menu")
}

pub fn menu() -> InlineKeyboard {
    InlineKeyboard::default()
        .row(vec![InlineButton::new("🔍 New search", "search")])
        .row(vec![InlineButton::new("📋 My searches", "list")])
        .row(vec![InlineButton::new("🧹 Delete all searches", "delall")])
}

pub fn after_save() -> InlineKeyboard {
    InlineKeyboard::default()
        .row(vec![
            InlineButton::new("🔍 Another search", "search"),
            InlineButton::new("📋 My searches", "list"),
        ])
        .row(vec![menu_button()])
}

/// Attached to every listing notification
pub fn notification() -> InlineKeyboard {
    InlineKeyboard::default().row(vec![
        InlineButton::new("➕ Add another car", "search"),
        menu_button(),
    ])
}

/// Options of a wizard step. Payloads are `pick:<seq>:<n>` so a tap on an
/// older prompt can be told apart from the current one.
pub fn prompt(prompt: &Prompt) -> InlineKeyboard {
    let buttons: Vec<InlineButton> = prompt
        .options
        .iter()
        .enumerate()
        .map(|(i, option)| {
            InlineButton::new(option.label.clone(), format!("pick:{}:{}", prompt.seq, i))
        })
        .collect();

    let mut keyboard = InlineKeyboard::default();
    for row in buttons.chunks(BUTTONS_PER_ROW) {
        keyboard = keyboard.row(row.to_vec());
    }
    keyboard.row(vec![menu_button()])
}

pub fn searches(searches: &[SavedSearch]) -> InlineKeyboard {
    let mut keyboard = InlineKeyboard::default();
    for (i, search) in searches.iter().enumerate() {
        let label = format!(
            "❌ {}. {} {}",
            i + 1,
            search.filter.manufacturer,
            search.filter.model
        );
        keyboard = keyboard.row(vec![InlineButton::new(label, format!("del:{}", i))]);
    }
    keyboard
        .row(vec![InlineButton::new("🧹 Delete all", "delall")])
        .row(vec![menu_button()])
}
