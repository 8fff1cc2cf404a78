//! Inline keyboard rendering.
//!
//! Pure presentation: each view is a function of draft state and the
//! catalogs. Selected entries carry a `[✓]` marker; anything beyond
//! three buttons is paired two per row.

use crate::bot::callbacks::CallbackAction;
use crate::gateway::Target;
use crate::queue::Draft;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// ─────────────────────────────────────────────────────────────────────────────
// Button labels
// ─────────────────────────────────────────────────────────────────────────────

const LABEL_ENQUEUE: &str = "Add to queue";
const LABEL_DEQUEUE: &str = "Remove from queue";
const LABEL_TAGS: &str = "Tags";
const LABEL_TARGETS: &str = "Targets";
const LABEL_PUSH: &str = "Push";
const LABEL_BACK: &str = "Back";
const LABEL_TO_TARGETS: &str = "> Targets";
const LABEL_TO_TAGS: &str = "< Tags";
const LABEL_CUSTOM: &str = "Custom…";

fn selected(label: &str) -> String {
    format!("[✓] {label}")
}

fn button(label: impl Into<String>, action: &CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label, action.data())
}

/// Pair buttons two per row, last one alone when the count is odd.
fn pair_rows(buttons: Vec<InlineKeyboardButton>) -> Vec<Vec<InlineKeyboardButton>> {
    let mut rows = Vec::with_capacity(buttons.len().div_ceil(2));
    let mut iter = buttons.into_iter();
    while let Some(first) = iter.next() {
        match iter.next() {
            Some(second) => rows.push(vec![first, second]),
            None => rows.push(vec![first]),
        }
    }
    rows
}

fn layout(buttons: Vec<InlineKeyboardButton>) -> Vec<Vec<InlineKeyboardButton>> {
    if buttons.len() > 3 {
        pair_rows(buttons)
    } else {
        buttons.into_iter().map(|b| vec![b]).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────────────────────────

/// The idle/collapsed view: a lone enqueue toggle when not queued;
/// toggle, sub-view navigation and the push button when queued.
#[must_use]
pub fn main_markup(queued: bool) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if queued {
        rows.push(vec![button(LABEL_DEQUEUE, &CallbackAction::Select)]);
        rows.push(vec![
            button(LABEL_TAGS, &CallbackAction::TagSub),
            button(LABEL_TARGETS, &CallbackAction::TargetSub),
        ]);
        rows.push(vec![button(LABEL_PUSH, &CallbackAction::Push)]);
    } else {
        rows.push(vec![button(LABEL_ENQUEUE, &CallbackAction::Select)]);
    }
    InlineKeyboardMarkup::new(rows)
}

/// The tag-editing view: catalog tags, custom tags (tap to remove),
/// the custom-tag prompt opener, and navigation.
#[must_use]
pub fn tag_markup(draft: &Draft, tags: &[String]) -> InlineKeyboardMarkup {
    let mut buttons: Vec<InlineKeyboardButton> = tags
        .iter()
        .enumerate()
        .map(|(index, tag)| {
            let label = if draft.tag_indices.contains(&index) {
                selected(tag)
            } else {
                tag.clone()
            };
            button(label, &CallbackAction::TagToggle(index))
        })
        .collect();
    buttons.extend(draft.custom_tags.iter().enumerate().map(|(index, tag)| {
        button(selected(tag), &CallbackAction::TagCustomRemove(index))
    }));
    buttons.push(button(LABEL_CUSTOM, &CallbackAction::TagCustomOpen));

    let mut rows = layout(buttons);
    rows.push(vec![
        button(LABEL_TO_TARGETS, &CallbackAction::TargetSub),
        button(LABEL_BACK, &CallbackAction::Return),
    ]);
    InlineKeyboardMarkup::new(rows)
}

/// The target-editing view: catalog targets and navigation.
#[must_use]
pub fn target_markup(draft: &Draft, targets: &[Target]) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = targets
        .iter()
        .enumerate()
        .map(|(index, target)| {
            let label = if draft.target_indices.contains(&index) {
                selected(target.as_str())
            } else {
                target.as_str().to_string()
            };
            button(label, &CallbackAction::TargetToggle(index))
        })
        .collect();

    let mut rows = layout(buttons);
    rows.push(vec![
        button(LABEL_TO_TAGS, &CallbackAction::TagSub),
        button(LABEL_BACK, &CallbackAction::Return),
    ]);
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Draft;

    fn flat_labels(markup: &InlineKeyboardMarkup) -> Vec<String> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .map(|b| b.text.clone())
            .collect()
    }

    #[test]
    fn idle_view_toggles_with_queue_state() {
        let not_queued = main_markup(false);
        assert_eq!(flat_labels(&not_queued), vec![LABEL_ENQUEUE]);

        let queued = main_markup(true);
        let labels = flat_labels(&queued);
        assert!(labels.contains(&LABEL_DEQUEUE.to_string()));
        assert!(labels.contains(&LABEL_PUSH.to_string()));
    }

    #[test]
    fn tag_view_marks_selection_and_custom_tags() {
        let mut draft = Draft::new("u".to_string());
        draft.tag_indices.insert(0);
        draft.custom_tags.push("extra".to_string());
        let tags = vec!["news".to_string(), "misc".to_string()];

        let labels = flat_labels(&tag_markup(&draft, &tags));
        assert!(labels.contains(&"[✓] news".to_string()));
        assert!(labels.contains(&"misc".to_string()));
        assert!(labels.contains(&"[✓] extra".to_string()));
        assert!(labels.contains(&LABEL_CUSTOM.to_string()));
    }

    #[test]
    fn few_buttons_stack_one_per_row() {
        let draft = Draft::new("u".to_string());
        let markup = tag_markup(&draft, &["solo".to_string()]);
        // "solo" + custom opener = 2 buttons, stacked, plus nav row.
        assert_eq!(markup.inline_keyboard.len(), 3);
        assert_eq!(markup.inline_keyboard[0].len(), 1);
    }

    #[test]
    fn many_buttons_pair_up() {
        let draft = Draft::new("u".to_string());
        let tags: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        let markup = tag_markup(&draft, &tags);
        // 5 tags + opener = 6 buttons in 3 paired rows, plus nav row.
        assert_eq!(markup.inline_keyboard.len(), 4);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
    }
}
