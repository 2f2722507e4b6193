//! User-facing text and control layouts.
//!
//! Every string the engine sends lives here, so transports, tests, and
//! the trigger classifier share one vocabulary.

use vitrine_core::types::{CatalogItem, ProblemReport};

use crate::state::ControlAction;
use crate::transport::{Control, ControlSet};

// ============================================================================
// Labels and Prompts
// ============================================================================

pub const LABEL_BROWSE: &str = "Catalog";
pub const LABEL_REPORT: &str = "Report a problem";
pub const LABEL_OPEN_PAGE: &str = "Open item page";
pub const LABEL_PREV: &str = "Previous";
pub const LABEL_MENU: &str = "Menu";
pub const LABEL_NEXT: &str = "Next";

pub const MENU_PROMPT: &str = "Choose an action:";
pub const QUERY_PROMPT: &str =
    "What are you looking for? For example, \"gift puzzles\" or \"books about family\".";
pub const SEARCH_PROGRESS: &str = "Looking that up...";
pub const SEARCH_ENCODING_FAILED: &str = "Could not process your request.";
pub const SEARCH_INDEX_FAILED: &str = "Search is unavailable right now.";
pub const SEARCH_NO_RESULTS: &str = "Nothing matched your query.";
pub const AT_LAST_ITEM: &str = "This is the last item.";
pub const AT_FIRST_ITEM: &str = "This is the first item.";
pub const BACK_TO_MENU: &str = "Back to the main menu.";
pub const NAME_PROMPT: &str = "Your full name:";
pub const CONTACT_PROMPT: &str = "Phone number or messenger handle:";
pub const PROBLEM_PROMPT: &str = "Describe the problem:";
pub const REPORT_THANKS: &str = "Thanks! Your report has been passed on.";
pub const REPORT_FAILED: &str = "Could not record your report. Please try again.";
pub const CANCELLED: &str = "Action cancelled.";

// ============================================================================
// Rendering
// ============================================================================

/// Two-row main menu. The labels double as triggers when echoed back.
pub fn menu_controls() -> ControlSet {
    ControlSet::new()
        .with_row(vec![Control::reply(LABEL_BROWSE)])
        .with_row(vec![Control::reply(LABEL_REPORT)])
}

/// Item card body: title, category, description, optional price line.
pub fn item_card(item: &CatalogItem) -> String {
    let mut card = format!("{}\n{}\n\n{}", item.title, item.category, item.description);
    if let Some(price) = &item.price {
        card.push_str("\n\nPrice: ");
        card.push_str(price);
    }
    card
}

/// Browsing controls: an optional link row when the item has a page,
/// then the previous/menu/next row.
pub fn result_controls(item: &CatalogItem) -> ControlSet {
    let mut controls = ControlSet::new();
    if let Some(url) = &item.url {
        controls = controls.with_row(vec![Control::link(LABEL_OPEN_PAGE, url.as_str())]);
    }
    controls.with_row(vec![
        Control::action(LABEL_PREV, ControlAction::Prev),
        Control::action(LABEL_MENU, ControlAction::Menu),
        Control::action(LABEL_NEXT, ControlAction::Next),
    ])
}

/// Body of the forwarded problem-report notification.
pub fn notification_text(report: &ProblemReport) -> String {
    format!(
        "New problem report:\n\nName: {}\nContact: {}\nProblem: {}",
        report.name, report.contact, report.problem
    )
}
