use std::fmt::Write as _;

use client_core::{Screen, ViewModel};

const TITLE: &str = "Shopping List";

pub fn render(view: &ViewModel) -> String {
    let mut out = String::new();
    match view.screen {
        Screen::Loading => out.push_str("Loading...\n"),
        Screen::SignIn => render_sign_in(&mut out),
        Screen::ItemList => render_list(&mut out, view),
    }
    if let Some(notice) = &view.notice {
        let _ = writeln!(out, "note: {notice}");
    }
    if let Some(error) = &view.error {
        let _ = writeln!(out, "error: {error}");
    }
    out
}

fn render_sign_in(out: &mut String) {
    let _ = writeln!(out, "== {TITLE} ==");
    out.push_str("Sign in to see your list.\n");
    out.push_str("  login <email> <password>\n");
    out.push_str("  signup <email> <password>\n");
}

fn render_list(out: &mut String, view: &ViewModel) {
    let email = view.email.as_deref().unwrap_or("unknown user");
    let count = view.items.len();
    let noun = if count == 1 { "item" } else { "items" };
    let _ = writeln!(out, "== {TITLE} ({email}, {count} {noun}) ==");

    if view.items.is_empty() {
        out.push_str("Your list is empty. Try: add milk\n");
    }
    for (index, item) in view.items.iter().enumerate() {
        let mark = if item.completed { 'x' } else { ' ' };
        let _ = writeln!(out, "{:>3}. [{mark}] {}", index + 1, item.name);
    }
    out.push_str("add <name> | toggle <n> | rm <n> | rename <n> <name> | reload | logout | quit\n");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use shared::domain::{Item, ItemId, UserId};

    use super::*;

    fn item(name: &str, completed: bool) -> Item {
        Item {
            id: ItemId::new_random(),
            owner: UserId::new_random(),
            name: name.to_string(),
            completed,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn sign_in_screen_lists_auth_commands_and_error() {
        let view = ViewModel {
            screen: Screen::SignIn,
            error: Some("Invalid login credentials".to_string()),
            ..ViewModel::default()
        };

        let text = render(&view);

        assert!(text.contains("login <email> <password>"));
        assert!(text.contains("signup <email> <password>"));
        assert!(text.ends_with("error: Invalid login credentials\n"));
    }

    #[test]
    fn list_screen_numbers_rows_and_marks_done_items() {
        let view = ViewModel {
            screen: Screen::ItemList,
            email: Some("alice@example.com".to_string()),
            items: vec![item("milk", true), item("rice", false)],
            ..ViewModel::default()
        };

        let text = render(&view);

        assert!(text.contains("(alice@example.com, 2 items)"));
        assert!(text.contains("  1. [x] milk\n"));
        assert!(text.contains("  2. [ ] rice\n"));
        assert!(!text.contains("empty"));
    }

    #[test]
    fn empty_list_shows_hint() {
        let view = ViewModel {
            screen: Screen::ItemList,
            email: Some("bob@example.com".to_string()),
            notice: Some("welcome back".to_string()),
            ..ViewModel::default()
        };

        let text = render(&view);

        assert!(text.contains("0 items"));
        assert!(text.contains("Your list is empty"));
        assert!(text.contains("note: welcome back"));
    }
}
