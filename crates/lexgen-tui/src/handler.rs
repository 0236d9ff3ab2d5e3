use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, FocusPane, InputMode, PdfAction};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
    }
    app.poll_tasks().await;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Popups swallow input until dismissed
    if app.notification.is_some() {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
            app.notification = None;
        }
        return;
    }
    if app.preview.is_open() {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('v')) {
            app.close_preview();
        }
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Half-page scroll of the response
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_response_down(10);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_response_up(10);
        }

        // Tab cycles focus: Input -> History -> Sources -> Input
        KeyCode::Tab => app.focus = app.focus.next(),

        KeyCode::Char('i') => {
            if !app.is_busy() {
                app.focus = FocusPane::Input;
                app.input_mode = InputMode::Editing;
            }
        }

        // Form controls
        KeyCode::Char('c') => app.cycle_category(),
        KeyCode::Char('w') => app.toggle_web(),

        // PDF actions
        KeyCode::Char('v') => app.request_pdf(PdfAction::Preview),
        KeyCode::Char('d') => app.request_pdf(PdfAction::Download),

        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Input => app.scroll_response_down(1),
            FocusPane::History => app.history_nav_down(),
            FocusPane::Sources => app.sources_nav_down(),
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Input => app.scroll_response_up(1),
            FocusPane::History => app.history_nav_up(),
            FocusPane::Sources => app.sources_nav_up(),
        },

        KeyCode::Enter | KeyCode::Char(' ') => match app.focus {
            FocusPane::Input => {
                if !app.is_busy() {
                    app.input_mode = InputMode::Editing;
                }
            }
            FocusPane::History => app.toggle_selected_entry(),
            FocusPane::Sources => {}
        },

        KeyCode::Char('y') => {
            if let Some(source) = app.selected_source() {
                copy_to_clipboard(&source.url);
            }
        }

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            if app.submit_query() {
                app.input_mode = InputMode::Normal;
            }
        }
        // Form controls stay reachable while typing
        KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.focus = app.focus.next();
        }
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::ALT) => app.cycle_category(),
        KeyCode::Char('w') if key.modifiers.contains(KeyModifiers::ALT) => app.toggle_web(),
        KeyCode::Backspace => {
            if app.query_cursor > 0 && !app.is_busy() {
                app.query_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
                app.query_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.query_input.chars().count();
            if app.query_cursor < char_count && !app.is_busy() {
                let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
                app.query_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.query_cursor = app.query_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.query_input.chars().count();
            app.query_cursor = (app.query_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.query_cursor = 0;
        }
        KeyCode::End => {
            app.query_cursor = app.query_input.chars().count();
        }
        KeyCode::Char(c) => {
            if !app.is_busy() {
                let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
                app.query_input.insert(byte_pos, c);
                app.query_cursor += 1;
            }
        }
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let (x, y) = (mouse.column, mouse.row);

    let in_history = app.history_area.is_some_and(|r| point_in_rect(x, y, r));
    let in_response = app.response_area.is_some_and(|r| point_in_rect(x, y, r));
    let in_sources = app.sources_area.is_some_and(|r| point_in_rect(x, y, r));

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_history {
                app.history_nav_down();
            } else if in_response {
                app.scroll_response_down(3);
            } else if in_sources {
                app.sources_nav_down();
            }
        }
        MouseEventKind::ScrollUp => {
            if in_history {
                app.history_nav_up();
            } else if in_response {
                app.scroll_response_up(3);
            } else if in_sources {
                app.sources_nav_up();
            }
        }
        _ => {}
    }
}

fn copy_to_clipboard(text: &str) {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let candidates: Vec<(&str, Vec<&str>)> = if cfg!(target_os = "macos") {
        vec![("pbcopy", vec![])]
    } else {
        vec![("wl-copy", vec![]), ("xclip", vec!["-selection", "clipboard"])]
    };

    for (program, args) in &candidates {
        if let Ok(mut child) = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .spawn()
        {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(text.as_bytes());
            }
            let _ = child.wait();
            return;
        }
    }
    tracing::warn!("no clipboard program available");
}
