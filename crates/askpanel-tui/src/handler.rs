use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::App;
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
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::TurnFinished(outcome) => app.finish_turn(outcome),
        AppEvent::ReadAloudStarted { turn, listen_again } => app.read_aloud_started(turn, listen_again),
        AppEvent::ListenAgain { turn } => app.listen_again(turn),
        AppEvent::AutoSubmit => app.submit(),
        AppEvent::Speech(event) => app.handle_speech_event(event),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        // Quit
        KeyCode::Char('c') if ctrl => app.should_quit = true,

        // Panel actions
        KeyCode::Char('l') if ctrl => app.clear(),
        KeyCode::Char('t') if ctrl => app.toggle_microphone(),
        KeyCode::Enter => app.submit(),
        KeyCode::Esc => app.escape(),

        // Operation selector
        KeyCode::Tab => app.session.next_operation(),
        KeyCode::BackTab => app.session.prev_operation(),

        // Tuning presets (only when the options bar is shown)
        KeyCode::F(3) if app.session.settings.show_options => app.session.cycle_max_tokens(),
        KeyCode::F(4) if app.session.settings.show_options => app.session.cycle_temperature(),

        // Voice settings
        KeyCode::F(5) => app.session.toggle_continuous_conversation(),
        KeyCode::F(6) => app.session.toggle_auto_send(),
        KeyCode::F(7) => app.session.toggle_auto_speak(),

        // Transcript scrolling
        KeyCode::PageUp => app.scroll_up(app.transcript_height.max(2) / 2),
        KeyCode::PageDown => app.scroll_down(app.transcript_height.max(2) / 2),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),

        // Prompt editing
        KeyCode::Backspace => {
            if app.prompt_cursor > 0 {
                app.prompt_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.session.prompt, app.prompt_cursor);
                app.session.prompt.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.session.prompt.chars().count();
            if app.prompt_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.session.prompt, app.prompt_cursor);
                app.session.prompt.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.prompt_cursor = app.prompt_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.session.prompt.chars().count();
            app.prompt_cursor = (app.prompt_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.prompt_cursor = 0;
        }
        KeyCode::End => {
            app.prompt_cursor = app.session.prompt.chars().count();
        }
        KeyCode::Char(c) if !ctrl => {
            let byte_pos = char_to_byte_index(&app.session.prompt, app.prompt_cursor);
            app.session.prompt.insert(byte_pos, c);
            app.prompt_cursor += 1;
        }
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_transcript = app
        .transcript_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_transcript {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}
