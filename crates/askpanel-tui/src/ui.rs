use askpanel_core::dispatcher::IMAGE_DATA_PREFIX;
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use crate::app::App;

/// Short description of an image reference; data URIs are far too long to print.
pub fn describe_image(reference: &str) -> String {
    match reference.strip_prefix(IMAGE_DATA_PREFIX) {
        Some(data) => format!("Inline image ({} KB of base64 data)", data.len().div_ceil(1024)),
        None => reference.to_string(),
    }
}

/// Terminal column of the cursor, counting wide characters as two columns.
fn cursor_column(prompt: &str, cursor: usize) -> u16 {
    let prefix: String = prompt.chars().take(cursor).collect();
    u16::try_from(Span::raw(prefix).width()).unwrap_or(u16::MAX)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let options_height = if app.session.settings.show_options { 1 } else { 0 };

    // Main layout: header, options, body, input, footer
    let [header_area, options_area, body_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(options_height),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    if options_height > 0 {
        render_options(app, frame, options_area);
    }

    // Image panel on the right only while an image is shown
    if app.session.image().is_some() {
        let [transcript_area, image_area] = Layout::horizontal([
            Constraint::Percentage(60),
            Constraint::Percentage(40),
        ])
        .areas(body_area);
        render_transcript(app, frame, transcript_area);
        render_image(app, frame, image_area);
    } else {
        render_transcript(app, frame, body_area);
    }

    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mic = if app.listening || app.session.voice_busy {
        Span::styled(" [mic on] ", Style::default().fg(Color::Red).bold())
    } else {
        Span::raw("")
    };

    let title = Line::from(vec![
        Span::styled(" askpanel ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("[{}]", app.session.operation.display_name()),
            Style::default().fg(Color::White),
        ),
        mic,
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_options(app: &App, frame: &mut Frame, area: Rect) {
    let settings = &app.session.settings;
    let value_style = Style::default().fg(Color::Yellow);
    let label_style = Style::default().fg(Color::Gray);

    let flag = |on: bool| if on { "on" } else { "off" };

    let mut spans = vec![
        Span::styled(" Max length: ", label_style),
        Span::styled(app.session.max_tokens().to_string(), value_style),
        Span::styled("  Randomness: ", label_style),
        Span::styled(format!("{:.1}", app.session.temperature()), value_style),
    ];
    if settings.speech_enabled {
        spans.extend(vec![
            Span::styled("  Language: ", label_style),
            Span::styled(settings.speech_language.clone(), value_style),
            Span::styled("  Continuous: ", label_style),
            Span::styled(flag(settings.continuous_conversation), value_style),
            Span::styled("  Auto-send: ", label_style),
            Span::styled(flag(settings.auto_send), value_style),
            Span::styled("  Read aloud: ", label_style),
            Span::styled(flag(settings.auto_speak), value_style),
        ]);
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing and dimensions for scroll calculations
    app.transcript_area = Some(area);
    app.transcript_height = area.height.saturating_sub(2);
    app.transcript_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Conversation ");

    let transcript = app.session.transcript();
    let text = if transcript.is_empty() && !app.turn_in_flight {
        Text::from(Span::styled(
            "Questions and answers appear here.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = transcript
            .text()
            .lines()
            .map(|line| {
                if line.starts_with("Q: ") {
                    Line::from(Span::styled(
                        line.to_string(),
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ))
                } else if line.starts_with("A: ") {
                    Line::from(line.to_string())
                } else if line.starts_with("Error: ") {
                    Line::from(Span::styled(line.to_string(), Style::default().fg(Color::Red)))
                } else {
                    Line::from(Span::styled(line.to_string(), Style::default().fg(Color::DarkGray)))
                }
            })
            .collect();

        if app.turn_in_flight {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }
        Text::from(lines)
    };

    let paragraph = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.transcript_scroll, 0));

    frame.render_widget(paragraph, area);
}

fn render_image(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(" Image ");

    let description = app.session.image().map(describe_image).unwrap_or_default();
    let image = Paragraph::new(description)
        .block(block)
        .wrap(Wrap { trim: true });

    frame.render_widget(image, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Ask ");

    let input = if app.session.prompt.is_empty() {
        Paragraph::new(Span::styled(
            app.session.placeholder.text(),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Paragraph::new(app.session.prompt.as_str())
    };
    frame.render_widget(input.block(block), area);

    // Cursor inside the border
    let column = cursor_column(&app.session.prompt, app.prompt_cursor).min(area.width.saturating_sub(3));
    frame.set_cursor_position((area.x + 1 + column, area.y + 1));
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = vec![
        Span::styled(" Enter ", key_style),
        Span::styled(" send ", label_style),
        Span::styled(" Esc ", key_style),
        Span::styled(" clear input ", label_style),
        Span::styled(" Tab ", key_style),
        Span::styled(" operation ", label_style),
    ];
    if app.session.settings.show_options {
        hints.extend(vec![
            Span::styled(" F3 ", key_style),
            Span::styled(" length ", label_style),
            Span::styled(" F4 ", key_style),
            Span::styled(" randomness ", label_style),
        ]);
    }
    if let Some(voice) = &app.voice {
        if voice.can_listen() {
            hints.extend(vec![
                Span::styled(" ^T ", key_style),
                Span::styled(" mic ", label_style),
            ]);
        }
        hints.extend(vec![
            Span::styled(" F5-F7 ", key_style),
            Span::styled(" voice ", label_style),
        ]);
    }
    hints.extend(vec![
        Span::styled(" ^L ", key_style),
        Span::styled(" clear ", label_style),
        Span::styled(" ^C ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}
