use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use lexgen_core::{ChatEntry, QueryState, Source};
use crate::app::{App, FocusPane, InputMode, NotificationKind};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Wrap text to fit within a given width, breaking on word boundaries
fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current_len == 0 {
            current_line = word.to_string();
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current_line.push(' ');
            current_line.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current_line));
            current_line = word.to_string();
            current_len = word_len;
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [history_area, middle_area, sources_area] = Layout::horizontal([
        Constraint::Percentage(25),
        Constraint::Percentage(50),
        Constraint::Percentage(25),
    ])
    .areas(body_area);

    let [input_area, response_area] = Layout::vertical([
        Constraint::Length(4),
        Constraint::Min(0),
    ])
    .areas(middle_area);

    // Store areas for mouse hit-testing
    app.history_area = Some(history_area);
    app.response_area = Some(response_area);
    app.sources_area = Some(sources_area);

    render_history(app, frame, history_area);
    render_input(app, frame, input_area);
    render_response(app, frame, response_area);
    render_sources(app, frame, sources_area);

    render_footer(app, frame, footer_area);

    // Popups: notifications sit above the preview dialog
    if app.notification.is_some() {
        render_notification(app, frame, area);
    } else if app.preview.is_open() {
        render_preview_dialog(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let status = if app.is_busy() {
        " [querying]"
    } else if app.pdf_task.is_some() {
        " [fetching pdf]"
    } else {
        ""
    };

    let title = Line::from(vec![
        Span::styled(" LexGen Legal Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(status, Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " EDIT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hint = |key: &'static str, label: &'static str| {
        [Span::styled(key, key_style), Span::styled(label, label_style)]
    };

    let mut hints: Vec<Span> = Vec::new();
    if app.notification.is_some() || app.preview.is_open() {
        hints.extend(hint(" Esc ", " close "));
    } else {
        match app.input_mode {
            InputMode::Editing => {
                hints.extend(hint(" Enter ", " ask "));
                hints.extend(hint(" Alt-c ", " category "));
                hints.extend(hint(" Alt-w ", " web "));
                hints.extend(hint(" Esc ", " stop typing "));
            }
            InputMode::Normal => {
                hints.extend(hint(" i ", " type "));
                hints.extend(hint(" Tab ", " focus "));
                hints.extend(hint(" j/k ", " move "));
                match app.focus {
                    FocusPane::History => hints.extend(hint(" Enter ", " expand ")),
                    FocusPane::Sources => hints.extend(hint(" y ", " copy url ")),
                    FocusPane::Input => {}
                }
                hints.extend(hint(" c ", " category "));
                hints.extend(hint(" w ", " web "));
                if app.current_result().is_some_and(|r| r.pdf_filename().is_some()) {
                    hints.extend(hint(" v ", " view pdf "));
                    hints.extend(hint(" d ", " download "));
                }
                hints.extend(hint(" q ", " quit "));
            }
        }
    }

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn border_color(focused: bool) -> Color {
    if focused { Color::Cyan } else { Color::DarkGray }
}

fn render_history(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == FocusPane::History)))
        .title(" Chat History ");

    if app.snapshot.chat_log.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No chat history available",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(empty, area);
        return;
    }

    // Inner width minus borders and the highlight symbol
    let width = area.width.saturating_sub(4) as usize;
    let items: Vec<ListItem> = app
        .snapshot
        .chat_log
        .iter()
        .map(|entry| ListItem::new(history_item(entry, app.expanded.contains(&entry.id), width)))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.history_state);
}

fn history_item(entry: &ChatEntry, expanded: bool, width: usize) -> Text<'static> {
    let marker = if entry.is_pending() {
        "… "
    } else if expanded {
        "▾ "
    } else {
        "▸ "
    };

    let mut lines: Vec<Line> = Vec::new();
    for (i, part) in wrap_text_to_width(&format!("Q: {}", entry.query.text()), width.saturating_sub(2))
        .into_iter()
        .enumerate()
    {
        let prefix = if i == 0 { marker } else { "  " };
        lines.push(Line::from(vec![
            Span::raw(prefix),
            Span::styled(part, Style::default().fg(Color::Cyan)),
        ]));
    }

    if entry.is_pending() {
        lines.push(Line::from(Span::styled(
            format!("  {}", entry.transcript()),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    } else if expanded {
        for raw in entry.transcript().lines() {
            for part in wrap_text_to_width(raw, width.saturating_sub(2)) {
                let mut line = parse_markdown_line(&part);
                line.spans.insert(0, Span::raw("  "));
                lines.push(line);
            }
        }
    }
    lines.push(Line::default());

    Text::from(lines)
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let input_border_color = if editing {
        Color::Yellow
    } else if app.focus == FocusPane::Input {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(" Ask a legal question ");

    let inner = input_block.inner(area);
    frame.render_widget(input_block, area);

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = inner.width as usize;
    let cursor_pos = app.query_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let query_line = if app.query_input.is_empty() && !editing {
        Line::from(Span::styled(
            "Press i to type your question",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let visible_text: String = app
            .query_input
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Line::from(Span::styled(visible_text, Style::default().fg(Color::Cyan)))
    };

    // Form controls dim while a query is outstanding
    let control_style = if app.is_busy() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::White)
    };
    let form_line = Line::from(vec![
        Span::styled("Category: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("[{}]", app.category.display_name()), control_style.bold()),
        Span::styled("  Web search: ", Style::default().fg(Color::DarkGray)),
        Span::styled(if app.use_web { "[on]" } else { "[off]" }, control_style.bold()),
    ]);

    frame.render_widget(
        Paragraph::new(Text::from(vec![query_line, form_line])),
        inner,
    );

    if editing && inner.width > 0 {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((inner.x + cursor_x, inner.y));
    }
}

fn render_response(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == FocusPane::Input)))
        .title(" Response ");

    let lines = response_lines(
        &app.snapshot.state,
        app.animation_frame,
        app.controller.policy().max_retries,
    );

    let response = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.response_scroll, 0));

    frame.render_widget(response, area);
}

/// Body of the response panel for the controller's current state.
fn response_lines(state: &QueryState, animation_frame: u8, max_retries: u32) -> Vec<Line<'static>> {
    let heading = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let muted = Style::default().fg(Color::DarkGray);
    let mut lines: Vec<Line> = Vec::new();

    match state {
        QueryState::Idle => {
            lines.push(Line::from(Span::styled("Your response will appear here", muted)));
        }
        QueryState::Pending { attempt, .. } => {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((animation_frame as usize % 3) + 1);
            lines.push(Line::from(Span::styled(
                format!("Analyzing your question{}", dots),
                muted.add_modifier(Modifier::ITALIC),
            )));
            if *attempt > 0 {
                lines.push(Line::from(Span::styled(
                    format!("Retrying ({} of {})", attempt, max_retries),
                    Style::default().fg(Color::Yellow),
                )));
            }
        }
        QueryState::Failed { error, attempts } => {
            lines.push(Line::from(Span::styled(
                "Error",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )));
            for line in error.to_string().lines() {
                lines.push(Line::from(Span::styled(line.to_string(), Style::default().fg(Color::Red))));
            }
            if *attempts > 0 {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    format!("Retried {} times", attempts),
                    muted,
                )));
            }
        }
        QueryState::Succeeded(result) => {
            let sections = result.sections();
            if sections.is_empty() {
                lines.push(Line::from(Span::styled("No detailed response available", muted)));
            }
            for (title, text) in sections {
                lines.push(Line::from(Span::styled(title, heading)));
                for line in text.lines() {
                    lines.push(parse_markdown_line(line));
                }
                lines.push(Line::default());
            }
            if result.pdf_filename().is_some() {
                lines.push(Line::from(vec![
                    Span::styled(" v ", Style::default().bg(Color::DarkGray).fg(Color::White)),
                    Span::raw(" View PDF  "),
                    Span::styled(" d ", Style::default().bg(Color::DarkGray).fg(Color::White)),
                    Span::raw(" Download PDF"),
                ]));
            }
        }
    }

    lines
}

fn render_sources(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(app.focus == FocusPane::Sources)))
        .title(" Sources ");

    let sources = app.current_result().map(|r| r.sources.clone()).unwrap_or_default();
    if sources.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No source documents available",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(empty, area);
        return;
    }

    let width = area.width.saturating_sub(4) as usize;
    let items: Vec<ListItem> = source_items(&sources, width)
        .into_iter()
        .map(ListItem::new)
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Magenta)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.sources_state);
}

/// One list item per source: classification and name, then the wrapped URL.
fn source_items(sources: &[Source], width: usize) -> Vec<Text<'static>> {
    sources
        .iter()
        .map(|source| {
            let mut lines = vec![Line::from(vec![
                Span::styled(
                    format!("[{}] ", source.kind().label()),
                    Style::default().fg(Color::Magenta),
                ),
                Span::raw(source.name.clone()),
            ])];
            for part in wrap_text_to_width(&source.url, width) {
                lines.push(Line::from(Span::styled(part, Style::default().fg(Color::DarkGray))));
            }
            Text::from(lines)
        })
        .collect()
}

/// Centered popup rectangle, clamped to the available area
fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_preview_dialog(app: &App, frame: &mut Frame, area: Rect) {
    let Some(preview) = app.preview.current() else {
        return;
    };

    let popup = popup_area(area, 70, 9);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Legal Response PDF ");

    let label = Style::default().fg(Color::DarkGray);
    let text = Text::from(vec![
        Line::from(vec![Span::styled("File:     ", label), Span::raw(preview.source().to_string())]),
        Line::from(vec![Span::styled("Size:     ", label), Span::raw(format!("{} bytes", preview.size()))]),
        Line::from(vec![
            Span::styled("Location: ", label),
            Span::raw(preview.path().display().to_string()),
        ]),
        Line::default(),
        Line::from(Span::styled("Opened in your system PDF viewer.", Style::default().fg(Color::Cyan))),
        Line::from(Span::styled("Esc closes the preview and removes the temporary file.", label)),
    ]);

    let dialog = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    frame.render_widget(dialog, popup);
}

fn render_notification(app: &App, frame: &mut Frame, area: Rect) {
    let Some(notification) = &app.notification else {
        return;
    };

    let color = match notification.kind {
        NotificationKind::Info => Color::Green,
        NotificationKind::Error => Color::Red,
    };

    let mut lines: Vec<Line> = notification
        .message
        .lines()
        .map(|line| Line::from(line.to_string()))
        .collect();
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        "Press Enter or Esc to dismiss",
        Style::default().fg(Color::DarkGray),
    )));

    let height = (lines.len() as u16 + 4).max(6);
    let popup = popup_area(area, 60, height);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(format!(" {} ", notification.title));

    let dialog = Paragraph::new(Text::from(lines)).block(block).wrap(Wrap { trim: true });
    frame.render_widget(dialog, popup);
}
