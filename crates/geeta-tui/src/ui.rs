use crate::app::App;
use geeta_core::ChatRole;
use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

pub fn render(app: &mut App, frame: &mut Frame) {
    let [chat_area, input_area, help_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    // Inner size minus borders, used for scroll calculations
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" GeetaGPT - {} ", app.server_url));

    let chat = Paragraph::new(chat_text(app))
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.scroll, 0));
    frame.render_widget(chat, chat_area);

    render_input(app, frame, input_area);

    let help = Paragraph::new(Line::from(vec![
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" send  "),
        Span::styled("Up/Down PgUp/PgDn", Style::default().fg(Color::Yellow)),
        Span::raw(" scroll  "),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(" quit"),
    ]))
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, help_area);
}

fn chat_text(app: &App) -> Text<'static> {
    let messages = app.session.messages();
    if messages.is_empty() {
        return Text::from(Span::styled(
            "Ask a question about the Bhagavad Gita...",
            Style::default().fg(Color::DarkGray),
        ));
    }

    let thinking = app.is_thinking();
    let mut lines: Vec<Line> = Vec::new();

    for (i, msg) in messages.iter().enumerate() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(msg.content.clone()));
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                if thinking && i == messages.len() - 1 {
                    // Animated ellipsis: ".", "..", "..."
                    let dots = ".".repeat(app.animation_frame as usize + 1);
                    lines.push(Line::from(Span::styled(
                        format!("Thinking{}", dots),
                        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                    )));
                } else {
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
        }
        lines.push(Line::default());
    }

    Text::from(lines)
}

fn render_input(app: &App, frame: &mut Frame, area: ratatui::layout::Rect) {
    let border_color = if app.session.is_pending() {
        Color::DarkGray
    } else {
        Color::Yellow
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Ask ");

    let inner_width = area.width.saturating_sub(2) as usize;
    let offset = input_scroll_offset(app.cursor, inner_width);

    let visible_text: String = app.input.chars().skip(offset).take(inner_width).collect();
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, area);

    let cursor_x = (app.cursor - offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

/// First visible character so the cursor stays inside the input box.
fn input_scroll_offset(cursor: usize, inner_width: usize) -> usize {
    if inner_width == 0 || cursor < inner_width {
        0
    } else {
        cursor - inner_width + 1
    }
}

/// Render `**bold**` spans; everything else is literal.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current = String::new();

    while let Some(c) = chars.next() {
        if c != '*' || chars.peek() != Some(&'*') {
            current.push(c);
            continue;
        }
        chars.next();

        let mut bold = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            if c == '*' && chars.peek() == Some(&'*') {
                chars.next();
                closed = true;
                break;
            }
            bold.push(c);
        }

        if closed && !bold.is_empty() {
            if !current.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current)));
            }
            spans.push(Span::styled(bold, Style::default().add_modifier(Modifier::BOLD)));
        } else {
            current.push_str("**");
            current.push_str(&bold);
            if closed {
                current.push_str("**");
            }
        }
    }

    if !current.is_empty() {
        spans.push(Span::raw(current));
    }
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    fn screen_text(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(60, 16)).unwrap();
        terminal.draw(|frame| render(app, frame)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_parse_markdown_line() {
        let line = parse_markdown_line("Act **without attachment** always");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "without attachment");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));

        let line = parse_markdown_line("2 ** 3 is unclosed");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].content, "2 ** 3 is unclosed");

        let line = parse_markdown_line("a **** b");
        assert_eq!(line.spans[0].content, "a **** b");
    }

    #[test]
    fn test_input_scroll_offset() {
        assert_eq!(input_scroll_offset(3, 10), 0);
        assert_eq!(input_scroll_offset(10, 10), 1);
        assert_eq!(input_scroll_offset(25, 10), 16);
        assert_eq!(input_scroll_offset(5, 0), 0);
    }

    #[test]
    fn test_render_placeholder() {
        let mut app = App::new("http://localhost:8000");
        let text = screen_text(&mut app);
        assert!(text.contains("Ask a question about the Bhagavad Gita"));
        assert!(text.contains("GeetaGPT"));
        assert_eq!(app.chat_width, 58);
    }

    #[tokio::test]
    async fn test_render_pending_question() {
        let mut app = App::new("http://127.0.0.1:9");
        app.input = "What is dharma?".to_string();
        app.cursor = app.input.chars().count();
        assert!(app.submit_input());

        let text = screen_text(&mut app);
        assert!(text.contains("You:"));
        assert!(text.contains("What is dharma?"));
        assert!(text.contains("Thinking."));
    }
}
