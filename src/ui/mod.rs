mod theme;

use crate::app::{AppModel, LineEditor, LogKind, LogLine, Stage, inner_terminal_size};
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::time::Duration;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const SPINNER_FRAMES: [char; 8] = ['⣾', '⣽', '⣻', '⢿', '⡿', '⣟', '⣯', '⣷'];
const SECRET_MASK: char = '•';
const DOMAINS_PLACEHOLDER: &str = "Paste domains or URLs, separated by spaces, commas or new lines…";

pub fn render(frame: &mut Frame, model: &AppModel) {
    let full_area = frame.area();
    if full_area.width == 0 || full_area.height == 0 {
        return;
    }

    let area = inner_area(full_area);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    match model.stage {
        Stage::Email => render_credential(
            frame,
            &chunks,
            "Email",
            "Enter your Cloudways account email, then press Enter.",
            &model.email,
            None,
        ),
        Stage::Api => render_credential(
            frame,
            &chunks,
            "API Key",
            "Enter your Cloudways API key (input is hidden), then press Enter.",
            &model.api_key,
            Some(SECRET_MASK),
        ),
        Stage::Domains => render_domains(frame, &chunks, model),
        Stage::Confirm => render_confirm(frame, &chunks, model),
        Stage::Running | Stage::Done => render_run(frame, &chunks, model),
    }

    let footer = Paragraph::new(footer_text(model.stage)).style(theme::footer());
    frame.render_widget(footer, chunks[2]);
}

fn header(title: String, hint: Line<'static>) -> Paragraph<'static> {
    Paragraph::new(hint).block(
        Block::default()
            .borders(Borders::ALL)
            .padding(Padding::horizontal(1))
            .title(title),
    )
}

fn render_credential(
    frame: &mut Frame,
    chunks: &[Rect],
    title: &str,
    hint: &str,
    editor: &LineEditor,
    mask: Option<char>,
) {
    let hint = truncate_end(hint, (chunks[0].width as usize).saturating_sub(4));
    frame.render_widget(header(format!("CW Backup · {title}"), Line::from(hint)), chunks[0]);

    let body = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(chunks[1]);
    let input_block = Block::default()
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1))
        .title(title.to_string());
    let input_inner = input_block.inner(body[0]);
    frame.render_widget(input_block, body[0]);
    if input_inner.width == 0 || input_inner.height == 0 {
        return;
    }

    let shown = match mask {
        Some(mask) => editor.masked(mask),
        None => editor.text.clone(),
    };
    let cursor_offset = display_width_before(&shown, editor.cursor_col);
    let visible_width = input_inner.width as usize;
    let scroll_x = cursor_offset.saturating_sub(visible_width.saturating_sub(1));
    let paragraph = Paragraph::new(shown).scroll((0, scroll_x as u16));
    frame.render_widget(paragraph, input_inner);

    let x = input_inner
        .x
        .saturating_add((cursor_offset - scroll_x) as u16)
        .min(input_inner.x.saturating_add(input_inner.width.saturating_sub(1)));
    frame.set_cursor_position(Position { x, y: input_inner.y });
}

fn render_domains(frame: &mut Frame, chunks: &[Rect], model: &AppModel) {
    let hint = "One or more domains. Enter adds a line; press Ctrl+D when finished.";
    let hint = truncate_end(hint, (chunks[0].width as usize).saturating_sub(4));
    frame.render_widget(header("CW Backup · Domains".to_string(), Line::from(hint)), chunks[0]);

    let editor = &model.domains;
    let editor_block = Block::default()
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1))
        .title("Domains");
    let editor_inner = editor_block.inner(chunks[1]);
    frame.render_widget(editor_block, chunks[1]);
    if editor_inner.width == 0 || editor_inner.height == 0 {
        return;
    }

    let visible_height = editor_inner.height as usize;
    let cursor_row = editor.cursor_row;
    let scroll_row = cursor_row.saturating_sub(visible_height.saturating_sub(1));

    let lines = if editor.is_empty() && editor.lines.len() == 1 {
        vec![Line::from(Span::styled(DOMAINS_PLACEHOLDER, theme::placeholder()))]
    } else {
        editor
            .lines
            .iter()
            .skip(scroll_row)
            .take(visible_height)
            .map(|line| Line::from(line.replace('\t', " ")))
            .collect()
    };
    frame.render_widget(Paragraph::new(lines), editor_inner);

    let cursor_line = editor.lines.get(cursor_row).map(String::as_str).unwrap_or("");
    let cursor_y = cursor_row.saturating_sub(scroll_row);
    if cursor_y < visible_height {
        let x_offset = display_width_before(cursor_line, editor.cursor_col) as u16;
        let x = editor_inner
            .x
            .saturating_add(x_offset)
            .min(editor_inner.x.saturating_add(editor_inner.width.saturating_sub(1)));
        let y = editor_inner.y.saturating_add(cursor_y as u16);
        frame.set_cursor_position(Position { x, y });
    }
}

fn render_confirm(frame: &mut Frame, chunks: &[Rect], model: &AppModel) {
    let count = model.normalized_domains.len();
    let hint = if count == 0 {
        Line::from(Span::styled("Nothing to back up yet.", theme::error()))
    } else {
        Line::from(vec![
            Span::raw("Run the backup for "),
            Span::styled(format!("{count} domain(s)"), theme::emphasis()),
            Span::raw("?"),
        ])
    };
    frame.render_widget(header("Confirm".to_string(), hint), chunks[0]);

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Email:  ", theme::label()),
            Span::raw(model.email.value().trim().to_string()),
        ]),
        Line::from(vec![
            Span::styled("Script: ", theme::label()),
            Span::raw(model.script_path.display().to_string()),
        ]),
        Line::from(""),
    ];
    if count == 0 {
        lines.push(Line::from(Span::styled("No valid domains parsed.", theme::error())));
    } else {
        lines.push(Line::from(Span::styled(format!("Domains ({count}):"), theme::label())));
        lines.extend(
            model
                .normalized_domains
                .iter()
                .map(|domain| Line::from(format!("  • {domain}"))),
        );
    }
    if model.ignored_tokens > 0 {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("{} token(s) did not look like a domain and were ignored.", model.ignored_tokens),
            theme::placeholder(),
        )));
    }

    let body = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .padding(Padding::horizontal(1))
            .title("Summary"),
    );
    frame.render_widget(body, chunks[1]);
}

fn render_run(frame: &mut Frame, chunks: &[Rect], model: &AppModel) {
    let elapsed = match (model.run_elapsed, model.run_started_at) {
        (Some(elapsed), _) => elapsed,
        (None, Some(started)) => started.elapsed(),
        (None, None) => Duration::ZERO,
    };
    let (title, hint) = if model.stage == Stage::Running {
        let spinner = SPINNER_FRAMES[model.spinner_frame % SPINNER_FRAMES.len()];
        let hint = Line::from(vec![
            Span::styled(format!("{spinner} "), theme::emphasis()),
            Span::raw(format!(
                "{} domain(s) · {}",
                model.normalized_domains.len(),
                format_elapsed(elapsed)
            )),
        ]);
        ("Running backup…".to_string(), hint)
    } else {
        let failed = model.log.last().is_some_and(|line| line.kind == LogKind::Error);
        let status = if failed {
            Span::styled("Failed", theme::error())
        } else {
            Span::styled("Completed", theme::success())
        };
        let hint = Line::from(vec![
            status,
            Span::raw(format!(" · {}", format_elapsed(elapsed))),
        ]);
        ("Finished".to_string(), hint)
    };
    frame.render_widget(header(title, hint), chunks[0]);

    let log_block = Block::default()
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1))
        .title(format!("Output ({} lines)", model.log.len()));
    let log_inner = log_block.inner(chunks[1]);
    frame.render_widget(log_block, chunks[1]);
    if log_inner.height == 0 {
        return;
    }

    let height = log_inner.height as usize;
    let top = model.log_scroll.top_line(model.log.len(), height);
    let lines = model
        .log
        .iter()
        .skip(top)
        .take(height)
        .map(log_line)
        .collect::<Vec<_>>();
    frame.render_widget(Paragraph::new(lines), log_inner);
}

fn log_line(line: &LogLine) -> Line<'static> {
    let text = line.text.replace('\t', "    ");
    match line.kind {
        LogKind::Output => Line::from(text),
        LogKind::Success => Line::from(Span::styled(text, theme::success())),
        LogKind::Error => Line::from(Span::styled(text, theme::error())),
    }
}

fn footer_text(stage: Stage) -> &'static str {
    match stage {
        Stage::Email => "Keys: type email  Enter=next  Ctrl+U=clear  Ctrl+Q/Ctrl+C=quit",
        Stage::Api => "Keys: type key  Enter=next  Esc=back  Ctrl+U=clear  Ctrl+Q/Ctrl+C=quit",
        Stage::Domains => "Keys: edit text  Enter=new line  Ctrl+D=finish  Esc=back  Ctrl+Q/Ctrl+C=quit",
        Stage::Confirm => "Keys: y=run  n=edit domains  b/Esc=back  q=quit",
        Stage::Running => "Keys: arrows/PgUp/PgDn=scroll  End=follow  q/Ctrl+C=cancel and quit",
        Stage::Done => "Keys: arrows/PgUp/PgDn=scroll  End=follow  q/Esc=quit",
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{minutes}m {:02}s", seconds % 60);
    }
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

fn display_width_before(text: &str, cursor_col: usize) -> usize {
    text.chars()
        .take(cursor_col)
        .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0))
        .sum()
}

fn truncate_end(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }
    let ellipsis = "…";
    let available = max_width.saturating_sub(UnicodeWidthStr::width(ellipsis));
    let mut out = String::new();
    let mut width = 0;
    for ch in text.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width > available {
            break;
        }
        width += ch_width;
        out.push(ch);
    }
    out.push_str(ellipsis);
    out
}

fn inner_area(area: Rect) -> Rect {
    let (width, height) = inner_terminal_size((area.width, area.height));
    if (width, height) == (area.width, area.height) {
        return area;
    }
    area.inner(Margin {
        vertical: 1,
        horizontal: 2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Prefill;
    use ratatui::backend::TestBackend;
    use std::path::PathBuf;

    fn model(stage: Stage) -> AppModel {
        let prefill = Prefill {
            email: Some("me@example.com".to_string()),
            api_key: Some("s3cret-key".to_string()),
            domains: None,
        };
        let mut model = AppModel::new(PathBuf::from("/opt/backup.sh"), &prefill)
            .with_terminal_size(80, 24);
        model.stage = stage;
        model
    }

    fn screen(model: &AppModel) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).expect("terminal");
        terminal.draw(|frame| render(frame, model)).expect("draw");
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn api_key_is_never_drawn_in_plain_text() {
        let text = screen(&model(Stage::Api));
        assert!(!text.contains("s3cret-key"));
        assert!(text.contains("••••••••••"));
    }

    #[test]
    fn empty_domain_list_shows_placeholder() {
        let text = screen(&model(Stage::Domains));
        assert!(text.contains("Paste domains"));
    }

    #[test]
    fn confirm_without_domains_warns() {
        let text = screen(&model(Stage::Confirm));
        assert!(text.contains("No valid domains parsed."));
        assert!(text.contains("me@example.com"));
    }

    #[test]
    fn confirm_lists_each_domain() {
        let mut model = model(Stage::Confirm);
        model.normalized_domains = vec!["a.com".to_string(), "b.org".to_string()];
        let text = screen(&model);
        assert!(text.contains("• a.com"));
        assert!(text.contains("• b.org"));
        assert!(text.contains("2 domain(s)"));
    }

    #[test]
    fn done_view_follows_the_tail() {
        let mut model = model(Stage::Done);
        model.log = (0..60)
            .map(|index| LogLine {
                kind: LogKind::Output,
                text: format!("row-{index:02}"),
            })
            .collect();
        model.log.push(LogLine {
            kind: LogKind::Error,
            text: "Process error: exit status 2".to_string(),
        });
        let text = screen(&model);
        assert!(text.contains("Process error: exit status 2"));
        assert!(text.contains("row-59"));
        assert!(!text.contains("row-00"));
        assert!(text.contains("Failed"));
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_secs(9)), "9s");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_elapsed(Duration::from_secs(3_720)), "1h 02m");
    }
}
