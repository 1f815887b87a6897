use ratatui::style::{Color, Modifier, Style};

pub const ACCENT: Color = Color::Rgb(255, 159, 26);
pub const MUTED: Color = Color::Rgb(156, 163, 175);
pub const DIM: Color = Color::DarkGray;

pub const SUCCESS: Color = Color::Rgb(134, 239, 172);
pub const ERROR: Color = Color::Rgb(248, 113, 113);

pub fn footer() -> Style {
    Style::default().fg(DIM)
}

pub fn placeholder() -> Style {
    Style::default().fg(DIM)
}

pub fn label() -> Style {
    Style::default().fg(MUTED)
}

pub fn emphasis() -> Style {
    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
}

pub fn success() -> Style {
    Style::default().fg(SUCCESS).add_modifier(Modifier::BOLD)
}

pub fn error() -> Style {
    Style::default().fg(ERROR).add_modifier(Modifier::BOLD)
}
