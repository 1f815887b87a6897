use super::line_editor::char_to_byte_index;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::cmp::min;

/// Multi-line text area for the pasted domain list.
#[derive(Clone, Debug)]
pub struct TextEditor {
    pub lines: Vec<String>,
    pub cursor_row: usize,
    pub cursor_col: usize,
}

impl Default for TextEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEditor {
    pub fn new() -> Self {
        Self {
            lines: vec![String::new()],
            cursor_row: 0,
            cursor_col: 0,
        }
    }

    pub fn from_text(text: &str) -> Self {
        let mut editor = Self::new();
        editor.insert_str(text);
        editor
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.is_empty())
    }

    /// Applies an editing key. Enter inserts a line break. Returns false for non-editing keys.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char(ch) if !control && !key.modifiers.contains(KeyModifiers::ALT) => {
                self.insert_char(ch)
            }
            KeyCode::Enter => self.insert_newline(),
            KeyCode::Tab => self.insert_char('\t'),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete_forward(),
            KeyCode::Left => self.move_left(),
            KeyCode::Right => self.move_right(),
            KeyCode::Up => self.move_up(),
            KeyCode::Down => self.move_down(),
            KeyCode::Home => self.cursor_col = 0,
            KeyCode::End => self.cursor_col = self.current_line_len(),
            _ => return false,
        }
        true
    }

    pub fn insert_char(&mut self, ch: char) {
        let mut buffer = [0u8; 4];
        self.insert_str(ch.encode_utf8(&mut buffer));
    }

    pub fn insert_str(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.clamp_cursor();

        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        let mut parts = normalized.split('\n');
        let first = parts.next().unwrap_or_default();
        let rest = parts.collect::<Vec<_>>();

        let line = &mut self.lines[self.cursor_row];
        let byte_index = char_to_byte_index(line, self.cursor_col);
        let tail = line.split_off(byte_index);
        line.push_str(first);
        self.cursor_col += first.chars().count();

        let Some((last, middle)) = rest.split_last() else {
            self.lines[self.cursor_row].push_str(&tail);
            return;
        };
        let mut new_lines = middle.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        new_lines.push(format!("{last}{tail}"));
        let inserted = new_lines.len();
        let at = self.cursor_row + 1;
        self.lines.splice(at..at, new_lines);
        self.cursor_row += inserted;
        self.cursor_col = last.chars().count();
    }

    pub fn insert_newline(&mut self) {
        self.insert_str("\n");
    }

    pub fn backspace(&mut self) {
        self.clamp_cursor();
        if self.cursor_col > 0 {
            self.cursor_col -= 1;
            let line = &mut self.lines[self.cursor_row];
            let byte_index = char_to_byte_index(line, self.cursor_col);
            line.remove(byte_index);
            return;
        }
        if self.cursor_row == 0 {
            return;
        }

        let current = self.lines.remove(self.cursor_row);
        self.cursor_row -= 1;
        self.cursor_col = self.current_line_len();
        self.lines[self.cursor_row].push_str(&current);
    }

    pub fn delete_forward(&mut self) {
        self.clamp_cursor();
        if self.cursor_col < self.current_line_len() {
            let line = &mut self.lines[self.cursor_row];
            let byte_index = char_to_byte_index(line, self.cursor_col);
            line.remove(byte_index);
        } else if self.cursor_row + 1 < self.lines.len() {
            let next = self.lines.remove(self.cursor_row + 1);
            self.lines[self.cursor_row].push_str(&next);
        }
    }

    pub fn move_left(&mut self) {
        self.clamp_cursor();
        if self.cursor_col > 0 {
            self.cursor_col -= 1;
        } else if self.cursor_row > 0 {
            self.cursor_row -= 1;
            self.cursor_col = self.current_line_len();
        }
    }

    pub fn move_right(&mut self) {
        self.clamp_cursor();
        if self.cursor_col < self.current_line_len() {
            self.cursor_col += 1;
        } else if self.cursor_row + 1 < self.lines.len() {
            self.cursor_row += 1;
            self.cursor_col = 0;
        }
    }

    pub fn move_up(&mut self) {
        self.clamp_cursor();
        if self.cursor_row > 0 {
            self.cursor_row -= 1;
            self.cursor_col = min(self.cursor_col, self.current_line_len());
        }
    }

    pub fn move_down(&mut self) {
        self.clamp_cursor();
        if self.cursor_row + 1 < self.lines.len() {
            self.cursor_row += 1;
            self.cursor_col = min(self.cursor_col, self.current_line_len());
        }
    }

    fn current_line_len(&self) -> usize {
        self.lines
            .get(self.cursor_row)
            .map(|line| line.chars().count())
            .unwrap_or(0)
    }

    fn clamp_cursor(&mut self) {
        if self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.cursor_row = min(self.cursor_row, self.lines.len() - 1);
        self.cursor_col = min(self.cursor_col, self.current_line_len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_line_paste_splits_around_cursor() {
        let mut editor = TextEditor::from_text("ab");
        editor.move_left();
        editor.insert_str("1\r\n2\n3");
        assert_eq!(editor.lines, vec!["a1", "2", "3b"]);
        assert_eq!((editor.cursor_row, editor.cursor_col), (2, 1));
        assert_eq!(editor.text(), "a1\n2\n3b");
    }

    #[test]
    fn enter_inserts_line_break() {
        let mut editor = TextEditor::from_text("a.com");
        assert!(editor.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)));
        editor.insert_str("b.com");
        assert_eq!(editor.text(), "a.com\nb.com");
    }

    #[test]
    fn backspace_at_line_start_joins_lines() {
        let mut editor = TextEditor::from_text("one\ntwo");
        editor.cursor_col = 0;
        editor.backspace();
        assert_eq!(editor.lines, vec!["onetwo"]);
        assert_eq!((editor.cursor_row, editor.cursor_col), (0, 3));
    }

    #[test]
    fn delete_at_line_end_joins_next_line() {
        let mut editor = TextEditor::from_text("one\ntwo");
        editor.move_up();
        editor.cursor_col = 3;
        editor.delete_forward();
        assert_eq!(editor.text(), "onetwo");
    }

    #[test]
    fn ctrl_d_is_not_an_editing_key() {
        let mut editor = TextEditor::new();
        let ctrl_d = KeyEvent::new(KeyCode::Char('d'), KeyModifiers::CONTROL);
        assert!(!editor.handle_key(ctrl_d));
        assert!(editor.is_empty());
    }

    #[test]
    fn trailing_newline_in_paste_leaves_empty_last_line() {
        let editor = TextEditor::from_text("a.com\n");
        assert_eq!(editor.lines, vec!["a.com", ""]);
        assert_eq!(editor.text(), "a.com\n");
    }
}
