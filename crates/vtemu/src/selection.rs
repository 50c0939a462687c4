//! Text selection: drag ranges, word/line click extension, and clipboard
//! extraction.

use std::io;

use crate::cell::CONTINUATION;
use crate::terminal::TermState;

/// The current selection, in buffer coordinates. Start and end carry the
/// width of the character they landed on so multi-column characters are
/// selected whole.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SelectionState {
    pub(crate) active: bool,
    pub(crate) start_row: i32,
    pub(crate) start_col: i32,
    pub(crate) start_width: i32,
    pub(crate) end_row: i32,
    pub(crate) end_col: i32,
    pub(crate) end_width: i32,
}

/// Character classes used for double-click word extension. Only ASCII is
/// classified; anything else selects as a singleton.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum CharClass {
    Word,
    Punct,
    Space,
}

fn class_of(codepoint: i32) -> Option<CharClass> {
    if codepoint == 0 || codepoint == ' ' as i32 {
        return Some(CharClass::Space);
    }
    let Ok(byte) = u8::try_from(codepoint) else {
        return None;
    };
    if !byte.is_ascii() {
        return None;
    }
    if byte.is_ascii_alphanumeric() || byte == b'_' {
        Some(CharClass::Word)
    } else if byte.is_ascii_whitespace() {
        Some(CharClass::Space)
    } else if byte.is_ascii_graphic() {
        Some(CharClass::Punct)
    } else {
        None
    }
}

impl TermState {
    /// Locate the beginning of the character at the given position,
    /// rewinding `column` over continuation cells. Returns the character's
    /// width (1 when unknown).
    fn find_char(&self, row: i32, column: &mut i32) -> i32 {
        let Some((cells, _)) = self.buffer().get_columns(row) else {
            return 1;
        };

        let mut start = *column;
        if (start as usize) < cells.len() {
            while start > 0 && cells[start as usize].value == CONTINUATION {
                start -= 1;
            }
            let cell = &cells[start as usize];
            if cell.value != CONTINUATION {
                *column = start;
                return i32::from(cell.width);
            }
        }

        1
    }

    /// Repaint the selection highlight from the current endpoints.
    fn select_redraw(&mut self) {
        let selection = self.selection;
        let start_row = selection.start_row + self.scroll_offset;
        let mut start_col = selection.start_col;
        let end_row = selection.end_row + self.scroll_offset;
        let mut end_col = selection.end_col;

        // Extend whichever endpoint is later to cover its full character
        if start_row > end_row || (start_row == end_row && start_col > end_col) {
            start_col += selection.start_width - 1;
        } else {
            end_col += selection.end_width - 1;
        }

        self.display.select(start_row, start_col, end_row, end_col);
    }

    /// Begin a selection at the given buffer position.
    pub(crate) fn select_start(&mut self, row: i32, column: i32) {
        let mut column = column;
        let width = self.find_char(row, &mut column);

        self.selection = SelectionState {
            active: true,
            start_row: row,
            start_col: column,
            start_width: width,
            end_row: row,
            end_col: column,
            end_width: width,
        };

        self.select_redraw();
    }

    /// Extend the selection to the given buffer position.
    pub(crate) fn select_update(&mut self, row: i32, column: i32) {
        // Only update if the position moved to a different character
        if row == self.selection.end_row
            && column >= self.selection.end_col
            && column < self.selection.end_col + self.selection.end_width
        {
            return;
        }

        let mut column = column;
        let width = self.find_char(row, &mut column);

        self.selection.end_row = row;
        self.selection.end_col = column;
        self.selection.end_width = width;

        self.select_redraw();
    }

    /// Append the text of one row's column range to `out`, clipping to the
    /// row's populated extent. An `end` of `None` means the full row.
    fn append_row_text(&self, row: i32, start: i32, end: Option<i32>, out: &mut String) {
        let Some((cells, _)) = self.buffer().get_columns(row) else {
            return;
        };
        if cells.is_empty() {
            return;
        }

        let last = cells.len() as i32 - 1;
        if start > last {
            return;
        }
        let end = end.map_or(last, |e| e.min(last));

        for cell in &cells[start.max(0) as usize..=end.max(0) as usize] {
            // Blank and continuation cells contribute nothing
            if cell.value == 0 || cell.value == CONTINUATION {
                continue;
            }
            crate::cell::push_codepoint(cell.value, out);
        }
    }

    /// The currently-selected text, rows joined with newlines.
    pub(crate) fn selected_text(&self) -> String {
        let selection = &self.selection;

        // Order the endpoints
        let (start_row, start_col, end_row, end_col) = if selection.start_row < selection.end_row
            || (selection.start_row == selection.end_row
                && selection.start_col < selection.end_col)
        {
            (
                selection.start_row,
                selection.start_col,
                selection.end_row,
                selection.end_col + selection.end_width - 1,
            )
        } else {
            (
                selection.end_row,
                selection.end_col,
                selection.start_row,
                selection.start_col + selection.start_width - 1,
            )
        };

        let mut text = String::new();

        if start_row == end_row {
            self.append_row_text(start_row, start_col, Some(end_col), &mut text);
        } else {
            self.append_row_text(start_row, start_col, None, &mut text);
            for row in start_row + 1..end_row {
                text.push('\n');
                self.append_row_text(row, 0, None, &mut text);
            }
            text.push('\n');
            self.append_row_text(end_row, 0, Some(end_col), &mut text);
        }

        text
    }

    /// End the selection, committing the highlight and copying the text to
    /// the shared clipboard (unless copying is disabled).
    pub(crate) fn select_end(&mut self) -> io::Result<()> {
        self.selection.active = false;
        self.display.commit_select();

        if self.disable_copy {
            return Ok(());
        }

        let text = self.selected_text();
        let stream = self.alloc_stream();
        let clipboard = self.clipboard.clone();
        let mut guard = clipboard.lock();
        guard.reset("text/plain");
        guard.append(text.as_bytes());
        guard.send(stream, self.sink.as_mut())
    }

    /// Double-click: select the run of same-class characters around the
    /// given position. Non-ASCII characters select as singletons.
    pub(crate) fn select_word(&mut self, row: i32, column: i32) {
        let mut column = column;
        let width = self.find_char(row, &mut column);

        let Some((cells, _)) = self.buffer().get_columns(row) else {
            return;
        };
        let Some(cell) = cells.get(column as usize) else {
            return;
        };

        let (mut head, mut tail) = (column, column + width - 1);

        if let Some(class) = class_of(cell.value) {
            let length = cells.len() as i32;

            while head > 0 {
                let mut probe = head - 1;
                // Step over continuations to the owning character
                while probe > 0 && cells[probe as usize].value == CONTINUATION {
                    probe -= 1;
                }
                if class_of(cells[probe as usize].value) != Some(class) {
                    break;
                }
                head = probe;
            }

            while tail + 1 < length {
                let probe = tail + 1;
                if cells[probe as usize].value == CONTINUATION {
                    tail = probe;
                    continue;
                }
                if class_of(cells[probe as usize].value) != Some(class) {
                    break;
                }
                tail = probe;
            }
        }

        let mut head_col = head;
        let head_width = self.find_char(row, &mut head_col);
        let mut tail_col = tail;
        let tail_width = self.find_char(row, &mut tail_col);

        self.selection = SelectionState {
            active: true,
            start_row: row,
            start_col: head_col,
            start_width: head_width,
            end_row: row,
            end_col: tail_col,
            end_width: tail_width,
        };

        self.select_redraw();
    }

    /// Triple-click: select the whole row.
    pub(crate) fn select_line(&mut self, row: i32) {
        let length = self
            .buffer()
            .get_columns(row)
            .map_or(0, |(cells, _)| cells.len() as i32);
        let last = (length - 1).max(0);

        let mut end_col = last;
        let end_width = self.find_char(row, &mut end_col);

        self.selection = SelectionState {
            active: true,
            start_row: row,
            start_col: 0,
            start_width: 1,
            end_row: row,
            end_col,
            end_width,
        };

        self.select_redraw();
    }
}
