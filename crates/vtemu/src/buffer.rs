//! The scrollback buffer: a bounded ring of variable-length rows.

use smallvec::SmallVec;

use crate::cell::{Attributes, CONTINUATION, Cell};

/// The maximum number of rows of any terminal display.
pub const MAX_ROWS: usize = 1024;

/// The maximum number of columns of any terminal display.
pub const MAX_COLUMNS: usize = 1024;

/// The minimum cell capacity of a buffer row. Rows grow by powers of two
/// from this floor to reduce reallocation overhead for short rows.
const ROW_MIN_CAPACITY: usize = 256;

/// Ranges cleared by edge-break enforcement: at most one per side.
pub(crate) type BreakRanges = SmallVec<[(i32, i32, Attributes); 2]>;

/// A single variable-length row of terminal data.
#[derive(Debug, Clone)]
pub struct Row {
    cells: Vec<Cell>,
    wrapped: bool,
}

impl Row {
    fn new() -> Self {
        Self {
            cells: Vec::new(),
            wrapped: false,
        }
    }

    /// The initialized cells of this row.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// The number of initialized cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether this row soft-wraps into the following row.
    #[must_use]
    pub fn wrapped(&self) -> bool {
        self.wrapped
    }

    /// Grow the row to hold at least `length` cells, filling new cells with
    /// `default`. Length only ever grows, and is clamped to the maximum
    /// column count.
    fn expand(&mut self, length: usize, default: &Cell) {
        let length = length.min(MAX_COLUMNS);
        if length <= self.cells.len() {
            return;
        }

        if length > self.cells.capacity() {
            let mut rounded = ROW_MIN_CAPACITY;
            while rounded < length {
                rounded <<= 1;
            }
            self.cells.reserve_exact(rounded - self.cells.len());
        }

        self.cells.resize(length, *default);
    }
}

/// A ring of rows forming the terminal display and its scrollback.
///
/// `top` is the ring index of display row 0; row index `i` (negative for
/// scrollback rows) maps to `rows[(top + i) mod capacity]`. Scrolling up
/// advances `top` and may grow `length`; scrolling down retreats `top`.
#[derive(Debug)]
pub struct Buffer {
    rows: Vec<Row>,
    top: usize,
    length: usize,
    default_cell: Cell,
}

impl Buffer {
    #[must_use]
    pub fn new(capacity: usize, default_cell: Cell) -> Self {
        let capacity = capacity.max(1);
        let mut rows = Vec::with_capacity(capacity);
        rows.resize_with(capacity, Row::new);
        Self {
            rows,
            top: 0,
            length: 0,
            default_cell,
        }
    }

    /// Total ring capacity in rows.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.rows.len()
    }

    /// The number of populated rows (visible rows plus scrollback).
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Ring index of display row 0.
    #[must_use]
    pub fn top(&self) -> usize {
        self.top
    }

    #[must_use]
    pub fn default_cell(&self) -> Cell {
        self.default_cell
    }

    pub fn set_default_cell(&mut self, cell: Cell) {
        self.default_cell = cell;
    }

    /// The populated length limited to the given scrollback setting.
    #[must_use]
    pub fn effective_length(&self, scrollback: usize) -> usize {
        self.length.min(scrollback)
    }

    /// Forget all rows. Row storage is retained; callers are expected to
    /// clear the visible display separately.
    pub fn reset(&mut self) {
        self.top = 0;
        self.length = 0;
    }

    fn index(&self, row: i32) -> Option<usize> {
        let capacity = self.capacity();
        if row.unsigned_abs() as usize >= capacity {
            return None;
        }
        let index = (self.top as i64 + i64::from(row)).rem_euclid(capacity as i64);
        Some(index as usize)
    }

    /// The row at the given location, where 0 is the top-most display row
    /// and negative indices address the scrollback.
    #[must_use]
    pub fn get_row(&self, row: i32) -> Option<&Row> {
        self.index(row).map(|i| &self.rows[i])
    }

    fn get_row_mut(&mut self, row: i32) -> Option<&mut Row> {
        self.index(row).map(move |i| &mut self.rows[i])
    }

    /// The cells and soft-wrap flag of the given row.
    #[must_use]
    pub fn get_columns(&self, row: i32) -> Option<(&[Cell], bool)> {
        self.get_row(row).map(|r| (r.cells(), r.wrapped()))
    }

    /// Mark whether the given row soft-wraps into the next.
    pub fn set_wrapped(&mut self, row: i32, wrapped: bool) {
        if let Some(r) = self.get_row_mut(row) {
            r.wrapped = wrapped;
        }
    }

    /// Advance the ring by `amount` rows, growing the populated length up
    /// to capacity.
    pub fn scroll_up(&mut self, amount: usize) {
        if amount == 0 {
            return;
        }
        self.top = (self.top + amount) % self.capacity();
        self.length = (self.length + amount).min(self.capacity());
    }

    /// Retreat the ring by `amount` rows.
    pub fn scroll_down(&mut self, amount: usize) {
        if amount == 0 {
            return;
        }
        let capacity = self.capacity() as i64;
        self.top = ((self.top as i64 - amount as i64).rem_euclid(capacity)) as usize;
    }

    /// Advance `top` without growing the populated length. Used by resize,
    /// where rows leaving the visible area become scrollback that already
    /// counted toward the length.
    pub(crate) fn rotate_up(&mut self, amount: usize) {
        self.top = (self.top + amount) % self.capacity();
    }

    /// Retreat `top` without changing the populated length.
    pub(crate) fn rotate_down(&mut self, amount: usize) {
        let capacity = self.capacity() as i64;
        self.top = ((self.top as i64 - amount as i64).rem_euclid(capacity)) as usize;
    }

    /// Write `cell` (with its continuation cells) across the given column
    /// range, without enforcing edge breaks. The row expands to cover the
    /// range, and the populated length grows if a non-blank value lands on
    /// a previously-unpopulated row.
    pub(crate) fn write_columns(&mut self, row: i32, start: i32, end: i32, cell: &Cell) {
        // Nothing sane can be done for empty glyphs or impossible rows
        if cell.width == 0 || row.unsigned_abs() as usize >= MAX_ROWS {
            return;
        }

        let start = start.clamp(0, MAX_COLUMNS as i32 - 1) as usize;
        let end = end.clamp(0, MAX_COLUMNS as i32 - 1) as usize;
        if start > end {
            return;
        }

        let continuation = Cell {
            value: CONTINUATION,
            attributes: cell.attributes,
            width: 0,
        };

        let default = self.default_cell;
        let value = cell.value;
        let Some(buffer_row) = self.get_row_mut(row) else {
            return;
        };
        buffer_row.expand(end + 1, &default);

        let mut remaining_continuation = 0;
        for target in &mut buffer_row.cells[start..=end] {
            if remaining_continuation > 0 {
                *target = continuation;
                remaining_continuation -= 1;
            } else {
                *target = *cell;
                remaining_continuation = cell.width - 1;
            }
        }

        if value != 0 && row >= 0 && row as usize >= self.length {
            self.length = row as usize + 1;
        }
    }

    /// Write `cell` across the given column range, enforcing breaks at
    /// both edges so no half-destroyed multi-column character remains.
    pub fn set_columns(&mut self, row: i32, start: i32, end: i32, cell: &Cell) {
        self.write_columns(row, start, end, cell);
        self.force_break(row, start);
        self.force_break(row, end + 1);
    }

    /// Move the given column range by `offset` columns, without enforcing
    /// edge breaks. The row expands to cover the destination.
    pub(crate) fn shift_columns(&mut self, row: i32, start: i32, end: i32, offset: i32) {
        let default = self.default_cell;
        let Some(buffer_row) = self.get_row_mut(row) else {
            return;
        };
        buffer_row.expand((end + offset + 1).max(0) as usize, &default);

        let length = buffer_row.cells.len() as i32;

        // Fit the relevant extents of the operation within bounds. The
        // destination is represented by the same range plus the offset, so
        // no separate clamp is needed for it.
        let (start, end) = if offset >= 0 {
            let limit = length - offset - 1;
            if limit < 0 {
                return;
            }
            let start = start.clamp(0, limit);
            (start, end.clamp(start, limit))
        } else {
            if length == 0 {
                return;
            }
            let start = start.clamp(-offset, length - 1);
            (start, end.clamp(start, length - 1))
        };
        if start > end {
            return;
        }

        let src = start as usize..(end + 1) as usize;
        let dst = (start + offset) as usize;
        buffer_row.cells.copy_within(src, dst);
    }

    /// Move the given column range by `offset` columns, enforcing breaks
    /// at both destination edges.
    pub fn copy_columns(&mut self, row: i32, start: i32, end: i32, offset: i32) {
        self.shift_columns(row, start, end, offset);
        self.force_break(row, start + offset);
        self.force_break(row, end + offset + 1);
    }

    /// Copy whole rows (cells, length, wrap flag) by `offset` rows,
    /// clearing the wrap flag of each source row after the copy.
    pub fn copy_rows(&mut self, start_row: i32, end_row: i32, offset: i32) {
        if end_row < start_row {
            return;
        }

        // When shifting down, copy in reverse so sources are read before
        // they are overwritten
        let rows: Vec<i32> = if offset > 0 {
            (start_row..=end_row).rev().collect()
        } else {
            (start_row..=end_row).collect()
        };

        for row in rows {
            let (Some(src_index), Some(dst_index)) = (self.index(row), self.index(row + offset))
            else {
                continue;
            };
            if src_index == dst_index {
                continue;
            }

            let (cells, wrapped) = {
                let src = &self.rows[src_index];
                (src.cells.clone(), src.wrapped)
            };

            let dst = &mut self.rows[dst_index];
            dst.cells.clear();
            dst.cells.extend_from_slice(&cells);
            dst.wrapped = wrapped;

            self.rows[src_index].wrapped = false;
        }
    }

    /// Toggle the cursor attribute of a single cell.
    pub fn set_cursor(&mut self, row: i32, column: i32, is_cursor: bool) {
        if row.unsigned_abs() as usize >= MAX_ROWS {
            return;
        }
        let column = column.clamp(0, MAX_COLUMNS as i32 - 1) as usize;
        let default = self.default_cell;
        let Some(buffer_row) = self.get_row_mut(row) else {
            return;
        };
        buffer_row.expand(column + 1, &default);
        buffer_row.cells[column].attributes.cursor = is_cursor;
    }

    /// Determine the cell ranges that must be cleared to enforce a
    /// character break at the given edge of the given row. For a character
    /// in column N, the left edge number is N and the right edge is N+1.
    ///
    /// At most one range is produced per side of the edge. Each range
    /// covers one broken multi-column character and carries the attributes
    /// to preserve when clearing it.
    pub(crate) fn broken_ranges(&self, row: i32, edge: i32) -> BreakRanges {
        let mut ranges = BreakRanges::new();
        let Some(buffer_row) = self.get_row(row) else {
            return ranges;
        };
        let cells = buffer_row.cells();
        let length = cells.len() as i32;

        // Left side of the edge: walk inward through continuation cells to
        // the owning character, then check its declared width covers the
        // span up to the edge
        if edge > 0 && edge - 1 < length {
            let end_column = edge - 1;
            let mut start_column = end_column;

            while start_column > 0 && cells[start_column as usize].is_continuation() {
                start_column -= 1;
            }

            let mut start = &cells[start_column as usize];
            if !start.is_continuation() && i32::from(start.width) < end_column - start_column + 1 {
                start_column += i32::from(start.width);
                start = &cells[start_column as usize];
            }

            if start.is_continuation() || i32::from(start.width) != end_column - start_column + 1 {
                ranges.push((start_column, end_column, start.attributes));
            }
        }

        // Right side of the edge
        if edge >= 0 && edge < length {
            let mut start_column = edge;
            let mut end_column = edge;

            while end_column + 1 < length && cells[(end_column + 1) as usize].is_continuation() {
                end_column += 1;
            }

            let mut start = &cells[start_column as usize];
            if !start.is_continuation() && i32::from(start.width) < end_column - start_column + 1 {
                start_column += i32::from(start.width);
                start = &cells[start_column as usize];
            }

            if start.is_continuation() || i32::from(start.width) != end_column - start_column + 1 {
                ranges.push((start_column, end_column, start.attributes));
            }
        }

        ranges
    }

    /// Enforce a character break at the given edge, clearing any broken
    /// multi-column character to one-wide spaces preserving attributes.
    fn force_break(&mut self, row: i32, edge: i32) {
        for (start, end, attributes) in self.broken_ranges(row, edge) {
            let cleared = Cell {
                value: ' ' as i32,
                attributes,
                width: 1,
            };
            self.write_columns(row, start, end, &cleared);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use pretty_assertions::assert_eq;

    fn attrs() -> Attributes {
        Attributes::new(Color::rgb(200, 200, 200), Color::rgb(0, 0, 0))
    }

    fn buffer(capacity: usize) -> Buffer {
        Buffer::new(capacity, Cell::blank(attrs()))
    }

    fn narrow(value: char) -> Cell {
        Cell::new(value as i32, attrs(), 1)
    }

    fn wide(value: char) -> Cell {
        Cell::new(value as i32, attrs(), 2)
    }

    /// Check the continuation invariant over every populated row.
    fn assert_continuation_invariant(buffer: &Buffer) {
        for row in 0..buffer.len() as i32 {
            let Some(r) = buffer.get_row(row) else {
                continue;
            };
            let cells = r.cells();
            let mut col = 0;
            while col < cells.len() {
                let cell = &cells[col];
                assert!(
                    !cell.is_continuation(),
                    "row {row} col {col}: continuation without owner"
                );
                for trailing in 1..usize::from(cell.width) {
                    assert!(
                        cells[col + trailing].is_continuation(),
                        "row {row} col {}: missing continuation",
                        col + trailing
                    );
                }
                col += usize::from(cell.width.max(1));
            }
        }
    }

    #[test]
    fn set_and_read_back() {
        let mut buffer = buffer(10);
        buffer.set_columns(0, 0, 0, &narrow('A'));
        let (cells, wrapped) = buffer.get_columns(0).unwrap();
        assert_eq!(cells[0].value, 'A' as i32);
        assert!(!wrapped);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn blank_write_does_not_populate() {
        let mut buffer = buffer(10);
        buffer.set_columns(0, 0, 4, &Cell::blank(attrs()));
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn wide_character_lays_continuation() {
        let mut buffer = buffer(10);
        buffer.set_columns(0, 2, 3, &wide('漢'));
        let (cells, _) = buffer.get_columns(0).unwrap();
        assert_eq!(cells[2].value, '漢' as i32);
        assert_eq!(cells[3].value, CONTINUATION);
        assert_continuation_invariant(&buffer);
    }

    #[test]
    fn overwrite_left_half_of_wide_char_clears_remnant() {
        let mut buffer = buffer(10);
        buffer.set_columns(0, 2, 3, &wide('漢'));
        buffer.set_columns(0, 2, 2, &narrow('x'));
        let (cells, _) = buffer.get_columns(0).unwrap();
        assert_eq!(cells[2].value, 'x' as i32);
        // The orphaned continuation becomes a one-wide space
        assert_eq!(cells[3].value, ' ' as i32);
        assert_eq!(cells[3].width, 1);
        assert_continuation_invariant(&buffer);
    }

    #[test]
    fn overwrite_right_half_of_wide_char_clears_owner() {
        let mut buffer = buffer(10);
        buffer.set_columns(0, 2, 3, &wide('漢'));
        buffer.set_columns(0, 3, 3, &narrow('x'));
        let (cells, _) = buffer.get_columns(0).unwrap();
        assert_eq!(cells[2].value, ' ' as i32);
        assert_eq!(cells[3].value, 'x' as i32);
        assert_continuation_invariant(&buffer);
    }

    #[test]
    fn scroll_round_trip_preserves_top() {
        let mut buffer = buffer(10);
        for row in 0..5 {
            buffer.set_columns(row, 0, 0, &narrow('r'));
        }
        let top = buffer.top();
        buffer.scroll_up(3);
        buffer.scroll_down(3);
        assert_eq!(buffer.top(), top);
    }

    #[test]
    fn scroll_up_saturates_length_at_capacity() {
        let mut buffer = buffer(4);
        for _ in 0..10 {
            buffer.scroll_up(1);
        }
        assert_eq!(buffer.len(), 4);
        assert!(buffer.top() < buffer.capacity());
    }

    #[test]
    fn scroll_down_wraps_ring() {
        let mut buffer = buffer(4);
        buffer.scroll_down(1);
        assert_eq!(buffer.top(), 3);
    }

    #[test]
    fn negative_rows_address_scrollback() {
        let mut buffer = buffer(10);
        buffer.set_columns(0, 0, 0, &narrow('a'));
        buffer.scroll_up(1);
        let (cells, _) = buffer.get_columns(-1).unwrap();
        assert_eq!(cells[0].value, 'a' as i32);
    }

    #[test]
    fn out_of_ring_rows_are_none() {
        let buffer = buffer(10);
        assert!(buffer.get_row(10).is_none());
        assert!(buffer.get_row(-10).is_none());
        assert!(buffer.get_row(9).is_some());
    }

    #[test]
    fn copy_columns_shifts_cells() {
        let mut buffer = buffer(10);
        for (i, c) in "abcd".chars().enumerate() {
            buffer.set_columns(0, i as i32, i as i32, &narrow(c));
        }
        buffer.copy_columns(0, 0, 2, 1);
        let (cells, _) = buffer.get_columns(0).unwrap();
        assert_eq!(cells[1].value, 'a' as i32);
        assert_eq!(cells[2].value, 'b' as i32);
        assert_eq!(cells[3].value, 'c' as i32);
    }

    #[test]
    fn copy_columns_breaks_wide_char_at_destination_edge() {
        let mut buffer = buffer(10);
        buffer.set_columns(0, 0, 1, &wide('漢'));
        buffer.set_columns(0, 2, 2, &narrow('x'));
        // Shift "x" left onto the continuation cell
        buffer.copy_columns(0, 2, 2, -1);
        assert_continuation_invariant(&buffer);
    }

    #[test]
    fn copy_rows_moves_content_and_clears_source_wrap() {
        let mut buffer = buffer(10);
        buffer.set_columns(0, 0, 0, &narrow('a'));
        buffer.set_wrapped(0, true);
        buffer.copy_rows(0, 0, 2);
        let (cells, wrapped) = buffer.get_columns(2).unwrap();
        assert_eq!(cells[0].value, 'a' as i32);
        assert!(wrapped);
        let (_, source_wrapped) = buffer.get_columns(0).unwrap();
        assert!(!source_wrapped);
    }

    #[test]
    fn effective_length_honours_limit() {
        let mut buffer = buffer(100);
        for _ in 0..50 {
            buffer.scroll_up(1);
        }
        assert_eq!(buffer.effective_length(30), 30);
        assert_eq!(buffer.effective_length(80), 50);
    }

    #[test]
    fn row_expansion_is_clamped() {
        let mut buffer = buffer(4);
        buffer.set_columns(0, 0, MAX_COLUMNS as i32 + 50, &narrow('x'));
        let (cells, _) = buffer.get_columns(0).unwrap();
        assert_eq!(cells.len(), MAX_COLUMNS);
    }

    #[test]
    fn set_cursor_toggles_attribute() {
        let mut buffer = buffer(4);
        buffer.set_cursor(0, 3, true);
        let (cells, _) = buffer.get_columns(0).unwrap();
        assert!(cells[3].attributes.cursor);
        buffer.set_cursor(0, 3, false);
        let (cells, _) = buffer.get_columns(0).unwrap();
        assert!(!cells[3].attributes.cursor);
    }

    #[test]
    fn reset_forgets_rows() {
        let mut buffer = buffer(4);
        buffer.set_columns(0, 0, 0, &narrow('a'));
        buffer.scroll_up(2);
        buffer.reset();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.top(), 0);
    }
}
