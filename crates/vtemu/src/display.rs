//! The display: a pending-frame character grid diffed against the last
//! rendered frame.
//!
//! Every mutation records a per-cell [`Operation`] describing how that cell
//! differs from the previously-rendered grid. A flush walks the grid once,
//! coalescing adjacent copies into copy-rects and adjacent same-style cells
//! into glyph runs, and emits one bounded batch of wire instructions.

use std::io;

use vtwire::{CompositeOp, Instruction, InstructionSink, LayerId};

use crate::cell::{Cell, push_codepoint};
use crate::color::{Color, FIRST_DARK, INTENSE_OFFSET, LAST_DARK, Palette};

/// The palette index of the color used to highlight selected text.
const HIGHLIGHT_COLOR: i16 = 4;

/// How a cell differs from the previously-rendered frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Operation {
    /// No change.
    Nop,
    /// The cell must be redrawn with this content.
    Set(Cell),
    /// The cell's new content is a copy from the given coordinate of the
    /// previously-rendered frame.
    Copy { row: i32, col: i32 },
}

/// The pending-frame grid, the palette, and selection overlay state.
#[derive(Debug)]
pub(crate) struct Display {
    layer: LayerId,
    char_width: i32,
    char_height: i32,
    width: i32,
    height: i32,
    operations: Vec<Operation>,
    /// Contents of the previously-rendered frame.
    current: Vec<Cell>,
    palette: Palette,
    default_cell: Cell,
    selection: Option<(i32, i32, i32, i32)>,
    selection_committed: bool,
    pending_resize: bool,
}

impl Display {
    pub(crate) fn new(
        layer: LayerId,
        char_width: i32,
        char_height: i32,
        palette: Palette,
        default_cell: Cell,
    ) -> Self {
        Self {
            layer,
            char_width,
            char_height,
            width: 0,
            height: 0,
            operations: Vec::new(),
            current: Vec::new(),
            palette,
            default_cell,
            selection: None,
            selection_committed: false,
            pending_resize: false,
        }
    }

    pub(crate) fn height(&self) -> i32 {
        self.height
    }

    pub(crate) fn char_width(&self) -> i32 {
        self.char_width
    }

    pub(crate) fn char_height(&self) -> i32 {
        self.char_height
    }

    pub(crate) fn set_char_size(&mut self, char_width: i32, char_height: i32) {
        self.char_width = char_width.max(1);
        self.char_height = char_height.max(1);
        self.pending_resize = true;
    }

    pub(crate) fn palette(&self) -> &Palette {
        &self.palette
    }

    pub(crate) fn palette_mut(&mut self) -> &mut Palette {
        &mut self.palette
    }

    pub(crate) fn set_default_cell(&mut self, cell: Cell) {
        self.default_cell = cell;
    }

    /// Resolve a palette index, honouring the default-color pseudo-indices.
    pub(crate) fn lookup_color(&self, index: i16) -> Option<Color> {
        self.palette.lookup(index)
    }

    /// Redefine a palette entry (xterm OSC 4). Takes effect for cells drawn
    /// afterwards.
    pub(crate) fn assign_color(&mut self, index: i32, color: Color) -> bool {
        self.palette.assign(index, color)
    }

    fn index(&self, row: i32, col: i32) -> usize {
        (row * self.width + col) as usize
    }

    /// Resize the grid, preserving overlapping content.
    pub(crate) fn resize(&mut self, width: i32, height: i32) {
        if width == self.width && height == self.height {
            return;
        }

        let mut operations = vec![Operation::Nop; (width * height) as usize];
        let mut current = vec![self.default_cell; (width * height) as usize];

        for row in 0..height.min(self.height) {
            for col in 0..width.min(self.width) {
                let old = self.index(row, col);
                let new = (row * width + col) as usize;
                operations[new] = self.operations[old];
                current[new] = self.current[old];
            }
        }

        self.width = width;
        self.height = height;
        self.operations = operations;
        self.current = current;
        self.pending_resize = true;
    }

    /// Write `cell` (and its continuation columns) across a column range.
    pub(crate) fn set_columns(&mut self, row: i32, start: i32, end: i32, cell: &Cell) {
        if row < 0 || row >= self.height || cell.width == 0 {
            return;
        }
        let start = start.clamp(0, self.width - 1);
        let end = end.clamp(0, self.width - 1);
        if start > end {
            return;
        }

        let continuation = Cell {
            value: crate::cell::CONTINUATION,
            attributes: cell.attributes,
            width: 0,
        };

        let mut remaining_continuation = 0u8;
        for col in start..=end {
            let index = self.index(row, col);
            if remaining_continuation > 0 {
                self.operations[index] = Operation::Set(continuation);
                remaining_continuation -= 1;
            } else {
                self.operations[index] = Operation::Set(*cell);
                remaining_continuation = cell.width - 1;
            }
        }
    }

    /// Move a column range by `offset`, carrying pending operations with
    /// it. Cells whose pending state was "unchanged" become copies of the
    /// previously-rendered source cell.
    pub(crate) fn copy_columns(&mut self, row: i32, start: i32, end: i32, offset: i32) {
        if row < 0 || row >= self.height {
            return;
        }

        let (start, end) = if offset >= 0 {
            let limit = self.width - offset - 1;
            if limit < 0 {
                return;
            }
            let start = start.clamp(0, limit);
            (start, end.clamp(start, limit))
        } else {
            let start = start.clamp(-offset, self.width - 1);
            (start, end.clamp(start, self.width - 1))
        };
        if start > end {
            return;
        }

        let snapshot: Vec<Operation> = (start..=end)
            .map(|col| self.operations[self.index(row, col)])
            .collect();

        for (i, source) in snapshot.iter().enumerate() {
            let src_col = start + i as i32;
            let dst = self.index(row, src_col + offset);
            self.operations[dst] = match source {
                Operation::Nop => Operation::Copy {
                    row,
                    col: src_col,
                },
                other => *other,
            };
        }
    }

    /// Move a row range by `offset`, carrying pending operations with it.
    pub(crate) fn copy_rows(&mut self, start: i32, end: i32, offset: i32) {
        let start = start.clamp(0, self.height - 1);
        let end = end.clamp(start, self.height - 1);

        let rows: Vec<i32> = if offset > 0 {
            (start..=end).rev().collect()
        } else {
            (start..=end).collect()
        };

        for row in rows {
            let dst_row = row + offset;
            if dst_row < 0 || dst_row >= self.height {
                continue;
            }

            let snapshot: Vec<Operation> = (0..self.width)
                .map(|col| self.operations[self.index(row, col)])
                .collect();

            for (col, source) in snapshot.iter().enumerate() {
                let dst = self.index(dst_row, col as i32);
                self.operations[dst] = match source {
                    Operation::Nop => Operation::Copy {
                        row,
                        col: col as i32,
                    },
                    other => *other,
                };
            }
        }
    }

    fn selection_contains(
        selection: Option<(i32, i32, i32, i32)>,
        row: i32,
        col: i32,
    ) -> bool {
        let Some((start_row, start_col, end_row, end_col)) = selection else {
            return false;
        };
        row >= start_row
            && row <= end_row
            && (col >= start_col || row != start_row)
            && (col <= end_col || row != end_row)
    }

    fn selected(&self, row: i32, col: i32) -> bool {
        Self::selection_contains(self.selection, row, col)
    }

    /// Replace the highlighted region. Coordinates are display rows; the
    /// range is normalized here. Cells entering or leaving the highlight
    /// are damaged so the next flush repaints them.
    pub(crate) fn select(
        &mut self,
        start_row: i32,
        start_col: i32,
        end_row: i32,
        end_col: i32,
    ) {
        let normalized = if (start_row, start_col) <= (end_row, end_col) {
            (start_row, start_col, end_row, end_col)
        } else {
            (end_row, end_col, start_row, start_col)
        };
        let old = self.selection;
        self.selection = Some(normalized);
        self.selection_committed = false;
        self.damage_selection_change(old, self.selection);
    }

    /// Finalize the current highlight; it persists visually until replaced
    /// or cleared.
    pub(crate) fn commit_select(&mut self) {
        self.selection_committed = true;
    }

    /// Remove any highlight.
    pub(crate) fn clear_select(&mut self) {
        let old = self.selection.take();
        self.selection_committed = false;
        self.damage_selection_change(old, None);
    }

    fn damage_selection_change(
        &mut self,
        old: Option<(i32, i32, i32, i32)>,
        new: Option<(i32, i32, i32, i32)>,
    ) {
        if old == new {
            return;
        }
        for row in 0..self.height {
            for col in 0..self.width {
                let was = Self::selection_contains(old, row, col);
                let is = Self::selection_contains(new, row, col);
                if was != is {
                    let index = self.index(row, col);
                    if self.operations[index] == Operation::Nop {
                        self.operations[index] = Operation::Set(self.current[index]);
                    }
                }
            }
        }
    }

    /// The full rendered style of a cell: resolved colors plus the
    /// attributes that alter rasterization. Cells coalesce into one run
    /// only when the whole style matches.
    fn render_style(&self, cell: &Cell, is_selected: bool) -> RenderedStyle {
        let (foreground, background) = self.render_colors(cell, is_selected);
        RenderedStyle {
            foreground,
            background,
            bold: cell.attributes.bold,
            underscore: cell.attributes.underscore,
        }
    }

    /// Compute the rendered foreground and background of a cell.
    ///
    /// Reverse video and the cursor swap colors and cancel each other out;
    /// bold maps dark palette colors to their intense counterparts;
    /// half-bright halves the foreground; selection applies the highlight
    /// rules (reversed for the cursor cell so an otherwise-invisible cursor
    /// does not suddenly grow a foreground).
    fn render_colors(&self, cell: &Cell, is_selected: bool) -> (Color, Color) {
        let attributes = &cell.attributes;
        let is_cursor = attributes.cursor;

        let (mut fg_source, bg_source) = if is_cursor != attributes.reverse {
            (attributes.background, attributes.foreground)
        } else {
            (attributes.foreground, attributes.background)
        };

        // Bold is represented with the corresponding intense color
        if attributes.bold
            && !attributes.half_bright
            && (FIRST_DARK..=LAST_DARK).contains(&fg_source.palette_index)
        {
            if let Some(intense) = self
                .palette
                .lookup(fg_source.palette_index + INTENSE_OFFSET)
            {
                fg_source = intense;
            }
        }

        let mut foreground = self.palette.resolve(fg_source);
        let mut background = self.palette.resolve(bg_source);

        if attributes.half_bright && !attributes.bold {
            foreground.red /= 2;
            foreground.green /= 2;
            foreground.blue /= 2;
        }

        if is_selected {
            if is_cursor {
                self.apply_highlight(&mut background, &mut foreground);
            } else {
                self.apply_highlight(&mut foreground, &mut background);
            }
        }

        (foreground, background)
    }

    /// Blend the palette highlight color into the given pair. The
    /// background is replaced outright only when that preserves roughly the
    /// original degree of contrast; otherwise the colors are inverted.
    fn apply_highlight(&self, foreground: &mut Color, background: &mut Color) {
        let mut highlight = self
            .palette
            .lookup(HIGHLIGHT_COLOR)
            .unwrap_or_else(|| Color::rgb(0x3E, 0x3E, 0x99));

        highlight.red = ((u16::from(highlight.red) + u16::from(background.red)) / 2) as u8;
        highlight.green = ((u16::from(highlight.green) + u16::from(background.green)) / 2) as u8;
        highlight.blue = ((u16::from(highlight.blue) + u16::from(background.blue)) / 2) as u8;

        let foreground_lum = foreground.luminance();
        let background_lum = background.luminance();
        let highlight_lum = highlight.luminance();

        if (foreground_lum - highlight_lum).abs() >= (background_lum - highlight_lum).abs() {
            *background = highlight;
        } else {
            std::mem::swap(foreground, background);
        }
    }

    /// Emit all pending operations as a bounded instruction batch, then
    /// mark every cell unchanged.
    pub(crate) fn flush(&mut self, sink: &mut dyn InstructionSink) -> io::Result<()> {
        if self.pending_resize {
            sink.send(Instruction::Size {
                layer: self.layer,
                width: self.width * self.char_width,
                height: self.height * self.char_height,
            })?;
            self.pending_resize = false;
        }

        self.flush_copies(sink)?;
        self.flush_sets(sink)?;

        for operation in &mut self.operations {
            *operation = Operation::Nop;
        }

        Ok(())
    }

    /// Coalesce adjacent copy operations sharing one source offset into
    /// maximal rectangles and emit them as copy-rect instructions.
    fn flush_copies(&mut self, sink: &mut dyn InstructionSink) -> io::Result<()> {
        for row in 0..self.height {
            for col in 0..self.width {
                let Operation::Copy {
                    row: src_row,
                    col: src_col,
                } = self.operations[self.index(row, col)]
                else {
                    continue;
                };

                let delta_row = src_row - row;
                let delta_col = src_col - col;

                let matches = |this: &Self, r: i32, c: i32| {
                    matches!(
                        this.operations[this.index(r, c)],
                        Operation::Copy { row: sr, col: sc }
                            if sr - r == delta_row && sc - c == delta_col
                    )
                };

                // Expand right, then down, keeping the rectangle solid
                let mut run_width = 1;
                while col + run_width < self.width && matches(self, row, col + run_width) {
                    run_width += 1;
                }

                let mut run_height = 1;
                'expand: while row + run_height < self.height {
                    for c in col..col + run_width {
                        if !matches(self, row + run_height, c) {
                            break 'expand;
                        }
                    }
                    run_height += 1;
                }

                sink.send(Instruction::Copy {
                    src: self.layer,
                    src_x: (col + delta_col) * self.char_width,
                    src_y: (row + delta_row) * self.char_height,
                    width: run_width * self.char_width,
                    height: run_height * self.char_height,
                    op: CompositeOp::Src,
                    dst: self.layer,
                    dst_x: col * self.char_width,
                    dst_y: row * self.char_height,
                })?;

                // Mirror the copy into the rendered-frame model, in the
                // same order the remote display will apply it
                let contents: Vec<Cell> = (0..run_height)
                    .flat_map(|r| {
                        (0..run_width).map(move |c| (row + r + delta_row, col + c + delta_col))
                    })
                    .map(|(r, c)| self.current[self.index(r, c)])
                    .collect();
                let mut contents = contents.into_iter();
                for r in 0..run_height {
                    for c in 0..run_width {
                        let index = self.index(row + r, col + c);
                        self.current[index] = contents.next().unwrap_or(self.default_cell);
                        self.operations[index] = Operation::Nop;
                    }
                }
            }
        }

        Ok(())
    }

    /// Coalesce adjacent set operations with identical rendered style into
    /// runs and emit each as one glyph-run or background-fill instruction.
    fn flush_sets(&mut self, sink: &mut dyn InstructionSink) -> io::Result<()> {
        for row in 0..self.height {
            let mut col = 0;
            while col < self.width {
                let index = self.index(row, col);
                let Operation::Set(cell) = self.operations[index] else {
                    col += 1;
                    continue;
                };

                // A continuation without a preceding owner in this run
                // (its owner lies left of the flushed region) renders as
                // background
                let cell = if cell.is_continuation() {
                    Cell::blank(cell.attributes)
                } else {
                    cell
                };

                let style = self.render_style(&cell, self.selected(row, col));
                let run_start = col;
                let mut text = String::new();
                let mut has_glyph = false;

                while col < self.width {
                    let index = self.index(row, col);
                    let Operation::Set(next) = self.operations[index] else {
                        break;
                    };
                    if next.is_continuation() {
                        // Covered by the preceding wide character
                        self.current[index] = next;
                        self.operations[index] = Operation::Nop;
                        col += 1;
                        continue;
                    }
                    let next_style = self.render_style(&next, self.selected(row, col));
                    if next_style != style {
                        break;
                    }

                    if next.has_glyph() {
                        has_glyph = true;
                        push_codepoint(next.value, &mut text);
                    } else {
                        text.push(' ');
                    }

                    self.current[index] = next;
                    self.operations[index] = Operation::Nop;
                    col += 1;
                }

                self.emit_run(sink, row, run_start, col - run_start, &style, text, has_glyph)?;
            }
        }

        Ok(())
    }

    /// Emit one coalesced run as either a glyph-run instruction or a
    /// background fill.
    fn emit_run(
        &self,
        sink: &mut dyn InstructionSink,
        row: i32,
        start: i32,
        columns: i32,
        style: &RenderedStyle,
        text: String,
        has_glyph: bool,
    ) -> io::Result<()> {
        if has_glyph {
            sink.send(Instruction::Glyphs {
                layer: self.layer,
                x: start * self.char_width,
                y: row * self.char_height,
                columns,
                text,
                foreground: style.foreground.to_wire(),
                background: style.background.to_wire(),
                bold: style.bold,
                underscore: style.underscore,
            })
        } else {
            sink.send(Instruction::Rect {
                layer: self.layer,
                x: start * self.char_width,
                y: row * self.char_height,
                width: columns * self.char_width,
                height: self.char_height,
            })?;
            sink.send(Instruction::Cfill {
                op: CompositeOp::Src,
                layer: self.layer,
                color: style.background.to_wire(),
                alpha: 0xFF,
            })
        }
    }

    /// Emit a full repaint of the rendered frame into the given sink,
    /// synchronizing a newly-joined viewer.
    pub(crate) fn sync_full(&self, sink: &mut dyn InstructionSink) -> io::Result<()> {
        sink.send(Instruction::Size {
            layer: self.layer,
            width: self.width * self.char_width,
            height: self.height * self.char_height,
        })?;

        for row in 0..self.height {
            let mut col = 0;
            while col < self.width {
                let cell = self.current[self.index(row, col)];
                let cell = if cell.is_continuation() {
                    Cell::blank(cell.attributes)
                } else {
                    cell
                };
                let style = self.render_style(&cell, self.selected(row, col));
                let run_start = col;
                let mut text = String::new();
                let mut has_glyph = false;

                while col < self.width {
                    let next = self.current[self.index(row, col)];
                    if next.is_continuation() {
                        col += 1;
                        continue;
                    }
                    let next_style = self.render_style(&next, self.selected(row, col));
                    if next_style != style {
                        break;
                    }
                    if next.has_glyph() {
                        has_glyph = true;
                        push_codepoint(next.value, &mut text);
                    } else {
                        text.push(' ');
                    }
                    col += 1;
                }

                self.emit_run(sink, row, run_start, col - run_start, &style, text, has_glyph)?;
            }
        }

        Ok(())
    }
}

/// The resolved appearance of a cell, used as the coalescing key for runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RenderedStyle {
    foreground: Color,
    background: Color,
    bold: bool,
    underscore: bool,
}
