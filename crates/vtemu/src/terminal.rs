//! The terminal core: shared state, locking, the render thread, and the
//! operations that keep the buffer and display in lockstep.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};
use vtwire::{CompositeOp, Instruction, InstructionSink, LayerId, StreamId};

use crate::buffer::{Buffer, MAX_COLUMNS, MAX_ROWS};
use crate::cell::{Attributes, Cell, codepoint_width};
use crate::clipboard::Clipboard;
use crate::color::Palette;
use crate::cursor::{CursorSprite, SharedCursor};
use crate::display::Display;
use crate::input::MouseButtons;
use crate::parser::{Charset, Parser};
use crate::pty::{PtyReader, PtyWriter, pty_pipe};
use crate::scheme::parse_color_scheme;
use crate::scrollbar::{SCROLLBAR_WIDTH, Scrollbar};
use crate::selection::SelectionState;
use crate::streams::{ArgvReceiver, Credentials, InputStreamState};
use crate::typescript::Typescript;

/// The minimum duration of one frame, in milliseconds. Output arriving
/// faster than this is coalesced into a single flush.
pub(crate) const FRAME_DURATION: Duration = Duration::from_millis(40);

/// How long the render thread continues waiting for further output within
/// a frame once output has paused.
pub(crate) const FRAME_TIMEOUT: Duration = Duration::from_millis(10);

/// The maximum number of custom tab stops.
const MAX_TABS: usize = 16;

/// Pipe-stream output buffers this many bytes between blobs.
const PIPE_BUFFER_SIZE: usize = 4096;

/// Layer assignments. The terminal grid, scrollbar and cursor sprite each
/// render into a fixed layer of the remote compositor.
const TERMINAL_LAYER: LayerId = LayerId(1);
const SCROLLBAR_CONTAINER_LAYER: LayerId = LayerId(2);
const SCROLLBAR_HANDLE_LAYER: LayerId = LayerId(3);
const CURSOR_LAYER: LayerId = LayerId(4);

/// A font selection plus the derived character cell metrics.
///
/// Rasterization happens on the far side of the instruction sink; the
/// emulator only needs the advance and line height of the monospace cell.
#[derive(Debug, Clone)]
pub struct Font {
    pub name: String,
    pub size: i32,
    pub dpi: i32,
    pub char_width: i32,
    pub char_height: i32,
}

impl Font {
    /// Select a font by name and point size, deriving cell metrics the way
    /// a monospace raster would (line height of one em, advance of half).
    #[must_use]
    pub fn new(name: &str, size: i32, dpi: i32) -> Self {
        let char_height = (size * dpi / 72).max(2);
        let char_width = (char_height / 2).max(1);
        Self {
            name: name.to_owned(),
            size,
            dpi,
            char_width,
            char_height,
        }
    }

    /// Select a font with explicit cell metrics supplied by the embedder's
    /// rasterizer.
    #[must_use]
    pub fn with_metrics(name: &str, size: i32, dpi: i32, char_width: i32, char_height: i32) -> Self {
        Self {
            name: name.to_owned(),
            size,
            dpi,
            char_width: char_width.max(1),
            char_height: char_height.max(1),
        }
    }
}

impl Default for Font {
    fn default() -> Self {
        Self::new("monospace", 12, 96)
    }
}

/// Options accepted at terminal creation.
#[derive(Debug, Clone)]
pub struct TerminalOptions {
    pub font: Font,
    /// Overall display width in pixels, including the scrollbar.
    pub width: i32,
    /// Overall display height in pixels.
    pub height: i32,
    /// Maximum rows retained, counting the visible display.
    pub max_scrollback: usize,
    pub color_scheme: String,
    pub disable_copy: bool,
    pub disable_paste: bool,
    /// Spawn the internal render thread. Embedders driving
    /// [`Terminal::flush_frame`] themselves (and tests) disable this.
    pub render_thread: bool,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        let font = Font::default();
        Self {
            width: 80 * font.char_width + SCROLLBAR_WIDTH,
            height: 24 * font.char_height,
            font,
            max_scrollback: 1000,
            color_scheme: String::new(),
            disable_copy: false,
            disable_paste: false,
            render_thread: true,
        }
    }
}

/// Pipe-stream redirection state: while open, terminal output bytes are
/// sent as blobs on a named stream instead of being interpreted.
#[derive(Debug)]
pub(crate) struct PipeStream {
    pub(crate) stream: StreamId,
    buffer: Vec<u8>,
}

/// Everything guarded by the terminal lock.
pub(crate) struct TermState {
    pub(crate) sink: Box<dyn InstructionSink>,
    pub(crate) pty: PtyWriter,

    pub(crate) parser: Parser,
    pub(crate) char_mapping: [Option<Charset>; 2],
    pub(crate) active_char_set: usize,

    pub(crate) file_download_handler: Option<Box<dyn FnMut(&str) + Send>>,
    pub(crate) upload_path_handler: Option<Box<dyn FnMut(&str) + Send>>,

    normal: Buffer,
    alternate: Buffer,
    pub(crate) using_alternate: bool,

    pub(crate) display: Display,
    pub(crate) scrollbar: Scrollbar,
    pub(crate) cursor_state: SharedCursor,
    pub(crate) clipboard: Arc<Mutex<Clipboard>>,
    pub(crate) typescript: Option<Typescript>,
    pub(crate) pipe: Option<PipeStream>,
    pub(crate) input_stream: InputStreamState,
    pub(crate) argv_streams: HashMap<i32, ArgvReceiver>,
    next_stream_id: i32,

    /// Overall pixel dimensions, including the scrollbar.
    pub(crate) width: i32,
    pub(crate) height: i32,

    /// Character dimensions of the display.
    pub(crate) term_width: i32,
    pub(crate) term_height: i32,

    pub(crate) cursor_row: i32,
    pub(crate) cursor_col: i32,
    pub(crate) visible_cursor_row: i32,
    pub(crate) visible_cursor_col: i32,
    pub(crate) saved_cursor_row: i32,
    pub(crate) saved_cursor_col: i32,

    pub(crate) scroll_start: i32,
    pub(crate) scroll_end: i32,
    pub(crate) scroll_offset: i32,
    pub(crate) max_scrollback: usize,

    pub(crate) current_attributes: Attributes,
    pub(crate) default_cell: Cell,

    pub(crate) tab_interval: i32,
    custom_tabs: [i32; MAX_TABS],

    pub(crate) application_cursor_keys: bool,
    pub(crate) automatic_carriage_return: bool,
    pub(crate) insert_mode: bool,
    pub(crate) cursor_visible: bool,

    pub(crate) selection: SelectionState,

    pub(crate) mod_alt: bool,
    pub(crate) mod_ctrl: bool,
    pub(crate) mod_shift: bool,
    pub(crate) mouse_mask: MouseButtons,
    pub(crate) last_click: Option<(Instant, i32, i32)>,
    pub(crate) click_count: u32,

    pub(crate) disable_copy: bool,
    pub(crate) disable_paste: bool,
}

/// State shared between the public handle, the render thread, and
/// credential waiters.
pub(crate) struct Shared {
    pub(crate) state: Mutex<TermState>,
    modified: Mutex<bool>,
    modified_cond: Condvar,
    pub(crate) credentials: Mutex<Credentials>,
    pub(crate) credentials_cond: Condvar,
    running: AtomicBool,
}

impl Shared {
    /// Mark the terminal modified, waking the render thread.
    pub(crate) fn notify(&self) {
        let mut modified = self.modified.lock();
        *modified = true;
        self.modified_cond.notify_all();
    }

    /// Wait until the terminal is modified or the timeout elapses,
    /// clearing the flag. Spurious wakeups re-check the flag.
    fn wait_modified(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut modified = self.modified.lock();
        while !*modified {
            if self
                .modified_cond
                .wait_until(&mut modified, deadline)
                .timed_out()
            {
                break;
            }
        }
        let result = *modified;
        *modified = false;
        result
    }
}

/// A terminal emulator session.
///
/// All public entry points acquire the terminal lock internally; the
/// handle is freely shareable across the PTY reader and user event
/// threads. Dropping the handle stops the render thread, closes the PTY
/// input pipe, and flushes any active typescript.
pub struct Terminal {
    shared: Arc<Shared>,
    stdin_reader: PtyReader,
    render_thread: Option<JoinHandle<()>>,
}

impl Terminal {
    /// Create a terminal with the given options, writing drawing
    /// instructions to `sink` and sharing `clipboard` with the rest of the
    /// session.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial repaint cannot be written to the
    /// sink, or if the render thread cannot be spawned.
    pub fn create(
        options: TerminalOptions,
        sink: Box<dyn InstructionSink>,
        clipboard: Arc<Mutex<Clipboard>>,
    ) -> io::Result<Terminal> {
        let scheme = parse_color_scheme(&options.color_scheme);
        let palette = Palette::new(scheme.palette, scheme.foreground, scheme.background);

        let default_cell = Cell::blank(Attributes::new(scheme.foreground, scheme.background));

        let available_width = (options.width - SCROLLBAR_WIDTH).max(0);
        let term_width =
            (available_width / options.font.char_width).clamp(1, MAX_COLUMNS as i32);
        let term_height =
            (options.height / options.font.char_height).clamp(1, MAX_ROWS as i32);

        let capacity = options.max_scrollback.max(MAX_ROWS);
        let (pty_writer, pty_reader) = pty_pipe();

        let mut state = TermState {
            sink,
            pty: pty_writer,
            parser: Parser::new(),
            char_mapping: [None, None],
            active_char_set: 0,
            file_download_handler: None,
            upload_path_handler: None,
            normal: Buffer::new(capacity, default_cell),
            alternate: Buffer::new(MAX_ROWS, default_cell),
            using_alternate: false,
            display: Display::new(
                TERMINAL_LAYER,
                options.font.char_width,
                options.font.char_height,
                palette,
                default_cell,
            ),
            scrollbar: Scrollbar::new(
                SCROLLBAR_CONTAINER_LAYER,
                SCROLLBAR_HANDLE_LAYER,
                LayerId::DEFAULT,
                options.width,
                options.height,
                term_height,
            ),
            cursor_state: SharedCursor::new(CURSOR_LAYER),
            clipboard,
            typescript: None,
            pipe: None,
            input_stream: InputStreamState::default(),
            argv_streams: HashMap::new(),
            next_stream_id: 1,
            width: options.width,
            height: options.height,
            term_width,
            term_height,
            cursor_row: 0,
            cursor_col: 0,
            visible_cursor_row: 0,
            visible_cursor_col: 0,
            saved_cursor_row: 0,
            saved_cursor_col: 0,
            scroll_start: 0,
            scroll_end: term_height - 1,
            scroll_offset: 0,
            max_scrollback: options.max_scrollback,
            current_attributes: default_cell.attributes,
            default_cell,
            tab_interval: 8,
            custom_tabs: [0; MAX_TABS],
            application_cursor_keys: false,
            automatic_carriage_return: false,
            insert_mode: false,
            cursor_visible: true,
            selection: SelectionState::default(),
            mod_alt: false,
            mod_ctrl: false,
            mod_shift: false,
            mouse_mask: MouseButtons::empty(),
            last_click: None,
            click_count: 0,
            disable_copy: options.disable_copy,
            disable_paste: options.disable_paste,
        };

        state.repaint_default_layer()?;
        state.display.resize(term_width, term_height);
        state.reset();
        {
            let TermState {
                cursor_state, sink, ..
            } = &mut state;
            cursor_state.set_sprite(CursorSprite::Blank, sink.as_mut())?;
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            modified: Mutex::new(false),
            modified_cond: Condvar::new(),
            credentials: Mutex::new(Credentials::default()),
            credentials_cond: Condvar::new(),
            running: AtomicBool::new(true),
        });

        let render_thread = if options.render_thread {
            let render_shared = shared.clone();
            Some(
                std::thread::Builder::new()
                    .name("terminal-render".into())
                    .spawn(move || render_loop(&render_shared))?,
            )
        } else {
            None
        };

        Ok(Terminal {
            shared,
            stdin_reader: pty_reader,
            render_thread,
        })
    }

    /// Feed raw PTY output into the emulator. Called by the PTY reader
    /// thread; bytes take effect in the exact order received.
    pub fn feed_output(&self, data: &[u8]) {
        {
            let mut state = self.shared.state.lock();
            for &byte in data {
                if let Some(typescript) = &mut state.typescript {
                    typescript.write(byte);
                }
                state.process_byte(byte);
            }
        }
        self.shared.notify();
    }

    /// Convenience for writing emulator-generated text (prompts, status
    /// messages) to the display.
    pub fn print(&self, text: &str) {
        self.feed_output(text.as_bytes());
    }

    /// Handle a key event.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting bytes cannot be written to the
    /// PTY pipe.
    pub fn send_key(&self, keysym: u32, pressed: bool) -> io::Result<()> {
        let result = {
            let mut state = self.shared.state.lock();
            if state.input_stream.is_active() {
                // An inbound stream owns the terminal input
                return Ok(());
            }
            state.handle_key(keysym, pressed)
        };
        self.shared.notify();
        result
    }

    /// Handle a mouse event from the given user.
    ///
    /// # Errors
    ///
    /// Returns an error if a resulting paste cannot be written to the PTY
    /// pipe.
    pub fn send_mouse(&self, user_id: u64, x: i32, y: i32, mask: MouseButtons) -> io::Result<()> {
        let result = {
            let mut state = self.shared.state.lock();
            if state.input_stream.is_active() {
                return Ok(());
            }
            state.handle_mouse(user_id, x, y, mask)
        };
        self.shared.notify();
        result
    }

    /// Write raw bytes to the PTY as if typed.
    ///
    /// # Errors
    ///
    /// Returns an error if the PTY pipe has been closed.
    pub fn send_data(&self, data: &[u8]) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        if state.input_stream.is_active() {
            return Ok(());
        }
        state.pty.write_all(data)
    }

    /// Resize to new overall pixel dimensions, reflowing the character
    /// grid.
    pub fn resize(&self, width: i32, height: i32) {
        {
            let mut state = self.shared.state.lock();
            state.resize_pixels(width, height);
        }
        self.shared.notify();
    }

    /// Flush one frame now. Embedders that disabled the render thread call
    /// this on their own cadence.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails; such an error is session-fatal.
    pub fn flush_frame(&self) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        state.flush_frame()
    }

    /// Change the number of scrollback rows retained.
    pub fn set_scrollback_size(&self, rows: usize) {
        {
            let mut state = self.shared.state.lock();
            state.max_scrollback = rows.min(state.normal.capacity());
            state.update_scrollbar_bounds();
        }
        self.shared.notify();
    }

    /// Apply a new color scheme, repainting the terminal.
    pub fn apply_color_scheme(&self, scheme: &str) {
        {
            let mut state = self.shared.state.lock();
            state.apply_color_scheme(scheme);
        }
        self.shared.notify();
    }

    /// Apply a new font. `None` fields keep the current name or size.
    pub fn apply_font(&self, name: Option<&str>, size: Option<i32>, dpi: i32) {
        {
            let mut state = self.shared.state.lock();
            state.apply_font(name, size, dpi);
        }
        self.shared.notify();
    }

    /// Show or hide the text cursor.
    pub fn set_cursor_visible(&self, visible: bool) {
        {
            let mut state = self.shared.state.lock();
            state.set_cursor_visible(visible);
        }
        self.shared.notify();
    }

    /// Begin recording this session as a typescript.
    ///
    /// # Errors
    ///
    /// Returns an error if the recording files cannot be created.
    pub fn start_typescript(
        &self,
        path: &Path,
        name: &str,
        create_path: bool,
        allow_existing: bool,
    ) -> io::Result<()> {
        let typescript = Typescript::create(path, name, create_path, allow_existing)?;
        info!(
            data = %typescript.data_path().display(),
            timing = %typescript.timing_path().display(),
            "session typescript started"
        );
        self.shared.state.lock().typescript = Some(typescript);
        Ok(())
    }

    /// Register the hook invoked when the session requests a file
    /// download (OSC 482200).
    pub fn set_file_download_handler(&self, handler: Box<dyn FnMut(&str) + Send>) {
        self.shared.state.lock().file_download_handler = Some(handler);
    }

    /// Register the hook invoked when the session sets the upload
    /// directory (OSC 482201).
    pub fn set_upload_path_handler(&self, handler: Box<dyn FnMut(&str) + Send>) {
        self.shared.state.lock().upload_path_handler = Some(handler);
    }

    /// Forget a departed user's pointer state.
    pub fn remove_user(&self, user_id: u64) {
        let mut state = self.shared.state.lock();
        state.cursor_state.remove_user(user_id);
    }

    /// Replay the full current display into the given sink, synchronizing
    /// a newly-joined viewer.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails.
    pub fn sync_user(&self, sink: &mut dyn InstructionSink) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        state.sync_user(sink)
    }

    /// The read end of the PTY input pipe; the embedder drains this into
    /// the child process stdin.
    #[must_use]
    pub fn stdin_reader(&self) -> PtyReader {
        self.stdin_reader.clone()
    }

    /// Print `title` and read one line of input from the PTY input pipe,
    /// echoing typed characters (or `*` when `echo` is false). Intended
    /// for interactive credential prompts before the child session starts.
    pub fn prompt(&self, title: &str, echo: bool) -> String {
        self.print(title);

        let mut reader = self.stdin_reader.clone();
        let mut line = String::new();
        let mut byte = [0u8; 1];

        while let Ok(1) = reader.read(&mut byte) {
            match byte[0] {
                // Backspace
                0x7F => {
                    if !line.is_empty() {
                        self.print("\x08 \x08");
                        line.pop();
                    }
                }
                // CR ends the prompt
                0x0D => {
                    self.print("\r\n");
                    break;
                }
                b if b >= 0x20 => {
                    line.push(char::from(b));
                    if echo {
                        let mut buffer = [0u8; 4];
                        self.print(char::from(b).encode_utf8(&mut buffer));
                    } else {
                        self.print("*");
                    }
                }
                _ => {}
            }
        }

        line
    }

    // State inspection, for embedder diagnostics and tests.

    /// Character dimensions of the display as (columns, rows).
    #[must_use]
    pub fn dimensions(&self) -> (i32, i32) {
        let state = self.shared.state.lock();
        (state.term_width, state.term_height)
    }

    /// The logical cursor position as (row, column).
    #[must_use]
    pub fn cursor_position(&self) -> (i32, i32) {
        let state = self.shared.state.lock();
        (state.cursor_row, state.cursor_col)
    }

    /// A copy of the cell at the given buffer coordinates (negative rows
    /// address the scrollback). Unwritten cells within the display read as
    /// the default blank cell.
    #[must_use]
    pub fn cell_at(&self, row: i32, col: i32) -> Option<Cell> {
        let state = self.shared.state.lock();
        if col < 0 || col >= state.term_width.max(1) {
            return None;
        }
        let default = state.buffer().default_cell();
        state
            .buffer()
            .get_columns(row)
            .map(|(cells, _)| cells.get(col as usize).copied().unwrap_or(default))
    }

    /// The text of one buffer row, with blanks rendered as spaces and
    /// trailing whitespace trimmed.
    #[must_use]
    pub fn row_text(&self, row: i32) -> String {
        let state = self.shared.state.lock();
        let Some((cells, _)) = state.buffer().get_columns(row) else {
            return String::new();
        };

        let mut text = String::new();
        for cell in cells {
            if cell.is_continuation() {
                continue;
            }
            if cell.value == 0 {
                text.push(' ');
            } else {
                crate::cell::push_codepoint(cell.value, &mut text);
            }
        }
        text.truncate(text.trim_end().len());
        text
    }

    /// Whether the given row soft-wraps into the following row.
    #[must_use]
    pub fn row_wrapped(&self, row: i32) -> bool {
        let state = self.shared.state.lock();
        state
            .buffer()
            .get_columns(row)
            .is_some_and(|(_, wrapped)| wrapped)
    }

    /// The number of scrollback rows currently pulled into view (0 means
    /// the live display).
    #[must_use]
    pub fn view_offset(&self) -> i32 {
        self.shared.state.lock().scroll_offset
    }

    /// Populated buffer rows, including both the visible display and the
    /// scrollback.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.shared.state.lock().buffer().len()
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.notify();

        {
            let mut state = self.shared.state.lock();
            state.pty.close();
            state.pipe_stream_close();
            // Flushing the typescript happens in its Drop
            state.typescript = None;
        }

        if let Some(thread) = self.render_thread.take() {
            let _ = thread.join();
        }
    }
}

/// The render thread: waits for modification, paces frames, and flushes.
fn render_loop(shared: &Shared) {
    while shared.running.load(Ordering::Acquire) {
        if !shared.wait_modified(Duration::from_millis(1000)) {
            continue;
        }

        // Accumulate further output until the frame window closes or
        // output goes quiet
        let frame_start = Instant::now();
        loop {
            if frame_start.elapsed() >= FRAME_DURATION {
                break;
            }
            if !shared.wait_modified(FRAME_TIMEOUT) {
                break;
            }
        }

        let mut state = shared.state.lock();
        if let Err(e) = state.flush_frame() {
            error!(error = %e, "frame flush failed; stopping renderer");
            shared.running.store(false, Ordering::Release);
            break;
        }
    }
}

impl TermState {
    pub(crate) fn buffer(&self) -> &Buffer {
        if self.using_alternate {
            &self.alternate
        } else {
            &self.normal
        }
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut Buffer {
        if self.using_alternate {
            &mut self.alternate
        } else {
            &mut self.normal
        }
    }

    pub(crate) fn alloc_stream(&mut self) -> StreamId {
        let id = StreamId(self.next_stream_id);
        self.next_stream_id += 1;
        id
    }

    /// Repaint the area beneath the terminal and scrollbar layers with the
    /// default background color.
    pub(crate) fn repaint_default_layer(&mut self) -> io::Result<()> {
        let background = self
            .display
            .palette()
            .default_background();
        self.sink.send(Instruction::Size {
            layer: LayerId::DEFAULT,
            width: self.width,
            height: self.height,
        })?;
        self.sink.send(Instruction::Rect {
            layer: LayerId::DEFAULT,
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        })?;
        self.sink.send(Instruction::Cfill {
            op: CompositeOp::Over,
            layer: LayerId::DEFAULT,
            color: background.to_wire(),
            alpha: 0xFF,
        })
    }

    pub(crate) fn update_scrollbar_bounds(&mut self) {
        if self.using_alternate {
            self.scrollbar.set_bounds(0, 0);
            return;
        }
        let effective = self.normal.effective_length(self.max_scrollback) as i32;
        self.scrollbar.set_bounds(self.term_height - effective, 0);
    }

    /// Write to both the display (at the scroll-adjusted row) and the
    /// buffer, without cursor preservation or edge breaking.
    fn mirror_set_columns(&mut self, row: i32, start: i32, end: i32, cell: &Cell) {
        self.display
            .set_columns(row + self.scroll_offset, start, end, cell);
        self.buffer_mut().write_columns(row, start, end, cell);
    }

    /// Enforce a character break at the given edge of the given row,
    /// mirroring any cleared cells to the display.
    fn force_break(&mut self, row: i32, edge: i32) {
        let ranges = self.buffer().broken_ranges(row, edge);
        for (start, end, attributes) in ranges {
            let cleared = Cell {
                value: ' ' as i32,
                attributes,
                width: 1,
            };
            self.mirror_set_columns(row, start, end, &cleared);
        }
    }

    /// Set a range of columns to the given character, preserving any
    /// visible cursor within the range and enforcing edge breaks.
    pub(crate) fn set_columns(&mut self, row: i32, start: i32, end: i32, cell: &Cell) {
        self.mirror_set_columns(row, start, end, cell);

        if row == self.visible_cursor_row
            && self.visible_cursor_col >= start
            && self.visible_cursor_col <= end
            && self.cursor_visible
        {
            let mut cursor_cell = *cell;
            cursor_cell.attributes.cursor = true;
            let col = self.visible_cursor_col;
            self.mirror_set_columns(row, col, col, &cursor_cell);
        }

        self.force_break(row, start);
        self.force_break(row, end + 1);
    }

    /// Clear a range of columns to blanks carrying the current attributes.
    pub(crate) fn clear_columns(&mut self, row: i32, start: i32, end: i32) {
        let blank = Cell {
            value: 0,
            attributes: self.current_attributes,
            width: 1,
        };
        self.set_columns(row, start, end, &blank);
    }

    /// Clear an inclusive rectangular-reading range spanning rows.
    pub(crate) fn clear_range(
        &mut self,
        start_row: i32,
        start_col: i32,
        end_row: i32,
        end_col: i32,
    ) {
        let mut start_row = start_row;
        let mut end_row = end_row;

        // If not at the far left, clear the partial first row
        if start_col > 0 {
            self.clear_columns(start_row, start_col, self.term_width - 1);
            start_row += 1;
        }

        // If not at the far right, clear the partial last row
        if end_col < self.term_width - 1 {
            self.clear_columns(end_row, 0, end_col);
            end_row -= 1;
        }

        // The remaining region is full rows
        for row in start_row..=end_row {
            self.clear_columns(row, 0, self.term_width - 1);
        }
    }

    /// Move a range of columns by `offset`, adjusting the visible cursor
    /// and enforcing breaks at the destination edges.
    pub(crate) fn copy_columns(&mut self, row: i32, start: i32, end: i32, offset: i32) {
        self.display
            .copy_columns(row + self.scroll_offset, start, end, offset);
        self.buffer_mut().shift_columns(row, start, end, offset);

        if row == self.visible_cursor_row
            && self.visible_cursor_col >= start
            && self.visible_cursor_col <= end
        {
            self.visible_cursor_col += offset;
        }

        self.force_break(row, start + offset);
        self.force_break(row, end + offset + 1);
    }

    /// Move a range of rows by `offset`, adjusting the visible cursor.
    pub(crate) fn copy_rows(&mut self, start: i32, end: i32, offset: i32) {
        self.display.copy_rows(
            start + self.scroll_offset,
            end + self.scroll_offset,
            offset,
        );
        self.buffer_mut().copy_rows(start, end, offset);

        if self.visible_cursor_row >= start && self.visible_cursor_row <= end {
            self.visible_cursor_row += offset;
        }
    }

    /// Write one code point at the given position with current attributes.
    pub(crate) fn set(&mut self, row: i32, col: i32, codepoint: i32) {
        let width = codepoint_width(codepoint);
        // Zero-width glyphs occupy no cell
        if width == 0 {
            return;
        }

        let cell = Cell {
            value: codepoint,
            attributes: self.current_attributes,
            width,
        };
        self.set_columns(row, col, col + i32::from(width) - 1, &cell);
    }

    /// Scroll the given row region up, feeding the scrollback when the
    /// region is the whole display.
    pub(crate) fn scroll_up(&mut self, start_row: i32, end_row: i32, amount: i32) {
        if start_row == 0 && end_row == self.term_height - 1 && !self.using_alternate {
            // Whole-display scroll: rotate the ring so the top row joins
            // the scrollback
            self.display
                .copy_rows(start_row + amount, end_row, -amount);
            self.normal.scroll_up(amount as usize);
            self.update_scrollbar_bounds();

            if self.visible_cursor_row >= start_row && self.visible_cursor_row <= end_row {
                self.visible_cursor_row -= amount;
            }
        } else {
            self.copy_rows(start_row + amount, end_row, -amount);
        }

        self.clear_range(end_row - amount + 1, 0, end_row, self.term_width - 1);
    }

    /// Scroll the given row region down.
    pub(crate) fn scroll_down(&mut self, start_row: i32, end_row: i32, amount: i32) {
        self.copy_rows(start_row, end_row - amount, amount);
        self.clear_range(start_row, 0, start_row + amount - 1, self.term_width - 1);
    }

    /// Move the rendered cursor to the logical cursor position.
    pub(crate) fn commit_cursor(&mut self) {
        if self.visible_cursor_row == self.cursor_row
            && self.visible_cursor_col == self.cursor_col
        {
            return;
        }

        // Clear the old cursor cell
        let (old_row, old_col) = (self.visible_cursor_row, self.visible_cursor_col);
        self.buffer_mut().set_cursor(old_row, old_col, false);
        self.refresh_display_cell(old_row, old_col);

        if self.cursor_visible {
            let (new_row, new_col) = (self.cursor_row, self.cursor_col);
            self.buffer_mut().set_cursor(new_row, new_col, true);
            self.refresh_display_cell(new_row, new_col);
        }

        self.visible_cursor_row = self.cursor_row;
        self.visible_cursor_col = self.cursor_col;
    }

    /// Push one buffer cell back through the display.
    fn refresh_display_cell(&mut self, row: i32, col: i32) {
        // The cursor may logically rest one past the final column
        if col >= self.term_width {
            return;
        }
        let Some((cells, _)) = self.buffer().get_columns(row) else {
            return;
        };
        let Some(cell) = cells.get(col as usize).copied() else {
            return;
        };
        self.display
            .set_columns(row + self.scroll_offset, col, col, &cell);
    }

    /// Show or hide the text cursor.
    pub(crate) fn set_cursor_visible(&mut self, visible: bool) {
        if self.cursor_visible == visible {
            return;
        }
        self.cursor_visible = visible;

        let (row, col) = (self.visible_cursor_row, self.visible_cursor_col);
        self.buffer_mut().set_cursor(row, col, visible);
        self.refresh_display_cell(row, col);
    }

    /// Whether a cell is visible against the terminal background.
    pub(crate) fn is_visible(&self, cell: &Cell) -> bool {
        // Continuation cells are never visible themselves
        if cell.is_continuation() {
            return false;
        }
        if cell.has_glyph() {
            return true;
        }

        let background = if cell.attributes.reverse != cell.attributes.cursor {
            &cell.attributes.foreground
        } else {
            &cell.attributes.background
        };
        !background.same_rgb(&self.default_cell.attributes.background)
    }

    /// Redraw a rectangle of display rows from the buffer.
    pub(crate) fn redraw_rect(
        &mut self,
        start_row: i32,
        start_col: i32,
        end_row: i32,
        end_col: i32,
    ) {
        for row in start_row..=end_row {
            let default = self.default_cell;
            self.display.set_columns(row, start_col, end_col, &default);

            let buffer_row = row - self.scroll_offset;
            let Some((cells, _)) = self.buffer().get_columns(buffer_row) else {
                continue;
            };
            let cells: Vec<Cell> = cells.to_vec();

            for col in start_col..=end_col.min(cells.len() as i32 - 1) {
                let cell = cells[col as usize];
                if self.is_visible(&cell) {
                    self.display.set_columns(row, col, col, &cell);
                }
            }
        }
    }

    /// Redraw one display row from the given buffer row.
    fn redraw_row_from(&mut self, dest_row: i32, buffer_row: i32) {
        let default = self.default_cell;
        self.display
            .set_columns(dest_row, 0, self.term_width - 1, &default);

        let Some((cells, _)) = self.buffer().get_columns(buffer_row) else {
            return;
        };
        let cells: Vec<Cell> = cells.to_vec();
        for (col, cell) in cells.iter().enumerate().take(self.term_width as usize) {
            if self.is_visible(cell) {
                self.display.set_columns(dest_row, col as i32, col as i32, cell);
            }
        }
    }

    /// Scroll the viewport toward the live display.
    pub(crate) fn scroll_display_down(&mut self, amount: i32) {
        let amount = amount.min(self.scroll_offset);
        if amount <= 0 {
            return;
        }

        if self.term_height > amount {
            self.display
                .copy_rows(amount, self.term_height - 1, -amount);
        }

        self.scroll_offset -= amount;
        let value = -self.scroll_offset;
        self.scrollbar.set_value(value);

        // Newly-revealed rows at the bottom
        let end_row = self.term_height - self.scroll_offset - 1;
        let start_row = end_row - amount + 1;
        let mut dest_row = self.term_height - amount;

        for row in start_row..=end_row {
            self.redraw_row_from(dest_row, row);
            dest_row += 1;
        }
    }

    /// Scroll the viewport into the scrollback.
    pub(crate) fn scroll_display_up(&mut self, amount: i32) {
        if self.using_alternate {
            return;
        }

        let available =
            (self.normal.effective_length(self.max_scrollback) as i32 - self.term_height).max(0);
        let amount = amount.min(available - self.scroll_offset);
        if amount <= 0 {
            return;
        }

        if self.term_height > amount {
            self.display
                .copy_rows(0, self.term_height - amount - 1, amount);
        }

        self.scroll_offset += amount;
        let value = -self.scroll_offset;
        self.scrollbar.set_value(value);

        // Newly-revealed rows at the top
        let start_row = -self.scroll_offset;
        let end_row = start_row + amount - 1;
        let mut dest_row = 0;

        for row in start_row..=end_row {
            self.redraw_row_from(dest_row, row);
            dest_row += 1;
        }
    }

    /// Reset the terminal to its power-on state.
    pub(crate) fn reset(&mut self) {
        self.parser = Parser::new();
        self.char_mapping = [None, None];
        self.active_char_set = 0;

        self.cursor_row = 0;
        self.cursor_col = 0;
        self.visible_cursor_row = 0;
        self.visible_cursor_col = 0;
        self.saved_cursor_row = 0;
        self.saved_cursor_col = 0;

        self.using_alternate = false;
        self.normal.reset();
        self.alternate.reset();
        self.scroll_start = 0;
        self.scroll_end = self.term_height - 1;
        self.scroll_offset = 0;

        self.update_scrollbar_bounds();
        self.scrollbar.set_value(0);

        self.selection = SelectionState::default();
        self.display.clear_select();
        self.application_cursor_keys = false;
        self.automatic_carriage_return = false;
        self.insert_mode = false;
        self.cursor_visible = true;
        self.current_attributes = self.default_cell.attributes;

        self.tab_interval = 8;
        self.custom_tabs = [0; MAX_TABS];

        let default = self.default_cell;
        for row in 0..self.term_height {
            self.set_columns(row, 0, self.term_width - 1, &default);
        }
    }

    /// Switch between the normal and alternate buffers.
    pub(crate) fn set_alternate(&mut self, enable: bool, clear: bool, save_cursor: bool) {
        if enable == self.using_alternate {
            return;
        }

        if enable {
            if save_cursor {
                self.saved_cursor_row = self.cursor_row;
                self.saved_cursor_col = self.cursor_col;
            }
            // Snap to the live view; the alternate buffer has no
            // scrollback to look at
            if self.scroll_offset > 0 {
                self.scroll_display_down(self.scroll_offset);
            }
            self.using_alternate = true;
            if clear {
                self.alternate.reset();
                self.clear_range(0, 0, self.term_height - 1, self.term_width - 1);
            }
        } else {
            self.using_alternate = false;
            if save_cursor {
                self.move_cursor(self.saved_cursor_row, self.saved_cursor_col);
            }
        }

        self.update_scrollbar_bounds();
        self.redraw_rect(0, 0, self.term_height - 1, self.term_width - 1);
    }

    /// Clip-move the cursor within terminal bounds.
    pub(crate) fn move_cursor(&mut self, row: i32, col: i32) {
        self.cursor_row = row.clamp(0, self.term_height - 1);
        self.cursor_col = col.clamp(0, self.term_width - 1);
    }

    // Tab stops

    pub(crate) fn set_tab(&mut self, column: i32) {
        for slot in &mut self.custom_tabs {
            if *slot == 0 {
                *slot = column + 1;
                break;
            }
        }
    }

    pub(crate) fn unset_tab(&mut self, column: i32) {
        for slot in &mut self.custom_tabs {
            if *slot == column + 1 {
                *slot = 0;
                break;
            }
        }
    }

    pub(crate) fn clear_tabs(&mut self) {
        self.tab_interval = 0;
        self.custom_tabs = [0; MAX_TABS];
    }

    /// The column of the next tab stop after `column`.
    pub(crate) fn next_tab(&self, column: i32) -> i32 {
        // Interval-implied stop, unless custom stops provide an earlier one
        let mut tabstop = if self.tab_interval != 0 {
            (column / self.tab_interval + 1) * self.tab_interval
        } else {
            self.term_width - 1
        };

        for &slot in &self.custom_tabs {
            let custom = slot - 1;
            if custom != -1 && custom > column && custom < tabstop {
                tabstop = custom;
            }
        }

        tabstop
    }

    // PTY replies

    /// Write bytes to the PTY input pipe (protocol replies, pastes).
    pub(crate) fn send_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.pty.write_all(data)
    }

    pub(crate) fn send_string(&mut self, data: &str) -> io::Result<()> {
        self.send_bytes(data.as_bytes())
    }

    // Pipe stream redirection

    /// Open a named pipe stream; terminal output is redirected to it until
    /// closed.
    pub(crate) fn pipe_stream_open(&mut self, name: &str) {
        self.pipe_stream_close();

        let stream = self.alloc_stream();
        let instruction = Instruction::Pipe {
            stream,
            mimetype: String::from("text/plain"),
            name: name.to_owned(),
        };
        if let Err(e) = self.sink.send(instruction) {
            error!(error = %e, "failed to open pipe stream");
            return;
        }

        debug!(name, "terminal output redirected to pipe");
        self.pipe = Some(PipeStream {
            stream,
            buffer: Vec::with_capacity(PIPE_BUFFER_SIZE),
        });
    }

    pub(crate) fn pipe_stream_write(&mut self, byte: u8) {
        if self.pipe.is_none() {
            return;
        }
        if self
            .pipe
            .as_ref()
            .is_some_and(|p| p.buffer.len() == PIPE_BUFFER_SIZE)
        {
            self.pipe_stream_flush();
        }
        if let Some(pipe) = &mut self.pipe {
            pipe.buffer.push(byte);
        }
    }

    pub(crate) fn pipe_stream_flush(&mut self) {
        let Some(pipe) = &mut self.pipe else {
            return;
        };
        if pipe.buffer.is_empty() {
            return;
        }

        let instruction = Instruction::Blob {
            stream: pipe.stream,
            data: std::mem::take(&mut pipe.buffer),
        };
        if let Err(e) = self.sink.send(instruction) {
            error!(error = %e, "failed to write pipe stream blob");
        }
    }

    pub(crate) fn pipe_stream_close(&mut self) {
        if self.pipe.is_none() {
            return;
        }
        self.pipe_stream_flush();

        if let Some(pipe) = self.pipe.take() {
            if let Err(e) = self.sink.send(Instruction::End {
                stream: pipe.stream,
            }) {
                error!(error = %e, "failed to close pipe stream");
            }
            debug!("terminal output restored to display");
        }
    }

    // Frame flushing

    /// Flush one frame: typescript, pipe stream, cursor, display diff,
    /// scrollbar, and the frame-end sync marker.
    pub(crate) fn flush_frame(&mut self) -> io::Result<()> {
        if let Some(typescript) = &mut self.typescript {
            typescript.flush();
        }
        self.pipe_stream_flush();

        self.commit_cursor();

        {
            let TermState { display, sink, .. } = self;
            display.flush(sink.as_mut())?;
        }

        let scrolled = {
            let TermState {
                scrollbar, sink, ..
            } = self;
            scrollbar.flush(sink.as_mut())?
        };
        if let Some(value) = scrolled {
            let delta = -value - self.scroll_offset;
            if delta < 0 {
                self.scroll_display_down(-delta);
            } else if delta > 0 {
                self.scroll_display_up(delta);
            }
            self.scrollbar.set_value(value);
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.sink.send(Instruction::Sync { timestamp })?;
        self.sink.flush()
    }

    /// Replay the complete display state into a new viewer's sink.
    pub(crate) fn sync_user(&mut self, sink: &mut dyn InstructionSink) -> io::Result<()> {
        let background = self.display.palette().default_background();
        sink.send(Instruction::Size {
            layer: LayerId::DEFAULT,
            width: self.width,
            height: self.height,
        })?;
        sink.send(Instruction::Rect {
            layer: LayerId::DEFAULT,
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        })?;
        sink.send(Instruction::Cfill {
            op: CompositeOp::Over,
            layer: LayerId::DEFAULT,
            color: background.to_wire(),
            alpha: 0xFF,
        })?;

        self.display.sync_full(sink)?;
        self.cursor_state.sync_full(sink)?;
        self.scrollbar.sync_full(sink)
    }

    // Reconfiguration

    pub(crate) fn apply_color_scheme(&mut self, scheme: &str) {
        let parsed = parse_color_scheme(scheme);

        let palette = Palette::new(parsed.palette, parsed.foreground, parsed.background);
        *self.display.palette_mut() = palette;

        let default_cell = Cell::blank(Attributes::new(parsed.foreground, parsed.background));
        self.default_cell = default_cell;
        self.current_attributes = default_cell.attributes;
        self.display.set_default_cell(default_cell);
        self.normal.set_default_cell(default_cell);
        self.alternate.set_default_cell(default_cell);

        if let Err(e) = self.repaint_default_layer() {
            error!(error = %e, "failed to repaint background for new scheme");
        }
        self.redraw_rect(0, 0, self.term_height - 1, self.term_width - 1);
    }

    pub(crate) fn apply_font(&mut self, name: Option<&str>, size: Option<i32>, dpi: i32) {
        // Only the metrics matter here; the name travels with glyph
        // rasterization on the far side of the sink
        let _ = name;
        let size = size.unwrap_or_else(|| self.display.char_height() * 72 / dpi.max(1));
        let font = Font::new(name.unwrap_or("monospace"), size, dpi);

        self.display.set_char_size(font.char_width, font.char_height);
        self.resize_pixels(self.width, self.height);
    }

    // Resize

    /// Public pixel-dimension resize entry point.
    pub(crate) fn resize_pixels(&mut self, width: i32, height: i32) {
        let available_width = (width - SCROLLBAR_WIDTH).max(0);
        let columns =
            (available_width / self.display.char_width()).clamp(1, MAX_COLUMNS as i32);
        let rows = (height / self.display.char_height()).clamp(1, MAX_ROWS as i32);

        self.width = width;
        self.height = height;

        if let Err(e) = self.repaint_default_layer() {
            error!(error = %e, "failed to repaint background during resize");
        }

        self.scrollbar.parent_resized(width, height, rows);
        self.update_scrollbar_bounds();

        if columns != self.term_width || rows != self.term_height {
            debug!(rows, columns, "resizing terminal");
            self.resize_grid(columns, rows);
            self.scroll_end = rows - 1;
        }
    }

    /// Internal resize in character dimensions.
    fn resize_grid(&mut self, width: i32, height: i32) {
        // If height is decreasing, shift the display up into scrollback
        if height < self.term_height {
            let used_height = (self.buffer().len() as i32).min(self.term_height);
            let shift = used_height - height;

            if shift > 0 {
                self.display
                    .copy_rows(shift, self.display.height() - 1, -shift);

                // The ring rotates; the rows above the new top become
                // scrollback
                self.buffer_mut().rotate_up(shift as usize);
                self.cursor_row -= shift;
                self.visible_cursor_row -= shift;

                self.redraw_rect(height - shift, 0, height - 1, width - 1);
            }
        }

        self.display.resize(width, height);

        // Redraw newly-exposed columns when widening
        if width > self.term_width {
            self.redraw_rect(0, self.term_width - 1, height - 1, width - 1);
        }

        // If height is increasing, pull scrollback rows into view
        if height > self.term_height && (self.buffer().len() as i32) > self.term_height {
            let mut shift = height - self.term_height;
            let max_shift = self.buffer().len() as i32 - self.term_height;
            shift = shift.min(max_shift);

            self.buffer_mut().rotate_down(shift as usize);
            self.cursor_row += shift;
            self.visible_cursor_row += shift;

            if self.scroll_offset >= shift {
                // Consume the view offset first
                self.scroll_offset -= shift;
                let value = -self.scroll_offset;
                self.scrollbar.set_value(value);

                self.redraw_rect(
                    self.term_height,
                    0,
                    self.term_height + shift - 1,
                    width - 1,
                );
            } else {
                self.redraw_rect(
                    self.term_height,
                    0,
                    self.term_height + self.scroll_offset - 1,
                    width - 1,
                );

                let shift = shift - self.scroll_offset;
                self.scroll_offset = 0;
                self.scrollbar.set_value(0);

                if shift > 0 {
                    self.display
                        .copy_rows(0, self.display.height() - shift - 1, shift);
                    self.redraw_rect(0, 0, shift - 1, width - 1);
                }
            }
        }

        self.cursor_row = self.cursor_row.clamp(0, height - 1);
        self.cursor_col = self.cursor_col.clamp(0, width - 1);

        self.term_width = width;
        self.term_height = height;
    }
}
