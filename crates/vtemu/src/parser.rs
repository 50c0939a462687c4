//! The character-stream state machine.
//!
//! Each byte of PTY output steps the parser through one state transition.
//! States that accumulate data (CSI parameters, OSC strings, palette
//! specs) own their accumulators inside the state variant, so a terminal
//! carries exactly one parser and no global parsing state exists anywhere.

use smallvec::SmallVec;
use tracing::debug;
use vtwire::Instruction;

use crate::cell::Cell;
use crate::color::Color;
use crate::terminal::TermState;

/// Response sent when identification is requested (DA / DECID).
const VT102_ID: &str = "\x1B[?6c";

/// Arbitrary response to the ENQ control character.
const ANSWERBACK: &str = "GUACAMOLE";

/// Response which indicates the terminal is alive (DSR 5).
const STATUS_OK: &str = "\x1B[0n";

/// Upper bound on a single CSI numeric parameter.
const CSI_PARAM_MAX: i32 = 16383;

/// Maximum number of CSI parameters retained.
const CSI_MAX_PARAMS: usize = 16;

/// Maximum accumulated length of OSC string payloads (titles, filenames,
/// stream names).
const OSC_MAX_LENGTH: usize = 4096;

/// Maximum length of an xterm palette color specification.
const COLOR_SPEC_MAX_LENGTH: usize = 255;

/// OSC operation numbers for the file-transfer and pipe side-channels.
const OSC_DOWNLOAD: u32 = 482_200;
const OSC_SET_UPLOAD_DIRECTORY: u32 = 482_201;
const OSC_OPEN_PIPE: u32 = 482_202;
const OSC_CLOSE_PIPE: u32 = 482_203;

/// A non-Unicode character set mapping selected via `ESC (` / `ESC )`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Charset {
    /// VT100 line-drawing graphics.
    Vt100Graphics,
    /// Every printable position renders blank.
    Null,
    /// Hook for a user-defined mapping; passes code points through.
    User,
}

impl Charset {
    /// Remap a code point in 0x20..=0xFF.
    pub(crate) fn remap(self, codepoint: i32) -> i32 {
        match self {
            Charset::Null => 0,
            Charset::User => codepoint,
            Charset::Vt100Graphics => match codepoint {
                0x60 => 0x25C6, // diamond
                0x61 => 0x2592, // checkerboard
                0x62 => 0x2409, // HT
                0x63 => 0x240C, // FF
                0x64 => 0x240D, // CR
                0x65 => 0x240A, // LF
                0x66 => 0x00B0, // degree
                0x67 => 0x00B1, // plus/minus
                0x68 => 0x2424, // NL
                0x69 => 0x240B, // VT
                0x6A => 0x2518, // lower-right corner
                0x6B => 0x2510, // upper-right corner
                0x6C => 0x250C, // upper-left corner
                0x6D => 0x2514, // lower-left corner
                0x6E => 0x253C, // crossing lines
                0x6F => 0x23BA, // scan line 1
                0x70 => 0x23BB, // scan line 3
                0x71 => 0x2500, // horizontal line
                0x72 => 0x23BC, // scan line 7
                0x73 => 0x23BD, // scan line 9
                0x74 => 0x251C, // left tee
                0x75 => 0x2524, // right tee
                0x76 => 0x2534, // bottom tee
                0x77 => 0x252C, // top tee
                0x78 => 0x2502, // vertical line
                0x79 => 0x2264, // less than or equal
                0x7A => 0x2265, // greater than or equal
                0x7B => 0x03C0, // pi
                0x7C => 0x2260, // not equal
                0x7D => 0x00A3, // pound sign
                0x7E => 0x00B7, // middle dot
                other => other,
            },
        }
    }
}

/// Accumulated CSI parameters and prefix.
#[derive(Debug, Default)]
pub(crate) struct CsiState {
    args: SmallVec<[i32; CSI_MAX_PARAMS]>,
    current: i32,
    private: Option<u8>,
}

impl CsiState {
    /// Parameter `i`, defaulting to 0 when absent.
    fn arg(&self, i: usize) -> i32 {
        self.args.get(i).copied().unwrap_or(0)
    }

    /// Parameter `i`, treating 0 and absence as 1.
    fn arg_or_one(&self, i: usize) -> i32 {
        match self.arg(i) {
            0 => 1,
            value => value,
        }
    }
}

/// Accumulator for OSC 4 palette redefinition.
#[derive(Debug, Default)]
pub(crate) struct XtermPaletteState {
    reading_spec: bool,
    index: i32,
    spec: Vec<u8>,
}

/// The parser's current state. Variants carry their own accumulators.
#[derive(Debug, Default)]
pub(crate) enum ParserState {
    #[default]
    Echo,
    Escape,
    G0Charset,
    G1Charset,
    Csi(CsiState),
    Osc {
        operation: u32,
    },
    WindowTitle {
        title: Vec<u8>,
    },
    XtermPalette(XtermPaletteState),
    Download {
        filename: Vec<u8>,
    },
    SetDirectory {
        path: Vec<u8>,
    },
    OpenPipe {
        name: Vec<u8>,
    },
    ClosePipe,
    CtrlFunc,
    Apc {
        escaping: bool,
    },
}

/// The streaming parser: the current state plus the in-flight UTF-8
/// decode.
#[derive(Debug, Default)]
pub(crate) struct Parser {
    pub(crate) state: ParserState,
    bytes_remaining: i32,
    codepoint: i32,
}

impl Parser {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

/// Whether a byte terminates an OSC-style string (ECMA-48 ST, the
/// backslash of `ESC \`, or BEL).
fn is_string_terminator(byte: u8) -> bool {
    byte == 0x9C || byte == 0x5C || byte == 0x07
}

/// Append a byte to a bounded accumulator.
fn push_bounded(buffer: &mut Vec<u8>, byte: u8, limit: usize) {
    if buffer.len() < limit {
        buffer.push(byte);
    }
}

impl TermState {
    /// Step the parser with one byte of terminal output.
    pub(crate) fn process_byte(&mut self, byte: u8) {
        let state = std::mem::take(&mut self.parser.state);
        self.parser.state = match state {
            ParserState::Echo => self.echo(byte),
            ParserState::Escape => self.escape(byte),
            ParserState::G0Charset => self.select_charset(0, byte),
            ParserState::G1Charset => self.select_charset(1, byte),
            ParserState::Csi(csi) => self.csi(byte, csi),
            ParserState::Osc { operation } => self.osc(byte, operation),
            ParserState::WindowTitle { title } => self.window_title(byte, title),
            ParserState::XtermPalette(palette) => self.xterm_palette(byte, palette),
            ParserState::Download { filename } => self.download(byte, filename),
            ParserState::SetDirectory { path } => self.set_directory(byte, path),
            ParserState::OpenPipe { name } => self.open_pipe(byte, name),
            ParserState::ClosePipe => self.close_pipe(byte),
            ParserState::CtrlFunc => self.ctrl_func(byte),
            ParserState::Apc { escaping } => self.apc(byte, escaping),
        };
    }

    /// Advance the cursor to the next row, scrolling if it would leave the
    /// scrolling region; a cursor already outside the region stops at the
    /// display bottom.
    pub(crate) fn linefeed(&mut self) {
        if self.cursor_row == self.scroll_end {
            self.scroll_up(self.scroll_start, self.scroll_end, 1);
        } else if self.cursor_row < self.term_height - 1 {
            self.cursor_row += 1;
        }
    }

    /// Move the cursor back one row, scrolling the region down if needed.
    fn reverse_linefeed(&mut self) {
        if self.cursor_row == self.scroll_start {
            self.scroll_down(self.scroll_start, self.scroll_end, 1);
        } else if self.cursor_row > 0 {
            self.cursor_row -= 1;
        }
    }

    fn send_reply(&mut self, reply: &str) {
        if let Err(e) = self.send_string(reply) {
            debug!(error = %e, "failed to write reply to PTY");
        }
    }

    /// ECHO state: UTF-8 decode, control dispatch, and glyph writes.
    fn echo(&mut self, byte: u8) -> ParserState {
        // While a pipe stream is open, everything except ESC sequences is
        // redirected to it
        if self.pipe.is_some() && byte != 0x1B {
            self.pipe_stream_write(byte);
            return ParserState::Echo;
        }

        let mapping = self.char_mapping[self.active_char_set];

        // With a non-Unicode mapping active, bytes map straight through
        if mapping.is_some() {
            self.parser.codepoint = i32::from(byte);
            self.parser.bytes_remaining = 0;
        } else if byte & 0x80 == 0x00 {
            self.parser.codepoint = i32::from(byte & 0x7F);
            self.parser.bytes_remaining = 0;
        } else if byte & 0xE0 == 0xC0 {
            self.parser.codepoint = i32::from(byte & 0x1F);
            self.parser.bytes_remaining = 1;
        } else if byte & 0xF0 == 0xE0 {
            self.parser.codepoint = i32::from(byte & 0x0F);
            self.parser.bytes_remaining = 2;
        } else if byte & 0xF8 == 0xF0 {
            self.parser.codepoint = i32::from(byte & 0x07);
            self.parser.bytes_remaining = 3;
        } else if byte & 0xC0 == 0x80 {
            // Continuation of a multi-byte sequence
            self.parser.codepoint = (self.parser.codepoint << 6) | i32::from(byte & 0x3F);
            self.parser.bytes_remaining -= 1;
        } else {
            // Unrecognized prefix
            self.parser.codepoint = '?' as i32;
            self.parser.bytes_remaining = 0;
        }

        if self.parser.bytes_remaining != 0 {
            return ParserState::Echo;
        }

        let mut codepoint = self.parser.codepoint;

        match codepoint {
            // Enquiry
            0x05 => self.send_reply(ANSWERBACK),

            // Bell (ignored)
            0x07 => {}

            // Backspace
            0x08 => self.move_cursor(self.cursor_row, self.cursor_col - 1),

            // Tab
            0x09 => self.move_cursor(self.cursor_row, self.next_tab(self.cursor_col)),

            // Line feed / VT / FF
            0x0A | 0x0B | 0x0C => {
                self.linefeed();
                if self.automatic_carriage_return {
                    self.move_cursor(self.cursor_row, 0);
                }
            }

            // Carriage return
            0x0D => self.move_cursor(self.cursor_row, 0),

            // SO: activate G1
            0x0E => self.active_char_set = 1,

            // SI: activate G0
            0x0F => self.active_char_set = 0,

            0x1B => return ParserState::Escape,

            // Single-byte CSI
            0x9B => return ParserState::Csi(CsiState::default()),

            // DEL (ignored)
            0x7F => {}

            _ => {
                // Remaining control characters are unknown; ignore them
                if codepoint < 0x20 {
                    return ParserState::Echo;
                }

                if (0x20..=0xFF).contains(&codepoint) {
                    if let Some(mapping) = mapping {
                        codepoint = mapping.remap(codepoint);
                    }
                }

                // Wrap at the right edge with an automatic linefeed
                if self.cursor_col >= self.term_width {
                    let cursor_row = self.cursor_row;
                    self.buffer_mut().set_wrapped(cursor_row, true);
                    self.cursor_col = 0;
                    self.linefeed();
                }

                // Insert mode shifts the remainder of the line right
                if self.insert_mode {
                    self.copy_columns(
                        self.cursor_row,
                        self.cursor_col,
                        self.term_width - 2,
                        1,
                    );
                }

                self.set(self.cursor_row, self.cursor_col, codepoint);
                self.cursor_col += i32::from(crate::cell::codepoint_width(codepoint));
            }
        }

        ParserState::Echo
    }

    /// ESCAPE state: one-byte dispatch after ESC.
    fn escape(&mut self, byte: u8) -> ParserState {
        match byte {
            b'(' => ParserState::G0Charset,
            b')' => ParserState::G1Charset,
            b']' => ParserState::Osc { operation: 0 },
            b'[' => ParserState::Csi(CsiState::default()),
            b'#' => ParserState::CtrlFunc,
            b'_' => ParserState::Apc { escaping: false },

            // Save cursor (DECSC)
            b'7' => {
                self.saved_cursor_row = self.cursor_row;
                self.saved_cursor_col = self.cursor_col;
                ParserState::Echo
            }

            // Restore cursor (DECRC)
            b'8' => {
                self.move_cursor(self.saved_cursor_row, self.saved_cursor_col);
                ParserState::Echo
            }

            // Index (IND)
            b'D' => {
                self.linefeed();
                ParserState::Echo
            }

            // Next line (NEL)
            b'E' => {
                self.move_cursor(self.cursor_row, 0);
                self.linefeed();
                ParserState::Echo
            }

            // Set tab (HTS)
            b'H' => {
                self.set_tab(self.cursor_col);
                ParserState::Echo
            }

            // Reverse linefeed (RI)
            b'M' => {
                self.reverse_linefeed();
                ParserState::Echo
            }

            // DEC identify
            b'Z' => {
                self.send_reply(VT102_ID);
                ParserState::Echo
            }

            // Full reset (RIS)
            b'c' => {
                self.reset();
                ParserState::Echo
            }

            other => {
                debug!(sequence = other as char as u32, "unhandled ESC sequence");
                ParserState::Echo
            }
        }
    }

    /// Select the G0 or G1 character set mapping.
    fn select_charset(&mut self, slot: usize, byte: u8) -> ParserState {
        self.char_mapping[slot] = match byte {
            b'0' => Some(Charset::Vt100Graphics),
            b'U' => Some(Charset::Null),
            b'K' => Some(Charset::User),
            // 'B' and anything unknown select Unicode pass-through
            _ => None,
        };
        ParserState::Echo
    }

    /// CSI state: parameter accumulation and final-byte dispatch.
    fn csi(&mut self, byte: u8, mut csi: CsiState) -> ParserState {
        match byte {
            b'0'..=b'9' => {
                csi.current = (csi.current * 10 + i32::from(byte - b'0')).min(CSI_PARAM_MAX);
                ParserState::Csi(csi)
            }

            b';' => {
                if csi.args.len() < CSI_MAX_PARAMS {
                    csi.args.push(csi.current);
                }
                csi.current = 0;
                ParserState::Csi(csi)
            }

            0x40..=0x7E => {
                if csi.args.len() < CSI_MAX_PARAMS {
                    csi.args.push(csi.current);
                }
                self.csi_dispatch(byte, &csi);
                ParserState::Echo
            }

            // A single private-mode prefix byte
            0x3A..=0x3F => {
                if csi.private.is_none() {
                    csi.private = Some(byte);
                }
                ParserState::Csi(csi)
            }

            _ => ParserState::Csi(csi),
        }
    }

    fn csi_dispatch(&mut self, final_byte: u8, csi: &CsiState) {
        match final_byte {
            // ICH: insert blank characters, shifting right
            b'@' => {
                let amount = csi.arg_or_one(0);
                if self.cursor_col + amount < self.term_width {
                    self.copy_columns(
                        self.cursor_row,
                        self.cursor_col,
                        self.term_width - amount - 1,
                        amount,
                    );
                }
                self.clear_columns(
                    self.cursor_row,
                    self.cursor_col,
                    self.cursor_col + amount - 1,
                );
            }

            // CUU: move up
            b'A' => {
                let amount = csi.arg_or_one(0);
                self.move_cursor(self.cursor_row - amount, self.cursor_col);
            }

            // CUD: move down
            b'B' | b'e' => {
                let amount = csi.arg_or_one(0);
                self.move_cursor(self.cursor_row + amount, self.cursor_col);
            }

            // CUF: move right
            b'C' | b'a' => {
                let amount = csi.arg_or_one(0);
                self.move_cursor(self.cursor_row, self.cursor_col + amount);
            }

            // CUB: move left
            b'D' => {
                let amount = csi.arg_or_one(0);
                self.move_cursor(self.cursor_row, self.cursor_col - amount);
            }

            // CNL: down N rows, column 1
            b'E' => {
                let amount = csi.arg_or_one(0);
                self.move_cursor(self.cursor_row + amount, 0);
            }

            // CPL: up N rows, column 1
            b'F' => {
                let amount = csi.arg_or_one(0);
                self.move_cursor(self.cursor_row - amount, 0);
            }

            // CHA/HPA: move to column
            b'G' | b'`' => {
                let mut col = csi.arg(0);
                if col != 0 {
                    col -= 1;
                }
                self.move_cursor(self.cursor_row, col);
            }

            // CUP/HVP: move to row, column (1-based)
            b'H' | b'f' => {
                let mut row = csi.arg(0);
                if row != 0 {
                    row -= 1;
                }
                let mut col = csi.arg(1);
                if col != 0 {
                    col -= 1;
                }
                self.move_cursor(row, col);
            }

            // ED: erase display
            b'J' => match csi.arg(0) {
                0 => self.clear_range(
                    self.cursor_row,
                    self.cursor_col,
                    self.term_height - 1,
                    self.term_width - 1,
                ),
                1 => self.clear_range(0, 0, self.cursor_row, self.cursor_col),
                2 | 3 => self.clear_range(0, 0, self.term_height - 1, self.term_width - 1),
                _ => {}
            },

            // EL: erase line
            b'K' => match csi.arg(0) {
                0 => self.clear_columns(self.cursor_row, self.cursor_col, self.term_width - 1),
                1 => self.clear_columns(self.cursor_row, 0, self.cursor_col),
                2 => self.clear_columns(self.cursor_row, 0, self.term_width - 1),
                _ => {}
            },

            // IL: insert blank lines
            b'L' => {
                let amount = csi.arg_or_one(0);
                self.scroll_down(self.cursor_row, self.scroll_end, amount);
            }

            // DL: delete lines
            b'M' => {
                let amount = csi.arg_or_one(0);
                self.scroll_up(self.cursor_row, self.scroll_end, amount);
            }

            // DCH: delete characters, scrolling left
            b'P' => {
                let amount = csi.arg_or_one(0);
                if self.cursor_col + amount < self.term_width {
                    self.copy_columns(
                        self.cursor_row,
                        self.cursor_col + amount,
                        self.term_width - 1,
                        -amount,
                    );
                }
                self.clear_columns(
                    self.cursor_row,
                    self.term_width - amount,
                    self.term_width - 1,
                );
            }

            // ECH: erase characters in place
            b'X' => {
                let amount = csi.arg_or_one(0);
                self.clear_columns(
                    self.cursor_row,
                    self.cursor_col,
                    self.cursor_col + amount - 1,
                );
            }

            // Linux private CSI, keyboard LEDs: explicitly ignored
            b']' | b'q' => {}

            // DA: identify
            b'c' => {
                if csi.arg(0) == 0 && csi.private.is_none() {
                    self.send_reply(VT102_ID);
                }
            }

            // VPA: move to row, current column
            b'd' => {
                let mut row = csi.arg(0);
                if row != 0 {
                    row -= 1;
                }
                self.move_cursor(row, self.cursor_col);
            }

            // TBC: clear tab stop(s)
            b'g' => match csi.arg(0) {
                0 => self.unset_tab(self.cursor_col),
                3 => self.clear_tabs(),
                _ => {}
            },

            // SM/RM: set/reset mode
            b'h' => self.set_mode(csi.arg(0), csi.private, true),
            b'l' => self.set_mode(csi.arg(0), csi.private, false),

            // SGR
            b'm' => self.select_graphic_rendition(&csi.args),

            // DSR: status report
            b'n' => {
                if csi.private.is_none() {
                    match csi.arg(0) {
                        5 => self.send_reply(STATUS_OK),
                        6 => {
                            let report =
                                format!("\x1B[{};{}R", self.cursor_row + 1, self.cursor_col + 1);
                            self.send_reply(&report);
                        }
                        _ => {}
                    }
                }
            }

            // DECSTBM: set scrolling region
            b'r' => {
                if csi.args.len() == 2 {
                    let start = (csi.arg(0) - 1).clamp(0, self.term_height - 1);
                    let end = (csi.arg(1) - 1).clamp(0, self.term_height - 1);
                    if start <= end {
                        self.scroll_start = start;
                        self.scroll_end = end;
                        return;
                    }
                }
                self.scroll_start = 0;
                self.scroll_end = self.term_height - 1;
            }

            // Save cursor
            b's' => {
                self.saved_cursor_row = self.cursor_row;
                self.saved_cursor_col = self.cursor_col;
            }

            // Restore cursor
            b'u' => {
                self.move_cursor(self.saved_cursor_row, self.saved_cursor_col);
            }

            other => {
                debug!(
                    final_byte = other as char as u32,
                    args = ?csi.args,
                    "unhandled CSI sequence"
                );
            }
        }
    }

    /// Look up and assign a mode flag (CSI h/l).
    fn set_mode(&mut self, number: i32, private: Option<u8>, enable: bool) {
        match (private, number) {
            // DECCKM
            (Some(b'?'), 1) => self.application_cursor_keys = enable,

            // DECTCEM
            (Some(b'?'), 25) => self.set_cursor_visible(enable),

            // Alternate screen buffer variants
            (Some(b'?'), 47) => self.set_alternate(enable, false, false),
            (Some(b'?'), 1047) => {
                if !enable && self.using_alternate {
                    // The alternate contents are cleared on leave
                    self.clear_range(0, 0, self.term_height - 1, self.term_width - 1);
                }
                self.set_alternate(enable, enable, false);
            }
            (Some(b'?'), 1049) => self.set_alternate(enable, enable, true),

            // DECIM
            (None, 4) => self.insert_mode = enable,

            // LF/NL
            (None, 20) => self.automatic_carriage_return = enable,

            _ => debug!(number, ?private, enable, "unknown mode flag"),
        }
    }

    /// Parse an xterm 256-color SGR continuation (`2;R;G;B` or `5;N`).
    ///
    /// Returns `None` when the arguments do not start a recognized
    /// 256-color sequence; otherwise the number of arguments consumed and
    /// the parsed color (absent when components are out of range).
    fn parse_xterm256(&self, args: &[i32]) -> Option<(usize, Option<Color>)> {
        match args.first()? {
            // Direct RGB
            2 => {
                if args.len() < 4 {
                    return Some((1, None));
                }
                let (red, green, blue) = (args[1], args[2], args[3]);
                let color = if (0..=255).contains(&red)
                    && (0..=255).contains(&green)
                    && (0..=255).contains(&blue)
                {
                    Some(Color::rgb(red as u8, green as u8, blue as u8))
                } else {
                    None
                };
                Some((4, color))
            }

            // Palette index
            5 => {
                if args.len() < 2 {
                    return Some((1, None));
                }
                let index = args[1];
                let color = if (0..=255).contains(&index) {
                    self.display.lookup_color(index as i16)
                } else {
                    None
                };
                Some((2, color))
            }

            _ => None,
        }
    }

    /// SGR: apply graphic rendition parameters to the current attributes.
    fn select_graphic_rendition(&mut self, args: &[i32]) {
        let mut i = 0;
        while i < args.len() {
            let value = args[i];

            match value {
                0 => self.current_attributes = self.default_cell.attributes,
                1 => self.current_attributes.bold = true,
                2 => self.current_attributes.half_bright = true,
                4 => self.current_attributes.underscore = true,
                7 => self.current_attributes.reverse = true,
                21 | 22 => {
                    self.current_attributes.bold = false;
                    self.current_attributes.half_bright = false;
                }
                24 => self.current_attributes.underscore = false,
                27 => self.current_attributes.reverse = false,

                30..=37 => {
                    if let Some(color) = self.display.lookup_color((value - 30) as i16) {
                        self.current_attributes.foreground = color;
                    }
                }

                // 256-color foreground, or underscore with default
                // foreground when no valid color sequence follows
                38 => match self.parse_xterm256(&args[i + 1..]) {
                    Some((consumed, color)) => {
                        if let Some(color) = color {
                            self.current_attributes.foreground = color;
                        }
                        i += consumed;
                    }
                    None => {
                        self.current_attributes.underscore = true;
                        self.current_attributes.foreground =
                            self.default_cell.attributes.foreground;
                    }
                },

                39 => {
                    self.current_attributes.underscore = false;
                    self.current_attributes.foreground =
                        self.default_cell.attributes.foreground;
                }

                40..=47 => {
                    if let Some(color) = self.display.lookup_color((value - 40) as i16) {
                        self.current_attributes.background = color;
                    }
                }

                // 256-color background
                48 => {
                    if let Some((consumed, color)) = self.parse_xterm256(&args[i + 1..]) {
                        if let Some(color) = color {
                            self.current_attributes.background = color;
                        }
                        i += consumed;
                    }
                }

                49 => {
                    self.current_attributes.background =
                        self.default_cell.attributes.background;
                }

                90..=97 => {
                    if let Some(color) = self.display.lookup_color((value - 90 + 8) as i16) {
                        self.current_attributes.foreground = color;
                    }
                }

                100..=107 => {
                    if let Some(color) = self.display.lookup_color((value - 100 + 8) as i16) {
                        self.current_attributes.background = color;
                    }
                }

                _ => debug!(value, "ignored SGR parameter"),
            }

            i += 1;
        }
    }

    /// OSC state: operation number, then sub-handler selection.
    fn osc(&mut self, byte: u8, mut operation: u32) -> ParserState {
        if byte.is_ascii_digit() {
            operation = operation
                .saturating_mul(10)
                .saturating_add(u32::from(byte - b'0'));
            return ParserState::Osc { operation };
        }

        if byte == b';' {
            return match operation {
                OSC_DOWNLOAD => ParserState::Download {
                    filename: Vec::new(),
                },
                OSC_SET_UPLOAD_DIRECTORY => ParserState::SetDirectory { path: Vec::new() },
                OSC_OPEN_PIPE => ParserState::OpenPipe { name: Vec::new() },
                OSC_CLOSE_PIPE => ParserState::ClosePipe,
                0 | 2 => ParserState::WindowTitle { title: Vec::new() },
                4 => ParserState::XtermPalette(XtermPaletteState::default()),
                _ => ParserState::Osc { operation: 0 },
            };
        }

        if !is_string_terminator(byte) {
            debug!(byte, "unexpected character in OSC");
        }
        ParserState::Echo
    }

    /// OSC 0/2: window title, forwarded as the session name.
    fn window_title(&mut self, byte: u8, mut title: Vec<u8>) -> ParserState {
        if is_string_terminator(byte) {
            let title = String::from_utf8_lossy(&title).into_owned();
            if let Err(e) = self.sink.send(Instruction::Name { title }) {
                debug!(error = %e, "failed to send window title");
            }
            return ParserState::Echo;
        }

        push_bounded(&mut title, byte, OSC_MAX_LENGTH);
        ParserState::WindowTitle { title }
    }

    /// OSC 4: xterm palette redefinition, as repeated `index;spec` pairs.
    fn xterm_palette(&mut self, byte: u8, mut palette: XtermPaletteState) -> ParserState {
        if palette.reading_spec {
            if byte == b';' || is_string_terminator(byte) {
                let spec = String::from_utf8_lossy(&palette.spec).into_owned();
                match spec.parse::<xparsecolor::XColor>() {
                    Ok(color) => {
                        self.display.assign_color(
                            palette.index,
                            Color::rgb(color.red, color.green, color.blue),
                        );
                    }
                    Err(_) => {
                        debug!(spec, "invalid color spec in palette redefinition");
                    }
                }

                palette.reading_spec = false;
                palette.index = 0;
                palette.spec.clear();
            } else {
                push_bounded(&mut palette.spec, byte, COLOR_SPEC_MAX_LENGTH);
            }
        } else if byte.is_ascii_digit() {
            palette.index = palette
                .index
                .saturating_mul(10)
                .saturating_add(i32::from(byte - b'0'));
        } else if byte == b';' {
            palette.reading_spec = true;
            palette.spec.clear();
        }

        if is_string_terminator(byte) {
            return ParserState::Echo;
        }
        ParserState::XtermPalette(palette)
    }

    /// OSC 482200: initiate a file download via the registered hook.
    fn download(&mut self, byte: u8, mut filename: Vec<u8>) -> ParserState {
        if is_string_terminator(byte) {
            let filename = String::from_utf8_lossy(&filename).into_owned();
            let TermState {
                file_download_handler,
                ..
            } = self;
            match file_download_handler {
                Some(handler) => handler(&filename),
                None => {
                    debug!("cannot send file; file transfer is not enabled");
                }
            }
            return ParserState::Echo;
        }

        push_bounded(&mut filename, byte, OSC_MAX_LENGTH);
        ParserState::Download { filename }
    }

    /// OSC 482201: set the upload directory via the registered hook.
    fn set_directory(&mut self, byte: u8, mut path: Vec<u8>) -> ParserState {
        if is_string_terminator(byte) {
            let path = String::from_utf8_lossy(&path).into_owned();
            let TermState {
                upload_path_handler,
                ..
            } = self;
            match upload_path_handler {
                Some(handler) => handler(&path),
                None => {
                    debug!("cannot set upload path; file transfer is not enabled");
                }
            }
            return ParserState::Echo;
        }

        push_bounded(&mut path, byte, OSC_MAX_LENGTH);
        ParserState::SetDirectory { path }
    }

    /// OSC 482202: open a named pipe stream for output redirection.
    fn open_pipe(&mut self, byte: u8, mut name: Vec<u8>) -> ParserState {
        if is_string_terminator(byte) {
            let name = String::from_utf8_lossy(&name).into_owned();
            self.pipe_stream_open(&name);
            return ParserState::Echo;
        }

        push_bounded(&mut name, byte, OSC_MAX_LENGTH);
        ParserState::OpenPipe { name }
    }

    /// OSC 482203: close the pipe stream, restoring display output.
    fn close_pipe(&mut self, byte: u8) -> ParserState {
        if is_string_terminator(byte) {
            self.pipe_stream_close();
            return ParserState::Echo;
        }
        ParserState::ClosePipe
    }

    /// `ESC #`: DEC control functions.
    fn ctrl_func(&mut self, byte: u8) -> ParserState {
        // Alignment test: fill the screen with E's
        if byte == b'8' {
            let cell = Cell::new('E' as i32, self.current_attributes, 1);
            for row in 0..self.term_height {
                self.set_columns(row, 0, self.term_width - 1, &cell);
            }
        }

        ParserState::Echo
    }

    /// `ESC _`: application program command; consumed without effect
    /// until the string terminator.
    fn apc(&mut self, byte: u8, escaping: bool) -> ParserState {
        if escaping && byte == b'\\' {
            return ParserState::Echo;
        }
        ParserState::Apc {
            escaping: byte == 0x1B,
        }
    }
}
