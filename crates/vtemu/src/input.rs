//! Keyboard and mouse translation.
//!
//! Keys arrive as X11 keysyms with press/release state; mouse events as a
//! position and button mask. Both are translated into PTY byte sequences
//! and view-state changes (scrolling, selection) here.

use std::io;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use tracing::debug;

use crate::cursor::CursorSprite;
use crate::terminal::TermState;

bitflags! {
    /// Mouse button state, one bit per button, matching the wire
    /// protocol's button mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MouseButtons: u32 {
        const LEFT = 1;
        const MIDDLE = 2;
        const RIGHT = 4;
        const SCROLL_UP = 8;
        const SCROLL_DOWN = 16;
    }
}

/// Modifier keysyms.
const KEYSYM_SHIFT: u32 = 0xFFE1;
const KEYSYM_CTRL: u32 = 0xFFE3;
const KEYSYM_ALT: u32 = 0xFFE9;

/// Rows scrolled per wheel click.
const WHEEL_SCROLL_AMOUNT: i32 = 3;

/// Clicks closer together than this extend a multi-click (word, line)
/// selection.
const MULTI_CLICK_WINDOW: Duration = Duration::from_millis(400);

impl TermState {
    fn set_sprite(&mut self, sprite: CursorSprite) -> io::Result<()> {
        let TermState {
            cursor_state, sink, ..
        } = self;
        cursor_state.set_sprite(sprite, sink.as_mut())
    }

    /// Paste the shared clipboard into the PTY.
    fn paste_clipboard(&mut self) -> io::Result<()> {
        if self.disable_paste {
            return Ok(());
        }
        let clipboard = self.clipboard.clone();
        let guard = clipboard.lock();
        self.send_bytes(guard.data())
    }

    /// Handle one key event.
    pub(crate) fn handle_key(&mut self, keysym: u32, pressed: bool) -> io::Result<()> {
        // The mouse cursor vanishes while typing
        if self.cursor_state.sprite() != CursorSprite::Blank {
            self.set_sprite(CursorSprite::Blank)?;
        }

        // Track modifier state
        match keysym {
            KEYSYM_CTRL => {
                self.mod_ctrl = pressed;
                return Ok(());
            }
            KEYSYM_ALT => {
                self.mod_alt = pressed;
                return Ok(());
            }
            KEYSYM_SHIFT => {
                self.mod_shift = pressed;
                return Ok(());
            }
            _ => {}
        }

        if !pressed {
            return Ok(());
        }

        // Ctrl+Shift+V pastes the clipboard
        if keysym == u32::from(b'V') && self.mod_ctrl {
            return self.paste_clipboard();
        }

        // Shift+PgUp / Shift+PgDn scroll by one page
        if self.mod_shift {
            if keysym == 0xFF55 {
                self.scroll_display_up(self.term_height);
                return Ok(());
            }
            if keysym == 0xFF56 {
                self.scroll_display_down(self.term_height);
                return Ok(());
            }
        }

        // Any other key snaps the view back to the live display
        if self.scroll_offset != 0 {
            self.scroll_display_down(self.scroll_offset);
        }

        // Alt prefixes the escape character
        if self.mod_alt {
            self.send_string("\x1B")?;
        }

        // Ctrl+key produces C0 control characters
        if self.mod_ctrl {
            let byte = match keysym {
                // Keysyms for '@' through '_' are all conveniently in C0
                // order
                0x40..=0x5F => Some((keysym - 0x40) as u8),
                0x61..=0x7A => Some((keysym - 0x61 + 1) as u8),
                0x3F => Some(0x7F),
                0x32 => Some(0x00),
                // Ctrl+3 through Ctrl+7 cover the remaining C0 characters
                0x33..=0x37 => Some((keysym - 0x33 + 0x1B) as u8),
                _ => None,
            };
            return match byte {
                Some(byte) => self.send_bytes(&[byte]),
                None => Ok(()),
            };
        }

        // Printable keysyms translate to UTF-8
        if keysym <= 0xFF || keysym & 0xFFFF_0000 == 0x0100_0000 {
            let codepoint = keysym & 0xFFFF;
            let c = char::from_u32(codepoint).unwrap_or('?');
            let mut buffer = [0u8; 4];
            return self.send_bytes(c.encode_utf8(&mut buffer).as_bytes());
        }

        // Typeable keys of the number pad
        if (0xFFAA..=0xFFB9).contains(&keysym) {
            return self.send_bytes(&[(keysym - 0xFF80) as u8]);
        }

        // Non-printable keys
        if let Some(sequence) = self.key_sequence(keysym) {
            return self.send_string(sequence);
        }

        debug!(keysym, "ignoring unknown keysym");
        Ok(())
    }

    /// The escape sequence sent for a non-printable key, if any.
    fn key_sequence(&self, keysym: u32) -> Option<&'static str> {
        Some(match keysym {
            0xFF08 => "\x7F",                // Backspace
            0xFF09 | 0xFF89 => "\x09",       // Tab
            0xFF0D | 0xFF8D => "\x0D",       // Enter
            0xFF1B => "\x1B",                // Escape
            0xFF50 | 0xFF95 => "\x1B[1~",    // Home

            // Arrows switch prefix with application cursor keys
            0xFF51 | 0xFF96 => {
                if self.application_cursor_keys {
                    "\x1BOD"
                } else {
                    "\x1B[D"
                }
            }
            0xFF52 | 0xFF97 => {
                if self.application_cursor_keys {
                    "\x1BOA"
                } else {
                    "\x1B[A"
                }
            }
            0xFF53 | 0xFF98 => {
                if self.application_cursor_keys {
                    "\x1BOC"
                } else {
                    "\x1B[C"
                }
            }
            0xFF54 | 0xFF99 => {
                if self.application_cursor_keys {
                    "\x1BOB"
                } else {
                    "\x1B[B"
                }
            }

            0xFF55 | 0xFF9A => "\x1B[5~",    // Page up
            0xFF56 | 0xFF9B => "\x1B[6~",    // Page down
            0xFF57 | 0xFF9C => "\x1B[4~",    // End
            0xFF63 | 0xFF9E => "\x1B[2~",    // Insert

            0xFFBE | 0xFF91 => "\x1B[[A",    // F1
            0xFFBF | 0xFF92 => "\x1B[[B",    // F2
            0xFFC0 | 0xFF93 => "\x1B[[C",    // F3
            0xFFC1 | 0xFF94 => "\x1B[[D",    // F4
            0xFFC2 => "\x1B[[E",             // F5
            0xFFC3 => "\x1B[17~",            // F6
            0xFFC4 => "\x1B[18~",            // F7
            0xFFC5 => "\x1B[19~",            // F8
            0xFFC6 => "\x1B[20~",            // F9
            0xFFC7 => "\x1B[21~",            // F10
            0xFFC8 => "\x1B[22~",            // F11
            0xFFC9 => "\x1B[23~",            // F12

            0xFFFF | 0xFF9F => "\x1B[3~",    // Delete

            _ => return None,
        })
    }

    /// Handle one mouse event from the given user.
    pub(crate) fn handle_mouse(
        &mut self,
        user_id: u64,
        x: i32,
        y: i32,
        mask: MouseButtons,
    ) -> io::Result<()> {
        let released = self.mouse_mask & !mask;
        let pressed = !self.mouse_mask & mask;

        // Every event updates the shared cursor sprite position
        {
            let TermState {
                cursor_state, sink, ..
            } = self;
            cursor_state.move_user(user_id, x, y, sink.as_mut())?;
        }

        // The scrollbar sees events first; anything it consumes never
        // reaches selection logic
        if self.scrollbar.handle_mouse(x, y, mask) {
            if self.cursor_state.sprite() != CursorSprite::Pointer {
                self.set_sprite(CursorSprite::Pointer)?;
            }
            return Ok(());
        }

        self.mouse_mask = mask;

        if self.cursor_state.sprite() != CursorSprite::IBar {
            self.set_sprite(CursorSprite::IBar)?;
        }

        // Middle or right button release pastes the clipboard
        if released.intersects(MouseButtons::MIDDLE | MouseButtons::RIGHT) {
            return self.paste_clipboard();
        }

        let row = y / self.display.char_height() - self.scroll_offset;
        let col = x / self.display.char_width();

        // Multi-click tracking for word and line selection
        let mut multi_click = false;
        if pressed.contains(MouseButtons::LEFT) {
            let now = Instant::now();
            self.click_count = match self.last_click {
                Some((at, click_row, click_col))
                    if now.duration_since(at) <= MULTI_CLICK_WINDOW
                        && click_row == row
                        && click_col == col =>
                {
                    self.click_count + 1
                }
                _ => 1,
            };
            self.last_click = Some((now, row, col));

            match self.click_count {
                2 => {
                    self.select_word(row, col);
                    multi_click = true;
                }
                3 => {
                    self.select_line(row);
                    multi_click = true;
                }
                _ => {}
            }
        }

        if self.selection.active {
            if released.contains(MouseButtons::LEFT) {
                self.select_end()?;
            } else if !multi_click {
                self.select_update(row, col);
            }
        } else if !pressed.contains(MouseButtons::LEFT) && mask.contains(MouseButtons::LEFT) {
            // Motion with the button already held begins a drag selection
            self.select_start(row, col);
        }

        if released.contains(MouseButtons::SCROLL_UP) {
            self.scroll_display_up(WHEEL_SCROLL_AMOUNT);
        }
        if released.contains(MouseButtons::SCROLL_DOWN) {
            self.scroll_display_down(WHEEL_SCROLL_AMOUNT);
        }

        Ok(())
    }
}
