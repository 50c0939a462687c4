//! Terminal emulator core for text-oriented remote desktop sessions.
//!
//! This crate turns a stream of VT100/ANSI output bytes into a grid of
//! styled characters with scrollback, and synchronizes that grid to remote
//! viewers as [`vtwire`] drawing instructions. It is the middle of a
//! pipeline: a PTY reader thread feeds bytes in via
//! [`Terminal::feed_output`], user event threads inject keys, mouse events
//! and stream data, and an internal render thread flushes at most one frame
//! every 40 ms.
//!
//! The PTY child process, the socket transport, and font rasterization are
//! all outside this crate: the emulator only sees a byte sink for PTY input,
//! a byte source for PTY output, and an opaque [`vtwire::InstructionSink`].

#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::module_name_repetitions,
    clippy::too_many_lines
)]

mod buffer;
mod cell;
mod clipboard;
mod color;
mod cursor;
mod display;
mod input;
mod parser;
mod pty;
mod scheme;
mod scrollbar;
mod selection;
mod settings;
mod streams;
mod terminal;
mod typescript;

pub use buffer::{Buffer, MAX_COLUMNS, MAX_ROWS, Row};
pub use cell::{Attributes, CONTINUATION, Cell};
pub use clipboard::{CLIPBOARD_MAX_LENGTH, Clipboard};
pub use color::{
    Color, DEFAULT_BACKGROUND_INDEX, DEFAULT_FOREGROUND_INDEX, Palette, initial_palette,
};
pub use cursor::CursorSprite;
pub use input::MouseButtons;
pub use pty::{PtyReader, PtyWriter, pty_pipe};
pub use scheme::{ColorScheme, parse_color_scheme};
pub use settings::{ClipboardEncoding, ColorDepth, CursorMode, Settings};
pub use streams::Credentials;
pub use terminal::{Font, Terminal, TerminalOptions};
pub use typescript::Typescript;

pub use vtwire;
