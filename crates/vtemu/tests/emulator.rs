//! End-to-end emulator scenarios: bytes in, grid state and wire
//! instructions out.

use std::io::Read;
use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use vtemu::{
    CONTINUATION, Clipboard, MouseButtons, PtyReader, Terminal, TerminalOptions,
};
use vtwire::{AckStatus, Instruction, InstructionSink, RecordingSink, StreamId};

/// A recording sink the test keeps a handle to after the terminal takes
/// ownership of its clone.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<RecordingSink>>);

impl SharedSink {
    fn instructions(&self) -> Vec<Instruction> {
        self.0.lock().instructions.clone()
    }

    fn drain(&self) -> Vec<Instruction> {
        self.0.lock().drain()
    }
}

impl InstructionSink for SharedSink {
    fn send(&mut self, instruction: Instruction) -> std::io::Result<()> {
        self.0.lock().send(instruction)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

fn terminal() -> (Terminal, SharedSink) {
    terminal_with(TerminalOptions {
        render_thread: false,
        ..TerminalOptions::default()
    })
}

fn terminal_with(options: TerminalOptions) -> (Terminal, SharedSink) {
    let sink = SharedSink::default();
    let terminal = Terminal::create(
        options,
        Box::new(sink.clone()),
        Arc::new(Mutex::new(Clipboard::default())),
    )
    .unwrap();
    (terminal, sink)
}

fn read_bytes(reader: &mut PtyReader, count: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; count];
    let mut offset = 0;
    while offset < count {
        match reader.read(&mut buffer[offset..]) {
            Ok(0) => break,
            Ok(n) => offset += n,
            Err(_) => break,
        }
    }
    buffer.truncate(offset);
    buffer
}

#[test]
fn plain_write() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"Hello\r\n");

    assert_eq!(terminal.cursor_position(), (1, 0));
    for (i, expected) in "Hello".chars().enumerate() {
        assert_eq!(
            terminal.cell_at(0, i as i32).unwrap().value,
            expected as i32
        );
    }
    assert_eq!(terminal.cell_at(0, 5).unwrap().value, 0);
    assert!(!terminal.row_wrapped(0));
}

#[test]
fn csi_cursor_motion() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"\x1B[5;3Hx");

    assert_eq!(terminal.cursor_position(), (4, 3));
    assert_eq!(terminal.cell_at(4, 2).unwrap().value, 'x' as i32);
}

#[test]
fn erase_display_preserves_cursor() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"abc\r\ndef");
    assert_eq!(terminal.cursor_position(), (1, 3));

    terminal.feed_output(b"\x1B[2J");

    assert_eq!(terminal.cursor_position(), (1, 3));
    let (columns, rows) = terminal.dimensions();
    for row in 0..rows {
        for col in 0..columns {
            assert_eq!(terminal.cell_at(row, col).unwrap().value, 0);
        }
    }
}

#[test]
fn erase_scrollback_variant_clears_display() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"abc");
    terminal.feed_output(b"\x1B[3J");
    assert_eq!(terminal.cell_at(0, 0).unwrap().value, 0);
}

#[test]
fn sgr_sets_ansi_foreground() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"\x1B[31mR");

    let cell = terminal.cell_at(0, 0).unwrap();
    assert_eq!(cell.value, 'R' as i32);
    assert_eq!(cell.attributes.foreground.palette_index, 1);
    let foreground = cell.attributes.foreground;
    assert_eq!(
        (foreground.red, foreground.green, foreground.blue),
        (0x99, 0x3E, 0x3E)
    );
}

#[test]
fn xterm_256_color_foreground() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"\x1B[38;5;201mZ");

    let cell = terminal.cell_at(0, 0).unwrap();
    assert_eq!(cell.value, 'Z' as i32);
    let foreground = cell.attributes.foreground;
    assert_eq!(foreground.palette_index, 201);
    assert_eq!(
        (foreground.red, foreground.green, foreground.blue),
        (255, 0, 255)
    );
}

#[test]
fn sgr_direct_rgb() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"\x1B[38;2;10;20;30mQ");

    let foreground = terminal.cell_at(0, 0).unwrap().attributes.foreground;
    assert_eq!(foreground.palette_index, -1);
    assert_eq!(
        (foreground.red, foreground.green, foreground.blue),
        (10, 20, 30)
    );
}

#[test]
fn scroll_region_scrolls_within_bounds() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"top");
    terminal.feed_output(b"\x1B[2;4r");
    terminal.feed_output(b"\x1B[4;1H");
    terminal.feed_output(b"A\nB");

    // Row 0 is outside the region and untouched
    assert_eq!(terminal.row_text(0), "top");
    // The row holding "A" scrolled up within the region
    assert_eq!(terminal.row_text(2), "A");
    // "B" landed on the region's bottom row
    assert_eq!(terminal.row_text(3).trim_start(), "B");
    assert_eq!(terminal.cursor_position().0, 3);
}

#[test]
fn identification_and_status_reports() {
    let (terminal, _sink) = terminal();
    let mut stdin = terminal.stdin_reader();

    terminal.feed_output(b"\x1B[c");
    assert_eq!(read_bytes(&mut stdin, 5), b"\x1B[?6c");

    terminal.feed_output(b"\x1B[5n");
    assert_eq!(read_bytes(&mut stdin, 4), b"\x1B[0n");

    terminal.feed_output(b"\x1B[3;5H\x1B[6n");
    assert_eq!(read_bytes(&mut stdin, 6), b"\x1B[3;5R");

    terminal.feed_output(b"\x05");
    assert_eq!(read_bytes(&mut stdin, 9), b"GUACAMOLE");
}

#[test]
fn window_title_becomes_name_instruction() {
    let (terminal, sink) = terminal();
    sink.drain();
    terminal.feed_output(b"\x1B]0;build server\x07");

    assert!(sink.instructions().iter().any(|i| matches!(
        i,
        Instruction::Name { title } if title == "build server"
    )));
}

#[test]
fn osc_palette_redefinition_applies_to_new_cells() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"\x1B]4;1;rgb:ff/00/00\x07");
    terminal.feed_output(b"\x1B[31mX");

    let foreground = terminal.cell_at(0, 0).unwrap().attributes.foreground;
    assert_eq!(
        (foreground.red, foreground.green, foreground.blue),
        (255, 0, 0)
    );
}

#[test]
fn vt100_line_drawing_charset() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"\x1B(0q");
    assert_eq!(terminal.cell_at(0, 0).unwrap().value, 0x2500);

    // Back to Unicode pass-through
    terminal.feed_output(b"\x1B(Bq");
    assert_eq!(terminal.cell_at(0, 1).unwrap().value, 'q' as i32);
}

#[test]
fn shift_out_selects_g1() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"\x1B)0");
    terminal.feed_output(b"q\x0Eq\x0Fq");

    assert_eq!(terminal.cell_at(0, 0).unwrap().value, 'q' as i32);
    assert_eq!(terminal.cell_at(0, 1).unwrap().value, 0x2500);
    assert_eq!(terminal.cell_at(0, 2).unwrap().value, 'q' as i32);
}

#[test]
fn wide_characters_have_continuation_cells() {
    let (terminal, _sink) = terminal();
    terminal.feed_output("漢x".as_bytes());

    assert_eq!(terminal.cell_at(0, 0).unwrap().value, '漢' as i32);
    assert_eq!(terminal.cell_at(0, 0).unwrap().width, 2);
    assert_eq!(terminal.cell_at(0, 1).unwrap().value, CONTINUATION);
    assert_eq!(terminal.cell_at(0, 2).unwrap().value, 'x' as i32);
}

#[test]
fn overwriting_half_a_wide_character_clears_it() {
    let (terminal, _sink) = terminal();
    terminal.feed_output("漢".as_bytes());
    terminal.feed_output(b"\x1B[1;2Hy");

    // The continuation was overwritten; the owner collapses to a space
    assert_eq!(terminal.cell_at(0, 0).unwrap().value, ' ' as i32);
    assert_eq!(terminal.cell_at(0, 1).unwrap().value, 'y' as i32);
}

#[test]
fn insert_mode_shifts_line_right() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"bc\x1B[1;1H\x1B[4ha");
    assert_eq!(terminal.row_text(0), "abc");
}

#[test]
fn insert_and_delete_characters() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"abcd\x1B[1;1H\x1B[2@");
    assert_eq!(terminal.row_text(0), "  abcd");

    terminal.feed_output(b"\x1B[2P");
    assert_eq!(terminal.row_text(0), "abcd");

    terminal.feed_output(b"\x1B[2X");
    assert_eq!(terminal.row_text(0), "  cd");
}

#[test]
fn insert_and_delete_lines() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"one\r\ntwo\r\nthree");
    terminal.feed_output(b"\x1B[1;1H\x1B[1L");
    assert_eq!(terminal.row_text(0), "");
    assert_eq!(terminal.row_text(1), "one");

    terminal.feed_output(b"\x1B[1M");
    assert_eq!(terminal.row_text(0), "one");
    assert_eq!(terminal.row_text(1), "two");
}

#[test]
fn dec_alignment_test_fills_screen() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"\x1B#8");

    let (columns, rows) = terminal.dimensions();
    assert_eq!(terminal.cell_at(0, 0).unwrap().value, 'E' as i32);
    assert_eq!(
        terminal
            .cell_at(rows - 1, columns - 1)
            .unwrap()
            .value,
        'E' as i32
    );
}

#[test]
fn alternate_buffer_restores_primary_contents() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"primary");
    terminal.feed_output(b"\x1B[?1049h");

    // The alternate screen starts blank; the cursor position carries over
    assert_eq!(terminal.row_text(0), "");
    terminal.feed_output(b"\x1B[Hother");
    assert_eq!(terminal.row_text(0), "other");

    terminal.feed_output(b"\x1B[?1049l");
    assert_eq!(terminal.row_text(0), "primary");
    assert_eq!(terminal.cursor_position(), (0, 7));
}

#[test]
fn cursor_visibility_mode() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"\x1B[?25l");
    terminal.flush_frame().unwrap();
    // The logical cursor still moves while hidden
    terminal.feed_output(b"abc");
    assert_eq!(terminal.cursor_position(), (0, 3));
    terminal.feed_output(b"\x1B[?25h");
}

#[test]
fn save_and_restore_cursor() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"\x1B[5;9H\x1B7\x1B[1;1H\x1B8");
    assert_eq!(terminal.cursor_position(), (4, 8));
}

#[test]
fn tab_stops() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"\tx");
    assert_eq!(terminal.cell_at(0, 8).unwrap().value, 'x' as i32);

    // A custom stop takes precedence when earlier
    terminal.feed_output(b"\x1B[1;4H\x1BH");
    terminal.feed_output(b"\x1B[1;1H\ty");
    assert_eq!(terminal.cell_at(0, 3).unwrap().value, 'y' as i32);

    // TBC 3 removes all stops; tab then lands on the final column
    terminal.feed_output(b"\x1B[3g\x1B[1;1H\tz");
    assert_eq!(terminal.cell_at(0, 79).unwrap().value, 'z' as i32);
}

#[test]
fn key_translation_basics() {
    let (terminal, _sink) = terminal();
    let mut stdin = terminal.stdin_reader();

    terminal.send_key(u32::from(b'a'), true).unwrap();
    assert_eq!(read_bytes(&mut stdin, 1), b"a");

    // Enter
    terminal.send_key(0xFF0D, true).unwrap();
    assert_eq!(read_bytes(&mut stdin, 1), b"\x0D");

    // Up arrow, normal then application mode
    terminal.send_key(0xFF52, true).unwrap();
    assert_eq!(read_bytes(&mut stdin, 3), b"\x1B[A");

    terminal.feed_output(b"\x1B[?1h");
    terminal.send_key(0xFF52, true).unwrap();
    assert_eq!(read_bytes(&mut stdin, 3), b"\x1BOA");

    // Ctrl+C
    terminal.send_key(0xFFE3, true).unwrap();
    terminal.send_key(u32::from(b'c'), true).unwrap();
    assert_eq!(read_bytes(&mut stdin, 1), b"\x03");
    terminal.send_key(0xFFE3, false).unwrap();

    // Alt+x prefixes escape
    terminal.send_key(0xFFE9, true).unwrap();
    terminal.send_key(u32::from(b'x'), true).unwrap();
    assert_eq!(read_bytes(&mut stdin, 2), b"\x1Bx");
    terminal.send_key(0xFFE9, false).unwrap();

    // Release events of ordinary keys send nothing; F1 does
    terminal.send_key(u32::from(b'a'), false).unwrap();
    terminal.send_key(0xFFBE, true).unwrap();
    assert_eq!(read_bytes(&mut stdin, 4), b"\x1B[[A");
}

#[test]
fn ctrl_shift_v_pastes_clipboard() {
    let sink = SharedSink::default();
    let clipboard = Arc::new(Mutex::new(Clipboard::default()));
    clipboard.lock().reset("text/plain");
    clipboard.lock().append(b"pasted");

    let terminal = Terminal::create(
        TerminalOptions {
            render_thread: false,
            ..TerminalOptions::default()
        },
        Box::new(sink),
        clipboard,
    )
    .unwrap();
    let mut stdin = terminal.stdin_reader();

    terminal.send_key(0xFFE1, true).unwrap();
    terminal.send_key(0xFFE3, true).unwrap();
    terminal.send_key(u32::from(b'V'), true).unwrap();
    assert_eq!(read_bytes(&mut stdin, 6), b"pasted");
}

#[test]
fn disable_paste_blocks_middle_click() {
    let sink = SharedSink::default();
    let clipboard = Arc::new(Mutex::new(Clipboard::default()));
    clipboard.lock().append(b"secret");

    let terminal = Terminal::create(
        TerminalOptions {
            render_thread: false,
            disable_paste: true,
            ..TerminalOptions::default()
        },
        Box::new(sink),
        clipboard,
    )
    .unwrap();

    terminal
        .send_mouse(1, 10, 10, MouseButtons::MIDDLE)
        .unwrap();
    terminal
        .send_mouse(1, 10, 10, MouseButtons::empty())
        .unwrap();

    // Nothing must have reached the PTY; a subsequent key lands first
    let mut stdin = terminal.stdin_reader();
    terminal.send_key(u32::from(b'k'), true).unwrap();
    assert_eq!(read_bytes(&mut stdin, 1), b"k");
}

#[test]
fn wheel_scrolls_and_keypress_snaps_back() {
    let (terminal, _sink) = terminal();
    for i in 0..30 {
        terminal.feed_output(format!("line{i}\r\n").as_bytes());
    }

    terminal
        .send_mouse(1, 100, 100, MouseButtons::SCROLL_UP)
        .unwrap();
    terminal
        .send_mouse(1, 100, 100, MouseButtons::empty())
        .unwrap();
    assert_eq!(terminal.view_offset(), 3);

    terminal.send_key(u32::from(b'a'), true).unwrap();
    assert_eq!(terminal.view_offset(), 0);
}

#[test]
fn shift_page_up_scrolls_a_page() {
    let (terminal, _sink) = terminal();
    let (_, rows) = terminal.dimensions();
    for i in 0..rows + 40 {
        terminal.feed_output(format!("line{i}\r\n").as_bytes());
    }

    terminal.send_key(0xFFE1, true).unwrap();
    terminal.send_key(0xFF55, true).unwrap();
    assert_eq!(terminal.view_offset(), rows);

    terminal.send_key(0xFF56, true).unwrap();
    assert_eq!(terminal.view_offset(), 0);
}

#[test]
fn drag_selection_copies_to_clipboard() {
    let sink = SharedSink::default();
    let clipboard = Arc::new(Mutex::new(Clipboard::default()));
    let terminal = Terminal::create(
        TerminalOptions {
            render_thread: false,
            ..TerminalOptions::default()
        },
        Box::new(sink.clone()),
        clipboard.clone(),
    )
    .unwrap();

    terminal.feed_output(b"hello world");
    sink.drain();

    // Press, drag from column 0 to column 4, release
    terminal.send_mouse(1, 1, 1, MouseButtons::LEFT).unwrap();
    terminal.send_mouse(1, 2, 1, MouseButtons::LEFT).unwrap();
    terminal.send_mouse(1, 4 * 8 + 1, 1, MouseButtons::LEFT).unwrap();
    terminal.send_mouse(1, 4 * 8 + 1, 1, MouseButtons::empty()).unwrap();

    assert_eq!(clipboard.lock().data(), b"hello");

    // The clipboard was broadcast as a stream transfer
    let instructions = sink.instructions();
    assert!(instructions.iter().any(|i| matches!(
        i,
        Instruction::Pipe { name, .. } if name == "clipboard"
    )));
    assert!(instructions.iter().any(|i| matches!(
        i,
        Instruction::Blob { data, .. } if data == b"hello"
    )));
    assert!(
        instructions
            .iter()
            .any(|i| matches!(i, Instruction::End { .. }))
    );
}

#[test]
fn double_click_selects_word() {
    let sink = SharedSink::default();
    let clipboard = Arc::new(Mutex::new(Clipboard::default()));
    let terminal = Terminal::create(
        TerminalOptions {
            render_thread: false,
            ..TerminalOptions::default()
        },
        Box::new(sink),
        clipboard.clone(),
    )
    .unwrap();

    terminal.feed_output(b"alpha beta_2 gamma");

    // Double-click on "beta_2" (column 8)
    let x = 8 * 8 + 1;
    terminal.send_mouse(1, x, 1, MouseButtons::LEFT).unwrap();
    terminal.send_mouse(1, x, 1, MouseButtons::empty()).unwrap();
    terminal.send_mouse(1, x, 1, MouseButtons::LEFT).unwrap();
    terminal.send_mouse(1, x, 1, MouseButtons::empty()).unwrap();

    assert_eq!(clipboard.lock().data(), b"beta_2");
}

#[test]
fn triple_click_selects_line() {
    let sink = SharedSink::default();
    let clipboard = Arc::new(Mutex::new(Clipboard::default()));
    let terminal = Terminal::create(
        TerminalOptions {
            render_thread: false,
            ..TerminalOptions::default()
        },
        Box::new(sink),
        clipboard.clone(),
    )
    .unwrap();

    terminal.feed_output(b"whole line here");

    let x = 3 * 8 + 1;
    for _ in 0..3 {
        terminal.send_mouse(1, x, 1, MouseButtons::LEFT).unwrap();
        terminal.send_mouse(1, x, 1, MouseButtons::empty()).unwrap();
    }

    assert_eq!(clipboard.lock().data(), b"whole line here");
}

#[test]
fn pipe_stream_redirects_output() {
    let (terminal, sink) = terminal();
    sink.drain();

    terminal.feed_output(b"\x1B]482202;build-log\x07");
    terminal.feed_output(b"redirected bytes");
    terminal.feed_output(b"\x1B]482203;\x07");

    let instructions = sink.instructions();
    assert!(instructions.iter().any(|i| matches!(
        i,
        Instruction::Pipe { name, .. } if name == "build-log"
    )));
    assert!(instructions.iter().any(|i| matches!(
        i,
        Instruction::Blob { data, .. } if data == b"redirected bytes"
    )));
    assert!(
        instructions
            .iter()
            .any(|i| matches!(i, Instruction::End { .. }))
    );

    // Nothing reached the display grid
    assert_eq!(terminal.row_text(0), "");
}

#[test]
fn download_and_upload_hooks() {
    let (terminal, _sink) = terminal();
    let downloads: Arc<Mutex<Vec<String>>> = Arc::default();
    let uploads: Arc<Mutex<Vec<String>>> = Arc::default();

    {
        let downloads = downloads.clone();
        terminal.set_file_download_handler(Box::new(move |name| {
            downloads.lock().push(name.to_owned());
        }));
    }
    {
        let uploads = uploads.clone();
        terminal.set_upload_path_handler(Box::new(move |path| {
            uploads.lock().push(path.to_owned());
        }));
    }

    terminal.feed_output(b"\x1B]482200;report.pdf\x07");
    terminal.feed_output(b"\x1B]482201;/tmp/uploads\x07");

    assert_eq!(downloads.lock().len(), 1);
    assert_eq!(downloads.lock()[0], "report.pdf");
    assert_eq!(uploads.lock().len(), 1);
    assert_eq!(uploads.lock()[0], "/tmp/uploads");
}

#[test]
fn input_stream_takes_exclusive_input() {
    let (terminal, _sink) = terminal();
    let mut stdin = terminal.stdin_reader();

    assert_eq!(terminal.input_stream_open(StreamId(7)), AckStatus::Success);
    assert_eq!(
        terminal.input_stream_open(StreamId(8)),
        AckStatus::ResourceConflict
    );

    // Keys are dropped while the stream is active
    terminal.send_key(u32::from(b'x'), true).unwrap();

    assert_eq!(
        terminal.input_stream_blob(StreamId(7), b"from stream"),
        AckStatus::Success
    );
    assert_eq!(read_bytes(&mut stdin, 11), b"from stream");

    terminal.input_stream_end(StreamId(7));
    terminal.send_key(u32::from(b'y'), true).unwrap();
    assert_eq!(read_bytes(&mut stdin, 1), b"y");
}

#[test]
fn argv_streams_update_credentials() {
    let (terminal, sink) = terminal();
    sink.drain();

    assert_eq!(
        terminal.argv_stream_open(StreamId(1), "username"),
        AckStatus::Success
    );
    terminal.argv_stream_blob(StreamId(1), b"alice");
    terminal.argv_stream_end(StreamId(1));

    assert_eq!(
        terminal.argv_stream_open(StreamId(2), "password"),
        AckStatus::Success
    );
    terminal.argv_stream_blob(StreamId(2), b"hunter2");
    terminal.argv_stream_end(StreamId(2));

    let credentials =
        terminal.wait_credentials(true, true, std::time::Duration::from_millis(100));
    assert_eq!(credentials.username.as_deref(), Some("alice"));
    assert_eq!(credentials.password.as_deref(), Some("hunter2"));

    // Unknown parameters are refused
    assert_eq!(
        terminal.argv_stream_open(StreamId(3), "hostname"),
        AckStatus::ClientForbidden
    );
    assert!(sink.instructions().iter().any(|i| matches!(
        i,
        Instruction::Ack { status: AckStatus::ClientForbidden, .. }
    )));
}

#[test]
fn frame_flush_is_idempotent() {
    let (terminal, sink) = terminal();
    terminal.feed_output(b"content");
    terminal.flush_frame().unwrap();
    sink.drain();

    terminal.flush_frame().unwrap();
    let instructions = sink.instructions();
    // Nothing but the frame-end marker
    assert_eq!(instructions.len(), 1);
    assert!(matches!(instructions[0], Instruction::Sync { .. }));
}

#[test]
fn flush_emits_glyphs_and_sync() {
    let (terminal, sink) = terminal();
    terminal.feed_output(b"hi there");
    sink.drain();
    terminal.flush_frame().unwrap();

    let instructions = sink.instructions();
    assert!(instructions.iter().any(|i| matches!(
        i,
        Instruction::Glyphs { text, .. } if text.contains("hi there")
    )));
    assert!(matches!(
        instructions.last(),
        Some(Instruction::Sync { .. })
    ));
}

#[test]
fn sync_user_replays_display() {
    let (terminal, _sink) = terminal();
    terminal.feed_output(b"replay me");
    terminal.flush_frame().unwrap();

    let mut joiner = RecordingSink::new();
    terminal.sync_user(&mut joiner).unwrap();

    assert!(joiner.instructions.iter().any(|i| matches!(
        i,
        Instruction::Glyphs { text, .. } if text.contains("replay me")
    )));
    assert!(joiner.instructions.iter().any(|i| matches!(
        i,
        Instruction::Cursor { .. }
    )));
}

#[test]
fn typescript_records_raw_output() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("session");
    {
        let (terminal, _sink) = terminal();
        terminal
            .start_typescript(dir.path(), "session", false, false)
            .unwrap();
        terminal.feed_output(b"recorded \x1B[31mbytes\x1B[0m");
    }

    let contents = std::fs::read(&data_path).unwrap();
    let text = String::from_utf8_lossy(&contents);
    assert!(text.starts_with("[BEGIN TYPESCRIPT]\n"));
    assert!(text.contains("recorded \x1B[31mbytes\x1B[0m"));
    assert!(text.ends_with("\n[END TYPESCRIPT]\n"));
    assert!(dir.path().join("session.timing").exists());
}

#[test]
fn render_thread_flushes_on_its_own() {
    let sink = SharedSink::default();
    let terminal = Terminal::create(
        TerminalOptions {
            render_thread: true,
            ..TerminalOptions::default()
        },
        Box::new(sink.clone()),
        Arc::new(Mutex::new(Clipboard::default())),
    )
    .unwrap();

    terminal.feed_output(b"threaded");
    std::thread::sleep(std::time::Duration::from_millis(200));

    assert!(sink.instructions().iter().any(|i| matches!(
        i,
        Instruction::Sync { .. }
    )));
    drop(terminal);
}

#[test]
fn resize_reports_new_dimensions() {
    let (terminal, _sink) = terminal();
    let (columns, rows) = terminal.dimensions();
    assert_eq!((columns, rows), (80, 24));

    terminal.resize(40 * 8 + 16, 10 * 16);
    assert_eq!(terminal.dimensions(), (40, 10));
}
