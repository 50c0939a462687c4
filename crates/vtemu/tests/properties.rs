//! Cross-cutting invariants: continuation cells, UTF-8 round trips,
//! resize and scroll reversibility.

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use vtemu::{CONTINUATION, Clipboard, MouseButtons, Terminal, TerminalOptions};
use vtwire::NullSink;

fn terminal() -> Terminal {
    Terminal::create(
        TerminalOptions {
            render_thread: false,
            ..TerminalOptions::default()
        },
        Box::new(NullSink),
        Arc::new(Mutex::new(Clipboard::default())),
    )
    .unwrap()
}

/// Every wide character must own exactly its continuation cells, and every
/// continuation cell must have an owner whose width covers it.
fn assert_continuation_invariant(terminal: &Terminal) {
    let (columns, rows) = terminal.dimensions();
    for row in 0..rows {
        let mut col = 0;
        while col < columns {
            let Some(cell) = terminal.cell_at(row, col) else {
                break;
            };
            assert_ne!(
                cell.value, CONTINUATION,
                "row {row} col {col}: continuation cell without an owner"
            );

            let width = i32::from(cell.width.max(1));
            for offset in 1..width {
                if col + offset >= columns {
                    break;
                }
                let trailing = terminal.cell_at(row, col + offset).unwrap();
                assert_eq!(
                    trailing.value, CONTINUATION,
                    "row {row} col {}: missing continuation",
                    col + offset
                );
            }
            col += width;
        }
    }
}

fn visible_text(terminal: &Terminal) -> Vec<String> {
    let (_, rows) = terminal.dimensions();
    (0..rows).map(|row| terminal.row_text(row)).collect()
}

#[test]
fn continuation_invariant_survives_mixed_writes() {
    let terminal = terminal();

    terminal.feed_output("wide 漢字 and narrow text\r\n".as_bytes());
    // Overwrite halves of wide characters from both sides
    terminal.feed_output("漢漢漢\x1B[1;2Hx".as_bytes());
    terminal.feed_output("\x1B[2;2H漢\x1B[2;3Hy".as_bytes());
    // Shift through a wide character
    terminal.feed_output("\x1B[3;1H漢ab\x1B[3;1H\x1B[2@".as_bytes());
    terminal.feed_output("\x1B[3;1H\x1B[1P".as_bytes());

    assert_continuation_invariant(&terminal);
}

#[test]
fn continuation_invariant_survives_insert_mode() {
    let terminal = terminal();
    terminal.feed_output("漢漢\x1B[4h\x1B[1;1Hz".as_bytes());
    assert_continuation_invariant(&terminal);
}

#[test]
fn utf8_round_trip() {
    let terminal = terminal();
    let input = "héllo wörld £ π ≠";
    terminal.feed_output(input.as_bytes());
    assert_eq!(terminal.row_text(0), input);
}

#[test]
fn utf8_wide_round_trip() {
    let terminal = terminal();
    let input = "漢字テスト";
    terminal.feed_output(input.as_bytes());
    assert_eq!(terminal.row_text(0), input);
}

#[test]
fn utf8_split_across_feeds() {
    let terminal = terminal();
    let bytes = "é".as_bytes();
    terminal.feed_output(&bytes[..1]);
    terminal.feed_output(&bytes[1..]);
    assert_eq!(terminal.row_text(0), "é");
}

#[test]
fn invalid_utf8_degrades_to_question_mark() {
    let terminal = terminal();
    terminal.feed_output(&[0xFE, b'k']);
    assert_eq!(terminal.row_text(0), "?k");
}

#[test]
fn resize_round_trip_preserves_content() {
    let terminal = terminal();
    terminal.feed_output(b"first line\r\nsecond line\r\nthird");

    let before = visible_text(&terminal);
    let char_width = 8;
    let char_height = 16;

    terminal.resize(60 * char_width + 16, 20 * char_height);
    terminal.resize(70 * char_width + 16, 28 * char_height);
    terminal.resize(80 * char_width + 16, 24 * char_height);

    assert_eq!(visible_text(&terminal), before);
    assert_continuation_invariant(&terminal);
}

#[test]
fn height_shrink_moves_rows_to_scrollback() {
    let terminal = terminal();
    let (_, rows) = terminal.dimensions();
    for i in 0..rows {
        terminal.feed_output(format!("row{i}\r\n").as_bytes());
    }

    terminal.resize(80 * 8 + 16, 12 * 16);
    // The top rows are now scrollback, addressable at negative indices
    assert!(terminal.row_text(-1).starts_with("row"));

    terminal.resize(80 * 8 + 16, 24 * 16);
    assert_eq!(terminal.dimensions(), (80, 24));
}

#[test]
fn view_scroll_round_trip_is_a_noop() {
    let terminal = terminal();
    for i in 0..40 {
        terminal.feed_output(format!("scroll{i}\r\n").as_bytes());
    }

    let before = visible_text(&terminal);

    // Wheel up then down by the same amount
    for _ in 0..2 {
        terminal
            .send_mouse(1, 100, 100, MouseButtons::SCROLL_UP)
            .unwrap();
        terminal
            .send_mouse(1, 100, 100, MouseButtons::empty())
            .unwrap();
    }
    assert_eq!(terminal.view_offset(), 6);

    for _ in 0..2 {
        terminal
            .send_mouse(1, 100, 100, MouseButtons::SCROLL_DOWN)
            .unwrap();
        terminal
            .send_mouse(1, 100, 100, MouseButtons::empty())
            .unwrap();
    }

    assert_eq!(terminal.view_offset(), 0);
    assert_eq!(visible_text(&terminal), before);
}

#[test]
fn scrollback_is_bounded_by_setting() {
    let terminal = terminal();
    terminal.set_scrollback_size(30);
    for i in 0..100 {
        terminal.feed_output(format!("bounded{i}\r\n").as_bytes());
    }

    // Scrolling stops once the configured scrollback is exhausted
    for _ in 0..100 {
        terminal
            .send_mouse(1, 100, 100, MouseButtons::SCROLL_UP)
            .unwrap();
        terminal
            .send_mouse(1, 100, 100, MouseButtons::empty())
            .unwrap();
    }
    let (_, rows) = terminal.dimensions();
    assert_eq!(terminal.view_offset(), 30 - rows);
}

#[test]
fn cursor_stays_within_bounds() {
    let terminal = terminal();
    terminal.feed_output(b"\x1B[999;999H");
    assert_eq!(terminal.cursor_position(), (23, 79));

    terminal.feed_output(b"\x1B[0;0H");
    assert_eq!(terminal.cursor_position(), (0, 0));

    // Backspace at the left edge does not wrap
    terminal.feed_output(b"\x08\x08");
    assert_eq!(terminal.cursor_position(), (0, 0));
}

#[test]
fn full_reset_restores_power_on_state() {
    let terminal = terminal();
    terminal.feed_output(b"\x1B[31m\x1B[4hstyled\x1B[5;5H");
    terminal.feed_output(b"\x1Bc");

    assert_eq!(terminal.cursor_position(), (0, 0));
    assert_eq!(terminal.row_text(0), "");
    terminal.feed_output(b"plain");
    let cell = terminal.cell_at(0, 0).unwrap();
    assert_eq!(cell.attributes.foreground.palette_index, -2);
    assert!(!cell.attributes.bold);
}

#[test]
fn linefeed_at_display_bottom_scrolls_into_history() {
    let terminal = terminal();
    let (_, rows) = terminal.dimensions();

    for i in 0..rows + 5 {
        terminal.feed_output(format!("history{i}\r\n").as_bytes());
    }

    // The first rows are reachable as negative indices
    assert_eq!(terminal.row_text(-(5 + 1)), "history0");
    assert!(terminal.history_len() > rows as usize);
}

#[test]
fn wrapped_rows_carry_the_wrap_flag() {
    let terminal = terminal();
    let long_line = "x".repeat(100);
    terminal.feed_output(long_line.as_bytes());

    assert!(terminal.row_wrapped(0));
    assert!(!terminal.row_wrapped(1));
    assert_eq!(terminal.row_text(1), "x".repeat(20));
}
