//! X11 color specification parsing.
//!
//! This crate parses the subset of `XParseColor()` specifications used by
//! terminal color configuration and xterm OSC palette sequences, producing
//! 8-bit RGB components.
//!
//! # Supported Specifications
//!
//! - **RGB Device** (`rgb:`) with 1 to 4 hex digits per component:
//!   - `rgb:H/H/H` — 4-bit components, zero-extended to 8-bit
//!   - `rgb:HH/HH/HH` — 8-bit components, used as-is
//!   - `rgb:HHH/HHH/HHH` — 12-bit components, truncated to the high 8 bits
//!   - `rgb:HHHH/HHHH/HHHH` — 16-bit components, truncated to the high 8 bits
//! - **Named Colors** from X11 `rgb.txt` (case-insensitive, spaces
//!   optional): `red`, `DarkSlateGray`, `dark slate gray`, …
//!
//! # Examples
//!
//! ```
//! use xparsecolor::XColor;
//!
//! let color: XColor = "rgb:ff/80/00".parse().unwrap();
//! assert_eq!(color, XColor::new(0xFF, 0x80, 0x00));
//!
//! let color: XColor = "dark slate gray".parse().unwrap();
//! assert_eq!(color, XColor::new(0x2F, 0x4F, 0x4F));
//! ```

#![warn(clippy::pedantic)]

use std::fmt;
use std::str::FromStr;

mod named_colors;

pub use named_colors::{NAMED_COLOR_COUNT, lookup_named_color};

/// Parse error with byte offset information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The input is empty.
    Empty,
    /// The input is neither an `rgb:` specification nor a known color name.
    UnknownColor,
    /// Invalid hex digit at the given offset.
    InvalidHex { offset: usize },
    /// A component has no digits, or a `/` separator is missing.
    MissingComponent,
    /// Trailing bytes follow the final component.
    TrailingData { offset: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty color specification"),
            ParseError::UnknownColor => write!(f, "unknown color"),
            ParseError::InvalidHex { offset } => {
                write!(f, "invalid hex value at offset {offset}")
            }
            ParseError::MissingComponent => {
                write!(f, "missing color component")
            }
            ParseError::TrailingData { offset } => {
                write!(f, "unexpected trailing data at offset {offset}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// An 8-bit RGB color parsed from an X11 color specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XColor {
    /// Red component (0-255).
    pub red: u8,
    /// Green component (0-255).
    pub green: u8,
    /// Blue component (0-255).
    pub blue: u8,
}

impl XColor {
    /// Create a color from 8-bit components.
    #[must_use]
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Parse a color specification from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] describing why the specification could not
    /// be parsed.
    pub fn try_from_bytes(input: &[u8]) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty);
        }

        if let Some(rest) = input.strip_prefix(b"rgb:") {
            parse_rgb_device(rest)
        } else {
            parse_named(input)
        }
    }
}

impl fmt::Display for XColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb:{:02x}/{:02x}/{:02x}", self.red, self.green, self.blue)
    }
}

impl TryFrom<&[u8]> for XColor {
    type Error = ParseError;

    #[inline]
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from_bytes(value)
    }
}

impl FromStr for XColor {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from_bytes(s.as_bytes())
    }
}

/// Hex digit lookup table: maps ASCII byte to its value (0-15), or 0xFF if
/// invalid.
const HEX_DECODE: [u8; 256] = {
    let mut table = [0xFFu8; 256];
    let mut i = 0u8;
    while i < 10 {
        table[(b'0' + i) as usize] = i;
        i += 1;
    }
    let mut i = 0u8;
    while i < 6 {
        table[(b'a' + i) as usize] = 10 + i;
        table[(b'A' + i) as usize] = 10 + i;
        i += 1;
    }
    table
};

/// Parse a single hex digit from a byte.
#[inline(always)]
fn hex_digit(b: u8) -> Option<u16> {
    let v = HEX_DECODE[b as usize];
    if v == 0xFF { None } else { Some(u16::from(v)) }
}

/// Parse 1-4 hex digits, returning the 8-bit normalized component and the
/// number of bytes consumed. Stops at `/` or end of input.
///
/// Normalization follows `XParseColor()` as interpreted with 8-bit output:
/// one digit is zero-extended (`f` → `f0`), two digits are exact, and
/// three or four digits keep only the high 8 bits.
fn parse_component(input: &[u8], offset: usize) -> Result<(u8, usize), ParseError> {
    let mut value: u16 = 0;
    let mut count = 0usize;

    for (i, &b) in input.iter().enumerate() {
        if b == b'/' || i >= 4 {
            break;
        }
        let digit = hex_digit(b).ok_or(ParseError::InvalidHex { offset: offset + i })?;
        value = (value << 4) | digit;
        count += 1;
    }

    if count == 0 {
        return Err(ParseError::MissingComponent);
    }

    #[allow(clippy::cast_possible_truncation)]
    let scaled = match count {
        1 => (value << 4) as u8,
        2 => value as u8,
        3 => (value >> 4) as u8,
        4 => (value >> 8) as u8,
        _ => unreachable!(),
    };

    Ok((scaled, count))
}

/// Parse the `r/g/b` remainder of an `rgb:` specification.
fn parse_rgb_device(input: &[u8]) -> Result<XColor, ParseError> {
    let (red, r_len) = parse_component(input, 4)?;

    let rest = &input[r_len..];
    if rest.first() != Some(&b'/') {
        return Err(ParseError::MissingComponent);
    }

    let (green, g_len) = parse_component(&rest[1..], 4 + r_len + 1)?;

    let rest = &rest[1 + g_len..];
    if rest.first() != Some(&b'/') {
        return Err(ParseError::MissingComponent);
    }

    let (blue, b_len) = parse_component(&rest[1..], 4 + r_len + 1 + g_len + 1)?;

    let rest = &rest[1 + b_len..];
    if !rest.is_empty() {
        return Err(ParseError::TrailingData {
            offset: input.len() - rest.len() + 4,
        });
    }

    Ok(XColor { red, green, blue })
}

/// Parse a named color.
fn parse_named(input: &[u8]) -> Result<XColor, ParseError> {
    // Try direct lookup first (no allocation)
    if let Some((r, g, b)) = named_colors::lookup_normalized(input) {
        return Ok(XColor::new(r, g, b));
    }

    // Normalize (lowercase, remove whitespace) and try again
    let normalized: Vec<u8> = input
        .iter()
        .filter(|&&b| !b.is_ascii_whitespace())
        .map(u8::to_ascii_lowercase)
        .collect();

    named_colors::lookup_normalized(&normalized)
        .map(|(r, g, b)| XColor::new(r, g, b))
        .ok_or(ParseError::UnknownColor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rgb_two_digit() {
        let color = XColor::try_from_bytes(b"rgb:ff/80/00").unwrap();
        assert_eq!(color, XColor::new(0xFF, 0x80, 0x00));
    }

    #[test]
    fn test_rgb_one_digit_zero_extends() {
        let color = XColor::try_from_bytes(b"rgb:f/8/0").unwrap();
        assert_eq!(color, XColor::new(0xF0, 0x80, 0x00));
    }

    #[test]
    fn test_rgb_three_digit_truncates() {
        let color = XColor::try_from_bytes(b"rgb:fff/888/000").unwrap();
        assert_eq!(color, XColor::new(0xFF, 0x88, 0x00));
    }

    #[test]
    fn test_rgb_four_digit_truncates() {
        let color = XColor::try_from_bytes(b"rgb:ffff/8080/0000").unwrap();
        assert_eq!(color, XColor::new(0xFF, 0x80, 0x00));
    }

    #[test]
    fn test_rgb_mixed_widths() {
        // XParseColor permits components of differing widths
        let color = XColor::try_from_bytes(b"rgb:f/80/0000").unwrap();
        assert_eq!(color, XColor::new(0xF0, 0x80, 0x00));
    }

    #[test]
    fn test_rgb_invalid_hex() {
        let result = XColor::try_from_bytes(b"rgb:gg/00/00");
        assert!(matches!(result, Err(ParseError::InvalidHex { offset: 4 })));
    }

    #[test]
    fn test_rgb_missing_component() {
        assert!(matches!(
            XColor::try_from_bytes(b"rgb:ff/80"),
            Err(ParseError::MissingComponent)
        ));
        assert!(matches!(
            XColor::try_from_bytes(b"rgb:ff//80"),
            Err(ParseError::MissingComponent)
        ));
    }

    #[test]
    fn test_rgb_trailing_data() {
        assert!(matches!(
            XColor::try_from_bytes(b"rgb:ff/80/00/12"),
            Err(ParseError::TrailingData { .. })
        ));
    }

    #[test]
    fn test_five_digit_component_rejected() {
        // A fifth digit is not silently consumed
        assert!(matches!(
            XColor::try_from_bytes(b"rgb:fffff/0/0"),
            Err(ParseError::MissingComponent)
        ));
    }

    #[test]
    fn test_named_color_simple() {
        assert_eq!(
            XColor::try_from_bytes(b"red").unwrap(),
            XColor::new(0xFF, 0x00, 0x00)
        );
        assert_eq!(
            XColor::try_from_bytes(b"white").unwrap(),
            XColor::new(0xFF, 0xFF, 0xFF)
        );
        assert_eq!(
            XColor::try_from_bytes(b"black").unwrap(),
            XColor::new(0x00, 0x00, 0x00)
        );
    }

    #[test]
    fn test_named_color_case_insensitive() {
        let lower: XColor = "red".parse().unwrap();
        let upper: XColor = "RED".parse().unwrap();
        let mixed: XColor = "ReD".parse().unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower, mixed);
    }

    #[test]
    fn test_named_color_with_spaces() {
        let with_spaces: XColor = "dark slate gray".parse().unwrap();
        let no_spaces: XColor = "darkslategray".parse().unwrap();
        let camel: XColor = "DarkSlateGray".parse().unwrap();
        assert_eq!(with_spaces, no_spaces);
        assert_eq!(with_spaces, camel);
    }

    #[test]
    fn test_named_color_lookup_function() {
        assert_eq!(lookup_named_color("snow"), Some((255, 250, 250)));
        assert_eq!(lookup_named_color("SNOW"), Some((255, 250, 250)));
        assert_eq!(lookup_named_color("notacolor"), None);
    }

    #[test]
    fn test_named_color_count() {
        const { assert!(NAMED_COLOR_COUNT > 100) };
    }

    #[test]
    fn test_unknown_color_error() {
        let result: Result<XColor, _> = "not_a_valid_color_name".parse();
        assert!(matches!(result, Err(ParseError::UnknownColor)));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            XColor::try_from_bytes(b""),
            Err(ParseError::Empty)
        ));
    }

    #[test]
    fn test_display_round_trip() {
        let color = XColor::new(0xFF, 0x80, 0x00);
        assert_eq!(color.to_string(), "rgb:ff/80/00");
        let parsed: XColor = color.to_string().parse().unwrap();
        assert_eq!(color, parsed);
    }
}
