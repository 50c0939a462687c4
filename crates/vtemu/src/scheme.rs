//! Color scheme parsing.
//!
//! A scheme is either one of the stock names (`gray-black`, `black-white`,
//! `green-black`, `white-black`) or a semicolon-separated list of
//! `name: value` pairs where `name` is `foreground`, `background` or
//! `colorN` (N in 0..=255) and `value` is `colorN` or an X11 color
//! specification.

use tracing::warn;
use xparsecolor::XColor;

use crate::color::{
    Color, DEFAULT_BACKGROUND_INDEX, DEFAULT_FOREGROUND_INDEX, initial_palette,
};

/// The color configuration produced by parsing a scheme specifier.
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub foreground: Color,
    pub background: Color,
    pub palette: [Color; 256],
}

impl Default for ColorScheme {
    fn default() -> Self {
        parse_color_scheme("")
    }
}

/// The color that a scheme name refers to.
enum SchemeTarget {
    Foreground,
    Background,
    Palette(usize),
}

/// Parse `colorN`, returning the palette index.
fn parse_color_index(token: &str) -> Option<usize> {
    let digits = token.strip_prefix("color")?;
    let index: usize = digits.parse().ok()?;
    (index <= 255).then_some(index)
}

fn parse_name(name: &str) -> Option<SchemeTarget> {
    match name {
        "foreground" => Some(SchemeTarget::Foreground),
        "background" => Some(SchemeTarget::Background),
        _ => parse_color_index(name).map(SchemeTarget::Palette),
    }
}

fn parse_value(value: &str, palette: &[Color; 256]) -> Option<Color> {
    if let Some(index) = parse_color_index(value) {
        return Some(palette[index]);
    }

    match value.parse::<XColor>() {
        Ok(parsed) => Some(Color::rgb(parsed.red, parsed.green, parsed.blue)),
        Err(_) => None,
    }
}

/// Parse a color scheme specifier.
///
/// Invalid input warns and leaves the remainder of the configuration at the
/// gray-black defaults, mirroring how an interactive gateway treats a bad
/// connection parameter.
#[must_use]
pub fn parse_color_scheme(scheme: &str) -> ColorScheme {
    // Stock names rewrite to the equivalent pair list
    let scheme = match scheme {
        "" => "",
        "gray-black" => "foreground:color7;background:color0",
        "black-white" => "foreground:color0;background:color15",
        "green-black" => "foreground:color2;background:color0",
        "white-black" => "foreground:color15;background:color0",
        other => other,
    };

    // Gray-black defaults and the initial palette
    let mut palette = initial_palette();
    let mut foreground = palette[7];
    let mut background = palette[0];

    for pair in scheme.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            // Allow empty pairs, which happens when the configuration
            // string ends in a semicolon
            continue;
        }

        let Some((name, value)) = pair.split_once(':') else {
            warn!(pair, "color scheme entry has no colon; ignoring remainder");
            break;
        };

        let name = name.trim();
        let value = value.trim();

        let Some(target) = parse_name(name) else {
            warn!(name, "unknown color name in scheme; ignoring remainder");
            break;
        };

        let Some(color) = parse_value(value, &palette) else {
            warn!(value, "invalid color value in scheme; ignoring remainder");
            break;
        };

        match target {
            SchemeTarget::Foreground => foreground = color,
            SchemeTarget::Background => background = color,
            SchemeTarget::Palette(index) => {
                let mut entry = color;
                entry.palette_index = index as i16;
                palette[index] = entry;
            }
        }
    }

    // The defaults are referenced through their pseudo-indices so cells
    // track later theme changes
    foreground.palette_index = DEFAULT_FOREGROUND_INDEX;
    background.palette_index = DEFAULT_BACKGROUND_INDEX;

    ColorScheme {
        foreground,
        background,
        palette,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rgb_of(color: Color) -> (u8, u8, u8) {
        (color.red, color.green, color.blue)
    }

    #[test]
    fn empty_scheme_is_gray_black() {
        let scheme = parse_color_scheme("");
        assert_eq!(rgb_of(scheme.foreground), (0x99, 0x99, 0x99));
        assert_eq!(rgb_of(scheme.background), (0x00, 0x00, 0x00));
        assert_eq!(scheme.foreground.palette_index, DEFAULT_FOREGROUND_INDEX);
        assert_eq!(scheme.background.palette_index, DEFAULT_BACKGROUND_INDEX);
    }

    #[test]
    fn stock_names() {
        let scheme = parse_color_scheme("green-black");
        assert_eq!(rgb_of(scheme.foreground), (0x3E, 0x99, 0x3E));

        let scheme = parse_color_scheme("black-white");
        assert_eq!(rgb_of(scheme.foreground), (0x00, 0x00, 0x00));
        assert_eq!(rgb_of(scheme.background), (0xFF, 0xFF, 0xFF));
    }

    #[test]
    fn explicit_pairs() {
        let scheme = parse_color_scheme("foreground: rgb:ff/80/00; background: color4");
        assert_eq!(rgb_of(scheme.foreground), (0xFF, 0x80, 0x00));
        assert_eq!(rgb_of(scheme.background), (0x3E, 0x3E, 0x99));
    }

    #[test]
    fn palette_redefinition() {
        let scheme = parse_color_scheme("color1: rgb:12/34/56");
        assert_eq!(rgb_of(scheme.palette[1]), (0x12, 0x34, 0x56));
        assert_eq!(scheme.palette[1].palette_index, 1);
    }

    #[test]
    fn named_color_value() {
        let scheme = parse_color_scheme("background: dark slate gray");
        assert_eq!(rgb_of(scheme.background), (0x2F, 0x4F, 0x4F));
    }

    #[test]
    fn trailing_semicolon_allowed() {
        let scheme = parse_color_scheme("foreground:color7;");
        assert_eq!(rgb_of(scheme.foreground), (0x99, 0x99, 0x99));
    }

    #[test]
    fn invalid_scheme_falls_back() {
        let scheme = parse_color_scheme("no-such-scheme");
        // Fallback leaves the gray-black defaults intact
        assert_eq!(rgb_of(scheme.foreground), (0x99, 0x99, 0x99));
        assert_eq!(rgb_of(scheme.background), (0x00, 0x00, 0x00));
    }

    #[test]
    fn invalid_value_stops_parsing() {
        let scheme = parse_color_scheme("background:color15;foreground:bogus;color1:color2");
        // background was applied before the failure, color1 was not
        assert_eq!(rgb_of(scheme.background), (0xFF, 0xFF, 0xFF));
        assert_eq!(rgb_of(scheme.palette[1]), (0x99, 0x3E, 0x3E));
    }

    #[test]
    fn color_index_out_of_range() {
        let scheme = parse_color_scheme("color256: rgb:ff/ff/ff");
        assert_eq!(rgb_of(scheme.foreground), (0x99, 0x99, 0x99));
    }
}
