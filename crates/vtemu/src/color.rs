//! Terminal colors and the 256-entry palette.

use vtwire::Rgb;

/// Pseudo palette index denoting the session's default foreground color.
/// Colors carrying this index track the theme as it changes.
pub const DEFAULT_FOREGROUND_INDEX: i16 = -2;

/// Pseudo palette index denoting the session's default background color.
pub const DEFAULT_BACKGROUND_INDEX: i16 = -3;

/// The palette index of black.
pub(crate) const COLOR_BLACK: i16 = 0;

/// The palette index of low-intensity white (gray).
pub(crate) const COLOR_GRAY: i16 = 7;

/// The first and last low-intensity indices of the 16-color block, and the
/// offset from a dark color to its intense counterpart.
pub(crate) const FIRST_DARK: i16 = 0;
pub(crate) const LAST_DARK: i16 = 7;
pub(crate) const INTENSE_OFFSET: i16 = 8;

/// An RGB color, optionally tied to a palette slot.
///
/// `palette_index` records where the color came from: a slot in the
/// 256-color palette, one of the default-foreground/background
/// pseudo-indices, or `-1` for a color specified directly as RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub palette_index: i16,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    /// A color specified directly as RGB, not tied to any palette slot.
    #[must_use]
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            palette_index: -1,
            red,
            green,
            blue,
        }
    }

    #[must_use]
    pub const fn indexed(palette_index: i16, red: u8, green: u8, blue: u8) -> Self {
        Self {
            palette_index,
            red,
            green,
            blue,
        }
    }

    /// Approximate luminance on a 0-255 scale.
    ///
    /// Y = 0.2126 R + 0.7152 G + 0.0722 B, with all coefficients scaled by
    /// 16 so the computation stays in integers.
    #[must_use]
    pub fn luminance(&self) -> i32 {
        (3 * i32::from(self.red) + 12 * i32::from(self.green) + i32::from(self.blue)) / 16
    }

    /// Whether two colors have the same RGB value, regardless of the
    /// palette slot they came from.
    #[must_use]
    pub fn same_rgb(&self, other: &Color) -> bool {
        self.red == other.red && self.green == other.green && self.blue == other.blue
    }

    #[must_use]
    pub(crate) fn to_wire(self) -> Rgb {
        Rgb::new(self.red, self.green, self.blue)
    }
}

/// The 16 base colors: dark 0-7 followed by their intense counterparts.
const BASE_PALETTE: [Color; 16] = [
    Color::indexed(0, 0x00, 0x00, 0x00),  // black
    Color::indexed(1, 0x99, 0x3E, 0x3E),  // red
    Color::indexed(2, 0x3E, 0x99, 0x3E),  // green
    Color::indexed(3, 0x99, 0x99, 0x3E),  // brown
    Color::indexed(4, 0x3E, 0x3E, 0x99),  // blue
    Color::indexed(5, 0x99, 0x3E, 0x99),  // magenta
    Color::indexed(6, 0x3E, 0x99, 0x99),  // cyan
    Color::indexed(7, 0x99, 0x99, 0x99),  // white
    Color::indexed(8, 0x3E, 0x3E, 0x3E),  // intense black
    Color::indexed(9, 0xFF, 0x67, 0x67),  // intense red
    Color::indexed(10, 0x67, 0xFF, 0x67), // intense green
    Color::indexed(11, 0xFF, 0xFF, 0x67), // intense brown
    Color::indexed(12, 0x67, 0x67, 0xFF), // intense blue
    Color::indexed(13, 0xFF, 0x67, 0xFF), // intense magenta
    Color::indexed(14, 0x67, 0xFF, 0xFF), // intense cyan
    Color::indexed(15, 0xFF, 0xFF, 0xFF), // intense white
];

/// The initial 256-color palette: the 16 base colors, the xterm 6x6x6 color
/// cube, and the 24-step greyscale ramp.
#[must_use]
pub const fn initial_palette() -> [Color; 256] {
    let mut palette = [Color::indexed(0, 0, 0, 0); 256];

    let mut i = 0;
    while i < 16 {
        palette[i] = BASE_PALETTE[i];
        i += 1;
    }

    // 6x6x6 color cube: component n maps to 0 or 55 + 40n
    let mut r = 0;
    while r < 6 {
        let mut g = 0;
        while g < 6 {
            let mut b = 0;
            while b < 6 {
                let index = 16 + 36 * r + 6 * g + b;
                palette[index] = Color::indexed(
                    index as i16,
                    cube_level(r),
                    cube_level(g),
                    cube_level(b),
                );
                b += 1;
            }
            g += 1;
        }
        r += 1;
    }

    // Greyscale ramp from 8 to 238 in steps of 10
    let mut grey = 0;
    while grey < 24 {
        let index = 232 + grey;
        let level = (8 + grey * 10) as u8;
        palette[index] = Color::indexed(index as i16, level, level, level);
        grey += 1;
    }

    palette
}

const fn cube_level(component: usize) -> u8 {
    if component == 0 {
        0
    } else {
        (55 + component * 40) as u8
    }
}

/// A mutable 256-entry palette plus the session's default foreground and
/// background colors.
#[derive(Debug, Clone)]
pub struct Palette {
    entries: [Color; 256],
    initial: [Color; 256],
    default_foreground: Color,
    default_background: Color,
}

impl Palette {
    #[must_use]
    pub fn new(
        entries: [Color; 256],
        default_foreground: Color,
        default_background: Color,
    ) -> Self {
        Self {
            entries,
            initial: entries,
            default_foreground,
            default_background,
        }
    }

    /// Resolve a palette index to a color. Pseudo-indices resolve to the
    /// session defaults; out-of-range indices resolve to `None`.
    #[must_use]
    pub fn lookup(&self, index: i16) -> Option<Color> {
        match index {
            DEFAULT_FOREGROUND_INDEX => Some(self.default_foreground),
            DEFAULT_BACKGROUND_INDEX => Some(self.default_background),
            0..=255 => Some(self.entries[index as usize]),
            _ => None,
        }
    }

    /// Refresh a color from the palette slot it is tied to, leaving
    /// RGB-only colors untouched.
    #[must_use]
    pub fn resolve(&self, color: Color) -> Color {
        match self.lookup(color.palette_index) {
            Some(mut resolved) => {
                resolved.palette_index = color.palette_index;
                resolved
            }
            None => color,
        }
    }

    /// Redefine a palette slot (xterm OSC 4). Out-of-range indices fail.
    pub fn assign(&mut self, index: i32, color: Color) -> bool {
        if !(0..=255).contains(&index) {
            return false;
        }
        let slot = &mut self.entries[index as usize];
        slot.red = color.red;
        slot.green = color.green;
        slot.blue = color.blue;
        true
    }

    /// Restore every slot to its initial value.
    pub fn reset(&mut self) {
        self.entries = self.initial;
    }

    #[must_use]
    pub fn default_foreground(&self) -> Color {
        self.default_foreground
    }

    #[must_use]
    pub fn default_background(&self) -> Color {
        self.default_background
    }

    pub fn set_defaults(&mut self, foreground: Color, background: Color) {
        self.default_foreground = foreground;
        self.default_background = background;
    }
}

impl Default for Palette {
    fn default() -> Self {
        let entries = initial_palette();
        let mut foreground = entries[COLOR_GRAY as usize];
        foreground.palette_index = DEFAULT_FOREGROUND_INDEX;
        let mut background = entries[COLOR_BLACK as usize];
        background.palette_index = DEFAULT_BACKGROUND_INDEX;
        Self::new(entries, foreground, background)
    }
}
