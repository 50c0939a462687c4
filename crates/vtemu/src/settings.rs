//! Session settings accepted at connection time.
//!
//! Values arrive as string key/value pairs from the gateway's connection
//! parameters. Out-of-range or malformed values warn and revert to the
//! documented defaults; unknown keys warn and are ignored.

use tracing::warn;

/// Color depth of the remote framebuffer, in bits per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorDepth {
    Depth8,
    Depth16,
    #[default]
    Depth24,
    Depth32,
}

/// Whether the pointer is rendered remotely or locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorMode {
    Remote,
    #[default]
    Local,
}

/// Character encoding used for clipboard data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipboardEncoding {
    #[default]
    Iso8859_1,
    Utf8,
    Utf16,
    Cp1252,
}

/// Parsed session settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub hostname: String,
    pub port: u16,
    pub read_only: bool,
    /// Encoding list forwarded verbatim to VNC clients.
    pub encodings: Option<String>,
    pub password: Option<String>,
    pub swap_red_blue: bool,
    pub color_depth: ColorDepth,
    pub cursor: CursorMode,
    /// Number of connection retries before giving up.
    pub autoretry: u32,
    pub clipboard_encoding: ClipboardEncoding,
    pub recording_path: Option<String>,
    pub recording_name: String,
    pub create_recording_path: bool,
    pub disable_copy: bool,
    pub disable_paste: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            port: 5900,
            read_only: false,
            encodings: None,
            password: None,
            swap_red_blue: false,
            color_depth: ColorDepth::default(),
            cursor: CursorMode::default(),
            autoretry: 0,
            clipboard_encoding: ClipboardEncoding::default(),
            recording_path: None,
            recording_name: String::from("recording"),
            create_recording_path: false,
            disable_copy: false,
            disable_paste: false,
        }
    }
}

fn parse_bool(key: &str, value: &str, default: bool) -> bool {
    match value {
        "true" => true,
        "false" => false,
        _ => {
            warn!(key, value, "expected \"true\" or \"false\"; using default");
            default
        }
    }
}

impl Settings {
    /// Parse settings from key/value pairs.
    pub fn parse<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut settings = Self::default();

        for (key, value) in pairs {
            match key {
                "hostname" => settings.hostname = value.to_owned(),
                "port" => match value.parse() {
                    Ok(port) => settings.port = port,
                    Err(_) => {
                        warn!(value, "invalid port; using default 5900");
                    }
                },
                "read-only" => {
                    settings.read_only = parse_bool(key, value, false);
                }
                "encodings" => settings.encodings = Some(value.to_owned()),
                "password" => settings.password = Some(value.to_owned()),
                "swap-red-blue" => {
                    settings.swap_red_blue = parse_bool(key, value, false);
                }
                "color-depth" => {
                    settings.color_depth = match value {
                        "8" => ColorDepth::Depth8,
                        "16" => ColorDepth::Depth16,
                        "24" => ColorDepth::Depth24,
                        "32" => ColorDepth::Depth32,
                        _ => {
                            warn!(value, "unsupported color depth; using 24");
                            ColorDepth::Depth24
                        }
                    };
                }
                "cursor" => {
                    settings.cursor = match value {
                        "remote" => CursorMode::Remote,
                        "local" => CursorMode::Local,
                        _ => {
                            warn!(value, "unknown cursor mode; using local");
                            CursorMode::Local
                        }
                    };
                }
                "autoretry" => match value.parse() {
                    Ok(count) => settings.autoretry = count,
                    Err(_) => {
                        warn!(value, "invalid autoretry count; using 0");
                    }
                },
                "clipboard-encoding" => {
                    settings.clipboard_encoding = match value {
                        "ISO8859-1" => ClipboardEncoding::Iso8859_1,
                        "UTF-8" => ClipboardEncoding::Utf8,
                        "UTF-16" => ClipboardEncoding::Utf16,
                        "CP1252" => ClipboardEncoding::Cp1252,
                        _ => {
                            warn!(value, "unknown clipboard encoding; using ISO8859-1");
                            ClipboardEncoding::Iso8859_1
                        }
                    };
                }
                "recording-path" => settings.recording_path = Some(value.to_owned()),
                "recording-name" => settings.recording_name = value.to_owned(),
                "create-recording-path" => {
                    settings.create_recording_path = parse_bool(key, value, false);
                }
                "disable-copy" => {
                    settings.disable_copy = parse_bool(key, value, false);
                }
                "disable-paste" => {
                    settings.disable_paste = parse_bool(key, value, false);
                }
                _ => {
                    warn!(key, "unknown setting; ignoring");
                }
            }
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.port, 5900);
        assert_eq!(settings.color_depth, ColorDepth::Depth24);
        assert_eq!(settings.cursor, CursorMode::Local);
        assert_eq!(settings.clipboard_encoding, ClipboardEncoding::Iso8859_1);
        assert_eq!(settings.recording_name, "recording");
        assert!(!settings.disable_copy);
    }

    #[test]
    fn parse_valid_pairs() {
        let settings = Settings::parse([
            ("hostname", "db.internal"),
            ("port", "5901"),
            ("color-depth", "16"),
            ("cursor", "remote"),
            ("clipboard-encoding", "UTF-8"),
            ("disable-copy", "true"),
            ("autoretry", "3"),
        ]);
        assert_eq!(settings.hostname, "db.internal");
        assert_eq!(settings.port, 5901);
        assert_eq!(settings.color_depth, ColorDepth::Depth16);
        assert_eq!(settings.cursor, CursorMode::Remote);
        assert_eq!(settings.clipboard_encoding, ClipboardEncoding::Utf8);
        assert!(settings.disable_copy);
        assert_eq!(settings.autoretry, 3);
    }

    #[test]
    fn invalid_values_revert_to_defaults() {
        let settings = Settings::parse([
            ("port", "not-a-port"),
            ("color-depth", "15"),
            ("cursor", "sparkly"),
            ("clipboard-encoding", "EBCDIC"),
            ("disable-paste", "yes"),
        ]);
        assert_eq!(settings.port, 5900);
        assert_eq!(settings.color_depth, ColorDepth::Depth24);
        assert_eq!(settings.cursor, CursorMode::Local);
        assert_eq!(settings.clipboard_encoding, ClipboardEncoding::Iso8859_1);
        assert!(!settings.disable_paste);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let settings = Settings::parse([("frobnicate", "7"), ("port", "22")]);
        assert_eq!(settings.port, 22);
    }
}
