//! Colour themes for the review screen.
//!
//! - `dark` uses ANSI 16 colours and works on any terminal.
//! - `catppuccin_mocha` uses the Mocha palette in RGB and needs truecolor.

use ratatui::style::Color;
use tracing::warn;

/// Every colour the review screen paints with.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Border of the focused panel.
    pub border_active: Color,
    pub border_inactive: Color,

    pub diff_added: Color,
    pub diff_removed: Color,
    pub diff_context: Color,

    /// Assistant output streamed into the left panel.
    pub stream_text: Color,

    pub status_bar_bg: Color,
    pub status_bar_fg: Color,
    /// Mode badge at the left of the status bar.
    pub status_mode: Color,
    pub status_busy: Color,
    pub status_success: Color,
    pub status_error: Color,
}

impl Theme {
    /// The built-in ANSI theme.
    pub fn dark() -> Self {
        Self {
            border_active: Color::Cyan,
            border_inactive: Color::DarkGray,

            diff_added: Color::Green,
            diff_removed: Color::Red,
            diff_context: Color::Reset,

            stream_text: Color::Reset,

            status_bar_bg: Color::DarkGray,
            status_bar_fg: Color::White,
            status_mode: Color::Cyan,
            status_busy: Color::Yellow,
            status_success: Color::Green,
            status_error: Color::Red,
        }
    }

    /// Catppuccin Mocha in RGB truecolor.
    ///
    /// Palette source: <https://github.com/catppuccin/catppuccin> Mocha variant.
    pub fn catppuccin_mocha() -> Self {
        let green = Color::Rgb(166, 227, 161); // #a6e3a1
        let red = Color::Rgb(243, 139, 168); // #f38ba8
        let yellow = Color::Rgb(249, 226, 175); // #f9e2af
        let lavender = Color::Rgb(180, 190, 254); // #b4befe
        let overlay1 = Color::Rgb(127, 132, 156); // #7f849c
        let surface1 = Color::Rgb(69, 71, 90); // #45475a
        let text = Color::Rgb(205, 214, 244); // #cdd6f4
        let subtext0 = Color::Rgb(166, 173, 200); // #a6adc8

        Self {
            border_active: lavender,
            border_inactive: overlay1,

            diff_added: green,
            diff_removed: red,
            diff_context: text,

            stream_text: subtext0,

            status_bar_bg: surface1,
            status_bar_fg: text,
            status_mode: lavender,
            status_busy: yellow,
            status_success: green,
            status_error: red,
        }
    }

    /// Resolves a theme name from config. Unknown names fall back to `dark`
    /// with a warning so a typo never prevents startup.
    pub fn from_name(name: &str) -> Self {
        match name {
            "catppuccin-mocha" | "catppuccin_mocha" => Self::catppuccin_mocha(),
            "dark" => Self::dark(),
            other => {
                warn!(theme = other, "unknown theme, falling back to 'dark'");
                Self::dark()
            }
        }
    }
}
