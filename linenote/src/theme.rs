//! Color theme system for linenote.
//!
//! A `Theme` holds named `ratatui::style::Color` fields covering every UI
//! surface linenote renders. Source text itself is colored by the syntax
//! highlighter; the theme covers everything around it. Two built-in themes:
//!
//! - `dark` uses ANSI 16 colors so it works on any terminal.
//! - `catppuccin-mocha` uses the Catppuccin Mocha palette in RGB and needs
//!   truecolor.

use ratatui::style::Color;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Theme {
    /// Border of the source panel.
    pub border: Color,
    /// Border of modal overlays (help, compose, common comments).
    pub border_modal: Color,

    // Gutter
    pub gutter: Color,
    /// Line number of a line carrying at least one human comment.
    pub gutter_marked: Color,
    /// Background of the line under the cursor.
    pub cursor_line_bg: Color,
    /// Background of the line under the mouse pointer.
    pub hover_bg: Color,
    /// Background of the line a dragged comment would drop onto.
    pub drop_target_bg: Color,

    // Comment overlays
    pub comment_border: Color,
    pub comment_auto_border: Color,
    pub comment_author: Color,
    pub comment_meta: Color,
    pub comment_text: Color,
    /// Border of the comment currently selected for delete or move.
    pub comment_selected: Color,
    /// Marker on a comment whose delete or move is still in flight.
    pub comment_pending: Color,

    // Status bar
    pub status_bar_bg: Color,
    pub status_bar_fg: Color,
    pub status_mode_normal: Color,
    pub status_mode_insert: Color,
    pub status_error: Color,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            border: Color::DarkGray,
            border_modal: Color::Cyan,

            gutter: Color::DarkGray,
            gutter_marked: Color::Yellow,
            cursor_line_bg: Color::Indexed(236),
            hover_bg: Color::Indexed(235),
            drop_target_bg: Color::Indexed(22),

            comment_border: Color::Blue,
            comment_auto_border: Color::DarkGray,
            comment_author: Color::Cyan,
            comment_meta: Color::DarkGray,
            comment_text: Color::Reset,
            comment_selected: Color::Yellow,
            comment_pending: Color::Magenta,

            status_bar_bg: Color::DarkGray,
            status_bar_fg: Color::White,
            status_mode_normal: Color::Cyan,
            status_mode_insert: Color::Green,
            status_error: Color::Red,
        }
    }

    /// Catppuccin Mocha palette, <https://github.com/catppuccin/catppuccin>.
    pub fn catppuccin_mocha() -> Self {
        let green = Color::Rgb(166, 227, 161); // #a6e3a1
        let red = Color::Rgb(243, 139, 168); // #f38ba8
        let yellow = Color::Rgb(249, 226, 175); // #f9e2af
        let blue = Color::Rgb(137, 180, 250); // #89b4fa
        let mauve = Color::Rgb(203, 166, 247); // #cba6f7
        let lavender = Color::Rgb(180, 190, 254); // #b4befe
        let overlay0 = Color::Rgb(108, 112, 134); // #6c7086
        let overlay1 = Color::Rgb(127, 132, 156); // #7f849c
        let surface0 = Color::Rgb(49, 50, 68); // #313244
        let surface1 = Color::Rgb(69, 71, 90); // #45475a
        let mantle = Color::Rgb(24, 24, 37); // #181825
        let text = Color::Rgb(205, 214, 244); // #cdd6f4

        Self {
            border: overlay0,
            border_modal: lavender,

            gutter: overlay0,
            gutter_marked: yellow,
            cursor_line_bg: surface0,
            hover_bg: mantle,
            drop_target_bg: Color::Rgb(40, 64, 48),

            comment_border: blue,
            comment_auto_border: overlay1,
            comment_author: lavender,
            comment_meta: overlay1,
            comment_text: text,
            comment_selected: yellow,
            comment_pending: mauve,

            status_bar_bg: surface1,
            status_bar_fg: text,
            status_mode_normal: lavender,
            status_mode_insert: green,
            status_error: red,
        }
    }

    /// Resolves a theme name from config. Unknown names fall back to `dark()`.
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
