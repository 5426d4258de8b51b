use owo_colors::{OwoColorize, Rgb};
use spinoff::{spinners, Color as SpinoffColor, Spinner};

pub const ICON_SUCCESS: &str = "✓";
pub const ICON_ERROR: &str = "✗";
pub const ICON_WARNING: &str = "⚠";
pub const ICON_POINTER: &str = "→";
pub const SEPARATOR: &str = "─";
pub const LOGO: &str = "≋";

pub fn primary() -> Rgb {
    Rgb(86, 156, 214)
}

pub fn error() -> Rgb {
    Rgb(202, 50, 20)
}

pub fn warning() -> Rgb {
    Rgb(245, 158, 11)
}

pub fn success() -> Rgb {
    Rgb(114, 227, 173)
}

pub fn primary_spinoff() -> SpinoffColor {
    SpinoffColor::TrueColor {
        r: 86,
        g: 156,
        b: 214,
    }
}

pub fn dimmed(text: &str) -> String {
    format!("{}", text.dimmed())
}

pub fn separator(width: usize) -> String {
    format!("{}", SEPARATOR.repeat(width).dimmed())
}

pub fn header(text: &str) -> String {
    format!(
        "\n{} {}\n{}",
        LOGO.color(primary()),
        text.bold().color(primary()),
        separator(60)
    )
}

pub fn success_icon() -> String {
    format!("{}", ICON_SUCCESS.color(success()).bold())
}

pub fn error_icon() -> String {
    format!("{}", ICON_ERROR.color(error()).bold())
}

pub fn warning_icon() -> String {
    format!("{}", ICON_WARNING.color(warning()).bold())
}

pub fn pointer_icon() -> String {
    format!("{}", ICON_POINTER.color(primary()))
}

pub fn success_message(msg: &str) -> String {
    format!("{} {}", success_icon(), msg)
}

pub fn error_message(msg: &str) -> String {
    format!("{} {}", error_icon(), msg)
}

pub fn warning_message(msg: &str) -> String {
    format!("{} {}", warning_icon(), msg)
}

pub fn highlight(text: &str) -> String {
    format!("{}", text.color(primary()).bold())
}

/// A spinner shown while a long phase runs. Silent when stderr is not a
/// terminal.
pub struct PhaseSpinner {
    spinner: Option<Spinner>,
}

impl PhaseSpinner {
    pub fn new(message: impl Into<String>) -> Self {
        use std::io::{stderr, IsTerminal};

        let spinner = if stderr().is_terminal() {
            Some(Spinner::new(
                spinners::Arc,
                format!("  └─ {}", message.into()),
                Some(primary_spinoff()),
            ))
        } else {
            None
        };

        Self { spinner }
    }

    pub fn finish(self) {
        if let Some(mut spinner) = self.spinner {
            spinner.clear();
        }
    }
}
