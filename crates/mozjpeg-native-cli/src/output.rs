//! Colored terminal output for CLI commands.
//!
//! Uses `termcolor` for cross-platform colored terminal output.
//! Respects `NO_COLOR` environment variable and `--color` flag.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from CLI flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Styled output writer for terminal.
pub struct StyledOutput {
    stdout: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
        }
    }

    fn write_styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&spec);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// `label: value` row with a dimmed, padded label.
    pub fn field(&mut self, label: &str, value: impl std::fmt::Display) {
        self.write_styled(&format!("{:<22}", format!("{}:", label)), Some(Color::Cyan), false);
        let _ = writeln!(self.stdout, "{}", value);
    }

    /// Bold section heading.
    pub fn heading(&mut self, text: &str) {
        self.write_styled(text, None, true);
        let _ = writeln!(self.stdout);
    }

    /// Green bold status line.
    pub fn success(&mut self, text: &str) {
        self.write_styled(text, Some(Color::Green), true);
        let _ = writeln!(self.stdout);
    }

    /// Red bold status line.
    pub fn error(&mut self, text: &str) {
        self.write_styled(text, Some(Color::Red), true);
        let _ = writeln!(self.stdout);
    }

    /// Yellow bold status line.
    pub fn warning(&mut self, text: &str) {
        self.write_styled(text, Some(Color::Yellow), true);
        let _ = writeln!(self.stdout);
    }

    /// Plain line (no color).
    pub fn line(&mut self, text: &str) {
        let _ = writeln!(self.stdout, "{}", text);
    }
}
