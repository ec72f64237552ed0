//! # Output Configuration
//!
//! Controls how the CLI reports request status: with emoji and color on a
//! capable terminal, or as plain `[OK]` / `[ERR]` markers otherwise.
//!
//! The following environment variables and flags are respected:
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! Status lines are written to stderr, so detection looks at stderr rather
//! than stdout; stdout carries file payloads and is often redirected.

use std::env;

use console::style;

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// `always` forces colors on (overriding `NO_COLOR`), `never` forces
    /// them off, and anything else detects support from the environment.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stderr().features().colors_supported()
    }

    /// Create a configuration with colors always enabled.
    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    /// Create a configuration with colors always disabled.
    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns `emoji_str` when colors are enabled, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Format the status line for a response status.
///
/// `ok` is reported as success; anything else is an error message.
pub fn status_line(config: &OutputConfig, status: &str) -> String {
    let ok = status == crate::server::STATUS_OK;
    let marker = if ok {
        emoji(config, "✅", "[OK]")
    } else {
        emoji(config, "❌", "[ERR]")
    };
    if !config.use_color {
        return format!("{marker} {status}");
    }
    let styled = if ok {
        style(status).green()
    } else {
        style(status).red().bold()
    };
    // force styling even when console decides the stream is not a tty
    format!("{marker} {}", styled.force_styling(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_always() {
        let config = OutputConfig::from_env_and_flag("always");
        assert!(config.use_color);
    }

    #[test]
    fn test_color_never() {
        let config = OutputConfig::from_env_and_flag("NEVER");
        assert!(!config.use_color);
    }

    #[test]
    fn test_status_line_plain() {
        let config = OutputConfig::without_color();
        assert_eq!(status_line(&config, "ok"), "[OK] ok");
        assert_eq!(
            status_line(&config, "no staged data"),
            "[ERR] no staged data"
        );
    }

    #[test]
    fn test_status_line_colored() {
        let config = OutputConfig::with_color();
        let line = status_line(&config, "ok");
        assert!(line.starts_with("✅"));
        assert!(line.contains("ok"));
        assert!(line.contains('\u{1b}'));
        assert!(status_line(&config, "boom").starts_with("❌"));
    }
}
