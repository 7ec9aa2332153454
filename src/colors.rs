//! Terminal color support.
//!
//! Honours `NO_COLOR` (<https://no-color.org/>), then `CLICOLOR_FORCE`, then
//! `CLICOLOR=0`, and otherwise colors only when stdout is a terminal.
use colored::control;

/// Whether to color output, given the environment and TTY status.
pub fn color_choice(lookup: impl Fn(&str) -> Option<String>, is_tty: bool) -> bool {
    // NO_COLOR takes precedence over everything
    if lookup("NO_COLOR").is_some() {
        return false;
    }
    if lookup("CLICOLOR_FORCE").is_some_and(|v| v != "0") {
        return true;
    }
    if lookup("CLICOLOR").is_some_and(|v| v == "0") {
        return false;
    }
    is_tty
}

pub fn stdout_is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}

/// Configure `colored` for the whole program. Call early in `main`.
pub fn init_colors() {
    control::set_override(color_choice(|k| std::env::var(k).ok(), stdout_is_tty()));
}
