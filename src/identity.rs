//! Rough classification of the terminal we are running in.

use std::fmt;

use crate::env::Environment;

/// A best guess of the category of terminal this program is running in.
///
/// Categories overlap and terminals lie about themselves, so this is only good
/// for general decisions, e.g. multiplexers cannot be trusted with status
/// queries and dumb terminals will not answer them at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalIdentity {
    /// GNU Screen, a terminal multiplexer.
    GnuScreen,
    /// tmux, a terminal multiplexer.
    Tmux,
    /// A terminal without capabilities.
    Dumb,
    /// Google Cloud Shell, a browser-based terminal.
    GoogleCloudShell,
    /// A tab hosted by Windows Terminal.
    WindowsTerminalHosted,
    /// A terminal identifying itself as xterm.
    XtermCompatible,
    /// A standalone Windows console (`cmd`, PowerShell).
    OtherWindows,
    /// Anything else.
    Other,
}

impl TerminalIdentity {
    /// Classify the terminal described by `env` on the current OS.
    #[must_use]
    pub fn detect(env: &Environment) -> Self {
        Self::detect_for_os(env, std::env::consts::OS)
    }

    /// Classify the terminal described by `env`, as if running on `os`.
    #[must_use]
    pub fn detect_for_os(env: &Environment, os: &str) -> Self {
        let term = env.get("TERM");

        if env.get("GOOGLE_CLOUD_SHELL") == "true" {
            return Self::GoogleCloudShell;
        }
        if env.is_set("WT_SESSION") {
            return Self::WindowsTerminalHosted;
        }
        if term.starts_with("screen") {
            if env.get("TERM_PROGRAM") == "tmux" {
                return Self::Tmux;
            }
            return Self::GnuScreen;
        }
        if term.starts_with("tmux") {
            return Self::Tmux;
        }
        if is_dumb(term) {
            return Self::Dumb;
        }
        if term.starts_with("xterm") {
            return Self::XtermCompatible;
        }
        if os == "windows" && term.is_empty() {
            return Self::OtherWindows;
        }
        Self::Other
    }
}

impl fmt::Display for TerminalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GnuScreen => "GNUScreen",
            Self::Tmux => "TMux",
            Self::Dumb => "DumbTerminal",
            Self::GoogleCloudShell => "GoogleCloudShell",
            Self::WindowsTerminalHosted => "WindowsTerminalHosted",
            Self::XtermCompatible => "XTermCompatible",
            Self::OtherWindows => "OtherWindows",
            Self::Other => "OtherTerminal",
        };
        f.write_str(name)
    }
}

/// Whether `term` names a multiplexer, which may be attached to several
/// terminals at once.
pub(crate) fn is_multiplexer(term: &str) -> bool {
    term.starts_with("screen") || term.starts_with("tmux")
}

/// Whether `term` names a dumb terminal.
pub(crate) fn is_dumb(term: &str) -> bool {
    term.starts_with("dumb")
}
