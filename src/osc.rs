//! OSC (Operating System Command) status queries.
//!
//! This module asks the terminal for its default foreground (OSC 10) or
//! background (OSC 11) color:
//! 1. Refuse devices that cannot be queried safely (not a terminal, multiplexer,
//!    dumb terminal, background process group)
//! 2. Put the terminal in raw mode, saving its attributes
//! 3. Send the OSC query followed by a cursor position request (DSR 6). Every
//!    terminal answers the latter, so a terminal silently ignoring the OSC query
//!    is detected without waiting for the deadline
//! 4. Read the framed replies byte by byte under a single deadline
//! 5. Restore the saved attributes, on every path
//! 6. Parse the `rgb:RRRR/GGGG/BBBB` report

use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use log::{debug, trace};
use regex::Regex;
use thiserror::Error;

use crate::color::{RGB, hex_to_u8};
use crate::env::Environment;
use crate::identity::{is_dumb, is_multiplexer};
use crate::terminal::{RawModeGuard, TerminalDevice};

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// Default upper bound for a whole query.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest frame accepted, from the introducing ESC to the terminator.
pub const MAX_FRAME_LEN: usize = 32;

/// The dynamic colors that can be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscColor {
    /// The default text color (OSC 10).
    Foreground,
    /// The default background color (OSC 11).
    Background,
}

impl OscColor {
    /// The OSC code of this color.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            OscColor::Foreground => 10,
            OscColor::Background => 11,
        }
    }
}

/// Why a status query produced no color.
///
/// None of these are fatal: callers are expected to fall back to other sources.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The device cannot be queried safely; nothing was sent.
    #[error("terminal cannot be queried: {0}")]
    Unsupported(&'static str),
    /// No complete reply arrived in time.
    #[error("no status report: {0}")]
    Timeout(String),
    /// The terminal answered the cursor position request but not the OSC query.
    #[error("terminal does not answer OSC queries")]
    Unanswered,
    /// A reply arrived but is not a color report.
    #[error("malformed status report: {0}")]
    Malformed(String),
    /// The terminal attributes could not be read or changed.
    #[error("failed to change terminal attributes")]
    Attributes(#[source] io::Error),
    /// Writing the request or reading the reply failed.
    #[error("terminal I/O failed")]
    Io(#[source] io::Error),
}

/// Tunables of a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Terminal type (`TERM`), used to refuse multiplexers and dumb terminals.
    pub term: String,
    /// Upper bound for the whole query, capped at about 65 seconds.
    pub timeout: Duration,
    /// Query even when `term` names a multiplexer (screen, tmux).
    pub trust_multiplexer: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            term: String::new(),
            timeout: DEFAULT_TIMEOUT,
            trust_multiplexer: false,
        }
    }
}

impl QueryOptions {
    /// Default options for the terminal described by `env`.
    #[must_use]
    pub fn from_env(env: &Environment) -> Self {
        Self {
            term: env.get("TERM").to_string(),
            ..Self::default()
        }
    }
}

/// A reply frame read from the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    /// `ESC ] ... (BEL | ESC \)`
    Osc(Vec<u8>),
    /// `ESC [ row ; col R`
    CursorPosition(Vec<u8>),
}

/// A terminal in raw mode, with the deadline of the current query.
///
/// The saved attributes are restored when the session is dropped.
struct QuerySession<'a, D: TerminalDevice> {
    tty: RawModeGuard<'a, D>,
    deadline: Instant,
    /// A byte read ahead of the current frame.
    pending: Option<u8>,
}

impl<D: TerminalDevice> QuerySession<'_, D> {
    /// Wait for and read the next byte.
    ///
    /// Interrupted waits are retried against the same deadline.
    fn next_byte(&mut self) -> Result<u8, QueryError> {
        if let Some(b) = self.pending.take() {
            return Ok(b);
        }
        loop {
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(QueryError::Timeout("deadline elapsed".into()));
            }
            match self.tty.wait_readable(remaining) {
                Ok(true) => break,
                Ok(false) => return Err(QueryError::Timeout("deadline elapsed".into())),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    trace!("wait interrupted, retrying");
                }
                Err(e) => return Err(QueryError::Timeout(format!("waiting for terminal: {e}"))),
            }
        }

        match self.tty.read_byte() {
            Ok(b) => Ok(b),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(QueryError::Timeout("end of stream".into()))
            }
            Err(e) => Err(QueryError::Io(e)),
        }
    }

    /// Read the next OSC or CSI reply, skipping anything before its ESC.
    fn read_frame(&mut self) -> Result<Frame, QueryError> {
        let mut skipped = 0usize;
        while self.next_byte()? != ESC {
            skipped += 1;
        }
        if skipped > 0 {
            trace!("skipped {skipped} bytes before reply");
        }

        let kind = self.next_byte()?;
        let mut buf = vec![ESC, kind];
        match kind {
            b']' => loop {
                let b = self.next_byte()?;
                buf.push(b);
                if b == BEL {
                    return Ok(Frame::Osc(buf));
                }
                if b == ESC {
                    // some terminals end the reply with a bare ESC
                    let st = self.next_byte()?;
                    if st == b'\\' {
                        buf.push(st);
                    } else {
                        self.pending = Some(st);
                    }
                    return Ok(Frame::Osc(buf));
                }
                check_frame_len(&buf)?;
            },
            b'[' => loop {
                let b = self.next_byte()?;
                buf.push(b);
                if b == b'R' {
                    return Ok(Frame::CursorPosition(buf));
                }
                check_frame_len(&buf)?;
            },
            other => Err(QueryError::Malformed(format!(
                "unexpected reply introducer {other:#04x}"
            ))),
        }
    }
}

fn check_frame_len(buf: &[u8]) -> Result<(), QueryError> {
    if buf.len() >= MAX_FRAME_LEN {
        return Err(QueryError::Timeout(format!(
            "reply exceeds {MAX_FRAME_LEN} bytes"
        )));
    }
    Ok(())
}

/// Sends an OSC query for `code`, followed by a cursor position request.
///
/// The query is terminated with ST (`ESC \`), e.g. `\x1b]11;?\x1b\\\x1b[6n`.
///
/// # Errors
///
/// Returns an error if writing to the terminal fails.
fn send_osc_query<D: TerminalDevice>(tty: &mut D, code: u8) -> Result<(), QueryError> {
    let request = format!("\x1b]{code};?\x1b\\\x1b[6n");
    tty.write_all(request.as_bytes()).map_err(QueryError::Io)
}

/// Run an OSC status query and return the raw report.
///
/// # Arguments
///
/// * `device` - The terminal to query; it is put in raw mode for the duration of
///   the query
/// * `code` - The OSC code to ask about (10 for foreground, 11 for background)
/// * `options` - Terminal type, deadline and multiplexer trust
///
/// # Returns
///
/// The OSC reply including its introducer and terminator, e.g.
/// `"\x1b]11;rgb:0000/0000/0000\x07"`. The cursor position reply that follows it
/// is consumed and discarded.
///
/// # Errors
///
/// Returns a [`QueryError`] describing why no report was obtained. Whatever the
/// outcome, the terminal attributes are the same on return as on entry.
pub fn query_status_report<D: TerminalDevice>(
    device: &mut D,
    code: u8,
    options: &QueryOptions,
) -> Result<String, QueryError> {
    if !device.is_terminal() {
        return Err(QueryError::Unsupported("not a terminal"));
    }
    if is_dumb(&options.term) {
        return Err(QueryError::Unsupported("dumb terminal"));
    }
    if is_multiplexer(&options.term) && !options.trust_multiplexer {
        return Err(QueryError::Unsupported("terminal multiplexer"));
    }
    if !device.is_foreground() {
        return Err(QueryError::Unsupported("not in the foreground process group"));
    }

    let tty = RawModeGuard::enter(device).map_err(QueryError::Attributes)?;
    let mut session = QuerySession {
        tty,
        deadline: Instant::now() + options.timeout,
        pending: None,
    };

    send_osc_query(&mut *session.tty, code)?;
    debug!("sent OSC {code} query");

    let report = match session.read_frame()? {
        Frame::Osc(report) => report,
        Frame::CursorPosition(_) => return Err(QueryError::Unanswered),
    };
    trace!("report={report:?}");

    // drain the cursor position reply so it does not leak into the input
    match session.read_frame()? {
        Frame::CursorPosition(_) => {}
        Frame::Osc(extra) => {
            return Err(QueryError::Malformed(format!(
                "expected cursor position, got {extra:?}"
            )));
        }
    }

    String::from_utf8(report)
        .map_err(|e| QueryError::Malformed(format!("invalid UTF-8 in report: {e}")))
}

/// Parses an OSC color report into an RGB value.
///
/// The report looks like `\x1b]11;rgb:RRRR/GGGG/BBBB` followed by BEL or ST, where
/// each channel has 2 to 4 hex digits of which the 2 most significant are kept.
///
/// # Arguments
///
/// * `report` - The raw reply, as returned by [`query_status_report`]
/// * `code` - The OSC code the reply must be for
///
/// # Errors
///
/// Returns an error if the report is not a color report for `code`.
pub fn parse_color_response(report: &str, code: u8) -> Result<RGB> {
    let re = Regex::new(
        r"^\x1b\](\d+);rgb:([0-9a-fA-F]{2,4})/([0-9a-fA-F]{2,4})/([0-9a-fA-F]{2,4})(?:\x07|\x1b\\|\x1b)$",
    )
    .context("Failed to compile regex")?;
    let caps = re
        .captures(report)
        .ok_or_else(|| anyhow!("Not a color report: {report:?}"))?;

    let reported: u8 = caps[1]
        .parse()
        .with_context(|| format!("Invalid OSC code: {}", &caps[1]))?;
    if reported != code {
        return Err(anyhow!("Expected a report for OSC {code}, got OSC {reported}"));
    }

    let r = hex_to_u8(&caps[2]).context("Failed to parse red component")?;
    let g = hex_to_u8(&caps[3]).context("Failed to parse green component")?;
    let b = hex_to_u8(&caps[4]).context("Failed to parse blue component")?;
    Ok(RGB::new(r, g, b))
}

/// Query the terminal for one of its default colors.
///
/// # Returns
///
/// The reported color, truncated to 8 bits per channel.
///
/// # Errors
///
/// Returns a [`QueryError`] if the query fails or the report cannot be parsed.
/// The terminal attributes are restored before returning in every case.
pub fn query_terminal_color<D: TerminalDevice>(
    device: &mut D,
    color: OscColor,
    options: &QueryOptions,
) -> Result<RGB, QueryError> {
    let report = query_status_report(device, color.code(), options)?;
    let rgb = parse_color_response(&report, color.code())
        .map_err(|e| QueryError::Malformed(format!("{e:#}")))?;
    debug!("OSC {} color={rgb}", color.code());
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::fake::{ECHO, FakeTerminal, ICANON, Wait};

    const CURSOR: &[u8] = b"\x1b[12;1R";

    fn options() -> QueryOptions {
        QueryOptions {
            term: "xterm-256color".into(),
            timeout: Duration::from_millis(200),
            trust_multiplexer: false,
        }
    }

    fn reply(osc: &[u8]) -> Vec<u8> {
        [osc, CURSOR].concat()
    }

    #[test]
    fn test_parse_color_response() -> Result<()> {
        assert_eq!(
            parse_color_response("\x1b]11;rgb:0000/0000/0000\x07", 11)?,
            RGB::new(0, 0, 0)
        );
        assert_eq!(
            parse_color_response("\x1b]11;rgb:fafa/fafa/fafa\x1b\\", 11)?,
            RGB::new(0xfa, 0xfa, 0xfa)
        );
        assert_eq!(
            parse_color_response("\x1b]11;rgb:fafa/fafa/fafa\x1b", 11)?,
            RGB::new(0xfa, 0xfa, 0xfa)
        );
        assert_eq!(
            parse_color_response("\x1b]11;rgb:1212/3434/5656\x07", 11)?,
            RGB::new(0x12, 0x34, 0x56)
        );
        assert_eq!(
            parse_color_response("\x1b]10;rgb:ab/cd/ef\x07", 10)?,
            RGB::new(0xab, 0xcd, 0xef)
        );
        assert_eq!(
            parse_color_response("\x1b]10;rgb:abc/def/012\x07", 10)?,
            RGB::new(0xab, 0xde, 0x01)
        );
        Ok(())
    }

    #[test]
    fn test_parse_color_response_rejects_malformed() {
        for report in [
            "",
            "garbage data",
            "\x1b]11;foo:fafa/fafa/fafaZZ",
            "\x1b]11;rgb:fafa/fafa",
            "\x1b]11;rgb:fafa/fafa/fafaY",
            "\x1b]11;rgb:fafa/fafa/fafaZZ",
            "\x1b]11;rgb:fafa/fafa/fafa",
            "\x1b]11;rgb:f/f/f\x07",
            "\x1b]11;rgb:fffff/0000/0000\x07",
            "\x1b]11;#ff8000\x07",
        ] {
            assert!(parse_color_response(report, 11).is_err(), "{report:?}");
        }
        // wrong OSC code
        assert!(parse_color_response("\x1b]10;rgb:0000/0000/0000\x07", 11).is_err());
    }

    #[test]
    fn test_query_success_restores_attributes() -> Result<()> {
        let mut tty = FakeTerminal::replying(&reply(b"\x1b]11;rgb:1212/3434/5656\x1b\\"));
        let rgb = query_terminal_color(&mut tty, OscColor::Background, &options())?;

        assert_eq!(rgb, RGB::new(0x12, 0x34, 0x56));
        assert_eq!(tty.written, b"\x1b]11;?\x1b\\\x1b[6n");
        assert_eq!(tty.attributes, ECHO | ICANON);
        assert_eq!(tty.history, vec![0, ECHO | ICANON]);
        assert!(tty.input.is_empty(), "cursor reply must be drained");
        Ok(())
    }

    #[test]
    fn test_query_skips_type_ahead() -> Result<()> {
        let mut tty = FakeTerminal::replying(&reply(b"\x1b]10;rgb:ffff/ffff/ffff\x07"));
        tty.input.extend(b"ls -l");
        let rgb = query_terminal_color(&mut tty, OscColor::Foreground, &options())?;
        assert_eq!(rgb, RGB::new(255, 255, 255));
        Ok(())
    }

    #[test]
    fn test_query_timeout_restores_attributes() {
        let mut tty = FakeTerminal::default();
        let err = query_terminal_color(&mut tty, OscColor::Background, &options()).unwrap_err();

        assert!(matches!(err, QueryError::Timeout(_)), "{err:?}");
        assert_eq!(tty.attributes, ECHO | ICANON);
        assert_eq!(tty.history, vec![0, ECHO | ICANON]);
    }

    #[test]
    fn test_query_partial_reply_times_out() {
        let mut tty = FakeTerminal::replying(b"\x1b]11;rgb:1212/34");
        let err = query_terminal_color(&mut tty, OscColor::Background, &options()).unwrap_err();

        assert!(matches!(err, QueryError::Timeout(_)), "{err:?}");
        assert_eq!(tty.attributes, ECHO | ICANON);
    }

    #[test]
    fn test_query_byte_cap() {
        let mut endless = b"\x1b]11;".to_vec();
        endless.extend([b'a'; 64]);
        let mut tty = FakeTerminal::replying(&endless);
        let err = query_terminal_color(&mut tty, OscColor::Background, &options()).unwrap_err();

        assert!(matches!(err, QueryError::Timeout(_)), "{err:?}");
        assert_eq!(tty.attributes, ECHO | ICANON);
        assert!(!tty.input.is_empty(), "reading must stop at the cap");
    }

    #[test]
    fn test_query_malformed_restores_attributes() {
        let mut tty = FakeTerminal::replying(&reply(b"\x1b]11;hsl:1/2/3\x07"));
        let err = query_terminal_color(&mut tty, OscColor::Background, &options()).unwrap_err();

        assert!(matches!(err, QueryError::Malformed(_)), "{err:?}");
        assert_eq!(tty.attributes, ECHO | ICANON);
        assert_eq!(tty.history, vec![0, ECHO | ICANON]);
    }

    #[test]
    fn test_query_accepts_bare_esc_terminator() -> Result<()> {
        let mut tty = FakeTerminal::replying(&reply(b"\x1b]11;rgb:fafa/fafa/fafa\x1b"));
        let rgb = query_terminal_color(&mut tty, OscColor::Background, &options())?;
        assert_eq!(rgb, RGB::new(0xfa, 0xfa, 0xfa));
        assert!(tty.input.is_empty());
        Ok(())
    }

    #[test]
    fn test_query_unanswered_osc() {
        let mut tty = FakeTerminal::replying(CURSOR);
        let err = query_terminal_color(&mut tty, OscColor::Foreground, &options()).unwrap_err();

        assert!(matches!(err, QueryError::Unanswered), "{err:?}");
        assert_eq!(tty.attributes, ECHO | ICANON);
    }

    #[test]
    fn test_query_attribute_failures_change_nothing() {
        let mut tty = FakeTerminal {
            fail_get: true,
            ..FakeTerminal::replying(&reply(b"\x1b]11;rgb:0000/0000/0000\x07"))
        };
        let err = query_terminal_color(&mut tty, OscColor::Background, &options()).unwrap_err();
        assert!(matches!(err, QueryError::Attributes(_)), "{err:?}");
        assert_eq!(tty.attributes, ECHO | ICANON);
        assert!(tty.written.is_empty());

        let mut tty = FakeTerminal {
            fail_set: true,
            ..FakeTerminal::replying(&reply(b"\x1b]11;rgb:0000/0000/0000\x07"))
        };
        let err = query_terminal_color(&mut tty, OscColor::Background, &options()).unwrap_err();
        assert!(matches!(err, QueryError::Attributes(_)), "{err:?}");
        assert_eq!(tty.attributes, ECHO | ICANON);
        assert!(tty.history.is_empty());
        assert!(tty.written.is_empty());
    }

    #[test]
    fn test_query_retries_interrupted_wait() -> Result<()> {
        let mut tty = FakeTerminal::replying(&reply(b"\x1b]11;rgb:0000/0000/0000\x07"));
        tty.waits.extend([Wait::Interrupted, Wait::Interrupted]);
        let rgb = query_terminal_color(&mut tty, OscColor::Background, &options())?;

        assert_eq!(rgb, RGB::new(0, 0, 0));
        assert!(tty.wait_calls > 2);
        Ok(())
    }

    #[test]
    fn test_interrupted_waits_keep_the_deadline() {
        let mut tty = FakeTerminal {
            interrupt_every: Some(Duration::from_millis(20)),
            ..FakeTerminal::replying(&reply(b"\x1b]11;rgb:0000/0000/0000\x07"))
        };
        let options = options();
        let start = Instant::now();
        let err = query_terminal_color(&mut tty, OscColor::Background, &options).unwrap_err();

        assert!(matches!(err, QueryError::Timeout(_)), "{err:?}");
        assert!(start.elapsed() >= options.timeout);
        assert!(start.elapsed() < options.timeout * 3, "{:?}", start.elapsed());
        assert!(tty.wait_calls > 1);
        assert_eq!(tty.attributes, ECHO | ICANON);
        assert_eq!(tty.history, vec![0, ECHO | ICANON]);
    }

    #[test]
    fn test_query_wait_failure_aborts() {
        let mut tty = FakeTerminal::replying(&reply(b"\x1b]11;rgb:0000/0000/0000\x07"));
        tty.waits.push_back(Wait::Fail);
        let err = query_terminal_color(&mut tty, OscColor::Background, &options()).unwrap_err();

        assert!(matches!(err, QueryError::Timeout(_)), "{err:?}");
        assert_eq!(tty.wait_calls, 1);
        assert_eq!(tty.attributes, ECHO | ICANON);
    }

    #[test]
    fn test_guard_rejections_send_nothing() {
        let cases = [
            (
                FakeTerminal {
                    terminal: false,
                    ..FakeTerminal::default()
                },
                "xterm",
            ),
            (
                FakeTerminal {
                    foreground: false,
                    ..FakeTerminal::default()
                },
                "xterm",
            ),
            (FakeTerminal::default(), "screen-256color"),
            (FakeTerminal::default(), "tmux-256color"),
            (FakeTerminal::default(), "dumb"),
        ];
        for (mut tty, term) in cases {
            let options = QueryOptions {
                term: term.into(),
                ..options()
            };
            let err = query_status_report(&mut tty, 11, &options).unwrap_err();
            assert!(matches!(err, QueryError::Unsupported(_)), "{term}: {err:?}");
            assert!(tty.written.is_empty());
            assert!(tty.history.is_empty());
        }
    }

    #[test]
    fn test_trusted_multiplexer_is_queried() -> Result<()> {
        let mut tty = FakeTerminal::replying(&reply(b"\x1b]11;rgb:0000/0000/0000\x07"));
        let options = QueryOptions {
            term: "tmux-256color".into(),
            trust_multiplexer: true,
            ..options()
        };
        assert_eq!(
            query_terminal_color(&mut tty, OscColor::Background, &options)?,
            RGB::new(0, 0, 0)
        );

        let mut tty = FakeTerminal::default();
        let options = QueryOptions {
            term: "dumb".into(),
            ..options
        };
        assert!(matches!(
            query_status_report(&mut tty, 11, &options),
            Err(QueryError::Unsupported(_))
        ));
        Ok(())
    }

    #[test]
    fn test_failed_restore_is_not_an_error() -> Result<()> {
        let mut tty = FakeTerminal {
            fail_restore: true,
            ..FakeTerminal::replying(&reply(b"\x1b]11;rgb:0000/0000/0000\x07"))
        };
        let rgb = query_terminal_color(&mut tty, OscColor::Background, &options())?;
        assert_eq!(rgb, RGB::new(0, 0, 0));
        assert_eq!(tty.history, vec![0]);
        Ok(())
    }

    #[test]
    fn test_osc_codes() {
        assert_eq!(OscColor::Foreground.code(), 10);
        assert_eq!(OscColor::Background.code(), 11);
    }

    #[test]
    fn test_options_from_env() {
        let env: Environment = [("TERM", "xterm-kitty")].into_iter().collect();
        let options = QueryOptions::from_env(&env);
        assert_eq!(options.term, "xterm-kitty");
        assert_eq!(options.timeout, DEFAULT_TIMEOUT);
        assert!(!options.trust_multiplexer);
    }
}
