//! Parser for `/proc/<pid>/stat` lines.
//!
//! The line has the shape `pid (comm) state ppid ...`. `comm` is chosen by
//! the process itself and may contain spaces and parentheses, so fields are
//! only split after the *last* `)` on the line.

use std::fmt;

use vessel_common::error::{Result, VesselError};

/// Position of `starttime` among the fields that follow `comm`
/// (field 22 of the line, the state being field 3).
const START_TIME_INDEX: usize = 19;

/// Scheduler state of a process, as reported in field 3 of `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcState {
    /// `R`
    Running,
    /// `S`, interruptible sleep.
    Sleeping,
    /// `D`, uninterruptible disk sleep.
    Waiting,
    /// `Z`, exited but not yet reaped.
    Zombie,
    /// `T`, stopped by a job-control signal.
    Stopped,
    /// `t`, stopped under a tracer.
    TracingStop,
    /// `X` or `x`.
    Dead,
    /// `K`
    Wakekill,
    /// `W`
    Waking,
    /// `P`
    Parked,
    /// `I`, idle kernel thread.
    Idle,
}

impl ProcState {
    /// Maps a single state character to a state.
    #[must_use]
    pub const fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'R' => Self::Running,
            'S' => Self::Sleeping,
            'D' => Self::Waiting,
            'Z' => Self::Zombie,
            'T' => Self::Stopped,
            't' => Self::TracingStop,
            'X' | 'x' => Self::Dead,
            'K' => Self::Wakekill,
            'W' => Self::Waking,
            'P' => Self::Parked,
            'I' => Self::Idle,
            _ => return None,
        })
    }

    /// Returns the canonical state character.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Running => 'R',
            Self::Sleeping => 'S',
            Self::Waiting => 'D',
            Self::Zombie => 'Z',
            Self::Stopped => 'T',
            Self::TracingStop => 't',
            Self::Dead => 'X',
            Self::Wakekill => 'K',
            Self::Waking => 'W',
            Self::Parked => 'P',
            Self::Idle => 'I',
        }
    }

    /// Whether the process can still run. Zombies and dead entries cannot.
    #[must_use]
    pub const fn is_alive(self) -> bool {
        !matches!(self, Self::Zombie | Self::Dead)
    }
}

impl fmt::Display for ProcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Fields of a `stat` line the runtime cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Process ID (field 1).
    pub pid: u32,
    /// Executable name without the surrounding parentheses (field 2).
    pub comm: String,
    /// Scheduler state (field 3).
    pub state: ProcState,
    /// Parent process ID (field 4).
    pub ppid: u32,
    /// Start time in clock ticks since boot (field 22), kept verbatim.
    pub start_time: String,
}

/// Extracts the state from a `stat` line.
///
/// # Errors
///
/// Returns [`VesselError::Parse`] if the line has no `)`, nothing follows
/// it, or the state field is not a known single character.
pub fn parse_state(line: &str) -> Result<ProcState> {
    let (_, rest) = split_comm(line)?;
    let token = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| parse_error("no fields after process name", line))?;
    state_from_token(token, line)
}

/// Parses the identity-relevant fields of a `stat` line.
///
/// # Errors
///
/// Returns [`VesselError::Parse`] for a malformed or truncated line.
pub fn parse_stat(line: &str) -> Result<Stat> {
    let (head, rest) = split_comm(line)?;
    let open = head
        .find('(')
        .ok_or_else(|| parse_error("missing '(' before process name", line))?;
    let pid = head[..open]
        .trim()
        .parse()
        .map_err(|_| parse_error("invalid pid field", line))?;
    let comm = head[open + 1..].to_string();

    let fields: Vec<&str> = rest.split_whitespace().collect();
    let state = state_from_token(
        fields
            .first()
            .ok_or_else(|| parse_error("no fields after process name", line))?,
        line,
    )?;
    let ppid = fields
        .get(1)
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| parse_error("missing or invalid ppid field", line))?;
    let start_time = fields
        .get(START_TIME_INDEX)
        .ok_or_else(|| parse_error("line truncated before starttime field", line))?;

    Ok(Stat {
        pid,
        comm,
        state,
        ppid,
        start_time: (*start_time).to_string(),
    })
}

/// Decodes a raw `stat` line.
///
/// `comm` may hold arbitrary bytes; they are decoded lossily. Everything
/// after the last `)` is kernel-formatted ASCII and passes through intact.
#[must_use]
pub fn decode_line(raw: &[u8]) -> String {
    match raw.iter().rposition(|&b| b == b')') {
        Some(close) => {
            let mut line = String::from_utf8_lossy(&raw[..=close]).into_owned();
            line.push_str(&String::from_utf8_lossy(&raw[close + 1..]));
            line
        }
        None => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// Splits at the last `)`: `head` is `pid (comm`, `rest` everything after.
fn split_comm(line: &str) -> Result<(&str, &str)> {
    let close = line
        .rfind(')')
        .ok_or_else(|| parse_error("missing ')' after process name", line))?;
    let rest = &line[close + 1..];
    if rest.trim().is_empty() {
        return Err(parse_error("no fields after process name", line));
    }
    Ok((&line[..close], rest))
}

fn state_from_token(token: &str, line: &str) -> Result<ProcState> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(code), None) => ProcState::from_code(code)
            .ok_or_else(|| parse_error(&format!("unknown state {code:?}"), line)),
        _ => Err(parse_error("state field is not a single character", line)),
    }
}

fn parse_error(what: &str, line: &str) -> VesselError {
    VesselError::Parse {
        message: format!("/proc stat: {what}: {line:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUNICORN: &str = "4902 (gunicorn: maste) S 4885 4902 4902 0 -1 4194560 29683 29929 61 83 78 16 96 17 20 0 1 0 9126532 52965376 1903 18446744073709551615 4194304 7461796 140733928751520 140733928698072 139816984959091 0 0 16781312 137447943 1 0 0 17 3 0 0 9 0 0 9559488 10071156 33050624 140733928758775 140733928758945 140733928758945 140733928759264 0";
    const CAT: &str = "9534 (cat) R 9323 9534 9323 34828 9534 4194304 95 0 0 0 0 0 0 0 20 0 1 0 9214966 7626752 168 18446744073709551615 4194304 4240332 140732237651568 140732237650920 140570710391216 0 0 0 0 0 0 0 17 1 0 0 0 0 0 6340112 6341364 21553152 140732237653865 140732237653885 140732237653885 140732237656047 0";
    const IRQ: &str = "24767 (irq/44-mei_me) S 2 0 0 0 -1 2129984 0 0 0 0 0 0 0 0 -51 0 1 0 8722075 0 0 18446744073709551615 0 0 0 0 0 0 0 2147483647 0 0 0 0 17 1 50 1 0 0 0 0 0 0 0 0 0 0 0";

    #[test]
    fn parses_state_of_real_lines() {
        for (line, expected) in [(GUNICORN, 'S'), (CAT, 'R'), (IRQ, 'S')] {
            assert_eq!(parse_state(line).unwrap().code(), expected, "{line}");
        }
    }

    #[test]
    fn name_with_parens_uses_last_close_paren() {
        let line = "77 (evil) Z (x) ) T 1 77 77 0 -1 0 0 0 0 0 0 0 0 0 20 0 1 0 555 0 0";
        assert_eq!(parse_state(line).unwrap(), ProcState::Stopped);
        let stat = parse_stat(line).unwrap();
        assert_eq!(stat.comm, "evil) Z (x) ");
        assert_eq!(stat.ppid, 1);
        assert_eq!(stat.start_time, "555");
    }

    #[test]
    fn non_utf8_name_is_decoded_lossily() {
        let raw = b"321 (a\xff) b) R 7 321 321 0 -1 0 0 0 0 0 0 0 0 0 20 0 1 0 4242 0 0\n";
        let line = decode_line(raw);
        let stat = parse_stat(&line).unwrap();
        assert_eq!(stat.pid, 321);
        assert_eq!(stat.comm, "a\u{fffd}) b");
        assert_eq!(stat.state, ProcState::Running);
        assert_eq!(stat.ppid, 7);
        assert_eq!(stat.start_time, "4242");
    }

    #[test]
    fn parse_stat_extracts_identity_fields() {
        let stat = parse_stat(GUNICORN).unwrap();
        assert_eq!(stat.pid, 4902);
        assert_eq!(stat.comm, "gunicorn: maste");
        assert_eq!(stat.state, ProcState::Sleeping);
        assert_eq!(stat.ppid, 4885);
        assert_eq!(stat.start_time, "9126532");

        assert_eq!(parse_stat(IRQ).unwrap().start_time, "8722075");
    }

    #[test]
    fn missing_close_paren_is_parse_error() {
        let err = parse_state("123 (truncated S 1 2 3").unwrap_err();
        assert!(matches!(err, VesselError::Parse { .. }));
    }

    #[test]
    fn empty_remainder_is_parse_error() {
        assert!(matches!(
            parse_state("123 (cat)").unwrap_err(),
            VesselError::Parse { .. }
        ));
        assert!(matches!(
            parse_state("123 (cat)   \n").unwrap_err(),
            VesselError::Parse { .. }
        ));
    }

    #[test]
    fn unknown_or_wide_state_is_parse_error() {
        assert!(parse_state("1 (init) Q 0").is_err());
        assert!(parse_state("1 (init) SS 0").is_err());
    }

    #[test]
    fn truncated_line_has_state_but_no_start_time() {
        let line = "1 (init) S 0 1 1";
        assert_eq!(parse_state(line).unwrap(), ProcState::Sleeping);
        assert!(matches!(
            parse_stat(line).unwrap_err(),
            VesselError::Parse { .. }
        ));
    }

    #[test]
    fn zombie_and_dead_are_not_alive() {
        assert!(!ProcState::Zombie.is_alive());
        assert!(!ProcState::from_code('x').unwrap().is_alive());
        assert!(ProcState::TracingStop.is_alive());
        assert_eq!(ProcState::from_code('x').unwrap().code(), 'X');
    }
}
