//! The decoded message surface the dispatcher routes.
//!
//! Decoding the framed wire bytes into these variants, and re-encoding them
//! for the journal, is a black-box codec external to this crate (the network
//! listener and protocol-buffer layer). This module only defines the typed
//! shape a host's codec must produce.

use crate::time::{Delay, ElapsedTime};

/// One I/O data stream kind, plus the two non-stream timing-record kinds.
/// The numeric values match the wire protocol's event-kind numbering, since
/// the timing file embeds this value directly (e.g. a `TtyOut` data record
/// is written as `"2 <delay> <len>\n"`). Do not renumber without checking
/// the timing-file schema's worked examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IoFd {
    TtyIn = 0,
    StdIn = 1,
    TtyOut = 2,
    StdOut = 3,
    StdErr = 4,
    Timing = 5,
}

impl IoFd {
    pub const ALL_STREAMS: [IoFd; 5] = [
        IoFd::TtyIn,
        IoFd::TtyOut,
        IoFd::StdIn,
        IoFd::StdOut,
        IoFd::StdErr,
    ];

    /// The file name this stream is persisted under in an I/O log directory.
    pub fn file_name(self) -> &'static str {
        match self {
            IoFd::TtyIn => "ttyin",
            IoFd::TtyOut => "ttyout",
            IoFd::StdIn => "stdin",
            IoFd::StdOut => "stdout",
            IoFd::StdErr => "stderr",
            IoFd::Timing => "timing",
        }
    }
}

/// Fixed timing-record kinds outside the `IoFd` stream range, matching the
/// wire protocol's event-kind constants.
pub const WINSIZE_KIND: i32 = 6;
pub const SUSPEND_KIND: i32 = 7;

/// One info-message value, carried on `Accept`/`Reject`/`Alert`.
#[derive(Debug, Clone)]
pub enum InfoValue {
    Number(f64),
    Str(String),
    StrList(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct InfoMessage {
    pub key: String,
    pub value: InfoValue,
}

#[derive(Debug, Clone)]
pub struct AcceptMessage {
    pub submit_time: ElapsedTime,
    pub expect_iobufs: bool,
    pub info_msgs: Vec<InfoMessage>,
}

#[derive(Debug, Clone)]
pub struct RejectMessage {
    pub submit_time: ElapsedTime,
    pub reason: String,
    pub info_msgs: Vec<InfoMessage>,
}

#[derive(Debug, Clone)]
pub struct ExitMessage {
    pub exit_value: Option<i32>,
    pub signal: Option<String>,
    pub dumped_core: bool,
}

#[derive(Debug, Clone)]
pub struct RestartMessage {
    pub log_id: String,
    pub resume_point: ElapsedTime,
}

#[derive(Debug, Clone)]
pub struct AlertMessage {
    pub alert_time: ElapsedTime,
    pub reason: String,
    pub info_msgs: Vec<InfoMessage>,
}

/// The eight-variant discriminated union the dispatcher routes. Each arm
/// carries its own payload rather than sharing a base type.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Accept(AcceptMessage),
    Reject(RejectMessage),
    Exit(ExitMessage),
    Restart(RestartMessage),
    Alert(AlertMessage),
    IoBuffer {
        kind: IoFd,
        delay: Delay,
        data: Vec<u8>,
    },
    Suspend {
        delay: Delay,
        signal: String,
    },
    WindowSize {
        delay: Delay,
        rows: u32,
        cols: u32,
    },
}

impl ClientMessage {
    /// The delay this variant carries, if any. Only data/timing events
    /// advance elapsed time; `Accept`/`Reject`/`Exit`/`Restart`/`Alert` do not.
    pub fn delay(&self) -> Option<Delay> {
        match self {
            ClientMessage::IoBuffer { delay, .. }
            | ClientMessage::Suspend { delay, .. }
            | ClientMessage::WindowSize { delay, .. } => Some(*delay),
            _ => None,
        }
    }

    /// A short name for tracing, matching the wire protocol's type-case names.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ClientMessage::Accept(_) => "AcceptMessage",
            ClientMessage::Reject(_) => "RejectMessage",
            ClientMessage::Exit(_) => "ExitMessage",
            ClientMessage::Restart(_) => "RestartMessage",
            ClientMessage::Alert(_) => "AlertMessage",
            ClientMessage::IoBuffer { .. } => "IoBuffer",
            ClientMessage::Suspend { .. } => "SuspendMessage",
            ClientMessage::WindowSize { .. } => "WinsizeMessage",
        }
    }
}

/// Decodes raw framed bytes into a [`ClientMessage`]. The real wire format
/// is a black-box codec owned by the host (protocol-buffer messages over a
/// length-prefixed socket framing); this crate only needs a decode hook so
/// the journal sink can replay previously-stored frames during `restart`.
pub trait MessageCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Option<ClientMessage>;
}
