//! The capability set both storage backends implement.
//!
//! The original source keeps two static `struct client_message_switch`
//! vtables (`cms_local`, `cms_journal`) and dispatches through whichever one
//! a session selected at accept/restart time. This crate expresses that as a
//! `Sink` trait with one method per message variant; the dispatcher holds
//! `Box<dyn Sink>` rather than a function-pointer table.
//!
//! Every method also receives the original framed bytes the host's codec
//! decoded the message from. The local sink ignores them (it stores
//! structured timing lines instead); the journal sink journals them
//! verbatim, matching the spec's "write one frame containing the raw bytes
//! as received".

pub mod journal;
pub mod local;

use crate::error::Result;
use crate::message::{
    AcceptMessage, AlertMessage, ExitMessage, IoFd, RejectMessage, RestartMessage,
};
use crate::time::Delay;

/// Outcome of a successful `accept`/`restart` call: whether a `LogId` reply
/// should be queued, and with what value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogIdReply {
    None,
    Send(String),
}

pub trait Sink {
    fn accept(&mut self, msg: &AcceptMessage, raw: &[u8]) -> Result<LogIdReply>;
    fn reject(&mut self, msg: &RejectMessage, raw: &[u8]) -> Result<()>;
    fn alert(&mut self, msg: &AlertMessage, raw: &[u8]) -> Result<()>;
    fn exit(&mut self, msg: &ExitMessage, raw: &[u8]) -> Result<()>;
    fn iobuf(&mut self, kind: IoFd, delay: Delay, data: &[u8], raw: &[u8]) -> Result<()>;
    fn winsize(&mut self, delay: Delay, rows: u32, cols: u32, raw: &[u8]) -> Result<()>;
    fn suspend(&mut self, delay: Delay, signal: &str, raw: &[u8]) -> Result<()>;
    /// Restart against an existing on-disk log, seeking to `msg.resume_point`.
    /// Returns the reached elapsed time so the dispatcher can set `ctx.elapsed`
    /// to it directly (restart does not go through the normal per-message
    /// accumulation path).
    fn restart(&mut self, msg: &RestartMessage) -> Result<crate::time::ElapsedTime>;
}
