#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]

//! logsrvd-core — the session log relay and storage core of a
//! privileged-command audit logging service.
//!
//! This library exposes the building blocks a host wires up to a network
//! listener, a wire-format codec, and an event loop:
//! - `dispatcher` — routes decoded messages to whichever sink a session has
//!   selected and tracks cumulative elapsed time
//! - `sink` — the local and journal storage backends
//! - `iolog` — the local sink's on-disk I/O log file bundle
//! - `eventlog` — the accept/reject/alert event-log formatter
//! - `message` — the decoded wire-message sum type and its decode hook
//! - `path` — bounded path formatting, directory creation, advisory locks
//! - `time` — elapsed-time accumulation
//! - `config` — typed configuration the sinks read
//! - `error` — the crate's error taxonomy

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod eventlog;
pub mod iolog;
pub mod message;
pub mod path;
pub mod sink;
pub mod time;

pub use config::LogConfig;
pub use dispatcher::{Dispatcher, HandleOutcome, SessionContext};
pub use error::{LogError, Result};
pub use message::{ClientMessage, MessageCodec};
pub use sink::{journal::JournalSink, local::LocalSink, LogIdReply, Sink};
pub use time::{Delay, ElapsedTime};
