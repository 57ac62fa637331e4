//! The journal sink: raw wire messages serialized verbatim into a
//! length-prefixed spool file, finalized by an atomic rename from
//! `incoming/` to `outgoing/`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use crate::config::LogConfig;
use crate::error::{LogError, Result};
use crate::message::{
    AcceptMessage, AlertMessage, ExitMessage, IoFd, MessageCodec, RejectMessage, RestartMessage,
};
use crate::path::{self, lock_exclusive_nonblocking};
use crate::sink::{LogIdReply, Sink};
use crate::time::{Delay, ElapsedTime};

/// The growth-buffer replay cap applies a next-power-of-two policy; this is
/// its starting capacity before any frame forces it to grow.
const INITIAL_BUFFER: usize = 4096;

pub struct JournalSink {
    config: Arc<LogConfig>,
    codec: Arc<dyn MessageCodec>,
    file: Option<File>,
    path: Option<std::path::PathBuf>,
}

impl JournalSink {
    pub fn new(config: Arc<LogConfig>, codec: Arc<dyn MessageCodec>) -> Self {
        JournalSink {
            config,
            codec,
            file: None,
            path: None,
        }
    }

    pub fn journal_path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    fn create_journal(&mut self) -> Result<()> {
        let incoming = std::path::Path::new(&self.config.relay_dir).join("incoming");
        let created = path::create_unique(&incoming, "")
            .map_err(|_| LogError::StateViolation("unable to create/lock journal file".into()))?;
        if let Err(e) = lock_exclusive_nonblocking(&created.file) {
            let _ = std::fs::remove_file(&created.path);
            let _ = e;
            return Err(LogError::StateViolation("unable to create/lock journal file".into()));
        }
        self.path = Some(created.path);
        self.file = Some(created.file);
        Ok(())
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| LogError::StateViolation("unable to write journal file".into()))?;
        let len = u32::try_from(bytes.len()).map_err(|_| LogError::BoundExceeded)?;
        file.write_all(&len.to_be_bytes())
            .map_err(|e| LogError::io("write", e))?;
        file.write_all(bytes).map_err(|e| LogError::io("write", e))?;
        Ok(())
    }

    /// Flush, rewind, create a fresh unique path under `outgoing/`, close
    /// the throwaway file, and rename `incoming/<name>` onto it.
    fn finish(&mut self) -> Result<()> {
        {
            let file = self
                .file
                .as_mut()
                .ok_or_else(|| LogError::StateViolation("unable to write journal file".into()))?;
            file.flush()
                .map_err(|_| LogError::StateViolation("unable to write journal file".into()))?;
            file.seek(SeekFrom::Start(0)).map_err(|e| LogError::io("seek", e))?;
        }

        let outgoing = std::path::Path::new(&self.config.relay_dir).join("outgoing");
        let placeholder = path::create_unique(&outgoing, "")
            .map_err(|_| LogError::StateViolation("unable to rename journal file".into()))?;
        drop(placeholder.file);

        let old_path = self.path.clone().expect("journal path set before finish");
        match std::fs::rename(&old_path, &placeholder.path) {
            Ok(()) => {
                self.path = Some(placeholder.path);
                Ok(())
            }
            Err(_) => {
                let _ = std::fs::remove_file(&placeholder.path);
                Err(LogError::StateViolation("unable to rename journal file".into()))
            }
        }
    }

    /// Read frames from the journal file's current position, advancing a
    /// local elapsed-time accumulator for each decoded message that carries
    /// a delay, until it reaches `target` exactly.
    fn replay_seek(&mut self, target: ElapsedTime) -> Result<ElapsedTime> {
        let message_size_max = self.config.message_size_max;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| LogError::StateViolation("unable to create journal file".into()))?;

        let mut elapsed = ElapsedTime::ZERO;
        let mut buf: Vec<u8> = Vec::with_capacity(INITIAL_BUFFER);
        loop {
            let mut len_bytes = [0u8; 4];
            match file.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(LogError::UnexpectedEof);
                }
                Err(e) => return Err(LogError::io("read", e)),
            }
            let msg_len = u32::from_be_bytes(len_bytes);
            if msg_len > message_size_max {
                return Err(LogError::BoundExceeded);
            }

            if msg_len as usize > buf.capacity() {
                let grown = (msg_len as usize).next_power_of_two();
                buf = Vec::with_capacity(grown);
            }
            buf.resize(msg_len as usize, 0);
            if msg_len > 0 {
                file.read_exact(&mut buf).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        LogError::UnexpectedEof
                    } else {
                        LogError::io("read", e)
                    }
                })?;
            }

            let decoded = self.codec.decode(&buf).ok_or(LogError::Parse)?;
            tracing::debug!(kind = decoded.kind_name(), "seeking in journal replay");

            if let Some(delay) = decoded.delay() {
                elapsed = elapsed.add(delay);
                tracing::debug!(?elapsed, "journal replay elapsed time advanced");

                match elapsed.cmp(&target) {
                    std::cmp::Ordering::Equal => return Ok(elapsed),
                    std::cmp::Ordering::Greater => return Err(LogError::Parse),
                    std::cmp::Ordering::Less => continue,
                }
            }
        }
    }
}

impl Sink for JournalSink {
    fn accept(&mut self, msg: &AcceptMessage, raw: &[u8]) -> Result<LogIdReply> {
        self.create_journal()?;
        self.write_frame(raw)?;
        if msg.expect_iobufs {
            let path = self.path.clone().expect("journal path set by create_journal");
            return Ok(LogIdReply::Send(path.to_string_lossy().into_owned()));
        }
        Ok(LogIdReply::None)
    }

    fn reject(&mut self, _msg: &RejectMessage, raw: &[u8]) -> Result<()> {
        self.create_journal()?;
        self.write_frame(raw)
    }

    fn alert(&mut self, _msg: &AlertMessage, raw: &[u8]) -> Result<()> {
        self.write_frame(raw)
    }

    fn exit(&mut self, _msg: &ExitMessage, raw: &[u8]) -> Result<()> {
        self.write_frame(raw)?;
        self.finish()
    }

    fn iobuf(&mut self, _kind: IoFd, _delay: Delay, _data: &[u8], raw: &[u8]) -> Result<()> {
        self.write_frame(raw)
    }

    fn winsize(&mut self, _delay: Delay, _rows: u32, _cols: u32, raw: &[u8]) -> Result<()> {
        self.write_frame(raw)
    }

    fn suspend(&mut self, _delay: Delay, _signal: &str, raw: &[u8]) -> Result<()> {
        self.write_frame(raw)
    }

    fn restart(&mut self, msg: &RestartMessage) -> Result<ElapsedTime> {
        // Strip a leading hostname segment: keep everything after the first
        // '/', unless the id already begins with '/' (already host-free).
        let stripped = match msg.log_id.find('/') {
            Some(0) => msg.log_id.as_str(),
            Some(idx) => &msg.log_id[idx + 1..],
            None => msg.log_id.as_str(),
        };
        let journal_path = std::path::Path::new(&self.config.relay_dir)
            .join("incoming")
            .join(stripped);
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&journal_path)
            .map_err(|_| LogError::StateViolation("unable to create journal file".into()))?;
        self.path = Some(journal_path);
        self.file = Some(file);
        self.replay_seek(msg.resume_point)
    }
}
