//! End-to-end scenarios driving a `Dispatcher` over a full session:
//! accept -> iobuf x N -> exit, and accept -> iobuf -> restart -> iobuf,
//! against both storage backends.

use std::sync::Arc;

use logsrvd_core::{
    ClientMessage, Dispatcher, HandleOutcome, JournalSink, LocalSink, LogConfig, MessageCodec,
    SessionContext,
};

use logsrvd_core::message::{AcceptMessage, ExitMessage, IoFd, InfoMessage, InfoValue, RestartMessage};
use logsrvd_core::time::ElapsedTime;

fn config(dir: &std::path::Path) -> Arc<LogConfig> {
    let mut cfg = LogConfig::default();
    cfg.iolog_dir = dir.join("iolog").to_string_lossy().into_owned();
    cfg.relay_dir = dir.join("relay").to_string_lossy().into_owned();
    Arc::new(cfg)
}

#[test]
fn local_sink_full_session_then_independent_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());

    let mut dispatcher = Dispatcher::new(Box::new(LocalSink::new(cfg.clone())));
    let mut ctx = SessionContext::new();

    let outcome = dispatcher
        .handle(
            &ClientMessage::Accept(AcceptMessage {
                submit_time: ElapsedTime::ZERO,
                expect_iobufs: true,
                info_msgs: vec![InfoMessage {
                    key: "user".into(),
                    value: InfoValue::Str("alice".into()),
                }],
            }),
            &[],
            &mut ctx,
        )
        .unwrap();
    let HandleOutcome::SendLogId(log_id) = outcome else {
        panic!("expected a log-id reply when iobufs are expected");
    };

    for _ in 0..5 {
        dispatcher
            .handle(
                &ClientMessage::IoBuffer {
                    kind: IoFd::TtyOut,
                    delay: ElapsedTime::new(0, 100_000_000),
                    data: b"hello".to_vec(),
                },
                &[],
                &mut ctx,
            )
            .unwrap();
    }
    assert_eq!(ctx.elapsed, ElapsedTime::new(0, 500_000_000));

    dispatcher
        .handle(
            &ClientMessage::Exit(ExitMessage {
                exit_value: Some(0),
                signal: None,
                dumped_core: false,
            }),
            &[],
            &mut ctx,
        )
        .unwrap();
    assert!(ctx.errstr.is_none());

    let stream_path = std::path::Path::new(&cfg.iolog_dir).join(&log_id).join("ttyout");
    let contents = std::fs::read_to_string(stream_path).unwrap();
    assert_eq!(contents, "hello".repeat(5));

    // A fresh dispatcher over the same log-id refuses to restart a
    // finalized session (liveness bit cleared by exit's mark_complete).
    let mut restarted = Dispatcher::new(Box::new(LocalSink::new(cfg)));
    let mut restart_ctx = SessionContext::new();
    let err = restarted
        .handle(
            &ClientMessage::Restart(RestartMessage {
                log_id,
                resume_point: ElapsedTime::new(0, 300_000_000),
            }),
            &[],
            &mut restart_ctx,
        )
        .unwrap_err();
    let _ = err;
    assert!(restart_ctx.errstr.is_some());
}

#[test]
fn local_sink_restart_mid_session_resumes_and_appends() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());

    let mut first = Dispatcher::new(Box::new(LocalSink::new(cfg.clone())));
    let mut ctx = SessionContext::new();
    let HandleOutcome::SendLogId(log_id) = first
        .handle(
            &ClientMessage::Accept(AcceptMessage {
                submit_time: ElapsedTime::ZERO,
                expect_iobufs: true,
                info_msgs: vec![],
            }),
            &[],
            &mut ctx,
        )
        .unwrap()
    else {
        panic!("expected a log-id reply");
    };
    for _ in 0..3 {
        first
            .handle(
                &ClientMessage::IoBuffer {
                    kind: IoFd::TtyOut,
                    delay: ElapsedTime::new(0, 100_000_000),
                    data: b"abc".to_vec(),
                },
                &[],
                &mut ctx,
            )
            .unwrap();
    }
    // Session is interrupted without an Exit, so the timing file's
    // liveness bit stays set and a restart is legal.
    drop(first);

    let mut second = Dispatcher::new(Box::new(LocalSink::new(cfg)));
    let mut restart_ctx = SessionContext::new();
    let outcome = second
        .handle(
            &ClientMessage::Restart(RestartMessage {
                log_id,
                resume_point: ElapsedTime::new(0, 300_000_000),
            }),
            &[],
            &mut restart_ctx,
        )
        .unwrap();
    assert_eq!(outcome, HandleOutcome::Continue);
    assert_eq!(restart_ctx.elapsed, ElapsedTime::new(0, 300_000_000));

    second
        .handle(
            &ClientMessage::IoBuffer {
                kind: IoFd::TtyOut,
                delay: ElapsedTime::new(0, 50_000_000),
                data: b"xyz".to_vec(),
            },
            &[],
            &mut restart_ctx,
        )
        .unwrap();
    assert_eq!(restart_ctx.elapsed, ElapsedTime::new(0, 350_000_000));
}

/// A minimal text-based wire codec used only by these integration tests,
/// standing in for the protocol-buffer codec a real host supplies.
struct TextCodec;

fn encode(msg: &ClientMessage) -> Vec<u8> {
    match msg {
        ClientMessage::Accept(a) => format!("A {} {}", a.submit_time, a.expect_iobufs).into_bytes(),
        ClientMessage::Exit(_) => b"E".to_vec(),
        ClientMessage::Restart(r) => format!("R {} {}", r.log_id, r.resume_point).into_bytes(),
        ClientMessage::IoBuffer { kind, delay, data } => {
            let mut out = format!("I {} {delay} ", *kind as u8).into_bytes();
            out.extend_from_slice(data);
            out
        }
        _ => unimplemented!("not exercised by this test codec"),
    }
}

fn parse_elapsed(s: &str) -> Option<ElapsedTime> {
    let (sec, nsec) = s.split_once('.')?;
    Some(ElapsedTime::new(sec.parse().ok()?, nsec.parse().ok()?))
}

impl MessageCodec for TextCodec {
    fn decode(&self, bytes: &[u8]) -> Option<ClientMessage> {
        if let Some(rest) = std::str::from_utf8(bytes).ok().and_then(|s| s.strip_prefix("A ")) {
            let mut parts = rest.splitn(2, ' ');
            let submit_time = parse_elapsed(parts.next()?)?;
            let expect_iobufs = parts.next()? == "true";
            return Some(ClientMessage::Accept(AcceptMessage {
                submit_time,
                expect_iobufs,
                info_msgs: vec![],
            }));
        }
        if bytes == b"E" {
            return Some(ClientMessage::Exit(ExitMessage {
                exit_value: Some(0),
                signal: None,
                dumped_core: false,
            }));
        }
        if bytes.starts_with(b"I ") {
            let rest = &bytes[2..];
            let sp = rest.iter().position(|&b| b == b' ')?;
            let kind_byte: u8 = std::str::from_utf8(&rest[..sp]).ok()?.parse().ok()?;
            let rest2 = &rest[sp + 1..];
            let sp2 = rest2.iter().position(|&b| b == b' ')?;
            let delay = parse_elapsed(std::str::from_utf8(&rest2[..sp2]).ok()?)?;
            let data = rest2[sp2 + 1..].to_vec();
            let kind = match kind_byte {
                2 => IoFd::TtyOut,
                _ => return None,
            };
            return Some(ClientMessage::IoBuffer { kind, delay, data });
        }
        None
    }
}

#[test]
fn journal_sink_full_session_spools_and_finalizes() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());

    let mut dispatcher = Dispatcher::new(Box::new(JournalSink::new(cfg.clone(), Arc::new(TextCodec))));
    let mut ctx = SessionContext::new();

    let accept = AcceptMessage {
        submit_time: ElapsedTime::ZERO,
        expect_iobufs: true,
        info_msgs: vec![],
    };
    let accept_raw = encode(&ClientMessage::Accept(accept.clone()));
    let outcome = dispatcher
        .handle(&ClientMessage::Accept(accept), &accept_raw, &mut ctx)
        .unwrap();
    assert!(matches!(outcome, HandleOutcome::SendLogId(_)));

    for _ in 0..4 {
        let msg = ClientMessage::IoBuffer {
            kind: IoFd::TtyOut,
            delay: ElapsedTime::new(0, 100_000_000),
            data: b"abcd".to_vec(),
        };
        let raw = encode(&msg);
        dispatcher.handle(&msg, &raw, &mut ctx).unwrap();
    }
    assert_eq!(ctx.elapsed, ElapsedTime::new(0, 400_000_000));

    let exit = ExitMessage {
        exit_value: Some(0),
        signal: None,
        dumped_core: false,
    };
    let exit_raw = encode(&ClientMessage::Exit(exit.clone()));
    dispatcher.handle(&ClientMessage::Exit(exit), &exit_raw, &mut ctx).unwrap();

    let incoming = std::path::Path::new(&cfg.relay_dir).join("incoming");
    let outgoing = std::path::Path::new(&cfg.relay_dir).join("outgoing");
    assert_eq!(std::fs::read_dir(&incoming).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(&outgoing).unwrap().count(), 1);
}
