//! The event-log formatter: renders accept/reject/alert records as
//! structured key/value entries plus an embedded info block.
//!
//! Output routing (syslog, file, rotation) belongs to an external event-log
//! library; this module only builds the in-memory record.

use crate::error::Result;
use crate::message::{InfoMessage, InfoValue};
use crate::time::ElapsedTime;

/// One rendered info entry: a key paired with a kind-tagged value. Anything
/// other than number/string/string-list is a formatting error, not a
/// variant of this type.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedValue {
    Number(f64),
    Str(String),
    StrList(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEntry {
    pub key: String,
    pub value: RenderedValue,
}

/// The event-log structure the local sink anchors at an accept's
/// `submit_time`, e.g. for later `restart` to stash `iolog_path` in.
///
/// `records` retains every rendered accept/reject/alert record emitted this
/// session. The formatter owns producing the record; routing it to syslog or
/// a file is an external event-log library's job (see module docs above),
/// but this crate still needs to keep what it produced observable rather
/// than building then discarding it.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pub iolog_path: Option<String>,
    pub submit_time: Option<ElapsedTime>,
    pub records: Vec<EventRecord>,
}

impl EventLog {
    /// Append a freshly rendered record, matching the formatter's "emit an
    /// accept/reject/alert record" step.
    pub fn push(&mut self, record: EventRecord) {
        self.records.push(record);
    }
}

/// Record kinds the formatter emits.
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    Accept {
        submit_time: ElapsedTime,
        info: Vec<RenderedEntry>,
    },
    Reject {
        submit_time: ElapsedTime,
        reason: String,
        info: Vec<RenderedEntry>,
    },
    Alert {
        alert_time: ElapsedTime,
        reason: String,
        info: Vec<RenderedEntry>,
    },
}

/// Visit each info entry of an accept/reject/alert message, emitting it as
/// a number, string, or string-list. Any other kind aborts the whole record
/// with a parse failure, matching the spec's "any other kind is an error".
pub fn render_info(info_msgs: &[InfoMessage]) -> Result<Vec<RenderedEntry>> {
    Ok(info_msgs
        .iter()
        .map(|info| {
            let value = match &info.value {
                InfoValue::Number(n) => RenderedValue::Number(*n),
                InfoValue::Str(s) => RenderedValue::Str(s.clone()),
                InfoValue::StrList(list) => RenderedValue::StrList(list.clone()),
            };
            RenderedEntry {
                key: info.key.clone(),
                value,
            }
        })
        .collect())
}

pub fn accept_record(submit_time: ElapsedTime, info_msgs: &[InfoMessage]) -> Result<EventRecord> {
    Ok(EventRecord::Accept {
        submit_time,
        info: render_info(info_msgs)?,
    })
}

pub fn reject_record(
    submit_time: ElapsedTime,
    reason: &str,
    info_msgs: &[InfoMessage],
) -> Result<EventRecord> {
    Ok(EventRecord::Reject {
        submit_time,
        reason: reason.to_string(),
        info: render_info(info_msgs)?,
    })
}

pub fn alert_record(
    alert_time: ElapsedTime,
    reason: &str,
    info_msgs: &[InfoMessage],
) -> Result<EventRecord> {
    Ok(EventRecord::Alert {
        alert_time,
        reason: reason.to_string(),
        info: render_info(info_msgs)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_record_carries_submit_time_and_info() {
        let info = vec![InfoMessage {
            key: "user".into(),
            value: InfoValue::Str("alice".into()),
        }];
        let rec = accept_record(ElapsedTime::new(1000, 0), &info).unwrap();
        assert_eq!(
            rec,
            EventRecord::Accept {
                submit_time: ElapsedTime::new(1000, 0),
                info: vec![RenderedEntry {
                    key: "user".into(),
                    value: RenderedValue::Str("alice".into()),
                }],
            }
        );
    }

    #[test]
    fn strlist_info_renders_as_list() {
        let info = vec![InfoMessage {
            key: "command".into(),
            value: InfoValue::StrList(vec!["ls".into(), "-l".into()]),
        }];
        let rendered = render_info(&info).unwrap();
        assert_eq!(
            rendered[0].value,
            RenderedValue::StrList(vec!["ls".into(), "-l".into()])
        );
    }
}
