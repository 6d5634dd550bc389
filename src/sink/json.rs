use std::io::Write;

use super::{Event, Sink};

/// One JSON object per event. Compact output is newline-delimited; with
/// [`JsonSink::pretty`] each object spans several lines, so readers must
/// parse a JSON stream rather than split on newlines.
pub struct JsonSink {
    out: Box<dyn Write + Send>,
    pretty: bool,
}

impl JsonSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out, pretty: false }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Sink for JsonSink {
    fn on_event(&mut self, event: &Event) -> anyhow::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, event)?;
        } else {
            serde_json::to_writer(&mut self.out, event)?;
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::resolver::Resolved;
    use crate::session::Session;
    use crate::stats::{RunningStats, Snapshot};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn recovered_event_is_one_json_line() {
        let session = Session::new(
            "example.com",
            Resolved {
                address: "192.0.2.1".parse().unwrap(),
                literal: false,
            },
            443,
        );
        let stats = RunningStats::new(session.address, session.started_at);
        let buffer = Buffer::default();
        let mut sink = JsonSink::new(Box::new(buffer.clone()));

        sink.on_event(&Event::RecoveredFromDowntime {
            downtime: Duration::from_secs(3),
            snapshot: Snapshot::capture(&session, &stats, Utc::now()),
        })
        .unwrap();

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written.lines().count(), 1);

        let value: serde_json::Value = serde_json::from_str(written.trim_end()).unwrap();
        assert_eq!(value["event"], "recovered_from_downtime");
        assert_eq!(value["downtime_ms"], 3000.0);
        assert_eq!(value["snapshot"]["rtt"], serde_json::Value::Null);
        assert_eq!(value["snapshot"]["stats"]["total_successful_probes"], 0);
    }

    #[test]
    fn pretty_output_spans_lines_but_stays_a_json_stream() {
        let session = Session::new(
            "example.com",
            Resolved {
                address: "192.0.2.1".parse().unwrap(),
                literal: false,
            },
            443,
        );
        let buffer = Buffer::default();
        let mut sink = JsonSink::new(Box::new(buffer.clone())).pretty(true);

        sink.on_event(&Event::SessionStart {
            target: session.target(session.address),
        })
        .unwrap();
        sink.on_event(&Event::RetryingResolution {
            target: session.target(session.address),
        })
        .unwrap();

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(written.lines().count() > 2);

        let events: Vec<serde_json::Value> = serde_json::Deserializer::from_str(&written)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["event"], "retrying_resolution");
    }
}
