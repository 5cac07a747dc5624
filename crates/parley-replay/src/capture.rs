//! Reading recorded bus traffic.
//!
//! A capture is a JSON-lines file: one [`BusEnvelope`] per line, in the
//! order the transport delivered them. Blank lines and lines starting with
//! `#` are skipped.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};

use parley_shared::protocol::BusEnvelope;
use parley_shared::{ChannelId, ThreadId, Topic};

pub fn read_capture(path: &Path) -> Result<Vec<BusEnvelope>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading capture {}", path.display()))?;
    parse_capture(&text)
}

pub fn parse_capture(text: &str) -> Result<Vec<BusEnvelope>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("line {}: invalid envelope", index + 1))
        })
        .collect()
}

/// Thread topics the capture carries traffic for. These have to be opened
/// explicitly before replaying; channel topics come from the bootstrap.
pub fn thread_topics(envelopes: &[BusEnvelope]) -> BTreeSet<(ChannelId, ThreadId)> {
    envelopes
        .iter()
        .filter_map(|envelope| match envelope.topic {
            Topic::Thread(channel_id, thread_id) => Some((channel_id, thread_id)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn skips_comments_and_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# captured from staging").unwrap();
        writeln!(
            file,
            r#"{{"topic": "channel:1", "sequence_id": 1, "payload": {{"type": "typing"}}}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"topic": "channel:1:thread:4", "sequence_id": 1, "payload": {{}}}}"#
        )
        .unwrap();

        let envelopes = read_capture(file.path()).unwrap();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0].topic, Topic::Channel(ChannelId(1)));
        assert_eq!(envelopes[1].sequence_id, 1);

        let threads = thread_topics(&envelopes);
        assert_eq!(threads.into_iter().collect::<Vec<_>>(), vec![(ChannelId(1), ThreadId(4))]);
    }

    #[test]
    fn reports_the_offending_line() {
        let text = "{\"topic\": \"channel:1\", \"sequence_id\": 1, \"payload\": {}}\nnot json\n";
        let err = parse_capture(text).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_capture(&dir.path().join("absent.jsonl")).is_err());
    }
}
