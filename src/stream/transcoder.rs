use crate::protocol::destination::push_assistant_frame;
use crate::protocol::source::{parse_source_payload, SourcePayload};
use crate::stream::sse::FRAME_SEPARATOR;

pub const DATA_MARKER: &str = "data: ";

/// Source of destination message ids. Ids must be unique per emitted message.
pub trait MessageIdSource {
    fn next_id(&mut self) -> String;
}

/// Random UUID v4 ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidMessageIds;

impl MessageIdSource for UuidMessageIds {
    fn next_id(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Transcoded,
    PassedThrough(PassThroughReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughReason {
    /// The frame does not start with `data: `.
    NotData,
    /// Valid JSON without a `response` envelope.
    Unenveloped,
    /// The `data:` payload is not valid JSON.
    ParseFailed,
}

/// Per-stream frame counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeStats {
    pub transcoded: u64,
    pub passed_through: u64,
    pub parse_failures: u64,
}

/// Re-envelopes backend SSE frames for the chat client.
///
/// Frames carrying a `response` envelope become
/// `data: {"id","role":"assistant","content"}` frames. Everything else is
/// forwarded unchanged with its separator restored, so no frame can fail the
/// stream.
pub struct EventTranscoder<I = UuidMessageIds> {
    ids: I,
    stats: TranscodeStats,
}

impl EventTranscoder<UuidMessageIds> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ids(UuidMessageIds)
    }
}

impl Default for EventTranscoder<UuidMessageIds> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MessageIdSource> EventTranscoder<I> {
    #[must_use]
    pub fn with_ids(ids: I) -> Self {
        Self {
            ids,
            stats: TranscodeStats::default(),
        }
    }

    /// Transcode one frame (separator already stripped) and append the wire
    /// text to `out`.
    pub fn transcode_frame_into(&mut self, frame: &str, out: &mut String) -> FrameOutcome {
        let Some(data) = frame.strip_prefix(DATA_MARKER) else {
            return self.pass_through(frame, out, PassThroughReason::NotData);
        };

        match parse_source_payload(data) {
            Ok(SourcePayload::Response(response)) => {
                let id = self.ids.next_id();
                push_assistant_frame(out, &id, &response.content());
                self.stats.transcoded += 1;
                tracing::trace!(
                    message_id = %id,
                    response_type = response.type_name(),
                    "transcoded backend event"
                );
                FrameOutcome::Transcoded
            }
            Ok(SourcePayload::Unenveloped) => {
                self.pass_through(frame, out, PassThroughReason::Unenveloped)
            }
            Err(err) => {
                self.stats.parse_failures += 1;
                tracing::warn!(
                    error = %err,
                    payload = %truncate_for_log(data),
                    "failed to parse backend event, forwarding unchanged"
                );
                self.pass_through(frame, out, PassThroughReason::ParseFailed)
            }
        }
    }

    /// Convenience wrapper returning the wire text for one frame.
    pub fn transcode_frame(&mut self, frame: &str) -> (FrameOutcome, String) {
        let mut out = String::with_capacity(frame.len() + 64);
        let outcome = self.transcode_frame_into(frame, &mut out);
        (outcome, out)
    }

    #[must_use]
    pub fn stats(&self) -> TranscodeStats {
        self.stats
    }

    fn pass_through(
        &mut self,
        frame: &str,
        out: &mut String,
        reason: PassThroughReason,
    ) -> FrameOutcome {
        out.push_str(frame);
        out.push_str(FRAME_SEPARATOR);
        self.stats.passed_through += 1;
        FrameOutcome::PassedThrough(reason)
    }
}

fn truncate_for_log(data: &str) -> &str {
    const MAX_LEN: usize = 200;
    if data.len() <= MAX_LEN {
        return data;
    }
    let mut end = MAX_LEN;
    while !data.is_char_boundary(end) {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DestinationMessage;

    #[derive(Default)]
    struct SequentialIds(u32);

    impl MessageIdSource for SequentialIds {
        fn next_id(&mut self) -> String {
            self.0 += 1;
            format!("msg-{}", self.0)
        }
    }

    fn transcoder() -> EventTranscoder<SequentialIds> {
        EventTranscoder::with_ids(SequentialIds::default())
    }

    fn decode_message(wire: &str) -> DestinationMessage {
        let json = wire
            .strip_prefix(DATA_MARKER)
            .and_then(|rest| rest.strip_suffix(FRAME_SEPARATOR))
            .expect("data frame");
        serde_json::from_str(json).expect("destination json")
    }

    #[test]
    fn test_text_response_is_transcoded() {
        let mut t = transcoder();
        let (outcome, wire) =
            t.transcode_frame(r#"data: {"response":{"type":"text_response","content":"hi"}}"#);
        assert_eq!(outcome, FrameOutcome::Transcoded);
        let msg = decode_message(&wire);
        assert_eq!(msg.id, "msg-1");
        assert_eq!(msg.role, "assistant");
        assert_eq!(msg.content, "hi");
    }

    #[test]
    fn test_map_focus_variants() {
        let mut t = transcoder();
        let (_, wire) = t.transcode_frame(
            r#"data: {"response":{"type":"map_focus","data":{"location_name":"Paris"}}}"#,
        );
        assert_eq!(decode_message(&wire).content, "Showing Paris on the map.");

        let (_, wire) = t.transcode_frame(
            r#"data: {"response":{"type":"map_focus","text_response":"Here it is","data":{"location_name":"Paris"}}}"#,
        );
        assert_eq!(decode_message(&wire).content, "Here it is");
    }

    #[test]
    fn test_unknown_type_content_is_json_text() {
        let mut t = transcoder();
        let (_, wire) = t.transcode_frame(r#"data: {"response":{"type":"weird","foo":1}}"#);
        assert_eq!(decode_message(&wire).content, r#"{"type":"weird","foo":1}"#);

        let (_, wire) =
            t.transcode_frame(r#"data: {"response":{"type":"weird","s":"A\/","n":1.50,"e":1e2}}"#);
        assert_eq!(
            decode_message(&wire).content,
            r#"{"type":"weird","s":"A/","n":1.5,"e":100}"#
        );
    }

    #[test]
    fn test_map_focus_with_nothing_to_show_passes_through() {
        let mut t = transcoder();
        let frame = r#"data: {"response":{"type":"map_focus"}}"#;
        let (outcome, wire) = t.transcode_frame(frame);
        assert_eq!(
            outcome,
            FrameOutcome::PassedThrough(PassThroughReason::ParseFailed)
        );
        assert_eq!(wire, format!("{frame}\n\n"));
        assert_eq!(t.stats().parse_failures, 1);
    }

    #[test]
    fn test_ids_are_unique_per_message() {
        let mut t = EventTranscoder::new();
        let frame = r#"data: {"response":{"type":"text_response","content":"x"}}"#;
        let (_, first) = t.transcode_frame(frame);
        let (_, second) = t.transcode_frame(frame);
        let first = decode_message(&first);
        let second = decode_message(&second);
        assert_ne!(first.id, second.id);
        assert!(uuid::Uuid::parse_str(&first.id).is_ok());
    }

    #[test]
    fn test_non_data_frame_passes_through_with_separator() {
        let mut t = transcoder();
        let (outcome, wire) = t.transcode_frame("event: ping\ndata: {}");
        assert_eq!(
            outcome,
            FrameOutcome::PassedThrough(PassThroughReason::NotData)
        );
        assert_eq!(wire, "event: ping\ndata: {}\n\n");
    }

    #[test]
    fn test_data_without_space_is_not_transcoded() {
        let mut t = transcoder();
        let frame = r#"data:{"response":{"type":"text_response","content":"hi"}}"#;
        let (outcome, wire) = t.transcode_frame(frame);
        assert_eq!(
            outcome,
            FrameOutcome::PassedThrough(PassThroughReason::NotData)
        );
        assert_eq!(wire, format!("{frame}\n\n"));
    }

    #[test]
    fn test_unenveloped_json_passes_through() {
        let mut t = transcoder();
        let (outcome, wire) = t.transcode_frame(r#"data: {"status":"thinking"}"#);
        assert_eq!(
            outcome,
            FrameOutcome::PassedThrough(PassThroughReason::Unenveloped)
        );
        assert_eq!(wire, "data: {\"status\":\"thinking\"}\n\n");
    }

    #[test]
    fn test_malformed_json_passes_through_and_stream_continues() {
        let mut t = transcoder();
        let mut out = String::new();
        let bad = t.transcode_frame_into("data: {not valid json", &mut out);
        let good = t.transcode_frame_into(
            r#"data: {"response":{"type":"text_response","content":"after"}}"#,
            &mut out,
        );
        assert_eq!(
            bad,
            FrameOutcome::PassedThrough(PassThroughReason::ParseFailed)
        );
        assert_eq!(good, FrameOutcome::Transcoded);

        let (bad_wire, good_wire) = out.split_at("data: {not valid json\n\n".len());
        assert_eq!(bad_wire, "data: {not valid json\n\n");
        assert_eq!(decode_message(good_wire).content, "after");

        assert_eq!(
            t.stats(),
            TranscodeStats {
                transcoded: 1,
                passed_through: 1,
                parse_failures: 1,
            }
        );
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let long = "\u{e9}".repeat(150);
        let truncated = truncate_for_log(&long);
        assert!(truncated.len() <= 200);
        assert!(long.starts_with(truncated));
    }
}
