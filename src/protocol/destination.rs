use serde::{Deserialize, Serialize};

use crate::util::push_json_string_escaped;

pub const ASSISTANT_ROLE: &str = "assistant";

/// A message in the envelope the chat client expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationMessage {
    pub id: String,
    pub role: String,
    pub content: String,
}

/// Append `data: {"id":..,"role":"assistant","content":..}\n\n` to `out`.
pub fn push_assistant_frame(out: &mut String, id: &str, content: &str) {
    out.reserve(48 + id.len() + content.len());
    out.push_str("data: {\"id\":");
    push_json_string_escaped(out, id);
    out.push_str(",\"role\":\"");
    out.push_str(ASSISTANT_ROLE);
    out.push_str("\",\"content\":");
    push_json_string_escaped(out, content);
    out.push_str("}\n\n");
}
