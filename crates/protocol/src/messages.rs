use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chat payloads (client to server)
// ---------------------------------------------------------------------------

/// A plain text chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    pub text: String,
}

/// A recorded voice clip.
///
/// The `data` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPayload {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Container format, e.g. "webm" or "wav".
    pub format: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transcript: String,
}

/// An inline image, optionally with a user prompt about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt: String,
}

// ---------------------------------------------------------------------------
// Server push payloads
// ---------------------------------------------------------------------------

/// One detected object in a submitted image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    /// Bounding box as `[x, y, width, height]`, normalized to `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
}

/// Detection results for an image message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionPayload {
    /// Id of the image envelope these results answer.
    pub source_id: String,
    pub detections: Vec<Detection>,
}

/// Serializes `Vec<u8>` as standard base64, matching the JSON convention
/// browser clients use for binary fields.
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
