use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::PipelineError;

const DATA_URL_SCHEME: &str = "data:";
const FALLBACK_MEDIA_TYPE: &str = "image/png";

/// Canonical `(media type, base64 payload)` pair handed to the inference
/// boundary. Built once per request by the normalizer; immutable after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub media_type: String,
    pub payload_b64: String,
}

impl NormalizedImage {
    /// Normalize a raw byte stream. The caller's content type wins when
    /// present; otherwise the container format is sniffed from the magic
    /// bytes, with `image/png` as the last resort.
    pub fn from_bytes(bytes: &[u8], content_type: Option<&str>) -> Result<Self, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::InvalidImageInput(
                "empty image byte stream".to_string(),
            ));
        }
        let media_type = content_type
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .or_else(|| sniff_media_type(bytes))
            .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string());
        Ok(Self {
            media_type,
            payload_b64: BASE64.encode(bytes),
        })
    }

    /// Normalize a string input: either a `data:<mediatype>;base64,<data>`
    /// URI or a bare base64 blob. Data URIs split on the first comma; the
    /// media type is the header segment between `data:` and `;base64`.
    pub fn from_string(value: &str) -> Result<Self, PipelineError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::InvalidImageInput(
                "empty image string".to_string(),
            ));
        }

        if trimmed.starts_with(DATA_URL_SCHEME) {
            let (header, payload) = trimmed.split_once(',').ok_or_else(|| {
                PipelineError::InvalidImageInput("data URL has no comma separator".to_string())
            })?;
            let media_type = header
                .strip_prefix(DATA_URL_SCHEME)
                .unwrap_or(header)
                .split(';')
                .next()
                .unwrap_or("")
                .trim();
            let media_type = if media_type.is_empty() {
                FALLBACK_MEDIA_TYPE.to_string()
            } else {
                media_type.to_string()
            };
            validate_base64(payload)?;
            return Ok(Self {
                media_type,
                payload_b64: payload.to_string(),
            });
        }

        validate_base64(trimmed)?;
        Ok(Self {
            media_type: FALLBACK_MEDIA_TYPE.to_string(),
            payload_b64: trimmed.to_string(),
        })
    }

    /// Reassemble the canonical data-URL form for the inference call.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.payload_b64)
    }

    pub fn decode_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        BASE64
            .decode(self.payload_b64.as_bytes())
            .map_err(|err| PipelineError::InvalidImageInput(format!("base64 decode failed: {err}")))
    }
}

fn validate_base64(payload: &str) -> Result<(), PipelineError> {
    if payload.is_empty() {
        return Err(PipelineError::InvalidImageInput(
            "empty base64 payload".to_string(),
        ));
    }
    BASE64
        .decode(payload.as_bytes())
        .map(|_| ())
        .map_err(|err| PipelineError::InvalidImageInput(format!("invalid base64 payload: {err}")))
}

fn sniff_media_type(bytes: &[u8]) -> Option<String> {
    let format = image::guess_format(bytes).ok()?;
    Some(format.to_mime_type().to_string())
}
