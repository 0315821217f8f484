use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use pact_contracts::error::PipelineError;
use pact_contracts::image::NormalizedImage;
use pact_contracts::promise::{
    CaptureRef, CommitmentRow, ExtractionOutcome, NotificationCard, PromiseCandidate,
    ResolutionOutcome, SaveDisposition,
};

use crate::notify::fallback_card;
use crate::response_json_or_error;

/// The inference-service capabilities the pipeline consumes. Implementations
/// own their transport; the pipeline never sees anything but these calls.
pub trait PromiseIntel: Send + Sync {
    fn name(&self) -> &str;

    /// `Found{candidates}` or an explicit `NoneFound{reason}`.
    fn extract_promises(
        &self,
        image: &NormalizedImage,
        capture: &CaptureRef,
    ) -> Result<ExtractionOutcome, PipelineError>;

    /// Classify one candidate against the owner's existing open set.
    fn should_save(
        &self,
        existing: &[CommitmentRow],
        candidate: &PromiseCandidate,
    ) -> Result<SaveDisposition, PipelineError>;

    /// Does the screenshot evidence any existing commitment as fulfilled?
    fn check_resolved(
        &self,
        image: &NormalizedImage,
        existing: &[CommitmentRow],
    ) -> Result<ResolutionOutcome, PipelineError>;

    fn format_notification(
        &self,
        candidate: &PromiseCandidate,
    ) -> Result<NotificationCard, PipelineError>;

    /// Cheap reachability check backing the wholesale-outage fallback of the
    /// dedup engine: probe failure means "save everything", per-item errors
    /// after a successful probe exclude only that item.
    fn probe_comparison(&self) -> Result<(), PipelineError>;
}

/// Transport for the extraction call. The JSON body carries the image as a
/// data URL; multipart ships the decoded bytes as a file part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractTransport {
    Json,
    Multipart,
}

// ── HTTP client ──

pub struct HttpIntel {
    base_url: String,
    api_key: Option<String>,
    transport: ExtractTransport,
    http: HttpClient,
}

impl HttpIntel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        transport: ExtractTransport,
        timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                PipelineError::InferenceUnavailable(format!("http client build failed: {err}"))
            })?;
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            transport,
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    fn post_json(&self, path: &str, payload: &Value) -> Result<Value, PipelineError> {
        let mut request = self.http.post(self.endpoint(path)).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().map_err(|err| {
            PipelineError::InferenceUnavailable(format!("{path} request failed: {err}"))
        })?;
        response_json_or_error("inference", response)
            .map_err(|err| PipelineError::InferenceUnavailable(format!("{err:#}")))
    }

    fn extract_multipart(
        &self,
        image: &NormalizedImage,
        capture: &CaptureRef,
    ) -> Result<Value, PipelineError> {
        let bytes = image.decode_bytes()?;
        let file_name = format!("screenshot.{}", extension_for_media_type(&image.media_type));
        let part = MultipartPart::bytes(bytes)
            .file_name(file_name)
            .mime_str(&image.media_type)
            .map_err(|err| {
                PipelineError::InvalidImageInput(format!(
                    "invalid mime '{}': {err}",
                    image.media_type
                ))
            })?;
        let form = MultipartForm::new()
            .part("file", part)
            .text("screenshot_id", capture.screenshot_id.clone())
            .text("screenshot_timestamp", capture.screenshot_timestamp.clone());

        let mut request = self
            .http
            .post(self.endpoint("v1/extract_promises"))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().map_err(|err| {
            PipelineError::InferenceUnavailable(format!("extract request failed: {err}"))
        })?;
        response_json_or_error("inference", response)
            .map_err(|err| PipelineError::InferenceUnavailable(format!("{err:#}")))
    }
}

impl PromiseIntel for HttpIntel {
    fn name(&self) -> &str {
        "http"
    }

    fn extract_promises(
        &self,
        image: &NormalizedImage,
        capture: &CaptureRef,
    ) -> Result<ExtractionOutcome, PipelineError> {
        let payload = match self.transport {
            ExtractTransport::Json => {
                self.post_json("v1/extract_promises", &extract_request_body(image, capture))?
            }
            ExtractTransport::Multipart => self.extract_multipart(image, capture)?,
        };
        parse_response("extract_promises", payload)
    }

    fn should_save(
        &self,
        existing: &[CommitmentRow],
        candidate: &PromiseCandidate,
    ) -> Result<SaveDisposition, PipelineError> {
        let payload = self.post_json(
            "v1/should_save",
            &json!({
                "existing": existing_digest(existing),
                "candidate": candidate,
            }),
        )?;
        let parsed: DispositionResponse = parse_response("should_save", payload)?;
        Ok(parsed.disposition)
    }

    fn check_resolved(
        &self,
        image: &NormalizedImage,
        existing: &[CommitmentRow],
    ) -> Result<ResolutionOutcome, PipelineError> {
        let payload = self.post_json(
            "v1/check_resolved",
            &json!({
                "image_data": image.data_url(),
                "existing": existing_digest(existing),
            }),
        )?;
        parse_response("check_resolved", payload)
    }

    fn format_notification(
        &self,
        candidate: &PromiseCandidate,
    ) -> Result<NotificationCard, PipelineError> {
        let payload = self.post_json("v1/format_notification", &json!({ "candidate": candidate }))?;
        parse_response("format_notification", payload)
    }

    fn probe_comparison(&self) -> Result<(), PipelineError> {
        let mut request = self.http.get(self.endpoint("v1/health"));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().map_err(|err| {
            PipelineError::InferenceUnavailable(format!("health probe failed: {err}"))
        })?;
        if !response.status().is_success() {
            return Err(PipelineError::InferenceUnavailable(format!(
                "health probe returned {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// JSON body for the extraction call: image as a data URL plus screenshot
/// correlation fields.
pub(crate) fn extract_request_body(image: &NormalizedImage, capture: &CaptureRef) -> Value {
    json!({
        "image_data": image.data_url(),
        "screenshot_id": capture.screenshot_id,
        "screenshot_timestamp": capture.screenshot_timestamp,
    })
}

/// Slim view of the existing set sent to the comparison and resolution
/// capabilities. Metadata and extraction snapshots stay home.
pub(crate) fn existing_digest(existing: &[CommitmentRow]) -> Value {
    Value::Array(
        existing
            .iter()
            .map(|row| {
                json!({
                    "content": row.content,
                    "to_whom": row.to_whom,
                    "deadline": row.deadline,
                    "platform": row.platform,
                    "resolved": row.resolved,
                })
            })
            .collect(),
    )
}

fn parse_response<T: serde::de::DeserializeOwned>(
    capability: &str,
    payload: Value,
) -> Result<T, PipelineError> {
    serde_json::from_value(payload).map_err(|err| {
        PipelineError::InferenceUnavailable(format!(
            "{capability} returned unexpected payload: {err}"
        ))
    })
}

#[derive(serde::Deserialize)]
struct DispositionResponse {
    disposition: SaveDisposition,
}

fn extension_for_media_type(media_type: &str) -> &'static str {
    match media_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

// ── Dryrun ──

/// Offline stand-in: no network, deterministic answers. Extraction replays
/// a fixture file when one is configured, comparison is exact content
/// equality, formatting is the deterministic fallback rendering.
pub struct DryrunIntel {
    fixture: Option<PathBuf>,
}

impl DryrunIntel {
    pub fn new(fixture: Option<PathBuf>) -> Self {
        Self { fixture }
    }
}

impl PromiseIntel for DryrunIntel {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn extract_promises(
        &self,
        _image: &NormalizedImage,
        _capture: &CaptureRef,
    ) -> Result<ExtractionOutcome, PipelineError> {
        let Some(path) = &self.fixture else {
            return Ok(ExtractionOutcome::NoneFound {
                reason: "dryrun intel has no extraction model".to_string(),
            });
        };
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::InferenceUnavailable(format!(
                "dryrun fixture {} unreadable: {err}",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            PipelineError::InferenceUnavailable(format!(
                "dryrun fixture {} invalid: {err}",
                path.display()
            ))
        })
    }

    fn should_save(
        &self,
        existing: &[CommitmentRow],
        candidate: &PromiseCandidate,
    ) -> Result<SaveDisposition, PipelineError> {
        let duplicate = existing
            .iter()
            .any(|row| row.is_open() && row.content == candidate.content);
        if duplicate {
            Ok(SaveDisposition::DefinitelyNotSave)
        } else {
            Ok(SaveDisposition::DefinitelySave)
        }
    }

    fn check_resolved(
        &self,
        _image: &NormalizedImage,
        _existing: &[CommitmentRow],
    ) -> Result<ResolutionOutcome, PipelineError> {
        Ok(ResolutionOutcome::NoneResolved {
            reason: "dryrun intel does not detect resolutions".to_string(),
        })
    }

    fn format_notification(
        &self,
        candidate: &PromiseCandidate,
    ) -> Result<NotificationCard, PipelineError> {
        Ok(fallback_card(candidate))
    }

    fn probe_comparison(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}
