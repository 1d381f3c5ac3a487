//! Optional photo commentary from a vision model.
//!
//! The analyzer never blocks a transition: every failure turns into one of the
//! placeholder strings below and is only logged.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::models::StillImage;
use crate::settings::AnalysisSettings;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const ANALYSIS_PLACEHOLDER: &str = "AI Analüüs pole saadaval (API võti puudub).";
pub const ANALYSIS_EMPTY: &str = "Analüüs ei andnud vastust.";
pub const ANALYSIS_FAILED: &str = "Analüüsi viga: Ei suutnud pilti töödelda.";

const SITE_PROMPT: &str = "Oled ehitusobjekti järelevalve abiline. Analüüsi seda pilti. \
Sinu eesmärk on kinnitada, kas pilt on tehtud tõenäoliselt töökeskkonnas või ehitusobjektil. \
1. Kirjelda lühidalt, mida näed (tööriistad, materjalid, keskkond). \
2. Kui pilt on täiesti must või ebaoluline, anna hoiatus. Vasta lühidalt eesti keeles.";

#[derive(Clone)]
pub enum Analyzer {
    /// No credential configured.
    Disabled,
    /// Canned commentary, for demos and tests.
    Fixed(String),
    Gemini(GeminiClient),
}

impl Analyzer {
    pub fn from_settings(settings: &AnalysisSettings) -> Self {
        match GeminiClient::new(settings) {
            Ok(client) => Analyzer::Gemini(client),
            Err(AnalysisError::MissingApiKey) => {
                log_warn!("analysis API key missing, photo analysis disabled");
                Analyzer::Disabled
            }
            Err(err) => {
                log_warn!("analysis client unavailable: {err}");
                Analyzer::Disabled
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Analyzer::Disabled)
    }

    pub async fn describe(&self, photo: &StillImage) -> String {
        match self {
            Analyzer::Disabled => ANALYSIS_PLACEHOLDER.to_string(),
            Analyzer::Fixed(text) => text.clone(),
            Analyzer::Gemini(client) => match client.analyze(photo).await {
                Ok(text) => text,
                Err(AnalysisError::Empty) => ANALYSIS_EMPTY.to_string(),
                Err(err) => {
                    log_error!("photo analysis failed: {err}");
                    ANALYSIS_FAILED.to_string()
                }
            },
        }
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(settings: &AnalysisSettings) -> Result<Self, AnalysisError> {
        let api_key = settings.api_key.trim();
        if api_key.is_empty() {
            return Err(AnalysisError::MissingApiKey);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;

        Ok(Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: api_key.to_string(),
        })
    }

    pub async fn analyze(&self, photo: &StillImage) -> Result<String, AnalysisError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = GenerateRequest::for_photo(photo);

        log_info!("requesting photo analysis from {} ({} bytes)", self.model, photo.byte_len());
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status { status, body });
        }

        let parsed: GenerateResponse = response.json().await?;
        parsed.text().ok_or(AnalysisError::Empty)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

impl GenerateRequest {
    fn for_photo(photo: &StillImage) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/jpeg".to_string(),
                            data: photo.to_base64(),
                        },
                    },
                    Part::Text {
                        text: SITE_PROMPT.to_string(),
                    },
                ],
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    fn text(&self) -> Option<String> {
        let text: String = self
            .candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo() -> StillImage {
        StillImage {
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 1,
            height: 1,
        }
    }

    fn settings(api_key: &str, endpoint: &str) -> AnalysisSettings {
        AnalysisSettings {
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
            timeout_ms: 2_000,
            ..AnalysisSettings::default()
        }
    }

    #[tokio::test]
    async fn missing_key_degrades_to_placeholder() {
        let analyzer = Analyzer::from_settings(&settings("  ", "http://127.0.0.1:1"));
        assert!(!analyzer.is_enabled());
        assert_eq!(analyzer.describe(&photo()).await, ANALYSIS_PLACEHOLDER);
    }

    #[tokio::test]
    async fn unreachable_service_degrades_to_failure_text() {
        let analyzer = Analyzer::from_settings(&settings("key", "http://127.0.0.1:1"));
        assert!(analyzer.is_enabled());
        assert_eq!(analyzer.describe(&photo()).await, ANALYSIS_FAILED);
    }

    #[test]
    fn request_carries_inline_jpeg_and_prompt() {
        let json = serde_json::to_value(GenerateRequest::for_photo(&photo())).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "/9j/2Q==");
        assert!(parts[1]["text"].as_str().unwrap().contains("ehitusobjekti"));
    }

    #[test]
    fn response_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Näha on "},{"text":"tellingud."}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("Näha on tellingud."));
    }

    #[test]
    fn blank_response_is_empty() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#)
                .unwrap();
        assert_eq!(response.text(), None);

        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.text(), None);
    }
}
