use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::BackendError;

use super::backends::{ImageSynthesizer, Img2ImgRequest, endpoint_url, ensure_success};

/// Stable Diffusion web UI img2img client
pub struct StableDiffusionClient {
    client: Client,
}

impl StableDiffusionClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Build an img2img payload from the configured base payload.
///
/// The prompt is appended to the base `prompt` and the image is pushed onto
/// `init_images`. Works on a copy; the configured payload is not touched.
pub fn build_img2img_payload(
    base: &Map<String, Value>,
    prompt: &str,
    image_base64: String,
) -> Map<String, Value> {
    let mut payload = base.clone();

    let base_prompt = payload
        .get("prompt")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let full_prompt = format!("{}{}", base_prompt, prompt);
    payload.insert("prompt".to_string(), Value::String(full_prompt));

    let mut init_images = match payload.remove("init_images") {
        Some(Value::Array(images)) => images,
        _ => Vec::new(),
    };
    init_images.push(Value::String(image_base64));
    payload.insert("init_images".to_string(), Value::Array(init_images));

    payload
}

#[async_trait]
impl ImageSynthesizer for StableDiffusionClient {
    async fn img2img(&self, request: Img2ImgRequest) -> Result<Vec<Vec<u8>>, BackendError> {
        let url = endpoint_url(&request.endpoint, "sdapi/v1/img2img");

        let response = self
            .client
            .post(&url)
            .json(&request.payload)
            .send()
            .await
            .map_err(|e| BackendError::Connection {
                url: url.clone(),
                source: e,
            })?;
        let response = ensure_success(response).await?;

        let body: Img2ImgResponse =
            response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse {
                    message: e.to_string(),
                })?;

        body.images
            .iter()
            .map(|image| {
                base64::engine::general_purpose::STANDARD
                    .decode(image)
                    .map_err(|e| BackendError::InvalidResponse {
                        message: format!("image is not valid base64: {}", e),
                    })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Img2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_appends_prompt_and_image_without_touching_base() {
        let base = match json!({
            "prompt": "masterpiece, ",
            "init_images": [],
            "steps": 20
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let payload = build_img2img_payload(&base, "watercolor harbor", "AAAA".to_string());
        assert_eq!(payload["prompt"], json!("masterpiece, watercolor harbor"));
        assert_eq!(payload["init_images"], json!(["AAAA"]));
        assert_eq!(payload["steps"], json!(20));

        // A second request starts from the same base, not from the last payload
        let payload = build_img2img_payload(&base, "desert", "BBBB".to_string());
        assert_eq!(payload["prompt"], json!("masterpiece, desert"));
        assert_eq!(payload["init_images"], json!(["BBBB"]));
        assert_eq!(base["init_images"], json!([]));
    }

    #[test]
    fn test_payload_without_prompt_or_images() {
        let payload = build_img2img_payload(&Map::new(), "city", "CCCC".to_string());
        assert_eq!(payload["prompt"], json!("city"));
        assert_eq!(payload["init_images"], json!(["CCCC"]));
    }
}
