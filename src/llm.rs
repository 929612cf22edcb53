use std::{thread, time::Duration};

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
   config::OllamaSettings,
   error::{Result, WormError},
   types::GenerationResult,
};

/// Context window used after an OOM recovery reload
const REDUCED_CTX: u32 = 8192;
/// Settle time between unloading and reloading the model
const OOM_RELOAD_WAIT: Duration = Duration::from_secs(5);

/// Blocking client for the Ollama API.
///
/// The daemon treats Ollama as a cooperating but unreliable peer: health
/// probes never error, generation failures are classified into connection /
/// timeout / model kinds, and OOM triggers a reload with a smaller context.
pub struct OllamaClient {
   settings: OllamaSettings,
   base_url: String,
   client:   reqwest::blocking::Client,
}

impl OllamaClient {
   const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
   const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

   pub fn new(settings: &OllamaSettings) -> Self {
      let client = reqwest::blocking::Client::builder()
         .timeout(Self::REQUEST_TIMEOUT)
         .connect_timeout(Self::CONNECT_TIMEOUT)
         .build()
         .expect("Failed to build HTTP client");

      Self { settings: settings.clone(), base_url: settings.base_url(), client }
   }

   /// Whether Ollama is reachable; never raises
   pub fn health_check(&self) -> bool {
      self
         .client
         .get(format!("{}/", self.base_url))
         .send()
         .is_ok_and(|response| response.status().is_success())
   }

   /// Load the model and keep it resident. Idempotent; returns success.
   pub fn prewarm(&self) -> bool {
      let payload = json!({
         "model": self.settings.model,
         "prompt": "",
         "keep_alive": self.settings.keep_alive,
         "options": { "num_ctx": self.settings.num_ctx },
      });

      match self
         .client
         .post(format!("{}/api/generate", self.base_url))
         .json(&payload)
         .send()
      {
         Ok(response) if response.status().is_success() => {
            info!(model = %self.settings.model, num_ctx = self.settings.num_ctx, "model prewarmed");
            true
         },
         Ok(_) | Err(_) => {
            warn!(model = %self.settings.model, "prewarm failed");
            false
         },
      }
   }

   /// Generate text from a prompt
   pub fn generate(
      &self,
      prompt: &str,
      system: Option<&str>,
      temperature: Option<f32>,
      max_tokens: Option<u32>,
   ) -> Result<GenerationResult> {
      let mut payload = json!({
         "model": self.settings.model,
         "prompt": prompt,
         "stream": false,
         "options": {
            "temperature": temperature.unwrap_or(self.settings.temperature),
            "num_predict": max_tokens.unwrap_or(self.settings.num_predict),
            "num_ctx": self.settings.num_ctx,
         },
      });
      if let Some(system) = system {
         payload["system"] = json!(system);
      }

      let response = self
         .client
         .post(format!("{}/api/generate", self.base_url))
         .json(&payload)
         .send()
         .map_err(|e| self.classify_transport_error(&e))?;

      let status = response.status();
      if !status.is_success() {
         let body = response.text().unwrap_or_default();
         return Err(classify_generate_failure(status.as_u16(), &body));
      }

      let data: GenerateResponse = response.json()?;
      Ok(data.into_result(&self.settings.model))
   }

   /// Generate with automatic retry: OOM recovers by reloading the model
   /// with a reduced context; timeouts and connection drops back off
   /// linearly.
   pub fn generate_with_retry(
      &self,
      prompt: &str,
      system: Option<&str>,
      max_retries: u32,
      retry_delay: Duration,
   ) -> Result<GenerationResult> {
      let mut last_error: Option<WormError> = None;

      for attempt in 0..max_retries {
         match self.generate(prompt, system, None, None) {
            Ok(result) => return Ok(result),
            Err(WormError::OllamaModel(message)) => {
               warn!(attempt = attempt + 1, "model OOM detected, attempting recovery");
               if let Err(recover_err) = self.recover_from_oom() {
                  warn!(error = %recover_err, "OOM recovery failed");
               }
               last_error = Some(WormError::OllamaModel(message));
            },
            Err(e @ (WormError::OllamaTimeout(_) | WormError::OllamaConnection { .. })) => {
               last_error = Some(e);
               if attempt + 1 < max_retries {
                  thread::sleep(retry_delay * (attempt + 1));
               }
            },
            Err(e) => return Err(e),
         }
      }

      Err(WormError::RetryExhausted {
         retries: max_retries,
         source:  Box::new(
            last_error.unwrap_or_else(|| WormError::Other("generation failed".to_string())),
         ),
      })
   }

   /// Unload the model, wait, and reload with a reduced context window
   fn recover_from_oom(&self) -> Result<()> {
      info!("attempting OOM recovery");

      self
         .client
         .post(format!("{}/api/generate", self.base_url))
         .json(&json!({ "model": self.settings.model, "keep_alive": "0" }))
         .send()
         .map_err(|e| self.classify_transport_error(&e))?;

      thread::sleep(OOM_RELOAD_WAIT);

      let reduced_ctx = self.settings.num_ctx.min(REDUCED_CTX);
      self
         .client
         .post(format!("{}/api/generate", self.base_url))
         .json(&json!({
            "model": self.settings.model,
            "prompt": "",
            "keep_alive": self.settings.keep_alive,
            "options": { "num_ctx": reduced_ctx },
         }))
         .send()
         .map_err(|e| self.classify_transport_error(&e))?;

      info!(new_ctx = reduced_ctx, "OOM recovery complete");
      Ok(())
   }

   /// Available model names, best-effort
   pub fn list_models(&self) -> Vec<String> {
      #[derive(Deserialize)]
      struct Tags {
         #[serde(default)]
         models: Vec<TagModel>,
      }
      #[derive(Deserialize)]
      struct TagModel {
         name: String,
      }

      self
         .client
         .get(format!("{}/api/tags", self.base_url))
         .send()
         .ok()
         .and_then(|response| response.json::<Tags>().ok())
         .map(|tags| tags.models.into_iter().map(|m| m.name).collect())
         .unwrap_or_default()
   }

   /// Release the transport
   pub fn close(self) {
      drop(self);
   }

   fn classify_transport_error(&self, error: &reqwest::Error) -> WormError {
      if error.is_timeout() {
         WormError::OllamaTimeout(error.to_string())
      } else if error.is_connect() {
         WormError::OllamaConnection { url: self.base_url.clone(), reason: error.to_string() }
      } else {
         WormError::Other(format!("Ollama request failed: {error}"))
      }
   }
}

/// Classify a non-200 generate response by body content
fn classify_generate_failure(status: u16, body: &str) -> WormError {
   let lower = body.to_lowercase();
   if lower.contains("out of memory") || lower.contains("cuda") {
      WormError::OllamaModel(format!("Model OOM (HTTP {status}): {body}"))
   } else {
      WormError::Other(format!("Generation failed (HTTP {status}): {body}"))
   }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
   #[serde(default)]
   response:          String,
   model:             Option<String>,
   #[serde(default)]
   prompt_eval_count: u64,
   #[serde(default)]
   eval_count:        u64,
   /// Nanoseconds, per the Ollama API
   #[serde(default)]
   total_duration:    u64,
}

impl GenerateResponse {
   fn into_result(self, fallback_model: &str) -> GenerationResult {
      let total_duration_ms = self.total_duration / 1_000_000;
      let tokens_per_second = if total_duration_ms > 0 && self.eval_count > 0 {
         self.eval_count as f64 / (total_duration_ms as f64 / 1000.0)
      } else {
         0.0
      };

      GenerationResult {
         text: self.response,
         model: self.model.unwrap_or_else(|| fallback_model.to_string()),
         prompt_tokens: self.prompt_eval_count,
         completion_tokens: self.eval_count,
         total_duration_ms,
         tokens_per_second,
      }
   }
}
