use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::AlertSettings;

/// Operator-facing alert webhook. Every send is best-effort: failures are
/// logged and swallowed so alerting can never take the daemon down.
pub struct Notifier {
   webhook_url: String,
   client:      reqwest::blocking::Client,
}

impl Notifier {
   const SEND_TIMEOUT: Duration = Duration::from_secs(10);

   /// Returns None when no webhook is configured
   pub fn new(settings: &AlertSettings) -> Option<Self> {
      if settings.webhook_url.is_empty() {
         return None;
      }

      let client = reqwest::blocking::Client::builder()
         .timeout(Self::SEND_TIMEOUT)
         .build()
         .expect("Failed to build HTTP client");

      Some(Self { webhook_url: settings.webhook_url.clone(), client })
   }

   /// Send an alert; never raises
   pub fn send_alert(&self, title: &str, last_error: Option<&str>, details: Option<&str>) {
      let payload = json!({
         "app": "codeworm",
         "title": title,
         "last_error": last_error,
         "details": details,
         "timestamp": Utc::now().to_rfc3339(),
      });

      match self.client.post(&self.webhook_url).json(&payload).send() {
         Ok(response) if response.status().is_success() => {
            debug!(title, "alert delivered");
         },
         Ok(response) => {
            warn!(title, status = %response.status(), "alert webhook rejected payload");
         },
         Err(e) => {
            warn!(title, error = %e, "alert webhook unreachable");
         },
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_empty_webhook_disables_notifier() {
      let settings = AlertSettings { webhook_url: String::new(), alert_after_failures: 4 };
      assert!(Notifier::new(&settings).is_none());
   }

   #[test]
   fn test_unreachable_webhook_never_panics() {
      let settings = AlertSettings {
         webhook_url:          "http://127.0.0.1:9/hooks/worm".to_string(),
         alert_after_failures: 4,
      };
      let notifier = Notifier::new(&settings).unwrap();
      notifier.send_alert("Ollama unreachable", Some("connection refused"), None);
   }
}
