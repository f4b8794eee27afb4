//! Contact-form forwarder
//!
//! Public contact submissions are forwarded to the email marketing provider
//! as contacts on a configured list. The same provider's transactional
//! endpoint delivers password reset mails.
//!
//! There is no retry: a failed forward is reported to the caller, with
//! upstream client errors passed through and everything else mapped to a
//! gateway status.

use crate::config::ContactConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Longest accepted message body
pub const MAX_MESSAGE_LEN: usize = 5000;

/// Email marketing API client
pub struct ContactClient {
    client: Client,
    config: ContactConfig,
}

/// A contact form submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    pub message: String,
    /// Explicit marketing/data processing consent
    #[serde(default)]
    pub consent: bool,
}

impl ContactSubmission {
    pub fn validate(&self) -> Result<(), ContactError> {
        if self.name.trim().is_empty() {
            return Err(ContactError::Validation("name is required".to_string()));
        }
        if !crate::provisioning::is_valid_email(self.email.trim()) {
            return Err(ContactError::Validation("a valid email is required".to_string()));
        }
        if self.message.trim().is_empty() {
            return Err(ContactError::Validation("message is required".to_string()));
        }
        if self.message.chars().count() > MAX_MESSAGE_LEN {
            return Err(ContactError::Validation(format!(
                "message exceeds {} characters",
                MAX_MESSAGE_LEN
            )));
        }
        if !self.consent {
            return Err(ContactError::Validation("consent is required".to_string()));
        }
        Ok(())
    }
}

/// Escape text interpolated into a mail body
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// What the provider answered
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactReceipt {
    /// Provider contact id; absent when an existing contact was updated
    #[serde(default)]
    pub id: Option<i64>,
}

impl ContactClient {
    /// Build a client; fails when forwarding is disabled or incomplete
    pub fn new(config: ContactConfig) -> Result<Self, ContactError> {
        if !config.enabled || config.api_key.trim().is_empty() {
            return Err(ContactError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(ContactError::Request)?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ContactConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Forward a submission as a list contact
    pub async fn submit(&self, submission: &ContactSubmission) -> Result<ContactReceipt, ContactError> {
        submission.validate()?;

        let body = CreateContactRequest {
            email: submission.email.trim().to_lowercase(),
            attributes: ContactAttributes {
                name: submission.name.trim().to_string(),
                phone: submission.phone.clone(),
                company: submission.company.clone(),
                message: submission.message.clone(),
            },
            list_ids: vec![self.config.list_id],
            update_enabled: true,
        };

        let text = self.post("contacts", &body).await?;
        tracing::info!(list_id = self.config.list_id, "Forwarded contact submission");

        if text.trim().is_empty() {
            return Ok(ContactReceipt::default());
        }
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }

    /// Send a single transactional mail
    pub async fn send_transactional(
        &self,
        to_email: &str,
        to_name: &str,
        subject: &str,
        html: &str,
    ) -> Result<(), ContactError> {
        let body = TransactionalEmail {
            sender: Mailbox {
                email: self.config.sender_email.clone(),
                name: self.config.sender_name.clone(),
            },
            to: vec![Mailbox {
                email: to_email.to_string(),
                name: to_name.to_string(),
            }],
            subject: subject.to_string(),
            html_content: html.to_string(),
        };

        self.post("smtp/email", &body).await?;
        tracing::info!(subject, "Sent transactional email");
        Ok(())
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<String, ContactError> {
        let response = self
            .client
            .post(self.url(path))
            .header("api-key", &self.config.api_key)
            .header("accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ContactError::Timeout
                } else if e.is_connect() {
                    ContactError::Unavailable
                } else {
                    ContactError::Request(e)
                }
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(text)
        } else {
            tracing::warn!(status = status.as_u16(), path, "Email provider rejected request");
            Err(ContactError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&text),
            })
        }
    }
}

/// Providers answer `{"code": "...", "message": "..."}`; fall back to the raw text
fn upstream_message(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| text.trim().to_string())
}

// ============================================
// Request DTOs
// ============================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateContactRequest {
    email: String,
    attributes: ContactAttributes,
    list_ids: Vec<u64>,
    update_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
struct ContactAttributes {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    company: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
struct Mailbox {
    email: String,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionalEmail {
    sender: Mailbox,
    to: Vec<Mailbox>,
    subject: String,
    html_content: String,
}

// ============================================
// Errors
// ============================================

/// Errors from the contact forwarder
#[derive(Error, Debug)]
pub enum ContactError {
    #[error("Contact forwarding is not configured")]
    NotConfigured,

    #[error("Invalid submission: {0}")]
    Validation(String),

    #[error("Email provider error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Email provider unavailable")]
    Unavailable,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Email provider timed out")]
    Timeout,
}

impl ContactError {
    /// HTTP status reported to our own caller
    pub fn status_code(&self) -> u16 {
        match self {
            ContactError::NotConfigured => 503,
            ContactError::Validation(_) => 400,
            ContactError::Upstream { status, .. } if (400..500).contains(status) => *status,
            ContactError::Upstream { .. } | ContactError::Unavailable | ContactError::Request(_) => 502,
            ContactError::Timeout => 504,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Fake {
        status: u16,
        delay_ms: u64,
        seen: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    }

    async fn capture(
        State(fake): State<Fake>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        if fake.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(fake.delay_ms)).await;
        }
        let key = headers
            .get("api-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        fake.seen.lock().unwrap().push((key, body));

        let status = StatusCode::from_u16(fake.status).unwrap();
        let body = if status.is_success() {
            serde_json::json!({ "id": 42 })
        } else {
            serde_json::json!({ "code": "invalid_parameter", "message": "upstream says no" })
        };
        (status, Json(body))
    }

    async fn spawn_fake(fake: Fake) -> String {
        let app = Router::new()
            .route("/contacts", post(capture))
            .route("/smtp/email", post(capture))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(base_url: String) -> ContactConfig {
        ContactConfig {
            enabled: true,
            base_url,
            api_key: "test-key".to_string(),
            list_id: 7,
            request_timeout_ms: 300,
            ..Default::default()
        }
    }

    fn submission() -> ContactSubmission {
        ContactSubmission {
            name: "Pablo".to_string(),
            email: "Pablo@Example.com".to_string(),
            phone: Some("600000000".to_string()),
            company: None,
            message: "Quiero un presupuesto".to_string(),
            consent: true,
        }
    }

    #[tokio::test]
    async fn test_submit_forwards_contact() {
        let fake = Fake {
            status: 201,
            ..Default::default()
        };
        let base = spawn_fake(fake.clone()).await;
        let client = ContactClient::new(config(base)).unwrap();

        let receipt = client.submit(&submission()).await.unwrap();
        assert_eq!(receipt.id, Some(42));

        let seen = fake.seen.lock().unwrap();
        let (key, body) = &seen[0];
        assert_eq!(key, "test-key");
        assert_eq!(body["email"], "pablo@example.com");
        assert_eq!(body["listIds"], serde_json::json!([7]));
        assert_eq!(body["updateEnabled"], true);
        assert_eq!(body["attributes"]["NAME"], "Pablo");
        assert!(body["attributes"].get("COMPANY").is_none());
    }

    #[tokio::test]
    async fn test_upstream_client_error_keeps_status() {
        let base = spawn_fake(Fake {
            status: 400,
            ..Default::default()
        })
        .await;
        let client = ContactClient::new(config(base)).unwrap();

        let err = client.submit(&submission()).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("upstream says no"));
    }

    #[tokio::test]
    async fn test_upstream_server_error_is_bad_gateway() {
        let base = spawn_fake(Fake {
            status: 503,
            ..Default::default()
        })
        .await;
        let client = ContactClient::new(config(base)).unwrap();

        let err = client.submit(&submission()).await.unwrap_err();
        assert!(matches!(err, ContactError::Upstream { status: 503, .. }));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn test_timeout_is_gateway_timeout() {
        let base = spawn_fake(Fake {
            status: 201,
            delay_ms: 2000,
            ..Default::default()
        })
        .await;
        let client = ContactClient::new(config(base)).unwrap();

        let err = client.submit(&submission()).await.unwrap_err();
        assert!(matches!(err, ContactError::Timeout));
        assert_eq!(err.status_code(), 504);
    }

    #[tokio::test]
    async fn test_transactional_email() {
        let fake = Fake {
            status: 201,
            ..Default::default()
        };
        let base = spawn_fake(fake.clone()).await;
        let mut cfg = config(base);
        cfg.sender_email = "no-reply@correduria.example".to_string();
        let client = ContactClient::new(cfg).unwrap();

        client
            .send_transactional("ana@example.com", "Ana", "Reset", "<p>token</p>")
            .await
            .unwrap();

        let seen = fake.seen.lock().unwrap();
        assert_eq!(seen[0].1["sender"]["email"], "no-reply@correduria.example");
        assert_eq!(seen[0].1["htmlContent"], "<p>token</p>");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("Ana Gil"), "Ana Gil");
        assert_eq!(
            escape_html(r#"<b onclick="x">O'Neil & Co</b>"#),
            "&lt;b onclick=&quot;x&quot;&gt;O&#39;Neil &amp; Co&lt;/b&gt;"
        );
    }

    #[test]
    fn test_unconfigured_client() {
        let err = ContactClient::new(ContactConfig::default()).err().unwrap();
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_submission_validation() {
        let mut s = submission();
        s.consent = false;
        assert!(s.validate().is_err());

        let mut s = submission();
        s.message = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert_eq!(s.validate().unwrap_err().status_code(), 400);

        let mut s = submission();
        s.email = "nope".to_string();
        assert!(s.validate().is_err());

        assert!(submission().validate().is_ok());
    }
}
