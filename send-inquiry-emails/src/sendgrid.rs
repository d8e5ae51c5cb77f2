use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Sends one rendered message. Exactly one attempt is made per call.
#[async_trait]
pub trait EmailTransport {
    async fn send(
        &self,
        api_key: &str,
        message: &OutboundMessage<'_>,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

#[derive(Serialize, Debug, Clone, Copy)]
pub struct Sender<'a> {
    pub email: &'a str,
    pub name: &'a str,
}

#[derive(Debug)]
pub struct OutboundMessage<'a> {
    pub to: &'a str,
    pub from: Sender<'a>,
    pub subject: String,
    pub html: String,
}

#[derive(Debug)]
pub struct DeliveryReceipt {
    pub status: StatusCode,
}

pub struct SendGridClient {
    client: Client,
    api_url: String,
}

impl SendGridClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl EmailTransport for SendGridClient {
    async fn send(
        &self,
        api_key: &str,
        message: &OutboundMessage<'_>,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&SendGridMailPayload::from(message))
            .send()
            .await
            .map_err(DeliveryError::Transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(DeliveryReceipt { status });
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status,
            body: describe_rejection(body),
        })
    }
}

/// SendGrid reports rejections as `{"errors": [{"message": ...}]}`. Anything else is
/// passed through verbatim.
fn describe_rejection(body: String) -> String {
    match serde_json::from_str::<SendGridErrorResponse>(&body) {
        Ok(response) if !response.errors.is_empty() => response
            .errors
            .into_iter()
            .map(|error| error.message)
            .collect::<Vec<_>>()
            .join("; "),
        _ => body,
    }
}

#[derive(Serialize)]
struct SendGridMailPayload<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Sender<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: [Recipient<'a>; 1],
}

#[derive(Serialize)]
struct Recipient<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

impl<'a> From<&'a OutboundMessage<'a>> for SendGridMailPayload<'a> {
    fn from(message: &'a OutboundMessage<'a>) -> Self {
        Self {
            personalizations: [Personalization {
                to: [Recipient { email: message.to }],
            }],
            from: message.from,
            subject: &message.subject,
            content: [Content {
                content_type: "text/html",
                value: &message.html,
            }],
        }
    }
}

#[derive(Deserialize)]
struct SendGridErrorResponse {
    #[serde(default)]
    errors: Vec<SendGridErrorDetail>,
}

#[derive(Deserialize)]
struct SendGridErrorDetail {
    message: String,
}

#[derive(Debug)]
pub enum DeliveryError {
    Transport(reqwest::Error),
    Rejected { status: StatusCode, body: String },
}

impl DeliveryError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DeliveryError::Transport(error) => error.status(),
            DeliveryError::Rejected { status, .. } => Some(*status),
        }
    }
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Transport(error) => write!(f, "Could not reach SendGrid: {error}"),
            DeliveryError::Rejected { status, body } if body.is_empty() => {
                write!(f, "SendGrid rejected the message with status {status}")
            }
            DeliveryError::Rejected { status, body } => {
                write!(f, "SendGrid rejected the message with status {status}: {body}")
            }
        }
    }
}

impl std::error::Error for DeliveryError {}
