use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Router,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    borrow::Cow,
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;

const MAIL_SEND_PATH: &str = "/v3/mail/send";

/// In-process stand-in for the SendGrid v3 `mail/send` endpoint.
///
/// Requests carrying the expected bearer token are accepted with `202 Accepted` and
/// recorded, unless the recipient has been configured to be rejected.
#[derive(Clone)]
pub struct FakeSendGrid {
    required_api_key: Cow<'static, str>,
    rejected_recipients: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMail {
    pub to: String,
    pub from_email: String,
    pub from_name: String,
    pub subject: String,
    pub html: String,
}

pub struct RunningFakeSendGrid {
    address: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedMail>>>,
}

struct FakeSendGridState {
    config: FakeSendGrid,
    received: Arc<Mutex<Vec<ReceivedMail>>>,
}

#[derive(Deserialize)]
struct MailSendPayload {
    personalizations: Vec<Personalization>,
    from: Address,
    subject: String,
    content: Vec<Content>,
}

#[derive(Deserialize)]
struct Personalization {
    to: Vec<Address>,
}

#[derive(Deserialize)]
struct Address {
    email: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: String,
    value: String,
}

#[derive(Serialize)]
struct ErrorPayload {
    errors: Vec<ErrorDetail>,
}

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    field: Option<String>,
}

impl FakeSendGrid {
    pub fn new(required_api_key: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_api_key: required_api_key.into(),
            rejected_recipients: Vec::new(),
        }
    }

    pub fn reject_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.rejected_recipients.push(recipient.into());
        self
    }

    /// Binds an ephemeral local port and serves in the background.
    pub async fn start(self) -> RunningFakeSendGrid {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(FakeSendGridState {
            config: self,
            received: received.clone(),
        });
        let app = Router::new()
            .route(MAIL_SEND_PATH, post(send_mail))
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        info!("Fake SendGrid listening on {address}");
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        RunningFakeSendGrid { address, received }
    }
}

impl RunningFakeSendGrid {
    pub fn url(&self) -> String {
        format!("http://{}{MAIL_SEND_PATH}", self.address)
    }

    pub fn received_mails(&self) -> Vec<ReceivedMail> {
        self.received.lock().unwrap().clone()
    }
}

async fn send_mail(
    State(state): State<Arc<FakeSendGridState>>,
    headers: HeaderMap,
    Json(payload): Json<MailSendPayload>,
) -> (StatusCode, Json<serde_json::Value>) {
    let expected_authorization = format!("Bearer {}", state.config.required_api_key);
    if headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        != Some(expected_authorization.as_str())
    {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "The provided authorization grant is invalid, expired, or revoked",
            None,
        );
    }

    let Some(to) = payload
        .personalizations
        .into_iter()
        .flat_map(|personalization| personalization.to)
        .next()
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "The personalizations field is required and must have at least one personalization.",
            Some("personalizations"),
        );
    };
    let Some(html) = payload
        .content
        .into_iter()
        .find(|content| content.content_type == "text/html")
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Unless a valid template_id is provided, the content parameter is required.",
            Some("content"),
        );
    };

    if state.config.rejected_recipients.contains(&to.email) {
        debug!("Rejecting mail to {}", to.email);
        return error_response(
            StatusCode::BAD_REQUEST,
            "Does not contain a valid address.",
            Some("personalizations.0.to"),
        );
    }

    debug!("Accepted mail to {} with subject {}", to.email, payload.subject);
    state.received.lock().unwrap().push(ReceivedMail {
        to: to.email,
        from_email: payload.from.email,
        from_name: payload.from.name,
        subject: payload.subject,
        html: html.value,
    });
    (StatusCode::ACCEPTED, Json(serde_json::Value::Null))
}

fn error_response(
    status: StatusCode,
    message: &str,
    field: Option<&str>,
) -> (StatusCode, Json<serde_json::Value>) {
    (
        status,
        Json(json!(ErrorPayload {
            errors: vec![ErrorDetail {
                message: message.into(),
                field: field.map(Into::into),
            }],
        })),
    )
}
