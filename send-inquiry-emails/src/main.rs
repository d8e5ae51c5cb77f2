mod config;
mod email_templates;
mod inquiry;
mod sendgrid;

use chrono::Utc;
use config::{MailerConfig, MissingConfig};
use email_templates::render_inquiry_emails;
use inquiry::{InquiryDetails, InquiryId, InquirySubmission};
use lambda_http::{
    http::{header::CONTENT_TYPE, response::Builder, Method, StatusCode},
    run, service_fn, Body, Error, Request, RequestPayloadExt, Response,
};
use sendgrid::{
    DeliveryError, DeliveryReceipt, EmailTransport, OutboundMessage, SendGridClient, Sender,
};
use serde::Serialize;
use tracing::{error, info, warn};

const ADMIN_SENDER_NAME: &str = "Everguard Intelligence Website";
const CLIENT_SENDER_NAME: &str = "Everguard Intelligence";

const ALLOWED_METHODS: &str = "POST, OPTIONS";
const SUCCESS_MESSAGE: &str = "Contact form submitted successfully";
const GENERIC_FAILURE_MESSAGE: &str = "Failed to submit contact form. Please try again.";

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = MailerConfig::from_env();
    let transport = SendGridClient::new(config.api_url());
    let handler = InquiryHandler::new(config, transport);
    run(service_fn(|event| handler.handle(event))).await
}

struct InquiryHandler<TransportT: EmailTransport> {
    config: MailerConfig,
    transport: TransportT,
}

impl<TransportT: EmailTransport> InquiryHandler<TransportT> {
    fn new(config: MailerConfig, transport: TransportT) -> Self {
        Self { config, transport }
    }

    async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        if *event.method() == Method::OPTIONS {
            return preflight_response();
        }
        if *event.method() != Method::POST {
            let error = InquiryError::MethodNotAllowed(event.method().clone());
            error.log();
            return error.into_response();
        }
        match self.process_submission(&event).await {
            Ok(outcome) => outcome.into_response(self.debug_info()),
            Err(error) => {
                error.log();
                error.into_response()
            }
        }
    }

    async fn process_submission(&self, event: &Request) -> Result<InquiryOutcome, InquiryError> {
        let submission = parse_submission(event)?;
        let inquiry = submission.validate()?;
        let config = self.config.resolve().map_err(InquiryError::NotConfigured)?;

        let details = InquiryDetails::derive(inquiry, Utc::now());
        info!("Processing inquiry {}", details.id);
        let emails = render_inquiry_emails(&details).map_err(|error| {
            InquiryError::Internal(format!("Error rendering inquiry emails: {error}"))
        })?;
        self.config.log_presence();

        let admin_message = OutboundMessage {
            to: config.to_email,
            from: Sender {
                email: config.from_email,
                name: ADMIN_SENDER_NAME,
            },
            subject: emails.admin_subject,
            html: emails.admin_html,
        };
        let client_message = OutboundMessage {
            to: details.inquiry.email,
            from: Sender {
                email: config.from_email,
                name: CLIENT_SENDER_NAME,
            },
            subject: emails.client_subject,
            html: emails.client_html,
        };

        // The staff alert goes first. Its outcome never prevents the confirmation.
        let admin_delivery = self.deliver("Admin", config.api_key, &admin_message).await;
        let client_delivery = self.deliver("Client", config.api_key, &client_message).await;

        Ok(InquiryOutcome {
            inquiry_id: details.id,
            admin_delivery,
            client_delivery,
        })
    }

    async fn deliver(
        &self,
        kind: &'static str,
        api_key: &str,
        message: &OutboundMessage<'_>,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        info!("Attempting to send {kind} email to {}", message.to);
        let result = self.transport.send(api_key, message).await;
        match &result {
            Ok(receipt) => info!("{kind} email sent successfully: {}", receipt.status),
            Err(error) => error!(
                "{kind} email failed (status {:?}): {error}",
                error.status().map(|status| status.as_u16())
            ),
        }
        result
    }

    fn debug_info(&self) -> Option<DebugInfo<'_>> {
        if !self.config.expose_debug_info() {
            return None;
        }
        let config = self.config.resolve().ok()?;
        Some(DebugInfo {
            to_email: config.to_email,
            from_email: config.from_email,
        })
    }
}

fn parse_submission(event: &Request) -> Result<InquirySubmission, InquiryError> {
    match event.payload::<InquirySubmission>() {
        Ok(Some(submission)) => Ok(submission),
        // No recognised content type: browsers posting via fetch often omit it.
        Ok(None) => serde_json::from_slice(event.body().as_ref())
            .map_err(|error| InquiryError::Internal(format!("Invalid request body: {error}"))),
        Err(error) => Err(InquiryError::Internal(format!(
            "Invalid request body: {error}"
        ))),
    }
}

struct InquiryOutcome {
    inquiry_id: InquiryId,
    admin_delivery: Result<DeliveryReceipt, DeliveryError>,
    client_delivery: Result<DeliveryReceipt, DeliveryError>,
}

impl InquiryOutcome {
    fn into_response(self, debug: Option<DebugInfo<'_>>) -> Result<Response<Body>, Error> {
        let body = SubmissionResponse {
            success: true,
            message: SUCCESS_MESSAGE,
            inquiry_id: self.inquiry_id.as_str(),
            email_status: EmailStatus {
                admin_email_sent: self.admin_delivery.is_ok(),
                client_email_sent: self.client_delivery.is_ok(),
                admin_error: self.admin_delivery.err().map(|error| error.to_string()),
                client_error: self.client_delivery.err().map(|error| error.to_string()),
            },
            debug,
        };
        json_response(StatusCode::OK, &body)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionResponse<'a> {
    success: bool,
    message: &'static str,
    inquiry_id: &'a str,
    email_status: EmailStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<DebugInfo<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailStatus {
    admin_email_sent: bool,
    client_email_sent: bool,
    admin_error: Option<String>,
    client_error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugInfo<'a> {
    to_email: &'a str,
    from_email: &'a str,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn with_cors_headers(builder: Builder) -> Builder {
    builder
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "Content-Type")
}

fn preflight_response() -> Result<Response<Body>, Error> {
    Ok(with_cors_headers(Response::builder())
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Methods", ALLOWED_METHODS)
        .body("".into())?)
}

fn json_response(status: StatusCode, body: &impl Serialize) -> Result<Response<Body>, Error> {
    Ok(with_cors_headers(Response::builder())
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(serde_json::to_string(body)?.into())?)
}

#[derive(Debug)]
enum InquiryError {
    MethodNotAllowed(Method),
    MissingFields,
    NotConfigured(MissingConfig),
    Internal(String),
}

impl InquiryError {
    fn log(&self) {
        match self {
            InquiryError::MethodNotAllowed(_) | InquiryError::MissingFields => {
                warn!("Rejected contact form request: {self}");
            }
            InquiryError::NotConfigured(missing) => {
                error!("{} is missing", missing.variable());
            }
            InquiryError::Internal(description) => {
                error!("Contact form error: {description}");
            }
        }
    }

    fn into_response(self) -> Result<Response<Body>, Error> {
        match self {
            InquiryError::MethodNotAllowed(_) => {
                let body = ErrorResponse {
                    error: "Method not allowed",
                    debug: None,
                    details: None,
                };
                Ok(with_cors_headers(Response::builder())
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .header("Access-Control-Allow-Methods", ALLOWED_METHODS)
                    .header("Allow", ALLOWED_METHODS)
                    .header(CONTENT_TYPE, "application/json")
                    .body(serde_json::to_string(&body)?.into())?)
            }
            InquiryError::MissingFields => json_response(
                StatusCode::BAD_REQUEST,
                &ErrorResponse {
                    error: "Name, email, and message are required",
                    debug: None,
                    details: None,
                },
            ),
            InquiryError::NotConfigured(missing) => json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorResponse {
                    error: missing.description(),
                    debug: Some(missing.to_string()),
                    details: None,
                },
            ),
            InquiryError::Internal(description) => json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorResponse {
                    error: GENERIC_FAILURE_MESSAGE,
                    debug: None,
                    details: Some(description),
                },
            ),
        }
    }
}

impl std::fmt::Display for InquiryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InquiryError::MethodNotAllowed(method) => write!(f, "Method {method} not allowed"),
            InquiryError::MissingFields => write!(f, "Missing required fields"),
            InquiryError::NotConfigured(missing) => {
                write!(f, "{}: {missing}", missing.description())
            }
            InquiryError::Internal(description) => write!(f, "Internal error: {description}"),
        }
    }
}

impl std::error::Error for InquiryError {}
