use crate::inquiry::InquiryDetails;
use chrono_tz::Australia::Sydney;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::Value;
use tinytemplate::{error::Error, TinyTemplate};

const ADMIN_TEMPLATE_NAME: &str = "admin-email";
const CLIENT_TEMPLATE_NAME: &str = "client-email";
const ADMIN_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/admin-email.html"
));
const CLIENT_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/client-email.html"
));

const SUBMITTED_AT_FORMAT: &str = "%d/%m/%Y, %I:%M:%S %p %Z";

const MAILTO_ADDRESS_FORMATTER: &str = "mailto_address";
/// Everything outside a plain address is escaped so a submitted email cannot add
/// `?cc=`-style headers to a mailto link.
const MAILTO_ADDRESS_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'@')
    .remove(b'.')
    .remove(b'-')
    .remove(b'_');

pub struct RenderedEmails {
    pub admin_subject: String,
    pub admin_html: String,
    pub client_subject: String,
    pub client_html: String,
}

#[derive(Serialize)]
struct Context<'a> {
    inquiry_id: &'a str,
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    company: Option<&'a str>,
    budget: Option<&'a str>,
    message: &'a str,
    service_label: &'static str,
    urgency_color: &'static str,
    urgency_label: &'static str,
    urgency_keyword: &'static str,
    urgency_title: &'static str,
    response_time: &'static str,
    priority_notice: &'static str,
    submitted_at: String,
}

impl<'a> From<&'a InquiryDetails<'a>> for Context<'a> {
    fn from(details: &'a InquiryDetails<'a>) -> Self {
        let inquiry = &details.inquiry;
        Self {
            inquiry_id: details.id.as_str(),
            name: inquiry.name,
            email: inquiry.email,
            phone: inquiry.phone,
            company: inquiry.company,
            budget: inquiry.budget,
            message: inquiry.message,
            service_label: details.service_label,
            urgency_color: details.urgency.color(),
            urgency_label: details.urgency.shouting_label(),
            urgency_keyword: details.urgency.keyword(),
            urgency_title: details.urgency.title(),
            response_time: details.urgency.response_time(),
            priority_notice: details.urgency.priority_notice(),
            submitted_at: details
                .submitted_at
                .with_timezone(&Sydney)
                .format(SUBMITTED_AT_FORMAT)
                .to_string(),
        }
    }
}

/// Renders the staff alert and the submitter confirmation.
///
/// Every interpolated value goes through TinyTemplate's default formatter, which
/// HTML-escapes it.
pub fn render_inquiry_emails(details: &InquiryDetails) -> Result<RenderedEmails, Error> {
    let mut tt = TinyTemplate::new();
    tt.add_formatter(MAILTO_ADDRESS_FORMATTER, format_mailto_address);
    tt.add_template(ADMIN_TEMPLATE_NAME, ADMIN_TEMPLATE)?;
    tt.add_template(CLIENT_TEMPLATE_NAME, CLIENT_TEMPLATE)?;
    let context = Context::from(details);
    Ok(RenderedEmails {
        admin_subject: format!(
            "🚨 NEW {} PRIORITY INQUIRY - {} - {}",
            context.urgency_label, context.name, context.service_label
        ),
        admin_html: tt.render(ADMIN_TEMPLATE_NAME, &context)?,
        client_subject: format!(
            "Thank you for contacting Everguard Intelligence - We'll respond {}",
            context.response_time
        ),
        client_html: tt.render(CLIENT_TEMPLATE_NAME, &context)?,
    })
}

fn format_mailto_address(value: &Value, output: &mut String) -> Result<(), Error> {
    let Value::String(address) = value else {
        return Err(Error::GenericError {
            msg: format!("Expected an email address, got {value}"),
        });
    };
    output.extend(utf8_percent_encode(address, MAILTO_ADDRESS_SET));
    Ok(())
}
