use crate::InquiryError;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt::Display;

const ID_SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LENGTH: usize = 9;

const DEFAULT_SERVICE_LABEL: &str = "General Inquiry";

#[derive(Deserialize, Debug, Default)]
pub struct InquirySubmission {
    name: Option<String>,
    email: Option<String>,
    #[serde(default, deserialize_with = "display_text")]
    phone: Option<String>,
    #[serde(default, deserialize_with = "display_text")]
    company: Option<String>,
    #[serde(default, deserialize_with = "display_text")]
    service: Option<String>,
    #[serde(default, deserialize_with = "display_text")]
    urgency: Option<String>,
    message: Option<String>,
    #[serde(default, deserialize_with = "display_text")]
    budget: Option<String>,
}

/// Optional fields are only ever displayed, so scalars of any type are taken as text.
/// Arrays and objects are treated as absent.
fn display_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    })
}

impl InquirySubmission {
    pub fn validate(&self) -> Result<ValidatedInquiry<'_>, InquiryError> {
        let (Some(name), Some(email), Some(message)) = (
            present(&self.name),
            present(&self.email),
            present(&self.message),
        ) else {
            return Err(InquiryError::MissingFields);
        };

        Ok(ValidatedInquiry {
            name,
            email,
            message,
            phone: present(&self.phone),
            company: present(&self.company),
            service: present(&self.service),
            urgency: present(&self.urgency),
            budget: present(&self.budget),
        })
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

#[derive(Debug)]
pub struct ValidatedInquiry<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub message: &'a str,
    pub phone: Option<&'a str>,
    pub company: Option<&'a str>,
    pub service: Option<&'a str>,
    pub urgency: Option<&'a str>,
    pub budget: Option<&'a str>,
}

/// A validated inquiry together with everything derived from it for display.
pub struct InquiryDetails<'a> {
    pub id: InquiryId,
    pub inquiry: ValidatedInquiry<'a>,
    pub service_label: &'static str,
    pub urgency: Urgency,
    pub submitted_at: DateTime<Utc>,
}

impl<'a> InquiryDetails<'a> {
    pub fn derive(inquiry: ValidatedInquiry<'a>, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: InquiryId::generate(submitted_at, &mut rand::thread_rng()),
            service_label: service_label(inquiry.service),
            urgency: Urgency::from_submitted(inquiry.urgency),
            inquiry,
            submitted_at,
        }
    }
}

pub fn service_label(service: Option<&str>) -> &'static str {
    match service {
        Some("corporate-intelligence") => "Corporate Intelligence",
        Some("insurance-investigations") => "Insurance Investigations",
        Some("osint") => "OSINT Services",
        Some("skip-tracing") => "Skip Tracing",
        Some("surveillance") => "Surveillance",
        Some("background-checks") => "Background Checks",
        Some("other") => "Other Services",
        _ => DEFAULT_SERVICE_LABEL,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Medium,
    High,
    Urgent,
}

impl Urgency {
    /// Unrecognised or missing values are treated as medium.
    pub fn from_submitted(urgency: Option<&str>) -> Self {
        match urgency {
            Some("low") => Urgency::Low,
            Some("high") => Urgency::High,
            Some("urgent") => Urgency::Urgent,
            _ => Urgency::Medium,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Urgency::Low => "#10B981",
            Urgency::Medium => "#F59E0B",
            Urgency::High => "#EF4444",
            Urgency::Urgent => "#DC2626",
        }
    }

    pub fn response_time(self) -> &'static str {
        match self {
            Urgency::Low => "within 2 business days",
            Urgency::Medium => "within 1 business day",
            Urgency::High => "within 48 hours",
            Urgency::Urgent => "within 24 hours",
        }
    }

    pub fn priority_notice(self) -> &'static str {
        match self {
            Urgency::Urgent => "URGENT - Respond within 24 hours",
            Urgency::High => "HIGH PRIORITY - Respond within 48 hours",
            Urgency::Low | Urgency::Medium => "Standard response time applies",
        }
    }

    pub fn shouting_label(self) -> &'static str {
        match self {
            Urgency::Low => "LOW",
            Urgency::Medium => "MEDIUM",
            Urgency::High => "HIGH",
            Urgency::Urgent => "URGENT",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Urgency::Low => "Low",
            Urgency::Medium => "Medium",
            Urgency::High => "High",
            Urgency::Urgent => "Urgent",
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Urgent => "urgent",
        }
    }
}

/// Reference handed back to the submitter, of the form `INQ-<unix millis>-<base36 suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryId(String);

impl InquiryId {
    pub fn generate(now: DateTime<Utc>, rng: &mut impl Rng) -> Self {
        let suffix: String = (0..ID_SUFFIX_LENGTH)
            .map(|_| ID_SUFFIX_ALPHABET[rng.gen_range(0..ID_SUFFIX_ALPHABET.len())] as char)
            .collect();
        Self(format!("INQ-{}-{suffix}", now.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InquiryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}


#[cfg(test)]
mod tests {
    use super::{service_label, InquiryId, InquirySubmission, Urgency, ValidatedInquiry};
    use crate::InquiryError;
    use chrono::{TimeZone, Utc};
    use googletest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn accepts_submission_with_required_fields() -> Result<()> {
        let submission = InquirySubmission::arbitrary();

        let inquiry = submission.validate();

        verify_that!(
            inquiry,
            ok(matches_pattern!(ValidatedInquiry {
                name: eq("Arbitrary sender"),
                email: eq("sender@example.com"),
                phone: none(),
            }))
        )
    }

    #[test]
    fn rejects_submission_without_name() -> Result<()> {
        let submission = InquirySubmission {
            name: None,
            ..InquirySubmission::arbitrary()
        };

        verify_that!(
            matches!(submission.validate(), Err(InquiryError::MissingFields)),
            eq(true)
        )
    }

    #[test]
    fn rejects_submission_with_empty_message() -> Result<()> {
        let submission = InquirySubmission {
            message: Some("".into()),
            ..InquirySubmission::arbitrary()
        };

        verify_that!(
            matches!(submission.validate(), Err(InquiryError::MissingFields)),
            eq(true)
        )
    }

    #[test]
    fn treats_empty_optional_fields_as_absent() -> Result<()> {
        let submission = InquirySubmission {
            company: Some("".into()),
            ..InquirySubmission::arbitrary()
        };

        verify_that!(
            submission.validate().map(|inquiry| inquiry.company),
            ok(none())
        )
    }

    #[test]
    fn accepts_non_string_optional_fields_as_text() -> Result<()> {
        let submission: InquirySubmission = serde_json::from_str(
            r#"{"name":"A","email":"a@example.com","message":"m","budget":5000,"phone":null,"company":["x"],"service":true}"#,
        )
        .unwrap();

        verify_that!(
            submission.validate(),
            ok(matches_pattern!(ValidatedInquiry {
                budget: some(eq("5000")),
                phone: none(),
                company: none(),
                service: some(eq("true")),
            }))
        )
    }

    #[test]
    fn rejects_non_string_required_field() -> Result<()> {
        let result = serde_json::from_str::<InquirySubmission>(
            r#"{"name":42,"email":"a@example.com","message":"m"}"#,
        );

        verify_that!(result.is_err(), eq(true))
    }

    #[test]
    fn maps_known_service_to_label() -> Result<()> {
        verify_that!(service_label(Some("osint")), eq("OSINT Services"))
    }

    #[test]
    fn maps_unknown_service_to_general_inquiry() -> Result<()> {
        verify_that!(service_label(Some("astrology")), eq("General Inquiry"))?;
        verify_that!(service_label(None), eq("General Inquiry"))
    }

    #[test]
    fn maps_unknown_urgency_to_medium() -> Result<()> {
        let urgency = Urgency::from_submitted(Some("whenever"));

        verify_that!(urgency, eq(Urgency::Medium))?;
        verify_that!(urgency.color(), eq("#F59E0B"))?;
        verify_that!(urgency.response_time(), eq("within 1 business day"))
    }

    #[test]
    fn maps_urgent_to_shortest_response_time() -> Result<()> {
        let urgency = Urgency::from_submitted(Some("urgent"));

        verify_that!(urgency.color(), eq("#DC2626"))?;
        verify_that!(urgency.response_time(), eq("within 24 hours"))?;
        verify_that!(
            urgency.priority_notice(),
            eq("URGENT - Respond within 24 hours")
        )
    }

    #[test]
    fn generates_id_from_timestamp_and_random_suffix() -> Result<()> {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

        let id = InquiryId::generate(now, &mut StdRng::seed_from_u64(7));

        verify_that!(id.as_str(), starts_with("INQ-1700000000123-"))?;
        let suffix = id.as_str().rsplit('-').next().unwrap();
        verify_that!(suffix.len(), eq(9))?;
        verify_that!(
            suffix
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()),
            eq(true)
        )
    }

    #[test]
    fn displays_id_as_its_text() -> Result<()> {
        let id = InquiryId::generate(Utc::now(), &mut StdRng::seed_from_u64(3));

        verify_that!(id.to_string(), eq(id.as_str()))
    }

    #[test]
    fn generates_distinct_ids_for_same_instant() -> Result<()> {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(42);

        let first = InquiryId::generate(now, &mut rng);
        let second = InquiryId::generate(now, &mut rng);

        verify_that!(first, not(eq(second)))
    }
}
