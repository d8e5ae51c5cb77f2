use std::borrow::Cow;
use tracing::info;

pub const API_KEY_VARIABLE: &str = "SENDGRID_API_KEY";
pub const FROM_EMAIL_VARIABLE: &str = "SENDGRID_FROM_EMAIL";
pub const TO_EMAIL_VARIABLE: &str = "SENDGRID_TO_EMAIL";
const API_URL_VARIABLE: &str = "SENDGRID_API_URL";
const EXPOSE_DEBUG_VARIABLE: &str = "CONTACT_FORM_EXPOSE_DEBUG";

const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Process-wide mail settings, read once at startup.
///
/// The three SendGrid values are kept optional here. Their absence is only reported
/// when a submission actually needs them, so a misconfigured deployment still answers
/// preflight and validation requests.
#[derive(Clone, Default)]
pub struct MailerConfig {
    api_key: Option<String>,
    from_email: Option<String>,
    to_email: Option<String>,
    api_url: Option<String>,
    expose_debug_info: bool,
}

impl MailerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());
        Self {
            api_key: non_empty(API_KEY_VARIABLE),
            from_email: non_empty(FROM_EMAIL_VARIABLE),
            to_email: non_empty(TO_EMAIL_VARIABLE),
            api_url: non_empty(API_URL_VARIABLE),
            expose_debug_info: non_empty(EXPOSE_DEBUG_VARIABLE)
                .is_some_and(|value| matches!(value.as_str(), "1" | "true" | "yes")),
        }
    }

    pub fn api_url(&self) -> Cow<'_, str> {
        self.api_url
            .as_deref()
            .map(Cow::Borrowed)
            .unwrap_or(SENDGRID_API_URL.into())
    }

    pub fn expose_debug_info(&self) -> bool {
        self.expose_debug_info
    }

    /// Checks the required values in a fixed order, stopping at the first one missing.
    pub fn resolve(&self) -> Result<ResolvedConfig<'_>, MissingConfig> {
        let api_key = self.api_key.as_deref().ok_or(MissingConfig::ApiKey)?;
        let from_email = self.from_email.as_deref().ok_or(MissingConfig::FromEmail)?;
        let to_email = self.to_email.as_deref().ok_or(MissingConfig::ToEmail)?;
        Ok(ResolvedConfig {
            api_key,
            from_email,
            to_email,
        })
    }

    pub fn log_presence(&self) {
        info!(
            "Environment check: has_api_key={}, has_from_email={}, has_to_email={}, from_email={:?}, to_email={:?}",
            self.api_key.is_some(),
            self.from_email.is_some(),
            self.to_email.is_some(),
            self.from_email,
            self.to_email,
        );
    }
}

pub struct ResolvedConfig<'a> {
    pub api_key: &'a str,
    pub from_email: &'a str,
    pub to_email: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingConfig {
    ApiKey,
    FromEmail,
    ToEmail,
}

impl MissingConfig {
    pub fn description(self) -> &'static str {
        match self {
            MissingConfig::ApiKey => "Email service not configured - missing API key",
            MissingConfig::FromEmail => "Email service not configured - missing from email",
            MissingConfig::ToEmail => "Email service not configured - missing to email",
        }
    }

    pub fn variable(self) -> &'static str {
        match self {
            MissingConfig::ApiKey => API_KEY_VARIABLE,
            MissingConfig::FromEmail => FROM_EMAIL_VARIABLE,
            MissingConfig::ToEmail => TO_EMAIL_VARIABLE,
        }
    }
}

impl std::fmt::Display for MissingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} environment variable not set", self.variable())
    }
}

impl std::error::Error for MissingConfig {}


#[cfg(test)]
mod tests {
    use super::{
        test_support::{FakeEnvironment, FAKE_API_KEY, FAKE_FROM_EMAIL, FAKE_TO_EMAIL},
        MailerConfig, MissingConfig, API_KEY_VARIABLE, FROM_EMAIL_VARIABLE, SENDGRID_API_URL,
        TO_EMAIL_VARIABLE,
    };
    use googletest::prelude::*;
    use serial_test::serial;

    const FAKE_URL: &str = "http://localhost:1/v3/mail/send";

    #[test]
    fn resolves_complete_configuration() -> Result<()> {
        let config = FakeEnvironment::complete(FAKE_URL).into_config();

        let resolved = config.resolve();

        verify_that!(resolved.is_ok(), eq(true))?;
        let resolved = resolved.unwrap();
        verify_that!(resolved.api_key, eq(FAKE_API_KEY))?;
        verify_that!(resolved.from_email, eq(FAKE_FROM_EMAIL))?;
        verify_that!(resolved.to_email, eq(FAKE_TO_EMAIL))
    }

    #[test]
    fn reports_missing_api_key_before_other_values() -> Result<()> {
        let config = FakeEnvironment::complete(FAKE_URL)
            .without(API_KEY_VARIABLE)
            .without(TO_EMAIL_VARIABLE)
            .into_config();

        verify_that!(config.resolve().err(), some(eq(MissingConfig::ApiKey)))
    }

    #[test]
    fn reports_missing_from_email_before_to_email() -> Result<()> {
        let config = FakeEnvironment::complete(FAKE_URL)
            .without(FROM_EMAIL_VARIABLE)
            .without(TO_EMAIL_VARIABLE)
            .into_config();

        verify_that!(config.resolve().err(), some(eq(MissingConfig::FromEmail)))
    }

    #[test]
    fn treats_empty_value_as_missing() -> Result<()> {
        let config = FakeEnvironment::complete(FAKE_URL)
            .with(TO_EMAIL_VARIABLE, "")
            .into_config();

        verify_that!(config.resolve().err(), some(eq(MissingConfig::ToEmail)))
    }

    #[test]
    fn falls_back_to_sendgrid_url() -> Result<()> {
        let config = MailerConfig::from_lookup(|_| None);

        verify_that!(config.api_url().into_owned(), eq(SENDGRID_API_URL))
    }

    #[test]
    fn hides_debug_info_by_default() -> Result<()> {
        let config = FakeEnvironment::complete(FAKE_URL).into_config();

        verify_that!(config.expose_debug_info(), eq(false))
    }

    #[test]
    fn describes_each_missing_value_differently() -> Result<()> {
        verify_that!(
            MissingConfig::ApiKey.description(),
            contains_substring("API key")
        )?;
        verify_that!(
            MissingConfig::FromEmail.description(),
            contains_substring("from email")
        )?;
        verify_that!(
            MissingConfig::ToEmail.description(),
            contains_substring("to email")
        )?;
        verify_that!(
            MissingConfig::ToEmail.to_string(),
            eq("SENDGRID_TO_EMAIL environment variable not set")
        )
    }

    #[test]
    #[serial]
    fn reads_values_from_process_environment() -> Result<()> {
        let _api_key = TemporaryEnv::new(API_KEY_VARIABLE, "SG.from-env");
        let _from = TemporaryEnv::new(FROM_EMAIL_VARIABLE, "from@example.com");
        let _to = TemporaryEnv::new(TO_EMAIL_VARIABLE, "to@example.com");

        let config = MailerConfig::from_env();

        verify_that!(config.resolve().map(|c| c.api_key).ok(), some(eq("SG.from-env")))
    }

    struct TemporaryEnv(&'static str, Option<String>);

    impl TemporaryEnv {
        fn new(key: &'static str, value: impl AsRef<str>) -> Self {
            let old_value = std::env::var(key).ok();
            std::env::set_var(key, value.as_ref());
            Self(key, old_value)
        }
    }

    impl Drop for TemporaryEnv {
        fn drop(&mut self) {
            if let Some(value) = self.1.as_ref() {
                std::env::set_var(self.0, value);
            } else {
                std::env::remove_var(self.0);
            }
        }
    }
}
