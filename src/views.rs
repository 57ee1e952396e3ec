//! View models for the login and registration pages, and the renderer that
//! turns them into HTML.
//!
//! JSON clients receive the view models themselves; HTML clients receive
//! whatever the configured [`ViewRenderer`] makes of them.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::config::{FormField, WebConfig};
use crate::identity::AccountStore;

/// Status banner shown above the login form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
    Unverified,
    Verified,
    Created,
    Reset,
    Forgot,
}

impl LoginStatus {
    /// Case-insensitive parse of the `status` query parameter. Anything
    /// outside the known set shows no banner.
    pub fn parse(value: &str) -> Option<Self> {
        const KNOWN: [(&str, LoginStatus); 5] = [
            ("unverified", LoginStatus::Unverified),
            ("verified", LoginStatus::Verified),
            ("created", LoginStatus::Created),
            ("reset", LoginStatus::Reset),
            ("forgot", LoginStatus::Forgot),
        ];
        KNOWN
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(value))
            .map(|(_, status)| *status)
    }

    pub fn heading(&self) -> &'static str {
        match self {
            LoginStatus::Unverified => "Your account verification email has been sent!",
            LoginStatus::Verified => "Your Account Has Been Verified.",
            LoginStatus::Created => "Your Account Has Been Created.",
            LoginStatus::Reset => "Password Reset Successfully.",
            LoginStatus::Forgot => "Password Reset Requested.",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            LoginStatus::Unverified => {
                "Before you can log into your account, you need to activate your account by clicking the link we sent to your inbox."
            }
            LoginStatus::Verified | LoginStatus::Created => "You may now login.",
            LoginStatus::Reset => "You can now login with your new password.",
            LoginStatus::Forgot => {
                "If an account exists for the email provided, you will receive an email shortly."
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginViewModel {
    pub form: Vec<FormField>,
    pub account_stores: Vec<AccountStore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LoginStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_email_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forgot_password_uri: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Values to refill the form with. Never contains passwords.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub form_data: BTreeMap<String, String>,
}

impl LoginViewModel {
    pub fn new(web: &WebConfig, account_stores: Vec<AccountStore>) -> Self {
        let enabled_uri = |enabled: bool, uri: &str| enabled.then(|| uri.to_string());
        Self {
            form: FormField::default_login(),
            account_stores,
            status: None,
            registration_uri: enabled_uri(web.register.enabled, &web.register.uri),
            verify_email_uri: enabled_uri(web.verify_email.enabled, &web.verify_email.uri),
            forgot_password_uri: enabled_uri(web.forgot_password.enabled, &web.forgot_password.uri),
            errors: Vec::new(),
            form_data: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterViewModel {
    pub form: Vec<FormField>,
    pub login_uri: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub form_data: BTreeMap<String, String>,
}

impl RegisterViewModel {
    pub fn new(web: &WebConfig) -> Self {
        Self {
            form: web
                .register
                .fields
                .iter()
                .filter(|f| f.enabled)
                .cloned()
                .collect(),
            login_uri: web.login.enabled.then(|| web.login.uri.clone()),
            errors: Vec::new(),
            form_data: BTreeMap::new(),
        }
    }
}

/// A page to render. Carries the action the form posts back to.
#[derive(Debug, Clone, Copy)]
pub enum View<'a> {
    Login {
        action: &'a str,
        model: &'a LoginViewModel,
    },
    Register {
        action: &'a str,
        model: &'a RegisterViewModel,
    },
}

/// Turns a view into an HTML document.
pub trait ViewRenderer: Send + Sync + 'static {
    fn render(&self, view: View<'_>) -> String;
}

/// Minimal unstyled HTML pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHtmlRenderer;

impl ViewRenderer for PlainHtmlRenderer {
    fn render(&self, view: View<'_>) -> String {
        let mut html = String::new();
        match view {
            View::Login { action, model } => {
                page_start(&mut html, "Log In");
                if let Some(status) = model.status {
                    let _ = write!(
                        html,
                        "<div class=\"status\"><span>{}</span><p>{}</p>",
                        status.heading(),
                        status.message()
                    );
                    if let (LoginStatus::Unverified, Some(uri)) = (status, &model.verify_email_uri) {
                        let _ = write!(
                            html,
                            "<p>Didn't get the email? <a href=\"{}\">Click Here</a>.</p>",
                            escape(uri)
                        );
                    }
                    html.push_str("</div>");
                }
                errors(&mut html, &model.errors);
                form(&mut html, action, &model.form, &model.form_data, "Log In");
                for store in &model.account_stores {
                    let _ = write!(
                        html,
                        "<p class=\"provider\" data-provider=\"{}\">{}</p>",
                        escape(&store.provider_id),
                        escape(&store.name)
                    );
                }
                if let Some(ref uri) = model.registration_uri {
                    let _ = write!(html, "<a href=\"{}\">Create Account</a>", escape(uri));
                }
                if let Some(ref uri) = model.forgot_password_uri {
                    let _ = write!(html, "<a href=\"{}\">Forgot Password?</a>", escape(uri));
                }
            }
            View::Register { action, model } => {
                page_start(&mut html, "Create Account");
                errors(&mut html, &model.errors);
                form(&mut html, action, &model.form, &model.form_data, "Create Account");
                if let Some(ref uri) = model.login_uri {
                    let _ = write!(html, "<a href=\"{}\">Back to Log In</a>", escape(uri));
                }
            }
        }
        html.push_str("</body></html>");
        html
    }
}

fn page_start(html: &mut String, title: &str) {
    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title></head><body><h1>{}</h1>",
        title, title
    );
}

fn errors(html: &mut String, errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    html.push_str("<ul class=\"errors\">");
    for error in errors {
        let _ = write!(html, "<li>{}</li>", escape(error));
    }
    html.push_str("</ul>");
}

fn form(
    html: &mut String,
    action: &str,
    fields: &[FormField],
    data: &BTreeMap<String, String>,
    submit: &str,
) {
    let _ = write!(html, "<form method=\"post\" action=\"{}\">", escape(action));
    for field in fields.iter().filter(|f| f.enabled) {
        let value = data.get(&field.name).map(String::as_str).unwrap_or("");
        let _ = write!(
            html,
            "<label>{label}<input name=\"{name}\" type=\"{ty}\" placeholder=\"{placeholder}\" value=\"{value}\"{required}></label>",
            label = escape(&field.label),
            name = escape(&field.name),
            ty = escape(&field.field_type),
            placeholder = escape(&field.placeholder),
            value = escape(value),
            required = if field.required { " required" } else { "" },
        );
    }
    let _ = write!(html, "<button type=\"submit\">{}</button></form>", submit);
}

fn escape(s: &str) -> String {
    handlebars::html_escape(s)
}
