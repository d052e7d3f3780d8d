//! Contact form: sanitize, validate, rate limit, and relay by mail.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::infrastructure::mailer::{MailError, MailMessage, Mailer};

use super::rate_limit::RateLimiter;

/// Formats a visitor can ask about.
pub const CONTACT_FORMATS: [&str; 5] = ["Charlas", "Talleres", "Sesiones 1 a 1", "Sesiones Grupales", "No estoy seguro"];

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("too many requests")]
    RateLimited,

    #[error("invalid {0}")]
    Invalid(&'static str),

    #[error("invalid request")]
    Honeypot,

    #[error("mail configuration incomplete")]
    MailNotConfigured,

    #[error("could not send message")]
    Mail(#[from] MailError),
}

/// Body of `POST /api/contact`. Accepts the Spanish field names the site form posts.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContactRequest {
    #[serde(default, alias = "nombre")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "formato")]
    pub format: String,
    #[serde(default, alias = "mensaje")]
    pub message: String,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Validate)]
pub struct ContactSubmission {
    #[validate(length(min = 2, max = 80))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom = "known_format")]
    pub format: String,
    #[validate(length(min = 10, max = 2000))]
    pub message: String,
    pub company: String,
}

impl From<ContactRequest> for ContactSubmission {
    fn from(request: ContactRequest) -> Self {
        Self {
            name: sanitize(&request.name),
            email: sanitize(&request.email),
            format: request.format,
            message: sanitize(&request.message),
            company: sanitize(request.company.as_deref().unwrap_or_default()),
        }
    }
}

fn known_format(format: &str) -> Result<(), ValidationError> {
    if CONTACT_FORMATS.contains(&format) {
        Ok(())
    } else {
        Err(ValidationError::new("format"))
    }
}

/// Trims and collapses every whitespace run into one space.
pub fn sanitize(value: &str) -> String { value.split_whitespace().collect::<Vec<_>>().join(" ") }

/// First failing field in form order.
fn first_invalid(errors: &ValidationErrors) -> &'static str {
    let fields = errors.field_errors();
    ["name", "email", "format", "message"].into_iter().find(|f| fields.contains_key(f)).unwrap_or("request")
}

#[derive(Clone, Debug, Default)]
pub struct MailSettings {
    pub from: Option<String>,
    pub to: Option<String>,
    pub site_url: String,
    pub site_name: String,
}

pub struct ContactService {
    limiter: RateLimiter,
    mailer: Option<Arc<dyn Mailer>>,
    settings: MailSettings,
}

impl ContactService {
    pub fn new(limiter: RateLimiter, mailer: Option<Arc<dyn Mailer>>, settings: MailSettings) -> Self {
        Self { limiter, mailer, settings }
    }

    /// Handles one submission from `client_ip`.
    #[tracing::instrument(skip(self, request, now))]
    pub async fn submit(&self, client_ip: &str, request: ContactRequest, now: DateTime<Utc>) -> Result<(), ContactError> {
        if !self.limiter.check(client_ip, now) {
            tracing::warn!("contact form rate limited");
            return Err(ContactError::RateLimited);
        }

        let submission = ContactSubmission::from(request);
        submission.validate().map_err(|e| ContactError::Invalid(first_invalid(&e)))?;
        if !submission.company.is_empty() {
            return Err(ContactError::Honeypot);
        }

        let (Some(from), Some(to), Some(mailer)) = (
            self.settings.from.as_deref().filter(|s| !s.is_empty()),
            self.settings.to.as_deref().filter(|s| !s.is_empty()),
            self.mailer.as_ref(),
        ) else {
            return Err(ContactError::MailNotConfigured);
        };

        mailer.send(self.owner_notice(from, to, &submission)).await?;
        mailer.send(self.acknowledgement(from, &submission)).await?;

        tracing::info!(format = %submission.format, "contact message relayed");
        Ok(())
    }

    fn owner_notice(&self, from: &str, to: &str, s: &ContactSubmission) -> MailMessage {
        let site = &self.settings.site_name;
        MailMessage {
            from: from.to_string(),
            to: to.to_string(),
            reply_to: Some(s.email.clone()),
            subject: format!("Nueva consulta {site}: {}", s.name),
            text: format!(
                "Nueva consulta desde el sitio {site}\n\nNombre: {}\nEmail: {}\nExperiencia: {}\n\nMensaje:\n{}",
                s.name, s.email, s.format, s.message
            ),
            html: format!(
                "<p><strong>Nueva consulta desde el sitio {}</strong></p>\
                 <p><strong>Nombre:</strong> {}</p>\
                 <p><strong>Email:</strong> {}</p>\
                 <p><strong>Experiencia:</strong> {}</p>\
                 <p><strong>Mensaje:</strong></p><p>{}</p>",
                escape_html(site),
                escape_html(&s.name),
                escape_html(&s.email),
                escape_html(&s.format),
                escape_html(&s.message),
            ),
        }
    }

    fn acknowledgement(&self, from: &str, s: &ContactSubmission) -> MailMessage {
        let site = &self.settings.site_name;
        let url = &self.settings.site_url;
        MailMessage {
            from: from.to_string(),
            to: s.email.clone(),
            reply_to: None,
            subject: format!("Recibimos tu consulta: {site}"),
            text: format!(
                "Hola {},\n\nGracias por escribir. Recibimos tu consulta y respondemos en 24 a 48 horas con propuestas posibles.\n\nPodés conocer más en {url}.\n\n{site}",
                s.name
            ),
            html: format!(
                "<p>Hola {},</p>\
                 <p>Gracias por escribir. Recibimos tu consulta y respondemos en 24 a 48 horas con propuestas posibles.</p>\
                 <p>Podés conocer más en <a href=\"{url}\">{url}</a>.</p><p>{}</p>",
                escape_html(&s.name),
                escape_html(site),
                url = escape_html(url),
            ),
        }
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
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
