//! Reminder message composition.
//!
//! [`MessageComposer::compose`] is a pure function of the request and the
//! composer's configuration: it never fails and never returns an empty body.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{non_blank, ContentKind, OutboundMessage, ReminderRequest, TemplateFields};

/// Subject used when the caller supplies none.
pub const DEFAULT_SUBJECT: &str = "Medication Reminder";

/// Contact named in the footer when the caller supplies none.
pub const DEFAULT_SENDER_NAME: &str = "Medication Reminder";

/// Item shown by the template when the caller names none.
pub const DEFAULT_ITEM: &str = "your medication";

/// Time shown by the template when the caller gives none.
pub const DEFAULT_TIME: &str = "08:00";

/// Status shown by the template when the caller gives none.
pub const DEFAULT_STATUS: &str = "scheduled";

/// Body used when the caller supplies neither a body nor template fields.
pub const DEFAULT_BODY: &str = "This is a friendly reminder to take your medication as scheduled.\n\
\n\
If you have already taken it, you can ignore this message.";

/// Structural tags whose presence marks a caller body as HTML.
static MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<\s*/?\s*(?:html|head|body|div|span|p|br|hr|h[1-6]|table|thead|tbody|tr|td|th|ul|ol|li|a|b|i|em|strong|img|style|center|font)(?:\s[^>]*)?/?\s*>",
    )
    .expect("Invalid regex pattern for markup detection")
});

/// Builds outbound messages from reminder requests.
#[derive(Debug, Clone)]
pub struct MessageComposer {
    fallback_recipient: String,
    default_subject: String,
    sender_name: String,
}

impl MessageComposer {
    /// Creates a composer that sends to `fallback_recipient` when a request
    /// names no recipient.
    pub fn new(fallback_recipient: impl Into<String>) -> Self {
        Self {
            fallback_recipient: fallback_recipient.into(),
            default_subject: DEFAULT_SUBJECT.to_string(),
            sender_name: DEFAULT_SENDER_NAME.to_string(),
        }
    }

    /// Sets the subject used when a request has none.
    pub fn with_default_subject(mut self, subject: impl Into<String>) -> Self {
        self.default_subject = subject.into();
        self
    }

    /// Sets the footer contact used when a request has none.
    pub fn with_sender_name(mut self, sender_name: impl Into<String>) -> Self {
        self.sender_name = sender_name.into();
        self
    }

    /// Returns the configured fallback recipient.
    pub fn fallback_recipient(&self) -> &str {
        &self.fallback_recipient
    }

    /// Composes the message for `request`.
    ///
    /// Body selection, in order: a non-blank caller body verbatim; the rich
    /// reminder template when any template field is set; the plain default.
    pub fn compose(&self, request: &ReminderRequest) -> OutboundMessage {
        let (recipient, recipient_is_fallback) = match non_blank(&request.recipient) {
            Some(recipient) => (recipient.to_string(), false),
            None => {
                tracing::warn!(
                    fallback = %self.fallback_recipient,
                    "reminder has no recipient; using configured fallback"
                );
                (self.fallback_recipient.clone(), true)
            }
        };

        let subject = non_blank(&request.subject)
            .unwrap_or(&self.default_subject)
            .to_string();
        let contact_name = non_blank(&request.contact_name)
            .unwrap_or(&self.sender_name)
            .to_string();

        let caller_body = request.body.as_deref().filter(|b| !b.trim().is_empty());
        let template = request.template.as_ref().filter(|fields| fields.has_any());

        let (body, content_kind) = if let Some(body) = caller_body {
            (body.to_string(), detect_content_kind(body))
        } else if let Some(fields) = template {
            (
                render_template(&subject, fields, &contact_name),
                ContentKind::Rich,
            )
        } else {
            (DEFAULT_BODY.to_string(), ContentKind::Plain)
        };

        OutboundMessage {
            recipient,
            recipient_is_fallback,
            subject,
            body,
            content_kind,
            contact_name,
        }
    }
}

/// Classifies a caller-supplied body as rich when it contains structural markup.
pub fn detect_content_kind(body: &str) -> ContentKind {
    if MARKUP_TAG.is_match(body) {
        ContentKind::Rich
    } else {
        ContentKind::Plain
    }
}

fn render_template(subject: &str, fields: &TemplateFields, contact_name: &str) -> String {
    let item = escape_html(non_blank(&fields.item).unwrap_or(DEFAULT_ITEM));
    let time = escape_html(non_blank(&fields.time).unwrap_or(DEFAULT_TIME));
    let status = escape_html(non_blank(&fields.status).unwrap_or(DEFAULT_STATUS));
    let dosage_row = non_blank(&fields.dosage)
        .map(|dosage| {
            format!(
                "\n          <tr><td style=\"padding: 6px 12px; color: #666;\">Dosage</td><td style=\"padding: 6px 12px;\">{}</td></tr>",
                escape_html(dosage)
            )
        })
        .unwrap_or_default();
    let subject = escape_html(subject);
    let contact_name = escape_html(contact_name);

    format!(
        r#"<html>
  <body>
    <div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
      <div style="background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; padding: 20px; text-align: center; border-radius: 10px 10px 0 0;">
        <h1 style="margin: 0;">{subject}</h1>
      </div>
      <div style="padding: 20px; background: #f8f9fa; border-radius: 0 0 10px 10px;">
        <p>It is time for <strong>{item}</strong>.</p>
        <table style="border-collapse: collapse;">
          <tr><td style="padding: 6px 12px; color: #666;">Medication</td><td style="padding: 6px 12px;">{item}</td></tr>
          <tr><td style="padding: 6px 12px; color: #666;">Time</td><td style="padding: 6px 12px;">{time}</td></tr>
          <tr><td style="padding: 6px 12px; color: #666;">Status</td><td style="padding: 6px 12px;">{status}</td></tr>{dosage_row}
        </table>
        <hr style="margin: 20px 0;">
        <p style="color: #666; font-size: 12px;">
          This message was sent automatically.<br>
          Sender: {contact_name}
        </p>
      </div>
    </div>
  </body>
</html>
"#
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
