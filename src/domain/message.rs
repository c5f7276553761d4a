//! Reminder requests and the messages composed from them.

use serde::{Deserialize, Serialize};

/// A caller's request to deliver one reminder.
///
/// Every field is optional; blank strings are treated the same as absent
/// values when the message is composed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRequest {
    /// Recipient address. The configured fallback is used when absent.
    #[serde(default, alias = "to", alias = "to_email")]
    pub recipient: Option<String>,
    /// Subject line.
    #[serde(default)]
    pub subject: Option<String>,
    /// Caller-supplied body, used verbatim when present.
    #[serde(default, alias = "message")]
    pub body: Option<String>,
    /// Structured fields for the reminder template.
    #[serde(default)]
    pub template: Option<TemplateFields>,
    /// Name of the person the reminder is sent on behalf of.
    #[serde(default)]
    pub contact_name: Option<String>,
}

impl ReminderRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the recipient.
    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Sets the subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the template fields.
    pub fn template(mut self, template: TemplateFields) -> Self {
        self.template = Some(template);
        self
    }

    /// Sets the contact name shown in the message footer.
    pub fn contact_name(mut self, contact_name: impl Into<String>) -> Self {
        self.contact_name = Some(contact_name.into());
        self
    }
}

/// Structured reminder details rendered by the default template.
///
/// The item may arrive as `item`, `medication`, or `name`. When more than
/// one is given, the first non-blank value in that order wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TemplateFieldsWire")]
pub struct TemplateFields {
    /// Name of the medication or item.
    pub item: Option<String>,
    /// Scheduled time, as displayed to the recipient.
    pub time: Option<String>,
    /// Status label, e.g. "taken" or "missed".
    pub status: Option<String>,
    /// Dosage, rendered only when present.
    pub dosage: Option<String>,
}

#[derive(Deserialize)]
struct TemplateFieldsWire {
    #[serde(default)]
    item: Option<String>,
    #[serde(default)]
    medication: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    dosage: Option<String>,
}

impl From<TemplateFieldsWire> for TemplateFields {
    fn from(wire: TemplateFieldsWire) -> Self {
        let item = [wire.item, wire.medication, wire.name]
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty());
        Self {
            item,
            time: wire.time,
            status: wire.status,
            dosage: wire.dosage,
        }
    }
}

impl TemplateFields {
    /// Returns true when at least one field carries a non-blank value.
    pub fn has_any(&self) -> bool {
        [&self.item, &self.time, &self.status, &self.dosage]
            .into_iter()
            .any(|field| non_blank(field).is_some())
    }
}

/// Body content type of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// `text/plain`.
    Plain,
    /// `text/html`.
    Rich,
}

impl ContentKind {
    /// MIME subtype used for the body part.
    pub fn mime_subtype(self) -> &'static str {
        match self {
            ContentKind::Plain => "plain",
            ContentKind::Rich => "html",
        }
    }
}

/// A fully composed message, ready to be encoded for the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Resolved recipient address.
    pub recipient: String,
    /// Whether the recipient came from configuration rather than the caller.
    pub recipient_is_fallback: bool,
    /// Subject line.
    pub subject: String,
    /// Message body, never empty.
    pub body: String,
    /// Body content type.
    pub content_kind: ContentKind,
    /// Sender contact named in the footer.
    pub contact_name: String,
}

/// Returns the trimmed value if it is present and not blank.
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
