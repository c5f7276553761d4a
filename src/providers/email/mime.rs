//! RFC 5322 encoding for the Gmail raw-message ingestion endpoint.

use base64::prelude::*;
use lettre::message::{Mailbox, MessageBuilder, MultiPart, SinglePart};

use crate::domain::{ContentKind, OutboundMessage};

/// Errors raised while turning a composed message into wire form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// An address header could not be parsed as a mailbox.
    #[error("invalid {field} address {value:?}: {reason}")]
    Address {
        /// Header the address was destined for.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// The message builder rejected the message.
    #[error("failed to build message: {0}")]
    Build(String),
}

/// Builds the RFC 5322 form of `message`.
///
/// The body is carried in a single UTF-8 part of the message's content kind,
/// wrapped in `multipart/mixed`.
pub fn build_message(message: &OutboundMessage, from: &str) -> Result<Vec<u8>, EncodeError> {
    let from_mailbox = parse_mailbox("from", from)?;
    let to_mailbox = parse_mailbox("to", &message.recipient)?;

    let part = match message.content_kind {
        ContentKind::Plain => SinglePart::plain(message.body.clone()),
        ContentKind::Rich => SinglePart::html(message.body.clone()),
    };

    let email = MessageBuilder::new()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(message.subject.as_str())
        .multipart(MultiPart::mixed().singlepart(part))
        .map_err(|e| EncodeError::Build(e.to_string()))?;

    Ok(email.formatted())
}

/// Builds `message` and encodes it as unpadded base64url, the form accepted
/// by the Gmail `messages.send` endpoint.
pub fn encode_raw_message(message: &OutboundMessage, from: &str) -> Result<String, EncodeError> {
    let bytes = build_message(message, from)?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

fn parse_mailbox(field: &'static str, value: &str) -> Result<Mailbox, EncodeError> {
    value.trim().parse().map_err(|e: lettre::address::AddressError| {
        EncodeError::Address {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content_kind: ContentKind, body: &str) -> OutboundMessage {
        OutboundMessage {
            recipient: "family@example.com".to_string(),
            recipient_is_fallback: false,
            subject: "Medication Reminder".to_string(),
            body: body.to_string(),
            content_kind,
            contact_name: "Hanako".to_string(),
        }
    }

    fn decoded(raw: &str) -> String {
        String::from_utf8(BASE64_URL_SAFE_NO_PAD.decode(raw).unwrap()).unwrap()
    }

    #[test]
    fn plain_message_has_headers_and_plain_part() {
        let raw = encode_raw_message(
            &message(ContentKind::Plain, "Take your medication."),
            "Reminders <reminders@example.com>",
        )
        .unwrap();
        let text = decoded(&raw);

        assert!(text.contains("To: family@example.com"));
        assert!(text.contains("Subject: Medication Reminder"));
        assert!(text.contains("multipart/mixed"));
        assert!(text.contains("text/plain; charset=utf-8"));
        assert!(text.contains("Take your medication."));
    }

    #[test]
    fn rich_message_uses_html_part() {
        let raw = encode_raw_message(
            &message(ContentKind::Rich, "<p>Aspirin</p>"),
            "reminders@example.com",
        )
        .unwrap();
        let text = decoded(&raw);

        assert!(text.contains("text/html; charset=utf-8"));
        assert!(text.contains("<p>Aspirin</p>"));
    }

    #[test]
    fn output_is_url_safe_without_padding() {
        let raw = encode_raw_message(
            &message(ContentKind::Plain, "??>>~~ binary-ish body ÿÿ"),
            "reminders@example.com",
        )
        .unwrap();

        assert!(!raw.contains('='));
        assert!(!raw.contains('+'));
        assert!(!raw.contains('/'));
    }

    #[test]
    fn unparseable_recipient_is_an_address_error() {
        let mut msg = message(ContentKind::Plain, "body");
        msg.recipient = "not an address".to_string();

        let err = encode_raw_message(&msg, "reminders@example.com").unwrap_err();
        assert!(matches!(err, EncodeError::Address { field: "to", .. }));
    }

    #[test]
    fn unparseable_sender_is_an_address_error() {
        let err = encode_raw_message(&message(ContentKind::Plain, "body"), "me").unwrap_err();
        assert!(matches!(err, EncodeError::Address { field: "from", .. }));
    }
}
