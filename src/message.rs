use chrono::{DateTime, Utc};

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// An inbound WhatsApp message, created on webhook receipt and passed by
/// value through the analysis pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Sender phone number without the `whatsapp:` channel prefix
    pub sender: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// The subset of Twilio's inbound message form we care about.
#[derive(Debug, Default)]
pub struct TwilioForm {
    pub from: String,
    pub body: String,
}

impl TwilioForm {
    pub fn from_pairs(params: &[(String, String)]) -> Self {
        let field = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        Self {
            from: field("From"),
            body: field("Body"),
        }
    }
}

impl Message {
    /// Build a message from a Twilio webhook form. Returns `None` when the
    /// sender or text is empty, since there is nothing to analyze.
    pub fn from_twilio(form: &TwilioForm) -> Option<Self> {
        let sender = form.from.replace(WHATSAPP_PREFIX, "").trim().to_string();
        let text = form.body.trim().to_string();

        if sender.is_empty() || text.is_empty() {
            return None;
        }

        Some(Self {
            sender,
            text,
            received_at: Utc::now(),
        })
    }
}

/// Address a bare phone number on the WhatsApp channel.
pub fn whatsapp_address(number: &str) -> String {
    if number.starts_with(WHATSAPP_PREFIX) {
        number.to_string()
    } else {
        format!("{}{}", WHATSAPP_PREFIX, number)
    }
}
