use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::TwilioConfig;
use crate::message::whatsapp_address;

pub const ACKNOWLEDGEMENT: &str =
    "नमस्ते! I'm analyzing this for you. This might take a moment... 🧐";
pub const ERROR_REPLY: &str =
    "Sorry, I encountered an error while analyzing your message. Please try again later.";

/// Twilio rejects WhatsApp bodies above 1600 characters
const MAX_BODY_LEN: usize = 1600;

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

/// Split long messages at newline/space boundaries, never inside a UTF-8 char.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // max_len is narrower than this char; emit it whole
            end = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Outbound WhatsApp messages through the Twilio Messages API.
pub struct TwilioClient {
    client: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub async fn send_message(&self, recipient: &str, body: &str) -> Result<()> {
        if self.config.account_sid.is_empty() || self.config.auth_token.is_empty() {
            anyhow::bail!("Twilio credentials not configured");
        }

        let to = whatsapp_address(recipient);
        for part in split_message(body, MAX_BODY_LEN) {
            let sid = self.create_message(&to, &part).await?;
            info!("Message sent successfully. SID: {}", sid);
        }
        Ok(())
    }

    async fn create_message(&self, to: &str, body: &str) -> Result<String> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base, self.config.account_sid
        );

        debug!("Sending WhatsApp message to {}", to);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("From", self.config.whatsapp_number.as_str()),
                ("To", to),
                ("Body", body),
            ])
            .send()
            .await
            .context("Failed to send request to Twilio")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Twilio API error ({}): {}", status, error_body);
        }

        let resource: MessageResource = response
            .json()
            .await
            .context("Failed to parse Twilio response")?;
        Ok(resource.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockTwilioServer};

    #[test]
    fn test_short_message_not_split() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn test_split_prefers_whitespace() {
        let chunks = split_message("aaaa bbbb\ncccc dddd", 10);
        assert_eq!(chunks, vec!["aaaa bbbb\n", "cccc dddd"]);
        assert_eq!(chunks.concat(), "aaaa bbbb\ncccc dddd");
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "नमस्ते".repeat(50);
        let chunks = split_message(&text, 100);
        assert!(chunks.iter().all(|c| c.len() <= 100));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_always_advances_on_wide_chars() {
        let chunks = split_message("नमस्ते", 1);
        assert_eq!(chunks.concat(), "नमस्ते");
        assert_eq!(chunks.len(), "नमस्ते".chars().count());
        assert_eq!(split_message("ab", 0), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_send_message_posts_whatsapp_form() {
        let twilio = MockTwilioServer::spawn().await;
        let client = TwilioClient::new(testing::twilio_config(&twilio.base_url));

        client.send_message("+15550001111", "Verdict").await.unwrap();

        let sent = twilio.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["To"], "whatsapp:+15550001111");
        assert_eq!(sent[0]["From"], "whatsapp:+14155238886");
        assert_eq!(sent[0]["Body"], "Verdict");
    }

    #[tokio::test]
    async fn test_long_body_sent_in_parts() {
        let twilio = MockTwilioServer::spawn().await;
        let client = TwilioClient::new(testing::twilio_config(&twilio.base_url));

        let body = "word ".repeat(500);
        client.send_message("whatsapp:+1555", &body).await.unwrap();

        let bodies = twilio.bodies().await;
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies.concat(), body);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let mut config = testing::twilio_config("http://127.0.0.1:9");
        config.auth_token.clear();
        let client = TwilioClient::new(config);
        assert!(client.send_message("+1555", "hi").await.is_err());
    }
}
