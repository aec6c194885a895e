use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use crate::analyzer::Analyzer;
use crate::message::Message;
use crate::responder::{TwilioClient, ACKNOWLEDGEMENT, ERROR_REPLY};
use crate::translator::{Translator, ENGLISH};

/// What the webhook does with a parsed message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Quick reply sent before the webhook returns.
    async fn acknowledge(&self, message: &Message) -> Result<()>;

    /// Full analysis, run in the background.
    async fn process(&self, message: Message);
}

/// detect → translate → analyze → translate back → reply
pub struct Pipeline {
    translator: Translator,
    analyzer: Analyzer,
    responder: TwilioClient,
}

impl Pipeline {
    pub fn new(translator: Translator, analyzer: Analyzer, responder: TwilioClient) -> Self {
        Self {
            translator,
            analyzer,
            responder,
        }
    }

    async fn respond(&self, message: &Message) -> Result<()> {
        let language = self.translator.detect_language(&message.text).await;

        let english = if language != ENGLISH {
            self.translator
                .translate_to_english(&message.text, &language)
                .await
        } else {
            message.text.clone()
        };

        let verdict = self.analyzer.run(&english).await;

        let reply = if language != ENGLISH {
            let translated = self.translator.translate_from_english(&verdict, &language).await;
            info!("Response translated back to original language");
            translated
        } else {
            verdict
        };

        self.responder.send_message(&message.sender, &reply).await?;
        info!("Final response sent to {}", message.sender);
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for Pipeline {
    async fn acknowledge(&self, message: &Message) -> Result<()> {
        self.responder
            .send_message(&message.sender, ACKNOWLEDGEMENT)
            .await
    }

    async fn process(&self, message: Message) {
        info!(
            "Processing message from {} received at {}",
            message.sender,
            message.received_at.to_rfc3339()
        );

        if let Err(e) = self.respond(&message).await {
            error!("Error in async processing: {:#}", e);
            if let Err(e) = self.responder.send_message(&message.sender, ERROR_REPLY).await {
                error!("Error sending error message: {:#}", e);
            }
        }
    }
}
