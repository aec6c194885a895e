use std::sync::Arc;

use tracing::{error, info, warn};

use crate::llm::LlmClient;

pub const ENGLISH: &str = "en";

const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("hi", "Hindi"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh", "Chinese"),
    ("ar", "Arabic"),
    ("bn", "Bengali"),
    ("te", "Telugu"),
    ("ta", "Tamil"),
    ("mr", "Marathi"),
    ("gu", "Gujarati"),
    ("kn", "Kannada"),
    ("ml", "Malayalam"),
    ("pa", "Punjabi"),
    ("ur", "Urdu"),
];

/// Human-readable name for an ISO 639-1 code; unknown codes pass through.
pub fn language_name(code: &str) -> &str {
    LANGUAGE_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// Accept only a two-letter alphabetic code, otherwise default to English.
fn normalize_language_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_lowercase();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code)
    } else {
        None
    }
}

/// LLM-backed language detection and translation. Every operation degrades
/// to a safe fallback rather than failing the pipeline.
pub struct Translator {
    llm: Arc<LlmClient>,
}

impl Translator {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn detect_language(&self, text: &str) -> String {
        let prompt = format!(
            "Detect the language of this text and return ONLY the language code \
             (2-letter ISO code like 'en', 'hi', 'es', etc.):\n\n\
             Text: \"{text}\"\n\n\
             Language code:"
        );

        match self.llm.complete(&prompt).await {
            Ok(raw) => match normalize_language_code(&raw) {
                Some(code) => {
                    info!("Detected language: {}", code);
                    code
                }
                None => {
                    warn!("Invalid language code detected: {:?}, defaulting to 'en'", raw);
                    ENGLISH.to_string()
                }
            },
            Err(e) => {
                error!("Error detecting language: {:#}", e);
                ENGLISH.to_string()
            }
        }
    }

    pub async fn translate_to_english(&self, text: &str, source_lang: &str) -> String {
        let prompt = format!(
            "Translate this text from {source_lang} to English. \
             Return ONLY the translated text, no explanations:\n\n\
             Text: \"{text}\"\n\n\
             English translation:"
        );

        match self.llm.complete(&prompt).await {
            Ok(translated) => {
                info!("Translated to English: {}", translated);
                translated
            }
            Err(e) => {
                error!("Error translating to English: {:#}", e);
                text.to_string()
            }
        }
    }

    pub async fn translate_from_english(&self, text: &str, target_lang: &str) -> String {
        let target = language_name(target_lang);
        let prompt = format!(
            "Translate this English text to {target}. \
             Return ONLY the translated text, no explanations:\n\n\
             Text: \"{text}\"\n\n\
             {target} translation:"
        );

        match self.llm.complete(&prompt).await {
            Ok(translated) => {
                info!("Translated to {}: {}", target, translated);
                translated
            }
            Err(e) => {
                error!("Error translating from English: {:#}", e);
                text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockLlm};

    async fn make_translator(mock: MockLlm) -> (Translator, testing::MockLlmServer) {
        let server = mock.spawn().await;
        let llm = Arc::new(LlmClient::new(testing::llm_config(&server.base_url)));
        (Translator::new(llm), server)
    }

    #[test]
    fn test_language_name_lookup() {
        assert_eq!(language_name("hi"), "Hindi");
        assert_eq!(language_name("ur"), "Urdu");
        assert_eq!(language_name("sw"), "sw");
    }

    #[test]
    fn test_normalize_language_code() {
        assert_eq!(normalize_language_code(" HI \n").as_deref(), Some("hi"));
        assert_eq!(normalize_language_code("english"), None);
        assert_eq!(normalize_language_code("e1"), None);
        assert_eq!(normalize_language_code("'hi'"), None);
    }

    #[tokio::test]
    async fn test_detect_language_accepts_iso_code() {
        let (translator, _server) = make_translator(MockLlm::always("Hi")).await;
        assert_eq!(translator.detect_language("नमस्ते").await, "hi");
    }

    #[tokio::test]
    async fn test_detect_language_defaults_to_english() {
        let (translator, _server) = make_translator(MockLlm::always("The language is Hindi")).await;
        assert_eq!(translator.detect_language("नमस्ते").await, "en");

        let (translator, _server) = make_translator(MockLlm::failing()).await;
        assert_eq!(translator.detect_language("नमस्ते").await, "en");
    }

    #[tokio::test]
    async fn test_translate_from_english_uses_language_name() {
        let (translator, server) = make_translator(MockLlm::always("अनुवाद")).await;
        let out = translator.translate_from_english("translation", "hi").await;
        assert_eq!(out, "अनुवाद");

        let prompts = server.prompts().await;
        assert!(prompts[0].contains("to Hindi"));
        assert!(prompts[0].contains("Hindi translation:"));
    }

    #[tokio::test]
    async fn test_translation_failure_returns_original() {
        let (translator, _server) = make_translator(MockLlm::failing()).await;
        assert_eq!(translator.translate_to_english("hola", "es").await, "hola");
        assert_eq!(translator.translate_from_english("hello", "es").await, "hello");
    }
}
