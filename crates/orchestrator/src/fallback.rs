//! Last-resort replies for runs that ended without any text.

use guildpilot_core::provider::{GenerateRequest, Provider};
use tracing::warn;

use crate::checklist::truncate_chars;

const ECHO_LIMIT: usize = 200;

/// Produces a short reply when the main loop ends with nothing to say.
///
/// Never fails: a provider error or an empty answer falls back to a fixed
/// apology that echoes the request.
pub struct FallbackGenerator<'a> {
    provider: &'a dyn Provider,
    model: &'a str,
}

impl<'a> FallbackGenerator<'a> {
    pub fn new(provider: &'a dyn Provider, model: &'a str) -> Self {
        Self { provider, model }
    }

    pub async fn generate(&self, request_text: &str) -> String {
        let prompt = format!(
            "Reply to this chat message in at most two sentences. If you cannot help with it, \
             say so briefly.\n\nMessage: {request_text}"
        );
        match self.provider.generate(GenerateRequest::prompt(self.model, prompt)).await {
            Ok(response) if !response.text.trim().is_empty() => response.text.trim().to_string(),
            Ok(_) => {
                warn!("Fallback reply was empty, using apology");
                apology(request_text)
            }
            Err(e) => {
                warn!(error = %e, "Fallback reply failed, using apology");
                apology(request_text)
            }
        }
    }
}

/// Fixed apology echoing the request.
pub fn apology(request_text: &str) -> String {
    let request = request_text.split_whitespace().collect::<Vec<_>>().join(" ");
    if request.is_empty() {
        return "Sorry, I couldn't come up with a reply to that. Please try again.".to_string();
    }
    format!(
        "Sorry, I couldn't come up with a reply to \"{}\". Please try rephrasing it.",
        truncate_chars(&request, ECHO_LIMIT)
    )
}
