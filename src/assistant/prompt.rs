//! Prompt context from calculated levels, and fallback replies

use std::fmt::Write;

use tracing::error;

use super::Assistant;
use crate::types::{CalculatedLevels, LogicRule};

/// Reply used when the assistant answers with nothing
pub const EMPTY_REPLY: &str = "I'm thinking, but I couldn't find the words just yet.";

/// Reply used when the assistant call fails
pub const FAILURE_REPLY: &str = "Connection interrupted.";

/// Compose the assistant context: persona, active principles, market
/// structure, then the user's message.
pub fn compose_prompt(
    levels: &CalculatedLevels,
    instruction: &str,
    logic_rules: &[LogicRule],
    user_text: &str,
) -> String {
    let mut prompt = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(prompt, "ROLE: You are a supportive trading friend.");
    let _ = writeln!(prompt, "MEMORY CORE: \"{}\"", instruction.trim());

    let principles: Vec<&LogicRule> = logic_rules.iter().filter(|r| r.is_active).collect();
    if !principles.is_empty() {
        let _ = writeln!(prompt, "PRINCIPLES:");
        for rule in principles {
            let _ = writeln!(prompt, "- {}", rule.content.trim());
        }
    }

    let _ = writeln!(prompt, "MARKET CONTEXT:");
    let _ = writeln!(prompt, "- Pivot 1: {:.2}", levels.pivot1);
    let _ = writeln!(prompt, "- Pivot 2: {:.2}", levels.pivot2);
    let _ = writeln!(prompt, "- Bias: {}", levels.bias);
    if let Some(zone) = levels.nearest_supply() {
        let _ = writeln!(
            prompt,
            "- Nearest supply: {:.2} ({})",
            zone.level,
            zone.label.as_deref().unwrap_or("unlabelled")
        );
    }
    if let Some(zone) = levels.nearest_demand() {
        let _ = writeln!(
            prompt,
            "- Nearest demand: {:.2} ({})",
            zone.level,
            zone.label.as_deref().unwrap_or("unlabelled")
        );
    }

    let _ = write!(prompt, "USER SAYS: \"{}\"", user_text.trim());
    prompt
}

/// Ask the assistant, degrading to a static reply instead of failing
pub async fn respond(assistant: &dyn Assistant, prompt_context: &str) -> String {
    match assistant.generate(prompt_context).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => EMPTY_REPLY.to_string(),
        Err(e) => {
            error!("Assistant error: {:#}", e);
            FAILURE_REPLY.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::OfflineAssistant;
    use crate::engine::compute;
    use crate::types::SessionData;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with a fixed text and remembers the last prompt
    struct Scripted {
        reply: String,
        last_prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Assistant for Scripted {
        async fn generate(&self, prompt_context: &str) -> Result<String> {
            *self.last_prompt.lock().unwrap() = Some(prompt_context.to_string());
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn test_prompt_carries_levels() {
        let levels = compute(&SessionData::default(), &[]);
        let mut dormant = LogicRule::new("Ignore this one");
        dormant.is_active = false;
        let rules = vec![LogicRule::new("Never chase the open"), dormant];

        let prompt = compose_prompt(&levels, "  Be blunt.  ", &rules, "Should I buy?");

        assert!(prompt.contains("MEMORY CORE: \"Be blunt.\""));
        assert!(prompt.contains("- Pivot 1: 21533.33"));
        assert!(prompt.contains("- Pivot 2: 21596.67"));
        assert!(prompt.contains("- Bias: BUY"));
        assert!(prompt.contains("- Never chase the open"));
        assert!(!prompt.contains("Ignore this one"));
        assert!(prompt.contains("Nearest supply: ") && prompt.contains("(OPERATOR TRAP)"));
        assert!(prompt.ends_with("USER SAYS: \"Should I buy?\""));
    }

    #[tokio::test]
    async fn test_respond_passes_reply_through() {
        let assistant = Scripted {
            reply: "Sit on your hands.".to_string(),
            last_prompt: Mutex::new(None),
        };
        assert_eq!(respond(&assistant, "ctx").await, "Sit on your hands.");
        assert_eq!(assistant.last_prompt.lock().unwrap().as_deref(), Some("ctx"));
    }

    #[tokio::test]
    async fn test_respond_fallbacks() {
        let blank = Scripted {
            reply: "  \n".to_string(),
            last_prompt: Mutex::new(None),
        };
        assert_eq!(respond(&blank, "ctx").await, EMPTY_REPLY);
        assert_eq!(respond(&OfflineAssistant, "ctx").await, FAILURE_REPLY);
    }
}
