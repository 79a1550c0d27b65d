//! Schema-driven prompt composition

use crate::schema::StateSchema;
use serde_json::Value;

/// Asks the model for a reusable parsing instruction for one command
pub const PROMPT_FOR_A_PROMPT: &str = "You are preparing a penetration-testing pipeline. \
Write a short instruction (at most five sentences) telling another model how to read the \
output of the command below and which facts about the target host to extract: open ports \
and their protocols, service names, server products and versions, operating system details \
and web paths with their HTTP status codes. Do not run the command and do not invent output.\n\n\
COMMAND:\n";

const CLEANUP_PROMPT: &str = "The following is raw output of a reconnaissance tool. Remove \
banners, progress lines, repeated lines and anything that is not a fact about the target \
host. Keep every port, service, version, operating system detail, URL path and status code \
exactly as written. Answer with the compacted output only.\n\nOUTPUT:\n";

/// Request for the per-command parsing instruction
pub fn instruction_request(action: &str) -> String {
    format!("{}{}", PROMPT_FOR_A_PROMPT, action)
}

pub fn cleanup_prompt(output: &str) -> String {
    format!("{}{}", CLEANUP_PROMPT, output)
}

/// Parsing prompt advertising the structure, status codes and path hints
pub fn parse_prompt(schema: &StateSchema, structure: &Value, instruction: &str, action: &str, output: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("Convert the command output into JSON matching this structure exactly:\n");
    prompt.push_str(&structure.to_string());
    prompt.push_str("\n\nRules:\n");
    prompt.push_str("- Answer with a single line of JSON and nothing else.\n");
    prompt.push_str("- Do not add, rename or remove fields; leave unknown values empty.\n");
    prompt.push_str("- Use one entry in \"services\" per open port.\n");
    let codes = schema.status_codes();
    if !codes.is_empty() {
        prompt.push_str(&format!(
            "- \"web_directories_status\" has exactly the keys {}.\n",
            codes.join(", ")
        ));
    }

    let hints: Vec<(&str, &str)> = schema
        .iter_paths()
        .filter_map(|(path, entry)| entry.llm_prompt.as_deref().map(|hint| (path, hint)))
        .collect();
    if !hints.is_empty() {
        prompt.push_str("\nField hints:\n");
        for (path, hint) in hints {
            prompt.push_str(&format!("- {}: {}\n", path, hint));
        }
    }

    if !instruction.trim().is_empty() {
        prompt.push_str("\nHow to read this command's output:\n");
        prompt.push_str(instruction.trim());
        prompt.push('\n');
    }

    prompt.push_str(&format!("\nCOMMAND: {}\nOUTPUT:\n{}\n", action, output));
    prompt
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Cut a prompt down to roughly `budget_tokens` (four characters per token)
pub fn truncate_to_budget(prompt: &str, tokens: usize, budget_tokens: usize) -> String {
    if tokens <= budget_tokens {
        return prompt.to_string();
    }
    tracing::warn!(tokens, budget = budget_tokens, "prompt exceeds context budget, truncating");
    prompt.chars().take(budget_tokens.saturating_mul(4)).collect()
}
