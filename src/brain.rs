use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::plan::{ModelOutput, SchemaError};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("model payload was not valid json: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("model payload rejected: {0}")]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for the model's generate endpoint.
pub struct Brain {
    client: Client,
    base_url: String,
    model: String,
}

impl Brain {
    pub fn new(client: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// One planning round: post the prompt, demand json output, validate
    /// whatever comes back.
    pub async fn plan(&self, prompt: &str) -> Result<ModelOutput, ModelError> {
        let envelope: GenerateResponse = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "format": "json",
                "stream": false,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(response = %envelope.response, "model replied");
        parse_generate_payload(&envelope.response)
    }
}

/// The generate endpoint nests the model's json as a string field; unwrap
/// it, strip possible markdown fences, and validate the result.
fn parse_generate_payload(payload: &str) -> Result<ModelOutput, ModelError> {
    let cleaned = payload
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value: Value = serde_json::from_str(cleaned)?;
    Ok(ModelOutput::from_value(&value)?)
}

/// The JSON shape every planning round must produce. Shared by both prompts
/// so the model sees one consistent contract.
const OUTPUT_CONTRACT: &str = r#"The output MUST be a single JSON object following this structure:
{
    "PLAN": [
        {
            "step_desc": "Description of the step",
            "command": "Command to be executed (e.g., EXAMPLE_COMMAND)"
        }
    ],
    "pageContextObjects": {},
    "userInfo": {},
    "status": "DONE"
}
Commands: GOTO_URL url, CLICK element_name, TYPE element_name text, SUBMIT element_name, GOOGLE_SEARCH_API query.
Only include "status" to stop the run: "DONE" when the objective is complete, "NOT SURE" or "WRONG" when you need help."#;

fn output_contract(example: &str) -> String {
    OUTPUT_CONTRACT.replace("EXAMPLE_COMMAND", example)
}

/// Prompt for the navigation phase: get the model somewhere before it has
/// seen any elements.
pub fn navigation_prompt(objective: &str, current_plan: &str, transcript: &[String]) -> String {
    format!(
        r#"You are an expert agent controlling a real web browser, not just a language model.
You are given:
1. An objective that you are trying to achieve: {objective}

Start with navigation by using "GOTO_URL" followed by the URL.
After navigation, inspect the page and issue the next commands based on the available elements.

IMPORTANT:
- Do not assume elements exist before seeing the page.
- Use the available elements after loading the page.

Current plan:
{current_plan}

Session so far:
{transcript}

{contract}"#,
        transcript = transcript.join("\n"),
        contract = output_contract("GOTO_URL https://example.com"),
    )
}

/// Prompt for the action phase: the page is loaded and its interactable
/// element names are known.
pub fn action_prompt(element_names: &[String], current_plan: &str, transcript: &[String]) -> String {
    format!(
        r#"You are an expert agent controlling a real web browser.
You have navigated to the page. The next steps involve interacting with the page elements.

Available elements:
{elements}

Current plan:
{current_plan}

Based on the available elements, choose appropriate actions like CLICK, TYPE, SUBMIT, etc.

Session so far:
{transcript}

{contract}"#,
        elements = serde_json::to_string(element_names).unwrap_or_else(|_| "[]".to_string()),
        transcript = transcript.join("\n"),
        contract = output_contract("CLICK input_placeholder_0"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Status;

    #[test]
    fn unwraps_a_plain_payload() {
        let payload = r#"{"PLAN": [{"step_desc": "go", "command": "GOTO_URL https://example.com"}],
                          "pageContextObjects": {}, "userInfo": {}, "status": "DONE"}"#;
        let output = parse_generate_payload(payload).unwrap();
        assert_eq!(output.plan.len(), 1);
        assert_eq!(output.status, Status::Done);
    }

    #[test]
    fn strips_markdown_fences() {
        let payload = "```json\n{\"PLAN\": [], \"pageContextObjects\": {}, \"userInfo\": {}}\n```";
        let output = parse_generate_payload(payload).unwrap();
        assert!(output.plan.is_empty());
    }

    #[test]
    fn non_json_payload_is_a_payload_error() {
        assert!(matches!(
            parse_generate_payload("I could not decide on a plan."),
            Err(ModelError::Payload(_))
        ));
    }

    #[test]
    fn schema_violations_keep_their_field_path() {
        let payload = r#"{"PLAN": [{"step_desc": "go"}], "pageContextObjects": {}, "userInfo": {}}"#;
        match parse_generate_payload(payload) {
            Err(ModelError::Schema(e)) => assert_eq!(e.path, "PLAN[0].command"),
            other => panic!("expected a schema error, got {other:?}"),
        }
    }

    #[test]
    fn prompts_embed_their_inputs_and_the_contract() {
        let transcript = vec!["earlier round".to_string()];
        let nav = navigation_prompt("find vegan restaurants", "No plan yet", &transcript);
        assert!(nav.contains("find vegan restaurants"));
        assert!(nav.contains("No plan yet"));
        assert!(nav.contains("earlier round"));
        assert!(nav.contains("GOTO_URL https://example.com"));
        assert!(nav.contains(r#""pageContextObjects": {}"#));

        let names = vec!["input_placeholder_0".to_string(), "link_text_2".to_string()];
        let action = action_prompt(&names, "the current plan", &transcript);
        assert!(action.contains(r#"["input_placeholder_0","link_text_2"]"#));
        assert!(action.contains("CLICK input_placeholder_0"));
    }
}
