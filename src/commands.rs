use thiserror::Error;
use tracing::{error, info, warn};

use crate::dom::PageElementMap;
use crate::hands::Page;
use crate::search::{SearchClient, SearchResult};

/// The command language the model speaks: one line per command, verb first,
/// whitespace-separated, verbs case-sensitive. This is the wire contract
/// with the prompts and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Goto { url: String },
    Click { element: String },
    Type { element: String, text: String },
    Submit { element: String },
    Search { query: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown verb `{0}`")]
    UnknownVerb(String),
    #[error("`{verb}` needs {expected}")]
    MissingArgs {
        verb: &'static str,
        expected: &'static str,
    },
}

impl Command {
    /// Parse one command line. `TYPE` and `GOOGLE_SEARCH_API` swallow the
    /// rest of the line as their text and query; the other verbs ignore
    /// anything past the tokens they use.
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let verb = *tokens.first().ok_or(ParseError::Empty)?;

        match verb {
            "GOTO_URL" => Ok(Command::Goto {
                url: required(&tokens, 1, "GOTO_URL", "a url")?.to_string(),
            }),
            "CLICK" => Ok(Command::Click {
                element: required(&tokens, 1, "CLICK", "an element name")?.to_string(),
            }),
            "TYPE" => {
                let element = required(&tokens, 1, "TYPE", "an element name and text")?;
                required(&tokens, 2, "TYPE", "an element name and text")?;
                Ok(Command::Type {
                    element: element.to_string(),
                    text: tokens[2..].join(" "),
                })
            }
            "SUBMIT" => Ok(Command::Submit {
                element: required(&tokens, 1, "SUBMIT", "an element name")?.to_string(),
            }),
            "GOOGLE_SEARCH_API" => {
                required(&tokens, 1, "GOOGLE_SEARCH_API", "a query")?;
                Ok(Command::Search {
                    query: tokens[1..].join(" "),
                })
            }
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }
}

fn required<'a>(
    tokens: &[&'a str],
    index: usize,
    verb: &'static str,
    expected: &'static str,
) -> Result<&'a str, ParseError> {
    tokens
        .get(index)
        .copied()
        .ok_or(ParseError::MissingArgs { verb, expected })
}

/// Execute a batch of command lines in order against the live page.
///
/// Per-command isolation: unparseable lines and references to element names
/// absent from the map are skipped with a warning. A browser failure aborts
/// whatever remains of the batch but is never re-raised. A search command
/// short-circuits the batch and hands back its results.
pub async fn run_batch(
    page: &dyn Page,
    commands: &[String],
    elements: &PageElementMap,
    search: &SearchClient,
) -> Option<Vec<SearchResult>> {
    for line in commands {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(command = %line, error = %e, "skipping malformed command");
                continue;
            }
        };

        let outcome = match command {
            Command::Goto { url } => {
                let result = page.goto(&url).await;
                if result.is_ok() {
                    info!(url = %url, "navigated");
                }
                result
            }
            Command::Click { element } => {
                let Some(selector) = elements.selector(&element) else {
                    warn!(element = %element, "no mapped element, skipping");
                    continue;
                };
                let result = page.click(selector).await;
                if result.is_ok() {
                    info!(element = %element, "clicked");
                }
                result
            }
            Command::Type { element, text } => {
                let Some(selector) = elements.selector(&element) else {
                    warn!(element = %element, "no mapped element, skipping");
                    continue;
                };
                let result = page.fill(selector, &text).await;
                if result.is_ok() {
                    info!(element = %element, text = %text, "typed");
                }
                result
            }
            Command::Submit { element } => {
                let Some(selector) = elements.selector(&element) else {
                    warn!(element = %element, "no mapped element, skipping");
                    continue;
                };
                let result = page.press_enter(selector).await;
                if result.is_ok() {
                    info!(element = %element, "submitted");
                }
                result
            }
            Command::Search { query } => {
                let results = match search.search(&query).await {
                    Ok(results) => results,
                    Err(e) => {
                        warn!(error = %e, "search failed, continuing with no results");
                        Vec::new()
                    }
                };
                return Some(results);
            }
        };

        if let Err(e) = outcome {
            error!(command = %line, error = %e, "command failed, aborting the rest of the batch");
            return None;
        }
    }

    None
}
