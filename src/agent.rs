use std::fmt;

use tracing::{error, info, warn};

use crate::brain::{Brain, action_prompt, navigation_prompt};
use crate::commands::run_batch;
use crate::dom::{PageElementMap, resolve_elements};
use crate::hands::Page;
use crate::plan::{ModelOutput, Plan, Status, is_stagnant};
use crate::search::{SearchClient, SearchResult};
use crate::session::SessionStore;

/// Which half of the cycle a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Navigation,
    Action,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Navigation => "navigation",
            Phase::Action => "action",
        })
    }
}

/// How a run ended. The loop folds every internal failure into one of
/// these and never returns an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model declared the objective complete.
    Done { summary: String },
    /// The model asked for operator help (`NOT SURE` or `WRONG`).
    NeedsHelp { reason: String },
    /// The model sent a status outside the agreed set.
    InvalidStatus { raw: String },
    /// A phase produced no usable plan: the model call failed, the payload
    /// was rejected, or the plan had nothing in it.
    NoUsablePlan { phase: Phase },
    /// Two identical navigation plans in a row.
    Stagnant,
}

/// The two-phase control loop: ask for a navigation plan, go there, look at
/// the page, ask for an action plan, act, repeat until a terminal status.
pub struct Agent<'a> {
    brain: Brain,
    search: SearchClient,
    page: &'a dyn Page,
    store: &'a mut SessionStore,
}

impl<'a> Agent<'a> {
    pub fn new(
        brain: Brain,
        search: SearchClient,
        page: &'a dyn Page,
        store: &'a mut SessionStore,
    ) -> Self {
        Self {
            brain,
            search,
            page,
            store,
        }
    }

    pub async fn run(&mut self, objective: &str) -> RunOutcome {
        let mut previous_plan: Option<Plan> = None;
        let mut current_plan_text = "No plan yet".to_string();

        info!(objective, user = %self.store.user_id(), "starting run");

        loop {
            // Navigation phase: get somewhere before any elements are known.
            let prompt = navigation_prompt(objective, &current_plan_text, self.store.transcript());
            let nav_output = match self.brain.plan(&prompt).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(error = %e, "no valid navigation output from model, stopping");
                    return RunOutcome::NoUsablePlan {
                        phase: Phase::Navigation,
                    };
                }
            };
            // The navigation round's status field is ignored; only the
            // action round decides how the iteration ends.
            if nav_output.plan.is_empty() {
                warn!("empty navigation plan, stopping");
                return RunOutcome::NoUsablePlan {
                    phase: Phase::Navigation,
                };
            }

            self.record_round(&nav_output);
            current_plan_text = render_plan(&nav_output.plan);

            if is_stagnant(previous_plan.as_ref(), &nav_output.plan) {
                warn!("stagnation detected, exiting");
                return RunOutcome::Stagnant;
            }
            previous_plan = Some(nav_output.plan.clone());

            // Only the first command runs in this phase, against an empty
            // element map. The model is expected to navigate here, but any
            // command is accepted.
            let first_command: Vec<String> = nav_output
                .plan
                .first_command()
                .map(|command| vec![command.to_string()])
                .unwrap_or_default();
            let captured_results = run_batch(
                self.page,
                &first_command,
                &PageElementMap::new(),
                &self.search,
            )
            .await;

            let elements = resolve_elements(self.page).await;
            info!(count = elements.len(), "elements resolved");

            // Action phase: the model now sees what it can interact with.
            let names: Vec<String> = elements.names().map(String::from).collect();
            let prompt = action_prompt(&names, &current_plan_text, self.store.transcript());
            let action_output = match self.brain.plan(&prompt).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(error = %e, "no valid action output from model, stopping");
                    return RunOutcome::NoUsablePlan {
                        phase: Phase::Action,
                    };
                }
            };
            // An empty action plan may still carry a terminal status; only
            // a continuing one has nothing left to do.
            if action_output.plan.is_empty() && action_output.status.is_continuing() {
                warn!("empty action plan, stopping");
                return RunOutcome::NoUsablePlan {
                    phase: Phase::Action,
                };
            }

            self.record_round(&action_output);

            // This phase runs the whole command sequence. Its capture is
            // dropped; only the navigation capture feeds the summary.
            let _ = run_batch(
                self.page,
                &action_output.plan.commands(),
                &elements,
                &self.search,
            )
            .await;

            if let Err(e) = self.store.save() {
                warn!(error = %e, "could not persist the session, continuing");
            }

            match &action_output.status {
                Status::Done => {
                    info!("task completed");
                    let summary = final_summary(&action_output, captured_results.as_deref());
                    return RunOutcome::Done { summary };
                }
                Status::NeedsHelp(raw) => {
                    warn!(status = %raw, "model needs assistance");
                    return RunOutcome::NeedsHelp { reason: raw.clone() };
                }
                Status::Invalid(raw) => {
                    error!(status = %raw, "unrecognized status from model, stopping");
                    return RunOutcome::InvalidStatus { raw: raw.clone() };
                }
                Status::Continuing => {}
            }
        }
    }

    fn record_round(&mut self, output: &ModelOutput) {
        match serde_json::to_string_pretty(output) {
            Ok(entry) => self.store.record(entry),
            Err(e) => warn!(error = %e, "could not serialize a model round for the transcript"),
        }
    }
}

fn render_plan(plan: &Plan) -> String {
    serde_json::to_string_pretty(plan).unwrap_or_else(|_| "[]".to_string())
}

/// Operator-facing summary for a completed run: the plan's step
/// descriptions plus any search results captured during the last
/// navigation phase.
fn final_summary(output: &ModelOutput, results: Option<&[SearchResult]>) -> String {
    let plan_summary = output
        .plan
        .steps()
        .iter()
        .map(|step| format!("Step: {}", step.step_desc))
        .collect::<Vec<_>>()
        .join("\n");

    let status = output.status.wire_label().unwrap_or("DONE");

    match results {
        Some(results) if !results.is_empty() => {
            let results_summary = results
                .iter()
                .map(|item| format!("Title: {}\nURL: {}", item.title, item.link))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "Task Summary:\n{plan_summary}\n\nKey URLs from Search Results:\n{results_summary}\nTask Status: {status}"
            )
        }
        _ => format!(
            "Task Summary:\n{plan_summary}\nNo URLs or specific results were found.\nTask Status: {status}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanStep;

    fn done_output(step_descs: &[&str]) -> ModelOutput {
        ModelOutput {
            plan: Plan(
                step_descs
                    .iter()
                    .map(|desc| PlanStep {
                        step_desc: desc.to_string(),
                        command: "GOTO_URL https://example.com".to_string(),
                    })
                    .collect(),
            ),
            page_context: serde_json::Map::new(),
            user_info: serde_json::Map::new(),
            status: Status::Done,
        }
    }

    #[test]
    fn summary_without_results_says_none_were_found() {
        let summary = final_summary(&done_output(&["open the site", "read the menu"]), None);
        assert_eq!(
            summary,
            "Task Summary:\nStep: open the site\nStep: read the menu\n\
             No URLs or specific results were found.\nTask Status: DONE"
        );
    }

    #[test]
    fn empty_results_read_the_same_as_no_results() {
        let summary = final_summary(&done_output(&["look around"]), Some(&[]));
        assert!(summary.contains("No URLs or specific results were found."));
        assert!(summary.ends_with("Task Status: DONE"));
    }

    #[test]
    fn summary_with_results_lists_titles_and_urls() {
        let results = vec![
            SearchResult {
                title: "Green Table".to_string(),
                link: "https://greentable.example".to_string(),
                snippet: "vegan bistro".to_string(),
            },
            SearchResult {
                title: "Leaf & Co".to_string(),
                link: "https://leafco.example".to_string(),
                snippet: String::new(),
            },
        ];
        let summary = final_summary(&done_output(&["search for restaurants"]), Some(&results));
        assert!(summary.contains("Key URLs from Search Results:"));
        assert!(summary.contains("Title: Green Table\nURL: https://greentable.example"));
        assert!(summary.contains("Title: Leaf & Co\nURL: https://leafco.example"));
        assert!(summary.ends_with("Task Status: DONE"));
    }

    #[test]
    fn phases_display_in_lowercase() {
        assert_eq!(Phase::Navigation.to_string(), "navigation");
        assert_eq!(Phase::Action.to_string(), "action");
    }
}
