use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// One step of a model-issued plan: a human-readable description plus the
/// command line to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub step_desc: String,
    pub command: String,
}

/// An ordered sequence of plan steps. Never mutated after validation; the
/// model produces a fresh one every round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Plan(pub Vec<PlanStep>);

impl Plan {
    pub fn steps(&self) -> &[PlanStep] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// First command of the plan, if there is one. The navigation phase
    /// executes only this.
    pub fn first_command(&self) -> Option<&str> {
        self.0.first().map(|step| step.command.as_str())
    }

    pub fn commands(&self) -> Vec<String> {
        self.0.iter().map(|step| step.command.clone()).collect()
    }
}

/// Run status reported by the model. Absent on the wire means the task is
/// still in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Continuing,
    Done,
    /// The model asked for help (`NOT SURE` or `WRONG` on the wire).
    NeedsHelp(String),
    /// A status string outside the agreed set. Terminal, never silently
    /// treated as continuing.
    Invalid(String),
}

impl Status {
    fn from_wire(raw: &str) -> Status {
        match raw {
            "DONE" => Status::Done,
            "NOT SURE" | "WRONG" => Status::NeedsHelp(raw.to_string()),
            other => Status::Invalid(other.to_string()),
        }
    }

    pub fn is_continuing(&self) -> bool {
        matches!(self, Status::Continuing)
    }

    /// The literal status string as the model sent it, when there was one.
    pub fn wire_label(&self) -> Option<&str> {
        match self {
            Status::Continuing => None,
            Status::Done => Some("DONE"),
            Status::NeedsHelp(raw) | Status::Invalid(raw) => Some(raw),
        }
    }
}

fn serialize_status<S: Serializer>(status: &Status, serializer: S) -> Result<S::Ok, S::Error> {
    match status.wire_label() {
        Some(label) => serializer.serialize_str(label),
        None => serializer.serialize_none(),
    }
}

/// Everything the model must return for one planning round.
#[derive(Debug, Clone, Serialize)]
pub struct ModelOutput {
    #[serde(rename = "PLAN")]
    pub plan: Plan,
    #[serde(rename = "pageContextObjects")]
    pub page_context: Map<String, Value>,
    #[serde(rename = "userInfo")]
    pub user_info: Map<String, Value>,
    #[serde(serialize_with = "serialize_status")]
    pub status: Status,
}

impl ModelOutput {
    /// Validate a raw model payload. All-or-nothing: any shape violation
    /// rejects the whole payload, naming the offending field.
    pub fn from_value(value: &Value) -> Result<ModelOutput, SchemaError> {
        let root = value
            .as_object()
            .ok_or_else(|| SchemaError::new("$", SchemaProblem::NotAnObject))?;

        let raw_plan = root
            .get("PLAN")
            .ok_or_else(|| SchemaError::new("PLAN", SchemaProblem::Missing))?
            .as_array()
            .ok_or_else(|| SchemaError::new("PLAN", SchemaProblem::NotASequence))?;

        let mut steps = Vec::with_capacity(raw_plan.len());
        for (i, raw_step) in raw_plan.iter().enumerate() {
            let step = raw_step
                .as_object()
                .ok_or_else(|| SchemaError::new(format!("PLAN[{i}]"), SchemaProblem::NotAnObject))?;
            steps.push(PlanStep {
                step_desc: step_field(step, i, "step_desc")?,
                command: step_field(step, i, "command")?,
            });
        }

        let page_context = top_level_object(root, "pageContextObjects")?;
        let user_info = top_level_object(root, "userInfo")?;

        let status = match root.get("status") {
            None | Some(Value::Null) => Status::Continuing,
            Some(Value::String(raw)) => Status::from_wire(raw),
            Some(_) => return Err(SchemaError::new("status", SchemaProblem::NotAString)),
        };

        Ok(ModelOutput {
            plan: Plan(steps),
            page_context,
            user_info,
            status,
        })
    }
}

fn step_field(step: &Map<String, Value>, index: usize, key: &str) -> Result<String, SchemaError> {
    let path = || format!("PLAN[{index}].{key}");
    let text = step
        .get(key)
        .ok_or_else(|| SchemaError::new(path(), SchemaProblem::Missing))?
        .as_str()
        .ok_or_else(|| SchemaError::new(path(), SchemaProblem::NotAString))?;
    if text.is_empty() {
        return Err(SchemaError::new(path(), SchemaProblem::EmptyString));
    }
    Ok(text.to_string())
}

fn top_level_object(
    root: &Map<String, Value>,
    key: &str,
) -> Result<Map<String, Value>, SchemaError> {
    root.get(key)
        .ok_or_else(|| SchemaError::new(key, SchemaProblem::Missing))?
        .as_object()
        .cloned()
        .ok_or_else(|| SchemaError::new(key, SchemaProblem::NotAnObject))
}

/// Why a model payload was rejected. `path` names the offending field, e.g.
/// `PLAN[1].command`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {problem}")]
pub struct SchemaError {
    pub path: String,
    pub problem: SchemaProblem,
}

impl SchemaError {
    fn new(path: impl Into<String>, problem: SchemaProblem) -> Self {
        Self {
            path: path.into(),
            problem,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaProblem {
    Missing,
    NotAnObject,
    NotASequence,
    NotAString,
    EmptyString,
}

impl fmt::Display for SchemaProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchemaProblem::Missing => "field is missing",
            SchemaProblem::NotAnObject => "expected a JSON object",
            SchemaProblem::NotASequence => "expected a JSON array",
            SchemaProblem::NotAString => "expected a string",
            SchemaProblem::EmptyString => "string is empty",
        })
    }
}

/// Structural equality against the previously accepted plan. Two identical
/// consecutive navigation plans mean the model has stopped making progress;
/// this is the loop's only liveness guard.
pub fn is_stagnant(previous: Option<&Plan>, current: &Plan) -> bool {
    previous.is_some_and(|p| p == current)
}
