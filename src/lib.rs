pub mod agent;
pub mod brain;
pub mod commands;
pub mod config;
pub mod dom;
pub mod hands;
pub mod plan;
pub mod search;
pub mod session;

pub use agent::{Agent, Phase, RunOutcome};
pub use brain::{Brain, ModelError};
pub use commands::{Command, ParseError};
pub use config::{Args, Config};
pub use dom::{ElementFacts, ElementKind, PageElementMap};
pub use hands::{BrowserSession, Page, PageError};
pub use plan::{ModelOutput, Plan, PlanStep, SchemaError, Status};
pub use search::{SearchClient, SearchResult};
pub use session::{SessionProfile, SessionStore};
