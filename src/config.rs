use clap::Parser;

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/api";
pub const DEFAULT_MODEL: &str = "phi3:14b";
pub const DEFAULT_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
pub const DEFAULT_PROFILES_DIR: &str = "profiles";
pub const DEFAULT_USER_ID: &str = "default_user";

/// Drive a browser toward a free-text objective with a local model.
#[derive(Debug, Parser)]
#[command(name = "webpilot", version)]
pub struct Args {
    /// The objective to work toward. Prompted for interactively when absent.
    pub objective: Option<String>,

    /// User profile to record the session under.
    #[arg(long, default_value = DEFAULT_USER_ID)]
    pub user: String,

    /// Model name passed to the generate endpoint.
    #[arg(long)]
    pub model: Option<String>,

    /// Run the browser without a window.
    #[arg(long)]
    pub headless: bool,

    /// Directory holding per-user profile files.
    #[arg(long)]
    pub profiles_dir: Option<String>,

    /// Start this run with an empty working transcript. The profile file on
    /// disk is left alone.
    #[arg(long)]
    pub fresh: bool,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Resolved runtime configuration: defaults, then environment, then CLI
/// flags, in increasing precedence.
#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_base_url: String,
    pub model: String,
    pub search_base_url: String,
    pub google_api_key: String,
    pub google_cx: String,
    pub profiles_dir: String,
    pub user_id: String,
    pub headless: bool,
}

impl Config {
    pub fn load(args: &Args) -> Config {
        Config {
            ollama_base_url: env_or("OLLAMA_BASE_URL", DEFAULT_OLLAMA_BASE_URL),
            model: args
                .model
                .clone()
                .unwrap_or_else(|| env_or("OLLAMA_MODEL", DEFAULT_MODEL)),
            search_base_url: env_or("GOOGLE_SEARCH_URL", DEFAULT_SEARCH_URL),
            google_api_key: std::env::var("GOOGLE_API_KEY").unwrap_or_default(),
            google_cx: std::env::var("GOOGLE_SEARCH_CX").unwrap_or_default(),
            profiles_dir: args
                .profiles_dir
                .clone()
                .unwrap_or_else(|| env_or("WEBPILOT_PROFILES_DIR", DEFAULT_PROFILES_DIR)),
            user_id: args.user.clone(),
            headless: args.headless,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let args = Args::try_parse_from(["webpilot"]).unwrap();
        assert_eq!(args.objective, None);
        assert_eq!(args.user, DEFAULT_USER_ID);
        assert!(!args.headless);
        assert!(!args.fresh);
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn cli_overrides() {
        let args = Args::try_parse_from([
            "webpilot",
            "book a table for two",
            "--user",
            "alex",
            "--model",
            "llama3",
            "--headless",
            "--fresh",
            "--profiles-dir",
            "/tmp/profiles",
        ])
        .unwrap();

        assert_eq!(args.objective.as_deref(), Some("book a table for two"));
        assert_eq!(args.user, "alex");
        assert_eq!(args.model.as_deref(), Some("llama3"));
        assert!(args.headless);
        assert!(args.fresh);

        let config = Config::load(&args);
        assert_eq!(config.model, "llama3");
        assert_eq!(config.profiles_dir, "/tmp/profiles");
        assert_eq!(config.user_id, "alex");
        assert!(config.headless);
    }
}
