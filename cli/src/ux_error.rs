use colored::Colorize;
use strata_config::ConfigError;

#[derive(Debug)]
pub struct UxError {
    pub what: String,
    pub why: Vec<String>,
    pub how_to_fix: Vec<String>,
    pub suggested_command: Option<String>,
}

impl UxError {
    pub fn new(what: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            why: Vec::new(),
            how_to_fix: Vec::new(),
            suggested_command: None,
        }
    }

    pub fn why(mut self, reason: impl Into<String>) -> Self {
        self.why.push(reason.into());
        self
    }

    pub fn fix(mut self, suggestion: impl Into<String>) -> Self {
        self.how_to_fix.push(suggestion.into());
        self
    }

    pub fn suggest(mut self, cmd: impl Into<String>) -> Self {
        self.suggested_command = Some(cmd.into());
        self
    }

    pub fn display(&self) {
        eprintln!();
        eprintln!("{} {}", "error:".red().bold(), self.what.white().bold());

        for why in &self.why {
            eprintln!("       {}", why.dimmed());
        }

        if !self.how_to_fix.is_empty() {
            eprintln!();
            eprintln!("{}", "How to fix:".yellow().bold());
            for (i, fix) in self.how_to_fix.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, fix);
            }
        }

        if let Some(cmd) = &self.suggested_command {
            eprintln!();
            eprintln!("{}", "Try this:".green().bold());
            eprintln!("  $ {}", cmd.cyan());
        }
        eprintln!();
    }
}

impl std::fmt::Display for UxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.what)
    }
}

impl std::error::Error for UxError {}

pub fn from_config_error(error: &ConfigError) -> UxError {
    match error {
        ConfigError::SourceRead {
            source_type,
            reason,
        } => UxError::new(format!("Failed to read {source_type} configuration"))
            .why(reason.clone())
            .fix("Check that the file exists, is readable and is valid YAML or TOML"),
        ConfigError::MergeConflict {
            key_path,
            existing,
            incoming,
        } => UxError::new(format!("Conflicting shapes for '{key_path}'"))
            .why(format!("A {existing} value was overridden by a {incoming} value"))
            .fix(format!("Make every source agree on the shape of '{key_path}'"))
            .suggest(format!("strata source {key_path}")),
        ConfigError::Decode { errors } => errors.iter().fold(
            UxError::new("Configuration values have the wrong type")
                .fix("Correct the listed values")
                .suggest("strata keys"),
            |ux, e| ux.why(e.to_string()),
        ),
        ConfigError::Validation { violations } | ConfigError::CrossField { violations } => violations
            .iter()
            .fold(UxError::new("Configuration validation failed"), |ux, v| ux.why(v.clone()))
            .fix("Correct the listed values in your file, environment or --set overrides")
            .suggest("strata show --provenance"),
        ConfigError::WatchSetup { path, reason } => {
            UxError::new(format!("Cannot watch {}", path.display()))
                .why(reason.clone())
                .fix("Make sure the directory containing the file exists")
        }
        other => UxError::new(other.to_string()),
    }
}

pub fn unknown_key(key: &str) -> UxError {
    UxError::new(format!("Unknown configuration key: '{key}'"))
        .why("Keys are dot-delimited paths such as server.port")
        .suggest("strata keys")
}
