use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Serialization format for printed snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Yaml,
    Json,
    Toml,
}

pub fn render<T: Serialize>(value: &T, format: Format) -> anyhow::Result<String> {
    Ok(match format {
        Format::Yaml => serde_yaml::to_string(value)?,
        Format::Json => serde_json::to_string_pretty(value)? + "\n",
        Format::Toml => toml::to_string_pretty(value)?,
    })
}

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_formats() {
        let value = json!({ "server": { "port": 5001 } });
        assert!(render(&value, Format::Yaml).unwrap().contains("port: 5001"));
        assert!(render(&value, Format::Json).unwrap().contains("\"port\": 5001"));
        assert!(render(&value, Format::Toml).unwrap().contains("port = 5001"));
    }

    #[test]
    fn test_helpers_do_not_panic() {
        header("Header");
        warn("warning");
        error("error");
        success("success");
    }
}
