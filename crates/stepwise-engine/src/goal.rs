//! Goal files: a named list of steps and assertions for one run.
//!
//! ```yaml
//! name: Checkout
//! url: https://www.saucedemo.com/
//! vars: { user: standard_user }
//! steps:
//!   - description: Log in with username '${user}' and password 'secret_sauce'
//!   - Click the Login button
//! assertions:
//!   - URL contains inventory
//! ```

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum GoalError {
    #[error("Failed to read goal {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid goal file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Goal has no steps")]
    NoSteps,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goal {
    pub name: String,
    pub url: Option<String>,
    pub steps: Vec<String>,
    pub assertions: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StepEntry {
    Described { description: String },
    Bare(String),
}

impl StepEntry {
    fn into_description(self) -> String {
        match self {
            StepEntry::Described { description } => description,
            StepEntry::Bare(text) => text,
        }
    }
}

#[derive(Deserialize)]
struct GoalFile {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default)]
    url: Option<String>,
    steps: Vec<StepEntry>,
    #[serde(default)]
    assertions: Vec<String>,
    #[serde(default)]
    vars: HashMap<String, serde_yaml::Value>,
}

fn default_name() -> String {
    "Unnamed Goal".to_string()
}

impl Goal {
    pub async fn load(path: &Path) -> Result<Self, GoalError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| GoalError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, GoalError> {
        let file: GoalFile = serde_yaml::from_str(raw)?;
        if file.steps.is_empty() {
            return Err(GoalError::NoSteps);
        }
        let vars: HashMap<String, String> = file
            .vars
            .into_iter()
            .filter_map(|(k, v)| scalar(&v).map(|v| (k, v)))
            .collect();
        Ok(Self {
            name: file.name,
            url: file.url.filter(|u| !u.trim().is_empty()),
            steps: file
                .steps
                .into_iter()
                .map(|s| substitute(&s.into_description(), &vars))
                .collect(),
            assertions: file
                .assertions
                .iter()
                .map(|a| substitute(a, &vars))
                .collect(),
        })
    }

    /// Run directory name: spaces become underscores.
    pub fn slug(&self) -> String {
        self.name.replace(' ', "_")
    }
}

fn scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Replace `${name}` with `vars[name]`; unknown placeholders stay verbatim.
pub fn substitute(text: &str, vars: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_known_only() {
        let vars = HashMap::from([("user".to_string(), "standard_user".to_string())]);
        assert_eq!(
            substitute("Log in as '${user}' with ${password}", &vars),
            "Log in as 'standard_user' with ${password}"
        );
    }

    #[test]
    fn test_parse_mixed_steps_and_vars() {
        let goal = Goal::parse(
            r#"
url: https://www.saucedemo.com/
vars:
  user: standard_user
  qty: 2
steps:
  - description: "Log in with username '${user}'"
  - Add ${qty} items
assertions:
  - URL contains ${page}
"#,
        )
        .unwrap();
        assert_eq!(goal.name, "Unnamed Goal");
        assert_eq!(goal.steps, vec!["Log in with username 'standard_user'", "Add 2 items"]);
        assert_eq!(goal.assertions, vec!["URL contains ${page}"]);
        assert_eq!(goal.slug(), "Unnamed_Goal");
    }

    #[test]
    fn test_parse_rejects_missing_steps() {
        assert!(matches!(Goal::parse("name: Empty\n"), Err(GoalError::Parse(_))));
        assert!(matches!(Goal::parse("name: Empty\nsteps: []\n"), Err(GoalError::NoSteps)));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = Goal::load(Path::new("/nonexistent/goal.yaml")).await.unwrap_err();
        assert!(matches!(err, GoalError::Io { .. }));
    }
}
