//! Environment-driven configuration.
//!
//! All credentials come from the environment (or a `.env` file loaded
//! before startup); nothing secret ever appears on the command line.

use std::env;

use mediaferry_graph::GraphCredentials;
use mediaferry_kobo::DEFAULT_BASE_URL;

#[derive(Debug, thiserror::Error)]
#[error("missing required environment variables: {0}")]
pub struct MissingVars(String);

#[derive(Debug, Clone)]
pub struct Config {
    pub kobo_token: String,
    pub kobo_base_url: String,
    pub graph: GraphCredentials,
}

impl Config {
    /// Reads the configuration, reporting every missing variable at once
    /// instead of failing on the first.
    pub fn from_env() -> Result<Self, MissingVars> {
        let mut missing = Vec::new();
        let kobo_token = require(&mut missing, "API_TOKEN");
        let tenant_id = require(&mut missing, "TENANT_ID");
        let client_id = require(&mut missing, "CLIENT_ID");
        let client_secret = require(&mut missing, "CLIENT_SECRET");
        let site_id = require(&mut missing, "SITE_ID");
        if !missing.is_empty() {
            return Err(MissingVars(missing.join(", ")));
        }

        let kobo_base_url = env::var("KOBO_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            kobo_token,
            kobo_base_url,
            graph: GraphCredentials {
                tenant_id,
                client_id,
                client_secret,
                site_id: strip_quotes(&site_id).to_string(),
            },
        })
    }
}

fn require(missing: &mut Vec<&'static str>, name: &'static str) -> String {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => {
            missing.push(name);
            String::new()
        }
    }
}

/// Site ids pasted from shell snippets often keep their quotes.
fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '\'' || c == '"')
}
