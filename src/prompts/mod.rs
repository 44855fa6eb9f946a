//! Role prompt templates
//!
//! Handlebars-rendered system prompts with embedded defaults and optional
//! per-role file overrides from a prompts directory.

pub mod embedded;

use std::path::Path;

use eyre::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use crate::domain::AgentRole;

/// Variables available to prompt templates
#[derive(Debug, Clone, Serialize)]
pub struct PromptVars {
    pub working_dir: String,
    pub context: String,
}

/// Renders role system prompts
pub struct PromptLibrary {
    handlebars: Handlebars<'static>,
}

impl PromptLibrary {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        for role in AgentRole::ALL {
            handlebars
                .register_template_string(role.as_str(), embedded_template(role))
                .wrap_err_with(|| format!("invalid embedded template for {}", role))?;
        }
        Ok(Self { handlebars })
    }

    /// Register overrides from `<dir>/<role>.hbs` where present
    pub fn with_override_dir(mut self, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        for role in AgentRole::ALL {
            let path = dir.join(format!("{}.hbs", role));
            if path.exists() {
                debug!(?path, role = %role, "loading prompt override");
                let template = std::fs::read_to_string(&path)
                    .wrap_err_with(|| format!("failed to read prompt override {}", path.display()))?;
                self.handlebars
                    .register_template_string(role.as_str(), template)
                    .wrap_err_with(|| format!("invalid prompt override for {}", role))?;
            }
        }
        Ok(self)
    }

    /// Render the system prompt for a role
    pub fn render(&self, role: AgentRole, vars: &PromptVars) -> Result<String> {
        self.handlebars
            .render(role.as_str(), vars)
            .wrap_err_with(|| format!("failed to render prompt for {}", role))
    }
}

fn embedded_template(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Orchestrator => embedded::ORCHESTRATOR,
        AgentRole::Researcher => embedded::RESEARCHER,
        AgentRole::Architect => embedded::ARCHITECT,
        AgentRole::Developer => embedded::DEVELOPER,
        AgentRole::Tester => embedded::TESTER,
        AgentRole::Validator => embedded::VALIDATOR,
        AgentRole::Ux => embedded::UX,
    }
}
