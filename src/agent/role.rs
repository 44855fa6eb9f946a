//! Role configurations
//!
//! Each role carries a default tool set, a temperature, and an iteration
//! cap. System prompts come from the prompt library.

use std::collections::HashMap;

use crate::domain::AgentRole;

/// Per-role agent configuration
#[derive(Debug, Clone)]
pub struct RoleConfig {
    pub role: AgentRole,

    /// Default tool names for agents of this role
    pub tools: Vec<String>,

    pub temperature: f32,

    pub max_iterations: u32,
}

/// Registry of role configurations, built once at engine start
pub struct RoleRegistry {
    configs: HashMap<AgentRole, RoleConfig>,
}

impl RoleRegistry {
    /// Registry with the standard role configurations
    pub fn standard(max_iterations: u32) -> Self {
        let read_only = |role| RoleConfig {
            role,
            tools: vec![
                "read_file".to_string(),
                "list_directory".to_string(),
                "glob".to_string(),
                "grep".to_string(),
            ],
            temperature: 0.3,
            max_iterations,
        };

        let mut configs = HashMap::new();

        configs.insert(
            AgentRole::Orchestrator,
            RoleConfig {
                role: AgentRole::Orchestrator,
                tools: vec![
                    "read_file".to_string(),
                    "list_directory".to_string(),
                    "glob".to_string(),
                    "grep".to_string(),
                    "handoff".to_string(),
                ],
                temperature: 0.5,
                max_iterations,
            },
        );
        configs.insert(AgentRole::Researcher, read_only(AgentRole::Researcher));
        configs.insert(AgentRole::Architect, read_only(AgentRole::Architect));
        configs.insert(
            AgentRole::Developer,
            RoleConfig {
                role: AgentRole::Developer,
                tools: vec![
                    "read_file".to_string(),
                    "write_file".to_string(),
                    "list_directory".to_string(),
                    "glob".to_string(),
                    "grep".to_string(),
                    "run_command".to_string(),
                    "handoff".to_string(),
                ],
                temperature: 0.7,
                max_iterations,
            },
        );
        configs.insert(
            AgentRole::Tester,
            RoleConfig {
                role: AgentRole::Tester,
                tools: vec![
                    "read_file".to_string(),
                    "write_file".to_string(),
                    "list_directory".to_string(),
                    "glob".to_string(),
                    "grep".to_string(),
                    "run_command".to_string(),
                ],
                temperature: 0.3,
                max_iterations,
            },
        );
        configs.insert(AgentRole::Validator, read_only(AgentRole::Validator));
        configs.insert(AgentRole::Ux, read_only(AgentRole::Ux));

        Self { configs }
    }

    pub fn get(&self, role: AgentRole) -> Option<&RoleConfig> {
        self.configs.get(&role)
    }

    /// Config for a role, falling back to developer for unknown lookups
    pub fn get_or_default(&self, role: AgentRole) -> RoleConfig {
        self.configs
            .get(&role)
            .or_else(|| self.configs.get(&AgentRole::Developer))
            .cloned()
            .unwrap_or(RoleConfig {
                role,
                tools: vec!["read_file".to_string()],
                temperature: 0.7,
                max_iterations: 20,
            })
    }

    pub fn roles(&self) -> Vec<&RoleConfig> {
        let mut roles: Vec<&RoleConfig> = self.configs.values().collect();
        roles.sort_by_key(|c| c.role.scheduling_rank());
        roles
    }
}
