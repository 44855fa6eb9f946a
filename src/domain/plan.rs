//! Execution plan types
//!
//! A plan is an ordered sequence of waves over a fixed task set. Every
//! dependency of a task in wave k resolves to some wave j < k, and every
//! task appears in exactly one wave.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::task::AgentTask;

/// A set of task IDs whose dependencies all lie in earlier waves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave {
    /// Task IDs in scheduling order (priority desc, then role order)
    pub tasks: Vec<String>,

    /// Whether the tasks may run concurrently
    pub parallel: bool,
}

impl Wave {
    pub fn new(tasks: Vec<String>) -> Self {
        let parallel = tasks.len() > 1;
        Self { tasks, parallel }
    }
}

/// The full plan for a run: task set plus wave layering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub tasks: Vec<AgentTask>,
    pub waves: Vec<Wave>,
}

impl ExecutionPlan {
    pub fn new(tasks: Vec<AgentTask>, waves: Vec<Wave>) -> Self {
        Self { tasks, waves }
    }

    /// Look up a task by ID
    pub fn task(&self, id: &str) -> Option<&AgentTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Index of the wave a task belongs to
    pub fn wave_of(&self, task_id: &str) -> Option<usize> {
        self.waves.iter().position(|w| w.tasks.iter().any(|t| t == task_id))
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    /// Check the plan invariants:
    /// every task in exactly one wave, and wave(dep) < wave(task) for every
    /// dependency edge (relaxed to wave(dep) <= wave(task) only inside a
    /// final circular-fallback wave).
    pub fn validate(&self) -> Result<(), String> {
        let mut wave_index: HashMap<&str, usize> = HashMap::new();
        for (wi, wave) in self.waves.iter().enumerate() {
            for task_id in &wave.tasks {
                if wave_index.insert(task_id.as_str(), wi).is_some() {
                    return Err(format!("task {} appears in more than one wave", task_id));
                }
            }
        }

        for task in &self.tasks {
            let Some(&wi) = wave_index.get(task.id.as_str()) else {
                return Err(format!("task {} is not assigned to any wave", task.id));
            };
            for dep in &task.depends_on {
                match wave_index.get(dep.as_str()) {
                    None => return Err(format!("task {} depends on unknown task {}", task.id, dep)),
                    // A dependency in the same wave is only legal in the final
                    // fallback wave, which carries unresolvable cycles.
                    Some(&di) if di == wi && wi == self.waves.len() - 1 => {}
                    Some(&di) if di >= wi => {
                        return Err(format!(
                            "task {} in wave {} depends on task {} in wave {}",
                            task.id, wi, dep, di
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentRole;

    fn task_with_id(id: &str, deps: Vec<&str>) -> AgentTask {
        let mut task = AgentTask::new("test task", AgentRole::Developer)
            .with_dependencies(deps.into_iter().map(String::from).collect());
        task.id = id.to_string();
        task
    }

    #[test]
    fn test_wave_parallel_flag() {
        assert!(!Wave::new(vec!["a".into()]).parallel);
        assert!(Wave::new(vec!["a".into(), "b".into()]).parallel);
    }

    #[test]
    fn test_validate_accepts_linear_plan() {
        let plan = ExecutionPlan::new(
            vec![
                task_with_id("a", vec![]),
                task_with_id("b", vec!["a"]),
                task_with_id("c", vec!["b"]),
            ],
            vec![
                Wave::new(vec!["a".into()]),
                Wave::new(vec!["b".into()]),
                Wave::new(vec!["c".into()]),
            ],
        );
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_assignment() {
        let plan = ExecutionPlan::new(
            vec![task_with_id("a", vec![]), task_with_id("b", vec![])],
            vec![Wave::new(vec!["a".into()])],
        );
        assert!(plan.validate().unwrap_err().contains("not assigned"));
    }

    #[test]
    fn test_validate_rejects_forward_dependency() {
        let plan = ExecutionPlan::new(
            vec![task_with_id("a", vec!["b"]), task_with_id("b", vec![])],
            vec![Wave::new(vec!["a".into()]), Wave::new(vec!["b".into()])],
        );
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_validate_allows_cycle_in_final_wave() {
        let plan = ExecutionPlan::new(
            vec![task_with_id("a", vec!["b"]), task_with_id("b", vec!["a"])],
            vec![Wave::new(vec!["a".into(), "b".into()])],
        );
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_wave_of() {
        let plan = ExecutionPlan::new(
            vec![task_with_id("a", vec![]), task_with_id("b", vec!["a"])],
            vec![Wave::new(vec!["a".into()]), Wave::new(vec!["b".into()])],
        );
        assert_eq!(plan.wave_of("a"), Some(0));
        assert_eq!(plan.wave_of("b"), Some(1));
        assert_eq!(plan.wave_of("zzz"), None);
    }
}
