//! Task plan types: subtasks, validation, topological order.
//!
//! A plan is data, never an error: validation accumulates problems into
//! `validation_errors` and the executor decides how to proceed (skip the
//! offending subtasks with a recorded reason).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution status of one subtask.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

/// Compensating action to run on reverse traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackAction {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// One atomic subtask: a tool invocation with prerequisites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    /// Unique within one plan.
    pub id: String,
    /// Human-readable description for prompts and reports.
    pub description: String,
    /// Must be a member of the advertised tool set.
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Ids of subtasks that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub rollback_action: Option<RollbackAction>,
}

fn default_status() -> TaskStatus {
    TaskStatus::Pending
}

impl SubTask {
    pub fn new(id: impl Into<String>, description: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            tool_name: tool_name.into(),
            arguments: Map::new(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            rollback_action: None,
        }
    }
}

/// Complete execution plan for one goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    pub goal: String,
    pub subtasks: Vec<SubTask>,
    /// Topological order over subtask ids; respects `dependencies`.
    pub execution_order: Vec<String>,
    /// Accumulated validation problems; empty means the plan is sound.
    pub validation_errors: Vec<String>,
}

impl TaskPlan {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            subtasks: Vec::new(),
            execution_order: Vec::new(),
            validation_errors: Vec::new(),
        }
    }

    pub fn add_subtask(&mut self, subtask: SubTask) {
        self.subtasks.push(subtask);
    }

    pub fn get_task(&self, task_id: &str) -> Option<&SubTask> {
        self.subtasks.iter().find(|t| t.id == task_id)
    }

    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }

    /// Runs all four validation checks, accumulating every error rather
    /// than short-circuiting. Returns true when the plan is sound.
    pub fn validate_with_tools(&mut self, valid_tools: &HashSet<String>) -> bool {
        self.validation_errors.clear();

        for task in &self.subtasks {
            if !valid_tools.contains(&task.tool_name) {
                self.validation_errors.push(format!(
                    "task {}: invalid tool '{}'",
                    task.id, task.tool_name
                ));
            }
        }

        if self.has_circular_dependencies() {
            self.validation_errors
                .push("circular dependency detected in task plan".to_string());
        }

        let task_ids: HashSet<&str> = self.subtasks.iter().map(|t| t.id.as_str()).collect();
        for task in &self.subtasks {
            for dep in &task.dependencies {
                if !task_ids.contains(dep.as_str()) {
                    self.validation_errors
                        .push(format!("task {}: unknown dependency '{}'", task.id, dep));
                }
            }
        }

        if !self.execution_order_is_valid() {
            self.validation_errors
                .push("invalid execution order: dependencies not satisfied".to_string());
        }

        self.validation_errors.is_empty()
    }

    /// Depth-first cycle detection with an explicit recursion stack.
    fn has_circular_dependencies(&self) -> bool {
        let deps: HashMap<&str, &[String]> = self
            .subtasks
            .iter()
            .map(|t| (t.id.as_str(), t.dependencies.as_slice()))
            .collect();

        fn visit<'a>(
            id: &'a str,
            deps: &HashMap<&'a str, &'a [String]>,
            visited: &mut HashSet<&'a str>,
            stack: &mut HashSet<&'a str>,
        ) -> bool {
            visited.insert(id);
            stack.insert(id);
            if let Some(dep_ids) = deps.get(id) {
                for dep in dep_ids.iter() {
                    if !visited.contains(dep.as_str()) {
                        if visit(dep, deps, visited, stack) {
                            return true;
                        }
                    } else if stack.contains(dep.as_str()) {
                        return true;
                    }
                }
            }
            stack.remove(id);
            false
        }

        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        for task in &self.subtasks {
            if !visited.contains(task.id.as_str())
                && visit(task.id.as_str(), &deps, &mut visited, &mut stack)
            {
                return true;
            }
        }
        false
    }

    /// Checks that every task in `execution_order` appears after all of its
    /// prerequisites, and that every ordered id exists.
    fn execution_order_is_valid(&self) -> bool {
        let mut completed: HashSet<&str> = HashSet::new();
        for task_id in &self.execution_order {
            let Some(task) = self.get_task(task_id) else {
                return false;
            };
            if !task
                .dependencies
                .iter()
                .all(|d| completed.contains(d.as_str()))
            {
                return false;
            }
            completed.insert(task_id);
        }
        true
    }

    /// Kahn's algorithm: in-degrees from `dependencies`, roots dequeued
    /// first. A remainder with positive in-degree marks the plan circular;
    /// the partial order still covers the acyclic part.
    pub fn compute_execution_order(&mut self) -> &[String] {
        let mut in_degree: HashMap<&str, usize> = self
            .subtasks
            .iter()
            .map(|t| (t.id.as_str(), t.dependencies.len()))
            .collect();

        let mut queue: std::collections::VecDeque<&str> = self
            .subtasks
            .iter()
            .filter(|t| t.dependencies.is_empty())
            .map(|t| t.id.as_str())
            .collect();

        let mut order: Vec<String> = Vec::with_capacity(self.subtasks.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            for task in &self.subtasks {
                if task.dependencies.iter().any(|d| d == id) {
                    let d = in_degree.get_mut(task.id.as_str()).expect("known id");
                    *d = d.saturating_sub(1);
                    if *d == 0 {
                        queue.push_back(task.id.as_str());
                    }
                }
            }
        }

        self.execution_order = order;
        &self.execution_order
    }

    /// Serialisable snapshot for the audit graph and memory store.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
