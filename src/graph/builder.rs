//! The dependency graph built from loaded task definitions.
//!
//! Node iteration is always over a `BTreeMap`, so ids are visited in
//! ascending order wherever the spec requires a deterministic tie-break
//! (cycle reporting, topological sort, batch selection).

use crate::errors::{GraphError, TaskerError};
use crate::state::{Checkpoint, Task, TaskStatus};
use std::collections::{BTreeMap, BTreeSet, HashSet};

type Result<T> = std::result::Result<T, TaskerError>;

/// Forward/reverse adjacency over a fixed set of task ids.
#[derive(Debug)]
pub struct TaskGraph {
    ids: Vec<String>,
    /// id -> ids it depends on
    depends_on: BTreeMap<String, Vec<String>>,
    /// id -> ids that depend on it
    dependents: BTreeMap<String, Vec<String>>,
}

impl TaskGraph {
    /// Build and validate a graph from the loaded task set (I-1, I-2).
    pub fn build(tasks: &BTreeMap<String, Task>) -> Result<Self> {
        for task in tasks.values() {
            for dep in &task.depends_on {
                if !tasks.contains_key(dep) {
                    return Err(GraphError::MissingDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    }
                    .into());
                }
            }
        }

        let ids: Vec<String> = tasks.keys().cloned().collect();
        let mut depends_on: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for id in &ids {
            depends_on.insert(id.clone(), Vec::new());
            dependents.insert(id.clone(), Vec::new());
        }
        for task in tasks.values() {
            for dep in &task.depends_on {
                depends_on.get_mut(&task.id).unwrap().push(dep.clone());
                dependents.get_mut(dep).unwrap().push(task.id.clone());
            }
        }
        for list in depends_on.values_mut().chain(dependents.values_mut()) {
            list.sort();
        }

        let graph = Self {
            ids,
            depends_on,
            dependents,
        };
        graph.detect_cycle()?;
        Ok(graph)
    }

    /// Depth-first search with a recursion stack (I-2). Node iteration is
    /// sorted by id so a detected cycle is reported deterministically.
    fn detect_cycle(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let mut color: BTreeMap<&str, Color> =
            self.ids.iter().map(|id| (id.as_str(), Color::White)).collect();
        let mut stack: Vec<String> = Vec::new();

        fn visit<'a>(
            id: &'a str,
            graph: &'a TaskGraph,
            color: &mut BTreeMap<&'a str, Color>,
            stack: &mut Vec<String>,
        ) -> Result<()> {
            color.insert(id, Color::Gray);
            stack.push(id.to_string());
            for dep in graph.depends_on.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                match color.get(dep.as_str()).copied().unwrap_or(Color::White) {
                    Color::White => visit(dep, graph, color, stack)?,
                    Color::Gray => {
                        let start = stack.iter().position(|s| s == dep).unwrap_or(0);
                        let mut members: Vec<String> = stack[start..].to_vec();
                        members.push(dep.clone());
                        return Err(GraphError::CycleDetected { members }.into());
                    }
                    Color::Black => {}
                }
            }
            stack.pop();
            color.insert(id, Color::Black);
            Ok(())
        }

        for id in &self.ids {
            if color.get(id.as_str()).copied().unwrap_or(Color::White) == Color::White {
                visit(id, self, &mut color, &mut stack)?;
            }
        }
        Ok(())
    }

    /// Kahn's algorithm, ties broken by ascending id.
    pub fn topological_sort(&self) -> Vec<String> {
        let mut in_degree: BTreeMap<String, usize> = self
            .ids
            .iter()
            .map(|id| (id.clone(), self.depends_on[id].len()))
            .collect();
        let mut ready: BTreeSet<String> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| id.clone())
            .collect();

        let mut order = Vec::with_capacity(self.ids.len());
        while let Some(id) = ready.iter().next().cloned() {
            ready.remove(&id);
            order.push(id.clone());
            for dependent in &self.dependents[&id] {
                let deg = in_degree.get_mut(dependent).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(dependent.clone());
                }
            }
        }
        order
    }

    /// A task is ready iff pending, every dependency satisfied, and not
    /// currently reserved by an active checkpoint (§4.3). Returned in
    /// ascending id order.
    pub fn ready_set(&self, tasks: &BTreeMap<String, Task>, checkpoint: Option<&Checkpoint>) -> Vec<String> {
        let reserved: HashSet<&str> = checkpoint
            .map(|cp| cp.per_task_result.keys().map(String::as_str).collect())
            .unwrap_or_default();
        self.ids
            .iter()
            .filter(|id| {
                let Some(task) = tasks.get(id.as_str()) else {
                    return false;
                };
                task.status == TaskStatus::Pending
                    && !reserved.contains(id.as_str())
                    && self.depends_on[id.as_str()].iter().all(|dep| {
                        tasks
                            .get(dep)
                            .is_some_and(|d| d.status.satisfies_dependency())
                    })
            })
            .cloned()
            .collect()
    }

    /// I-7: the steel-thread subgraph must be non-empty if any
    /// steel-thread task exists, acyclic (already guaranteed by
    /// [`Self::build`]), and contain no edge into a non-steel-thread task.
    pub fn validate_steel_thread(&self, tasks: &BTreeMap<String, Task>) -> Result<()> {
        let steel_thread: BTreeSet<&str> = tasks
            .values()
            .filter(|t| t.steel_thread)
            .map(|t| t.id.as_str())
            .collect();
        if steel_thread.is_empty() {
            return Ok(());
        }
        for id in &steel_thread {
            for dep in &self.depends_on[*id] {
                if !steel_thread.contains(dep.as_str()) {
                    return Err(GraphError::SteelThreadBroken {
                        detail: format!(
                            "steel-thread task '{id}' depends on non-steel-thread task '{dep}'"
                        ),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn task(id: &str, deps: &[&str]) -> Task {
        let mut t = Task::new(id, "name", 1, PathBuf::from(format!("tasks/{id}.json")));
        t.depends_on = deps.iter().map(|s| s.to_string()).collect();
        t
    }

    fn tasks(pairs: Vec<Task>) -> BTreeMap<String, Task> {
        pairs.into_iter().map(|t| (t.id.clone(), t)).collect()
    }

    #[test]
    fn build_rejects_missing_dependency() {
        let m = tasks(vec![task("T001", &["T999"])]);
        let err = TaskGraph::build(&m).unwrap_err();
        assert_eq!(err.code(), "MISSING_DEPENDENCY");
    }

    #[test]
    fn build_detects_cycle_and_names_members() {
        let m = tasks(vec![task("T001", &["T003"]), task("T002", &["T001"]), task("T003", &["T002"])]);
        let err = TaskGraph::build(&m).unwrap_err();
        assert_eq!(err.code(), "CYCLE_DETECTED");
    }

    #[test]
    fn topological_sort_breaks_ties_by_ascending_id() {
        let m = tasks(vec![task("T003", &[]), task("T001", &[]), task("T002", &[])]);
        let graph = TaskGraph::build(&m).unwrap();
        assert_eq!(graph.topological_sort(), vec!["T001", "T002", "T003"]);
    }

    #[test]
    fn topological_sort_respects_diamond_dependency() {
        let m = tasks(vec![
            task("T001", &[]),
            task("T002", &["T001"]),
            task("T003", &["T001"]),
            task("T004", &["T002", "T003"]),
        ]);
        let graph = TaskGraph::build(&m).unwrap();
        let order = graph.topological_sort();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("T001") < pos("T002"));
        assert!(pos("T001") < pos("T003"));
        assert!(pos("T002") < pos("T004"));
        assert!(pos("T003") < pos("T004"));
    }

    #[test]
    fn ready_set_excludes_checkpointed_and_unsatisfied_tasks() {
        let mut m = tasks(vec![task("T001", &[]), task("T002", &["T001"])]);
        m.get_mut("T001").unwrap().status = TaskStatus::Complete;
        m.get_mut("T002").unwrap().status = TaskStatus::Pending;
        let graph = TaskGraph::build(&m).unwrap();
        assert_eq!(graph.ready_set(&m, None), vec!["T002"]);

        let cp = Checkpoint::new(vec!["T002".into()]);
        assert!(graph.ready_set(&m, Some(&cp)).is_empty());
    }

    #[test]
    fn skipped_dependency_satisfies_but_differs_from_complete() {
        let mut m = tasks(vec![task("T001", &[]), task("T002", &["T001"])]);
        m.get_mut("T001").unwrap().status = TaskStatus::Skipped;
        let graph = TaskGraph::build(&m).unwrap();
        assert_eq!(graph.ready_set(&m, None), vec!["T002"]);
    }

    #[test]
    fn steel_thread_rejects_edge_into_non_steel_thread_task() {
        let mut m = tasks(vec![task("T001", &[]), task("T002", &["T001"])]);
        m.get_mut("T002").unwrap().steel_thread = true;
        let graph = TaskGraph::build(&m).unwrap();
        let err = graph.validate_steel_thread(&m).unwrap_err();
        assert_eq!(err.code(), "STEEL_THREAD_BROKEN");
    }

    #[test]
    fn steel_thread_passes_when_subgraph_closed() {
        let mut m = tasks(vec![task("T001", &[]), task("T002", &["T001"])]);
        m.get_mut("T001").unwrap().steel_thread = true;
        m.get_mut("T002").unwrap().steel_thread = true;
        let graph = TaskGraph::build(&m).unwrap();
        assert!(graph.validate_steel_thread(&m).is_ok());
    }
}
