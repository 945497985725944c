// Dependency Graph Builder
// Normalizes job `needs` and derives a deterministic order and display depth

use crate::workflow::Workflow;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::warn;

/// Job dependency graph for a single document (or a merged manifest).
///
/// Dependencies on ids that are not part of the graph are dropped when the
/// graph is built; nothing downstream sees the original `needs` shape.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Normalized dependencies per job, in declaration order
    needs: BTreeMap<String, Vec<String>>,
    /// Reverse adjacency: jobs that depend on the key
    dependents: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph of a workflow's jobs.
    pub fn from_workflow(workflow: &Workflow) -> Self {
        Self::from_edges(
            workflow
                .jobs
                .iter()
                .map(|(id, job)| (id.clone(), job.needs.to_vec())),
        )
    }

    /// Build a graph from `(job id, declared needs)` pairs.
    ///
    /// Duplicate dependencies keep their first occurrence; unknown ids are
    /// discarded.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let declared: BTreeMap<String, Vec<String>> = edges.into_iter().collect();

        let mut needs = BTreeMap::new();
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (id, deps) in &declared {
            let mut seen = HashSet::new();
            let normalized: Vec<String> = deps
                .iter()
                .filter(|dep| declared.contains_key(dep.as_str()))
                .filter(|dep| seen.insert(dep.as_str()))
                .cloned()
                .collect();

            for dep in &normalized {
                dependents.entry(dep.clone()).or_default().push(id.clone());
            }
            dependents.entry(id.clone()).or_default();
            needs.insert(id.clone(), normalized);
        }

        Self { needs, dependents }
    }

    /// Number of jobs in the graph.
    pub fn len(&self) -> usize {
        self.needs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.needs.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.needs.contains_key(id)
    }

    /// Normalized dependencies of a job (empty for unknown ids).
    pub fn needs(&self, id: &str) -> &[String] {
        self.needs.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Jobs that directly depend on `id`.
    pub fn dependents(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Job ids in deterministic topological order.
    ///
    /// Kahn's algorithm with lexicographic tie-breaking: the initial queue
    /// and every batch of newly ready jobs are sorted before being queued.
    /// Jobs left over by a cycle are appended in lexicographic order, so
    /// every job appears exactly once.
    pub fn topological_order(&self) -> Vec<String> {
        let mut in_degree: HashMap<&str, usize> = self
            .needs
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        // BTreeMap iteration is already sorted
        let mut queue: VecDeque<&str> = self
            .needs
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| id.as_str())
            .collect();

        let mut order: Vec<String> = Vec::with_capacity(self.needs.len());
        let mut emitted: HashSet<&str> = HashSet::new();

        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            emitted.insert(id);

            let mut ready = Vec::new();
            for dependent in self.dependents(id) {
                if let Some(deg) = in_degree.get_mut(dependent.as_str()) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(dependent.as_str());
                    }
                }
            }
            ready.sort_unstable();
            queue.extend(ready);
        }

        if order.len() < self.needs.len() {
            let remaining: Vec<&str> = self
                .needs
                .keys()
                .map(String::as_str)
                .filter(|id| !emitted.contains(id))
                .collect();
            warn!(
                jobs = ?remaining,
                "dependency cycle detected, appending remaining jobs in lexicographic order"
            );
            order.extend(remaining.into_iter().map(str::to_string));
        }

        order
    }

    /// Display depth: 0 without dependencies, otherwise one more than the
    /// deepest dependency. A job revisited on its own dependency path counts
    /// as 0, so cycles terminate.
    pub fn depth(&self, id: &str) -> usize {
        let mut path = HashSet::new();
        self.depth_on_path(id, &mut path)
    }

    fn depth_on_path<'a>(&'a self, id: &'a str, path: &mut HashSet<&'a str>) -> usize {
        if !path.insert(id) {
            return 0;
        }

        let depth = self
            .needs(id)
            .iter()
            .map(|dep| 1 + self.depth_on_path(dep, path))
            .max()
            .unwrap_or(0);

        path.remove(id);
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowParser;

    use proptest::prelude::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        DependencyGraph::from_edges(edges.iter().map(|(id, deps)| {
            (
                id.to_string(),
                deps.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            )
        }))
    }

    #[test]
    fn test_fan_out_order_and_depth() {
        let g = graph(&[("C", &["A"]), ("B", &["A"]), ("A", &[])]);

        assert_eq!(g.topological_order(), vec!["A", "B", "C"]);
        assert_eq!(g.depth("A"), 0);
        assert_eq!(g.depth("B"), 1);
        assert_eq!(g.depth("C"), 1);
    }

    #[test]
    fn test_newly_ready_batches_are_sorted() {
        // b and a both become ready when root is dequeued; z was ready first
        let g = graph(&[("z", &[]), ("root", &[]), ("b", &["root"]), ("a", &["root"])]);
        assert_eq!(g.topological_order(), vec!["root", "z", "a", "b"]);
    }

    #[test]
    fn test_unknown_dependencies_are_dropped() {
        let g = graph(&[("build", &[]), ("deploy", &["build", "external"])]);
        assert_eq!(g.needs("deploy"), ["build".to_string()]);
        assert_eq!(g.depth("deploy"), 1);
    }

    #[test]
    fn test_duplicate_dependencies_collapse() {
        let g = graph(&[("a", &[]), ("b", &["a", "a"])]);
        assert_eq!(g.needs("b"), ["a".to_string()]);
        assert_eq!(g.topological_order(), vec!["a", "b"]);
    }

    #[test]
    fn test_cycle_keeps_every_job() {
        let g = graph(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"]), ("free", &[])]);
        assert_eq!(g.topological_order(), vec!["free", "a", "b", "c"]);
    }

    #[test]
    fn test_self_dependency_is_appended() {
        let g = graph(&[("loop", &["loop"]), ("ok", &[])]);
        assert_eq!(g.topological_order(), vec!["ok", "loop"]);
        assert_eq!(g.depth("loop"), 1);
    }

    #[test]
    fn test_depth_on_cycle_terminates() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        assert_eq!(g.depth("a"), 2);
        assert_eq!(g.depth("b"), 2);
    }

    #[test]
    fn test_depth_uses_longest_chain() {
        let g = graph(&[
            ("f", &[]),
            ("d", &["f"]),
            ("e", &["d"]),
            ("b", &["d"]),
            ("c", &["e"]),
            ("a", &["b", "c"]),
        ]);
        assert_eq!(g.depth("d"), 1);
        assert_eq!(g.depth("e"), 2);
        assert_eq!(g.depth("c"), 3);
        assert_eq!(g.depth("a"), 4);
    }

    #[test]
    fn test_from_workflow() {
        let yaml = r#"
on: push
jobs:
  build:
    steps: [{run: make}]
  test:
    needs: build
    steps: [{run: make test}]
  deploy:
    needs: [test, approve]
    steps: [{run: make deploy}]
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        let g = DependencyGraph::from_workflow(&workflow);

        assert_eq!(g.len(), 3);
        assert_eq!(g.topological_order(), vec!["build", "test", "deploy"]);
        assert_eq!(g.needs("deploy"), ["test".to_string()]);
        assert_eq!(g.dependents("build"), ["test".to_string()]);
        assert_eq!(g.depth("deploy"), 2);
    }

    fn arbitrary_edges() -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
        prop::collection::vec(
            ("[a-f]{1,2}", prop::collection::vec("[a-f]{1,2}", 0..4)),
            0..12,
        )
    }

    /// Edges where a job only needs lexicographically smaller jobs.
    fn acyclic_edges() -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
        prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..4), 1..12)
            .prop_map(|rows| {
                rows.iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let deps = if i == 0 {
                            Vec::new()
                        } else {
                            picks.iter().map(|p| format!("job{:02}", p.index(i))).collect()
                        };
                        (format!("job{:02}", i), deps)
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn prop_order_is_complete(edges in arbitrary_edges()) {
            let g = DependencyGraph::from_edges(edges);
            let order = g.topological_order();

            prop_assert_eq!(order.len(), g.len());
            let unique: HashSet<&String> = order.iter().collect();
            prop_assert_eq!(unique.len(), order.len());
            for id in &order {
                prop_assert!(g.contains(id));
            }
        }

        #[test]
        fn prop_order_respects_dependencies(edges in acyclic_edges()) {
            let g = DependencyGraph::from_edges(edges);
            let order = g.topological_order();
            let position: HashMap<&str, usize> =
                order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();

            for id in &order {
                for dep in g.needs(id) {
                    prop_assert!(position[dep.as_str()] < position[id.as_str()]);
                }
            }
        }

        #[test]
        fn prop_depth_is_one_past_deepest_dependency(edges in acyclic_edges()) {
            let g = DependencyGraph::from_edges(edges);
            for id in g.topological_order() {
                let expected = g.needs(&id).iter().map(|d| 1 + g.depth(d)).max().unwrap_or(0);
                prop_assert_eq!(g.depth(&id), expected);
            }
        }
    }
}
