// Copyright 2020 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

//! The graph of solutions that publish packages to each other.
//!
//! A solution that consumes a package another solution publishes has to be
//! built after its provider. Across a set of checked-out solutions these
//! relations form a directed graph that must be acyclic for any publish order
//! to exist. We build it, verify it and compute the ordering once.

use petgraph::{
    algo::{tarjan_scc, toposort},
    graph::{DiGraph, NodeIndex},
};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error as ThisError;
use tracing::debug;

use crate::atry;
use crate::core::{errors::Result, publish::NugetSpec, solution::Solution};

/// An error returned when solutions consume each other's packages in a
/// cycle. The inner value lists the solutions involved, sorted by name.
#[derive(Debug, ThisError)]
#[error("detected a publishing cycle between solutions {}", .0.join(", "))]
pub struct CyclicDependencyError(pub Vec<String>);

/// An error returned when two solutions publish a package with the same
/// id, so consumers of it cannot be ordered.
#[derive(Debug, ThisError)]
#[error("package `{package}` is published by both `{first}` and `{second}`")]
pub struct DuplicatePublisherError {
    pub package: String,
    pub first: String,
    pub second: String,
}

/// One solution's place in a [`PublishPlan`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PublishStep {
    pub solution: String,

    /// The solutions that must be published first.
    pub depends_on: Vec<String>,

    /// The packages this solution publishes.
    pub publishes: Vec<String>,
}

/// The order in which a set of solutions can be built and published.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PublishPlan {
    pub steps: Vec<PublishStep>,
}

impl PublishPlan {
    /// Solution names, providers first.
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.solution.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

/// A DAG of solutions. Edges point from a provider to its consumers.
#[derive(Debug, Default)]
pub struct SolutionGraph {
    graph: DiGraph<usize, ()>,
    steps: Vec<PublishStep>,
}

impl SolutionGraph {
    /// Work out which of `solutions` depend on which, and compute a publish
    /// order.
    ///
    /// Each solution's resolved nuget dependencies are recomputed as a side
    /// effect. The returned error is downcastable to
    /// [`CyclicDependencyError`] if no order exists.
    pub fn build(solutions: &mut [Solution]) -> Result<PublishPlan> {
        let mut graph = SolutionGraph::default();
        let specs = graph.collect_specifications(solutions)?;

        for solution in solutions.iter_mut() {
            solution.determine_nuget_dependencies(|dep| specs.get(&dep.name.to_lowercase()).cloned());
        }

        graph.link(solutions);
        graph.into_plan()
    }

    fn collect_specifications(&mut self, solutions: &[Solution]) -> Result<HashMap<String, NugetSpec>> {
        let mut specs: HashMap<String, NugetSpec> = HashMap::new();

        for (index, solution) in solutions.iter().enumerate() {
            let published = atry!(
                solution.specifications();
                ["failed to read the packages published by solution `{}`", solution.name()]
            );

            for spec in published {
                if let Some(existing) = specs.get(&spec.name.to_lowercase()) {
                    if !existing.publisher.eq_ignore_ascii_case(solution.name()) {
                        return Err(DuplicatePublisherError {
                            package: spec.name.clone(),
                            first: existing.publisher.clone(),
                            second: solution.name().to_owned(),
                        }
                        .into());
                    }
                }

                specs.insert(spec.name.to_lowercase(), spec.clone());
            }

            self.graph.add_node(index);
            self.steps.push(PublishStep {
                solution: solution.name().to_owned(),
                depends_on: Vec::new(),
                publishes: published.iter().map(|s| s.name.clone()).collect(),
            });
        }

        Ok(specs)
    }

    fn link(&mut self, solutions: &[Solution]) {
        let by_name: HashMap<String, usize> = solutions
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name().to_lowercase(), i))
            .collect();

        for (consumer, solution) in solutions.iter().enumerate() {
            for provider_name in solution.solution_dependencies() {
                let Some(&provider) = by_name.get(&provider_name.to_lowercase()) else {
                    debug!(
                        "{} depends on {}, which is not part of this plan",
                        solution.name(),
                        provider_name
                    );
                    continue;
                };

                self.graph
                    .add_edge(NodeIndex::new(provider), NodeIndex::new(consumer), ());
                self.steps[consumer]
                    .depends_on
                    .push(solutions[provider].name().to_owned());
            }
        }
    }

    fn into_plan(self) -> Result<PublishPlan> {
        let sorted = atry!(
            toposort(&self.graph, None).map_err(|cycle| CyclicDependencyError(self.cycle_through(cycle.node_id())));
            ["the solutions cannot be put in publishing order"]
        );

        let mut steps: Vec<Option<PublishStep>> = self.steps.into_iter().map(Some).collect();

        Ok(PublishPlan {
            steps: sorted
                .iter()
                .filter_map(|nix| steps[self.graph[*nix]].take())
                .collect(),
        })
    }

    /// The names of the strongly connected component containing `node`.
    fn cycle_through(&self, node: NodeIndex) -> Vec<String> {
        let mut names: Vec<String> = tarjan_scc(&self.graph)
            .into_iter()
            .find(|scc| scc.contains(&node))
            .unwrap_or_else(|| vec![node])
            .iter()
            .map(|nix| self.steps[self.graph[*nix]].solution.clone())
            .collect();

        names.sort_by_key(|n| n.to_lowercase());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        dependency::Dependency,
        publish::{PackageParams, PublishingService},
    };
    use std::path::PathBuf;

    /// Publishes a fixed list of package names.
    #[derive(Debug)]
    struct StaticPublisher(Vec<&'static str>);

    impl PublishingService for StaticPublisher {
        fn specifications_for(&self, solution: &Solution) -> Result<Vec<NugetSpec>> {
            Ok(self
                .0
                .iter()
                .map(|name| NugetSpec::new(*name, solution.name()))
                .collect())
        }

        fn create_package(&self, params: &PackageParams) -> Result<PathBuf> {
            Ok(params.output_dir.clone())
        }
    }

    fn solution(name: &str, publishes: &[&'static str], consumes: &[&str]) -> Solution {
        let mut solution = Solution::named(name);
        solution.use_publisher(Box::new(StaticPublisher(publishes.to_vec())));

        for dep in consumes {
            solution.add_dependency(Dependency::fixed(*dep, "1.0.0"));
        }

        solution
    }

    fn position(plan: &PublishPlan, name: &str) -> usize {
        plan.order()
            .iter()
            .position(|n| *n == name)
            .expect("BUG: solution should be in the plan")
    }

    #[test]
    fn providers_come_first() {
        let mut solutions = vec![
            solution("Y", &["Y-lib"], &["X-lib"]),
            solution("X", &["X-lib"], &["Newtonsoft.Json"]),
        ];

        let plan = SolutionGraph::build(&mut solutions).expect("BUG: graph should build");
        assert_eq!(plan.order(), vec!["X", "Y"]);
        assert_eq!(plan.steps[1].depends_on, vec!["X"]);
        assert_eq!(plan.steps[0].publishes, vec!["X-lib"]);
        assert_eq!(solutions[0].solution_dependencies(), vec!["X"]);
    }

    #[test]
    fn diamond() {
        let mut solutions = vec![
            solution("app", &[], &["left-lib", "right-lib"]),
            solution("left", &["left-lib"], &["core-lib"]),
            solution("right", &["right-lib"], &["core-lib"]),
            solution("core", &["core-lib"], &[]),
        ];

        let plan = SolutionGraph::build(&mut solutions).expect("BUG: graph should build");
        assert_eq!(plan.len(), 4);

        let core = position(&plan, "core");
        let left = position(&plan, "left");
        let right = position(&plan, "right");
        let app = position(&plan, "app");

        assert!(core < left && core < right);
        assert!(left < app && right < app);
        assert_eq!(plan.steps[app].depends_on, vec!["left", "right"]);
    }

    #[test]
    fn outside_providers_are_ignored() {
        let mut solutions = vec![solution("Y", &[], &["X-lib"])];

        let plan = SolutionGraph::build(&mut solutions).expect("BUG: graph should build");
        assert_eq!(plan.order(), vec!["Y"]);
        assert!(plan.steps[0].depends_on.is_empty());
    }

    #[test]
    fn two_node_cycle() {
        let mut solutions = vec![
            solution("A", &["A-lib"], &["B-lib"]),
            solution("B", &["B-lib"], &["A-lib"]),
        ];

        let result = SolutionGraph::build(&mut solutions);
        assert!(result.is_err());

        let err = result.unwrap_err();
        let cycle_err = err.downcast_ref::<CyclicDependencyError>();
        assert!(
            cycle_err.is_some(),
            "expected CyclicDependencyError, got: {:?}",
            err
        );
        assert_eq!(cycle_err.unwrap().0, vec!["A", "B"]);
    }

    #[test]
    fn partial_cycle() {
        let mut solutions = vec![
            solution("leaf", &["leaf-lib"], &[]),
            solution("A", &["A-lib"], &["leaf-lib", "C-lib"]),
            solution("B", &["B-lib"], &["A-lib"]),
            solution("C", &["C-lib"], &["B-lib"]),
        ];

        let err = SolutionGraph::build(&mut solutions).unwrap_err();
        let cycle_err = err.downcast_ref::<CyclicDependencyError>();
        assert!(
            cycle_err.is_some(),
            "expected CyclicDependencyError, got: {:?}",
            err
        );
        assert_eq!(cycle_err.unwrap().0, vec!["A", "B", "C"]);
        assert!(err.to_string().contains("publishing order"));
    }

    #[test]
    fn self_publishing_is_not_a_cycle() {
        let mut solutions = vec![solution("X", &["X-lib", "X-extras"], &["X-lib"])];

        let plan = SolutionGraph::build(&mut solutions).expect("BUG: graph should build");
        assert_eq!(plan.order(), vec!["X"]);
        assert_eq!(plan.steps[0].publishes, vec!["X-lib", "X-extras"]);
    }

    #[test]
    fn plan_serializes() {
        let mut solutions = vec![solution("X", &["X-lib"], &[])];
        let plan = SolutionGraph::build(&mut solutions).unwrap();

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["steps"][0]["solution"], "X");
        assert_eq!(json["steps"][0]["publishes"][0], "X-lib");
    }

    #[test]
    fn one_package_two_publishers_is_an_error() {
        let mut solutions = vec![
            solution("X", &["Shared"], &[]),
            solution("Y", &["Shared"], &[]),
            solution("Z", &[], &["Shared"]),
        ];

        let err = SolutionGraph::build(&mut solutions).unwrap_err();
        let dup = err
            .downcast_ref::<DuplicatePublisherError>()
            .expect("BUG: should be a duplicate publisher");
        assert_eq!(dup.package, "Shared");
        assert_eq!((dup.first.as_str(), dup.second.as_str()), ("X", "Y"));
    }
}
