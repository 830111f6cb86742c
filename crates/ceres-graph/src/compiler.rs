//! Dependency-path computation
//!
//! For every node the compiler computes the ordered list of upstream
//! Dependency-path nodes that must run before it can read its data inputs.
//! Each list is a DFS post-order over the node's recorded dependencies:
//! a dependency is appended only after all of its own dependencies, at most
//! once, and never includes the destination itself. Forward-path nodes are
//! skipped entirely; they only run when reached through control flow.
//!
//! A node revisited while still on the DFS stack is a circular dependency and
//! aborts the compile.

use std::sync::Arc;

use crate::conversion::ConversionRegistry;
use crate::error::{CeresError, Result};
use crate::variable::GlobalVariables;

/// Registries a compile links against
///
/// Defaults to the process-wide conversion registry and global variable table.
#[derive(Clone)]
pub struct CompileOptions {
    pub conversions: Arc<ConversionRegistry>,
    pub globals: Arc<GlobalVariables>,
}

impl CompileOptions {
    pub fn new(conversions: Arc<ConversionRegistry>, globals: Arc<GlobalVariables>) -> Self {
        Self {
            conversions,
            globals,
        }
    }

    /// Use a specific conversion registry with the global variable table
    pub fn with_conversions(conversions: ConversionRegistry) -> Self {
        Self::new(Arc::new(conversions), GlobalVariables::global())
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::new(ConversionRegistry::global(), GlobalVariables::global())
    }
}

/// Cached per-node dependency paths, indexed by node order
pub type DependencyPaths = Arc<Vec<Vec<usize>>>;

/// Index-based view of the dependency relation
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// `dependencies[i]`: nodes whose outputs feed node `i`, in link order
    pub dependencies: Vec<Vec<usize>>,
    /// `forward[i]`: node `i` is on the Forward execution path
    pub forward: Vec<bool>,
    /// Display names (guids) used in cycle reports
    pub names: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    OnStack,
    Done,
}

impl DependencyGraph {
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Compute the path of every node; fails on the first cycle found
    pub fn compute_paths(&self) -> Result<Vec<Vec<usize>>> {
        (0..self.len()).map(|i| self.path_for(i)).collect()
    }

    /// DFS post-order of the non-Forward dependencies of `destination`
    pub fn path_for(&self, destination: usize) -> Result<Vec<usize>> {
        let mut visit = vec![Visit::New; self.len()];
        let mut path = Vec::new();
        let mut stack: Vec<(usize, usize)> = vec![(destination, 0)];
        visit[destination] = Visit::OnStack;

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let Some(&dependency) = self.dependencies[node].get(top.1) else {
                stack.pop();
                visit[node] = Visit::Done;
                if node != destination {
                    path.push(node);
                }
                continue;
            };
            top.1 += 1;

            if self.forward.get(dependency).copied().unwrap_or(false) {
                continue;
            }
            match visit[dependency] {
                Visit::Done => {}
                Visit::OnStack => return Err(self.cycle_error(&stack, dependency)),
                Visit::New => {
                    visit[dependency] = Visit::OnStack;
                    stack.push((dependency, 0));
                }
            }
        }

        Ok(path)
    }

    fn cycle_error(&self, stack: &[(usize, usize)], repeated: usize) -> CeresError {
        let start = stack
            .iter()
            .position(|(node, _)| *node == repeated)
            .unwrap_or(0);
        let mut chain: Vec<String> = stack[start..]
            .iter()
            .map(|(node, _)| self.name(*node))
            .collect();
        chain.push(self.name(repeated));
        CeresError::CircularDependency { chain }
    }

    fn name(&self, node: usize) -> String {
        self.names
            .get(node)
            .cloned()
            .unwrap_or_else(|| format!("#{}", node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(dependencies: Vec<Vec<usize>>, forward: Vec<bool>) -> DependencyGraph {
        let names = (0..dependencies.len()).map(|i| format!("n{}", i)).collect();
        DependencyGraph {
            dependencies,
            forward,
            names,
        }
    }

    #[test]
    fn test_chain_post_order() {
        // 0 -> 1 -> 2 (2 is a Forward consumer)
        let g = graph(vec![vec![], vec![0], vec![1]], vec![false, false, true]);
        let paths = g.compute_paths().unwrap();
        assert_eq!(paths[2], vec![0, 1]);
        assert_eq!(paths[1], vec![0]);
        assert!(paths[0].is_empty());
    }

    #[test]
    fn test_diamond_visits_once() {
        // 3 reads 1 and 2, both read 0
        let g = graph(
            vec![vec![], vec![0], vec![0], vec![1, 2]],
            vec![false, false, false, true],
        );
        let path = g.path_for(3).unwrap();
        assert_eq!(path, vec![0, 1, 2]);
    }

    #[test]
    fn test_forward_dependencies_skipped() {
        // 1 is Forward; its own dependency 0 is not reached through it
        let g = graph(vec![vec![], vec![0], vec![1]], vec![false, true, false]);
        assert!(g.path_for(2).unwrap().is_empty());
    }

    #[test]
    fn test_cycle_is_fatal() {
        let g = graph(vec![vec![1], vec![0]], vec![false, false]);
        match g.compute_paths() {
            Err(CeresError::CircularDependency { chain }) => {
                assert_eq!(chain, vec!["n0", "n1", "n0"]);
            }
            other => panic!("expected cycle, got {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_cycle_through_forward_node_is_ignored() {
        // 0 <-> 1 but 1 is Forward, so the loop is control flow, not data
        let g = graph(vec![vec![1], vec![0]], vec![false, true]);
        assert!(g.compute_paths().is_ok());
    }

    #[test]
    fn test_paths_are_deterministic() {
        let g = graph(
            vec![vec![], vec![], vec![1, 0], vec![2, 0]],
            vec![false, false, false, true],
        );
        let first = g.compute_paths().unwrap();
        let second = g.compute_paths().unwrap();
        assert_eq!(first, second);
        assert_eq!(first[3], vec![1, 0, 2]);
    }
}
