//! Annotator execution ordering.
//!
//! The orderer sees one node per annotator stage, each with its capability
//! contract, and returns a permutation of the declaration indices. Only
//! annotators pass through here: the reader is definitionally the source of
//! all initial capabilities, and consumers are sinks whose relative order
//! never affects correctness.

use std::collections::BTreeSet;

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use petgraph::Direction;
use thiserror::Error;

use super::Capability;
use crate::registry::OrdererFactory;

/// One annotator as the orderer sees it.
#[derive(Debug, Clone)]
pub struct StageNode {
    /// Declared class name, used in diagnostics.
    pub name: String,
    pub capability: Capability,
}

#[derive(Debug, Error)]
pub enum OrderError {
    /// The capability graph contains a cycle; assembly must abort.
    #[error("Cyclic capability dependency between stages: {}", .stages.join(", "))]
    Cycle { stages: Vec<String> },

    /// Any other ordering failure; the assembler downgrades to declared
    /// order.
    #[error("Ordering failed: {0}")]
    Failed(String),
}

/// Computes an execution order for annotator stages. Implementations are
/// pluggable through the component registry (role `orderer`).
pub trait Orderer: Send + Sync {
    /// Returns the declaration indices of `stages` in execution order.
    fn order(&self, stages: &[StageNode]) -> Result<Vec<usize>, OrderError>;
}

/// Default orderer: topological sort of the capability dependency graph.
///
/// Edge X → Y whenever Y requires a tag X produces. A requirement with no
/// producer creates no edge — that is allowed, the stage simply sees no
/// such annotations. A stage requiring a tag it also produces creates no
/// self-edge. Nodes unordered relative to each other keep declaration
/// order, so the result is deterministic for a fixed spec.
pub struct CapabilityOrderer;

impl Orderer for CapabilityOrderer {
    fn order(&self, stages: &[StageNode]) -> Result<Vec<usize>, OrderError> {
        let mut graph = DiGraph::<usize, ()>::with_capacity(stages.len(), 0);
        let nodes: Vec<_> = (0..stages.len()).map(|i| graph.add_node(i)).collect();

        for (i, producer) in stages.iter().enumerate() {
            for (j, consumer) in stages.iter().enumerate() {
                if i != j && consumer.capability.requires_any_of(producer.capability.produces()) {
                    graph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }

        let mut indegree: Vec<usize> = nodes
            .iter()
            .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        let mut ready: BTreeSet<usize> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(stages.len());
        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            order.push(next);
            for succ in graph.neighbors_directed(nodes[next], Direction::Outgoing) {
                let j = graph[succ];
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        if order.len() < stages.len() {
            let mut members: Vec<usize> = tarjan_scc(&graph)
                .into_iter()
                .filter(|scc| scc.len() > 1)
                .flatten()
                .map(|n| graph[n])
                .collect();
            members.sort_unstable();
            return Err(OrderError::Cycle {
                stages: members.into_iter().map(|i| stages[i].name.clone()).collect(),
            });
        }

        Ok(order)
    }
}

/// Fallback orderer: stages run in declared configuration order.
pub struct DeclaredOrderer;

impl Orderer for DeclaredOrderer {
    fn order(&self, stages: &[StageNode]) -> Result<Vec<usize>, OrderError> {
        Ok((0..stages.len()).collect())
    }
}

pub struct CapabilityOrdererFactory;

impl OrdererFactory for CapabilityOrdererFactory {
    fn create(&self) -> Box<dyn Orderer> {
        Box::new(CapabilityOrderer)
    }
}

pub struct DeclaredOrdererFactory;

impl OrdererFactory for DeclaredOrdererFactory {
    fn create(&self) -> Box<dyn Orderer> {
        Box::new(DeclaredOrderer)
    }
}
