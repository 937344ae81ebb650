//! Simple scheduler: single-threaded, round-driven.
//!
//! Walks the blocks in topological order (sources first) and calls `work`
//! on each until a full round makes no progress, then winds every running
//! block down through the requested-stop handshake. Suitable for tests,
//! tools, and offline processing; a parallel scheduler can reuse the same
//! [`DynBlock`] surface.
//!
//! [`DynBlock`]: crate::handle::DynBlock

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::error::{FlowError, Result};
use crate::graph::Graph;
use crate::handle::BlockId;
use crate::lifecycle::LifecycleState;
use crate::block::WorkStatus;

pub struct SimpleScheduler {
    work_budget: usize,
}

impl Default for SimpleScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleScheduler {
    pub fn new() -> Self {
        Self {
            work_budget: usize::MAX,
        }
    }

    /// Cap the per-call work request handed to each block.
    pub fn with_work_budget(work_budget: usize) -> Self {
        Self { work_budget }
    }

    /// Drive the graph until it drains.
    ///
    /// Materialises any pending connections first, brings every initialised
    /// block to `Running`, then loops work rounds until none of the blocks
    /// makes progress. Finishes by stopping all running blocks.
    pub fn run(&self, graph: &mut Graph) -> Result<()> {
        if graph.pending_connections() > 0 && !graph.perform_connections() {
            return Err(FlowError::Graph(
                "pending connections failed to materialise".into(),
            ));
        }

        let order = execution_order(graph);

        for block in graph.blocks_mut() {
            if block.state() == LifecycleState::Initialised {
                block.change_state(LifecycleState::Running)?;
            }
        }

        let mut rounds = 0u64;
        loop {
            let mut progressed = false;
            for &index in &order {
                let block = &mut graph.blocks_mut()[index];
                block.process_scheduled_messages();
                if block.state() != LifecycleState::Running {
                    continue;
                }
                let result = block.work(self.work_budget);
                if result.status == WorkStatus::Error {
                    tracing::warn!(block = %block.unique_name(), "work reported an error");
                    let _ = block.change_state(LifecycleState::Error);
                }
                if result.made_progress() {
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
            graph.progress().advance();
            rounds += 1;
        }
        tracing::debug!(rounds, "graph drained");

        for block in graph.blocks_mut() {
            if block.state() == LifecycleState::Running {
                block.change_state(LifecycleState::RequestedStop)?;
                block.change_state(LifecycleState::Stopped)?;
            }
        }
        Ok(())
    }
}

/// Topological execution order over the current edges; insertion order when
/// the topology has a cycle.
fn execution_order(graph: &Graph) -> Vec<usize> {
    let mut dag = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..graph.blocks().len()).map(|i| dag.add_node(i)).collect();
    let position: HashMap<BlockId, usize> = graph
        .blocks()
        .iter()
        .enumerate()
        .map(|(i, b)| (b.raw(), i))
        .collect();
    for edge in graph.edges() {
        if let (Some(&s), Some(&d)) = (
            position.get(&edge.source()),
            position.get(&edge.destination()),
        ) {
            dag.add_edge(nodes[s], nodes[d], ());
        }
    }
    match toposort(&dag, None) {
        Ok(sorted) => sorted.into_iter().map(|n| dag[n]).collect(),
        Err(_) => {
            tracing::warn!("graph contains a cycle, falling back to insertion order");
            (0..graph.blocks().len()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{CollectSink, CountingSource, Passthrough};
    use crate::pointwise::PointwiseBlock;
    use crate::properties::{property, SettingsMap};

    #[test]
    fn test_blocks_registered_in_reverse_still_drain() {
        let mut graph = Graph::new();
        // sink first, source last: only the topological order drains this
        // in one scheduler round per hop
        let sink = graph
            .emplace_block::<CollectSink<u32>>(SettingsMap::new())
            .unwrap();
        let passthrough = graph
            .emplace_block::<PointwiseBlock<Passthrough<u32>>>(SettingsMap::new())
            .unwrap();
        let source = graph
            .emplace_block::<CountingSource>(property("count", 32))
            .unwrap();

        assert!(graph.connect::<0, _>(source).to::<0, _>(passthrough).is_success());
        assert!(graph.connect::<0, _>(passthrough).to::<0, _>(sink).is_success());

        SimpleScheduler::new().run(&mut graph).unwrap();
        assert_eq!(graph.block(sink).unwrap().samples().len(), 32);
    }

    #[test]
    fn test_blocks_are_stopped_after_run() {
        let mut graph = Graph::new();
        let source = graph
            .emplace_block::<CountingSource>(property("count", 4))
            .unwrap();
        let sink = graph
            .emplace_block::<CollectSink<u32>>(SettingsMap::new())
            .unwrap();
        assert!(graph.connect::<0, _>(source).to::<0, _>(sink).is_success());

        SimpleScheduler::new().run(&mut graph).unwrap();
        graph.for_each_block(|block| {
            assert_eq!(block.state(), LifecycleState::Stopped);
        });
    }

    #[test]
    fn test_unmaterialisable_pending_connection_fails_run() {
        let mut graph = Graph::new();
        let a = graph
            .emplace_block::<PointwiseBlock<Passthrough<u32>>>(SettingsMap::new())
            .unwrap();
        let b = graph
            .emplace_block::<PointwiseBlock<Passthrough<u32>>>(SettingsMap::new())
            .unwrap();
        assert!(graph.connect_name(a, "bogus").to_name(b, "in").is_success());
        assert!(SimpleScheduler::new().run(&mut graph).is_err());
    }
}
