//! Depth scheduling by iterative relaxation.
//!
//! A processor's depth is 0 if it is a generator (or has no sources), otherwise
//! `1 + max(depth of every source)`. Depths are found by sweeping the
//! unscheduled processors repeatedly, assigning a depth to each one whose
//! sources all have one. A sweep that assigns nothing means the rest sit on a
//! feedback cycle with no generator to break it.
//!
//! Depths are computed into `pending_depth` and committed only when every
//! processor got one, so a failed pass leaves the last good schedule intact.
//! On success the execution order is stably sorted by depth in place.

use crate::error::SchedulingError;
use crate::processor::GeneratorKind;

use super::node::ProcessorNode;
use super::processing::Graph;

impl Graph {
    /// Re-derives depths and execution order.
    ///
    /// Clears the reschedule flag whether or not scheduling succeeds; the flag
    /// is raised again by the next topology change.
    pub(crate) fn schedule(&mut self) -> Result<(), SchedulingError> {
        self.needs_reschedule = false;

        for id in &self.order {
            if let Some(node) = self.nodes[id.index()].as_deref_mut() {
                node.pending_depth = None;
            }
        }

        let mut remaining = self.order.len();
        while remaining > 0 {
            let mut assigned = 0;
            for k in 0..self.order.len() {
                let index = self.order[k].index();
                let depth = match self.nodes[index].as_deref() {
                    Some(node) if node.pending_depth.is_none() => self.relax(node),
                    _ => None,
                };
                if let Some(depth) = depth
                    && let Some(node) = self.nodes[index].as_deref_mut()
                {
                    node.pending_depth = Some(depth);
                    assigned += 1;
                }
            }
            if assigned == 0 {
                tracing::error!(unscheduled = remaining, "graph_schedule: feedback cycle");
                return Err(SchedulingError::Cycle {
                    unscheduled: remaining,
                });
            }
            remaining -= assigned;
        }

        for id in &self.order {
            if let Some(node) = self.nodes[id.index()].as_deref_mut() {
                node.depth = node.pending_depth;
            }
        }
        self.sort_order();

        tracing::debug!("graph_schedule: {} processors in depth order", self.order.len());
        Ok(())
    }

    /// Depth of `node` if all of its dependencies already have one.
    fn relax(&self, node: &ProcessorNode) -> Option<u32> {
        if node.effective_kind() == GeneratorKind::Always {
            return Some(0);
        }
        let mut depth = 0;
        for sources in &node.inlet_connections {
            for src in sources {
                let upstream = self.nodes[src.processor.index()].as_deref()?.pending_depth?;
                depth = depth.max(upstream + 1);
            }
        }
        Some(depth)
    }

    /// Stable insertion sort of the order by committed depth. Allocation-free.
    fn sort_order(&mut self) {
        let depth_at = |nodes: &[Option<Box<ProcessorNode>>], id: super::ProcessorId| {
            nodes[id.index()]
                .as_deref()
                .and_then(|n| n.depth)
                .unwrap_or(u32::MAX)
        };
        for i in 1..self.order.len() {
            let id = self.order[i];
            let depth = depth_at(&self.nodes, id);
            let mut j = i;
            while j > 0 && depth_at(&self.nodes, self.order[j - 1]) > depth {
                self.order[j] = self.order[j - 1];
                j -= 1;
            }
            self.order[j] = id;
        }
    }
}
