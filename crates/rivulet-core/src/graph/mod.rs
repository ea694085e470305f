//! Dataflow graph of processors.
//!
//! The graph is owned by the render thread. The control side never touches it:
//! it stages requests which the engine applies here during its once-per-block
//! drain, so the topology only ever changes between blocks.
//!
//! # Scheduling
//!
//! Execution order is derived from depths (see [`schedule`]): generators sit at
//! depth 0, everything else one past its deepest source. Generators inside a
//! feedback loop read their sources' previous block, which is what makes
//! feedback through a generator legal. A loop with no generator in it cannot be
//! scheduled.
//!
//! # Fan-in
//!
//! Before a processor runs, each inlet is zeroed and every connected source
//! outlet is summed into it.

pub mod edge;
pub mod node;
mod processing;
pub mod schedule;

pub use edge::{Connection, Endpoint};
pub use node::{ProcessorId, ProcessorNode};
pub use processing::Graph;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::{ProcessorError, SchedulingError};
    use crate::param::ParamMap;
    use crate::processor::{CreateArgs, GeneratorKind, Io, ProcessContext, Processor, ProcessorType};
    use crate::registry::TypeRegistry;
    use crate::settings::SchedulePolicy;

    struct Nop;

    impl Processor for Nop {
        fn process(&mut self, _io: &mut Io<'_>, _ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn nop(_: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        Ok(Box::new(Nop))
    }

    fn graph() -> Graph {
        Graph::new(16, SchedulePolicy::Silence, Arc::new(TypeRegistry::new()))
    }

    fn add(graph: &mut Graph, index: u32, kind: GeneratorKind, inlets: usize, outlets: usize) -> ProcessorId {
        let ty = Arc::new(ProcessorType::new("t~", kind, nop).with_ports(inlets, outlets));
        let id = ProcessorId::new(index, 0);
        let node = ProcessorNode::new(
            id,
            ty,
            ParamMap::default(),
            Box::new(Nop),
            (inlets, outlets),
            4,
            4,
        );
        graph.insert(Box::new(node)).unwrap();
        id
    }

    fn wire(graph: &mut Graph, src: ProcessorId, dst: ProcessorId, inlet: usize) {
        assert!(graph.connect(Connection::new(src, 0, dst, inlet)).unwrap());
    }

    #[test]
    fn generators_at_depth_zero_others_one_past_sources() {
        let mut g = graph();
        let a = add(&mut g, 0, GeneratorKind::Always, 0, 1);
        let b = add(&mut g, 1, GeneratorKind::Always, 0, 1);
        let plus = add(&mut g, 2, GeneratorKind::Never, 2, 1);
        let out = add(&mut g, 3, GeneratorKind::Never, 1, 0);
        wire(&mut g, plus, out, 0);
        wire(&mut g, a, plus, 0);
        wire(&mut g, b, plus, 1);

        g.schedule().unwrap();
        assert_eq!(g.depth(a), Some(0));
        assert_eq!(g.depth(b), Some(0));
        assert_eq!(g.depth(plus), Some(1));
        assert_eq!(g.depth(out), Some(2));
        assert_eq!(g.order(), &[a, b, plus, out]);
    }

    #[test]
    fn unconnected_never_node_gets_depth_zero() {
        let mut g = graph();
        let n = add(&mut g, 0, GeneratorKind::Never, 1, 1);
        g.schedule().unwrap();
        assert_eq!(g.depth(n), Some(0));
    }

    #[test]
    fn feedback_without_generator_fails_and_keeps_old_depths() {
        let mut g = graph();
        let x = add(&mut g, 0, GeneratorKind::Never, 1, 1);
        let y = add(&mut g, 1, GeneratorKind::Never, 1, 1);
        wire(&mut g, x, y, 0);
        g.schedule().unwrap();
        assert_eq!(g.depth(y), Some(1));

        wire(&mut g, y, x, 0);
        assert_eq!(g.schedule(), Err(SchedulingError::Cycle { unscheduled: 2 }));
        assert_eq!(g.depth(x), Some(0));
        assert_eq!(g.depth(y), Some(1));
        assert!(!g.needs_reschedule());
    }

    #[test]
    fn feedback_through_generator_schedules() {
        let mut g = graph();
        let gen_node = add(&mut g, 0, GeneratorKind::Always, 1, 1);
        let x = add(&mut g, 1, GeneratorKind::Never, 1, 1);
        wire(&mut g, gen_node, x, 0);
        wire(&mut g, x, gen_node, 0);
        g.schedule().unwrap();
        assert_eq!(g.depth(gen_node), Some(0));
        assert_eq!(g.depth(x), Some(1));
    }

    #[test]
    fn conditional_reevaluated_each_pass() {
        let mut g = graph();
        let src = add(&mut g, 0, GeneratorKind::Always, 0, 1);
        let cond = add(&mut g, 1, GeneratorKind::Conditional, 1, 1);
        g.schedule().unwrap();
        assert_eq!(g.depth(cond), Some(0));

        wire(&mut g, src, cond, 0);
        g.schedule().unwrap();
        assert_eq!(g.depth(cond), Some(1));

        assert!(g.disconnect(Connection::new(src, 0, cond, 0)).unwrap());
        g.schedule().unwrap();
        assert_eq!(g.depth(cond), Some(0));
    }

    #[test]
    fn equal_depths_keep_creation_order() {
        let mut g = graph();
        let ids: Vec<_> = (0..5)
            .map(|i| add(&mut g, i, GeneratorKind::Always, 0, 1))
            .collect();
        g.schedule().unwrap();
        assert_eq!(g.order(), ids.as_slice());
    }

    #[test]
    fn connect_is_symmetric_and_deduplicated() {
        let mut g = graph();
        let a = add(&mut g, 0, GeneratorKind::Always, 0, 1);
        let b = add(&mut g, 1, GeneratorKind::Never, 1, 1);
        assert!(g.connect(Connection::new(a, 0, b, 0)).unwrap());
        assert!(!g.connect(Connection::new(a, 0, b, 0)).unwrap());
        assert_eq!(g.inlet_connections(b, 0).unwrap(), &[Endpoint::new(a, 0)]);
        assert_eq!(g.outlet_connections(a, 0).unwrap(), &[Endpoint::new(b, 0)]);
    }

    #[test]
    fn connect_then_disconnect_leaves_edge_absent() {
        let mut g = graph();
        let a = add(&mut g, 0, GeneratorKind::Always, 0, 1);
        let b = add(&mut g, 1, GeneratorKind::Never, 1, 1);
        let conn = Connection::new(a, 0, b, 0);
        g.connect(conn).unwrap();
        assert!(g.disconnect(conn).unwrap());
        assert!(!g.disconnect(conn).unwrap());
        assert!(g.inlet_connections(b, 0).unwrap().is_empty());
        assert!(g.outlet_connections(a, 0).unwrap().is_empty());
    }

    #[test]
    fn remove_clears_both_sides() {
        let mut g = graph();
        let a = add(&mut g, 0, GeneratorKind::Always, 0, 1);
        let b = add(&mut g, 1, GeneratorKind::Never, 1, 1);
        let c = add(&mut g, 2, GeneratorKind::Never, 1, 0);
        wire(&mut g, a, b, 0);
        wire(&mut g, b, c, 0);
        wire(&mut g, a, c, 0);

        let node = g.remove(b).unwrap();
        assert_eq!(node.id(), b);
        assert!(!g.contains(b));
        assert_eq!(g.outlet_connections(a, 0).unwrap(), &[Endpoint::new(c, 0)]);
        assert_eq!(g.inlet_connections(c, 0).unwrap(), &[Endpoint::new(a, 0)]);
        assert_eq!(g.order(), &[a, c]);
    }

    #[test]
    fn invalid_ports_and_stale_ids_rejected() {
        let mut g = graph();
        let a = add(&mut g, 0, GeneratorKind::Always, 0, 1);
        let b = add(&mut g, 1, GeneratorKind::Never, 1, 1);
        assert!(matches!(
            g.connect(Connection::new(a, 1, b, 0)),
            Err(crate::error::GraphError::InvalidOutlet { port: 1, .. })
        ));
        assert!(matches!(
            g.connect(Connection::new(a, 0, b, 3)),
            Err(crate::error::GraphError::InvalidInlet { port: 3, .. })
        ));
        let stale = ProcessorId::new(0, 7);
        assert!(!g.contains(stale));
        assert!(g.remove(stale).is_err());
    }

    #[test]
    fn occupied_slot_hands_node_back() {
        let mut g = graph();
        add(&mut g, 0, GeneratorKind::Always, 0, 1);
        let ty = Arc::new(ProcessorType::new("t~", GeneratorKind::Always, nop));
        let node = ProcessorNode::new(
            ProcessorId::new(0, 1),
            ty,
            ParamMap::default(),
            Box::new(Nop),
            (0, 1),
            4,
            4,
        );
        let (_, node) = g.insert(Box::new(node)).unwrap_err();
        assert_eq!(node.id(), ProcessorId::new(0, 1));
    }
}
