//! Signal connection types.

use core::fmt;

use super::node::ProcessorId;

/// One port of one processor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Processor owning the port.
    pub processor: ProcessorId,
    /// Inlet or outlet index, depending on which side of a connection it is on.
    pub port: usize,
}

impl Endpoint {
    /// Creates an endpoint.
    pub const fn new(processor: ProcessorId, port: usize) -> Self {
        Self { processor, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.processor, self.port)
    }
}

/// A signal edge from an outlet to an inlet.
///
/// Fan-in and fan-out are both legal; an inlet with several sources sees their sum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Source outlet.
    pub src: Endpoint,
    /// Destination inlet.
    pub dst: Endpoint,
}

impl Connection {
    /// Creates a connection from `src_outlet` of `src` to `dst_inlet` of `dst`.
    pub const fn new(src: ProcessorId, src_outlet: usize, dst: ProcessorId, dst_inlet: usize) -> Self {
        Self {
            src: Endpoint::new(src, src_outlet),
            dst: Endpoint::new(dst, dst_inlet),
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.src, self.dst)
    }
}
