//! The flow graph: block ownership, edges, and the two-phase connection
//! protocol.
//!
//! Static connects are recorded while the caller still holds typed block
//! references, so element types are checked at compile time; buffer
//! allocation is deferred until [`Graph::perform_connections`], when the
//! whole topology is declared. The dynamic connect path resolves ports
//! through the type-erased lists at call time and falls back to runtime
//! checks, reporting failures as [`ConnectionResult`] variants.

use std::sync::Arc;

use crate::block::{Block, InputPortAt, OutputPortAt, ProgressSequence};
use crate::buffer::DEFAULT_MIN_BUFFER_SIZE;
use crate::error::Result;
use crate::handle::{BlockAdapter, BlockId, BlockRef, DynBlock};
use crate::port::{ConnectionResult, DynamicPort, PortAccessError, PortDirection, PortIndex};
use crate::properties::SettingsMap;
use crate::thread_pool::IoThreadPool;

const DEFAULT_EDGE_NAME: &str = "unnamed edge";

/// Value record of one accepted connection. Immutable after creation;
/// equality is by the endpoint quadruple.
#[derive(Debug, Clone)]
pub struct Edge {
    source: BlockId,
    source_port: PortIndex,
    destination: BlockId,
    destination_port: PortIndex,
    min_buffer_size: usize,
    weight: i32,
    name: String,
    connected: bool,
}

impl Edge {
    pub fn source(&self) -> BlockId {
        self.source
    }

    pub fn source_port(&self) -> PortIndex {
        self.source_port
    }

    pub fn destination(&self) -> BlockId {
        self.destination
    }

    pub fn destination_port(&self) -> PortIndex {
        self.destination_port
    }

    pub fn min_buffer_size(&self) -> usize {
        self.min_buffer_size
    }

    pub fn weight(&self) -> i32 {
        self.weight
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.source_port == other.source_port
            && self.destination == other.destination
            && self.destination_port == other.destination_port
    }
}

impl Eq for Edge {}

/// Port addressing carried by a pending connection. Name selections stay
/// unresolved until materialisation, when the dynamic port lists exist.
#[derive(Debug, Clone)]
enum PortSel {
    Index(PortIndex),
    Name(String, Option<usize>),
    Message,
}

#[derive(Debug)]
struct PendingConnection {
    source: BlockId,
    source_port: PortSel,
    destination: BlockId,
    destination_port: PortSel,
    min_buffer_size: usize,
    weight: i32,
    name: String,
}

/// Container owning blocks and edges.
///
/// Blocks are heap-pinned on registration and live as long as the graph;
/// edges refer to them by address identity. Topology mutation requires
/// exclusive access; a running graph is only read.
pub struct Graph {
    progress: Arc<ProgressSequence>,
    io_pool: Arc<IoThreadPool>,
    blocks: Vec<Box<dyn DynBlock>>,
    edges: Vec<Edge>,
    pending: Vec<PendingConnection>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            progress: Arc::new(ProgressSequence::new()),
            io_pool: IoThreadPool::new("graph-io", 2),
            blocks: Vec::new(),
            edges: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn progress(&self) -> &Arc<ProgressSequence> {
        &self.progress
    }

    pub fn io_pool(&self) -> &Arc<IoThreadPool> {
        &self.io_pool
    }

    /// Register a pre-built handle; the graph takes ownership and
    /// initialises it with the shared progress sequence and IO pool.
    pub fn add_block(&mut self, mut block: Box<dyn DynBlock>) -> BlockId {
        block.init(Arc::clone(&self.progress), Arc::clone(&self.io_pool));
        let id = block.raw();
        tracing::debug!(block = %block.unique_name(), "registered block");
        self.blocks.push(block);
        id
    }

    /// Wrap a concrete block and register it, returning a typed reference
    /// usable in static connects.
    pub fn insert_block<T: Block>(&mut self, block: T) -> BlockRef<T> {
        let adapter = Box::new(BlockAdapter::new(block));
        let id = self.add_block(adapter);
        BlockRef::new(id)
    }

    /// Construct a block from its settings map and register it. Recognised
    /// settings are applied by the block constructor, before `init`.
    pub fn emplace_block<T: Block>(&mut self, settings: SettingsMap) -> Result<BlockRef<T>> {
        Ok(self.insert_block(T::from_settings(settings)?))
    }

    pub(crate) fn index_of(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.raw() == id)
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.index_of(id).is_some()
    }

    /// Typed view of a registered block.
    pub fn block<T: Block>(&self, reference: BlockRef<T>) -> Option<&T> {
        let index = self.index_of(reference.id())?;
        self.blocks[index]
            .as_any()
            .downcast_ref::<BlockAdapter<T>>()
            .map(BlockAdapter::block)
    }

    pub fn block_mut<T: Block>(&mut self, reference: BlockRef<T>) -> Option<&mut T> {
        let index = self.index_of(reference.id())?;
        self.blocks[index]
            .as_any_mut()
            .downcast_mut::<BlockAdapter<T>>()
            .map(BlockAdapter::block_mut)
    }

    /// Handle of a registered block, by identity.
    pub fn handle(&self, id: BlockId) -> Option<&dyn DynBlock> {
        self.index_of(id).map(|i| self.blocks[i].as_ref())
    }

    pub fn handle_mut(&mut self, id: BlockId) -> Option<&mut (dyn DynBlock + 'static)> {
        let index = self.index_of(id)?;
        Some(self.blocks[index].as_mut())
    }

    pub fn blocks(&self) -> &[Box<dyn DynBlock>] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Box<dyn DynBlock>] {
        &mut self.blocks
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn for_each_block(&self, mut f: impl FnMut(&dyn DynBlock)) {
        for block in &self.blocks {
            f(block.as_ref());
        }
    }

    pub fn for_each_edge(&self, mut f: impl FnMut(&Edge)) {
        for edge in &self.edges {
            f(edge);
        }
    }

    pub fn pending_connections(&self) -> usize {
        self.pending.len()
    }

    /// Begin a static connect from output port `OUT` of `source`. The
    /// element type is carried into `to`, where it must match the
    /// destination port.
    pub fn connect<const OUT: usize, S>(&mut self, source: BlockRef<S>) -> SourceConnector<'_, S, OUT>
    where
        S: Block + OutputPortAt<OUT>,
    {
        SourceConnector {
            graph: self,
            source,
            sub_index: None,
        }
    }

    /// Static connect from one element of the port collection at `OUT`.
    pub fn connect_sub<const OUT: usize, S>(
        &mut self,
        source: BlockRef<S>,
        sub_index: usize,
    ) -> SourceConnector<'_, S, OUT>
    where
        S: Block + OutputPortAt<OUT>,
    {
        SourceConnector {
            graph: self,
            source,
            sub_index: Some(sub_index),
        }
    }

    /// Begin a deferred connect addressed by declared port name. The name
    /// resolves when the intent materialises.
    pub fn connect_name<S: Block>(
        &mut self,
        source: BlockRef<S>,
        port_name: &str,
    ) -> NamedSourceConnector<'_> {
        NamedSourceConnector {
            graph: self,
            source: source.id(),
            port_name: port_name.to_string(),
            sub_index: None,
        }
    }

    pub fn connect_name_sub<S: Block>(
        &mut self,
        source: BlockRef<S>,
        port_name: &str,
        sub_index: usize,
    ) -> NamedSourceConnector<'_> {
        NamedSourceConnector {
            graph: self,
            source: source.id(),
            port_name: port_name.to_string(),
            sub_index: Some(sub_index),
        }
    }

    /// Begin a deferred connect from `source`'s message output.
    pub fn connect_message<S: Block>(&mut self, source: BlockRef<S>) -> MessageSourceConnector<'_> {
        MessageSourceConnector {
            graph: self,
            source: source.id(),
        }
    }

    /// Runtime connect through the dynamic port lists, with default buffer
    /// request, weight, and edge name.
    pub fn connect_dynamic(
        &mut self,
        source: BlockId,
        source_port: impl Into<PortIndex>,
        destination: BlockId,
        destination_port: impl Into<PortIndex>,
    ) -> ConnectionResult {
        self.connect_dynamic_with(
            source,
            source_port,
            destination,
            destination_port,
            DEFAULT_MIN_BUFFER_SIZE,
            0,
            DEFAULT_EDGE_NAME,
        )
    }

    /// Runtime connect through the dynamic port lists. On success an
    /// [`Edge`] is appended; on failure the graph is left exactly as it
    /// was.
    pub fn connect_dynamic_with(
        &mut self,
        source: BlockId,
        source_port: impl Into<PortIndex>,
        destination: BlockId,
        destination_port: impl Into<PortIndex>,
        min_buffer_size: usize,
        weight: i32,
        edge_name: &str,
    ) -> ConnectionResult {
        let source_port = source_port.into();
        let destination_port = destination_port.into();

        let (Some(source_index), Some(destination_index)) =
            (self.index_of(source), self.index_of(destination))
        else {
            tracing::warn!("connect endpoints must be registered in this graph first");
            return ConnectionResult::Failed;
        };

        let source_view = match self.port_view(source_index, PortDirection::Output, source_port) {
            Ok(view) => view,
            Err(err) => {
                tracing::warn!(%err, "source port resolution failed");
                return err.into();
            }
        };
        let destination_view =
            match self.port_view(destination_index, PortDirection::Input, destination_port) {
                Ok(view) => view,
                Err(err) => {
                    tracing::warn!(%err, "destination port resolution failed");
                    return err.into();
                }
            };

        let result = source_view.connect(&destination_view);
        if result.is_success() {
            tracing::debug!(
                source = %self.blocks[source_index].unique_name(),
                source_port = %source_port,
                destination = %self.blocks[destination_index].unique_name(),
                destination_port = %destination_port,
                "connected"
            );
            self.edges.push(Edge {
                source,
                source_port,
                destination,
                destination_port,
                min_buffer_size,
                weight,
                name: edge_name.to_string(),
                connected: true,
            });
        }
        result
    }

    /// Runtime connect addressed by declared port names.
    pub fn connect_by_name(
        &mut self,
        source: BlockId,
        source_port: &str,
        destination: BlockId,
        destination_port: &str,
    ) -> ConnectionResult {
        self.connect_by_name_with(
            source,
            source_port,
            None,
            destination,
            destination_port,
            None,
            DEFAULT_MIN_BUFFER_SIZE,
            0,
            DEFAULT_EDGE_NAME,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn connect_by_name_with(
        &mut self,
        source: BlockId,
        source_port: &str,
        source_sub: Option<usize>,
        destination: BlockId,
        destination_port: &str,
        destination_sub: Option<usize>,
        min_buffer_size: usize,
        weight: i32,
        edge_name: &str,
    ) -> ConnectionResult {
        let (Some(source_index), Some(destination_index)) =
            (self.index_of(source), self.index_of(destination))
        else {
            tracing::warn!("connect endpoints must be registered in this graph first");
            return ConnectionResult::Failed;
        };
        let source_top = match self.blocks[source_index].dynamic_output_port_index(source_port) {
            Ok(index) => index,
            Err(err) => return err.into(),
        };
        let destination_top =
            match self.blocks[destination_index].dynamic_input_port_index(destination_port) {
                Ok(index) => index,
                Err(err) => return err.into(),
            };
        self.connect_dynamic_with(
            source,
            PortIndex {
                top_level: source_top,
                sub_index: source_sub,
            },
            destination,
            PortIndex {
                top_level: destination_top,
                sub_index: destination_sub,
            },
            min_buffer_size,
            weight,
            edge_name,
        )
    }

    /// Materialise every recorded intent. Returns `true` and clears the
    /// list when all of them connect; otherwise the list is kept intact so
    /// the caller can inspect and retry.
    pub fn perform_connections(&mut self) -> bool {
        let pending = std::mem::take(&mut self.pending);
        let mut all_ok = true;
        for intent in &pending {
            let result = self.materialise(intent);
            if !result.is_success() {
                tracing::warn!(%result, edge = %intent.name, "pending connection failed");
                all_ok = false;
            }
        }
        if all_ok {
            true
        } else {
            self.pending = pending;
            false
        }
    }

    fn materialise(&mut self, intent: &PendingConnection) -> ConnectionResult {
        let source_port =
            match self.resolve_port_sel(intent.source, PortDirection::Output, &intent.source_port) {
                Ok(index) => index,
                Err(result) => return result,
            };
        let destination_port = match self.resolve_port_sel(
            intent.destination,
            PortDirection::Input,
            &intent.destination_port,
        ) {
            Ok(index) => index,
            Err(result) => return result,
        };
        self.connect_dynamic_with(
            intent.source,
            source_port,
            intent.destination,
            destination_port,
            intent.min_buffer_size,
            intent.weight,
            &intent.name,
        )
    }

    fn resolve_port_sel(
        &mut self,
        block: BlockId,
        direction: PortDirection,
        sel: &PortSel,
    ) -> std::result::Result<PortIndex, ConnectionResult> {
        match sel {
            PortSel::Index(index) => Ok(*index),
            PortSel::Message => Ok(PortIndex::MESSAGE),
            PortSel::Name(name, sub_index) => {
                let Some(index) = self.index_of(block) else {
                    return Err(ConnectionResult::Failed);
                };
                let handle = &mut self.blocks[index];
                let top_level = match direction {
                    PortDirection::Output => handle.dynamic_output_port_index(name),
                    PortDirection::Input => handle.dynamic_input_port_index(name),
                };
                match top_level {
                    Ok(top_level) => Ok(PortIndex {
                        top_level,
                        sub_index: *sub_index,
                    }),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    fn port_view(
        &mut self,
        block_index: usize,
        direction: PortDirection,
        index: PortIndex,
    ) -> std::result::Result<DynamicPort, PortAccessError> {
        let handle = &mut self.blocks[block_index];
        if index.is_message() {
            return Ok(match direction {
                PortDirection::Output => handle.message_output(),
                PortDirection::Input => handle.message_input(),
            });
        }
        let port = match direction {
            PortDirection::Output => handle.dynamic_output_port(index.top_level, index.sub_index)?,
            PortDirection::Input => handle.dynamic_input_port(index.top_level, index.sub_index)?,
        };
        Ok(port.clone())
    }

    fn record_intent(
        &mut self,
        source: BlockId,
        source_port: PortSel,
        destination: BlockId,
        destination_port: PortSel,
    ) -> ConnectionResult {
        if !self.contains(source) || !self.contains(destination) {
            tracing::warn!("connect endpoints must be registered in this graph first");
            return ConnectionResult::Failed;
        }
        self.pending.push(PendingConnection {
            source,
            source_port,
            destination,
            destination_port,
            min_buffer_size: DEFAULT_MIN_BUFFER_SIZE,
            weight: 0,
            name: DEFAULT_EDGE_NAME.to_string(),
        });
        ConnectionResult::Success
    }
}

/// Holds the graph, the source block, and the selected output port between
/// the two halves of a static connect.
pub struct SourceConnector<'g, S, const OUT: usize> {
    graph: &'g mut Graph,
    source: BlockRef<S>,
    sub_index: Option<usize>,
}

impl<'g, S, const OUT: usize> SourceConnector<'g, S, OUT>
where
    S: Block + OutputPortAt<OUT>,
{
    /// Record the intent to connect to input port `IN` of `destination`.
    /// The destination's element type must equal the source's.
    pub fn to<const IN: usize, D>(self, destination: BlockRef<D>) -> ConnectionResult
    where
        D: Block + InputPortAt<IN, Element = S::Element>,
    {
        let source_port = PortSel::Index(PortIndex {
            top_level: OUT,
            sub_index: self.sub_index,
        });
        self.graph.record_intent(
            self.source.id(),
            source_port,
            destination.id(),
            PortSel::Index(PortIndex::scalar(IN)),
        )
    }

    /// As [`Self::to`], addressing one element of the destination's port
    /// collection at `IN`.
    pub fn to_sub<const IN: usize, D>(
        self,
        destination: BlockRef<D>,
        sub_index: usize,
    ) -> ConnectionResult
    where
        D: Block + InputPortAt<IN, Element = S::Element>,
    {
        let source_port = PortSel::Index(PortIndex {
            top_level: OUT,
            sub_index: self.sub_index,
        });
        self.graph.record_intent(
            self.source.id(),
            source_port,
            destination.id(),
            PortSel::Index(PortIndex::sub(IN, sub_index)),
        )
    }
}

/// Name-addressed counterpart of [`SourceConnector`]; resolution happens at
/// materialisation time.
pub struct NamedSourceConnector<'g> {
    graph: &'g mut Graph,
    source: BlockId,
    port_name: String,
    sub_index: Option<usize>,
}

impl<'g> NamedSourceConnector<'g> {
    pub fn to_name<D: Block>(self, destination: BlockRef<D>, port_name: &str) -> ConnectionResult {
        let source_port = PortSel::Name(self.port_name, self.sub_index);
        self.graph.record_intent(
            self.source,
            source_port,
            destination.id(),
            PortSel::Name(port_name.to_string(), None),
        )
    }

    pub fn to_name_sub<D: Block>(
        self,
        destination: BlockRef<D>,
        port_name: &str,
        sub_index: usize,
    ) -> ConnectionResult {
        let source_port = PortSel::Name(self.port_name, self.sub_index);
        self.graph.record_intent(
            self.source,
            source_port,
            destination.id(),
            PortSel::Name(port_name.to_string(), Some(sub_index)),
        )
    }
}

/// Message-port counterpart of [`SourceConnector`]; both ends use the
/// message sentinel index.
pub struct MessageSourceConnector<'g> {
    graph: &'g mut Graph,
    source: BlockId,
}

impl<'g> MessageSourceConnector<'g> {
    pub fn to_message<D: Block>(self, destination: BlockRef<D>) -> ConnectionResult {
        self.graph
            .record_intent(self.source, PortSel::Message, destination.id(), PortSel::Message)
    }
}
