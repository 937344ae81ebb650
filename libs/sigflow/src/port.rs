//! Typed stream ports and their type-erased views.
//!
//! A port is a typed endpoint attached to one block. Stream output ports own
//! the producer cursor of exactly one ring buffer, stream input ports the
//! consumer cursor. [`DynamicPort`] is the non-owning, type-erased view the
//! graph uses for runtime topology manipulation; the element type travels
//! along as a [`TypeId`] token so mismatched connects are rejected with an
//! enumerated result instead of a panic.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::buffer::{self, Consumer, Producer, DEFAULT_MIN_BUFFER_SIZE, MESSAGE_BUFFER_SIZE};
use crate::properties::PropertyMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDomain {
    /// Bulk sample stream
    Stream,
    /// Rare, low-rate control messages
    Message,
}

/// Outcome of a connection attempt.
///
/// Topology failures are data, not panics; graph-editing code branches on
/// the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionResult {
    Success,
    Failed,
    PortTypeMismatch,
    DirectionMismatch,
    DomainMismatch,
    AlreadyConnected,
    PortNotFound,
    InvalidPortAddress,
}

impl ConnectionResult {
    pub fn is_success(self) -> bool {
        self == ConnectionResult::Success
    }
}

impl std::fmt::Display for ConnectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::PortTypeMismatch => "port type mismatch",
            Self::DirectionMismatch => "direction mismatch",
            Self::DomainMismatch => "domain mismatch",
            Self::AlreadyConnected => "already connected",
            Self::PortNotFound => "port not found",
            Self::InvalidPortAddress => "invalid port address",
        };
        f.write_str(s)
    }
}

/// Sentinel selecting a block's message port instead of a stream port.
///
/// Deliberately outside the dynamic port index space so it can never alias
/// a real top-level index.
pub const MESSAGE_PORT_INDEX: usize = usize::MAX;

/// Address of one port inside one direction on one block.
///
/// `sub_index` is absent for scalar ports and mandatory for elements of a
/// port collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortIndex {
    pub top_level: usize,
    pub sub_index: Option<usize>,
}

impl PortIndex {
    /// Address of the message port on either side of a connection.
    pub const MESSAGE: PortIndex = PortIndex {
        top_level: MESSAGE_PORT_INDEX,
        sub_index: None,
    };

    pub fn scalar(top_level: usize) -> Self {
        Self { top_level, sub_index: None }
    }

    pub fn sub(top_level: usize, sub_index: usize) -> Self {
        Self { top_level, sub_index: Some(sub_index) }
    }

    pub fn is_message(self) -> bool {
        self.top_level == MESSAGE_PORT_INDEX
    }
}

impl From<usize> for PortIndex {
    fn from(top_level: usize) -> Self {
        Self::scalar(top_level)
    }
}

impl From<(usize, usize)> for PortIndex {
    fn from((top_level, sub_index): (usize, usize)) -> Self {
        Self::sub(top_level, sub_index)
    }
}

impl std::fmt::Display for PortIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_message() {
            return f.write_str("msg");
        }
        match self.sub_index {
            Some(sub) => write!(f, "{}[{}]", self.top_level, sub),
            None => write!(f, "{}", self.top_level),
        }
    }
}

/// Malformed port addressing.
///
/// Distinct from [`ConnectionResult`]: these indicate a bug in the caller
/// (wrong index arithmetic, wrong cardinality assumption), not a topology
/// the user asked for and was denied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortAccessError {
    #[error("port index {0} out of range")]
    OutOfRange(usize),

    #[error("sub-index required to address the port collection at index {0}")]
    SubIndexRequired(usize),

    #[error("sub-index given for the scalar port at index {0}")]
    UnexpectedSubIndex(usize),

    #[error("sub-index {sub} out of range for the port collection at index {index}")]
    SubOutOfRange { index: usize, sub: usize },

    #[error("no port named {0:?}")]
    NotFound(String),
}

impl From<PortAccessError> for ConnectionResult {
    fn from(err: PortAccessError) -> Self {
        match err {
            PortAccessError::NotFound(_) => ConnectionResult::PortNotFound,
            _ => ConnectionResult::InvalidPortAddress,
        }
    }
}

/// Type-erased access to one side of a (possibly unbound) buffer binding.
pub(crate) trait Endpoint: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn is_bound(&self) -> bool;
    /// Readable samples for inputs, writable headroom for outputs. Zero
    /// while unbound.
    fn available(&self) -> usize;
}

pub(crate) struct OutputEndpoint<T> {
    producer: Mutex<Option<Producer<T>>>,
}

impl<T: Send + 'static> OutputEndpoint<T> {
    fn new() -> Self {
        Self { producer: Mutex::new(None) }
    }

    pub(crate) fn push(&self, value: T) -> Result<(), T> {
        match self.producer.lock().as_mut() {
            Some(producer) => producer.push(value).map_err(|err| match err {
                rtrb::PushError::Full(v) => v,
            }),
            None => Err(value),
        }
    }
}

impl<T: Send + 'static> Endpoint for OutputEndpoint<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_bound(&self) -> bool {
        self.producer.lock().is_some()
    }

    fn available(&self) -> usize {
        self.producer.lock().as_ref().map_or(0, |p| p.slots())
    }
}

pub(crate) struct InputEndpoint<T> {
    consumer: Mutex<Option<Consumer<T>>>,
}

impl<T: Send + 'static> InputEndpoint<T> {
    fn new() -> Self {
        Self { consumer: Mutex::new(None) }
    }

    pub(crate) fn pop(&self) -> Option<T> {
        self.consumer.lock().as_mut().and_then(|c| c.pop().ok())
    }
}

impl<T: Send + 'static> Endpoint for InputEndpoint<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_bound(&self) -> bool {
        self.consumer.lock().is_some()
    }

    fn available(&self) -> usize {
        self.consumer.lock().as_ref().map_or(0, |c| c.slots())
    }
}

/// Monomorphised binding step: allocate the ring and hand each side its
/// cursor. Runs after all metadata checks have passed.
fn bind_endpoints<T: Send + 'static>(
    source: &DynamicPort,
    destination: &DynamicPort,
    capacity: usize,
) -> ConnectionResult {
    let Some(output) = source.endpoint.as_any().downcast_ref::<OutputEndpoint<T>>() else {
        return ConnectionResult::Failed;
    };
    let Some(input) = destination.endpoint.as_any().downcast_ref::<InputEndpoint<T>>() else {
        return ConnectionResult::Failed;
    };

    let mut producer_slot = output.producer.lock();
    let mut consumer_slot = input.consumer.lock();
    if producer_slot.is_some() || consumer_slot.is_some() {
        return ConnectionResult::AlreadyConnected;
    }

    let (producer, consumer) = buffer::allocate::<T>(capacity);
    *producer_slot = Some(producer);
    *consumer_slot = Some(consumer);
    ConnectionResult::Success
}

/// Non-owning, type-erased view onto a typed port.
///
/// Cheap to clone; clones alias the same underlying binding slot, so a
/// connect performed through any view is observed by the owning port.
#[derive(Clone)]
pub struct DynamicPort {
    name: Cow<'static, str>,
    direction: PortDirection,
    domain: PortDomain,
    element_type: TypeId,
    element_type_name: &'static str,
    min_buffer_size: usize,
    endpoint: Arc<dyn Endpoint>,
    connect_fn: fn(&DynamicPort, &DynamicPort, usize) -> ConnectionResult,
}

impl DynamicPort {
    /// Connect this (output) port to `other` (input).
    ///
    /// Succeeds only when directions oppose, domains match, element types
    /// are identical and neither endpoint is already bound. On success both
    /// endpoints share a fresh ring buffer sized to the larger of the two
    /// requested minima, granule-aligned.
    pub fn connect(&self, other: &DynamicPort) -> ConnectionResult {
        if self.direction != PortDirection::Output || other.direction != PortDirection::Input {
            return ConnectionResult::DirectionMismatch;
        }
        if self.domain != other.domain {
            return ConnectionResult::DomainMismatch;
        }
        if self.element_type != other.element_type {
            return ConnectionResult::PortTypeMismatch;
        }
        if self.is_bound() || other.is_bound() {
            return ConnectionResult::AlreadyConnected;
        }
        let capacity = self.min_buffer_size.max(other.min_buffer_size);
        (self.connect_fn)(self, other, capacity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: Cow<'static, str>) {
        self.name = name;
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn domain(&self) -> PortDomain {
        self.domain
    }

    pub fn element_type_id(&self) -> TypeId {
        self.element_type
    }

    pub fn element_type_name(&self) -> &'static str {
        self.element_type_name
    }

    pub fn min_buffer_size(&self) -> usize {
        self.min_buffer_size
    }

    pub fn is_bound(&self) -> bool {
        self.endpoint.is_bound()
    }

    /// Readable samples for input ports, writable headroom for output ports.
    pub fn available_samples(&self) -> usize {
        self.endpoint.available()
    }
}

impl std::fmt::Debug for DynamicPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicPort")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("domain", &self.domain)
            .field("element_type", &self.element_type_name)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// One top-level entry of a block's dynamic port list: a scalar port or a
/// named collection of sibling ports.
#[derive(Debug, Clone)]
pub enum DynamicPortEntry {
    Port(DynamicPort),
    Collection {
        name: Cow<'static, str>,
        ports: Vec<DynamicPort>,
    },
}

impl DynamicPortEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Port(port) => port.name(),
            Self::Collection { name, .. } => name,
        }
    }
}

/// Typed stream output port. Owns the producer side of at most one buffer.
pub struct StreamOutput<T> {
    name: Cow<'static, str>,
    domain: PortDomain,
    synchronous: bool,
    min_buffer_size: usize,
    max_samples: usize,
    meta: PropertyMap,
    endpoint: Arc<OutputEndpoint<T>>,
}

impl<T: Send + 'static> StreamOutput<T> {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            domain: PortDomain::Stream,
            synchronous: true,
            min_buffer_size: DEFAULT_MIN_BUFFER_SIZE,
            max_samples: usize::MAX,
            meta: PropertyMap::new(),
            endpoint: Arc::new(OutputEndpoint::new()),
        }
    }

    /// Message-domain output port (asynchronous, small ring).
    pub fn message(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            domain: PortDomain::Message,
            synchronous: false,
            min_buffer_size: MESSAGE_BUFFER_SIZE,
            ..Self::new(name)
        }
    }

    pub fn with_min_buffer_size(mut self, min_buffer_size: usize) -> Self {
        self.min_buffer_size = min_buffer_size;
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.is_bound()
    }

    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn meta(&self) -> &PropertyMap {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut PropertyMap {
        &mut self.meta
    }

    /// Writable headroom; zero while unconnected.
    pub fn available(&self) -> usize {
        self.endpoint.available()
    }

    /// Write one sample. Returns the sample back when the port is
    /// unconnected or the ring is full.
    pub fn write(&self, value: T) -> Result<(), T> {
        self.endpoint.push(value)
    }

    /// Type-erased view sharing this port's binding slot.
    pub fn as_dynamic(&self) -> DynamicPort {
        DynamicPort {
            name: self.name.clone(),
            direction: PortDirection::Output,
            domain: self.domain,
            element_type: TypeId::of::<T>(),
            element_type_name: std::any::type_name::<T>(),
            min_buffer_size: self.min_buffer_size,
            endpoint: Arc::clone(&self.endpoint) as Arc<dyn Endpoint>,
            connect_fn: bind_endpoints::<T>,
        }
    }
}

impl<T: Send + 'static> Clone for StreamOutput<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            domain: self.domain,
            synchronous: self.synchronous,
            min_buffer_size: self.min_buffer_size,
            max_samples: self.max_samples,
            meta: self.meta.clone(),
            endpoint: Arc::clone(&self.endpoint),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for StreamOutput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOutput")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Typed stream input port. Owns the consumer side of at most one buffer.
pub struct StreamInput<T> {
    name: Cow<'static, str>,
    domain: PortDomain,
    synchronous: bool,
    min_buffer_size: usize,
    max_samples: usize,
    meta: PropertyMap,
    endpoint: Arc<InputEndpoint<T>>,
}

impl<T: Send + 'static> StreamInput<T> {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            domain: PortDomain::Stream,
            synchronous: true,
            min_buffer_size: DEFAULT_MIN_BUFFER_SIZE,
            max_samples: usize::MAX,
            meta: PropertyMap::new(),
            endpoint: Arc::new(InputEndpoint::new()),
        }
    }

    /// Message-domain input port (asynchronous, small ring).
    pub fn message(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            domain: PortDomain::Message,
            synchronous: false,
            min_buffer_size: MESSAGE_BUFFER_SIZE,
            ..Self::new(name)
        }
    }

    pub fn with_min_buffer_size(mut self, min_buffer_size: usize) -> Self {
        self.min_buffer_size = min_buffer_size;
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.is_bound()
    }

    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn meta(&self) -> &PropertyMap {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut PropertyMap {
        &mut self.meta
    }

    /// Readable samples; zero while unconnected.
    pub fn available(&self) -> usize {
        self.endpoint.available()
    }

    /// Pop one sample, `None` when empty or unconnected.
    pub fn read(&self) -> Option<T> {
        self.endpoint.pop()
    }

    /// Drain everything currently readable.
    pub fn read_all(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.available());
        while let Some(value) = self.read() {
            out.push(value);
        }
        out
    }

    /// Type-erased view sharing this port's binding slot.
    pub fn as_dynamic(&self) -> DynamicPort {
        DynamicPort {
            name: self.name.clone(),
            direction: PortDirection::Input,
            domain: self.domain,
            element_type: TypeId::of::<T>(),
            element_type_name: std::any::type_name::<T>(),
            min_buffer_size: self.min_buffer_size,
            endpoint: Arc::clone(&self.endpoint) as Arc<dyn Endpoint>,
            connect_fn: bind_endpoints::<T>,
        }
    }
}

impl<T: Send + 'static> Clone for StreamInput<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            domain: self.domain,
            synchronous: self.synchronous,
            min_buffer_size: self.min_buffer_size,
            max_samples: self.max_samples,
            meta: self.meta.clone(),
            endpoint: Arc::clone(&self.endpoint),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for StreamInput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamInput")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("connected", &self.is_connected())
            .finish()
    }
}
