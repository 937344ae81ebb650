//! The polymorphic block handle.
//!
//! [`DynBlock`] is the object-safe contract the graph and scheduler use for
//! every registered block. Concrete typed blocks are adapted into it by
//! [`BlockAdapter`], which also performs the lazy, one-shot discovery of the
//! block's dynamic port lists. Handles are heap-pinned: once registered, a
//! block's address identifies it in every edge, so handles are neither
//! copied nor moved out of their box.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::block::{short_type_name, Block, PortDecl, ProgressSequence, WorkResult};
use crate::error::Result;
use crate::lifecycle::{LifecycleState, TransitionError};
use crate::port::{DynamicPort, DynamicPortEntry, PortAccessError};
use crate::properties::{PropertyMap, SettingsMap};
use crate::thread_pool::IoThreadPool;

/// Address identity of a registered block.
///
/// Compared, hashed, and stored in edges; never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Copyable typed reference to a block registered in a graph.
///
/// Obtained from registration; carries the concrete type for compile-time
/// checked connects while the graph keeps ownership of the block itself.
pub struct BlockRef<T> {
    id: BlockId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> BlockRef<T> {
    pub(crate) fn new(id: BlockId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }
}

impl<T> Clone for BlockRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BlockRef<T> {}

impl<T> std::fmt::Debug for BlockRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRef").field("id", &self.id).finish()
    }
}

/// Object-safe runtime contract over any concrete block.
///
/// Mirrors [`Block`] method-for-method and adds the dynamic port surface
/// the graph needs for runtime topology manipulation.
pub trait DynBlock: Send {
    fn init(&mut self, progress: Arc<ProgressSequence>, io_pool: Arc<IoThreadPool>);

    fn work(&mut self, requested: usize) -> WorkResult;

    fn is_blocking(&self) -> bool;

    fn change_state(&mut self, to: LifecycleState) -> std::result::Result<(), TransitionError>;

    fn state(&self) -> LifecycleState;

    /// Per-port readable sample counts; returns the number of ports
    /// reported.
    fn available_input_samples(&mut self, counts: &mut Vec<usize>) -> usize;

    /// Per-port writable headroom counts; returns the number of ports
    /// reported.
    fn available_output_samples(&mut self, counts: &mut Vec<usize>) -> usize;

    fn dynamic_input_port(
        &mut self,
        index: usize,
        sub_index: Option<usize>,
    ) -> std::result::Result<&DynamicPort, PortAccessError>;

    fn dynamic_output_port(
        &mut self,
        index: usize,
        sub_index: Option<usize>,
    ) -> std::result::Result<&DynamicPort, PortAccessError>;

    /// Top-level entry count, or the sub-port count of the collection at
    /// `parent`.
    fn dynamic_input_ports_size(
        &mut self,
        parent: Option<usize>,
    ) -> std::result::Result<usize, PortAccessError>;

    fn dynamic_output_ports_size(
        &mut self,
        parent: Option<usize>,
    ) -> std::result::Result<usize, PortAccessError>;

    /// Linear search over the top-level entries.
    fn dynamic_input_port_index(
        &mut self,
        name: &str,
    ) -> std::result::Result<usize, PortAccessError>;

    fn dynamic_output_port_index(
        &mut self,
        name: &str,
    ) -> std::result::Result<usize, PortAccessError>;

    fn process_scheduled_messages(&mut self);

    fn message_input(&self) -> DynamicPort;

    fn message_output(&self) -> DynamicPort;

    fn name(&self) -> &str;

    fn set_name(&mut self, name: String);

    fn unique_name(&self) -> &str;

    fn type_name(&self) -> &str;

    fn meta_information(&self) -> &PropertyMap;

    fn meta_information_mut(&mut self) -> &mut PropertyMap;

    fn settings(&self) -> &SettingsMap;

    fn settings_mut(&mut self) -> &mut SettingsMap;

    /// Identity used by connection-time lookups.
    fn raw(&self) -> BlockId;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

fn entry_port<'a>(
    entries: &'a [DynamicPortEntry],
    index: usize,
    sub_index: Option<usize>,
) -> std::result::Result<&'a DynamicPort, PortAccessError> {
    let entry = entries
        .get(index)
        .ok_or(PortAccessError::OutOfRange(index))?;
    match (entry, sub_index) {
        (DynamicPortEntry::Port(port), None) => Ok(port),
        (DynamicPortEntry::Port(_), Some(_)) => Err(PortAccessError::UnexpectedSubIndex(index)),
        (DynamicPortEntry::Collection { ports, .. }, Some(sub)) => ports
            .get(sub)
            .ok_or(PortAccessError::SubOutOfRange { index, sub }),
        (DynamicPortEntry::Collection { .. }, None) => {
            Err(PortAccessError::SubIndexRequired(index))
        }
    }
}

fn entry_size(
    entries: &[DynamicPortEntry],
    parent: Option<usize>,
) -> std::result::Result<usize, PortAccessError> {
    match parent {
        None => Ok(entries.len()),
        Some(index) => match entries.get(index) {
            Some(DynamicPortEntry::Collection { ports, .. }) => Ok(ports.len()),
            Some(DynamicPortEntry::Port(_)) => Err(PortAccessError::UnexpectedSubIndex(index)),
            None => Err(PortAccessError::OutOfRange(index)),
        },
    }
}

fn entry_index(
    entries: &[DynamicPortEntry],
    name: &str,
) -> std::result::Result<usize, PortAccessError> {
    entries
        .iter()
        .position(|entry| entry.name() == name)
        .ok_or_else(|| PortAccessError::NotFound(name.to_string()))
}

fn flatten_available(entries: &[DynamicPortEntry], counts: &mut Vec<usize>) -> usize {
    counts.clear();
    for entry in entries {
        match entry {
            DynamicPortEntry::Port(port) => counts.push(port.available_samples()),
            DynamicPortEntry::Collection { ports, .. } => {
                counts.extend(ports.iter().map(|p| p.available_samples()));
            }
        }
    }
    counts.len()
}

/// Adapts a statically-typed block to [`DynBlock`].
pub struct BlockAdapter<T: Block> {
    block: T,
    type_name: &'static str,
    dynamic_inputs: Option<Vec<DynamicPortEntry>>,
    dynamic_outputs: Option<Vec<DynamicPortEntry>>,
}

impl<T: Block> BlockAdapter<T> {
    pub fn new(block: T) -> Self {
        Self {
            block,
            type_name: short_type_name(std::any::type_name::<T>()),
            dynamic_inputs: None,
            dynamic_outputs: None,
        }
    }

    pub fn from_settings(settings: SettingsMap) -> Result<Self> {
        Ok(Self::new(T::from_settings(settings)?))
    }

    pub fn block(&self) -> &T {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut T {
        &mut self.block
    }

    /// Address identity of the wrapped block.
    pub fn id(&self) -> BlockId {
        BlockId(&self.block as *const T as *const () as usize)
    }

    /// Build the dynamic port lists from the block's declarations. Runs at
    /// most once; sub-port order equals declaration order.
    fn ensure_dynamic_ports(&mut self) {
        if self.dynamic_inputs.is_some() {
            return;
        }
        let build = |decls: Vec<PortDecl>| -> Vec<DynamicPortEntry> {
            decls.into_iter().map(PortDecl::into_entry).collect()
        };
        self.dynamic_inputs = Some(build(self.block.input_port_decls()));
        self.dynamic_outputs = Some(build(self.block.output_port_decls()));
    }
}

impl<T: Block> DynBlock for BlockAdapter<T> {
    fn init(&mut self, progress: Arc<ProgressSequence>, io_pool: Arc<IoThreadPool>) {
        self.block.init(progress, io_pool);
    }

    fn work(&mut self, requested: usize) -> WorkResult {
        self.block.work(requested)
    }

    fn is_blocking(&self) -> bool {
        self.block.is_blocking()
    }

    fn change_state(&mut self, to: LifecycleState) -> std::result::Result<(), TransitionError> {
        self.block.core_mut().change_state(to)
    }

    fn state(&self) -> LifecycleState {
        self.block.core().state()
    }

    fn available_input_samples(&mut self, counts: &mut Vec<usize>) -> usize {
        self.ensure_dynamic_ports();
        flatten_available(self.dynamic_inputs.as_deref().unwrap_or_default(), counts)
    }

    fn available_output_samples(&mut self, counts: &mut Vec<usize>) -> usize {
        self.ensure_dynamic_ports();
        flatten_available(self.dynamic_outputs.as_deref().unwrap_or_default(), counts)
    }

    fn dynamic_input_port(
        &mut self,
        index: usize,
        sub_index: Option<usize>,
    ) -> std::result::Result<&DynamicPort, PortAccessError> {
        self.ensure_dynamic_ports();
        entry_port(self.dynamic_inputs.as_deref().unwrap_or_default(), index, sub_index)
    }

    fn dynamic_output_port(
        &mut self,
        index: usize,
        sub_index: Option<usize>,
    ) -> std::result::Result<&DynamicPort, PortAccessError> {
        self.ensure_dynamic_ports();
        entry_port(self.dynamic_outputs.as_deref().unwrap_or_default(), index, sub_index)
    }

    fn dynamic_input_ports_size(
        &mut self,
        parent: Option<usize>,
    ) -> std::result::Result<usize, PortAccessError> {
        self.ensure_dynamic_ports();
        entry_size(self.dynamic_inputs.as_deref().unwrap_or_default(), parent)
    }

    fn dynamic_output_ports_size(
        &mut self,
        parent: Option<usize>,
    ) -> std::result::Result<usize, PortAccessError> {
        self.ensure_dynamic_ports();
        entry_size(self.dynamic_outputs.as_deref().unwrap_or_default(), parent)
    }

    fn dynamic_input_port_index(
        &mut self,
        name: &str,
    ) -> std::result::Result<usize, PortAccessError> {
        self.ensure_dynamic_ports();
        entry_index(self.dynamic_inputs.as_deref().unwrap_or_default(), name)
    }

    fn dynamic_output_port_index(
        &mut self,
        name: &str,
    ) -> std::result::Result<usize, PortAccessError> {
        self.ensure_dynamic_ports();
        entry_index(self.dynamic_outputs.as_deref().unwrap_or_default(), name)
    }

    fn process_scheduled_messages(&mut self) {
        self.block.process_scheduled_messages();
    }

    fn message_input(&self) -> DynamicPort {
        self.block.core().msg_in().as_dynamic()
    }

    fn message_output(&self) -> DynamicPort {
        self.block.core().msg_out().as_dynamic()
    }

    fn name(&self) -> &str {
        self.block.core().name()
    }

    fn set_name(&mut self, name: String) {
        self.block.core_mut().set_name(name);
    }

    fn unique_name(&self) -> &str {
        self.block.core().unique_name()
    }

    fn type_name(&self) -> &str {
        self.type_name
    }

    fn meta_information(&self) -> &PropertyMap {
        self.block.core().meta_information()
    }

    fn meta_information_mut(&mut self) -> &mut PropertyMap {
        self.block.core_mut().meta_information_mut()
    }

    fn settings(&self) -> &SettingsMap {
        self.block.core().settings()
    }

    fn settings_mut(&mut self) -> &mut SettingsMap {
        self.block.core_mut().settings_mut()
    }

    fn raw(&self) -> BlockId {
        self.id()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockCore, WorkStatus};
    use crate::port::{StreamInput, StreamOutput};

    struct Mixer {
        core: BlockCore,
        inputs: Vec<StreamInput<f32>>,
        output: StreamOutput<f32>,
    }

    impl Block for Mixer {
        fn from_settings(settings: SettingsMap) -> Result<Self> {
            let channels =
                crate::properties::get_typed::<usize>(&settings, "channels").unwrap_or(2);
            Ok(Self {
                core: BlockCore::new("Mixer", settings),
                inputs: (0..channels)
                    .map(|i| StreamInput::new(format!("chan{i}")))
                    .collect(),
                output: StreamOutput::new("mixed"),
            })
        }

        fn core(&self) -> &BlockCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut BlockCore {
            &mut self.core
        }

        fn input_port_decls(&self) -> Vec<PortDecl> {
            vec![PortDecl::collection(
                "channels",
                self.inputs.iter().map(|p| p.as_dynamic()).collect(),
            )]
        }

        fn output_port_decls(&self) -> Vec<PortDecl> {
            vec![PortDecl::single("mixed", self.output.as_dynamic())]
        }

        fn work(&mut self, _requested: usize) -> WorkResult {
            WorkResult::idle(WorkStatus::InsufficientInputItems)
        }
    }

    fn adapter() -> BlockAdapter<Mixer> {
        BlockAdapter::from_settings(crate::properties::property("channels", 3)).unwrap()
    }

    #[test]
    fn test_scalar_and_collection_addressing() {
        let mut adapter = adapter();
        assert_eq!(adapter.dynamic_input_ports_size(None), Ok(1));
        assert_eq!(adapter.dynamic_input_ports_size(Some(0)), Ok(3));
        assert_eq!(adapter.dynamic_output_ports_size(None), Ok(1));

        assert!(adapter.dynamic_input_port(0, Some(1)).is_ok());
        assert_eq!(
            adapter.dynamic_input_port(0, None).unwrap_err(),
            PortAccessError::SubIndexRequired(0)
        );
        assert_eq!(
            adapter.dynamic_output_port(0, Some(0)).unwrap_err(),
            PortAccessError::UnexpectedSubIndex(0)
        );
        assert_eq!(
            adapter.dynamic_input_port(7, None).unwrap_err(),
            PortAccessError::OutOfRange(7)
        );
        assert_eq!(
            adapter.dynamic_input_port(0, Some(9)).unwrap_err(),
            PortAccessError::SubOutOfRange { index: 0, sub: 9 }
        );
    }

    #[test]
    fn test_port_index_lookup_by_name() {
        let mut adapter = adapter();
        assert_eq!(adapter.dynamic_input_port_index("channels"), Ok(0));
        assert_eq!(adapter.dynamic_output_port_index("mixed"), Ok(0));
        assert_eq!(
            adapter.dynamic_output_port_index("nope").unwrap_err(),
            PortAccessError::NotFound("nope".into())
        );
    }

    #[test]
    fn test_sub_port_order_matches_declaration() {
        let mut adapter = adapter();
        for i in 0..3 {
            let port = adapter.dynamic_input_port(0, Some(i)).unwrap();
            assert_eq!(port.name(), format!("chan{i}"));
        }
    }

    #[test]
    fn test_available_counts_flatten_collections() {
        let mut adapter = adapter();
        let mut counts = Vec::new();
        assert_eq!(adapter.available_input_samples(&mut counts), 3);
        assert_eq!(counts, vec![0, 0, 0]);
        assert_eq!(adapter.available_output_samples(&mut counts), 1);
    }

    #[test]
    fn test_raw_identity_is_stable() {
        let adapter = Box::new(adapter());
        let before = adapter.id();
        let as_dyn: Box<dyn DynBlock> = adapter;
        assert_eq!(as_dyn.raw(), before);
    }
}
