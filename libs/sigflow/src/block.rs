//! The typed block contract and the state every block carries.
//!
//! Concrete blocks implement [`Block`]: construction from a settings map,
//! a `work` implementation, and declarations of their stream ports. The
//! shared bookkeeping (names, lifecycle state, settings, meta map, message
//! ports, runtime handles) lives in an embedded [`BlockCore`] so block
//! implementations stay focused on their processing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lifecycle::{LifecycleState, TransitionError};
use crate::port::{DynamicPort, DynamicPortEntry, StreamInput, StreamOutput};
use crate::properties::{get_typed, Message, PropertyMap, SettingsMap};
use crate::thread_pool::IoThreadPool;

/// Outcome classification of one `work` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkStatus {
    Ok,
    InsufficientInputItems,
    InsufficientOutputItems,
    Done,
    Error,
}

/// What one `work` invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkResult {
    pub status: WorkStatus,
    pub produced: usize,
    pub consumed: usize,
}

impl WorkResult {
    pub fn ok(produced: usize, consumed: usize) -> Self {
        Self {
            status: WorkStatus::Ok,
            produced,
            consumed,
        }
    }

    pub fn idle(status: WorkStatus) -> Self {
        Self {
            status,
            produced: 0,
            consumed: 0,
        }
    }

    pub fn made_progress(&self) -> bool {
        self.produced > 0 || self.consumed > 0
    }
}

/// Monotonic counter shared by the graph and all its blocks; advanced
/// whenever any block makes progress, so waiters can detect a stalled
/// graph.
#[derive(Debug, Default)]
pub struct ProgressSequence(AtomicU64);

impl ProgressSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

static BLOCK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Last path segment of a type name, with generic arguments kept intact.
pub(crate) fn short_type_name(full: &str) -> &str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

/// One declared stream port (or named collection) of a block, in
/// declaration order.
#[derive(Debug, Clone)]
pub struct PortDecl {
    declared_name: &'static str,
    entry: DynamicPortEntry,
}

impl PortDecl {
    pub fn single(declared_name: &'static str, port: DynamicPort) -> Self {
        Self {
            declared_name,
            entry: DynamicPortEntry::Port(port),
        }
    }

    pub fn collection(declared_name: &'static str, ports: Vec<DynamicPort>) -> Self {
        Self {
            declared_name,
            entry: DynamicPortEntry::Collection {
                name: declared_name.into(),
                ports,
            },
        }
    }

    /// Finalise the declaration: a port left unnamed at construction takes
    /// its compile-time declared name.
    pub(crate) fn into_entry(self) -> DynamicPortEntry {
        match self.entry {
            DynamicPortEntry::Port(mut port) => {
                if port.name().is_empty() {
                    port.set_name(self.declared_name.into());
                }
                DynamicPortEntry::Port(port)
            }
            collection => collection,
        }
    }
}

/// Shared per-block state: identity, lifecycle, settings, meta information,
/// the built-in message-port pair, and the runtime handles received at init.
#[derive(Debug)]
pub struct BlockCore {
    name: String,
    unique_name: String,
    state: LifecycleState,
    settings: SettingsMap,
    meta_information: PropertyMap,
    msg_in: StreamInput<Message>,
    msg_out: StreamOutput<Message>,
    progress: Option<Arc<ProgressSequence>>,
    io_pool: Option<Arc<IoThreadPool>>,
}

impl BlockCore {
    /// `type_label` seeds the process-wide unique name; the user-visible
    /// name defaults to it unless the settings carry a `"name"` key.
    pub fn new(type_label: &str, settings: SettingsMap) -> Self {
        let id = BLOCK_COUNTER.fetch_add(1, Ordering::SeqCst);
        let name = get_typed::<String>(&settings, "name").unwrap_or_else(|| type_label.to_string());
        Self {
            name,
            unique_name: format!("{type_label}#{id}"),
            state: LifecycleState::Idle,
            settings,
            meta_information: PropertyMap::new(),
            msg_in: StreamInput::message("msg_in"),
            msg_out: StreamOutput::message("msg_out"),
            progress: None,
            io_pool: None,
        }
    }

    /// Called once when the owning graph registers the block.
    pub fn init(&mut self, progress: Arc<ProgressSequence>, io_pool: Arc<IoThreadPool>) {
        self.progress = Some(progress);
        self.io_pool = Some(io_pool);
        if self.state == LifecycleState::Idle {
            self.state = LifecycleState::Initialised;
        }
    }

    pub fn change_state(&mut self, to: LifecycleState) -> std::result::Result<(), TransitionError> {
        if self.state.can_transition_to(to) {
            tracing::trace!(block = %self.unique_name, from = %self.state, %to, "state change");
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError {
                from: self.state,
                to,
            })
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn settings(&self) -> &SettingsMap {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SettingsMap {
        &mut self.settings
    }

    pub fn meta_information(&self) -> &PropertyMap {
        &self.meta_information
    }

    pub fn meta_information_mut(&mut self) -> &mut PropertyMap {
        &mut self.meta_information
    }

    pub fn msg_in(&self) -> &StreamInput<Message> {
        &self.msg_in
    }

    pub fn msg_out(&self) -> &StreamOutput<Message> {
        &self.msg_out
    }

    pub fn progress(&self) -> Option<&Arc<ProgressSequence>> {
        self.progress.as_ref()
    }

    pub fn io_pool(&self) -> Option<&Arc<IoThreadPool>> {
        self.io_pool.as_ref()
    }
}

/// Compile-time declaration of the element type on output port `I`.
///
/// Static connects use this to prove, at compile time, that the source and
/// destination ports carry the same element type. `I` indexes the
/// top-level output declarations; for a port collection it names the
/// collection and the element type of its members.
pub trait OutputPortAt<const I: usize> {
    type Element: Send + 'static;
}

/// Compile-time declaration of the element type on input port `I`.
pub trait InputPortAt<const I: usize> {
    type Element: Send + 'static;
}

/// A unit of processing: typed ports plus a `work` implementation.
///
/// All graph-resident blocks implement this trait. The graph talks to them
/// through the object-safe [`DynBlock`] wrapper, which forwards every call
/// here.
///
/// [`DynBlock`]: crate::handle::DynBlock
pub trait Block: Send + 'static {
    /// Construct the block from its initial configuration map.
    fn from_settings(settings: SettingsMap) -> Result<Self>
    where
        Self: Sized;

    fn core(&self) -> &BlockCore;

    fn core_mut(&mut self) -> &mut BlockCore;

    /// Declared stream input ports, in declaration order.
    fn input_port_decls(&self) -> Vec<PortDecl>;

    /// Declared stream output ports, in declaration order.
    fn output_port_decls(&self) -> Vec<PortDecl>;

    /// Process up to `requested` samples. Never blocks; reports starvation
    /// through the result status.
    fn work(&mut self, requested: usize) -> WorkResult;

    /// Scheduling hint: `work` may stall on IO or system calls.
    fn is_blocking(&self) -> bool {
        false
    }

    /// Called once when the owning graph registers the block.
    fn init(&mut self, progress: Arc<ProgressSequence>, io_pool: Arc<IoThreadPool>) {
        self.core_mut().init(progress, io_pool);
    }

    /// React to one message from the `msg_in` port.
    fn handle_message(&mut self, _message: Message) {}

    /// Drain `msg_in` and dispatch every pending message.
    fn process_scheduled_messages(&mut self) {
        let messages = self.core().msg_in().read_all();
        for message in messages {
            self.handle_message(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::property;

    struct Probe {
        core: BlockCore,
        seen: Vec<Message>,
    }

    impl Block for Probe {
        fn from_settings(settings: SettingsMap) -> Result<Self> {
            Ok(Self {
                core: BlockCore::new("Probe", settings),
                seen: Vec::new(),
            })
        }

        fn core(&self) -> &BlockCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut BlockCore {
            &mut self.core
        }

        fn input_port_decls(&self) -> Vec<PortDecl> {
            Vec::new()
        }

        fn output_port_decls(&self) -> Vec<PortDecl> {
            Vec::new()
        }

        fn work(&mut self, _requested: usize) -> WorkResult {
            WorkResult::idle(WorkStatus::Done)
        }

        fn handle_message(&mut self, message: Message) {
            self.seen.push(message);
        }
    }

    #[test]
    fn test_unique_names_are_distinct() {
        let a = Probe::from_settings(SettingsMap::new()).unwrap();
        let b = Probe::from_settings(SettingsMap::new()).unwrap();
        assert_ne!(a.core().unique_name(), b.core().unique_name());
        assert!(a.core().unique_name().starts_with("Probe#"));
    }

    #[test]
    fn test_name_from_settings() {
        let probe = Probe::from_settings(property("name", "left")).unwrap();
        assert_eq!(probe.core().name(), "left");
    }

    #[test]
    fn test_state_change_validation() {
        let mut probe = Probe::from_settings(SettingsMap::new()).unwrap();
        assert_eq!(probe.core().state(), LifecycleState::Idle);
        assert!(probe.core_mut().change_state(LifecycleState::Running).is_err());
        assert_eq!(probe.core().state(), LifecycleState::Idle);
        probe.core_mut().change_state(LifecycleState::Initialised).unwrap();
        probe.core_mut().change_state(LifecycleState::Running).unwrap();
    }

    #[test]
    fn test_message_pump() {
        let mut probe = Probe::from_settings(SettingsMap::new()).unwrap();
        let feeder = StreamOutput::<Message>::message("feeder");
        assert!(feeder
            .as_dynamic()
            .connect(&probe.core().msg_in().as_dynamic())
            .is_success());

        feeder.write(property("cmd", "pause")).unwrap();
        feeder.write(property("cmd", "resume")).unwrap();
        probe.process_scheduled_messages();
        assert_eq!(probe.seen.len(), 2);
        assert_eq!(
            crate::properties::get_typed::<String>(&probe.seen[0], "cmd").as_deref(),
            Some("pause")
        );
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("sigflow::blocks::CountingSource"), "CountingSource");
        assert_eq!(short_type_name("Plain"), "Plain");
        assert_eq!(
            short_type_name("sigflow::blocks::Scale<i32>"),
            "Scale<i32>"
        );
    }
}
