//! Pointwise kernels and their generic block wrapper.
//!
//! A pointwise kernel maps one sample tuple to one sample tuple with no
//! rate change. Kernels are plain values: they can be fused with each other
//! at compile time (see [`crate::fused`]) and dropped into a graph through
//! [`PointwiseBlock`], which owns the actual stream ports and synthesises
//! the per-chunk work loop around `process_one`.

use crate::block::{
    short_type_name, Block, BlockCore, InputPortAt, OutputPortAt, PortDecl, WorkResult, WorkStatus,
};
use crate::error::{FlowError, Result};
use crate::meta::TupleAt;
use crate::port::{StreamInput, StreamOutput};
use crate::properties::SettingsMap;

/// Construction of a kernel from a settings map.
///
/// Separate from [`Pointwise`] because fused kernels exist only as merge
/// results and cannot be configured into existence.
pub trait FromSettings: Sized {
    fn from_settings(settings: &SettingsMap) -> Result<Self>;
}

/// A sample tuple that can be materialised as a row of stream ports.
///
/// Implemented for tuples of up to four `Send + 'static` elements; input
/// ports and output ports are built, polled, and drained element-wise.
pub trait SampleTuple: Sized + Send + 'static {
    type InputPorts: Send;
    type OutputPorts: Send;
    const LEN: usize;

    fn make_inputs(names: &[&'static str]) -> Self::InputPorts;
    fn make_outputs(names: &[&'static str]) -> Self::OutputPorts;

    /// Minimum readable samples across all input ports; `usize::MAX` for an
    /// empty tuple.
    fn inputs_available(ports: &Self::InputPorts) -> usize;

    /// Minimum writable headroom across all output ports; `usize::MAX` for
    /// an empty tuple.
    fn outputs_headroom(ports: &Self::OutputPorts) -> usize;

    /// Pop one sample from every input port. Callers check availability
    /// first; a `None` mid-stream would drop already-popped samples.
    fn read(ports: &mut Self::InputPorts) -> Option<Self>;

    /// Push one sample to every output port.
    fn write(ports: &mut Self::OutputPorts, values: Self) -> bool;

    fn input_decls(ports: &Self::InputPorts, names: &[&'static str]) -> Vec<PortDecl>;
    fn output_decls(ports: &Self::OutputPorts, names: &[&'static str]) -> Vec<PortDecl>;

    /// Minimum per-port `max_samples` across the input row.
    fn inputs_max_samples(ports: &Self::InputPorts) -> usize;

    /// Minimum per-port `max_samples` across the output row.
    fn outputs_max_samples(ports: &Self::OutputPorts) -> usize;
}

macro_rules! impl_sample_tuple {
    ($len:expr; $(($t:ident, $p:ident, $idx:tt)),*) => {
        #[allow(non_snake_case, unused_variables, unused_mut)]
        impl<$($t: Send + 'static),*> SampleTuple for ($($t,)*) {
            type InputPorts = ($(StreamInput<$t>,)*);
            type OutputPorts = ($(StreamOutput<$t>,)*);
            const LEN: usize = $len;

            fn make_inputs(names: &[&'static str]) -> Self::InputPorts {
                debug_assert_eq!(names.len(), $len);
                ($(StreamInput::<$t>::new(names[$idx]),)*)
            }

            fn make_outputs(names: &[&'static str]) -> Self::OutputPorts {
                debug_assert_eq!(names.len(), $len);
                ($(StreamOutput::<$t>::new(names[$idx]),)*)
            }

            fn inputs_available(ports: &Self::InputPorts) -> usize {
                let ($($p,)*) = ports;
                let mut n = usize::MAX;
                $( n = n.min($p.available()); )*
                n
            }

            fn outputs_headroom(ports: &Self::OutputPorts) -> usize {
                let ($($p,)*) = ports;
                let mut n = usize::MAX;
                $( n = n.min($p.available()); )*
                n
            }

            fn read(ports: &mut Self::InputPorts) -> Option<Self> {
                let ($($p,)*) = ports;
                Some(($($p.read()?,)*))
            }

            fn write(ports: &mut Self::OutputPorts, values: Self) -> bool {
                let ($($p,)*) = ports;
                let ($($t,)*) = values;
                let mut ok = true;
                $( ok &= $p.write($t).is_ok(); )*
                ok
            }

            fn input_decls(ports: &Self::InputPorts, names: &[&'static str]) -> Vec<PortDecl> {
                let ($($p,)*) = ports;
                vec![$(PortDecl::single(names[$idx], $p.as_dynamic())),*]
            }

            fn output_decls(ports: &Self::OutputPorts, names: &[&'static str]) -> Vec<PortDecl> {
                let ($($p,)*) = ports;
                vec![$(PortDecl::single(names[$idx], $p.as_dynamic())),*]
            }

            fn inputs_max_samples(ports: &Self::InputPorts) -> usize {
                let ($($p,)*) = ports;
                let mut n = usize::MAX;
                $( n = n.min($p.max_samples()); )*
                n
            }

            fn outputs_max_samples(ports: &Self::OutputPorts) -> usize {
                let ($($p,)*) = ports;
                let mut n = usize::MAX;
                $( n = n.min($p.max_samples()); )*
                n
            }
        }
    };
}

impl_sample_tuple!(0;);
impl_sample_tuple!(1; (A, pa, 0));
impl_sample_tuple!(2; (A, pa, 0), (B, pb, 1));
impl_sample_tuple!(3; (A, pa, 0), (B, pb, 1), (C, pc, 2));
impl_sample_tuple!(4; (A, pa, 0), (B, pb, 1), (C, pc, 2), (D, pd, 3));

/// Single-sample processing contract.
///
/// `process_one` maps one input tuple to one output tuple; `offset` is the
/// running sample index within the current stream, for kernels whose output
/// depends on position.
pub trait Pointwise: Send + 'static {
    type Inputs: SampleTuple;
    type Outputs: SampleTuple;

    /// Declared input port names, one per input tuple element. Resolved at
    /// compile time by `merge_by_name!`.
    const INPUT_NAMES: &'static [&'static str];

    /// Declared output port names, one per output tuple element.
    const OUTPUT_NAMES: &'static [&'static str];

    fn process_one(&mut self, offset: usize, input: Self::Inputs) -> Self::Outputs;

    /// Upper bound on samples per work call; the wrapper also honours
    /// per-port `max_samples`.
    fn work_chunk_limit(&self) -> usize {
        usize::MAX
    }

    /// Runtime view of the input port names; fused kernels override this
    /// with the concatenated list.
    fn input_names(&self) -> Vec<&'static str> {
        Self::INPUT_NAMES.to_vec()
    }

    /// Runtime view of the output port names.
    fn output_names(&self) -> Vec<&'static str> {
        Self::OUTPUT_NAMES.to_vec()
    }
}

/// Graph-resident block built around a pointwise kernel.
///
/// Owns one input port per input tuple element and one output port per
/// output tuple element; `work` reads a sample row, applies the kernel, and
/// writes the result row, one sample at a time, up to the chunk bound.
pub struct PointwiseBlock<K: Pointwise> {
    core: BlockCore,
    kernel: K,
    input_names: Vec<&'static str>,
    output_names: Vec<&'static str>,
    inputs: <K::Inputs as SampleTuple>::InputPorts,
    outputs: <K::Outputs as SampleTuple>::OutputPorts,
    offset: usize,
}

impl<K: Pointwise> PointwiseBlock<K> {
    pub fn new(kernel: K) -> Self {
        Self::with_settings(kernel, SettingsMap::new())
    }

    pub fn with_settings(kernel: K, settings: SettingsMap) -> Self {
        let input_names = kernel.input_names();
        let output_names = kernel.output_names();
        Self {
            core: BlockCore::new(short_type_name(std::any::type_name::<K>()), settings),
            inputs: K::Inputs::make_inputs(&input_names),
            outputs: K::Outputs::make_outputs(&output_names),
            input_names,
            output_names,
            kernel,
            offset: 0,
        }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

impl<K: Pointwise + FromSettings> Block for PointwiseBlock<K> {
    fn from_settings(settings: SettingsMap) -> Result<Self> {
        let kernel = K::from_settings(&settings)?;
        Ok(Self::with_settings(kernel, settings))
    }

    fn core(&self) -> &BlockCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BlockCore {
        &mut self.core
    }

    fn input_port_decls(&self) -> Vec<PortDecl> {
        K::Inputs::input_decls(&self.inputs, &self.input_names)
    }

    fn output_port_decls(&self) -> Vec<PortDecl> {
        K::Outputs::output_decls(&self.outputs, &self.output_names)
    }

    fn work(&mut self, requested: usize) -> WorkResult {
        let available = K::Inputs::inputs_available(&self.inputs);
        let headroom = K::Outputs::outputs_headroom(&self.outputs);
        let bound = requested
            .min(self.kernel.work_chunk_limit())
            .min(K::Inputs::inputs_max_samples(&self.inputs))
            .min(K::Outputs::outputs_max_samples(&self.outputs));
        let n = available.min(headroom).min(bound);
        if n == 0 {
            let status = if available == 0 {
                WorkStatus::InsufficientInputItems
            } else {
                WorkStatus::InsufficientOutputItems
            };
            return WorkResult::idle(status);
        }

        for _ in 0..n {
            let Some(input) = K::Inputs::read(&mut self.inputs) else {
                break;
            };
            let output = self.kernel.process_one(self.offset, input);
            K::Outputs::write(&mut self.outputs, output);
            self.offset += 1;
        }

        let consumed = if K::Inputs::LEN == 0 { 0 } else { n };
        let produced = if K::Outputs::LEN == 0 { 0 } else { n };
        WorkResult::ok(produced, consumed)
    }
}

impl<K: Pointwise, const I: usize> OutputPortAt<I> for PointwiseBlock<K>
where
    K::Outputs: TupleAt<I>,
    <K::Outputs as TupleAt<I>>::Element: Send + 'static,
{
    type Element = <K::Outputs as TupleAt<I>>::Element;
}

impl<K: Pointwise, const I: usize> InputPortAt<I> for PointwiseBlock<K>
where
    K::Inputs: TupleAt<I>,
    <K::Inputs as TupleAt<I>>::Element: Send + 'static,
{
    type Element = <K::Inputs as TupleAt<I>>::Element;
}

/// Blanket settings-construction failure for kernels that opt out.
pub(crate) fn not_configurable(kind: &str) -> FlowError {
    FlowError::Configuration(format!(
        "{kind} kernels are produced by merging, not from settings"
    ))
}
