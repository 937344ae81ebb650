//! Group-wise decimating resampler.

use crate::block::{Block, BlockCore, InputPortAt, OutputPortAt, PortDecl, WorkResult, WorkStatus};
use crate::error::{FlowError, Result};
use crate::port::{StreamInput, StreamOutput};
use crate::properties::{get_typed, SettingsMap};

/// Consumes whole groups of `input_chunk` samples and forwards the first
/// `output_chunk` of each group.
///
/// Only complete groups are ever processed: a trailing partial group stays
/// in the input buffer and is dropped when the upstream finishes.
/// `max_output_per_call` caps how much one `work` invocation may produce,
/// which bounds latency for downstream consumers.
pub struct RatioResampler<T: Send + 'static> {
    core: BlockCore,
    input: StreamInput<T>,
    output: StreamOutput<T>,
    input_chunk: usize,
    output_chunk: usize,
    max_output_per_call: usize,
    invocations: u64,
    call_log: Vec<(usize, usize)>,
}

impl<T: Send + 'static> RatioResampler<T> {
    /// Productive `work` invocations so far.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// `(consumed, produced)` per productive invocation.
    pub fn call_log(&self) -> &[(usize, usize)] {
        &self.call_log
    }
}

impl<T: Send + 'static> Block for RatioResampler<T> {
    fn from_settings(settings: SettingsMap) -> Result<Self> {
        let input_chunk = get_typed::<usize>(&settings, "input_chunk").unwrap_or(1);
        let output_chunk = get_typed::<usize>(&settings, "output_chunk").unwrap_or(1);
        let max_output_per_call =
            get_typed::<usize>(&settings, "max_output_per_call").unwrap_or(usize::MAX);
        if input_chunk == 0 || output_chunk == 0 {
            return Err(FlowError::Configuration(
                "resampler chunk sizes must be non-zero".into(),
            ));
        }
        if output_chunk > input_chunk {
            return Err(FlowError::Configuration(
                "resampler output chunk must not exceed the input chunk".into(),
            ));
        }
        if max_output_per_call < output_chunk {
            return Err(FlowError::Configuration(
                "resampler output cap is smaller than one output chunk".into(),
            ));
        }
        Ok(Self {
            core: BlockCore::new("RatioResampler", settings),
            input: StreamInput::new("in"),
            output: StreamOutput::new("out"),
            input_chunk,
            output_chunk,
            max_output_per_call,
            invocations: 0,
            call_log: Vec::new(),
        })
    }

    fn core(&self) -> &BlockCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BlockCore {
        &mut self.core
    }

    fn input_port_decls(&self) -> Vec<PortDecl> {
        vec![PortDecl::single("in", self.input.as_dynamic())]
    }

    fn output_port_decls(&self) -> Vec<PortDecl> {
        vec![PortDecl::single("out", self.output.as_dynamic())]
    }

    fn work(&mut self, requested: usize) -> WorkResult {
        let input_groups = self.input.available() / self.input_chunk;
        let output_groups = self.output.available() / self.output_chunk;
        let cap_groups = self.max_output_per_call / self.output_chunk;
        let requested_groups = requested / self.output_chunk;
        let groups = input_groups
            .min(output_groups)
            .min(cap_groups)
            .min(requested_groups);

        if groups == 0 {
            let status = if input_groups == 0 {
                WorkStatus::InsufficientInputItems
            } else {
                WorkStatus::InsufficientOutputItems
            };
            return WorkResult::idle(status);
        }

        for _ in 0..groups {
            for position in 0..self.input_chunk {
                let Some(sample) = self.input.read() else {
                    break;
                };
                if position < self.output_chunk {
                    let _ = self.output.write(sample);
                }
            }
        }

        let consumed = groups * self.input_chunk;
        let produced = groups * self.output_chunk;
        self.invocations += 1;
        self.call_log.push((consumed, produced));
        WorkResult::ok(produced, consumed)
    }
}

impl<T: Send + 'static> InputPortAt<0> for RatioResampler<T> {
    type Element = T;
}

impl<T: Send + 'static> OutputPortAt<0> for RatioResampler<T> {
    type Element = T;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{StreamInput, StreamOutput};

    fn resampler(input_chunk: usize, output_chunk: usize) -> RatioResampler<u32> {
        let mut settings = SettingsMap::new();
        settings.insert("input_chunk".into(), input_chunk.into());
        settings.insert("output_chunk".into(), output_chunk.into());
        RatioResampler::from_settings(settings).unwrap()
    }

    fn wire(block: &RatioResampler<u32>) -> (StreamOutput<u32>, StreamInput<u32>) {
        let feeder = StreamOutput::<u32>::new("feeder");
        let drain = StreamInput::<u32>::new("drain");
        assert!(feeder
            .as_dynamic()
            .connect(&block.input.as_dynamic())
            .is_success());
        assert!(block
            .output
            .as_dynamic()
            .connect(&drain.as_dynamic())
            .is_success());
        (feeder, drain)
    }

    #[test]
    fn test_whole_groups_only() {
        let mut block = resampler(6, 5);
        let (feeder, drain) = wire(&block);
        for v in 0..16 {
            feeder.write(v).unwrap();
        }

        // 16 samples hold two whole groups of 6; the trailing 4 wait
        let result = block.work(usize::MAX);
        assert_eq!(result.consumed, 12);
        assert_eq!(result.produced, 10);
        assert_eq!(drain.read_all(), vec![0, 1, 2, 3, 4, 6, 7, 8, 9, 10]);

        assert_eq!(
            block.work(usize::MAX).status,
            WorkStatus::InsufficientInputItems
        );
    }

    #[test]
    fn test_output_cap_bounds_each_call() {
        let mut settings = SettingsMap::new();
        settings.insert("input_chunk".into(), 2.into());
        settings.insert("output_chunk".into(), 1.into());
        settings.insert("max_output_per_call".into(), 20.into());
        let mut block = RatioResampler::<u32>::from_settings(settings).unwrap();
        let (feeder, drain) = wire(&block);

        for v in 0..80 {
            feeder.write(v).unwrap();
        }
        assert_eq!(block.work(usize::MAX).consumed, 40);
        assert_eq!(block.work(usize::MAX).consumed, 40);
        assert_eq!(block.invocations(), 2);
        assert_eq!(block.call_log(), &[(40, 20), (40, 20)]);
        assert_eq!(drain.read_all().len(), 40);
    }

    #[test]
    fn test_invalid_configurations_are_rejected() {
        let mut settings = SettingsMap::new();
        settings.insert("input_chunk".into(), 2.into());
        settings.insert("output_chunk".into(), 3.into());
        assert!(RatioResampler::<u32>::from_settings(settings).is_err());

        let mut settings = SettingsMap::new();
        settings.insert("input_chunk".into(), 0.into());
        assert!(RatioResampler::<u32>::from_settings(settings).is_err());
    }
}
