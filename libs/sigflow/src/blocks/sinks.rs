//! Sink blocks: consume samples, produce nothing.

use crate::block::{Block, BlockCore, InputPortAt, PortDecl, WorkResult, WorkStatus};
use crate::error::Result;
use crate::port::StreamInput;
use crate::properties::SettingsMap;

/// Collects every received sample, in arrival order.
pub struct CollectSink<T: Send + 'static> {
    core: BlockCore,
    input: StreamInput<T>,
    collected: Vec<T>,
}

impl<T: Send + 'static> CollectSink<T> {
    pub fn samples(&self) -> &[T] {
        &self.collected
    }

    pub fn take_samples(&mut self) -> Vec<T> {
        std::mem::take(&mut self.collected)
    }
}

impl<T: Send + 'static> Block for CollectSink<T> {
    fn from_settings(settings: SettingsMap) -> Result<Self> {
        Ok(Self {
            core: BlockCore::new("CollectSink", settings),
            input: StreamInput::new("in"),
            collected: Vec::new(),
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
        Vec::new()
    }

    fn work(&mut self, requested: usize) -> WorkResult {
        let n = self.input.available().min(requested);
        if n == 0 {
            return WorkResult::idle(WorkStatus::InsufficientInputItems);
        }
        self.collected.reserve(n);
        for _ in 0..n {
            match self.input.read() {
                Some(sample) => self.collected.push(sample),
                None => break,
            }
        }
        WorkResult::ok(0, n)
    }
}

impl<T: Send + 'static> InputPortAt<0> for CollectSink<T> {
    type Element = T;
}

/// Discards every received sample, keeping only a count.
pub struct NullSink<T: Send + 'static> {
    core: BlockCore,
    input: StreamInput<T>,
    discarded: u64,
}

impl<T: Send + 'static> NullSink<T> {
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl<T: Send + 'static> Block for NullSink<T> {
    fn from_settings(settings: SettingsMap) -> Result<Self> {
        Ok(Self {
            core: BlockCore::new("NullSink", settings),
            input: StreamInput::new("in"),
            discarded: 0,
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
        Vec::new()
    }

    fn work(&mut self, requested: usize) -> WorkResult {
        let n = self.input.available().min(requested);
        if n == 0 {
            return WorkResult::idle(WorkStatus::InsufficientInputItems);
        }
        for _ in 0..n {
            if self.input.read().is_none() {
                break;
            }
        }
        self.discarded += n as u64;
        WorkResult::ok(0, n)
    }
}

impl<T: Send + 'static> InputPortAt<0> for NullSink<T> {
    type Element = T;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::StreamOutput;

    #[test]
    fn test_collect_sink_preserves_order() {
        let mut sink = CollectSink::<u32>::from_settings(SettingsMap::new()).unwrap();
        let feeder = StreamOutput::<u32>::new("feeder");
        assert!(feeder
            .as_dynamic()
            .connect(&sink.input.as_dynamic())
            .is_success());

        for v in [3, 1, 4, 1, 5] {
            feeder.write(v).unwrap();
        }
        let result = sink.work(usize::MAX);
        assert_eq!(result.consumed, 5);
        assert_eq!(sink.samples(), &[3, 1, 4, 1, 5]);
    }

    #[test]
    fn test_collect_sink_respects_budget() {
        let mut sink = CollectSink::<u32>::from_settings(SettingsMap::new()).unwrap();
        let feeder = StreamOutput::<u32>::new("feeder");
        feeder.as_dynamic().connect(&sink.input.as_dynamic());
        for v in 0..10 {
            feeder.write(v).unwrap();
        }
        assert_eq!(sink.work(4).consumed, 4);
        assert_eq!(sink.samples().len(), 4);
    }

    #[test]
    fn test_null_sink_counts() {
        let mut sink = NullSink::<u8>::from_settings(SettingsMap::new()).unwrap();
        let feeder = StreamOutput::<u8>::new("feeder");
        feeder.as_dynamic().connect(&sink.input.as_dynamic());
        for v in 0..7 {
            feeder.write(v).unwrap();
        }
        sink.work(usize::MAX);
        assert_eq!(sink.discarded(), 7);
    }
}
