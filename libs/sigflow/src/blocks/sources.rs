//! Source blocks: produce samples, consume nothing.

use serde::de::DeserializeOwned;

use crate::block::{Block, BlockCore, OutputPortAt, PortDecl, WorkResult, WorkStatus};
use crate::error::{FlowError, Result};
use crate::port::StreamOutput;
use crate::properties::{get_typed, SettingsMap};

/// Emits the half-open range `[start, start + count)` and then reports
/// `Done`.
pub struct CountingSource {
    core: BlockCore,
    output: StreamOutput<u32>,
    next: u32,
    end: u32,
}

impl Block for CountingSource {
    fn from_settings(settings: SettingsMap) -> Result<Self> {
        let start = get_typed::<u32>(&settings, "start").unwrap_or(0);
        let count = get_typed::<u32>(&settings, "count").unwrap_or(0);
        let end = start.checked_add(count).ok_or_else(|| {
            FlowError::Configuration("counting range overflows u32".into())
        })?;
        Ok(Self {
            core: BlockCore::new("CountingSource", settings),
            output: StreamOutput::new("out"),
            next: start,
            end,
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
        vec![PortDecl::single("out", self.output.as_dynamic())]
    }

    fn work(&mut self, requested: usize) -> WorkResult {
        let remaining = (self.end - self.next) as usize;
        if remaining == 0 {
            return WorkResult::idle(WorkStatus::Done);
        }
        let n = remaining.min(self.output.available()).min(requested);
        if n == 0 {
            return WorkResult::idle(WorkStatus::InsufficientOutputItems);
        }
        for _ in 0..n {
            let _ = self.output.write(self.next);
            self.next += 1;
        }
        WorkResult::ok(n, 0)
    }
}

impl OutputPortAt<0> for CountingSource {
    type Element = u32;
}

/// Plays back a fixed sample vector and then reports `Done`.
pub struct VectorSource<T: Send + 'static> {
    core: BlockCore,
    output: StreamOutput<T>,
    samples: Vec<T>,
}

impl<T: Send + 'static> VectorSource<T> {
    pub fn new(samples: Vec<T>) -> Self {
        Self {
            core: BlockCore::new("VectorSource", SettingsMap::new()),
            output: StreamOutput::new("out"),
            samples,
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }

    fn emit(&mut self, requested: usize) -> WorkResult {
        if self.samples.is_empty() {
            return WorkResult::idle(WorkStatus::Done);
        }
        let n = self
            .samples
            .len()
            .min(self.output.available())
            .min(requested);
        if n == 0 {
            return WorkResult::idle(WorkStatus::InsufficientOutputItems);
        }
        for sample in self.samples.drain(..n) {
            let _ = self.output.write(sample);
        }
        WorkResult::ok(n, 0)
    }
}

impl<T: DeserializeOwned + Send + 'static> Block for VectorSource<T> {
    fn from_settings(settings: SettingsMap) -> Result<Self> {
        let samples = get_typed::<Vec<T>>(&settings, "samples").unwrap_or_default();
        let mut source = Self::new(samples);
        source.core = BlockCore::new("VectorSource", settings);
        Ok(source)
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
        vec![PortDecl::single("out", self.output.as_dynamic())]
    }

    fn work(&mut self, requested: usize) -> WorkResult {
        self.emit(requested)
    }
}

impl<T: Send + 'static> OutputPortAt<0> for VectorSource<T> {
    type Element = T;
}
