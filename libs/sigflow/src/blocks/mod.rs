//! Standard blocks and kernels shipped with the runtime.

pub mod arithmetic;
pub mod resampler;
pub mod sinks;
pub mod sources;

pub use arithmetic::{Adder, Passthrough, Scale};
pub use resampler::RatioResampler;
pub use sinks::{CollectSink, NullSink};
pub use sources::{CountingSource, VectorSource};
