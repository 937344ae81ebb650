//! Pointwise arithmetic kernels.

use std::marker::PhantomData;
use std::ops::{Add, Mul};

use serde::de::DeserializeOwned;

use crate::error::{FlowError, Result};
use crate::pointwise::{FromSettings, Pointwise};
use crate::properties::{get_typed, SettingsMap};

/// Multiply every sample by a constant factor.
#[derive(Debug, Clone, Copy)]
pub struct Scale<T> {
    factor: T,
}

impl<T> Scale<T> {
    pub fn new(factor: T) -> Self {
        Self { factor }
    }

    pub fn factor(&self) -> &T {
        &self.factor
    }
}

impl<T> Pointwise for Scale<T>
where
    T: Mul<Output = T> + Copy + Send + 'static,
{
    type Inputs = (T,);
    type Outputs = (T,);
    const INPUT_NAMES: &'static [&'static str] = &["original"];
    const OUTPUT_NAMES: &'static [&'static str] = &["scaled"];

    fn process_one(&mut self, _offset: usize, (x,): (T,)) -> (T,) {
        (x * self.factor,)
    }
}

impl<T> FromSettings for Scale<T>
where
    T: DeserializeOwned + Mul<Output = T> + Copy + Send + 'static,
{
    fn from_settings(settings: &SettingsMap) -> Result<Self> {
        let factor = get_typed::<T>(settings, "factor")
            .ok_or_else(|| FlowError::Configuration("scale requires a \"factor\" setting".into()))?;
        Ok(Self::new(factor))
    }
}

/// Sum two streams sample by sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct Adder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Adder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Pointwise for Adder<T>
where
    T: Add<Output = T> + Send + 'static,
{
    type Inputs = (T, T);
    type Outputs = (T,);
    const INPUT_NAMES: &'static [&'static str] = &["addend0", "addend1"];
    const OUTPUT_NAMES: &'static [&'static str] = &["sum"];

    fn process_one(&mut self, _offset: usize, (a, b): (T, T)) -> (T,) {
        (a + b,)
    }
}

impl<T> FromSettings for Adder<T> {
    fn from_settings(_settings: &SettingsMap) -> Result<Self> {
        Ok(Self::new())
    }
}

/// Forward samples unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Passthrough<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Pointwise for Passthrough<T>
where
    T: Send + 'static,
{
    type Inputs = (T,);
    type Outputs = (T,);
    const INPUT_NAMES: &'static [&'static str] = &["in"];
    const OUTPUT_NAMES: &'static [&'static str] = &["out"];

    fn process_one(&mut self, _offset: usize, input: (T,)) -> (T,) {
        input
    }
}

impl<T> FromSettings for Passthrough<T> {
    fn from_settings(_settings: &SettingsMap) -> Result<Self> {
        Ok(Self::new())
    }
}
