//! Compile-time fusion of pointwise kernels.
//!
//! Merging two kernels produces a new kernel whose `process_one` runs the
//! upstream kernel, threads its selected output straight into the downstream
//! kernel's selected input, and returns the concatenation of the remaining
//! outputs. The intermediate value lives in a register, never in a ring
//! buffer, so a fused chain costs one function call per sample instead of a
//! buffer hop per edge.
//!
//! Port lists are rewritten at the type level:
//!
//! ```text
//! inputs(fused)  = inputs(left) ++ (inputs(right)  \ IN_IX)
//! outputs(fused) = (outputs(left) \ OUT_IX) ++ outputs(right)
//! ```
//!
//! and the element type of `left`'s fused output must equal the element
//! type of `right`'s fused input, checked by the trait bounds of
//! [`merge_by_index`].

use std::sync::atomic::{AtomicU64, Ordering};

use crate::block::short_type_name;
use crate::error::Result;
use crate::meta::{Concat, RemoveAt, SpliceAt, SplitOff};
use crate::pointwise::{not_configurable, FromSettings, Pointwise, SampleTuple};
use crate::properties::SettingsMap;

static FUSED_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Element type produced on `L`'s fused output.
type Mid<L, const OUT_IX: usize> = <<L as Pointwise>::Outputs as RemoveAt<OUT_IX>>::Removed;
/// `L`'s outputs with the fused position removed.
type LeftRest<L, const OUT_IX: usize> = <<L as Pointwise>::Outputs as RemoveAt<OUT_IX>>::Rest;
/// `R`'s inputs with the fused position removed.
type RightRest<R, const IN_IX: usize> = <<R as Pointwise>::Inputs as RemoveAt<IN_IX>>::Rest;
type FusedInputs<L, R, const IN_IX: usize> =
    <<L as Pointwise>::Inputs as Concat<RightRest<R, IN_IX>>>::Output;
type FusedOutputs<L, R, const OUT_IX: usize> =
    <LeftRest<L, OUT_IX> as Concat<<R as Pointwise>::Outputs>>::Output;

/// Two pointwise kernels composed into one.
///
/// `left` is upstream: its output `OUT_IX` feeds `right`'s input `IN_IX`.
/// Both participants are held by value. Every instance carries a
/// process-wide sequential id and a printable unique name.
pub struct FusedBlock<L, R, const OUT_IX: usize, const IN_IX: usize> {
    left: L,
    right: R,
    unique_id: u64,
    unique_name: String,
}

impl<L, R, const OUT_IX: usize, const IN_IX: usize> FusedBlock<L, R, OUT_IX, IN_IX> {
    fn new(left: L, right: R) -> Self {
        let unique_id = FUSED_COUNTER.fetch_add(1, Ordering::SeqCst);
        let unique_name = format!(
            "Fused<{}:{},{}:{}>#{}",
            short_type_name(std::any::type_name::<L>()),
            OUT_IX,
            short_type_name(std::any::type_name::<R>()),
            IN_IX,
            unique_id,
        );
        Self {
            left,
            right,
            unique_id,
            unique_name,
        }
    }

    pub fn left(&self) -> &L {
        &self.left
    }

    pub fn right(&self) -> &R {
        &self.right
    }

    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }
}

impl<L, R, const OUT_IX: usize, const IN_IX: usize> Pointwise for FusedBlock<L, R, OUT_IX, IN_IX>
where
    L: Pointwise,
    R: Pointwise,
    L::Outputs: RemoveAt<OUT_IX>,
    // the fused pair must carry the same element type
    R::Inputs: RemoveAt<IN_IX, Removed = Mid<L, OUT_IX>>,
    RightRest<R, IN_IX>: SpliceAt<IN_IX, Mid<L, OUT_IX>, Spliced = R::Inputs>,
    L::Inputs: Concat<RightRest<R, IN_IX>>,
    FusedInputs<L, R, IN_IX>: SampleTuple + SplitOff<L::Inputs, Back = RightRest<R, IN_IX>>,
    LeftRest<L, OUT_IX>: Concat<R::Outputs>,
    FusedOutputs<L, R, OUT_IX>: SampleTuple,
{
    type Inputs = FusedInputs<L, R, IN_IX>;
    type Outputs = FusedOutputs<L, R, OUT_IX>;

    // fused kernels report their port names through the runtime accessors;
    // the const lists stay empty so a by-name merge against a fused side
    // fails at compile time instead of resolving a stale name
    const INPUT_NAMES: &'static [&'static str] = &[];
    const OUTPUT_NAMES: &'static [&'static str] = &[];

    fn process_one(&mut self, offset: usize, input: Self::Inputs) -> Self::Outputs {
        let (left_in, right_rest) = <Self::Inputs as SplitOff<L::Inputs>>::split_off(input);
        let left_out = self.left.process_one(offset, left_in);
        let (mid, left_rest) = <L::Outputs as RemoveAt<OUT_IX>>::remove_at(left_out);
        let right_in =
            <RightRest<R, IN_IX> as SpliceAt<IN_IX, Mid<L, OUT_IX>>>::splice_at(right_rest, mid);
        let right_out = self.right.process_one(offset, right_in);
        <LeftRest<L, OUT_IX> as Concat<R::Outputs>>::concat(left_rest, right_out)
    }

    fn work_chunk_limit(&self) -> usize {
        self.left.work_chunk_limit().min(self.right.work_chunk_limit())
    }

    fn input_names(&self) -> Vec<&'static str> {
        let mut names = self.left.input_names();
        let mut right = self.right.input_names();
        if IN_IX < right.len() {
            right.remove(IN_IX);
        }
        names.extend(right);
        names
    }

    fn output_names(&self) -> Vec<&'static str> {
        let mut names = self.left.output_names();
        if OUT_IX < names.len() {
            names.remove(OUT_IX);
        }
        names.extend(self.right.output_names());
        names
    }
}

impl<L, R, const OUT_IX: usize, const IN_IX: usize> FromSettings
    for FusedBlock<L, R, OUT_IX, IN_IX>
{
    fn from_settings(_settings: &SettingsMap) -> Result<Self> {
        Err(not_configurable("fused"))
    }
}

/// Merge two pointwise kernels, selecting the fused ports by index.
///
/// The element type of `left`'s output `OUT_IX` must equal the element type
/// of `right`'s input `IN_IX`; a mismatch fails to compile.
pub fn merge_by_index<const OUT_IX: usize, const IN_IX: usize, L, R>(
    left: L,
    right: R,
) -> FusedBlock<L, R, OUT_IX, IN_IX>
where
    L: Pointwise,
    R: Pointwise,
    FusedBlock<L, R, OUT_IX, IN_IX>: Pointwise,
{
    FusedBlock::new(left, right)
}

/// Merge two pointwise kernels, selecting the fused ports by declared name.
///
/// Names resolve to indices during const evaluation with the usual rule:
/// exactly one match, anything else fails the build.
///
/// ```ignore
/// let fused = merge_by_name!((Scale<i32>, "scaled"), (Adder<i32>, "addend0"), scale, adder);
/// ```
#[macro_export]
macro_rules! merge_by_name {
    (($left_ty:ty, $out_name:literal), ($right_ty:ty, $in_name:literal), $left:expr, $right:expr) => {{
        const OUT_IX: usize = $crate::meta::index_for_name(
            <$left_ty as $crate::pointwise::Pointwise>::OUTPUT_NAMES,
            $out_name,
        );
        const IN_IX: usize = $crate::meta::index_for_name(
            <$right_ty as $crate::pointwise::Pointwise>::INPUT_NAMES,
            $in_name,
        );
        $crate::fused::merge_by_index::<OUT_IX, IN_IX, $left_ty, $right_ty>($left, $right)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Adder, Scale};

    /// One input, two outputs: (x, x * 10). Exercises the multi-output
    /// concatenation path.
    struct Fork;

    impl Pointwise for Fork {
        type Inputs = (i32,);
        type Outputs = (i32, i32);
        const INPUT_NAMES: &'static [&'static str] = &["in"];
        const OUTPUT_NAMES: &'static [&'static str] = &["tap", "tenfold"];

        fn process_one(&mut self, _offset: usize, (x,): (i32,)) -> (i32, i32) {
            (x, x * 10)
        }
    }

    #[test]
    fn test_single_output_fast_path() {
        let mut fused = merge_by_index::<0, 0, _, _>(Scale::new(2), Scale::new(3));
        assert_eq!(fused.process_one(0, (5,)), (30,));
    }

    #[test]
    fn test_splice_into_multi_input_kernel() {
        // scale feeds the adder's first addend; the second stays external
        let mut fused = merge_by_index::<0, 0, _, _>(Scale::new(2), Adder::new());
        assert_eq!(fused.process_one(0, (3, 100)), (106,));

        // same participants, fused into the second addend
        let mut fused = merge_by_index::<0, 1, _, _>(Scale::new(2), Adder::new());
        assert_eq!(fused.process_one(0, (3, 100)), (106,));
    }

    #[test]
    fn test_multi_output_concatenation() {
        // Fork's second output is scaled; the first passes through, so the
        // fused kernel keeps it in front of the downstream outputs.
        let mut fused = merge_by_index::<1, 0, _, _>(Fork, Scale::new(2));
        assert_eq!(fused.process_one(0, (7,)), (7, 140));
        assert_eq!(fused.input_names(), vec!["in"]);
        assert_eq!(fused.output_names(), vec!["tap", "scaled"]);
    }

    #[test]
    fn test_nested_merge_shapes() {
        let fused = merge_by_index::<0, 0, _, _>(
            merge_by_index::<0, 0, _, _>(Adder::new(), Scale::new(2)),
            Scale::new(-1),
        );
        // 2 + 1 - 1 inputs, 1 + 1 - 1 outputs
        assert_eq!(fused.input_names().len(), 2);
        assert_eq!(fused.output_names().len(), 1);
    }

    #[test]
    fn test_fusion_identity_against_manual_composition() {
        let mut fused = merge_by_index::<0, 0, _, _>(Scale::new(2), Adder::new());
        let mut scale = Scale::new(2);
        let mut adder = Adder::new();
        for (a, b) in [(1, 10), (-3, 7), (0, 0), (12345, -5)] {
            let (scaled,) = scale.process_one(0, (a,));
            assert_eq!(fused.process_one(0, (a, b)), adder.process_one(0, (scaled, b)));
        }
    }

    #[test]
    fn test_merge_by_name_matches_merge_by_index() {
        let mut by_name = merge_by_name!(
            (Scale<i32>, "scaled"),
            (Adder<i32>, "addend1"),
            Scale::new(4),
            Adder::new()
        );
        let mut by_index = merge_by_index::<0, 1, _, _>(Scale::new(4), Adder::new());
        assert_eq!(by_name.process_one(0, (2, 5)), by_index.process_one(0, (2, 5)));
    }

    #[test]
    fn test_unique_identity() {
        let a = merge_by_index::<0, 0, _, _>(Scale::new(1), Scale::new(1));
        let b = merge_by_index::<0, 0, _, _>(Scale::new(1), Scale::new(1));
        assert_ne!(a.unique_id(), b.unique_id());
        assert_ne!(a.unique_name(), b.unique_name());
        assert!(a.unique_name().starts_with("Fused<Scale<i32>:0,Scale<i32>:0>#"));
    }

    #[test]
    fn test_merged_chunk_limit_is_minimum() {
        struct Limited(usize);
        impl Pointwise for Limited {
            type Inputs = (i32,);
            type Outputs = (i32,);
            const INPUT_NAMES: &'static [&'static str] = &["in"];
            const OUTPUT_NAMES: &'static [&'static str] = &["out"];
            fn process_one(&mut self, _offset: usize, input: (i32,)) -> (i32,) {
                input
            }
            fn work_chunk_limit(&self) -> usize {
                self.0
            }
        }

        let fused = merge_by_index::<0, 0, _, _>(Limited(8), Limited(3));
        assert_eq!(fused.work_chunk_limit(), 3);
    }
}
