//! Build a small flow graph twice: once as discrete blocks, once with the
//! pointwise stages fused into a single kernel, and show both produce the
//! same samples.
//!
//! Run with: cargo run --example fused_pipeline

use sigflow::blocks::{Adder, CollectSink, Scale, VectorSource};
use sigflow::fused::merge_by_index;
use sigflow::pointwise::PointwiseBlock;
use sigflow::{Graph, SimpleScheduler};

fn main() -> sigflow::Result<()> {
    tracing_subscriber::fmt().init();

    let a = vec![1i32, 2, 3, 4];
    let b = vec![10i32, 10, 10, 10];

    // discrete: a,b -> adder -> scale(2) -> scale(-1) -> sink
    let mut graph = Graph::new();
    let src_a = graph.insert_block(VectorSource::new(a.clone()));
    let src_b = graph.insert_block(VectorSource::new(b.clone()));
    let adder = graph.insert_block(PointwiseBlock::new(Adder::<i32>::new()));
    let double = graph.insert_block(PointwiseBlock::new(Scale::new(2)));
    let negate = graph.insert_block(PointwiseBlock::new(Scale::new(-1)));
    let collect = graph.emplace_block::<CollectSink<i32>>(Default::default())?;

    assert!(graph.connect::<0, _>(src_a).to::<0, _>(adder).is_success());
    assert!(graph.connect::<0, _>(src_b).to::<1, _>(adder).is_success());
    assert!(graph.connect::<0, _>(adder).to::<0, _>(double).is_success());
    assert!(graph.connect::<0, _>(double).to::<0, _>(negate).is_success());
    assert!(graph.connect::<0, _>(negate).to::<0, _>(collect).is_success());
    assert!(graph.perform_connections());
    SimpleScheduler::new().run(&mut graph)?;
    let discrete = graph.block(collect).unwrap().samples().to_vec();

    // fused: the three pointwise stages collapse into one kernel, so each
    // sample takes one call instead of three buffer hops
    let mut graph = Graph::new();
    let src_a = graph.insert_block(VectorSource::new(a));
    let src_b = graph.insert_block(VectorSource::new(b));
    let fused = graph.insert_block(PointwiseBlock::new(merge_by_index::<0, 0, _, _>(
        merge_by_index::<0, 0, _, _>(Adder::<i32>::new(), Scale::new(2)),
        Scale::new(-1),
    )));
    let collect = graph.emplace_block::<CollectSink<i32>>(Default::default())?;

    assert!(graph.connect::<0, _>(src_a).to::<0, _>(fused).is_success());
    assert!(graph.connect::<0, _>(src_b).to::<1, _>(fused).is_success());
    assert!(graph.connect::<0, _>(fused).to::<0, _>(collect).is_success());
    assert!(graph.perform_connections());
    SimpleScheduler::new().run(&mut graph)?;
    let merged = graph.block(collect).unwrap().samples().to_vec();

    println!("discrete pipeline: {discrete:?}");
    println!("fused pipeline:    {merged:?}");
    assert_eq!(discrete, merged);
    Ok(())
}
