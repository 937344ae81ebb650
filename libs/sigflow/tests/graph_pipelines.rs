//! End-to-end pipeline tests: graph construction, the two-phase connection
//! protocol, scheduling, resampling, and fusion.

use sigflow::blocks::{Adder, CollectSink, CountingSource, Passthrough, RatioResampler, Scale, VectorSource};
use sigflow::fused::merge_by_index;
use sigflow::pointwise::{Pointwise, PointwiseBlock};
use sigflow::properties::{get_typed, property, Message, SettingsMap};
use sigflow::{
    Block, BlockAdapter, BlockCore, ConnectionResult, Graph, LifecycleState, PortDecl,
    SimpleScheduler, WorkResult, WorkStatus,
};

fn settings(entries: &[(&str, serde_json::Value)]) -> SettingsMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn two_block_pipeline_delivers_in_order() {
    let mut graph = Graph::new();
    let source = graph
        .emplace_block::<CountingSource>(property("count", 1024))
        .unwrap();
    let identity = graph
        .emplace_block::<PointwiseBlock<Passthrough<u32>>>(SettingsMap::new())
        .unwrap();
    let sink = graph
        .emplace_block::<CollectSink<u32>>(SettingsMap::new())
        .unwrap();

    assert!(graph.connect::<0, _>(source).to::<0, _>(identity).is_success());
    assert!(graph.connect::<0, _>(identity).to::<0, _>(sink).is_success());
    assert!(graph.perform_connections());
    assert_eq!(graph.edges().len(), 2);

    SimpleScheduler::new().run(&mut graph).unwrap();

    let received = graph.block(sink).unwrap().samples();
    assert_eq!(received.len(), 1024);
    assert!(received.iter().copied().eq(0..1024));
}

#[test]
fn resampler_five_out_of_six_drops_incomplete_tail() {
    let mut graph = Graph::new();
    let source = graph
        .emplace_block::<CountingSource>(property("count", 1000))
        .unwrap();
    let resampler = graph
        .emplace_block::<RatioResampler<u32>>(settings(&[
            ("input_chunk", 6.into()),
            ("output_chunk", 5.into()),
        ]))
        .unwrap();
    let sink = graph
        .emplace_block::<CollectSink<u32>>(SettingsMap::new())
        .unwrap();

    assert!(graph.connect::<0, _>(source).to::<0, _>(resampler).is_success());
    assert!(graph.connect::<0, _>(resampler).to::<0, _>(sink).is_success());

    SimpleScheduler::new().run(&mut graph).unwrap();

    // 166 whole groups of 6 yield 830 samples; the trailing 4 are dropped
    assert_eq!(graph.block(sink).unwrap().samples().len(), 830);
}

#[test]
fn resampler_output_cap_splits_work_calls() {
    let mut graph = Graph::new();
    let source = graph
        .emplace_block::<CountingSource>(property("count", 80))
        .unwrap();
    let resampler = graph
        .emplace_block::<RatioResampler<u32>>(settings(&[
            ("input_chunk", 2.into()),
            ("output_chunk", 1.into()),
            ("max_output_per_call", 20.into()),
        ]))
        .unwrap();
    let sink = graph
        .emplace_block::<CollectSink<u32>>(SettingsMap::new())
        .unwrap();

    assert!(graph.connect::<0, _>(source).to::<0, _>(resampler).is_success());
    assert!(graph.connect::<0, _>(resampler).to::<0, _>(sink).is_success());

    SimpleScheduler::new().run(&mut graph).unwrap();

    let resampler = graph.block(resampler).unwrap();
    assert_eq!(resampler.invocations(), 2);
    assert_eq!(resampler.call_log(), &[(40, 20), (40, 20)]);
    assert_eq!(graph.block(sink).unwrap().samples().len(), 40);
}

#[test]
fn static_connect_by_name_then_repeat_is_already_connected() {
    let mut graph = Graph::new();
    let a = graph
        .emplace_block::<PointwiseBlock<Passthrough<u32>>>(SettingsMap::new())
        .unwrap();
    let b = graph
        .emplace_block::<PointwiseBlock<Passthrough<u32>>>(SettingsMap::new())
        .unwrap();

    assert_eq!(
        graph.connect_name(a, "out").to_name(b, "in"),
        ConnectionResult::Success
    );
    assert!(graph.perform_connections());
    assert_eq!(graph.edges().len(), 1);

    assert_eq!(
        graph.connect_by_name(a.id(), "out", b.id(), "in"),
        ConnectionResult::AlreadyConnected
    );
    assert_eq!(graph.edges().len(), 1);
}

#[test]
fn dynamic_connect_rejects_foreign_block() {
    let mut graph = Graph::new();
    let registered = graph
        .emplace_block::<CountingSource>(property("count", 8))
        .unwrap();

    // constructed outside any graph
    let foreign = BlockAdapter::<CollectSink<u32>>::from_settings(SettingsMap::new()).unwrap();

    assert_eq!(
        graph.connect_dynamic(registered.id(), 0, foreign.id(), 0),
        ConnectionResult::Failed
    );
    assert!(graph.edges().is_empty());
}

#[test]
fn declared_port_names_resolve_to_declared_indices() {
    let mut graph = Graph::new();
    let adder = graph
        .emplace_block::<PointwiseBlock<Adder<i32>>>(SettingsMap::new())
        .unwrap();
    let handle = graph.handle_mut(adder.id()).unwrap();

    for (i, name) in ["addend0", "addend1"].into_iter().enumerate() {
        assert_eq!(handle.dynamic_input_port_index(name), Ok(i));
        let port = handle.dynamic_input_port(i, None).unwrap();
        assert_eq!(port.name(), name);
    }
    assert_eq!(handle.dynamic_output_port_index("sum"), Ok(0));
}

#[test]
fn fused_chain_matches_expected_series() {
    // adder -> scale(2) -> scale(-1), fused into one kernel
    let mut fused = merge_by_index::<0, 0, _, _>(
        merge_by_index::<0, 0, _, _>(Adder::<i32>::new(), Scale::new(2)),
        Scale::new(-1),
    );

    let a = [1, 2, 3, 4];
    let b = [10, 10, 10, 10];
    let out: Vec<i32> = a
        .iter()
        .zip(&b)
        .enumerate()
        .map(|(i, (&x, &y))| fused.process_one(i, (x, y)).0)
        .collect();
    assert_eq!(out, vec![-22, -24, -26, -28]);

    // shape: 2 + 1 - 1 inputs, 1 + 1 - 1 outputs
    assert_eq!(fused.input_names().len(), 2);
    assert_eq!(fused.output_names().len(), 1);
}

#[test]
fn fused_chain_runs_inside_a_graph() {
    let mut graph = Graph::new();
    let a = graph.insert_block(VectorSource::new(vec![1i32, 2, 3, 4]));
    let b = graph.insert_block(VectorSource::new(vec![10i32, 10, 10, 10]));
    let fused = graph.insert_block(PointwiseBlock::new(merge_by_index::<0, 0, _, _>(
        merge_by_index::<0, 0, _, _>(Adder::<i32>::new(), Scale::new(2)),
        Scale::new(-1),
    )));
    let sink = graph
        .emplace_block::<CollectSink<i32>>(SettingsMap::new())
        .unwrap();

    assert!(graph.connect::<0, _>(a).to::<0, _>(fused).is_success());
    assert!(graph.connect::<0, _>(b).to::<1, _>(fused).is_success());
    assert!(graph.connect::<0, _>(fused).to::<0, _>(sink).is_success());

    SimpleScheduler::new().run(&mut graph).unwrap();
    assert_eq!(graph.block(sink).unwrap().samples(), &[-22, -24, -26, -28]);
}

/// Minimal message-consuming block used to exercise the message-port pair
/// end to end.
struct CommandProbe {
    core: BlockCore,
    commands: Vec<String>,
}

impl Block for CommandProbe {
    fn from_settings(settings: SettingsMap) -> sigflow::Result<Self> {
        Ok(Self {
            core: BlockCore::new("CommandProbe", settings),
            commands: Vec::new(),
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
        if let Some(command) = get_typed::<String>(&message, "command") {
            self.commands.push(command);
        }
    }
}

#[test]
fn messages_flow_between_connected_message_ports() {
    let mut graph = Graph::new();
    let talker = graph
        .emplace_block::<PointwiseBlock<Passthrough<u32>>>(SettingsMap::new())
        .unwrap();
    let probe = graph.emplace_block::<CommandProbe>(SettingsMap::new()).unwrap();

    assert_eq!(graph.connect_message(talker).to_message(probe), ConnectionResult::Success);
    assert!(graph.perform_connections());

    graph
        .block(talker)
        .unwrap()
        .core()
        .msg_out()
        .write(property("command", "flush"))
        .unwrap();

    SimpleScheduler::new().run(&mut graph).unwrap();
    assert_eq!(graph.block(probe).unwrap().commands, vec!["flush"]);
}

#[test]
fn lifecycle_follows_the_scheduler() {
    let mut graph = Graph::new();
    let source = graph
        .emplace_block::<CountingSource>(property("count", 4))
        .unwrap();
    let sink = graph
        .emplace_block::<CollectSink<u32>>(SettingsMap::new())
        .unwrap();
    assert!(graph.connect::<0, _>(source).to::<0, _>(sink).is_success());

    graph.for_each_block(|block| assert_eq!(block.state(), LifecycleState::Initialised));
    SimpleScheduler::new().run(&mut graph).unwrap();
    graph.for_each_block(|block| assert_eq!(block.state(), LifecycleState::Stopped));
}
