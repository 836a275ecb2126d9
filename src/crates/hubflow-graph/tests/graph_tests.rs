//! Integration tests for the state graph runtime
//!
//! Covers routing, cycles, observation and streaming the way workflows use
//! them: small state structs threaded through a handful of nodes.

use futures::StreamExt;
use hubflow_graph::{
    GraphError, PathRecorder, StateGraph, StepObserver, StreamEvent, END, START,
};
use proptest::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
struct LoopState {
    cursor: usize,
    limit: usize,
    visits: Vec<usize>,
    done: bool,
}

/// init -> invoke -(continue)-> advance -> invoke -(complete)-> END
fn cursor_graph() -> hubflow_graph::CompiledGraph<LoopState> {
    let mut graph = StateGraph::<LoopState>::new("cursor");
    graph.add_node("init", |mut s: LoopState| async move {
        s.cursor = 0;
        s.visits.clear();
        s.done = false;
        Ok(s)
    });
    graph.add_node("invoke", |mut s: LoopState| async move {
        if s.cursor >= s.limit {
            s.done = true;
        } else {
            s.visits.push(s.cursor);
        }
        Ok(s)
    });
    graph.add_node("advance", |mut s: LoopState| async move {
        s.cursor += 1;
        Ok(s)
    });
    graph.add_edge(START, "init");
    graph.add_edge("init", "invoke");
    graph.add_conditional_edge(
        "invoke",
        |s: &LoopState| {
            if s.done {
                "complete".to_string()
            } else {
                "continue".to_string()
            }
        },
        [("complete", END), ("continue", "advance")],
    );
    graph.add_edge("advance", "invoke");
    graph.compile().expect("cursor graph compiles")
}

#[tokio::test]
async fn test_cycle_visits_every_index_once() {
    let compiled = cursor_graph();
    let result = compiled
        .invoke(LoopState {
            limit: 4,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.visits, vec![0, 1, 2, 3]);
    assert_eq!(result.cursor, 4);
    assert!(result.done);
}

#[tokio::test]
async fn test_zero_iterations_completes_immediately() {
    let compiled = cursor_graph();
    let mut recorder = PathRecorder::new();
    let result = compiled
        .invoke_with_observer(LoopState::default(), &mut recorder)
        .await
        .unwrap();

    assert!(result.done);
    assert!(result.visits.is_empty());
    assert_eq!(recorder.path(), &["init", "invoke"]);
}

#[tokio::test]
async fn test_observer_sees_each_transition_in_order() {
    let compiled = cursor_graph();
    let mut recorder = PathRecorder::new();
    compiled
        .invoke_with_observer(
            LoopState {
                limit: 2,
                ..Default::default()
            },
            &mut recorder,
        )
        .await
        .unwrap();

    assert_eq!(
        recorder.path(),
        &["init", "invoke", "advance", "invoke", "advance", "invoke"]
    );
}

#[test]
fn test_introspection_lists_nodes_and_branches() {
    let compiled = cursor_graph();

    assert_eq!(compiled.node_names(), vec!["advance", "init", "invoke"]);
    assert_eq!(
        compiled.branches("invoke"),
        Some(vec![("complete", END), ("continue", "advance")])
    );
    assert_eq!(compiled.branches("init"), None);
    assert_eq!(compiled.branches("missing"), None);
}

#[tokio::test]
async fn test_set_entry_starts_at_node() {
    let mut graph = StateGraph::<u32>::new("entry");
    graph.add_node("double", |n: u32| async move { Ok(n * 2) });
    graph.set_entry("double");
    graph.add_edge("double", END);
    let compiled = graph.compile().unwrap();

    let mut recorder = PathRecorder::new();
    assert_eq!(compiled.invoke_with_observer(21, &mut recorder).await.unwrap(), 42);
    assert_eq!(recorder.path(), &["double"]);

    let mut twice = StateGraph::<u32>::new("two_entries");
    twice.add_node("a", |n: u32| async move { Ok(n) });
    twice.add_edge(START, "a");
    twice.set_entry("a");
    twice.add_edge("a", END);
    assert!(twice.compile().is_err());
}

#[tokio::test]
async fn test_unmapped_label_is_routing_error() {
    let mut graph = StateGraph::<u32>::new("bad_router");
    graph.add_node("check", |n: u32| async move { Ok(n) });
    graph.add_edge(START, "check");
    graph.add_conditional_edge(
        "check",
        |n: &u32| if *n == 0 { "zero".to_string() } else { "other".to_string() },
        [("zero", END)],
    );
    let compiled = graph.compile().unwrap();

    assert_eq!(compiled.invoke(0).await.unwrap(), 0);

    let err = compiled.invoke(7).await.unwrap_err();
    assert_eq!(err, GraphError::routing("check", "other"));
    assert!(err.is_configuration_error());
}

#[tokio::test]
async fn test_node_error_propagates_unchanged() {
    let mut graph = StateGraph::<u32>::new("failing");
    graph.add_node("explode", |_n: u32| async move {
        Err(GraphError::node_execution("explode", "boom"))
    });
    graph.add_edge(START, "explode");
    graph.add_edge("explode", END);

    let err = graph.compile().unwrap().invoke(1).await.unwrap_err();
    assert_eq!(err, GraphError::node_execution("explode", "boom"));
}

#[tokio::test]
async fn test_stream_yields_updates_then_complete() {
    let compiled = cursor_graph();
    let events: Vec<StreamEvent<LoopState>> = compiled
        .stream(LoopState {
            limit: 1,
            ..Default::default()
        })
        .collect()
        .await;

    let nodes: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Update { node, .. } => Some(node.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(nodes, vec!["init", "invoke", "advance", "invoke"]);

    match events.last() {
        Some(StreamEvent::Complete { state }) => assert_eq!(state.visits, vec![0]),
        other => panic!("expected Complete, got {:?}", other),
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_stream_ends_with_error_event() {
    let mut graph = StateGraph::<u32>::new("stream_failure");
    graph.add_node("ok", |n: u32| async move { Ok(n + 1) });
    graph.add_node("fail", |_n: u32| async move {
        Err(GraphError::Execution("downstream unavailable".to_string()))
    });
    graph.add_edge(START, "ok");
    graph.add_edge("ok", "fail");
    graph.add_edge("fail", END);

    let events: Vec<_> = graph.compile().unwrap().stream(0).collect().await;
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0],
        StreamEvent::Update {
            node: "ok".to_string(),
            state: 1
        }
    );
    assert!(matches!(events[1], StreamEvent::Error { .. }));
}

struct SlowObserver;

#[async_trait::async_trait]
impl StepObserver<LoopState> for SlowObserver {
    async fn on_step(&mut self, _node: &str, _state: &LoopState) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_observed_and_unobserved_runs_agree() {
    let compiled = cursor_graph();
    let input = LoopState {
        limit: 3,
        ..Default::default()
    };

    let plain = compiled.invoke(input.clone()).await.unwrap();
    let observed = compiled
        .invoke_with_observer(input, &mut SlowObserver)
        .await
        .unwrap();

    assert_eq!(plain, observed);
}

proptest! {
    #[test]
    fn prop_cursor_reaches_limit(limit in 0usize..40) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let result = rt
            .block_on(cursor_graph().invoke(LoopState { limit, ..Default::default() }))
            .unwrap();

        prop_assert_eq!(result.cursor, limit);
        prop_assert!(result.done);
        prop_assert_eq!(result.visits, (0..limit).collect::<Vec<_>>());
    }
}
