// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Determinism and protocol invariants of the tick loop.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use serde_json::json;
use weft_core::{LifecycleEvent, TICK_ORDER};
use weft_protocol::{Batch, Codec, Command, Response};

#[test]
fn test_lifecycle_order_is_contractual() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let h = Harness::start(move |f| {
        for event in [
            LifecycleEvent::Signal,
            LifecycleEvent::Callback,
            LifecycleEvent::Query,
            LifecycleEvent::Tick,
        ] {
            let seen = recorder.clone();
            f.bus().subscribe(event, move || {
                seen.lock().unwrap().push(event);
            });
        }
        register_fixtures(f, "default");
    });

    h.tick(
        Some("default"),
        vec![start_workflow(1, "SignalCounterWorkflow", "wf-lo", &[])],
    );
    assert_eq!(*seen.lock().unwrap(), TICK_ORDER.to_vec());

    h.tick(
        Some("default"),
        vec![signal_workflow(2, "wf-lo", "add", &[json!(1)])],
    );
    let events = seen.lock().unwrap().clone();
    assert_eq!(events.len(), 8);
    assert_eq!(events[4..].to_vec(), TICK_ORDER.to_vec());
}

#[test]
fn test_exactly_one_response_per_inbound_request() {
    let h = Harness::start(|f| register_fixtures(f, "default"));

    let out = h.tick(
        Some("default"),
        vec![
            start_workflow(1, "SignalCounterWorkflow", "wf-inv", &[]),
            signal_workflow(2, "wf-inv", "add", &[json!(3)]),
            query_workflow(3, "wf-inv", "value", &[]),
        ],
    );
    // response_for asserts exactly one match per id.
    response_for(&out, 1);
    response_for(&out, 2);
    response_for(&out, 3);
}

#[test]
fn test_pending_slot_per_outbound_request_at_tick_end() {
    let h = Harness::start(|f| register_fixtures(f, "default"));

    let out = h.tick(
        Some("default"),
        vec![start_workflow(1, "SignalCounterWorkflow", "wf-pend", &[])],
    );
    let timer_id = request_named(&out, "NewTimer").id;
    assert_eq!(h.factory.client().pending_ids(), vec![timer_id]);

    // After the timer resolves, the completion command takes its place
    // as the only pending outbound request.
    let out = h.tick(Some("default"), vec![host_response(timer_id, vec![])]);
    let complete_id = request_named(&out, "CompleteWorkflow").id;
    assert_eq!(h.factory.client().pending_ids(), vec![complete_id]);
}

#[test]
fn test_identical_scripts_produce_identical_bytes() {
    let script = |h: &Harness| -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        frames.push(h.tick_raw(
            Some("default"),
            vec![start_workflow(1, "SignalCounterWorkflow", "wf-det", &[])],
        ));
        frames.push(h.tick_raw(
            Some("default"),
            vec![signal_workflow(2, "wf-det", "add", &[json!(-1)])],
        ));
        // The timer is the first outbound request the factory issued.
        frames.push(h.tick_raw(Some("default"), vec![host_response(1, vec![])]));
        frames
    };

    let first = script(&Harness::start(|f| register_fixtures(f, "default")));
    let second = script(&Harness::start(|f| register_fixtures(f, "default")));
    assert_eq!(first, second);
}

#[test]
fn test_unmatched_response_reports_protocol_error_and_continues() {
    let h = Harness::start(|f| register_fixtures(f, "default"));

    // A response nobody asked for: contained as a per-batch failure.
    let bad = h
        .factory
        .config()
        .codec
        .select()
        .encode(&[Command::Response(Response::ok(99, vec![]))])
        .unwrap();
    h.handle.push(Batch::new(bad));
    let error = h
        .handle
        .recv_error(Duration::from_secs(5))
        .expect("protocol error not reported");
    assert!(error.contains("protocol error"), "got: {}", error);

    // The loop survives and the queue-empty invariant holds.
    let out = h.tick(None, vec![get_worker_info(1)]);
    response_for(&out, 1).result.as_ref().unwrap();
    assert_eq!(out.len(), 1);
}

#[test]
fn test_malformed_batch_does_not_kill_loop() {
    let h = Harness::start(|f| register_fixtures(f, "default"));

    h.handle.push(Batch::new(b"garbage".to_vec()));
    assert!(h.handle.recv_error(Duration::from_secs(5)).is_some());

    let out = h.tick(
        Some("default"),
        vec![start_workflow(1, "UppercaseWorkflow", "wf-alive", &[json!("ok")])],
    );
    response_for(&out, 1).result.as_ref().unwrap();
    assert_eq!(h.finish(), 0);
}

#[test]
fn test_outbound_batch_reflects_append_order() {
    let h = Harness::start(|f| register_fixtures(f, "default"));

    let out = h.tick(
        Some("default"),
        vec![
            start_workflow(1, "UppercaseWorkflow", "wf-o1", &[json!("a")]),
            start_workflow(2, "UppercaseWorkflow", "wf-o2", &[json!("b")]),
        ],
    );

    // Interleaving: started(1), complete(o1), started(2), complete(o2).
    let kinds: Vec<String> = out
        .iter()
        .map(|c| match c {
            Command::Request(r) => format!("req:{}", r.options["workflowId"].as_str().unwrap()),
            Command::Response(r) => format!("resp:{}", r.id),
        })
        .collect();
    assert_eq!(kinds, vec!["resp:1", "req:wf-o1", "resp:2", "req:wf-o2"]);
}
