// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use profile_export::events::{
    Frame, MemallocEvent, StackSample, ThreadContext,
};
use profile_export::{EventBatch, PprofExporter};

fn frame(name: &str, line: i64) -> Frame {
    Frame {
        filename: "service.py".to_string(),
        lineno: line,
        funcname: Some(name.to_string()),
    }
}

fn thread() -> ThreadContext {
    ThreadContext {
        thread_id: Some(7),
        native_id: Some(123),
        thread_name: Some("Worker-1".to_string()),
    }
}

#[test]
fn cpu_samples_with_identical_stacks_and_labels_fold_into_one_sample() {
    let stack = vec![frame("handle", 12), frame("dispatch", 40)];
    let mut batch = EventBatch::default();
    for _ in 0..2 {
        batch.stack_samples.push(StackSample {
            frames: stack.clone(),
            nframes: 2,
            thread: thread(),
            task: Default::default(),
            trace: Default::default(),
            cpu_time_ns: 10_000_000,
            wall_time_ns: 10_000_000,
            period_ns: 10_000_000,
        });
    }

    let exporter = PprofExporter::new();
    let profile = exporter
        .export(batch, "my-service", 0, 2_000_000_000)
        .unwrap();

    assert_eq!(profile.sample.len(), 1);
    let cpu_samples_idx = profile
        .sample_type
        .iter()
        .position(|vt| profile.string_table[vt.r#type as usize] == "cpu-samples")
        .unwrap();
    assert_eq!(profile.sample[0].value[cpu_samples_idx], 2);
}

#[test]
fn allocation_frames_beyond_the_captured_depth_collapse_to_one_omitted_location() {
    let frames = vec![frame("a", 1), frame("b", 2), frame("c", 3)];
    let mut batch = EventBatch::default();
    batch.memallocs.push(MemallocEvent {
        frames,
        nframes: 5,
        thread: thread(),
        nevents: 1,
        size: 64,
        capture_pct: 100.0,
    });

    let exporter = PprofExporter::new();
    let profile = exporter.export(batch, "my-service", 0, 1).unwrap();

    assert_eq!(profile.sample[0].location_id.len(), 4);
    assert_eq!(profile.location.len(), 4);
}

#[test]
fn program_name_is_recorded_on_the_single_mapping_entry() {
    let exporter = PprofExporter::new();
    let profile = exporter
        .export(EventBatch::default(), "my-service", 0, 0)
        .unwrap();

    assert_eq!(profile.mapping.len(), 1);
    let name_id = profile.mapping[0].filename as usize;
    assert_eq!(profile.string_table[name_id], "my-service");
}
