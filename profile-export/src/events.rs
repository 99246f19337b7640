// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event-tuple types delivered by the profiling sample collectors (out of
//! scope per spec.md §1) and consumed by [`crate::converter::PprofConverter`]
//! / [`crate::exporter::PprofExporter`].

/// One frame of a call stack: `(filename, lineno, funcname)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    pub filename: String,
    pub lineno: i64,
    pub funcname: Option<String>,
}

/// Fields shared by every stack-shaped event: thread identity, the task
/// scheduling it (for green-thread runtimes), and the trace it belongs to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadContext {
    pub thread_id: Option<i64>,
    pub native_id: Option<i64>,
    pub thread_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskContext {
    pub task_id: Option<i64>,
    pub task_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceContext {
    pub trace_id: Option<u64>,
    pub span_id: Option<u64>,
    pub trace_endpoint: Option<String>,
    pub trace_type: Option<String>,
}

impl TraceContext {
    /// Per spec.md §4.6: when `trace_type != "web"`, `trace endpoint` is
    /// exported as the empty string regardless of what was recorded.
    pub fn exported_endpoint(&self) -> &str {
        match self.trace_type.as_deref() {
            Some("web") => self.trace_endpoint.as_deref().unwrap_or(""),
            _ => "",
        }
    }
}

/// A CPU/wall-time sample: one interrupt or scheduler tick captured on a
/// given thread's call stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackSample {
    pub frames: Vec<Frame>,
    pub nframes: usize,
    pub thread: ThreadContext,
    pub task: TaskContext,
    pub trace: TraceContext,
    pub cpu_time_ns: i64,
    pub wall_time_ns: i64,
    /// The collector's configured sampling period at the time this sample
    /// was taken, in nanoseconds. Averaged across all stack samples in a
    /// batch to produce the profile's overall `period`.
    pub period_ns: i64,
}

/// An uncaught (or logged) exception captured with its stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackExceptionEvent {
    pub frames: Vec<Frame>,
    pub nframes: usize,
    pub thread: ThreadContext,
    pub task: TaskContext,
    pub trace: TraceContext,
    pub exception_type: String,
}

/// One (possibly downsampled) allocation record. `nevents` is the number of
/// individual allocations this single record stands in for; `capture_pct`
/// is the sampler's capture percentage at the time it was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct MemallocEvent {
    pub frames: Vec<Frame>,
    pub nframes: usize,
    pub thread: ThreadContext,
    pub nevents: u64,
    pub size: u64,
    pub capture_pct: f64,
}

/// A live-heap snapshot entry: no sampling, no grouping, one row per live
/// allocation site observed at snapshot time.
#[derive(Debug, Clone, PartialEq)]
pub struct MemallocHeapEvent {
    pub frames: Vec<Frame>,
    pub nframes: usize,
    pub thread: ThreadContext,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LockContext {
    pub thread: ThreadContext,
    pub lock_name: Option<String>,
    pub trace: TraceContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LockAcquireEvent {
    pub frames: Vec<Frame>,
    pub nframes: usize,
    pub lock: LockContext,
    pub sampling_pct: f64,
    pub wait_time_ns: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LockReleaseEvent {
    pub frames: Vec<Frame>,
    pub nframes: usize,
    pub lock: LockContext,
    pub sampling_pct: f64,
    pub locked_for_ns: i64,
}

/// An ordered `(key, value)` label pair, as emitted into a `Sample`.
pub type Label = (&'static str, String);

fn opt_i64(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

fn opt_u64(v: Option<u64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

fn opt_str(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

impl StackSample {
    pub fn labels(&self) -> Vec<Label> {
        vec![
            ("thread id", opt_i64(self.thread.thread_id)),
            ("native id", opt_i64(self.thread.native_id)),
            ("thread name", opt_str(&self.thread.thread_name)),
            ("task id", opt_i64(self.task.task_id)),
            ("task name", opt_str(&self.task.task_name)),
            ("trace id", opt_u64(self.trace.trace_id)),
            ("span id", opt_u64(self.trace.span_id)),
            ("trace endpoint", self.trace.exported_endpoint().to_string()),
            ("trace type", opt_str(&self.trace.trace_type)),
        ]
    }
}

impl StackExceptionEvent {
    pub fn labels(&self) -> Vec<Label> {
        let mut labels = vec![
            ("thread id", opt_i64(self.thread.thread_id)),
            ("native id", opt_i64(self.thread.native_id)),
            ("thread name", opt_str(&self.thread.thread_name)),
            ("task id", opt_i64(self.task.task_id)),
            ("task name", opt_str(&self.task.task_name)),
            ("trace id", opt_u64(self.trace.trace_id)),
            ("span id", opt_u64(self.trace.span_id)),
            ("trace endpoint", self.trace.exported_endpoint().to_string()),
            ("trace type", opt_str(&self.trace.trace_type)),
        ];
        labels.push(("exception type", self.exception_type.clone()));
        labels
    }
}

impl MemallocEvent {
    pub fn labels(&self) -> Vec<Label> {
        vec![
            ("thread id", opt_i64(self.thread.thread_id)),
            ("native id", opt_i64(self.thread.native_id)),
            ("thread name", opt_str(&self.thread.thread_name)),
        ]
    }
}

impl MemallocHeapEvent {
    pub fn labels(&self) -> Vec<Label> {
        vec![
            ("thread id", opt_i64(self.thread.thread_id)),
            ("native id", opt_i64(self.thread.native_id)),
            ("thread name", opt_str(&self.thread.thread_name)),
        ]
    }
}

impl LockContext {
    pub fn labels(&self) -> Vec<Label> {
        vec![
            ("thread id", opt_i64(self.thread.thread_id)),
            ("native id", opt_i64(self.thread.native_id)),
            ("thread name", opt_str(&self.thread.thread_name)),
            ("lock name", opt_str(&self.lock_name)),
            ("trace id", opt_u64(self.trace.trace_id)),
            ("span id", opt_u64(self.trace.span_id)),
            ("trace endpoint", self.trace.exported_endpoint().to_string()),
            ("trace type", opt_str(&self.trace.trace_type)),
        ]
    }
}
