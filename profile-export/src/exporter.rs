// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Orchestrates one export cycle: feeds a batch of collected events through
//! a fresh [`PprofConverter`] and returns the resulting pprof `Profile`.

use tracing::debug;

use crate::config::ExporterConfig;
use crate::converter::PprofConverter;
use crate::error::ProfileError;
use crate::events::{
    LockAcquireEvent, LockReleaseEvent, MemallocEvent, MemallocHeapEvent, StackExceptionEvent,
    StackSample,
};
use crate::pb;

/// Everything collected during one export window, grouped by event class.
#[derive(Debug, Default)]
pub struct EventBatch {
    pub stack_samples: Vec<StackSample>,
    pub stack_exceptions: Vec<StackExceptionEvent>,
    pub memallocs: Vec<MemallocEvent>,
    pub memalloc_heap: Vec<MemallocHeapEvent>,
    pub lock_acquires: Vec<LockAcquireEvent>,
    pub lock_releases: Vec<LockReleaseEvent>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.stack_samples.is_empty()
            && self.stack_exceptions.is_empty()
            && self.memallocs.is_empty()
            && self.memalloc_heap.is_empty()
            && self.lock_acquires.is_empty()
            && self.lock_releases.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PprofExporter;

impl PprofExporter {
    pub fn new() -> Self {
        PprofExporter
    }

    /// Builds one pprof `Profile` covering `[start_ns, end_ns)`.
    ///
    /// `period` is `int(sum_period / nb_event)` averaged over every stack
    /// sample's own recorded sampling period; a batch with no stack samples
    /// reports a period of 0.
    ///
    /// `sampling_ratio_avg` is computed across every lock event in the
    /// batch (acquire and release together) as `Σ sampling_pct / (n · 100)`;
    /// it divides the accumulated lock wait/hold times to correct for
    /// collector-side lock sampling. A batch with no lock events skips the
    /// correction (there's nothing to correct).
    pub fn export(
        &self,
        events: EventBatch,
        program_name: &str,
        start_ns: i64,
        end_ns: i64,
    ) -> Result<pb::Profile, ProfileError> {
        let mut converter = PprofConverter::new();

        debug!(
            stack_samples = events.stack_samples.len(),
            stack_exceptions = events.stack_exceptions.len(),
            memallocs = events.memallocs.len(),
            memalloc_heap = events.memalloc_heap.len(),
            lock_acquires = events.lock_acquires.len(),
            lock_releases = events.lock_releases.len(),
            "exporting profile"
        );

        for event in &events.stack_samples {
            converter.ingest_stack_sample(event);
        }
        for event in &events.stack_exceptions {
            converter.ingest_stack_exception(event);
        }
        for event in &events.memallocs {
            converter.ingest_memalloc(event);
        }
        for event in &events.memalloc_heap {
            converter.ingest_memalloc_heap(event);
        }
        for event in &events.lock_acquires {
            converter.ingest_lock_acquire(event);
        }
        for event in &events.lock_releases {
            converter.ingest_lock_release(event);
        }

        let lock_event_count = events.lock_acquires.len() + events.lock_releases.len();
        if lock_event_count > 0 {
            let sampling_pct_sum: f64 = events
                .lock_acquires
                .iter()
                .map(|e| e.sampling_pct)
                .chain(events.lock_releases.iter().map(|e| e.sampling_pct))
                .sum();
            let sampling_ratio_avg = sampling_pct_sum / (lock_event_count as f64 * 100.0);
            converter.apply_lock_sampling_ratio(sampling_ratio_avg);
        }

        let period = if events.stack_samples.is_empty() {
            0
        } else {
            let sum_period: i64 = events.stack_samples.iter().map(|e| e.period_ns).sum();
            sum_period / events.stack_samples.len() as i64
        };

        let duration_ns = end_ns - start_ns;
        converter.build_profile(program_name, start_ns, duration_ns, period)
    }

    /// Convenience wrapper over [`Self::export`] taking the program name from
    /// an [`ExporterConfig`] instead of a bare `&str`.
    pub fn export_with_config(
        &self,
        events: EventBatch,
        config: &ExporterConfig,
        start_ns: i64,
        end_ns: i64,
    ) -> Result<pb::Profile, ProfileError> {
        self.export(events, &config.program_name, start_ns, end_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Frame, LockContext, ThreadContext};

    fn frame() -> Frame {
        Frame {
            filename: "worker.py".to_string(),
            lineno: 10,
            funcname: Some("run".to_string()),
        }
    }

    #[test]
    fn export_with_config_reads_program_name_from_config() {
        let exporter = PprofExporter::new();
        let config = ExporterConfig {
            program_name: "configured-app".to_string(),
        };
        let profile = exporter
            .export_with_config(EventBatch::default(), &config, 0, 0)
            .unwrap();
        let name_id = profile.mapping[0].filename as usize;
        assert_eq!(profile.string_table[name_id], "configured-app");
    }

    #[test]
    fn empty_batch_still_produces_a_valid_profile() {
        let exporter = PprofExporter::new();
        let profile = exporter
            .export(EventBatch::default(), "app", 0, 1_000_000_000)
            .unwrap();
        assert!(profile.sample.is_empty());
        assert_eq!(profile.sample_type.len(), 11);
        assert_eq!(profile.duration_nanos, 1_000_000_000);
        assert_eq!(profile.period, 0);
    }

    #[test]
    fn period_averages_over_every_stack_sample() {
        let mut batch = EventBatch::default();
        for period_ns in [10_000_000, 20_000_000] {
            batch.stack_samples.push(StackSample {
                frames: vec![frame()],
                nframes: 1,
                thread: ThreadContext {
                    thread_id: Some(1),
                    native_id: Some(1),
                    thread_name: Some("MainThread".to_string()),
                },
                task: Default::default(),
                trace: Default::default(),
                cpu_time_ns: 1,
                wall_time_ns: 1,
                period_ns,
            });
        }

        let exporter = PprofExporter::new();
        let profile = exporter.export(batch, "app", 0, 1_000).unwrap();
        assert_eq!(profile.period, 15_000_000);
    }

    #[test]
    fn lock_sampling_ratio_scales_down_accumulated_wait_time() {
        let mut batch = EventBatch::default();
        batch.lock_acquires.push(LockAcquireEvent {
            frames: vec![frame()],
            nframes: 1,
            lock: LockContext {
                thread: ThreadContext {
                    thread_id: Some(1),
                    native_id: Some(1),
                    thread_name: Some("MainThread".to_string()),
                },
                lock_name: Some("mutex".to_string()),
                trace: Default::default(),
            },
            sampling_pct: 50.0,
            wait_time_ns: 1_000,
        });

        let exporter = PprofExporter::new();
        let profile = exporter.export(batch, "app", 0, 1_000).unwrap();
        assert_eq!(profile.sample.len(), 1);
        // sampling_ratio_avg = 50/100 = 0.5, so wait time doubles.
        let lock_acquire_wait_idx = profile
            .sample_type
            .iter()
            .position(|vt| profile.string_table[vt.r#type as usize] == "lock-acquire-wait")
            .unwrap();
        assert_eq!(profile.sample[0].value[lock_acquire_wait_idx], 2_000);
    }
}
