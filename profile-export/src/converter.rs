// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Accumulates ingested events into a pprof [`pb::Profile`], deduplicating
//! functions, locations and strings as it goes.
//!
//! Each sample key (location stack + label set) accumulates raw counters as
//! events arrive; the sample-type values themselves — several of which are
//! formulas over the accumulated totals rather than the totals themselves —
//! are only computed once, in [`PprofConverter::build_profile`].

use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::error::ProfileError;
use crate::events::{
    Frame, LockAcquireEvent, LockReleaseEvent, MemallocEvent, MemallocHeapEvent, StackExceptionEvent,
    StackSample,
};
use crate::pb;
use crate::string_table::StringTable;

/// Fixed order of emitted sample types. Indices here are the indices used
/// into every `Sample::value` vector.
pub const SAMPLE_TYPES: &[(&str, &str)] = &[
    ("cpu-samples", "count"),
    ("cpu-time", "nanoseconds"),
    ("wall-time", "nanoseconds"),
    ("exception-samples", "count"),
    ("lock-acquire", "count"),
    ("lock-acquire-wait", "nanoseconds"),
    ("lock-release", "count"),
    ("lock-release-hold", "nanoseconds"),
    ("alloc-samples", "count"),
    ("alloc-space", "bytes"),
    ("heap-space", "bytes"),
];

const CPU_SAMPLES: usize = 0;
const CPU_TIME: usize = 1;
const WALL_TIME: usize = 2;
const EXCEPTION_SAMPLES: usize = 3;
const LOCK_ACQUIRE: usize = 4;
const LOCK_ACQUIRE_WAIT: usize = 5;
const LOCK_RELEASE: usize = 6;
const LOCK_RELEASE_HOLD: usize = 7;
const ALLOC_SAMPLES: usize = 8;
const ALLOC_SPACE: usize = 9;
const HEAP_SPACE: usize = 10;

/// A function identity: `(name, system_name, filename, start_line)` as
/// string-table ids (start_line kept as a plain `i64`, matching the proto).
type FunctionKey = (i64, i64, i64, i64);

/// A location's line list: one line per stack frame collapsed into it. In
/// practice this subsystem only ever emits single-line locations, but the
/// pprof schema allows more, and dedup is keyed on the whole list.
type LocationKey = Vec<(u64, i64)>;

#[derive(Debug, Default, Clone)]
struct Counters {
    values: [i64; SAMPLE_TYPES.len()],
    alloc_nevents_sum: u64,
    alloc_capture_pct_sum: f64,
    alloc_size_sum: u64,
    alloc_records: u64,
    lock_acquire_wait_ns_sum: i64,
    lock_release_hold_ns_sum: i64,
}

type SampleKey = (Vec<u64>, Vec<(String, String)>);

#[derive(Debug, Default)]
pub struct PprofConverter {
    strings: StringTable,
    functions: IndexSet<FunctionKey>,
    locations: IndexSet<LocationKey>,
    samples: IndexMap<SampleKey, Counters>,
    built: bool,
}

impl PprofConverter {
    pub fn new() -> Self {
        PprofConverter::default()
    }

    fn str_id(&mut self, text: Option<&str>) -> i64 {
        self.strings.index(text) as i64
    }

    fn function_id(&mut self, frame: &Frame) -> u64 {
        let name = match frame.funcname.as_deref() {
            Some(name) => self.str_id(Some(name)),
            None => self.str_id(Some("<unknown function>")),
        };
        let filename = self.str_id(Some(frame.filename.as_str()));
        let key: FunctionKey = (name, name, filename, 0);
        self.functions.insert_full(key).0 as u64 + 1
    }

    fn location_id(&mut self, frame: &Frame) -> u64 {
        let function_id = self.function_id(frame);
        let key: LocationKey = vec![(function_id, frame.lineno)];
        self.locations.insert_full(key).0 as u64 + 1
    }

    /// A location standing in for the frames the collector dropped once a
    /// stack exceeded its frame budget, à la `"<N frames omitted>"`.
    fn omitted_location_id(&mut self, omitted: usize) -> u64 {
        let label = if omitted > 1 {
            format!("<{omitted} frames omitted>")
        } else {
            format!("<{omitted} frame omitted>")
        };
        let name = self.str_id(Some(&label));
        let filename = self.str_id(Some(""));
        let key: FunctionKey = (name, name, filename, 0);
        let function_id = self.functions.insert_full(key).0 as u64 + 1;
        let loc_key: LocationKey = vec![(function_id, 0)];
        self.locations.insert_full(loc_key).0 as u64 + 1
    }

    fn location_ids(&mut self, frames: &[Frame], nframes: usize) -> Vec<u64> {
        let mut ids: Vec<u64> = frames.iter().map(|f| self.location_id(f)).collect();
        if nframes > frames.len() {
            ids.push(self.omitted_location_id(nframes - frames.len()));
        }
        ids
    }

    /// Label sets are fixed per event type (spec.md §4.6): every label the
    /// event type defines is emitted, including empty-string ones — an
    /// unset thread/task/trace id or a masked `trace endpoint` (non-"web"
    /// `trace_type`) is a label carrying `""`, not an absent label.
    fn label_pairs(&mut self, labels: Vec<(&'static str, String)>) -> Vec<(String, String)> {
        labels
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn entry(&mut self, location_ids: Vec<u64>, labels: Vec<(String, String)>) -> &mut Counters {
        self.samples.entry((location_ids, labels)).or_default()
    }

    pub fn ingest_stack_sample(&mut self, event: &StackSample) {
        let location_ids = self.location_ids(&event.frames, event.nframes);
        let labels = self.label_pairs(event.labels());
        let counters = self.entry(location_ids, labels);
        counters.values[CPU_TIME] += event.cpu_time_ns;
        counters.values[CPU_SAMPLES] += 1;
        counters.values[WALL_TIME] += event.wall_time_ns;
    }

    pub fn ingest_stack_exception(&mut self, event: &StackExceptionEvent) {
        let location_ids = self.location_ids(&event.frames, event.nframes);
        let labels = self.label_pairs(event.labels());
        let counters = self.entry(location_ids, labels);
        counters.values[EXCEPTION_SAMPLES] += 1;
    }

    pub fn ingest_memalloc(&mut self, event: &MemallocEvent) {
        let location_ids = self.location_ids(&event.frames, event.nframes);
        let labels = self.label_pairs(event.labels());
        let counters = self.entry(location_ids, labels);
        counters.values[ALLOC_SAMPLES] += 1;
        counters.alloc_nevents_sum += event.nevents;
        counters.alloc_capture_pct_sum += event.capture_pct;
        counters.alloc_size_sum += event.size;
        counters.alloc_records += 1;
    }

    pub fn ingest_memalloc_heap(&mut self, event: &MemallocHeapEvent) {
        let location_ids = self.location_ids(&event.frames, event.nframes);
        let labels = self.label_pairs(event.labels());
        let counters = self.entry(location_ids, labels);
        counters.values[HEAP_SPACE] += event.size as i64;
    }

    pub fn ingest_lock_acquire(&mut self, event: &LockAcquireEvent) {
        let location_ids = self.location_ids(&event.frames, event.nframes);
        let labels = self.label_pairs(event.lock.labels());
        let counters = self.entry(location_ids, labels);
        counters.values[LOCK_ACQUIRE] += 1;
        counters.lock_acquire_wait_ns_sum += event.wait_time_ns;
    }

    pub fn ingest_lock_release(&mut self, event: &LockReleaseEvent) {
        let location_ids = self.location_ids(&event.frames, event.nframes);
        let labels = self.label_pairs(event.lock.labels());
        let counters = self.entry(location_ids, labels);
        counters.values[LOCK_RELEASE] += 1;
        counters.lock_release_hold_ns_sum += event.locked_for_ns;
    }

    /// Finalizes formula-valued sample types (`alloc-space`) and assembles
    /// the pprof `Profile`. Call [`PprofConverter::apply_lock_sampling_ratio`]
    /// first if any lock events were ingested. The converter is single-use:
    /// a second call returns [`ProfileError::AlreadyEmitted`].
    pub fn build_profile(
        &mut self,
        program_name: &str,
        start_ns: i64,
        duration_ns: i64,
        period: i64,
    ) -> Result<pb::Profile, ProfileError> {
        if self.built {
            return Err(ProfileError::AlreadyEmitted);
        }
        self.built = true;

        for counters in self.samples.values_mut() {
            if counters.alloc_records > 0 {
                // Both denominators are Σ nevents, not the record count: see
                // DESIGN.md's note on this formula's resolved ambiguity.
                let n = counters.alloc_nevents_sum as f64;
                let value = counters.alloc_nevents_sum as f64
                    * (counters.alloc_capture_pct_sum / (n * 100.0))
                    * (counters.alloc_size_sum as f64 / n);
                counters.values[ALLOC_SPACE] = value.round() as i64;
            }
        }

        let sample_type = SAMPLE_TYPES
            .iter()
            .map(|(name, unit)| pb::ValueType {
                r#type: self.str_id(Some(name)),
                unit: self.str_id(Some(unit)),
            })
            .collect();

        let mut locations: Vec<(usize, LocationKey)> =
            self.locations.iter().cloned().enumerate().collect();
        locations.sort_by_key(|(idx, _)| *idx);
        let location = locations
            .into_iter()
            .map(|(idx, lines)| pb::Location {
                id: idx as u64 + 1,
                mapping_id: 1,
                address: 0,
                line: lines
                    .into_iter()
                    .map(|(function_id, line)| pb::Line { function_id, line })
                    .collect(),
                is_folded: false,
            })
            .collect();

        let mut functions: Vec<(usize, FunctionKey)> =
            self.functions.iter().cloned().enumerate().collect();
        functions.sort_by_key(|(idx, _)| *idx);
        let function = functions
            .into_iter()
            .map(|(idx, (name, system_name, filename, start_line))| pb::Function {
                id: idx as u64 + 1,
                name,
                system_name,
                filename,
                start_line,
            })
            .collect();

        let mut samples: Vec<((Vec<u64>, Vec<(String, String)>), Counters)> =
            std::mem::take(&mut self.samples).into_iter().collect();
        samples.sort_by(|(a, _), (b, _)| a.0.cmp(&b.0));

        let sample = samples
            .into_iter()
            .map(|((location_id, labels), counters)| pb::Sample {
                location_id,
                value: counters.values.to_vec(),
                label: labels
                    .into_iter()
                    .map(|(k, v)| pb::Label {
                        key: self.str_id(Some(&k)),
                        str: self.str_id(Some(&v)),
                        num: 0,
                        num_unit: 0,
                    })
                    .collect(),
            })
            .collect();

        let program_name_id = self.str_id(Some(program_name));
        let period_type = pb::ValueType {
            r#type: self.str_id(Some("time")),
            unit: self.str_id(Some("nanoseconds")),
        };

        let string_table = std::mem::take(&mut self.strings).into_vec();

        Ok(pb::Profile {
            sample_type,
            sample,
            mapping: vec![pb::Mapping {
                id: 1,
                memory_start: 0,
                memory_limit: 0,
                file_offset: 0,
                filename: program_name_id,
                build_id: 0,
                has_functions: true,
                has_filenames: true,
                has_line_numbers: true,
                has_inline_frames: false,
            }],
            location,
            function,
            string_table,
            drop_frames: 0,
            keep_frames: 0,
            time_nanos: start_ns,
            duration_nanos: duration_ns,
            period_type: Some(period_type),
            period,
            comment: Vec::new(),
            default_sample_type: 0,
        })
    }

    /// Divides the accumulated lock-wait sums by `sampling_ratio` and
    /// truncates, per the lock sample types' formula. Must run before
    /// [`PprofConverter::build_profile`].
    pub fn apply_lock_sampling_ratio(&mut self, sampling_ratio: f64) {
        for counters in self.samples.values_mut() {
            if counters.values[LOCK_ACQUIRE] > 0 {
                counters.values[LOCK_ACQUIRE_WAIT] =
                    (counters.lock_acquire_wait_ns_sum as f64 / sampling_ratio) as i64;
            }
            if counters.values[LOCK_RELEASE] > 0 {
                counters.values[LOCK_RELEASE_HOLD] =
                    (counters.lock_release_hold_ns_sum as f64 / sampling_ratio) as i64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Frame, ThreadContext, TraceContext};

    fn frame(name: &str, line: i64) -> Frame {
        Frame {
            filename: "app.py".to_string(),
            lineno: line,
            funcname: Some(name.to_string()),
        }
    }

    fn sample(frames: Vec<Frame>, nframes: usize, cpu_time_ns: i64) -> StackSample {
        StackSample {
            frames,
            nframes,
            thread: ThreadContext {
                thread_id: Some(1),
                native_id: Some(1),
                thread_name: Some("MainThread".to_string()),
            },
            task: Default::default(),
            trace: Default::default(),
            cpu_time_ns,
            wall_time_ns: cpu_time_ns,
            period_ns: 10_000_000,
        }
    }

    #[test]
    fn identical_stack_samples_fold_into_one_sample_with_summed_values() {
        let frames = vec![frame("a", 1), frame("b", 2)];
        let mut converter = PprofConverter::new();
        converter.ingest_stack_sample(&sample(frames.clone(), 2, 1_000_000));
        converter.ingest_stack_sample(&sample(frames, 2, 500_000));

        let profile = converter.build_profile("pytest", 0, 0, 1).unwrap();
        assert_eq!(profile.sample.len(), 1);
        assert_eq!(profile.sample[0].value[CPU_SAMPLES], 2);
        assert_eq!(profile.sample[0].value[CPU_TIME], 1_500_000);
    }

    #[test]
    fn omitted_frames_are_collapsed_into_a_single_trailing_location() {
        let frames = vec![frame("a", 1), frame("b", 2), frame("c", 3)];
        let mut converter = PprofConverter::new();
        converter.ingest_stack_sample(&sample(frames, 5, 1));

        let profile = converter.build_profile("pytest", 0, 0, 1).unwrap();
        assert_eq!(profile.sample[0].location_id.len(), 4);
        assert_eq!(profile.location.len(), 4);
        let omitted_fn_id = profile.location[3].line[0].function_id;
        let omitted_fn = profile
            .function
            .iter()
            .find(|f| f.id == omitted_fn_id)
            .unwrap();
        let name = &profile.string_table[omitted_fn.name as usize];
        assert_eq!(name, "<2 frames omitted>");
    }

    #[test]
    fn unset_fields_and_masked_endpoint_stay_as_empty_labels_not_omitted_ones() {
        let mut converter = PprofConverter::new();
        let mut event = sample(vec![frame("a", 1)], 1, 1_000_000);
        event.thread = ThreadContext {
            thread_id: None,
            native_id: None,
            thread_name: None,
        };
        event.trace = TraceContext {
            trace_id: Some(1),
            span_id: Some(2),
            trace_endpoint: Some("/orders".to_string()),
            trace_type: Some("background".to_string()),
        };
        converter.ingest_stack_sample(&event);

        let profile = converter.build_profile("pytest", 0, 0, 1).unwrap();
        assert_eq!(profile.sample.len(), 1);
        let labels = &profile.sample[0].label;
        // StackSample::labels() always defines 9 entries; none are dropped
        // for being empty.
        assert_eq!(labels.len(), 9);
        let get = |key: &str| -> &str {
            let label = labels
                .iter()
                .find(|l| profile.string_table[l.key as usize] == key)
                .unwrap();
            &profile.string_table[label.str as usize]
        };
        assert_eq!(get("thread id"), "");
        assert_eq!(get("native id"), "");
        assert_eq!(get("thread name"), "");
        // trace_type != "web", so trace endpoint is exported empty even
        // though one was recorded.
        assert_eq!(get("trace endpoint"), "");
        assert_eq!(get("trace type"), "background");
    }

    #[test]
    fn build_profile_twice_is_rejected() {
        let mut converter = PprofConverter::new();
        assert!(converter.build_profile("pytest", 0, 0, 1).is_ok());
        assert_eq!(
            converter.build_profile("pytest", 0, 0, 1).unwrap_err(),
            ProfileError::AlreadyEmitted
        );
    }
}
