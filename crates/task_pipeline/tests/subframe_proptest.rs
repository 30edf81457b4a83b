//! Property: whatever cap `max_frame_length_between_tasks` places on sub-frame size, and
//! whatever the frame's total length, precise-mode frame processing visits every sample
//! exactly once and no sub-frame handed to the handler exceeds the cap.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use task_pipeline::{
    Frame, PipelineConfig, PipelineHandler, PipelineInstant, SampleSpec, TaskPipeline,
    TaskScheduler, VirtualClock,
};

struct NoopScheduler;

impl TaskScheduler for NoopScheduler {
    fn schedule_task_processing(&self, _deadline: PipelineInstant) {}
    fn cancel_task_processing(&self) {}
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_sample_is_processed_exactly_once_regardless_of_subframe_cap(
        total_samples in 2usize..2_000,
        max_sub_ms in 1u64..10,
    ) {
        let sample_spec = SampleSpec::new(48_000, 2);
        let sub_frame_lens = Arc::new(Mutex::new(Vec::new()));
        let lens = sub_frame_lens.clone();
        let handler = move |frame: &mut Frame<'_>| {
            lens.lock().unwrap().push(frame.len());
            true
        };

        let pipeline = TaskPipeline::new(
            handler,
            VirtualClock::new(PipelineInstant::from_nanos(0)),
            NoopScheduler,
            PipelineConfig {
                enable_precise_task_scheduling: true,
                max_frame_length_between_tasks: Duration::from_millis(max_sub_ms),
                ..PipelineConfig::default()
            },
            sample_spec,
        );

        let mut data = vec![0.0f32; total_samples];
        let mut frame = Frame::new(&mut data);
        pipeline.process_frame_and_tasks(&mut frame);

        let observed = sub_frame_lens.lock().unwrap();
        prop_assert_eq!(observed.iter().sum::<usize>(), total_samples);

        let max_samples = sample_spec.duration_to_samples(Duration::from_millis(max_sub_ms));
        for &len in observed.iter() {
            prop_assert!(len <= max_samples);
        }
    }
}
