//! Toy wiring of `ctl_task_queue` and `task_pipeline`: a "frame producer" loop representing
//! an audio thread, and a handful of control-plane tasks submitted from another thread while
//! it runs. Not a benchmark or a real audio path, just enough to exercise both crates together
//! the way a real caller would.

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use ctl_task_queue::TaskQueue;
use task_pipeline::{
    Frame, PipelineConfig, PipelineHandler, QueueScheduler, RealClock, SampleSpec, Task,
    TaskPipeline, TaskScheduler,
};

const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u16 = 2;
const FRAME_MS: u64 = 10;

struct GainHandler {
    frames_seen: u64,
}

impl PipelineHandler for GainHandler {
    fn process_frame(&mut self, frame: &mut Frame<'_>) -> bool {
        self.frames_seen += 1;
        for sample in frame.samples_mut() {
            *sample *= 0.5;
        }
        true
    }
}

type Pipeline = TaskPipeline<GainHandler, RealClock, Box<dyn TaskScheduler>>;

fn main() {
    env_logger::init();

    let queue = TaskQueue::new();
    let clock = RealClock::new();
    let sample_spec = SampleSpec::new(SAMPLE_RATE, CHANNELS);
    let config = PipelineConfig::default();

    let pipeline: Arc<Pipeline> = Arc::new_cyclic(|weak: &Weak<Pipeline>| {
        let weak = weak.clone();
        let scheduler = QueueScheduler::new(
            queue.handle(),
            move || weak.upgrade().map(|p| p.process_tasks()).unwrap_or(false),
            move || clock.now(),
        );
        TaskPipeline::new(
            GainHandler { frames_seen: 0 },
            clock,
            Box::new(scheduler) as Box<dyn TaskScheduler>,
            config,
            sample_spec,
        )
    });

    let task_pipeline = pipeline.clone();
    let submitter = thread::spawn(move || {
        for i in 0..5 {
            thread::sleep(Duration::from_millis(FRAME_MS * 2));
            let task = Task::new(move || {
                log::info!("control task {i} ran");
                true
            });
            let ok = task_pipeline.schedule_and_wait(&task);
            log::info!("control task {i} succeeded: {ok}");
        }
    });

    let samples_per_frame = sample_spec.duration_to_samples(Duration::from_millis(FRAME_MS));
    for frame_index in 0..40 {
        let mut buf = vec![1.0f32; samples_per_frame];
        let mut frame = Frame::new(&mut buf);
        pipeline.process_frame_and_tasks(&mut frame);
        thread::sleep(Duration::from_millis(FRAME_MS));
        if frame_index % 10 == 0 {
            let stats = pipeline.stats();
            log::info!("frame {frame_index}: {stats:?}");
        }
    }

    submitter.join().unwrap();
    queue.stop_and_wait();
}
