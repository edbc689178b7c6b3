//! End-to-end tests through the facade: mixed paths, multi-queue dispatch,
//! shared engines and the diagnostics a caller can observe.

use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use deflate_offload::{
    DeviceConfig, Dispatcher, EmulatedDevice, Engine, EngineConfig, ExecutionPath, FaultPlan,
    Job, JobFlags, Status, WorkQueue,
};
use flate2::read::GzDecoder;
use proptest::prelude::*;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

fn corpus(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed | 1;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let word = (state >> 16) % 12;
        out.extend_from_slice(format!("token{word} ").as_bytes());
    }
    out.truncate(len);
    out
}

fn queues(devices: &[Arc<EmulatedDevice>]) -> Arc<Dispatcher> {
    let queues = devices
        .iter()
        .map(|device| Arc::<EmulatedDevice>::clone(device) as Arc<dyn WorkQueue>)
        .collect();
    Arc::new(Dispatcher::new(queues))
}

fn run(
    engine: &Engine,
    mut job: Job,
    data: &[u8],
    chunk: usize,
    window: usize,
) -> (Vec<u8>, Job) {
    let pieces: Vec<&[u8]> = if data.is_empty() {
        vec![&[]]
    } else {
        data.chunks(chunk).collect()
    };
    job.flags |= JobFlags::FIRST;
    let mut produced = Vec::new();
    let mut pending = Vec::new();
    for (index, piece) in pieces.iter().enumerate() {
        if index + 1 == pieces.len() {
            job.flags |= JobFlags::LAST;
        }
        pending.extend_from_slice(piece);
        loop {
            let mut out = vec![0u8; window];
            let progress = engine
                .execute(&mut job, &pending, &mut out)
                .expect("chunk runs");
            produced.extend_from_slice(&out[..progress.produced]);
            pending.drain(..progress.consumed);
            if progress.status != Status::MoreOutputNeeded {
                break;
            }
        }
    }
    (produced, job)
}

fn gunzip(compressed: &[u8]) -> Vec<u8> {
    let mut restored = Vec::new();
    GzDecoder::new(compressed)
        .read_to_end(&mut restored)
        .expect("flate2 decodes the gzip stream");
    restored
}

#[test]
fn device_output_decodes_in_software_and_back() {
    let device = Arc::new(EmulatedDevice::new(DeviceConfig::default()));
    let hardware = Engine::with_dispatcher(
        EngineConfig::default().path(ExecutionPath::Hardware),
        queues(&[device]),
    );
    let software = Engine::new(EngineConfig::default().path(ExecutionPath::Software));
    let data = corpus(60_000, 7);
    let flags = JobFlags::GZIP_MODE | JobFlags::DYNAMIC_HUFFMAN;

    let deflate = || Job::compress().with_flags(flags);
    let gzip = || Job::decompress().with_flags(JobFlags::GZIP_MODE);

    let (compressed, job) = run(&hardware, deflate(), &data, 16_384, 1 << 16);
    assert_eq!(job.path_used(), Some(ExecutionPath::Hardware));
    assert_eq!(gunzip(&compressed), data);
    let (restored, _) = run(&software, gzip(), &compressed, compressed.len(), 4_096);
    assert_eq!(restored, data);

    let (compressed, _) = run(&software, deflate(), &data, 16_384, 1 << 16);
    let (restored, job) = run(&hardware, gzip(), &compressed, 1_500, 4_096);
    assert_eq!(restored, data);
    assert!(job.is_complete());
    assert_eq!(job.path_used(), Some(ExecutionPath::Hardware));
}

#[test]
fn busy_queues_are_skipped_in_rotation() {
    let busy = Arc::new(EmulatedDevice::with_faults(
        DeviceConfig::default(),
        FaultPlan {
            busy_rejections: u32::MAX,
            ..FaultPlan::default()
        },
    ));
    let idle = Arc::new(EmulatedDevice::new(DeviceConfig::default()));
    let engine = Engine::with_dispatcher(
        EngineConfig::default().path(ExecutionPath::Hardware),
        queues(&[Arc::clone(&busy), Arc::clone(&idle)]),
    );
    let data = corpus(20_000, 3);
    let job = Job::compress().with_flags(JobFlags::GZIP_MODE);
    let (compressed, _) = run(&engine, job, &data, 5_000, 32 * 1024);
    assert_eq!(gunzip(&compressed), data);
    assert_eq!(busy.accepted(), 0);
    assert!(idle.accepted() >= 4);
}

#[test]
fn decompress_only_devices_leave_compression_to_software() {
    let device = Arc::new(EmulatedDevice::new(
        DeviceConfig::default().opcodes(vec![deflate_offload::accel::Opcode::Decompress]),
    ));
    let engine = Engine::with_dispatcher(EngineConfig::default(), queues(&[Arc::clone(&device)]));
    let data = corpus(10_000, 11);

    let job = Job::compress().with_flags(JobFlags::GZIP_MODE);
    let (compressed, job) = run(&engine, job, &data, 4_000, 32 * 1024);
    assert_eq!(job.path_used(), Some(ExecutionPath::Software));
    assert_eq!(device.accepted(), 0);

    let job = Job::decompress().with_flags(JobFlags::GZIP_MODE);
    let (restored, job) = run(&engine, job, &compressed, compressed.len(), 32 * 1024);
    assert_eq!(restored, data);
    assert_eq!(job.path_used(), Some(ExecutionPath::Hardware));
    assert!(device.accepted() > 0);
}

#[test]
fn one_engine_serves_many_threads() {
    let devices: Vec<Arc<EmulatedDevice>> = (0..2)
        .map(|_| Arc::new(EmulatedDevice::new(DeviceConfig::default().latency_polls(2))))
        .collect();
    let engine = Engine::with_dispatcher(
        EngineConfig::default().path(ExecutionPath::Hardware),
        queues(&devices),
    );

    thread::scope(|scope| {
        for seed in 0..4u32 {
            let engine = &engine;
            scope.spawn(move || {
                let data = corpus(12_000 + seed as usize * 1_000, seed);
                let flags = JobFlags::GZIP_MODE | JobFlags::DYNAMIC_HUFFMAN;
                let job = Job::compress().with_flags(flags);
                let (compressed, job) = run(engine, job, &data, 3_000, 16 * 1024);
                assert_eq!(job.crc(), deflate_offload::checksums::crc32_gzip(&data, 0));
                assert_eq!(gunzip(&compressed), data);
            });
        }
    });
    assert!(devices.iter().all(|device| device.accepted() > 0));
}

#[derive(Clone, Default)]
struct Targets(Arc<Mutex<Vec<String>>>);

impl<S: Subscriber> Layer<S> for Targets {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.metadata().target().to_owned());
    }
}

#[test]
fn fallbacks_are_reported_on_the_fallback_target() {
    let device = Arc::new(EmulatedDevice::with_faults(
        DeviceConfig::default(),
        FaultPlan {
            forced_overflows: 1,
            ..FaultPlan::default()
        },
    ));
    let engine = Engine::with_dispatcher(
        EngineConfig::default().path(ExecutionPath::Hardware),
        queues(&[device]),
    );
    let data = corpus(3_000, 5);
    let targets = Targets::default();
    let subscriber = tracing_subscriber::registry().with(targets.clone());

    let compressed = tracing::subscriber::with_default(subscriber, || {
        run(&engine, Job::compress().with_flags(JobFlags::GZIP_MODE), &data, 3_000, 8 * 1024).0
    });
    assert_eq!(gunzip(&compressed), data);
    let seen = targets.0.lock().unwrap_or_else(PoisonError::into_inner).clone();
    assert!(seen.iter().any(|target| target == "offload::fallback"));
    assert!(seen.iter().any(|target| target == "offload::submit"));
    assert!(seen.iter().any(|target| target == "offload::job"));
}

#[cfg(feature = "serde")]
#[test]
fn configuration_loads_from_json() {
    let json = r#"{"path":"software","one_pass_threshold":1024}"#;
    let config: EngineConfig = serde_json::from_str(json).expect("valid json");
    assert_eq!(config.default_path(), ExecutionPath::Software);
    assert_eq!(config.one_pass_limit(), 1024);
    assert!(config.verifies());
    let verbosity: deflate_offload::Verbosity =
        serde_json::from_str("\"debug\"").expect("valid json");
    assert_eq!(verbosity, deflate_offload::Verbosity::Debug);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn any_chunking_on_any_path_yields_the_same_data(
        len in 0usize..20_000,
        chunk in 256usize..8_000,
        window in 64usize..4_096,
        dynamic in any::<bool>(),
        on_device in any::<bool>(),
    ) {
        let device = Arc::new(EmulatedDevice::new(DeviceConfig::default()));
        let path = if on_device { ExecutionPath::Hardware } else { ExecutionPath::Software };
        let engine = Engine::with_dispatcher(EngineConfig::default().path(path), queues(&[device]));
        let data = corpus(len, len as u32);
        let mut flags = JobFlags::GZIP_MODE;
        if dynamic {
            flags |= JobFlags::DYNAMIC_HUFFMAN;
        }
        let job = Job::compress().with_flags(flags);
        let (compressed, _) = run(&engine, job, &data, chunk, 2 * chunk + 1_024);
        prop_assert_eq!(gunzip(&compressed), data.clone());
        let job = Job::decompress().with_flags(JobFlags::GZIP_MODE);
        let (restored, job) = run(&engine, job, &compressed, chunk, window);
        prop_assert!(job.is_complete());
        prop_assert_eq!(restored, data);
    }
}
