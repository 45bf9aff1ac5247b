//! Fan-out stress runs: one producer thread, many consumer threads, every
//! byte checked on the way out.

use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use crossbeam_channel::bounded;
use daqring::{ ClientMode, RingBuffer };
use rand::Rng;

use crate::verify::{ RecordReader, RecordWriter, RECORD_HEADER };
use crate::TestRing;

/// Configuration for a fan-out run
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Records the producer writes
    pub records: u64,
    /// Number of consumer threads
    pub consumers: usize,
    /// Requested size of the ring data area
    pub ring_bytes: usize,
    /// Smallest record payload
    pub min_payload: usize,
    /// Largest record payload
    pub max_payload: usize,
    /// Give up after this long
    pub deadline: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            records: 10_000,
            consumers: 2,
            ring_bytes: 64 * 1024,
            min_payload: 0,
            max_payload: 512,
            deadline: Duration::from_secs(30),
        }
    }
}

impl StressConfig {
    pub fn new(records: u64) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn with_consumers(mut self, n: usize) -> Self {
        self.consumers = n;
        self
    }

    pub fn with_ring_bytes(mut self, bytes: usize) -> Self {
        self.ring_bytes = bytes;
        self
    }

    pub fn with_payload(mut self, min: usize, max: usize) -> Self {
        self.min_payload = min;
        self.max_payload = max.max(min);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Totals for a fan-out run. Received figures are summed over consumers.
#[derive(Debug, Clone, Default)]
pub struct StressMetrics {
    pub records_sent: u64,
    pub records_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub errors: u64,
    pub duration: Duration,
}

impl StressMetrics {
    /// Every consumer saw every record intact
    pub fn is_clean(&self, consumers: usize) -> bool {
        self.errors == 0 && self.records_received == self.records_sent * consumers as u64
    }

    pub fn throughput_mbps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.bytes_received as f64 / 1_000_000.0 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Shared counters for stress threads
#[derive(Debug)]
pub struct StressCounters {
    pub sent: AtomicU64,
    pub received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub errors: AtomicU64,
    pub running: AtomicBool,
}

impl StressCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_send(&self, bytes: usize) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_receive(&self, records: usize, bytes: usize) {
        self.received.fetch_add(records as u64, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StressMetrics {
        StressMetrics {
            records_sent: self.sent.load(Ordering::Relaxed),
            records_received: self.received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            duration: Duration::ZERO,
        }
    }
}

impl Default for StressCounters {
    fn default() -> Self {
        Self {
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            running: AtomicBool::new(true),
        }
    }
}

/// Run one producer against `config.consumers` consumers on a fresh ring.
///
/// Consumers attach before the producer writes its first record, so each of
/// them must see the whole stream. Lost, reordered or corrupt records show up
/// in `errors` or as a shortfall in `records_received`.
pub fn run_fanout(config: &StressConfig) -> StressMetrics {
    let ring = TestRing::new("fanout", config.ring_bytes, config.consumers.max(1));
    let counters = StressCounters::new();
    let start = Instant::now();
    let deadline = start + config.deadline;

    let (ready_tx, ready_rx) = bounded::<bool>(config.consumers);
    let mut handles = Vec::with_capacity(config.consumers);

    for _ in 0..config.consumers {
        let name = ring.name.clone();
        let counters = counters.clone();
        let ready_tx = ready_tx.clone();
        let target = config.records;
        handles.push(
            thread::spawn(move || {
                let mut consumer = match RingBuffer::open(&name, ClientMode::Consumer) {
                    Ok(consumer) => consumer,
                    Err(_) => {
                        counters.record_error();
                        let _ = ready_tx.send(false);
                        return;
                    }
                };
                let _ = ready_tx.send(true);

                let mut reader = RecordReader::new();
                let mut buf = vec![0u8; 4096];
                while reader.records() < target && counters.is_running() {
                    if Instant::now() >= deadline {
                        counters.record_error();
                        break;
                    }
                    let n = match consumer.get(&mut buf, 1, Duration::from_millis(10)) {
                        Ok(n) => n,
                        Err(_) => {
                            counters.record_error();
                            break;
                        }
                    };
                    if n == 0 {
                        continue;
                    }
                    match reader.feed(&buf[..n]) {
                        Ok(done) => counters.record_receive(done, n),
                        Err(_) => {
                            counters.record_error();
                            break;
                        }
                    }
                }
            })
        );
    }
    drop(ready_tx);

    let attached = ready_rx.iter().filter(|ok| *ok).count();
    if attached == config.consumers {
        produce(&ring.name, config, &counters, deadline);
    } else {
        counters.stop();
    }

    for handle in handles {
        if handle.join().is_err() {
            counters.record_error();
        }
    }

    let mut metrics = counters.snapshot();
    metrics.duration = start.elapsed();
    metrics
}

fn produce(name: &str, config: &StressConfig, counters: &StressCounters, deadline: Instant) {
    let mut producer = match RingBuffer::open(name, ClientMode::Producer) {
        Ok(producer) => producer,
        Err(_) => {
            counters.record_error();
            counters.stop();
            return;
        }
    };
    let largest = producer.data_bytes() - 1 - RECORD_HEADER;
    let mut rng = rand::thread_rng();
    let mut writer = RecordWriter::new();

    while writer.count() < config.records {
        let len = rng.gen_range(config.min_payload..=config.max_payload).min(largest);
        let record = writer.next_record(len);
        loop {
            match producer.put(&record, Duration::from_millis(10)) {
                Ok(0) if Instant::now() < deadline => continue,
                Ok(0) | Err(_) => {
                    counters.record_error();
                    counters.stop();
                    return;
                }
                Ok(n) => {
                    counters.record_send(n);
                    break;
                }
            }
        }
    }
}
