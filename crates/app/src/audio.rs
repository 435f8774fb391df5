use anyhow::{Context, Result};
use blowdetect_core::block::samples_for;
use blowdetect_core::{AudioBlock, AudioSource, DetectError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, TryRecvError};
use log::{info, warn};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Extra time an acquisition may take beyond its own duration before the device is declared dead.
const ACQUIRE_GRACE: Duration = Duration::from_secs(1);

const POP_CHUNK: usize = 1024;

/// Microphone capture through cpal.
///
/// The input stream runs for the lifetime of the source and feeds a ring
/// buffer; each acquisition drops whatever is queued and then waits for fresh
/// samples, so every block is recorded after the previous one was processed.
pub struct CpalSource {
    _stream: cpal::Stream,
    consumer: HeapCons<f32>,
    errors: Receiver<String>,
    cancel: Arc<AtomicBool>,
    sample_rate: u32,
}

impl CpalSource {
    /// Opens `device_name` ("default" for the host default) as a mono input.
    pub fn open(device_name: &str, sample_rate: u32, cancel: Arc<AtomicBool>) -> Result<Self> {
        let host = cpal::default_host();
        info!("Audio host: {}", host.id().name());

        let device = if device_name == "default" {
            host.default_input_device()
                .context("No default input found")?
        } else {
            host.input_devices()?
                .find(|d| d.name().ok().as_deref() == Some(device_name))
                .context("Input device not found")?
        };
        info!("Using input device: {}", device.name().unwrap_or_default());

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Half a second of headroom between acquisitions
        let rb = HeapRb::<f32>::new((sample_rate as usize / 2).max(POP_CHUNK));
        let (mut producer, consumer) = rb.split();
        let (error_tx, errors) = crossbeam_channel::bounded(8);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _| {
                    let _ = producer.push_slice(data);
                },
                move |err| {
                    warn!("Input error: {}", err);
                    let _ = error_tx.try_send(err.to_string());
                },
                None,
            )
            .context("Failed to open input stream")?;
        stream.play().context("Failed to start input stream")?;

        Ok(Self {
            _stream: stream,
            consumer,
            errors,
            cancel,
            sample_rate,
        })
    }
}

impl AudioSource for CpalSource {
    fn acquire(&mut self, duration_s: f64, sample_rate: u32) -> Result<Option<AudioBlock>, DetectError> {
        if sample_rate != self.sample_rate {
            return Err(DetectError::Device(format!(
                "stream runs at {} Hz, {} Hz requested",
                self.sample_rate, sample_rate
            )));
        }

        let stale = self.consumer.occupied_len();
        self.consumer.skip(stale);

        let timeout = acquire_timeout(duration_s)?;
        let needed = samples_for(duration_s, sample_rate);
        Ok(collect_block(&mut self.consumer, needed, &self.cancel, &self.errors, timeout)?
            .map(|samples| AudioBlock::new(samples, sample_rate)))
    }
}

/// Deadline for one acquisition: its own duration plus [`ACQUIRE_GRACE`].
fn acquire_timeout(duration_s: f64) -> Result<Duration, DetectError> {
    Duration::try_from_secs_f64(duration_s.max(0.0))
        .ok()
        .and_then(|d| d.checked_add(ACQUIRE_GRACE))
        .ok_or_else(|| DetectError::Device(format!("cannot wait {}s for audio", duration_s)))
}

/// Pops exactly `needed` samples, sleeping while the buffer is empty.
/// Returns `None` if `cancel` is raised first.
fn collect_block<C>(
    consumer: &mut C,
    needed: usize,
    cancel: &AtomicBool,
    errors: &Receiver<String>,
    timeout: Duration,
) -> Result<Option<Vec<f64>>, DetectError>
where
    C: Consumer<Item = f32>,
{
    let deadline = Instant::now() + timeout;
    let mut samples = Vec::with_capacity(needed);
    let mut chunk = [0.0f32; POP_CHUNK];

    while samples.len() < needed {
        if cancel.load(Ordering::Relaxed) {
            return Ok(None);
        }
        match errors.try_recv() {
            Ok(err) => return Err(DetectError::Device(err)),
            Err(TryRecvError::Disconnected) => {
                return Err(DetectError::Device("input stream closed".into()))
            }
            Err(TryRecvError::Empty) => {}
        }

        let want = (needed - samples.len()).min(POP_CHUNK);
        let read = consumer.pop_slice(&mut chunk[..want]);
        samples.extend(chunk[..read].iter().map(|&s| s as f64));

        if read == 0 {
            if Instant::now() > deadline {
                return Err(DetectError::Device(format!(
                    "no audio for {:.1}s ({} of {} samples captured)",
                    timeout.as_secs_f64(),
                    samples.len(),
                    needed
                )));
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    Ok(Some(samples))
}

/// Prints the host's input devices.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    println!("Audio Host: {}", host.id().name());
    println!("\nInput Devices:");
    for device in host.input_devices()? {
        println!("  - {}", device.name().unwrap_or("Unknown".to_string()));
    }
    Ok(())
}
