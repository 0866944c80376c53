use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use cpal::{
    SampleFormat, SizedSample, Stream, StreamConfig,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use crossbeam_channel::{Receiver, Sender, bounded};

// Roughly a quarter second of 44.1 kHz audio in typical callback sizes.
const SAMPLE_QUEUE_DEPTH: usize = 32;
const KEEPALIVE_POLL: Duration = Duration::from_millis(100);
const THREAD_NAME: &str = "microphone-input";

/// Keeps the microphone stream alive on its own thread. `cpal` streams are not
/// `Send` on every backend, so the stream is created and dropped there.
#[derive(Debug)]
pub struct MicrophoneInput {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    device_name: String,
}

impl MicrophoneInput {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for MicrophoneInput {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn microphone_thread() -> thread::Builder {
    thread::Builder::new().name(THREAD_NAME.into())
}

/// Opens the default input device and forwards mono sample chunks. Returns the
/// handle plus the receiving end for the spectrum analyser.
pub fn start_microphone() -> Result<(MicrophoneInput, Receiver<Vec<f32>>)> {
    let (samples_tx, samples_rx) = bounded(SAMPLE_QUEUE_DEPTH);
    let (ready_tx, ready_rx) = bounded::<Result<String, String>>(1);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = microphone_thread()
        .spawn(move || {
            let (stream, name) = match open_input_stream(samples_tx) {
                Ok(opened) => opened,
                Err(err) => {
                    let _ = ready_tx.send(Err(format!("{err:#}")));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(name));

            while !stop_flag.load(Ordering::Relaxed) {
                thread::park_timeout(KEEPALIVE_POLL);
            }
            drop(stream);
        })
        .context("failed to spawn microphone thread")?;

    let device_name = match ready_rx.recv() {
        Ok(Ok(name)) => name,
        Ok(Err(err)) => {
            let _ = handle.join();
            return Err(anyhow!(err));
        }
        Err(_) => {
            let _ = handle.join();
            return Err(anyhow!("microphone thread exited before reporting"));
        }
    };

    log::info!("microphone input started on {device_name}");
    Ok((
        MicrophoneInput {
            stop,
            handle: Some(handle),
            device_name,
        },
        samples_rx,
    ))
}

fn open_input_stream(samples_tx: Sender<Vec<f32>>) -> Result<(Stream, String)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no default audio input device"))?;
    let name = device.name().unwrap_or_else(|_| "unknown input".to_string());
    let supported = device
        .default_input_config()
        .context("failed to query default input config")?;

    let format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let stream = match format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, samples_tx)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, samples_tx)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, samples_tx)?,
        other => return Err(anyhow!("unsupported input sample format {other:?}")),
    };
    stream.play().context("failed to start input stream")?;
    Ok((stream, name))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    samples_tx: Sender<Vec<f32>>,
) -> Result<Stream>
where
    T: SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Drop the chunk if the analyser has fallen behind.
                let _ = samples_tx.try_send(downmix(data, channels));
            },
            |err| log::warn!("microphone stream error: {err}"),
            None,
        )
        .context("failed to build input stream")?;
    Ok(stream)
}

fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    data.chunks(channels)
        .map(|frame| {
            let sum: f32 = frame
                .iter()
                .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                .sum();
            sum / frame.len() as f32
        })
        .collect()
}
