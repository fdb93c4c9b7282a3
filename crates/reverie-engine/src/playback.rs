//! Live playback clock over the default output device (`rodio`).
//!
//! `rodio::OutputStream` is `!Send` on some platforms, so it lives on a
//! dedicated OS thread for its whole life. The thread hands back the
//! `Send + Sync` pieces (the sink and the mixer controller) and then parks
//! until it is told to shut down.
//!
//! Every scheduled block is faded, wrapped in a [`SamplesBuffer`] and added
//! to a dynamic mixer with a start delay relative to the sink's position. A
//! silent source keeps the mixer (and therefore the clock) running between
//! blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::dynamic_mixer::{self, DynamicMixerController};
use rodio::source::Zero;
use rodio::{OutputStream, Sink, Source};

use crate::clock::{PlaybackClock, ScheduledAudio};
use crate::config::ENGINE_CHANNELS;
use crate::error::EngineError;

type InitReply = Result<(Arc<Sink>, Arc<DynamicMixerController<f32>>), EngineError>;

/// Handle to the audio thread that owns the output stream.
struct AudioThread {
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AudioThread {
    fn stop(&mut self) {
        // Dropping the sender wakes the thread.
        self.shutdown.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// [`PlaybackClock`] that plays through the default output device.
///
/// Clock time is the sink's playback position, so it stops while paused.
pub struct RodioClock {
    sink: Arc<Sink>,
    mixer: Arc<DynamicMixerController<f32>>,
    sample_rate: u32,
    audio: Mutex<AudioThread>,
    closed: AtomicBool,
}

impl RodioClock {
    /// Open the default output device at `sample_rate`.
    pub fn open(sample_rate: u32) -> Result<Self, EngineError> {
        let (init_tx, init_rx) = mpsc::channel::<InitReply>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("reverie-audio".into())
            .spawn(move || Self::run(sample_rate, &init_tx, &shutdown_rx))
            .map_err(|e| {
                EngineError::ClockUnavailable(format!("failed to spawn audio thread: {e}"))
            })?;

        let (sink, mixer) = init_rx.recv().map_err(|_| EngineError::AudioThreadDied)??;

        tracing::info!(sample_rate, "Live playback clock opened on default output device");

        Ok(Self {
            sink,
            mixer,
            sample_rate,
            audio: Mutex::new(AudioThread {
                shutdown: Some(shutdown_tx),
                thread: Some(thread),
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Body of the audio thread. The output stream never leaves it.
    fn run(sample_rate: u32, init_tx: &mpsc::Sender<InitReply>, shutdown_rx: &mpsc::Receiver<()>) {
        let (stream, handle) = match OutputStream::try_default() {
            Ok(pair) => pair,
            Err(e) => {
                let _ = init_tx.send(Err(EngineError::ClockUnavailable(e.to_string())));
                return;
            }
        };
        let sink = match Sink::try_new(&handle) {
            Ok(sink) => sink,
            Err(e) => {
                let _ = init_tx.send(Err(EngineError::ClockUnavailable(e.to_string())));
                return;
            }
        };

        let (controller, mixer) = dynamic_mixer::mixer::<f32>(ENGINE_CHANNELS, sample_rate);
        controller.add(Zero::<f32>::new(ENGINE_CHANNELS, sample_rate));
        sink.append(mixer);

        if init_tx.send(Ok((Arc::new(sink), controller))).is_err() {
            return;
        }

        // Park until the clock closes (message or dropped sender).
        let _ = shutdown_rx.recv();
        drop(stream);
        tracing::debug!("Audio thread shutting down");
    }
}

impl PlaybackClock for RodioClock {
    fn now(&self) -> f64 {
        self.sink.get_pos().as_secs_f64()
    }

    fn schedule(&self, audio: ScheduledAudio) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::ClockError("clock is closed".into()));
        }
        if audio.sample_rate != self.sample_rate {
            return Err(EngineError::ClockError(format!(
                "block at {} Hz on a {} Hz clock",
                audio.sample_rate, self.sample_rate
            )));
        }

        let delay = Duration::try_from_secs_f64((audio.start - self.now()).max(0.0))
            .map_err(|e| EngineError::ClockError(e.to_string()))?;
        let source = SamplesBuffer::new(ENGINE_CHANNELS, audio.sample_rate, audio.faded_samples())
            .delay(delay);
        self.mixer.add(source);

        tracing::debug!(
            block = audio.block_index,
            delay_secs = delay.as_secs_f64(),
            "Block queued on output mixer"
        );
        Ok(())
    }

    fn suspend(&self) -> Result<(), EngineError> {
        self.sink.pause();
        Ok(())
    }

    fn resume(&self) -> Result<(), EngineError> {
        self.sink.play();
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sink.stop();
        self.audio
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();
    }

    fn name(&self) -> &str {
        "rodio"
    }
}

impl Drop for RodioClock {
    fn drop(&mut self) {
        self.close();
    }
}
