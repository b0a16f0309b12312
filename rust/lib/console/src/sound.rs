use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::notification::SoundDirective;

/// Tone of the fallback beep.
pub const BEEP_FREQUENCY_HZ: f32 = 800.0;
pub const BEEP_DURATION: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
#[error("audio: {0}")]
pub struct AudioError(pub String);

/// Platform audio output. Hosts inject their own; [`TracingAudio`] only
/// logs.
pub trait AudioBackend: Send + Sync {
    /// Start playing `src`. Callers stop the previous sound first.
    fn play(&self, src: &str, volume: f32, looping: bool) -> Result<(), AudioError>;

    /// Synthesize a tone that ends by itself after `duration`.
    fn beep(&self, frequency_hz: f32, volume: f32, duration: Duration) -> Result<(), AudioError>;

    /// Stop the sound started by `play`, if any.
    fn stop(&self) -> Result<(), AudioError>;
}

/// Backend for headless hosts: every call becomes a log line.
pub struct TracingAudio;

impl AudioBackend for TracingAudio {
    fn play(&self, src: &str, volume: f32, looping: bool) -> Result<(), AudioError> {
        info!(src, volume, looping, "notification sound");
        Ok(())
    }

    fn beep(&self, frequency_hz: f32, volume: f32, duration: Duration) -> Result<(), AudioError> {
        info!(frequency_hz, volume, ?duration, "notification beep");
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Plays notification sounds.
///
/// At most one sourced sound plays at a time. Non-looping sounds are cut
/// after `ceiling`. Each play bumps a generation counter and a stop timer
/// only fires if its generation is still current.
pub struct SoundController {
    backend: Arc<dyn AudioBackend>,
    ceiling: Duration,
    generation: Arc<AtomicU64>,
}

impl SoundController {
    pub fn new(backend: Arc<dyn AudioBackend>, ceiling: Duration) -> Self {
        Self {
            backend,
            ceiling,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn play(&self, directive: Option<&SoundDirective>) {
        let Some(directive) = directive.filter(|d| d.enabled) else {
            return;
        };
        let volume = directive.volume.clamp(0.0, 1.0);

        let Some(src) = directive.src.as_deref().filter(|s| !s.is_empty()) else {
            if let Err(e) = self.backend.beep(BEEP_FREQUENCY_HZ, volume, BEEP_DURATION) {
                debug!("beep failed: {}", e);
            }
            return;
        };

        self.stop();
        let generation = self.generation.load(Ordering::SeqCst);
        if let Err(e) = self.backend.play(src, volume, directive.looping) {
            debug!(src, "sound playback failed: {}", e);
            return;
        }
        if !directive.looping {
            self.stop_after(self.ceiling, generation);
        }
    }

    /// Stop whatever is playing and invalidate pending stop timers.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.backend.stop() {
            debug!("sound stop failed: {}", e);
        }
    }

    fn stop_after(&self, delay: Duration, generation: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime for sound ceiling timer");
            return;
        };
        let backend = self.backend.clone();
        let current = self.generation.clone();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) == generation {
                if let Err(e) = backend.stop() {
                    debug!("sound stop failed: {}", e);
                }
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records backend calls as short strings.
    #[derive(Default)]
    pub struct RecordingAudio {
        pub calls: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingAudio {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<(), AudioError> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(AudioError("device busy".into()))
            } else {
                Ok(())
            }
        }
    }

    impl AudioBackend for RecordingAudio {
        fn play(&self, src: &str, volume: f32, looping: bool) -> Result<(), AudioError> {
            self.record(format!("play {} {} {}", src, volume, looping))
        }

        fn beep(&self, frequency_hz: f32, _volume: f32, duration: Duration) -> Result<(), AudioError> {
            self.record(format!("beep {} {}ms", frequency_hz, duration.as_millis()))
        }

        fn stop(&self) -> Result<(), AudioError> {
            self.record("stop".into())
        }
    }
}
