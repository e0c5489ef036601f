//! Speech-to-text for voice messages using whisper-rs.
//!
//! Telegram voice notes are OGG Opus; ffmpeg turns them into the 16 kHz
//! mono samples Whisper wants.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

const SAMPLE_RATE: &str = "16000";

/// Loaded Whisper model. Cheap to clone.
#[derive(Clone)]
pub struct Whisper {
    ctx: Arc<WhisperContext>,
    language: String,
    model_name: String,
}

impl Whisper {
    /// Load a .bin model. `language` is a code like "ru", or "auto".
    pub fn new(model_path: &Path, language: &str) -> Result<Self, String> {
        info!("Loading Whisper model from {:?}", model_path);

        if !model_path.exists() {
            return Err(format!("Model file not found: {:?}", model_path));
        }

        let ctx = WhisperContext::new_with_params(
            model_path.to_str().ok_or("Invalid model path")?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| format!("Failed to load Whisper model: {e}"))?;

        let model_name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!("Whisper model {} loaded (language: {})", model_name, language);
        Ok(Self {
            ctx: Arc::new(ctx),
            language: language.to_string(),
            model_name,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Transcribe OGG Opus bytes. Blocking; call from `spawn_blocking`.
    pub fn transcribe(&self, ogg_data: &[u8]) -> Result<String, String> {
        debug!("Transcribing {} bytes of audio", ogg_data.len());
        let samples = ogg_to_samples(ogg_data)?;

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| format!("Failed to create Whisper state: {e}"))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(self.language.as_str()));
        params.set_translate(false);
        params.set_no_timestamps(true);
        params.set_print_progress(false);

        state
            .full(params, &samples)
            .map_err(|e| format!("Whisper transcription failed: {e}"))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            if let Ok(s) = segment.to_str() {
                text.push_str(s.trim());
                text.push(' ');
            }
        }

        let text = text.trim().to_string();
        info!("Transcribed: \"{}\"", preview(&text, 100));
        Ok(text)
    }
}

/// Removes the temp input on drop.
struct TempInput(PathBuf);

impl Drop for TempInput {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Decode to f32 samples via `ffmpeg ... -f s16le pipe:1`.
fn ogg_to_samples(ogg_data: &[u8]) -> Result<Vec<f32>, String> {
    // ffmpeg needs a seekable input for OGG, so no stdin
    let input = TempInput(std::env::temp_dir().join(format!("voxrelay_{}.ogg", Uuid::new_v4())));
    std::fs::write(&input.0, ogg_data).map_err(|e| format!("Failed to write temp input: {e}"))?;

    let output = Command::new("ffmpeg")
        .arg("-i")
        .arg(&input.0)
        .args(["-ar", SAMPLE_RATE, "-ac", "1", "-f", "s16le", "-acodec", "pcm_s16le", "-y", "pipe:1"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| format!("Failed to run ffmpeg: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("ffmpeg failed: {}", stderr.trim()));
    }

    Ok(pcm_s16le_to_f32(&output.stdout))
}

fn pcm_s16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
