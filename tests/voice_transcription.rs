//! Integration tests for voice transcription.
//!
//! These tests require:
//! 1. A Whisper model file (ggml-base.bin recommended for tests)
//! 2. ffmpeg installed for audio conversion
//!
//! Run with: cargo test --features integ_test --test voice_transcription

#[cfg(feature = "integ_test")]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use voxrelay::bot::whisper::Whisper;
    use voxrelay::config::QueueConfig;
    use voxrelay::queue::{Answer, Consumer, Producer, SessionStore};

    /// Path to test Whisper model (set via env var or default location)
    fn get_test_model_path() -> PathBuf {
        std::env::var("WHISPER_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/test/ggml-base.bin"))
    }

    fn get_test_audio_dir() -> PathBuf {
        PathBuf::from("data/test/audio")
    }

    #[test]
    fn test_whisper_loads() {
        let model_path = get_test_model_path();
        if !model_path.exists() {
            eprintln!("Skipping test: model not found at {:?}", model_path);
            eprintln!("Download from: https://huggingface.co/ggerganov/whisper.cpp/tree/main");
            return;
        }

        let whisper = Whisper::new(&model_path, "auto");
        assert!(whisper.is_ok(), "Failed to load Whisper: {:?}", whisper.err());
    }

    /// Needs data/test/audio/hello.ogg with someone saying "hello".
    #[test]
    fn test_transcribe_hello() {
        let model_path = get_test_model_path();
        let audio_path = get_test_audio_dir().join("hello.ogg");
        if !model_path.exists() || !audio_path.exists() {
            eprintln!("Skipping test: model or audio missing");
            return;
        }

        let whisper = Whisper::new(&model_path, "en").expect("Failed to load model");
        let audio_data = std::fs::read(&audio_path).expect("Failed to read audio file");

        let text = whisper.transcribe(&audio_data).expect("Transcription failed").to_lowercase();
        println!("Transcribed: {}", text);
        assert!(
            text.contains("hello") || text.contains("hi") || text.contains("hey"),
            "Expected greeting in transcription, got: {}",
            text
        );
    }

    /// Voice note -> transcription -> queue -> fallback answer.
    #[tokio::test]
    async fn test_e2e_voice_prompt_through_queue() {
        let model_path = get_test_model_path();
        let audio_path = get_test_audio_dir().join("test_phrase.ogg");
        if !model_path.exists() || !audio_path.exists() {
            eprintln!("Skipping E2E test: model or audio missing");
            return;
        }

        let whisper = Whisper::new(&model_path, "auto").expect("Failed to load Whisper model");
        let audio_data = std::fs::read(&audio_path).expect("Failed to read test audio");
        let transcription = tokio::task::spawn_blocking(move || whisper.transcribe(&audio_data))
            .await
            .unwrap()
            .expect("Transcription failed");
        assert!(!transcription.is_empty(), "Transcription should not be empty");

        let root = TempDir::new().unwrap();
        let config = QueueConfig {
            request_dir: root.path().join("requests"),
            response_dir: root.path().join("responses"),
            poll_interval_ms: 20,
            cli_enabled: false,
            ..QueueConfig::default()
        };
        config.dirs().ensure().await.unwrap();

        let consumer = Consumer::from_config(&config).unwrap();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let worker = tokio::spawn(async move { consumer.run(token).await.unwrap() });

        let producer = Producer::new(&config, Arc::new(SessionStore::new(10, 10)));
        let answer = producer.ask(&transcription, 12345).await.unwrap();
        assert_eq!(answer, Answer::Completed(format!("[fallback] {transcription}")));

        cancel.cancel();
        worker.await.unwrap();
    }
}
