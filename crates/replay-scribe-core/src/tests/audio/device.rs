use crate::audio::device::{CpalDriver, read_wav, write_wav};
use crate::{AudioDriver, Playback, Recording, RecordingPreset};

use std::time::Duration;

use uuid::Uuid;

fn temp_wav() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("replay-scribe-test-{}.wav", Uuid::new_v4()))
}

/// WHAT: Samples survive the WAV encode/decode boundary
/// WHY: The clip file is the only thing connecting capture to playback
#[test]
#[allow(clippy::unwrap_used)]
fn given_captured_samples_when_written_and_read_then_preserved() {
    // Given: A short ramp of samples
    let path = temp_wav();
    let samples: Vec<f32> = (0..441).map(|i| (i as f32 / 441.0) - 0.5).collect();

    // When: Writing and reading the clip
    write_wav(&path, &samples, 44_100, 1).unwrap();
    let (decoded, spec) = read_wav(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    // Then: Format and content match within 16-bit quantization error
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.channels, 1);
    assert_eq!(decoded.len(), samples.len());
    for (a, b) in samples.iter().zip(decoded.iter()) {
        assert!((a - b).abs() < 2.0 / f32::from(i16::MAX), "{a} vs {b}");
    }
}

/// WHAT: Out-of-range samples are clamped, not wrapped
/// WHY: A hot microphone must clip audibly, not corrupt the artifact
#[test]
#[allow(clippy::unwrap_used)]
fn given_overdriven_samples_when_written_then_clamped() {
    let path = temp_wav();
    let samples = [2.0f32, -2.0, 0.0];

    write_wav(&path, &samples, 16_000, 1).unwrap();
    let (decoded, _) = read_wav(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert!((decoded[0] - 1.0).abs() < 0.001);
    assert!((decoded[1] + 1.0).abs() < 0.001);
    assert!(decoded[2].abs() < 0.001);
}

/// WHAT: Reading a missing clip reports a device error
/// WHY: Playback of an unreferenceable artifact must fail cleanly
#[test]
fn given_missing_file_when_reading_then_error() {
    let result = read_wav(std::path::Path::new("/nonexistent/clip.wav"));

    assert!(result.is_err());
}

/// WHAT: Full capture/playback pass against real devices
/// WHY: Exercises the audio threads end to end; needs a microphone
#[tokio::test]
#[allow(clippy::unwrap_used)]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn given_real_devices_when_recording_briefly_then_clip_plays() {
    // Given: The default host's devices
    let driver = CpalDriver::new().unwrap();

    // When: Capturing for a moment and finalizing
    let mut recording = driver
        .create_recording(&RecordingPreset::high_quality())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let clip = recording.stop_and_unload().await.unwrap();

    // Then: The clip loads and starts playing
    let mut sound = driver.create_sound(&clip).await.unwrap();
    let finished = sound.take_finished();
    assert!(finished.is_some());
    sound.play().await.unwrap();
    sound.stop().await.unwrap();
    sound.unload().await.unwrap();

    let _ = std::fs::remove_file(clip.to_file_path().unwrap());
}
