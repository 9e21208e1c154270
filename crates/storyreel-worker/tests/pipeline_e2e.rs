//! End-to-end runs over the scripted executor.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use storyreel_media::testing::{FakeExecutor, ProbeReply};
use storyreel_media::{ConcatTarget, Tool};
use storyreel_models::{CaptionStyle, ExternalAudioSpec, Manifest, StageOutcome, WorkItem};
use storyreel_worker::{
    BatchSynthesizer, Pipeline, ProcessingRequest, ProcessingService, RetryConfig, SpeechSynthesizer, WorkerConfig,
    WorkerResult,
};
use tempfile::TempDir;

async fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(path, b"media").await.unwrap();
}

async fn items(dir: &TempDir, count: usize) -> Vec<WorkItem> {
    let mut items = Vec::new();
    for i in 0..count {
        let video = dir.path().join("videos").join(format!("scene{}.mp4", i));
        let audio = dir.path().join("audio").join(format!("line{}.mp3", i));
        touch(&video).await;
        touch(&audio).await;
        items.push(
            WorkItem::new(i, video, "The quick brown fox jumps over the lazy dog again")
                .with_audio(audio)
                .with_clip_name(format!("line{}", i)),
        );
    }
    items
}

fn pipeline(fake: Arc<FakeExecutor>, dir: &TempDir) -> Pipeline {
    Pipeline::new(fake, dir.path().join("clips"), dir.path().join("work"), CaptionStyle::default())
}

#[tokio::test]
async fn three_items_produce_three_clips_in_order() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeExecutor::new().with_delay(Duration::from_millis(10)));
    let p = pipeline(fake.clone(), &dir);

    let report = p.process_items(items(&dir, 3).await).await;

    assert_eq!(report.clips.len(), 3);
    assert!(report.failures.is_empty());
    for (i, clip) in report.clips.iter().enumerate() {
        assert_eq!(clip.index, i);
        assert!(clip.clip_path.is_file());
        assert!(std::fs::metadata(&clip.clip_path).unwrap().len() > 0);
        assert!(!clip.degraded);
    }
    // 45+ characters split into two timed segments
    let caption = &fake.ffmpeg_calls_mentioning("drawtext")[0];
    assert!(caption.mentions("enable="));
}

#[tokio::test]
async fn missing_second_source_leaves_two_clips() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeExecutor::new());
    let p = pipeline(fake, &dir);

    let batch = items(&dir, 3).await;
    tokio::fs::remove_file(&batch[1].source_video_path).await.unwrap();

    let report = p.process_items(batch).await;
    assert_eq!(report.clips.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 2]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
}

#[tokio::test]
async fn clips_concatenate_into_project_directory() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeExecutor::new());
    let p = pipeline(fake.clone(), &dir);

    let report = p.process_items(items(&dir, 2).await).await;
    let target = ConcatTarget::project(dir.path().join("out"), "proj/1");
    let outcome = p.concatenate(&report.clip_paths(), &target).await;

    let path = outcome.into_path().unwrap();
    assert!(path.is_file());
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("final_"));
    assert_eq!(fake.ffmpeg_calls_mentioning("concat_list.txt").len(), 1);
}

#[tokio::test]
async fn external_audio_loops_short_track() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(
        FakeExecutor::new()
            .with_probe("external_audio", ProbeReply::audio(40.0))
            .with_default_probe(ProbeReply::video(125.0)),
    );
    let p = pipeline(fake.clone(), &dir);

    let video = dir.path().join("final.mp4");
    touch(&video).await;
    let output = dir.path().join("final_mixed.mp4");
    let spec = ExternalAudioSpec::new("https://example.com/song").with_start_time(5.0);

    let outcome = p.apply_external_audio(&video, &spec, &output).await;
    assert_eq!(outcome, StageOutcome::Success(output.clone()));
    assert_eq!(fake.ffmpeg_calls_mentioning("loop_list.txt").len(), 1);
    assert_eq!(fake.calls_for(Tool::YtDlp).len(), 1);
}

struct FileSynth;

#[async_trait]
impl SpeechSynthesizer for FileSynth {
    async fn synthesize(&self, _text: &str, output: &Path) -> WorkerResult<PathBuf> {
        tokio::fs::write(output, b"mp3").await?;
        Ok(output.to_path_buf())
    }
}

#[tokio::test]
async fn service_synthesizes_missing_narration() {
    let dir = TempDir::new().unwrap();
    let config = WorkerConfig {
        work_dir: dir.path().join("work"),
        output_root: dir.path().join("out"),
        audio_dir: dir.path().join("audio"),
        videos_dir: dir.path().join("videos"),
        ..Default::default()
    };
    touch(&config.videos_dir.join("a.mp4")).await;
    tokio::fs::create_dir_all(&config.audio_dir).await.unwrap();

    let manifest = Manifest::from_json(
        r#"{"audio_1.mp3": {"source_video": "a.mp4", "clip": "opening", "line": "Hello"}}"#,
    )
    .unwrap();

    let fake = Arc::new(FakeExecutor::new());
    let synth = BatchSynthesizer::new(Arc::new(FileSynth), 2, 2)
        .with_retry(RetryConfig::new("synthesis").with_base_delay(Duration::from_millis(1)));
    let service = ProcessingService::new(fake.clone(), &config).with_synthesizer(synth);

    let report = service
        .process_manifest(&manifest, &ProcessingRequest::for_project("p1"))
        .await
        .unwrap();

    assert!(config.audio_dir.join("audio_1.mp3").is_file());
    assert_eq!(report.clips.len(), 1);
    assert!(!report.clips[0].degraded);
    assert_eq!(fake.ffmpeg_calls_mentioning("-shortest").len(), 1);
    assert!(report.final_video.is_some());
}
