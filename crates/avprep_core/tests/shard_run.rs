mod common;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use avprep_core::counter::recount_shard;
use avprep_core::manifest::{read_failures, FailureKind};
use avprep_core::output::OutputLayout;
use avprep_core::pipeline::{RunMode, ShardError, ShardRunner};
use avprep_core::shard::{merge_shard_files, ShardSpec};
use tempfile::tempdir;

use common::*;

#[test]
fn faceless_clip_is_recorded_and_others_complete() {
    let dir = tempdir().unwrap();
    let clips = three_clips(dir.path());
    let settings = test_settings(dir.path(), 2);
    let layout = OutputLayout::from_settings(&settings.paths);

    let report = runner(&settings, ShardSpec::single(), RunMode::Crop)
        .run(&clips)
        .unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.succeeded(), 2);

    let failures = read_failures(&layout.shard_file("failed.0.tsv")).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].clip_id, "c2");
    assert_eq!(failures[0].kind, FailureKind::NoFaceDetected);

    assert!(layout.is_complete("c1"));
    assert!(layout.is_complete("c3"));
    assert!(!layout.video_path("c2").exists());
    assert!(!layout.audio_path("c2").exists());

    assert_eq!(read(layout.shard_file("nframes.video.0")), "5\n7\n");
    assert_eq!(read(layout.shard_file("nframes.audio.0")), "3200\n4480\n");
    assert_eq!(read(layout.shard_file("file.list.0")), "c1\nc3\n");
    assert_eq!(
        read(layout.shard_file("label.list.0")),
        "words of c1\nwords of c3\n"
    );
}

#[test]
fn audio_failure_leaves_no_cropped_video() {
    let dir = tempdir().unwrap();
    let clips = vec![
        clip(dir.path(), "c1", &[200], 5).with_audio_file(dir.path().join("missing.wav")),
        clip(dir.path(), "c2", &[180], 4),
    ];
    let settings = test_settings(dir.path(), 1);
    let layout = OutputLayout::from_settings(&settings.paths);

    let report = runner(&settings, ShardSpec::single(), RunMode::Crop)
        .run(&clips)
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].clip_id, "c1");
    assert_eq!(report.failures[0].kind, FailureKind::MediaError);

    assert!(!layout.video_path("c1").exists());
    assert!(!layout.audio_path("c1").exists());
    let leftovers: Vec<_> = fs::read_dir(&layout.video_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["c2.mp4".to_string()]);
    assert_eq!(read(layout.shard_file("file.list.0")), "c2\n");
}

#[test]
fn missing_frames_are_filled_not_failed() {
    let dir = tempdir().unwrap();
    let clips = vec![clip(dir.path(), "gappy", &[0, 200, 0, 200, 200, 0], 6)];
    let settings = test_settings(dir.path(), 1);
    let layout = OutputLayout::from_settings(&settings.paths);

    let report = runner(&settings, ShardSpec::single(), RunMode::Crop)
        .run(&clips)
        .unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(read(layout.shard_file("nframes.video.0")), "6\n");

    let landmarks = read(layout.landmark_path("gappy"));
    let lines: Vec<&str> = landmarks.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], "-");
    assert_ne!(lines[1], "-");
}

#[test]
fn counts_keep_input_order_under_parallelism() {
    let dir = tempdir().unwrap();
    let clips: Vec<_> = (0..8)
        .map(|i| clip(dir.path(), &format!("clip{}", i), &[100 + i as u8], 3 + (i * 5) % 7))
        .collect();
    let expected: String = (0..8).map(|i| format!("{}\n", 3 + (i * 5) % 7)).collect();

    for threads in [1, 4] {
        let root = dir.path().join(format!("run{}", threads));
        fs::create_dir_all(&root).unwrap();
        let settings = test_settings(&root, threads);
        let layout = OutputLayout::from_settings(&settings.paths);

        runner(&settings, ShardSpec::single(), RunMode::Crop)
            .run(&clips)
            .unwrap();

        assert_eq!(read(layout.shard_file("nframes.video.0")), expected);
        let ids: Vec<String> = (0..8).map(|i| format!("clip{}\n", i)).collect();
        assert_eq!(read(layout.shard_file("file.list.0")), ids.concat());
    }
}

#[test]
fn rerun_skips_finished_clips_and_rewrites_identical_files() {
    let dir = tempdir().unwrap();
    let clips = three_clips(dir.path());
    let settings = test_settings(dir.path(), 2);
    let layout = OutputLayout::from_settings(&settings.paths);

    runner(&settings, ShardSpec::single(), RunMode::Crop)
        .run(&clips)
        .unwrap();
    let names = ["nframes.audio.0", "nframes.video.0", "file.list.0", "label.list.0"];
    let first: Vec<String> = names.iter().map(|n| read(layout.shard_file(n))).collect();

    let again = runner(&settings, ShardSpec::single(), RunMode::Crop)
        .run(&clips)
        .unwrap();

    assert_eq!(again.resumed, 2);
    assert_eq!(again.processed, 1);
    assert_eq!(again.failures.len(), 1);
    let second: Vec<String> = names.iter().map(|n| read(layout.shard_file(n))).collect();
    assert_eq!(first, second);
}

#[test]
fn stale_partials_are_swept_at_startup() {
    let dir = tempdir().unwrap();
    let clips = three_clips(dir.path());
    let settings = test_settings(dir.path(), 1);
    let layout = OutputLayout::from_settings(&settings.paths);

    fs::create_dir_all(&layout.video_dir).unwrap();
    let stale = layout.video_dir.join(".c1.partial.mp4");
    fs::write(&stale, "half written").unwrap();

    let report = runner(&settings, ShardSpec::single(), RunMode::Crop)
        .run(&clips)
        .unwrap();

    assert_eq!(report.removed_partials, 1);
    assert!(!stale.exists());
    assert!(layout.is_complete("c1"));
}

#[test]
fn shards_merge_to_the_single_worker_result() {
    let dir = tempdir().unwrap();
    let clips: Vec<_> = (0..5)
        .map(|i| clip(dir.path(), &format!("u{}", i), &[90 + i as u8], 2 + i))
        .collect();

    let single_root = dir.path().join("single");
    fs::create_dir_all(&single_root).unwrap();
    let single = test_settings(&single_root, 1);
    runner(&single, ShardSpec::single(), RunMode::Crop)
        .run(&clips)
        .unwrap();

    let split_root = dir.path().join("split");
    fs::create_dir_all(&split_root).unwrap();
    let split = test_settings(&split_root, 1);
    for rank in 0..2 {
        let report = runner(&split, ShardSpec::new(rank, 2).unwrap(), RunMode::Crop)
            .run(&clips)
            .unwrap();
        assert_eq!(report.assignment.len(), if rank == 0 { 3 } else { 2 });
    }

    let single_out = OutputLayout::from_settings(&single.paths).output_dir;
    let split_out = OutputLayout::from_settings(&split.paths).output_dir;
    for name in ["nframes.video", "nframes.audio", "file.list", "label.list"] {
        assert_eq!(merge_shard_files(&split_out, name, 2).unwrap(), 5);
        assert_eq!(
            read(split_out.join(name)),
            read(single_out.join(format!("{}.0", name)))
        );
    }
}

#[test]
fn detector_errors_are_retried_with_a_fresh_model() {
    let dir = tempdir().unwrap();
    let clips = vec![clip(dir.path(), "solo", &[200], 4)];
    let settings = test_settings(dir.path(), 1);
    let factory = Arc::new(ScriptedFactory {
        flaky: 1,
        ..ScriptedFactory::default()
    });

    let runner = runner_with_factory(&settings, ShardSpec::single(), RunMode::Crop, factory);
    let report = runner.run(&clips).unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(runner.context().models.discarded(), 1);
    assert_eq!(runner.context().models.created(), 2);
}

#[test]
fn exhausted_retries_fail_the_clip() {
    let dir = tempdir().unwrap();
    let clips = vec![clip(dir.path(), "solo", &[200], 4)];
    let mut settings = test_settings(dir.path(), 1);
    settings.detection.max_retries = 0;
    let factory = Arc::new(ScriptedFactory {
        flaky: 1,
        ..ScriptedFactory::default()
    });

    let report = runner_with_factory(&settings, ShardSpec::single(), RunMode::Crop, factory)
        .run(&clips)
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::DetectionFailed);
}

#[test]
fn landmark_mode_writes_only_landmarks() {
    let dir = tempdir().unwrap();
    let clips = three_clips(dir.path());
    let settings = test_settings(dir.path(), 2);
    let layout = OutputLayout::from_settings(&settings.paths);

    let report = runner(&settings, ShardSpec::single(), RunMode::Landmarks)
        .run(&clips)
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(read(layout.landmark_path("c3")).lines().count(), 7);
    assert!(!layout.video_path("c1").exists());
    assert!(!layout.shard_file("nframes.video.0").exists());
    assert!(layout.shard_file("failed.landmarks.0.tsv").is_file());
}

#[test]
fn cached_landmarks_skip_detection() {
    let dir = tempdir().unwrap();
    let clips = vec![clip(dir.path(), "c1", &[200], 5)];
    let settings = test_settings(dir.path(), 1);

    runner(&settings, ShardSpec::single(), RunMode::Landmarks)
        .run(&clips)
        .unwrap();

    let factory = Arc::new(ScriptedFactory::default());
    let crop = runner_with_factory(&settings, ShardSpec::single(), RunMode::Crop, factory.clone());
    let report = crop.run(&clips).unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(factory.detect_calls.load(Ordering::SeqCst), 0);
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
}

#[test]
fn unspawnable_detector_stops_the_worker() {
    let dir = tempdir().unwrap();
    let clips = three_clips(dir.path());
    let settings = test_settings(dir.path(), 2);
    let layout = OutputLayout::from_settings(&settings.paths);
    let factory = Arc::new(ScriptedFactory {
        unspawnable: true,
        ..ScriptedFactory::default()
    });

    let err = runner_with_factory(&settings, ShardSpec::single(), RunMode::Crop, factory)
        .run(&clips)
        .unwrap_err();

    assert!(matches!(err, ShardError::Config(_)));
    assert!(err.to_string().contains("face-landmarker"));
    assert!(!layout.shard_file("failed.0.tsv").exists());
    assert!(!layout.shard_file("nframes.video.0").exists());
}

#[test]
fn missing_media_tools_stop_the_worker() {
    let dir = tempdir().unwrap();
    let clips = three_clips(dir.path());
    let settings = test_settings(dir.path(), 1);
    let layout = OutputLayout::from_settings(&settings.paths);

    let runner = ShardRunner::from_settings(
        settings,
        ShardSpec::single(),
        RunMode::Crop,
        Arc::new(FakeBackend {
            missing_tools: true,
            ..FakeBackend::default()
        }),
        Arc::new(ScriptedFactory::default()),
        None,
        None,
    )
    .unwrap();
    let err = runner.run(&clips).unwrap_err();

    assert!(matches!(err, ShardError::Config(_)));
    assert!(!layout.shard_file("failed.0.tsv").exists());
}

#[test]
fn recount_reports_missing_outputs() {
    let dir = tempdir().unwrap();
    let clips = three_clips(dir.path());
    let settings = test_settings(dir.path(), 2);
    let layout = OutputLayout::from_settings(&settings.paths);

    runner(&settings, ShardSpec::single(), RunMode::Crop)
        .run(&clips)
        .unwrap();
    fs::remove_file(layout.audio_path("c3")).unwrap();

    let report =
        recount_shard(&FakeBackend::default(), &layout, &ShardSpec::single(), &clips).unwrap();
    assert_eq!(report.counts.len(), 1);
    let failed: Vec<&str> = report.failures.iter().map(|f| f.clip_id.as_str()).collect();
    assert_eq!(failed, vec!["c2", "c3"]);
    assert_eq!(read(layout.shard_file("nframes.video.0")), "5\n");
    assert_eq!(read(layout.shard_file("file.list.0")), "c1\n");
    // The crop run's failure manifest is kept
    assert_eq!(read_failures(&layout.shard_file("failed.0.tsv")).unwrap().len(), 1);
}
