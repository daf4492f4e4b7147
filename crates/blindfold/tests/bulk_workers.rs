//! End-to-end checks that drive the real `blindfold` binary, both as a bulk
//! worker process and as a command-line tool.

use blindfold_core::{BulkOrchestrator, Parallelism, ScrubberConfig};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One stump on a "bottom half minus top half" feature over a 24x24 window.
const EDGE_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>24</height>
  <width>24</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 5.0e-1</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 24 12 -1.</_>
        <_>
          0 12 24 12 1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_blindfold"))
}

fn write_cascade(dir: &Path) -> PathBuf {
    let path = dir.join("edge.xml");
    std::fs::write(&path, EDGE_CASCADE).unwrap();
    path
}

/// Grey PNG with a dark-over-bright square the edge cascade fires on.
fn edge_png(size: u32, block: u32) -> Vec<u8> {
    let offset = (size - block) / 2;
    let gray = GrayImage::from_fn(size, size, |x, y| {
        let inside = x >= offset && x < offset + block && y >= offset && y < offset + block;
        if !inside {
            Luma([128])
        } else if y < offset + block / 2 {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(gray)
        .to_rgb8()
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn scrubber_config(cascade: PathBuf) -> ScrubberConfig {
    ScrubberConfig {
        limits: Default::default(),
        cascade_path: cascade,
    }
}

/// Isolate the binary from the developer's own config file.
fn isolated(command: &mut Command, home: &Path) {
    command
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("RUST_LOG", "warn");
}

#[tokio::test]
async fn test_process_workers_match_thread_workers() {
    let dir = tempfile::tempdir().unwrap();
    let cascade = write_cascade(dir.path());
    let batch = vec![
        edge_png(120, 48),
        b"definitely not an image".to_vec(),
        edge_png(100, 50),
        Vec::new(),
    ];

    let orchestrator = BulkOrchestrator::new(scrubber_config(cascade))
        .with_worker_program(bin(), vec!["worker".to_string()]);

    let threads = orchestrator
        .bulk_process_with_stats(batch.clone(), Parallelism::Threads, Some(2))
        .await;
    let processes = orchestrator
        .bulk_process_with_stats(batch.clone(), Parallelism::Processes, Some(2))
        .await;

    assert_eq!(threads.len(), batch.len());
    assert_eq!(processes.len(), batch.len());
    for (t, p) in threads.iter().zip(&processes) {
        assert_eq!(t.index, p.index);
        assert_eq!(t.output, p.output, "item {} differs between strategies", t.index);
        assert_eq!(t.succeeded(), p.succeeded());
    }

    assert!(processes[0].succeeded());
    assert!(processes[0].stats_or_fallback().faces_detected >= 1);
    assert_ne!(processes[0].output, batch[0]);

    assert!(!processes[1].succeeded());
    assert_eq!(processes[1].output, batch[1]);
    assert_eq!(processes[3].output, batch[3]);
}

#[tokio::test]
async fn test_process_workers_survive_single_worker() {
    let dir = tempfile::tempdir().unwrap();
    let cascade = write_cascade(dir.path());
    let batch = vec![b"junk".to_vec(), edge_png(120, 48), b"more junk".to_vec()];

    let outputs = BulkOrchestrator::new(scrubber_config(cascade))
        .with_worker_program(bin(), vec!["worker".to_string()])
        .bulk_process(batch.clone(), Parallelism::Processes, Some(1))
        .await;

    assert_eq!(outputs.len(), 3);
    assert_eq!(outputs[0], batch[0]);
    assert_ne!(outputs[1], batch[1]);
    assert_eq!(outputs[2], batch[2]);
}

#[test]
fn test_scrub_command_writes_report_and_image() {
    let dir = tempfile::tempdir().unwrap();
    let cascade = write_cascade(dir.path());
    let input = dir.path().join("portrait.png");
    std::fs::write(&input, edge_png(120, 48)).unwrap();

    let mut command = Command::new(bin());
    isolated(&mut command, dir.path());
    let output = command
        .arg("scrub")
        .arg(&input)
        .arg("--cascade")
        .arg(&cascade)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "scrub failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["faces_detected"].as_u64().unwrap() >= 1);
    assert_eq!(report["identity_changed"], true);

    let written = dir.path().join("scrubbed_portrait.jpg");
    assert_eq!(PathBuf::from(report["output"].as_str().unwrap()), written);
    assert!(image::load_from_memory(&std::fs::read(&written).unwrap()).is_ok());
}

#[test]
fn test_bulk_command_keeps_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    let cascade = write_cascade(dir.path());
    let photos = dir.path().join("photos");
    let out = dir.path().join("clean");
    std::fs::create_dir_all(&photos).unwrap();
    std::fs::write(photos.join("a.png"), edge_png(120, 48)).unwrap();
    std::fs::write(photos.join("b.jpg"), b"truncated upload").unwrap();

    let mut command = Command::new(bin());
    isolated(&mut command, dir.path());
    let output = command
        .args(["bulk", "--format", "jsonl", "--strategy", "processes", "-p", "2"])
        .arg(&photos)
        .arg("--out-dir")
        .arg(&out)
        .arg("--cascade")
        .arg(&cascade)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "bulk failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);

    let bad = lines
        .iter()
        .find(|l| l["input"].as_str().unwrap().ends_with("b.jpg"))
        .unwrap();
    assert!(bad["error"].is_string());
    assert_eq!(bad["identity_changed"], false);
    let kept = std::fs::read(bad["output"].as_str().unwrap()).unwrap();
    assert_eq!(kept, b"truncated upload");
}

#[test]
fn test_scrub_without_classifier_explains_fix() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("x.png");
    std::fs::write(&input, edge_png(64, 32)).unwrap();

    let mut command = Command::new(bin());
    isolated(&mut command, dir.path());
    let output = command
        .arg("scrub")
        .arg(&input)
        .arg("--cascade")
        .arg(dir.path().join("missing.xml"))
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("models download"));
}
