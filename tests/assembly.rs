//! End-to-end tests for the assembly pipeline
//!
//! These tests drive `AssemblyEngine` from a TOML configuration over PNG
//! stills and collect the rendered frames in memory, so no ffmpeg is needed:
//! - Missing clips are skipped, an empty selection fails
//! - Crossfades shorten the timeline by one fade per join
//! - The end card always follows a hard cut
//! - Trimming yields exactly the requested length

use clip_assembler::error::{AssemblerError, CompositionError};
use clip_assembler::video::endcard::load_font;
use clip_assembler::{AssemblyEngine, Config, Frame};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const RED: [u8; 3] = [255, 0, 0];
const GREEN: [u8; 3] = [0, 255, 0];
const BLUE: [u8; 3] = [0, 0, 255];
const CARD: [u8; 3] = [12, 12, 12];

fn write_still(dir: &Path, name: &str, width: u32, height: u32, color: [u8; 3]) {
    RgbImage::from_pixel(width, height, Rgb(color))
        .save(dir.join(name))
        .unwrap();
}

/// Three 2 s stills at 10 fps rendered to 64x36
fn write_config(dir: &Path, extra: &str) -> Config {
    write_still(dir, "clip1_desk.png", 128, 72, RED);
    write_still(dir, "clip2_jobsite.png", 72, 128, GREEN);
    write_still(dir, "clip3_sunset.png", 200, 100, BLUE);

    let content = format!(
        r#"
source_dir = "{dir}"
clips = ["clip1_desk.png", "clip_missing.mp4", "clip2_jobsite.png", "clip3_sunset.png"]
output = "{dir}/hero.mp4"

[video]
width = 64
height = 36
fps = 10.0
still_duration = 2.0
processing_threads = 2

[end_card]
duration = 1.0
background = [12, 12, 12]
{extra}
"#,
        dir = dir.display().to_string().replace('\\', "/"),
        extra = extra
    );

    let config_path = dir.join("assembler.toml");
    fs::write(&config_path, content).unwrap();
    Config::from_file(&config_path).unwrap()
}

fn render(config: Config) -> (clip_assembler::AssemblyReport, Vec<Frame>) {
    let engine = AssemblyEngine::new(config).unwrap();
    let mut frames: Vec<Frame> = Vec::new();
    let report = engine.assemble_into(&mut frames).unwrap();
    (report, frames)
}

#[test]
fn test_hard_cuts_skip_missing_clip() {
    let dir = tempdir().unwrap();
    let mut config = write_config(dir.path(), "");
    config.composition.crossfade = false;

    let (report, frames) = render(config);

    assert_eq!(report.clips_used, 3);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].path.ends_with("clip_missing.mp4"));
    assert_eq!(report.duration, 6.0);
    assert_eq!(frames.len(), 60);
    assert!(frames.iter().all(|f| f.size() == (64, 36)));

    assert_eq!(frames[19].get_pixel(32, 18), RED);
    assert_eq!(frames[20].get_pixel(32, 18), GREEN);
    assert_eq!(frames[40].get_pixel(32, 18), BLUE);
}

#[test]
fn test_crossfades_overlap_each_join() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "[composition]\ncrossfade = true\ncrossfade_duration = 0.5\n");

    let (report, frames) = render(config);

    // 3 x 2.0s - 2 x 0.5s
    assert!((report.duration - 5.0).abs() < 1e-9);
    assert_eq!(frames.len(), 50);

    // First fade spans [1.5, 2.0): halfway through, red and green are mixed
    let mid = frames[17].get_pixel(32, 18);
    assert!(mid[0] > 0 && mid[0] < 255);
    assert!(mid[1] > 0 && mid[1] < 255);
    assert_eq!(frames[14].get_pixel(32, 18), RED);
    assert_eq!(frames[20].get_pixel(32, 18), GREEN);
}

#[test]
fn test_end_card_follows_hard_cut_after_crossfaded_body() {
    let dir = tempdir().unwrap();
    let mut config = write_config(dir.path(), "");
    config.composition.end_card_text = Some(String::new());

    let (report, frames) = render(config);

    // 5.0s body + 1.0s card
    assert!((report.duration - 6.0).abs() < 1e-9);
    assert_eq!(frames.len(), 60);
    assert_eq!(frames[49].get_pixel(0, 0), BLUE);
    assert_eq!(frames[50].get_pixel(0, 0), CARD);
    assert_eq!(frames[59].get_pixel(63, 35), CARD);
}

#[test]
fn test_trim_produces_exact_length() {
    let dir = tempdir().unwrap();
    let mut config = write_config(dir.path(), "");
    config.composition.crossfade = false;
    config.composition.end_card_text = Some(String::new());
    config.composition.max_duration = Some(4.5);

    let (report, frames) = render(config);

    assert_eq!(report.duration, 4.5);
    assert_eq!(frames.len(), 45);
    assert_eq!(frames[39].get_pixel(0, 0), GREEN);
    assert_eq!(frames[44].get_pixel(0, 0), BLUE);
    assert!(frames.iter().all(|f| f.get_pixel(0, 0) != CARD));
}

#[test]
fn test_captioned_end_card_draws_text() {
    if load_font(None).is_err() {
        eprintln!("skipping: no system font available");
        return;
    }

    let dir = tempdir().unwrap();
    let mut config = write_config(dir.path(), "");
    config.composition.end_card_text = Some("Built for the field".to_string());
    config.end_card.font_size = 14.0;
    config.end_card.margin = 4;

    let (_, frames) = render(config);
    let card = frames.last().unwrap();
    let lit = card
        .as_image()
        .pixels()
        .filter(|p| p.0[0] > 128 && p.0[1] > 128 && p.0[2] > 128)
        .count();
    assert!(lit > 0, "caption pixels missing from end card");
    assert_eq!(card.get_pixel(0, 0), CARD);
}

#[test]
fn test_no_clips_found() {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.source_dir = dir.path().to_path_buf();
    config.clips = vec!["a.mp4".into(), "b.mov".into()];

    let engine = AssemblyEngine::new(config).unwrap();
    let mut frames: Vec<Frame> = Vec::new();
    let err = engine.assemble_into(&mut frames).unwrap_err();

    assert!(matches!(
        err,
        AssemblerError::Composition(CompositionError::NoClipsFound { configured: 2 })
    ));
    assert!(err.user_message().contains("list"));
    assert!(frames.is_empty());
}
