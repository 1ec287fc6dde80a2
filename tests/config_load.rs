use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use invisible_human::config::EraserConfig;
use invisible_human::{Resolution, SensorLayout};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "INVISIBLE_CONFIG",
        "INVISIBLE_CAPTURE_SCALE",
        "INVISIBLE_CANONICAL_RESOLUTION",
        "INVISIBLE_TICK_PERIOD_MS",
        "INVISIBLE_MASK_THRESHOLD",
        "INVISIBLE_OUTPUT_DIR",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = EraserConfig::load().expect("load defaults");
    assert_eq!(cfg.capture_scale, 2);
    assert_eq!(cfg.canonical, Resolution::new(640, 480));
    assert_eq!(cfg.tick_period, Duration::from_millis(10));
    assert_eq!(cfg.mask_threshold, 128);
    assert_eq!(cfg.camera.width, 1280);
    assert_eq!(cfg.camera.height, 960);
    assert_eq!(cfg.camera.fps, 30);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "capture": { "scale": 4 },
        "canonical": { "width": 320, "height": 240 },
        "pipeline": { "tick_period_ms": 25 },
        "mask": { "threshold": 90 },
        "camera": { "width": 800, "height": 600, "fps": 15, "layout": "bgra" },
        "output": { "dir": "/tmp/invisible-file" }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("INVISIBLE_CONFIG", file.path());
    std::env::set_var("INVISIBLE_CANONICAL_RESOLUTION", "1024x768");
    std::env::set_var("INVISIBLE_OUTPUT_DIR", "/tmp/invisible-env");

    let cfg = EraserConfig::load().expect("load config");

    assert_eq!(cfg.capture_scale, 4);
    assert_eq!(cfg.canonical, Resolution::new(1024, 768));
    assert_eq!(cfg.tick_period, Duration::from_millis(25));
    assert_eq!(cfg.mask_threshold, 90);
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.camera.height, 600);
    assert_eq!(cfg.camera.fps, 15);
    assert_eq!(cfg.camera.layout, SensorLayout::Bgra8);
    assert_eq!(cfg.output_dir, PathBuf::from("/tmp/invisible-env"));

    clear_env();
}

#[test]
fn rejects_invalid_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("INVISIBLE_CAPTURE_SCALE", "0");
    assert!(EraserConfig::load().is_err());
    clear_env();

    std::env::set_var("INVISIBLE_TICK_PERIOD_MS", "0");
    assert!(EraserConfig::load().is_err());
    clear_env();

    std::env::set_var("INVISIBLE_CANONICAL_RESOLUTION", "640by480");
    assert!(EraserConfig::load().is_err());
    clear_env();

    std::env::set_var("INVISIBLE_MASK_THRESHOLD", "300");
    assert!(EraserConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_malformed_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    std::env::set_var("INVISIBLE_CONFIG", file.path());
    assert!(EraserConfig::load().is_err());

    clear_env();
}
