use std::fs;
use std::path::PathBuf;

use realtime_translate_api::config::{ConfigError, ConfigSet, DeliveryMode, ServiceBackend};

fn copy_default_config_to(dest: &PathBuf) {
    fs::create_dir_all(dest).expect("create temp config dir");
    let src = PathBuf::from("config");
    for name in [
        "audio_processing.yaml",
        "pipeline.yaml",
        "service.yaml",
        "server.yaml",
    ] {
        let from = src.join(name);
        let to = dest.join(name);
        fs::copy(&from, &to).unwrap_or_else(|e| panic!("copy {:?} -> {:?}: {}", from, to, e));
    }
}

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("rta_cfg_{}", uuid::Uuid::new_v4()))
}

#[test]
fn loads_config_from_env_dir() {
    let tmp = temp_dir();
    copy_default_config_to(&tmp);
    std::env::set_var(realtime_translate_api::config::CONFIG_DIR_ENV, &tmp);

    let cfg = ConfigSet::load_from_env().expect("load config from env");
    assert_eq!(cfg.root(), tmp.as_path());
    assert!(!cfg.server.ws_bind_addr.is_empty());
    assert!(!cfg.service.endpoint.is_empty());
    assert_eq!(cfg.service.backend, ServiceBackend::Gemini);
    assert_eq!(cfg.pipeline.delivery_mode, DeliveryMode::SideChannel);
}

#[test]
fn default_frame_and_window_sizes_match_yaml() {
    // 48000Hz * 20ms = 960, 16000Hz * 30ms = 480
    let cfg = ConfigSet::load_from_dir("config").expect("load default config");
    assert_eq!(cfg.audio.transport_frame_samples(), 960);
    assert_eq!(cfg.audio.vad_window_samples(), 480);
    assert!(cfg.pipeline.backup_deadline() > cfg.pipeline.inner_deadline());
}

#[test]
fn rejects_backup_deadline_not_after_inner() {
    let tmp = temp_dir();
    copy_default_config_to(&tmp);
    let pipeline = fs::read_to_string(tmp.join("pipeline.yaml")).expect("read pipeline.yaml");
    let broken = pipeline.replace("backup_deadline_ms: 18000", "backup_deadline_ms: 15000");
    fs::write(tmp.join("pipeline.yaml"), broken).expect("write pipeline.yaml");

    match ConfigSet::load_from_dir(&tmp) {
        Err(ConfigError::Invalid { message }) => assert!(message.contains("backup_deadline_ms")),
        other => panic!("expected invalid config, got {other:?}"),
    }
}

#[test]
fn reports_unparsable_yaml() {
    let tmp = temp_dir();
    copy_default_config_to(&tmp);
    fs::write(tmp.join("server.yaml"), "ws_bind_addr: [").expect("write server.yaml");
    assert!(matches!(
        ConfigSet::load_from_dir(&tmp),
        Err(ConfigError::Parse { .. })
    ));
}
