use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    school: School,
    live: Live,
    chat: Chat,
    audio: Audio,
    gui: Gui,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct School {
    name: String,
    alias: String,
    location: String,
}

#[derive(Deserialize)]
struct Live {
    url: String,
    model: String,
    voice: String,
}

#[derive(Deserialize)]
struct Chat {
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    capture_sample_rate: u32,
    playback_sample_rate: u32,
    capture_block_size: usize,
    playback_period_size: usize,
}

#[derive(Deserialize)]
struct Gui {
    local_port: u16,
    remote_port: u16,
    local_ip: String,
    remote_ip: String,
    buffer_size: usize,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    println!("cargo:rustc-env=SCHOOL_NAME={}", config.school.name);
    println!("cargo:rustc-env=SCHOOL_ALIAS={}", config.school.alias);
    println!("cargo:rustc-env=SCHOOL_LOCATION={}", config.school.location);

    // 实时语音会话
    println!("cargo:rustc-env=LIVE_URL={}", config.live.url);
    println!("cargo:rustc-env=LIVE_MODEL={}", config.live.model);
    println!("cargo:rustc-env=LIVE_VOICE={}", config.live.voice);

    // 文本对话
    println!("cargo:rustc-env=CHAT_BASE_URL={}", config.chat.base_url);
    println!("cargo:rustc-env=CHAT_MODEL={}", config.chat.model);
    println!("cargo:rustc-env=CHAT_TEMPERATURE={}", config.chat.temperature);

    // 音频设备
    println!("cargo:rustc-env=AUDIO_CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=AUDIO_CAPTURE_RATE={}", config.audio.capture_sample_rate);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_RATE={}", config.audio.playback_sample_rate);
    println!("cargo:rustc-env=AUDIO_CAPTURE_BLOCK={}", config.audio.capture_block_size);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_PERIOD={}", config.audio.playback_period_size);

    // GUI 配置
    println!("cargo:rustc-env=GUI_LOCAL_PORT={}", config.gui.local_port);
    println!("cargo:rustc-env=GUI_REMOTE_PORT={}", config.gui.remote_port);
    println!("cargo:rustc-env=GUI_LOCAL_IP={}", config.gui.local_ip);
    println!("cargo:rustc-env=GUI_REMOTE_IP={}", config.gui.remote_ip);
    println!("cargo:rustc-env=GUI_BUFFER_SIZE={}", config.gui.buffer_size);
}
