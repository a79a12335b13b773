use crate::prompt;

/// 实时语音会话参数
#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub url: String,
    pub model: String,
    pub voice: String,
    /// 基础系统提示词，语音模式的附加指令在建立会话时追加
    pub system_instruction: String,
    pub transcribe_input: bool,
    pub transcribe_output: bool,
}

/// 文本对话参数
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub system_instruction: String,
}

/// 音频设备参数
#[derive(Debug, Clone)]
pub struct AudioSettings {
    /// ALSA capture device name (e.g. "default", "plughw:0,0")
    pub capture_device: String,
    pub playback_device: String,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    /// Samples per outbound frame
    pub capture_block_size: usize,
    /// Desired ALSA playback period size (0 = let ALSA decide)
    pub playback_period_size: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub school_name: &'static str,
    pub school_alias: &'static str,
    pub school_location: &'static str,

    pub live: LiveSettings,
    pub chat: ChatSettings,
    pub audio: AudioSettings,

    // GUI进程配置
    pub gui_local_port: u16,
    pub gui_remote_port: u16,
    pub gui_local_ip: &'static str,
    pub gui_remote_ip: &'static str,
    pub gui_buffer_size: usize,

    /// 按顺序查找的 API key 环境变量
    pub api_key_vars: &'static [&'static str],
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取，API key 除外
    pub fn new() -> Result<Self, &'static str> {
        let system_instruction = prompt::system_instruction(
            env!("SCHOOL_NAME"),
            env!("SCHOOL_ALIAS"),
            env!("SCHOOL_LOCATION"),
        );

        Ok(Self {
            school_name: env!("SCHOOL_NAME"),
            school_alias: env!("SCHOOL_ALIAS"),
            school_location: env!("SCHOOL_LOCATION"),

            live: LiveSettings {
                url: env!("LIVE_URL").to_string(),
                model: env!("LIVE_MODEL").to_string(),
                voice: env!("LIVE_VOICE").to_string(),
                system_instruction: system_instruction.clone(),
                transcribe_input: true,
                transcribe_output: true,
            },

            chat: ChatSettings {
                base_url: env!("CHAT_BASE_URL").to_string(),
                model: env!("CHAT_MODEL").to_string(),
                temperature: env!("CHAT_TEMPERATURE").parse()
                    .map_err(|_| "Failed to parse CHAT_TEMPERATURE")?,
                system_instruction,
            },

            audio: AudioSettings {
                capture_device: env!("AUDIO_CAPTURE_DEVICE").to_string(),
                playback_device: env!("AUDIO_PLAYBACK_DEVICE").to_string(),
                capture_sample_rate: env!("AUDIO_CAPTURE_RATE").parse()
                    .map_err(|_| "Failed to parse AUDIO_CAPTURE_RATE")?,
                playback_sample_rate: env!("AUDIO_PLAYBACK_RATE").parse()
                    .map_err(|_| "Failed to parse AUDIO_PLAYBACK_RATE")?,
                capture_block_size: env!("AUDIO_CAPTURE_BLOCK").parse()
                    .map_err(|_| "Failed to parse AUDIO_CAPTURE_BLOCK")?,
                playback_period_size: env!("AUDIO_PLAYBACK_PERIOD").parse()
                    .map_err(|_| "Failed to parse AUDIO_PLAYBACK_PERIOD")?,
            },

            gui_local_port: env!("GUI_LOCAL_PORT").parse()
                .map_err(|_| "Failed to parse GUI_LOCAL_PORT")?,
            gui_remote_port: env!("GUI_REMOTE_PORT").parse()
                .map_err(|_| "Failed to parse GUI_REMOTE_PORT")?,
            gui_local_ip: env!("GUI_LOCAL_IP"),
            gui_remote_ip: env!("GUI_REMOTE_IP"),
            gui_buffer_size: env!("GUI_BUFFER_SIZE").parse()
                .map_err(|_| "Failed to parse GUI_BUFFER_SIZE")?,

            api_key_vars: &["GEMINI_API_KEY", "API_KEY"],
        })
    }

    pub fn welcome_message(&self) -> String {
        format!(
            "Welcome to {}, {}! I am your AI assistant. How can I help you today with admissions, STEM programs, or general school information?",
            self.school_name, self.school_location
        )
    }
}
