mod audio;
mod chat;
mod config;
mod controller;
mod conversation;
mod credentials;
mod error;
mod prompt;
mod protocol;
mod session;
mod ui_bridge;

use std::sync::Arc;
use std::time::Duration;

use audio::AlsaBackend;
use config::Config;
use controller::{ChatReply, CoreController};
use credentials::{Credentials, KeyHost};
use session::SessionEvent;
use tokio::signal;
use tokio::sync::mpsc;
use ui_bridge::{UiBridge, UiCommand, UiKeyHost, UiUpdate};

// 播放缓冲区回收间隔
const REAP_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let config = Config::new().map_err(anyhow::Error::msg)?;
    log::info!(
        "{} v{} for {} ({})",
        env!("APP_NAME"),
        env!("APP_VERSION"),
        config.school_name,
        config.school_alias
    );

    // 创建通道，用于组件间通信
    let (tx_ui_cmd, mut rx_ui_cmd) = mpsc::channel::<UiCommand>(100);
    let (tx_ui_update, mut rx_ui_update) = mpsc::channel::<UiUpdate>(100);
    let (tx_session, mut rx_session) = mpsc::channel::<SessionEvent>(100);
    let (tx_chat, mut rx_chat) = mpsc::channel::<ChatReply>(8);

    // 启动UI桥，与UI进程通信
    let ui_bridge = Arc::new(UiBridge::new(&config, tx_ui_cmd).await?);
    let ui_bridge_clone = ui_bridge.clone();
    tokio::spawn(async move {
        if let Err(e) = ui_bridge_clone.run().await {
            log::error!("UiBridge error: {}", e);
        }
    });

    // 控制器的UI更新通过这个任务转发给UI进程
    let ui_bridge_clone = ui_bridge.clone();
    tokio::spawn(async move {
        while let Some(update) = rx_ui_update.recv().await {
            if let Err(e) = ui_bridge_clone.send_update(&update).await {
                log::warn!("Failed to send to UI: {}", e);
            }
        }
    });

    let key_host: Arc<dyn KeyHost> = Arc::new(UiKeyHost::new(tx_ui_update.clone()));
    let credentials = Credentials::new(config.api_key_vars, Some(key_host));
    let backend = Arc::new(AlsaBackend::new(config.audio.clone()));

    let mut controller =
        CoreController::new(config, credentials, backend, tx_ui_update, tx_session, tx_chat);
    controller.greet().await;

    let mut reap = tokio::time::interval(REAP_INTERVAL);
    log::info!("School assistant started. Waiting for UI commands...");

    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }

            Some(cmd) = rx_ui_cmd.recv() => {
                controller.handle_ui_command(cmd).await;
            }

            Some(event) = rx_session.recv() => {
                controller.handle_session_event(event).await;
            }

            Some(reply) = rx_chat.recv() => {
                controller.handle_chat_reply(reply).await;
            }

            _ = reap.tick() => {
                controller.reap_playback();
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}
