use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::conversation::{Message, Role};
use crate::credentials::KeyHost;

/// Requests from the UI process.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiCommand {
    VoiceStart,
    VoiceStop,
    Chat {
        text: String,
    },
    KeySelected {
        #[serde(default)]
        api_key: Option<String>,
    },
}

/// Updates pushed to the UI process.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiUpdate {
    Status {
        text: String,
        active: bool,
        connecting: bool,
    },
    /// Running transcript of the current voice turn.
    Transcript { role: Role, text: String },
    Message { message: Message },
    SelectKey,
}

impl UiUpdate {
    pub fn status(text: &str, active: bool, connecting: bool) -> Self {
        UiUpdate::Status {
            text: text.to_string(),
            active,
            connecting,
        }
    }
}

// UI进程和Core进程通过本地UDP通信，端口在配置中指定
pub struct UiBridge {
    socket: Arc<UdpSocket>,
    target_addr: String,
    buffer_size: usize,
    tx: mpsc::Sender<UiCommand>,
}

impl UiBridge {
    pub async fn new(config: &Config, tx: mpsc::Sender<UiCommand>) -> anyhow::Result<Self> {
        Self::bind(
            &format!("{}:{}", config.gui_local_ip, config.gui_local_port),
            format!("{}:{}", config.gui_remote_ip, config.gui_remote_port),
            config.gui_buffer_size,
            tx,
        )
        .await
    }

    pub async fn bind(
        local_addr: &str,
        target_addr: String,
        buffer_size: usize,
        tx: mpsc::Sender<UiCommand>,
    ) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(local_addr).await?;
        log::info!("UI bridge listening on {}, sending to {}", socket.local_addr()?, target_addr);
        Ok(Self {
            socket: Arc::new(socket),
            target_addr,
            buffer_size: buffer_size.max(512),
            tx,
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive datagrams and forward the ones that parse as commands.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            if len == 0 {
                continue;
            }
            let cmd = match serde_json::from_slice::<UiCommand>(&buf[..len]) {
                Ok(cmd) => cmd,
                Err(e) => {
                    log::warn!(
                        "Dropping unparseable UI datagram from {}: {} ({})",
                        peer,
                        String::from_utf8_lossy(&buf[..len]),
                        e
                    );
                    continue;
                }
            };
            log::debug!("UI command: {:?}", cmd);
            if self.tx.send(cmd).await.is_err() {
                log::warn!("UI command receiver dropped, stopping bridge");
                break;
            }
        }
        Ok(())
    }

    pub async fn send_update(&self, update: &UiUpdate) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(update)?;
        self.socket.send_to(&payload, &self.target_addr).await?;
        Ok(())
    }
}

/// Key picker that lives in the UI process.
pub struct UiKeyHost {
    updates: mpsc::Sender<UiUpdate>,
    key: RwLock<Option<String>>,
}

impl UiKeyHost {
    pub fn new(updates: mpsc::Sender<UiUpdate>) -> Self {
        Self {
            updates,
            key: RwLock::new(None),
        }
    }
}

#[async_trait]
impl KeyHost for UiKeyHost {
    async fn has_selected_key(&self) -> bool {
        self.selected_key().is_some()
    }

    async fn open_select_key(&self) {
        if self.updates.send(UiUpdate::SelectKey).await.is_err() {
            log::warn!("Cannot open key picker: UI channel closed");
        }
    }

    fn selected_key(&self) -> Option<String> {
        match self.key.read() {
            Ok(key) => key.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_key(&self, key: String) {
        let mut slot = match self.key.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn commands_parse_from_tagged_json() {
        let cmd: UiCommand = serde_json::from_str(r#"{"type":"voice_start"}"#).unwrap();
        assert_eq!(cmd, UiCommand::VoiceStart);
        let cmd: UiCommand = serde_json::from_str(r#"{"type":"chat","text":"Hello"}"#).unwrap();
        assert_eq!(cmd, UiCommand::Chat { text: "Hello".into() });
        let cmd: UiCommand = serde_json::from_str(r#"{"type":"key_selected"}"#).unwrap();
        assert_eq!(cmd, UiCommand::KeySelected { api_key: None });
        assert!(serde_json::from_str::<UiCommand>(r#"{"type":"reboot"}"#).is_err());
    }

    #[test]
    fn updates_serialize_with_type_tag() {
        let json = serde_json::to_value(UiUpdate::status("Listening...", true, false)).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["text"], "Listening...");
        assert_eq!(json["active"], true);

        let json = serde_json::to_value(UiUpdate::Transcript {
            role: Role::User,
            text: "hi".into(),
        })
        .unwrap();
        assert_eq!(json["role"], "user");

        let json = serde_json::to_value(UiUpdate::SelectKey).unwrap();
        assert_eq!(json, serde_json::json!({"type": "select_key"}));
    }

    #[tokio::test]
    async fn datagrams_round_trip_through_the_bridge() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let bridge = Arc::new(
            UiBridge::bind("127.0.0.1:0", peer.local_addr().unwrap().to_string(), 1024, tx)
                .await
                .unwrap(),
        );
        let bridge_addr = bridge.local_addr().unwrap();
        let runner = bridge.clone();
        tokio::spawn(async move { runner.run().await });

        peer.send_to(b"not json", bridge_addr).await.unwrap();
        peer.send_to(br#"{"type":"chat","text":"Timings?"}"#, bridge_addr)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), UiCommand::Chat { text: "Timings?".into() });

        bridge
            .send_update(&UiUpdate::status("Standby", false, false))
            .await
            .unwrap();
        let mut buf = [0u8; 1024];
        let (len, _) = peer.recv_from(&mut buf).await.unwrap();
        let json: Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(json["text"], "Standby");
    }

    #[tokio::test]
    async fn key_host_asks_ui_and_remembers_the_key() {
        let (tx, mut rx) = mpsc::channel(4);
        let host = UiKeyHost::new(tx);
        assert!(!host.has_selected_key().await);

        host.open_select_key().await;
        assert!(matches!(rx.recv().await, Some(UiUpdate::SelectKey)));

        host.store_key("picked".into());
        assert!(host.has_selected_key().await);
        assert_eq!(host.selected_key().as_deref(), Some("picked"));
    }
}
