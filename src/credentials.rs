use std::sync::Arc;

use async_trait::async_trait;

/// Host-provided API key picker.
#[async_trait]
pub trait KeyHost: Send + Sync {
    async fn has_selected_key(&self) -> bool;

    /// Ask the host to show its key picker. Returns once the request is out;
    /// the chosen key arrives later through `store_key`.
    async fn open_select_key(&self);

    fn selected_key(&self) -> Option<String>;

    fn store_key(&self, key: String);
}

/// Resolves the API key on every call, so a key picked mid-session is used
/// by the next request.
#[derive(Clone)]
pub struct Credentials {
    host: Option<Arc<dyn KeyHost>>,
    env_vars: &'static [&'static str],
}

impl Credentials {
    pub fn new(env_vars: &'static [&'static str], host: Option<Arc<dyn KeyHost>>) -> Self {
        Self { host, env_vars }
    }

    fn env_key(&self) -> Option<String> {
        self.env_vars
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty())
    }

    /// Host selection first, then the environment variables in order.
    pub fn api_key(&self) -> Option<String> {
        self.host
            .as_ref()
            .and_then(|host| host.selected_key())
            .or_else(|| self.env_key())
    }

    pub async fn has_credential(&self) -> bool {
        match &self.host {
            Some(host) => host.has_selected_key().await || self.env_key().is_some(),
            None => self.env_key().is_some(),
        }
    }

    pub async fn request_credential(&self) {
        match &self.host {
            Some(host) => host.open_select_key().await,
            None => log::warn!(
                "No API key configured; set one of {:?}",
                self.env_vars
            ),
        }
    }

    /// Store a key chosen in the host picker.
    pub fn select(&self, key: String) {
        match &self.host {
            Some(host) => host.store_key(key),
            None => log::warn!("Ignoring selected key: no key host"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const UNSET: &[&str] = &["SCHOOL_ASSISTANT_TEST_KEY_THAT_IS_NOT_SET"];

    #[derive(Default)]
    pub(crate) struct FakeHost {
        pub key: Mutex<Option<String>>,
        pub opened: AtomicUsize,
    }

    #[async_trait]
    impl KeyHost for FakeHost {
        async fn has_selected_key(&self) -> bool {
            self.key.lock().unwrap().is_some()
        }

        async fn open_select_key(&self) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }

        fn selected_key(&self) -> Option<String> {
            self.key.lock().unwrap().clone()
        }

        fn store_key(&self, key: String) {
            *self.key.lock().unwrap() = Some(key);
        }
    }

    #[tokio::test]
    async fn no_host_and_no_env_means_no_credential() {
        let creds = Credentials::new(UNSET, None);
        assert_eq!(creds.api_key(), None);
        assert!(!creds.has_credential().await);
        creds.request_credential().await;
    }

    #[test]
    fn environment_variables_are_tried_in_order() {
        // PATH is always present in a test environment
        let creds = Credentials::new(&["SCHOOL_ASSISTANT_TEST_KEY_THAT_IS_NOT_SET", "PATH"], None);
        assert_eq!(creds.api_key(), std::env::var("PATH").ok());
    }

    #[tokio::test]
    async fn host_selection_is_read_on_every_call() {
        let host = Arc::new(FakeHost::default());
        let creds = Credentials::new(UNSET, Some(host.clone()));

        assert!(!creds.has_credential().await);
        creds.request_credential().await;
        assert_eq!(host.opened.load(Ordering::SeqCst), 1);

        creds.select("first".into());
        assert!(creds.has_credential().await);
        assert_eq!(creds.api_key().as_deref(), Some("first"));

        creds.select("second".into());
        assert_eq!(creds.api_key().as_deref(), Some("second"));
    }
}
