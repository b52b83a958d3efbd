use crate::api::remote_config::RemoteConfigSource;
use crate::compose::ComposeForm;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const MAX_MSG_LENGTH_KEY: &str = "max_msg_length";
pub const DEFAULT_MSG_LENGTH_LIMIT: i64 = 1000;

const CACHE_EXPIRATION: Duration = Duration::from_secs(3600);

/// Fetches the message length limit from remote config and falls back to
/// the last activated value, then to the built-in default, when it can't.
pub struct RemoteConfigGate<R> {
    source: R,
    developer_mode: bool,
    defaults: HashMap<String, String>,
    active: HashMap<String, String>,
    last_fetch: Option<Instant>,
}

impl<R: RemoteConfigSource> RemoteConfigGate<R> {
    pub fn new(source: R, developer_mode: bool) -> Self {
        let mut defaults = HashMap::new();
        defaults.insert(
            MAX_MSG_LENGTH_KEY.to_string(),
            DEFAULT_MSG_LENGTH_LIMIT.to_string(),
        );
        Self {
            source,
            developer_mode,
            defaults,
            active: HashMap::new(),
            last_fetch: None,
        }
    }

    pub fn set_default(&mut self, key: impl Into<String>, value: impl ToString) {
        self.defaults.insert(key.into(), value.to_string());
    }

    /// Zero in developer mode, so every call goes to the network.
    pub fn cache_expiration(&self) -> Duration {
        if self.developer_mode {
            Duration::ZERO
        } else {
            CACHE_EXPIRATION
        }
    }

    /// Refreshes the active values unless the last successful fetch is still
    /// valid at `now`, then returns the limit to apply. Never fails.
    pub async fn fetch(&mut self, now: Instant) -> i64 {
        log::debug!("fetchConfig: begin");
        let fresh = self
            .last_fetch
            .is_some_and(|last| now.saturating_duration_since(last) < self.cache_expiration());
        if fresh {
            log::debug!("fetchConfig: using cached values");
            return self.max_message_length();
        }

        match self.source.fetch().await {
            Ok(entries) => {
                self.active.extend(entries);
                self.last_fetch = Some(now);
                log::debug!(
                    "fetchConfig: activated, {} = {}",
                    MAX_MSG_LENGTH_KEY,
                    self.max_message_length()
                );
            }
            Err(e) => log::warn!("fetchConfig failed, keeping current values: {}", e),
        }
        self.max_message_length()
    }

    pub fn get_long(&self, key: &str) -> i64 {
        let parse = |v: &String| v.trim().parse::<i64>().ok();
        self.active
            .get(key)
            .and_then(parse)
            .or_else(|| self.defaults.get(key).and_then(parse))
            .unwrap_or(0)
    }

    pub fn max_message_length(&self) -> i64 {
        self.get_long(MAX_MSG_LENGTH_KEY)
    }

    pub fn apply(&self, form: &mut ComposeForm) {
        apply_limit(self.max_message_length(), form);
    }
}

/// Sets the form's length filter; negative limits become zero.
pub fn apply_limit(limit: i64, form: &mut ComposeForm) {
    form.set_max_len(usize::try_from(limit).unwrap_or(0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedSource {
        replies: Mutex<VecDeque<Result<HashMap<String, String>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn with(replies: Vec<Result<HashMap<String, String>>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RemoteConfigSource for ScriptedSource {
        async fn fetch(&self) -> Result<HashMap<String, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Config("no scripted reply".into())))
        }
    }

    fn limit(value: &str) -> Result<HashMap<String, String>> {
        Ok(HashMap::from([(MAX_MSG_LENGTH_KEY.to_string(), value.to_string())]))
    }

    fn offline() -> Result<HashMap<String, String>> {
        Err(Error::Status {
            status: 503,
            message: "unavailable".into(),
        })
    }

    #[tokio::test]
    async fn failed_fetch_falls_back_to_default() {
        let mut gate = RemoteConfigGate::new(ScriptedSource::with(vec![offline()]), true);
        assert_eq!(gate.fetch(Instant::now()).await, DEFAULT_MSG_LENGTH_LIMIT);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_last_fetched_value() {
        let mut gate =
            RemoteConfigGate::new(ScriptedSource::with(vec![limit("50"), offline()]), true);
        assert_eq!(gate.fetch(Instant::now()).await, 50);
        assert_eq!(gate.fetch(Instant::now()).await, 50);
        assert_eq!(gate.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cached_values_skip_the_network() {
        let mut gate = RemoteConfigGate::new(ScriptedSource::with(vec![limit("80")]), false);
        let start = Instant::now();
        assert_eq!(gate.fetch(start).await, 80);
        assert_eq!(gate.fetch(start + Duration::from_secs(60)).await, 80);
        assert_eq!(gate.source.calls.load(Ordering::SeqCst), 1);

        gate.fetch(start + CACHE_EXPIRATION).await;
        assert_eq!(gate.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetched_limit_is_applied_to_form() {
        let mut gate = RemoteConfigGate::new(ScriptedSource::with(vec![limit("50")]), true);
        gate.fetch(Instant::now()).await;

        let mut form = ComposeForm::new();
        form.set_enabled(true);
        gate.apply(&mut form);
        assert_eq!(form.insert(&"x".repeat(60)), 50);
        assert_eq!(form.insert("y"), 0);
    }

    #[test]
    fn unparsable_value_uses_default() {
        let mut gate = RemoteConfigGate::new(ScriptedSource::default(), true);
        gate.active
            .insert(MAX_MSG_LENGTH_KEY.to_string(), "lots".to_string());
        assert_eq!(gate.max_message_length(), DEFAULT_MSG_LENGTH_LIMIT);
        gate.set_default(MAX_MSG_LENGTH_KEY, 10);
        assert_eq!(gate.max_message_length(), 10);
        assert_eq!(gate.get_long("missing"), 0);
    }

    #[test]
    fn negative_limit_clamps_to_zero() {
        let mut form = ComposeForm::new();
        apply_limit(-5, &mut form);
        assert_eq!(form.max_len(), 0);
    }
}
