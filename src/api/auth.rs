use crate::api::client::{check, FirebaseClient};
use crate::api::models::AuthUser;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;

const IDENTITY_TOOLKIT: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN: &str = "https://securetoken.googleapis.com/v1/token";
/// ID tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
const REFRESH_RETRY: Duration = Duration::from_secs(30);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

struct Credentials {
    refresh_token: String,
    expires_at: Instant,
}

fn lifetime(expires_in: Option<&str>) -> Duration {
    expires_in
        .and_then(|secs| secs.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME)
}

/// Email/password sign-in against the identity provider, plus the auth-state
/// stream the session controller listens to.
pub struct AuthClient {
    client: FirebaseClient,
    state: watch::Sender<Option<AuthUser>>,
    credentials: Mutex<Option<Credentials>>,
}

impl AuthClient {
    pub fn new(client: FirebaseClient) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            client,
            state,
            credentials: Mutex::new(None),
        }
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().clone()
    }

    /// Subscribes to sign-in/sign-out transitions. The current state is
    /// reported as the first change, whether or not anyone is signed in.
    pub fn add_auth_state_listener(&self) -> watch::Receiver<Option<AuthUser>> {
        let mut rx = self.state.subscribe();
        rx.mark_changed();
        rx
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/accounts:{}?key={}",
            IDENTITY_TOOLKIT,
            method,
            self.client.config().api_key
        )
    }

    async fn call<B: Serialize>(&self, method: &str, body: &B) -> Result<AccountResponse> {
        let resp = self
            .client
            .http
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await?;
        match check(resp).await {
            Ok(resp) => Ok(resp.json().await?),
            Err(Error::Status { message, .. }) => Err(Error::Auth(message)),
            Err(e) => Err(e),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        let account = self
            .call(
                "signInWithPassword",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        Ok(self.establish(account))
    }

    /// Creates an account and records its display name.
    pub async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<AuthUser> {
        let account = self
            .call(
                "signUp",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        let token = account
            .id_token
            .clone()
            .ok_or_else(|| Error::Auth("no ID token in sign-up response".into()))?;

        let mut account = if display_name.trim().is_empty() {
            account
        } else {
            let updated = self
                .call(
                    "update",
                    &UpdateProfileRequest {
                        id_token: &token,
                        display_name: display_name.trim(),
                        return_secure_token: true,
                    },
                )
                .await?;
            AccountResponse {
                local_id: updated.local_id,
                email: updated.email.or(account.email),
                display_name: updated.display_name,
                id_token: updated.id_token.or(account.id_token),
                refresh_token: updated.refresh_token.or(account.refresh_token),
                expires_in: updated.expires_in.or(account.expires_in),
            }
        };
        if account.id_token.is_none() {
            account.id_token = Some(token);
        }
        Ok(self.establish(account))
    }

    /// Sign-out is local: the token is dropped and listeners see `None`.
    pub fn sign_out(&self) {
        log::info!("signing out");
        self.set_credentials(None);
        self.client.set_id_token(None);
        self.state.send_replace(None);
    }

    fn establish(&self, account: AccountResponse) -> AuthUser {
        let user = AuthUser {
            uid: account.local_id,
            email: account.email,
            display_name: account.display_name,
        };
        log::info!("signed in as {}", user.uid);
        self.set_credentials(account.refresh_token.map(|refresh_token| Credentials {
            refresh_token,
            expires_at: Instant::now() + lifetime(account.expires_in.as_deref()),
        }));
        self.client.set_id_token(account.id_token);
        self.state.send_replace(Some(user.clone()));
        user
    }

    fn with_credentials<T>(&self, f: impl FnOnce(&mut Option<Credentials>) -> T) -> T {
        match self.credentials.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn set_credentials(&self, credentials: Option<Credentials>) {
        self.with_credentials(|slot| *slot = credentials);
    }

    /// Time until the ID token should be refreshed, or `None` when there is
    /// nothing to refresh.
    pub fn refresh_due_in(&self, now: Instant) -> Option<Duration> {
        self.with_credentials(|slot| {
            slot.as_ref().map(|c| {
                c.expires_at
                    .checked_sub(REFRESH_MARGIN)
                    .map_or(Duration::ZERO, |due| due.saturating_duration_since(now))
            })
        })
    }

    /// Exchanges the refresh token for a new ID token and republishes the
    /// signed-in user, so listeners reopen anything the old token closed.
    /// A rejected refresh token signs the user out.
    pub async fn refresh(&self) -> Result<()> {
        let refresh_token =
            self.with_credentials(|slot| slot.as_ref().map(|c| c.refresh_token.clone()));
        let Some(refresh_token) = refresh_token else {
            return Err(Error::NotSignedIn);
        };
        let resp = self
            .client
            .http
            .post(format!("{}?key={}", SECURE_TOKEN, self.client.config().api_key))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;
        let refreshed: RefreshResponse = match check(resp).await {
            Ok(resp) => resp.json().await?,
            Err(Error::Status { status, message }) if matches!(status, 400 | 401 | 403) => {
                log::warn!("refresh token rejected ({}), signing out", message);
                self.sign_out();
                return Err(Error::Auth(message));
            }
            Err(e) => return Err(e),
        };
        self.apply_refresh(refreshed);
        Ok(())
    }

    fn apply_refresh(&self, refreshed: RefreshResponse) {
        self.set_credentials(Some(Credentials {
            refresh_token: refreshed.refresh_token,
            expires_at: Instant::now() + lifetime(refreshed.expires_in.as_deref()),
        }));
        self.client.set_id_token(Some(refreshed.id_token));
        log::debug!("ID token refreshed");
        self.state.send_modify(|_| {});
    }

    /// Refreshes the ID token ahead of its expiry while someone is signed in.
    /// Meant to be spawned once for the lifetime of the client.
    pub async fn keep_token_fresh(&self) {
        let mut state = self.state.subscribe();
        loop {
            let Some(wait) = self.refresh_due_in(Instant::now()) else {
                if state.changed().await.is_err() {
                    return;
                }
                continue;
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.refresh().await {
                        log::warn!("token refresh failed: {}", e);
                        tokio::time::sleep(REFRESH_RETRY).await;
                    }
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppConfig;

    fn client() -> AuthClient {
        let config = AppConfig {
            api_key: "k".into(),
            project_id: "p".into(),
            database_url: "https://p.firebaseio.com/".into(),
            storage_bucket: "p.appspot.com".into(),
            ..AppConfig::default()
        };
        AuthClient::new(FirebaseClient::new(config).unwrap())
    }

    #[tokio::test]
    async fn listener_receives_current_state_first() {
        let auth = client();
        let mut rx = auth.add_auth_state_listener();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), None);
    }

    #[tokio::test]
    async fn established_session_is_published_and_cleared() {
        let auth = client();
        let mut rx = auth.add_auth_state_listener();
        let _ = rx.borrow_and_update();

        let user = auth.establish(AccountResponse {
            local_id: "u1".into(),
            email: Some("alice@example.com".into()),
            display_name: Some("Alice".into()),
            id_token: Some("tok".into()),
            refresh_token: Some("refresh".into()),
            expires_in: Some("3600".into()),
        });
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&user));
        assert_eq!(auth.client.id_token().as_deref(), Some("tok"));

        auth.sign_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
        assert!(auth.client.id_token().is_none());
        assert!(auth.current_user().is_none());
        assert!(auth.refresh_due_in(Instant::now()).is_none());
    }

    #[test]
    fn refresh_is_scheduled_ahead_of_expiry() {
        let auth = client();
        assert!(auth.refresh_due_in(Instant::now()).is_none());
        auth.establish(AccountResponse {
            local_id: "u1".into(),
            email: None,
            display_name: None,
            id_token: Some("tok".into()),
            refresh_token: Some("refresh".into()),
            expires_in: Some("3600".into()),
        });
        let due = auth.refresh_due_in(Instant::now()).unwrap();
        assert!(due <= Duration::from_secs(3300));
        assert!(due > Duration::from_secs(3200));

        let later = Instant::now() + Duration::from_secs(4000);
        assert_eq!(auth.refresh_due_in(later), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn refreshed_token_republishes_the_same_user() {
        let auth = client();
        let user = auth.establish(AccountResponse {
            local_id: "u1".into(),
            email: Some("alice@example.com".into()),
            display_name: Some("Alice".into()),
            id_token: Some("old".into()),
            refresh_token: Some("refresh".into()),
            expires_in: Some("60".into()),
        });
        let mut rx = auth.add_auth_state_listener();
        let _ = rx.borrow_and_update();

        let refreshed: RefreshResponse = serde_json::from_str(
            r#"{"id_token":"new","refresh_token":"refresh-2","expires_in":"3600","token_type":"Bearer","user_id":"u1"}"#,
        )
        .unwrap();
        auth.apply_refresh(refreshed);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&user));
        assert_eq!(auth.client.id_token().as_deref(), Some("new"));
        assert!(auth.refresh_due_in(Instant::now()).unwrap() > Duration::from_secs(3200));
    }
}
