use crate::initdata::{InitData, WebAppUser};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Identity fields the renderer reads from the host SDK. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub handle: Option<String>,
}

impl From<WebAppUser> for Identity {
    fn from(user: WebAppUser) -> Self {
        Self {
            given_name: user.first_name,
            family_name: user.last_name,
            handle: user.username,
        }
    }
}

/// Host mini-app SDK surface consumed by the greeting renderer.
pub trait WebAppProvider: Send + Sync {
    /// Tells the host the page is ready to be shown.
    fn ready(&self);
    /// Opaque session blob to forward to the backend.
    fn session_token(&self) -> String;
    /// Unverified identity payload.
    fn identity(&self) -> Identity;
}

/// Provider backed by a raw `initData` string, read without signature checks.
#[derive(Debug)]
pub struct InitDataProvider {
    init_data: InitData,
    identity: Identity,
    ready: AtomicBool,
}

impl InitDataProvider {
    pub fn new(raw: &str) -> Self {
        let init_data = InitData::parse(raw);
        let identity = match init_data.user() {
            Ok(Some(user)) => Identity::from(user),
            Ok(None) => Identity::default(),
            Err(err) => {
                warn!(%err, "ignoring undecodable init data user");
                Identity::default()
            }
        };
        Self {
            init_data,
            identity,
            ready: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl WebAppProvider for InitDataProvider {
    fn ready(&self) {
        if !self.ready.swap(true, Ordering::SeqCst) {
            debug!("web app signalled ready");
        }
    }

    fn session_token(&self) -> String {
        self.init_data.raw().to_string()
    }

    fn identity(&self) -> Identity {
        self.identity.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initdata::tests::SIGNED;

    #[test]
    fn exposes_unverified_user_fields() {
        let provider = InitDataProvider::new(SIGNED);
        assert_eq!(
            provider.identity(),
            Identity {
                given_name: Some("John".into()),
                family_name: Some("Doe".into()),
                handle: Some("alice".into()),
            }
        );
        assert_eq!(provider.session_token(), SIGNED);
    }

    #[test]
    fn tampered_blob_is_still_read() {
        let provider = InitDataProvider::new("user=%7B%22first_name%22%3A%22Eve%22%7D&hash=00");
        assert_eq!(provider.identity().given_name.as_deref(), Some("Eve"));
        assert!(provider.identity().handle.is_none());
    }

    #[test]
    fn malformed_user_yields_empty_identity() {
        let provider = InitDataProvider::new("user=not-json");
        assert_eq!(provider.identity(), Identity::default());
        assert_eq!(provider.session_token(), "user=not-json");
    }

    #[test]
    fn ready_is_idempotent() {
        let provider = InitDataProvider::new("");
        assert!(!provider.is_ready());
        provider.ready();
        provider.ready();
        assert!(provider.is_ready());
    }
}
