//! Optional push-notification token registration.
//!
//! Push delivery is a compile-time concern of the host: the capability is
//! either wired in with a provider or explicitly absent, never probed for.

use crate::config::CallConfig;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

/// Source of the device push token.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn device_token(&self) -> anyhow::Result<String>;
}

/// Backend endpoint that associates a push token with the account.
#[async_trait]
pub trait TokenRegistrar: Send + Sync {
    async fn register_token(&self, token: &str) -> anyhow::Result<()>;
    async fn unregister_token(&self) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub enum PushCapability {
    Enabled(Arc<dyn PushProvider>),
    Disabled,
}

impl std::fmt::Debug for PushCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled(_) => f.write_str("PushCapability::Enabled"),
            Self::Disabled => f.write_str("PushCapability::Disabled"),
        }
    }
}

impl PushCapability {
    /// Enabled only when the config asks for push and the host supplied a provider.
    pub fn from_config(config: &CallConfig, provider: Option<Arc<dyn PushProvider>>) -> Self {
        match (config.push_enabled, provider) {
            (true, Some(provider)) => Self::Enabled(provider),
            (true, None) => {
                warn!(target: "Call/Push", "Push enabled in config but no provider was supplied");
                Self::Disabled
            }
            (false, _) => Self::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Fetches the device token and hands it to the registrar. Returns whether a
    /// token was registered; failures are logged, not propagated.
    pub async fn register(&self, registrar: &dyn TokenRegistrar) -> bool {
        let Self::Enabled(provider) = self else {
            info!(target: "Call/Push", "Push disabled, skipping token registration");
            return false;
        };

        let token = match provider.device_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(target: "Call/Push", "Failed to obtain push token: {e:?}");
                return false;
            }
        };

        match registrar.register_token(&token).await {
            Ok(()) => {
                info!(target: "Call/Push", "Push token registered");
                true
            }
            Err(e) => {
                warn!(target: "Call/Push", "Failed to register push token: {e:?}");
                false
            }
        }
    }

    pub async fn unregister(&self, registrar: &dyn TokenRegistrar) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = registrar.unregister_token().await {
            warn!(target: "Call/Push", "Failed to unregister push token: {e:?}");
        }
    }
}
