//! Identity, session state and the admin role.

use crate::{CoreError, CoreResult};
use async_trait::async_trait;
use clinic_types::EmailAddress;
use std::sync::Arc;
use tokio::sync::watch;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    email: EmailAddress,
    display_name: Option<String>,
}

impl Principal {
    pub fn new(email: EmailAddress, display_name: Option<String>) -> Self {
        Self {
            email,
            display_name,
        }
    }

    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

/// Shared view of who is signed in.
///
/// Cloning yields another handle onto the same session; every handle observes
/// sign-in and sign-out.
#[derive(Debug, Clone)]
pub struct AuthSession {
    sender: Arc<watch::Sender<Option<Principal>>>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> Option<Principal> {
        self.sender.borrow().clone()
    }

    pub fn set(&self, principal: Option<Principal>) {
        self.sender.send_replace(principal);
    }

    /// Receiver notified on every auth-state change.
    pub fn watch(&self) -> watch::Receiver<Option<Principal>> {
        self.sender.subscribe()
    }
}

/// Federated sign-in.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self) -> CoreResult<Principal>;

    async fn sign_out(&self) -> CoreResult<()>;

    fn session(&self) -> AuthSession;
}

/// Identity provider with one preconfigured account.
///
/// Without an account every sign-in fails, which is how an unreachable
/// provider behaves.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    account: Option<Principal>,
    session: AuthSession,
}

impl StaticIdentity {
    pub fn new(account: Option<Principal>) -> Self {
        Self {
            account,
            session: AuthSession::new(),
        }
    }

    pub fn with_email(email: EmailAddress) -> Self {
        Self::new(Some(Principal::new(email, None)))
    }

    pub fn unavailable() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn sign_in(&self) -> CoreResult<Principal> {
        let principal = self
            .account
            .clone()
            .ok_or_else(|| CoreError::SignInFailed("no account configured".into()))?;
        self.session.set(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) -> CoreResult<()> {
        self.session.set(None);
        Ok(())
    }

    fn session(&self) -> AuthSession {
        self.session.clone()
    }
}

/// Proof that the holder was found in the admin allow-list.
///
/// Only [`AccessPolicy::admin_capability`] can produce one; operations that
/// mutate or remove existing records take it as an argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCapability {
    email: EmailAddress,
}

impl AdminCapability {
    pub fn email(&self) -> &EmailAddress {
        &self.email
    }
}

/// Admin role: a static allow-list of emails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    admin_emails: Vec<EmailAddress>,
}

impl AccessPolicy {
    pub fn new(admin_emails: Vec<EmailAddress>) -> Self {
        Self { admin_emails }
    }

    pub fn admin_emails(&self) -> &[EmailAddress] {
        &self.admin_emails
    }

    pub fn is_admin(&self, principal: Option<&Principal>) -> bool {
        principal.is_some_and(|p| {
            self.admin_emails
                .iter()
                .any(|admin| admin.as_str().eq_ignore_ascii_case(p.email().as_str()))
        })
    }

    pub fn admin_capability(&self, principal: Option<&Principal>) -> Option<AdminCapability> {
        let principal = principal?;
        self.is_admin(Some(principal)).then(|| AdminCapability {
            email: principal.email().clone(),
        })
    }
}
