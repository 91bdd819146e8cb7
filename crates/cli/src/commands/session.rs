//! Session commands.

use storefront_sync::{Notice, SessionState, StorefrontContext};
use storefront_sync_core::SessionToken;

use super::CommandError;

fn log_state(state: &SessionState, notice: Option<&Notice>) {
    if let Some(notice) = notice {
        tracing::warn!("{}", notice.message());
    }
    match state {
        SessionState::Anonymous => tracing::info!("Not signed in"),
        SessionState::Authenticated(user) => {
            tracing::info!("Signed in as {} ({})", user.name, user.id);
        }
        SessionState::Stale(user) => {
            tracing::info!("Signed in as {} ({}), not confirmed", user.name, user.id);
        }
    }
}

/// Store `token`, then confirm it with the backend.
pub async fn login(ctx: &StorefrontContext, token: &str) -> Result<(), CommandError> {
    let token = SessionToken::new(token.trim());
    if token.is_blank() {
        return Err(CommandError::EmptyToken);
    }

    ctx.session().login(&token, None);
    let outcome = ctx.session().reconcile().await;
    log_state(&outcome.state, outcome.notice.as_ref());
    Ok(())
}

pub fn logout(ctx: &StorefrontContext) {
    ctx.session().logout();
    tracing::info!("Signed out");
}

pub async fn whoami(ctx: &StorefrontContext) {
    let outcome = ctx.session().reconcile().await;
    log_state(&outcome.state, outcome.notice.as_ref());
}
