//! Command implementations.

pub mod cart;
pub mod checkout;
pub mod session;

use storefront_sync::CheckoutError;
use storefront_sync::api::{ApiError, HttpApi};
use storefront_sync::storage::Origin;
use storefront_sync::{ClientConfig, ClientError, StorefrontContext};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Session token was blank.
    #[error("Token must not be empty")]
    EmptyToken,
}

impl CommandError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Client(e) => e.is_retryable(),
            Self::EmptyToken => false,
        }
    }
}

impl From<ApiError> for CommandError {
    fn from(err: ApiError) -> Self {
        Self::Client(err.into())
    }
}

impl From<CheckoutError> for CommandError {
    fn from(err: CheckoutError) -> Self {
        Self::Client(err.into())
    }
}

/// Open a context on the file-backed origin named by `config`.
pub fn open_context(config: &ClientConfig) -> Result<StorefrontContext, CommandError> {
    let origin = Origin::from_config(config).map_err(ClientError::from)?;
    Ok(StorefrontContext::open(
        &origin,
        HttpApi::from_config(config),
        config.checkout_mirror,
    ))
}
