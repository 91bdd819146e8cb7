//! Unified error handling with Sentry integration.
//!
//! Each concern has its own error enum ([`StorageError`], [`ApiError`],
//! [`CheckoutError`], [`ConfigError`]). [`ClientError`] wraps them for hosts
//! that want a single type, and decides what is safe to show the user.

use thiserror::Error;

use storefront_sync_core::User;

use crate::api::ApiError;
use crate::checkout::CheckoutError;
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Client-level error type for the storefront.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Storage backend could not be opened.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Collaborator API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Checkout was blocked or failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Whether repeating the same action may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Api(err) => matches!(
                err,
                ApiError::Http(_) | ApiError::Status { .. } | ApiError::Parse(_)
            ),
            Self::Checkout(err) => err.is_retryable(),
            Self::Storage(_) | Self::Config(_) => false,
        }
    }

    /// Message suitable for showing to the user.
    ///
    /// Validation messages are shown as-is; internal details are not.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Checkout(err) => match err {
                CheckoutError::EmptyCart => "Your cart is empty".to_string(),
                CheckoutError::Shipping(e) => e.to_string(),
                CheckoutError::NotAuthenticated => "Please sign in to check out".to_string(),
                CheckoutError::CredentialExpired => {
                    "Your session has expired. Please sign in again.".to_string()
                }
                CheckoutError::Submission(_) => {
                    "We could not place your order. Please try again.".to_string()
                }
            },
            Self::Api(ApiError::Unauthorized) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            Self::Api(ApiError::NotFound(_)) => "Not found".to_string(),
            Self::Api(_) => "Could not reach the store. Please try again.".to_string(),
            Self::Storage(_) | Self::Config(_) => "Internal error".to_string(),
        }
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Set the Sentry user context from a confirmed profile.
///
/// Call this after successful reconciliation to associate errors with users.
pub fn set_sentry_user(user: &User) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user.id.to_string()),
            email: user.email.as_ref().map(ToString::to_string),
            username: Some(user.name.clone()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "adjust", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use storefront_sync_core::ShippingError;

    use super::*;

    #[test]
    fn test_client_error_display() {
        let err = ClientError::from(ConfigError::MissingEnvVar("X".to_string()));
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing environment variable: X"
        );
    }

    #[test]
    fn test_retryable() {
        let status = || ApiError::Status {
            status: 503,
            body: "down".to_string(),
        };
        assert!(ClientError::from(status()).is_retryable());
        assert!(ClientError::from(CheckoutError::Submission(status())).is_retryable());
        assert!(!ClientError::from(ApiError::Unauthorized).is_retryable());
        assert!(!ClientError::from(CheckoutError::EmptyCart).is_retryable());
        assert!(!ClientError::from(CheckoutError::CredentialExpired).is_retryable());
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = ClientError::from(CheckoutError::Submission(ApiError::Status {
            status: 500,
            body: "stack trace at db.rs:42".to_string(),
        }));
        assert!(!err.user_message().contains("db.rs"));

        let err = ClientError::from(CheckoutError::from(ShippingError::MissingField("phone")));
        assert_eq!(err.user_message(), "shipping field `phone` is required");
    }
}
