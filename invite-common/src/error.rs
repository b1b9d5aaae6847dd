//! Common error types for the invitation services

use thiserror::Error;

/// Common result type for invitation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the invitation services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Phone number could not be reduced to the canonical form
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    /// Verification code did not match, was already used, or expired.
    ///
    /// Deliberately carries no detail about which of these happened.
    #[error("Verification code is invalid or expired")]
    CodeInvalidOrExpired,

    /// SMS provider rejected or failed to deliver the message
    #[error("SMS transport error: {0}")]
    SmsTransport(String),

    /// A verified entry already exists for this (event, phone) pair
    #[error("Entry already submitted")]
    AlreadySubmitted,

    /// Mutation attempted with a phone that does not own the entry
    #[error("Entry is not owned by the supplied phone")]
    NotOwner,

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Message suitable for showing to a guest.
    ///
    /// Infrastructure failures collapse into one generic retry message so
    /// storage or provider details never reach the page.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidInput(msg) => msg.clone(),
            Error::InvalidPhone(_) => {
                "Please enter a valid mobile number (e.g. 010-1234-5678).".to_string()
            }
            Error::CodeInvalidOrExpired => {
                "The verification code is invalid or has expired.".to_string()
            }
            Error::AlreadySubmitted => "You have already submitted for this event.".to_string(),
            Error::NotOwner => "You can only change entries you wrote yourself.".to_string(),
            Error::NotFound(what) => format!("{} could not be found.", what),
            Error::SmsTransport(_) => {
                "We could not send the verification code. Please try again.".to_string()
            }
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                "Something went wrong. Please try again in a moment.".to_string()
            }
        }
    }

    /// Whether repeating the same request unchanged may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Io(_) | Error::SmsTransport(_) | Error::Internal(_)
        )
    }
}
