//! Unified error handling for the grid bot
//!
//! Startup failures (`AlreadyRunning`, `InsufficientBalance`,
//! `PlacementFailed`, `MaxRetriesExceeded`) are raised to the caller. Gateway
//! failures inside the reconciliation loop are logged and absorbed; they only
//! surface through this type when a caller asks for them directly.

use std::fmt;

use crate::clients::GatewayError;
use crate::config::ConfigError;

/// Main error type for the grid engine
#[derive(Debug)]
pub enum TradingError {
    /// `start()`/`resume()` called while the engine is running
    AlreadyRunning,

    /// Startup balance gate failed. All values in quote currency.
    InsufficientBalance {
        required: f64,
        quote_available: f64,
        base_value: f64,
    },

    /// A grid order failed during the initial batch; the grid was rolled back
    PlacementFailed(String),

    /// A bounded retry loop gave up
    MaxRetriesExceeded {
        operation: &'static str,
        attempts: u32,
    },

    Gateway(GatewayError),
    Config(ConfigError),
    Journal(String),
    InvalidParameter(String, String), // (parameter_name, reason)
}

impl TradingError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            TradingError::InsufficientBalance { required, quote_available, base_value } => {
                format!(
                    "Balance is not enough for trading\n\
                    Required per side: {:.2}\n\
                    Quote available: {:.2}\n\
                    Base value: {:.2}\n\n\
                    💡 Either:\n\
                    - Top up both sides of the pair\n\
                    - Reduce trade_balance in config.toml",
                    required, quote_available, base_value
                )
            }
            TradingError::AlreadyRunning => {
                "Grid engine is already running\n\n\
                💡 Stop the running engine before starting it again"
                    .to_string()
            }
            TradingError::MaxRetriesExceeded { operation, attempts } => {
                format!(
                    "{} did not settle after {} attempts\n\n\
                    💡 Check open orders on the exchange before restarting",
                    operation, attempts
                )
            }
            TradingError::Gateway(GatewayError::Auth(msg)) => {
                format!(
                    "API authentication failed: {}\n\n\
                    💡 Check:\n\
                    - api_key / BITKUB_API_KEY\n\
                    - api_secret / BITKUB_API_SECRET\n\
                    - Keys have trading permissions",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            TradingError::Gateway(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::AlreadyRunning
            | TradingError::InsufficientBalance { .. }
            | TradingError::PlacementFailed(_)
            | TradingError::MaxRetriesExceeded { .. } => "engine",
            TradingError::Gateway(_) => "gateway",
            TradingError::Config(_) | TradingError::InvalidParameter(_, _) => "config",
            TradingError::Journal(_) => "journal",
        }
    }
}

impl fmt::Display for TradingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingError::AlreadyRunning => write!(f, "Grid trading bot is already running"),
            TradingError::InsufficientBalance { required, .. } => {
                write!(
                    f,
                    "Insufficient balance: need more than {:.2} on each side of the pair",
                    required
                )
            }
            TradingError::PlacementFailed(msg) => write!(f, "Grid placement failed: {}", msg),
            TradingError::MaxRetriesExceeded { operation, attempts } => {
                write!(f, "Maximum retries exceeded for {} ({} attempts)", operation, attempts)
            }
            TradingError::Gateway(err) => write!(f, "Gateway error: {}", err),
            TradingError::Config(err) => write!(f, "Configuration error: {}", err),
            TradingError::Journal(msg) => write!(f, "Journal error: {}", msg),
            TradingError::InvalidParameter(param, reason) => {
                write!(f, "Invalid parameter '{}': {}", param, reason)
            }
        }
    }
}

impl std::error::Error for TradingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TradingError::Gateway(err) => Some(err),
            TradingError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GatewayError> for TradingError {
    fn from(err: GatewayError) -> Self {
        TradingError::Gateway(err)
    }
}

impl From<ConfigError> for TradingError {
    fn from(err: ConfigError) -> Self {
        TradingError::Config(err)
    }
}

impl From<rusqlite::Error> for TradingError {
    fn from(err: rusqlite::Error) -> Self {
        TradingError::Journal(err.to_string())
    }
}

impl From<refinery::Error> for TradingError {
    fn from(err: refinery::Error) -> Self {
        TradingError::Journal(format!("migration failed: {}", err))
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TradingError::InsufficientBalance {
            required: 4510.0,
            quote_available: 100.0,
            base_value: 9000.0,
        };
        assert!(err.to_string().contains("4510.00"));
        assert_eq!(TradingError::AlreadyRunning.to_string(), "Grid trading bot is already running");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(TradingError::AlreadyRunning.category(), "engine");
        assert_eq!(TradingError::Journal("x".to_string()).category(), "journal");
        let err: TradingError = GatewayError::Network("down".to_string()).into();
        assert_eq!(err.category(), "gateway");
    }

    #[test]
    fn test_retryable() {
        let err: TradingError = GatewayError::Network("timeout".to_string()).into();
        assert!(err.is_retryable());

        let err = TradingError::PlacementFailed("rejected".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_user_message() {
        let err = TradingError::InsufficientBalance {
            required: 100.0,
            quote_available: 50.0,
            base_value: 200.0,
        };
        let msg = err.user_message();
        assert!(msg.contains("100.00"));
        assert!(msg.contains("50.00"));
        assert!(msg.contains("💡"));
    }
}
