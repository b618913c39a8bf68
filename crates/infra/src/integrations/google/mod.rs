//! Google Calendar v3 integration
//!
//! - **Gateway**: [`GoogleCalendarGateway`] implements the change feed,
//!   push-notification channels, and the colour palette.
//! - **Tokens**: [`GoogleTokenSource`] hands out bearer tokens, refreshing
//!   them against the OAuth token endpoint with the credentials of the
//!   account's client type.
//!
//! The gateway never retries on its own. A failed page surfaces to the
//! orchestrator, which owns the resync-once policy.

pub mod gateway;
pub mod token;
pub(crate) mod types;

pub use gateway::GoogleCalendarGateway;
pub use token::GoogleTokenSource;
