//! jAccount session management: cookie persistence, the interactive login
//! state machine, liveness checks, and the background keep-alive monitor.
//!
//! One [`SessionManager`] instance is constructed at process start and
//! shared by reference with the protocol server and every tool context.
//! Its cookie jar is the sole credential source for authenticated
//! requests — no other component holds a copy.

pub mod cookies;
pub mod credentials;
pub mod login;
pub mod manager;
pub mod monitor;
pub mod solver;

pub use cookies::FlatCookieStore;
pub use credentials::CredentialStore;
pub use manager::SessionManager;
pub use monitor::ExpiryCallback;
pub use solver::ChallengeSolver;
