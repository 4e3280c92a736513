//! Port definitions (hexagonal architecture interfaces)
//!
//! ## Ports Overview
//!
//! - [`ISyncTransport`] - Host key, full collection download and upload
//! - [`IWebService`] - Legacy cookie-authenticated deck and editor endpoints
//! - [`Clock`] - Wall-clock source for id allocation

pub mod clock;
pub mod sync_transport;
pub mod web_service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use sync_transport::ISyncTransport;
pub use web_service::{DeckListInfo, IWebService, NoteEdit, SearchHit};
