//! Upload-ingestion core for the poulda file-paste service.
//!
//! The crate covers the pieces of the service that handle untrusted
//! external input: pulling an uploaded file out of a multipart request
//! body with a client-declared (and possibly dishonest) length, spooling
//! it to disk through a bounded copy, and the two request gates every
//! entry point runs behind, namely the `poulda.enabled` service toggle
//! and the `poulda.accounts` credential check.
//!
//! Routing, templating and paste storage live in the hosting application.
//! The host builds a [`Request`] (headers, body stream, settings,
//! localizer), hands it to this crate, and maps the returned values
//! (an [`Upload`], a [`Response`], a boolean verdict or an
//! [`IngestError`]) onto actual HTTP responses.

use tracing_subscriber::EnvFilter;

pub mod access;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use access::credentials::{Account, check_password, parse_accounts};
pub use access::gate::{DISABLED_MESSAGE, require_enabled};
pub use config::Settings;
pub use errors::{IngestError, IngestResult};
pub use models::request::{Body, Localizer, NullLocalizer, Request, Response};
pub use models::upload::{Upload, UploadInfo};
pub use services::ingest_service::{IngestService, copy_bounded};

/// Install the global tracing subscriber, filtered through `RUST_LOG`.
///
/// Hosts that bring their own subscriber can skip this; calling it twice
/// is harmless.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
