//! Request-level feature toggle wrapped around every handler.

use std::future::Future;

use futures::future::BoxFuture;
use tracing::debug;

use crate::models::request::{Request, Response};

/// Message returned in place of a handler result while the service is
/// switched off. Localized through the request before it goes out.
pub const DISABLED_MESSAGE: &str = "This service has been disabled.";

/// Wrap `handler` so it only runs while the service is switched on.
///
/// The `poulda.enabled` toggle is re-read from the request's settings on
/// every call, so a host that rebuilds its settings can flip it without
/// touching this wrapper. When the toggle is anything but `"true"` the
/// handler is never invoked (so it can leave no partial side effects)
/// and the caller gets a canned, localized refusal instead.
pub fn require_enabled<H, Fut>(handler: H) -> impl Fn(Request) -> BoxFuture<'static, Response>
where
    H: Fn(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    move |request: Request| {
        let handler = handler.clone();
        Box::pin(async move {
            if request.settings.service_enabled() {
                handler(request).await
            } else {
                debug!("service disabled, refusing request");
                Response::with_body(request.localizer.translate(DISABLED_MESSAGE))
            }
        })
    }
}
