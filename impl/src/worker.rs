//! Worker is a process running the application entry point.
use futures::future::BoxFuture;
use log::Level;

use super::{host::ProcessHost, sink::LogSink, BoxError, Error, Result};

/// Application entry point.
pub(crate) type App =
    Box<dyn FnOnce() -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send>;

/// Run the application until it completes.
///
/// A failing application is logged and the process exits with
/// status `1`; it is never retried in place.
pub(crate) async fn run<H: ProcessHost + ?Sized>(
    app: App,
    sink: &dyn LogSink,
    host: &H,
) -> Result<()> {
    match (app)().await {
        Ok(()) => Ok(()),
        Err(e) => {
            sink.log(
                Level::Error,
                &format!("Application error: {}", e),
                Some(&format!("{:?}", e)),
            );
            host.exit(1);
            Err(Error::Application(e))
        }
    }
}
