use std::time::Duration;
use tokio::task::JoinHandle;

/// Open `url` in the default browser after `delay`, giving the server time to bind.
///
/// Failures are logged only; the server stays up and the user can browse manually.
pub fn open_after(url: String, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        tracing::info!(%url, "opening browser");
        if let Err(e) = open::that(&url) {
            tracing::warn!(%url, "failed to open browser: {e}");
        }
    })
}
