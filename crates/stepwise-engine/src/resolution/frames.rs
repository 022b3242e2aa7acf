use super::{Candidate, Cascade, host_of};
use crate::driver::{Driver, SearchRoot};
use tracing::{debug, warn};

/// Run `cascade` on the main document, then on each embedded frame in
/// document order. Returns the first success; exhaustion is `None`.
pub async fn resolve_across_frames(
    driver: &mut dyn Driver,
    cascade: &Cascade,
    hint: &str,
) -> Option<Candidate> {
    let host = match driver.current_url().await {
        Ok(url) => host_of(&url),
        Err(e) => {
            debug!("Could not read current URL for alias scope: {}", e);
            String::new()
        }
    };

    if let Some(found) = cascade.resolve(driver, &SearchRoot::Main, &host, hint).await {
        return Some(found);
    }

    let frames = match driver.frames().await {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Frame enumeration failed: {}", e);
            return None;
        }
    };
    for frame in frames {
        if let Some(found) = cascade.resolve(driver, &frame, &host, hint).await {
            debug!(frame = %frame, hint, "Resolved inside frame");
            return Some(found);
        }
    }
    None
}
