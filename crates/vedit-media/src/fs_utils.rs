//! Moving rendered artifacts out of scratch space.

use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Move a finished artifact to `dst`, creating parent directories.
///
/// Scratch space and the output directory may live on different
/// filesystems; a failed rename with EXDEV falls back to copying into a
/// sibling `.partial` file and renaming that into place, so `dst` never
/// holds a half-written artifact.
pub async fn publish_artifact(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<u64> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => {}
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERRNO) => {
            debug!(src = %src.display(), dst = %dst.display(), "Cross-device publish, copying");
            let partial = dst.with_extension("partial");
            if let Err(e) = fs::copy(src, &partial).await {
                let _ = fs::remove_file(&partial).await;
                return Err(e.into());
            }
            if let Err(e) = fs::rename(&partial, dst).await {
                let _ = fs::remove_file(&partial).await;
                return Err(e.into());
            }
            if let Err(e) = fs::remove_file(src).await {
                warn!(path = %src.display(), error = %e, "Failed to remove artifact source after copy");
            }
        }
        Err(e) => return Err(e.into()),
    }

    Ok(fs::metadata(dst).await?.len())
}
