use std::path::Path;

use tracing::{info, warn};

/// Divides `numerator` by `denominator`, yielding 0 instead of NaN or
/// infinity when the denominator is zero.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn open_path(path: &Path) {
    match open::that(path) {
        Ok(()) => info!("Opened {}", path.display()),
        Err(e) => {
            warn!("Failed to open {}: {}", path.display(), e);
            println!("The report was written to {}", path.display());
        }
    }
}
