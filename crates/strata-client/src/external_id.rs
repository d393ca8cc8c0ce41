use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use strata_domain::Coordinate;

/// Deterministic external fingerprint for one config on one remote surface.
/// The same `(surface, coordinate)` pair always yields the same id, which is
/// what makes upserts match their previous deploys.
#[must_use]
pub fn external_id(surface: &str, coordinate: &Coordinate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(surface.as_bytes());
    hasher.update(b"$");
    hasher.update(coordinate.to_string().as_bytes());
    let digest = hasher.finalize();
    format!("strata-{}", URL_SAFE_NO_PAD.encode(digest))
}
