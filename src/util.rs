use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Generate an opaque 128-bit session token as 32 hex characters.
///
/// The token correlates the upload, queue-join, and event-channel calls for
/// one job; it must be unique per request and independent of the (sequential)
/// outbound request ids.
#[must_use]
pub(crate) fn generate_session_hash() -> String {
    let hi = u128::from(fastrand::u64(..));
    let lo = u128::from(fastrand::u64(..));
    uuid::Uuid::from_u128((hi << 64) | lo).simple().to_string()
}

/// Split a `data:<mime>;base64,<payload>` URL into its mime and payload parts.
///
/// Returns `None` for anything that is not a base64 data URL.
#[must_use]
pub(crate) fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((mime, payload))
}
