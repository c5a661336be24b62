use orbit_core::client::ClientError;

/// Maps an octocrab transport error onto the core's coarse `ClientError`.
/// octocrab's own error enum doesn't expose a stable rate-limit variant
/// across versions, so rate-limit detection falls back to the message text
/// (octocrab surfaces GitHub's "API rate limit exceeded" verbatim), with a
/// conservative fixed reset when no `Retry-After` is available.
pub fn map_err(err: octocrab::Error) -> ClientError {
    from_message(err.to_string())
}

fn from_message(message: String) -> ClientError {
    if message.to_lowercase().contains("rate limit") {
        ClientError::RateLimited { message, reset_in_secs: 60 }
    } else {
        ClientError::Other(message)
    }
}
