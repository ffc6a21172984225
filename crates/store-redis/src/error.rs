//! Mapping of Redis errors into the canonical store error set.

use switchgear_store::StoreError;

/// Maps a [`redis::RedisError`] to the matching [`StoreError`] variant,
/// preserving the original error as the source.
pub(crate) fn map_redis_err(err: redis::RedisError) -> StoreError {
    let message = err.to_string();
    if err.is_timeout() {
        StoreError::timeout()
    } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        StoreError::connection_with(message, err)
    } else if err.kind() == redis::ErrorKind::TypeError {
        StoreError::serialization_with(message, err)
    } else {
        StoreError::internal_with(message, err)
    }
}
