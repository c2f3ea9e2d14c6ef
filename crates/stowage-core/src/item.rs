//! Streaming item operations.
//!
//! Each call resolves the binding, composes `base:key`, and performs one
//! backend operation. Nothing is cached between calls. Backend errors come
//! back as [`StoreError::Backend`] carrying the backend's own error.

use crate::binding::{ByteStream, Capability, GetOptions, PutOptions};
use crate::env::Environment;
use crate::error::{StoreError, StoreResult};
use crate::key::join_key;
use crate::resolver::{BindingRef, BindingResolver};

/// Write `stream` at `base:key`. `options` reach the backend unchanged.
pub async fn set_item_stream(
    env: &Environment,
    binding: &BindingRef,
    base: &str,
    key: &str,
    stream: ByteStream,
    options: Option<PutOptions>,
) -> StoreResult<()> {
    let resolver = BindingResolver::bucket(env);
    let handle = resolver.resolve(binding)?;
    let full_key = join_key([base, key]);
    tracing::debug!(driver = resolver.driver(), key = %full_key, "put item stream");
    handle
        .put(&full_key, stream, options)
        .await
        .map_err(StoreError::Backend)
}

/// Read the body at `base:key`.
///
/// Returns `Ok(None)` when the backend has no object there. Object metadata
/// is dropped; call the binding directly when it is needed.
pub async fn get_item_stream(
    env: &Environment,
    binding: &BindingRef,
    base: &str,
    key: &str,
    options: Option<GetOptions>,
) -> StoreResult<Option<ByteStream>> {
    read_item_stream(env, binding, base, key, options, &Capability::REQUIRED).await
}

/// [`get_item_stream`] checking only `required` on the binding.
pub(crate) async fn read_item_stream(
    env: &Environment,
    binding: &BindingRef,
    base: &str,
    key: &str,
    options: Option<GetOptions>,
    required: &[Capability],
) -> StoreResult<Option<ByteStream>> {
    let resolver = BindingResolver::bucket(env);
    let handle = resolver.resolve_for(binding, required)?;
    let full_key = join_key([base, key]);
    let object = handle
        .get(&full_key, options)
        .await
        .map_err(StoreError::Backend)?;
    tracing::debug!(
        driver = resolver.driver(),
        key = %full_key,
        hit = object.is_some(),
        "get item stream"
    );
    Ok(object.map(|o| o.into_body()))
}

/// Remove the object at `base:key`. Removing a missing key succeeds.
pub async fn delete_item(
    env: &Environment,
    binding: &BindingRef,
    base: &str,
    key: &str,
) -> StoreResult<()> {
    let resolver = BindingResolver::bucket(env);
    let handle = resolver.resolve(binding)?;
    let full_key = join_key([base, key]);
    tracing::debug!(driver = resolver.driver(), key = %full_key, "delete item");
    handle.delete(&full_key).await.map_err(StoreError::Backend)
}
