//! Object key layout for order artifacts.
//!
//! Every key is namespaced by order id so that a retried stitch or keyframe
//! upload for the same order replaces its previous object.

use santa_models::OrderId;

use crate::error::{StorageError, StorageResult};

/// Key of the stitched video for an order.
pub fn final_video_key(order_id: &OrderId) -> String {
    format!("orders/{}/final.mp4", order_id)
}

/// Key of one scene's keyframe image.
pub fn keyframe_key(order_id: &OrderId, scene_number: u32, extension: &str) -> String {
    format!("orders/{}/keyframes/scene-{}.{}", order_id, scene_number, extension)
}

/// File extension for an image or video MIME type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        _ => "png",
    }
}

/// Reject keys that could escape the order namespace.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|part| part.is_empty() || part == "..")
    {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}
