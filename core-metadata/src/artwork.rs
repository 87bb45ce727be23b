//! Embedded picture identifiers and byte cache
//!
//! Picture bytes are never cached on disk. An image id encodes the audio
//! file it was found in and its position among that file's pictures, so the
//! bytes can be read back from the file at any later time.

use crate::error::{MetadataError, Result};
use bytes::Bytes;
use core_async::sync::Mutex;
use image::ImageReader;
use lru::LruCache;
use std::io::Cursor;
use std::num::NonZeroUsize;
use tracing::debug;

const IMAGE_ID_SEPARATOR: &str = "::image::";

/// Mint the id of the `index`-th picture embedded in `file_id`.
pub fn image_id(file_id: &str, index: usize) -> String {
    format!("{file_id}{IMAGE_ID_SEPARATOR}{index}")
}

/// Decode an id minted by [`image_id`] into its file id and picture index.
///
/// # Errors
///
/// Returns `MetadataError::InvalidImageId` if `id` was not minted by
/// [`image_id`].
pub fn parse_image_id(id: &str) -> Result<(&str, usize)> {
    let (file_id, index) = id
        .rsplit_once(IMAGE_ID_SEPARATOR)
        .ok_or_else(|| MetadataError::InvalidImageId(id.to_string()))?;
    if file_id.is_empty() {
        return Err(MetadataError::InvalidImageId(id.to_string()));
    }
    let index = index
        .parse()
        .map_err(|_| MetadataError::InvalidImageId(id.to_string()))?;
    Ok((file_id, index))
}

/// Width and height of an encoded image, read from its header only.
pub fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// MIME type sniffed from an image's magic bytes.
pub fn sniff_mime_type(data: &[u8]) -> Option<String> {
    let format = image::guess_format(data).ok()?;
    Some(format.to_mime_type().to_string())
}

/// Recently read picture bytes, keyed by image id.
pub struct ImageCache {
    cache: Option<Mutex<LruCache<String, Bytes>>>,
}

impl ImageCache {
    /// A cache holding up to `capacity` pictures. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub async fn get(&self, image_id: &str) -> Option<Bytes> {
        let cache = self.cache.as_ref()?;
        let hit = cache.lock().await.get(image_id).cloned();
        if hit.is_some() {
            debug!(image_id, "Picture served from cache");
        }
        hit
    }

    pub async fn put(&self, image_id: &str, data: Bytes) {
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().await;
            if let Some((evicted, _)) = cache.push(image_id.to_string(), data) {
                if evicted != image_id {
                    debug!(image_id = %evicted, "Evicted picture from cache");
                }
            }
        }
    }

    /// Drop every cached picture that came from `file_id`.
    pub async fn invalidate_file(&self, file_id: &str) {
        let Some(cache) = &self.cache else {
            return;
        };
        let mut cache = cache.lock().await;
        let stale: Vec<String> = cache
            .iter()
            .filter(|(id, _)| matches!(parse_image_id(id), Ok((owner, _)) if owner == file_id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            cache.pop(&id);
        }
    }

    pub async fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().await.clear();
        }
    }

    pub async fn len(&self) -> usize {
        match &self.cache {
            Some(cache) => cache.lock().await.len(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([255, 0, 0]),
        ));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_image_id_round_trip() {
        let id = image_id("/music/a::b.mp3", 2);
        assert_eq!(parse_image_id(&id).unwrap(), ("/music/a::b.mp3", 2));
    }

    #[test]
    fn test_invalid_image_ids() {
        for id in ["", "/music/a.mp3", "::image::0", "/music/a.mp3::image::x"] {
            assert!(
                matches!(parse_image_id(id), Err(MetadataError::InvalidImageId(_))),
                "{id}"
            );
        }
    }

    #[test]
    fn test_dimensions_and_mime() {
        let data = png(3, 2);
        assert_eq!(image_dimensions(&data), Some((3, 2)));
        assert_eq!(sniff_mime_type(&data).as_deref(), Some("image/png"));
        assert_eq!(image_dimensions(b"not an image"), None);
    }

    #[tokio::test]
    async fn test_cache_eviction() {
        let cache = ImageCache::new(2);
        cache.put("f1::image::0", Bytes::from_static(b"1")).await;
        cache.put("f2::image::0", Bytes::from_static(b"2")).await;
        assert!(cache.get("f1::image::0").await.is_some());
        cache.put("f3::image::0", Bytes::from_static(b"3")).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("f2::image::0").await.is_none());
        assert!(cache.get("f1::image::0").await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_file() {
        let cache = ImageCache::new(8);
        cache.put("f1::image::0", Bytes::from_static(b"a")).await;
        cache.put("f1::image::1", Bytes::from_static(b"b")).await;
        cache.put("f2::image::0", Bytes::from_static(b"c")).await;
        cache.invalidate_file("f1").await;
        assert_eq!(cache.len().await, 1);
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_disables_cache() {
        let cache = ImageCache::new(0);
        cache.put("f::image::0", Bytes::from_static(b"a")).await;
        assert!(cache.get("f::image::0").await.is_none());
        assert_eq!(cache.len().await, 0);
    }
}
