//! Embedded image repository
//!
//! Only descriptive data is cached. Image bytes stay in the audio file and
//! are read back on demand.

use crate::error::Result;
use crate::models::ImageMetadata;
use crate::repositories::CachedRepository;

pub const IMAGE_ARTIFACT: &str = "ImageData.bin";

pub type ImageRepository = CachedRepository<ImageMetadata>;

impl CachedRepository<ImageMetadata> {
    pub fn images() -> Self {
        Self::new(IMAGE_ARTIFACT)
    }

    /// Images embedded in the file `file_id`, in id order.
    pub async fn find_by_file(&self, file_id: &str) -> Result<Vec<ImageMetadata>> {
        self.find(|image| image.file_id == file_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MetadataRepository;
    use bridge_desktop::MemoryFolder;

    #[tokio::test]
    async fn test_find_by_file() {
        let repo = ImageRepository::images();
        repo.initialize_empty(MemoryFolder::new("/cache"))
            .await
            .unwrap();
        let image = |id: &str, file: &str| ImageMetadata {
            id: id.to_string(),
            file_id: file.to_string(),
            mime_type: Some("image/png".to_string()),
            ..Default::default()
        };
        repo.add_or_update(vec![
            image("/m/a.mp3::image::0", "/m/a.mp3"),
            image("/m/a.mp3::image::1", "/m/a.mp3"),
            image("/m/b.mp3::image::0", "/m/b.mp3"),
        ])
        .await
        .unwrap();

        let found = repo.find_by_file("/m/a.mp3").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].id, "/m/a.mp3::image::1");

        let orphan = ImageMetadata {
            id: "x".to_string(),
            ..Default::default()
        };
        assert!(repo.add_or_update(vec![orphan]).await.is_err());
    }
}
