//! Outbound sticker fixes for QQ/WeChat.

use async_trait::async_trait;
use tracing::warn;

use hydra_core::bus::Filter;
use hydra_core::types::{BlobData, Event, EventData, EventKind};

/// Telegram stickers arrive as webm, mp4, or gzipped TGS; the vendors on
/// the other side want plain images or videos.
pub struct StickerOutbound;

fn first_blob(event: &Event) -> Option<&BlobData> {
    match &event.data {
        Some(EventData::Photo(photos)) => photos.first(),
        Some(EventData::Blob(blob)) => Some(blob),
        _ => None,
    }
}

fn first_blob_mut(event: &mut Event) -> Option<&mut BlobData> {
    match &mut event.data {
        Some(EventData::Photo(photos)) => photos.first_mut(),
        Some(EventData::Blob(blob)) => Some(blob),
        _ => None,
    }
}

#[async_trait]
impl Filter for StickerOutbound {
    fn name(&self) -> &'static str {
        "sticker_outbound"
    }

    async fn apply(&self, mut event: Event) -> Option<Event> {
        if !matches!(event.vendor.kind.as_str(), "qq" | "wechat") {
            return Some(event);
        }
        if !matches!(event.kind, EventKind::Photo | EventKind::Sticker) {
            return Some(event);
        }

        let mime = match first_blob(&event) {
            Some(blob) => blob.mime.clone(),
            None => return Some(event),
        };

        match mime.as_str() {
            "video/webm" => {
                let binary = first_blob(&event)
                    .map(|blob| blob.binary.clone())
                    .unwrap_or_default();
                match super::ffmpeg(&binary, ".webm", &["-f", "gif"], ".gif").await {
                    Ok(gif) => {
                        if let Some(blob) = first_blob_mut(&mut event) {
                            blob.mime = "image/gif".to_string();
                            blob.name = format!("{}.gif", blob.name);
                            blob.binary = gif;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to convert webm to gif"),
                }
            }
            // WeChat has no way to show an mp4 sticker
            "video/mp4" if event.vendor.kind == "wechat" => return None,
            "video/mp4" => {
                if let Some(blob) = first_blob(&event).cloned() {
                    event.kind = EventKind::Video;
                    event.data = Some(EventData::Blob(blob));
                }
            }
            // gzipped TGS animation; no converter in this toolchain
            "application/gzip" => warn!("tgs sticker left unconverted"),
            _ => {}
        }

        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use hydra_core::types::Vendor;

    use super::*;

    fn sticker_event(vendor_kind: &str, mime: &str) -> Event {
        let mut event = Event::new(Vendor::new(vendor_kind, "9"), "1", 0);
        event.kind = EventKind::Sticker;
        event.data = Some(EventData::Blob(BlobData {
            name: "sticker".to_string(),
            mime: mime.to_string(),
            binary: vec![1, 2, 3],
        }));
        event
    }

    #[tokio::test]
    async fn wechat_mp4_sticker_is_vetoed() {
        let event = sticker_event("wechat", "video/mp4");
        assert!(StickerOutbound.apply(event).await.is_none());
    }

    #[tokio::test]
    async fn qq_mp4_sticker_is_promoted_to_video() {
        let event = sticker_event("qq", "video/mp4");
        let event = StickerOutbound.apply(event).await.unwrap();
        assert_eq!(event.kind, EventKind::Video);
        assert!(matches!(event.data, Some(EventData::Blob(_))));
    }

    #[tokio::test]
    async fn other_vendors_pass_through() {
        let event = sticker_event("telegram", "video/mp4");
        let event = StickerOutbound.apply(event).await.unwrap();
        assert_eq!(event.kind, EventKind::Sticker);
    }

    #[tokio::test]
    async fn webp_sticker_is_untouched() {
        let event = sticker_event("qq", "image/webp");
        let event = StickerOutbound.apply(event).await.unwrap();
        assert_eq!(event.kind, EventKind::Sticker);
        let blob = event.data.as_ref().and_then(|d| d.as_blob()).unwrap();
        assert_eq!(blob.mime, "image/webp");
    }
}
