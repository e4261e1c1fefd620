//! Voice transcoding between Telegram's ogg/opus notes and the vendor
//! formats.

use async_trait::async_trait;
use tracing::{debug, warn};

use hydra_core::bus::Filter;
use hydra_core::media::extension_for;
use hydra_core::types::{BlobData, Event, EventData, EventKind};

fn voice_blob_mut(event: &mut Event) -> Option<&mut BlobData> {
    match &mut event.data {
        Some(EventData::Blob(blob)) => Some(blob),
        _ => None,
    }
}

/// Telegram → vendor. WeChat rejects voice uploads entirely, so the note is
/// re-encoded as an mp3 and demoted to a file attachment.
pub struct VoiceOutbound;

#[async_trait]
impl Filter for VoiceOutbound {
    fn name(&self) -> &'static str {
        "voice_outbound"
    }

    async fn apply(&self, mut event: Event) -> Option<Event> {
        if event.kind != EventKind::Audio {
            return Some(event);
        }

        match event.vendor.kind.as_str() {
            "wechat" => {
                let Some(binary) = voice_blob_mut(&mut event).map(|blob| blob.binary.clone())
                else {
                    return Some(event);
                };
                match super::ffmpeg(&binary, ".ogg", &["-f", "mp3"], ".mp3").await {
                    Ok(mp3) => {
                        let suffix = uuid::Uuid::new_v4().simple().to_string();
                        if let Some(blob) = voice_blob_mut(&mut event) {
                            blob.mime = "audio/mpeg".to_string();
                            blob.binary = mp3;
                            blob.name = format!("VOICE_{}.mp3", &suffix[..8]);
                        }
                        event.kind = EventKind::File;
                    }
                    Err(e) => warn!(error = %e, "failed to convert ogg to mp3"),
                }
            }
            "qq" => {
                // QQ wants silk; without an encoder the raw note goes out
                debug!("no silk encoder available, sending voice as-is");
            }
            _ => {}
        }

        Some(event)
    }
}

/// Vendor → Telegram: normalize whatever the adapter produced (amr in
/// practice) to an ogg/opus voice note.
pub struct VoiceInbound;

#[async_trait]
impl Filter for VoiceInbound {
    fn name(&self) -> &'static str {
        "voice_inbound"
    }

    async fn apply(&self, mut event: Event) -> Option<Event> {
        if event.kind != EventKind::Audio {
            return Some(event);
        }
        if !matches!(event.vendor.kind.as_str(), "qq" | "wechat") {
            return Some(event);
        }

        let Some((mime, binary)) =
            voice_blob_mut(&mut event).map(|blob| (blob.mime.clone(), blob.binary.clone()))
        else {
            return Some(event);
        };
        if mime == "audio/ogg" {
            return Some(event);
        }

        let input_ext = {
            let ext = extension_for(&mime);
            if ext.is_empty() {
                ".bin".to_string()
            } else {
                ext
            }
        };
        match super::ffmpeg(
            &binary,
            &input_ext,
            &["-c:a", "libopus", "-b:a", "24K", "-f", "ogg"],
            ".ogg",
        )
        .await
        {
            Ok(ogg) => {
                if let Some(blob) = voice_blob_mut(&mut event) {
                    blob.mime = "audio/ogg".to_string();
                    blob.binary = ogg;
                }
            }
            Err(e) => warn!(error = %e, "failed to convert voice to ogg"),
        }

        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use hydra_core::types::Vendor;

    use super::*;

    fn audio_event(vendor_kind: &str, mime: &str) -> Event {
        let mut event = Event::new(Vendor::new(vendor_kind, "9"), "1", 0);
        event.kind = EventKind::Audio;
        event.data = Some(EventData::Blob(BlobData {
            name: "voice".to_string(),
            mime: mime.to_string(),
            binary: vec![0; 4],
        }));
        event
    }

    #[tokio::test]
    async fn outbound_qq_voice_passes_untouched() {
        let event = audio_event("qq", "audio/ogg");
        let event = VoiceOutbound.apply(event).await.unwrap();
        assert_eq!(event.kind, EventKind::Audio);
        let blob = event.data.as_ref().and_then(|d| d.as_blob()).unwrap();
        assert_eq!(blob.mime, "audio/ogg");
    }

    #[tokio::test]
    async fn outbound_ignores_non_audio() {
        let mut event = audio_event("wechat", "audio/ogg");
        event.kind = EventKind::Text;
        let event = VoiceOutbound.apply(event).await.unwrap();
        assert_eq!(event.kind, EventKind::Text);
    }

    #[tokio::test]
    async fn inbound_ogg_voice_is_already_fine() {
        let event = audio_event("qq", "audio/ogg");
        let event = VoiceInbound.apply(event).await.unwrap();
        let blob = event.data.as_ref().and_then(|d| d.as_blob()).unwrap();
        assert_eq!(blob.mime, "audio/ogg");
        assert_eq!(blob.binary, vec![0; 4]);
    }

    #[tokio::test]
    async fn inbound_ignores_other_vendors() {
        let event = audio_event("telegram", "audio/amr");
        let event = VoiceInbound.apply(event).await.unwrap();
        let blob = event.data.as_ref().and_then(|d| d.as_blob()).unwrap();
        assert_eq!(blob.mime, "audio/amr");
    }
}
