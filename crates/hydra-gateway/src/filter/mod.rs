//! Transcoding filters attached to the two event buses.
//!
//! Outbound (master→slave): sticker format fixes for QQ/WeChat, voice
//! re-encoding for WeChat. Inbound (slave→master): voice normalization to
//! ogg/opus and WeChat emoticon replacement. A failed transcode leaves the
//! event as it was; the raw blob still flows.

mod emoticon;
mod sticker;
mod voice;

pub use emoticon::EmoticonInbound;
pub use sticker::StickerOutbound;
pub use voice::{VoiceInbound, VoiceOutbound};

use std::io;
use std::sync::Arc;

use hydra_core::bus::Filter;

pub fn master_to_slave() -> Vec<Arc<dyn Filter>> {
    vec![Arc::new(StickerOutbound), Arc::new(VoiceOutbound)]
}

pub fn slave_to_master() -> Vec<Arc<dyn Filter>> {
    vec![Arc::new(VoiceInbound), Arc::new(EmoticonInbound)]
}

/// Run ffmpeg over a temp input file and collect the converted output.
pub(crate) async fn ffmpeg(
    input: &[u8],
    input_ext: &str,
    output_args: &[&str],
    output_ext: &str,
) -> io::Result<Vec<u8>> {
    let dir = std::env::temp_dir();
    let stem = uuid::Uuid::new_v4().simple().to_string();
    let input_path = dir.join(format!("{stem}-in{input_ext}"));
    let output_path = dir.join(format!("{stem}-out{output_ext}"));

    tokio::fs::write(&input_path, input).await?;

    let status = tokio::process::Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(&input_path)
        .args(output_args)
        .arg(&output_path)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await;

    let result = match status {
        Ok(status) if status.success() => tokio::fs::read(&output_path).await,
        Ok(status) => Err(io::Error::other(format!("ffmpeg exited with {status}"))),
        Err(e) => Err(e),
    };

    let _ = tokio::fs::remove_file(&input_path).await;
    let _ = tokio::fs::remove_file(&output_path).await;
    result
}
