//! Encoder discovery.
//!
//! A concrete encoder name (`h264_nvenc`, `libx264`) is looked up as is. A codec
//! family (`h264`, `hevc`) resolves to the first hardware encoder FFmpeg was
//! built with, then to the software encoder of that family.

/// Candidate encoders for a codec family, hardware first.
fn family_candidates(codec_name: &str) -> &'static [&'static str] {
    match codec_name {
        "h264" | "avc" => &["h264_nvenc", "h264_vaapi", "h264_qsv", "libx264"],
        "hevc" | "h265" => &["hevc_nvenc", "hevc_vaapi", "hevc_qsv", "libx265"],
        _ => &[],
    }
}

/// Find an encoder by concrete name or codec family.
pub fn find_encoder(codec_name: &str) -> Option<ffmpeg_next::Codec> {
    let candidates = family_candidates(codec_name);
    if candidates.is_empty() {
        return ffmpeg_next::encoder::find_by_name(codec_name);
    }

    for name in candidates {
        if let Some(codec) = ffmpeg_next::encoder::find_by_name(name) {
            log::info!("resolved encoder {} -> {}", codec_name, name);
            return Some(codec);
        }
    }
    None
}

/// Whether the encoder name refers to a hardware-accelerated implementation.
pub fn is_hardware(codec_name: &str) -> bool {
    codec_name.contains("nvenc")
        || codec_name.contains("vaapi")
        || codec_name.contains("qsv")
        || codec_name.contains("v4l2m2m")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_hardware() {
        assert!(is_hardware("h264_nvenc"));
        assert!(is_hardware("hevc_vaapi"));
        assert!(is_hardware("h264_qsv"));
        assert!(!is_hardware("libx264"));
        assert!(!is_hardware("h264"));
    }

    #[test]
    fn test_family_candidates_end_with_software() {
        assert_eq!(family_candidates("h264").last(), Some(&"libx264"));
        assert_eq!(family_candidates("hevc").first(), Some(&"hevc_nvenc"));
        assert!(family_candidates("libx264").is_empty());
    }

    #[test]
    fn test_unknown_encoder() {
        assert!(find_encoder("no_such_encoder").is_none());
    }
}
