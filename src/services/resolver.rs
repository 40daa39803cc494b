use crate::models::{Quality, ResolvedSource, TransferRequest};
use crate::services::error::TransferError;

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";
const VIDEO_ID_MARKER: &str = "v=";
const OBJECT_EXTENSION: &str = "mp4";

/// Turns caller input into a canonical URL, a video id and a storage key.
/// Pure: no network or storage access happens here.
pub fn resolve(req: &TransferRequest) -> Result<ResolvedSource, TransferError> {
    let video_id = non_empty(&req.video_id);
    let video_url = non_empty(&req.video_url);

    // An explicit id wins over a URL when both are given.
    let url = match (video_id, video_url) {
        (Some(id), _) => video_url_for(id),
        (None, Some(url)) => url.to_string(),
        (None, None) => return Err(TransferError::missing_video_reference()),
    };

    let quality = match non_empty(&req.quality) {
        Some(q) => q.parse::<Quality>().map_err(TransferError::Validation)?,
        None => Quality::default(),
    };

    let video_id = extract_video_id(&url);
    let key = storage_key(non_empty(&req.path), &video_id);

    Ok(ResolvedSource {
        url,
        video_id,
        key,
        quality,
    })
}

pub fn video_url_for(video_id: &str) -> String {
    format!("{}{}", WATCH_URL_PREFIX, video_id)
}

/// Everything after the first `v=` in the URL, query fragments included.
///
/// Without the marker the result is the URL minus its first character. That
/// quirk is kept on purpose so existing keys stay stable.
pub fn extract_video_id(url: &str) -> String {
    let start = match url.find(VIDEO_ID_MARKER) {
        Some(idx) => idx + VIDEO_ID_MARKER.len(),
        None => 1,
    };
    // `get` keeps us safe when the fallback offset lands inside a multi-byte char.
    url.get(start..)
        .or_else(|| url.char_indices().nth(1).map(|(idx, _)| &url[idx..]))
        .unwrap_or_default()
        .to_string()
}

pub fn storage_key(path: Option<&str>, video_id: &str) -> String {
    match path {
        Some(path) => format!("{}/{}.{}", path, video_id, OBJECT_EXTENSION),
        None => format!("{}.{}", video_id, OBJECT_EXTENSION),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
