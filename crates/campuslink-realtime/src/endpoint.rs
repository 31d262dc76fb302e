use url::Url;

use crate::error::{ChannelError, Result};

/// Derive the chat WebSocket endpoint for a conversation from the REST
/// API origin.
///
/// `http` maps to `ws` and `https` to `wss`. A trailing `/api` segment is
/// removed so the socket is rooted at the service host rather than the
/// REST namespace, then `ws/chat/{conversation_id}/` is appended.
pub fn chat_endpoint(api_origin: &str, conversation_id: &str) -> Result<Url> {
    let mut url = Url::parse(api_origin.trim())?;

    let ws_scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(ChannelError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(ws_scheme)
        .map_err(|_| ChannelError::UnsupportedScheme(ws_scheme.to_string()))?;

    let path = url.path().trim_end_matches('/');
    let base = path.strip_suffix("/api").unwrap_or(path).to_string();
    url.set_path(&base);
    url.set_query(None);
    url.set_fragment(None);

    url.path_segments_mut()
        .map_err(|_| ChannelError::OriginNotABase)?
        .pop_if_empty()
        .extend(["ws", "chat", conversation_id, ""]);

    Ok(url)
}
