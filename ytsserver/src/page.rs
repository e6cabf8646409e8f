//! Player page rendering.

use crate::session::SessionMetadata;

const PLAYER_TEMPLATE: &str = include_str!("player.html");

const IDLE_TITLE: &str = "Nothing playing";

/// Renders the player page for a session snapshot.
///
/// The page shows the metadata as of render time and polls itself every
/// `refresh_secs` to pick up track changes.
pub fn render_player_page(
    server_name: &str,
    metadata: Option<&SessionMetadata>,
    refresh_secs: u64,
) -> String {
    let (title, artist, cover) = match metadata {
        Some(meta) => (
            escape_html(&meta.title),
            meta.artist.as_deref().map(escape_html).unwrap_or_default(),
            meta.thumbnail
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(|t| format!(r#"<img id="cover" src="{}" alt="">"#, escape_html(t)))
                .unwrap_or_default(),
        ),
        None => (IDLE_TITLE.to_string(), String::new(), String::new()),
    };

    PLAYER_TEMPLATE
        .replace("{{server_name}}", &escape_html(server_name))
        .replace("{{cover}}", &cover)
        .replace("{{title}}", &title)
        .replace("{{artist}}", &artist)
        .replace("{{refresh_ms}}", &(refresh_secs.max(1) * 1000).to_string())
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_page_shows_session_metadata() {
        let meta = SessionMetadata {
            title: "Song <A>".into(),
            artist: Some("Band".into()),
            thumbnail: Some("https://img.example/a.jpg".into()),
        };
        let html = render_player_page("YTStreamer", Some(&meta), 30);

        assert!(html.contains("<h1>Song &lt;A&gt;</h1>"));
        assert!(html.contains("<h2>Band</h2>"));
        assert!(html.contains(r#"src="https://img.example/a.jpg""#));
        assert!(html.contains(r#"src="/stream.mp3""#));
        assert!(html.contains("/api/"));
        assert!(html.contains("30000"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_idle_page() {
        let html = render_player_page("YTStreamer", None, 5);
        assert!(html.contains(IDLE_TITLE));
        assert!(!html.contains(r#"id="cover""#));
    }
}
