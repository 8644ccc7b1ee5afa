#![forbid(unsafe_code)]

//! HTML documents served by the backend and the bot heuristic that decides
//! between a preview document and a redirect.

use crate::videos::{Video, watch_url};

/// User-agent fragments that mark a caller as a link-preview crawler.
const BOT_MARKERS: [&str; 5] = ["bot", "crawl", "spider", "slurp", "facebookexternalhit"];

pub fn is_bot(user_agent: &str) -> bool {
    let user_agent = user_agent.to_ascii_lowercase();
    BOT_MARKERS
        .iter()
        .any(|marker| user_agent.contains(marker))
}

pub fn landing_page() -> String {
    "<!doctype html>\n\
     <html lang=\"en\">\n\
     <head><meta charset=\"utf-8\"><title>shuffletube</title></head>\n\
     <body>\n\
     <h1>shuffletube</h1>\n\
     <p><a href=\"/new\">Pick a random video</a></p>\n\
     </body>\n\
     </html>\n"
        .to_string()
}

/// Page shown after a share link is created and resolved. The absolute URL is
/// derived by the caller from the request host.
pub fn share_page(share_url: &str) -> String {
    let escaped = escape_html(share_url);
    format!(
        "<!doctype html>\n\
         <html lang=\"en\">\n\
         <head><meta charset=\"utf-8\"><title>shuffletube</title></head>\n\
         <body>\n\
         <p>Your pick is locked in.</p>\n\
         <p>Share this link: <a href=\"{escaped}\">{escaped}</a></p>\n\
         </body>\n\
         </html>\n"
    )
}

/// Social-preview document for crawlers: Open Graph metadata for the frozen
/// video plus a plain link as a fallback for anyone loading it by hand.
pub fn preview_document(video: &Video) -> String {
    let title = escape_html(&video.snippet.title);
    let description = escape_html(&video.snippet.description);
    let thumbnail = escape_html(&video.snippet.thumbnails.high.url);
    let url = escape_html(&watch_url(&video.id.video_id));
    format!(
        "<!doctype html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <meta property=\"og:title\" content=\"{title}\">\n\
         <meta property=\"og:description\" content=\"{description}\">\n\
         <meta property=\"og:image\" content=\"{thumbnail}\">\n\
         <meta property=\"og:url\" content=\"{url}\">\n\
         <title>{title}</title>\n\
         </head>\n\
         <body>\n\
         <p>Redirecting to <a href=\"{url}\">{title}</a></p>\n\
         </body>\n\
         </html>\n"
    )
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::videos::sample_video;

    #[test]
    fn known_crawlers_are_bots() {
        assert!(is_bot(
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"
        ));
        assert!(is_bot("facebookexternalhit/1.1"));
        assert!(is_bot("Mozilla/5.0 (compatible; Yahoo! Slurp)"));
        assert!(is_bot("SomeSpider/0.1"));
        assert!(is_bot("WebCrawler"));
    }

    #[test]
    fn bot_match_is_case_insensitive() {
        assert!(is_bot("GoogleBOT"));
        assert!(is_bot("FACEBOOKEXTERNALHIT"));
    }

    #[test]
    fn browsers_are_not_bots() {
        assert!(!is_bot(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36"
        ));
        assert!(!is_bot(""));
    }

    #[test]
    fn landing_page_links_to_new() {
        assert!(landing_page().contains("href=\"/new\""));
    }

    #[test]
    fn share_page_embeds_url() {
        let page = share_page("http://example.com/share/abc");
        assert!(page.contains("http://example.com/share/abc"));
    }

    #[test]
    fn preview_document_carries_og_metadata() {
        let video = sample_video("dQw4");
        let page = preview_document(&video);
        assert!(page.contains("og:title"));
        assert!(page.contains("og:description"));
        assert!(page.contains(&video.snippet.thumbnails.high.url));
        assert!(page.contains("https://www.youtube.com/watch?v=dQw4"));
    }

    #[test]
    fn preview_document_escapes_markup() {
        let mut video = sample_video("esc");
        video.snippet.title = "<b>\"Tricky\" & bold</b>".into();
        let page = preview_document(&video);
        assert!(page.contains("&lt;b&gt;&quot;Tricky&quot; &amp; bold&lt;/b&gt;"));
        assert!(!page.contains("<b>"));
    }

    #[test]
    fn escape_html_handles_every_special_char() {
        assert_eq!(escape_html("a&b<c>d\"e'f"), "a&amp;b&lt;c&gt;d&quot;e&#39;f");
        assert_eq!(escape_html("plain"), "plain");
    }
}
