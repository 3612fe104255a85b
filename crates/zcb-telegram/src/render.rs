//! Post → Telegram HTML + inline keyboard.

use std::sync::OnceLock;

use regex::Regex;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;
use url::Url;

use zcb_core::domain::{MeetingCard, Post, PostButton};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("valid regex"))
}

/// Convert the markdown the bridge emits (headers, inline code, links) to
/// Telegram HTML.
pub fn markdown_to_html(input: &str) -> String {
    let (text, codes) = extract_inline_codes(input);
    let text = escape_html(&text);

    let mut text = text
        .split('\n')
        .map(convert_header_line)
        .collect::<Vec<_>>()
        .join("\n");

    text = link_re()
        .replace_all(&text, r#"<a href="$2">$1</a>"#)
        .to_string();

    for (i, code) in codes.iter().enumerate() {
        text = text.replace(
            &format!("\0INLINECODE{i}\0"),
            &format!("<code>{}</code>", escape_html(code)),
        );
    }
    text
}

fn extract_inline_codes(input: &str) -> (String, Vec<String>) {
    let mut codes = Vec::new();
    let mut out = String::new();

    let mut i = 0usize;
    while let Some(rel) = input[i..].find('`') {
        let start = i + rel;
        out.push_str(&input[i..start]);

        let content_start = start + 1;
        let Some(end_rel) = input[content_start..].find('`') else {
            out.push_str(&input[start..]);
            return (out, codes);
        };
        let end = content_start + end_rel;
        out.push_str(&format!("\0INLINECODE{}\0", codes.len()));
        codes.push(input[content_start..end].to_string());
        i = end + 1;
    }

    out.push_str(&input[i..]);
    (out, codes)
}

fn convert_header_line(line: &str) -> String {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return line.to_string();
    }
    match line[hashes..].strip_prefix(' ') {
        Some(rest) => format!("<b>{rest}</b>"),
        None => line.to_string(),
    }
}

fn meeting_card_html(card: &MeetingCard) -> String {
    let mut out = format!(
        "<b>{}</b>\nMeeting ID: <a href=\"{}\">{}</a>",
        escape_html(&card.topic),
        escape_html(&card.link),
        card.meeting_id
    );
    if card.personal {
        out.push_str(" (Personal Meeting ID)");
    }
    out.push_str(&format!(
        "\nStarted by @{} via {}",
        escape_html(&card.creator_username),
        escape_html(&card.provider)
    ));
    out
}

/// Telegram message body for a post.
pub fn post_html(post: &Post) -> String {
    let mut html = markdown_to_html(&post.message);
    if let Some(card) = &post.meeting {
        html.push_str("\n\n");
        html.push_str(&meeting_card_html(card));
    }
    html
}

/// One button per row. URL buttons with an unparseable URL are dropped.
pub fn keyboard(post: &Post) -> Option<InlineKeyboardMarkup> {
    let rows: Vec<Vec<InlineKeyboardButton>> = post
        .buttons
        .iter()
        .filter_map(|button| match button {
            PostButton::Link { label, url } => match Url::parse(url) {
                Ok(url) => Some(InlineKeyboardButton::url(label.clone(), url)),
                Err(e) => {
                    warn!(url = %url, error = %e, "dropping button with invalid url");
                    None
                }
            },
            PostButton::Action { label, action } => {
                Some(InlineKeyboardButton::callback(label.clone(), action.encode()))
            }
        })
        .map(|b| vec![b])
        .collect();

    if rows.is_empty() {
        None
    } else {
        Some(InlineKeyboardMarkup::new(rows))
    }
}
