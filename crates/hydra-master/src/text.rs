//! Text helpers for Telegram rendering.

use hydra_core::types::{Chat, User};

/// Escape special characters for legacy Markdown.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escape special characters for MarkdownV2, which reserves
/// `_ * [ ] ( ) ~ ` > # + - = | { } . !`.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        if matches!(
            ch,
            '_' | '*'
                | '['
                | ']'
                | '('
                | ')'
                | '~'
                | '`'
                | '>'
                | '#'
                | '+'
                | '-'
                | '='
                | '|'
                | '{'
                | '}'
                | '.'
                | '!'
        ) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escape text destined for HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Remark wins over username for display.
pub fn display_name(user: &User) -> &str {
    if user.remark.is_empty() {
        &user.username
    } else {
        &user.remark
    }
}

/// Title line prefixed to messages landing in the admin's private chat or a
/// default topic, so the source is identifiable without a dedicated thread.
pub fn decorated_title(from: &User, chat: &Chat) -> String {
    if chat.kind == "private" {
        format!("👤 {}:", display_name(from))
    } else {
        format!("👥 {} [{}]:", display_name(from), chat.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_escapes_reserved() {
        assert_eq!(escape_markdown("a*b_c[d`e"), "a\\*b\\_c\\[d\\`e");
    }

    #[test]
    fn markdown_v2_escapes_punctuation() {
        assert_eq!(escape_markdown_v2("a.b!c-d"), "a\\.b\\!c\\-d");
    }

    #[test]
    fn html_escapes_markup() {
        assert_eq!(escape_html("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn remark_beats_username() {
        let user = User {
            id: "1".into(),
            username: "nick".into(),
            remark: "Best Friend".into(),
        };
        assert_eq!(display_name(&user), "Best Friend");

        let plain = User {
            id: "1".into(),
            username: "nick".into(),
            remark: String::new(),
        };
        assert_eq!(display_name(&plain), "nick");
    }

    #[test]
    fn titles_decorate_by_chat_kind() {
        let from = User {
            id: "1".into(),
            username: "alice".into(),
            remark: String::new(),
        };
        let private = Chat {
            id: "1".into(),
            kind: "private".into(),
            title: String::new(),
        };
        let group = Chat {
            id: "g".into(),
            kind: "group".into(),
            title: "Group G7".into(),
        };
        assert_eq!(decorated_title(&from, &private), "👤 alice:");
        assert_eq!(decorated_title(&from, &group), "👥 alice [Group G7]:");
    }
}
