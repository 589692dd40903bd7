use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};

/// Edit a Telegram message, trying Markdown first then falling back to plain
/// text when the reply is not valid Telegram markup.
pub async fn safe_edit(bot: &Bot, chat_id: ChatId, msg_id: MessageId, text: &str) {
    #[allow(deprecated)]
    let md_result = bot
        .edit_message_text(chat_id, msg_id, text)
        .parse_mode(ParseMode::Markdown)
        .await;
    if md_result.is_err() {
        let _ = bot.edit_message_text(chat_id, msg_id, text).await;
    }
}

/// Send a message with the same Markdown-then-plain fallback as [`safe_edit`].
pub async fn safe_send(bot: &Bot, chat_id: ChatId, text: &str) {
    #[allow(deprecated)]
    let md_result = bot
        .send_message(chat_id, text)
        .parse_mode(ParseMode::Markdown)
        .await;
    if md_result.is_err() {
        let _ = bot.send_message(chat_id, text).await;
    }
}

/// Find the largest char-boundary index <= `pos` in `s`.
fn floor_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut i = pos;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split a reply into chunks that fit Telegram's message length limit,
/// preferring newline then space boundaries.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Find a safe char boundary to slice at
        let safe_end = floor_char_boundary(remaining, max_len);
        let search_zone = &remaining[..safe_end];

        let split_at = search_zone
            .rfind('\n')
            .unwrap_or_else(|| search_zone.rfind(' ').unwrap_or(safe_end));

        // Avoid zero-length splits
        let split_at = if split_at == 0 { safe_end } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(split_message("hello", 4096), vec!["hello".to_string()]);
    }

    #[test]
    fn splits_on_newlines_before_the_limit() {
        let text = "first line\nsecond line\nthird line";
        let chunks = split_message(text, 15);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0], "first line");
        for chunk in &chunks {
            assert!(chunk.len() <= 15);
        }
    }

    #[test]
    fn never_splits_inside_a_multibyte_char() {
        let text = "éééééééééé"; // 2 bytes per char
        for chunk in split_message(text, 7) {
            assert!(chunk.len() <= 7);
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn reassembled_chunks_preserve_all_words() {
        let text = "word ".repeat(2000);
        let chunks = split_message(&text, 4096);
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        assert_eq!(rejoined.len(), 2000);
    }
}
