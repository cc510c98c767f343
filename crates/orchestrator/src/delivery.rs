//! Final reply delivery.

use guildpilot_core::error::PlatformError;
use guildpilot_core::platform::{ChatSurface, PostedMessage};
use tracing::debug;

/// Split `text` into chunks of at most `limit` characters, breaking at line
/// boundaries where possible.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count();
        let needed = if current.is_empty() { line_len } else { current_len + 1 + line_len };

        if needed <= limit {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len = needed;
            continue;
        }

        let flushed = std::mem::take(&mut current);
        if !flushed.trim().is_empty() {
            chunks.push(flushed);
        }
        current_len = 0;

        if line_len <= limit {
            current.push_str(line);
            current_len = line_len;
        } else {
            let chars: Vec<char> = line.chars().collect();
            let mut pieces = chars.chunks(limit).map(|c| c.iter().collect::<String>()).peekable();
            while let Some(piece) = pieces.next() {
                if pieces.peek().is_some() {
                    chunks.push(piece);
                } else {
                    current_len = piece.chars().count();
                    current = piece;
                }
            }
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Send the reply, redirected to `redirect` when the origin channel was
/// replaced during the run.
pub async fn deliver(
    surface: &dyn ChatSurface,
    text: &str,
    redirect: Option<&str>,
    limit: usize,
) -> Result<Vec<PostedMessage>, PlatformError> {
    let chunks = split_message(text, limit);
    let mut posted = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let message = match redirect {
            Some(channel_id) => surface.send_to_channel(channel_id, chunk).await?,
            None => surface.reply(chunk).await?,
        };
        posted.push(message);
    }
    debug!(
        chunks = posted.len(),
        redirected = redirect.is_some(),
        "Reply delivered"
    );
    Ok(posted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("Done!", 2000), vec!["Done!"]);
    }

    #[test]
    fn splits_on_line_boundaries() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_message(text, 9), vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn long_lines_are_hard_split() {
        let chunks = split_message(&"x".repeat(25), 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), "x".repeat(25));
    }

    #[test]
    fn every_chunk_respects_limit() {
        let text = (0..200)
            .map(|i| format!("line {i} with some words in it"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_message(&text, 100);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(split_message("  \n ", 2000).is_empty());
    }
}
