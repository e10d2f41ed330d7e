//! Outgoing message formatting (Telegram HTML parse mode)

/// Maximum characters the transport accepts in one message
pub const MESSAGE_LIMIT: usize = 4096;

const PRE_OPEN: &str = "<pre>";
const PRE_CLOSE: &str = "</pre>";

/// Operator-facing command list
pub const HELP_TEXT: &str = "<b>Commands</b>
/start - claim this bot
/output, /o - show the current screen
/enter, /e - press Enter
/kill - interrupt the program (Ctrl-C)
/restart - restart shell-bot
/help - this list

Any other text is typed into the program followed by Enter.
Photos, documents, audio and voice notes are saved and handed to the program when it supports files.";

/// Escape the three characters HTML parse mode treats specially
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Keep at most `limit` chars, dropping from the front
pub fn truncate_tail(text: &str, limit: usize) -> &str {
    let count = text.chars().count();
    if count <= limit {
        return text;
    }
    let skip = count - limit;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

/// Wrap screen content in a preformatted block that fits in one message
///
/// Escaping can grow the text, so the tail is trimmed until the escaped
/// block fits.
pub fn pre_block(content: &str) -> String {
    let budget = MESSAGE_LIMIT - PRE_OPEN.len() - PRE_CLOSE.len();
    let mut keep = content.chars().count().min(budget);
    loop {
        let escaped = escape_html(truncate_tail(content, keep));
        if escaped.chars().count() <= budget || keep == 0 {
            return format!("{PRE_OPEN}{escaped}{PRE_CLOSE}");
        }
        // Each escape adds at most four chars
        keep -= (escaped.chars().count() - budget).div_ceil(4).max(1).min(keep);
    }
}
