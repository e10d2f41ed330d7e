//! Terminal control sequence stripping

/// Remove all terminal control sequences, keeping `\t`, `\n` and `\r`
///
/// Escape sequences go through `strip_ansi_escapes`, which drops C0
/// controls it does not execute, so tabs and line ends are split out first
/// and put back afterwards. Controls left over after that (stray C0 bytes, DEL,
/// C1 characters decoded from UTF-8) are dropped.
pub fn strip_control_sequences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for piece in raw.split_inclusive(['\t', '\n', '\r']) {
        let (body, kept) = match piece.char_indices().last() {
            Some((i, c @ ('\t' | '\n' | '\r'))) => (&piece[..i], Some(c)),
            _ => (piece, None),
        };
        let stripped = strip_ansi_escapes::strip(body.as_bytes());
        out.extend(
            String::from_utf8_lossy(&stripped)
                .chars()
                .filter(|c| !is_stripped_control(*c)),
        );
        out.extend(kept);
    }
    out
}

/// Whether a char is a control the stripper removes
pub fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{7f}'..='\u{9f}')
}

/// Split stripped text into right-trimmed lines, treating `\r` as a line end
pub fn clean_lines(stripped: &str) -> Vec<String> {
    stripped
        .split('\n')
        .map(|line| {
            // A bare carriage return redraws the line; keep the last redraw
            let line = line.trim_end_matches('\r');
            let line = line.rsplit('\r').next().unwrap_or(line);
            line.trim_end().to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_csi_colors() {
        assert_eq!(strip_control_sequences("\x1b[1;32mok\x1b[0m done"), "ok done");
    }

    #[test]
    fn test_strips_osc_title() {
        assert_eq!(strip_control_sequences("\x1b]0;my title\x07prompt"), "prompt");
        assert_eq!(strip_control_sequences("\x1b]8;;http://x\x1b\\link"), "link");
    }

    #[test]
    fn test_strips_charset_and_c1() {
        assert_eq!(strip_control_sequences("\x1b(Bplain\x1b[2Jtext"), "plaintext");
        assert_eq!(strip_control_sequences("a\u{85}b\u{9b}"), "ab");
    }

    #[test]
    fn test_escape_next_to_tab_is_stripped() {
        assert_eq!(strip_control_sequences("\x1b[1mname\x1b[0m\tvalue\r"), "name\tvalue\r");
    }

    #[test]
    fn test_keeps_tab_newline_cr() {
        assert_eq!(strip_control_sequences("a\tb\r\nc\x07"), "a\tb\r\nc");
    }

    #[test]
    fn test_keeps_unicode_text() {
        assert_eq!(strip_control_sequences("❯ héllo ─── ✻"), "❯ héllo ─── ✻");
    }

    #[test]
    fn test_clean_lines_handles_carriage_returns() {
        let lines = clean_lines("progress 10%\rprogress 100%  \r\nnext");
        assert_eq!(lines, vec!["progress 100%", "next"]);
    }

    proptest! {
        #[test]
        fn prop_no_control_bytes_survive(raw in "(\\PC|[\\x00-\\x1f\\x7f]|\u{1b}\\[[0-9;]{0,6}[A-Za-z]|\u{9b})*") {
            let stripped = strip_control_sequences(&raw);
            prop_assert!(!stripped.chars().any(is_stripped_control));
        }

        #[test]
        fn prop_plain_text_is_unchanged(raw in "[a-zA-Z0-9 \\t\\n.,:$>❯─│]*") {
            prop_assert_eq!(strip_control_sequences(&raw), raw);
        }
    }
}
