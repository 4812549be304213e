//! Message batching under a hard per-message size limit.
//!
//! Sections are packed greedily, in order, behind a header naming the
//! domain. When the next section does not fit, the current message is closed
//! and a new one starts with a short continuation header. A section that
//! cannot fit even in a fresh message goes out alone, cut down and labeled
//! with [`TRUNCATION_MARKER`].
//!
//! Lengths are counted in `char`s, which is how the webhook transport counts
//! its 2000-character ceiling.

use serde::Serialize;

/// Characters kept free below the limit when cutting an oversized section.
pub const TRUNCATION_HEADROOM: usize = 50;

/// Appended to a section that was cut to fit.
pub const TRUNCATION_MARKER: &str = "\n(Section truncated)";

/// Where a message sits in a domain's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    First,
    Continuation,
}

/// A bounded-length message ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub index: usize,
    pub position: Position,
    pub text: String,
}

impl Message {
    /// Length in characters.
    pub fn len(&self) -> usize {
        char_len(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Packs rendered sections into messages no longer than `limit`.
#[derive(Debug, Clone)]
pub struct Batcher {
    header: String,
    continuation: String,
    limit: usize,
}

impl Batcher {
    pub fn new(header: impl Into<String>, continuation: impl Into<String>, limit: usize) -> Self {
        Self {
            header: header.into(),
            continuation: continuation.into(),
            limit,
        }
    }

    /// Batcher with the standard headers for a domain.
    pub fn for_domain(domain: &str, limit: usize) -> Self {
        Self::new(
            format!("**Changes detected for {domain}:**\n"),
            format!("(cont.) {domain} changes:\n"),
            limit,
        )
    }

    /// Pack sections in order. No sections, no messages.
    pub fn pack<S: AsRef<str>>(&self, sections: &[S]) -> Vec<Message> {
        sections
            .iter()
            .fold(Packer::start(self), |packer, section| {
                packer.push(section.as_ref())
            })
            .finish()
    }
}

/// Fold state: completed messages plus the message being filled.
struct Packer<'a> {
    batcher: &'a Batcher,
    done: Vec<String>,
    buffer: String,
    buffer_len: usize,
    header_len: usize,
}

impl<'a> Packer<'a> {
    fn start(batcher: &'a Batcher) -> Self {
        let header_len = char_len(&batcher.header);
        Self {
            batcher,
            done: Vec::new(),
            buffer: batcher.header.clone(),
            buffer_len: header_len,
            header_len,
        }
    }

    fn has_content(&self) -> bool {
        self.buffer_len > self.header_len
    }

    fn fits(&self, len: usize) -> bool {
        self.buffer_len + len <= self.batcher.limit
    }

    fn push(mut self, section: &str) -> Self {
        let len = char_len(section);
        if self.fits(len) {
            return self.append(section, len);
        }

        if self.has_content() {
            self = self.flush();
            if self.fits(len) {
                return self.append(section, len);
            }
        }

        let text = self.truncated(section);
        self.done.push(text);
        self.restart()
    }

    fn append(mut self, section: &str, len: usize) -> Self {
        self.buffer.push_str(section);
        self.buffer_len += len;
        self
    }

    fn flush(mut self) -> Self {
        let full = std::mem::take(&mut self.buffer);
        self.done.push(full);
        self.restart()
    }

    fn restart(mut self) -> Self {
        self.buffer = self.batcher.continuation.clone();
        self.header_len = char_len(&self.buffer);
        self.buffer_len = self.header_len;
        self
    }

    /// The pending header, as much of the section as the budget allows, and the marker.
    fn truncated(&self, section: &str) -> String {
        let limit = self.batcher.limit;
        let budget = limit.saturating_sub(TRUNCATION_HEADROOM + self.header_len);
        let kept = cut_at_line(section, budget);

        let mut text = String::with_capacity(self.buffer.len() + kept.len() + TRUNCATION_MARKER.len());
        text.push_str(&self.buffer);
        text.push_str(kept);
        text.push_str(TRUNCATION_MARKER);
        clamp(text, limit)
    }

    fn finish(self) -> Vec<Message> {
        let mut done = self.done;
        if self.buffer_len > self.header_len {
            done.push(self.buffer);
        }

        done.into_iter()
            .enumerate()
            .map(|(index, text)| Message {
                index,
                position: if index == 0 {
                    Position::First
                } else {
                    Position::Continuation
                },
                text,
            })
            .collect()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset just past the first `n` chars.
fn char_boundary(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

/// First `budget` chars, backed off to the last full line when there is one.
fn cut_at_line(section: &str, budget: usize) -> &str {
    let head = &section[..char_boundary(section, budget)];
    if head.len() == section.len() {
        return head;
    }
    match head.rfind('\n') {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    }
}

fn clamp(mut text: String, limit: usize) -> String {
    let end = char_boundary(&text, limit);
    text.truncate(end);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(c: char, len: usize) -> String {
        std::iter::repeat(c).take(len).collect()
    }

    fn header(len: usize) -> String {
        let mut h = block('H', len - 1);
        h.push('\n');
        h
    }

    #[test]
    fn test_three_then_two() {
        let batcher = Batcher::new(header(30), "(cont.) acme changes:\n", 1950);
        let sections: Vec<String> = "abcde".chars().map(|c| block(c, 500)).collect();

        let messages = batcher.pack(&sections);
        assert_eq!(messages.len(), 2);

        assert_eq!(messages[0].len(), 30 + 500 * 3);
        assert_eq!(messages[0].position, Position::First);
        assert!(messages[0].text.ends_with(&sections[2]));

        assert!(messages[1].text.starts_with("(cont.) acme changes:\n"));
        assert_eq!(messages[1].position, Position::Continuation);
        assert!(messages[1].text.contains(&sections[3]));
        assert!(messages[1].text.ends_with(&sections[4]));
    }

    #[test]
    fn test_single_oversized_section_is_truncated() {
        let batcher = Batcher::for_domain("acme", 1950);
        let section = block('x', 3000);

        let messages = batcher.pack(&[section]);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].len() <= 1950);
        assert!(messages[0].text.contains("(Section truncated)"));
        assert!(messages[0].text.starts_with("**Changes detected for acme:**\n"));
    }

    #[test]
    fn test_oversized_section_between_normal_ones() {
        let batcher = Batcher::for_domain("acme", 400);
        let small = "**New pages (1):**\nhttps://a.org/1\n".to_string();
        let big: String = (0..100)
            .map(|i| format!("https://a.org/page/{i}\n"))
            .collect();
        let tail = "**Updated repositories (1):**\na/site\n".to_string();

        let messages = batcher.pack(&[small.clone(), big, tail.clone()]);
        assert_eq!(messages.len(), 3);
        assert!(messages[0].text.ends_with(&small));
        assert!(messages[1].text.starts_with("(cont.) acme changes:\n"));
        assert!(messages[1].text.ends_with(TRUNCATION_MARKER));
        // Cut lands on a line boundary
        assert!(messages[1].text.contains("https://a.org/page/0\n"));
        assert!(!messages[1].text.contains("https://a.org/page/99"));
        assert!(messages[2].text.ends_with(&tail));
        assert!(messages.iter().all(|m| m.len() <= 400));
    }

    #[test]
    fn test_no_sections_no_messages() {
        let batcher = Batcher::for_domain("acme", 1950);
        let none: [&str; 0] = [];
        assert!(batcher.pack(&none).is_empty());
    }

    #[test]
    fn test_no_trailing_empty_message() {
        let batcher = Batcher::for_domain("acme", 200);
        let messages = batcher.pack(&[block('z', 500)]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].index, 0);
    }

    #[test]
    fn test_size_bound_for_any_limit() {
        let sections = vec![
            block('a', 5),
            block('b', 120),
            block('c', 700),
            "line one\nline two\nline three\n".to_string(),
            block('é', 2500),
            block('d', 40),
        ];

        for limit in [1, 10, 40, 60, 100, 333, 1000, 1950, 5000] {
            let batcher = Batcher::for_domain("example.org", limit);
            for message in batcher.pack(&sections) {
                assert!(
                    message.len() <= limit,
                    "limit {limit}: message of {} chars",
                    message.len()
                );
            }
        }
    }

    #[test]
    fn test_completeness_and_order() {
        let batcher = Batcher::for_domain("acme", 300);
        let sections: Vec<String> = (0..12)
            .map(|i| format!("**Section {i} (1):**\n{}\n", block('q', 20 + i * 30)))
            .collect();

        let messages = batcher.pack(&sections);
        let mut cursor = 0;
        for section in &sections {
            let found = messages[cursor..]
                .iter()
                .position(|m| m.text.contains(section.as_str()))
                .map(|offset| cursor + offset);
            match found {
                Some(idx) => cursor = idx,
                None => {
                    let first_line = section.lines().next().unwrap();
                    let idx = messages[cursor..]
                        .iter()
                        .position(|m| {
                            m.text.contains(first_line) && m.text.ends_with(TRUNCATION_MARKER)
                        })
                        .map(|offset| cursor + offset)
                        .expect("section neither verbatim nor marked truncated");
                    cursor = idx;
                }
            }
        }

        for (i, message) in messages.iter().enumerate() {
            assert_eq!(message.index, i);
        }
    }

    #[test]
    fn test_multibyte_lengths_counted_in_chars() {
        let batcher = Batcher::new("H\n", "C\n", 12);
        let messages = batcher.pack(&["ééééé", "ééééé"]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].len(), 12);
    }

    #[test]
    fn test_cut_at_line() {
        assert_eq!(cut_at_line("abc\ndef\nghi", 9), "abc\ndef");
        assert_eq!(cut_at_line("abcdefghi", 4), "abcd");
        assert_eq!(cut_at_line("short", 10), "short");
    }
}
