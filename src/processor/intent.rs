//! Gift intent extraction from free-form message text
//!
//! A mention is `<@ID>` with ID made of `[A-Z0-9]+`. Every marker occurrence
//! (non-overlapping, left to right) counts one gift for the nearest mention
//! that starts before it. Markers before the first mention, and markers whose
//! nearest mention is the author, count for nobody.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub user_id: String,
    /// Byte offset of the opening `<`.
    pub start: usize,
}

pub fn find_mentions(text: &str) -> Vec<Mention> {
    let bytes = text.as_bytes();
    let mut mentions = Vec::new();

    for (start, _) in text.match_indices("<@") {
        let id_start = start + 2;
        let id_len = bytes[id_start..]
            .iter()
            .take_while(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            .count();
        let id_end = id_start + id_len;
        if id_len > 0 && bytes.get(id_end) == Some(&b'>') {
            mentions.push(Mention {
                user_id: text[id_start..id_end].to_string(),
                start,
            });
        }
    }
    mentions
}

pub fn find_markers(text: &str, marker: &str) -> Vec<usize> {
    if marker.is_empty() {
        return Vec::new();
    }
    text.match_indices(marker).map(|(at, _)| at).collect()
}

/// Per-recipient gift counts in order of first attribution.
pub fn extract_gifts(text: &str, marker: &str, actor_id: &str) -> Vec<(String, i64)> {
    let mentions = find_mentions(text);
    let mut gifts: Vec<(String, i64)> = Vec::new();
    if mentions.is_empty() {
        return gifts;
    }

    let mut nearest: Option<&Mention> = None;
    let mut next_mention = 0;

    for at in find_markers(text, marker) {
        while next_mention < mentions.len() && mentions[next_mention].start < at {
            nearest = Some(&mentions[next_mention]);
            next_mention += 1;
        }
        let recipient = match nearest {
            Some(m) if m.user_id != actor_id => &m.user_id,
            _ => continue,
        };
        match gifts.iter_mut().find(|(id, _)| id == recipient) {
            Some((_, count)) => *count += 1,
            None => gifts.push((recipient.clone(), 1)),
        }
    }
    gifts
}
