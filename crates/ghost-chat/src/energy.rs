//! Lexical "energy" of a message.
//!
//! A cheap tone signal independent of the embedding: long, shouty, excited
//! messages score high, short calm ones score low. Replies are steered
//! towards memories with a similar energy to the query.

/// Score a message: words + 2 * `!` + `?` + uppercase letters.
///
/// Accepts `&str`, `String` or raw bytes. Bytes are decoded as UTF-8, with
/// invalid sequences replaced, so the function is total.
pub fn energy_score(text: impl AsRef<[u8]>) -> usize {
    let text = String::from_utf8_lossy(text.as_ref());

    let words = text.split_whitespace().count();
    let (exclamations, questions, uppercase) =
        text.chars().fold((0, 0, 0), |(ex, q, up), c| match c {
            '!' => (ex + 1, q, up),
            '?' => (ex, q + 1, up),
            c if c.is_uppercase() => (ex, q, up + 1),
            _ => (ex, q, up),
        });

    words + 2 * exclamations + questions + uppercase
}
