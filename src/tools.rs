//! Some tools and enhancements to the used libraries, there should be
//! no references to Context and other "larger" entities here.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// Creates a random alphanumeric string of `len` characters.
pub(crate) fn create_token(len: usize) -> String {
    // ThreadRng implements CryptoRng trait and is supposed to be cryptographically secure.
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Converts all line endings to CRLF.
pub(crate) fn to_crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}
