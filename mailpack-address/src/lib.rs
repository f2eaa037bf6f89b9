//! Recipient address tools: parsing, normalizing and de-duplicating the
//! addresses a draft is sent to.

#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::correctness,
    missing_debug_implementations,
    missing_docs,
    clippy::all,
    clippy::wildcard_imports,
    clippy::needless_borrow,
    clippy::cast_lossless,
    clippy::unused_async,
    clippy::explicit_iter_loop,
    clippy::explicit_into_iter_loop,
    clippy::cloned_instead_of_copied
)]
#![cfg_attr(not(test), warn(clippy::indexing_slicing))]
#![allow(clippy::match_bool, clippy::bool_assert_comparison)]

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;

use anyhow::bail;
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

/// Valid recipient address, normalized.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactAddress(String);

impl Deref for ContactAddress {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ContactAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ContactAddress {
    /// Constructs a new contact address from string,
    /// stripping a display name, normalizing and validating it.
    pub fn new(s: &str) -> Result<Self> {
        let addr = addr_normalize(&strip_display_name(s));
        if !may_be_valid_addr(&addr) {
            bail!("invalid address {:?}", s);
        }
        Ok(Self(addr))
    }

    /// Returns the domain part of the address.
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }
}

/// Returns the bare address of `Name <addr>` forms, or the input otherwise.
pub fn strip_display_name(addr: &str) -> String {
    static ADDR_WITH_NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new("^(.*)<(.*)>\\s*$").unwrap());
    match ADDR_WITH_NAME_REGEX.captures(addr) {
        Some(captures) => captures
            .get(2)
            .map_or_else(String::new, |m| m.as_str().to_string()),
        None => addr.to_string(),
    }
}

/// Returns false if addr is an invalid address, otherwise true.
pub fn may_be_valid_addr(addr: &str) -> bool {
    EmailAddress::new(addr).is_ok()
}

/// Returns address lowercased,
/// with whitespace trimmed and `mailto:` prefix removed.
pub fn addr_normalize(addr: &str) -> String {
    let norm = addr.trim().to_lowercase();

    if norm.starts_with("mailto:") {
        norm.get(7..).unwrap_or(&norm).to_string()
    } else {
        norm
    }
}

/// Compares two email addresses, normalizing them beforehand.
pub fn addr_cmp(addr1: &str, addr2: &str) -> bool {
    addr_normalize(addr1) == addr_normalize(addr2)
}

/// Union of the To, Cc and Bcc lists of a draft.
///
/// Every address appears once, in order of first occurrence.
/// Strings that do not parse are kept in `invalid` together with the reason.
#[derive(Debug, Default)]
pub struct RecipientSet {
    /// Unique valid addresses.
    pub valid: Vec<ContactAddress>,

    /// Raw input and parse error of every rejected entry.
    pub invalid: Vec<(String, anyhow::Error)>,
}

impl RecipientSet {
    /// Collects the addresses of all given lists.
    pub fn collect<'a, I>(lists: I) -> Self
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        let mut seen = BTreeSet::new();
        let mut set = Self::default();
        for raw in lists.into_iter().flatten() {
            match ContactAddress::new(raw) {
                Ok(addr) => {
                    if seen.insert(addr.clone()) {
                        set.valid.push(addr);
                    }
                }
                Err(err) => set.invalid.push((raw.clone(), err)),
            }
        }
        set
    }

    /// Returns true if no valid address was found.
    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }
}

///
/// Represents an email address, right now just the `name@domain` portion.
///
/// # Example
///
/// ```
/// use mailpack_address::EmailAddress;
/// let email = match EmailAddress::new("someone@example.com") {
///     Ok(addr) => addr,
///     Err(e) => panic!("Error parsing address, error was {}", e),
/// };
/// assert_eq!(&email.local, "someone");
/// assert_eq!(&email.domain, "example.com");
/// assert_eq!(email.to_string(), "someone@example.com");
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EmailAddress {
    /// Local part of the email address.
    pub local: String,

    /// Email address domain.
    pub domain: String,
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl EmailAddress {
    /// Performs a dead-simple parse of an email address.
    pub fn new(input: &str) -> Result<EmailAddress> {
        if input.is_empty() {
            bail!("empty string is not valid");
        }
        if input
            .chars()
            .any(|c| c.is_whitespace() || c == '<' || c == '>')
        {
            bail!("Email {:?} must not contain whitespaces, '>' or '<'", input);
        }

        match input.rsplit_once('@') {
            Some((local, domain)) => {
                if local.is_empty() {
                    bail!("empty string is not valid for local part in {:?}", input);
                }
                if domain.is_empty() {
                    bail!("missing domain after '@' in {:?}", input);
                }
                if domain.ends_with('.') {
                    bail!("Domain {domain:?} should not contain the dot in the end");
                }
                Ok(EmailAddress {
                    local: local.to_string(),
                    domain: domain.to_string(),
                })
            }
            None => bail!("Email {:?} must contain '@' character", input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_address() -> Result<()> {
        let addr = ContactAddress::new(" Bob@Example.ORG ")?;
        assert_eq!(addr.as_ref(), "bob@example.org");
        assert_eq!(addr.domain(), "example.org");

        let addr = ContactAddress::new("Bob Builder <bob@example.org>")?;
        assert_eq!(addr.as_ref(), "bob@example.org");

        assert!(ContactAddress::new("<> foobar").is_err());
        assert!(ContactAddress::new("").is_err());
        Ok(())
    }

    #[test]
    fn test_addr_cmp() {
        assert!(addr_cmp("mailto:alice@example.org", "ALICE@example.org"));
        assert!(!addr_cmp("alice@example.org", "alice@example.com"));
    }

    #[test]
    fn test_recipient_set_dedups_across_lists() {
        let to = vec!["alice@example.org".to_string(), "bob@example.net".to_string()];
        let cc = vec!["Alice@Example.org".to_string(), "not an address".to_string()];
        let bcc = vec!["carol@example.com".to_string(), "bob@example.net".to_string()];

        let set = RecipientSet::collect([to.as_slice(), cc.as_slice(), bcc.as_slice()]);
        let valid: Vec<&str> = set.valid.iter().map(|a| a.as_ref()).collect();
        assert_eq!(
            valid,
            vec!["alice@example.org", "bob@example.net", "carol@example.com"]
        );
        assert_eq!(set.invalid.len(), 1);
        assert_eq!(set.invalid[0].0, "not an address");
        assert!(!set.is_empty());
    }

    #[test]
    fn test_emailaddress_parse() {
        assert_eq!(EmailAddress::new("").is_ok(), false);
        assert_eq!(
            EmailAddress::new("user@domain.tld").unwrap(),
            EmailAddress {
                local: "user".into(),
                domain: "domain.tld".into(),
            }
        );
        assert_eq!(EmailAddress::new("uuu").is_ok(), false);
        assert!(EmailAddress::new("tt.dd@uu").is_ok());
        assert!(EmailAddress::new("u@d.").is_err());
        assert_eq!(EmailAddress::new("@d.tt").is_ok(), false);
        assert_eq!(EmailAddress::new("u@").is_ok(), false);
    }
}
