//! Database credentials in `user:password` form.

use std::fmt;

/// A user/password pair for the database probes.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Split `user:password` on the first colon.
    ///
    /// Never fails: a value without a colon is taken as the user name with an
    /// empty password, so passwords may themselves contain colons.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((user, password)) => Credentials::new(user, password),
            None => Credentials::new(raw, ""),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_password() {
        let creds = Credentials::parse("root:s3cret");
        assert_eq!(creds.user, "root");
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn test_parse_splits_on_first_colon() {
        let creds = Credentials::parse("sst:pa:ss:word");
        assert_eq!(creds.user, "sst");
        assert_eq!(creds.password, "pa:ss:word");
    }

    #[test]
    fn test_parse_without_colon_degrades_to_empty_password() {
        let creds = Credentials::parse("rootonly");
        assert_eq!(creds.user, "rootonly");
        assert_eq!(creds.password, "");
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::parse("root:hunter2"));
        assert!(rendered.contains("root"));
        assert!(!rendered.contains("hunter2"));
    }
}
