use url::Url;

/// The account the jobs act on behalf of
///
/// Authentication is handled by the collaborators; the jobs only need to know
/// who "we" are, e.g. to refuse removing ourselves from a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// User id on the server
    pub user_id: String,
    /// Base url of the server
    pub server: Url,
}

impl Account {
    pub fn new(user_id: impl Into<String>, server: Url) -> Self {
        Self {
            user_id: user_id.into(),
            server,
        }
    }

    /// Display form used in log messages, e.g. `alice@cloud.example.com`
    pub fn display_name(&self) -> String {
        match self.server.host_str() {
            Some(host) => format!("{}@{}", self.user_id, host),
            None => self.user_id.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_name() {
        let account = Account::new("alice", Url::parse("https://cloud.example.com").unwrap());
        assert_eq!(account.display_name(), "alice@cloud.example.com");
    }
}
