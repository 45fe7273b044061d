use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Possible errors to occur while reading account ids
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("An account id cannot be empty")]
    Empty,
    #[error("The account id `{0}` contains a comma")]
    ContainsComma(String),
    #[error("At least one linked account has to be specified")]
    NoLinkedAccounts,
}

/// The identifier of an AWS account
///
/// Account ids are kept as text, since the billing reports treat them as
/// opaque tokens and leading zeros are significant.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// The account id as it appears in billing reports
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccountId {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AccountError::Empty);
        }
        if s.contains(',') {
            return Err(AccountError::ContainsComma(s.to_owned()));
        }

        Ok(Self(s.to_owned()))
    }
}

impl Borrow<str> for AccountId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A non-empty list of linked accounts
///
/// Parsed from a comma separated list like `123,456`. Empty entries are
/// dropped, duplicates are kept only once, and the original order is preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkedAccounts(Vec<AccountId>);

impl LinkedAccounts {
    /// Creates a list of linked accounts from already parsed ids
    pub fn new(ids: impl IntoIterator<Item = AccountId>) -> Result<Self, AccountError> {
        let mut accounts = Vec::new();
        for id in ids {
            if !accounts.contains(&id) {
                accounts.push(id);
            }
        }

        match accounts.is_empty() {
            true => Err(AccountError::NoLinkedAccounts),
            false => Ok(Self(accounts)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`, a list of linked accounts cannot be constructed empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for LinkedAccounts {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ids = s
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(AccountId::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(ids)
    }
}

impl<'a> IntoIterator for &'a LinkedAccounts {
    type Item = &'a AccountId;
    type IntoIter = std::slice::Iter<'a, AccountId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(accounts: &LinkedAccounts) -> Vec<&str> {
        accounts.iter().map(AccountId::as_str).collect()
    }

    #[test]
    fn account_id_is_trimmed() {
        let id: AccountId = " 123456 ".parse().unwrap();
        assert_eq!(id.as_str(), "123456");
        assert_eq!(id.to_string(), "123456");
    }

    #[test]
    fn account_id_rejects_empty() {
        assert_eq!("  ".parse::<AccountId>(), Err(AccountError::Empty));
    }

    #[test]
    fn linked_accounts_from_list() {
        let accounts: LinkedAccounts = "123,456".parse().unwrap();
        assert_eq!(ids(&accounts), ["123", "456"]);
    }

    #[test]
    fn linked_accounts_drop_empty_entries_and_duplicates() {
        let accounts: LinkedAccounts = "123,,456, 123,".parse().unwrap();
        assert_eq!(ids(&accounts), ["123", "456"]);
        assert_eq!(accounts.len(), 2);
    }

    #[test]
    fn linked_accounts_cannot_be_empty() {
        assert_eq!("".parse::<LinkedAccounts>(), Err(AccountError::NoLinkedAccounts));
        assert_eq!(" , ,".parse::<LinkedAccounts>(), Err(AccountError::NoLinkedAccounts));
        assert_eq!(LinkedAccounts::new(Vec::new()), Err(AccountError::NoLinkedAccounts));
    }
}
