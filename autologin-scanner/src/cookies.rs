use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// One cookie as observed on a response.
///
/// Equality and hashing cover only the identity tuple
/// (name, value, domain, path, port). The remaining attributes are carried
/// along for reporting but never distinguish two records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub port: Option<u16>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl CookieRecord {
    pub fn new(name: &str, value: &str, domain: &str, path: &str, port: Option<u16>) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
            path: path.to_string(),
            port,
            secure: false,
            http_only: false,
        }
    }

    fn identity(&self) -> (&str, &str, &str, &str, Option<u16>) {
        (
            &self.name,
            &self.value,
            &self.domain,
            &self.path,
            self.port,
        )
    }

    /// Jar slot for this record: a later cookie with the same slot replaces
    /// an earlier one, the way a browser jar overwrites on re-issue.
    fn slot(&self) -> (&str, &str, &str, Option<u16>) {
        (&self.name, &self.domain, &self.path, self.port)
    }
}

impl PartialEq for CookieRecord {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for CookieRecord {}

impl Hash for CookieRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// A set of cookie records under identity-tuple equality.
///
/// Only sets originating from the same browsing context (one cookie jar
/// lineage) are meaningfully comparable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieSet {
    records: Vec<CookieRecord>,
}

impl CookieSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, replacing any record occupying the same jar slot.
    pub fn insert(&mut self, record: CookieRecord) {
        self.records.retain(|c| c.slot() != record.slot());
        self.records.push(record);
    }

    pub fn contains(&self, record: &CookieRecord) -> bool {
        self.records.iter().any(|c| c == record)
    }

    /// Pure set operation over identity tuples; ordering is irrelevant.
    pub fn is_subset_of(&self, other: &CookieSet) -> bool {
        self.records.iter().all(|c| other.contains(c))
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[CookieRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CookieRecord> {
        self.records
    }
}

impl FromIterator<CookieRecord> for CookieSet {
    fn from_iter<I: IntoIterator<Item = CookieRecord>>(iter: I) -> Self {
        let mut set = CookieSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

/// Verdict of comparing the cookie jar before and after a login submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVerdict {
    /// At least one new or changed cookie: the site issued session state.
    Success,
    /// No cookie changed, which means the credentials were rejected.
    BadAuth,
}

/// Success iff `final_set` is not a subset of `initial`, i.e. at least one
/// record in `final_set` has an identity tuple absent from `initial`.
///
/// A changed value on an existing cookie counts as a new record, because
/// `value` is part of the identity tuple.
pub fn verify(initial: &CookieSet, final_set: &CookieSet) -> AuthVerdict {
    if final_set.is_subset_of(initial) {
        AuthVerdict::BadAuth
    } else {
        AuthVerdict::Success
    }
}
