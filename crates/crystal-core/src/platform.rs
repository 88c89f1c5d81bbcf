use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of crawled platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Weibo,
    Zhihu,
    Xueqiu,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Weibo, Platform::Zhihu, Platform::Xueqiu];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Weibo => "weibo",
            Platform::Zhihu => "zhihu",
            Platform::Xueqiu => "xueqiu",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weibo" => Ok(Platform::Weibo),
            "zhihu" => Ok(Platform::Zhihu),
            "xueqiu" => Ok(Platform::Xueqiu),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// A crawl trigger's platform selection: everything, or a named subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformSelector {
    All,
    Named(Vec<Platform>),
}

impl PlatformSelector {
    /// The concrete platform list, in a stable order with duplicates removed.
    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        match self {
            PlatformSelector::All => Platform::ALL.to_vec(),
            PlatformSelector::Named(named) => {
                let mut out = Vec::with_capacity(named.len());
                for p in Platform::ALL {
                    if named.contains(&p) && !out.contains(&p) {
                        out.push(p);
                    }
                }
                out
            }
        }
    }
}

/// What a watch target points at on its platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Account,
    Symbol,
    Keyword,
}

impl TargetKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Account => "account",
            TargetKind::Symbol => "symbol",
            TargetKind::Keyword => "keyword",
        }
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account" => Ok(TargetKind::Account),
            "symbol" => Ok(TargetKind::Symbol),
            "keyword" => Ok(TargetKind::Keyword),
            other => Err(format!("unknown target kind: {other}")),
        }
    }
}

/// A watch-target snapshot handed to platform adapters.
///
/// Decoupled from the persistence row so the crawler crate does not depend
/// on the database layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub id: i64,
    pub platform: Platform,
    pub kind: TargetKind,
    pub external_id: Option<String>,
    pub symbol: Option<String>,
    pub keyword: Option<String>,
    pub display_name: String,
}

/// An authenticated platform credential: the cookie jar captured at login.
///
/// Owned by the session manager; adapters borrow it for the duration of a
/// single fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub cookies: BTreeMap<String, String>,
}

impl Credential {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Render the credential as a `Cookie` request-header value.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.cookies {
            if !out.is_empty() {
                out.push_str("; ");
            }
            out.push_str(name);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    #[must_use]
    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_str() {
        for p in Platform::ALL {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
    }

    #[test]
    fn platform_rejects_unknown_name() {
        assert!("twitter".parse::<Platform>().is_err());
    }

    #[test]
    fn platform_serde_uses_lowercase() {
        let json = serde_json::to_string(&Platform::Xueqiu).unwrap();
        assert_eq!(json, "\"xueqiu\"");
    }

    #[test]
    fn selector_all_yields_every_platform() {
        assert_eq!(PlatformSelector::All.platforms(), Platform::ALL.to_vec());
    }

    #[test]
    fn selector_named_deduplicates_and_orders() {
        let sel = PlatformSelector::Named(vec![
            Platform::Xueqiu,
            Platform::Weibo,
            Platform::Xueqiu,
        ]);
        assert_eq!(sel.platforms(), vec![Platform::Weibo, Platform::Xueqiu]);
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let mut cookies = BTreeMap::new();
        cookies.insert("SUB".to_string(), "abc".to_string());
        cookies.insert("SUBP".to_string(), "def".to_string());
        let cred = Credential { cookies };
        assert_eq!(cred.cookie_header(), "SUB=abc; SUBP=def");
        assert!(cred.has_cookie("SUB"));
        assert!(!cred.has_cookie("z_c0"));
    }
}
