//! Flat cookie store shared by the login and probe HTTP clients.
//!
//! The persisted credential record is a flat `name → value` map, so the
//! jar mirrors that shape instead of tracking per-cookie attributes.
//! Cookies are only attached to hosts under the configured domain suffix.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;

/// Name→value cookie jar scoped to a single domain suffix.
///
/// Implements [`reqwest::cookie::CookieStore`] so one jar can back several
/// clients, and exposes the snapshot/hydrate/clear operations the session
/// manager needs (reqwest's built-in `Jar` supports none of those).
pub struct FlatCookieStore {
    domain_suffix: String,
    cookies: RwLock<BTreeMap<String, String>>,
}

impl FlatCookieStore {
    pub fn new(domain_suffix: impl Into<String>) -> Self {
        Self {
            domain_suffix: domain_suffix.into(),
            cookies: RwLock::new(BTreeMap::new()),
        }
    }

    /// True when the jar holds no cookies at all.
    pub fn is_empty(&self) -> bool {
        self.cookies.read().is_empty()
    }

    /// Clone the current jar contents.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.cookies.read().clone()
    }

    /// Replace the jar contents with a previously persisted record.
    pub fn hydrate(&self, record: BTreeMap<String, String>) {
        *self.cookies.write() = record;
    }

    /// Drop every cookie.
    pub fn clear(&self) {
        self.cookies.write().clear();
    }

    fn host_in_scope(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        host == self.domain_suffix
            || host
                .strip_suffix(&self.domain_suffix)
                .is_some_and(|rest| rest.ends_with('.'))
    }
}

impl CookieStore for FlatCookieStore {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        if !self.host_in_scope(url) {
            return;
        }
        let mut cookies = self.cookies.write();
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else { continue };
            // Only the name=value pair matters; attributes (Path, Expires,
            // HttpOnly, ...) are flattened away to match the persisted record.
            let pair = raw.split(';').next().unwrap_or("");
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    cookies.insert(name.to_owned(), value.trim().to_owned());
                }
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        if !self.host_in_scope(url) {
            return None;
        }
        let cookies = self.cookies.read();
        if cookies.is_empty() {
            return None;
        }
        let header = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn set(store: &FlatCookieStore, url_str: &str, headers: &[&str]) {
        let values: Vec<HeaderValue> = headers
            .iter()
            .map(|h| HeaderValue::from_str(h).unwrap())
            .collect();
        store.set_cookies(&mut values.iter(), &url(url_str));
    }

    #[test]
    fn absorbs_set_cookie_headers_dropping_attributes() {
        let store = FlatCookieStore::new("sjtu.edu.cn");
        set(
            &store,
            "https://jaccount.sjtu.edu.cn/jaccount/ulogin",
            &["JAAuthCookie=abc123; Path=/; HttpOnly", "JSESSIONID=xyz"],
        );
        let snap = store.snapshot();
        assert_eq!(snap.get("JAAuthCookie").map(String::as_str), Some("abc123"));
        assert_eq!(snap.get("JSESSIONID").map(String::as_str), Some("xyz"));
    }

    #[test]
    fn ignores_cookies_from_out_of_scope_hosts() {
        let store = FlatCookieStore::new("sjtu.edu.cn");
        set(&store, "https://evil.example.com/", &["stolen=1"]);
        assert!(store.is_empty());
        // Suffix match must be label-aligned: "notsjtu.edu.cn" is out of scope.
        set(&store, "https://notsjtu.edu.cn/", &["sneaky=1"]);
        assert!(store.is_empty());
    }

    #[test]
    fn sends_cookies_only_to_in_scope_hosts() {
        let store = FlatCookieStore::new("sjtu.edu.cn");
        set(&store, "https://jaccount.sjtu.edu.cn/", &["a=1", "b=2"]);

        let header = CookieStore::cookies(&store, &url("https://my.sjtu.edu.cn/api/account"))
            .expect("cookie header for in-scope host");
        assert_eq!(header.to_str().unwrap(), "a=1; b=2");

        assert!(CookieStore::cookies(&store, &url("https://example.com/")).is_none());
    }

    #[test]
    fn snapshot_hydrate_round_trip() {
        let store = FlatCookieStore::new("sjtu.edu.cn");
        set(&store, "https://my.sjtu.edu.cn/", &["k=v"]);
        let snap = store.snapshot();

        let fresh = FlatCookieStore::new("sjtu.edu.cn");
        fresh.hydrate(snap.clone());
        assert_eq!(fresh.snapshot(), snap);
    }

    #[test]
    fn clear_empties_the_jar() {
        let store = FlatCookieStore::new("sjtu.edu.cn");
        set(&store, "https://my.sjtu.edu.cn/", &["k=v"]);
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
        assert!(CookieStore::cookies(&store, &url("https://my.sjtu.edu.cn/")).is_none());
    }

    #[test]
    fn later_set_cookie_overwrites_earlier_value() {
        let store = FlatCookieStore::new("sjtu.edu.cn");
        set(&store, "https://my.sjtu.edu.cn/", &["k=old"]);
        set(&store, "https://my.sjtu.edu.cn/", &["k=new"]);
        assert_eq!(store.snapshot().get("k").map(String::as_str), Some("new"));
    }
}
