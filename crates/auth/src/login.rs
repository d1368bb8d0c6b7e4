//! The jAccount login flow: bootstrap-page parameter extraction, challenge
//! image retrieval, and form submission.
//!
//! The login page embeds a per-attempt challenge identifier in several
//! places depending on rollout; extraction tries each known location in
//! order and falls back to the fixed login endpoint with empty parameters
//! when all of them fail (the remote system then rejects the submission,
//! which the caller treats as a normal login failure).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use reqwest::header::{ACCEPT_LANGUAGE, REFERER, USER_AGENT};

use cg_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Endpoints
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bootstrap URL.  Fetching it while unauthenticated redirects to the
/// jAccount login page; fetching it while authenticated returns account
/// JSON.  Doubles as the liveness-check endpoint.
pub const ACCOUNT_URL: &str = "https://my.sjtu.edu.cn/api/account";

pub const CAPTCHA_URL: &str = "https://jaccount.sjtu.edu.cn/jaccount/captcha";
pub const ULOGIN_URL: &str = "https://jaccount.sjtu.edu.cn/jaccount/ulogin";
pub const JALOGIN_URL: &str = "https://jaccount.sjtu.edu.cn/jaccount/jalogin";
pub const LOGOUT_URL: &str = "https://jaccount.sjtu.edu.cn/jaccount/logout";

/// Substring identifying the login page in a URL — a response landing here
/// means the credentials were rejected.
pub const LOGIN_PAGE_MARKER: &str = "jaccount.sjtu.edu.cn/jaccount/jalogin";

/// The captcha endpoint rejects non-browser user agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Login page
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything extracted from the bootstrap redirect: the opaque form
/// parameters echoed in the login page's query string, the per-attempt
/// challenge identifier, and the page URL itself.
#[derive(Debug, Clone)]
pub struct LoginPage {
    pub form_params: Vec<(String, String)>,
    pub uuid: String,
    pub login_url: String,
}

/// Fetch the bootstrap URL (following redirects onto the login page) and
/// extract the login parameters and challenge identifier.
pub async fn fetch_login_page(client: &reqwest::Client, initial_url: &str) -> Result<LoginPage> {
    let resp = client
        .get(initial_url)
        .header(ACCEPT_LANGUAGE, "zh-CN")
        .send()
        .await
        .map_err(|e| Error::Http(format!("fetching login page: {e}")))?;

    let final_url = resp.url().clone();
    let body = resp
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading login page: {e}")))?;

    let form_params: Vec<(String, String)> = final_url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    match extract_challenge_uuid(&body, &form_params) {
        Some(uuid) => {
            tracing::debug!(uuid = %uuid, params = form_params.len(), "login page parsed");
            Ok(LoginPage {
                form_params,
                uuid,
                login_url: final_url.to_string(),
            })
        }
        None => {
            tracing::warn!("no challenge id found on login page, using fixed login endpoint");
            Ok(LoginPage {
                form_params: Vec::new(),
                uuid: String::new(),
                login_url: JALOGIN_URL.to_string(),
            })
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Challenge identifier extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Try each known location of the challenge identifier, in order:
/// the `firefox_link` anchor, a hidden `uuid` input, the redirect query
/// string, an inline `var uuid = …` script assignment, and finally a scan
/// for any UUID-shaped token in the page body.
pub fn extract_challenge_uuid(html: &str, query: &[(String, String)]) -> Option<String> {
    from_anchor(html)
        .or_else(|| from_hidden_input(html))
        .or_else(|| {
            query
                .iter()
                .find(|(k, _)| k == "uuid")
                .map(|(_, v)| v.clone())
                .filter(|v| !v.is_empty())
        })
        .or_else(|| from_script_var(html))
        .or_else(|| from_uuid_pattern(html))
}

fn from_anchor(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"<a[^>]*\bid\s*=\s*"firefox_link"[^>]*\bhref\s*=\s*"([^"]*)""#)
            .expect("static pattern")
    });
    let href = re.captures(html)?.get(1)?.as_str();
    let (_, rest) = href.split_once('=')?;
    let value = rest.split('&').next().unwrap_or(rest);
    (!value.is_empty()).then(|| value.to_owned())
}

fn from_hidden_input(html: &str) -> Option<String> {
    static NAME_FIRST: OnceLock<Regex> = OnceLock::new();
    static VALUE_FIRST: OnceLock<Regex> = OnceLock::new();
    let name_first = NAME_FIRST.get_or_init(|| {
        Regex::new(r#"<input[^>]*\bname\s*=\s*"uuid"[^>]*\bvalue\s*=\s*"([^"]*)""#)
            .expect("static pattern")
    });
    let value_first = VALUE_FIRST.get_or_init(|| {
        Regex::new(r#"<input[^>]*\bvalue\s*=\s*"([^"]*)"[^>]*\bname\s*=\s*"uuid""#)
            .expect("static pattern")
    });
    let value = name_first
        .captures(html)
        .or_else(|| value_first.captures(html))?
        .get(1)?
        .as_str();
    (!value.is_empty()).then(|| value.to_owned())
}

fn from_script_var(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"var\s+uuid\s*=\s*['"]?([0-9A-Za-z-]+)['"]?"#).expect("static pattern")
    });
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}

fn from_uuid_pattern(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
            .expect("static pattern")
    });
    re.find(html).map(|m| m.as_str().to_owned())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Challenge image & form submission
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fetch the challenge image for the given identifier and persist it to
/// the cache directory.  The nanosecond `t` parameter defeats remote
/// caching of the image.
pub async fn fetch_challenge_image(
    client: &reqwest::Client,
    uuid: &str,
    cache_dir: &Path,
) -> Result<(Vec<u8>, PathBuf)> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let anti_cache = now.as_nanos().to_string();

    let resp = client
        .get(CAPTCHA_URL)
        .query(&[("uuid", uuid), ("t", anti_cache.as_str())])
        .header(REFERER, CAPTCHA_URL)
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .send()
        .await
        .map_err(|e| Error::Http(format!("fetching challenge image: {e}")))?;

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| Error::Http(format!("reading challenge image: {e}")))?;

    std::fs::create_dir_all(cache_dir).map_err(Error::Io)?;
    let path = cache_dir.join(format!("captcha_{}.png", now.as_secs()));
    std::fs::write(&path, &bytes).map_err(Error::Io)?;
    tracing::info!(path = %path.display(), "challenge image saved");

    Ok((bytes.to_vec(), path))
}

/// Submit the login form.  Returns `Ok(true)` when the response landed
/// anywhere other than the login page, `Ok(false)` when the remote system
/// bounced back to it (wrong credentials or challenge solution).
pub async fn submit_login(
    client: &reqwest::Client,
    username: &str,
    password: &str,
    page: &LoginPage,
    challenge: &str,
) -> Result<bool> {
    let mut form: Vec<(String, String)> = vec![
        ("user".into(), username.into()),
        ("pass".into(), password.into()),
        ("uuid".into(), page.uuid.clone()),
        ("captcha".into(), challenge.into()),
    ];
    form.extend(page.form_params.iter().cloned());

    let resp = client
        .post(ULOGIN_URL)
        .form(&form)
        .header(ACCEPT_LANGUAGE, "zh-CN")
        .send()
        .await
        .map_err(|e| Error::Http(format!("submitting login form: {e}")))?;

    Ok(login_succeeded(resp.url().as_str()))
}

/// The remote system bounces rejected submissions back to the login page;
/// landing anywhere else means the credentials were accepted.
pub fn login_succeeded(final_url: &str) -> bool {
    !final_url.contains(LOGIN_PAGE_MARKER)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "12345678-9abc-def0-1234-56789abcdef0";

    fn q(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn extracts_from_firefox_anchor() {
        let html = format!(r#"<a id="firefox_link" href="express_login?uuid={UUID}">link</a>"#);
        assert_eq!(extract_challenge_uuid(&html, &[]).as_deref(), Some(UUID));
    }

    #[test]
    fn anchor_value_is_cut_at_next_parameter() {
        let html = format!(r#"<a id="firefox_link" href="express_login?uuid={UUID}&lang=zh">x</a>"#);
        assert_eq!(extract_challenge_uuid(&html, &[]).as_deref(), Some(UUID));
    }

    #[test]
    fn extracts_from_hidden_input() {
        let html = format!(r#"<form><input type="hidden" name="uuid" value="{UUID}"></form>"#);
        assert_eq!(extract_challenge_uuid(&html, &[]).as_deref(), Some(UUID));
    }

    #[test]
    fn extracts_from_hidden_input_with_reversed_attributes() {
        let html = format!(r#"<input value="{UUID}" type="hidden" name="uuid">"#);
        assert_eq!(extract_challenge_uuid(&html, &[]).as_deref(), Some(UUID));
    }

    #[test]
    fn extracts_from_query_string() {
        let query = q(&[("sid", "jaoauth220160718"), ("uuid", UUID)]);
        assert_eq!(extract_challenge_uuid("<html></html>", &query).as_deref(), Some(UUID));
    }

    #[test]
    fn extracts_from_script_variable() {
        let html = format!("<script>\nvar uuid = '{UUID}';\nvar x = 1;\n</script>");
        assert_eq!(extract_challenge_uuid(&html, &[]).as_deref(), Some(UUID));
    }

    #[test]
    fn falls_back_to_uuid_shaped_token_scan() {
        let html = format!("<div data-token=\"{UUID}\"></div>");
        assert_eq!(extract_challenge_uuid(&html, &[]).as_deref(), Some(UUID));
    }

    #[test]
    fn anchor_takes_precedence_over_other_sources() {
        let other = "00000000-0000-4000-8000-000000000000";
        let html = format!(
            r#"<a id="firefox_link" href="?uuid={UUID}">x</a><input name="uuid" value="{other}">"#
        );
        let query = q(&[("uuid", other)]);
        assert_eq!(extract_challenge_uuid(&html, &query).as_deref(), Some(UUID));
    }

    #[test]
    fn returns_none_when_nothing_matches() {
        assert_eq!(extract_challenge_uuid("<html><body>login</body></html>", &[]), None);
    }

    #[test]
    fn empty_query_uuid_is_skipped() {
        let query = q(&[("uuid", "")]);
        assert_eq!(extract_challenge_uuid("<html></html>", &query), None);
    }

    #[test]
    fn landing_back_on_the_login_page_is_a_rejection() {
        assert!(!login_succeeded(
            "https://jaccount.sjtu.edu.cn/jaccount/jalogin?err=1"
        ));
        assert!(login_succeeded("https://my.sjtu.edu.cn/"));
        assert!(login_succeeded("https://my.sjtu.edu.cn/api/account"));
    }
}
