// # Srun Portal
//
// Login capability for Srun captive portals speaking the plain JSONP API.
//
// ## Endpoints
//
// - `GET /cgi-bin/rad_user_info?callback=jsonp`: online status and the
//   client IP as seen by the portal
// - `GET /cgi-bin/srun_portal?callback=jsonp&action=login&...`: login
// - `GET /`: the portal landing page, scraped for the client IP when the
//   status endpoint does not report one
//
// Every reply is a JSON object wrapped in a JSONP callback, e.g.
// `jsonp({"error":"ok","online_ip":"10.0.0.5"})`.
//
// Headers from `portal.custom_header` are sent with every request, including
// the landing page fetch.
//
// ## Retry Ownership
//
// Each call performs one exchange. Retries are owned by the core's backoff
// policy; network failures surface as `Error::Transient` and rejections as
// `Error::Protocol`.

use std::net::IpAddr;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use srun_core::config::{Account, PortalConfig};
use srun_core::traits::{LoginCapability, LoginCapabilityFactory, LoginStatus};
use srun_core::{Error, Result};

const STATUS_PATH: &str = "/cgi-bin/rad_user_info";
const LOGIN_PATH: &str = "/cgi-bin/srun_portal";
const CALLBACK: &str = "jsonp";

/// Reply body shared by the status and login endpoints
#[derive(Debug, Default, Deserialize)]
struct PortalReply {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_msg: String,
    #[serde(default)]
    res: String,
    #[serde(default)]
    online_ip: String,
    #[serde(default)]
    client_ip: String,
}

impl PortalReply {
    fn is_ok(&self) -> bool {
        self.error == "ok" || self.res == "ok"
    }

    fn reason(&self) -> String {
        [&self.error_msg, &self.error, &self.res]
            .into_iter()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "portal returned no reason".to_string())
    }
}

/// Login capability for one account
pub struct PortalClient {
    client: reqwest::Client,
    portal: PortalConfig,
    username: String,
    password: String,
}

impl PortalClient {
    /// Create a client for `account` over an already bound HTTP client
    pub fn new(portal: PortalConfig, account: &Account, client: reqwest::Client) -> Self {
        Self {
            client,
            username: login_username(&portal, account),
            password: account.password.clone(),
            portal,
        }
    }

    /// Username as sent to the portal
    pub fn username(&self) -> &str {
        &self.username
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.portal
            .custom_header
            .iter()
            .fold(self.client.get(url), |request, (name, value)| {
                request.header(name.as_str(), value.as_str())
            })
    }

    async fn get_reply(&self, path: &str, query: &[(&str, &str)]) -> Result<PortalReply> {
        let url = format!("{}{}", self.portal.base_url(), path);
        let response = self.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(Error::transient(format!(
                "portal returned HTTP {} for {}",
                response.status(),
                path
            )));
        }

        let body = response.text().await?;
        parse_jsonp(&body)
    }
}

#[async_trait]
impl LoginCapability for PortalClient {
    async fn status(&self) -> Result<LoginStatus> {
        let reply = self
            .get_reply(STATUS_PATH, &[("callback", CALLBACK)])
            .await?;

        let ip = [reply.online_ip.as_str(), reply.client_ip.as_str()]
            .into_iter()
            .find(|ip| !ip.is_empty())
            .map(String::from);

        if reply.is_ok() {
            debug!(username = %self.username, ?ip, "Portal reports online");
            Ok(LoginStatus { online: true, ip })
        } else {
            debug!(username = %self.username, ?ip, state = %reply.error, "Portal reports offline");
            Ok(LoginStatus::offline(ip))
        }
    }

    async fn login(&self, ip: &str) -> Result<()> {
        let double_stack = if ip.is_empty() { "1" } else { "0" };
        let query = [
            ("callback", CALLBACK),
            ("action", "login"),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("ac_id", self.portal.ac_id.as_str()),
            ("ip", ip),
            ("double_stack", double_stack),
            ("n", self.portal.n.as_str()),
            ("type", self.portal.kind.as_str()),
            ("os", self.portal.os.as_str()),
            ("name", self.portal.name.as_str()),
        ];

        let reply = self.get_reply(LOGIN_PATH, &query).await?;
        if reply.is_ok() {
            Ok(())
        } else {
            Err(Error::protocol(reply.reason()))
        }
    }

    async fn detect_ip(&self) -> Result<Option<String>> {
        let url = format!("{}/", self.portal.base_url());
        let response = self.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::transient(format!(
                "portal landing page returned HTTP {}",
                response.status()
            )));
        }

        let page = response.text().await?;
        let ip = scrape_ip(&page);
        debug!(username = %self.username, ?ip, "Scraped client IP from landing page");
        Ok(ip)
    }
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("base_url", &self.portal.base_url())
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// Builds a [`PortalClient`] per account
#[derive(Debug, Clone)]
pub struct PortalFactory {
    portal: PortalConfig,
}

impl PortalFactory {
    pub fn new(portal: PortalConfig) -> Self {
        Self { portal }
    }
}

impl LoginCapabilityFactory for PortalFactory {
    fn create(&self, account: &Account, client: reqwest::Client) -> Result<Box<dyn LoginCapability>> {
        Ok(Box::new(PortalClient::new(self.portal.clone(), account, client)))
    }
}

/// `username`, then `@user_type` when set, then the portal login domain
fn login_username(portal: &PortalConfig, account: &Account) -> String {
    let mut username = account.username.clone();
    if !account.user_type.is_empty() {
        username.push('@');
        username.push_str(&account.user_type);
    }
    username.push_str(&portal.domain);
    username
}

/// Strip the JSONP callback wrapper and decode the reply
fn parse_jsonp(body: &str) -> Result<PortalReply> {
    let body = body.trim();
    let json = match (body.find('('), body.rfind(')')) {
        (Some(start), Some(end)) if start < end => &body[start + 1..end],
        _ => body,
    };

    serde_json::from_str(json)
        .map_err(|e| Error::protocol(format!("malformed portal reply: {}", e)))
}

/// Find the client IP in the landing page
///
/// Portals embed it either as a script assignment (`ip : "10.0.0.5"`) or as
/// a hidden form field (`name="user_ip" value="10.0.0.5"`).
fn scrape_ip(page: &str) -> Option<String> {
    let mut rest = page;
    while let Some(pos) = rest.find("ip") {
        let before = rest[..pos].chars().next_back();
        let after = &rest[pos + 2..];
        rest = after;

        if before.is_some_and(|c| c.is_ascii_alphanumeric()) {
            continue;
        }
        if let Some(ip) = quoted_value(after) {
            return Some(ip);
        }
    }
    None
}

fn quoted_value(after_key: &str) -> Option<String> {
    // Optional closing quote on the key, then `value` for form fields
    let s = after_key.trim_start_matches(['"', '\'']).trim_start();
    let s = s.strip_prefix("value").map(str::trim_start).unwrap_or(s);
    let s = s.strip_prefix([':', '='])?.trim_start();
    let quote = s.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let s = &s[1..];
    let end = s.find(quote)?;
    let candidate = &s[..end];
    candidate.parse::<IpAddr>().ok().map(|_| candidate.to_string())
}
