use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::Forge;
use crate::repo::{Repo, url_remove_auth};

const DEFAULT_BASE_URL: &str = "https://api.bitbucket.org";
const PAGE_LEN: usize = 100;

#[derive(Debug, Deserialize)]
struct BitbucketRepo {
    name: String,
    description: Option<String>,
    owner: BitbucketAccount,
    links: BitbucketLinks,
}

#[derive(Debug, Deserialize)]
struct BitbucketAccount {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketLinks {
    html: BitbucketLink,
    clone: Vec<BitbucketCloneLink>,
}

#[derive(Debug, Deserialize)]
struct BitbucketLink {
    href: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketCloneLink {
    name: String,
    href: String,
}

/// One page of a paginated listing; `next` is a full URL.
#[derive(Debug, Deserialize)]
struct BitbucketPage {
    values: Vec<BitbucketRepo>,
    next: Option<String>,
}

pub struct Bitbucket {
    client: Client,
    base_url: String,
    username: Option<String>,
    token: Option<String>,
    via_ssh: bool,
}

impl Bitbucket {
    pub fn new(username: Option<String>, token: Option<String>, via_ssh: bool) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, username, token, via_ssh)
    }

    pub fn with_base_url(
        base_url: &str,
        username: Option<String>,
        token: Option<String>,
        via_ssh: bool,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("gitmirror"));
        let client = Client::builder().default_headers(headers).build()?;
        Ok(Bitbucket {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            token,
            via_ssh,
        })
    }

    /// `user:app-password`, for both API access and HTTPS clones.
    fn url_auth(&self) -> Option<String> {
        match (&self.username, &self.token) {
            (Some(user), Some(token)) => Some(format!("{user}:{token}")),
            _ => None,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let mut req = self.client.get(url);
        if let (Some(user), Some(token)) = (&self.username, &self.token) {
            req = req.basic_auth(user, Some(token));
        }
        let resp = req
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("couldn't fetch {what}"))?;
        resp.json()
            .with_context(|| format!("couldn't parse the response for {what}"))
    }

    fn convert(&self, src: BitbucketRepo) -> Result<Repo> {
        let mut https_url = None;
        let mut ssh_url = None;
        for link in &src.links.clone {
            match link.name.as_str() {
                "https" => https_url = Some(link.href.clone()),
                "ssh" => ssh_url = Some(link.href.clone()),
                _ => {}
            }
        }
        let (clone_url, url_auth) = if self.via_ssh {
            let Some(url) = ssh_url else {
                bail!("no ssh clone URL for repository '{}'", src.name);
            };
            (url, None)
        } else {
            let Some(url) = https_url else {
                bail!("no https clone URL for repository '{}'", src.name);
            };
            // Bitbucket leaves the username in the URL... Sigh.
            (url_remove_auth(&url)?, self.url_auth())
        };
        Ok(Repo {
            name: src.name,
            dir: None,
            clone_url,
            url_auth,
            owner: Some(src.owner.display_name),
            desc: src.description.filter(|d| !d.is_empty()),
            homepage: Some(src.links.html.href),
        })
    }

    fn list_workspace(&self, workspace: &str) -> Result<Vec<Repo>> {
        let what = format!("repositories of workspace: {workspace}");
        let mut url = format!(
            "{}/2.0/repositories/{workspace}?pagelen={PAGE_LEN}",
            self.base_url
        );
        let mut all = Vec::new();
        loop {
            let page: BitbucketPage = self.get_json(&url, &what)?;
            for src in page.values {
                all.push(self.convert(src)?);
            }
            match page.next {
                Some(next) => url = next,
                None => return Ok(all),
            }
        }
    }
}

impl Forge for Bitbucket {
    fn get_repo(&self, id: &str) -> Result<Repo> {
        let url = format!("{}/2.0/repositories/{id}", self.base_url);
        let src: BitbucketRepo = self.get_json(&url, &format!("repository: {id}"))?;
        self.convert(src)
    }

    fn get_user_repos(&self, user: &str) -> Result<Vec<Repo>> {
        self.list_workspace(user)
    }

    // Bitbucket workspaces cover user and team accounts alike.
    fn get_org_repos(&self, org: &str) -> Result<Vec<Repo>> {
        self.list_workspace(org)
    }
}
