use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::Forge;
use crate::repo::Repo;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    name: String,
    description: Option<String>,
    html_url: String,
    clone_url: String,
    ssh_url: String,
    owner: GitHubAccount,
}

#[derive(Debug, Deserialize)]
struct GitHubAccount {
    login: String,
}

pub struct GitHub {
    client: Client,
    base_url: String,
    token: Option<String>,
    via_ssh: bool,
}

impl GitHub {
    pub fn new(token: Option<String>, via_ssh: bool) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, token, via_ssh)
    }

    pub fn with_base_url(base_url: &str, token: Option<String>, via_ssh: bool) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("gitmirror"));
        if let Some(token) = &token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder().default_headers(headers).build()?;
        Ok(GitHub {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            via_ssh,
        })
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("couldn't fetch {what}"))?;
        resp.json()
            .with_context(|| format!("couldn't parse the response for {what}"))
    }

    fn get_paginated(&self, base: &str, what: &str) -> Result<Vec<GitHubRepo>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let url = format!("{base}?page={page}&per_page={PER_PAGE}");
            let items: Vec<GitHubRepo> = self.get_json(&url, what)?;
            let count = items.len();
            all.extend(items);
            if count < PER_PAGE {
                return Ok(all);
            }
            page += 1;
        }
    }

    fn convert(&self, src: GitHubRepo) -> Repo {
        let (clone_url, url_auth) = if self.via_ssh {
            (src.ssh_url, None)
        } else {
            (src.clone_url, self.token.clone())
        };
        Repo {
            name: src.name,
            dir: None,
            clone_url,
            url_auth,
            owner: Some(src.owner.login),
            desc: src.description,
            homepage: Some(src.html_url),
        }
    }
}

impl Forge for GitHub {
    fn get_repo(&self, id: &str) -> Result<Repo> {
        let url = format!("{}/repos/{id}", self.base_url);
        let src: GitHubRepo = self.get_json(&url, &format!("repository: {id}"))?;
        Ok(self.convert(src))
    }

    fn get_user_repos(&self, user: &str) -> Result<Vec<Repo>> {
        let url = format!("{}/users/{user}/repos", self.base_url);
        let repos = self.get_paginated(&url, &format!("repositories of user: {user}"))?;
        Ok(repos.into_iter().map(|r| self.convert(r)).collect())
    }

    fn get_org_repos(&self, org: &str) -> Result<Vec<Repo>> {
        let url = format!("{}/orgs/{org}/repos", self.base_url);
        let repos = self.get_paginated(&url, &format!("repositories of organization: {org}"))?;
        Ok(repos.into_iter().map(|r| self.convert(r)).collect())
    }
}
