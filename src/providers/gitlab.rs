use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::Forge;
use crate::repo::Repo;

const DEFAULT_BASE_URL: &str = "https://gitlab.com";
const PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct GitLabProject {
    /// URL-safe project slug; used as the repository name.
    path: String,
    description: Option<String>,
    web_url: String,
    http_url_to_repo: String,
    ssh_url_to_repo: String,
    namespace: GitLabNamespace,
}

#[derive(Debug, Deserialize)]
struct GitLabNamespace {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    id: u64,
}

pub struct GitLab {
    client: Client,
    base_url: String,
    username: Option<String>,
    token: Option<String>,
    via_ssh: bool,
}

impl GitLab {
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
        if let Some(token) = &token {
            let mut value = HeaderValue::from_str(token)?;
            value.set_sensitive(true);
            headers.insert("PRIVATE-TOKEN", value);
        }
        let client = Client::builder().default_headers(headers).build()?;
        Ok(GitLab {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            token,
            via_ssh,
        })
    }

    fn url_auth(&self) -> Option<String> {
        match (&self.username, &self.token) {
            (Some(user), Some(token)) => Some(format!("{user}:{token}")),
            _ => None,
        }
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

    fn get_paginated(&self, base: &str, what: &str) -> Result<Vec<GitLabProject>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let url = format!("{base}?page={page}&per_page={PER_PAGE}");
            let items: Vec<GitLabProject> = self.get_json(&url, what)?;
            let count = items.len();
            all.extend(items);
            if count < PER_PAGE {
                return Ok(all);
            }
            page += 1;
        }
    }

    fn convert(&self, src: GitLabProject) -> Repo {
        let (clone_url, url_auth) = if self.via_ssh {
            (src.ssh_url_to_repo, None)
        } else {
            (src.http_url_to_repo, self.url_auth())
        };
        Repo {
            name: src.path,
            dir: None,
            clone_url,
            url_auth,
            owner: Some(src.namespace.name),
            desc: src.description.filter(|d| !d.is_empty()),
            homepage: Some(src.web_url),
        }
    }
}

impl Forge for GitLab {
    fn get_repo(&self, id: &str) -> Result<Repo> {
        // The project API takes the full path with '/' URL-encoded.
        let encoded = id.replace('/', "%2F");
        let url = format!("{}/api/v4/projects/{encoded}", self.base_url);
        let src: GitLabProject = self.get_json(&url, &format!("repository: {id}"))?;
        Ok(self.convert(src))
    }

    fn get_user_repos(&self, user: &str) -> Result<Vec<Repo>> {
        let lookup = format!("{}/api/v4/users?username={user}", self.base_url);
        let users: Vec<GitLabUser> =
            self.get_json(&lookup, &format!("GitLab user: {user}"))?;
        let Some(found) = users.first() else {
            bail!("couldn't find GitLab user: {user}");
        };
        let base = format!("{}/api/v4/users/{}/projects", self.base_url, found.id);
        let projects = self.get_paginated(&base, &format!("repositories of user: {user}"))?;
        Ok(projects.into_iter().map(|p| self.convert(p)).collect())
    }

    fn get_org_repos(&self, org: &str) -> Result<Vec<Repo>> {
        let encoded = org.replace('/', "%2F");
        let base = format!("{}/api/v4/groups/{encoded}/projects", self.base_url);
        let projects = self.get_paginated(&base, &format!("repositories of group: {org}"))?;
        Ok(projects.into_iter().map(|p| self.convert(p)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use serde_json::json;

    fn project_payload(path: &str) -> serde_json::Value {
        json!({
            "path": path,
            "name": "Display Name",
            "description": "Test repository",
            "web_url": format!("https://gitlab.com/egor/{path}"),
            "http_url_to_repo": format!("https://gitlab.com/egor/{path}.git"),
            "ssh_url_to_repo": format!("git@gitlab.com:egor/{path}.git"),
            "namespace": {"name": "Egor Tensin"},
        })
    }

    #[test]
    fn get_repo_encodes_the_project_path() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET")
                .path("/api/v4/projects/egor%2Ftest")
                .header("PRIVATE-TOKEN", "gl-token");
            then.status(200).json_body(project_payload("test"));
        });

        let gl = GitLab::with_base_url(
            &server.base_url(),
            Some("egor".to_string()),
            Some("gl-token".to_string()),
            false,
        )
        .unwrap();
        let repo = gl.get_repo("egor/test").unwrap();
        mock.assert();

        assert_eq!(repo.name, "test");
        assert_eq!(repo.clone_url, "https://gitlab.com/egor/test.git");
        assert_eq!(repo.url_auth.as_deref(), Some("egor:gl-token"));
        assert_eq!(repo.owner.as_deref(), Some("Egor Tensin"));
    }

    #[test]
    fn user_repos_resolve_the_numeric_id_first() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET")
                .path("/api/v4/users")
                .query_param("username", "egor");
            then.status(200).json_body(json!([{"id": 42, "username": "egor"}]));
        });
        server.mock(|when, then| {
            when.method("GET").path("/api/v4/users/42/projects");
            then.status(200)
                .json_body(json!([project_payload("one"), project_payload("two")]));
        });

        let gl = GitLab::with_base_url(&server.base_url(), None, None, true).unwrap();
        let repos = gl.get_user_repos("egor").unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].clone_url, "git@gitlab.com:egor/one.git");
        assert!(repos[0].url_auth.is_none());
    }

    #[test]
    fn unknown_user_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/api/v4/users");
            then.status(200).json_body(json!([]));
        });

        let gl = GitLab::with_base_url(&server.base_url(), None, None, true).unwrap();
        let err = gl.get_user_repos("nobody").unwrap_err();
        assert!(err.to_string().contains("nobody"));
    }
}
