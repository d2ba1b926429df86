use crate::config::SessionConfig;
use crate::error::{Error, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A persistent HTTP session against one vendor API.
///
/// The client (default headers, TLS policy, timeout) is built once; every
/// request path is resolved relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct RestSession {
    client: Client,
    base_url: Url,
}

impl RestSession {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::initial_connection(&config.base_url, e))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::initial_connection(&config.base_url, e))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::initial_connection(&config.base_url, e))?;

        log::debug!("REST session for {} ready", base_url);
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` against the base URL.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::invalid_data(path, e))
    }

    pub fn get(&self, path: &str) -> Result<Response> {
        self.get_with(path, &[])
    }

    pub fn get_with(&self, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        let response = self.client.get(self.url(path)?).query(query).send()?;
        check_status(response)
    }

    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(self.get(path)?.json()?)
    }

    pub fn get_text(&self, path: &str) -> Result<String> {
        Ok(self.get(path)?.text()?)
    }

    pub fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.client.post(self.url(path)?).json(body).send()?;
        Ok(check_status(response)?.json()?)
    }

    pub fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Response> {
        let response = self.client.post(self.url(path)?).form(form).send()?;
        check_status(response)
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url).map_err(|e| Error::initial_connection(base_url, e))?;
    // Url::join replaces the last path segment unless the base ends in '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn check_status(response: Response) -> Result<Response> {
    if response.status() == StatusCode::NOT_IMPLEMENTED {
        return Err(Error::FeatureMissing(response.url().to_string()));
    }
    Ok(response.error_for_status()?)
}
