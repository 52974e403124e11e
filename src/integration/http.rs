use reqwest::RequestBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::Config;

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl Client {
    pub fn new(config: &Config) -> Self {
        Self {
            http: super::init_http_client(),
            base: config.api_url().as_str().trim_end_matches('/').to_owned(),
            token: config.auth_token().map(str::to_owned),
        }
    }
}

impl Client {
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> super::Result<T> {
        let request = self.http.get(self.url(path));
        self.execute(request).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> super::Result<T> {
        let request = self.http.post(self.url(path)).json(body);
        self.execute(request).await
    }

    pub async fn patch(&self, path: &str) -> super::Result<()> {
        let request = self.authorize(self.http.patch(self.url(path)));
        let response = request.send().await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(super::Error::UnexpectedStatus(status)),
        }
    }
}

impl Client {
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> super::Result<T> {
        let response = self.authorize(request).send().await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            status => Err(super::Error::UnexpectedStatus(status)),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}
