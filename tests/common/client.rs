//! HTTP client wrapper for end-to-end tests

use super::constants::TEST_API_TOKEN;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};

/// Thin wrapper over reqwest with the test bearer token and the server's
/// route shapes baked in.
pub struct TestClient {
    base_url: String,
    client: Client,
    token: Option<String>,
}

impl TestClient {
    /// Client without credentials, for exercising the 403 paths.
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
            token: None,
        }
    }

    /// Client carrying the test API token.
    pub fn authenticated(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
            token: Some(TEST_API_TOKEN.to_string()),
        }
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// POST /v1/library/{library_id}/songs with one audio part plus form
    /// fields.
    pub async fn upload_song(
        &self,
        library_id: &str,
        filename: &str,
        mime_type: &str,
        data: Vec<u8>,
        fields: &[(&str, &str)],
    ) -> Response {
        let mut form = Form::new().part(
            "file",
            Part::bytes(data)
                .file_name(filename.to_string())
                .mime_str(mime_type)
                .expect("invalid mime type in test"),
        );
        for (name, value) in fields {
            form = form.text(name.to_string(), value.to_string());
        }
        self.upload_form(library_id, form).await
    }

    /// Upload a multipart form as-is (e.g. one with no audio part).
    pub async fn upload_form(&self, library_id: &str, form: Form) -> Response {
        let url = format!("{}/v1/library/{}/songs", self.base_url, library_id);
        self.with_auth(self.client.post(url))
            .multipart(form)
            .send()
            .await
            .expect("upload request failed")
    }

    pub async fn get_song(&self, id: &str) -> Response {
        let url = format!("{}/v1/songs/{}", self.base_url, id);
        self.with_auth(self.client.get(url))
            .send()
            .await
            .expect("get song request failed")
    }

    pub async fn list_songs(&self, library_id: &str) -> Response {
        let url = format!("{}/v1/library/{}/songs", self.base_url, library_id);
        self.with_auth(self.client.get(url))
            .send()
            .await
            .expect("list songs request failed")
    }

    pub async fn delete_song(&self, id: &str) -> Response {
        let url = format!("{}/v1/songs/{}", self.base_url, id);
        self.with_auth(self.client.delete(url))
            .send()
            .await
            .expect("delete song request failed")
    }

    pub async fn stream_song(&self, id: &str) -> Response {
        let url = format!("{}/v1/songs/{}/stream", self.base_url, id);
        self.with_auth(self.client.get(url))
            .send()
            .await
            .expect("stream request failed")
    }

    pub async fn stream_song_with_range(&self, id: &str, range: &str) -> Response {
        let url = format!("{}/v1/songs/{}/stream", self.base_url, id);
        self.with_auth(self.client.get(url))
            .header("Range", range)
            .send()
            .await
            .expect("range stream request failed")
    }

    pub async fn get_cover(&self, id: &str) -> Response {
        let url = format!("{}/v1/songs/{}/cover", self.base_url, id);
        self.with_auth(self.client.get(url))
            .send()
            .await
            .expect("cover request failed")
    }
}
