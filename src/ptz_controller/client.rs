//! CGI PTZ client with HTTP digest authentication
//!
//! Cameras answer the first request with `401` and a `www-authenticate`
//! challenge; the request is then repeated with a digest `Authorization`.

use super::types::ZoomRegion;
use crate::config_store::Credentials;
use crate::error::{Error, Result};
use crate::models::CameraId;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;

/// Camera movement commands
#[async_trait]
pub trait CameraControl: Send + Sync {
    async fn zoom_to_region(&self, camera: &CameraId, region: ZoomRegion) -> Result<()>;
    async fn goto_preset(&self, camera: &CameraId, preset: u32) -> Result<()>;
}

pub struct DahuaPtzClient {
    client: Client,
    credentials: Option<Credentials>,
}

impl DahuaPtzClient {
    pub fn new(credentials: Option<Credentials>) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(10)).build()?,
            credentials,
        })
    }

    pub fn zoom_url(camera: &CameraId, r: ZoomRegion) -> String {
        format!(
            "http://{camera}/cgi-bin/ptzBase.cgi?action=moveDirectly&channel=1\
             &startPoint[0]={}&startPoint[1]={}&endPoint[0]={}&endPoint[1]={}",
            r.x1, r.y1, r.x2, r.y2
        )
    }

    pub fn preset_url(camera: &CameraId, preset: u32) -> String {
        format!(
            "http://{camera}/cgi-bin/ptz.cgi?action=start&channel=1&code=GotoPreset\
             &arg1=0&arg2={preset}&arg3=0"
        )
    }

    async fn send(&self, camera: &CameraId, url: &str) -> Result<()> {
        let url = Url::parse(url).map_err(|e| Error::actuation(camera, e))?;
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::actuation(camera, e))?;

        let resp = match (resp.status(), &self.credentials) {
            (StatusCode::UNAUTHORIZED, Some(creds)) => {
                let challenge = resp
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| Error::actuation(camera, "401 without challenge"))?;
                let authorization = digest_authorization(&url, challenge, creds)
                    .map_err(|e| Error::actuation(camera, e))?;

                self.client
                    .get(url)
                    .header(AUTHORIZATION, authorization)
                    .send()
                    .await
                    .map_err(|e| Error::actuation(camera, e))?
            }
            _ => resp,
        };

        if !resp.status().is_success() {
            return Err(Error::actuation(
                camera,
                format!("camera answered {}", resp.status()),
            ));
        }
        Ok(())
    }
}

fn digest_authorization(
    url: &Url,
    challenge: &str,
    creds: &Credentials,
) -> std::result::Result<HeaderValue, String> {
    let uri = match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    };

    let mut client = http_auth::PasswordClient::try_from(challenge)?;
    let authorization = client.respond(&http_auth::PasswordParams {
        username: &creds.username,
        password: &creds.password,
        uri: &uri,
        method: reqwest::Method::GET.as_str(),
        body: Some(&[]),
    })?;

    let mut value = HeaderValue::try_from(authorization).map_err(|e| e.to_string())?;
    value.set_sensitive(true);
    Ok(value)
}

#[async_trait]
impl CameraControl for DahuaPtzClient {
    async fn zoom_to_region(&self, camera: &CameraId, region: ZoomRegion) -> Result<()> {
        tracing::debug!(camera_id = %camera, ?region, "Zoom to region");
        self.send(camera, &Self::zoom_url(camera, region)).await
    }

    async fn goto_preset(&self, camera: &CameraId, preset: u32) -> Result<()> {
        tracing::debug!(camera_id = %camera, preset, "Goto preset");
        self.send(camera, &Self::preset_url(camera, preset)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cam() -> CameraId {
        CameraId::parse("192.168.1.20").unwrap()
    }

    #[test]
    fn test_zoom_url() {
        let url = DahuaPtzClient::zoom_url(
            &cam(),
            ZoomRegion {
                x1: 400,
                y1: 350,
                x2: 1200,
                y2: 1400,
            },
        );
        assert_eq!(
            url,
            "http://192.168.1.20/cgi-bin/ptzBase.cgi?action=moveDirectly&channel=1\
             &startPoint[0]=400&startPoint[1]=350&endPoint[0]=1200&endPoint[1]=1400"
        );
    }

    #[test]
    fn test_preset_url() {
        assert_eq!(
            DahuaPtzClient::preset_url(&cam(), 1),
            "http://192.168.1.20/cgi-bin/ptz.cgi?action=start&channel=1&code=GotoPreset&arg1=0&arg2=1&arg3=0"
        );
    }

    #[test]
    fn test_digest_authorization_header() {
        let url = Url::parse(&DahuaPtzClient::preset_url(&cam(), 2)).unwrap();
        let creds = Credentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        };
        let challenge = r#"Digest realm="Login to cam", qop="auth", nonce="abc123", opaque="xyz""#;

        let value = digest_authorization(&url, challenge, &creds).unwrap();
        let text = value.to_str().unwrap();
        assert!(text.starts_with("Digest "));
        assert!(text.contains(r#"username="admin""#));
        assert!(text.contains("arg2=2"));
        assert!(value.is_sensitive());
    }
}
