use crate::ad_service::{AdService, ReadError, SubmissionError};
use crate::domix::{config::API_ROOT, error_message};
use crate::http::build_client;
use crate::models::{AdId, AdRecord, CreateAdRequest};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};
use urlencoding::encode;

#[derive(Debug, Clone)]
pub struct HttpAdService {
    base_url: String,
    http: Client,
}

#[derive(Deserialize)]
struct CreatedAd {
    #[serde(alias = "adId", alias = "ad_id")]
    id: AdId,
}

impl HttpAdService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: build_client(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(API_ROOT.as_str())
    }
}

#[async_trait]
impl AdService for HttpAdService {
    async fn create_ad(
        &self,
        token: &str,
        request: &CreateAdRequest,
    ) -> Result<AdId, SubmissionError> {
        let response = self
            .http
            .post(format!("{}/ads", self.base_url))
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|err| SubmissionError::Unavailable {
                detail: err.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SubmissionError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                target = "domix.client",
                status = status.as_u16(),
                "create_ad_rejected"
            );
            return Err(match error_message(&body) {
                Some(message) => SubmissionError::Rejected {
                    status: status.as_u16(),
                    message,
                },
                None => SubmissionError::Unavailable {
                    detail: format!("HTTP {status}"),
                },
            });
        }

        let created: CreatedAd =
            response
                .json()
                .await
                .map_err(|err| SubmissionError::Unavailable {
                    detail: err.to_string(),
                })?;
        info!(target = "domix.client", ad_id = %created.id, "ad created");
        Ok(created.id)
    }

    async fn get_ad(&self, id: &AdId) -> Result<AdRecord, ReadError> {
        let url = format!("{}/ads/{}", self.base_url, encode(id.as_str()));
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ReadError::Request(err.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ReadError::NotFound);
        }
        if !response.status().is_success() {
            return Err(ReadError::Request(format!("HTTP {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|err| ReadError::InvalidResponse(err.to_string()))
    }

    async fn list_ads(&self) -> Result<Vec<AdRecord>, ReadError> {
        let response = self
            .http
            .get(format!("{}/ads", self.base_url))
            .send()
            .await
            .map_err(|err| ReadError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ReadError::Request(format!("HTTP {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|err| ReadError::InvalidResponse(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::CategoryAttributes;
    use crate::models::AdCategory;
    use crate::testing::spawn_stub;
    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap, StatusCode as AxumStatus, header},
        routing::{get, post},
    };
    use serde_json::{Value, json};

    fn request() -> CreateAdRequest {
        let mut attributes = CategoryAttributes::empty(AdCategory::RealEstate);
        attributes.set("rooms", "3").unwrap();
        CreateAdRequest {
            title: None,
            description: "Продаю дом".into(),
            price: 150000.0,
            category: AdCategory::RealEstate,
            city_tag: "Бишкек".into(),
            phone: Some("+996555123456".into()),
            image_urls: vec!["https://cdn.test/a.jpg".into()],
            category_attributes: attributes,
        }
    }

    async fn create(headers: HeaderMap, Json(body): Json<Value>) -> (AxumStatus, Json<Value>) {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        match auth {
            "Bearer good" => {
                assert_eq!(body["categoryAttributes"]["rooms"], json!(3));
                assert_eq!(body["cityTag"], json!("Бишкек"));
                (AxumStatus::CREATED, Json(json!({ "id": 17 })))
            }
            "Bearer rude" => (
                AxumStatus::BAD_REQUEST,
                Json(json!({ "message": "Описание слишком короткое" })),
            ),
            "Bearer broken" => (AxumStatus::BAD_GATEWAY, Json(json!({ "message": "upstream" }))),
            "Bearer down" => (AxumStatus::SERVICE_UNAVAILABLE, Json(json!({ "status": 503 }))),
            _ => (AxumStatus::UNAUTHORIZED, Json(json!({}))),
        }
    }

    async fn detail(Path(id): Path<String>) -> Result<Json<Value>, AxumStatus> {
        if id != "17" {
            return Err(AxumStatus::NOT_FOUND);
        }
        Ok(Json(json!({
            "id": 17,
            "description": "Продаю дом",
            "price": 150000,
            "category": "Недвижимость",
            "cityTag": "Бишкек",
            "imageUrls": ["https://cdn.test/a.jpg"],
            "categoryAttributes": { "rooms": 3 }
        })))
    }

    async fn stub() -> HttpAdService {
        let router = Router::new()
            .route("/ads", post(create).get(|| async { Json(json!([])) }))
            .route("/ads/{id}", get(detail));
        HttpAdService::new(spawn_stub(router).await)
    }

    #[tokio::test]
    async fn create_returns_numeric_id_as_text() {
        let service = stub().await;
        let id = service.create_ad("good", &request()).await.expect("create");
        assert_eq!(id.as_str(), "17");
    }

    #[tokio::test]
    async fn structured_rejection_is_verbatim() {
        let service = stub().await;
        let err = service.create_ad("rude", &request()).await.unwrap_err();
        assert_eq!(err.to_string(), "Описание слишком короткое");
    }

    #[tokio::test]
    async fn server_error_message_is_verbatim() {
        let service = stub().await;
        let err = service.create_ad("broken", &request()).await.unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Rejected {
                status: 502,
                message: "upstream".into(),
            }
        );
        assert_eq!(err.to_string(), "upstream");
    }

    #[tokio::test]
    async fn unstructured_server_error_gets_the_generic_message() {
        let service = stub().await;
        let err = service.create_ad("down", &request()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Unavailable { .. }));
        assert_eq!(err.to_string(), "could not publish the ad, try again later");
    }

    #[tokio::test]
    async fn unauthorized_is_distinct() {
        let service = stub().await;
        let err = service.create_ad("stale", &request()).await.unwrap_err();
        assert_eq!(err, SubmissionError::Unauthorized);
    }

    #[tokio::test]
    async fn read_path_decodes_attributes() {
        let service = stub().await;
        let record = service.get_ad(&AdId::new("17")).await.expect("get");
        let attributes = record.attributes().unwrap();
        assert_eq!(attributes.category(), AdCategory::RealEstate);
        assert!(attributes.get("rooms").is_some());
        assert_eq!(
            service.get_ad(&AdId::new("99")).await.unwrap_err(),
            ReadError::NotFound
        );
        assert!(service.list_ads().await.unwrap().is_empty());
    }
}
