use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

const STATUS_SUCCESS: &str = "success";
const STATUS_ERROR: &str = "error";

/// `{ "status": "success", "data": ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            status: STATUS_SUCCESS,
            data: Some(data),
            message: None,
        })
    }

    pub fn created(data: T) -> impl IntoResponse {
        (StatusCode::CREATED, Self::success(data))
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: STATUS_SUCCESS,
            data: None,
            message: Some(message.into()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    status: &'static str,
    message: String,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR,
            message: message.into(),
        }
    }
}
