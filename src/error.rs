//! 请求错误
//! 所有 handler 统一返回 AppError；这里只给裸状态码，
//! HTML 请求的 404/500 兜底页由外层 funnel 中间件补上

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("数据库错误: {0}")]
    Db(#[from] mongodb::error::Error),
    #[error("模板渲染失败: {0}")]
    Template(#[from] tera::Error),
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Not Found")]
    NotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            AppError::Db(e) => {
                error!("[db] {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server Error").into_response()
            }
            AppError::Template(e) => {
                error!("[tera] {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server Error").into_response()
            }
        }
    }
}
