use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};
use service_core::error::AppError;
use std::net::SocketAddr;

use crate::models::DeviceContext;

const UNKNOWN: &str = "unknown";

/// Client address and agent of the current request. The first
/// `x-forwarded-for` hop wins over the socket peer.
pub struct Device(pub DeviceContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Device
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let ip_address = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| UNKNOWN.to_string());

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(UNKNOWN);

        Ok(Device(DeviceContext::new(ip_address, user_agent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_forwarded_header_wins() {
        let (mut parts, _) = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .header(header::USER_AGENT, "curl/8.0")
            .body(())
            .unwrap()
            .into_parts();

        let Device(device) = Device::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(device.ip_address, "203.0.113.9");
        assert_eq!(device.user_agent, "curl/8.0");
    }

    #[tokio::test]
    async fn test_missing_everything_is_unknown() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let Device(device) = Device::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(device.ip_address, "unknown");
        assert_eq!(device.user_agent, "unknown");
    }
}
