//! 认证与限流中间件

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use domain::Claims;

use crate::error::ApiError;
use crate::state::AppState;

/// 从 Authorization 头提取 Bearer 令牌
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 校验请求携带的令牌
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token = bearer_token(headers).ok_or_else(|| ApiError::unauthorized("Missing token"))?;
    Ok(state.token_service.verify(token)?)
}

/// 限流中间件。限流 key 优先取认证用户 id，没有有效令牌时退回对端 IP。
/// 两者都取不到时放行：宁可多放一个请求，不能因为内部状态误伤流量。
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = limiter_key(&state, &request);

    if let Some(key) = key {
        let limits = &state.config.rate_limit;
        if let Err(err) =
            state
                .rate_limiter
                .check(&key, limits.max_requests, limits.window_seconds)
        {
            tracing::warn!(key = %key, "请求被限流");
            return Err(ApiError::too_many_requests(&err));
        }
    } else {
        tracing::debug!("无法识别请求来源，限流放行");
    }

    Ok(next.run(request).await)
}

fn limiter_key(state: &AppState, request: &Request) -> Option<String> {
    if let Some(token) = bearer_token(request.headers()) {
        if let Ok(claims) = state.token_service.verify(token) {
            return Some(format!("user:{}", claims.sub));
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
