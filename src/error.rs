use axum::http::StatusCode;
use thiserror::Error;

/// Failure taxonomy for a proxied chat turn. Every variant maps to a client
/// status code and a short user-facing reply; upstream detail stays in the
/// server log and in `Display`, never in the default wire body.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("messages payload is missing, empty, or blank")]
    InvalidRequest,

    #[error("chat credential is not configured")]
    MissingCredential,

    #[error("server-side rate limit exceeded")]
    TooManyRequests,

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream rejected the credential")]
    Unauthorized,

    #[error("upstream rate limit hit")]
    RateLimited,

    #[error("upstream rejected the request: {0}")]
    UpstreamBadRequest(String),

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("network error reaching upstream: {0}")]
    Network(String),

    #[error("malformed completion payload: {0}")]
    MalformedResponse(String),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::InvalidRequest => StatusCode::BAD_REQUEST,
            ChatError::MissingCredential => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ChatError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
            ChatError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ChatError::UpstreamBadRequest(_) => StatusCode::BAD_REQUEST,
            ChatError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::Network(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::MalformedResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short, safe, user-actionable string shown in the chat window.
    /// Credential problems are masked to a generic configuration message.
    pub fn user_reply(&self) -> &'static str {
        match self {
            ChatError::InvalidRequest => "请求参数错误，请重新输入",
            ChatError::MissingCredential => "服务器配置错误，请联系管理员",
            ChatError::TooManyRequests | ChatError::RateLimited => "请求过于频繁，请稍后再试",
            ChatError::Timeout => "请求超时，请简化问题或稍后重试",
            ChatError::Unauthorized => "服务配置错误，请联系管理员",
            ChatError::UpstreamBadRequest(_) => "请求参数错误，请稍后重试",
            ChatError::Upstream(_) | ChatError::Network(_) => "AI服务暂时繁忙，请稍后再试",
            ChatError::MalformedResponse(_) => "AI返回数据格式错误，请稍后重试",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(ChatError::InvalidRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ChatError::MissingCredential.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ChatError::Timeout.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(ChatError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ChatError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ChatError::UpstreamBadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ChatError::Upstream("503".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ChatError::MalformedResponse("no choices".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn credential_replies_never_name_the_secret() {
        for err in [ChatError::MissingCredential, ChatError::Unauthorized] {
            let reply = err.user_reply();
            assert!(!reply.contains("DEEPSEEK"));
            assert!(!reply.contains("API_KEY"));
            assert!(!reply.contains("Bearer"));
        }
    }
}
