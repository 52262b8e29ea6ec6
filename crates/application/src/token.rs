//! 签名令牌服务
//!
//! 无状态的自包含令牌：`base64url(payload) + "." + base64url(signature)`，
//! 签名为对 payload 段做 HMAC-SHA256。有效性完全由签名和 exp 决定，
//! 本层不支持撤销，需要撤销的调用方必须自建黑名单。

use chrono::{DateTime, Utc};
use data_encoding::BASE64URL_NOPAD;
use ring::hmac;

use config::AuthConfig;
use domain::{Claims, TokenError, UserId, UserRole};

/// 无法解析的 TTL 字符串回退为 7 天
const DEFAULT_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// 令牌主体：签发时由调用方提供的用户身份
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub role: UserRole,
    /// 调用方自定义声明，平铺进 payload
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenSubject {
    pub fn new(user_id: UserId, username: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id,
            username: username.into(),
            email: None,
            role,
            extra: serde_json::Map::new(),
        }
    }
}

/// 令牌服务。纯函数式，无共享可变状态，可以在任意多的连接处理器间并发使用。
pub struct TokenService {
    key: hmac::Key,
    issuer: String,
    default_ttl_seconds: i64,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            default_ttl_seconds: parse_ttl(&config.token_ttl),
        }
    }

    /// 签发令牌。ttl 为 None 时使用配置的默认有效期。
    pub fn issue(&self, subject: &TokenSubject, ttl: Option<&str>) -> String {
        let ttl_seconds = ttl.map(parse_ttl).unwrap_or(self.default_ttl_seconds);
        self.issue_at(subject, ttl_seconds, Utc::now())
    }

    fn issue_at(&self, subject: &TokenSubject, ttl_seconds: i64, now: DateTime<Utc>) -> String {
        let claims = Claims {
            sub: subject.user_id.into(),
            username: subject.username.clone(),
            email: subject.email.clone(),
            role: subject.role,
            iat: now.timestamp(),
            exp: now.timestamp() + ttl_seconds,
            iss: self.issuer.clone(),
            extra: subject.extra.clone(),
        };

        // Claims 只含可序列化字段，这里不会失败
        let payload = serde_json::to_vec(&claims).expect("claims serialization cannot fail");
        let payload_b64 = BASE64URL_NOPAD.encode(&payload);
        let tag = hmac::sign(&self.key, payload_b64.as_bytes());
        format!("{}.{}", payload_b64, BASE64URL_NOPAD.encode(tag.as_ref()))
    }

    /// 验证令牌：签名使用恒定时间比较，随后检查 exp。
    /// 只有签名正确的令牌才会报告 Expired。
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let claims = self.verify_signature(token)?;
        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// 只解析 payload，不做签名和过期检查。仅用于检视，
    /// 例如支持对已过期但签名仍有效的令牌做刷新。
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let (payload_b64, _) = split_token(token)?;
        decode_payload(payload_b64)
    }

    /// 刷新令牌：校验签名但忽略过期，按新 TTL 重新签发。
    /// 不要求重新认证，过期多久仍可刷新由调用方自行约束。
    pub fn refresh(&self, token: &str, ttl: Option<&str>) -> Result<String, TokenError> {
        let claims = self.verify_signature(token)?;
        let subject = TokenSubject {
            user_id: claims.user_id(),
            username: claims.username,
            email: claims.email,
            role: claims.role,
            extra: claims.extra,
        };
        Ok(self.issue(&subject, ttl))
    }

    fn verify_signature(&self, token: &str) -> Result<Claims, TokenError> {
        let (payload_b64, signature_b64) = split_token(token)?;
        let signature = BASE64URL_NOPAD
            .decode(signature_b64.as_bytes())
            .map_err(|_| TokenError::Invalid)?;
        hmac::verify(&self.key, payload_b64.as_bytes(), &signature)
            .map_err(|_| TokenError::Invalid)?;
        decode_payload(payload_b64)
    }
}

fn split_token(token: &str) -> Result<(&str, &str), TokenError> {
    match token.split_once('.') {
        Some((payload, signature)) if !payload.is_empty() && !signature.contains('.') => {
            Ok((payload, signature))
        }
        _ => Err(TokenError::Invalid),
    }
}

fn decode_payload(payload_b64: &str) -> Result<Claims, TokenError> {
    let payload = BASE64URL_NOPAD
        .decode(payload_b64.as_bytes())
        .map_err(|_| TokenError::Invalid)?;
    serde_json::from_slice(&payload).map_err(|_| TokenError::Invalid)
}

/// 解析 TTL：纯数字按秒处理，支持 "7d" / "24h" / "30m" / "45s" 简写，
/// 其他格式回退为 7 天默认值。
pub fn parse_ttl(value: &str) -> i64 {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<i64>() {
        if seconds >= 0 {
            return seconds;
        }
        return DEFAULT_TTL_SECONDS;
    }

    let (number, unit) = value.split_at(value.len().saturating_sub(1));
    let Ok(amount) = number.parse::<i64>() else {
        return DEFAULT_TTL_SECONDS;
    };
    if amount < 0 {
        return DEFAULT_TTL_SECONDS;
    }
    match unit {
        "d" => amount * 24 * 60 * 60,
        "h" => amount * 60 * 60,
        "m" => amount * 60,
        "s" => amount,
        _ => DEFAULT_TTL_SECONDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&AuthConfig {
            secret: "unit-test-signing-secret-key-32-chars!!".to_string(),
            token_ttl: "7d".to_string(),
            issuer: "livechat".to_string(),
            allow_anonymous: false,
        })
    }

    fn subject() -> TokenSubject {
        let mut subject = TokenSubject::new(UserId::random(), "alice", UserRole::User);
        subject.email = Some("alice@example.com".to_string());
        subject
            .extra
            .insert("tenant".to_string(), serde_json::json!("acme"));
        subject
    }

    #[test]
    fn test_issue_verify_roundtrip() {
        let service = service();
        let subject = subject();

        let token = service.issue(&subject, Some("1h"));
        let claims = service.verify(&token).expect("token should verify");

        assert_eq!(claims.user_id(), subject.user_id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
        assert_eq!(claims.iss, "livechat");
        assert_eq!(claims.extra["tenant"], serde_json::json!("acme"));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = service();
        let subject = subject();

        // exp == now，过期判定含等号
        let token = service.issue(&subject, Some("0s"));
        assert_eq!(service.verify(&token), Err(TokenError::Expired));

        // decode 不检查过期
        let claims = service.decode(&token).expect("decode ignores expiry");
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let service = service();
        let token = service.issue(&subject(), Some("1h"));

        let (payload, signature) = token.split_once('.').unwrap();
        let mut chars: Vec<char> = signature.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();

        assert_eq!(
            service.verify(&format!("{payload}.{tampered}")),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let service = service();
        let token = service.issue(&subject(), Some("1h"));
        let (_, signature) = token.split_once('.').unwrap();

        let forged_payload = BASE64URL_NOPAD.encode(b"{\"sub\":\"forged\"}");
        assert_eq!(
            service.verify(&format!("{forged_payload}.{signature}")),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let service = service();
        assert_eq!(service.verify(""), Err(TokenError::Invalid));
        assert_eq!(service.verify("no-dot"), Err(TokenError::Invalid));
        assert_eq!(service.verify("a.b.c"), Err(TokenError::Invalid));
        assert_eq!(service.verify(".signature"), Err(TokenError::Invalid));
        assert_eq!(service.verify("not base64!.sig"), Err(TokenError::Invalid));
    }

    #[test]
    fn test_refresh_expired_token() {
        let service = service();
        let subject = subject();

        let expired = service.issue(&subject, Some("0s"));
        assert_eq!(service.verify(&expired), Err(TokenError::Expired));

        let refreshed = service.refresh(&expired, Some("1h")).expect("refresh");
        let claims = service.verify(&refreshed).expect("refreshed token verifies");
        assert_eq!(claims.user_id(), subject.user_id);
        assert_eq!(claims.extra["tenant"], serde_json::json!("acme"));
    }

    #[test]
    fn test_refresh_requires_valid_signature() {
        let service = service();
        let token = service.issue(&subject(), Some("0s"));
        let tampered = format!("{}x", token);
        assert_eq!(service.refresh(&tampered, None), Err(TokenError::Invalid));
    }

    #[test]
    fn test_parse_ttl_formats() {
        assert_eq!(parse_ttl("3600"), 3600);
        assert_eq!(parse_ttl("7d"), 604_800);
        assert_eq!(parse_ttl("24h"), 86_400);
        assert_eq!(parse_ttl("30m"), 1_800);
        assert_eq!(parse_ttl("45s"), 45);
        // 无法识别的格式回退 7 天
        assert_eq!(parse_ttl("fortnight"), DEFAULT_TTL_SECONDS);
        assert_eq!(parse_ttl(""), DEFAULT_TTL_SECONDS);
        assert_eq!(parse_ttl("-5m"), DEFAULT_TTL_SECONDS);
    }
}
