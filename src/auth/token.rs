use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{SecurityConfig, MAX_JWT_EXPIRY_MINUTES};

/// Claims minted into every identity token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims as they arrive on the wire, before the subject is known to be numeric
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<Value>,
    iss: Option<String>,
    exp: Option<i64>,
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("token signing failed: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),

    #[error("token expiry is out of range")]
    ExpiryOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("unexpected signing method")]
    SigningMethodMismatch,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("invalid issuer")]
    IssuerMismatch,

    #[error("invalid token claims")]
    MalformedClaims,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidAlgorithm => TokenError::SigningMethodMismatch,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidIssuer => TokenError::IssuerMismatch,
            ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
                "exp" => TokenError::Expired,
                "iss" => TokenError::IssuerMismatch,
                _ => TokenError::MalformedClaims,
            },
            _ => TokenError::Malformed,
        }
    }
}

/// Issues and verifies HS256 identity tokens.
///
/// Keys are derived once from [`SecurityConfig`] at construction; the service
/// holds no other state and is shared across requests behind an `Arc`.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    expiry: Duration,
    validation: Validation,
}

impl TokenService {
    pub fn new(config: &SecurityConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.jwt_issuer.as_str()]);
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.jwt_issuer.clone(),
            expiry: Duration::minutes(
                config.jwt_expiry_minutes.clamp(1, MAX_JWT_EXPIRY_MINUTES),
            ),
            validation,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Lifetime of newly issued tokens, in seconds
    pub fn expires_in(&self) -> i64 {
        self.expiry.num_seconds()
    }

    pub fn issue(&self, subject: i64) -> Result<String, SigningError> {
        self.issue_at(subject, Utc::now())
    }

    pub fn issue_at(&self, subject: i64, now: DateTime<Utc>) -> Result<String, SigningError> {
        let claims = Claims {
            sub: subject,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: now
                .checked_add_signed(self.expiry)
                .ok_or(SigningError::ExpiryOverflow)?
                .timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Verify a token and return its subject.
    pub fn verify(&self, token: &str) -> Result<i64, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<i64, TokenError> {
        // Signature, algorithm, issuer and expiry against the wall clock
        let data = decode::<RawClaims>(token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;

        // Expiry again against the caller's clock; the token is dead at exp itself
        match claims.exp {
            Some(exp) if exp > now.timestamp() => {}
            _ => return Err(TokenError::Expired),
        }

        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            return Err(TokenError::IssuerMismatch);
        }

        claims
            .sub
            .as_ref()
            .and_then(numeric_subject)
            .ok_or(TokenError::MalformedClaims)
    }
}

fn numeric_subject(value: &Value) -> Option<i64> {
    let number = value.as_number()?;
    number.as_i64().or_else(|| {
        number
            .as_f64()
            // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "unit-test-secret";

    fn service() -> TokenService {
        TokenService::new(&SecurityConfig::new(SECRET).with_issuer("rest-jwt-api-test"))
    }

    fn sign_raw(claims: &Value, algorithm: Algorithm, secret: &str) -> String {
        encode(
            &Header::new(algorithm),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn issued_token_verifies_to_its_subject() {
        let tokens = service();
        for subject in [1, 42, 0, -7, i64::from(i32::MAX) + 1] {
            let token = tokens.issue(subject).unwrap();
            assert_eq!(tokens.verify(&token), Ok(subject));
        }
    }

    #[test]
    fn issued_claims_carry_issuer_and_expiry() {
        let tokens = TokenService::new(&SecurityConfig::new(SECRET).with_expiry_minutes(15));
        let now = Utc::now();
        let token = tokens.issue_at(9, now).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(SECRET.as_bytes()),
            &validation,
        )
        .unwrap();

        assert_eq!(data.header.alg, Algorithm::HS256);
        assert_eq!(data.claims.sub, 9);
        assert_eq!(data.claims.iss, crate::config::DEFAULT_JWT_ISSUER);
        assert_eq!(data.claims.iat, now.timestamp());
        assert_eq!(data.claims.exp, now.timestamp() + 15 * 60);
        assert_eq!(tokens.expires_in(), 15 * 60);
    }

    #[test]
    fn oversized_expiry_is_capped() {
        let tokens = TokenService::new(&SecurityConfig::new(SECRET).with_expiry_minutes(i64::MAX));
        assert_eq!(tokens.expires_in(), MAX_JWT_EXPIRY_MINUTES * 60);

        let token = tokens.issue(42).unwrap();
        assert_eq!(
            TokenService::new(&SecurityConfig::new(SECRET)).verify(&token),
            Ok(42)
        );
    }

    #[test]
    fn expiry_past_the_calendar_is_a_signing_error() {
        let tokens = service();
        let result = tokens.issue_at(42, DateTime::<Utc>::MAX_UTC);
        assert!(matches!(result, Err(SigningError::ExpiryOverflow)));
    }

    #[test]
    fn token_is_rejected_once_clock_reaches_expiry() {
        let tokens = TokenService::new(&SecurityConfig::new(SECRET).with_expiry_minutes(1));
        let issued = Utc::now();
        let token = tokens.issue_at(42, issued).unwrap();

        assert_eq!(tokens.verify_at(&token, issued + Duration::seconds(59)), Ok(42));
        assert_eq!(
            tokens.verify_at(&token, issued + Duration::minutes(1)),
            Err(TokenError::Expired)
        );
        assert_eq!(
            tokens.verify_at(&token, issued + Duration::minutes(5)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn already_expired_fixture_is_rejected() {
        let tokens = service();
        let token = tokens.issue_at(42, Utc::now() - Duration::hours(2)).unwrap();
        assert_eq!(tokens.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn tampered_claims_fail_signature_check() {
        let tokens = service();
        let token = tokens.issue(42).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let payload = parts[1];

        for index in [0, payload.len() / 2, payload.len() - 1] {
            let mut bytes = payload.as_bytes().to_vec();
            bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
            let tampered = format!(
                "{}.{}.{}",
                parts[0],
                String::from_utf8(bytes).unwrap(),
                parts[2]
            );
            assert_eq!(tokens.verify(&tampered), Err(TokenError::InvalidSignature));
        }
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let other = TokenService::new(&SecurityConfig::new("other-secret").with_issuer("rest-jwt-api-test"));
        let token = other.issue(42).unwrap();
        assert_eq!(service().verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn issuer_mismatch_is_rejected() {
        let issuer_a = TokenService::new(&SecurityConfig::new(SECRET).with_issuer("issuer-a"));
        let issuer_b = TokenService::new(&SecurityConfig::new(SECRET).with_issuer("issuer-b"));
        let token = issuer_a.issue(42).unwrap();
        assert_eq!(issuer_b.verify(&token), Err(TokenError::IssuerMismatch));
    }

    #[test]
    fn missing_issuer_is_rejected() {
        let exp = Utc::now().timestamp() + 600;
        let token = sign_raw(&json!({ "sub": 42, "exp": exp }), Algorithm::HS256, SECRET);
        assert_eq!(service().verify(&token), Err(TokenError::IssuerMismatch));
    }

    #[test]
    fn other_hmac_algorithm_is_a_signing_method_mismatch() {
        let exp = Utc::now().timestamp() + 600;
        let claims = json!({ "sub": 42, "iss": "rest-jwt-api-test", "exp": exp });
        for algorithm in [Algorithm::HS384, Algorithm::HS512] {
            let token = sign_raw(&claims, algorithm, SECRET);
            assert_eq!(service().verify(&token), Err(TokenError::SigningMethodMismatch));
        }
    }

    #[test]
    fn unsigned_token_is_rejected() {
        // {"alg":"none","typ":"JWT"} . {"sub":42,"iss":"rest-jwt-api-test","exp":4102444800} .
        let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.\
                     eyJzdWIiOjQyLCJpc3MiOiJyZXN0LWp3dC1hcGktdGVzdCIsImV4cCI6NDEwMjQ0NDgwMH0.";
        assert!(service().verify(token).is_err());
    }

    #[test]
    fn garbage_is_malformed() {
        let tokens = service();
        for token in ["garbage", "", "a.b", "a.b.c", "....."] {
            assert_eq!(tokens.verify(token), Err(TokenError::Malformed), "token {:?}", token);
        }
    }

    #[test]
    fn missing_or_non_numeric_subject_is_malformed_claims() {
        let exp = Utc::now().timestamp() + 600;
        let tokens = service();

        let cases = [
            json!({ "iss": "rest-jwt-api-test", "exp": exp }),
            json!({ "sub": "42", "iss": "rest-jwt-api-test", "exp": exp }),
            json!({ "sub": "alice", "iss": "rest-jwt-api-test", "exp": exp }),
            json!({ "sub": 4.5, "iss": "rest-jwt-api-test", "exp": exp }),
            json!({ "sub": null, "iss": "rest-jwt-api-test", "exp": exp }),
            json!({ "sub": 9_223_372_036_854_775_808u64, "iss": "rest-jwt-api-test", "exp": exp }),
            json!({ "sub": 9.3e18, "iss": "rest-jwt-api-test", "exp": exp }),
            json!({ "sub": -9.3e18, "iss": "rest-jwt-api-test", "exp": exp }),
        ];
        for claims in cases {
            let token = sign_raw(&claims, Algorithm::HS256, SECRET);
            assert_eq!(tokens.verify(&token), Err(TokenError::MalformedClaims), "claims {}", claims);
        }
    }

    #[test]
    fn integral_float_subject_is_accepted() {
        let exp = Utc::now().timestamp() + 600;
        let token = sign_raw(
            &json!({ "sub": 42.0, "iss": "rest-jwt-api-test", "exp": exp }),
            Algorithm::HS256,
            SECRET,
        );
        assert_eq!(service().verify(&token), Ok(42));
    }

    #[test]
    fn missing_expiry_is_rejected() {
        let token = sign_raw(
            &json!({ "sub": 42, "iss": "rest-jwt-api-test" }),
            Algorithm::HS256,
            SECRET,
        );
        assert_eq!(service().verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn failing_several_checks_is_still_rejected() {
        let exp = Utc::now().timestamp() - 600;
        let token = sign_raw(&json!({ "sub": "x", "iss": "elsewhere", "exp": exp }), Algorithm::HS256, SECRET);
        assert!(service().verify(&token).is_err());
    }
}
