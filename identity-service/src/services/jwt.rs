use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fs;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{AccessLevel, BranchMembership, Identity};
use crate::services::AuthError;

/// Token service for issuing and verifying signed tokens.
///
/// Access tokens are stateless: verification is pure computation and
/// revocation is not supported, so compromise is bounded only by the short
/// expiry. Refresh tokens are persisted by the caller.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

/// Wire claims for access tokens (short-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (identity id)
    pub sub: String,
    pub email: String,
    /// Role codes held at issuance
    pub roles: Vec<String>,
    /// Branch membership tuples held at issuance
    pub branches: Vec<BranchClaim>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

/// Branch tuple embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchClaim {
    pub branch_id: Uuid,
    pub code: String,
    pub access_level: String,
}

/// Wire claims for refresh tokens (long-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject (identity id)
    pub sub: String,
    /// Token ID (matches the persisted record)
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

/// Validated claims handed to protected handlers. Anything malformed in
/// the wire claims is rejected as `InvalidToken` before reaching here.
#[derive(Debug, Clone)]
pub struct IdentityClaims {
    pub identity_id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub branches: Vec<BranchAccess>,
    pub token_id: Uuid,
    pub expires_at: i64,
}

/// A branch the token holder can see, with the access level as a hint for
/// the owning resource handler.
#[derive(Debug, Clone)]
pub struct BranchAccess {
    pub branch_id: Uuid,
    pub code: String,
    pub access_level: AccessLevel,
}

/// Validated refresh token claims.
#[derive(Debug, Clone)]
pub struct RefreshClaims {
    pub identity_id: Uuid,
    pub token_id: Uuid,
}

impl TokenService {
    /// Create a new token service by loading RSA keys from files.
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let private_key_pem = fs::read_to_string(&config.private_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                config.private_key_path,
                e
            )
        })?;

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;

        let public_key_pem = fs::read_to_string(&config.public_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read public key from {}: {}",
                config.public_key_path,
                e
            )
        })?;

        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

        tracing::info!("Token service initialized with RS256 keys");

        Ok(Self {
            encoding_key,
            decoding_key,
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        })
    }

    /// Sign an access token embedding the identity's roles and branches.
    pub fn issue_access_token(
        &self,
        identity: &Identity,
        role_codes: &[String],
        memberships: &[BranchMembership],
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: identity.identity_id.to_string(),
            email: identity.email.clone(),
            roles: role_codes.to_vec(),
            branches: memberships
                .iter()
                .map(|m| BranchClaim {
                    branch_id: m.branch_id,
                    code: m.branch_code.clone(),
                    access_level: m.access_level.clone(),
                })
                .collect(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let header = Header::new(Algorithm::RS256);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Sign a refresh token carrying only the subject and the persisted
    /// record's id.
    pub fn issue_refresh_token(
        &self,
        identity_id: Uuid,
        token_id: Uuid,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::days(self.refresh_token_expiry_days);

        let claims = RefreshTokenClaims {
            sub: identity_id.to_string(),
            jti: token_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        let header = Header::new(Algorithm::RS256);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))
    }

    /// Verify an access token and validate its claims into typed form.
    pub fn verify_access_token(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidToken)?;
        let claims = token_data.claims;

        let identity_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let token_id = Uuid::parse_str(&claims.jti).map_err(|_| AuthError::InvalidToken)?;

        let mut branches = Vec::with_capacity(claims.branches.len());
        for branch in claims.branches {
            let access_level =
                AccessLevel::parse(&branch.access_level).ok_or(AuthError::InvalidToken)?;
            branches.push(BranchAccess {
                branch_id: branch.branch_id,
                code: branch.code,
                access_level,
            });
        }

        Ok(IdentityClaims {
            identity_id,
            email: claims.email,
            roles: claims.roles,
            branches,
            token_id,
            expires_at: claims.exp,
        })
    }

    /// Verify a refresh token's signature and expiry.
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        let token_data = decode::<RefreshTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidToken)?;
        let claims = token_data.claims;

        let identity_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let token_id = Uuid::parse_str(&claims.jti).map_err(|_| AuthError::InvalidToken)?;

        Ok(RefreshClaims {
            identity_id,
            token_id,
        })
    }

    /// Access token expiry in seconds (for client info).
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_expiry_days(&self) -> i64 {
        self.refresh_token_expiry_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_keys;

    fn service(access_minutes: i64) -> TokenService {
        let (private_file, public_file) = test_keys::write_key_files();
        let config = JwtConfig {
            private_key_path: private_file.path().to_str().unwrap().to_string(),
            public_key_path: public_file.path().to_str().unwrap().to_string(),
            access_token_expiry_minutes: access_minutes,
            refresh_token_expiry_days: 7,
        };
        // Key files only need to outlive TokenService::new
        let service = TokenService::new(&config).expect("token service");
        service
    }

    fn identity() -> Identity {
        Identity::new(
            "Alice".to_string(),
            "Okafor".to_string(),
            "alice@x.com".to_string(),
            "alice".to_string(),
            "$argon2id$fake".to_string(),
        )
    }

    fn memberships() -> Vec<BranchMembership> {
        vec![BranchMembership {
            branch_id: Uuid::new_v4(),
            branch_code: "HQ".to_string(),
            access_level: "full".to_string(),
            is_default: true,
        }]
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = service(15);
        let identity = identity();
        let roles = vec!["OPERATOR".to_string()];
        let branches = memberships();

        let token = service
            .issue_access_token(&identity, &roles, &branches)
            .unwrap();
        let claims = service.verify_access_token(&token).unwrap();

        assert_eq!(claims.identity_id, identity.identity_id);
        assert_eq!(claims.email, "alice@x.com");
        assert_eq!(claims.roles, roles);
        assert_eq!(claims.branches.len(), 1);
        assert_eq!(claims.branches[0].branch_id, branches[0].branch_id);
        assert_eq!(claims.branches[0].code, "HQ");
        assert_eq!(claims.branches[0].access_level, AccessLevel::Full);
    }

    #[test]
    fn test_expired_access_token_rejected() {
        // Issue with expiry well in the past (beyond decode leeway)
        let service = service(-5);
        let token = service
            .issue_access_token(&identity(), &[], &[])
            .unwrap();

        assert!(matches!(
            service.verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_refresh_token_round_trip() {
        let service = service(15);
        let identity_id = Uuid::new_v4();
        let token_id = Uuid::new_v4();

        let token = service.issue_refresh_token(identity_id, token_id).unwrap();
        let claims = service.verify_refresh_token(&token).unwrap();

        assert_eq!(claims.identity_id, identity_id);
        assert_eq!(claims.token_id, token_id);
    }

    #[test]
    fn test_garbage_token_rejected() {
        let service = service(15);
        assert!(matches!(
            service.verify_access_token("not.a.token"),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            service.verify_refresh_token(""),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_malformed_claims_rejected() {
        // A structurally valid, correctly signed token whose claims do not
        // validate must still be InvalidToken
        let service = service(15);

        #[derive(Serialize)]
        struct LooseClaims {
            sub: String,
            email: String,
            roles: Vec<String>,
            branches: Vec<serde_json::Value>,
            exp: i64,
            iat: i64,
            jti: String,
        }

        let (private_file, _public) = test_keys::write_key_files();
        let pem = std::fs::read_to_string(private_file.path()).unwrap();
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();

        let now = Utc::now().timestamp();
        let claims = LooseClaims {
            sub: Uuid::new_v4().to_string(),
            email: "alice@x.com".to_string(),
            roles: vec![],
            branches: vec![serde_json::json!({
                "branch_id": Uuid::new_v4(),
                "code": "HQ",
                "access_level": "supreme"
            })],
            exp: now + 900,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap();

        assert!(matches!(
            service.verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));

        // And a non-uuid subject
        let claims = LooseClaims {
            sub: "root".to_string(),
            email: "alice@x.com".to_string(),
            roles: vec![],
            branches: vec![],
            exp: now + 900,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap();
        assert!(matches!(
            service.verify_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }
}
