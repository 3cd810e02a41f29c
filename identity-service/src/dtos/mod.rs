pub mod auth;

pub use auth::{
    ChangePasswordRequest, CreateIdentityRequest, LedgerQuery, LoginRequest, LoginResponse,
    LogoutRequest, MeResponse, RefreshRequest, RefreshResponse, RevokedResponse,
    SetStatusRequest, TokenResponse,
};
