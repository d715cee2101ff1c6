use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Transport-level peer address, when the server was started with connect info
///
/// Routers driven directly (tests, embedding) have no `ConnectInfo`; this
/// extractor yields `None` there instead of rejecting the request.
#[derive(Debug, Clone, Copy)]
pub struct PeerAddr(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for PeerAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(PeerAddr(peer))
    }
}
